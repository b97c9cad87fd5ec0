use anyhow::{Context as _, Result};
use specflow::Config;

use crate::Context;

pub fn run(ctx: &Context, port: Option<u16>, bind: Option<String>) -> Result<()> {
    let mut config =
        Config::load(ctx.workflow.paths()).context("Failed to load configuration")?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(bind) = bind {
        config.bind = bind;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    runtime.block_on(specflow_server::serve(ctx.workflow.clone(), &config))
}
