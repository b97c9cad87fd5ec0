use anyhow::{Context as _, Result};
use specflow::{Config, WorkflowWatcher};
use tokio::sync::mpsc;

use crate::Context;

/// Prints one line per classified change until ctrl-c.
pub fn run(ctx: &Context) -> Result<()> {
    let config = Config::load(ctx.workflow.paths()).context("Failed to load configuration")?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    runtime.block_on(async {
        let (tx, mut rx) = mpsc::channel(config.watch_buffer.max(1));
        let handle = WorkflowWatcher::start(ctx.workflow.paths(), tx)
            .context("Failed to watch workflow directory")?;
        eprintln!("Watching {} (ctrl-c to stop)", handle.root().display());

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                change = rx.recv() => {
                    let Some(change) = change else { break };
                    if ctx.json {
                        println!("{}", serde_json::to_string(&change)?);
                    } else {
                        println!(
                            "{:<8} {:<40} {}",
                            format!("{:?}", change.kind).to_lowercase(),
                            format!("{:?}", change.subsystem),
                            change.spec_name.as_deref().unwrap_or("-"),
                        );
                    }
                }
            }
        }

        handle.stop();
        Ok::<(), anyhow::Error>(())
    })
}
