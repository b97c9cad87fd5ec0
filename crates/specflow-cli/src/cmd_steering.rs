use anyhow::Result;
use specflow::{DocumentStatus, SteeringKind};

use crate::Context;

pub fn run(ctx: &Context, kind: Option<String>) -> Result<()> {
    if let Some(kind) = kind {
        let kind: SteeringKind = kind.parse()?;
        print!("{}", ctx.workflow.read_steering(kind)?);
        return Ok(());
    }

    let status = ctx.workflow.steering_status();
    if ctx.json {
        return ctx.print_json(&status);
    }
    if !status.exists {
        println!("(no steering directory)");
        return Ok(());
    }
    for (label, doc) in [
        ("product", &status.product),
        ("tech", &status.tech),
        ("structure", &status.structure),
    ] {
        println!("{label:<10} {}", describe(doc));
    }
    Ok(())
}

fn describe(doc: &DocumentStatus) -> String {
    match doc.last_modified {
        Some(t) => format!("present, modified {}", t.format("%Y-%m-%d %H:%M")),
        None => "missing".to_string(),
    }
}
