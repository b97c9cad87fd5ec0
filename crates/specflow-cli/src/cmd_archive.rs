use anyhow::Result;
use serde_json::json;

use crate::Context;

pub fn archive(ctx: &Context, name: &str) -> Result<()> {
    ctx.workflow.archive(name)?;
    report(ctx, name, "archived")
}

pub fn unarchive(ctx: &Context, name: &str) -> Result<()> {
    ctx.workflow.unarchive(name)?;
    report(ctx, name, "active")
}

pub fn locate(ctx: &Context, name: &str) -> Result<()> {
    let location = match ctx.workflow.locate(name)? {
        Some(location) => location.to_string(),
        None => "not-found".to_string(),
    };
    report(ctx, name, &location)
}

fn report(ctx: &Context, name: &str, location: &str) -> Result<()> {
    if ctx.json {
        return ctx.print_json(&json!({ "name": name, "location": location }));
    }
    println!("{name}: {location}");
    Ok(())
}
