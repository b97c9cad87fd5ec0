use anyhow::{Context as _, Result};
use specflow::{DocumentKind, SpecLocation, SpecSummary};

use crate::Context;

pub fn run(ctx: &Context, archived: bool) -> Result<()> {
    let location = if archived {
        SpecLocation::Archived
    } else {
        SpecLocation::Active
    };
    let specs = ctx
        .workflow
        .list_specs(location)
        .with_context(|| format!("Failed to list {location} specifications"))?;

    if ctx.json {
        return ctx.print_json(&specs);
    }
    if specs.is_empty() {
        println!("(no {location} specifications)");
        return Ok(());
    }
    for spec in &specs {
        println!("{}", format_row(spec));
    }
    Ok(())
}

fn format_row(spec: &SpecSummary) -> String {
    let docs: String = DocumentKind::ALL
        .into_iter()
        .map(|kind| {
            let initial = kind.to_string().chars().next().unwrap_or('?');
            if spec.documents.get(kind).exists {
                initial.to_ascii_uppercase()
            } else {
                '-'
            }
        })
        .collect();
    let progress = match spec.task_progress {
        Some(p) => format!("{}/{} tasks", p.completed, p.total),
        None => "no tasks".to_string(),
    };
    let modified = spec
        .last_modified
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!("{:<28} [{docs}] {progress:<14} {modified}", spec.name)
}
