use anyhow::{Context as _, Result, bail};
use clap::Subcommand;
use similar::TextDiff;
use specflow::{TaskRecord, TaskStatus};

use crate::Context;

#[derive(Subcommand, Debug)]
pub enum TasksOp {
    /// Print every task of a specification
    Show { name: String },
    /// Set one task's status
    SetStatus {
        name: String,

        /// Dotted task id, e.g. 2.1
        id: String,

        /// pending, in-progress or completed
        status: String,

        /// Print the resulting diff without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the first pending task
    Next { name: String },
}

pub fn run(ctx: &Context, op: TasksOp) -> Result<()> {
    match op {
        TasksOp::Show { name } => show(ctx, &name),
        TasksOp::SetStatus {
            name,
            id,
            status,
            dry_run,
        } => {
            let status: TaskStatus = status.parse()?;
            if dry_run {
                dry_run_status(ctx, &name, &id, status)
            } else {
                set_status(ctx, &name, &id, status)
            }
        }
        TasksOp::Next { name } => next(ctx, &name),
    }
}

fn show(ctx: &Context, name: &str) -> Result<()> {
    let parsed = ctx
        .workflow
        .read_tasks(name)
        .with_context(|| format!("Failed to read tasks of {name}"))?;
    if ctx.json {
        return ctx.print_json(&parsed);
    }
    for task in &parsed.tasks {
        println!("{}", format_task(task));
    }
    let s = parsed.summary;
    println!();
    println!(
        "{} total, {} completed, {} in progress, {} pending",
        s.total, s.completed, s.in_progress, s.pending
    );
    Ok(())
}

fn set_status(ctx: &Context, name: &str, id: &str, status: TaskStatus) -> Result<()> {
    let task = ctx.workflow.set_task_status(name, id, status)?;
    if ctx.json {
        return ctx.print_json(&task);
    }
    println!("{}", format_task(&task));
    Ok(())
}

fn dry_run_status(ctx: &Context, name: &str, id: &str, status: TaskStatus) -> Result<()> {
    let (before, after) = ctx.workflow.preview_task_status(name, id, status)?;
    let diff = TextDiff::from_lines(before.as_str(), after.as_str());
    let unified = diff.unified_diff().context_radius(1).to_string();
    if unified.is_empty() {
        println!("(no change)");
    } else {
        print!("{unified}");
    }
    Ok(())
}

fn next(ctx: &Context, name: &str) -> Result<()> {
    let parsed = ctx.workflow.read_tasks(name)?;
    let Some(task) = parsed.next_pending() else {
        if parsed.summary.total == 0 {
            bail!("{name} has no tasks");
        }
        if ctx.json {
            return ctx.print_json(&serde_json::Value::Null);
        }
        println!("All tasks of {name} are started or completed");
        return Ok(());
    };
    if ctx.json {
        return ctx.print_json(task);
    }
    println!("{}", format_task(task));
    if let Some(prompt) = &task.metadata.prompt {
        println!();
        println!("{prompt}");
    }
    Ok(())
}

fn format_task(task: &TaskRecord) -> String {
    let indent = "  ".repeat(task.indent_level);
    if task.is_header {
        format!("{indent}{} {}", task.id, task.description)
    } else {
        format!(
            "{indent}{} {} {}",
            task.status.marker(),
            task.id,
            task.description
        )
    }
}
