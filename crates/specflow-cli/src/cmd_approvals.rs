use anyhow::{Context as _, Result};
use clap::Subcommand;
use specflow::{ApprovalRecord, Decision};

use crate::Context;

#[derive(Subcommand, Debug)]
pub enum ApprovalsOp {
    /// List approval requests, newest first
    List {
        /// Only requests for this specification
        #[arg(long)]
        spec: Option<String>,

        /// Only pending requests
        #[arg(long)]
        pending: bool,
    },
    /// Print one approval record
    Show { id: String },
    /// Record a decision on a pending request
    Decide {
        id: String,

        /// approved, rejected or needs-revision
        decision: String,

        /// Response text stored on the record
        #[arg(short, long, default_value = "")]
        response: String,

        /// Free-form annotations
        #[arg(long)]
        annotations: Option<String>,
    },
    /// Print the document a request refers to
    Content { id: String },
}

pub fn run(ctx: &Context, op: ApprovalsOp) -> Result<()> {
    let store = ctx.workflow.approvals();
    match op {
        ApprovalsOp::List { spec, pending } => {
            let records: Vec<ApprovalRecord> = store
                .list()
                .context("Failed to list approvals")?
                .into_iter()
                .filter(|r| spec.as_deref().is_none_or(|s| r.category_name == s))
                .filter(|r| !pending || r.is_pending())
                .collect();
            if ctx.json {
                return ctx.print_json(&records);
            }
            if records.is_empty() {
                println!("(no approvals)");
            }
            for r in &records {
                println!(
                    "{:<40} {:<15} {:<20} {}",
                    r.id, r.status, r.category_name, r.title
                );
            }
            Ok(())
        }
        ApprovalsOp::Show { id } => {
            let record = store.get(&id)?;
            if ctx.json {
                return ctx.print_json(&record);
            }
            println!("{}: {}", record.id, record.title);
            println!("  status:   {}", record.status);
            println!("  spec:     {}", record.category_name);
            println!("  file:     {}", record.file_path);
            println!("  created:  {}", record.created_at.to_rfc3339());
            if let Some(response) = &record.response {
                println!("  response: {response}");
            }
            for comment in &record.comments {
                match (comment.start_line, comment.end_line) {
                    (Some(start), Some(end)) => println!("  - L{start}-{end}: {}", comment.text),
                    _ => println!("  - {}", comment.text),
                }
            }
            Ok(())
        }
        ApprovalsOp::Decide {
            id,
            decision,
            response,
            annotations,
        } => {
            let decision: Decision = decision.parse()?;
            let record = store.transition(&id, decision, response, annotations, None)?;
            if ctx.json {
                return ctx.print_json(&record);
            }
            println!("{} is now {}", record.id, record.status);
            Ok(())
        }
        ApprovalsOp::Content { id } => {
            let content = ctx.workflow.approval_content(&id)?;
            print!("{content}");
            Ok(())
        }
    }
}
