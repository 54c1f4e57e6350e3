use anyhow::Result;
use colored::*;

use promptdex::IndexState;

use super::build_service;
use crate::GlobalArgs;

pub fn run(args: &GlobalArgs, json: bool) -> Result<()> {
    let service = build_service(args)?;
    if let Err(e) = service.restore() {
        tracing::warn!("{e}");
    }
    let status = service.get_status();
    let stored = match service.store().describe() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    };

    if json {
        let stored_json = stored.as_ref().map(|s| {
            serde_json::json!({
                "signature": s.signature,
                "built_at": s.built_at,
                "file_size_bytes": s.file_size,
            })
        });
        println!(
            "{}",
            serde_json::json!({
                "status": status,
                "index_path": service.store().path().display().to_string(),
                "stored": stored_json,
            })
        );
        return Ok(());
    }

    println!("{}", "Index Status".bold());
    println!();

    let state = match status.state {
        IndexState::Ready => "ready".green(),
        IndexState::NotBuilt => "not built".yellow(),
        IndexState::Degraded => "degraded".red(),
    };
    println!("  {} State: {}", "→".dimmed(), state);
    println!(
        "  {} {} prompts",
        "→".dimmed(),
        status.document_count.to_string().cyan()
    );
    if let Some(reason) = &status.degraded_reason {
        println!("  {} Reason: {}", "→".dimmed(), reason);
    }

    match stored {
        Some(s) if status.state == IndexState::NotBuilt => println!(
            "  {} Snapshot of {} prompts is out of date. Run {} to refresh.",
            "!".yellow().bold(),
            s.signature.document_count,
            "promptdex index".cyan()
        ),
        Some(s) => {
            println!(
                "  {} Snapshot: {} prompts, model {} ({} dims)",
                "→".dimmed(),
                s.signature.document_count,
                s.signature.model_id.cyan(),
                s.signature.dimension
            );
            println!(
                "  {} Size: {:.2} KB",
                "→".dimmed(),
                s.file_size as f64 / 1024.0
            );
            if let Some(ts) = s.built_at {
                println!(
                    "  {} Last indexed: {}",
                    "→".dimmed(),
                    ts.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        None => println!(
            "  {} No snapshot at {}. Run {} first.",
            "!".yellow().bold(),
            service.store().path().display(),
            "promptdex index".cyan()
        ),
    }

    Ok(())
}
