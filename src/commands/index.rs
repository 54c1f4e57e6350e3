//! Index command - Build semantic search index

use anyhow::Result;
use colored::Colorize;

use promptdex::{IndexState, SearchError};

use super::build_service;
use crate::GlobalArgs;

/// Run index command
pub fn run(args: &GlobalArgs, rebuild: bool, json: bool) -> Result<()> {
    let service = build_service(args)?;
    let index_path = service.store().path();

    if rebuild {
        if !json {
            println!("{} Rebuilding search index...", "→".dimmed());
        }
        return match service.rebuild() {
            Ok(report) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!(
                        "{} Indexed {} prompts in {:.2}s",
                        "✓".green().bold(),
                        report.document_count.to_string().cyan(),
                        report.duration_ms as f64 / 1000.0
                    );
                    println!("  {} Index saved to: {}", "→".dimmed(), index_path.display());
                }
                Ok(())
            }
            Err(e) => report_failure(&e, json),
        };
    }

    if !json {
        println!("{} Building search index...", "→".dimmed());
    }
    match service.ensure_index() {
        Ok(IndexState::Degraded) => {
            let status = service.get_status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "{} Semantic search unavailable: {}",
                    "!".yellow().bold(),
                    status.degraded_reason.unwrap_or_default()
                );
                println!("  {} Keyword search still works", "→".dimmed());
            }
            Ok(())
        }
        Ok(_) => {
            let status = service.get_status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "{} Index ready with {} prompts",
                    "✓".green().bold(),
                    status.document_count.to_string().cyan()
                );
                println!("  {} Index path: {}", "→".dimmed(), index_path.display());
            }
            Ok(())
        }
        Err(e) => report_failure(&e, json),
    }
}

fn report_failure(e: &SearchError, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "error": e.to_string() }));
    } else {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if matches!(e, SearchError::NoDocumentsFound) {
            eprintln!("  {} Add prompt files or pass {}", "→".dimmed(), "--root <DIR>".cyan());
        }
    }
    std::process::exit(1);
}
