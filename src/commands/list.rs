use anyhow::Result;
use colored::*;

use super::{load_config, truncate};
use crate::GlobalArgs;
use promptdex::DocumentCollector;

const SUMMARY_WIDTH: usize = 80;

pub fn run(args: &GlobalArgs, filter: Option<&str>, preview: Option<usize>) -> Result<()> {
    let config = load_config(args)?;
    let collector = DocumentCollector::from_config(&config);
    let documents = collector.list(filter);

    if documents.is_empty() {
        println!("{}", "No prompts found.".yellow());
        return Ok(());
    }

    println!("{}", "Prompts".bold());
    println!("{}", "=".repeat(60));

    for doc in &documents {
        println!("{} [{}]", doc.name.cyan(), doc.relative_path.dimmed());
        match preview {
            Some(lines) => println!("  {}", doc.summary(lines)),
            None => println!("  {}", truncate(&doc.summary(1), SUMMARY_WIDTH).dimmed()),
        }
    }

    println!();
    println!("Total: {}", documents.len());
    Ok(())
}
