//! Search command - semantic search with keyword fallback

use anyhow::Result;
use colored::Colorize;

use promptdex::{SearchMode, SearchResponse};

use super::{build_service, truncate};
use crate::GlobalArgs;

const PREVIEW_WIDTH: usize = 100;

pub fn run(
    args: &GlobalArgs,
    query: &str,
    limit: Option<usize>,
    fallback: bool,
    json: bool,
) -> Result<()> {
    let service = build_service(args)?;
    let limit = limit.unwrap_or(service.config().default_limit);

    let response = if fallback {
        service.keyword_search(query, limit)
    } else {
        service.search(query, limit)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_response(query, &response);
    Ok(())
}

fn print_response(query: &str, response: &SearchResponse) {
    if response.mode == SearchMode::Keyword {
        println!("{} Using keyword search", "!".yellow());
    }
    if let Some(notice) = &response.notice {
        println!("{} {}", "!".yellow(), notice);
    }
    if response.mode == SearchMode::Keyword || response.notice.is_some() {
        println!();
    }

    if response.results.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), query.cyan());
        return;
    }

    println!(
        "{} {} results for: {}",
        "→".dimmed(),
        response.results.len(),
        query.cyan()
    );
    println!();

    for result in &response.results {
        println!(
            "{}. [{}] {}",
            result.rank.to_string().bold(),
            result.score.to_string().dimmed(),
            result.name().cyan()
        );
        println!("   {}", result.relative_path().dimmed());
        let preview = result.content().split_whitespace().collect::<Vec<_>>().join(" ");
        println!("   {}", truncate(&preview, PREVIEW_WIDTH));
        println!();
    }
}
