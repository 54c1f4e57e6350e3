pub mod index;
pub mod list;
pub mod search;
pub mod status;

use anyhow::Result;
use unicode_width::UnicodeWidthChar;

use promptdex::core::paths::DataPaths;
use promptdex::{SearchConfig, SearchService};

use crate::GlobalArgs;

/// Load config and apply command-line overrides.
pub fn load_config(args: &GlobalArgs) -> Result<SearchConfig> {
    let path = args.config.clone().unwrap_or_else(|| DataPaths::new().config);
    let mut config = SearchConfig::load(&path)?;

    if !args.roots.is_empty() {
        config.roots = args.roots.clone();
    }
    if args.index_dir.is_some() {
        config.index_dir = args.index_dir.clone();
    }
    Ok(config.normalized())
}

pub fn build_service(args: &GlobalArgs) -> Result<SearchService> {
    Ok(SearchService::from_config(load_config(args)?))
}

/// Truncate to a display width, appending `...` when cut.
pub fn truncate(s: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width {
            out.push_str("...");
            return out;
        }
        width += w;
        out.push(c);
    }
    out
}
