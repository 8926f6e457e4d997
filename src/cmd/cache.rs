//! `cadence cache`: inspect and clear the step cache.

use anyhow::Result;
use colored::Colorize;

use cadence::cache;
use cadence::config::Config;

pub fn cmd_cache_list() -> Result<()> {
    super::ensure_initialized()?;
    let config = Config::load()?;
    let entries = cache::list(&config.cache_dir())?;

    if entries.is_empty() {
        println!("Cache is empty");
        return Ok(());
    }
    for meta in &entries {
        println!(
            "{}  {}  {}",
            meta.key.cyan(),
            meta.created_at.dimmed(),
            meta.paths.join(", ")
        );
    }
    Ok(())
}

pub fn cmd_cache_clear() -> Result<()> {
    super::ensure_initialized()?;
    let config = Config::load()?;
    let removed = cache::clear(&config.cache_dir())?;
    let noun = if removed == 1 { "entry" } else { "entries" };
    println!("{} Removed {} cache {}", "✓".green(), removed, noun);
    Ok(())
}
