// src/cli/handlers/debug_cache.rs

use crate::cli::args::{CacheArgs, CacheSubcommand};
use crate::cli::handlers::commons::{self, AppContext};
use crate::core::paths;
use anyhow::Result;
use colored::*;
use std::path::PathBuf;

// --- Main Handler ---

/// The handler for the hidden `_cache` command. Works on the stored entry
/// directly; the script is resolved but never parsed.
pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let cache_args: CacheArgs = commons::parse_args(&args)?;

    match cache_args.command {
        CacheSubcommand::Inspect => inspect_cache(context),
        CacheSubcommand::Clear { all: true } => clear_all(context),
        CacheSubcommand::Clear { all: false } => clear_current(context),
    }
}

// --- Subcommand Logic ---

fn resolve_script(context: &AppContext) -> Result<PathBuf> {
    let location = context.block_on(paths::resolve(&context.script_path))?;
    Ok(location.resolved.unwrap_or_else(|| PathBuf::from(&location.raw)))
}

fn inspect_cache(context: &AppContext) -> Result<()> {
    let script = resolve_script(context)?;
    let cache = context.session.cache();
    let key = context.block_on(cache.compute_key(&script, context.settings.cache_key))?;

    println!("\n{} '{}'", t!("cache.inspect.title"), script.display().to_string().cyan());
    println!("  {:<15} {}", t!("cache.label.key").blue(), key);
    println!(
        "  {:<15} {}",
        t!("cache.label.file").blue(),
        context.store.entry_path(&key).display()
    );

    match context.block_on(cache.get(&key)) {
        Some(names) => {
            println!("\n--- {} ---", t!("cache.inspect.content").green());
            println!("{}", serde_json::to_string_pretty(&names)?);
        }
        None => println!("\n{}", t!("cache.inspect.missing").yellow()),
    }
    Ok(())
}

fn clear_current(context: &AppContext) -> Result<()> {
    let script = resolve_script(context)?;
    let cache = context.session.cache();
    let key = context.block_on(cache.compute_key(&script, context.settings.cache_key))?;

    println!("\n{} '{}'", t!("cache.clear.title"), script.display().to_string().cyan());
    println!(
        "  {:<15} {}",
        t!("cache.label.file").blue(),
        context.store.entry_path(&key).display()
    );

    let existed = context.block_on(cache.get(&key)).is_some();
    context.block_on(cache.remove(&key))?;

    if existed {
        println!("\n{}", t!("cache.clear.done").bold());
    } else {
        println!("\n{}", t!("cache.clear.nothing").yellow());
    }
    Ok(())
}

fn clear_all(context: &AppContext) -> Result<()> {
    let removed = context.store.clear()?;
    println!(
        "{}",
        format!(
            t!("cache.clear.all"),
            count = removed,
            dir = context.store.dir().display()
        )
        .bold()
    );
    Ok(())
}
