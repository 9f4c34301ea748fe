// src/cli/args.rs
use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)] // The action name has already been consumed by the dispatcher.
pub struct ListArgs {
    /// Ignore the cache and parse the script again.
    #[arg(long, short)]
    pub fresh: bool,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct SearchArgs {
    /// Text to look for in function names, ignoring case. Empty lists everything.
    #[arg(default_value = "")]
    pub query: String,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct RunArgs {
    /// The function to run, as listed by `psfunc list`.
    pub name: String,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct PickArgs {
    /// Pre-filter the menu with a search query.
    pub query: Option<String>,
}

/// (Internal) Inspect or clear the cached function lists.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, hide = true)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// Prints the cache key of the current script and what is stored under it.
    Inspect,
    /// Removes the entry of the current script, or every entry with `--all`.
    Clear {
        #[arg(long)]
        all: bool,
    },
}
