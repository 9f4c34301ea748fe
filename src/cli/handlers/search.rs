use crate::cli::{args::SearchArgs, handlers::commons::{self, AppContext}};
use anyhow::Result;
use colored::*;

/// Prints the functions whose names contain the query, ignoring case.
pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let search_args: SearchArgs = commons::parse_args(&args)?;
    context.configure(false)?;

    let matches = context.session.search(&search_args.query);
    if matches.is_empty() {
        println!(
            "{}",
            format!(t!("search.no_match"), query = search_args.query).yellow()
        );
        return Ok(());
    }

    commons::print_names(&matches, None, &context.script_path);
    Ok(())
}
