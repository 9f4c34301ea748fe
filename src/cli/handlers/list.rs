use crate::cli::{args::ListArgs, handlers::commons::{self, AppContext}};
use anyhow::Result;
use colored::*;

/// Prints the zero-argument functions of the current script.
pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let list_args: ListArgs = commons::parse_args(&args)?;
    let report = context.configure(list_args.fresh)?;

    if report.names.is_empty() {
        println!(
            "{}",
            format!(t!("list.empty"), script = context.script_path).yellow()
        );
        return Ok(());
    }

    commons::print_names(&report.names, Some(report.origin), &context.script_path);
    Ok(())
}
