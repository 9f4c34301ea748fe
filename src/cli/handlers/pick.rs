use crate::cli::{args::PickArgs, handlers::commons::{self, AppContext}};
use anyhow::Result;
use colored::*;
use dialoguer::{Select, theme::ColorfulTheme};

/// Interactive menu over the function list; runs the selected entry.
pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let pick_args: PickArgs = commons::parse_args(&args)?;
    let report = context.configure(false)?;

    let names = match &pick_args.query {
        Some(query) => context.session.search(query),
        None => report.names,
    };
    if names.is_empty() {
        println!(
            "{}",
            format!(t!("list.empty"), script = context.script_path).yellow()
        );
        return Ok(());
    }

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("pick.prompt"))
        .items(&names)
        .default(0)
        .interact_opt()?;

    match selection.and_then(|index| names.get(index)) {
        Some(name) => context.run_function(name),
        None => {
            println!("{}", t!("pick.cancelled").dimmed());
            Ok(())
        }
    }
}
