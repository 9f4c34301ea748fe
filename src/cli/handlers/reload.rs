use crate::cli::handlers::commons::{self, AppContext};
use anyhow::{Result, anyhow};
use colored::*;

/// Drops the cached list of the current script and parses it again.
pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    if let Some(unexpected) = args.first() {
        return Err(anyhow!(t!("reload.error.unexpected_arg"), arg = unexpected));
    }

    let summary = context.reload()?;

    println!(
        "{}",
        format!(
            t!("reload.success"),
            count = summary.count,
            origin = summary.origin
        )
        .green()
    );
    commons::print_names(&context.session.names(), None, &context.script_path);
    Ok(())
}
