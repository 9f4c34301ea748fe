use crate::cli::{args::RunArgs, handlers::commons::{self, AppContext}};
use anyhow::Result;

/// Runs one function by name. The dispatcher also routes `psfunc <function>`
/// here, with the function name as the first argument.
pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let run_args: RunArgs = commons::parse_args(&args)?;
    context.configure(false)?;
    context.run_function(&run_args.name)
}
