use anyhow::Result;

use crate::{
    CancellationToken,
    cli::{
        Cli,
        handlers::{self, commons::AppContext},
    },
};

// --- Command Definition and Registry ---

/// A system command, its aliases, and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &AppContext) -> Result<()>,
}

/// The single source of truth for all system commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "list",
        aliases: &["ls"],
        handler: handlers::list::handle,
    },
    CommandDefinition {
        name: "search",
        aliases: &["find"],
        handler: handlers::search::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &[],
        handler: handlers::run::handle,
    },
    CommandDefinition {
        name: "reload",
        aliases: &[],
        handler: handlers::reload::handle,
    },
    CommandDefinition {
        name: "pick",
        aliases: &[],
        handler: handlers::pick::handle,
    },
    CommandDefinition {
        name: "_cache",
        aliases: &[],
        handler: handlers::debug_cache::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Routes the parsed command line to a handler.
///
/// - `psfunc` opens the interactive picker.
/// - `psfunc <action> [args...]` runs a registered action.
/// - `psfunc <function>` is a shortcut for `psfunc run <function>`.
pub fn dispatch(cli: Cli, cancellation_token: CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let context = AppContext::new(cli.script, cancellation_token)?;
    let mut args = cli.args.into_iter();

    let Some(action) = args.next() else {
        return handlers::pick::handle(Vec::new(), &context);
    };

    match find_command(&action) {
        Some(command) => (command.handler)(args.collect(), &context),
        None => {
            let mut run_args = vec![action];
            run_args.extend(args);
            handlers::run::handle(run_args, &context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_command_by_name_and_alias() {
        assert_eq!(find_command("list").map(|c| c.name), Some("list"));
        assert_eq!(find_command("ls").map(|c| c.name), Some("list"));
        assert_eq!(find_command("find").map(|c| c.name), Some("search"));
        assert!(find_command("Get-Status").is_none());
    }

    #[test]
    fn test_registry_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for command in COMMAND_REGISTRY {
            assert!(seen.insert(command.name), "duplicate command '{}'", command.name);
            for alias in command.aliases {
                assert!(seen.insert(*alias), "duplicate alias '{}'", alias);
            }
        }
    }
}
