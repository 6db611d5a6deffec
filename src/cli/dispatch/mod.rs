//! Map parsed CLI arguments to an [`Action`].

use crate::cli::actions::{Action, login, server};
use crate::cli::commands;
use anyhow::{Result, anyhow};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or no subcommand was given.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((commands::server::COMMAND, sub)) => {
            let options = commands::server::Options::parse(sub)?;
            Ok(Action::Server(server::Args::from(options)))
        }
        Some((commands::login::COMMAND, sub)) => {
            let options = commands::login::Options::parse(sub)?;
            Ok(Action::Login(login::Args::from(options)))
        }
        Some((name, _)) => Err(anyhow!("unknown command: {name}")),
        None => Err(anyhow!("missing command")),
    }
}
