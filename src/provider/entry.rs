//! Command-line entry point of a plugin executable.
//!
//! The host runs `<exec> serve` for queries and
//! `<exec> grant-permission --caller <pkg>` to ask the user for access.

use std::ffi::OsString;
use std::io;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::endpoint::Endpoint;
use super::server::ProviderServer;
use crate::contract::AppIdentity;
use crate::permissions::{run_grant_flow, ConsentPrompt, PermissionManager, TerminalPrompt};

#[derive(Parser)]
#[command(about = "Launcher plugin endpoint", long_about = None)]
struct PluginCli {
    #[command(subcommand)]
    command: Option<PluginCommand>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum PluginCommand {
    /// Serve host requests on stdin/stdout (default)
    Serve,

    /// Ask the user whether a caller may access this plugin
    GrantPermission {
        /// Package name of the caller
        #[arg(long)]
        caller: String,

        /// Display name of the caller
        #[arg(long)]
        caller_label: Option<String>,
    },
}

/// Run a plugin executable with the process arguments. Returns the exit
/// code.
pub fn run_plugin_main(
    endpoint: Arc<dyn Endpoint>,
    permissions: Arc<PermissionManager>,
    plugin_label: &str,
) -> i32 {
    run_plugin(std::env::args_os(), endpoint, &permissions, plugin_label, &TerminalPrompt::stdio())
}

/// Run a plugin executable with explicit arguments and consent prompt.
pub fn run_plugin<I, T>(
    args: I,
    endpoint: Arc<dyn Endpoint>,
    permissions: &PermissionManager,
    plugin_label: &str,
    prompt: &dyn ConsentPrompt,
) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match PluginCli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return e.exit_code();
        }
    };

    // stdout carries the protocol; logs go to stderr
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .try_init();

    match cli.command.unwrap_or(PluginCommand::Serve) {
        PluginCommand::Serve => {
            let server = ProviderServer::new(endpoint);
            match server.serve(io::stdin().lock(), io::stdout()) {
                Ok(()) => 0,
                Err(e) => {
                    tracing::error!(error = %e, "Plugin server failed");
                    1
                }
            }
        }
        PluginCommand::GrantPermission { caller, caller_label } => {
            let label = caller_label.unwrap_or_else(|| caller.clone());
            let caller = AppIdentity::new(caller, label);
            match run_grant_flow(permissions, &caller, plugin_label, prompt) {
                Ok(outcome) => outcome.exit_code(),
                Err(e) => {
                    tracing::error!(error = %e, "Grant flow failed");
                    1
                }
            }
        }
    }
}
