//! CLI for the nxm:// download proxy.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use nxmproxy_core::config::{self, ConfigStore, ServiceSettings};
use nxmproxy_core::installer::ExternalHandler;
use std::path::PathBuf;

use commands::{
    run_completions, run_game, run_handler, run_manager, run_resolve, run_send, run_serve,
    run_show, GameAction, ManagerAction,
};

/// Top-level CLI for the nxm:// download proxy.
#[derive(Debug, Parser)]
#[command(name = "nxmproxy")]
#[command(about = "Route nxm:// download links to the right mod manager", long_about = None)]
pub struct Cli {
    /// Route document to use instead of ~/.config/nxmproxy/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// External handler binary (default: nxmproxy-handler next to this executable).
    #[arg(long, global = true, value_name = "PATH")]
    pub handler: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the proxy service: listen on the download channel and forward URLs.
    ///
    /// Reads host signals from stdin, one per line: enable, disable,
    /// associate on|off, reload, quit. Writes host events to stdout.
    Serve {
        /// Start enabled regardless of settings.toml.
        #[arg(long)]
        enable: bool,
    },

    /// Check whether the proxy is the registered nxm:// handler.
    Test,

    /// Register the proxy as nxm:// handler (may prompt for elevation).
    Install,

    /// Remove the nxm:// handler registration.
    Uninstall,

    /// Print managers, pipes and game routes.
    Show {
        /// Print the route document as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show which manager handles a game id or nxm:// URL.
    Resolve {
        /// Game domain (e.g. skyrimspecialedition) or full nxm:// URL.
        target: String,
    },

    /// Add, change, rename or remove a download manager.
    ///
    /// Edits are written to the route document only. A running `serve` picks
    /// them up on a `reload` control line or SIGHUP.
    Manager {
        #[command(subcommand)]
        action: ManagerAction,
    },

    /// Add, change, rename or remove a game route.
    ///
    /// Edits are written to the route document only. A running `serve` picks
    /// them up on a `reload` control line or SIGHUP.
    Game {
        #[command(subcommand)]
        action: GameAction,
    },

    /// Send a URL to a running proxy's download channel.
    Send {
        /// Download URL (nxm://...).
        url: String,

        /// Channel address to use instead of the own manager's pipe.
        #[arg(long)]
        pipe: Option<String>,
    },

    /// Print shell completions.
    Completions {
        shell: Shell,
    },
}

/// Resolved paths and settings shared by the commands.
pub struct AppContext {
    pub store: ConfigStore,
    pub settings: ServiceSettings,
    pub handler: ExternalHandler,
}

impl AppContext {
    fn build(config_override: Option<PathBuf>, handler_override: Option<PathBuf>) -> Result<Self> {
        let settings = config::load_or_init_settings()?;
        tracing::debug!("loaded settings: {:?}", settings);

        let host_exe = std::env::current_exe().context("locate current executable")?;
        let store = match config_override {
            Some(path) => ConfigStore::at(path, host_exe),
            None => ConfigStore::open_default(host_exe)?,
        };

        let handler = match handler_override.or_else(|| settings.handler.clone()) {
            Some(path) => ExternalHandler::new(path),
            None => ExternalHandler::beside_current_exe().context("locate handler binary")?,
        };

        Ok(Self {
            store,
            settings,
            handler,
        })
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = cli.command {
            run_completions(shell);
            return Ok(());
        }
        let ctx = AppContext::build(cli.config, cli.handler)?;

        match cli.command {
            CliCommand::Serve { enable } => run_serve(ctx, enable).await?,
            CliCommand::Test => run_handler(&ctx, commands::HandlerCommand::Test).await?,
            CliCommand::Install => run_handler(&ctx, commands::HandlerCommand::Install).await?,
            CliCommand::Uninstall => run_handler(&ctx, commands::HandlerCommand::Uninstall).await?,
            CliCommand::Show { json } => run_show(&ctx, json)?,
            CliCommand::Resolve { target } => run_resolve(&ctx, &target)?,
            CliCommand::Manager { action } => run_manager(&ctx, action)?,
            CliCommand::Game { action } => run_game(&ctx, action)?,
            CliCommand::Send { url, pipe } => run_send(&ctx, &url, pipe.as_deref()).await?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
