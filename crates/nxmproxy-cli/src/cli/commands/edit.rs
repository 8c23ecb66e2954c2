//! `nxmproxy manager ...` / `nxmproxy game ...` – edit the route document.
//!
//! Each edit loads the document, applies one change, validates the result
//! and writes the whole document back.

use anyhow::{bail, Result};
use clap::Subcommand;
use nxmproxy_core::config::CATCH_ALL;
use nxmproxy_core::route::{validate_submission, RouteTable};

use crate::cli::AppContext;

#[derive(Debug, Subcommand)]
pub enum ManagerAction {
    /// Add or change a manager.
    Set {
        id: String,
        /// Launch command; %1 is replaced by the download URL.
        command: String,
        /// Pipe the manager listens on. Omit for command-only managers.
        #[arg(long)]
        pipe: Option<String>,
    },
    /// Remove a manager and its pipe. Games routed to it are kept.
    Remove { id: String },
    /// Rename a manager, keeping its command and pipe.
    Rename { old: String, new: String },
}

#[derive(Debug, Subcommand)]
pub enum GameAction {
    /// Route a game ("_" for everything else) to a manager.
    Set { game: String, manager: String },
    /// Remove a game route.
    Remove { game: String },
    /// Change the game id of a route.
    Rename { old: String, new: String },
}

pub fn run_manager(ctx: &AppContext, action: ManagerAction) -> Result<()> {
    let mut table = RouteTable::new(ctx.store.load());
    match action {
        ManagerAction::Set { id, command, pipe } => {
            if id.is_empty() {
                bail!("manager id must not be empty");
            }
            table.set_manager(&id, &command, pipe.as_deref());
            println!("Set manager {id}");
        }
        ManagerAction::Remove { id } => {
            if !table.config().managers.contains_key(&id) {
                bail!("no manager {:?}", id);
            }
            table.remove_manager(&id);
            println!("Removed manager {id}");
        }
        ManagerAction::Rename { old, new } => {
            let Some(command) = table.config().managers.get(&old).cloned() else {
                bail!("no manager {:?}", old);
            };
            let pipe = table.pipe_for(&old).map(str::to_string);
            table.rename_manager(&old, &new, &command, pipe.as_deref());
            println!("Renamed manager {old} to {new}");
        }
    }
    commit(ctx, table)
}

pub fn run_game(ctx: &AppContext, action: GameAction) -> Result<()> {
    let mut table = RouteTable::new(ctx.store.load());
    match action {
        GameAction::Set { game, manager } => {
            if !table.config().managers.contains_key(&manager) {
                bail!("no manager {:?}; add it with `nxmproxy manager set`", manager);
            }
            table.set_game(&game, &manager);
            println!("Routed {game} to {manager}");
        }
        GameAction::Remove { game } => {
            if game == CATCH_ALL {
                bail!("the catch-all route cannot be removed; route it elsewhere instead");
            }
            table.remove_game(&game);
            println!("Removed route for {game}");
        }
        GameAction::Rename { old, new } => {
            if old == CATCH_ALL || new == CATCH_ALL {
                bail!("the catch-all route cannot be renamed");
            }
            let Some(manager) = table.config().games.get(&old).cloned() else {
                bail!("no route for {:?}", old);
            };
            table.rename_game(&old, &new, &manager);
            println!("Renamed route {old} to {new}");
        }
    }
    commit(ctx, table)
}

fn commit(ctx: &AppContext, table: RouteTable) -> Result<()> {
    let cfg = table.into_config();
    for warning in validate_submission(&cfg)? {
        tracing::warn!("{}", warning);
        eprintln!("warning: {warning}");
    }
    ctx.store.save(&cfg)?;
    Ok(())
}
