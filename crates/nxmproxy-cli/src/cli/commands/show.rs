//! `nxmproxy show` and `nxmproxy resolve` – read-only views of the route document.

use anyhow::Result;
use nxmproxy_core::config::CATCH_ALL;
use nxmproxy_core::route::{Resolution, RouteTable};

use crate::cli::AppContext;

pub fn run_show(ctx: &AppContext, json: bool) -> Result<()> {
    let table = RouteTable::new(ctx.store.load());
    if json {
        println!("{}", serde_json::to_string_pretty(table.config())?);
        return Ok(());
    }

    let cfg = table.config();
    println!("{:<16} {:<20} {}", "MANAGER", "PIPE", "COMMAND");
    for id in table.manager_ids() {
        println!(
            "{:<16} {:<20} {}",
            id,
            table.pipe_for(id).unwrap_or("-"),
            cfg.managers[id]
        );
    }
    println!();
    println!("{:<28} {}", "GAME", "MANAGER");
    for game in table.game_ids() {
        let label = if game == CATCH_ALL {
            "<everything else>"
        } else {
            game
        };
        println!("{:<28} {}", label, cfg.games[game]);
    }
    for (game, manager) in table.dangling_games() {
        tracing::warn!("game {:?} routes to unknown manager {:?}", game, manager);
    }
    Ok(())
}

pub fn run_resolve(ctx: &AppContext, target: &str) -> Result<()> {
    let table = RouteTable::new(ctx.store.load());
    let is_url = target.contains("://");
    let resolution = if is_url {
        table.resolve_url(target)?
    } else {
        table.resolve(target)
    };

    let manager = match &resolution {
        Resolution::Specific(m) => {
            println!("{target} -> {m}");
            m
        }
        Resolution::CatchAll(m) => {
            println!("{target} -> {m} (everything else)");
            m
        }
        Resolution::NoRoute => {
            println!("{target} -> no route");
            return Ok(());
        }
    };
    if let Some(pipe) = table.pipe_for(manager) {
        println!("  pipe:    {pipe}");
    }
    let url = if is_url { target } else { "%1" };
    match table.launch_command(manager, url) {
        Some(cmd) => println!("  command: {cmd}"),
        None => println!("  command: - (manager {manager:?} is not configured)"),
    }
    Ok(())
}
