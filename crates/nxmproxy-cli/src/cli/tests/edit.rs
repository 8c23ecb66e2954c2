//! Tests for show, resolve, manager and game subcommands.

use super::parse;
use crate::cli::commands::{run_game, run_manager, GameAction, ManagerAction};
use crate::cli::{AppContext, CliCommand};

fn ctx_in(dir: &std::path::Path) -> AppContext {
    AppContext {
        store: nxmproxy_core::ConfigStore::at(dir.join("config.toml"), "/opt/vortex/Vortex"),
        settings: Default::default(),
        handler: nxmproxy_core::ExternalHandler::new("/bin/true"),
    }
}

#[test]
fn cli_parse_show() {
    match parse(&["nxmproxy", "show"]) {
        CliCommand::Show { json } => assert!(!json),
        _ => panic!("expected Show"),
    }
    match parse(&["nxmproxy", "show", "--json"]) {
        CliCommand::Show { json } => assert!(json),
        _ => panic!("expected Show --json"),
    }
}

#[test]
fn cli_parse_resolve() {
    match parse(&["nxmproxy", "resolve", "nxm://fallout4/mods/1/files/2"]) {
        CliCommand::Resolve { target } => assert_eq!(target, "nxm://fallout4/mods/1/files/2"),
        _ => panic!("expected Resolve"),
    }
}

#[test]
fn cli_parse_manager_set_with_pipe() {
    match parse(&[
        "nxmproxy",
        "manager",
        "set",
        "MO2",
        "\"/opt/mo2/nxmhandler\" %1",
        "--pipe",
        "mo2_download",
    ]) {
        CliCommand::Manager {
            action: ManagerAction::Set { id, command, pipe },
        } => {
            assert_eq!(id, "MO2");
            assert_eq!(command, "\"/opt/mo2/nxmhandler\" %1");
            assert_eq!(pipe.as_deref(), Some("mo2_download"));
        }
        _ => panic!("expected Manager Set"),
    }
}

#[test]
fn cli_parse_manager_remove_and_rename() {
    match parse(&["nxmproxy", "manager", "remove", "MO2"]) {
        CliCommand::Manager {
            action: ManagerAction::Remove { id },
        } => assert_eq!(id, "MO2"),
        _ => panic!("expected Manager Remove"),
    }
    match parse(&["nxmproxy", "manager", "rename", "MO2", "ModOrganizer"]) {
        CliCommand::Manager {
            action: ManagerAction::Rename { old, new },
        } => {
            assert_eq!(old, "MO2");
            assert_eq!(new, "ModOrganizer");
        }
        _ => panic!("expected Manager Rename"),
    }
}

#[test]
fn cli_parse_game_actions() {
    match parse(&["nxmproxy", "game", "set", "_", "Vortex"]) {
        CliCommand::Game {
            action: GameAction::Set { game, manager },
        } => {
            assert_eq!(game, "_");
            assert_eq!(manager, "Vortex");
        }
        _ => panic!("expected Game Set"),
    }
    assert!(matches!(
        parse(&["nxmproxy", "game", "remove", "fallout4"]),
        CliCommand::Game {
            action: GameAction::Remove { .. }
        }
    ));
}

#[test]
fn manager_and_game_edits_are_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx_in(dir.path());

    run_manager(
        &ctx,
        ManagerAction::Set {
            id: "MO2".into(),
            command: "mo2 \"%1\"".into(),
            pipe: Some("mo2_download".into()),
        },
    )
    .unwrap();
    run_game(
        &ctx,
        GameAction::Set {
            game: "skyrimspecialedition".into(),
            manager: "MO2".into(),
        },
    )
    .unwrap();

    let cfg = ctx.store.load();
    assert_eq!(cfg.managers["MO2"], "mo2 \"%1\"");
    assert_eq!(cfg.pipes["MO2"], "mo2_download");
    assert_eq!(cfg.games["skyrimspecialedition"], "MO2");
    assert_eq!(cfg.games["_"], "Vortex");

    run_manager(
        &ctx,
        ManagerAction::Rename {
            old: "MO2".into(),
            new: "ModOrganizer".into(),
        },
    )
    .unwrap();
    let cfg = ctx.store.load();
    assert_eq!(cfg.pipes["ModOrganizer"], "mo2_download");
    assert!(!cfg.managers.contains_key("MO2"));
    // the route is left dangling, not rewritten
    assert_eq!(cfg.games["skyrimspecialedition"], "MO2");
}

#[test]
fn game_routes_require_known_manager() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx_in(dir.path());
    let err = run_game(
        &ctx,
        GameAction::Set {
            game: "fallout4".into(),
            manager: "Nope".into(),
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("Nope"));
    assert!(!ctx.store.load().games.contains_key("fallout4"));
}

#[test]
fn catch_all_route_cannot_be_removed_from_cli() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx_in(dir.path());
    assert!(run_game(&ctx, GameAction::Remove { game: "_".into() }).is_err());
    assert!(run_game(
        &ctx,
        GameAction::Rename {
            old: "_".into(),
            new: "fallout4".into()
        }
    )
    .is_err());
    assert_eq!(ctx.store.load().games["_"], "Vortex");
}

#[test]
fn edit_help_mentions_reload() {
    use clap::CommandFactory;
    let cmd = crate::cli::Cli::command();
    for name in ["manager", "game"] {
        let sub = cmd.find_subcommand(name).unwrap();
        let long = sub.get_long_about().map(|s| s.to_string()).unwrap_or_default();
        assert!(long.contains("reload"), "{name}: {long}");
    }
}
