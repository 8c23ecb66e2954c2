//! In-memory route table over a [`ProxyConfig`].
//!
//! Edits are plain map operations with no side effects; persisting the result
//! is the caller's job. The table trusts its caller: removing the catch-all
//! route or pointing a game at an unknown manager is allowed here and only
//! checked by [`validate_submission`].

use std::cmp::Ordering;
use thiserror::Error;
use url::Url;

use crate::config::{ProxyConfig, CATCH_ALL, URL_PLACEHOLDER};

/// Outcome of looking up the manager for a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The game has its own entry.
    Specific(String),
    /// No entry for the game; the `"_"` entry applies.
    CatchAll(String),
    NoRoute,
}

impl Resolution {
    pub fn manager(&self) -> Option<&str> {
        match self {
            Resolution::Specific(m) | Resolution::CatchAll(m) => Some(m),
            Resolution::NoRoute => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    config: ProxyConfig,
}

impl RouteTable {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn into_config(self) -> ProxyConfig {
        self.config
    }

    /// Upsert a manager. An empty or absent pipe drops any pipe entry for `id`.
    pub fn set_manager(&mut self, id: &str, command: &str, pipe: Option<&str>) {
        self.config
            .managers
            .insert(id.to_string(), command.to_string());
        match pipe.filter(|p| !p.is_empty()) {
            Some(p) => {
                self.config.pipes.insert(id.to_string(), p.to_string());
            }
            None => {
                self.config.pipes.remove(id);
            }
        }
    }

    /// Remove a manager and its pipe. Games pointing at it are left dangling.
    pub fn remove_manager(&mut self, id: &str) {
        self.config.managers.remove(id);
        self.config.pipes.remove(id);
    }

    /// Rename a manager, replacing its command and pipe. Game routes are not rewritten.
    pub fn rename_manager(&mut self, old: &str, new: &str, command: &str, pipe: Option<&str>) {
        if old != new {
            self.remove_manager(old);
        }
        self.set_manager(new, command, pipe);
    }

    pub fn set_game(&mut self, id: &str, manager: &str) {
        self.config
            .games
            .insert(id.to_string(), manager.to_string());
    }

    pub fn remove_game(&mut self, id: &str) {
        self.config.games.remove(id);
    }

    pub fn rename_game(&mut self, old: &str, new: &str, manager: &str) {
        if old != new {
            self.remove_game(old);
        }
        self.set_game(new, manager);
    }

    pub fn resolve(&self, game: &str) -> Resolution {
        if let Some(m) = self.config.games.get(game) {
            return Resolution::Specific(m.clone());
        }
        match self.config.games.get(CATCH_ALL) {
            Some(m) => Resolution::CatchAll(m.clone()),
            None => Resolution::NoRoute,
        }
    }

    /// Resolve the game domain of an `nxm://<game>/mods/...` URL.
    pub fn resolve_url(&self, url: &str) -> Result<Resolution, RouteError> {
        Ok(self.resolve(&game_domain(url)?))
    }

    /// Launch command for `manager` with the placeholder replaced by `url`.
    pub fn launch_command(&self, manager: &str, url: &str) -> Option<String> {
        self.config
            .managers
            .get(manager)
            .map(|tpl| tpl.replace(URL_PLACEHOLDER, url))
    }

    pub fn pipe_for(&self, manager: &str) -> Option<&str> {
        self.config.pipes.get(manager).map(String::as_str)
    }

    /// Game ids for display: lexicographic, with the catch-all last.
    pub fn game_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.config.games.keys().map(String::as_str).collect();
        ids.sort_by(|a, b| by_game_id(a, b));
        ids
    }

    pub fn manager_ids(&self) -> Vec<&str> {
        self.config.managers.keys().map(String::as_str).collect()
    }

    /// Games whose manager has no entry in `managers`.
    pub fn dangling_games(&self) -> Vec<(&str, &str)> {
        self.game_ids()
            .into_iter()
            .filter_map(|g| {
                let m = self.config.games.get(g)?;
                (!self.config.managers.contains_key(m)).then_some((g, m.as_str()))
            })
            .collect()
    }
}

fn by_game_id(lhs: &str, rhs: &str) -> Ordering {
    match (lhs == CATCH_ALL, rhs == CATCH_ALL) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => lhs.cmp(rhs),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid url {0:?}")]
    InvalidUrl(String),
    #[error("not an nxm:// url: {0:?}")]
    NotNxm(String),
    #[error("url has no game domain: {0:?}")]
    NoGame(String),
}

/// Game domain (the host part) of an `nxm://` URL, lowercased.
pub fn game_domain(url: &str) -> Result<String, RouteError> {
    let parsed = Url::parse(url.trim()).map_err(|_| RouteError::InvalidUrl(url.to_string()))?;
    if !parsed.scheme().eq_ignore_ascii_case("nxm") {
        return Err(RouteError::NotNxm(url.to_string()));
    }
    match parsed.host_str() {
        Some(h) if !h.is_empty() => Ok(h.to_ascii_lowercase()),
        _ => Err(RouteError::NoGame(url.to_string())),
    }
}

/// Rejected edit submission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("manager id must not be empty")]
    EmptyManagerId,
    #[error("game id must not be empty")]
    EmptyGameId,
}

/// Check a full replacement document before it becomes live.
/// Returns the dangling game routes (accepted, reported as warnings).
pub fn validate_submission(cfg: &ProxyConfig) -> Result<Vec<String>, SubmissionError> {
    if cfg.managers.keys().any(|k| k.is_empty()) {
        return Err(SubmissionError::EmptyManagerId);
    }
    if cfg.games.keys().any(|k| k.is_empty()) {
        return Err(SubmissionError::EmptyGameId);
    }
    let table = RouteTable::new(cfg.clone());
    Ok(table
        .dangling_games()
        .into_iter()
        .map(|(g, m)| format!("game {g:?} routes to unknown manager {m:?}"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let mut t = RouteTable::default();
        t.set_manager("Vortex", "\"/opt/vortex\" --download %1", Some("vortex_download"));
        t.set_manager("MO2", "mo2 \"%1\"", None);
        t.set_game("_", "Vortex");
        t.set_game("skyrimspecialedition", "MO2");
        t
    }

    #[test]
    fn resolve_prefers_specific_then_catch_all() {
        let t = table();
        assert_eq!(
            t.resolve("skyrimspecialedition"),
            Resolution::Specific("MO2".into())
        );
        assert_eq!(t.resolve("fallout4"), Resolution::CatchAll("Vortex".into()));
    }

    #[test]
    fn resolve_without_catch_all() {
        let mut t = table();
        t.remove_game("_");
        assert_eq!(t.resolve("fallout4"), Resolution::NoRoute);
        assert_eq!(t.resolve("fallout4").manager(), None);
        assert_eq!(
            t.resolve("skyrimspecialedition").manager(),
            Some("MO2")
        );
    }

    #[test]
    fn resolve_empty_table() {
        assert_eq!(RouteTable::default().resolve("anything"), Resolution::NoRoute);
    }

    #[test]
    fn set_manager_with_empty_pipe_removes_pipe() {
        let mut t = table();
        t.set_manager("Vortex", "vortex %1", Some(""));
        assert!(t.pipe_for("Vortex").is_none());
        assert_eq!(t.config().managers["Vortex"], "vortex %1");

        t.set_manager("Vortex", "vortex %1", Some("p"));
        assert_eq!(t.pipe_for("Vortex"), Some("p"));
        t.set_manager("Vortex", "vortex %1", None);
        assert!(!t.config().pipes.contains_key("Vortex"));
    }

    #[test]
    fn remove_manager_does_not_cascade() {
        let mut t = table();
        t.remove_manager("Vortex");
        assert!(!t.config().managers.contains_key("Vortex"));
        assert!(!t.config().pipes.contains_key("Vortex"));
        assert_eq!(t.config().games["_"], "Vortex");
        assert_eq!(t.dangling_games(), vec![("_", "Vortex")]);
    }

    #[test]
    fn remove_game_accepts_catch_all() {
        let mut t = table();
        t.remove_game("_");
        assert!(!t.config().games.contains_key("_"));
    }

    #[test]
    fn rename_manager_moves_entry() {
        let mut t = table();
        t.rename_manager("MO2", "ModOrganizer", "mo2 %1", Some("mo2_pipe"));
        assert!(!t.config().managers.contains_key("MO2"));
        assert_eq!(t.config().managers["ModOrganizer"], "mo2 %1");
        assert_eq!(t.pipe_for("ModOrganizer"), Some("mo2_pipe"));
        // game routes keep the old id
        assert_eq!(t.config().games["skyrimspecialedition"], "MO2");
    }

    #[test]
    fn rename_game_moves_entry() {
        let mut t = table();
        t.rename_game("skyrimspecialedition", "skyrim", "MO2");
        assert!(!t.config().games.contains_key("skyrimspecialedition"));
        assert_eq!(t.resolve("skyrim"), Resolution::Specific("MO2".into()));
    }

    #[test]
    fn game_ids_sort_catch_all_last() {
        let mut t = table();
        t.set_game("fallout4", "Vortex");
        t.set_game("cyberpunk2077", "Vortex");
        assert_eq!(
            t.game_ids(),
            vec!["cyberpunk2077", "fallout4", "skyrimspecialedition", "_"]
        );
    }

    #[test]
    fn launch_command_substitutes_url() {
        let t = table();
        let url = "nxm://skyrimspecialedition/mods/1/files/2?key=a&expires=3";
        assert_eq!(
            t.launch_command("MO2", url).unwrap(),
            format!("mo2 \"{url}\"")
        );
        assert!(t.launch_command("missing", url).is_none());
    }

    #[test]
    fn resolve_url_uses_game_domain() {
        let t = table();
        assert_eq!(
            t.resolve_url("nxm://SkyrimSpecialEdition/mods/266/files/1000").unwrap(),
            Resolution::Specific("MO2".into())
        );
        assert_eq!(
            t.resolve_url("nxm://GameDomain/mods/1/files/2").unwrap(),
            Resolution::CatchAll("Vortex".into())
        );
        assert!(matches!(
            t.resolve_url("https://example.com/x"),
            Err(RouteError::NotNxm(_))
        ));
        assert!(matches!(t.resolve_url("not a url"), Err(RouteError::InvalidUrl(_))));
    }

    #[test]
    fn validate_submission_rejects_empty_ids() {
        let mut cfg = table().into_config();
        assert!(validate_submission(&cfg).unwrap().is_empty());

        cfg.games.insert("fallout4".into(), "Gone".into());
        let warnings = validate_submission(&cfg).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Gone"));

        cfg.managers.insert(String::new(), "x %1".into());
        assert_eq!(
            validate_submission(&cfg),
            Err(SubmissionError::EmptyManagerId)
        );

        let mut cfg = table().into_config();
        cfg.games.insert(String::new(), "MO2".into());
        assert_eq!(validate_submission(&cfg), Err(SubmissionError::EmptyGameId));
    }
}
