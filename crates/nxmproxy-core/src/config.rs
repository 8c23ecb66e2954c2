//! Persisted route document (`config.toml`) and service settings (`settings.toml`).
//!
//! Both live under `~/.config/nxmproxy/`. The route document is the single
//! source of truth shared with the external handler binary, so keys and
//! values are written back exactly as they were read.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// XDG prefix for every file this crate owns.
pub const APP_PREFIX: &str = "nxmproxy";

/// Reserved game key routing every game that has no entry of its own.
pub const CATCH_ALL: &str = "_";

/// Manager id of the host application in the built-in default document.
pub const HOST_MANAGER: &str = "Vortex";

/// Channel name the host application listens on.
pub const HOST_PIPE: &str = "vortex_download";

/// Placeholder in launch-command templates replaced by the download URL.
pub const URL_PLACEHOLDER: &str = "%1";

/// The route document: game -> manager, manager -> launch command, manager -> pipe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Game domain -> manager id. `"_"` is the catch-all.
    #[serde(default)]
    pub games: BTreeMap<String, String>,
    /// Manager id -> launch-command template containing `%1`.
    #[serde(default)]
    pub managers: BTreeMap<String, String>,
    /// Manager id -> local channel address. Absent for command-only managers.
    #[serde(default)]
    pub pipes: BTreeMap<String, String>,
}

impl ProxyConfig {
    /// Document written on first run: the host handles everything via its own pipe.
    pub fn default_for(host_exe: &Path) -> Self {
        let mut cfg = ProxyConfig::default();
        cfg.games
            .insert(CATCH_ALL.to_string(), HOST_MANAGER.to_string());
        cfg.managers.insert(
            HOST_MANAGER.to_string(),
            format!("\"{}\" --download {}", host_exe.display(), URL_PLACEHOLDER),
        );
        cfg.pipes
            .insert(HOST_MANAGER.to_string(), HOST_PIPE.to_string());
        cfg
    }

    pub fn from_toml(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(data)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Failure to persist the route document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("create config dir {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Reads and atomically rewrites the route document at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    host_exe: PathBuf,
}

impl ConfigStore {
    /// Store at `~/.config/nxmproxy/config.toml`. `host_exe` is used for the default document.
    pub fn open_default(host_exe: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::at(config_path()?, host_exe))
    }

    /// Store at an explicit path (tests, `--config`).
    pub fn at(path: impl Into<PathBuf>, host_exe: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            host_exe: host_exe.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_config(&self) -> ProxyConfig {
        ProxyConfig::default_for(&self.host_exe)
    }

    /// Load the document. A missing or unreadable file is a first run: the
    /// default is written out and returned. Never fails.
    pub fn load(&self) -> ProxyConfig {
        let reason = match fs::read_to_string(&self.path) {
            Ok(data) => match ProxyConfig::from_toml(&data) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    self.keep_unparsable_copy();
                    format!("parse: {}", e)
                }
            },
            Err(e) => format!("read: {}", e),
        };

        tracing::info!(path = %self.path.display(), "using default config ({})", reason);
        let cfg = self.default_config();
        if let Err(e) = self.save(&cfg) {
            tracing::warn!("could not persist default config: {}", e);
        }
        cfg
    }

    /// Replace the whole document on disk (write `.part`, then rename over the target).
    pub fn save(&self, cfg: &ProxyConfig) -> Result<(), StoreError> {
        let toml = cfg.to_toml()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let tmp = temp_path(&self.path);
        fs::write(&tmp, toml).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Write {
                path: self.path.clone(),
                source,
            });
        }
        tracing::debug!(path = %self.path.display(), "saved config");
        Ok(())
    }

    /// An unparsable document is about to be replaced; keep it next to the target as `.bad`.
    fn keep_unparsable_copy(&self) {
        let mut bad = self.path.as_os_str().to_owned();
        bad.push(".bad");
        let bad = PathBuf::from(bad);
        match fs::copy(&self.path, &bad) {
            Ok(_) => tracing::warn!("unparsable config kept at {}", bad.display()),
            Err(e) => tracing::warn!("could not keep unparsable config: {}", e),
        }
    }
}

/// `file.toml` -> `file.toml.part`.
fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(".part");
    PathBuf::from(o)
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_PREFIX)?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

pub fn settings_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_PREFIX)?;
    Ok(xdg_dirs.place_config_file("settings.toml")?)
}

/// Service settings loaded from `~/.config/nxmproxy/settings.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Whether the proxy starts enabled (listening and associated).
    #[serde(default)]
    pub enabled: bool,
    /// Manager id whose pipe this service listens on.
    #[serde(default = "default_self_manager")]
    pub self_manager: String,
    /// External handler binary; if missing, `nxmproxy-handler` next to the executable.
    #[serde(default)]
    pub handler: Option<PathBuf>,
}

fn default_self_manager() -> String {
    HOST_MANAGER.to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            self_manager: default_self_manager(),
            handler: None,
        }
    }
}

/// Load settings from disk, creating a default file if none exists.
pub fn load_or_init_settings() -> Result<ServiceSettings> {
    load_or_init_settings_at(&settings_path()?)
}

pub fn load_or_init_settings_at(path: &Path) -> Result<ServiceSettings> {
    if !path.exists() {
        let default_settings = ServiceSettings::default();
        let toml = toml::to_string_pretty(&default_settings)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default settings at {}", path.display());
        return Ok(default_settings);
    }

    let data = fs::read_to_string(path)?;
    let settings: ServiceSettings = toml::from_str(&data)?;
    Ok(settings)
}
