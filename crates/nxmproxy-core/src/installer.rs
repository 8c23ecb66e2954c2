//! URL-scheme association through the external handler binary.
//!
//! The binary is invoked with a single mode argument (`test`, `install`,
//! `uninstall`) and only its exit status is used. Registration may need
//! elevated privileges; the binary prompts for that itself, so its stderr is
//! always ours and an interactive handler also gets our stdin. Calls block
//! until the binary exits, so async callers run them on `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Handler binary expected next to the running executable.
pub const HANDLER_BINARY: &str = "nxmproxy-handler";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerMode {
    /// Exit 0 iff this service is already the registered handler.
    Test,
    Install,
    Uninstall,
}

impl HandlerMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            HandlerMode::Test => "test",
            HandlerMode::Install => "install",
            HandlerMode::Uninstall => "uninstall",
        }
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to launch {}: {source}", .path.display())]
    Launch {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} {mode} exited with {}", .path.display(), exit_code(.code))]
    Exit {
        path: PathBuf,
        mode: &'static str,
        code: Option<i32>,
    },
}

fn exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Runs the handler binary in one mode. Implemented over a subprocess in
/// production and by scripted fakes in tests.
pub trait HandlerRunner: Send + Sync {
    fn run(&self, mode: HandlerMode) -> Result<(), InstallError>;
}

impl<T: HandlerRunner + ?Sized> HandlerRunner for Box<T> {
    fn run(&self, mode: HandlerMode) -> Result<(), InstallError> {
        (**self).run(mode)
    }
}

impl<T: HandlerRunner + ?Sized> HandlerRunner for std::sync::Arc<T> {
    fn run(&self, mode: HandlerMode) -> Result<(), InstallError> {
        (**self).run(mode)
    }
}

/// Runs the real external binary and waits for it to exit.
#[derive(Debug, Clone)]
pub struct ExternalHandler {
    path: PathBuf,
    interactive: bool,
}

impl ExternalHandler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interactive: false,
        }
    }

    /// Let the handler read our stdin, e.g. for a terminal password prompt.
    /// Not for `serve`, where stdin carries control lines.
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// `nxmproxy-handler` in the directory of the running executable.
    pub fn beside_current_exe() -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::new(dir.join(HANDLER_BINARY)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HandlerRunner for ExternalHandler {
    fn run(&self, mode: HandlerMode) -> Result<(), InstallError> {
        tracing::debug!(path = %self.path.display(), mode = mode.as_arg(), "running handler");
        let status = Command::new(&self.path)
            .arg(mode.as_arg())
            .stdin(if self.interactive {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| InstallError::Launch {
                path: self.path.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(InstallError::Exit {
                path: self.path.clone(),
                mode: mode.as_arg(),
                code: status.code(),
            })
        }
    }
}

/// Association state as seen by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssociationState {
    #[default]
    Unregistered,
    Probing,
    Registered,
    Failed,
}

/// What `ensure_active` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyRegistered,
    /// Registration ran; the competing association must be switched off.
    Installed,
}

pub struct Installer<R> {
    runner: R,
    state: AssociationState,
}

impl<R: HandlerRunner> Installer<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            state: AssociationState::Unregistered,
        }
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Self-check only; does not change state.
    pub fn test(&self) -> bool {
        match self.runner.run(HandlerMode::Test) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("handler test: {}", e);
                false
            }
        }
    }

    /// Test first so an already-registered handler never triggers an elevation prompt;
    /// install exactly once otherwise.
    pub fn ensure_active(&mut self) -> Result<EnsureOutcome, InstallError> {
        self.state = AssociationState::Probing;
        if self.test() {
            self.state = AssociationState::Registered;
            tracing::debug!("handler already registered");
            return Ok(EnsureOutcome::AlreadyRegistered);
        }
        match self.runner.run(HandlerMode::Install) {
            Ok(()) => {
                self.state = AssociationState::Registered;
                tracing::info!("registered as nxm:// handler");
                Ok(EnsureOutcome::Installed)
            }
            Err(e) => {
                self.state = AssociationState::Failed;
                tracing::warn!("handler install failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn uninstall(&mut self) -> Result<(), InstallError> {
        self.runner.run(HandlerMode::Uninstall)?;
        self.state = AssociationState::Unregistered;
        tracing::info!("unregistered nxm:// handler");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Scripted runner: fixed results per mode, records every call.
    #[derive(Default)]
    pub struct FakeRunner {
        pub test_ok: bool,
        pub install_ok: bool,
        pub uninstall_ok: bool,
        pub calls: Mutex<Vec<HandlerMode>>,
    }

    impl FakeRunner {
        pub fn new(test_ok: bool, install_ok: bool) -> Self {
            Self {
                test_ok,
                install_ok,
                uninstall_ok: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<HandlerMode> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HandlerRunner for FakeRunner {
        fn run(&self, mode: HandlerMode) -> Result<(), InstallError> {
            self.calls.lock().unwrap().push(mode);
            let ok = match mode {
                HandlerMode::Test => self.test_ok,
                HandlerMode::Install => self.install_ok,
                HandlerMode::Uninstall => self.uninstall_ok,
            };
            if ok {
                Ok(())
            } else {
                Err(InstallError::Exit {
                    path: PathBuf::from("fake"),
                    mode: mode.as_arg(),
                    code: Some(1),
                })
            }
        }
    }
}
