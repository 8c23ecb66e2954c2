//! Shell-script stand-in for the external handler binary.
//!
//! Appends each mode argument to a log file and exits with a per-mode status,
//! so tests can check both the result and the exact invocation sequence.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

static SERIAL: Mutex<()> = Mutex::new(());

/// Tests that write and exec a script take this for their whole run: a fork in
/// a parallel test can briefly hold the script open for writing (ETXTBSY).
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct FakeHandler {
    pub script: PathBuf,
    pub log: PathBuf,
}

impl FakeHandler {
    /// `test_exit` / `install_exit` are the exit codes for those modes; uninstall exits 0.
    pub fn create(dir: &Path, test_exit: i32, install_exit: i32) -> Self {
        let script = dir.join("nxmproxy-handler");
        let log = dir.join("handler.log");
        let body = format!(
            "#!/bin/sh\necho \"$1\" >> '{log}'\ncase \"$1\" in\n  test) exit {test_exit} ;;\n  install) exit {install_exit} ;;\n  *) exit 0 ;;\nesac\n",
            log = log.display(),
        );
        fs::write(&script, body).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        Self { script, log }
    }

    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
