//! `nxmproxy test|install|uninstall` – drive the external handler binary directly.

use anyhow::{bail, Context, Result};
use nxmproxy_core::installer::{EnsureOutcome, Installer};

use crate::cli::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerCommand {
    Test,
    Install,
    Uninstall,
}

pub async fn run_handler(ctx: &AppContext, command: HandlerCommand) -> Result<()> {
    let mut installer = Installer::new(ctx.handler.clone().interactive());
    let path = ctx.handler.path().display().to_string();
    tracing::debug!(handler = %path, ?command, "handler command");

    // The handler may wait on an elevation prompt; keep it off the runtime threads.
    let message = tokio::task::spawn_blocking(move || -> Result<String> {
        match command {
            HandlerCommand::Test => {
                if !installer.test() {
                    bail!("nxmproxy is not the registered nxm:// handler");
                }
                Ok("nxmproxy is the registered nxm:// handler".to_string())
            }
            HandlerCommand::Install => match installer.ensure_active()? {
                EnsureOutcome::AlreadyRegistered => Ok("Already registered".to_string()),
                EnsureOutcome::Installed => Ok("Registered as nxm:// handler".to_string()),
            },
            HandlerCommand::Uninstall => {
                installer.uninstall()?;
                Ok("Unregistered nxm:// handler".to_string())
            }
        }
    })
    .await
    .context("handler task")?
    .with_context(|| format!("handler {}", path))?;

    println!("{message}");
    Ok(())
}
