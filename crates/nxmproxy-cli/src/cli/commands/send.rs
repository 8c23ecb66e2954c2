//! `nxmproxy send <url>` – deliver a URL to a running proxy.

use anyhow::{bail, Result};
use nxmproxy_core::listener::{channel_path, send_url};

use crate::cli::AppContext;

pub async fn run_send(ctx: &AppContext, url: &str, pipe: Option<&str>) -> Result<()> {
    let address = match pipe {
        Some(p) => p.to_string(),
        None => {
            let cfg = ctx.store.load();
            match cfg.pipes.get(&ctx.settings.self_manager) {
                Some(p) => p.clone(),
                None => bail!(
                    "manager {:?} has no pipe; pass --pipe",
                    ctx.settings.self_manager
                ),
            }
        }
    };
    let path = channel_path(&address)?;
    send_url(&path, url).await?;
    tracing::info!(channel = %path.display(), "sent url");
    Ok(())
}
