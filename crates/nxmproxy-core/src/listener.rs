//! Local download channel: server (while the proxy is enabled) and client.
//!
//! Protocol: a client connects, writes one URL and closes its write half.
//! The payload is everything read up to end-of-stream. A connection that
//! fails before end-of-stream is dropped, so a truncated URL is never
//! forwarded.

use anyhow::{Context, Result};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::APP_PREFIX;

/// Called once per complete payload, from the connection's task.
pub type UrlCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("download channel {} is already in use by another process", .path.display())]
    AddrInUse { path: PathBuf },
    #[error("bind download channel {}: {source}", .path.display())]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Socket path for a channel address. Absolute paths are used as-is; a bare
/// name maps to `~/.local/state/nxmproxy/<name>.sock`.
pub fn channel_path(address: &str) -> Result<PathBuf> {
    let p = Path::new(address);
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_PREFIX)?;
    xdg_dirs
        .place_state_file(format!("{}.sock", address))
        .with_context(|| format!("state dir for channel {:?}", address))
}

/// A bound download channel. Dropping it stops accepting and removes the socket file.
pub struct Listener {
    path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    accept: Option<JoinHandle<()>>,
}

impl Listener {
    /// Bind `path` and start accepting. Fails if a live process already
    /// answers on it; a stale socket file left by a dead process is replaced.
    pub async fn start(path: impl AsRef<Path>, on_url: UrlCallback) -> Result<Self, ListenerError> {
        let path = path.as_ref().to_path_buf();
        if let Ok(meta) = std::fs::symlink_metadata(&path) {
            if !meta.file_type().is_socket() {
                return Err(ListenerError::Bind {
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "path exists and is not a socket",
                    ),
                    path,
                });
            }
            if UnixStream::connect(&path).await.is_ok() {
                return Err(ListenerError::AddrInUse { path });
            }
            let _ = std::fs::remove_file(&path);
        }
        let listener = UnixListener::bind(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::AddrInUse {
                ListenerError::AddrInUse { path: path.clone() }
            } else {
                ListenerError::Bind {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        tracing::info!(path = %path.display(), "download channel listening");

        let (tx, rx) = oneshot::channel();
        let accept = tokio::spawn(accept_loop(listener, on_url, rx));
        Ok(Self {
            path,
            shutdown: Some(tx),
            accept: Some(accept),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting and release the socket. Connections already accepted
    /// run to completion on their own tasks.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(accept) = self.accept.take() {
            let _ = accept.await;
        }
        tracing::info!(path = %self.path.display(), "download channel stopped");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(accept) = self.accept.take() {
            accept.abort();
        }
        match std::fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.file_type().is_socket() => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!("remove socket {}: {}", self.path.display(), e);
                }
            }
            Ok(_) => tracing::warn!("{} is no longer a socket, leaving it", self.path.display()),
            Err(_) => {}
        }
    }
}

async fn accept_loop(listener: UnixListener, on_url: UrlCallback, mut shutdown: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let on_url = Arc::clone(&on_url);
                    tokio::spawn(async move {
                        if let Some(url) = read_payload(stream).await {
                            tracing::debug!("got url: {}", url);
                            on_url(url);
                        }
                    });
                }
                Err(e) => tracing::debug!("download channel accept: {}", e),
            },
        }
    }
}

/// Read one payload up to end-of-stream. `None` on a transport error or when
/// nothing was sent (e.g. a liveness probe).
pub async fn read_payload<R: AsyncRead + Unpin>(mut reader: R) -> Option<String> {
    let mut buf = Vec::new();
    match reader.read_to_end(&mut buf).await {
        Ok(0) => {
            tracing::debug!("empty connection on download channel");
            None
        }
        Ok(_) => Some(String::from_utf8_lossy(&buf).into_owned()),
        Err(e) => {
            tracing::debug!("dropping partial payload ({} bytes): {}", buf.len(), e);
            None
        }
    }
}

/// Deliver `url` to the channel at `path` and close the connection.
pub async fn send_url(path: &Path, url: &str) -> Result<()> {
    let mut stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("connect {}", path.display()))?;
    stream.write_all(url.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
