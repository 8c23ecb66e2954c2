//! Process-wide lifecycle owner.
//!
//! The dispatcher owns the enabled flag, the live route document and the
//! download channel. Host signals arrive as [`DispatchEvent`]s, and what the
//! host must act on leaves as [`HostEvent`]s. All state changes happen on
//! the dispatcher's task, so saves are never concurrent. Installer calls run
//! on the blocking pool and never stall the listener.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::config::{ConfigStore, ProxyConfig};
use crate::installer::{AssociationState, EnsureOutcome, HandlerRunner, InstallError, Installer};
use crate::listener::{channel_path, Listener, UrlCallback};
use crate::route::validate_submission;

/// Inbound host signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// The proxy's own enabled flag changed.
    EnabledChanged(bool),
    /// The host's regular nxm:// association flag changed.
    CompetingAssociationChanged(bool),
    /// Full replacement document from an editor. Last submission wins.
    SubmitConfig(ProxyConfig),
    ReloadConfig,
    Shutdown,
}

/// Outbound notifications for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Raw payload from the download channel, unmodified.
    UrlReceived(String),
    /// Set the host's regular association flag.
    SetCompetingAssociation(bool),
    /// The proxy switched its own enabled flag (mutual exclusion).
    EnabledChanged(bool),
    Notify(Notification),
}

/// User-visible, non-fatal failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    fn new(title: &str, message: impl ToString) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
        }
    }
}

/// At most one of the proxy and the host's regular handling is enabled.
pub fn next_enabled(own: bool, competing: bool) -> bool {
    own && !competing
}

pub struct Dispatcher<R> {
    enabled: bool,
    competing: bool,
    config: ProxyConfig,
    store: ConfigStore,
    installer: Arc<Mutex<Installer<R>>>,
    listener: Option<Listener>,
    self_manager: String,
    host: mpsc::UnboundedSender<HostEvent>,
    urls_tx: mpsc::UnboundedSender<String>,
    urls_rx: mpsc::UnboundedReceiver<String>,
}

impl<R: HandlerRunner + 'static> Dispatcher<R> {
    /// Loads the route document from `store`. Starts disabled.
    pub fn new(
        store: ConfigStore,
        runner: R,
        self_manager: impl Into<String>,
        host: mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        let config = store.load();
        let (urls_tx, urls_rx) = mpsc::unbounded_channel();
        Self {
            enabled: false,
            competing: false,
            config,
            store,
            installer: Arc::new(Mutex::new(Installer::new(runner))),
            listener: None,
            self_manager: self_manager.into(),
            host,
            urls_tx,
            urls_rx,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Copy of the live document for editors.
    pub fn snapshot(&self) -> ProxyConfig {
        self.config.clone()
    }

    pub fn listening_on(&self) -> Option<&std::path::Path> {
        self.listener.as_ref().map(|l| l.path())
    }

    pub fn association_state(&self) -> AssociationState {
        self.installer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    /// Event loop. Returns after `Shutdown` or when every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<DispatchEvent>) {
        loop {
            tokio::select! {
                ev = events.recv() => match ev {
                    None | Some(DispatchEvent::Shutdown) => break,
                    Some(ev) => self.handle(ev).await,
                },
                Some(url) = self.urls_rx.recv() => self.forward(url),
            }
        }
        self.stop_listener().await;
        tracing::debug!("dispatcher stopped");
    }

    pub async fn handle(&mut self, event: DispatchEvent) {
        tracing::debug!(?event, "dispatch");
        match event {
            DispatchEvent::EnabledChanged(on) => self.set_enabled(on).await,
            DispatchEvent::CompetingAssociationChanged(on) => self.competing_changed(on).await,
            DispatchEvent::SubmitConfig(cfg) => self.submit(cfg).await,
            DispatchEvent::ReloadConfig => {
                self.config = self.store.load();
                self.refresh_listener().await;
            }
            DispatchEvent::Shutdown => self.stop_listener().await,
        }
    }

    async fn set_enabled(&mut self, on: bool) {
        if on == self.enabled {
            return;
        }
        self.enabled = on;
        if on {
            self.activate().await;
        } else {
            // The association stays registered; only local forwarding stops.
            self.stop_listener().await;
        }
    }

    async fn competing_changed(&mut self, on: bool) {
        self.competing = on;
        let next = next_enabled(self.enabled, on);
        if next != self.enabled {
            tracing::info!("regular nxm handling enabled, disabling proxy");
            self.set_enabled(next).await;
            self.emit(HostEvent::EnabledChanged(next));
        }
    }

    async fn activate(&mut self) {
        match self.ensure_active().await {
            Ok(outcome) => {
                if outcome == EnsureOutcome::Installed || self.competing {
                    self.competing = false;
                    self.emit(HostEvent::SetCompetingAssociation(false));
                }
                self.start_listener().await;
            }
            Err(e) => self.notify("Failed to activate NXM proxy", e),
        }
    }

    async fn ensure_active(&self) -> Result<EnsureOutcome, InstallError> {
        let installer = Arc::clone(&self.installer);
        let joined = tokio::task::spawn_blocking(move || {
            installer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .ensure_active()
        })
        .await;
        match joined {
            Ok(result) => result,
            Err(e) => Err(InstallError::Launch {
                path: PathBuf::new(),
                source: std::io::Error::other(e),
            }),
        }
    }

    fn own_channel(&self) -> Option<PathBuf> {
        let pipe = self.config.pipes.get(&self.self_manager)?;
        match channel_path(pipe) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("channel address {:?}: {:#}", pipe, e);
                None
            }
        }
    }

    async fn start_listener(&mut self) {
        let Some(path) = self.own_channel() else {
            self.notify(
                "NXM proxy not listening",
                format!("manager {:?} has no usable pipe", self.self_manager),
            );
            return;
        };
        let tx = self.urls_tx.clone();
        let on_url: UrlCallback = Arc::new(move |url| {
            let _ = tx.send(url);
        });
        match Listener::start(&path, on_url).await {
            Ok(l) => self.listener = Some(l),
            Err(e) => self.notify("NXM proxy not listening", e),
        }
    }

    async fn stop_listener(&mut self) {
        if let Some(l) = self.listener.take() {
            l.stop().await;
        }
    }

    /// Rebind if the own pipe moved after a config change.
    async fn refresh_listener(&mut self) {
        if !self.enabled {
            return;
        }
        let wanted = self.own_channel();
        if self.listening_on().map(|p| p.to_path_buf()) == wanted {
            return;
        }
        self.stop_listener().await;
        self.start_listener().await;
    }

    async fn submit(&mut self, cfg: ProxyConfig) {
        let warnings = match validate_submission(&cfg) {
            Ok(w) => w,
            Err(e) => {
                self.notify("Config rejected", e);
                return;
            }
        };
        for w in &warnings {
            tracing::warn!("{}", w);
        }
        if let Err(e) = self.store.save(&cfg) {
            self.notify("Failed to save NXM proxy config", e);
            return;
        }
        self.config = cfg;
        self.refresh_listener().await;
    }

    fn forward(&self, url: String) {
        if self.enabled {
            self.emit(HostEvent::UrlReceived(url));
        } else {
            tracing::debug!("dropping url received while disabled");
        }
    }

    fn notify(&self, title: &str, err: impl std::fmt::Display) {
        tracing::warn!("{}: {}", title, err);
        self.emit(HostEvent::Notify(Notification::new(title, err)));
    }

    fn emit(&self, event: HostEvent) {
        let _ = self.host.send(event);
    }
}
