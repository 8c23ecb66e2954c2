//! `nxmproxy serve` – run the dispatcher with stdin/stdout as the host boundary.
//!
//! Inbound, one per line: `enable`, `disable`, `associate on|off`, `reload`, `quit`.
//! Outbound, one per line: `url <payload>`, `associate off`, `enabled off`,
//! `notify <title>: <message>`.

use anyhow::Result;
use nxmproxy_core::dispatcher::{DispatchEvent, Dispatcher, HostEvent};
use std::io::BufRead;
use tokio::sync::mpsc;

use crate::cli::AppContext;

/// Parse one stdin control line. Ignores malformed lines.
pub(crate) fn parse_control_line(line: &str) -> Option<DispatchEvent> {
    let mut words = line.split_whitespace();
    let event = match (words.next()?, words.next()) {
        ("enable", None) => DispatchEvent::EnabledChanged(true),
        ("disable", None) => DispatchEvent::EnabledChanged(false),
        ("associate", Some("on")) => DispatchEvent::CompetingAssociationChanged(true),
        ("associate", Some("off")) => DispatchEvent::CompetingAssociationChanged(false),
        ("reload", None) => DispatchEvent::ReloadConfig,
        ("quit", None) => DispatchEvent::Shutdown,
        _ => return None,
    };
    words.next().is_none().then_some(event)
}

pub(crate) fn format_host_event(event: &HostEvent) -> String {
    let on_off = |b: bool| if b { "on" } else { "off" };
    match event {
        HostEvent::UrlReceived(url) => format!("url {url}"),
        HostEvent::SetCompetingAssociation(on) => format!("associate {}", on_off(*on)),
        HostEvent::EnabledChanged(on) => format!("enabled {}", on_off(*on)),
        HostEvent::Notify(n) => format!("notify {}: {}", n.title, n.message),
    }
}

pub async fn run_serve(ctx: AppContext, enable: bool) -> Result<()> {
    let (host_tx, mut host_rx) = mpsc::unbounded_channel::<HostEvent>();
    let (events_tx, events_rx) = mpsc::unbounded_channel::<DispatchEvent>();

    let AppContext {
        store,
        settings,
        handler,
    } = ctx;
    tracing::info!(
        config = %store.path().display(),
        handler = %handler.path().display(),
        "starting proxy service"
    );
    let dispatcher = Dispatcher::new(store, handler, settings.self_manager, host_tx);
    let service = tokio::spawn(dispatcher.run(events_rx));

    let initial = enable || settings.enabled;
    let _ = events_tx.send(DispatchEvent::EnabledChanged(initial));

    let printer = tokio::spawn(async move {
        while let Some(event) = host_rx.recv().await {
            tracing::debug!(?event, "host event");
            println!("{}", format_host_event(&event));
        }
    });

    spawn_control_reader(std::io::BufReader::new(std::io::stdin()), events_tx.clone());

    #[cfg(unix)]
    spawn_reload_on_hangup(events_tx.clone());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            let _ = events_tx.send(DispatchEvent::Shutdown);
        }
        // Dispatcher is gone, e.g. after `quit`.
        _ = events_tx.closed() => {}
    }
    service.await?;
    let _ = printer.await;
    Ok(())
}

/// Forward control lines from `input` until EOF or until the dispatcher is gone.
///
/// Runs on a detached thread: a blocking read cannot be cancelled, and the
/// runtime must be able to shut down while the host keeps stdin open.
pub(crate) fn spawn_control_reader<R>(input: R, events_tx: mpsc::UnboundedSender<DispatchEvent>)
where
    R: BufRead + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name("nxmproxy-stdin".into())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                match parse_control_line(&line) {
                    Some(ev) => {
                        if events_tx.send(ev).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => tracing::debug!("ignoring control line {:?}", line),
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("control reader thread: {}", e);
    }
}

/// SIGHUP reloads the route document from disk.
#[cfg(unix)]
fn spawn_reload_on_hangup(events_tx: mpsc::UnboundedSender<DispatchEvent>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("SIGHUP handler: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        while hup.recv().await.is_some() {
            tracing::info!("SIGHUP: reloading config");
            if events_tx.send(DispatchEvent::ReloadConfig).is_err() {
                break;
            }
        }
    });
}
