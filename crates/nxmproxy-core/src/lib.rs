pub mod config;
pub mod dispatcher;
pub mod installer;
pub mod listener;
pub mod logging;
pub mod route;

pub use config::{ConfigStore, ProxyConfig, ServiceSettings};
pub use dispatcher::{DispatchEvent, Dispatcher, HostEvent, Notification};
pub use installer::{ExternalHandler, HandlerRunner, Installer};
pub use listener::Listener;
pub use route::{Resolution, RouteTable};
