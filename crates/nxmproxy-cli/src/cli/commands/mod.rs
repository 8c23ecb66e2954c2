//! CLI command handlers. Each command is in its own file.

mod completions;
mod edit;
mod handler;
mod send;
mod serve;
mod show;

pub use completions::run_completions;
pub use edit::{run_game, run_manager, GameAction, ManagerAction};
pub use handler::{run_handler, HandlerCommand};
pub use send::run_send;
pub use serve::run_serve;
pub use show::{run_resolve, run_show};
