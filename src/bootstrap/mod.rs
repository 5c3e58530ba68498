mod cleanup;
mod server;
mod shutdown;

pub use cleanup::CleanupTicker;
pub use server::Server;
pub use shutdown::{ShutdownManager, ShutdownState};
