//! Authorization dispatcher.

mod auth;

pub use auth::{AuthService, CleanupReport};
