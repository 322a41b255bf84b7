//! HTTP server startup and graceful shutdown.
//!
//! The service speaks plain HTTP; TLS is terminated by the platform in
//! front of the container.

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
pub use shutdown::shutdown_signal;
