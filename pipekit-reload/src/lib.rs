//! Live-reload server speaking the livereload protocol 7.

pub mod config;
pub mod server;

pub use config::ServerConfig;
pub use server::{create_router, start, LiveReloadHandle, RunningServer};
