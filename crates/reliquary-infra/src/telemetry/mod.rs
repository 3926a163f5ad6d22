//! Tracing initialization
//!
//! Installs a `tracing-subscriber` registry filtered by `RUST_LOG`, writing
//! human-readable or JSON lines.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, LogFormat};
