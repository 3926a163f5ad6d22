//! Reliquary Infrastructure Library
//!
//! Shared process setup for the Reliquary binaries: tracing subscriber
//! initialisation with text or JSON output.

pub mod telemetry;

// Re-export commonly used types
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};
