//! Structured logging and optional OpenTelemetry span export.
//!
//! # Telemetry invariants
//!
//! - **No plaintext PII, envelopes or key material** in any span attribute or
//!   log field.
//! - Every formatted log line passes through [`fieldcrypt::redact`] before it
//!   reaches stdout, so a field that slips through is still scrubbed.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden
//!   by `RUST_LOG` when set.

pub mod init;
pub mod writer;

pub use init::{init_telemetry, shutdown_telemetry};
