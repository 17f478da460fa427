// SPDX-License-Identifier: MIT
//! Logging and tracing bootstrap for Rust services.
//!
//! Two independent halves, usable on their own or together:
//!
//! * [`logger`] – a leveled, structured logger. Records go to a
//!   human-readable console pipeline and a JSON pipeline that fans out to any
//!   number of writers (including a size-rotated, gzip-compressed file)
//!   behind a size/time-buffered writer. Context-aware calls stamp records
//!   with the active trace and span ids.
//! * [`trace`] – resolves a backend name (`jaeger`, `zipkin`, `otlp`) and
//!   [`trace::TraceOptions`] into a batching OpenTelemetry tracer provider.
//!
//! [`telemetry::init_telemetry`] wires both into a global `tracing`
//! subscriber and returns a handle for orderly shutdown.
//!
//! # Quick Start
//! ```no_run
//! use service_telemetry::telemetry::{init_telemetry, TelemetryConfig};
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handle = init_telemetry(TelemetryConfig::default())?;
//!     // business logic
//!     handle.shutdown()?;
//!     Ok(())
//! }
//! ```
pub mod error;
pub mod logger;
pub mod telemetry;
pub mod trace;

pub use error::{Result, TelemetryError};
pub use logger::{new_logger, Logger, LoggerOptions};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryHandle};
pub use trace::{new_trace_provider, TraceOptions, TraceProvider};
