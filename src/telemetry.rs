// SPDX-License-Identifier: MIT
//! One-call telemetry initialization (logger + tracer provider + `tracing`
//! subscriber).
//!
//! * [`TelemetryConfig`] – logger options, tracing backend and trace options.
//! * [`init_telemetry`] – builds both halves, installs the global tracer
//!   provider and the subscriber.
//! * [`TelemetryHandle`] – logger access and explicit synchronous shutdown.
//!
//! The installed subscriber stacks three layers on a [`Registry`]:
//!
//! * an [`EnvFilter`] read from `RUST_LOG` (falling back to
//!   [`TelemetryConfig::filter`]);
//! * the OpenTelemetry span layer, exporting `tracing` spans through the
//!   configured backend;
//! * the logger bridge, writing `tracing` events into the logger's sinks.
//!
//! # Example
//! ```no_run
//! use service_telemetry::telemetry::{init_telemetry, TelemetryConfig};
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handle = init_telemetry(TelemetryConfig::default())?;
//!     handle.logger().info("service started");
//!     // ... application logic ...
//!     handle.shutdown()?; // flush logs, export final spans
//!     Ok(())
//! }
//! ```
//!
//! # Shutdown
//! Call [`TelemetryHandle::shutdown`] before exiting the Tokio runtime to flush
//! any remaining batches. Buffered log records are also flushed when the last
//! logger clone is dropped, but span batches are only guaranteed on shutdown.
use anyhow::Result;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::logger::{new_logger, Logger, LoggerOptions};
use crate::trace::{Backend, TraceOptions, TraceProvider};

/// Filter directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Configuration used when initializing telemetry.
///
/// The trace half reads `SERVICE_NAME`, `OTEL_EXPORTER_OTLP_ENDPOINT` and
/// `INSECURE_MODE` through [`TraceOptions::default`]; the logger half uses
/// [`LoggerOptions::default`] (console plus stderr, debug level).
#[derive(Debug)]
pub struct TelemetryConfig {
    pub logger: LoggerOptions,
    pub backend: Backend,
    pub trace: TraceOptions,
    /// Instrumentation scope name of the span layer's tracer.
    pub tracer_name: &'static str,
    /// Fallback filter directive for the `tracing` subscriber.
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            logger: LoggerOptions::default(),
            backend: Backend::Otlp,
            trace: TraceOptions::default(),
            tracer_name: env!("CARGO_PKG_NAME"),
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

/// Handle returned by [`init_telemetry`].
///
/// Dropping the handle without calling [`TelemetryHandle::shutdown`] may lose
/// the final span batch.
pub struct TelemetryHandle {
    logger: Logger,
    tracer_provider: TraceProvider,
}

impl TelemetryHandle {
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn tracer_provider(&self) -> &TraceProvider {
        &self.tracer_provider
    }

    /// Flushes the logger and shuts the tracer provider down.
    ///
    /// Both steps always run. If either reports an error, a combined
    /// `anyhow::Error` naming each failing component is returned.
    pub fn shutdown(self) -> Result<()> {
        let mut errs = Vec::new();
        if let Err(e) = self.tracer_provider.shutdown() {
            errs.push(format!("tracer: {e:#}"));
        }
        if let Err(e) = self.logger.sync() {
            errs.push(format!("logger: {e}"));
        }
        if errs.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(errs.join(", "))
        }
    }
}

/// Initialize the logger, the tracer provider and the global `tracing`
/// subscriber.
///
/// # Errors
/// Returns an error if the logger or exporter cannot be built (e.g. an
/// unwritable log directory or an invalid endpoint URL), or if a global
/// subscriber is already installed.
pub fn init_telemetry(cfg: TelemetryConfig) -> Result<TelemetryHandle> {
    let logger = new_logger(cfg.logger)?;
    let tracer_provider = TraceProvider::new(cfg.backend, cfg.trace)?;
    tracer_provider.install_global();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter));

    Registry::default()
        .with(filter)
        .with(tracer_provider.tracing_layer(cfg.tracer_name))
        .with(logger.tracing_bridge())
        .try_init()?;

    tracing::debug!(
        target: "otel_lifecycle",
        backend = %tracer_provider.backend(),
        "telemetry initialized"
    );

    Ok(TelemetryHandle {
        logger,
        tracer_provider,
    })
}
