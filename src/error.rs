// SPDX-License-Identifier: MIT
//! Error type shared by the logger and trace-provider constructors.
use std::path::PathBuf;

use crate::trace::Backend;

/// Boxed error produced by an exporter or SDK component.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced while constructing or shutting down telemetry components.
///
/// All variants are construction-time failures returned to the caller, who
/// decides whether startup should abort. Nothing in this crate terminates the
/// process on error except the fatal/panic log levels.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid provider type: {0:?}")]
    InvalidProvider(String),

    #[error("invalid otel protocol: {0:?}")]
    InvalidProtocol(String),

    #[error("invalid log level: {0}")]
    InvalidLevel(i8),

    #[error("failed to create log directory {path}")]
    CreateLogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file {path}")]
    OpenLogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start log flusher")]
    Flusher(#[source] std::io::Error),

    #[error("failed to build {backend} exporter")]
    Exporter {
        backend: Backend,
        #[source]
        source: BoxError,
    },

    #[error("failed to shut down tracer provider")]
    Shutdown(#[source] BoxError),
}

impl TelemetryError {
    pub(crate) fn exporter<E>(backend: Backend, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TelemetryError::Exporter {
            backend,
            source: Box::new(err),
        }
    }
}

pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;
