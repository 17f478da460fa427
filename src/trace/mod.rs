// SPDX-License-Identifier: MIT
//! Trace provider resolution.
//!
//! A backend name plus [`TraceOptions`] resolves into a batching
//! [`TraceProvider`]:
//!
//! * `jaeger` – OTLP/HTTP to the Jaeger collector, resource tagged with
//!   `service.name`, `environment` and `version`.
//! * `zipkin` – Zipkin JSON over HTTP, same resource.
//! * `otlp` – gRPC (plaintext when insecure, TLS otherwise) or HTTP, resource
//!   with `service.name`, `library.language` and `service.version`, every
//!   span sampled.
//!
//! Option defaults come from `SERVICE_NAME`, `OTEL_EXPORTER_OTLP_ENDPOINT` and
//! `INSECURE_MODE`, read once per process.
//!
//! ```no_run
//! use service_telemetry::trace::{new_trace_provider, Protocol, TraceOptions};
//! # fn main() -> anyhow::Result<()> {
//! let provider = new_trace_provider(
//!     "otlp",
//!     TraceOptions::default()
//!         .with_name("checkout")
//!         .with_protocol(Protocol::Http)
//!         .with_url("http://localhost:4318"),
//! )?;
//! provider.install_global();
//! // ...
//! provider.shutdown()?;
//! # Ok(()) }
//! ```
mod options;
mod provider;

pub use options::{
    EnvDefaults, Protocol, TraceOption, TraceOptions, COLLECTOR_URL_VAR, INSECURE_MODE_VAR,
    SERVICE_NAME_VAR,
};
pub use provider::{
    new_trace_provider, Backend, ExporterPlan, TraceProvider, Transport, RESOURCE_SCHEMA_URL,
};
