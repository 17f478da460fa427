// SPDX-License-Identifier: MIT
use std::fmt;
use std::io;
use std::str::FromStr;
use std::thread;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::tonic_types::transport::ClientTlsConfig;
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use opentelemetry_zipkin::ZipkinExporter;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::registry::LookupSpan;

use super::options::{Protocol, TraceOptions};
use crate::error::{Result, TelemetryError};

/// Schema attached to the jaeger and zipkin resources.
pub const RESOURCE_SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.10.0";

const OTLP_TRACES_PATH: &str = "/v1/traces";

/// Tracing backend selected by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    Jaeger,
    Zipkin,
    Otlp,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Jaeger => "jaeger",
            Backend::Zipkin => "zipkin",
            Backend::Otlp => "otlp",
        }
    }
}

impl FromStr for Backend {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jaeger" => Ok(Backend::Jaeger),
            "zipkin" => Ok(Backend::Zipkin),
            "otlp" => Ok(Backend::Otlp),
            other => Err(TelemetryError::InvalidProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel security of the exporter client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Plaintext gRPC.
    Insecure,
    /// gRPC over TLS, trusting the system certificate store (the bundled
    /// web PKI roots when the host has none).
    Tls,
    /// HTTP client; the endpoint scheme decides.
    Scheme,
}

/// Exporter settings derived from a backend and its options, before any
/// client is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExporterPlan {
    pub backend: Backend,
    pub protocol: Protocol,
    pub transport: Transport,
    /// `None` leaves the exporter's own default endpoint in place.
    pub endpoint: Option<String>,
}

impl ExporterPlan {
    pub fn resolve(backend: Backend, options: &TraceOptions) -> Self {
        let url = options.url.trim();
        match backend {
            // Jaeger ingests OTLP natively; the collector is reached over HTTP.
            Backend::Jaeger => ExporterPlan {
                backend,
                protocol: Protocol::Http,
                transport: Transport::Scheme,
                endpoint: non_empty(url).map(http_traces_endpoint),
            },
            Backend::Zipkin => ExporterPlan {
                backend,
                protocol: Protocol::Http,
                transport: Transport::Scheme,
                endpoint: non_empty(url).map(str::to_string),
            },
            Backend::Otlp => match options.protocol {
                Protocol::Grpc => {
                    let transport = if options.insecure {
                        Transport::Insecure
                    } else {
                        Transport::Tls
                    };
                    let scheme = match transport {
                        Transport::Insecure => "http",
                        _ => "https",
                    };
                    ExporterPlan {
                        backend,
                        protocol: Protocol::Grpc,
                        transport,
                        endpoint: non_empty(url).map(|url| with_scheme(url, scheme)),
                    }
                }
                Protocol::Http => ExporterPlan {
                    backend,
                    protocol: Protocol::Http,
                    transport: Transport::Scheme,
                    endpoint: non_empty(url).map(http_traces_endpoint),
                },
            },
        }
    }
}

fn non_empty(url: &str) -> Option<&str> {
    (!url.is_empty()).then_some(url)
}

fn with_scheme(url: &str, scheme: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("{scheme}://{url}")
    }
}

fn http_traces_endpoint(url: &str) -> String {
    let url = with_scheme(url, "https");
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    let has_path = url[authority_start..]
        .find('/')
        .is_some_and(|i| url[authority_start + i..].len() > 1);
    if has_path {
        url
    } else {
        format!("{}{OTLP_TRACES_PATH}", url.trim_end_matches('/'))
    }
}

/// Resolves a backend name into a ready tracer provider.
///
/// Accepted names are `"jaeger"`, `"zipkin"` and `"otlp"`; anything else is
/// rejected with [`TelemetryError::InvalidProvider`].
///
/// OTLP over gRPC builds a lazily connected channel and therefore has to be
/// called from within a Tokio runtime.
pub fn new_trace_provider(backend: &str, options: TraceOptions) -> Result<TraceProvider> {
    let backend: Backend = backend.parse()?;
    TraceProvider::new(backend, options)
}

/// A batching tracer provider bound to one backend.
///
/// Cloning is cheap; clones share the same export pipeline.
#[derive(Clone, Debug)]
pub struct TraceProvider {
    inner: SdkTracerProvider,
    plan: ExporterPlan,
}

impl TraceProvider {
    pub fn new(backend: Backend, options: TraceOptions) -> Result<Self> {
        let plan = ExporterPlan::resolve(backend, &options);
        tracing::debug!(
            target: "otel_lifecycle",
            backend = %plan.backend,
            protocol = %plan.protocol,
            transport = ?plan.transport,
            endpoint = plan.endpoint.as_deref().unwrap_or("<default>"),
            "building trace exporter"
        );

        let inner = match backend {
            Backend::Jaeger => {
                let exporter = http_exporter(&plan)?;
                batched(exporter, service_resource(&options), None)
            }
            Backend::Zipkin => {
                let exporter = zipkin_exporter(&plan)?;
                batched(exporter, service_resource(&options), None)
            }
            Backend::Otlp => {
                let exporter = match plan.protocol {
                    Protocol::Grpc => grpc_exporter(&plan)?,
                    Protocol::Http => http_exporter(&plan)?,
                };
                batched(exporter, otlp_resource(&options), Some(Sampler::AlwaysOn))
            }
        };

        Ok(Self { inner, plan })
    }

    pub fn backend(&self) -> Backend {
        self.plan.backend
    }

    pub fn protocol(&self) -> Protocol {
        self.plan.protocol
    }

    pub fn transport(&self) -> Transport {
        self.plan.transport
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.plan.endpoint.as_deref()
    }

    pub fn sdk_provider(&self) -> &SdkTracerProvider {
        &self.inner
    }

    pub fn tracer(&self, name: &'static str) -> SdkTracer {
        self.inner.tracer(name)
    }

    /// Installs this provider as the process-wide OpenTelemetry provider.
    pub fn install_global(&self) {
        global::set_tracer_provider(self.inner.clone());
    }

    /// `tracing` layer exporting spans through this provider.
    pub fn tracing_layer<S>(&self, name: &'static str) -> OpenTelemetryLayer<S, SdkTracer>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        OpenTelemetryLayer::new(self.tracer(name))
    }

    pub fn force_flush(&self) -> Result<()> {
        self.inner
            .force_flush()
            .map_err(|e| TelemetryError::Shutdown(Box::new(e)))
    }

    /// Flushes pending batches and stops the exporter.
    pub fn shutdown(&self) -> Result<()> {
        self.inner
            .shutdown()
            .map_err(|e| TelemetryError::Shutdown(Box::new(e)))
    }
}

/// Trust anchors tried in order for TLS: the host's certificate store, then
/// the bundled web PKI set for hosts that ship without one.
fn tls_roots() -> [(&'static str, ClientTlsConfig); 2] {
    [
        ("native", ClientTlsConfig::new().with_native_roots()),
        ("webpki", ClientTlsConfig::new().with_webpki_roots()),
    ]
}

fn grpc_exporter(plan: &ExporterPlan) -> Result<SpanExporter> {
    let build = |tls: Option<ClientTlsConfig>| {
        let mut builder = SpanExporter::builder().with_tonic();
        if let Some(endpoint) = &plan.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(tls) = tls {
            builder = builder.with_tls_config(tls);
        }
        builder.build()
    };

    if plan.transport != Transport::Tls {
        return build(None).map_err(|e| TelemetryError::exporter(plan.backend, e));
    }
    let mut last_err = None;
    for (roots, tls) in tls_roots() {
        match build(Some(tls)) {
            Ok(exporter) => return Ok(exporter),
            Err(e) => {
                tracing::debug!(target: "otel_lifecycle", roots, error = %e, "tls setup failed");
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) => Err(TelemetryError::exporter(plan.backend, e)),
        None => build(None).map_err(|e| TelemetryError::exporter(plan.backend, e)),
    }
}

/// The zipkin builder creates a blocking `reqwest` client, which owns a
/// runtime of its own and must not be created (or dropped) on an async
/// executor thread.
fn zipkin_exporter(plan: &ExporterPlan) -> Result<ZipkinExporter> {
    let endpoint = plan.endpoint.clone();
    let handle = thread::Builder::new()
        .name("zipkin-exporter-init".into())
        .spawn(move || {
            let mut builder = ZipkinExporter::builder();
            if let Some(endpoint) = endpoint {
                builder = builder.with_collector_endpoint(endpoint);
            }
            builder.build()
        })
        .map_err(|e| TelemetryError::exporter(plan.backend, e))?;
    handle
        .join()
        .map_err(|_| {
            TelemetryError::exporter(
                plan.backend,
                io::Error::other("zipkin exporter initialisation panicked"),
            )
        })?
        .map_err(|e| TelemetryError::exporter(plan.backend, e))
}

fn http_exporter(plan: &ExporterPlan) -> Result<SpanExporter> {
    let mut builder = SpanExporter::builder()
        .with_http()
        .with_protocol(opentelemetry_otlp::Protocol::HttpBinary);
    if let Some(endpoint) = &plan.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    builder
        .build()
        .map_err(|e| TelemetryError::exporter(plan.backend, e))
}

fn batched<E>(exporter: E, resource: Resource, sampler: Option<Sampler>) -> SdkTracerProvider
where
    E: opentelemetry_sdk::trace::SpanExporter + 'static,
{
    let mut builder = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource);
    if let Some(sampler) = sampler {
        builder = builder.with_sampler(sampler);
    }
    builder.build()
}

fn service_resource(options: &TraceOptions) -> Resource {
    Resource::builder_empty()
        .with_schema_url(
            [
                KeyValue::new("service.name", options.name.clone()),
                KeyValue::new("environment", options.env.clone()),
                KeyValue::new("version", options.version.clone()),
            ],
            RESOURCE_SCHEMA_URL,
        )
        .build()
}

fn otlp_resource(options: &TraceOptions) -> Resource {
    Resource::builder_empty()
        .with_attributes([
            KeyValue::new("service.name", options.name.clone()),
            KeyValue::new("library.language", "rust"),
            KeyValue::new("service.version", options.version.clone()),
        ])
        .build()
}

#[cfg(test)]
mod tests {
    use opentelemetry::Key;

    use super::*;
    use crate::trace::EnvDefaults;

    fn options() -> TraceOptions {
        TraceOptions::from_env(&EnvDefaults::default())
            .with_name("checkout")
            .with_version("1.2.3")
    }

    #[test]
    fn unknown_backends_are_rejected() {
        for name in ["", "Jaeger", "otel", "invalid"] {
            let err = new_trace_provider(name, options()).unwrap_err();
            assert!(
                matches!(&err, TelemetryError::InvalidProvider(n) if n == name),
                "{name}: {err}"
            );
            assert!(err.to_string().starts_with("invalid provider type"));
        }
    }

    #[test]
    fn grpc_transport_follows_insecure_flag() {
        let insecure = ExporterPlan::resolve(
            Backend::Otlp,
            &options().with_url("collector:4317").with_insecure(true),
        );
        assert_eq!(insecure.transport, Transport::Insecure);
        assert_eq!(insecure.endpoint.as_deref(), Some("http://collector:4317"));

        let secure = ExporterPlan::resolve(
            Backend::Otlp,
            &options().with_url("collector:4317").with_insecure(false),
        );
        assert_eq!(secure.transport, Transport::Tls);
        assert_eq!(secure.endpoint.as_deref(), Some("https://collector:4317"));
    }

    #[test]
    fn http_endpoints_gain_the_traces_path() {
        let plan = ExporterPlan::resolve(
            Backend::Otlp,
            &options()
                .with_protocol(Protocol::Http)
                .with_url("http://collector:4318/"),
        );
        assert_eq!(plan.protocol, Protocol::Http);
        assert_eq!(plan.transport, Transport::Scheme);
        assert_eq!(plan.endpoint.as_deref(), Some("http://collector:4318/v1/traces"));

        let explicit = ExporterPlan::resolve(
            Backend::Jaeger,
            &options().with_url("http://jaeger:4318/custom/traces"),
        );
        assert_eq!(
            explicit.endpoint.as_deref(),
            Some("http://jaeger:4318/custom/traces")
        );
    }

    #[test]
    fn empty_url_keeps_exporter_default() {
        let plan = ExporterPlan::resolve(Backend::Zipkin, &options().with_url(""));
        assert_eq!(plan.endpoint, None);
    }

    #[test]
    fn zipkin_with_valid_url_builds() {
        let provider = new_trace_provider(
            "zipkin",
            options().with_url("http://localhost:9411/api/v2/spans"),
        )
        .unwrap();
        assert_eq!(provider.backend(), Backend::Zipkin);
        assert_eq!(provider.endpoint(), Some("http://localhost:9411/api/v2/spans"));
        provider.shutdown().unwrap();
    }

    #[test]
    fn zipkin_with_malformed_url_fails() {
        let err = new_trace_provider("zipkin", options().with_url("http://exa mple:9411"))
            .unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Exporter {
                backend: Backend::Zipkin,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn zipkin_builds_inside_a_tokio_runtime() {
        let provider = new_trace_provider(
            "zipkin",
            options().with_url("http://localhost:9411/api/v2/spans"),
        )
        .unwrap();
        assert_eq!(provider.backend(), Backend::Zipkin);
        provider.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zipkin_malformed_url_fails_inside_a_tokio_runtime() {
        let err = new_trace_provider("zipkin", options().with_url("http://exa mple:9411"))
            .unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Exporter {
                backend: Backend::Zipkin,
                ..
            }
        ));
    }

    #[test]
    fn jaeger_with_valid_url_builds() {
        let provider =
            new_trace_provider("jaeger", options().with_url("http://localhost:4318")).unwrap();
        assert_eq!(provider.protocol(), Protocol::Http);
        assert_eq!(provider.endpoint(), Some("http://localhost:4318/v1/traces"));
        provider.shutdown().unwrap();
    }

    #[test]
    fn jaeger_with_malformed_url_fails() {
        let err = new_trace_provider("jaeger", options().with_url("http://exa mple:4318"))
            .unwrap_err();
        assert!(err.to_string().contains("jaeger"));
    }

    #[tokio::test]
    async fn otlp_grpc_builds_with_either_transport() {
        let insecure = new_trace_provider(
            "otlp",
            options().with_url("localhost:4317").with_insecure(true),
        )
        .unwrap();
        assert_eq!(insecure.transport(), Transport::Insecure);

        let tls = new_trace_provider(
            "otlp",
            options().with_url("collector.example.com:4317").with_insecure(false),
        )
        .unwrap();
        assert_eq!(tls.transport(), Transport::Tls);
        assert_eq!(tls.endpoint(), Some("https://collector.example.com:4317"));
    }

    #[test]
    fn tls_prefers_the_system_trust_store() {
        let order: Vec<&str> = tls_roots().iter().map(|(name, _)| *name).collect();
        assert_eq!(order, ["native", "webpki"]);
    }

    #[test]
    fn otlp_resource_carries_language_and_version() {
        let resource = otlp_resource(&options());
        assert_eq!(
            resource.get(&Key::from_static_str("service.name")),
            Some("checkout".into())
        );
        assert_eq!(
            resource.get(&Key::from_static_str("library.language")),
            Some("rust".into())
        );
        assert_eq!(
            resource.get(&Key::from_static_str("service.version")),
            Some("1.2.3".into())
        );
    }

    #[test]
    fn service_resource_is_exact_and_schema_tagged() {
        let resource = service_resource(&options().with_env("staging"));
        assert_eq!(resource.len(), 3);
        assert_eq!(resource.schema_url(), Some(RESOURCE_SCHEMA_URL));
        assert_eq!(
            resource.get(&Key::from_static_str("environment")),
            Some("staging".into())
        );
    }
}
