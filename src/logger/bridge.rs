// SPDX-License-Identifier: MIT
//! `tracing` → logger bridge.
use std::fmt;

use opentelemetry::trace::{SpanContext, TraceContextExt, TraceFlags, TraceState};
use opentelemetry::Context as OtelContext;
use tracing::field::{Field as TracingField, Visit};
use tracing::{Event, Subscriber};
use tracing_opentelemetry::OtelData;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::{LookupSpan, SpanRef};

use super::field::Field;
use super::level::Level;
use super::Logger;

/// Layer that writes `tracing` events through a [`Logger`], so events emitted
/// by libraries end up in the same sinks as direct logger calls. Span
/// lifecycle is left to the other layers of the subscriber; when an
/// OpenTelemetry layer is installed next to it, events inside a span (the
/// explicit `parent:` or the current one) carry that span's trace and span
/// ids.
#[derive(Clone)]
pub struct LogBridge {
    logger: Logger,
}

impl LogBridge {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for LogBridge
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = Level::from(metadata.level());
        if !self.logger.enabled(level) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let cx = ctx.event_span(event).and_then(|span| otel_context(&span));
        let caller = metadata.file().zip(metadata.line());
        self.logger
            .write_event(level, cx.as_ref(), caller, &visitor.message, &visitor.fields);
    }
}

/// Ids assigned to `span` by the OpenTelemetry layer, as a remote context.
fn otel_context<S>(span: &SpanRef<'_, S>) -> Option<OtelContext>
where
    S: for<'span> LookupSpan<'span>,
{
    let extensions = span.extensions();
    let data = extensions.get::<OtelData>()?;
    let span_context = SpanContext::new(
        data.trace_id()?,
        data.span_id()?,
        TraceFlags::default(),
        false,
        TraceState::default(),
    );
    Some(OtelContext::new().with_remote_span_context(span_context))
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: Vec<Field>,
}

impl EventVisitor {
    fn push(&mut self, field: &TracingField, value: serde_json::Value) {
        if field.name() == "message" {
            match value {
                serde_json::Value::String(s) => self.message = s,
                other => self.message = other.to_string(),
            }
        } else {
            self.fields.push(Field::new(field.name(), value));
        }
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.push(field, value.into());
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.push(field, value.into());
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.push(field, value.into());
    }

    fn record_str(&mut self, field: &TracingField, value: &str) {
        self.push(field, value.into());
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}").into());
    }
}
