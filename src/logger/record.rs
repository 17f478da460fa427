// SPDX-License-Identifier: MIT
//! Record encoding and the tee of output pipelines.
use std::fmt::Write as _;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use opentelemetry::trace::{SpanId, TraceId};
use serde::Serialize;
use serde_json::{Map, Value};

use super::buffered::BufferedWriter;
use super::field::Field;
use super::level::Level;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TraceIds {
    pub(crate) trace_id: TraceId,
    pub(crate) span_id: SpanId,
}

pub(crate) struct Record<'a> {
    pub(crate) level: Level,
    pub(crate) time: DateTime<Local>,
    pub(crate) caller: Option<(&'a str, u32)>,
    pub(crate) message: &'a str,
    pub(crate) trace: Option<TraceIds>,
    /// Fields inherited from the logger.
    pub(crate) fields: &'a [Field],
    /// Fields carried by this record only.
    pub(crate) extra: &'a [Field],
}

impl Record<'_> {
    fn field_map(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .chain(self.extra)
            .map(|f| (f.key().to_string(), f.value().clone()))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Encoding {
    /// Tab-separated, for humans.
    Console,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    level: &'static str,
    ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caller: Option<String>,
    msg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span_id: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Encoding {
    pub(crate) fn encode(self, record: &Record<'_>) -> io::Result<Vec<u8>> {
        let ts = record.time.format(TIME_FORMAT).to_string();
        let caller = record.caller.map(|(file, line)| format!("{file}:{line}"));
        match self {
            Encoding::Json => {
                let line = JsonLine {
                    level: record.level.as_str(),
                    ts,
                    caller,
                    msg: record.message,
                    trace_id: record.trace.map(|t| t.trace_id.to_string()),
                    span_id: record.trace.map(|t| t.span_id.to_string()),
                    fields: record.field_map(),
                };
                let mut out = serde_json::to_vec(&line)?;
                out.push(b'\n');
                Ok(out)
            }
            Encoding::Console => {
                let mut line = format!("{ts}\t{}", record.level.as_upper_str());
                if let Some(caller) = caller {
                    let _ = write!(line, "\t{caller}");
                }
                let _ = write!(line, "\t{}", record.message);

                let mut fields = Map::new();
                if let Some(trace) = record.trace {
                    fields.insert("trace_id".into(), trace.trace_id.to_string().into());
                    fields.insert("span_id".into(), trace.span_id.to_string().into());
                }
                fields.extend(record.field_map());
                if !fields.is_empty() {
                    let _ = write!(line, "\t{}", Value::Object(fields));
                }
                line.push('\n');
                Ok(line.into_bytes())
            }
        }
    }
}

pub(crate) enum Output {
    Stdout,
    Buffered(BufferedWriter),
}

/// One independent encoder + destination pair.
pub(crate) struct Pipeline {
    pub(crate) encoding: Encoding,
    pub(crate) output: Output,
}

impl Pipeline {
    fn write(&self, record: &Record<'_>) -> io::Result<()> {
        let line = self.encoding.encode(record)?;
        match &self.output {
            Output::Stdout => io::stdout().lock().write_all(&line),
            Output::Buffered(writer) => writer.append(&line),
        }
    }

    fn sync(&self) -> io::Result<()> {
        match &self.output {
            Output::Stdout => io::stdout().lock().flush(),
            Output::Buffered(writer) => writer.flush(),
        }
    }
}

/// Level gate plus the tee of pipelines shared by every derived logger.
pub(crate) struct Core {
    pub(crate) level: Level,
    pub(crate) caller: bool,
    pub(crate) prefix: String,
    pub(crate) pipelines: Vec<Pipeline>,
}

impl Core {
    pub(crate) fn enabled(&self, level: Level) -> bool {
        level >= self.level && !self.pipelines.is_empty()
    }

    pub(crate) fn prefixed(&self, msg: impl std::fmt::Display) -> String {
        if self.prefix.is_empty() {
            msg.to_string()
        } else {
            format!("{} {msg}", self.prefix)
        }
    }

    /// Writes `record` to every pipeline. A failing pipeline is reported on
    /// stderr and does not keep the others from receiving the record.
    pub(crate) fn write(&self, record: &Record<'_>) {
        for pipeline in &self.pipelines {
            if let Err(e) = pipeline.write(record) {
                eprintln!(
                    "service-telemetry: {:?} log pipeline write failed: {e}",
                    pipeline.encoding
                );
            }
        }
    }

    pub(crate) fn sync(&self) -> io::Result<()> {
        let mut first_err = None;
        for pipeline in &self.pipelines {
            if let Err(e) = pipeline.sync() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
