// SPDX-License-Identifier: MIT
//! Structured, context-aware logger with console and buffered file output.
//!
//! [`new_logger`] resolves [`LoggerOptions`] into two independent pipelines:
//!
//! * console – human-readable lines on stdout (when `stdout` is enabled);
//! * sinks – JSON lines fanned out to every configured writer (and the
//!   optional rotating file), behind a size/time [`BufferedWriter`].
//!
//! Records below the configured level are discarded before the message is
//! formatted. Context-aware calls (`*_ctx`) take an OpenTelemetry
//! [`Context`]; when it carries a valid span the record is annotated with
//! `trace_id` / `span_id`, and a recording span additionally receives a
//! `log` event.
//!
//! # Example
//! ```no_run
//! use service_telemetry::logger::{field, new_logger, Level, LoggerOptions};
//!
//! let logger = new_logger(LoggerOptions::default().with_level(Level::Info))?;
//! let requests = logger.with_fields([field("component", "http")]);
//! requests.info("listening on :8080");
//! logger.sync()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
use std::fmt::Display;
use std::io;
use std::panic::Location;
use std::sync::Arc;

use chrono::Local;
use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};

mod bridge;
mod buffered;
mod fanout;
mod field;
mod file;
mod level;
mod options;
mod record;

pub use self::bridge::LogBridge;
pub use self::buffered::BufferedWriter;
pub use self::fanout::{BoxedWriter, FanOut};
pub use self::field::{field, Field};
pub use self::file::{
    new_file_writer, FileOptions, RotatingFile, RotatingFileBuilder, DEFAULT_MAX_AGE_DAYS,
    DEFAULT_MAX_BACKUPS, DEFAULT_MAX_SIZE_MB, LOG_SUFFIX,
};
pub use self::level::Level;
pub use self::options::{LoggerOption, LoggerOptions, DEFAULT_BUFFER_SIZE, DEFAULT_INTERVAL};

use self::record::{Core, Encoding, Output, Pipeline, Record, TraceIds};
use crate::error::{Result, TelemetryError};

/// Builds a logger from resolved options.
///
/// # Errors
/// Fails when the requested log file cannot be created or the periodic
/// flusher cannot be started. A logger with no writers and no console is
/// valid and discards everything.
pub fn new_logger(options: LoggerOptions) -> Result<Logger> {
    let LoggerOptions {
        level,
        stdout,
        mut writers,
        interval,
        buffer_size,
        prefix,
        caller,
        file,
    } = options;

    if let Some(file) = file {
        writers.push(Box::new(file.open()?));
    }

    let mut pipelines = Vec::with_capacity(2);
    if stdout {
        pipelines.push(Pipeline {
            encoding: Encoding::Console,
            output: Output::Stdout,
        });
    }
    if !writers.is_empty() {
        let sink = BufferedWriter::new(Box::new(FanOut::new(writers)), buffer_size, interval)
            .map_err(TelemetryError::Flusher)?;
        pipelines.push(Pipeline {
            encoding: Encoding::Json,
            output: Output::Buffered(sink),
        });
    }

    Ok(Logger {
        core: Arc::new(Core {
            level,
            caller,
            prefix,
            pipelines,
        }),
        fields: Arc::from(Vec::new()),
        bound: None,
    })
}

/// Cheap, cloneable logging facade.
///
/// Clones and loggers derived through [`with_fields`](Self::with_fields) or
/// [`ctx`](Self::ctx) share one sink chain.
#[derive(Clone)]
pub struct Logger {
    core: Arc<Core>,
    fields: Arc<[Field]>,
    bound: Option<Context>,
}

macro_rules! level_methods {
    ($($level:ident => $plain:ident, $with:ident, $ctx:ident, $ctx_with:ident;)*) => {
        $(
            #[track_caller]
            pub fn $plain(&self, msg: impl Display) {
                self.log(Level::$level, None, msg, &[]);
            }

            /// Like the plain call, with `fields` added to this record only.
            #[track_caller]
            pub fn $with(&self, msg: impl Display, fields: &[Field]) {
                self.log(Level::$level, None, msg, fields);
            }

            #[track_caller]
            pub fn $ctx(&self, cx: &Context, msg: impl Display) {
                self.log(Level::$level, Some(cx), msg, &[]);
            }

            #[track_caller]
            pub fn $ctx_with(&self, cx: &Context, msg: impl Display, fields: &[Field]) {
                self.log(Level::$level, Some(cx), msg, fields);
            }
        )*
    };
}

impl Logger {
    level_methods! {
        Debug => debug, debug_with, debug_ctx, debug_ctx_with;
        Info => info, info_with, info_ctx, info_ctx_with;
        Warn => warn, warn_with, warn_ctx, warn_ctx_with;
        Error => error, error_with, error_ctx, error_ctx_with;
    }

    /// Logs at fatal level, flushes every sink and exits the process with
    /// status 1.
    #[track_caller]
    pub fn fatal(&self, msg: impl Display) -> ! {
        self.fatal_with(msg, &[])
    }

    #[track_caller]
    pub fn fatal_with(&self, msg: impl Display, fields: &[Field]) -> ! {
        self.log(Level::Fatal, None, msg, fields);
        self.terminate()
    }

    #[track_caller]
    pub fn fatal_ctx(&self, cx: &Context, msg: impl Display) -> ! {
        self.fatal_ctx_with(cx, msg, &[])
    }

    #[track_caller]
    pub fn fatal_ctx_with(&self, cx: &Context, msg: impl Display, fields: &[Field]) -> ! {
        self.log(Level::Fatal, Some(cx), msg, fields);
        self.terminate()
    }

    /// Logs at panic level, flushes every sink and panics with the message.
    #[track_caller]
    pub fn panic(&self, msg: impl Display) -> ! {
        self.panic_with(msg, &[])
    }

    #[track_caller]
    pub fn panic_with(&self, msg: impl Display, fields: &[Field]) -> ! {
        let text = msg.to_string();
        self.log(Level::Panic, None, &text, fields);
        self.unwind(&text)
    }

    #[track_caller]
    pub fn panic_ctx(&self, cx: &Context, msg: impl Display) -> ! {
        self.panic_ctx_with(cx, msg, &[])
    }

    #[track_caller]
    pub fn panic_ctx_with(&self, cx: &Context, msg: impl Display, fields: &[Field]) -> ! {
        let text = msg.to_string();
        self.log(Level::Panic, Some(cx), &text, fields);
        self.unwind(&text)
    }

    /// Returns a logger that adds `fields` to every record. The receiver is
    /// left untouched.
    pub fn with_fields(&self, fields: impl IntoIterator<Item = Field>) -> Logger {
        let fields: Arc<[Field]> = self.fields.iter().cloned().chain(fields).collect();
        Logger {
            core: Arc::clone(&self.core),
            fields,
            bound: self.bound.clone(),
        }
    }

    /// Returns a logger bound to `cx`: its context-free calls behave like the
    /// `*_ctx` variants called with `cx`.
    pub fn ctx(&self, cx: &Context) -> Logger {
        Logger {
            core: Arc::clone(&self.core),
            fields: Arc::clone(&self.fields),
            bound: Some(cx.clone()),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.core.enabled(level)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Flushes every pipeline. Returns the first error; all pipelines are
    /// attempted regardless.
    pub fn sync(&self) -> io::Result<()> {
        self.core.sync()
    }

    /// Layer forwarding `tracing` events into this logger's sinks.
    pub fn tracing_bridge(&self) -> LogBridge {
        LogBridge::new(self.clone())
    }

    #[track_caller]
    fn log(&self, level: Level, cx: Option<&Context>, msg: impl Display, extra: &[Field]) {
        if !self.core.enabled(level) {
            return;
        }
        let caller = if self.core.caller {
            Some(Location::caller())
        } else {
            None
        };
        let message = self.core.prefixed(msg);
        let trace = cx
            .or(self.bound.as_ref())
            .and_then(|cx| correlate(cx, level, &message));

        self.core.write(&Record {
            level,
            time: Local::now(),
            caller: caller.map(|loc| (loc.file(), loc.line())),
            message: &message,
            trace,
            fields: &self.fields,
            extra,
        });
    }

    pub(crate) fn write_event(
        &self,
        level: Level,
        cx: Option<&Context>,
        caller: Option<(&str, u32)>,
        message: &str,
        extra: &[Field],
    ) {
        let message = self.core.prefixed(message);
        let caller = if self.core.caller { caller } else { None };
        let trace = cx
            .filter(|cx| cx.span().span_context().is_valid())
            .or(self.bound.as_ref())
            .and_then(|cx| correlate(cx, level, &message));
        self.core.write(&Record {
            level,
            time: Local::now(),
            caller,
            message: &message,
            trace,
            fields: &self.fields,
            extra,
        });
    }

    fn terminate(&self) -> ! {
        let _ = self.core.sync();
        std::process::exit(1)
    }

    fn unwind(&self, text: &str) -> ! {
        let _ = self.core.sync();
        panic!("{}", self.core.prefixed(text))
    }
}

/// Extracts trace/span ids from `cx` and mirrors the record onto the active
/// span when it is recording.
fn correlate(cx: &Context, level: Level, message: &str) -> Option<TraceIds> {
    let span = cx.span();
    let span_context = span.span_context();
    if !span_context.is_valid() {
        return None;
    }
    if span.is_recording() {
        span.add_event(
            "log",
            vec![
                KeyValue::new("log.severity", level.as_str()),
                KeyValue::new("log.message", message.to_string()),
            ],
        );
        if level >= Level::Error {
            span.set_status(Status::error(message.to_string()));
        }
    }
    Some(TraceIds {
        trace_id: span_context.trace_id(),
        span_id: span_context.span_id(),
    })
}
