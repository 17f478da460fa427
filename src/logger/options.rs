// SPDX-License-Identifier: MIT
use std::fmt;
use std::io;
use std::time::Duration;

use super::fanout::BoxedWriter;
use super::file::FileOptions;
use super::level::Level;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_BUFFER_SIZE: usize = 4086;

/// One configuration delta. A sequence of deltas is folded left to right
/// over [`LoggerOptions::default`]; when a field is set more than once the
/// last delta wins.
pub enum LoggerOption {
    /// Minimum severity that reaches any sink.
    Level(Level),
    /// Mirror every record to stdout in human-readable form.
    Stdout(bool),
    /// Replace the machine-readable sink list.
    Writers(Vec<BoxedWriter>),
    /// Periodic flush of the buffered sink; zero flushes only when full.
    Interval(Duration),
    /// Bytes buffered before a forced flush.
    BufferSize(usize),
    /// Prepended, space separated, to every message.
    Prefix(String),
    /// Annotate records with the caller's `file:line`.
    Caller(bool),
    /// Add a rotating file to the sink list.
    File(Option<FileOptions>),
}

/// Resolved logger configuration.
pub struct LoggerOptions {
    pub(crate) level: Level,
    pub(crate) stdout: bool,
    pub(crate) writers: Vec<BoxedWriter>,
    pub(crate) interval: Duration,
    pub(crate) buffer_size: usize,
    pub(crate) prefix: String,
    pub(crate) caller: bool,
    pub(crate) file: Option<FileOptions>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: Level::Debug,
            stdout: true,
            writers: vec![Box::new(io::stderr())],
            interval: DEFAULT_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
            prefix: String::new(),
            caller: true,
            file: None,
        }
    }
}

impl LoggerOptions {
    pub fn apply(&mut self, option: LoggerOption) {
        match option {
            LoggerOption::Level(level) => self.level = level,
            LoggerOption::Stdout(stdout) => self.stdout = stdout,
            LoggerOption::Writers(writers) => self.writers = writers,
            LoggerOption::Interval(interval) => self.interval = interval,
            LoggerOption::BufferSize(size) => self.buffer_size = size,
            LoggerOption::Prefix(prefix) => self.prefix = prefix,
            LoggerOption::Caller(caller) => self.caller = caller,
            LoggerOption::File(file) => self.file = file,
        }
    }

    fn with(mut self, option: LoggerOption) -> Self {
        self.apply(option);
        self
    }

    pub fn with_level(self, level: Level) -> Self {
        self.with(LoggerOption::Level(level))
    }

    pub fn with_stdout(self, stdout: bool) -> Self {
        self.with(LoggerOption::Stdout(stdout))
    }

    pub fn with_writers<I>(self, writers: I) -> Self
    where
        I: IntoIterator<Item = BoxedWriter>,
    {
        self.with(LoggerOption::Writers(writers.into_iter().collect()))
    }

    pub fn with_interval(self, interval: Duration) -> Self {
        self.with(LoggerOption::Interval(interval))
    }

    pub fn with_buffer_size(self, size: usize) -> Self {
        self.with(LoggerOption::BufferSize(size))
    }

    pub fn with_prefix(self, prefix: impl Into<String>) -> Self {
        self.with(LoggerOption::Prefix(prefix.into()))
    }

    pub fn with_caller(self, caller: bool) -> Self {
        self.with(LoggerOption::Caller(caller))
    }

    pub fn with_file(self, file: FileOptions) -> Self {
        self.with(LoggerOption::File(Some(file)))
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn stdout(&self) -> bool {
        self.stdout
    }

    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn caller(&self) -> bool {
        self.caller
    }

    pub fn file(&self) -> Option<&FileOptions> {
        self.file.as_ref()
    }
}

impl FromIterator<LoggerOption> for LoggerOptions {
    fn from_iter<I: IntoIterator<Item = LoggerOption>>(iter: I) -> Self {
        let mut options = LoggerOptions::default();
        options.extend(iter);
        options
    }
}

impl Extend<LoggerOption> for LoggerOptions {
    fn extend<I: IntoIterator<Item = LoggerOption>>(&mut self, iter: I) {
        for option in iter {
            self.apply(option);
        }
    }
}

impl fmt::Debug for LoggerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerOptions")
            .field("level", &self.level)
            .field("stdout", &self.stdout)
            .field("writers", &self.writers.len())
            .field("interval", &self.interval)
            .field("buffer_size", &self.buffer_size)
            .field("prefix", &self.prefix)
            .field("caller", &self.caller)
            .field("file", &self.file)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn defaults() {
        let options = LoggerOptions::default();
        assert_eq!(options.level().as_i8(), -1);
        assert!(options.stdout());
        assert_eq!(options.writer_count(), 1);
        assert_eq!(options.interval(), Duration::from_secs(10));
        assert_eq!(options.buffer_size(), 4086);
        assert_eq!(options.prefix(), "");
        assert!(options.caller());
        assert!(options.file().is_none());
    }

    #[test]
    fn writers_replace_rather_than_append() {
        let options = LoggerOptions::default()
            .with_writers([Box::new(io::sink()) as BoxedWriter, Box::new(io::sink())])
            .with_writers([Box::new(io::sink()) as BoxedWriter]);
        assert_eq!(options.writer_count(), 1);
    }

    #[derive(Clone, Debug)]
    enum Delta {
        Level(Level),
        Stdout(bool),
        Interval(u64),
        BufferSize(usize),
        Prefix(String),
        Caller(bool),
    }

    impl Delta {
        fn into_option(self) -> LoggerOption {
            match self {
                Delta::Level(level) => LoggerOption::Level(level),
                Delta::Stdout(stdout) => LoggerOption::Stdout(stdout),
                Delta::Interval(secs) => LoggerOption::Interval(Duration::from_secs(secs)),
                Delta::BufferSize(size) => LoggerOption::BufferSize(size),
                Delta::Prefix(prefix) => LoggerOption::Prefix(prefix),
                Delta::Caller(caller) => LoggerOption::Caller(caller),
            }
        }
    }

    fn delta() -> impl Strategy<Value = Delta> {
        prop_oneof![
            proptest::sample::select(Level::ALL.to_vec()).prop_map(Delta::Level),
            any::<bool>().prop_map(Delta::Stdout),
            (0u64..120).prop_map(Delta::Interval),
            (0usize..65_536).prop_map(Delta::BufferSize),
            "[a-z]{0,8}".prop_map(Delta::Prefix),
            any::<bool>().prop_map(Delta::Caller),
        ]
    }

    proptest! {
        #[test]
        fn last_write_wins_per_field(deltas in proptest::collection::vec(delta(), 0..24)) {
            let options: LoggerOptions = deltas.iter().cloned().map(Delta::into_option).collect();
            let defaults = LoggerOptions::default();

            let last_level = deltas.iter().rev().find_map(|d| match d { Delta::Level(v) => Some(*v), _ => None });
            let last_stdout = deltas.iter().rev().find_map(|d| match d { Delta::Stdout(v) => Some(*v), _ => None });
            let last_interval = deltas.iter().rev().find_map(|d| match d { Delta::Interval(v) => Some(Duration::from_secs(*v)), _ => None });
            let last_size = deltas.iter().rev().find_map(|d| match d { Delta::BufferSize(v) => Some(*v), _ => None });
            let last_prefix = deltas.iter().rev().find_map(|d| match d { Delta::Prefix(v) => Some(v.clone()), _ => None });
            let last_caller = deltas.iter().rev().find_map(|d| match d { Delta::Caller(v) => Some(*v), _ => None });

            prop_assert_eq!(options.level(), last_level.unwrap_or(defaults.level()));
            prop_assert_eq!(options.stdout(), last_stdout.unwrap_or(defaults.stdout()));
            prop_assert_eq!(options.interval(), last_interval.unwrap_or(defaults.interval()));
            prop_assert_eq!(options.buffer_size(), last_size.unwrap_or(defaults.buffer_size()));
            let expected_prefix = last_prefix.unwrap_or_default();
            prop_assert_eq!(options.prefix(), expected_prefix.as_str());
            prop_assert_eq!(options.caller(), last_caller.unwrap_or(defaults.caller()));
        }
    }
}
