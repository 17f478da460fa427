// SPDX-License-Identifier: MIT
//! Size-rotated log files with age/count retention and gzip compression.
//!
//! The active file lives at `<dir>/<name>.logger`. When a write would push it
//! past `max_size` it is renamed to `<dir>/<name>-<timestamp>.logger`, a fresh
//! file is opened in its place and retention runs on a background thread:
//! backups beyond `max_backups` or older than `max_age` are deleted, the rest
//! are gzipped.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Result, TelemetryError};

pub const LOG_SUFFIX: &str = ".logger";
pub const DEFAULT_MAX_SIZE_MB: u64 = 50;
pub const DEFAULT_MAX_AGE_DAYS: u64 = 3;
pub const DEFAULT_MAX_BACKUPS: usize = 10;

const MEGABYTE: u64 = 1024 * 1024;
const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const GZIP_SUFFIX: &str = ".gz";

/// Builds a [`RotatingFile`] under `dir`, appending the `.logger` suffix to
/// `file_name` when missing.
///
/// # Errors
/// Returns [`TelemetryError::CreateLogDir`] if `dir` (or one of its ancestors)
/// cannot be created, and [`TelemetryError::OpenLogFile`] if the active file
/// cannot be opened.
pub fn new_file_writer(
    dir: impl AsRef<Path>,
    file_name: &str,
    max_size_mb: u64,
    max_age_days: u64,
) -> Result<RotatingFile> {
    RotatingFile::builder(dir, file_name)
        .max_size_mb(max_size_mb)
        .max_age_days(max_age_days)
        .open()
}

/// File sink request carried by the logger options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileOptions {
    pub dir: PathBuf,
    pub file_name: String,
    pub max_size_mb: u64,
    pub max_age_days: u64,
}

impl FileOptions {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }

    pub fn max_size_mb(mut self, max_size_mb: u64) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    pub fn max_age_days(mut self, max_age_days: u64) -> Self {
        self.max_age_days = max_age_days;
        self
    }

    pub fn open(&self) -> Result<RotatingFile> {
        new_file_writer(&self.dir, &self.file_name, self.max_size_mb, self.max_age_days)
    }
}

#[derive(Debug)]
pub struct RotatingFileBuilder {
    dir: PathBuf,
    file_name: String,
    max_size: u64,
    max_age: Duration,
    max_backups: usize,
    compress: bool,
}

impl RotatingFileBuilder {
    /// Zero selects [`DEFAULT_MAX_SIZE_MB`].
    pub fn max_size_mb(mut self, megabytes: u64) -> Self {
        self.max_size = megabytes.saturating_mul(MEGABYTE);
        self
    }

    /// Zero selects [`DEFAULT_MAX_SIZE_MB`].
    pub fn max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn max_age_days(mut self, days: u64) -> Self {
        self.max_age = DAY.saturating_mul(u32::try_from(days).unwrap_or(u32::MAX));
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Zero keeps every backup (subject to `max_age`).
    pub fn max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn open(self) -> Result<RotatingFile> {
        fs::create_dir_all(&self.dir).map_err(|source| TelemetryError::CreateLogDir {
            path: self.dir.clone(),
            source,
        })?;

        let name = if self.file_name.ends_with(LOG_SUFFIX) {
            self.file_name
        } else {
            format!("{}{LOG_SUFFIX}", self.file_name)
        };
        let stem = name.trim_end_matches(LOG_SUFFIX).to_string();
        let path = self.dir.join(&name);

        let file = open_append(&path).map_err(|source| TelemetryError::OpenLogFile {
            path: path.clone(),
            source,
        })?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        let max_size = match self.max_size {
            0 => DEFAULT_MAX_SIZE_MB * MEGABYTE,
            bytes => bytes,
        };

        Ok(RotatingFile {
            path,
            max_size,
            retention: Retention {
                dir: self.dir,
                stem,
                max_age: self.max_age,
                max_backups: self.max_backups,
                compress: self.compress,
            },
            file,
            size,
            mill: None,
        })
    }
}

/// A write target that rotates itself by size.
///
/// The rename happens inline on the write that crosses the size threshold;
/// deletion and compression of backups run on a `log-mill` thread so a large
/// gzip never stalls the writer. At most one sweep is in flight: the next
/// rotation, [`settle`](Self::settle) and drop wait for the previous one.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    retention: Retention,
    file: File,
    size: u64,
    mill: Option<JoinHandle<io::Result<()>>>,
}

/// Backup housekeeping settings, shared with the background sweep.
#[derive(Clone, Debug)]
struct Retention {
    dir: PathBuf,
    stem: String,
    max_age: Duration,
    max_backups: usize,
    compress: bool,
}

#[derive(Debug)]
struct Backup {
    path: PathBuf,
    taken: NaiveDateTime,
    compressed: bool,
}

impl RotatingFile {
    pub fn builder(dir: impl AsRef<Path>, file_name: &str) -> RotatingFileBuilder {
        RotatingFileBuilder {
            dir: dir.as_ref().to_path_buf(),
            file_name: file_name.to_string(),
            max_size: DEFAULT_MAX_SIZE_MB * MEGABYTE,
            max_age: DAY * DEFAULT_MAX_AGE_DAYS as u32,
            max_backups: DEFAULT_MAX_BACKUPS,
            compress: true,
        }
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Retires the active file and starts a new one, then schedules a
    /// retention sweep in the background.
    pub fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let backup = self.retention.free_backup_path(Local::now().naive_local());
        fs::rename(&self.path, &backup)?;
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.size = 0;

        if let Err(e) = self.settle() {
            eprintln!("service-telemetry: log retention failed: {e}");
        }
        let retention = self.retention.clone();
        match thread::Builder::new()
            .name("log-mill".into())
            .spawn(move || retention.sweep())
        {
            Ok(handle) => {
                self.mill = Some(handle);
                Ok(())
            }
            Err(_) => self.retention.sweep(),
        }
    }

    /// Deletes backups beyond the count limit or older than `max_age`, then
    /// compresses the survivors, on the calling thread. Every rotation
    /// schedules the same sweep in the background; this forces one now.
    pub fn enforce_retention(&mut self) -> io::Result<()> {
        self.settle()?;
        self.retention.sweep()
    }

    /// Waits for the background sweep started by the last rotation, if any.
    pub fn settle(&mut self) -> io::Result<()> {
        match self.mill.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("log retention worker panicked"))),
            None => Ok(()),
        }
    }

    /// Rotated files currently on disk, newest first.
    pub fn backup_paths(&self) -> io::Result<Vec<PathBuf>> {
        let mut backups = self.retention.backups()?;
        backups.sort_by(|a, b| b.taken.cmp(&a.taken));
        Ok(backups.into_iter().map(|b| b.path).collect())
    }
}

impl Drop for RotatingFile {
    fn drop(&mut self) {
        if let Err(e) = self.settle() {
            eprintln!("service-telemetry: log retention failed: {e}");
        }
    }
}

impl Retention {
    fn sweep(&self) -> io::Result<()> {
        let mut backups = self.backups()?;
        backups.sort_by(|a, b| b.taken.cmp(&a.taken));

        let now = Local::now().naive_local();
        let cutoff = chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(NaiveDateTime::MIN);
        let mut kept = Vec::with_capacity(backups.len());
        for (index, backup) in backups.into_iter().enumerate() {
            let over_count = self.max_backups > 0 && index >= self.max_backups;
            if over_count || backup.taken <= cutoff {
                fs::remove_file(&backup.path)?;
            } else {
                kept.push(backup);
            }
        }

        if self.compress {
            for backup in kept.iter().filter(|b| !b.compressed) {
                gzip_in_place(&backup.path)?;
            }
        }
        Ok(())
    }

    fn backups(&self) -> io::Result<Vec<Backup>> {
        let prefix = format!("{}-", self.stem);
        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let (stamp, compressed) = match rest.strip_suffix(GZIP_SUFFIX) {
                Some(inner) => (inner, true),
                None => (rest, false),
            };
            let Some(stamp) = stamp.strip_suffix(LOG_SUFFIX) else {
                continue;
            };
            if let Ok(taken) = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT) {
                backups.push(Backup {
                    path: entry.path(),
                    taken,
                    compressed,
                });
            }
        }
        Ok(backups)
    }

    fn backup_path(&self, taken: NaiveDateTime) -> PathBuf {
        self.dir.join(format!(
            "{}-{}{LOG_SUFFIX}",
            self.stem,
            taken.format(BACKUP_TIME_FORMAT)
        ))
    }

    /// Backup names carry millisecond timestamps; rotations within the same
    /// millisecond are pushed forward until the name is unused.
    fn free_backup_path(&self, mut taken: NaiveDateTime) -> PathBuf {
        loop {
            let candidate = self.backup_path(taken);
            let mut compressed = candidate.clone().into_os_string();
            compressed.push(GZIP_SUFFIX);
            if !candidate.exists() && !Path::new(&compressed).exists() {
                return candidate;
            }
            taken += chrono::Duration::milliseconds(1);
        }
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        if len > self.max_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write length {len} exceeds maximum file size {}",
                    self.max_size
                ),
            ));
        }
        if self.size + len > self.max_size {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn gzip_in_place(path: &Path) -> io::Result<()> {
    let mut target = path.as_os_str().to_owned();
    target.push(GZIP_SUFFIX);

    let mut source = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&target)?, Compression::default());
    io::copy(&mut source, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    fs::remove_file(path)
}
