// SPDX-License-Identifier: MIT
//! Size- and time-bounded buffering in front of a write target.
//!
//! Writes accumulate in memory until the next write would overflow
//! `capacity`, or until the periodic flusher fires. Two locks are involved:
//!
//! * `pending` guards the byte buffer and is held only to append or to swap
//!   the buffer out;
//! * `target` guards the wrapped writer and is held for the I/O of a single
//!   flush, so at most one flush runs at a time and every drained byte is
//!   written exactly once, in order.
//!
//! Lock order is always `target` then `pending`.
use std::io::{self, Write};
use std::mem;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::fanout::BoxedWriter;

struct Shared {
    capacity: usize,
    pending: Mutex<Vec<u8>>,
    target: Mutex<BoxedWriter>,
}

impl Shared {
    fn append(&self, buf: &[u8]) -> io::Result<()> {
        {
            let mut pending = self.pending.lock();
            if pending.len() + buf.len() <= self.capacity {
                pending.extend_from_slice(buf);
                return Ok(());
            }
        }

        let mut target = self.target.lock();
        let (drained, oversized) = {
            let mut pending = self.pending.lock();
            // A concurrent flush may have made room while we waited.
            if pending.len() + buf.len() <= self.capacity {
                pending.extend_from_slice(buf);
                return Ok(());
            }
            let drained = mem::replace(&mut *pending, Vec::with_capacity(self.capacity));
            let oversized = buf.len() > self.capacity;
            if !oversized {
                pending.extend_from_slice(buf);
            }
            (drained, oversized)
        };

        if !drained.is_empty() {
            target.write_all(&drained)?;
        }
        if oversized {
            target.write_all(buf)?;
        }
        target.flush()
    }

    fn flush(&self) -> io::Result<()> {
        let mut target = self.target.lock();
        let drained = mem::take(&mut *self.pending.lock());
        if !drained.is_empty() {
            target.write_all(&drained)?;
        }
        target.flush()
    }
}

/// Stops the periodic flusher and drains the buffer once the last
/// [`BufferedWriter`] handle is dropped.
struct FlushGuard {
    shared: Arc<Shared>,
    stop: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Err(e) = self.shared.flush() {
            eprintln!("service-telemetry: final log flush failed: {e}");
        }
    }
}

/// Cloneable handle to a buffered write target.
///
/// All clones share one buffer. Bytes still buffered when the last clone is
/// dropped are flushed before the drop returns.
#[derive(Clone)]
pub struct BufferedWriter {
    shared: Arc<Shared>,
    _guard: Arc<FlushGuard>,
}

impl BufferedWriter {
    /// Wraps `target` with a buffer of `capacity` bytes, flushed every
    /// `interval`. A zero interval disables the timer: bytes then leave the
    /// buffer only when it fills, on [`flush`](Self::flush), or on drop.
    ///
    /// # Errors
    /// Fails if the flusher thread cannot be spawned.
    pub fn new(target: BoxedWriter, capacity: usize, interval: Duration) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            capacity,
            pending: Mutex::new(Vec::with_capacity(capacity)),
            target: Mutex::new(target),
        });

        let (stop, worker) = if interval.is_zero() {
            (None, None)
        } else {
            let (tx, rx) = mpsc::channel::<()>();
            let flusher = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name("log-flusher".into())
                .spawn(move || loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(e) = flusher.flush() {
                                eprintln!("service-telemetry: periodic log flush failed: {e}");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                })?;
            (Some(tx), Some(handle))
        };

        let guard = FlushGuard {
            shared: Arc::clone(&shared),
            stop,
            worker,
        };
        Ok(Self {
            shared,
            _guard: Arc::new(guard),
        })
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of bytes currently held in memory.
    pub fn buffered(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Buffers `buf`, flushing first if it would overflow the buffer. A
    /// single write larger than the capacity bypasses the buffer.
    pub fn append(&self, buf: &[u8]) -> io::Result<()> {
        self.shared.append(buf)
    }

    /// Writes out everything buffered so far. Safe to call at any time and
    /// from any thread; flushing an empty buffer only flushes the target.
    pub fn flush(&self) -> io::Result<()> {
        self.shared.flush()
    }
}

impl Write for BufferedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.shared.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.shared.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::fanout::tests::{BrokenWriter, MemoryWriter};

    #[test]
    fn overflowing_the_buffer_triggers_exactly_one_flush() {
        let sink = MemoryWriter::default();
        let writer = BufferedWriter::new(Box::new(sink.clone()), 10, Duration::ZERO).unwrap();

        writer.append(b"aaaa").unwrap();
        writer.append(b"bbbb").unwrap();
        assert_eq!(sink.flush_count(), 0);
        assert_eq!(writer.buffered(), 8);

        // 11 bytes in total: one more than the capacity allows.
        writer.append(b"ccc").unwrap();

        assert_eq!(sink.flush_count(), 1);
        assert_eq!(sink.contents(), "aaaabbbb");
        assert_eq!(writer.buffered(), 3);
    }

    #[test]
    fn oversized_write_bypasses_the_buffer_in_order() {
        let sink = MemoryWriter::default();
        let writer = BufferedWriter::new(Box::new(sink.clone()), 4, Duration::ZERO).unwrap();

        writer.append(b"ab").unwrap();
        writer.append(b"0123456789").unwrap();

        assert_eq!(sink.contents(), "ab0123456789");
        assert_eq!(writer.buffered(), 0);
        assert_eq!(sink.flush_count(), 1);
    }

    #[test]
    fn timer_flushes_an_idle_buffer_once_per_interval() {
        let sink = MemoryWriter::default();
        let _writer =
            BufferedWriter::new(Box::new(sink.clone()), 64, Duration::from_millis(300)).unwrap();

        thread::sleep(Duration::from_millis(450));

        assert_eq!(sink.flush_count(), 1);
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn timer_flush_delivers_buffered_bytes() {
        let sink = MemoryWriter::default();
        let writer =
            BufferedWriter::new(Box::new(sink.clone()), 1024, Duration::from_millis(100)).unwrap();

        writer.append(b"pending line\n").unwrap();
        thread::sleep(Duration::from_millis(350));

        assert_eq!(sink.contents(), "pending line\n");
        assert_eq!(writer.buffered(), 0);
    }

    #[test]
    fn dropping_the_last_handle_flushes() {
        let sink = MemoryWriter::default();
        let writer = BufferedWriter::new(Box::new(sink.clone()), 1024, Duration::ZERO).unwrap();
        let clone = writer.clone();

        clone.append(b"kept").unwrap();
        drop(writer);
        assert_eq!(sink.contents(), "");

        drop(clone);
        assert_eq!(sink.contents(), "kept");
    }

    #[test]
    fn concurrent_writers_never_lose_or_duplicate_bytes() {
        let sink = MemoryWriter::default();
        let writer =
            BufferedWriter::new(Box::new(sink.clone()), 64, Duration::from_millis(5)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let writer = writer.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        writer.append(b"0123456789\n").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        writer.flush().unwrap();

        let contents = sink.contents();
        assert_eq!(contents.len(), 8 * 200 * 11);
        assert!(contents.lines().all(|line| line == "0123456789"));
    }

    #[test]
    fn target_errors_surface_on_flush() {
        let writer = BufferedWriter::new(Box::new(BrokenWriter), 8, Duration::ZERO).unwrap();
        writer.append(b"1234").unwrap();
        assert!(writer.flush().is_err());
    }
}
