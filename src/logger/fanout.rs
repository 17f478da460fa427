// SPDX-License-Identifier: MIT
//! Fan-out over heterogeneous write targets.
//!
//! Delivery is best-effort: every target receives the bytes even when an
//! earlier one fails, and the first error is returned once all targets were
//! attempted. A broken sink is therefore reported to the caller without
//! starving the healthy ones.
use std::io::{self, Write};

/// Any byte sink the logger can write to: files, stdout/stderr, sockets,
/// caller-supplied buffers.
pub type BoxedWriter = Box<dyn Write + Send + 'static>;

#[derive(Default)]
pub struct FanOut {
    targets: Vec<BoxedWriter>,
}

impl FanOut {
    pub fn new(targets: Vec<BoxedWriter>) -> Self {
        Self { targets }
    }

    pub fn push(&mut self, target: BoxedWriter) {
        self.targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn each<F>(&mut self, mut op: F) -> io::Result<()>
    where
        F: FnMut(&mut BoxedWriter) -> io::Result<()>,
    {
        let mut first_err = None;
        for target in &mut self.targets {
            if let Err(e) = op(target) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Write for FanOut {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.each(|target| target.write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.each(|target| target.flush())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Shared in-memory target; clones observe the same bytes.
    #[derive(Clone, Default)]
    pub(crate) struct MemoryWriter {
        pub(crate) bytes: Arc<Mutex<Vec<u8>>>,
        pub(crate) flushes: Arc<Mutex<usize>>,
    }

    impl MemoryWriter {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.bytes.lock()).into_owned()
        }

        pub(crate) fn flush_count(&self) -> usize {
            *self.flushes.lock()
        }
    }

    impl Write for MemoryWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            *self.flushes.lock() += 1;
            Ok(())
        }
    }

    pub(crate) struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink down"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink down"))
        }
    }

    #[test]
    fn duplicates_every_write() {
        let a = MemoryWriter::default();
        let b = MemoryWriter::default();
        let mut fan = FanOut::new(vec![Box::new(a.clone()), Box::new(b.clone())]);

        fan.write_all(b"hello\n").unwrap();

        assert_eq!(a.contents(), "hello\n");
        assert_eq!(b.contents(), "hello\n");
    }

    #[test]
    fn one_sink_down_still_delivers_to_the_rest() {
        let healthy = MemoryWriter::default();
        let mut fan = FanOut::new(vec![Box::new(BrokenWriter), Box::new(healthy.clone())]);

        let err = fan.write(b"record").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(healthy.contents(), "record");
    }

    #[test]
    fn all_sinks_down_reports_error() {
        let mut fan = FanOut::new(vec![Box::new(BrokenWriter), Box::new(BrokenWriter)]);

        assert!(fan.write(b"record").is_err());
        assert!(fan.flush().is_err());
    }

    #[test]
    fn empty_fan_out_accepts_everything() {
        let mut fan = FanOut::default();
        assert!(fan.is_empty());
        assert_eq!(fan.write(b"dropped").unwrap(), 7);
    }
}
