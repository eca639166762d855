//! A [`MakeWriter`] that scrubs PII from each formatted log line.

use std::io::{self, Write};

use tracing_subscriber::fmt::MakeWriter;

/// Wraps another [`MakeWriter`], running [`fieldcrypt::redact::redact_bytes`]
/// over every event before handing it on.
#[derive(Clone, Debug)]
pub struct RedactingMakeWriter<M> {
    inner: M,
}

impl RedactingMakeWriter<fn() -> io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout)
    }
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for RedactingMakeWriter<M> {
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one event and writes its redacted form on flush or drop.
///
/// The fmt layer creates one writer per event, so the buffer always holds
/// whole lines.
pub struct RedactingWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> RedactingWriter<W> {
    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let line = fieldcrypt::redact::redact_bytes(&std::mem::take(&mut self.buf));
        self.inner.write_all(line.as_bytes())
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        // Nowhere left to report a failed log write.
        let _ = self.emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn json_events_are_redacted() {
        let capture = Capture::default();
        let sink = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(RedactingMakeWriter::new(move || sink.clone()))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(email = "user@example.com", "login password=hunter2");
        });

        let out = capture.text();
        assert!(out.contains("u***@example.com"), "{out}");
        assert!(!out.contains("user@example.com"));
        assert!(!out.contains("hunter2"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn writes_nothing_for_empty_event() {
        let capture = Capture::default();
        drop(RedactingMakeWriter::new({
            let c = capture.clone();
            move || c.clone()
        })
        .make_writer());
        assert!(capture.text().is_empty());
    }
}
