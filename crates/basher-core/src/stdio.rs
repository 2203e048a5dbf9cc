//! Standard stream configuration for interpreter runs.
//!
//! Inherited and null streams are handed to the child directly. Readers and
//! writers are pumped on helper threads without any buffering of their own,
//! so bytes reach the sink in the order the child flushed them.

use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// A writer shared between runs.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// A reader that is consumed by the first run that uses it.
pub type SharedReader = Arc<Mutex<Option<Box<dyn Read + Send>>>>;

/// Where the interpreter's standard input comes from.
#[derive(Clone, Default)]
pub enum InputSource {
    /// The host's standard input.
    #[default]
    Inherit,
    /// An empty stream.
    Null,
    /// A reader, fed to the child until it reaches EOF.
    ///
    /// The reader is taken by the run that uses it; later runs sharing this
    /// source see an empty stream.
    Reader(SharedReader),
}

impl InputSource {
    /// Wrap a reader.
    pub fn reader<R: Read + Send + 'static>(reader: R) -> Self {
        InputSource::Reader(Arc::new(Mutex::new(Some(Box::new(reader)))))
    }

    /// Feed the given bytes.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::reader(io::Cursor::new(bytes.into()))
    }

    /// Take the reader out of this source, if any is left.
    pub(crate) fn take_reader(&self) -> Option<Box<dyn Read + Send>> {
        match self {
            InputSource::Reader(reader) => reader.lock().take(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::Inherit => write!(f, "Inherit"),
            InputSource::Null => write!(f, "Null"),
            InputSource::Reader(_) => write!(f, "Reader"),
        }
    }
}

/// Where the interpreter's output goes.
#[derive(Clone, Default)]
pub enum OutputSink {
    /// The host's corresponding stream.
    #[default]
    Inherit,
    /// Discarded.
    Null,
    /// A shared writer.
    Writer(SharedWriter),
}

impl OutputSink {
    /// Wrap a writer.
    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        OutputSink::Writer(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Capture output into a buffer.
    pub fn capture(buffer: &CaptureBuffer) -> Self {
        Self::writer(buffer.clone())
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputSink::Inherit => write!(f, "Inherit"),
            OutputSink::Null => write!(f, "Null"),
            OutputSink::Writer(_) => write!(f, "Writer"),
        }
    }
}

/// The three standard streams of a run.
#[derive(Debug, Clone, Default)]
pub struct StdioConfig {
    /// Standard input.
    pub stdin: InputSource,
    /// Standard output.
    pub stdout: OutputSink,
    /// Standard error.
    pub stderr: OutputSink,
}

impl StdioConfig {
    /// Inherit all three streams from the host.
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Set standard input.
    pub fn with_stdin(mut self, stdin: InputSource) -> Self {
        self.stdin = stdin;
        self
    }

    /// Set standard output.
    pub fn with_stdout(mut self, stdout: OutputSink) -> Self {
        self.stdout = stdout;
        self
    }

    /// Set standard error.
    pub fn with_stderr(mut self, stderr: OutputSink) -> Self {
        self.stderr = stderr;
        self
    }
}

/// A clonable in-memory output sink.
///
/// All clones append to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the captured bytes.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    /// Captured bytes as text, with invalid UTF-8 replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    /// Number of captured bytes.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Discard captured bytes.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
