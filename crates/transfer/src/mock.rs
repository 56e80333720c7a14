//! In-memory collaborators for engine tests.

use std::future::Future;
use std::io::{Error, ErrorKind};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use crate::TransferError;
use crate::engine::{OverwriteDecider, ProgressSink};
use crate::session::{LocalReader, LocalSource, RemoteSession, RemoteWriter};
use crate::types::{ConflictDecision, RemoteFileState, TransferProgress, WriteMode};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Remote side
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RemoteState {
    exists: bool,
    bytes: Vec<u8>,
    opens: Vec<(String, WriteMode, u64)>,
    stat_calls: usize,
    shut_down: bool,
    released: bool,
}

pub struct MockSession {
    state: Arc<Mutex<RemoteState>>,
    fail_stat: bool,
    fail_open: bool,
    fail_write_after: Option<u64>,
    fail_shutdown: bool,
    write_delay: Option<Duration>,
}

impl MockSession {
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(RemoteState::default())),
            fail_stat: false,
            fail_open: false,
            fail_write_after: None,
            fail_shutdown: false,
            write_delay: None,
        }
    }

    pub fn existing(bytes: Vec<u8>) -> Self {
        let session = Self::empty();
        {
            let mut s = session.state.lock().unwrap();
            s.exists = true;
            s.bytes = bytes;
        }
        session
    }

    pub fn fail_stat(mut self) -> Self {
        self.fail_stat = true;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn fail_write_after(mut self, bytes: u64) -> Self {
        self.fail_write_after = Some(bytes);
        self
    }

    /// Pending writes are rejected when the file is closed.
    pub fn fail_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn opens(&self) -> Vec<(String, WriteMode, u64)> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn remote_bytes(&self) -> Vec<u8> {
        self.state.lock().unwrap().bytes.clone()
    }

    pub fn stat_calls(&self) -> usize {
        self.state.lock().unwrap().stat_calls
    }

    pub fn writer_shut_down(&self) -> bool {
        self.state.lock().unwrap().shut_down
    }

    pub fn writer_released(&self) -> bool {
        self.state.lock().unwrap().released
    }
}

impl RemoteSession for MockSession {
    fn stat<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<RemoteFileState, TransferError>> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.stat_calls += 1;
            if self.fail_stat {
                return Err(TransferError::Query {
                    path: path.to_string(),
                    reason: "permission denied".into(),
                });
            }
            if s.exists {
                Ok(RemoteFileState::Exists {
                    size: s.bytes.len() as u64,
                })
            } else {
                Ok(RemoteFileState::NotFound)
            }
        })
    }

    fn open_write<'a>(
        &'a self,
        path: &'a str,
        mode: WriteMode,
        offset: u64,
    ) -> BoxFuture<'a, Result<RemoteWriter, TransferError>> {
        Box::pin(async move {
            if self.fail_open {
                return Err(TransferError::remote(
                    "open",
                    Error::new(ErrorKind::PermissionDenied, "permission denied"),
                ));
            }
            {
                let mut s = self.state.lock().unwrap();
                s.opens.push((path.to_string(), mode, offset));
                s.exists = true;
                s.shut_down = false;
                s.released = false;
                match mode {
                    WriteMode::Truncate => s.bytes.clear(),
                    WriteMode::Append => s.bytes.truncate(offset as usize),
                }
            }
            let writer = MockWriter {
                state: Arc::clone(&self.state),
                written: 0,
                fail_after: self.fail_write_after,
                fail_shutdown: self.fail_shutdown,
                delay: self.write_delay,
                sleep: None,
            };
            Ok(Box::new(writer) as RemoteWriter)
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransferError>> {
        Box::pin(async { Ok(()) })
    }
}

struct MockWriter {
    state: Arc<Mutex<RemoteState>>,
    written: u64,
    fail_after: Option<u64>,
    fail_shutdown: bool,
    delay: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl AsyncWrite for MockWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = &mut *self;
        if let Some(delay) = this.delay {
            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep(delay)));
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
        }
        if let Some(limit) = this.fail_after
            && this.written >= limit
        {
            return Poll::Ready(Err(Error::new(
                ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        this.state.lock().unwrap().bytes.extend_from_slice(buf);
        this.written += buf.len() as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.state.lock().unwrap().shut_down = true;
        if self.fail_shutdown {
            return Poll::Ready(Err(Error::other("write failed: quota exceeded")));
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for MockWriter {
    fn drop(&mut self) {
        if let Ok(mut s) = self.state.lock() {
            s.released = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Local side
// ---------------------------------------------------------------------------

pub struct MockSource {
    data: Arc<Vec<u8>>,
    size_hint: u64,
    fail_open: bool,
    fail_read_after: Option<usize>,
    opened: Mutex<Vec<u64>>,
    released: Arc<AtomicBool>,
}

impl MockSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            size_hint: data.len() as u64,
            data: Arc::new(data),
            fail_open: false,
            fail_read_after: None,
            opened: Mutex::new(Vec::new()),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = size;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn fail_read_after(mut self, bytes: usize) -> Self {
        self.fail_read_after = Some(bytes);
        self
    }

    pub fn opened_offsets(&self) -> Vec<u64> {
        self.opened.lock().unwrap().clone()
    }

    pub fn reader_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl LocalSource for MockSource {
    fn size(&self) -> u64 {
        self.size_hint
    }

    fn open_at(&self, offset: u64) -> BoxFuture<'_, Result<LocalReader, TransferError>> {
        Box::pin(async move {
            if self.fail_open {
                return Err(TransferError::local(
                    "open",
                    Error::new(ErrorKind::NotFound, "no such file"),
                ));
            }
            self.opened.lock().unwrap().push(offset);
            let reader = MockReader {
                data: Arc::clone(&self.data),
                pos: (offset as usize).min(self.data.len()),
                read: 0,
                fail_after: self.fail_read_after,
                released: Arc::clone(&self.released),
            };
            Ok(Box::new(reader) as LocalReader)
        })
    }
}

struct MockReader {
    data: Arc<Vec<u8>>,
    pos: usize,
    read: usize,
    fail_after: Option<usize>,
    released: Arc<AtomicBool>,
}

impl AsyncRead for MockReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = &mut *self;
        if let Some(limit) = this.fail_after
            && this.read >= limit
        {
            return Poll::Ready(Err(Error::other("bad sector")));
        }
        let remaining = &this.data[this.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        this.pos += n;
        this.read += n;
        Poll::Ready(Ok(()))
    }
}

impl Drop for MockReader {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Answers every conflict with a fixed free-form string.
pub struct AnswerDecider {
    answer: String,
    calls: Mutex<Vec<String>>,
}

impl AnswerDecider {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl OverwriteDecider for AnswerDecider {
    fn decide<'a>(
        &'a self,
        remote_path: &'a str,
    ) -> BoxFuture<'a, Result<ConflictDecision, TransferError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(remote_path.to_string());
            Ok(ConflictDecision::from_answer(&self.answer))
        })
    }
}

/// A decider whose input source is gone.
pub struct FailingDecider;

impl OverwriteDecider for FailingDecider {
    fn decide<'a>(
        &'a self,
        _remote_path: &'a str,
    ) -> BoxFuture<'a, Result<ConflictDecision, TransferError>> {
        Box::pin(async { Err(TransferError::Decision("stdin closed".into())) })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<(TransferProgress, Option<String>)>>,
}

impl RecordingSink {
    /// `(percent, speed)` pairs in call order.
    pub fn calls(&self) -> Vec<(u8, Option<String>)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(p, speed)| (p.percent, speed.clone()))
            .collect()
    }

    /// Cumulative byte counts in call order.
    pub fn bytes(&self) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.bytes_transferred)
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, progress: TransferProgress, speed: Option<&str>) {
        self.calls
            .lock()
            .unwrap()
            .push((progress, speed.map(str::to_string)));
    }
}
