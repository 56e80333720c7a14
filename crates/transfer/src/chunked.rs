use std::io::ErrorKind;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::session::LocalReader;

type ChunkResult = std::io::Result<Vec<u8>>;

// ---------------------------------------------------------------------------
// ChunkPipe
// ---------------------------------------------------------------------------

/// Bounded producer/consumer pipe between a local reader and the uploader.
///
/// A background task reads fixed-size chunks and pushes them into a channel
/// of `depth` slots. It blocks as soon as the consumer falls behind, so at
/// most `depth + 1` chunks are held in memory. The task owns the reader and
/// is aborted when the pipe is closed or dropped.
pub struct ChunkPipe {
    rx: mpsc::Receiver<ChunkResult>,
    task: Option<JoinHandle<()>>,
}

impl ChunkPipe {
    /// Starts reading up to `limit` bytes from `reader`.
    ///
    /// `chunk_size` and `depth` of 0 are treated as 1.
    pub fn spawn(reader: LocalReader, limit: u64, chunk_size: usize, depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let task = tokio::spawn(produce(reader, limit, chunk_size.max(1), tx));
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Waits for the next chunk. Returns `None` once the reader is exhausted.
    pub async fn next_chunk(&mut self) -> Option<ChunkResult> {
        self.rx.recv().await
    }

    /// Stops the reader task and waits until it has released the reader.
    pub async fn close(mut self) {
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await
                && e.is_panic()
            {
                warn!("chunk reader task panicked: {e}");
            }
        }
    }
}

impl Drop for ChunkPipe {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn produce(
    reader: LocalReader,
    limit: u64,
    chunk_size: usize,
    tx: mpsc::Sender<ChunkResult>,
) {
    let mut reader = reader.take(limit);
    let mut offset: u64 = 0;

    loop {
        let mut buf = vec![0u8; chunk_size];
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        };
        buf.truncate(n);
        trace!(offset, size = n, "chunk read");
        offset += n as u64;

        // The consumer hung up; nothing left to do.
        if tx.send(Ok(buf)).await.is_err() {
            break;
        }
    }
}
