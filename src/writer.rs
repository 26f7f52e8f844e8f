//! Dedicated writer task for one connection.
//!
//! Requests are handed to the writer task through an mpsc channel instead of
//! sharing the socket write half behind a mutex. The task batches whatever is
//! queued into a single vectored write.
//!
//! ```text
//! send() ─┐
//! send() ─┼─► mpsc::Sender<OutboundPackage> ─► Writer Task ─► socket
//! send() ─┘
//! ```
//!
//! Dropping every [`WriterHandle`] closes the channel; the task then exits
//! and drops the write half, which closes the socket's sending side.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ClientError, Result};
use crate::protocol::{Header, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum packages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A package ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundPackage {
    /// Pre-encoded header (8 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (empty for ping).
    pub payload: Bytes,
}

impl OutboundPackage {
    /// Create a new outbound package.
    #[inline]
    pub fn new(tp: u8, id: u16, payload: Bytes) -> Self {
        Self {
            header: Header::new(tp, id, payload.len() as u32).encode(),
            payload,
        }
    }

    /// Total size of this package (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Handle for queueing packages on the writer task.
///
/// Cheaply cloneable. Queueing never waits: a full queue is reported as
/// [`ClientError::Backpressure`] so callers can queue while holding a lock.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundPackage>,
}

impl WriterHandle {
    /// Queue a package without waiting.
    pub fn try_send(&self, package: OutboundPackage) -> Result<()> {
        self.tx.try_send(package).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => ClientError::ConnectionLost,
        })
    }

    /// Check if the writer task has stopped.
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing packages.
///
/// The returned `JoinHandle` completes when every handle is dropped or a
/// write fails.
pub fn spawn_writer_task<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));

    (WriterHandle { tx }, task)
}

/// A handle whose queue is drained by the test instead of a writer task.
#[cfg(test)]
pub(crate) fn test_channel(capacity: usize) -> (WriterHandle, mpsc::Receiver<OutboundPackage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (WriterHandle { tx }, rx)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundPackage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(p) => p,
            None => {
                let _ = writer.shutdown().await;
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(p) => batch.push(p),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::warn!("write failed: {}", e);
            return Err(e);
        }
    }
}

/// Write a batch of packages using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundPackage]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|p| p.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after `skip_bytes` already written.
fn build_remaining_slices(batch: &[OutboundPackage], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for package in batch {
        for part in [&package.header[..], &package.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
