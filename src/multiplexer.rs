//! Request multiplexer.
//!
//! Correlates outgoing requests with their responses by 16-bit package id.
//! Every pending request is resolved exactly once, by whichever of these
//! happens first:
//! - a response (or error response) with its id arrives,
//! - its timeout timer fires,
//! - the transport is lost or the client is closed.
//!
//! Removal from the pending table is the single arbitration point: the
//! trigger that removes the entry resolves it, the others find nothing and
//! do nothing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{ClientError, Result, ServerError};
use crate::protocol::{proto, Package};
use crate::writer::{OutboundPackage, WriterHandle};

/// Size of the correlation id space.
pub const ID_SPACE: usize = u16::MAX as usize + 1;

struct PendingRequest {
    /// Distinguishes requests that reuse an id after wraparound.
    seq: u64,
    tx: oneshot::Sender<Result<Bytes>>,
    timer: Option<JoinHandle<()>>,
}

impl PendingRequest {
    fn resolve(self, result: Result<Bytes>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The caller may have dropped its future; nothing to deliver then.
        let _ = self.tx.send(result);
    }
}

#[derive(Default)]
struct PendingTable {
    next_id: u16,
    next_seq: u64,
    pending: HashMap<u16, PendingRequest>,
}

impl PendingTable {
    /// Next free id after the last one handed out, skipping ids still pending.
    fn allocate(&mut self) -> Result<u16> {
        if self.pending.len() >= ID_SPACE {
            return Err(ClientError::IdsExhausted(ID_SPACE));
        }
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if !self.pending.contains_key(&self.next_id) {
                return Ok(self.next_id);
            }
        }
    }
}

/// Pending request table shared by senders, the read loop and timers.
///
/// Cheaply cloneable; clones share one table.
#[derive(Clone, Default)]
pub struct Multiplexer {
    table: Arc<Mutex<PendingTable>>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        // The table holds no invariants a panicking holder could break halfway.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a request and queue it on `writer`.
    ///
    /// Allocation, registration and queueing happen under one lock, so no id
    /// is handed out twice while its request is outstanding. If queueing
    /// fails nothing is registered.
    pub fn send(
        &self,
        writer: &WriterHandle,
        tp: u8,
        payload: Bytes,
        timeout: Option<Duration>,
    ) -> Result<ResponseFuture> {
        let mut table = self.lock();
        let id = table.allocate()?;

        writer.try_send(OutboundPackage::new(tp, id, payload))?;

        table.next_seq += 1;
        let seq = table.next_seq;
        let (tx, rx) = oneshot::channel();
        let timer = timeout.map(|timeout| self.spawn_timer(id, seq, timeout));

        table.pending.insert(id, PendingRequest { seq, tx, timer });
        tracing::trace!("sent package type {} with id {}", tp, id);

        Ok(ResponseFuture { id, rx })
    }

    fn spawn_timer(&self, id: u16, seq: u64, timeout: Duration) -> JoinHandle<()> {
        let mux = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            mux.expire(id, seq);
        })
    }

    fn expire(&self, id: u16, seq: u64) {
        let request = {
            let mut table = self.lock();
            let current = table.pending.get(&id).is_some_and(|r| r.seq == seq);
            if current {
                table.pending.remove(&id)
            } else {
                None
            }
        };

        match request {
            Some(mut request) => {
                // Dropping our own handle; aborting would cancel this task.
                request.timer = None;
                tracing::debug!("request with package id {} timed out", id);
                request.resolve(Err(ClientError::Timeout(id)));
            }
            None => tracing::debug!("timed out package id {} already resolved", id),
        }
    }

    /// Resolve the pending request a response package belongs to.
    ///
    /// Returns `false` if no request was waiting for this id (duplicate or
    /// late response); the package is logged and dropped.
    pub fn resolve(&self, package: Package) -> bool {
        let id = package.id();
        let request = self.lock().pending.remove(&id);

        let request = match request {
            Some(request) => request,
            None => {
                tracing::warn!(
                    "received package id not found: {} (type {})",
                    id,
                    package.tp()
                );
                return false;
            }
        };

        let tp = package.tp();
        let result = if proto::is_response(tp) {
            Ok(package.payload)
        } else if proto::is_error(tp) {
            Err(ServerError::decode(tp, &package.payload).into())
        } else {
            Err(ClientError::Protocol(format!(
                "unexpected package type {} for id {}",
                tp, id
            )))
        };

        request.resolve(result);
        true
    }

    /// Fail and remove every pending request.
    ///
    /// Returns the number of requests failed.
    pub fn fail_all<F>(&self, error: F) -> usize
    where
        F: Fn() -> ClientError,
    {
        let drained: Vec<PendingRequest> = {
            let mut table = self.lock();
            table.pending.drain().map(|(_, request)| request).collect()
        };

        let count = drained.len();
        if count > 0 {
            tracing::error!("canceling {} requests: {}", count, error());
        }
        for request in drained {
            request.resolve(Err(error()));
        }
        count
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Check if a request with this id is waiting.
    #[cfg(test)]
    pub fn is_pending(&self, id: u16) -> bool {
        self.lock().pending.contains_key(&id)
    }
}

/// Resolves with the response payload of one request.
///
/// Dropping it does not cancel the request; the response is discarded when
/// it arrives.
#[must_use = "a request's result is only observed by awaiting its future"]
pub struct ResponseFuture {
    id: u16,
    rx: oneshot::Receiver<Result<Bytes>>,
}

impl ResponseFuture {
    /// Correlation id of the request.
    pub fn id(&self) -> u16 {
        self.id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Bytes>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The table itself went away.
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::ConnectionLost)),
            Poll::Pending => Poll::Pending,
        }
    }
}
