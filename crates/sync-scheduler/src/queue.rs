//! Global FIFO of sync requests waiting for the single in-flight slot.

use crate::SyncResult;
use std::collections::VecDeque;
use std::time::Instant;
use sync_protocol_types::{SyncOptions, TenantId};
use tokio::sync::oneshot;
use uuid::Uuid;

/// One pending sync, carrying the channel its caller is waiting on.
#[derive(Debug)]
pub struct SyncRequest {
    pub request_id: Uuid,
    pub tenant_id: TenantId,
    pub options: SyncOptions,
    pub enqueued_at: Instant,
    responder: oneshot::Sender<SyncResult<()>>,
}

impl SyncRequest {
    /// Create a request and the receiver its result will arrive on.
    pub fn new(
        tenant_id: TenantId,
        options: SyncOptions,
    ) -> (Self, oneshot::Receiver<SyncResult<()>>) {
        let (responder, rx) = oneshot::channel();
        let request = Self {
            request_id: Uuid::new_v4(),
            tenant_id,
            options,
            enqueued_at: Instant::now(),
            responder,
        };
        (request, rx)
    }

    /// Deliver the outcome to the caller. Returns false if nobody is waiting.
    pub fn complete(self, result: SyncResult<()>) -> bool {
        self.responder.send(result).is_ok()
    }
}

/// Requests in arrival order.
///
/// Not synchronized; the scheduler guards it with its state lock. Requests
/// are never merged, so the same tenant may appear more than once.
#[derive(Debug, Default)]
pub struct SyncQueue {
    pending: VecDeque<SyncRequest>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail.
    pub fn enqueue(&mut self, request: SyncRequest) {
        self.pending.push_back(request);
    }

    /// Remove and return the head.
    pub fn dequeue_next(&mut self) -> Option<SyncRequest> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Tenant ids in queue order.
    pub fn tenant_ids(&self) -> Vec<TenantId> {
        self.pending.iter().map(|r| r.tenant_id.clone()).collect()
    }
}
