//! In-process transport for engine tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_protocol_client::{SyncTransport, TransportError, TransportResult};
use sync_protocol_types::{ChangeSet, PullRequest, PullResult, PushRequest, PushResult, TenantId};
use tokio::sync::{watch, Semaphore};

#[derive(Debug, Clone)]
pub(crate) enum Call {
    Pull(TenantId, PullRequest),
    Push(TenantId, PushRequest),
}

/// Records every call, can hold pulls open, and can fail on demand.
///
/// Pull timestamps count up from 1000 in steps of 1000.
pub(crate) struct MockTransport {
    calls: Mutex<Vec<Call>>,
    pull_changes: Mutex<ChangeSet>,
    failing_pulls: Mutex<HashSet<TenantId>>,
    failing_pushes: Mutex<HashSet<TenantId>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    next_timestamp: AtomicI64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pulls_started: watch::Sender<usize>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        let (pulls_started, _rx) = watch::channel(0);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            pull_changes: Mutex::new(ChangeSet::new()),
            failing_pulls: Mutex::new(HashSet::new()),
            failing_pushes: Mutex::new(HashSet::new()),
            gate: Mutex::new(None),
            next_timestamp: AtomicI64::new(1000),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            pulls_started,
        })
    }

    /// Changes returned by every pull.
    pub(crate) fn set_pull_changes(&self, changes: ChangeSet) {
        *self.pull_changes.lock().unwrap() = changes;
    }

    pub(crate) fn fail_pulls_for(&self, tenant: &str) {
        self.failing_pulls.lock().unwrap().insert(TenantId::new(tenant));
    }

    pub(crate) fn fail_pushes_for(&self, tenant: &str) {
        self.failing_pushes.lock().unwrap().insert(TenantId::new(tenant));
    }

    /// Block every pull until [`release`](Self::release).
    pub(crate) fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.close();
        }
    }

    /// Wait until at least `count` pulls have started.
    pub(crate) async fn wait_for_pulls(&self, count: usize) {
        let mut rx = self.pulls_started.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|n| *n >= count))
            .await
            .expect("timed out waiting for pulls")
            .expect("pull counter dropped");
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn pulls(&self) -> Vec<(TenantId, PullRequest)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Pull(tenant, request) => Some((tenant, request)),
                Call::Push(..) => None,
            })
            .collect()
    }

    pub(crate) fn pushes(&self) -> Vec<(TenantId, PushRequest)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Push(tenant, request) => Some((tenant, request)),
                Call::Pull(..) => None,
            })
            .collect()
    }

    pub(crate) fn pulled_tenants(&self) -> Vec<String> {
        self.pulls()
            .into_iter()
            .map(|(tenant, _)| tenant.into_inner())
            .collect()
    }

    /// Highest number of calls ever running at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn pull(&self, tenant_id: &TenantId, request: PullRequest) -> TransportResult<PullResult> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Pull(tenant_id.clone(), request));
        self.pulls_started.send_modify(|n| *n += 1);

        self.enter().await;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }

        let result = if self.failing_pulls.lock().unwrap().contains(tenant_id) {
            Err(TransportError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        } else {
            Ok(PullResult {
                changes: self.pull_changes.lock().unwrap().clone(),
                timestamp: self.next_timestamp.fetch_add(1000, Ordering::SeqCst),
            })
        };
        self.exit();
        result
    }

    async fn push(&self, tenant_id: &TenantId, request: PushRequest) -> TransportResult<PushResult> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Push(tenant_id.clone(), request));

        self.enter().await;
        let result = if self.failing_pushes.lock().unwrap().contains(tenant_id) {
            Err(TransportError::Status {
                status: 500,
                body: "push rejected".into(),
            })
        } else {
            Ok(PushResult::default())
        };
        self.exit();
        result
    }
}
