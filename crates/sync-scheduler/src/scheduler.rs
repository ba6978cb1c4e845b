//! The single-flight sync engine.

use crate::{
    AutoSyncHandle, AutoSyncTimer, Reconciler, SyncError, SyncQueue, SyncRequest, SyncResult,
    SyncSignal,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use sync_protocol_client::{SyncTransport, TenantRemote};
use sync_protocol_types::{SyncOptions, TenantId};
use tenant_database::TenantDatabaseRegistry;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Future for one sync request.
///
/// Resolves when that request has run, whatever its queue position.
/// Dropping it does not cancel the request.
#[derive(Debug)]
pub struct SyncCompletion {
    request_id: Uuid,
    tenant_id: TenantId,
    rx: oneshot::Receiver<SyncResult<()>>,
}

impl SyncCompletion {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl Future for SyncCompletion {
    type Output = SyncResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(SyncError::SchedulerStopped)))
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    queue: SyncQueue,
    /// Tenant of the request holding the in-flight slot.
    active: Option<TenantId>,
}

struct SchedulerInner {
    registry: Arc<TenantDatabaseRegistry>,
    transport: Arc<dyn SyncTransport>,
    reconciler: Arc<dyn Reconciler>,
    state: Mutex<SchedulerState>,
    signal: SyncSignal,
}

/// Runs sync requests one at a time across all tenants.
///
/// Requests arriving while a sync is running are queued in arrival order.
/// A single worker task drains the queue; it exits when the queue is empty
/// and is respawned by the next request. A failed run only fails its own
/// caller; the worker always moves on to the next request.
///
/// Cheap to clone; clones share the same queue and signal. Must be used
/// from within a Tokio runtime.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl SyncScheduler {
    pub fn new(
        registry: Arc<TenantDatabaseRegistry>,
        transport: Arc<dyn SyncTransport>,
        reconciler: Arc<dyn Reconciler>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                transport,
                reconciler,
                state: Mutex::new(SchedulerState::default()),
                signal: SyncSignal::new(),
            }),
        }
    }

    /// Request a sync for `tenant_id`.
    ///
    /// The request is queued before this returns, so call order is run
    /// order. Runs immediately when nothing else is running or waiting.
    pub fn sync(&self, tenant_id: impl Into<TenantId>, options: SyncOptions) -> SyncCompletion {
        let tenant_id = tenant_id.into();
        let (request, rx) = SyncRequest::new(tenant_id.clone(), options);
        let completion = SyncCompletion {
            request_id: request.request_id,
            tenant_id,
            rx,
        };

        let mut state = self.inner.lock_state();
        if state.active.is_none() && state.queue.is_empty() {
            state.active = Some(request.tenant_id.clone());
            drop(state);
            debug!(tenant_id = %completion.tenant_id, request_id = %completion.request_id, "Sync starting immediately");
            self.spawn_worker(request);
        } else {
            state.queue.enqueue(request);
            debug!(
                tenant_id = %completion.tenant_id,
                request_id = %completion.request_id,
                queue_depth = state.queue.len(),
                "Sync queued"
            );
        }

        completion
    }

    /// Start the next queued request if nothing is running.
    ///
    /// Returns true when a run was started. Safe to call at any time.
    pub fn drain(&self) -> bool {
        let mut state = self.inner.lock_state();
        if state.active.is_some() {
            return false;
        }
        let Some(next) = state.queue.dequeue_next() else {
            return false;
        };
        state.active = Some(next.tenant_id.clone());
        drop(state);

        self.spawn_worker(next);
        true
    }

    /// Sync every known tenant every `interval`. Stops when the handle is
    /// stopped or dropped.
    pub fn start_auto_sync(&self, interval: Duration) -> AutoSyncHandle {
        info!(interval = ?interval, "Auto-sync armed");
        AutoSyncTimer::new(self.clone(), interval).start()
    }

    pub fn registry(&self) -> &Arc<TenantDatabaseRegistry> {
        &self.inner.registry
    }

    pub fn signal(&self) -> &SyncSignal {
        &self.inner.signal
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.signal.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.signal.subscribe()
    }

    /// Number of requests waiting, not counting the running one.
    pub fn queue_depth(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    pub fn active_tenant(&self) -> Option<TenantId> {
        self.inner.lock_state().active.clone()
    }

    fn spawn_worker(&self, first: SyncRequest) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _guard = WorkerGuard {
                inner: Arc::clone(&inner),
            };
            let mut request = first;
            loop {
                inner.run(request).await;

                let mut state = inner.lock_state();
                match state.queue.dequeue_next() {
                    Some(next) => {
                        state.active = Some(next.tenant_id.clone());
                        request = next;
                    }
                    None => {
                        state.active = None;
                        break;
                    }
                }
            }
        });
    }
}

/// Frees the in-flight slot if the worker unwinds, then restarts draining.
/// The request being run is dropped, so its caller sees `SchedulerStopped`.
struct WorkerGuard {
    inner: Arc<SchedulerInner>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }

        let tenant_id = self.inner.lock_state().active.take();
        error!(tenant_id = ?tenant_id, "Sync worker panicked, releasing the in-flight slot");
        self.inner.signal.set(false);
        SyncScheduler {
            inner: Arc::clone(&self.inner),
        }
        .drain();
    }
}

impl SchedulerInner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run(&self, request: SyncRequest) {
        let tenant_id = request.tenant_id.clone();
        let request_id = request.request_id;
        let waited_ms =
            u64::try_from(request.enqueued_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.signal.set(true);
        info!(
            tenant_id = %tenant_id,
            request_id = %request_id,
            replacement = request.options.replacement,
            waited_ms,
            "Sync started"
        );

        let result = self.execute(&tenant_id, request.options).await;
        match &result {
            Ok(()) => info!(tenant_id = %tenant_id, request_id = %request_id, "Sync complete"),
            Err(e) => warn!(tenant_id = %tenant_id, request_id = %request_id, error = %e, "Sync failed"),
        }

        self.signal.set(false);
        if !request.complete(result) {
            debug!(tenant_id = %tenant_id, request_id = %request_id, "Sync caller went away");
        }
    }

    async fn execute(&self, tenant_id: &TenantId, options: SyncOptions) -> SyncResult<()> {
        let db = self.registry.get(tenant_id).await?;
        let remote = TenantRemote::new(
            tenant_id.clone(),
            Arc::clone(&self.transport),
            options.replacement,
        );
        let reconciler = Arc::clone(&self.reconciler);

        let task = tokio::spawn(async move { reconciler.reconcile(&db, &remote).await });
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                error!(tenant_id = %tenant_id, "Reconciler panicked");
                Err(SyncError::Reconciliation("reconciler panicked".to_string()))
            }
            Err(e) => Err(SyncError::Reconciliation(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockTransport};
    use crate::LedgerReconciler;
    use async_trait::async_trait;
    use serde_json::json;
    use sync_protocol_client::TransportError;
    use sync_protocol_types::ChangeSet;
    use tenant_database::TenantDatabase;

    fn scheduler_with(transport: &Arc<MockTransport>) -> SyncScheduler {
        let transport: Arc<dyn SyncTransport> = transport.clone();
        SyncScheduler::new(
            Arc::new(TenantDatabaseRegistry::in_memory()),
            transport,
            Arc::new(LedgerReconciler::new(1)),
        )
    }

    fn incremental() -> SyncOptions {
        SyncOptions::default()
    }

    #[tokio::test]
    async fn first_sync_pulls_with_empty_watermark_then_pushes() {
        let transport = MockTransport::new();
        let mut changes = ChangeSet::new();
        changes
            .table_mut("accounts")
            .created
            .push(json!({ "id": "a1", "name": "Checking" }));
        transport.set_pull_changes(changes);
        let scheduler = scheduler_with(&transport);

        scheduler.sync("t1", incremental()).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            Call::Pull(tenant, request) => {
                assert_eq!(tenant.as_str(), "t1");
                assert_eq!(request.last_pulled_at, None);
                assert_eq!(request.query_params().unwrap()[0], ("lastPulledAt", String::new()));
            }
            other => panic!("expected pull first, got {other:?}"),
        }
        match &calls[1] {
            Call::Push(tenant, request) => {
                assert_eq!(tenant.as_str(), "t1");
                assert_eq!(request.last_pulled_at, 1000);
            }
            other => panic!("expected push second, got {other:?}"),
        }

        let db = scheduler.registry().get(&TenantId::new("t1")).await.unwrap();
        assert!(db.get_record("accounts", "a1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn repeated_request_sees_previous_watermark() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);
        transport.hold();

        let first = scheduler.sync("t1", incremental());
        transport.wait_for_pulls(1).await;
        let second = scheduler.sync("t1", incremental());
        assert_eq!(scheduler.queue_depth(), 1);
        assert_eq!(scheduler.active_tenant(), Some(TenantId::new("t1")));

        transport.release();
        first.await.unwrap();
        second.await.unwrap();

        let watermarks: Vec<Option<i64>> = transport
            .pulls()
            .into_iter()
            .map(|(_, request)| request.last_pulled_at)
            .collect();
        assert_eq!(watermarks, vec![None, Some(1000)]);
    }

    #[tokio::test]
    async fn replacement_flag_reaches_pull_despite_watermark() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);

        scheduler.sync("t1", incremental()).await.unwrap();
        scheduler.sync("t1", SyncOptions::replacement()).await.unwrap();

        let pulls = transport.pulls();
        assert!(!pulls[0].1.replacement);
        assert!(pulls[1].1.replacement);
        let params = pulls[1].1.query_params().unwrap();
        assert!(params.contains(&("replacement", "true".to_string())));
    }

    #[tokio::test]
    async fn transport_failure_rejects_only_that_request() {
        let transport = MockTransport::new();
        transport.fail_pulls_for("t1");
        let scheduler = scheduler_with(&transport);

        let err = scheduler.sync("t1", incremental()).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Transport(TransportError::Status { status: 503, .. })
        ));
        assert!(!scheduler.is_syncing());

        scheduler.sync("t2", incremental()).await.unwrap();
        assert_eq!(transport.pushes().len(), 1);
    }

    #[tokio::test]
    async fn failure_does_not_affect_queued_requests() {
        let transport = MockTransport::new();
        transport.fail_pulls_for("bad");
        let scheduler = scheduler_with(&transport);
        transport.hold();

        let failing = scheduler.sync("bad", incremental());
        transport.wait_for_pulls(1).await;
        let queued_same = scheduler.sync("bad", incremental());
        let queued_other = scheduler.sync("good", incremental());
        transport.release();

        assert!(failing.await.is_err());
        assert!(queued_same.await.is_err());
        queued_other.await.unwrap();
        assert_eq!(transport.pulled_tenants(), vec!["bad", "bad", "good"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_never_overlap() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);

        let mut callers = Vec::new();
        for caller in 0..6 {
            let scheduler = scheduler.clone();
            callers.push(tokio::spawn(async move {
                let mut completions = Vec::new();
                for round in 0..4 {
                    let tenant = format!("t{}", (caller + round) % 3);
                    completions.push(scheduler.sync(tenant, incremental()));
                }
                for completion in completions {
                    completion.await.unwrap();
                }
            }));
        }
        for caller in callers {
            caller.await.unwrap();
        }

        assert_eq!(transport.pulls().len(), 24);
        assert_eq!(transport.pushes().len(), 24);
        assert_eq!(transport.max_in_flight(), 1);
        assert!(!scheduler.is_syncing());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_request_settles_exactly_once() {
        let transport = MockTransport::new();
        transport.fail_pulls_for("flaky");
        let scheduler = scheduler_with(&transport);

        let completions: Vec<_> = (0..20)
            .map(|i| {
                let tenant = if i % 4 == 0 { "flaky" } else { "steady" };
                scheduler.sync(tenant, incremental())
            })
            .collect();

        let mut ok = 0;
        let mut failed = 0;
        for completion in completions {
            match completion.await {
                Ok(()) => ok += 1,
                Err(SyncError::Transport(_)) => failed += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 15);
        assert_eq!(failed, 5);
        assert_eq!(scheduler.queue_depth(), 0);
    }

    #[tokio::test]
    async fn queued_requests_run_in_arrival_order() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);
        transport.hold();

        let mut completions = vec![scheduler.sync("a", incremental())];
        transport.wait_for_pulls(1).await;
        for tenant in ["d", "b", "c", "b"] {
            completions.push(scheduler.sync(tenant, incremental()));
        }
        assert_eq!(scheduler.queue_depth(), 4);

        transport.release();
        for completion in completions {
            completion.await.unwrap();
        }
        assert_eq!(transport.pulled_tenants(), vec!["a", "d", "b", "c", "b"]);
    }

    #[tokio::test]
    async fn signal_is_true_only_while_running() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);
        let transitions = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&transitions);
        scheduler
            .signal()
            .observe(move |value| sink.lock().unwrap().push(value));

        transport.hold();
        let first = scheduler.sync("t1", incremental());
        transport.wait_for_pulls(1).await;
        assert!(scheduler.is_syncing());
        let second = scheduler.sync("t2", incremental());

        transport.release();
        first.await.unwrap();
        second.await.unwrap();

        assert!(!scheduler.is_syncing());
        assert_eq!(
            *transitions.lock().unwrap(),
            vec![false, true, false, true, false]
        );
    }

    #[tokio::test]
    async fn dropped_completion_still_runs() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);

        drop(scheduler.sync("t1", incremental()));
        scheduler.sync("t1", incremental()).await.unwrap();

        assert_eq!(transport.pulls().len(), 2);
    }

    #[tokio::test]
    async fn drain_is_idempotent_when_idle() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);

        assert!(!scheduler.drain());
        assert!(!scheduler.drain());

        scheduler.sync("t1", incremental()).await.unwrap();
        assert!(!scheduler.drain());
        assert_eq!(transport.pulls().len(), 1);
    }

    #[tokio::test]
    async fn local_changes_are_pushed_and_marked_synced() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);
        let db = scheduler.registry().get(&TenantId::new("t1")).await.unwrap();
        db.upsert_local("transactions", "tx1", json!({ "amount": 1250 }))
            .await
            .unwrap();

        scheduler.sync("t1", incremental()).await.unwrap();

        let pushes = transport.pushes();
        let pushed = pushes[0].1.changes.table("transactions").unwrap();
        assert_eq!(pushed.created, vec![json!({ "id": "tx1", "amount": 1250 })]);
        assert!(db.pending_changes().await.unwrap().is_empty());
    }

    struct PanickingReconciler;

    #[async_trait]
    impl Reconciler for PanickingReconciler {
        async fn reconcile(&self, db: &TenantDatabase, _remote: &TenantRemote) -> SyncResult<()> {
            if db.tenant_id().as_str() == "boom" {
                panic!("merge exploded");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn reconciler_panic_fails_only_that_request() {
        let transport: Arc<dyn SyncTransport> = MockTransport::new();
        let scheduler = SyncScheduler::new(
            Arc::new(TenantDatabaseRegistry::in_memory()),
            transport,
            Arc::new(PanickingReconciler),
        );

        let boom = scheduler.sync("boom", incremental());
        let fine = scheduler.sync("fine", incremental());

        assert!(matches!(boom.await, Err(SyncError::Reconciliation(_))));
        fine.await.unwrap();
        assert!(!scheduler.is_syncing());
    }

    #[tokio::test]
    async fn panicking_observer_does_not_stall_later_requests() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);
        scheduler.signal().observe(|syncing| {
            if syncing {
                panic!("observer failure");
            }
        });

        scheduler.sync("t1", incremental()).await.unwrap();
        let second = scheduler.sync("t2", incremental());
        tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("second sync settles")
            .unwrap();

        assert!(!scheduler.is_syncing());
        assert_eq!(scheduler.queue_depth(), 0);
    }

    #[tokio::test]
    async fn unwinding_worker_releases_slot_and_drains() {
        let transport = MockTransport::new();
        let scheduler = scheduler_with(&transport);
        scheduler.inner.lock_state().active = Some(TenantId::new("stuck"));
        scheduler.inner.signal.set(true);
        let queued = scheduler.sync("t1", incremental());
        assert_eq!(scheduler.queue_depth(), 1);

        let inner = Arc::clone(&scheduler.inner);
        let worker = tokio::spawn(async move {
            let _guard = WorkerGuard { inner };
            panic!("worker failure");
        });
        assert!(worker.await.unwrap_err().is_panic());

        queued.await.unwrap();
        assert_eq!(transport.pulled_tenants(), vec!["t1"]);
        assert!(!scheduler.is_syncing());
    }
}
