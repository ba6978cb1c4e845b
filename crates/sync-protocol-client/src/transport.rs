use crate::TransportResult;
use async_trait::async_trait;
use sync_protocol_types::{PullRequest, PullResult, PushRequest, PushResult, TenantId};

/// Remote end of the sync protocol.
///
/// Implementations must not retry; a failed call is reported once and the
/// caller decides what to do next.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetch changes newer than the request's watermark.
    async fn pull(&self, tenant_id: &TenantId, request: PullRequest) -> TransportResult<PullResult>;

    /// Send locally accumulated changes.
    async fn push(&self, tenant_id: &TenantId, request: PushRequest) -> TransportResult<PushResult>;
}
