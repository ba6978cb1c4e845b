//! A transport bound to one tenant and one sync request.

use crate::{SyncTransport, TransportResult};
use std::sync::Arc;
use sync_protocol_types::{
    ChangeSet, MigrationDescriptor, PullRequest, PullResult, PushRequest, PushResult, TenantId,
};

/// The pull and push functions handed to a reconciler.
///
/// The tenant id and replacement flag are fixed when the run starts, so the
/// reconciler cannot pull for the wrong tenant or drop the flag.
#[derive(Clone)]
pub struct TenantRemote {
    tenant_id: TenantId,
    transport: Arc<dyn SyncTransport>,
    replacement: bool,
}

impl TenantRemote {
    pub fn new(tenant_id: TenantId, transport: Arc<dyn SyncTransport>, replacement: bool) -> Self {
        Self {
            tenant_id,
            transport,
            replacement,
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn replacement(&self) -> bool {
        self.replacement
    }

    pub async fn pull(
        &self,
        last_pulled_at: Option<i64>,
        schema_version: i64,
        migration: Option<MigrationDescriptor>,
    ) -> TransportResult<PullResult> {
        let request = PullRequest {
            last_pulled_at,
            schema_version,
            migration,
            replacement: self.replacement,
        };
        self.transport.pull(&self.tenant_id, request).await
    }

    pub async fn push(&self, last_pulled_at: i64, changes: ChangeSet) -> TransportResult<PushResult> {
        let request = PushRequest {
            last_pulled_at,
            changes,
        };
        self.transport.push(&self.tenant_id, request).await
    }
}

impl std::fmt::Debug for TenantRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRemote")
            .field("tenant_id", &self.tenant_id)
            .field("replacement", &self.replacement)
            .finish()
    }
}
