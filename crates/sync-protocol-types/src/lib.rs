//! Wire types for the two-phase pull/push sync protocol.
//!
//! Pure data: serde definitions and query encoding shared by the tenant
//! database, the HTTP client, and the scheduler.

mod changes;
mod messages;
mod tenant;

pub use changes::{record_id, ChangeSet, TableChanges};
pub use messages::{
    MigrationColumns, MigrationDescriptor, PullRequest, PullResult, PushRequest, PushResult,
    SyncOptions, PULL_PATH, PUSH_PATH, TENANT_ID_HEADER,
};
pub use tenant::TenantId;
