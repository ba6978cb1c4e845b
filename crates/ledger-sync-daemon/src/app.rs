//! Engine wiring and the two commands.

use anyhow::Context;
use ledger_config_and_utils::{Config, Paths};
use std::sync::Arc;
use sync_protocol_client::{HttpSyncClient, SyncTransport};
use sync_protocol_types::{SyncOptions, TenantId};
use sync_scheduler::{LedgerReconciler, SyncScheduler};
use tenant_database::{TenantDatabaseRegistry, TenantStorage};
use tracing::{debug, error, info, warn};

/// Build the scheduler with file-backed tenant databases and the HTTP client.
pub fn build_scheduler(config: &Config, paths: &Paths) -> anyhow::Result<SyncScheduler> {
    let registry = Arc::new(TenantDatabaseRegistry::new(TenantStorage::Directory(
        paths.tenants_dir(),
    )));
    let client = HttpSyncClient::new(
        &config.api_url,
        config.request_timeout(),
        config.auth_token.clone(),
    )
    .context("failed to create sync client")?;
    let transport: Arc<dyn SyncTransport> = Arc::new(client);
    let reconciler = Arc::new(LedgerReconciler::new(config.schema_version));

    Ok(SyncScheduler::new(registry, transport, reconciler))
}

/// Run a single sync for `tenant`.
pub async fn sync_once(
    config: &Config,
    paths: &Paths,
    tenant: String,
    replacement: bool,
) -> anyhow::Result<()> {
    let scheduler = build_scheduler(config, paths)?;
    let tenant_id = TenantId::new(tenant);
    let options = SyncOptions { replacement };

    info!(tenant_id = %tenant_id, replacement, api_url = %config.api_url, "Syncing tenant");
    match scheduler.sync(tenant_id.clone(), options).await {
        Ok(()) => {
            info!(tenant_id = %tenant_id, "Tenant synced");
            Ok(())
        }
        Err(e) => {
            error!(tenant_id = %tenant_id, error = %e, "Tenant sync failed");
            Err(e).with_context(|| format!("sync failed for tenant {tenant_id}"))
        }
    }
}

/// Sync `tenants` now and then on the auto-sync interval until Ctrl-C.
pub async fn run(config: &Config, paths: &Paths, tenants: Vec<String>) -> anyhow::Result<()> {
    let scheduler = build_scheduler(config, paths)?;

    for tenant in tenants {
        let tenant_id = TenantId::new(tenant);
        let db = scheduler
            .registry()
            .get(&tenant_id)
            .await
            .with_context(|| format!("failed to open database for tenant {tenant_id}"))?;
        db.health_check().await?;
    }

    let observer = scheduler
        .signal()
        .observe(|syncing| debug!(syncing, "Sync signal changed"));

    let initial: Vec<_> = scheduler
        .registry()
        .list_known_tenant_ids()
        .into_iter()
        .map(|tenant_id| scheduler.sync(tenant_id, SyncOptions::default()))
        .collect();
    for completion in initial {
        let tenant_id = completion.tenant_id().clone();
        if let Err(e) = completion.await {
            warn!(tenant_id = %tenant_id, error = %e, "Initial sync failed");
        }
    }

    let auto_sync = scheduler.start_auto_sync(config.auto_sync_interval());
    info!(
        tenants = scheduler.registry().len(),
        interval_ms = config.auto_sync_interval_ms,
        "Sync daemon running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    auto_sync.stop();
    scheduler.signal().unobserve(observer);
    info!(queue_depth = scheduler.queue_depth(), "Sync daemon stopped");
    Ok(())
}
