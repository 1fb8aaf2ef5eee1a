use std::sync::Arc;

use anyhow::Context;

use mekgoro_infra::backup::{self, BackupSink};
use mekgoro_infra::config::AppConfig;
use mekgoro_infra::store::{self, LedgerStore};
use mekgoro_infra::{LedgerService, RetryPolicy};

/// Shared state handed to every handler.
pub struct AppServices {
    pub ledger: LedgerService<Arc<dyn LedgerStore>>,
    pub backup_sink: Option<Arc<dyn BackupSink>>,
    /// Movement page size when a request gives no `limit`.
    pub history_limit: u32,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        retry: RetryPolicy,
        backup_sink: Option<Arc<dyn BackupSink>>,
        history_limit: u32,
    ) -> Self {
        Self {
            ledger: LedgerService::with_retry(store, retry),
            backup_sink,
            history_limit,
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store = store::open(&config.database_url)
        .await
        .with_context(|| format!("failed to open ledger store at {}", config.database_url))?;

    let backup_sink = backup::sink_from_config(&config.backup).context("failed to set up backup destination")?;
    if backup_sink.is_none() {
        tracing::warn!("no BACKUP_URL or BACKUP_DIR set; POST /backup will fail");
    }

    Ok(AppServices::new(
        store,
        RetryPolicy::new(config.commit_retries),
        backup_sink,
        config.history_limit,
    ))
}
