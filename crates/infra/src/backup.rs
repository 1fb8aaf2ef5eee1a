//! Off-box backups of the full ledger and movement log.
//!
//! A backup is a read-only operation: the snapshot comes from one consistent
//! read, and a failing sink never touches stored state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use mekgoro_core::LedgerError;
use mekgoro_inventory::{MovementRecord, StockEntry};

use crate::config::BackupConfig;
use crate::service::LedgerService;
use crate::store::{LedgerStore, SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("backup write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("backup upload failed: {0}")]
    Http(String),

    #[error("no backup destination configured")]
    NotConfigured,

    #[error("could not read ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        BackupError::Http(err.to_string())
    }
}

/// Self-describing backup document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub backup_id: Uuid,
    pub schema_version: u32,
    pub taken_at: DateTime<Utc>,
    pub entries: Vec<StockEntry>,
    pub movements: Vec<MovementRecord>,
}

impl LedgerSnapshot {
    /// File/object name for this snapshot.
    pub fn file_name(&self) -> String {
        format!("mekgoro-backup-{}.json", self.taken_at.format("%Y%m%dT%H%M%S%.6fZ"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReceipt {
    pub backup_id: Uuid,
    pub location: String,
    pub taken_at: DateTime<Utc>,
    pub entries: usize,
    pub movements: usize,
    pub bytes: usize,
}

/// Destination for serialized snapshots. Returns where the document landed.
#[async_trait]
pub trait BackupSink: Send + Sync {
    async fn put(&self, name: &str, document: Vec<u8>) -> Result<String, BackupError>;
}

#[async_trait]
impl<S> BackupSink for Arc<S>
where
    S: BackupSink + ?Sized,
{
    async fn put(&self, name: &str, document: Vec<u8>) -> Result<String, BackupError> {
        (**self).put(name, document).await
    }
}

/// Writes snapshots into a local directory.
#[derive(Debug, Clone)]
pub struct FileBackupSink {
    dir: PathBuf,
}

impl FileBackupSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BackupSink for FileBackupSink {
    async fn put(&self, name: &str, document: Vec<u8>) -> Result<String, BackupError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);

        // Renamed into place once fully written.
        let partial = self.dir.join(format!("{name}.partial"));
        tokio::fs::write(&partial, &document).await?;
        tokio::fs::rename(&partial, &path).await?;

        Ok(path.display().to_string())
    }
}

/// `PUT`s snapshots under a base URL (object storage or any HTTP endpoint).
#[derive(Debug, Clone)]
pub struct HttpBackupSink {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackupSink {
    /// `timeout` bounds the whole request, from connect to the last body byte.
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, BackupError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}

#[async_trait]
impl BackupSink for HttpBackupSink {
    async fn put(&self, name: &str, document: Vec<u8>) -> Result<String, BackupError> {
        let url = self.object_url(name);
        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(document);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackupError::Http(format!("{url} answered {status}")));
        }
        Ok(url)
    }
}

/// Pick the configured destination; a URL wins over a directory.
pub fn sink_from_config(config: &BackupConfig) -> Result<Option<Arc<dyn BackupSink>>, BackupError> {
    if let Some(url) = &config.url {
        let sink = HttpBackupSink::new(url.clone(), config.token.clone(), config.timeout)?;
        return Ok(Some(Arc::new(sink)));
    }
    Ok(config
        .dir
        .as_ref()
        .map(|dir| Arc::new(FileBackupSink::new(dir.clone())) as Arc<dyn BackupSink>))
}

/// Snapshot the ledger and hand it to `sink`.
#[tracing::instrument(skip(service, sink))]
pub async fn run_backup<S>(
    service: &LedgerService<S>,
    sink: Option<&dyn BackupSink>,
    taken_at: DateTime<Utc>,
) -> Result<BackupReceipt, BackupError>
where
    S: LedgerStore,
{
    let sink = sink.ok_or(BackupError::NotConfigured)?;
    let state = service.load_state().await?;

    let snapshot = LedgerSnapshot {
        backup_id: Uuid::now_v7(),
        schema_version: SCHEMA_VERSION,
        taken_at,
        entries: state.entries,
        movements: state.movements,
    };
    let document = serde_json::to_vec_pretty(&snapshot)?;
    let bytes = document.len();

    let location = match sink.put(&snapshot.file_name(), document).await {
        Ok(location) => location,
        Err(err) => {
            tracing::error!(backup_id = %snapshot.backup_id, error = %err, "backup failed");
            return Err(err);
        }
    };

    tracing::info!(backup_id = %snapshot.backup_id, %location, bytes, "backup written");
    Ok(BackupReceipt {
        backup_id: snapshot.backup_id,
        location,
        taken_at,
        entries: snapshot.entries.len(),
        movements: snapshot.movements.len(),
        bytes,
    })
}
