use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{DraftId, PendingOrderDraft};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{DraftStoreError, Result, store::DraftStore};

/// Version of the on-disk draft record.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    draft: &'a PendingOrderDraft,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    schema_version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    draft: PendingOrderDraft,
}

/// Draft store backed by a single JSON file.
///
/// Writes go to a sibling temp file and are renamed into place, so a crash
/// mid-write leaves either the old record or the new one, never a torn file.
/// A record with a different schema version is rejected and left untouched.
#[derive(Clone)]
pub struct FileDraftStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileDraftStore {
    /// Creates a store persisting to `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "draft".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> DraftStoreError {
        DraftStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl DraftStore for FileDraftStore {
    #[tracing::instrument(skip(self, draft), fields(path = %self.path.display(), draft_id = %draft.draft_id))]
    async fn save(&self, draft: &PendingOrderDraft) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&EnvelopeRef {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            draft,
        })?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::debug!("draft saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<PendingOrderDraft>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let header: EnvelopeHeader = serde_json::from_slice(&bytes)?;
        if header.schema_version != SCHEMA_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                found = header.schema_version,
                expected = SCHEMA_VERSION,
                "rejecting draft with incompatible schema"
            );
            return Err(DraftStoreError::SchemaMismatch {
                found: header.schema_version,
                expected: SCHEMA_VERSION,
            });
        }

        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        Ok(Some(envelope.draft))
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.remove().await.map(|_| ())
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display(), %draft_id))]
    async fn clear_if(&self, draft_id: DraftId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match self.load().await? {
            Some(stored) if stored.draft_id == draft_id => self.remove().await,
            Some(stored) => {
                tracing::debug!(stored = %stored.draft_id, "keeping newer draft");
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

impl FileDraftStore {
    /// Removes the backing file. Callers hold `write_lock`.
    async fn remove(&self) -> Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("draft cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
