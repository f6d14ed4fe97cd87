//! Persistence for portal definitions

use crate::error::StoreError;
use async_trait::async_trait;
use portal_types::PortalRecord;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Durable storage of the registry's portal records
#[async_trait]
pub trait PortalStore: Send + Sync {
    async fn load(&self) -> Result<Vec<PortalRecord>, StoreError>;

    /// Replace the stored records with `records`
    async fn save(&self, records: &[PortalRecord]) -> Result<(), StoreError>;
}

/// Records kept in a single JSON file
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PortalStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<PortalRecord>, StoreError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_slice(&content)?)
    }

    async fn save(&self, records: &[PortalRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(records)?;

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Saved {} portal records to {:?}", records.len(), self.path);
        Ok(())
    }
}

/// Records kept in memory, for tests and ephemeral engines
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PortalRecord>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PortalRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Snapshot of what has been saved
    pub fn records(&self) -> Vec<PortalRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Make subsequent saves fail, simulating a full disk
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PortalStore for MemoryStore {
    async fn load(&self) -> Result<Vec<PortalRecord>, StoreError> {
        Ok(self.records())
    }

    async fn save(&self, records: &[PortalRecord]) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Other("simulated save failure".to_string()));
        }

        let mut stored = self
            .records
            .lock()
            .map_err(|_| StoreError::Other("memory store poisoned".to_string()))?;
        *stored = records.to_vec();
        Ok(())
    }
}
