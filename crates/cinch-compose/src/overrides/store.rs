//! Override persistence backends.
//!
//! [`OverrideStore`] is the seam between the engine and whatever holds the
//! records. Two implementations ship here: [`MemoryStore`] for tests and
//! embedding, and [`JsonFileStore`], a single JSON document on disk written
//! atomically (temp file + rename).

use super::{BlockPatch, ModifierPatch, OverrideSnapshot};
use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable keyed storage for block and modifier patches.
///
/// Upserts merge field by field into any existing record and return the
/// record as stored.
pub trait OverrideStore: Send + Sync {
    /// Every stored record.
    fn load_all(&self) -> StoreFuture<'_, OverrideSnapshot>;

    fn upsert_block<'a>(&'a self, id: &'a str, patch: BlockPatch) -> StoreFuture<'a, BlockPatch>;

    fn upsert_modifier<'a>(
        &'a self,
        id: &'a str,
        patch: ModifierPatch,
    ) -> StoreFuture<'a, ModifierPatch>;
}

fn upsert_block_into(snapshot: &mut OverrideSnapshot, id: &str, patch: BlockPatch) -> BlockPatch {
    let entry = snapshot.blocks.entry(id.to_string()).or_default();
    entry.merge(patch);
    entry.clone()
}

fn upsert_modifier_into(
    snapshot: &mut OverrideSnapshot,
    id: &str,
    patch: ModifierPatch,
) -> ModifierPatch {
    let entry = snapshot.modifiers.entry(id.to_string()).or_default();
    entry.merge(patch);
    entry.clone()
}

// ── MemoryStore ────────────────────────────────────────────────────

/// In-process store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<OverrideSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing records.
    pub fn with_records(records: OverrideSnapshot) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OverrideSnapshot> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OverrideStore for MemoryStore {
    fn load_all(&self) -> StoreFuture<'_, OverrideSnapshot> {
        let snapshot = self.lock().clone();
        Box::pin(std::future::ready(Ok(snapshot)))
    }

    fn upsert_block<'a>(&'a self, id: &'a str, patch: BlockPatch) -> StoreFuture<'a, BlockPatch> {
        let stored = upsert_block_into(&mut self.lock(), id, patch);
        Box::pin(std::future::ready(Ok(stored)))
    }

    fn upsert_modifier<'a>(
        &'a self,
        id: &'a str,
        patch: ModifierPatch,
    ) -> StoreFuture<'a, ModifierPatch> {
        let stored = upsert_modifier_into(&mut self.lock(), id, patch);
        Box::pin(std::future::ready(Ok(stored)))
    }
}

// ── JsonFileStore ──────────────────────────────────────────────────

/// On-disk document layout.
#[derive(Serialize, Deserialize, Debug, Default)]
struct StoreDocument {
    /// RFC 3339 timestamp of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
    #[serde(flatten)]
    records: OverrideSnapshot,
}

/// Store backed by one pretty-printed JSON file.
///
/// A missing file reads as an empty store. Writes are serialized through an
/// async mutex so concurrent upserts in one process never lose updates.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StoreDocument> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("No override file at {}", self.path.display());
                return Ok(StoreDocument::default());
            }
            Err(e) => {
                return Err(ComposeError::Store(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        if json.trim().is_empty() {
            return Ok(StoreDocument::default());
        }
        serde_json::from_str(&json).map_err(|e| {
            ComposeError::Store(format!("Failed to parse {}: {e}", self.path.display()))
        })
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    async fn write_document(&self, mut document: StoreDocument) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ComposeError::Store(format!("Failed to create store dir: {e}")))?;
        }
        document.updated_at = Some(chrono::Utc::now().to_rfc3339());

        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| ComposeError::Store(format!("Failed to serialize overrides: {e}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| ComposeError::Store(format!("Failed to write temp overrides: {e}")))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| ComposeError::Store(format!("Failed to rename overrides: {e}")))?;
        debug!("Wrote overrides to {}", self.path.display());
        Ok(())
    }
}

impl OverrideStore for JsonFileStore {
    fn load_all(&self) -> StoreFuture<'_, OverrideSnapshot> {
        Box::pin(async move { Ok(self.read_document().await?.records) })
    }

    fn upsert_block<'a>(&'a self, id: &'a str, patch: BlockPatch) -> StoreFuture<'a, BlockPatch> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let mut document = self.read_document().await?;
            let stored = upsert_block_into(&mut document.records, id, patch);
            self.write_document(document).await?;
            Ok(stored)
        })
    }

    fn upsert_modifier<'a>(
        &'a self,
        id: &'a str,
        patch: ModifierPatch,
    ) -> StoreFuture<'a, ModifierPatch> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let mut document = self.read_document().await?;
            let stored = upsert_modifier_into(&mut document.records, id, patch);
            self.write_document(document).await?;
            Ok(stored)
        })
    }
}
