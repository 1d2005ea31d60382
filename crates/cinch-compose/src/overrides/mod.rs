//! Persisted field-level customizations over the built-in registry.
//!
//! An override never replaces a whole entity. [`BlockPatch`] and
//! [`ModifierPatch`] carry only the fields an editor changed; everything left
//! unset falls through to the registry default. Block variants patch key by
//! key, so emptying the `questions` variant leaves `chat` untouched.
//!
//! A variant key present in a patch is authoritative for that context even
//! when its text is empty. That is how a block is removed from one context
//! without touching the others.
//!
//! [`OverrideLayer`] fronts an [`OverrideStore`] with an [`OverrideCache`]:
//! reads are served from an immutable snapshot for one TTL window and degrade
//! to "no overrides" when the store is unavailable; writes go straight to the
//! store and invalidate the cache before returning.

pub mod cache;
pub mod store;

pub use cache::{DEFAULT_CACHE_TTL, OverrideCache};
pub use store::{JsonFileStore, MemoryStore, OverrideStore, StoreFuture};

use crate::error::{ComposeError, Result};
use crate::registry::{Block, Modifier, Registry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ── Patches ────────────────────────────────────────────────────────

/// Partial update for a [`Block`].
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<BTreeMap<String, String>>,
}

impl BlockPatch {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the text for one context key (`"default"` included).
    pub fn with_variant(mut self, context: impl Into<String>, text: impl Into<String>) -> Self {
        self.variants
            .get_or_insert_with(BTreeMap::new)
            .insert(context.into(), text.into());
        self
    }

    /// The patched text for `context`, if this patch sets it.
    pub fn variant(&self, context: &str) -> Option<&str> {
        self.variants
            .as_ref()
            .and_then(|v| v.get(context))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.variants.as_ref().is_none_or(BTreeMap::is_empty)
    }

    /// Fold a newer patch into this one. Fields set in `newer` win;
    /// variants merge key by key.
    pub fn merge(&mut self, newer: BlockPatch) {
        if newer.name.is_some() {
            self.name = newer.name;
        }
        if newer.description.is_some() {
            self.description = newer.description;
        }
        if let Some(variants) = newer.variants {
            self.variants
                .get_or_insert_with(BTreeMap::new)
                .extend(variants);
        }
    }

    /// The registry block with this patch laid over it.
    pub fn apply(&self, block: &Block) -> Block {
        let mut merged = block.clone();
        if let Some(ref name) = self.name {
            merged.name = name.clone();
        }
        if let Some(ref description) = self.description {
            merged.description = description.clone();
        }
        if let Some(ref variants) = self.variants {
            merged
                .variants
                .extend(variants.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

/// Partial update for a [`Modifier`].
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModifierPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ModifierPatch {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.content.is_none()
    }

    pub fn merge(&mut self, newer: ModifierPatch) {
        if newer.name.is_some() {
            self.name = newer.name;
        }
        if newer.description.is_some() {
            self.description = newer.description;
        }
        if newer.content.is_some() {
            self.content = newer.content;
        }
    }

    pub fn apply(&self, modifier: &Modifier) -> Modifier {
        let mut merged = modifier.clone();
        if let Some(ref name) = self.name {
            merged.name = name.clone();
        }
        if let Some(ref description) = self.description {
            merged.description = description.clone();
        }
        if let Some(ref content) = self.content {
            merged.content = content.clone();
        }
        merged
    }
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Every override record at one point in time.
///
/// Published behind an `Arc` and never mutated afterwards; the cache swaps
/// whole snapshots.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct OverrideSnapshot {
    #[serde(default)]
    pub blocks: BTreeMap<String, BlockPatch>,
    #[serde(default)]
    pub modifiers: BTreeMap<String, ModifierPatch>,
}

impl OverrideSnapshot {
    pub fn block(&self, id: &str) -> Option<&BlockPatch> {
        self.blocks.get(id)
    }

    pub fn modifier(&self, id: &str) -> Option<&ModifierPatch> {
        self.modifiers.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.modifiers.is_empty()
    }

    /// Registry block with its override (if any) applied.
    pub fn resolve_block(&self, block: &Block) -> Block {
        match self.block(&block.id) {
            Some(patch) => patch.apply(block),
            None => block.clone(),
        }
    }

    /// Registry modifier with its override (if any) applied.
    pub fn resolve_modifier(&self, modifier: &Modifier) -> Modifier {
        match self.modifier(&modifier.id) {
            Some(patch) => patch.apply(modifier),
            None => modifier.clone(),
        }
    }

    /// Resolved text of `block` for `context`.
    ///
    /// An explicitly patched variant for `context` wins even when empty.
    /// Otherwise the merged variants resolve as usual: non-empty context
    /// variant, else default, else empty.
    pub fn block_text(&self, block: &Block, context: &str) -> String {
        let patch = self.block(&block.id);
        if let Some(text) = patch.and_then(|p| p.variant(context)) {
            return text.to_string();
        }
        match patch {
            Some(p) => p.apply(block).text_for(context).to_string(),
            None => block.text_for(context).to_string(),
        }
    }

    /// Resolved content of `modifier`.
    pub fn modifier_content(&self, modifier: &Modifier) -> String {
        self.modifier(&modifier.id)
            .and_then(|p| p.content.clone())
            .unwrap_or_else(|| modifier.content.clone())
    }
}

// ── Layer ──────────────────────────────────────────────────────────

/// Cache-fronted access to an [`OverrideStore`].
pub struct OverrideLayer {
    store: Arc<dyn OverrideStore>,
    cache: OverrideCache,
}

impl OverrideLayer {
    pub fn new(store: Arc<dyn OverrideStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: OverrideCache::new(ttl),
        }
    }

    pub fn cache(&self) -> &OverrideCache {
        &self.cache
    }

    /// Current override snapshot.
    ///
    /// Served from cache within the TTL. On a miss, loads from the store; if
    /// the store fails, logs and returns an empty snapshot (registry defaults
    /// only) without caching it, so the next call retries.
    pub async fn fetch_overrides(&self) -> Arc<OverrideSnapshot> {
        if let Some(snapshot) = self.cache.get() {
            return snapshot;
        }

        let generation = self.cache.generation();
        match self.store.load_all().await {
            Ok(snapshot) => {
                debug!(
                    "Loaded {} block and {} modifier override(s)",
                    snapshot.blocks.len(),
                    snapshot.modifiers.len()
                );
                let snapshot = Arc::new(snapshot);
                self.cache.put_if_current(snapshot.clone(), generation);
                snapshot
            }
            Err(e) => {
                warn!("Override store unavailable, using built-in defaults: {e}");
                Arc::new(OverrideSnapshot::default())
            }
        }
    }

    /// Upsert a block patch and return the merged block.
    ///
    /// The cache is invalidated before this returns, so the next read sees
    /// the write.
    pub async fn apply_block_override(
        &self,
        registry: &Registry,
        id: &str,
        patch: BlockPatch,
    ) -> Result<Block> {
        let block = registry
            .block(id)
            .ok_or_else(|| ComposeError::UnknownBlock(id.to_string()))?;
        let stored = self.store.upsert_block(id, patch).await?;
        self.cache.invalidate();
        debug!("Applied override to block '{id}'");
        Ok(stored.apply(block))
    }

    /// Upsert a modifier patch and return the merged modifier.
    pub async fn apply_modifier_override(
        &self,
        registry: &Registry,
        id: &str,
        patch: ModifierPatch,
    ) -> Result<Modifier> {
        let modifier = registry
            .modifier(id)
            .ok_or_else(|| ComposeError::UnknownModifier(id.to_string()))?;
        let stored = self.store.upsert_modifier(id, patch).await?;
        self.cache.invalidate();
        debug!("Applied override to modifier '{id}'");
        Ok(stored.apply(modifier))
    }

    /// Drop the cached snapshot.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

impl std::fmt::Debug for OverrideLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideLayer")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
