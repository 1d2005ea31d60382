//! [`PromptEngine`]: the registry, the override layer, and resolution in one
//! handle.
//!
//! The engine is cheap to share behind an `Arc`. Every method takes `&self`;
//! reads go through the snapshot cache and writes invalidate it before
//! returning.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::overrides::{BlockPatch, ModifierPatch, OverrideLayer, OverrideSnapshot, OverrideStore};
use crate::registry::{Block, Modifier, ModifierKind, Registry, Tier};
use crate::resolve::{self, Section, Selectors};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Merged view of one block for an editing surface.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tier: Tier,
    pub variants: BTreeMap<String, String>,
    /// Whether a stored patch exists for this block.
    pub overridden: bool,
}

/// Merged view of one modifier for an editing surface.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ModifierView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ModifierKind,
    pub tier: Tier,
    pub content: String,
    pub overridden: bool,
}

/// Every block and modifier with overrides applied, in registry order.
#[derive(Serialize, Clone, Debug, Default)]
pub struct Catalog {
    pub blocks: Vec<BlockView>,
    pub modifiers: Vec<ModifierView>,
}

pub struct PromptEngine {
    registry: Arc<Registry>,
    overrides: OverrideLayer,
}

impl PromptEngine {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn OverrideStore>, config: &EngineConfig) -> Self {
        Self {
            registry,
            overrides: OverrideLayer::new(store, config.cache_ttl),
        }
    }

    /// Engine over the built-in registry.
    pub fn builtin(store: Arc<dyn OverrideStore>, config: &EngineConfig) -> Self {
        Self::new(Arc::new(Registry::builtin().clone()), store, config)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn overrides(&self) -> &OverrideLayer {
        &self.overrides
    }

    /// Current override snapshot (cached).
    pub async fn snapshot(&self) -> Arc<OverrideSnapshot> {
        self.overrides.fetch_overrides().await
    }

    // ── Read path ──────────────────────────────────────────────────

    /// Composed prompt for `context`, or `fallback` if nothing resolves.
    ///
    /// Never fails: an unavailable store degrades to registry defaults.
    pub async fn build(
        &self,
        context: impl AsRef<str>,
        selectors: &Selectors,
        fallback: &str,
    ) -> String {
        let snapshot = self.snapshot().await;
        resolve::build(&self.registry, &snapshot, context.as_ref(), selectors, fallback)
    }

    /// Ordered block sections for `context`, disabled ones included.
    pub async fn list_sections(&self, context: impl AsRef<str>) -> Vec<Section> {
        self.list_sections_with(context, &Selectors::none()).await
    }

    /// [`list_sections`](Self::list_sections) including the mode and domain
    /// sections `selectors` would add.
    pub async fn list_sections_with(
        &self,
        context: impl AsRef<str>,
        selectors: &Selectors,
    ) -> Vec<Section> {
        let snapshot = self.snapshot().await;
        resolve::sections(&self.registry, &snapshot, context.as_ref(), selectors)
    }

    /// Every block and modifier with its override applied.
    pub async fn catalog(&self) -> Catalog {
        let snapshot = self.snapshot().await;
        let blocks = self
            .registry
            .blocks()
            .iter()
            .map(|block| {
                let merged = snapshot.resolve_block(block);
                BlockView {
                    overridden: snapshot.block(&block.id).is_some(),
                    id: merged.id,
                    name: merged.name,
                    description: merged.description,
                    tier: merged.tier,
                    variants: merged.variants,
                }
            })
            .collect();
        let modifiers = self
            .registry
            .modifiers()
            .iter()
            .map(|modifier| {
                let merged = snapshot.resolve_modifier(modifier);
                ModifierView {
                    overridden: snapshot.modifier(&modifier.id).is_some(),
                    id: merged.id,
                    name: merged.name,
                    description: merged.description,
                    kind: merged.kind,
                    tier: merged.tier,
                    content: merged.content,
                }
            })
            .collect();
        Catalog { blocks, modifiers }
    }

    // ── Write path ─────────────────────────────────────────────────

    /// Persist a block patch and return the merged block.
    pub async fn apply_block_override(&self, id: &str, patch: BlockPatch) -> Result<Block> {
        self.overrides
            .apply_block_override(&self.registry, id, patch)
            .await
    }

    /// Persist a modifier patch and return the merged modifier.
    pub async fn apply_modifier_override(
        &self,
        id: &str,
        patch: ModifierPatch,
    ) -> Result<Modifier> {
        self.overrides
            .apply_modifier_override(&self.registry, id, patch)
            .await
    }

    /// Overwrite a block's stored fields with the registry defaults.
    ///
    /// Every variant key the registry or the stored patch knows is written
    /// back to the text the registry alone would resolve for it, so an empty
    /// registry variant falls back to `default` exactly as before.
    pub async fn reset_block(&self, id: &str) -> Result<Block> {
        let snapshot = self.snapshot().await;
        let Some(block) = self.registry.block(id) else {
            return self.apply_block_override(id, BlockPatch::default()).await;
        };

        let mut patch = BlockPatch::default()
            .with_name(block.name.as_str())
            .with_description(block.description.as_str());
        let stored = snapshot.block(id).and_then(|p| p.variants.as_ref());
        let keys = block
            .variants
            .keys()
            .chain(stored.into_iter().flat_map(|v| v.keys()));
        for key in keys {
            patch = patch.with_variant(key.as_str(), block.text_for(key));
        }

        let merged = self.apply_block_override(id, patch).await?;
        info!("Reset block '{id}' to defaults");
        Ok(merged)
    }

    /// Overwrite a modifier's stored fields with the registry defaults.
    pub async fn reset_modifier(&self, id: &str) -> Result<Modifier> {
        let patch = match self.registry.modifier(id) {
            Some(modifier) => ModifierPatch::default()
                .with_name(modifier.name.as_str())
                .with_description(modifier.description.as_str())
                .with_content(modifier.content.as_str()),
            None => ModifierPatch::default(),
        };
        let merged = self.apply_modifier_override(id, patch).await?;
        info!("Reset modifier '{id}' to defaults");
        Ok(merged)
    }
}

impl std::fmt::Debug for PromptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEngine")
            .field("blocks", &self.registry.blocks().len())
            .field("modifiers", &self.registry.modifiers().len())
            .field("overrides", &self.overrides)
            .finish()
    }
}
