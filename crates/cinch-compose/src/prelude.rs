//! Convenience re-exports for common `cinch-compose` types.
//!
//! ```ignore
//! use cinch_compose::prelude::*;
//! ```
//!
//! Covers building prompts, editing overrides, and running an optimization
//! session. Store internals and the raw chat types stay in their modules.

pub use crate::config::{EngineConfig, OptimizerConfig};
pub use crate::engine::{BlockView, Catalog, ModifierView, PromptEngine};
pub use crate::error::{ComposeError, Result};
pub use crate::optimize::{
    Completion, OpenRouterCompletion, OptimizationDiff, OptimizationResult, OptimizationSession,
    Suggestion, SuggestionKind,
};
pub use crate::overrides::{BlockPatch, JsonFileStore, MemoryStore, ModifierPatch, OverrideStore};
pub use crate::registry::{Block, Composition, Context, Modifier, Registry, Tier};
pub use crate::resolve::{Section, SectionKind, Selectors};
pub use crate::OpenRouterClient;
