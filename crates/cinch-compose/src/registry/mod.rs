//! Built-in blocks, modifiers, and compositions.
//!
//! The [`Registry`] is immutable once constructed. All customization flows
//! through the override layer ([`crate::overrides`]); the registry only holds
//! the defaults that exist with no persisted state at all.
//!
//! Three kinds of entries:
//!
//! 1. **[`Block`]**: a named fragment with per-[`Context`] variants. Every
//!    block carries a `"default"` variant used when no context-specific text
//!    exists.
//! 2. **[`Modifier`]**: a single-text overlay selected at runtime, either a
//!    mode (`bulk`, `detailed`, ...) or a domain (`legal`, `finance`, ...).
//! 3. **[`Composition`]**: the ordered recipe of block ids for one context,
//!    plus whether mode/domain modifiers may be appended.
//!
//! Mode and domain selectors are mapped to modifier ids through explicit
//! tables built (and validated) when the registry is loaded. Modifiers named
//! `mode_<x>` / `domain_<x>` register selector `<x>` automatically; extra
//! aliases can be added with [`Registry::with_mode_alias`] and
//! [`Registry::with_domain_alias`].

pub mod defaults;

use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, error};

/// Variant key every block must define.
pub const DEFAULT_VARIANT: &str = "default";

/// Id prefix that registers a mode modifier under its suffix.
pub const MODE_PREFIX: &str = "mode_";

/// Id prefix that registers a domain modifier under its suffix.
pub const DOMAIN_PREFIX: &str = "domain_";

// ── Context ────────────────────────────────────────────────────────

/// Usage scenario a prompt is composed for.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Context {
    Questions,
    Chat,
    ContractAnalysis,
    SkillSummary,
    CustomerProfile,
}

impl Context {
    pub const ALL: [Context; 5] = [
        Context::Questions,
        Context::Chat,
        Context::ContractAnalysis,
        Context::SkillSummary,
        Context::CustomerProfile,
    ];

    /// The snake_case name used as a variant key and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Context::Questions => "questions",
            Context::Chat => "chat",
            Context::ContractAnalysis => "contract_analysis",
            Context::SkillSummary => "skill_summary",
            Context::CustomerProfile => "customer_profile",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Context {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for Context {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self> {
        Context::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ComposeError::UnknownContext(s.to_string()))
    }
}

// ── Tier ───────────────────────────────────────────────────────────

/// Editability classification. Advisory only: consumed by editing
/// surfaces, never by the resolver.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(into = "u8", try_from = "u8")]
pub enum Tier {
    Locked = 1,
    Caution = 2,
    Open = 3,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::Locked => "locked",
            Tier::Caution => "caution",
            Tier::Open => "open",
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier as u8
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            1 => Ok(Tier::Locked),
            2 => Ok(Tier::Caution),
            3 => Ok(Tier::Open),
            other => Err(format!("invalid tier {other} (expected 1, 2, or 3)")),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", *self as u8, self.label())
    }
}

// ── Block ──────────────────────────────────────────────────────────

/// A named, independently editable fragment of instruction text.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tier: Tier,
    /// Context name → text. Must contain [`DEFAULT_VARIANT`].
    pub variants: BTreeMap<String, String>,
}

impl Block {
    /// Create a block with only a default variant.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tier: Tier,
        default_text: impl Into<String>,
    ) -> Self {
        let mut variants = BTreeMap::new();
        variants.insert(DEFAULT_VARIANT.to_string(), default_text.into());
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tier,
            variants,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add or replace the variant used for `context`.
    pub fn with_variant(mut self, context: Context, text: impl Into<String>) -> Self {
        self.variants.insert(context.as_str().to_string(), text.into());
        self
    }

    /// Text for `context`: the context variant if present and non-empty,
    /// else the default variant, else the empty string.
    pub fn text_for(&self, context: &str) -> &str {
        self.variants
            .get(context)
            .filter(|t| !t.is_empty())
            .or_else(|| self.variants.get(DEFAULT_VARIANT))
            .map_or("", String::as_str)
    }
}

// ── Modifier ───────────────────────────────────────────────────────

/// Whether a modifier is selected by `mode` or by `domains`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModifierKind {
    Mode,
    Domain,
}

impl ModifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModifierKind::Mode => "mode",
            ModifierKind::Domain => "domain",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            ModifierKind::Mode => MODE_PREFIX,
            ModifierKind::Domain => DOMAIN_PREFIX,
        }
    }
}

/// A runtime-selectable overlay appended after a composition's blocks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Modifier {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ModifierKind,
    pub tier: Tier,
    pub content: String,
}

impl Modifier {
    pub fn mode(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, name, ModifierKind::Mode, content)
    }

    pub fn domain(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(id, name, ModifierKind::Domain, content)
    }

    fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ModifierKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind,
            tier: Tier::Open,
            content: content.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }
}

// ── Composition ────────────────────────────────────────────────────

/// Ordered recipe of blocks for one context.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Composition {
    pub context: Context,
    /// Participation and order of blocks.
    pub block_ids: Vec<String>,
    pub supports_modes: bool,
    pub supports_domains: bool,
}

impl Composition {
    pub fn new(context: Context, block_ids: &[&str]) -> Self {
        Self {
            context,
            block_ids: block_ids.iter().map(|s| (*s).to_string()).collect(),
            supports_modes: false,
            supports_domains: false,
        }
    }

    pub fn with_modes(mut self) -> Self {
        self.supports_modes = true;
        self
    }

    pub fn with_domains(mut self) -> Self {
        self.supports_domains = true;
        self
    }
}

// ── Registry ───────────────────────────────────────────────────────

/// Immutable catalog of defaults with id indexes and selector maps.
#[derive(Debug, Clone)]
pub struct Registry {
    blocks: Vec<Block>,
    block_index: HashMap<String, usize>,
    modifiers: Vec<Modifier>,
    modifier_index: HashMap<String, usize>,
    compositions: Vec<Composition>,
    mode_selectors: BTreeMap<String, String>,
    domain_selectors: BTreeMap<String, String>,
}

impl Registry {
    /// Build and validate a registry.
    ///
    /// Fails on duplicate ids, blocks without a `"default"` variant, or more
    /// than one composition per context. Composition entries naming unknown
    /// blocks are tolerated and elided at resolution time.
    pub fn new(
        blocks: Vec<Block>,
        modifiers: Vec<Modifier>,
        compositions: Vec<Composition>,
    ) -> Result<Self> {
        let registry = Self::assemble(blocks, modifiers, compositions);
        registry.validate()?;
        Ok(registry)
    }

    /// The process-wide built-in registry, constructed on first use.
    pub fn builtin() -> &'static Registry {
        static BUILTIN: OnceLock<Registry> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let registry = Self::assemble(
                defaults::default_blocks(),
                defaults::default_modifiers(),
                defaults::default_compositions(),
            );
            if let Err(e) = registry.validate() {
                error!("Built-in registry is invalid: {e}");
                debug_assert!(false, "built-in registry is invalid: {e}");
            }
            registry
        })
    }

    fn assemble(
        blocks: Vec<Block>,
        modifiers: Vec<Modifier>,
        compositions: Vec<Composition>,
    ) -> Self {
        let block_index = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.clone(), i))
            .collect();
        let modifier_index = modifiers
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();

        let mut mode_selectors = BTreeMap::new();
        let mut domain_selectors = BTreeMap::new();
        for modifier in &modifiers {
            if let Some(selector) = modifier.id.strip_prefix(modifier.kind.prefix()) {
                let map = match modifier.kind {
                    ModifierKind::Mode => &mut mode_selectors,
                    ModifierKind::Domain => &mut domain_selectors,
                };
                map.insert(selector.to_string(), modifier.id.clone());
            }
        }

        Self {
            blocks,
            block_index,
            modifiers,
            modifier_index,
            compositions,
            mode_selectors,
            domain_selectors,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.block_index.len() != self.blocks.len() {
            return Err(ComposeError::Registry("duplicate block id".into()));
        }
        if self.modifier_index.len() != self.modifiers.len() {
            return Err(ComposeError::Registry("duplicate modifier id".into()));
        }
        if let Some(block) = self
            .blocks
            .iter()
            .find(|b| !b.variants.contains_key(DEFAULT_VARIANT))
        {
            return Err(ComposeError::Registry(format!(
                "block '{}' has no \"{DEFAULT_VARIANT}\" variant",
                block.id
            )));
        }

        let mut seen = HashSet::new();
        for composition in &self.compositions {
            if !seen.insert(composition.context) {
                return Err(ComposeError::Registry(format!(
                    "more than one composition for context '{}'",
                    composition.context
                )));
            }
            for id in &composition.block_ids {
                if !self.block_index.contains_key(id) {
                    debug!(
                        "Composition '{}' references unknown block '{id}'; it will be elided",
                        composition.context
                    );
                }
            }
        }
        Ok(())
    }

    /// Map an extra mode selector onto an existing mode modifier.
    pub fn with_mode_alias(
        self,
        selector: impl Into<String>,
        modifier_id: impl Into<String>,
    ) -> Result<Self> {
        self.with_alias(ModifierKind::Mode, selector.into(), modifier_id.into())
    }

    /// Map an extra domain selector onto an existing domain modifier.
    pub fn with_domain_alias(
        self,
        selector: impl Into<String>,
        modifier_id: impl Into<String>,
    ) -> Result<Self> {
        self.with_alias(ModifierKind::Domain, selector.into(), modifier_id.into())
    }

    fn with_alias(mut self, kind: ModifierKind, selector: String, modifier_id: String) -> Result<Self> {
        match self.modifier(&modifier_id) {
            Some(m) if m.kind == kind => {}
            Some(_) => {
                return Err(ComposeError::Registry(format!(
                    "modifier '{modifier_id}' is not a {} modifier",
                    kind.as_str()
                )));
            }
            None => return Err(ComposeError::UnknownModifier(modifier_id)),
        }
        let map = match kind {
            ModifierKind::Mode => &mut self.mode_selectors,
            ModifierKind::Domain => &mut self.domain_selectors,
        };
        map.insert(selector, modifier_id);
        Ok(self)
    }

    /// All built-in blocks in declaration order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// All built-in modifiers in declaration order.
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// All compositions in declaration order.
    pub fn compositions(&self) -> &[Composition] {
        &self.compositions
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.block_index.get(id).map(|&i| &self.blocks[i])
    }

    pub fn modifier(&self, id: &str) -> Option<&Modifier> {
        self.modifier_index.get(id).map(|&i| &self.modifiers[i])
    }

    /// The composition declared for `context`, if any.
    pub fn composition(&self, context: Context) -> Option<&Composition> {
        self.compositions.iter().find(|c| c.context == context)
    }

    /// The composition for `context`, falling back to the first declared one.
    pub fn composition_for(&self, context: Context) -> Option<&Composition> {
        self.composition(context).or_else(|| {
            let first = self.compositions.first();
            if let Some(c) = first {
                debug!(
                    "No composition for '{context}', falling back to '{}'",
                    c.context
                );
            }
            first
        })
    }

    /// Look up the mode modifier registered for `selector`.
    pub fn mode_modifier(&self, selector: &str) -> Option<&Modifier> {
        self.selected_modifier(&self.mode_selectors, selector, ModifierKind::Mode)
    }

    /// Look up the domain modifier registered for `selector`.
    pub fn domain_modifier(&self, selector: &str) -> Option<&Modifier> {
        self.selected_modifier(&self.domain_selectors, selector, ModifierKind::Domain)
    }

    fn selected_modifier(
        &self,
        map: &BTreeMap<String, String>,
        selector: &str,
        kind: ModifierKind,
    ) -> Option<&Modifier> {
        map.get(selector)
            .and_then(|id| self.modifier(id))
            .filter(|m| m.kind == kind)
    }

    /// Registered mode selector values, sorted.
    pub fn mode_selectors(&self) -> impl Iterator<Item = &str> {
        self.mode_selectors.keys().map(String::as_str)
    }

    /// Registered domain selector values, sorted.
    pub fn domain_selectors(&self) -> impl Iterator<Item = &str> {
        self.domain_selectors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_registry() -> Registry {
        Registry::new(
            vec![
                Block::new("role", "Role", Tier::Locked, "You are an assistant."),
                Block::new("rules", "Rules", Tier::Caution, "Be concise.")
                    .with_variant(Context::Chat, "Be friendly."),
            ],
            vec![
                Modifier::mode("mode_bulk", "Bulk", "Be terse."),
                Modifier::domain("domain_legal", "Legal", "Use legal terms."),
            ],
            vec![Composition::new(Context::Questions, &["role", "rules"]).with_modes()],
        )
        .unwrap()
    }

    #[test]
    fn context_round_trips_through_str() {
        for context in Context::ALL {
            assert_eq!(context.as_str().parse::<Context>().unwrap(), context);
        }
        assert!("nonexistent-context".parse::<Context>().is_err());
    }

    #[test]
    fn context_serializes_snake_case() {
        let json = serde_json::to_string(&Context::ContractAnalysis).unwrap();
        assert_eq!(json, "\"contract_analysis\"");
    }

    #[test]
    fn tier_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Tier::Caution).unwrap(), "2");
        let tier: Tier = serde_json::from_str("3").unwrap();
        assert_eq!(tier, Tier::Open);
        assert!(serde_json::from_str::<Tier>("7").is_err());
    }

    #[test]
    fn text_for_prefers_context_variant() {
        let block = Block::new("b", "B", Tier::Open, "x").with_variant(Context::Questions, "y");
        assert_eq!(block.text_for("questions"), "y");
        assert_eq!(block.text_for("chat"), "x");
    }

    #[test]
    fn text_for_skips_empty_context_variant() {
        let block = Block::new("b", "B", Tier::Open, "x").with_variant(Context::Chat, "");
        assert_eq!(block.text_for("chat"), "x");
    }

    #[test]
    fn text_for_without_default_is_empty() {
        let mut block = Block::new("b", "B", Tier::Open, "x");
        block.variants.clear();
        assert_eq!(block.text_for("chat"), "");
    }

    #[test]
    fn convention_registers_selectors() {
        let registry = small_registry();
        assert_eq!(registry.mode_modifier("bulk").unwrap().id, "mode_bulk");
        assert_eq!(registry.domain_modifier("legal").unwrap().id, "domain_legal");
        assert!(registry.mode_modifier("legal").is_none());
        assert_eq!(registry.mode_selectors().collect::<Vec<_>>(), vec!["bulk"]);
    }

    #[test]
    fn alias_maps_to_existing_modifier() {
        let registry = small_registry().with_mode_alias("batch", "mode_bulk").unwrap();
        assert_eq!(registry.mode_modifier("batch").unwrap().id, "mode_bulk");
    }

    #[test]
    fn alias_rejects_wrong_kind_and_unknown_id() {
        assert!(matches!(
            small_registry().with_mode_alias("law", "domain_legal"),
            Err(ComposeError::Registry(_))
        ));
        assert!(matches!(
            small_registry().with_domain_alias("x", "domain_missing"),
            Err(ComposeError::UnknownModifier(_))
        ));
    }

    #[test]
    fn rejects_block_without_default_variant() {
        let mut block = Block::new("b", "B", Tier::Open, "x");
        block.variants.clear();
        block.variants.insert("chat".into(), "y".into());
        let err = Registry::new(vec![block], vec![], vec![]).unwrap_err();
        assert!(err.to_string().contains("default"));
    }

    #[test]
    fn rejects_duplicate_ids_and_compositions() {
        let dup_blocks = Registry::new(
            vec![
                Block::new("b", "B", Tier::Open, "x"),
                Block::new("b", "B2", Tier::Open, "y"),
            ],
            vec![],
            vec![],
        );
        assert!(dup_blocks.is_err());

        let dup_compositions = Registry::new(
            vec![Block::new("b", "B", Tier::Open, "x")],
            vec![],
            vec![
                Composition::new(Context::Chat, &["b"]),
                Composition::new(Context::Chat, &["b"]),
            ],
        );
        assert!(dup_compositions.is_err());
    }

    #[test]
    fn unknown_block_in_composition_is_tolerated() {
        let registry = Registry::new(
            vec![Block::new("b", "B", Tier::Open, "x")],
            vec![],
            vec![Composition::new(Context::Chat, &["b", "ghost"])],
        );
        assert!(registry.is_ok());
    }

    #[test]
    fn composition_for_falls_back_to_first() {
        let registry = small_registry();
        assert!(registry.composition(Context::Chat).is_none());
        assert_eq!(
            registry.composition_for(Context::Chat).unwrap().context,
            Context::Questions
        );
    }

    #[test]
    fn builtin_defaults_pass_validation() {
        let result = Registry::new(
            defaults::default_blocks(),
            defaults::default_modifiers(),
            defaults::default_compositions(),
        );
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn builtin_is_validated_on_first_use() {
        let registry = Registry::builtin();
        assert!(registry.validate().is_ok());
        assert!(std::ptr::eq(registry, Registry::builtin()));
        assert_eq!(registry.compositions().len(), Context::ALL.len());
    }
}
