//! Prompt resolution: registry defaults + override snapshot → text.
//!
//! Resolution is a pure function of its inputs. Given the same registry,
//! snapshot, context, and selectors, [`build`] returns byte-identical output.
//!
//! Order is fixed: composition blocks in list order, then the mode modifier,
//! then domain modifiers in caller order. Configuration gaps (unknown context,
//! unknown block id, unknown selector, empty text) never fail; they contribute
//! nothing and the caller's fallback covers an empty result.

use crate::builder::PromptBuilder;
use crate::error::{ComposeError, Result};
use crate::overrides::OverrideSnapshot;
use crate::registry::{Context, Modifier, Registry};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ── Selectors ──────────────────────────────────────────────────────

/// Runtime mode/domain selection for one build.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Selectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
}

impl Selectors {
    /// No mode, no domains.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domains.push(domain.into());
        self
    }

    /// Domains with duplicates removed, first occurrence kept.
    pub fn unique_domains(&self) -> Vec<&str> {
        let mut seen = Vec::with_capacity(self.domains.len());
        for domain in &self.domains {
            if !seen.contains(&domain.as_str()) {
                seen.push(domain.as_str());
            }
        }
        seen
    }

    /// Check every selector against the registry's selector maps.
    ///
    /// Resolution itself tolerates unknown selectors; this is for callers
    /// that want a misspelled selector to be an error.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        if let Some(ref mode) = self.mode
            && registry.mode_modifier(mode).is_none()
        {
            return Err(ComposeError::Selector {
                kind: "mode",
                value: mode.clone(),
            });
        }
        if let Some(domain) = self
            .domains
            .iter()
            .find(|d| registry.domain_modifier(d).is_none())
        {
            return Err(ComposeError::Selector {
                kind: "domain",
                value: domain.clone(),
            });
        }
        Ok(())
    }
}

// ── Sections ───────────────────────────────────────────────────────

/// What produced a [`Section`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Block,
    Mode,
    Domain,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Block => "block",
            SectionKind::Mode => "mode",
            SectionKind::Domain => "domain",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved contributor to a composed prompt.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Section {
    /// Position in the ordered breakdown, disabled sections included.
    pub index: usize,
    /// Block or modifier id.
    pub id: String,
    pub title: String,
    pub kind: SectionKind,
    pub text: String,
    /// `false` when `text` is blank; disabled sections are not emitted.
    pub enabled: bool,
}

impl Section {
    fn new(index: usize, id: &str, title: String, kind: SectionKind, text: String) -> Self {
        let enabled = !text.trim().is_empty();
        Self {
            index,
            id: id.to_string(),
            title,
            kind,
            text,
            enabled,
        }
    }
}

// ── Resolution ─────────────────────────────────────────────────────

/// Ordered section breakdown for `context`, disabled sections included.
///
/// Returns an empty list for an unknown context name or a registry without
/// compositions.
pub fn sections(
    registry: &Registry,
    overrides: &OverrideSnapshot,
    context: &str,
    selectors: &Selectors,
) -> Vec<Section> {
    let Ok(ctx) = context.parse::<Context>() else {
        debug!("Unknown context '{context}', no sections");
        return Vec::new();
    };
    let Some(composition) = registry.composition_for(ctx) else {
        debug!("Registry has no compositions");
        return Vec::new();
    };

    let mut out = Vec::with_capacity(composition.block_ids.len() + 1 + selectors.domains.len());

    for id in &composition.block_ids {
        let Some(block) = registry.block(id) else {
            debug!("Skipping unknown block '{id}' in '{}' composition", composition.context);
            continue;
        };
        let title = overrides.resolve_block(block).name;
        let text = overrides.block_text(block, ctx.as_str());
        out.push(Section::new(out.len(), id, title, SectionKind::Block, text));
    }

    if let Some(ref mode) = selectors.mode {
        if !composition.supports_modes {
            debug!("'{}' does not support modes; ignoring mode '{mode}'", composition.context);
        } else if let Some(modifier) = registry.mode_modifier(mode) {
            out.push(modifier_section(out.len(), overrides, modifier, SectionKind::Mode));
        } else {
            warn!("Unknown mode selector '{mode}'");
        }
    }

    if !selectors.domains.is_empty() {
        if !composition.supports_domains {
            debug!("'{}' does not support domains; ignoring {:?}", composition.context, selectors.domains);
        } else {
            for domain in selectors.unique_domains() {
                match registry.domain_modifier(domain) {
                    Some(modifier) => {
                        out.push(modifier_section(out.len(), overrides, modifier, SectionKind::Domain));
                    }
                    None => warn!("Unknown domain selector '{domain}'"),
                }
            }
        }
    }

    out
}

fn modifier_section(
    index: usize,
    overrides: &OverrideSnapshot,
    modifier: &Modifier,
    kind: SectionKind,
) -> Section {
    let resolved = overrides.resolve_modifier(modifier);
    Section::new(index, &modifier.id, resolved.name, kind, resolved.content)
}

fn collect<'a>(sections: impl IntoIterator<Item = &'a Section>) -> PromptBuilder {
    sections
        .into_iter()
        .filter(|s| s.enabled)
        .fold(PromptBuilder::new(), |b, s| b.raw(s.text.as_str()))
}

/// Join the enabled sections' text. Empty if none contribute.
pub fn assemble<'a>(sections: impl IntoIterator<Item = &'a Section>) -> String {
    collect(sections).build()
}

/// Composed prompt text for `context`, or `fallback` if nothing resolves.
pub fn build(
    registry: &Registry,
    overrides: &OverrideSnapshot,
    context: &str,
    selectors: &Selectors,
    fallback: &str,
) -> String {
    let sections = sections(registry, overrides, context, selectors);
    let builder = collect(&sections);
    if builder.is_empty() {
        debug!("Nothing resolved for '{context}', using fallback");
    }
    builder.build_or(fallback)
}
