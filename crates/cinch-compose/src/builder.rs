//! Paragraph joiner used for final prompt assembly.
//!
//! [`PromptBuilder`] collects text fragments, drops the empty ones, and joins
//! the rest with a blank line. Skipped fragments contribute no separator, so
//! N non-empty fragments always produce exactly N-1 gaps.

const SEPARATOR: &str = "\n\n";

/// Builder for multi-paragraph prompt text.
///
/// # Example
///
/// ```
/// use cinch_compose::builder::PromptBuilder;
///
/// let prompt = PromptBuilder::new()
///     .raw("You are an assistant.")
///     .raw("   ")
///     .section("Rules", "Be concise.")
///     .build();
///
/// assert_eq!(prompt, "You are an assistant.\n\n## Rules\n\nBe concise.");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment as-is. Skipped if empty or whitespace-only.
    pub fn raw(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.parts.push(text);
        }
        self
    }

    /// Append a `## heading` section. Skipped if `content` is blank.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.parts.push(format!("## {heading}\n\n{content}"));
        }
        self
    }

    /// True when no fragment has been retained.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Join retained fragments with a blank line and trim the result.
    pub fn build(self) -> String {
        self.parts.join(SEPARATOR).trim().to_string()
    }

    /// [`build`](Self::build), substituting `fallback` when the result is empty.
    pub fn build_or(self, fallback: &str) -> String {
        let built = self.build();
        if built.is_empty() {
            fallback.to_string()
        } else {
            built
        }
    }
}
