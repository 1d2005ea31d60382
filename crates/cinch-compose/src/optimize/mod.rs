//! LLM-assisted prompt reduction.
//!
//! The loop is driven by an [`OptimizationSession`]:
//!
//! 1. **Analyze**: the resolved sections for a context are rendered with
//!    `[index] id (kind)` headings and sent to a [`Completion`] provider with
//!    a fixed instruction. The reply must be a JSON [`SuggestionPayload`];
//!    it is schema-validated and checked against the sections before any
//!    suggestion is accepted.
//! 2. **Select**: every suggestion starts selected; callers toggle a subset.
//! 3. **Preview**: the selected suggestions are substituted into the
//!    sections and re-assembled, with rough token estimates for both sides.
//! 4. **Apply**: each selected suggestion becomes an override patch on the
//!    target block's context variant (or the modifier's content).
//!
//! The provider is only ever called from `analyze`. Prompt resolution never
//! depends on it.

pub mod session;
pub mod suggestion;

pub use session::{ApplyReport, OptimizationDiff, OptimizationResult, OptimizationSession, SessionState};
pub use suggestion::{Priority, Suggestion, SuggestionKind, SuggestionPayload, parse_suggestions, payload_schema};

use crate::builder::PromptBuilder;
use crate::error::{ComposeError, Result};
use crate::resolve::Section;
use crate::{ChatRequest, Message, OpenRouterClient, ResponseFormat, ResponseFormatType};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Boxed future returned by [`Completion::complete`].
pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// One-shot text completion.
///
/// Implemented for [`OpenRouterCompletion`]; tests substitute a scripted
/// fake.
pub trait Completion: Send + Sync {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
        max_tokens: u32,
        temperature: f32,
    ) -> CompletionFuture<'a>;
}

/// [`Completion`] backed by the OpenRouter chat API in JSON mode.
pub struct OpenRouterCompletion {
    client: OpenRouterClient,
    model: String,
}

impl OpenRouterCompletion {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Completion for OpenRouterCompletion {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
        max_tokens: u32,
        temperature: f32,
    ) -> CompletionFuture<'a> {
        Box::pin(async move {
            let request = ChatRequest {
                model: Some(self.model.clone()),
                messages: vec![Message::system(system), Message::user(user)],
                max_tokens,
                temperature,
                response_format: Some(ResponseFormat {
                    fmt_type: ResponseFormatType::JsonObject,
                }),
                ..Default::default()
            };
            let completion = self.client.chat(&request).await.map_err(ComposeError::Provider)?;
            if completion.finish_reason.as_deref() == Some("length") {
                debug!("Optimizer reply hit max_tokens; payload may be truncated");
            }
            completion
                .content
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| ComposeError::Provider("empty completion".into()))
        })
    }
}

impl std::fmt::Debug for OpenRouterCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterCompletion")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

// ── Token estimates ────────────────────────────────────────────────

/// Rough token count: `ceil(chars / 4)`. For before/after comparison only.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Percentage saved going from `current` to `potential` tokens, rounded to
/// one decimal. Negative when the optimized text is longer; zero when
/// `current` is zero.
pub fn savings_percent(current: usize, potential: usize) -> f64 {
    if current == 0 {
        return 0.0;
    }
    let pct = (current as f64 - potential as f64) / current as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

// ── Analysis request ───────────────────────────────────────────────

const OPTIMIZER_PROMPT: &str = "\
You review system prompts that are assembled from independently editable sections. \
Propose changes that make the prompt shorter and clearer without losing any rule \
the model must follow.

For each change, name the target section by its [index] and choose one kind:
- remove: the section adds nothing the model needs (omit replacement)
- simplify: the same guidance in fewer words
- merge: this section restates another; the replacement folds both into this one
- restructure: reorganize for clarity; may not be shorter

Rules:
- Only target sections shown below. At most one suggestion per section.
- Never drop confidentiality or safety requirements.
- Replacement text must be complete and ready to use verbatim.
- Give each suggestion a priority (high, medium, low), a one-sentence issue, and \
  an estimated token saving.
- Reply with a single JSON object matching this schema and nothing else:";

/// (system, user) pair for one analysis call.
pub fn build_analysis_request(context: &str, sections: &[Section]) -> (String, String) {
    let schema = serde_json::to_string_pretty(&payload_schema()).unwrap_or_default();
    let system = format!("{OPTIMIZER_PROMPT}\n\n{schema}");

    let user = sections
        .iter()
        .filter(|s| s.enabled)
        .fold(
            PromptBuilder::new().raw(format!("Context: {context}")),
            |b, s| b.section(&format!("[{}] {} ({}): {}", s.index, s.id, s.kind, s.title), s.text.as_str()),
        )
        .build();

    (system, user)
}
