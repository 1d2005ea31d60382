//! In-memory optimization session.
//!
//! ```text
//! Idle ──analyze──▶ Analyzing ──ok──▶ Suggested ──apply──▶ Applying ──ok──▶ Idle
//!                       │                 ▲                    │
//!                       └──err──▶ Idle    └──────store err─────┘
//! ```
//!
//! Nothing here is persisted. A failed analysis leaves no suggestions
//! behind; a failed apply keeps the unapplied remainder selected so the
//! caller can retry.
//!
//! `analyze` and `apply` borrow the session mutably, so a session observed
//! in `Analyzing` or `Applying` between calls had its future dropped. Both
//! operations may be called again from there, and [`OptimizationSession::reset`]
//! discards whatever was in flight.

use super::suggestion::{Suggestion, parse_suggestions};
use super::{Completion, build_analysis_request, estimate_tokens, savings_percent};
use crate::config::OptimizerConfig;
use crate::engine::PromptEngine;
use crate::error::{ComposeError, Result};
use crate::overrides::{BlockPatch, ModifierPatch};
use crate::resolve::{self, Section, SectionKind, Selectors};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Analyzing,
    Suggested,
    Applying,
}

/// Before/after text for the selected suggestions.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct OptimizationDiff {
    pub before: String,
    pub after: String,
    pub current_tokens: usize,
    pub potential_tokens: usize,
    pub savings_percent: f64,
}

/// Result payload handed to an editing surface.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub suggestions: Vec<Suggestion>,
    pub summary: String,
    pub current_token_estimate: usize,
    pub potential_token_estimate: usize,
    pub savings_percent: f64,
}

/// Outcome of a completed [`OptimizationSession::apply`].
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ApplyReport {
    pub context: String,
    /// Ids of the blocks and modifiers patched, in apply order.
    pub patched: Vec<String>,
    /// Suggestions left unselected.
    pub skipped: usize,
}

#[derive(Debug)]
pub struct OptimizationSession {
    config: OptimizerConfig,
    state: SessionState,
    context: String,
    sections: Vec<Section>,
    summary: String,
    suggestions: Vec<Suggestion>,
    /// Positions in `suggestions`.
    selected: BTreeSet<usize>,
    applied: BTreeSet<usize>,
    patched: Vec<String>,
    last_error: Option<String>,
}

impl OptimizationSession {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            context: String::new(),
            sections: Vec::new(),
            summary: String::new(),
            suggestions: Vec::new(),
            selected: BTreeSet::new(),
            applied: BTreeSet::new(),
            patched: Vec::new(),
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Context of the current analysis; empty when idle.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Message of the most recent failure, cleared by the next analysis.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn clear(&mut self) {
        self.state = SessionState::Idle;
        self.context.clear();
        self.sections.clear();
        self.summary.clear();
        self.suggestions.clear();
        self.selected.clear();
        self.applied.clear();
        self.patched.clear();
    }

    /// Drop all suggestions and return to [`SessionState::Idle`].
    ///
    /// Also the way out of an analysis or apply whose future was dropped.
    pub fn reset(&mut self) {
        if matches!(self.state, SessionState::Analyzing | SessionState::Applying) {
            self.last_error = Some(format!("{:?} was interrupted", self.state));
        }
        self.clear();
    }

    fn require(&self, allowed: &[SessionState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ComposeError::InvalidSession(format!(
                "cannot {action} while {:?}",
                self.state
            )))
        }
    }

    // ── Analyze ────────────────────────────────────────────────────

    /// Resolve `context` through `engine` and analyze its sections.
    pub async fn analyze(
        &mut self,
        engine: &PromptEngine,
        completion: &dyn Completion,
        context: impl AsRef<str>,
        selectors: &Selectors,
    ) -> Result<&[Suggestion]> {
        let context = context.as_ref();
        let sections = engine.list_sections_with(context, selectors).await;
        self.analyze_sections(completion, context, sections).await
    }

    /// Ask `completion` for suggestions over already-resolved `sections`.
    ///
    /// Any failure (provider error, timeout, malformed reply) returns the
    /// session to [`SessionState::Idle`] with `last_error` set.
    pub async fn analyze_sections(
        &mut self,
        completion: &dyn Completion,
        context: &str,
        sections: Vec<Section>,
    ) -> Result<&[Suggestion]> {
        self.require(
            &[SessionState::Idle, SessionState::Analyzing, SessionState::Suggested],
            "analyze",
        )?;
        if self.state == SessionState::Analyzing {
            debug!("Restarting an analysis that was dropped before completing");
        }
        self.clear();
        self.last_error = None;

        if !sections.iter().any(|s| s.enabled) {
            let err = ComposeError::InvalidSession(format!("nothing to analyze for '{context}'"));
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        self.state = SessionState::Analyzing;
        let (system, user) = build_analysis_request(context, &sections);
        debug!(
            "Analyzing {} section(s) for '{context}' ({} est. tokens)",
            sections.len(),
            estimate_tokens(&user)
        );

        let timeout = self.config.timeout;
        let reply = tokio::time::timeout(
            timeout,
            completion.complete(&system, &user, self.config.max_tokens, self.config.temperature),
        )
        .await;

        let parsed = match reply {
            Err(_) => Err(ComposeError::Timeout(timeout)),
            Ok(Err(e)) => Err(e),
            Ok(Ok(raw)) => parse_suggestions(&raw, &sections),
        };

        match parsed {
            Ok(payload) => {
                info!(
                    "{} suggestion(s) for '{context}': {}",
                    payload.suggestions.len(),
                    payload.summary
                );
                self.context = context.to_string();
                self.sections = sections;
                self.summary = payload.summary;
                self.selected = (0..payload.suggestions.len()).collect();
                self.suggestions = payload.suggestions;
                self.state = SessionState::Suggested;
                Ok(&self.suggestions)
            }
            Err(e) => {
                warn!("Optimization analysis for '{context}' failed: {e}");
                self.clear();
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    // ── Selection ──────────────────────────────────────────────────

    /// Flip selection of suggestion `i`. Returns the new selection state.
    pub fn toggle(&mut self, i: usize) -> Result<bool> {
        self.require(&[SessionState::Suggested], "change selection")?;
        if i >= self.suggestions.len() {
            return Err(ComposeError::InvalidSession(format!(
                "no suggestion {i} (have {})",
                self.suggestions.len()
            )));
        }
        if self.selected.remove(&i) {
            Ok(false)
        } else {
            self.selected.insert(i);
            Ok(true)
        }
    }

    pub fn select_all(&mut self) {
        if self.state == SessionState::Suggested {
            self.selected = (0..self.suggestions.len()).collect();
        }
    }

    pub fn select_none(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, i: usize) -> bool {
        self.selected.contains(&i)
    }

    fn selected_suggestions(&self) -> impl Iterator<Item = (usize, &Suggestion)> {
        self.selected.iter().filter_map(|&i| self.suggestions.get(i).map(|s| (i, s)))
    }

    // ── Preview ────────────────────────────────────────────────────

    /// Sections with the selected suggestions substituted.
    fn optimized_sections(&self) -> Vec<Section> {
        let mut sections = self.sections.clone();
        for (_, suggestion) in self.selected_suggestions() {
            if let Some(section) = sections
                .iter_mut()
                .find(|s| s.index == suggestion.section_index)
            {
                section.text = suggestion.resulting_text().to_string();
                section.enabled = !section.text.trim().is_empty();
            }
        }
        sections
    }

    /// Assembled text before and after the selected suggestions.
    pub fn preview(&self) -> Result<OptimizationDiff> {
        self.require(&[SessionState::Suggested], "preview")?;
        let before = resolve::assemble(&self.sections);
        let after = resolve::assemble(&self.optimized_sections());
        let current_tokens = estimate_tokens(&before);
        let potential_tokens = estimate_tokens(&after);
        Ok(OptimizationDiff {
            before,
            after,
            current_tokens,
            potential_tokens,
            savings_percent: savings_percent(current_tokens, potential_tokens),
        })
    }

    /// All suggestions with token estimates for the current selection.
    pub fn result(&self) -> Result<OptimizationResult> {
        let diff = self.preview()?;
        Ok(OptimizationResult {
            suggestions: self.suggestions.clone(),
            summary: self.summary.clone(),
            current_token_estimate: diff.current_tokens,
            potential_token_estimate: diff.potential_tokens,
            savings_percent: diff.savings_percent,
        })
    }

    // ── Apply ──────────────────────────────────────────────────────

    /// Write every selected, not yet applied suggestion back as an override.
    ///
    /// On a store failure the session stays [`SessionState::Suggested`] with
    /// the written suggestions recorded, and the error reports how many are
    /// left. Calling `apply` again resumes with the remainder.
    pub async fn apply(&mut self, engine: &PromptEngine) -> Result<ApplyReport> {
        self.require(&[SessionState::Suggested, SessionState::Applying], "apply")?;
        self.state = SessionState::Applying;

        let pending: Vec<usize> = self
            .selected
            .iter()
            .copied()
            .filter(|i| !self.applied.contains(i))
            .collect();
        let mut written = 0;

        for (done, &i) in pending.iter().enumerate() {
            let suggestion = &self.suggestions[i];
            let Some(section) = self
                .sections
                .iter()
                .find(|s| s.index == suggestion.section_index)
            else {
                self.applied.insert(i);
                continue;
            };

            let text = suggestion.resulting_text().to_string();
            let outcome = match section.kind {
                SectionKind::Block => engine
                    .apply_block_override(
                        &section.id,
                        BlockPatch::default().with_variant(self.context.as_str(), text),
                    )
                    .await
                    .map(|_| ()),
                SectionKind::Mode | SectionKind::Domain => engine
                    .apply_modifier_override(&section.id, ModifierPatch::default().with_content(text))
                    .await
                    .map(|_| ()),
            };

            match outcome {
                Ok(()) => {
                    debug!(
                        "Applied {} to {} '{}'",
                        suggestion.kind, section.kind, section.id
                    );
                    self.patched.push(section.id.clone());
                    self.applied.insert(i);
                    written += 1;
                }
                Err(e) => {
                    let remaining = pending.len() - done;
                    warn!("Apply stopped with {remaining} suggestion(s) pending: {e}");
                    self.state = SessionState::Suggested;
                    self.last_error = Some(e.to_string());
                    return Err(ComposeError::ApplyIncomplete {
                        applied: written,
                        remaining,
                        source: Box::new(e),
                    });
                }
            }
        }

        let report = ApplyReport {
            context: self.context.clone(),
            patched: std::mem::take(&mut self.patched),
            skipped: self.suggestions.len() - self.selected.len(),
        };
        info!(
            "Applied {} suggestion(s) to '{}'",
            report.patched.len(),
            report.context
        );
        self.clear();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::optimize::CompletionFuture;
    use crate::overrides::{MemoryStore, OverrideSnapshot, OverrideStore, StoreFuture};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const FALLBACK: &str = "fallback";

    /// Replies from a queue, recording each user prompt.
    struct ScriptedCompletion {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompletion {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl Completion for ScriptedCompletion {
        fn complete<'a>(
            &'a self,
            _system: &'a str,
            user: &'a str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> CompletionFuture<'a> {
            self.prompts.lock().unwrap().push(user.to_string());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ComposeError::Provider("script exhausted".into())));
            Box::pin(std::future::ready(reply))
        }
    }

    struct HangingCompletion;

    impl Completion for HangingCompletion {
        fn complete<'a>(&'a self, _: &'a str, _: &'a str, _: u32, _: f32) -> CompletionFuture<'a> {
            Box::pin(async {
                std::future::pending::<()>().await;
                Ok(String::new())
            })
        }
    }

    /// Accepts `budget` writes, then fails every write until refilled.
    struct FlakyStore {
        inner: MemoryStore,
        budget: AtomicUsize,
    }

    impl FlakyStore {
        fn new(budget: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                budget: AtomicUsize::new(budget),
            }
        }

        fn take(&self) -> Result<()> {
            self.budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
                .map(|_| ())
                .map_err(|_| ComposeError::Store("disk full".into()))
        }
    }

    impl OverrideStore for FlakyStore {
        fn load_all(&self) -> StoreFuture<'_, OverrideSnapshot> {
            self.inner.load_all()
        }

        fn upsert_block<'a>(&'a self, id: &'a str, patch: BlockPatch) -> StoreFuture<'a, BlockPatch> {
            match self.take() {
                Ok(()) => self.inner.upsert_block(id, patch),
                Err(e) => Box::pin(std::future::ready(Err(e))),
            }
        }

        fn upsert_modifier<'a>(
            &'a self,
            id: &'a str,
            patch: ModifierPatch,
        ) -> StoreFuture<'a, ModifierPatch> {
            match self.take() {
                Ok(()) => self.inner.upsert_modifier(id, patch),
                Err(e) => Box::pin(std::future::ready(Err(e))),
            }
        }
    }

    fn engine_with(store: Arc<dyn OverrideStore>) -> PromptEngine {
        PromptEngine::builtin(store, &EngineConfig::default())
    }

    fn session() -> OptimizationSession {
        OptimizationSession::new(OptimizerConfig::default())
    }

    /// Questions sections: 0 role, 1 grounding, 2 quality_rules,
    /// 3 confidentiality, 4 output_format.
    fn two_suggestions() -> String {
        json!({
            "summary": "Quality rules overlap with output format.",
            "suggestions": [
                {"section_index": 2, "kind": "remove", "priority": "high",
                 "issue": "Restates the output format."},
                {"section_index": 4, "kind": "simplify", "priority": "medium",
                 "issue": "Wordy.", "replacement": "Answer briefly.",
                 "estimated_token_savings": 12}
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn analyze_selects_everything() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let completion = ScriptedCompletion::new(vec![Ok(two_suggestions())]);
        let mut session = session();

        let suggestions = session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(session.state(), SessionState::Suggested);
        assert!(session.is_selected(0) && session.is_selected(1));
        assert_eq!(session.context(), "questions");

        let prompt = &completion.prompts.lock().unwrap()[0];
        assert!(prompt.contains("[2] quality_rules (block)"));
    }

    #[tokio::test]
    async fn provider_error_returns_to_idle() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let completion =
            ScriptedCompletion::new(vec![Err(ComposeError::Provider("HTTP 503".into()))]);
        let mut session = session();

        let err = session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::Provider(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.suggestions().is_empty());
        assert!(session.last_error().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn malformed_reply_leaves_no_partial_suggestions() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let reply = json!({
            "summary": "x",
            "suggestions": [
                {"section_index": 0, "kind": "remove", "priority": "low", "issue": "ok"},
                {"section_index": 99, "kind": "remove", "priority": "low", "issue": "bad"}
            ]
        })
        .to_string();
        let completion = ScriptedCompletion::new(vec![Ok(reply)]);
        let mut session = session();

        let err = session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::MalformedSuggestions(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.suggestions().is_empty());
    }

    #[tokio::test]
    async fn timeout_returns_to_idle() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let mut session = OptimizationSession::new(
            OptimizerConfig::default().with_timeout(Duration::from_millis(20)),
        );
        let err = session
            .analyze(&engine, &HangingCompletion, "questions", &Selectors::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::Timeout(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn unknown_context_has_nothing_to_analyze() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let completion = ScriptedCompletion::new(vec![]);
        let err = session()
            .analyze(&engine, &completion, "nonexistent-context", &Selectors::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidSession(_)));
        assert!(completion.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn preview_follows_selection() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let completion = ScriptedCompletion::new(vec![Ok(two_suggestions())]);
        let mut session = session();
        session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap();

        let full = session.preview().unwrap();
        assert!(full.after.ends_with("Answer briefly."));
        assert!(!full.after.contains("Do not repeat the question back."));
        assert!(full.potential_tokens < full.current_tokens);
        assert!(full.savings_percent > 0.0);

        session.toggle(0).unwrap();
        let partial = session.preview().unwrap();
        assert!(partial.after.contains("Do not repeat the question back."));

        session.select_none();
        let none = session.preview().unwrap();
        assert_eq!(none.before, none.after);
        assert_eq!(none.savings_percent, 0.0);

        let result = session.result().unwrap();
        assert_eq!(result.suggestions.len(), 2);
        assert_eq!(result.current_token_estimate, none.current_tokens);
    }

    #[tokio::test]
    async fn result_serializes_camel_case() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let completion = ScriptedCompletion::new(vec![Ok(two_suggestions())]);
        let mut session = session();
        session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap();
        let value = serde_json::to_value(session.result().unwrap()).unwrap();
        for key in [
            "suggestions",
            "summary",
            "currentTokenEstimate",
            "potentialTokenEstimate",
            "savingsPercent",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn dropped_analysis_can_be_restarted() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let mut session = session();

        let outer = tokio::time::timeout(
            Duration::from_millis(20),
            session.analyze(&engine, &HangingCompletion, "questions", &Selectors::none()),
        )
        .await;
        assert!(outer.is_err());
        assert_eq!(session.state(), SessionState::Analyzing);

        let completion = ScriptedCompletion::new(vec![Ok(two_suggestions())]);
        let suggestions = session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(session.state(), SessionState::Suggested);
    }

    #[tokio::test]
    async fn reset_clears_interrupted_analysis() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let mut session = session();
        let _ = tokio::time::timeout(
            Duration::from_millis(20),
            session.analyze(&engine, &HangingCompletion, "questions", &Selectors::none()),
        )
        .await;

        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.suggestions().is_empty());
        assert!(session.last_error().unwrap().contains("interrupted"));
    }

    #[test]
    fn toggle_requires_suggestions() {
        let mut session = session();
        assert!(session.toggle(0).is_err());
        assert!(session.preview().is_err());
    }

    #[tokio::test]
    async fn apply_round_trip_removes_section() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let completion = ScriptedCompletion::new(vec![Ok(two_suggestions())]);
        let mut session = session();
        session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap();
        let expected = session.preview().unwrap().after;

        let report = session.apply(&engine).await.unwrap();
        assert_eq!(report.patched, vec!["quality_rules", "output_format"]);
        assert_eq!(session.state(), SessionState::Idle);

        let built = engine.build("questions", &Selectors::none(), FALLBACK).await;
        assert_eq!(built, expected);
        let sections = engine.list_sections("questions").await;
        assert_eq!(sections[2].text, "");
        assert!(!sections[2].enabled);

        // Other contexts keep the block.
        let summary = engine.build("skill_summary", &Selectors::none(), FALLBACK).await;
        assert!(summary.contains("Do not repeat the question back."));
    }

    #[tokio::test]
    async fn modifier_suggestion_patches_modifier_content() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let reply = json!({
            "summary": "Mode text is long.",
            "suggestions": [
                {"section_index": 5, "kind": "simplify", "priority": "low",
                 "issue": "Wordy.", "replacement": "One line per item."}
            ]
        })
        .to_string();
        let completion = ScriptedCompletion::new(vec![Ok(reply)]);
        let selectors = Selectors::none().with_mode("bulk");
        let mut session = session();
        session
            .analyze(&engine, &completion, "questions", &selectors)
            .await
            .unwrap();
        session.apply(&engine).await.unwrap();

        let built = engine.build("chat", &selectors, FALLBACK).await;
        assert!(built.ends_with("One line per item."));
    }

    #[tokio::test]
    async fn failed_apply_can_be_resumed() {
        let store = Arc::new(FlakyStore::new(1));
        let engine = engine_with(store.clone());
        let completion = ScriptedCompletion::new(vec![Ok(two_suggestions())]);
        let mut session = session();
        session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap();

        let err = session.apply(&engine).await.unwrap_err();
        match err {
            ComposeError::ApplyIncomplete {
                applied, remaining, ..
            } => {
                assert_eq!(applied, 1);
                assert_eq!(remaining, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.state(), SessionState::Suggested);

        store.budget.store(5, Ordering::SeqCst);
        let report = session.apply(&engine).await.unwrap();
        assert_eq!(report.patched, vec!["quality_rules", "output_format"]);
        assert_eq!(store.budget.load(Ordering::SeqCst), 4, "only the remainder is written");
    }

    #[tokio::test]
    async fn unselected_suggestions_are_skipped() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let completion = ScriptedCompletion::new(vec![Ok(two_suggestions())]);
        let mut session = session();
        session
            .analyze(&engine, &completion, "questions", &Selectors::none())
            .await
            .unwrap();
        session.toggle(1).unwrap();

        let report = session.apply(&engine).await.unwrap();
        assert_eq!(report.patched, vec!["quality_rules"]);
        assert_eq!(report.skipped, 1);
        let built = engine.build("questions", &Selectors::none(), FALLBACK).await;
        assert!(!built.contains("Answer briefly."));
    }
}
