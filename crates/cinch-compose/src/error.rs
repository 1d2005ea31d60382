//! Error type for the write path and the optimization loop.
//!
//! The read path (`build`, `list_sections`, `fetch_overrides`) never returns
//! these: missing compositions, unknown block ids, and store outages all
//! degrade to defaults or the caller's fallback text.

use std::time::Duration;

pub type Result<T> = std::result::Result<T, ComposeError>;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("override store error: {0}")]
    Store(String),

    #[error("unknown block '{0}'")]
    UnknownBlock(String),

    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),

    #[error("unknown context '{0}'")]
    UnknownContext(String),

    #[error("invalid registry: {0}")]
    Registry(String),

    #[error("unknown {kind} selector '{value}'")]
    Selector { kind: &'static str, value: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("malformed suggestion payload: {0}")]
    MalformedSuggestions(String),

    #[error("optimization session: {0}")]
    InvalidSession(String),

    /// A persistence failure interrupted an apply. `applied` suggestions
    /// were written; the remaining ones stay selected for a retry.
    #[error("applied {applied} suggestion(s), {remaining} remaining: {source}")]
    ApplyIncomplete {
        applied: usize,
        remaining: usize,
        #[source]
        source: Box<ComposeError>,
    },
}
