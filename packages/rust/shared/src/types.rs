//! Core domain types shared by the pipeline crates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StageId
// ---------------------------------------------------------------------------

/// One of the three sequential pipeline stages.
///
/// The derived ordering is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Trending,
    Research,
    Generation,
}

impl StageId {
    /// Wire name of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trending => "trending",
            Self::Research => "research",
            Self::Generation => "generation",
        }
    }

    /// The stage that runs after this one, if any.
    pub fn next(&self) -> Option<StageId> {
        match self {
            Self::Trending => Some(Self::Research),
            Self::Research => Some(Self::Generation),
            Self::Generation => None,
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ParsedPost
// ---------------------------------------------------------------------------

/// One structured, validated post extracted from generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPost {
    /// 1-based position in the returned list, without gaps.
    pub id: u32,
    /// One of the configured post styles.
    pub style: String,
    /// Post body with boundary markup removed.
    pub content: String,
}

impl ParsedPost {
    /// Number of whitespace-separated words in the content.
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    /// Whether the word count falls within `[min_words, max_words]`.
    pub fn is_optimal_length(&self, min_words: usize, max_words: usize) -> bool {
        (min_words..=max_words).contains(&self.word_count())
    }
}

// ---------------------------------------------------------------------------
// RenderedPrompt
// ---------------------------------------------------------------------------

/// A fully substituted system/human text pair, ready for a capability call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub system: String,
    pub human: String,
}

impl RenderedPrompt {
    pub fn new(system: impl Into<String>, human: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            human: human.into(),
        }
    }
}
