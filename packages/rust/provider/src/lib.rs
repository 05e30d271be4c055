//! Text-generation capabilities for postforge.
//!
//! The pipeline depends only on the [`Capability`] trait: one plain
//! generation call and one call grounded in live search results. The
//! production implementation is [`GeminiCapability`]; tests use the
//! scripted doubles in [`testing`] (enable the `testing` feature).

mod gemini;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use async_trait::async_trait;

use postforge_shared::{RenderedPrompt, Result};

pub use gemini::GeminiCapability;

/// A text-synthesis backend.
///
/// Both operations take a rendered system/human pair and return the raw
/// generated text. Implementations report every failure (transport, status,
/// empty answer) as `PostforgeError::ExternalCall`.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Plain text generation.
    async fn generate(&self, prompt: &RenderedPrompt) -> Result<String>;

    /// Generation grounded in live search results.
    async fn search_generate(&self, prompt: &RenderedPrompt) -> Result<String>;
}

/// Which of the two capability operations a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Generate,
    SearchGenerate,
}

impl CallMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::SearchGenerate => "search_generate",
        }
    }
}

impl std::fmt::Display for CallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch one call to `capability` by mode.
pub async fn invoke(
    capability: &dyn Capability,
    mode: CallMode,
    prompt: &RenderedPrompt,
) -> Result<String> {
    match mode {
        CallMode::Generate => capability.generate(prompt).await,
        CallMode::SearchGenerate => capability.search_generate(prompt).await,
    }
}
