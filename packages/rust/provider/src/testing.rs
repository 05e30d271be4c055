//! Scripted capabilities for tests.
//!
//! ```ignore
//! let capability = ScriptedCapability::new()
//!     .on_generate(|prompt| Ok(format!("echo: {}", prompt.human)))
//!     .on_search(|_| Err(PostforgeError::external("offline")));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use postforge_shared::{PostforgeError, RenderedPrompt, Result};

use crate::Capability;

type Responder = Arc<dyn Fn(&RenderedPrompt) -> Result<String> + Send + Sync>;

/// A capability answering each operation through a closure.
///
/// Unscripted operations fail with `ExternalCall`. Call counts are recorded
/// per operation.
#[derive(Clone)]
pub struct ScriptedCapability {
    generate: Responder,
    search: Responder,
    hang_search: bool,
    generate_calls: Arc<AtomicUsize>,
    search_calls: Arc<AtomicUsize>,
}

impl Default for ScriptedCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCapability {
    pub fn new() -> Self {
        Self {
            generate: Arc::new(|_| Err(PostforgeError::external("generate not scripted"))),
            search: Arc::new(|_| Err(PostforgeError::external("search_generate not scripted"))),
            hang_search: false,
            generate_calls: Arc::new(AtomicUsize::new(0)),
            search_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn on_generate<F>(mut self, f: F) -> Self
    where
        F: Fn(&RenderedPrompt) -> Result<String> + Send + Sync + 'static,
    {
        self.generate = Arc::new(f);
        self
    }

    pub fn on_search<F>(mut self, f: F) -> Self
    where
        F: Fn(&RenderedPrompt) -> Result<String> + Send + Sync + 'static,
    {
        self.search = Arc::new(f);
        self
    }

    /// Make every `search_generate` call wait forever.
    pub fn hang_search(mut self) -> Self {
        self.hang_search = true;
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.generate_calls() + self.search_calls()
    }
}

impl std::fmt::Debug for ScriptedCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedCapability")
            .field("generate_calls", &self.generate_calls())
            .field("search_calls", &self.search_calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Capability for ScriptedCapability {
    async fn generate(&self, prompt: &RenderedPrompt) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        (self.generate)(prompt)
    }

    async fn search_generate(&self, prompt: &RenderedPrompt) -> Result<String> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_search {
            std::future::pending::<()>().await;
        }
        (self.search)(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallMode, invoke};

    #[tokio::test]
    async fn answers_through_closures_and_counts_calls() {
        let capability = ScriptedCapability::new()
            .on_generate(|p| Ok(format!("generated: {}", p.human)))
            .on_search(|_| Err(PostforgeError::external("offline")));
        let prompt = RenderedPrompt::new("sys", "hello");

        let text = invoke(&capability, CallMode::Generate, &prompt).await.unwrap();
        assert_eq!(text, "generated: hello");
        assert!(invoke(&capability, CallMode::SearchGenerate, &prompt).await.is_err());

        assert_eq!(capability.generate_calls(), 1);
        assert_eq!(capability.search_calls(), 1);
    }

    #[tokio::test]
    async fn clones_share_counters() {
        let capability = ScriptedCapability::new().on_generate(|_| Ok("x".into()));
        let clone = capability.clone();
        clone.generate(&RenderedPrompt::new("", "")).await.unwrap();
        assert_eq!(capability.total_calls(), 1);
    }
}
