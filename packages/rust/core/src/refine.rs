//! Standalone post refinement.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use postforge_prompts::Variables;
use postforge_provider::CallMode;
use postforge_shared::{PostforgeError, Result};

use crate::pipeline::{Orchestrator, REFINEMENT};

/// Input of the refinement operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineRequest {
    pub post_content: String,
    pub feedback: String,
}

/// Result of the refinement operation, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_post: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<Result<String>> for RefineResponse {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(refined_post) => Self {
                success: true,
                refined_post: Some(refined_post),
                detail: None,
            },
            Err(e) => Self {
                success: false,
                refined_post: None,
                detail: Some(e.to_string()),
            },
        }
    }
}

impl Orchestrator {
    /// Revise one post according to `feedback`.
    ///
    /// Stateless: independent of any pipeline run. The refined text must meet
    /// the same minimum length as parsed posts.
    #[instrument(skip_all, fields(post_len = post.len(), feedback_len = feedback.len()))]
    pub async fn refine(&self, post: &str, feedback: &str) -> Result<String> {
        if post.trim().is_empty() {
            return Err(PostforgeError::validation("post content must not be empty"));
        }
        if feedback.trim().is_empty() {
            return Err(PostforgeError::validation("feedback must not be empty"));
        }

        let prompt = self.templates.render(
            REFINEMENT,
            &Variables::new()
                .with("post", post.trim())
                .with("feedback", feedback.trim()),
        )?;
        let refined = self.call(CallMode::Generate, &prompt).await?;
        let refined = refined.trim();

        let min = self.config.posts.min_post_length;
        let length = refined.chars().count();
        if length < min {
            return Err(PostforgeError::validation(format!(
                "refined post is too short ({length} characters, minimum {min})"
            )));
        }

        info!(chars = length, "post refined");
        Ok(refined.to_string())
    }
}

impl RefineRequest {
    pub fn new(post_content: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            post_content: post_content.into(),
            feedback: feedback.into(),
        }
    }
}
