//! End-to-end generation pipeline: field → trending → research → generation → posts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use postforge_prompts::{PromptTemplate, TemplateStore, Variables};
use postforge_provider::{CallMode, Capability, invoke};
use postforge_shared::{
    ParsedPost, PipelineConfig, PostforgeError, RenderedPrompt, Result, RunId, StageId,
};

use crate::events::{AgentEvent, EventSink, StageOutput};
use crate::parser::PostParser;
use crate::research::{self, ResearchQuery};

pub const TRENDING_TOPICS: &str = "trending_topics";
pub const RESEARCH_QUERY: &str = "research_query";
pub const RESEARCH_REPORT: &str = "research_report";
pub const POST_GENERATION: &str = "post_generation";
pub const REFINEMENT: &str = "refinement";

/// Templates the orchestrator cannot run without.
pub const REQUIRED_TEMPLATES: [&str; 4] =
    [TRENDING_TOPICS, RESEARCH_REPORT, POST_GENERATION, REFINEMENT];

/// Events buffered between a streaming run and its consumer.
const EVENT_BUFFER: usize = 32;

const FALLBACK_QUERY_SYSTEM: &str =
    "You are a research assistant with access to live web search. \
     Answer with concise, factual information and recent developments.";
const FALLBACK_QUERY_HUMAN: &str = "Search for the latest information about: {query}";

// ---------------------------------------------------------------------------
// Request / state
// ---------------------------------------------------------------------------

/// Input of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Professional field to write about.
    pub field: String,
    /// Optional free-text context.
    #[serde(default)]
    pub additional_context: String,
}

impl GenerateRequest {
    pub fn new(field: impl Into<String>, additional_context: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            additional_context: additional_context.into(),
        }
    }
}

/// Everything one run produced. Owned by that run alone.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunState {
    pub run_id: RunId,
    pub field: String,
    pub topics: String,
    pub report: String,
    pub posts: Vec<ParsedPost>,
    /// Unparsed generation output.
    pub raw_posts: String,
}

impl PipelineRunState {
    fn new(field: &str) -> Self {
        Self {
            run_id: RunId::new(),
            field: field.to_string(),
            topics: String::new(),
            report: String::new(),
            posts: Vec::new(),
            raw_posts: String::new(),
        }
    }
}

/// Result of the trending-only operation, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<Result<String>> for TrendingResponse {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(topics) => Self {
                success: true,
                topics: Some(topics),
                detail: None,
            },
            Err(e) => Self {
                success: false,
                topics: None,
                detail: Some(e.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives pipeline runs. Cheap to clone; clones share the template store and
/// capability.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) templates: Arc<TemplateStore>,
    pub(crate) capability: Arc<dyn Capability>,
    pub(crate) config: PipelineConfig,
    parser: PostParser,
    query_patterns: Vec<PromptTemplate>,
    research_query: PromptTemplate,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("templates", &self.templates.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Fails if the store lacks a required template, or if no research query,
    /// no post style or a zero `max_posts` is configured.
    pub fn new(
        templates: Arc<TemplateStore>,
        capability: Arc<dyn Capability>,
        config: PipelineConfig,
    ) -> Result<Self> {
        templates.require(&REQUIRED_TEMPLATES)?;
        if config.research_queries.is_empty() {
            return Err(PostforgeError::config("at least one research query is required"));
        }
        if config.posts.styles.is_empty() {
            return Err(PostforgeError::config("at least one post style is required"));
        }
        if config.posts.max_posts == 0 {
            return Err(PostforgeError::config("max_posts must be at least 1"));
        }

        let query_patterns = config
            .research_queries
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                PromptTemplate::new(format!("research_queries[{i}]"), "", "", pattern)
            })
            .collect();

        let research_query = templates.get(RESEARCH_QUERY).cloned().unwrap_or_else(|| {
            debug!("no research_query template, using built-in query prompt");
            PromptTemplate::new(RESEARCH_QUERY, "", FALLBACK_QUERY_SYSTEM, FALLBACK_QUERY_HUMAN)
        });

        Ok(Self {
            templates,
            capability,
            parser: PostParser::new(config.posts.clone()),
            config,
            query_patterns,
            research_query,
        })
    }

    /// Start a run in the background and return its event stream.
    ///
    /// The channel closes after the terminal event. Dropping the receiver
    /// cancels the run at the next stage boundary.
    pub fn stream(&self, request: GenerateRequest) -> mpsc::Receiver<AgentEvent> {
        let (mut sink, rx) = EventSink::channel(EVENT_BUFFER);
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(&request, &mut sink).await {
                debug!(error = %e, "streamed run ended without completing");
            }
        });
        rx
    }

    /// Run the three stages, reporting through `sink`.
    ///
    /// Emits exactly one terminal event unless the consumer disconnected, in
    /// which case the run stops with `Cancelled` and emits nothing more.
    #[instrument(skip_all, fields(field = %request.field))]
    pub async fn run(
        &self,
        request: &GenerateRequest,
        sink: &mut EventSink,
    ) -> Result<PipelineRunState> {
        let start = Instant::now();
        let mut state = PipelineRunState::new(request.field.trim());
        info!(run_id = %state.run_id, "starting pipeline run");

        match self.execute(request, sink, &mut state).await {
            Ok(()) => {
                sink.complete("All done! Review your posts below.", state.posts.clone())
                    .await;
                info!(
                    run_id = %state.run_id,
                    posts = state.posts.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "pipeline run complete"
                );
                Ok(state)
            }
            Err(PostforgeError::Cancelled) => {
                info!(run_id = %state.run_id, "event consumer disconnected, run cancelled");
                Err(PostforgeError::Cancelled)
            }
            Err(e) => {
                error!(
                    run_id = %state.run_id,
                    stage = ?e.failed_stage(),
                    error = %e,
                    "pipeline run failed"
                );
                sink.error(e.to_string(), e.failed_stage()).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &GenerateRequest,
        sink: &mut EventSink,
        state: &mut PipelineRunState,
    ) -> Result<()> {
        let field = request.field.trim();
        if field.is_empty() {
            return Err(PostforgeError::validation("field must not be empty"));
        }
        let context = request.additional_context.trim();

        // --- Stage 1: Trending topics ---
        begin_stage(sink, StageId::Trending, format!("Identifying trending topics in {field}"))
            .await?;
        state.topics = self
            .trending_topics(field, context)
            .await
            .map_err(|e| PostforgeError::stage(StageId::Trending, e))?;
        sink.result(
            StageId::Trending,
            "Trending topics identified",
            StageOutput::Topics {
                topics: state.topics.clone(),
            },
        )
        .await;
        info!(stage = %StageId::Trending, chars = state.topics.len(), "stage complete");

        // --- Stage 2: Research ---
        begin_stage(sink, StageId::Research, "Conducting research on trending topics").await?;
        state.report = self
            .research(field, context, &state.topics, sink)
            .await
            .map_err(|e| match e {
                PostforgeError::Cancelled => PostforgeError::Cancelled,
                other => PostforgeError::stage(StageId::Research, other),
            })?;
        sink.result(
            StageId::Research,
            "Research report compiled",
            StageOutput::Report {
                report: state.report.clone(),
            },
        )
        .await;
        info!(stage = %StageId::Research, chars = state.report.len(), "stage complete");

        // --- Stage 3: Generation ---
        begin_stage(sink, StageId::Generation, "Crafting LinkedIn post options").await?;
        sink.progress(format!(
            "Generating {} post variations",
            self.config.posts.max_posts
        ))
        .await;
        let (raw, posts) = self
            .generate_posts(field, &state.report)
            .await
            .map_err(|e| PostforgeError::stage(StageId::Generation, e))?;
        state.raw_posts = raw;
        state.posts = posts;
        sink.result(
            StageId::Generation,
            "LinkedIn posts generated",
            StageOutput::Posts {
                posts: state.posts.clone(),
            },
        )
        .await;
        info!(stage = %StageId::Generation, posts = state.posts.len(), "stage complete");

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn trending_topics(&self, field: &str, context: &str) -> Result<String> {
        let prompt = self.templates.render(
            TRENDING_TOPICS,
            &Variables::new().with("field", field).with("context", context),
        )?;
        self.call(CallMode::SearchGenerate, &prompt).await
    }

    async fn research(
        &self,
        field: &str,
        context: &str,
        topics: &str,
        sink: &mut EventSink,
    ) -> Result<String> {
        let queries = self.research_queries(field, context)?;
        let findings = research::run_queries(
            self.capability.as_ref(),
            &queries,
            self.config.call_timeout,
            sink,
        )
        .await?;

        // The report is one more external call.
        sink.ensure_open()?;
        sink.progress("Compiling research report").await;

        let topic = topics
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(field);
        let prompt = self.templates.render(
            RESEARCH_REPORT,
            &Variables::new()
                .with("topic", topic)
                .with("field", field)
                .with("context", context)
                .with("findings", findings.join("\n\n")),
        )?;
        self.call(CallMode::Generate, &prompt).await
    }

    fn research_queries(&self, field: &str, context: &str) -> Result<Vec<ResearchQuery>> {
        let pattern_vars = Variables::new().with("field", field).with("context", context);
        self.query_patterns
            .iter()
            .map(|pattern| {
                let query = pattern.render(&pattern_vars)?.human;
                let prompt = self.research_query.render(
                    &Variables::new()
                        .with("query", query.as_str())
                        .with("field", field)
                        .with("context", context),
                )?;
                Ok(ResearchQuery { query, prompt })
            })
            .collect()
    }

    async fn generate_posts(&self, field: &str, report: &str) -> Result<(String, Vec<ParsedPost>)> {
        let prompt = self.templates.render(
            POST_GENERATION,
            &Variables::new()
                .with("report", report)
                .with("field", field)
                .with("styles", self.config.posts.styles.join(", "))
                .with("post_count", self.config.posts.max_posts.to_string()),
        )?;
        let raw = self.call(CallMode::Generate, &prompt).await?;
        let posts = self.parser.parse(&raw)?;
        Ok((raw, posts))
    }

    // -----------------------------------------------------------------------
    // Standalone operations
    // -----------------------------------------------------------------------

    /// Run only the trending-topic stage.
    #[instrument(skip_all, fields(field = %field))]
    pub async fn trending(&self, field: &str) -> Result<String> {
        let field = field.trim();
        if field.is_empty() {
            return Err(PostforgeError::validation("field must not be empty"));
        }
        let topics = self.trending_topics(field, "").await?;
        info!(chars = topics.len(), "trending topics identified");
        Ok(topics)
    }

    /// One capability call bounded by the configured timeout.
    pub(crate) async fn call(&self, mode: CallMode, prompt: &RenderedPrompt) -> Result<String> {
        call_capability(
            self.capability.as_ref(),
            mode,
            prompt,
            self.config.call_timeout,
        )
        .await
    }
}

/// Emit the stage event, then stop if the consumer is gone.
async fn begin_stage(
    sink: &mut EventSink,
    stage: StageId,
    message: impl Into<String>,
) -> Result<()> {
    sink.ensure_open()?;
    sink.stage(stage, message).await;
    sink.ensure_open()
}

/// Invoke `capability`, turning an elapsed timeout into `ExternalCall`.
pub(crate) async fn call_capability(
    capability: &dyn Capability,
    mode: CallMode,
    prompt: &RenderedPrompt,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, invoke(capability, mode, prompt)).await {
        Ok(result) => result,
        Err(_) => Err(PostforgeError::external(format!(
            "{mode} timed out after {}s",
            timeout.as_secs_f32()
        ))),
    }
}
