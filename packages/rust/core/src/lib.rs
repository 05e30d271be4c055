//! Core pipeline for postforge.
//!
//! Turns a professional field into validated LinkedIn posts by chaining
//! three capability-backed stages (trending topics, research, generation)
//! and streaming [`AgentEvent`]s as the run progresses.

pub mod events;
pub mod parser;
pub mod pipeline;
mod refine;
mod research;

pub use events::{AgentEvent, EventSink, RunPhase, StageOutput};
pub use parser::PostParser;
pub use pipeline::{
    GenerateRequest, Orchestrator, PipelineRunState, REQUIRED_TEMPLATES, TrendingResponse,
};
pub use refine::{RefineRequest, RefineResponse};
