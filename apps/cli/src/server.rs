//! HTTP transport: SSE pipeline runs plus the refine and trending endpoints.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, Request, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde_json::{Value, json};
use tokio_stream::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use postforge_core::{
    AgentEvent, GenerateRequest, Orchestrator, RefineRequest, RefineResponse, TrendingResponse,
};
use postforge_shared::{PostforgeError, ServerSection};

#[derive(Clone)]
pub(crate) struct AppState {
    orchestrator: Orchestrator,
}

pub(crate) fn build_app(orchestrator: Orchestrator, server: &ServerSection) -> Result<Router> {
    let cors = if server.cors_origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = server
            .cors_origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .wrap_err_with(|| format!("invalid CORS origin '{origin}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        CorsLayer::new().allow_origin(origins)
    };

    Ok(Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .route("/api/refine", post(refine))
        .route("/api/trending/{field}", get(trending))
        .layer(
            cors.allow_methods([Method::GET, Method::POST])
                .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
                .max_age(Duration::from_secs(3600)),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(AppState { orchestrator }))
}

/// Bind `server.host` and serve until Ctrl-C.
pub(crate) async fn serve(orchestrator: Orchestrator, server: &ServerSection) -> Result<()> {
    let app = build_app(orchestrator, server)?;
    let listener = tokio::net::TcpListener::bind(&server.host)
        .await
        .wrap_err_with(|| format!("failed to bind {}", server.host))?;
    info!(addr = %listener.local_addr()?, "postforge server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .map_err(|e| eyre!("server error: {e}"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "agent_ready": true }))
}

/// One SSE data frame per event. Closing the connection drops the receiver,
/// which cancels the run at its next stage boundary.
async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    info!(field = %request.field, "streaming pipeline run");
    let events =
        ReceiverStream::new(state.orchestrator.stream(request)).map(|event| Ok(sse_frame(&event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn sse_frame(event: &AgentEvent) -> Event {
    Event::default()
        .json_data(event)
        .unwrap_or_else(|e| Event::default().comment(format!("unserializable event: {e}")))
}

async fn refine(
    State(state): State<AppState>,
    Json(request): Json<RefineRequest>,
) -> (StatusCode, Json<RefineResponse>) {
    let result = state
        .orchestrator
        .refine(&request.post_content, &request.feedback)
        .await;
    let status = failure_status(result.as_ref().err());
    (status, Json(RefineResponse::from(result)))
}

async fn trending(
    State(state): State<AppState>,
    Path(field): Path<String>,
) -> (StatusCode, Json<TrendingResponse>) {
    let result = state.orchestrator.trending(&field).await;
    let status = failure_status(result.as_ref().err());
    (status, Json(TrendingResponse::from(result)))
}

fn failure_status(error: Option<&PostforgeError>) -> StatusCode {
    match error {
        None => StatusCode::OK,
        Some(PostforgeError::Validation { .. }) => StatusCode::BAD_REQUEST,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use postforge_prompts::TemplateStore;
    use postforge_provider::testing::ScriptedCapability;
    use postforge_shared::PipelineConfig;

    use super::*;

    const POSTS: &str = "--- POST 1: Storytelling ---\n\
        Last spring our team nearly shipped the wrong product. One customer call changed everything.\n\
        --- POST 2: Data-Driven ---\n\
        73% of teams that adopted weekly customer calls shipped features users kept using.\n\
        --- POST 3: Thought Leadership ---\n\
        The best roadmap is a conversation, not a document. Here is why I believe that.";

    async fn spawn_server(capability: ScriptedCapability) -> String {
        let orchestrator = Orchestrator::new(
            Arc::new(TemplateStore::builtin().unwrap()),
            Arc::new(capability),
            PipelineConfig::default(),
        )
        .unwrap();
        let app = build_app(orchestrator, &ServerSection::default()).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn capability() -> ScriptedCapability {
        ScriptedCapability::new()
            .on_search(|_| Ok("1. Customer-led product development".into()))
            .on_generate(|p| {
                if p.human.starts_with("Create a research report") {
                    Ok("A research report.".into())
                } else if p.human.starts_with("Original Post:") {
                    Ok("A sharper version of the post that ends with a question for readers?".into())
                } else {
                    Ok(POSTS.into())
                }
            })
    }

    #[tokio::test]
    async fn health_reports_ready() {
        let base = spawn_server(capability()).await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn generate_streams_events_as_sse() {
        let base = spawn_server(capability()).await;
        let body = reqwest::Client::new()
            .post(format!("{base}/api/generate"))
            .json(&json!({ "field": "Product Management" }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        let events: Vec<Value> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim_start()).unwrap())
            .collect();
        assert_eq!(events.first().unwrap()["type"], "stage");
        let last = events.last().unwrap();
        assert_eq!(last["type"], "complete");
        assert_eq!(last["data"]["posts"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn refine_returns_structured_result() {
        let base = spawn_server(capability()).await;
        let client = reqwest::Client::new();

        let ok = client
            .post(format!("{base}/api/refine"))
            .json(&json!({ "post_content": "Original post.", "feedback": "Add a question" }))
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);
        let body: Value = ok.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert!(body["refined_post"].as_str().unwrap().ends_with('?'));

        let bad = client
            .post(format!("{base}/api/refine"))
            .json(&json!({ "post_content": "Original post.", "feedback": "" }))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 400);
        let body: Value = bad.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["detail"].as_str().unwrap().contains("feedback"));
    }

    #[tokio::test]
    async fn trending_failure_is_structured() {
        let failing =
            ScriptedCapability::new().on_search(|_| Err(PostforgeError::external("HTTP 503")));
        let base = spawn_server(failing).await;

        let response = reqwest::get(format!("{base}/api/trending/Finance")).await.unwrap();
        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["detail"].as_str().unwrap().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn trending_returns_topics() {
        let base = spawn_server(capability()).await;
        let body: Value = reqwest::get(format!("{base}/api/trending/Data%20Science"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["topics"], "1. Customer-led product development");
    }
}
