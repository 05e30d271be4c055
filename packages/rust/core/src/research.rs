//! Concurrent research fan-out.
//!
//! Every query is dispatched at once; the stage waits for all of them to
//! settle. Failed queries are reported as progress and skipped; only a run
//! where every query fails is fatal.

use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{debug, info, warn};

use postforge_provider::{CallMode, Capability};
use postforge_shared::{PostforgeError, RenderedPrompt, Result};

use crate::events::EventSink;
use crate::pipeline::call_capability;

/// One rendered research query.
#[derive(Debug, Clone)]
pub(crate) struct ResearchQuery {
    /// The search text, used in progress messages and logs.
    pub query: String,
    pub prompt: RenderedPrompt,
}

/// Run all queries concurrently and return successful answers in submission
/// order.
///
/// Emits one progress event per settled query, in completion order. The sink
/// closing mid-stage does not abort in-flight queries.
pub(crate) async fn run_queries(
    capability: &dyn Capability,
    queries: &[ResearchQuery],
    call_timeout: Duration,
    sink: &mut EventSink,
) -> Result<Vec<String>> {
    let total = queries.len();
    let mut in_flight: FuturesUnordered<_> = queries
        .iter()
        .enumerate()
        .map(|(index, query)| async move {
            let outcome = call_capability(
                capability,
                CallMode::SearchGenerate,
                &query.prompt,
                call_timeout,
            )
            .await
            .and_then(|text| {
                if text.trim().is_empty() {
                    Err(PostforgeError::external("research answer was empty"))
                } else {
                    Ok(text)
                }
            });
            (index, outcome)
        })
        .collect();

    let mut answers: Vec<Option<String>> = vec![None; total];
    let mut failed = 0usize;

    while let Some((index, outcome)) = in_flight.next().await {
        let query = &queries[index].query;
        match outcome {
            Ok(text) => {
                debug!(query = index + 1, chars = text.len(), "research query succeeded");
                sink.progress(format!(
                    "Research query {}/{total} complete: {query}",
                    index + 1
                ))
                .await;
                answers[index] = Some(text);
            }
            Err(e) => {
                failed += 1;
                warn!(query = index + 1, error = %e, "research query failed");
                sink.progress(format!(
                    "Research query {}/{total} failed: {query} ({e})",
                    index + 1
                ))
                .await;
            }
        }
    }

    if failed == total {
        return Err(PostforgeError::AllResearchFailed { attempted: total });
    }
    if failed > 0 {
        let partial = PostforgeError::PartialResearchFailure { failed, total };
        warn!(error = %partial, "continuing with partial research");
    } else {
        info!(total, "all research queries succeeded");
    }

    Ok(answers.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use postforge_provider::testing::ScriptedCapability;

    use postforge_shared::StageId;

    use super::*;
    use crate::events::{AgentEvent, StageOutput};

    /// A sink whose run is inside the research stage.
    async fn research_sink() -> (EventSink, tokio::sync::mpsc::Receiver<AgentEvent>) {
        let (mut sink, rx) = EventSink::channel(32);
        sink.stage(StageId::Trending, "t").await;
        sink.result(StageId::Trending, "t", StageOutput::Topics { topics: "x".into() })
            .await;
        sink.stage(StageId::Research, "r").await;
        (sink, rx)
    }

    fn queries(n: usize) -> Vec<ResearchQuery> {
        (1..=n)
            .map(|i| ResearchQuery {
                query: format!("query {i}"),
                prompt: RenderedPrompt::new("research", format!("query {i}")),
            })
            .collect()
    }

    #[tokio::test]
    async fn answers_keep_submission_order() {
        let capability = ScriptedCapability::new().on_search(|p| Ok(format!("answer to {}", p.human)));
        let (mut sink, mut rx) = research_sink().await;

        let answers = run_queries(&capability, &queries(3), Duration::from_secs(5), &mut sink)
            .await
            .unwrap();

        assert_eq!(
            answers,
            vec!["answer to query 1", "answer to query 2", "answer to query 3"]
        );
        assert_eq!(capability.search_calls(), 3);

        let mut progress = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AgentEvent::Progress { .. }) {
                progress += 1;
            }
        }
        assert_eq!(progress, 3);
    }

    #[tokio::test]
    async fn blank_answers_count_as_failures() {
        let capability = ScriptedCapability::new().on_search(|p| {
            if p.human.ends_with('2') {
                Ok("real findings".into())
            } else {
                Ok("   ".into())
            }
        });
        let (mut sink, _rx) = research_sink().await;

        let answers = run_queries(&capability, &queries(3), Duration::from_secs(5), &mut sink)
            .await
            .unwrap();
        assert_eq!(answers, vec!["real findings"]);
    }

    #[tokio::test]
    async fn all_failures_are_fatal() {
        let capability =
            ScriptedCapability::new().on_search(|_| Err(PostforgeError::external("offline")));
        let (mut sink, _rx) = research_sink().await;

        let err = run_queries(&capability, &queries(3), Duration::from_secs(5), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, PostforgeError::AllResearchFailed { attempted: 3 }));
    }

    #[tokio::test]
    async fn timeouts_are_query_failures() {
        let capability = ScriptedCapability::new().hang_search();
        let (mut sink, _rx) = research_sink().await;

        let err = run_queries(&capability, &queries(2), Duration::from_millis(20), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, PostforgeError::AllResearchFailed { attempted: 2 }));
    }

    #[tokio::test]
    async fn closed_sink_still_drains_queries() {
        let capability = ScriptedCapability::new().on_search(|_| Ok("findings".into()));
        let (mut sink, rx) = research_sink().await;
        drop(rx);

        let answers = run_queries(&capability, &queries(3), Duration::from_secs(5), &mut sink)
            .await
            .unwrap();
        assert_eq!(answers.len(), 3);
        assert_eq!(capability.search_calls(), 3);
    }
}
