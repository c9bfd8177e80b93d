//! Bulk operation coordinator
//!
//! Fans a per-agent async operation out across a target set with a bounded
//! concurrency of [`BULK_CONCURRENCY`]. Failures are isolated per agent,
//! except fatal transport errors: those abort the remaining queue while
//! completed results stand. Message broadcasts additionally carry a
//! per-send timeout and an optional fire-and-forget mode.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};

use fleet_client::FleetClient;
use fleet_select::{resolve, resolve_stream, Selector};

use crate::error::ApplyError;
use crate::outcome::{AgentOutcome, AgentReport, ApplyReport};

/// Maximum in-flight per-agent operations
pub const BULK_CONCURRENCY: usize = 5;

/// Default deadline for one message send
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Run one operation per target with bounded concurrency
///
/// An `Err` from the operation is treated as fatal: the failing agent is
/// recorded as failed, every unfinished agent as skipped, and no further
/// operations start.
pub(crate) async fn run_bounded<T, N, F, Fut>(targets: Vec<T>, name_of: N, op: F) -> ApplyReport
where
    N: Fn(&T) -> String,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<AgentReport, ApplyError>>,
{
    let names: Vec<String> = targets.iter().map(&name_of).collect();
    let mut in_flight = stream::iter(targets.into_iter().map(|target| {
        let name = name_of(&target);
        let fut = op(target);
        async move { (name, fut.await) }
    }))
    .buffer_unordered(BULK_CONCURRENCY);

    let mut finished: Vec<AgentReport> = Vec::with_capacity(names.len());
    let mut aborted = false;
    while let Some((name, result)) = in_flight.next().await {
        match result {
            Ok(report) => finished.push(report),
            Err(error) => {
                tracing::error!(agent = %name, error = %error, "fatal error; aborting queue");
                finished.push(AgentReport::new(
                    name,
                    AgentOutcome::Failed {
                        error: error.to_string(),
                    },
                ));
                aborted = true;
                break;
            }
        }
    }
    drop(in_flight);

    let mut report = ApplyReport { agents: finished };
    if aborted {
        for name in names {
            if report.agent(&name).is_none() {
                report
                    .agents
                    .push(AgentReport::new(name, AgentOutcome::Skipped));
            }
        }
    }
    report
}

/// Options for a message broadcast
#[derive(Debug, Clone)]
pub struct BroadcastOptions {
    /// Per-send deadline
    pub timeout: Duration,
    /// Dispatch without awaiting delivery
    pub no_wait: bool,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SEND_TIMEOUT,
            no_wait: false,
        }
    }
}

/// Send one message to every agent a selector targets
///
/// With `no_wait` the sends are spawned straight off the lazy selector
/// stream, so dispatch to early pages begins while later pages are still
/// unfetched; the report only records dispatch and there is no cancellation
/// path for in-flight sends.
///
/// # Errors
/// Returns [`ApplyError::NoTargets`] when the selector matches nothing and
/// [`ApplyError::Select`] when resolution fails.
pub async fn broadcast(
    client: Arc<dyn FleetClient>,
    selector: &Selector,
    text: &str,
    options: &BroadcastOptions,
) -> Result<ApplyReport, ApplyError> {
    if options.no_wait {
        let mut listing = std::pin::pin!(resolve_stream(client.as_ref(), selector)?);
        let mut report = ApplyReport::default();
        while let Some(agent) = listing.try_next().await? {
            let client = Arc::clone(&client);
            let text = text.to_string();
            let timeout = options.timeout;
            let name = agent.name.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(timeout, client.send_message(&agent.id, &text)).await {
                    Ok(Ok(())) => tracing::debug!(agent = %agent.name, "message delivered"),
                    Ok(Err(e)) => {
                        tracing::warn!(agent = %agent.name, error = %e, "message send failed");
                    }
                    Err(_) => tracing::warn!(agent = %agent.name, "message send timed out"),
                }
            });
            report
                .agents
                .push(AgentReport::new(name, AgentOutcome::Updated));
        }
        if report.agents.is_empty() {
            return Err(ApplyError::NoTargets {
                selector: selector.to_string(),
            });
        }
        tracing::info!(targets = report.agents.len(), "broadcast dispatched");
        return Ok(report);
    }

    // The waited path needs the full target list up front: a fatal abort
    // must name every agent it skipped.
    let selection = resolve(client.as_ref(), selector).await?;
    if selection.is_empty() {
        if selection.fleet_was_empty {
            tracing::warn!("fleet is empty; nothing to send to");
        }
        return Err(ApplyError::NoTargets {
            selector: selector.to_string(),
        });
    }

    tracing::info!(targets = selection.agents.len(), "broadcasting message");

    let timeout = options.timeout;
    let client_ref = client.as_ref();
    Ok(run_bounded(
        selection.agents,
        |a| a.name.clone(),
        |agent| async move {
            let sent = tokio::time::timeout(timeout, client_ref.send_message(&agent.id, text))
                .await
                .map_err(|_| ApplyError::Timeout {
                    agent: agent.name.clone(),
                    seconds: timeout.as_secs(),
                });
            match sent {
                Ok(Ok(())) => Ok(AgentReport::new(agent.name, AgentOutcome::Updated)),
                Ok(Err(e)) if e.is_fatal() => Err(e.into()),
                Ok(Err(e)) => Ok(AgentReport::new(
                    agent.name,
                    AgentOutcome::Failed {
                        error: e.to_string(),
                    },
                )),
                Err(timeout_err) => Ok(AgentReport::new(
                    agent.name,
                    AgentOutcome::Failed {
                        error: timeout_err.to_string(),
                    },
                )),
            }
        },
    )
    .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_spec::Tag;
    use fleet_testkit::InMemoryFleet;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn broadcast_reaches_every_tagged_agent() {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.seed_agent("a", vec![Tag::new("env", "prod")]).await;
        fleet.seed_agent("b", vec![Tag::new("env", "prod")]).await;
        fleet.seed_agent("c", vec![Tag::new("env", "dev")]).await;

        let report = broadcast(
            fleet.clone(),
            &Selector::Tags(vec![Tag::new("env", "prod")]),
            "hello",
            &BroadcastOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.agents.len(), 2);
        assert!(report.is_success());
        assert_eq!(fleet.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn broadcast_with_no_match_is_a_precondition_error() {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.seed_agent("a", vec![]).await;

        let err = broadcast(
            fleet.clone(),
            &Selector::Name("ghost".to_string()),
            "hello",
            &BroadcastOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ApplyError::NoTargets { .. }));
    }

    #[tokio::test]
    async fn no_wait_broadcast_dispatches_across_pages() {
        let fleet = Arc::new(InMemoryFleet::new());
        for i in 0..5 {
            fleet.seed_agent(&format!("agent-{i}"), vec![]).await;
        }
        fleet.set_page_size(2);

        let options = BroadcastOptions {
            no_wait: true,
            ..BroadcastOptions::default()
        };
        let report = broadcast(
            fleet.clone(),
            &Selector::Pattern("agent-*".to_string()),
            "ping",
            &options,
        )
        .await
        .unwrap();
        assert_eq!(report.agents.len(), 5);
        assert!(report.is_success());

        // Dispatched sends finish on their own tasks.
        for _ in 0..100 {
            if fleet.sent_messages().len() == 5 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(fleet.sent_messages().len(), 5);
    }

    #[tokio::test]
    async fn per_agent_send_failure_does_not_sink_the_rest() {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.seed_agent("ok-1", vec![Tag::new("env", "prod")]).await;
        fleet.seed_agent("bad", vec![Tag::new("env", "prod")]).await;
        fleet.seed_agent("ok-2", vec![Tag::new("env", "prod")]).await;

        // A transport failure on one agent is fatal for the queue; the
        // completed sends stand and the rest are skipped.
        fleet.fail_messages_to("bad");

        let report = broadcast(
            fleet.clone(),
            &Selector::Tags(vec![Tag::new("env", "prod")]),
            "hello",
            &BroadcastOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.agents.len(), 3);
        assert!(!report.is_success());
        let skipped_or_failed = report
            .agents
            .iter()
            .filter(|a| a.outcome != AgentOutcome::Updated)
            .count();
        assert!(skipped_or_failed >= 1);
    }
}
