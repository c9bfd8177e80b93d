//! Selector resolution against the live fleet
//!
//! Resolution walks the cursor-paginated agent list lazily: each page is
//! fetched only when the consumer has drained the previous one, so a bulk
//! operation over a large fleet starts working before the full listing
//! completes.

use futures::stream::{self, Stream, TryStreamExt};

use fleet_client::{AgentFilter, FleetClient, RemoteAgent, PAGE_SIZE};

use crate::error::SelectError;
use crate::selector::Selector;

/// The result of resolving a selector
///
/// `fleet_was_empty` lets callers distinguish "nothing matched" from "there
/// is nothing to match against", which warrant different operator messages.
#[derive(Debug, Default)]
pub struct Selection {
    /// Matched agents, in listing order
    pub agents: Vec<RemoteAgent>,
    /// The fleet had no agents at all
    pub fleet_was_empty: bool,
}

impl Selection {
    /// Whether the selector matched nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Server-side filter for a selector
///
/// Name and tag selectors are expressible as service filters; glob patterns
/// are not, so they list unfiltered and match client-side.
fn server_filter(selector: &Selector) -> AgentFilter {
    match selector {
        Selector::Name(name) => AgentFilter::by_name(name.clone()),
        Selector::Pattern(_) => AgentFilter::all(),
        Selector::Tags(tags) => AgentFilter::by_tags(tags.clone()),
    }
}

/// Stream every agent the server-side filter admits, page by page
fn list_stream<'a>(
    client: &'a dyn FleetClient,
    filter: AgentFilter,
) -> impl Stream<Item = Result<RemoteAgent, SelectError>> + 'a {
    struct PageState {
        filter: AgentFilter,
        cursor: Option<String>,
        done: bool,
    }

    stream::try_unfold(
        PageState {
            filter,
            cursor: None,
            done: false,
        },
        move |mut state| async move {
            if state.done {
                return Ok::<_, SelectError>(None);
            }
            let page = client
                .list_agents(&state.filter, state.cursor.take(), PAGE_SIZE)
                .await
                .map_err(SelectError::Client)?;
            state.cursor = page.next_cursor;
            state.done = state.cursor.is_none();
            Ok(Some((stream::iter(page.items.into_iter().map(Ok)), state)))
        },
    )
    .try_flatten()
}

/// Stream the agents a selector targets, lazily
///
/// Pages are fetched on demand; a consumer may start acting on early
/// matches while later pages are still unfetched.
///
/// # Errors
/// Returns [`SelectError::BadPattern`] for an invalid glob. Listing
/// failures surface as stream items.
pub fn resolve_stream<'a>(
    client: &'a dyn FleetClient,
    selector: &Selector,
) -> Result<impl Stream<Item = Result<RemoteAgent, SelectError>> + 'a, SelectError> {
    let matcher = selector.name_matcher()?;
    let exact = match selector {
        Selector::Name(name) => Some(name.clone()),
        _ => None,
    };
    let tags = match selector {
        Selector::Tags(tags) => tags.clone(),
        _ => Vec::new(),
    };

    Ok(
        list_stream(client, server_filter(selector)).try_filter(move |agent| {
            let admitted = match &matcher {
                Some(regex) => regex.is_match(&agent.name),
                // Defense against servers that ignore filter params.
                None => {
                    exact.as_ref().map_or(true, |n| agent.name == *n)
                        && agent.has_all_tags(&tags)
                }
            };
            futures::future::ready(admitted)
        }),
    )
}

/// Resolve a selector to the set of live agents it targets
///
/// # Errors
/// Returns [`SelectError::BadPattern`] for an invalid glob and
/// [`SelectError::Client`] when listing fails.
pub async fn resolve(
    client: &dyn FleetClient,
    selector: &Selector,
) -> Result<Selection, SelectError> {
    let matcher = selector.name_matcher()?;
    let mut listing = std::pin::pin!(list_stream(client, server_filter(selector)));

    let mut agents = Vec::new();
    let mut saw_any = false;
    while let Some(agent) = listing.try_next().await? {
        saw_any = true;
        let admitted = match (&matcher, selector) {
            (Some(regex), _) => regex.is_match(&agent.name),
            // Defense against servers that ignore filter params.
            (None, Selector::Name(name)) => agent.name == *name,
            (None, Selector::Tags(tags)) => agent.has_all_tags(tags),
            (None, Selector::Pattern(_)) => unreachable!("pattern always has a matcher"),
        };
        if admitted {
            agents.push(agent);
        }
    }

    // A filtered listing that came back empty says nothing about fleet size;
    // only an unfiltered pass can establish emptiness.
    let fleet_was_empty = if saw_any {
        false
    } else if matches!(selector, Selector::Pattern(_)) {
        true
    } else {
        let probe = client.list_agents(&AgentFilter::all(), None, 1).await?;
        probe.items.is_empty()
    };

    tracing::debug!(
        selector = %selector,
        matched = agents.len(),
        fleet_was_empty,
        "selector resolved"
    );

    Ok(Selection {
        agents,
        fleet_was_empty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_spec::Tag;
    use fleet_testkit::InMemoryFleet;
    use pretty_assertions::assert_eq;

    async fn seeded_fleet() -> InMemoryFleet {
        let fleet = InMemoryFleet::new();
        fleet
            .seed_agent("support-eu", vec![Tag::new("tenant", "acme"), Tag::new("env", "prod")])
            .await;
        fleet
            .seed_agent("support-us", vec![Tag::new("tenant", "acme"), Tag::new("env", "dev")])
            .await;
        fleet
            .seed_agent("billing", vec![Tag::new("tenant", "other"), Tag::new("env", "prod")])
            .await;
        fleet
    }

    fn names(selection: &Selection) -> Vec<&str> {
        selection.agents.iter().map(|a| a.name.as_str()).collect()
    }

    #[tokio::test]
    async fn name_selector_matches_exactly_one() {
        let fleet = seeded_fleet().await;
        let selection = resolve(&fleet, &Selector::Name("billing".into())).await.unwrap();
        assert_eq!(names(&selection), vec!["billing"]);
    }

    #[tokio::test]
    async fn pattern_selector_matches_by_glob() {
        let fleet = seeded_fleet().await;
        let selection = resolve(&fleet, &Selector::Pattern("support-*".into()))
            .await
            .unwrap();
        assert_eq!(names(&selection), vec!["support-eu", "support-us"]);
    }

    #[tokio::test]
    async fn tag_selector_requires_every_tag() {
        let fleet = seeded_fleet().await;
        let selection = resolve(
            &fleet,
            &Selector::Tags(vec![Tag::new("tenant", "acme"), Tag::new("env", "prod")]),
        )
        .await
        .unwrap();
        assert_eq!(names(&selection), vec!["support-eu"]);
    }

    #[tokio::test]
    async fn single_tag_matches_broadly() {
        let fleet = seeded_fleet().await;
        let selection = resolve(&fleet, &Selector::Tags(vec![Tag::new("env", "prod")]))
            .await
            .unwrap();
        assert_eq!(names(&selection), vec!["support-eu", "billing"]);
    }

    #[tokio::test]
    async fn no_match_in_populated_fleet() {
        let fleet = seeded_fleet().await;
        let selection = resolve(&fleet, &Selector::Pattern("ghost-*".into()))
            .await
            .unwrap();
        assert!(selection.is_empty());
        assert!(!selection.fleet_was_empty);
    }

    #[tokio::test]
    async fn empty_fleet_is_reported_as_such() {
        let fleet = InMemoryFleet::new();
        let selection = resolve(&fleet, &Selector::Name("anyone".into())).await.unwrap();
        assert!(selection.is_empty());
        assert!(selection.fleet_was_empty);
    }

    #[tokio::test]
    async fn stream_resolution_walks_the_paginated_listing() {
        let fleet = InMemoryFleet::new();
        for i in 0..7 {
            fleet.seed_agent(&format!("agent-{i}"), vec![]).await;
        }
        fleet.seed_agent("other", vec![]).await;
        fleet.set_page_size(3);

        let stream = resolve_stream(&fleet, &Selector::Pattern("agent-*".into())).unwrap();
        let mut stream = std::pin::pin!(stream);
        let mut names = Vec::new();
        while let Some(agent) = stream.try_next().await.unwrap() {
            names.push(agent.name);
        }
        assert_eq!(names.len(), 7);
        assert!(!names.contains(&"other".to_string()));
    }

    #[tokio::test]
    async fn resolution_walks_multiple_pages() {
        let fleet = InMemoryFleet::new();
        for i in 0..7 {
            fleet.seed_agent(&format!("agent-{i}"), vec![]).await;
        }
        fleet.set_page_size(3);

        let selection = resolve(&fleet, &Selector::Pattern("agent-*".into()))
            .await
            .unwrap();
        assert_eq!(selection.agents.len(), 7);
    }
}
