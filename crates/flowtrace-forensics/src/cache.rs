//! Workflow name/status cache.
//!
//! Analyses label workflows by name many times over (every tree node, every
//! failing execution in a listing). A miss refreshes the whole listing in one
//! call rather than fetching single workflows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::source::WorkflowSource;

/// Default time a listing stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Human label for a workflow id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowLabel {
    pub id: String,
    /// Display name, or the raw id when the name is unknown.
    pub name: String,
    /// `None` when the workflow was never seen in a listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl WorkflowLabel {
    fn fallback(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            active: None,
        }
    }

    /// Whether the label came from the server rather than the fallback.
    pub fn is_known(&self) -> bool {
        self.active.is_some()
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, (String, bool)>,
    /// Ids looked up since the last refresh that the listing did not contain.
    missing: HashSet<String>,
    refreshed_at: Option<Instant>,
    /// Last failed listing; no retry until it is older than the TTL.
    failed_at: Option<Instant>,
}

/// Memo of workflow id → name and active flag with TTL.
///
/// The state lock is held across the refresh, so concurrent callers wait for
/// the in-flight listing instead of issuing their own.
pub struct NameCache {
    source: Arc<dyn WorkflowSource>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl NameCache {
    /// Create an empty cache over `source`.
    pub fn new(source: Arc<dyn WorkflowSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Resolve an id to its label. Never fails.
    ///
    /// On failure the last known value is returned, or the raw id when
    /// there is none.
    pub async fn resolve(&self, id: &str) -> WorkflowLabel {
        let mut state = self.state.lock().await;

        let fresh = state
            .refreshed_at
            .is_some_and(|at| at.elapsed() < self.ttl);
        let known_missing = fresh && state.missing.contains(id);
        let backing_off = state
            .failed_at
            .is_some_and(|at| at.elapsed() < self.ttl);

        if !backing_off && (!fresh || (!state.entries.contains_key(id) && !known_missing)) {
            self.refresh(&mut state).await;
            if !state.entries.contains_key(id) {
                state.missing.insert(id.to_string());
            }
        }

        match state.entries.get(id) {
            Some((name, active)) => WorkflowLabel {
                id: id.to_string(),
                name: name.clone(),
                active: Some(*active),
            },
            None => WorkflowLabel::fallback(id),
        }
    }

    /// Drop all entries so the next lookup refreshes.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        *state = CacheState::default();
    }

    /// Number of cached workflows.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    async fn refresh(&self, state: &mut CacheState) {
        match self.source.list_workflows().await {
            Ok(list) => {
                debug!(count = list.len(), "workflow name cache refreshed");
                state.entries = list
                    .into_iter()
                    .map(|wf| (wf.id, (wf.name, wf.active)))
                    .collect();
                state.missing.clear();
                state.refreshed_at = Some(Instant::now());
                state.failed_at = None;
            }
            Err(e) => {
                warn!(error = %e, "workflow listing failed; keeping previous names");
                state.failed_at = Some(Instant::now());
            }
        }
    }
}
