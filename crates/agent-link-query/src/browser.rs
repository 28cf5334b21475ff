//! Stateful directory browser for one device.

use std::sync::Arc;

use agent_link_core::{AgentRpc, DeviceContext, RemoteListing};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    client::{QueryClient, QueryError},
    ticket::QueryTarget,
};

/// Why the last browse failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseFailure {
    /// The agent never became reachable; it is probably still starting.
    AgentUnavailable,
    /// The browse was rejected; carries the agent's message.
    Operation(String),
}

/// Progress of the current browse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseStatus {
    Idle,
    Loading,
    Retrying { attempt: u32, max_attempts: u32 },
    Ready,
    Failed(BrowseFailure),
}

impl BrowseStatus {
    /// Whether the current browse has finished.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_) | Self::Idle)
    }
}

/// Snapshot published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserState {
    pub status: BrowseStatus,
    /// Last successful listing; kept while a newer browse is loading.
    pub listing: Option<RemoteListing>,
    /// Path of the browse in progress or last completed.
    pub requested_path: Option<String>,
    /// Retry attempt shown to the operator, 0 when not retrying.
    pub retry_attempt: u32,
    generation: u64,
}

impl Default for BrowserState {
    fn default() -> Self {
        Self {
            status: BrowseStatus::Idle,
            listing: None,
            requested_path: None,
            retry_attempt: 0,
            generation: 0,
        }
    }
}

/// Directory browser bound to one device.
///
/// Every navigation supersedes the previous one: a stale browse, including
/// its pending retry, never touches the published state.
pub struct DirectoryBrowser<R> {
    client: Arc<QueryClient<R>>,
    ctx: DeviceContext,
    target: QueryTarget,
    state: Arc<watch::Sender<BrowserState>>,
    task: Option<JoinHandle<()>>,
}

impl<R> DirectoryBrowser<R>
where
    R: AgentRpc + 'static,
{
    /// Create a browser; nothing is fetched until the first navigation.
    #[must_use]
    pub fn new(client: Arc<QueryClient<R>>, ctx: DeviceContext) -> Self {
        let (state, _) = watch::channel(BrowserState::default());
        Self {
            client,
            ctx,
            target: QueryTarget::new(),
            state: Arc::new(state),
            task: None,
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BrowserState> {
        self.state.subscribe()
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> BrowserState {
        self.state.borrow().clone()
    }

    /// Browse `path`, or the agent's default location for `None`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn navigate(&mut self, path: Option<String>) {
        let ticket = self.target.begin();
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let mut generation = 0;
        self.state.send_modify(|s| {
            s.generation += 1;
            generation = s.generation;
            s.status = BrowseStatus::Loading;
            s.requested_path.clone_from(&path);
            s.retry_attempt = 0;
        });
        tracing::debug!(device_id = %self.ctx.device_id, path = ?path, generation, "Browsing");

        let client = Arc::clone(&self.client);
        let ctx = self.ctx.clone();
        let state = Arc::clone(&self.state);
        let max_attempts = client.policy().max_attempts;

        self.task = Some(tokio::spawn(async move {
            let retry_state = Arc::clone(&state);
            let result = client
                .list_directory_observed(&ctx, path.as_deref(), &ticket, |attempt| {
                    publish(&retry_state, generation, |s| {
                        s.status = BrowseStatus::Retrying {
                            attempt: attempt.count,
                            max_attempts,
                        };
                        s.retry_attempt = attempt.count;
                    });
                })
                .await;

            match result {
                Ok(listing) => publish(&state, generation, |s| {
                    s.requested_path = Some(listing.current_path.clone());
                    s.listing = Some(listing);
                    s.status = BrowseStatus::Ready;
                    s.retry_attempt = 0;
                }),
                Err(QueryError::Superseded) => {}
                Err(QueryError::AgentUnavailable { .. }) => publish(&state, generation, |s| {
                    s.status = BrowseStatus::Failed(BrowseFailure::AgentUnavailable);
                    s.retry_attempt = 0;
                }),
                Err(QueryError::Operation(e)) => publish(&state, generation, |s| {
                    s.status = BrowseStatus::Failed(BrowseFailure::Operation(e.message));
                    s.retry_attempt = 0;
                }),
            }
        }));
    }

    /// Browse the current path again.
    pub fn refresh(&mut self) {
        let path = self.state.borrow().requested_path.clone();
        self.navigate(path);
    }

    /// Browse the parent of the current listing. Returns `false` at the root.
    pub fn up(&mut self) -> bool {
        let parent = self
            .state
            .borrow()
            .listing
            .as_ref()
            .and_then(|l| l.parent_path.clone());
        match parent {
            Some(parent) => {
                self.navigate(Some(parent));
                true
            }
            None => false,
        }
    }
}

impl<R> Drop for DirectoryBrowser<R> {
    fn drop(&mut self) {
        self.target.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Apply `update` only if `generation` is still the current browse.
fn publish<F>(state: &watch::Sender<BrowserState>, generation: u64, update: F)
where
    F: FnOnce(&mut BrowserState),
{
    state.send_if_modified(|s| {
        if s.generation != generation {
            return false;
        }
        update(s);
        true
    });
}
