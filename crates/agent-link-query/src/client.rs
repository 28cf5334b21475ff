//! Bootstrap-aware query client.
//!
//! A freshly provisioned or reconnecting agent answers "unavailable" for a
//! while. Queries absorb that by retrying at a fixed interval, and only
//! report [`QueryError::AgentUnavailable`] once the retry budget is spent.

use std::future::Future;

use agent_link_core::{
    AgentRpc, DeviceContext, RemoteListing, RetryPolicy, RpcError,
    domain::{Patch, ProcessInfo, ServiceInfo},
    mapping::map_all,
};
use thiserror::Error;
use tokio::time::{Instant, sleep_until};

use crate::{
    retry::{ConnectionAttempt, ErrorClass, classify},
    ticket::QueryTicket,
};

/// Query error.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The agent stayed unreachable for the whole retry budget.
    #[error("agent is still starting up (gave up after {retries} retries): {last}")]
    AgentUnavailable { retries: u32, last: RpcError },

    /// The request was rejected or failed remotely.
    #[error(transparent)]
    Operation(RpcError),

    /// A newer query on the same target replaced this one.
    #[error("query superseded")]
    Superseded,
}

impl QueryError {
    #[must_use]
    pub const fn is_agent_unavailable(&self) -> bool {
        matches!(self, Self::AgentUnavailable { .. })
    }

    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}

/// Read-only queries with bounded retry on transient unavailability.
pub struct QueryClient<R> {
    rpc: R,
    policy: RetryPolicy,
}

impl<R: AgentRpc> QueryClient<R> {
    /// Create a client with the default 8 x 3000 ms policy.
    #[must_use]
    pub fn new(rpc: R) -> Self {
        Self::with_policy(rpc, RetryPolicy::default())
    }

    #[must_use]
    pub const fn with_policy(rpc: R, policy: RetryPolicy) -> Self {
        Self { rpc, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Browse a directory; `None` asks for the agent's default location.
    ///
    /// # Errors
    /// See [`QueryError`].
    pub async fn list_directory(
        &self,
        ctx: &DeviceContext,
        path: Option<&str>,
        ticket: &QueryTicket,
    ) -> Result<RemoteListing, QueryError> {
        self.list_directory_observed(ctx, path, ticket, |_| {}).await
    }

    /// Like [`QueryClient::list_directory`], reporting every scheduled retry.
    ///
    /// # Errors
    /// See [`QueryError`].
    pub async fn list_directory_observed<O>(
        &self,
        ctx: &DeviceContext,
        path: Option<&str>,
        ticket: &QueryTicket,
        on_retry: O,
    ) -> Result<RemoteListing, QueryError>
    where
        O: FnMut(&ConnectionAttempt) + Send,
    {
        let wire = self
            .run(ctx, ticket, on_retry, || self.rpc.list_directory(ctx, path))
            .await?;
        Ok(wire.into())
    }

    /// Enumerate running processes.
    ///
    /// # Errors
    /// See [`QueryError`].
    pub async fn list_processes(
        &self,
        ctx: &DeviceContext,
        ticket: &QueryTicket,
    ) -> Result<Vec<ProcessInfo>, QueryError> {
        let wire = self
            .run(ctx, ticket, |_| {}, || self.rpc.list_processes(ctx))
            .await?;
        Ok(map_all(wire))
    }

    /// Enumerate installed services.
    ///
    /// # Errors
    /// See [`QueryError`].
    pub async fn list_services(
        &self,
        ctx: &DeviceContext,
        ticket: &QueryTicket,
    ) -> Result<Vec<ServiceInfo>, QueryError> {
        let wire = self
            .run(ctx, ticket, |_| {}, || self.rpc.list_services(ctx))
            .await?;
        Ok(map_all(wire))
    }

    /// Enumerate known patches.
    ///
    /// # Errors
    /// See [`QueryError`].
    pub async fn list_patches(
        &self,
        ctx: &DeviceContext,
        ticket: &QueryTicket,
    ) -> Result<Vec<Patch>, QueryError> {
        let wire = self
            .run(ctx, ticket, |_| {}, || self.rpc.list_patches(ctx))
            .await?;
        Ok(map_all(wire))
    }

    /// Drive one query to resolution.
    ///
    /// The ticket is checked at every suspension point; once cancelled,
    /// no further RPC is issued and nothing is reported.
    ///
    /// # Errors
    /// See [`QueryError`].
    pub async fn run<T, F, Fut, O>(
        &self,
        ctx: &DeviceContext,
        ticket: &QueryTicket,
        mut on_retry: O,
        mut op: F,
    ) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, RpcError>> + Send,
        O: FnMut(&ConnectionAttempt) + Send,
    {
        let mut attempt = ConnectionAttempt::new();

        loop {
            if ticket.is_cancelled() {
                return Err(QueryError::Superseded);
            }

            let result = tokio::select! {
                biased;
                () = ticket.cancelled() => return Err(QueryError::Superseded),
                result = op() => result,
            };

            let error = match result {
                Ok(value) => {
                    tracing::debug!(
                        device_id = %ctx.device_id,
                        retries = attempt.count,
                        "Query resolved"
                    );
                    return Ok(value);
                }
                Err(error) => error,
            };

            let class = classify(&error);
            attempt.last_error = Some(class);

            if class == ErrorClass::Other {
                tracing::debug!(device_id = %ctx.device_id, error = %error, "Query failed");
                return Err(QueryError::Operation(error));
            }

            if attempt.count >= self.policy.max_attempts {
                tracing::warn!(
                    device_id = %ctx.device_id,
                    retries = attempt.count,
                    "Agent still unavailable, giving up"
                );
                return Err(QueryError::AgentUnavailable {
                    retries: attempt.count,
                    last: error,
                });
            }

            attempt.count += 1;
            let deadline = Instant::now() + self.policy.delay;
            attempt.retry_at = Some(deadline);
            tracing::debug!(
                device_id = %ctx.device_id,
                attempt = attempt.count,
                max_attempts = self.policy.max_attempts,
                delay_ms = u64::try_from(self.policy.delay.as_millis()).unwrap_or(u64::MAX),
                "Agent unavailable, retry scheduled"
            );
            on_retry(&attempt);

            tokio::select! {
                biased;
                () = ticket.cancelled() => return Err(QueryError::Superseded),
                () = sleep_until(deadline) => {}
            }
            attempt.retry_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use agent_link_core::{
        MemoryAgent, RpcErrorKind,
        wire::{WireDirectoryListing, WireProcess},
    };

    use tokio_test::assert_ok;

    use super::*;
    use crate::ticket::QueryTarget;

    fn assert_close(actual: Duration, expected: Duration) {
        let drift = actual.abs_diff(expected);
        assert!(drift < Duration::from_millis(10), "{actual:?} vs {expected:?}");
    }

    fn setup() -> (Arc<MemoryAgent>, QueryClient<Arc<MemoryAgent>>, DeviceContext) {
        let agent = Arc::new(MemoryAgent::new());
        agent.add_directory(WireDirectoryListing {
            current_path: "/home".into(),
            parent_path: Some("/".into()),
            entries: vec![],
        });
        let client = QueryClient::new(Arc::clone(&agent));
        (agent, client, DeviceContext::new("org-1", "dev-1"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retry_budget() {
        let (agent, client, ctx) = setup();
        agent.fail_times(100, &RpcError::unavailable("agent unavailable"));

        let start = Instant::now();
        let mut scheduled = Vec::new();
        let err = client
            .list_directory_observed(&ctx, Some("/home"), &QueryTicket::detached(), |a| {
                scheduled.push((a.count, a.retry_at));
            })
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::AgentUnavailable { retries: 8, .. }));
        // Initial call plus eight retries.
        assert_eq!(agent.call_count(), 9);
        assert_close(start.elapsed(), Duration::from_secs(24));

        assert_eq!(scheduled.len(), 8);
        for (i, (count, retry_at)) in scheduled.iter().enumerate() {
            let n = u32::try_from(i).unwrap() + 1;
            assert_eq!(*count, n);
            assert_close(retry_at.unwrap() - start, Duration::from_millis(3000) * n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_when_agent_comes_up() {
        let (agent, client, ctx) = setup();
        agent.fail_times(3, &RpcError::message("Agent not connected"));

        let start = Instant::now();
        let mut last_attempt = 0;
        let listing = client
            .list_directory_observed(&ctx, Some("/home"), &QueryTicket::detached(), |a| {
                last_attempt = a.count;
            })
            .await
            .unwrap();

        assert_eq!(listing.current_path, "/home");
        assert_eq!(agent.call_count(), 4);
        assert_eq!(last_attempt, 3);
        assert_close(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_is_not_retried() {
        let (agent, client, ctx) = setup();

        let err = client
            .list_directory(&ctx, Some("/nope"), &QueryTicket::detached())
            .await
            .unwrap_err();

        match err {
            QueryError::Operation(e) => assert_eq!(e.kind, Some(RpcErrorKind::NotFound)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(agent.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_stops_the_chain() {
        let (agent, client, ctx) = setup();
        agent.fail_times(100, &RpcError::unavailable("connecting"));

        let mut target = QueryTarget::new();
        let ticket = target.begin();
        let query = client.list_processes(&ctx, &ticket);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(4500)).await;
            target.cancel();
        };

        let (result, ()) = tokio::join!(query, cancel);
        assert!(result.unwrap_err().is_superseded());
        // Initial call and the retry at 3000 ms; nothing after cancellation.
        assert_eq!(agent.call_count(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(agent.call_count(), 2);
    }

    #[tokio::test]
    async fn test_process_mapping() {
        let (agent, client, ctx) = setup();
        agent.set_processes(vec![WireProcess {
            pid: 1,
            name: "init".into(),
            memory_bytes: -1,
            ..Default::default()
        }]);

        let processes = assert_ok!(client.list_processes(&ctx, &QueryTicket::detached()).await);
        assert_eq!(processes[0].memory.bytes(), 0);
    }
}
