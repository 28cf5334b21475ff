//! Command dispatcher.

use agent_link_core::{AgentRpc, Command, DeviceContext, PowerOptions, RpcError, ScriptSpec};
use chrono::Utc;
use thiserror::Error;

use crate::job::{Job, JobId};

/// Dispatch error.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The RPC could not be completed or was rejected.
    #[error("dispatch failed: {0}")]
    Rpc(#[from] RpcError),
    /// The RPC completed but carried no job id.
    #[error("agent accepted {0} without a job id")]
    MissingJobId(agent_link_core::OperationKind),
}

/// Issues mutating commands and hands back job ids.
///
/// Each call is one RPC and is never retried. Identical calls yield
/// independent jobs, and completion is never tracked.
pub struct CommandDispatcher<R> {
    rpc: R,
}

impl<R: AgentRpc> CommandDispatcher<R> {
    /// Create a dispatcher over an RPC backend.
    #[must_use]
    pub const fn new(rpc: R) -> Self {
        Self { rpc }
    }

    /// Access the underlying backend.
    pub const fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Dispatch an arbitrary command.
    ///
    /// # Errors
    /// Returns error if the RPC fails or the response has no job id.
    pub async fn dispatch(
        &self,
        ctx: &DeviceContext,
        command: Command,
    ) -> Result<Job, DispatchError> {
        let operation = command.kind();
        tracing::debug!(device_id = %ctx.device_id, %operation, "Dispatching command");

        let accepted = self.rpc.dispatch(ctx, command).await.map_err(|e| {
            tracing::warn!(device_id = %ctx.device_id, %operation, error = %e, "Dispatch failed");
            e
        })?;

        if accepted.job_id.trim().is_empty() {
            return Err(DispatchError::MissingJobId(operation));
        }

        let job = Job {
            id: JobId::from(accepted.job_id),
            operation,
            device_id: ctx.device_id.clone(),
            issued_at: Utc::now(),
        };
        tracing::info!(
            device_id = %job.device_id,
            %operation,
            job_id = %job.id,
            "Command dispatched"
        );
        Ok(job)
    }

    /// Reboot the device.
    ///
    /// # Errors
    /// See [`CommandDispatcher::dispatch`].
    pub async fn reboot(
        &self,
        ctx: &DeviceContext,
        options: PowerOptions,
    ) -> Result<Job, DispatchError> {
        self.dispatch(ctx, Command::Reboot(options)).await
    }

    /// Shut the device down.
    ///
    /// # Errors
    /// See [`CommandDispatcher::dispatch`].
    pub async fn shutdown(
        &self,
        ctx: &DeviceContext,
        options: PowerOptions,
    ) -> Result<Job, DispatchError> {
        self.dispatch(ctx, Command::Shutdown(options)).await
    }

    /// Run a script.
    ///
    /// # Errors
    /// See [`CommandDispatcher::dispatch`].
    pub async fn run_script(
        &self,
        ctx: &DeviceContext,
        script: ScriptSpec,
    ) -> Result<Job, DispatchError> {
        self.dispatch(ctx, Command::RunScript(script)).await
    }

    /// Kill a process by pid.
    ///
    /// # Errors
    /// See [`CommandDispatcher::dispatch`].
    pub async fn kill_process(&self, ctx: &DeviceContext, pid: u32) -> Result<Job, DispatchError> {
        self.dispatch(ctx, Command::KillProcess { pid }).await
    }

    /// Start a service.
    ///
    /// # Errors
    /// See [`CommandDispatcher::dispatch`].
    pub async fn start_service(
        &self,
        ctx: &DeviceContext,
        name: &str,
    ) -> Result<Job, DispatchError> {
        let command = Command::StartService {
            name: name.to_string(),
        };
        self.dispatch(ctx, command).await
    }

    /// Stop a service.
    ///
    /// # Errors
    /// See [`CommandDispatcher::dispatch`].
    pub async fn stop_service(
        &self,
        ctx: &DeviceContext,
        name: &str,
    ) -> Result<Job, DispatchError> {
        let command = Command::StopService {
            name: name.to_string(),
        };
        self.dispatch(ctx, command).await
    }

    /// Restart a service.
    ///
    /// # Errors
    /// See [`CommandDispatcher::dispatch`].
    pub async fn restart_service(
        &self,
        ctx: &DeviceContext,
        name: &str,
    ) -> Result<Job, DispatchError> {
        let command = Command::RestartService {
            name: name.to_string(),
        };
        self.dispatch(ctx, command).await
    }

    /// Install a batch of patches as one job.
    ///
    /// The batch is sent in a single RPC. Callers are responsible for not
    /// passing an empty set.
    ///
    /// # Errors
    /// See [`CommandDispatcher::dispatch`].
    pub async fn install_patches<I>(
        &self,
        ctx: &DeviceContext,
        patch_ids: I,
    ) -> Result<Job, DispatchError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let patch_ids = patch_ids.into_iter().map(Into::into).collect();
        self.dispatch(ctx, Command::InstallPatches { patch_ids }).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agent_link_core::{MemoryAgent, OperationKind, RpcErrorKind, memory::RecordedCall};
    use tokio_test::assert_err;

    use super::*;

    fn setup() -> (Arc<MemoryAgent>, CommandDispatcher<Arc<MemoryAgent>>, DeviceContext) {
        let agent = Arc::new(MemoryAgent::new());
        let dispatcher = CommandDispatcher::new(Arc::clone(&agent));
        (agent, dispatcher, DeviceContext::new("org-1", "dev-1"))
    }

    #[tokio::test]
    async fn test_install_patches_single_rpc() {
        let (agent, dispatcher, ctx) = setup();

        let job = dispatcher
            .install_patches(&ctx, ["KB1", "KB2"])
            .await
            .unwrap();

        assert!(!job.id.as_str().is_empty());
        assert_eq!(job.operation, OperationKind::InstallPatches);
        assert_eq!(job.device_id.as_str(), "dev-1");
        assert_eq!(
            agent.calls(),
            vec![RecordedCall::Dispatch {
                device_id: "dev-1".into(),
                command: Command::InstallPatches {
                    patch_ids: vec!["KB1".into(), "KB2".into()],
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_duplicate_dispatch_is_not_coalesced() {
        let (agent, dispatcher, ctx) = setup();

        let first = dispatcher
            .reboot(&ctx, PowerOptions::default())
            .await
            .unwrap();
        let second = dispatcher
            .reboot(&ctx, PowerOptions::default())
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(agent.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rpc_error_is_propagated_without_retry() {
        let (agent, dispatcher, ctx) = setup();
        agent.fail_next(RpcError::unavailable("agent not connected"));

        let err = assert_err!(dispatcher.kill_process(&ctx, 4242).await);
        match err {
            DispatchError::Rpc(e) => {
                assert_eq!(e.kind, Some(RpcErrorKind::Unavailable));
                assert_eq!(e.message, "agent not connected");
            }
            other @ DispatchError::MissingJobId(_) => panic!("unexpected {other}"),
        }
        assert_eq!(agent.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_job_id_is_an_error() {
        let (agent, dispatcher, ctx) = setup();
        agent.script_job_id("  ");

        let err = assert_err!(dispatcher.reboot(&ctx, PowerOptions::default()).await);
        assert!(matches!(err, DispatchError::MissingJobId(OperationKind::Reboot)));
        assert_eq!(agent.call_count(), 1);

        agent.script_job_id("job-42");
        let job = dispatcher
            .reboot(&ctx, PowerOptions::default())
            .await
            .unwrap();
        assert_eq!(job.id.as_str(), "job-42");
    }

    #[tokio::test]
    async fn test_operation_kinds() {
        let (_agent, dispatcher, ctx) = setup();

        let cases = [
            (
                dispatcher.shutdown(&ctx, PowerOptions::default()).await,
                OperationKind::Shutdown,
            ),
            (
                dispatcher.run_script(&ctx, ScriptSpec::new("uptime")).await,
                OperationKind::RunScript,
            ),
            (
                dispatcher.start_service(&ctx, "sshd").await,
                OperationKind::StartService,
            ),
            (
                dispatcher.stop_service(&ctx, "sshd").await,
                OperationKind::StopService,
            ),
            (
                dispatcher.restart_service(&ctx, "sshd").await,
                OperationKind::RestartService,
            ),
        ];
        for (result, kind) in cases {
            assert_eq!(result.unwrap().operation, kind);
        }
    }
}
