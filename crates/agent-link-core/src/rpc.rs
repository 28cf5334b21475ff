//! RPC transport seam.
//!
//! The structured RPC system itself is external; implementations of
//! [`AgentRpc`] wrap its generated client stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    DeviceContext,
    command::Command,
    wire::{WireDirectoryListing, WireJobAccepted, WirePatch, WireProcess, WireService},
};

/// Structured error code, when the transport provides one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorKind {
    /// The agent is not reachable yet.
    Unavailable,
    NotFound,
    InvalidArgument,
    PermissionDenied,
    DeadlineExceeded,
    Internal,
    Unknown,
}

/// Error returned by an RPC call.
///
/// `message` is human readable and is passed through to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RpcError {
    pub kind: Option<RpcErrorKind>,
    pub message: String,
}

impl RpcError {
    /// An error with a structured kind.
    #[must_use]
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            message: message.into(),
        }
    }

    /// An error carrying only a message, as older transports report them.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Unavailable, message)
    }
}

/// Typed call stubs for one device agent backend.
#[async_trait]
pub trait AgentRpc: Send + Sync {
    /// Dispatch a mutating command; the agent answers with a job id.
    async fn dispatch(
        &self,
        ctx: &DeviceContext,
        command: Command,
    ) -> Result<WireJobAccepted, RpcError>;

    /// Browse a directory. `None` asks for the agent's default location.
    async fn list_directory(
        &self,
        ctx: &DeviceContext,
        path: Option<&str>,
    ) -> Result<WireDirectoryListing, RpcError>;

    /// Enumerate running processes.
    async fn list_processes(&self, ctx: &DeviceContext) -> Result<Vec<WireProcess>, RpcError>;

    /// Enumerate installed services.
    async fn list_services(&self, ctx: &DeviceContext) -> Result<Vec<WireService>, RpcError>;

    /// Enumerate known patches.
    async fn list_patches(&self, ctx: &DeviceContext) -> Result<Vec<WirePatch>, RpcError>;
}

#[async_trait]
impl<T: AgentRpc + ?Sized> AgentRpc for std::sync::Arc<T> {
    async fn dispatch(
        &self,
        ctx: &DeviceContext,
        command: Command,
    ) -> Result<WireJobAccepted, RpcError> {
        (**self).dispatch(ctx, command).await
    }

    async fn list_directory(
        &self,
        ctx: &DeviceContext,
        path: Option<&str>,
    ) -> Result<WireDirectoryListing, RpcError> {
        (**self).list_directory(ctx, path).await
    }

    async fn list_processes(&self, ctx: &DeviceContext) -> Result<Vec<WireProcess>, RpcError> {
        (**self).list_processes(ctx).await
    }

    async fn list_services(&self, ctx: &DeviceContext) -> Result<Vec<WireService>, RpcError> {
        (**self).list_services(ctx).await
    }

    async fn list_patches(&self, ctx: &DeviceContext) -> Result<Vec<WirePatch>, RpcError> {
        (**self).list_patches(ctx).await
    }
}
