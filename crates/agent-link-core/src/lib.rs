//! Core abstractions for talking to remote device agents.
//!
//! This crate provides the fundamental building blocks:
//! - Wire response types and the total wire-to-domain mapping
//! - Domain model (`Device`, `Patch`, `RemoteListing`, ...)
//! - `AgentRpc` - the typed RPC seam and its error taxonomy
//! - `DeviceContext` - explicit organization/device addressing
//! - `LinkConfig` - shared configuration
//! - `MemoryAgent` - in-memory backend (feature: memory)

pub mod command;
pub mod config;
pub mod context;
pub mod domain;
pub mod mapping;
#[cfg(feature = "memory")]
pub mod memory;
pub mod rpc;
pub mod wire;

pub use command::{Command, OperationKind, PowerOptions, ScriptShell, ScriptSpec};
pub use config::{LinkConfig, RetryPolicy};
pub use context::{DeviceContext, DeviceId};
pub use domain::{ByteCount, RemoteListing, RemoteTime};
#[cfg(feature = "memory")]
pub use memory::MemoryAgent;
pub use rpc::{AgentRpc, RpcError, RpcErrorKind};
