//! In-memory agent backend.
//!
//! Useful for tests and local development. Responses are scripted up
//! front and every call is recorded.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DeviceContext,
    command::Command,
    context::DeviceId,
    rpc::{AgentRpc, RpcError},
    wire::{WireDirectoryListing, WireJobAccepted, WirePatch, WireProcess, WireService},
};

/// One recorded RPC call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Dispatch { device_id: DeviceId, command: Command },
    ListDirectory { device_id: DeviceId, path: Option<String> },
    ListProcesses { device_id: DeviceId },
    ListServices { device_id: DeviceId },
    ListPatches { device_id: DeviceId },
}

#[derive(Default)]
struct Inner {
    directories: HashMap<String, WireDirectoryListing>,
    default_path: Option<String>,
    processes: Vec<WireProcess>,
    services: Vec<WireService>,
    patches: Vec<WirePatch>,
    failures: VecDeque<RpcError>,
    job_ids: VecDeque<String>,
    calls: Vec<RecordedCall>,
}

/// In-memory [`AgentRpc`] implementation.
///
/// Queued failures are consumed one per call, in order, before any
/// scripted response is returned.
#[derive(Default)]
pub struct MemoryAgent {
    inner: Mutex<Inner>,
}

impl MemoryAgent {
    /// Create an agent with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `listing` for its `current_path`. The first listing added is
    /// also served when no path is requested.
    pub fn add_directory(&self, listing: WireDirectoryListing) {
        let mut inner = self.lock();
        if inner.default_path.is_none() {
            inner.default_path = Some(listing.current_path.clone());
        }
        inner.directories.insert(listing.current_path.clone(), listing);
    }

    pub fn set_processes(&self, processes: Vec<WireProcess>) {
        self.lock().processes = processes;
    }

    pub fn set_services(&self, services: Vec<WireService>) {
        self.lock().services = services;
    }

    pub fn set_patches(&self, patches: Vec<WirePatch>) {
        self.lock().patches = patches;
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: RpcError) {
        self.lock().failures.push_back(error);
    }

    /// Fail the next `n` calls with clones of `error`.
    pub fn fail_times(&self, n: usize, error: &RpcError) {
        let mut inner = self.lock();
        inner.failures.extend(std::iter::repeat_n(error.clone(), n));
    }

    /// Answer the next successful dispatch with `job_id` instead of a
    /// freshly minted one.
    pub fn script_job_id(&self, job_id: impl Into<String>) {
        self.lock().job_ids.push_back(job_id.into());
    }

    /// Snapshot of every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn record(&self, call: RecordedCall) -> Result<MutexGuard<'_, Inner>, RpcError> {
        let mut inner = self.lock();
        inner.calls.push(call);
        match inner.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(inner),
        }
    }
}

#[async_trait]
impl AgentRpc for MemoryAgent {
    async fn dispatch(
        &self,
        ctx: &DeviceContext,
        command: Command,
    ) -> Result<WireJobAccepted, RpcError> {
        let mut inner = self.record(RecordedCall::Dispatch {
            device_id: ctx.device_id.clone(),
            command,
        })?;
        let job_id = inner
            .job_ids
            .pop_front()
            .unwrap_or_else(|| format!("job-{}", Uuid::new_v4().simple()));
        Ok(WireJobAccepted { job_id })
    }

    async fn list_directory(
        &self,
        ctx: &DeviceContext,
        path: Option<&str>,
    ) -> Result<WireDirectoryListing, RpcError> {
        let inner = self.record(RecordedCall::ListDirectory {
            device_id: ctx.device_id.clone(),
            path: path.map(str::to_string),
        })?;
        let key = path.map(str::to_string).or_else(|| inner.default_path.clone());
        key.as_ref()
            .and_then(|k| inner.directories.get(k))
            .cloned()
            .ok_or_else(|| {
                RpcError::new(
                    crate::rpc::RpcErrorKind::NotFound,
                    format!("path not found: {}", key.as_deref().unwrap_or("<default>")),
                )
            })
    }

    async fn list_processes(&self, ctx: &DeviceContext) -> Result<Vec<WireProcess>, RpcError> {
        let inner = self.record(RecordedCall::ListProcesses {
            device_id: ctx.device_id.clone(),
        })?;
        Ok(inner.processes.clone())
    }

    async fn list_services(&self, ctx: &DeviceContext) -> Result<Vec<WireService>, RpcError> {
        let inner = self.record(RecordedCall::ListServices {
            device_id: ctx.device_id.clone(),
        })?;
        Ok(inner.services.clone())
    }

    async fn list_patches(&self, ctx: &DeviceContext) -> Result<Vec<WirePatch>, RpcError> {
        let inner = self.record(RecordedCall::ListPatches {
            device_id: ctx.device_id.clone(),
        })?;
        Ok(inner.patches.clone())
    }
}
