//! Dispatched jobs.

use std::fmt;

use agent_link_core::{DeviceId, OperationKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier assigned by the agent backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mutating operation accepted by the backend.
///
/// Completion is tracked elsewhere; a `Job` only records that dispatch
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub operation: OperationKind,
    pub device_id: DeviceId,
    pub issued_at: DateTime<Utc>,
}
