//! Device addressing context.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Identifier of a managed device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap a device identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Context every agent call is made in.
///
/// There is no process-wide default organization: the caller threads the
/// organization and device through each dispatch, query and session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceContext {
    /// Organization that owns the device.
    pub organization_id: String,

    /// Target device.
    pub device_id: DeviceId,

    /// Extra request metadata forwarded to the RPC transport.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl DeviceContext {
    /// Create a context for one device of one organization.
    #[must_use]
    pub fn new(organization_id: impl Into<String>, device_id: impl Into<DeviceId>) -> Self {
        Self {
            organization_id: organization_id.into(),
            device_id: device_id.into(),
            metadata: HashMap::new(),
        }
    }

    /// Same organization, different device.
    #[must_use]
    pub fn for_device(&self, device_id: impl Into<DeviceId>) -> Self {
        Self {
            organization_id: self.organization_id.clone(),
            device_id: device_id.into(),
            metadata: self.metadata.clone(),
        }
    }

    /// Get a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Set a metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }
}
