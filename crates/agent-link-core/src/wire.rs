//! Wire-level response messages as delivered by the RPC transport.
//!
//! Enumerations travel as their symbolic names and byte counts as signed
//! 64-bit integers. Nothing here is interpreted; see [`crate::mapping`].

use serde::{Deserialize, Serialize};

/// Wire timestamp message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Sub-second nanoseconds.
    pub nanos: i32,
}

impl Timestamp {
    /// Create a timestamp.
    #[must_use]
    pub const fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }
}

/// Device record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireDevice {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hostname: Option<String>,
    pub status: String,
    pub device_type: String,
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub last_seen: Option<Timestamp>,
}

/// Patch record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WirePatch {
    pub id: String,
    pub title: String,
    pub severity: String,
    pub status: String,
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default)]
    pub released_at: Option<Timestamp>,
    #[serde(default)]
    pub requires_reboot: bool,
}

/// Running process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireProcess {
    pub pid: u32,
    pub name: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_bytes: i64,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
}

/// Installed service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireService {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub state: String,
    #[serde(default)]
    pub start_type: String,
}

/// One directory entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireFileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default)]
    pub modified_at: Option<Timestamp>,
}

/// Directory browse response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireDirectoryListing {
    pub current_path: String,
    #[serde(default)]
    pub parent_path: Option<String>,
    #[serde(default)]
    pub entries: Vec<WireFileEntry>,
}

/// Acknowledgement of a dispatched command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireJobAccepted {
    pub job_id: String,
}
