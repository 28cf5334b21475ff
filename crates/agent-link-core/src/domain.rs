//! Domain values produced from wire responses.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::DeviceId;

/// Device connectivity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Warning,
    Maintenance,
}

/// Device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Server,
    Workstation,
    Network,
    Iot,
}

/// Patch severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchSeverity {
    Low = 1,
    Moderate = 2,
    Important = 3,
    Critical = 4,
}

impl PatchSeverity {
    /// Numeric rank, `critical` = 4 down to `low` = 1.
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }
}

/// Patch installation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Installed,
    Missing,
    Failed,
}

impl PatchStatus {
    /// Whether the patch needs operator attention.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        !matches!(self, Self::Installed)
    }
}

/// Service run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Stopped,
    Paused,
    StartPending,
    StopPending,
}

/// Service start type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartType {
    Automatic,
    Manual,
    Disabled,
}

/// Exact byte count with an on-demand human rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteCount(u64);

const BYTE_UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

impl ByteCount {
    /// Wrap a raw byte count.
    #[must_use]
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Raw bytes, for exact arithmetic.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }

    /// Binary-prefixed value rounded to two decimals.
    ///
    /// Always derived from the raw count; nothing pre-rounded is stored.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn human(self) -> HumanBytes {
        let mut value = self.0 as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        let mut rounded = (value * 100.0).round() / 100.0;
        // 1023.995 and up rounds to 1024; carry into the next unit.
        if rounded >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
            rounded = (value * 100.0).round() / 100.0;
        }
        HumanBytes {
            value: rounded,
            unit: BYTE_UNITS[unit],
        }
    }
}

impl From<u64> for ByteCount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ByteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.human().fmt(f)
    }
}

/// Rendered byte count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumanBytes {
    /// Value in `unit`, rounded to two decimals.
    pub value: f64,
    /// Binary unit label.
    pub unit: &'static str,
}

impl fmt::Display for HumanBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == BYTE_UNITS[0] {
            write!(f, "{} {}", self.value, self.unit)
        } else {
            write!(f, "{:.2} {}", self.value, self.unit)
        }
    }
}

/// A point in time reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteTime {
    /// The field was absent on the wire.
    Unknown,
    /// Present, but not a representable instant.
    Invalid { seconds: i64, nanos: i32 },
    /// A valid instant.
    At { at: DateTime<Utc> },
}

impl RemoteTime {
    /// The instant, if known and valid.
    #[must_use]
    pub const fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At { at } => Some(*at),
            Self::Unknown | Self::Invalid { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for RemoteTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Invalid { .. } => f.write_str("invalid date"),
            Self::At { at } => write!(f, "{}", at.to_rfc3339()),
        }
    }
}

/// Managed device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub hostname: Option<String>,
    pub status: DeviceStatus,
    pub device_type: DeviceType,
    pub os_name: Option<String>,
    pub last_seen: RemoteTime,
}

/// Patch known to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    pub title: String,
    pub severity: PatchSeverity,
    pub status: PatchStatus,
    pub size: ByteCount,
    pub released_at: RemoteTime,
    pub requires_reboot: bool,
}

/// Process running on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub user: Option<String>,
    pub cpu_percent: f64,
    pub memory: ByteCount,
    pub started_at: RemoteTime,
}

/// Service installed on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub display_name: String,
    pub state: ServiceState,
    pub start_type: StartType,
}

/// One entry of a [`RemoteListing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    /// Absolute path on the device.
    pub path: String,
    pub is_dir: bool,
    pub size: ByteCount,
    pub modified_at: RemoteTime,
}

/// Result of a directory browse.
///
/// Entries are not individually addressable; a listing is replaced as a
/// whole by the next successful browse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteListing {
    pub current_path: String,
    pub parent_path: Option<String>,
    pub entries: Vec<RemoteEntry>,
}

impl RemoteListing {
    /// Directory entries, in agent order.
    pub fn directories(&self) -> impl Iterator<Item = &RemoteEntry> {
        self.entries.iter().filter(|e| e.is_dir)
    }

    pub fn files(&self) -> impl Iterator<Item = &RemoteEntry> {
        self.entries.iter().filter(|e| !e.is_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes_units() {
        assert_eq!(ByteCount::new(512).to_string(), "512 B");
        assert_eq!(ByteCount::new(1536).to_string(), "1.50 KiB");
        assert_eq!(ByteCount::new(5 * 1024 * 1024).to_string(), "5.00 MiB");
        assert_eq!(ByteCount::new(u64::MAX).human().unit, "PiB");
        assert_eq!(ByteCount::new(1_048_575).to_string(), "1.00 MiB");
        assert_eq!(ByteCount::new(1_073_741_823).to_string(), "1.00 GiB");
        assert_eq!(ByteCount::new(1023).to_string(), "1023 B");
    }

    #[test]
    fn test_human_bytes_is_idempotent() {
        for bytes in [0, 1, 1023, 1024, 1_234_567, 9_876_543_210, u64::MAX] {
            let count = ByteCount::new(bytes);
            assert_eq!(count.human(), count.human());
            assert_eq!(count.to_string(), count.to_string());
            // Raw value survives rendering untouched.
            assert_eq!(count.bytes(), bytes);
        }
    }

    #[test]
    fn test_severity_order() {
        assert!(PatchSeverity::Critical > PatchSeverity::Important);
        assert!(PatchSeverity::Important > PatchSeverity::Moderate);
        assert!(PatchSeverity::Moderate > PatchSeverity::Low);
        assert_eq!(PatchSeverity::Critical.rank(), 4);
        assert_eq!(PatchSeverity::Low.rank(), 1);
    }

    #[test]
    fn test_remote_time_rendering_is_distinct() {
        let unknown = RemoteTime::Unknown;
        let invalid = RemoteTime::Invalid {
            seconds: i64::MAX,
            nanos: 0,
        };
        assert_ne!(unknown.to_string(), invalid.to_string());
        assert!(unknown.instant().is_none());
        assert!(invalid.instant().is_none());
    }
}
