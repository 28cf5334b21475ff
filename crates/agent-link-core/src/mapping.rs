//! Wire-to-domain mapping.
//!
//! Every function here is total: unrecognized enumeration names fall back
//! to a fixed default and malformed scalars are normalized, so mapping is
//! never the reason a read fails.

use chrono::{DateTime, Utc};

use crate::{
    context::DeviceId,
    domain::{
        ByteCount, Device, DeviceStatus, DeviceType, Patch, PatchSeverity, PatchStatus,
        ProcessInfo, RemoteEntry, RemoteListing, RemoteTime, ServiceInfo, ServiceState, StartType,
    },
    wire::{
        Timestamp, WireDevice, WireDirectoryListing, WireFileEntry, WirePatch, WireProcess,
        WireService,
    },
};

impl DeviceStatus {
    /// Unrecognized values map to [`DeviceStatus::Offline`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match normalize(value).as_str() {
            "online" => Self::Online,
            "warning" => Self::Warning,
            "maintenance" => Self::Maintenance,
            _ => Self::Offline,
        }
    }
}

impl DeviceType {
    /// Unrecognized values map to [`DeviceType::Workstation`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match normalize(value).as_str() {
            "server" => Self::Server,
            "network" => Self::Network,
            "iot" => Self::Iot,
            _ => Self::Workstation,
        }
    }
}

impl PatchSeverity {
    /// Unrecognized values map to [`PatchSeverity::Low`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match normalize(value).as_str() {
            "critical" => Self::Critical,
            "important" => Self::Important,
            "moderate" => Self::Moderate,
            _ => Self::Low,
        }
    }
}

impl PatchStatus {
    /// Unrecognized values map to [`PatchStatus::Missing`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match normalize(value).as_str() {
            "installed" => Self::Installed,
            "failed" => Self::Failed,
            _ => Self::Missing,
        }
    }
}

impl ServiceState {
    /// Unrecognized values map to [`ServiceState::Stopped`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match normalize(value).as_str() {
            "running" => Self::Running,
            "paused" => Self::Paused,
            "start_pending" => Self::StartPending,
            "stop_pending" => Self::StopPending,
            _ => Self::Stopped,
        }
    }
}

impl StartType {
    /// Unrecognized values map to [`StartType::Manual`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match normalize(value).as_str() {
            "automatic" | "auto" => Self::Automatic,
            "disabled" => Self::Disabled,
            _ => Self::Manual,
        }
    }
}

impl ByteCount {
    /// Negative wire counts clamp to zero.
    #[must_use]
    pub fn from_wire(value: i64) -> Self {
        Self::new(u64::try_from(value).unwrap_or(0))
    }
}

impl RemoteTime {
    /// Map an optional wire timestamp.
    #[must_use]
    pub fn from_wire(value: Option<Timestamp>) -> Self {
        let Some(ts) = value else {
            return Self::Unknown;
        };
        u32::try_from(ts.nanos)
            .ok()
            .filter(|nanos| *nanos < 1_000_000_000)
            .and_then(|nanos| DateTime::<Utc>::from_timestamp(ts.seconds, nanos))
            .map_or(
                Self::Invalid {
                    seconds: ts.seconds,
                    nanos: ts.nanos,
                },
                |at| Self::At { at },
            )
    }
}

impl From<WireDevice> for Device {
    fn from(wire: WireDevice) -> Self {
        Self {
            id: DeviceId::new(wire.id),
            name: wire.name,
            hostname: non_empty(wire.hostname),
            status: DeviceStatus::from_wire(&wire.status),
            device_type: DeviceType::from_wire(&wire.device_type),
            os_name: non_empty(wire.os_name),
            last_seen: RemoteTime::from_wire(wire.last_seen),
        }
    }
}

impl From<WirePatch> for Patch {
    fn from(wire: WirePatch) -> Self {
        Self {
            id: wire.id,
            title: wire.title,
            severity: PatchSeverity::from_wire(&wire.severity),
            status: PatchStatus::from_wire(&wire.status),
            size: ByteCount::from_wire(wire.size_bytes),
            released_at: RemoteTime::from_wire(wire.released_at),
            requires_reboot: wire.requires_reboot,
        }
    }
}

impl From<WireProcess> for ProcessInfo {
    fn from(wire: WireProcess) -> Self {
        Self {
            pid: wire.pid,
            name: wire.name,
            user: non_empty(wire.user),
            cpu_percent: if wire.cpu_percent.is_finite() {
                wire.cpu_percent.max(0.0)
            } else {
                0.0
            },
            memory: ByteCount::from_wire(wire.memory_bytes),
            started_at: RemoteTime::from_wire(wire.started_at),
        }
    }
}

impl From<WireService> for ServiceInfo {
    fn from(wire: WireService) -> Self {
        let display_name = non_empty(wire.display_name).unwrap_or_else(|| wire.name.clone());
        Self {
            name: wire.name,
            display_name,
            state: ServiceState::from_wire(&wire.state),
            start_type: StartType::from_wire(&wire.start_type),
        }
    }
}

impl From<WireFileEntry> for RemoteEntry {
    fn from(wire: WireFileEntry) -> Self {
        Self {
            name: wire.name,
            path: wire.path,
            is_dir: wire.is_dir,
            size: ByteCount::from_wire(wire.size_bytes),
            modified_at: RemoteTime::from_wire(wire.modified_at),
        }
    }
}

impl From<WireDirectoryListing> for RemoteListing {
    fn from(wire: WireDirectoryListing) -> Self {
        Self {
            current_path: wire.current_path,
            parent_path: non_empty(wire.parent_path),
            entries: wire.entries.into_iter().map(RemoteEntry::from).collect(),
        }
    }
}

/// Map a batch of wire records.
pub fn map_all<W, D: From<W>>(wire: impl IntoIterator<Item = W>) -> Vec<D> {
    wire.into_iter().map(D::from).collect()
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
