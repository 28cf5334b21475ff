//! Mutating commands sent to a device agent.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a dispatched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Reboot,
    Shutdown,
    RunScript,
    KillProcess,
    StartService,
    StopService,
    RestartService,
    InstallPatches,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Shutdown => "shutdown",
            Self::RunScript => "run-script",
            Self::KillProcess => "kill-process",
            Self::StartService => "start-service",
            Self::StopService => "stop-service",
            Self::RestartService => "restart-service",
            Self::InstallPatches => "install-patches",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power-state change options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerOptions {
    /// Seconds to wait before acting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u32>,
    /// Do not wait for applications to exit.
    #[serde(default)]
    pub force: bool,
}

/// Interpreter a script runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptShell {
    #[default]
    Shell,
    Bash,
    PowerShell,
    Cmd,
    Python,
}

/// Script to execute on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSpec {
    pub shell: ScriptShell,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

impl ScriptSpec {
    /// Start building a script for the default shell.
    #[must_use]
    pub fn new<S: Into<String>>(body: S) -> Self {
        Self {
            shell: ScriptShell::default(),
            body: body.into(),
            args: Vec::new(),
            timeout_secs: None,
        }
    }

    /// Run under a specific interpreter.
    #[must_use]
    pub const fn shell(mut self, shell: ScriptShell) -> Self {
        self.shell = shell;
        self
    }

    /// Add arguments.
    #[must_use]
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Kill the script after `secs` seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, secs: u32) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Command payload carried by a dispatch RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Reboot(PowerOptions),
    Shutdown(PowerOptions),
    RunScript(ScriptSpec),
    KillProcess { pid: u32 },
    StartService { name: String },
    StopService { name: String },
    RestartService { name: String },
    InstallPatches { patch_ids: Vec<String> },
}

impl Command {
    /// The operation this command performs.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Reboot(_) => OperationKind::Reboot,
            Self::Shutdown(_) => OperationKind::Shutdown,
            Self::RunScript(_) => OperationKind::RunScript,
            Self::KillProcess { .. } => OperationKind::KillProcess,
            Self::StartService { .. } => OperationKind::StartService,
            Self::StopService { .. } => OperationKind::StopService,
            Self::RestartService { .. } => OperationKind::RestartService,
            Self::InstallPatches { .. } => OperationKind::InstallPatches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_builder() {
        let spec = ScriptSpec::new("Get-Service")
            .shell(ScriptShell::PowerShell)
            .args(["-Name", "wuauserv"])
            .timeout_secs(30);

        assert_eq!(spec.shell, ScriptShell::PowerShell);
        assert_eq!(spec.args, vec!["-Name", "wuauserv"]);
        assert_eq!(spec.timeout_secs, Some(30));
    }

    #[test]
    fn test_command_serialization() {
        let cmd = Command::InstallPatches {
            patch_ids: vec!["KB1".into(), "KB2".into()],
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "install_patches");
        assert_eq!(json["patch_ids"][1], "KB2");
        assert_eq!(cmd.kind(), OperationKind::InstallPatches);

        let parsed: Command = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn test_power_command_is_internally_tagged() {
        let json = serde_json::to_string(&Command::Reboot(PowerOptions::default())).unwrap();
        assert!(json.contains("\"type\":\"reboot\""));
        assert_eq!(OperationKind::KillProcess.to_string(), "kill-process");
    }
}
