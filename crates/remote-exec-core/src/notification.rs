//! Notifications pushed to the session observer.

use serde::{Deserialize, Serialize};

use crate::model::{Device, SessionSnapshot, SourceError, WorkspaceId};

/// Language variant the workspace evaluates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Default,
    Concurrent,
    NonDet,
    Lazy,
}

/// External library loaded into a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalLibrary {
    #[default]
    None,
    Ev3,
}

/// Language configuration a workspace is reset to when a device connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfig {
    pub chapter: u8,
    pub variant: Variant,
    pub library: ExternalLibrary,
    /// Device primitives a program may call.
    pub symbols: Vec<String>,
    /// Globals predeclared in the workspace.
    #[serde(default)]
    pub globals: Vec<(String, serde_json::Value)>,
}

/// Typed notification for the workspace store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Current session changed; `None` means no session.
    Session { session: Option<SessionSnapshot> },
    /// Device list refreshed.
    Devices { devices: Vec<Device> },
    /// Workspace running flag.
    Running { workspace: WorkspaceId, running: bool },
    /// Clear prior console output.
    ClearOutput { workspace: WorkspaceId },
    /// A console line printed by the program.
    Console { workspace: WorkspaceId, line: String },
    /// Program finished with a value.
    EvalResult { workspace: WorkspaceId, value: String },
    /// Program failed to compile or raised at runtime.
    EvalErrors {
        workspace: WorkspaceId,
        errors: Vec<SourceError>,
    },
    /// Reset the language context to the device's configuration.
    ResetLanguage {
        workspace: WorkspaceId,
        config: LanguageConfig,
    },
    /// Select an external library for the workspace.
    SelectLibrary {
        workspace: WorkspaceId,
        library: ExternalLibrary,
    },
}

impl Notification {
    /// Approximate size in bytes, used for history accounting.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 64;
        OVERHEAD
            + match self {
                Self::Console { line, .. } => line.len(),
                Self::EvalResult { value, .. } => value.len(),
                Self::EvalErrors { errors, .. } => {
                    errors.iter().map(|e| e.message.len() + OVERHEAD).sum()
                }
                Self::Devices { devices } => devices.len() * OVERHEAD,
                Self::ResetLanguage { config, .. } => {
                    config.symbols.iter().map(String::len).sum()
                }
                Self::Session { session } => session
                    .as_ref()
                    .and_then(|s| s.device.peripherals.as_ref())
                    .map_or(0, |p| p.len() * OVERHEAD),
                Self::Running { .. } | Self::ClearOutput { .. } | Self::SelectLibrary { .. } => 0,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serialization() {
        let msg = Notification::Running {
            workspace: "playground".to_string(),
            running: true,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"running\""));

        let parsed: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_library_names() {
        let json = serde_json::to_string(&ExternalLibrary::Ev3).unwrap();
        assert_eq!(json, "\"EV3\"");
        assert_eq!(ExternalLibrary::default(), ExternalLibrary::None);
    }
}
