// src/types.rs

//! Shared data types for the execution engine.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Stable identity of a command definition.
pub type CommandId = i64;

/// A user-defined command, as owned by the external command registry.
///
/// The engine only ever reads these. A definition is cloned into the run
/// when `execute` is called, so a concurrent edit in the registry does not
/// affect an in-flight process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub id: CommandId,
    pub name: String,
    /// Shell text, interpreted by the platform shell.
    pub command: String,
    pub working_directory: Option<PathBuf>,
    /// Run with escalated privileges.
    pub sudo: bool,
    /// Cosmetic link shown next to the command in the UI.
    pub url: Option<String>,
    pub notify_on_finish: bool,
}

impl CommandDefinition {
    /// Minimal definition: no working directory, no elevation, no notification.
    pub fn new(id: CommandId, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            command: command.into(),
            working_directory: None,
            sudo: false,
            url: None,
            notify_on_finish: false,
        }
    }
}

/// Lifecycle status of a command's most recent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Idle,
    Running,
    Success,
    Failed,
    Stopped,
}

impl ExecutionStatus {
    /// Success, Failed and Stopped are terminal: nothing follows automatically.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Idle => "idle",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Per-command execution state, as shown to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub command_id: CommandId,
    pub status: ExecutionStatus,
    /// Present only while Running.
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Local>>,
    /// Set on Success/Failed; absent otherwise.
    pub exit_code: Option<i32>,
}

impl ExecutionState {
    pub fn idle(command_id: CommandId) -> Self {
        Self {
            command_id,
            status: ExecutionStatus::Idle,
            pid: None,
            started_at: None,
            exit_code: None,
        }
    }
}

/// Which pipe a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured line of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub command_id: CommandId,
    pub stream: StreamKind,
    pub line: String,
}

impl LogLine {
    pub fn new(command_id: CommandId, stream: StreamKind, line: impl Into<String>) -> Self {
        Self {
            command_id,
            stream,
            line: line.into(),
        }
    }

    /// `[stdout] text` form used by the log viewer.
    pub fn display(&self) -> String {
        format!("[{}] {}", self.stream, self.line)
    }
}
