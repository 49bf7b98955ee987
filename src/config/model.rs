// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::log_buffer::DEFAULT_MAX_LOG_LINES;
use crate::types::{CommandDefinition, CommandId};

/// Raw configuration as read from a TOML file, before validation.
///
/// ```toml
/// [engine]
/// max_log_lines = 10000
/// reset_logs_on_execute = true
/// drain_timeout = "2s"
///
/// [command.1]
/// name = "hello"
/// cmd = "echo hello"
/// notify_on_finish = true
/// ```
///
/// All sections are optional at the parse level; [`ConfigFile`] enforces
/// that at least one command exists.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// Keyed by the command id as written in the TOML table name.
    #[serde(default)]
    pub command: BTreeMap<String, CommandSection>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    /// Clear a command's log history when it is started again.
    #[serde(default = "default_true")]
    pub reset_logs_on_execute: bool,

    /// How long to keep reading output after the process exits (e.g. `"2s"`).
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,

    /// Also notify when a run ends because it was stopped.
    #[serde(default)]
    pub notify_on_stopped: bool,
}

fn default_max_log_lines() -> usize {
    DEFAULT_MAX_LOG_LINES
}

fn default_true() -> bool {
    true
}

fn default_drain_timeout() -> String {
    "2s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_log_lines: default_max_log_lines(),
            reset_logs_on_execute: true,
            drain_timeout: default_drain_timeout(),
            notify_on_stopped: false,
        }
    }
}

/// `[command.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSection {
    /// Display name; defaults to the command text.
    #[serde(default)]
    pub name: Option<String>,

    pub cmd: String,

    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    #[serde(default)]
    pub sudo: bool,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub notify_on_finish: bool,
}

/// Engine tuning used by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_log_lines: usize,
    pub reset_logs_on_execute: bool,
    pub drain_timeout: Duration,
    pub notify_on_stopped: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_log_lines: DEFAULT_MAX_LOG_LINES,
            reset_logs_on_execute: true,
            drain_timeout: Duration::from_secs(2),
            notify_on_stopped: false,
        }
    }
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>`, so holding one means
/// every command id parsed and every value is in range.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub commands: BTreeMap<CommandId, CommandDefinition>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        engine: EngineConfig,
        commands: BTreeMap<CommandId, CommandDefinition>,
    ) -> Self {
        Self { engine, commands }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
