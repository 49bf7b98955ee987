// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{parse_duration, CommandSection, ConfigFile, EngineConfig, RawConfigFile};
use crate::errors::{EngineError, Result};
use crate::types::{CommandDefinition, CommandId};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EngineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_commands(&raw)?;
        let engine = validate_engine(&raw)?;
        let commands = validate_commands(raw.command)?;
        Ok(ConfigFile::new_unchecked(engine, commands))
    }
}

fn ensure_has_commands(cfg: &RawConfigFile) -> Result<()> {
    if cfg.command.is_empty() {
        return Err(EngineError::Config(
            "config must contain at least one [command.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<EngineConfig> {
    let engine = &cfg.engine;
    if engine.max_log_lines == 0 {
        return Err(EngineError::Config(
            "[engine].max_log_lines must be >= 1 (got 0)".to_string(),
        ));
    }

    let drain_timeout = parse_duration(&engine.drain_timeout).map_err(|e| {
        EngineError::Config(format!("[engine].drain_timeout is invalid: {e}"))
    })?;

    Ok(EngineConfig {
        max_log_lines: engine.max_log_lines,
        reset_logs_on_execute: engine.reset_logs_on_execute,
        drain_timeout,
        notify_on_stopped: engine.notify_on_stopped,
    })
}

fn validate_commands(
    raw: BTreeMap<String, CommandSection>,
) -> Result<BTreeMap<CommandId, CommandDefinition>> {
    let mut commands = BTreeMap::new();

    for (key, section) in raw {
        let id: CommandId = key.trim().parse().map_err(|_| {
            EngineError::Config(format!(
                "command key '{key}' is not an integer id (expected [command.<id>])"
            ))
        })?;

        if section.cmd.trim().is_empty() {
            return Err(EngineError::Config(format!(
                "command {id} has an empty `cmd`"
            )));
        }

        let name = section
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| section.cmd.clone());

        let def = CommandDefinition {
            id,
            name,
            command: section.cmd,
            working_directory: section.working_directory,
            sudo: section.sudo,
            url: section.url,
            notify_on_finish: section.notify_on_finish,
        };

        if commands.insert(id, def).is_some() {
            return Err(EngineError::Config(format!(
                "command id {id} is defined more than once"
            )));
        }
    }

    Ok(commands)
}
