// src/definitions.rs

//! Lookup of command definitions.
//!
//! The persistent command registry lives outside the engine; the controller
//! only needs to fetch a definition by id when a run starts.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::config::ConfigFile;
use crate::types::{CommandDefinition, CommandId};

pub trait DefinitionSource: Send + Sync {
    fn definition(&self, id: CommandId) -> Option<CommandDefinition>;
}

/// In-memory definitions, typically loaded from the TOML config.
///
/// Edits made through [`upsert`](Self::upsert) only affect runs started
/// afterwards; a running command keeps the definition it was started with.
#[derive(Debug, Default)]
pub struct StaticDefinitions {
    commands: RwLock<BTreeMap<CommandId, CommandDefinition>>,
}

impl StaticDefinitions {
    pub fn new(commands: impl IntoIterator<Item = CommandDefinition>) -> Self {
        Self {
            commands: RwLock::new(commands.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.commands.values().cloned())
    }

    pub fn upsert(&self, def: CommandDefinition) {
        let mut commands = self
            .commands
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        commands.insert(def.id, def);
    }

    /// All definitions, ordered by id.
    pub fn all(&self) -> Vec<CommandDefinition> {
        let commands = self
            .commands
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        commands.values().cloned().collect()
    }
}

impl DefinitionSource for StaticDefinitions {
    fn definition(&self, id: CommandId) -> Option<CommandDefinition> {
        let commands = self
            .commands
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        commands.get(&id).cloned()
    }
}
