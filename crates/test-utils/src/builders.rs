#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use sigil::config::{CommandSection, ConfigFile, EngineSection, RawConfigFile};
use sigil::types::{CommandDefinition, CommandId};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection::default(),
                command: BTreeMap::new(),
            },
        }
    }

    pub fn with_command(mut self, id: CommandId, cmd: &str) -> Self {
        self.config.command.insert(
            id.to_string(),
            CommandSection {
                name: None,
                cmd: cmd.to_string(),
                working_directory: None,
                sudo: false,
                url: None,
                notify_on_finish: false,
            },
        );
        self
    }

    pub fn max_log_lines(mut self, n: usize) -> Self {
        self.config.engine.max_log_lines = n;
        self
    }

    pub fn reset_logs_on_execute(mut self, val: bool) -> Self {
        self.config.engine.reset_logs_on_execute = val;
        self
    }

    pub fn drain_timeout(mut self, s: &str) -> Self {
        self.config.engine.drain_timeout = s.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `CommandDefinition`.
pub struct CommandDefinitionBuilder {
    def: CommandDefinition,
}

impl CommandDefinitionBuilder {
    pub fn new(id: CommandId, cmd: &str) -> Self {
        Self {
            def: CommandDefinition::new(id, format!("cmd-{id}"), cmd),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.def.name = name.to_string();
        self
    }

    pub fn working_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.def.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn sudo(mut self, val: bool) -> Self {
        self.def.sudo = val;
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.def.url = Some(url.to_string());
        self
    }

    pub fn notify_on_finish(mut self, val: bool) -> Self {
        self.def.notify_on_finish = val;
        self
    }

    pub fn build(self) -> CommandDefinition {
        self.def
    }
}
