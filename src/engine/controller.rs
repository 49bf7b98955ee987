// src/engine/controller.rs

//! Execution controller: the boundary the UI talks to.
//!
//! `execute` reserves the command in the registry and hands the run to a
//! launch task ([`super::runner`]) that spawns and supervises the process. `stop` only records a
//! termination request; the `Stopped` transition happens when the
//! supervisor observes the process actually die.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::definitions::DefinitionSource;
use crate::engine::events::{EngineEvent, EventBroadcaster, SubscriberId, Subscription};
use crate::engine::notify::{Notifier, TracingNotifier};
use crate::engine::registry::{ExecutionRegistry, Reserved};
use crate::engine::runner;
use crate::errors::{EngineError, Result};
use crate::exec::elevation::{platform_elevation, Elevation};
use crate::exec::ProcessSpawner;
use crate::log_buffer::LogBuffer;
use crate::types::{
    CommandDefinition, CommandId, ExecutionState, ExecutionStatus, LogLine, StreamKind,
};

/// Exit code recorded when the process could not be created at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// State shared between the controller and its supervisor tasks.
pub(crate) struct Shared {
    pub(crate) registry: ExecutionRegistry,
    pub(crate) logs: LogBuffer,
    pub(crate) events: EventBroadcaster,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: EngineConfig,
}

impl Shared {
    /// Append a captured line and push it to subscribers, in that order.
    pub(crate) fn forward_line(
        &self,
        command_id: CommandId,
        stream: StreamKind,
        line: String,
    ) -> Result<()> {
        self.logs.append(command_id, stream, line.clone())?;
        self.events.publish_log_line(command_id, stream, line)
    }
}

/// Builder for [`ExecutionController`].
pub struct ControllerBuilder {
    definitions: Arc<dyn DefinitionSource>,
    config: EngineConfig,
    elevation: Option<Arc<dyn Elevation>>,
    notifier: Arc<dyn Notifier>,
}

impl ControllerBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn elevation(mut self, elevation: Arc<dyn Elevation>) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> ExecutionController {
        let elevation = self
            .elevation
            .unwrap_or_else(|| Arc::from(platform_elevation()));
        ExecutionController {
            shared: Arc::new(Shared {
                registry: ExecutionRegistry::new(),
                logs: LogBuffer::new(self.config.max_log_lines),
                events: EventBroadcaster::new(),
                notifier: self.notifier,
                config: self.config,
            }),
            spawner: ProcessSpawner::new(elevation),
            definitions: self.definitions,
        }
    }
}

/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct ExecutionController {
    shared: Arc<Shared>,
    spawner: ProcessSpawner,
    definitions: Arc<dyn DefinitionSource>,
}

impl fmt::Debug for ExecutionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionController")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionController {
    pub fn builder(definitions: Arc<dyn DefinitionSource>) -> ControllerBuilder {
        ControllerBuilder {
            definitions,
            config: EngineConfig::default(),
            elevation: None,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn new(config: EngineConfig, definitions: Arc<dyn DefinitionSource>) -> Self {
        Self::builder(definitions).config(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Look up the definition for `command_id` and start it.
    pub async fn execute(&self, command_id: CommandId) -> Result<ExecutionState> {
        let def = self
            .definitions
            .definition(command_id)
            .ok_or(EngineError::CommandNotFound(command_id))?;
        self.execute_definition(def).await
    }

    /// Start a run of `def`.
    ///
    /// Returns the `Running` state once the process exists. A command that is
    /// already running is rejected with `AlreadyRunning` and left alone. A
    /// spawn failure marks the command `Failed` and is returned as
    /// `EngineError::Spawn`.
    ///
    /// Dropping the returned future after the reservation does not abandon
    /// the run: spawning happens on its own task, which always ends in a
    /// terminal state.
    pub async fn execute_definition(&self, def: CommandDefinition) -> Result<ExecutionState> {
        let command_id = def.id;
        let Reserved {
            reservation,
            cancel,
            ..
        } = self.shared.registry.try_reserve(command_id)?;

        let (started_tx, started_rx) = oneshot::channel();
        tokio::spawn(runner::launch(
            Arc::clone(&self.shared),
            self.spawner.clone(),
            def,
            reservation,
            cancel,
            started_tx,
        ));

        started_rx
            .await
            .map_err(|_| EngineError::LaunchAborted(command_id))?
    }

    /// Request termination of a running command.
    ///
    /// Returns as soon as the request is recorded. Termination is best
    /// effort: the command stays `Running` until its process is observed to
    /// exit.
    pub fn stop(&self, command_id: CommandId) -> Result<()> {
        self.shared.registry.request_stop(command_id)?;
        info!(command_id, "stop requested");
        Ok(())
    }

    /// Request termination of every running command. Returns the ids that
    /// were asked to stop.
    pub fn shutdown(&self) -> Result<Vec<CommandId>> {
        let mut stopped = Vec::new();
        for command_id in self.shared.registry.running()? {
            match self.shared.registry.request_stop(command_id) {
                Ok(()) => stopped.push(command_id),
                // Finished between listing and stopping.
                Err(EngineError::NotRunning(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!(count = stopped.len(), "shutdown requested");
        Ok(stopped)
    }

    pub fn get_execution_state(&self, command_id: CommandId) -> Result<Option<ExecutionState>> {
        self.shared.registry.get(command_id)
    }

    pub fn get_all_execution_states(&self) -> Result<HashMap<CommandId, ExecutionState>> {
        self.shared.registry.get_all()
    }

    pub fn get_logs(&self, command_id: CommandId) -> Result<Vec<LogLine>> {
        self.shared.logs.read(command_id)
    }

    pub fn has_logs(&self, command_id: CommandId) -> Result<bool> {
        self.shared.logs.has_logs(command_id)
    }

    /// Clear a command's log history. Rejected with `ClearWhileRunning`
    /// while the command is running.
    pub fn clear_logs(&self, command_id: CommandId) -> Result<()> {
        self.shared
            .registry
            .while_not_running(command_id, || self.shared.logs.clear(command_id))?;
        debug!(command_id, "logs cleared");
        Ok(())
    }

    pub fn subscribe(&self) -> Result<Subscription> {
        self.shared.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> Result<bool> {
        self.shared.events.unsubscribe(id)
    }

    /// Wait until `command_id` is no longer running and return its state.
    ///
    /// Returns immediately for a command that is not running (or unknown).
    pub async fn wait_until_idle(&self, command_id: CommandId) -> Result<Option<ExecutionState>> {
        // Subscribe before checking, so the terminal event cannot slip in
        // between the check and the subscription.
        let mut sub = self.subscribe()?;
        let result = loop {
            let current = self.get_execution_state(command_id)?;
            if !current
                .as_ref()
                .is_some_and(|s| s.status == ExecutionStatus::Running)
            {
                break Ok(current);
            }
            match sub.recv().await {
                Some(EngineEvent::StatusChanged(state))
                    if state.command_id == command_id && state.status.is_terminal() =>
                {
                    break Ok(Some(state));
                }
                Some(_) => continue,
                None => break self.get_execution_state(command_id),
            }
        };
        self.unsubscribe(sub.id())?;
        result
    }
}
