// src/engine/registry.rs

//! Authoritative map of command id → execution state.
//!
//! `try_reserve` and `release` are the only ways in and out of `Running`.
//! Both run under the same lock, which is what stops a fast double-click from
//! starting the same command twice.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Local;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::engine::events::EventBroadcaster;
use crate::errors::{poisoned, EngineError, Result};
use crate::types::{CommandId, ExecutionState, ExecutionStatus};

/// Proof that the holder moved a command into `Running`.
///
/// Each reservation carries a generation number; `release` only accepts the
/// reservation that is currently active for its command.
#[derive(Debug, PartialEq, Eq)]
pub struct Reservation {
    command_id: CommandId,
    generation: u64,
}

impl Reservation {
    pub fn command_id(&self) -> CommandId {
        self.command_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of a successful [`ExecutionRegistry::try_reserve`].
#[derive(Debug)]
pub struct Reserved {
    pub reservation: Reservation,
    /// Fires when `request_stop` is called for this run.
    pub cancel: oneshot::Receiver<()>,
    pub state: ExecutionState,
}

#[derive(Debug)]
struct Entry {
    state: ExecutionState,
    /// Generation of the live reservation, `None` when not Running.
    active: Option<u64>,
    /// Taken by the first `request_stop` of the live run.
    cancel: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CommandId, Entry>,
    next_generation: u64,
}

#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    inner: Mutex<Inner>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically move a command into `Running`.
    ///
    /// Fails with [`EngineError::AlreadyRunning`] if it is already running;
    /// the existing run is left untouched.
    pub fn try_reserve(&self, command_id: CommandId) -> Result<Reserved> {
        let mut inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        if inner
            .entries
            .get(&command_id)
            .is_some_and(|e| e.state.status == ExecutionStatus::Running)
        {
            debug!(command_id, "reservation rejected: already running");
            return Err(EngineError::AlreadyRunning(command_id));
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;

        let state = ExecutionState {
            command_id,
            status: ExecutionStatus::Running,
            pid: None,
            started_at: Some(Local::now()),
            exit_code: None,
        };
        let (cancel_tx, cancel_rx) = oneshot::channel();
        inner.entries.insert(
            command_id,
            Entry {
                state: state.clone(),
                active: Some(generation),
                cancel: Some(cancel_tx),
            },
        );

        debug!(command_id, generation, "reserved");
        Ok(Reserved {
            reservation: Reservation {
                command_id,
                generation,
            },
            cancel: cancel_rx,
            state,
        })
    }

    /// Signal the live run of a command to terminate.
    ///
    /// Only the request is recorded here; the state stays `Running` until
    /// the exit waiter observes the process die and calls `release`. A
    /// repeated request for the same run is accepted and does nothing.
    pub fn request_stop(&self, command_id: CommandId) -> Result<()> {
        let mut inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        let entry = match inner.entries.get_mut(&command_id) {
            Some(entry) if entry.state.status == ExecutionStatus::Running => entry,
            _ => return Err(EngineError::NotRunning(command_id)),
        };

        match entry.cancel.take() {
            Some(tx) => {
                if tx.send(()).is_err() {
                    debug!(command_id, "exit waiter already gone while stopping");
                }
                debug!(command_id, "stop requested");
            }
            None => debug!(command_id, "stop already requested"),
        }
        Ok(())
    }

    /// Record the OS pid once the process exists.
    pub fn set_pid(&self, reservation: &Reservation, pid: Option<u32>) -> Result<ExecutionState> {
        let mut inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        Self::set_pid_locked(&mut inner, reservation, pid)
    }

    /// [`set_pid`](Self::set_pid), publishing the `Running` state before the
    /// registry lock is released.
    pub fn set_pid_and_publish(
        &self,
        reservation: &Reservation,
        pid: Option<u32>,
        events: &EventBroadcaster,
    ) -> Result<ExecutionState> {
        let mut inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        let state = Self::set_pid_locked(&mut inner, reservation, pid)?;
        events.publish_status_change(state.clone())?;
        Ok(state)
    }

    /// Move a reserved command into its terminal status.
    ///
    /// Releasing a reservation that is no longer active (a second release,
    /// or one from a superseded run) is reported as
    /// [`EngineError::ReleaseWithoutReservation`].
    pub fn release(
        &self,
        reservation: &Reservation,
        status: ExecutionStatus,
        exit_code: Option<i32>,
    ) -> Result<ExecutionState> {
        let mut inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        Self::release_locked(&mut inner, reservation, status, exit_code)
    }

    /// [`release`](Self::release), publishing the terminal state before the
    /// registry lock is released.
    ///
    /// A new run of the same command can only be reserved after this
    /// returns, so subscribers never see its `Running` ahead of the previous
    /// run's terminal event.
    pub fn release_and_publish(
        &self,
        reservation: &Reservation,
        status: ExecutionStatus,
        exit_code: Option<i32>,
        events: &EventBroadcaster,
    ) -> Result<ExecutionState> {
        let mut inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        let state = Self::release_locked(&mut inner, reservation, status, exit_code)?;
        events.publish_status_change(state.clone())?;
        Ok(state)
    }

    fn set_pid_locked(
        inner: &mut Inner,
        reservation: &Reservation,
        pid: Option<u32>,
    ) -> Result<ExecutionState> {
        let entry = Self::active_entry(inner, reservation)?;
        entry.state.pid = pid;
        Ok(entry.state.clone())
    }

    fn release_locked(
        inner: &mut Inner,
        reservation: &Reservation,
        status: ExecutionStatus,
        exit_code: Option<i32>,
    ) -> Result<ExecutionState> {
        debug_assert!(status.is_terminal(), "release requires a terminal status");

        let entry = Self::active_entry(inner, reservation)?;

        entry.active = None;
        entry.cancel = None;
        entry.state.status = status;
        entry.state.pid = None;
        entry.state.exit_code = match status {
            ExecutionStatus::Success | ExecutionStatus::Failed => exit_code,
            _ => None,
        };

        debug!(
            command_id = reservation.command_id,
            generation = reservation.generation,
            %status,
            ?exit_code,
            "released"
        );
        Ok(entry.state.clone())
    }

    fn active_entry<'a>(inner: &'a mut Inner, reservation: &Reservation) -> Result<&'a mut Entry> {
        match inner.entries.get_mut(&reservation.command_id) {
            Some(entry) if entry.active == Some(reservation.generation) => Ok(entry),
            _ => {
                error!(
                    command_id = reservation.command_id,
                    generation = reservation.generation,
                    "reservation is not active"
                );
                Err(EngineError::ReleaseWithoutReservation(reservation.command_id))
            }
        }
    }

    pub fn get(&self, command_id: CommandId) -> Result<Option<ExecutionState>> {
        let inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        Ok(inner.entries.get(&command_id).map(|e| e.state.clone()))
    }

    pub fn get_all(&self) -> Result<HashMap<CommandId, ExecutionState>> {
        let inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        Ok(inner
            .entries
            .iter()
            .map(|(id, e)| (*id, e.state.clone()))
            .collect())
    }

    pub fn is_running(&self, command_id: CommandId) -> Result<bool> {
        Ok(self
            .get(command_id)?
            .is_some_and(|s| s.status == ExecutionStatus::Running))
    }

    /// Ids of every command currently Running.
    pub fn running(&self) -> Result<Vec<CommandId>> {
        let inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        Ok(inner
            .entries
            .iter()
            .filter(|(_, e)| e.state.status == ExecutionStatus::Running)
            .map(|(id, _)| *id)
            .collect())
    }

    /// Run `f` while holding the registry lock, provided the command is not
    /// Running. Used to make "check then clear logs" atomic against a
    /// concurrent `try_reserve`.
    pub fn while_not_running<R>(
        &self,
        command_id: CommandId,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let inner = self.inner.lock().map_err(poisoned("execution registry"))?;
        if inner
            .entries
            .get(&command_id)
            .is_some_and(|e| e.state.status == ExecutionStatus::Running)
        {
            return Err(EngineError::ClearWhileRunning(command_id));
        }
        let out = f();
        drop(inner);
        out
    }
}
