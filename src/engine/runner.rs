// src/engine/runner.rs

//! Launch and supervision of a single run.
//!
//! One task per run starts at reservation time and owns everything after
//! it: log reset, spawning, and then the [`ProcessHandle`]. Dropping the
//! caller of `execute` therefore cannot strand a reservation. The supervisor
//! starts a reader task per output stream, waits for either the process to
//! exit or a stop request, drains the readers, and only then releases the
//! reservation and publishes the terminal status. A subscriber that sees the
//! terminal event can therefore read the complete log.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::engine::controller::{Shared, SPAWN_FAILURE_EXIT_CODE};
use crate::engine::notify::finish_message;
use crate::engine::registry::Reservation;
use crate::errors::{EngineError, Result, SpawnError};
use crate::exec::shell::killed_by_signal;
use crate::exec::{OutputLines, ProcessHandle, ProcessSpawner};
use crate::types::{CommandDefinition, CommandId, ExecutionState, ExecutionStatus, StreamKind};

/// Start a reserved run and supervise it to completion.
///
/// The outcome of the start is sent on `started`; nobody listening is fine.
pub(crate) async fn launch(
    shared: Arc<Shared>,
    spawner: ProcessSpawner,
    def: CommandDefinition,
    reservation: Reservation,
    cancel: oneshot::Receiver<()>,
    started: oneshot::Sender<Result<ExecutionState>>,
) {
    let command_id = def.id;
    match start(&shared, &spawner, &def, &reservation).await {
        Ok((state, handle)) => {
            info!(command_id, pid = ?state.pid, name = %def.name, "command running");
            if started.send(Ok(state)).is_err() {
                debug!(command_id, "execute caller went away; run continues");
            }
            supervise(shared, def, reservation, handle, cancel).await;
        }
        Err(e) => {
            abandon_start(&shared, command_id, &reservation, &e);
            if started.send(Err(e)).is_err() {
                debug!(command_id, "execute caller went away before start failed");
            }
        }
    }
}

async fn start(
    shared: &Shared,
    spawner: &ProcessSpawner,
    def: &CommandDefinition,
    reservation: &Reservation,
) -> Result<(ExecutionState, ProcessHandle)> {
    if shared.config.reset_logs_on_execute {
        shared.logs.clear(def.id)?;
    }

    let handle = spawner.spawn(def).await.map_err(|source| EngineError::Spawn {
        id: def.id,
        source,
    })?;

    // On error the handle is dropped, which kills the child.
    let state = shared
        .registry
        .set_pid_and_publish(reservation, handle.pid(), &shared.events)?;
    Ok((state, handle))
}

/// Record a failed start: a stderr line, then `Failed` with the spawn
/// failure exit code. `Running` was never published for this run.
fn abandon_start(shared: &Shared, command_id: CommandId, reservation: &Reservation, err: &EngineError) {
    warn!(command_id, error = %err, "failed to start command");
    if let Some(source) = err.spawn_error() {
        report_start_failure(shared, command_id, source);
    }
    if let Err(e) = shared.registry.release_and_publish(
        reservation,
        ExecutionStatus::Failed,
        Some(SPAWN_FAILURE_EXIT_CODE),
        &shared.events,
    ) {
        error!(command_id, error = %e, fatal = e.is_fatal(), "failed to release reservation");
    }
}

fn report_start_failure(shared: &Shared, command_id: CommandId, source: &SpawnError) {
    if let Err(e) = shared.forward_line(
        command_id,
        StreamKind::Stderr,
        format!("failed to start: {source}"),
    ) {
        error!(command_id, error = %e, "failed to record start failure");
    }
}

async fn supervise(
    shared: Arc<Shared>,
    def: CommandDefinition,
    reservation: Reservation,
    mut handle: ProcessHandle,
    mut cancel: oneshot::Receiver<()>,
) {
    let command_id = def.id;

    let mut readers = Vec::with_capacity(2);
    if let Some(lines) = handle.take_stdout() {
        readers.push(spawn_reader(Arc::clone(&shared), command_id, StreamKind::Stdout, lines));
    }
    if let Some(lines) = handle.take_stderr() {
        readers.push(spawn_reader(Arc::clone(&shared), command_id, StreamKind::Stderr, lines));
    }

    let (wait_result, cancelled) = handle.wait_or_stop(&mut cancel).await;

    drain_readers(&shared, command_id, readers).await;

    let (status, mut exit_code) = classify(&wait_result, cancelled);
    if status == ExecutionStatus::Failed
        && exit_code.is_some()
        && exit_code == handle.elevation_denied_code()
    {
        warn!(command_id, ?exit_code, "elevation was refused by the user");
        report_start_failure(
            &shared,
            command_id,
            &SpawnError::ElevationDenied("the elevation prompt was cancelled".to_string()),
        );
        exit_code = Some(SPAWN_FAILURE_EXIT_CODE);
    }
    match &wait_result {
        Ok(raw) => info!(command_id, %status, ?exit_code, raw = %raw, "process exited"),
        Err(e) => error!(command_id, error = %e, "waiting for process failed"),
    }

    finalize(&shared, &def, &reservation, status, exit_code);
}

fn spawn_reader<R>(
    shared: Arc<Shared>,
    command_id: CommandId,
    stream: StreamKind,
    mut lines: OutputLines<R>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Err(e) = shared.forward_line(command_id, stream, line) {
                        error!(command_id, %stream, error = %e, fatal = e.is_fatal(), "dropping output");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(command_id, %stream, error = %e, "output read failed");
                    break;
                }
            }
        }
        debug!(command_id, %stream, "output reader finished");
    })
}

/// Wait for both readers to hit EOF, bounded by the drain timeout.
///
/// A grandchild that escaped the process group can hold a pipe open after
/// the process we launched has exited; such readers are abandoned.
async fn drain_readers(shared: &Shared, command_id: CommandId, readers: Vec<JoinHandle<()>>) {
    let deadline = Instant::now() + shared.config.drain_timeout;
    for mut reader in readers {
        match timeout_at(deadline, &mut reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(command_id, error = %e, "output reader task failed"),
            Err(_) => {
                warn!(command_id, "output still open after exit; abandoning reader");
                reader.abort();
            }
        }
    }
}

/// Map a raw exit to a terminal status.
///
/// Exits caused by our stop request, or by any signal, are `Stopped`
/// regardless of the signal-derived code.
fn classify(result: &io::Result<ExitStatus>, cancelled: bool) -> (ExecutionStatus, Option<i32>) {
    match result {
        _ if cancelled => (ExecutionStatus::Stopped, None),
        Ok(status) if killed_by_signal(status) => (ExecutionStatus::Stopped, None),
        Ok(status) if status.success() => (ExecutionStatus::Success, Some(status.code().unwrap_or(0))),
        Ok(status) => (ExecutionStatus::Failed, status.code()),
        Err(_) => (ExecutionStatus::Failed, None),
    }
}

fn finalize(
    shared: &Shared,
    def: &CommandDefinition,
    reservation: &Reservation,
    status: ExecutionStatus,
    exit_code: Option<i32>,
) {
    let command_id = def.id;
    if let Err(e) = shared
        .registry
        .release_and_publish(reservation, status, exit_code, &shared.events)
    {
        error!(command_id, error = %e, fatal = e.is_fatal(), "failed to release reservation");
        return;
    }

    if !def.notify_on_finish {
        return;
    }
    if let Some((title, body)) =
        finish_message(&def.name, status, exit_code, shared.config.notify_on_stopped)
    {
        if let Err(e) = shared.notifier.notify(&title, &body) {
            warn!(command_id, error = %e, "notification failed");
        }
    }
}
