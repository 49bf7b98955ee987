// src/errors.rs

//! Crate-wide error types.
//!
//! Every engine operation returns a typed [`EngineError`]; spawn failures
//! carry a [`SpawnError`] with the OS-level detail. Only
//! [`EngineError::LockPoisoned`] is fatal to the engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::CommandId;

/// Failure to create the OS process for a command.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("working directory {path:?} is invalid: {reason}")]
    WorkingDirectoryInvalid { path: PathBuf, reason: String },

    #[error("elevation denied: {0}")]
    ElevationDenied(String),

    #[error("elevation unavailable: {0}")]
    ElevationUnavailable(String),

    #[error("failed to spawn `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("command {0} is already running")]
    AlreadyRunning(CommandId),

    #[error("command {0} is not running")]
    NotRunning(CommandId),

    #[error("command {id} failed to start: {source}")]
    Spawn {
        id: CommandId,
        #[source]
        source: SpawnError,
    },

    #[error("cannot clear logs of command {0} while it is running")]
    ClearWhileRunning(CommandId),

    #[error("command not found: {0}")]
    CommandNotFound(CommandId),

    #[error("release of command {0} without a matching reservation")]
    ReleaseWithoutReservation(CommandId),

    #[error("launch task for command {0} ended before reporting a result")]
    LaunchAborted(CommandId),

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EngineError {
    /// Whether the engine can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::LockPoisoned(_))
    }

    /// The spawn-level cause, if this is a spawn failure.
    pub fn spawn_error(&self) -> Option<&SpawnError> {
        match self {
            EngineError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Map a poisoned `std::sync::Mutex` guard into [`EngineError::LockPoisoned`].
pub(crate) fn poisoned<T>(what: &'static str) -> impl FnOnce(T) -> EngineError {
    move |_| EngineError::LockPoisoned(what)
}
