// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`shell`] builds the platform shell invocation and terminates process
//!   groups.
//! - [`elevation`] provides the injectable privilege-escalation primitive.
//! - [`spawner`] turns a `CommandDefinition` into a running
//!   [`ProcessHandle`] with line-oriented stdout/stderr.

pub mod elevation;
pub mod shell;
pub mod spawner;

pub use elevation::{DenyElevation, Elevation, NoElevation, RunAsElevation, SudoElevation};
pub use spawner::{OutputLines, ProcessHandle, ProcessSpawner};
