// src/engine/mod.rs

//! Command execution engine.
//!
//! This module ties together:
//! - the execution registry (who is running, reserve/release)
//! - the event broadcaster (status and log-line fan-out)
//! - the per-run supervisor (readers, exit waiter, cancellation)
//! - the controller, which is the public boundary used by the UI layer
//!
//! The registry and broadcaster are plain synchronous structures guarded by
//! their own locks; everything that waits on the OS lives in [`runner`].

pub mod controller;
pub mod events;
pub mod notify;
pub mod registry;
mod runner;

pub use controller::{ControllerBuilder, ExecutionController, SPAWN_FAILURE_EXIT_CODE};
pub use events::{EngineEvent, EventBroadcaster, SubscriberId, Subscription};
pub use notify::{finish_message, Notifier, TracingNotifier};
pub use registry::{ExecutionRegistry, Reservation, Reserved};
