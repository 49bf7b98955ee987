pub mod builders;
pub mod notifier;

use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use sigil::definitions::StaticDefinitions;
use sigil::engine::{EngineEvent, ExecutionController, Subscription};
use sigil::types::{CommandDefinition, CommandId, ExecutionState};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Controller over the given definitions with default engine settings and
/// no real elevation.
pub fn controller_for(defs: Vec<CommandDefinition>) -> ExecutionController {
    ExecutionController::builder(Arc::new(StaticDefinitions::new(defs)))
        .elevation(Arc::new(sigil::exec::NoElevation))
        .build()
}

/// Read events until a terminal status for `id` arrives, returning that
/// state and every event seen on the way (including the terminal one).
pub async fn wait_for_terminal(
    sub: &mut Subscription,
    id: CommandId,
) -> (ExecutionState, Vec<EngineEvent>) {
    let mut seen = Vec::new();
    loop {
        let event = sub.recv().await.expect("event stream closed");
        seen.push(event.clone());
        if let EngineEvent::StatusChanged(state) = event {
            if state.command_id == id && state.status.is_terminal() {
                return (state, seen);
            }
        }
    }
}

/// Terminal states for every id in `ids`, in arrival order per id.
pub async fn wait_for_all_terminal(
    sub: &mut Subscription,
    ids: &[CommandId],
) -> HashMap<CommandId, ExecutionState> {
    let mut done = HashMap::new();
    while done.len() < ids.len() {
        let event = sub.recv().await.expect("event stream closed");
        if let EngineEvent::StatusChanged(state) = event {
            if ids.contains(&state.command_id) && state.status.is_terminal() {
                done.insert(state.command_id, state);
            }
        }
    }
    done
}
