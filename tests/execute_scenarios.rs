// tests/execute_scenarios.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use sigil::engine::{EngineEvent, SPAWN_FAILURE_EXIT_CODE};
use sigil::errors::{EngineError, SpawnError};
use sigil::exec::DenyElevation;
use sigil::definitions::StaticDefinitions;
use sigil::engine::ExecutionController;
use sigil::types::{ExecutionStatus, StreamKind};
use sigil_test_utils::builders::CommandDefinitionBuilder;
use sigil_test_utils::{controller_for, init_tracing, wait_for_terminal, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn echo_hello_succeeds_with_one_stdout_line() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "echo hello").build()]);
    let mut sub = controller.subscribe()?;

    let running = controller.execute(1).await?;
    assert_eq!(running.status, ExecutionStatus::Running);
    assert!(running.pid.is_some());
    assert!(running.started_at.is_some());

    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Success);
    assert_eq!(state.exit_code, Some(0));
    assert_eq!(state.pid, None);

    let logs = controller.get_logs(1)?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].stream, StreamKind::Stdout);
    assert_eq!(logs[0].line, "hello");
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_failed_with_raw_code() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "exit 3").build()]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;

    assert_eq!(state.status, ExecutionStatus::Failed);
    assert_eq!(state.exit_code, Some(3));
    Ok(())
}

#[tokio::test]
async fn stop_long_running_command_ends_stopped() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "sleep 10").build()]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    controller.stop(1)?;

    // Still Running until the exit waiter sees the process die.
    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Stopped);
    assert_eq!(state.exit_code, None);

    let current = controller.get_execution_state(1)?.expect("state retained");
    assert_eq!(current.status, ExecutionStatus::Stopped);
    Ok(())
}

#[tokio::test]
async fn stop_kills_the_whole_pipeline() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![
        CommandDefinitionBuilder::new(1, "sleep 10 | cat; echo never").build(),
    ]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    controller.stop(1)?;

    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Stopped);
    assert!(controller.get_logs(1)?.iter().all(|l| l.line != "never"));
    Ok(())
}

#[tokio::test]
async fn stop_right_after_execute_is_not_lost() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "sleep 10").build()]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    controller.stop(1)?;

    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Stopped);
    Ok(())
}

#[tokio::test]
async fn repeated_stop_is_accepted_while_running() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "sleep 10").build()]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    controller.stop(1)?;
    // Either still Running (accepted no-op) or already finished (NotRunning).
    match controller.stop(1) {
        Ok(()) | Err(EngineError::NotRunning(1)) => {}
        Err(e) => return Err(e.into()),
    }

    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Stopped);
    Ok(())
}

#[tokio::test]
async fn external_signal_is_reported_as_stopped() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![
        CommandDefinitionBuilder::new(1, "kill -KILL $$").build(),
    ]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Stopped);
    Ok(())
}

#[tokio::test]
async fn second_execute_while_running_is_rejected() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "sleep 10").build()]);
    let mut sub = controller.subscribe()?;

    let first = controller.execute(1).await?;
    let second = controller.execute(1).await;
    assert!(matches!(second, Err(EngineError::AlreadyRunning(1))));

    let all = controller.get_all_execution_states()?;
    assert_eq!(all.len(), 1);
    let state = &all[&1];
    assert_eq!(state.status, ExecutionStatus::Running);
    assert_eq!(state.pid, first.pid, "the first run is untouched");

    controller.stop(1)?;
    with_timeout(wait_for_terminal(&mut sub, 1)).await;
    Ok(())
}

#[tokio::test]
async fn command_can_run_again_after_finishing() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "echo again").build()]);
    let mut sub = controller.subscribe()?;

    for _ in 0..2 {
        controller.execute(1).await?;
        let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
        assert_eq!(state.status, ExecutionStatus::Success);
    }
    Ok(())
}

#[tokio::test]
async fn stop_on_idle_or_unknown_command_is_not_running() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "true").build()]);
    let mut sub = controller.subscribe()?;

    assert!(matches!(controller.stop(42), Err(EngineError::NotRunning(42))));

    controller.execute(1).await?;
    with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert!(matches!(controller.stop(1), Err(EngineError::NotRunning(1))));
    Ok(())
}

#[tokio::test]
async fn unknown_command_id_is_not_found() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![]);
    assert!(matches!(
        controller.execute(7).await,
        Err(EngineError::CommandNotFound(7))
    ));
    assert!(controller.get_execution_state(7)?.is_none());
    Ok(())
}

#[tokio::test]
async fn shell_features_and_stderr_are_captured() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![
        CommandDefinitionBuilder::new(1, "echo abc | tr a x; echo oops 1>&2").build(),
    ]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    with_timeout(wait_for_terminal(&mut sub, 1)).await;

    let logs = controller.get_logs(1)?;
    assert!(logs.iter().any(|l| l.stream == StreamKind::Stdout && l.line == "xbc"));
    assert!(logs.iter().any(|l| l.stream == StreamKind::Stderr && l.line == "oops"));
    Ok(())
}

#[tokio::test]
async fn working_directory_is_honoured() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("marker.txt"), "")?;

    let controller = controller_for(vec![
        CommandDefinitionBuilder::new(1, "ls").working_directory(dir.path()).build(),
    ]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Success);
    assert!(controller.get_logs(1)?.iter().any(|l| l.line == "marker.txt"));
    Ok(())
}

#[tokio::test]
async fn missing_working_directory_fails_the_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("nope");

    let controller = controller_for(vec![
        CommandDefinitionBuilder::new(1, "true").working_directory(&missing).build(),
    ]);
    let mut sub = controller.subscribe()?;

    let err = controller.execute(1).await.expect_err("spawn must fail");
    assert!(matches!(
        err.spawn_error(),
        Some(SpawnError::WorkingDirectoryInvalid { .. })
    ));

    let (state, _) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Failed);
    assert_eq!(state.exit_code, Some(SPAWN_FAILURE_EXIT_CODE));

    // The registry is free again.
    assert!(!controller.get_all_execution_states()?.values().any(|s| s.status == ExecutionStatus::Running));
    Ok(())
}

#[tokio::test]
async fn working_directory_that_is_a_file_is_invalid() -> TestResult {
    init_tracing();
    let file = tempfile::NamedTempFile::new()?;
    let controller = controller_for(vec![
        CommandDefinitionBuilder::new(1, "true").working_directory(file.path()).build(),
    ]);

    let err = controller.execute(1).await.expect_err("spawn must fail");
    match err.spawn_error() {
        Some(SpawnError::WorkingDirectoryInvalid { reason, .. }) => {
            assert_eq!(reason, "not a directory");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn denied_elevation_is_distinct_from_command_failure() -> TestResult {
    init_tracing();
    let defs = StaticDefinitions::new(vec![
        CommandDefinitionBuilder::new(1, "id -u").sudo(true).build(),
    ]);
    let controller = ExecutionController::builder(Arc::new(defs))
        .elevation(Arc::new(DenyElevation {
            reason: "user cancelled".to_string(),
        }))
        .build();
    let mut sub = controller.subscribe()?;

    let err = controller.execute(1).await.expect_err("elevation must fail");
    assert!(matches!(err.spawn_error(), Some(SpawnError::ElevationDenied(r)) if r == "user cancelled"));

    let (state, events) = with_timeout(wait_for_terminal(&mut sub, 1)).await;
    assert_eq!(state.status, ExecutionStatus::Failed);
    assert!(
        !events.iter().any(|e| matches!(e, EngineEvent::StatusChanged(s) if s.status == ExecutionStatus::Running)),
        "a run that never spawned is never published as Running"
    );
    Ok(())
}

#[tokio::test]
async fn failure_in_one_command_does_not_affect_another() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let controller = controller_for(vec![
        CommandDefinitionBuilder::new(1, "sleep 10").build(),
        CommandDefinitionBuilder::new(2, "true")
            .working_directory(dir.path().join("missing"))
            .build(),
    ]);
    let mut sub = controller.subscribe()?;

    controller.execute(1).await?;
    assert!(controller.execute(2).await.is_err());

    let one = controller.get_execution_state(1)?.expect("state for 1");
    assert_eq!(one.status, ExecutionStatus::Running);

    controller.stop(1)?;
    with_timeout(wait_for_terminal(&mut sub, 1)).await;
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_every_running_command() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![
        CommandDefinitionBuilder::new(1, "sleep 10").build(),
        CommandDefinitionBuilder::new(2, "sleep 10").build(),
        CommandDefinitionBuilder::new(3, "true").build(),
    ]);
    let mut sub = controller.subscribe()?;

    controller.execute(3).await?;
    with_timeout(wait_for_terminal(&mut sub, 3)).await;
    controller.execute(1).await?;
    controller.execute(2).await?;

    let mut stopped = controller.shutdown()?;
    stopped.sort();
    assert_eq!(stopped, vec![1, 2]);

    let states = with_timeout(sigil_test_utils::wait_for_all_terminal(&mut sub, &[1, 2])).await;
    assert!(states.values().all(|s| s.status == ExecutionStatus::Stopped));
    Ok(())
}

#[tokio::test]
async fn wait_until_idle_returns_terminal_state() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "exit 5").build()]);

    assert!(controller.wait_until_idle(1).await?.is_none());

    controller.execute(1).await?;
    let state = with_timeout(controller.wait_until_idle(1)).await?.expect("state");
    assert_eq!(state.status, ExecutionStatus::Failed);
    assert_eq!(state.exit_code, Some(5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_executes_start_exactly_one_run() -> TestResult {
    init_tracing();
    let controller = controller_for(vec![CommandDefinitionBuilder::new(1, "sleep 10").build()]);

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.execute(1).await })
        })
        .collect();

    let mut started = 0;
    for attempt in attempts {
        match attempt.await? {
            Ok(_) => started += 1,
            Err(EngineError::AlreadyRunning(1)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(started, 1);

    controller.stop(1)?;
    let state = with_timeout(controller.wait_until_idle(1)).await?.expect("state");
    assert_eq!(state.status, ExecutionStatus::Stopped);
    Ok(())
}
