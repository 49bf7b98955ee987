// src/lib.rs

pub mod cli;
pub mod config;
pub mod definitions;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod log_buffer;
pub mod logging;
pub mod types;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{default_config_path, load_and_validate, ConfigFile};
use crate::definitions::StaticDefinitions;
use crate::engine::{EngineEvent, ExecutionController};
use crate::errors::EngineError;
use crate::types::{CommandId, ExecutionState, ExecutionStatus};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the execution controller
/// - event printing
/// - Ctrl-C handling (stops every running command)
///
/// Returns `true` if every requested command finished with `Success`.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if args.dry_run || args.list {
        print_commands(&cfg, args.dry_run);
        return Ok(true);
    }

    let ids = requested_ids(&cfg, &args.ids)?;
    let definitions = Arc::new(StaticDefinitions::from_config(&cfg));
    let controller = ExecutionController::new(cfg.engine, definitions);

    // Subscribe before starting anything so no event is missed.
    let mut events = controller.subscribe()?;

    // Ctrl-C → stop everything; the event loop below exits once the
    // processes are observed to be gone.
    {
        let controller = controller.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            match controller.shutdown() {
                Ok(stopped) => info!(?stopped, "Ctrl-C: stopping running commands"),
                Err(e) => warn!(error = %e, "Ctrl-C: shutdown failed"),
            }
        });
    }

    let mut pending: HashSet<CommandId> = HashSet::new();
    for id in &ids {
        match controller.execute(*id).await {
            Ok(_) => {
                pending.insert(*id);
            }
            Err(e @ EngineError::Spawn { .. }) => {
                eprintln!("sigil: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(?ids, running = pending.len(), "commands started");

    let mut finals: BTreeMap<CommandId, ExecutionState> = BTreeMap::new();
    while !pending.is_empty() {
        let Some(event) = events.recv().await else {
            bail!("event stream closed while commands were still running");
        };
        print_event(&event, args.json)?;

        if let EngineEvent::StatusChanged(state) = event {
            if state.status.is_terminal() && pending.remove(&state.command_id) {
                finals.insert(state.command_id, state);
            }
        }
    }

    // Commands that failed to spawn never entered `pending`.
    for id in &ids {
        if !finals.contains_key(id) {
            if let Some(state) = controller.get_execution_state(*id)? {
                finals.insert(*id, state);
            }
        }
    }

    let all_ok = ids.iter().all(|id| {
        finals
            .get(id)
            .is_some_and(|s| s.status == ExecutionStatus::Success)
    });
    debug!(?finals, all_ok, "all requested commands finished");
    Ok(all_ok)
}

fn requested_ids(cfg: &ConfigFile, ids: &[CommandId]) -> Result<Vec<CommandId>> {
    if ids.is_empty() {
        return Ok(cfg.commands.keys().copied().collect());
    }
    for id in ids {
        if !cfg.commands.contains_key(id) {
            bail!("no command with id {id} in config");
        }
    }
    Ok(ids.to_vec())
}

fn print_event(event: &EngineEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        EngineEvent::LogLine(line) => println!("[{}]{}", line.command_id, line.display()),
        EngineEvent::StatusChanged(state) => match state.exit_code {
            Some(code) => println!("[{}] {} (exit code {code})", state.command_id, state.status),
            None => println!("[{}] {}", state.command_id, state.status),
        },
    }
    Ok(())
}

/// Print the configured commands (`--list`), plus engine settings for
/// `--dry-run`.
fn print_commands(cfg: &ConfigFile, with_engine: bool) {
    if with_engine {
        println!("sigil dry-run");
        println!("  engine.max_log_lines = {}", cfg.engine.max_log_lines);
        println!(
            "  engine.reset_logs_on_execute = {}",
            cfg.engine.reset_logs_on_execute
        );
        println!("  engine.drain_timeout = {:?}", cfg.engine.drain_timeout);
        println!("  engine.notify_on_stopped = {}", cfg.engine.notify_on_stopped);
        println!();
    }

    println!("commands ({}):", cfg.commands.len());
    for (id, def) in cfg.commands.iter() {
        println!("  - [{id}] {}", def.name);
        println!("      cmd: {}", def.command);
        if let Some(ref dir) = def.working_directory {
            println!("      working_directory: {}", dir.display());
        }
        if def.sudo {
            println!("      sudo: true");
        }
        if let Some(ref url) = def.url {
            println!("      url: {url}");
        }
        if def.notify_on_finish {
            println!("      notify_on_finish: true");
        }
    }
}
