// src/log_buffer.rs

//! Bounded per-command output history.
//!
//! Each command id gets its own ring of [`LogLine`]s behind its own lock, so
//! the stdout and stderr readers of one command never contend with another
//! command's readers. The outer map lock is only held long enough to look up
//! (or create) a command's ring.
//!
//! Eviction is strictly FIFO: once a ring holds `max_lines` entries, each
//! append drops exactly the oldest line.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::errors::{poisoned, Result};
use crate::types::{CommandId, LogLine, StreamKind};

/// Default bound on retained lines per command.
pub const DEFAULT_MAX_LOG_LINES: usize = 10_000;

type Ring = Arc<Mutex<VecDeque<LogLine>>>;

#[derive(Debug)]
pub struct LogBuffer {
    max_lines: usize,
    rings: Mutex<HashMap<CommandId, Ring>>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl LogBuffer {
    /// A bound of 0 is treated as 1; config validation rejects 0 earlier.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            rings: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    fn ring(&self, command_id: CommandId) -> Result<Ring> {
        let mut rings = self.rings.lock().map_err(poisoned("log buffer map"))?;
        Ok(Arc::clone(rings.entry(command_id).or_insert_with(|| {
            Arc::new(Mutex::new(VecDeque::new()))
        })))
    }

    fn existing_ring(&self, command_id: CommandId) -> Result<Option<Ring>> {
        let rings = self.rings.lock().map_err(poisoned("log buffer map"))?;
        Ok(rings.get(&command_id).cloned())
    }

    /// Append one line, evicting the oldest line if the bound is exceeded.
    pub fn append(
        &self,
        command_id: CommandId,
        stream: StreamKind,
        line: impl Into<String>,
    ) -> Result<()> {
        let ring = self.ring(command_id)?;
        let mut lines = ring.lock().map_err(poisoned("log buffer ring"))?;
        lines.push_back(LogLine::new(command_id, stream, line));
        while lines.len() > self.max_lines {
            lines.pop_front();
            trace!(command_id, "evicted oldest log line");
        }
        Ok(())
    }

    /// Snapshot of the retained lines, oldest first.
    pub fn read(&self, command_id: CommandId) -> Result<Vec<LogLine>> {
        match self.existing_ring(command_id)? {
            Some(ring) => {
                let lines = ring.lock().map_err(poisoned("log buffer ring"))?;
                Ok(lines.iter().cloned().collect())
            }
            None => Ok(Vec::new()),
        }
    }

    pub fn len(&self, command_id: CommandId) -> Result<usize> {
        match self.existing_ring(command_id)? {
            Some(ring) => Ok(ring.lock().map_err(poisoned("log buffer ring"))?.len()),
            None => Ok(0),
        }
    }

    pub fn has_logs(&self, command_id: CommandId) -> Result<bool> {
        Ok(self.len(command_id)? > 0)
    }

    /// Drop all retained lines for a command.
    ///
    /// This does not know about execution status; callers that must not
    /// clear a running command's output go through the controller.
    pub fn clear(&self, command_id: CommandId) -> Result<()> {
        if let Some(ring) = self.existing_ring(command_id)? {
            ring.lock().map_err(poisoned("log buffer ring"))?.clear();
        }
        Ok(())
    }
}
