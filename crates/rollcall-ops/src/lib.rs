//! Operational helpers: logging setup and the activity log.

use std::{
    collections::VecDeque,
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};

use chrono::{DateTime, Local};
use rollcall_types::{config::OpsConfig, Result, RollcallError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Where trace output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// `<ops.log_dir>/rollcall.log`; used while the terminal dashboard owns
    /// the screen.
    File,
}

pub fn init_tracing(config: &OpsConfig, target: LogTarget) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| RollcallError::Ops(format!("failed to create log filter: {err}")))?;

    match target {
        LogTarget::Stderr => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| RollcallError::Ops(format!("tracing init error: {err}")))?;
            Ok(None)
        }
        LogTarget::File => {
            let dir = ensure_dir(&config.log_dir)?;
            let path = dir.join("rollcall.log");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| RollcallError::Ops(format!("failed to open {:?}: {err}", path)))?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| RollcallError::Ops(format!("tracing init error: {err}")))?;
            Ok(Some(path))
        }
    }
}

pub fn ensure_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    fs::create_dir_all(&dir)
        .map_err(|err| RollcallError::Ops(format!("failed to create directory {path}: {err}")))?;
    info!("Directory ready at {:?}", dir);
    Ok(dir)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl ActivityLogEntry {
    /// `[HH:MM:SS] message`
    pub fn line(&self) -> String {
        format!("[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Diagnostic trace shown to the operator, newest entry first. Nothing
/// downstream reads its content.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: VecDeque<ActivityLogEntry>,
    capacity: Option<usize>,
}

impl ActivityLog {
    /// `capacity` of `None` keeps every entry for the life of the session.
    /// A capacity of zero still keeps the latest entry.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.map(|capacity| capacity.max(1)),
        }
    }

    pub fn record(&mut self, message: impl Into<String>) -> &ActivityLogEntry {
        self.record_at(message, Local::now())
    }

    pub fn record_at(&mut self, message: impl Into<String>, at: DateTime<Local>) -> &ActivityLogEntry {
        let entry = ActivityLogEntry {
            at,
            message: message.into(),
        };
        debug!(activity = %entry.message, "Activity");
        self.entries.push_front(entry);
        if let Some(capacity) = self.capacity {
            self.entries.truncate(capacity);
        }
        &self.entries[0]
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityLogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ActivityLogEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
