//! Cycle records
//!
//! One [`CycleRecord`] is written per completed cycle through a
//! [`CycleRecorder`]. Writes are fire-and-forget from the controller's
//! point of view: a failure is logged and never affects sequencing.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::PersistenceError;
use crate::signal::lane::LaneCounts;

/// Immutable record of one executed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Executed phase name.
    pub phase_name: String,
    /// Counts the cycle was computed from.
    pub counts: LaneCounts,
    /// Green time in seconds (the longer subphase for a dual cycle).
    pub green_time_secs: u32,
    /// Sum of `counts`.
    pub total_vehicles: u32,
    /// When the cycle finished.
    pub timestamp: DateTime<Utc>,
}

/// Persistence sink for cycle records.
#[async_trait]
pub trait CycleRecorder: Send + Sync {
    /// Stores one record.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the record cannot be stored.
    async fn record_cycle(&self, record: &CycleRecord) -> Result<(), PersistenceError>;
}

/// Appends records as JSON lines to a file.
///
/// Writes go through tokio's file handle, so a slow disk parks the
/// recording task rather than a runtime worker.
#[derive(Debug)]
pub struct JsonlCycleLog {
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonlCycleLog {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: tokio::sync::Mutex::new(tokio::fs::File::from_std(file)),
        })
    }

    /// Reads every record back from a log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is not a record.
    pub fn read_all(path: &Path) -> Result<Vec<CycleRecord>, PersistenceError> {
        let text = std::fs::read_to_string(path)?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(PersistenceError::from))
            .collect()
    }
}

#[async_trait]
impl CycleRecorder for JsonlCycleLog {
    async fn record_cycle(&self, record: &CycleRecord) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryCycleLog {
    records: Mutex<Vec<CycleRecord>>,
}

impl MemoryCycleLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records stored so far.
    #[must_use]
    pub fn records(&self) -> Vec<CycleRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CycleRecorder for MemoryCycleLog {
    async fn record_cycle(&self, record: &CycleRecord) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Discards records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCycleLog;

#[async_trait]
impl CycleRecorder for NullCycleLog {
    async fn record_cycle(&self, _record: &CycleRecord) -> Result<(), PersistenceError> {
        Ok(())
    }
}
