//! Shared integration-test helpers: controller wiring with a recording
//! head, heads and recorders that fail, and a CLI runner.

#![allow(dead_code)]

use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use signalrig::error::{HardwareError, PersistenceError};
use signalrig::persistence::{CycleRecord, CycleRecorder, MemoryCycleLog};
use signalrig::signal::hardware::{RecordedCommand, SignalHead, SimulatedSignalHead};
use signalrig::signal::{Lane, LaneColor, SignalTiming, TrafficController};

/// Stock timing without the per-command stagger, so holds add up exactly.
pub fn exact_timing() -> SignalTiming {
    SignalTiming {
        command_stagger: Duration::ZERO,
        ..SignalTiming::default()
    }
}

/// A controller wired to a recording head and an in-memory cycle log.
pub struct Rig {
    pub controller: TrafficController,
    pub head: Arc<SimulatedSignalHead>,
    pub log: Arc<MemoryCycleLog>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_timing(exact_timing())
    }

    pub fn with_timing(timing: SignalTiming) -> Self {
        let head = Arc::new(SimulatedSignalHead::new());
        let log = Arc::new(MemoryCycleLog::new());
        let controller = TrafficController::builder()
            .timing(timing)
            .head(head.clone())
            .recorder(log.clone())
            .build();
        Self {
            controller,
            head,
            log,
        }
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.head.commands()
    }

    /// Lanes that were ever commanded `color`.
    pub fn lanes_shown(&self, color: LaneColor) -> Vec<usize> {
        let mut lanes: Vec<usize> = self
            .commands()
            .iter()
            .filter(|c| c.color == color)
            .map(|c| c.lane.index())
            .collect();
        lanes.sort_unstable();
        lanes.dedup();
        lanes
    }
}

/// Head whose every command fails.
#[derive(Debug, Default)]
pub struct DeadHead;

#[async_trait]
impl SignalHead for DeadHead {
    async fn set_lane_color(&self, lane: Lane, color: LaneColor) -> Result<(), HardwareError> {
        Err(HardwareError::CommandFailed {
            lane,
            color,
            reason: "unplugged".to_string(),
        })
    }

    fn describe(&self) -> String {
        "dead".to_string()
    }
}

/// Working head that takes `delay` to apply each command.
#[derive(Debug)]
pub struct SlowHead {
    pub delay: Duration,
    pub inner: SimulatedSignalHead,
}

impl SlowHead {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: SimulatedSignalHead::new(),
        }
    }
}

#[async_trait]
impl SignalHead for SlowHead {
    async fn set_lane_color(&self, lane: Lane, color: LaneColor) -> Result<(), HardwareError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set_lane_color(lane, color).await
    }

    fn describe(&self) -> String {
        "slow".to_string()
    }
}

/// Head that takes `delay` per attempt and then fails, like a link whose
/// connect always times out.
#[derive(Debug)]
pub struct SlowDeadHead {
    pub delay: Duration,
    pub attempts: AtomicUsize,
}

impl SlowDeadHead {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalHead for SlowDeadHead {
    async fn set_lane_color(&self, lane: Lane, color: LaneColor) -> Result<(), HardwareError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Err(HardwareError::CommandFailed {
            lane,
            color,
            reason: "connect timed out".to_string(),
        })
    }

    fn describe(&self) -> String {
        "slow-dead".to_string()
    }
}

/// Recorder whose every write fails.
#[derive(Debug, Default)]
pub struct FailingRecorder {
    pub attempts: AtomicUsize,
}

impl FailingRecorder {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CycleRecorder for FailingRecorder {
    async fn record_cycle(&self, _record: &CycleRecord) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistenceError::Io(std::io::Error::other("disk full")))
    }
}

/// Runs the `signalrig` binary to completion.
pub fn run_cli(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_signalrig"))
        .args(args)
        .env_remove("SIGNALRIG_CONFIG")
        .env_remove("SIGNALRIG_LINK")
        .env_remove("SIGNALRIG_CYCLE_LOG")
        .output()
        .expect("failed to run signalrig")
}

/// Writes `contents` to `name` inside `dir`.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("failed to write fixture");
    path
}
