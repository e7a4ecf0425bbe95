//! Structured controller event stream.
//!
//! Discrete, typed events serialized as newline-delimited JSON with a
//! monotonically increasing sequence number.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::signal::lane::{LaneColor, LaneCounts};

/// Why the control loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Graceful `stop()`.
    Requested,
    /// `emergency_stop()`.
    Emergency,
}

/// A discrete event emitted by the controller.
///
/// Each variant is tagged with `"type"` when serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The control loop started.
    ControllerStarted {
        /// When the loop started.
        timestamp: DateTime<Utc>,
        /// Identifier of this run, shared by every later event.
        run_id: String,
        /// Number of catalog phases.
        phases: usize,
    },

    /// The control loop stopped.
    ControllerStopped {
        /// When the loop stopped.
        timestamp: DateTime<Utc>,
        /// Identifier of the run that ended.
        run_id: String,
        /// Stop reason.
        reason: StopReason,
    },

    /// The selector chose a phase.
    PhaseSelected {
        /// When the decision was made.
        timestamp: DateTime<Utc>,
        /// Chosen phase name.
        phase_name: String,
        /// Vehicles waiting on the phase.
        vehicles: u32,
        /// Green time in seconds.
        green_time_secs: u32,
        /// Group streak after the decision.
        group_streak: u32,
        /// Fairness bound forced the group.
        fairness_override: bool,
    },

    /// A cycle finished (completed or aborted).
    CycleCompleted {
        /// When the cycle finished.
        timestamp: DateTime<Utc>,
        /// Executed phase name.
        phase_name: String,
        /// `completed` or `aborted`.
        outcome: String,
        /// Counts the cycle was computed from.
        counts: LaneCounts,
        /// Green time in seconds.
        green_time_secs: u32,
        /// Wall time in milliseconds.
        duration_ms: u64,
        /// Lane commands skipped after a retry.
        failed_commands: usize,
    },

    /// A lane command failed twice and was skipped.
    LaneCommandFailed {
        /// When the retry failed.
        timestamp: DateTime<Utc>,
        /// Lane index.
        lane: u8,
        /// Commanded color.
        color: LaneColor,
        /// Last error message.
        error: String,
    },

    /// `emergency_stop()` forced all lanes red.
    EmergencyStop {
        /// When the stop was requested.
        timestamp: DateTime<Utc>,
        /// The loop was running when the stop arrived.
        was_running: bool,
    },
}

#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

/// Thread-safe, buffered JSONL event writer.
///
/// Serialization and I/O failures are dropped; the event stream never
/// affects signal sequencing.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    #[derive(Clone)]
    struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        fn new() -> Self {
            Self(Arc::new(StdMutex::new(Vec::new())))
        }

        fn contents(&self) -> String {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn selected() -> Event {
        Event::PhaseSelected {
            timestamp: DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            phase_name: "CROSS_A".to_owned(),
            vehicles: 4,
            green_time_secs: 23,
            group_streak: 1,
            fairness_override: true,
        }
    }

    #[test]
    fn emitter_writes_flat_sequenced_jsonl() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(selected());
        emitter.emit(Event::EmergencyStop {
            timestamp: Utc::now(),
            was_running: false,
        });
        assert_eq!(emitter.event_count(), 2);

        let lines: Vec<serde_json::Value> = tw
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["sequence"], 0);
        assert_eq!(lines[0]["type"], "PhaseSelected");
        assert_eq!(lines[0]["phase_name"], "CROSS_A");
        assert!(lines[0].get("event").is_none());
        assert_eq!(lines[1]["sequence"], 1);
        assert_eq!(lines[1]["type"], "EmergencyStop");
    }

    #[test]
    fn lane_failure_serializes_color_name() {
        let event = Event::LaneCommandFailed {
            timestamp: Utc::now(),
            lane: 2,
            color: LaneColor::Yellow,
            error: "link closed".to_owned(),
        };
        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["color"], "YELLOW");
        assert_eq!(parsed["lane"], 2);
    }

    #[test]
    fn stop_reason_is_snake_case() {
        let event = Event::ControllerStopped {
            timestamp: Utc::now(),
            run_id: "r".to_owned(),
            reason: StopReason::Emergency,
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["reason"], "emergency");
    }
}
