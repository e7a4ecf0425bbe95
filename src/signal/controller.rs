//! Traffic controller
//!
//! Supervises the rig: owns the shared state, the selector and the
//! executor, and runs the control loop as one long-lived task. External
//! requests (single cycles, manual phases, lane overrides) go through the
//! same exclusivity flag as the loop and are rejected while a sequence
//! holds the rig.
//!
//! Two cancellation tokens are involved. The loop's stop token ends the
//! loop at its next iteration boundary and lets an in-flight cycle finish.
//! The abort token interrupts an in-flight cycle at its next state
//! boundary; emergency stop cancels it and installs a fresh one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ControlError, SignalRigError};
use crate::observability::events::{Event, EventEmitter, StopReason};
use crate::observability::metrics;
use crate::persistence::{CycleRecord, CycleRecorder, NullCycleLog};

use super::catalog::PhaseCatalog;
use super::executor::{CycleExecutor, CycleOutcome, CyclePlan, CycleReport, SignalTiming};
use super::hardware::{DEFAULT_RECONNECT_INTERVAL, SignalDriver, SignalHead, SimulatedSignalHead};
use super::lane::{Lane, LaneColor, LaneCounts, total_vehicles};
use super::priority::{GreenTimePolicy, manual_green};
use super::selector::PhaseSelector;
use super::state::{ControllerStatus, SharedTrafficState};

struct LoopHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
    run_id: String,
}

struct Inner {
    state: Arc<SharedTrafficState>,
    selector: PhaseSelector,
    executor: CycleExecutor,
    driver: Arc<SignalDriver>,
    recorder: Arc<dyn CycleRecorder>,
    events: Arc<EventEmitter>,
    timing: SignalTiming,
    abort: Mutex<CancellationToken>,
    loop_handle: tokio::sync::Mutex<Option<LoopHandle>>,
}

/// Builder for [`TrafficController`].
pub struct ControllerBuilder {
    catalog: PhaseCatalog,
    policy: GreenTimePolicy,
    timing: SignalTiming,
    head: Option<Arc<dyn SignalHead>>,
    reconnect_interval: Duration,
    recorder: Option<Arc<dyn CycleRecorder>>,
    events: Option<Arc<EventEmitter>>,
}

impl ControllerBuilder {
    /// Phase catalog (stock catalog by default).
    #[must_use]
    pub fn catalog(mut self, catalog: PhaseCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Green time policy.
    #[must_use]
    pub const fn policy(mut self, policy: GreenTimePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sequence timing.
    #[must_use]
    pub const fn timing(mut self, timing: SignalTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Hardware sink (simulated heads by default).
    #[must_use]
    pub fn head(mut self, head: Arc<dyn SignalHead>) -> Self {
        self.head = Some(head);
        self
    }

    /// Gap between reconnect attempts while the hardware is offline.
    #[must_use]
    pub const fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Cycle record sink (discarded by default).
    #[must_use]
    pub fn recorder(mut self, recorder: Arc<dyn CycleRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Event stream (discarded by default).
    #[must_use]
    pub fn events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds a stopped controller with every lane considered red.
    #[must_use]
    pub fn build(self) -> TrafficController {
        let state = Arc::new(SharedTrafficState::new());
        let events = self.events.unwrap_or_else(|| Arc::new(EventEmitter::noop()));
        let head = self
            .head
            .unwrap_or_else(|| Arc::new(SimulatedSignalHead::new()));
        let driver = Arc::new(
            SignalDriver::new(head, Arc::clone(&state), Arc::clone(&events))
                .with_reconnect_interval(self.reconnect_interval),
        );
        let executor = CycleExecutor::new(Arc::clone(&driver), Arc::clone(&state), self.timing);

        TrafficController {
            inner: Arc::new(Inner {
                state,
                selector: PhaseSelector::new(Arc::new(self.catalog), self.policy),
                executor,
                driver,
                recorder: self.recorder.unwrap_or_else(|| Arc::new(NullCycleLog)),
                events,
                timing: self.timing,
                abort: Mutex::new(CancellationToken::new()),
                loop_handle: tokio::sync::Mutex::new(None),
            }),
        }
    }
}

/// Handle to the rig controller. Cheap to clone.
#[derive(Clone)]
pub struct TrafficController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TrafficController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficController")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl TrafficController {
    /// Starts a builder with stock settings.
    #[must_use]
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder {
            catalog: PhaseCatalog::standard(),
            policy: GreenTimePolicy::default(),
            timing: SignalTiming::default(),
            head: None,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            recorder: None,
            events: None,
        }
    }

    /// Replaces the live vehicle counts.
    pub fn update_vehicle_counts(&self, counts: LaneCounts) {
        self.inner.state.set_counts(counts);
        metrics::set_vehicles_waiting(total_vehicles(&counts));
        debug!(?counts, "vehicle counts updated");
    }

    /// Current operator status.
    #[must_use]
    pub fn status(&self) -> ControllerStatus {
        self.inner.status()
    }

    /// Phase catalog in use.
    #[must_use]
    pub fn catalog(&self) -> &PhaseCatalog {
        self.inner.selector.catalog()
    }

    /// Runs one selection and cycle now.
    ///
    /// Returns `Ok(None)` when no lane has traffic (all lanes are held red).
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ConcurrentOperation`] without touching the
    /// hardware when another sequence holds the rig.
    pub async fn run_one_cycle(&self) -> Result<Option<CycleReport>, ControlError> {
        self.inner.run_cycle(None).await
    }

    /// Runs one phase alone with an operator green time.
    ///
    /// `input` is a phase id or name. Without `custom_green` (or with 0) the
    /// green time is derived from live counts and floored at the policy
    /// minimum. Manual cycles leave selection history and the cycle log
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an input error for an unknown phase and a control error
    /// when another sequence holds the rig.
    pub async fn run_phase(
        &self,
        input: &str,
        custom_green: Option<u32>,
    ) -> Result<CycleReport, SignalRigError> {
        let inner = &self.inner;
        let phase = inner.selector.catalog().resolve(input)?;
        let Some(guard) = inner.executor.try_begin() else {
            return Err(inner.reject("run_phase").into());
        };
        let abort = inner.abort_token();

        let snapshot = inner.state.snapshot();
        let policy = inner.selector.policy();
        let green = manual_green(policy, &snapshot.counts, phase, custom_green);
        info!(phase = %phase.name, green_secs = green, "manual phase requested");

        let plan = CyclePlan::single(phase, green, snapshot.counts, &inner.timing);
        let report = inner.executor.execute(&guard, &plan, &abort).await;
        inner.finish(&report, false).await;
        drop(guard);
        Ok(report)
    }

    /// Shows `color` on one lane, outside any cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ConcurrentOperation`] while a sequence holds
    /// the rig.
    pub async fn set_lane_color_manual(
        &self,
        lane: Lane,
        color: LaneColor,
    ) -> Result<ControllerStatus, ControlError> {
        let inner = &self.inner;
        let Some(_guard) = inner.executor.try_begin() else {
            return Err(inner.reject("set_lane_color_manual"));
        };
        info!(%lane, %color, "manual lane override");
        inner.driver.command(lane, color).await;
        Ok(inner.status())
    }

    /// Starts the control loop.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ConcurrentOperation`] if the loop is already
    /// running; nothing changes in that case.
    pub async fn start(&self) -> Result<ControllerStatus, ControlError> {
        let inner = &self.inner;
        let mut slot = inner.loop_handle.lock().await;
        if slot.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return Err(inner.reject("start"));
        }

        let stop = CancellationToken::new();
        let run_id = Uuid::new_v4().to_string();
        inner.state.set_running(true);
        metrics::set_running(true);
        inner.events.emit(Event::ControllerStarted {
            timestamp: Utc::now(),
            run_id: run_id.clone(),
            phases: inner.selector.catalog().phases().len(),
        });
        info!(%run_id, head = %inner.driver.describe(), "control loop starting");

        let task = tokio::spawn(run_loop(Arc::clone(inner), stop.clone()));
        *slot = Some(LoopHandle { stop, task, run_id });
        drop(slot);
        Ok(inner.status())
    }

    /// Stops the loop and waits for any in-flight sequence (the loop's or
    /// a manual one) up to the maximum cycle duration. A sequence still
    /// running at that bound is aborted. Every lane is then forced red.
    pub async fn stop(&self) -> ControllerStatus {
        let inner = &self.inner;
        let mut handle = inner.loop_handle.lock().await.take();
        if let Some(handle) = &handle {
            handle.stop.cancel();
        }

        if handle.is_some() || inner.executor.is_busy() {
            let bound = inner.timing.max_cycle_duration(inner.selector.policy());
            let task = handle.as_mut().map(|h| &mut h.task);
            if !inner.settle(task, bound).await {
                warn!(?bound, "in-flight cycle did not finish in time, aborting it");
                inner.cancel_in_flight();
                if tokio::time::timeout(bound, inner.executor.wait_idle())
                    .await
                    .is_err()
                {
                    error!("aborted cycle did not release the rig");
                }
            }
        }

        if let Some(handle) = handle {
            inner.events.emit(Event::ControllerStopped {
                timestamp: Utc::now(),
                run_id: handle.run_id,
                reason: StopReason::Requested,
            });
            info!("control loop stopped");
        }
        inner.state.set_running(false);
        metrics::set_running(false);
        inner.driver.all_red().await;
        inner.status()
    }

    /// Aborts everything and forces all lanes red without waiting.
    ///
    /// Safe to call repeatedly and while stopped.
    pub async fn emergency_stop(&self) -> ControllerStatus {
        let inner = &self.inner;
        let handle = inner.loop_handle.lock().await.take();
        let was_running = handle.is_some();
        if let Some(handle) = &handle {
            handle.stop.cancel();
        }
        inner.cancel_in_flight();
        warn!(was_running, "emergency stop");

        inner.state.set_running(false);
        metrics::set_running(false);
        inner.driver.all_red().await;

        inner.events.emit(Event::EmergencyStop {
            timestamp: Utc::now(),
            was_running,
        });
        if let Some(handle) = handle {
            inner.events.emit(Event::ControllerStopped {
                timestamp: Utc::now(),
                run_id: handle.run_id,
                reason: StopReason::Emergency,
            });
        }
        inner.status()
    }
}

impl Inner {
    fn status(&self) -> ControllerStatus {
        self.state.status(self.executor.is_busy())
    }

    fn abort_token(&self) -> CancellationToken {
        self.abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }

    fn cancel_in_flight(&self) {
        let mut abort = self.abort.lock().unwrap_or_else(PoisonError::into_inner);
        abort.cancel();
        *abort = CancellationToken::new();
    }

    /// Waits for the loop task to exit and the rig to go idle. Returns
    /// `false` if that takes longer than `bound`.
    async fn settle(&self, task: Option<&mut JoinHandle<()>>, bound: Duration) -> bool {
        let settled = async {
            if let Some(task) = task {
                if let Err(e) = task.await {
                    error!(error = %e, "control loop task failed");
                }
            }
            self.executor.wait_idle().await;
        };
        tokio::time::timeout(bound, settled).await.is_ok()
    }

    fn reject(&self, operation: &'static str) -> ControlError {
        metrics::record_rejected(operation);
        let status = self.status();
        warn!(operation, "rejected: another operation holds the rig");
        ControlError::ConcurrentOperation {
            operation,
            status: Box::new(status),
        }
    }

    async fn run_cycle(
        &self,
        stop: Option<&CancellationToken>,
    ) -> Result<Option<CycleReport>, ControlError> {
        let Some(guard) = self.executor.try_begin() else {
            return Err(self.reject("run_one_cycle"));
        };
        let abort = self.abort_token();
        if stop.is_some_and(CancellationToken::is_cancelled) {
            return Ok(None);
        }

        let snapshot = self.state.snapshot();
        let Some(decision) = self.selector.select(&snapshot, &self.state) else {
            debug!("no traffic, holding all red");
            self.driver.all_red().await;
            return Ok(None);
        };
        if decision.fairness_override {
            metrics::record_fairness_override();
        }
        self.events.emit(Event::PhaseSelected {
            timestamp: Utc::now(),
            phase_name: decision.phase_name.clone(),
            vehicles: decision.vehicles,
            green_time_secs: decision.green_time_secs,
            group_streak: decision.group_streak,
            fairness_override: decision.fairness_override,
        });

        let plan = CyclePlan::for_decision(
            self.selector.catalog(),
            &decision,
            &snapshot,
            &self.timing,
            self.selector.policy(),
        );
        let Some(plan) = plan else {
            return Ok(None);
        };

        let report = self.executor.execute(&guard, &plan, &abort).await;
        self.finish(&report, true).await;
        drop(guard);
        Ok(Some(report))
    }

    async fn finish(&self, report: &CycleReport, persist: bool) {
        metrics::record_cycle(&report.phase_name, report.outcome.as_str(), report.elapsed);
        self.events.emit(Event::CycleCompleted {
            timestamp: Utc::now(),
            phase_name: report.phase_name.clone(),
            outcome: report.outcome.as_str().to_string(),
            counts: report.counts,
            green_time_secs: report.green_time_secs,
            duration_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            failed_commands: report.failed_commands,
        });

        if !persist || report.outcome != CycleOutcome::Completed {
            return;
        }
        let record = CycleRecord {
            phase_name: report.phase_name.clone(),
            counts: report.counts,
            green_time_secs: report.green_time_secs,
            total_vehicles: report.total_vehicles,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.recorder.record_cycle(&record).await {
            warn!(error = %e, phase = %record.phase_name, "failed to persist cycle record");
        }
    }
}

async fn run_loop(inner: Arc<Inner>, stop: CancellationToken) {
    while !stop.is_cancelled() {
        let live = inner.state.live_counts();
        let pause = if total_vehicles(&live) == 0 {
            if let Some(_guard) = inner.executor.try_begin() {
                inner.driver.all_red().await;
            }
            inner.timing.idle_poll
        } else {
            match inner.run_cycle(Some(&stop)).await {
                Ok(Some(_)) => inner.timing.cycle_pause,
                Ok(None) => inner.timing.idle_poll,
                Err(ControlError::ConcurrentOperation { .. }) => {
                    debug!("rig busy, loop skipping this iteration");
                    inner.timing.cycle_pause
                }
            }
        };

        tokio::select! {
            () = stop.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }
    debug!("control loop exited");
}
