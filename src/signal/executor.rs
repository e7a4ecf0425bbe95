//! Cycle execution
//!
//! A cycle is planned up front as a list of [`CycleStep`]s, each a command
//! batch followed by a hold. The executor enters each step, issues its
//! batch, then sleeps until `entered + hold`, so the time spent staggering
//! commands is absorbed into the hold rather than added to it.
//!
//! Cancellation is observed between steps only: before a batch is issued
//! or by waking early from a hold. An aborted cycle drives every lane red.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::catalog::{Group, Phase, PhaseCatalog, PhaseId};
use super::hardware::{LaneCommand, SignalDriver, all_red_commands};
use super::lane::{LaneColor, LaneCounts, total_vehicles};
use super::priority::{GreenTimePolicy, priority};
use super::selector::Decision;
use super::state::{SharedTrafficState, VehicleCountSnapshot};

/// Fixed timing of the sequence around the green intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalTiming {
    /// All-red hold before any green.
    #[serde(with = "crate::config::duration")]
    pub red_clearance: Duration,
    /// Yellow hold.
    #[serde(with = "crate::config::duration")]
    pub yellow: Duration,
    /// Wait between loop iterations while there is no traffic.
    #[serde(with = "crate::config::duration")]
    pub idle_poll: Duration,
    /// Pause after each executed cycle.
    #[serde(with = "crate::config::duration")]
    pub cycle_pause: Duration,
    /// Gap between consecutive commands of one batch.
    #[serde(with = "crate::config::duration")]
    pub command_stagger: Duration,
}

impl SignalTiming {
    /// Upper bound of one cycle: the longest green plus both yellows and
    /// the clearance.
    #[must_use]
    pub fn max_cycle_duration(&self, policy: &GreenTimePolicy) -> Duration {
        Duration::from_secs(u64::from(policy.max_green)) + self.yellow * 2 + self.red_clearance
    }
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            red_clearance: Duration::from_secs(2),
            yellow: Duration::from_secs(3),
            idle_poll: Duration::from_secs(5),
            cycle_pause: Duration::from_secs(2),
            command_stagger: Duration::from_millis(200),
        }
    }
}

/// State held by the executor between command batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Every lane red before the green.
    AllRed,
    /// A single phase green.
    Green,
    /// Both subphases of a group green.
    BothGreen,
    /// The shorter subphase clearing.
    ShortYellow,
    /// The shorter subphase stopped, the longer still green.
    ShortRed,
    /// The remaining green lanes clearing.
    Yellow,
    /// The remaining lanes stopped.
    Red,
}

impl CycleState {
    /// Snake-case name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllRed => "all_red",
            Self::Green => "green",
            Self::BothGreen => "both_green",
            Self::ShortYellow => "short_yellow",
            Self::ShortRed => "short_red",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

/// One state of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStep {
    /// State entered.
    pub state: CycleState,
    /// Commands issued on entry, in order.
    pub commands: Vec<LaneCommand>,
    /// Time from entry to the next transition.
    pub hold: Duration,
}

impl CycleStep {
    fn new(state: CycleState, commands: Vec<LaneCommand>, hold: Duration) -> Self {
        Self {
            state,
            commands,
            hold,
        }
    }
}

/// A fully timed cycle, computed before any command is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePlan {
    /// Phase the cycle is recorded under.
    pub phase_id: PhaseId,
    /// Name of that phase.
    pub phase_name: String,
    /// Longest green interval in seconds.
    pub green_time_secs: u32,
    /// Counts the plan was derived from.
    pub counts: LaneCounts,
    /// Steps in execution order.
    pub steps: Vec<CycleStep>,
}

fn batch(phase: &Phase, color: LaneColor) -> Vec<LaneCommand> {
    phase
        .lanes
        .iter()
        .map(|lane| LaneCommand::new(*lane, color))
        .collect()
}

fn secs(s: u32) -> Duration {
    Duration::from_secs(u64::from(s))
}

impl CyclePlan {
    /// Single-phase shape: all-red, green, yellow, red.
    #[must_use]
    pub fn single(
        phase: &Phase,
        green_time_secs: u32,
        counts: LaneCounts,
        timing: &SignalTiming,
    ) -> Self {
        Self {
            phase_id: phase.id,
            phase_name: phase.name.clone(),
            green_time_secs,
            counts,
            steps: vec![
                CycleStep::new(CycleState::AllRed, all_red_commands(), timing.red_clearance),
                CycleStep::new(
                    CycleState::Green,
                    batch(phase, LaneColor::Green),
                    secs(green_time_secs),
                ),
                CycleStep::new(CycleState::Yellow, batch(phase, LaneColor::Yellow), timing.yellow),
                CycleStep::new(CycleState::Red, batch(phase, LaneColor::Red), Duration::ZERO),
            ],
        }
    }

    /// Dual-subphase shape for `group`, scored on `snapshot`.
    ///
    /// Both subphases turn green together for the shorter green time; the
    /// shorter one then clears while the longer keeps green for the
    /// difference. With one active subphase this is the single shape; with
    /// none it returns `None`.
    #[must_use]
    pub fn dual(
        catalog: &PhaseCatalog,
        group: Group,
        chosen: PhaseId,
        snapshot: &VehicleCountSnapshot,
        timing: &SignalTiming,
        policy: &GreenTimePolicy,
    ) -> Option<Self> {
        let (a, b) = catalog.subphases(group)?;
        let time_a = priority(policy, &snapshot.counts, a).green_time_secs;
        let time_b = priority(policy, &snapshot.counts, b).green_time_secs;
        let label = catalog.get(chosen).filter(|p| p.group == group);

        let (short, short_time, long, long_time) = match (time_a, time_b) {
            (0, 0) => return None,
            (t, 0) => return Some(Self::single(a, t, snapshot.counts, timing)),
            (0, t) => return Some(Self::single(b, t, snapshot.counts, timing)),
            (ta, tb) if ta <= tb => (a, ta, b, tb),
            (ta, tb) => (b, tb, a, ta),
        };
        let (phase_id, phase_name) = label.map_or_else(
            || (long.id, long.name.clone()),
            |p| (p.id, p.name.clone()),
        );

        let mut both_green = batch(a, LaneColor::Green);
        both_green.extend(batch(b, LaneColor::Green));

        let mut steps = vec![
            CycleStep::new(CycleState::AllRed, all_red_commands(), timing.red_clearance),
            CycleStep::new(CycleState::BothGreen, both_green, secs(short_time)),
        ];

        let delta = long_time - short_time;
        if delta == 0 {
            let mut yellow = batch(a, LaneColor::Yellow);
            yellow.extend(batch(b, LaneColor::Yellow));
            let mut red = batch(a, LaneColor::Red);
            red.extend(batch(b, LaneColor::Red));
            steps.push(CycleStep::new(CycleState::Yellow, yellow, timing.yellow));
            steps.push(CycleStep::new(CycleState::Red, red, Duration::ZERO));
        } else {
            steps.push(CycleStep::new(
                CycleState::ShortYellow,
                batch(short, LaneColor::Yellow),
                timing.yellow,
            ));
            steps.push(CycleStep::new(
                CycleState::ShortRed,
                batch(short, LaneColor::Red),
                secs(delta),
            ));
            steps.push(CycleStep::new(
                CycleState::Yellow,
                batch(long, LaneColor::Yellow),
                timing.yellow,
            ));
            steps.push(CycleStep::new(
                CycleState::Red,
                batch(long, LaneColor::Red),
                Duration::ZERO,
            ));
        }

        Some(Self {
            phase_id,
            phase_name,
            green_time_secs: long_time,
            counts: snapshot.counts,
            steps,
        })
    }

    /// Plan for a selector decision: the group's dual shape, or the chosen
    /// phase alone when its group has no subphase pair.
    #[must_use]
    pub fn for_decision(
        catalog: &PhaseCatalog,
        decision: &Decision,
        snapshot: &VehicleCountSnapshot,
        timing: &SignalTiming,
        policy: &GreenTimePolicy,
    ) -> Option<Self> {
        if catalog.subphases(decision.group).is_some() {
            return Self::dual(
                catalog,
                decision.group,
                decision.phase_id,
                snapshot,
                timing,
                policy,
            );
        }
        catalog
            .get(decision.phase_id)
            .map(|phase| Self::single(phase, decision.green_time_secs, snapshot.counts, timing))
    }

    /// Sum of all holds.
    #[must_use]
    pub fn nominal_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.hold).sum()
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every step ran.
    Completed,
    /// Cancelled at a step boundary and forced red.
    Aborted,
}

impl CycleOutcome {
    /// Label used in logs, events and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// Result of one executed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Phase the cycle is recorded under.
    pub phase_id: PhaseId,
    /// Name of that phase.
    pub phase_name: String,
    /// How it ended.
    pub outcome: CycleOutcome,
    /// Longest green interval in seconds.
    pub green_time_secs: u32,
    /// Planned duration.
    pub nominal_duration: Duration,
    /// Measured duration.
    pub elapsed: Duration,
    /// Counts the cycle used.
    pub counts: LaneCounts,
    /// Sum of `counts`.
    pub total_vehicles: u32,
    /// Commands skipped after a failed retry.
    pub failed_commands: usize,
}

/// Proof that the caller holds the exclusivity flag. Releases it on drop
/// and wakes anyone in [`CycleExecutor::wait_idle`].
#[derive(Debug)]
pub struct CycleGuard<'a> {
    busy: &'a watch::Sender<bool>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.busy.send_replace(false);
    }
}

/// Runs cycle plans against the signal driver, one at a time.
#[derive(Debug)]
pub struct CycleExecutor {
    driver: Arc<SignalDriver>,
    state: Arc<SharedTrafficState>,
    timing: SignalTiming,
    busy: watch::Sender<bool>,
}

impl CycleExecutor {
    /// Creates an idle executor.
    #[must_use]
    pub fn new(
        driver: Arc<SignalDriver>,
        state: Arc<SharedTrafficState>,
        timing: SignalTiming,
    ) -> Self {
        Self {
            driver,
            state,
            timing,
            busy: watch::Sender::new(false),
        }
    }

    /// Timing in force.
    #[must_use]
    pub const fn timing(&self) -> &SignalTiming {
        &self.timing
    }

    /// Whether a sequence currently holds the rig.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// Claims the exclusivity flag, or returns `None` if it is taken.
    pub fn try_begin(&self) -> Option<CycleGuard<'_>> {
        let claimed = self.busy.send_if_modified(|busy| !std::mem::replace(busy, true));
        claimed.then(|| CycleGuard { busy: &self.busy })
    }

    /// Resolves once no sequence holds the rig.
    pub async fn wait_idle(&self) {
        let mut rx = self.busy.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Runs `plan` to completion or until `abort` fires.
    pub async fn execute(
        &self,
        _guard: &CycleGuard<'_>,
        plan: &CyclePlan,
        abort: &CancellationToken,
    ) -> CycleReport {
        let started = Instant::now();
        let mut failed = 0;
        let mut outcome = CycleOutcome::Completed;

        info!(
            phase = %plan.phase_name,
            green_secs = plan.green_time_secs,
            steps = plan.steps.len(),
            "cycle starting"
        );

        for step in &plan.steps {
            if abort.is_cancelled() {
                outcome = CycleOutcome::Aborted;
                break;
            }
            let entered = Instant::now();
            self.state.set_cycle_state(Some(step.state));
            debug!(state = ?step.state, hold = ?step.hold, "entering cycle state");
            failed += self
                .driver
                .apply(&step.commands, self.timing.command_stagger)
                .await;

            // a batch that was fully issued with nothing left to hold for
            // counts as done even if abort fired meanwhile
            if step.hold.is_zero() {
                continue;
            }
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(entered + step.hold) => {}
                () = abort.cancelled() => {
                    outcome = CycleOutcome::Aborted;
                    break;
                }
            }
        }

        if outcome == CycleOutcome::Aborted {
            warn!(phase = %plan.phase_name, "cycle aborted, forcing all red");
            failed += self.driver.all_red().await;
        }
        self.state.set_cycle_state(None);

        let report = CycleReport {
            phase_id: plan.phase_id,
            phase_name: plan.phase_name.clone(),
            outcome,
            green_time_secs: plan.green_time_secs,
            nominal_duration: plan.nominal_duration(),
            elapsed: started.elapsed(),
            counts: plan.counts,
            total_vehicles: total_vehicles(&plan.counts),
            failed_commands: failed,
        };
        info!(
            phase = %report.phase_name,
            outcome = report.outcome.as_str(),
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            failed_commands = report.failed_commands,
            "cycle finished"
        );
        report
    }
}
