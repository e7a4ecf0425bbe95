//! Shared traffic state
//!
//! The one mutable store the controller, the loop task and the count feed
//! share. Every field lives behind a single mutex so a reader always sees a
//! consistent set of values; callers hold the lock only for the duration of
//! a copy or a write, never across I/O.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::{Group, PhaseId};
use super::executor::CycleState;
use super::lane::{LANE_COUNT, Lane, LaneColor, LaneCounts, total_vehicles};
use super::priority::{TrafficLevel, traffic_level};

/// Counts frozen at decision time.
///
/// Once captured it is never refreshed from live state; everything a cycle
/// computes is derived from this copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VehicleCountSnapshot {
    /// Per-lane counts.
    pub counts: LaneCounts,
    /// When the copy was taken.
    pub captured_at: DateTime<Utc>,
}

impl VehicleCountSnapshot {
    /// Builds a snapshot stamped with the current time.
    #[must_use]
    pub fn new(counts: LaneCounts) -> Self {
        Self {
            counts,
            captured_at: Utc::now(),
        }
    }

    /// Sum of all lane counts.
    #[must_use]
    pub fn total(&self) -> u32 {
        total_vehicles(&self.counts)
    }
}

/// Last commanded color of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaneLight {
    /// Color most recently commanded.
    pub color: LaneColor,
    /// The command never reached the hardware.
    pub stale: bool,
}

impl Default for LaneLight {
    fn default() -> Self {
        Self {
            color: LaneColor::Red,
            stale: false,
        }
    }
}

/// Point-in-time view of the controller for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    /// Loop task is running.
    pub running: bool,
    /// A cycle (or manual override) currently holds the rig.
    pub cycle_in_progress: bool,
    /// Most recently selected phase.
    pub last_phase: Option<PhaseId>,
    /// Latest live counts.
    pub counts: LaneCounts,
    /// Sum of `counts`.
    pub total_vehicles: u32,
    /// Congestion band of `total_vehicles`.
    pub traffic_level: TrafficLevel,
    /// Per-lane commanded colors.
    pub light_colors: [LaneLight; LANE_COUNT],
    /// Any vehicle is waiting.
    pub has_traffic: bool,
    /// Last hardware command succeeded.
    pub hardware_online: bool,
    /// Executor state currently held, if any.
    pub cycle_state: Option<CycleState>,
}

#[derive(Debug)]
struct Inner {
    counts: LaneCounts,
    counts_updated_at: Option<DateTime<Utc>>,
    last_phase: Option<PhaseId>,
    last_group: Option<Group>,
    group_streak: u32,
    lights: [LaneLight; LANE_COUNT],
    running: bool,
    hardware_online: bool,
    cycle_state: Option<CycleState>,
}

/// Thread-safe store of counts, selection history and light state.
#[derive(Debug)]
pub struct SharedTrafficState {
    inner: Mutex<Inner>,
}

impl SharedTrafficState {
    /// Empty state: no traffic, all lanes red, loop stopped.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                counts: [0; LANE_COUNT],
                counts_updated_at: None,
                last_phase: None,
                last_group: None,
                group_streak: 0,
                lights: [LaneLight::default(); LANE_COUNT],
                running: false,
                hardware_online: true,
                cycle_state: None,
            }),
        }
    }

    // Every critical section is a plain copy or store, so a panic while
    // holding the lock cannot leave fields half-written.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Freezes the current counts.
    #[must_use]
    pub fn snapshot(&self) -> VehicleCountSnapshot {
        let counts = self.lock().counts;
        VehicleCountSnapshot::new(counts)
    }

    /// Replaces the live counts.
    pub fn set_counts(&self, counts: LaneCounts) {
        let mut inner = self.lock();
        inner.counts = counts;
        inner.counts_updated_at = Some(Utc::now());
    }

    /// Latest live counts, without a timestamp.
    #[must_use]
    pub fn live_counts(&self) -> LaneCounts {
        self.lock().counts
    }

    /// When counts were last replaced, if ever.
    #[must_use]
    pub fn counts_updated_at(&self) -> Option<DateTime<Utc>> {
        self.lock().counts_updated_at
    }

    /// Records the most recently executed phase without touching the streak.
    pub fn record_last_phase(&self, id: PhaseId, group: Group) {
        let mut inner = self.lock();
        inner.last_phase = Some(id);
        inner.last_group = Some(group);
    }

    /// Increments the streak when `group` repeats, otherwise resets it to 1.
    ///
    /// Returns the new streak.
    pub fn bump_or_reset_group_streak(&self, group: Group) -> u32 {
        let mut inner = self.lock();
        bump_streak(&mut inner, group)
    }

    /// Stores a selection: last phase and streak under one lock.
    ///
    /// Returns the new streak.
    pub fn commit_selection(&self, id: PhaseId, group: Group) -> u32 {
        let mut inner = self.lock();
        let streak = bump_streak(&mut inner, group);
        inner.last_phase = Some(id);
        inner.last_group = Some(group);
        streak
    }

    /// Last selected phase and the current group streak.
    #[must_use]
    pub fn selection_history(&self) -> (Option<PhaseId>, u32) {
        let inner = self.lock();
        (inner.last_phase, inner.group_streak)
    }

    /// Records the commanded color of `lane`.
    pub fn set_lane_light(&self, lane: Lane, color: LaneColor, stale: bool) {
        self.lock().lights[lane.index()] = LaneLight { color, stale };
    }

    /// Current commanded color of every lane.
    #[must_use]
    pub fn lights(&self) -> [LaneLight; LANE_COUNT] {
        self.lock().lights
    }

    /// Sets the loop run flag.
    pub fn set_running(&self, running: bool) {
        self.lock().running = running;
    }

    /// Whether the loop task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Whether the hardware sink answered its last command.
    #[must_use]
    pub fn is_hardware_online(&self) -> bool {
        self.lock().hardware_online
    }

    /// Records whether the hardware sink is answering.
    ///
    /// Returns the previous value so callers can log transitions once.
    pub fn set_hardware_online(&self, online: bool) -> bool {
        std::mem::replace(&mut self.lock().hardware_online, online)
    }

    /// Records the executor state being held.
    pub fn set_cycle_state(&self, state: Option<CycleState>) {
        self.lock().cycle_state = state;
    }

    /// Builds an operator status view.
    #[must_use]
    pub fn status(&self, cycle_in_progress: bool) -> ControllerStatus {
        let inner = self.lock();
        let total = total_vehicles(&inner.counts);
        ControllerStatus {
            running: inner.running,
            cycle_in_progress,
            last_phase: inner.last_phase,
            counts: inner.counts,
            total_vehicles: total,
            traffic_level: traffic_level(total),
            light_colors: inner.lights,
            has_traffic: total > 0,
            hardware_online: inner.hardware_online,
            cycle_state: inner.cycle_state,
        }
    }
}

impl Default for SharedTrafficState {
    fn default() -> Self {
        Self::new()
    }
}

fn bump_streak(inner: &mut Inner, group: Group) -> u32 {
    inner.group_streak = if inner.last_group == Some(group) {
        inner.group_streak.saturating_add(1)
    } else {
        1
    };
    inner.group_streak
}
