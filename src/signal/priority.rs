//! Priority scoring
//!
//! Pure functions turning a count vector into per-phase demand and a
//! proportional green time, plus the coarse congestion level shown on the
//! status display.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::catalog::Phase;
use super::lane::LaneCounts;

/// Green time parameters and the fairness bound, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GreenTimePolicy {
    /// Fixed part of every non-zero green time.
    pub base_green: u32,
    /// Extra green per waiting vehicle.
    pub per_vehicle: u32,
    /// Floor applied to a chosen phase's green time.
    pub min_green: u32,
    /// Ceiling on any green time.
    pub max_green: u32,
    /// Consecutive cycles a group may win before the other group is forced.
    pub max_group_streak: u32,
}

impl GreenTimePolicy {
    /// Stock base green (s).
    pub const BASE_GREEN: u32 = 3;
    /// Stock green per vehicle (s).
    pub const PER_VEHICLE: u32 = 5;
    /// Stock minimum green (s).
    pub const MIN_GREEN: u32 = 5;
    /// Stock maximum green (s).
    pub const MAX_GREEN: u32 = 45;
    /// Stock fairness bound (cycles).
    pub const MAX_GROUP_STREAK: u32 = 3;

    /// Green time for `vehicles` waiting vehicles; zero when none wait.
    #[must_use]
    pub fn green_time(&self, vehicles: u32) -> u32 {
        if vehicles == 0 {
            return 0;
        }
        self.base_green
            .saturating_add(vehicles.saturating_mul(self.per_vehicle))
            .clamp(self.min_green, self.max_green)
    }
}

impl Default for GreenTimePolicy {
    fn default() -> Self {
        Self {
            base_green: Self::BASE_GREEN,
            per_vehicle: Self::PER_VEHICLE,
            min_green: Self::MIN_GREEN,
            max_green: Self::MAX_GREEN,
            max_group_streak: Self::MAX_GROUP_STREAK,
        }
    }
}

/// Demand on one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhasePriority {
    /// Vehicles waiting on the phase's lanes.
    pub vehicles: u32,
    /// Proportional green time in seconds (0 when no vehicles wait).
    pub green_time_secs: u32,
}

/// Scores `phase` against `counts`.
#[must_use]
pub fn priority(policy: &GreenTimePolicy, counts: &LaneCounts, phase: &Phase) -> PhasePriority {
    let vehicles = phase
        .lanes
        .iter()
        .fold(0_u32, |acc, lane| acc.saturating_add(counts[lane.index()]));
    PhasePriority {
        vehicles,
        green_time_secs: policy.green_time(vehicles),
    }
}

/// Green time for an operator-requested phase.
///
/// A non-zero `custom` wins; otherwise the derived time, floored at the
/// policy minimum so an empty phase still shows a usable green.
#[must_use]
pub fn manual_green(
    policy: &GreenTimePolicy,
    counts: &LaneCounts,
    phase: &Phase,
    custom: Option<u32>,
) -> u32 {
    custom
        .filter(|g| *g > 0)
        .unwrap_or_else(|| priority(policy, counts, phase).green_time_secs.max(policy.min_green))
}

/// Overall congestion band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    /// No vehicles.
    None,
    /// 1-3 vehicles.
    Low,
    /// 4-8 vehicles.
    Medium,
    /// 9-15 vehicles.
    High,
    /// More than 15 vehicles.
    Critical,
}

impl fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Maps a total vehicle count to its congestion band.
#[must_use]
pub const fn traffic_level(total: u32) -> TrafficLevel {
    match total {
        0 => TrafficLevel::None,
        1..=3 => TrafficLevel::Low,
        4..=8 => TrafficLevel::Medium,
        9..=15 => TrafficLevel::High,
        _ => TrafficLevel::Critical,
    }
}
