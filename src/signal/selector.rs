//! Phase selection
//!
//! Picks the phase with the most waiting vehicles, unless one group has won
//! too many consecutive cycles while the other group has traffic, in which
//! case the other group's best phase is forced.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::catalog::{Group, Phase, PhaseCatalog, PhaseId};
use super::priority::{GreenTimePolicy, priority};
use super::state::{SharedTrafficState, VehicleCountSnapshot};

/// Outcome of one selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Chosen phase.
    pub phase_id: PhaseId,
    /// Chosen phase name.
    pub phase_name: String,
    /// Group of the chosen phase.
    pub group: Group,
    /// Vehicles waiting on the chosen phase.
    pub vehicles: u32,
    /// Green time in seconds, never below the policy minimum.
    pub green_time_secs: u32,
    /// Streak of `group` once this decision is committed.
    pub group_streak: u32,
    /// The fairness bound forced a different group than ranking alone.
    pub fairness_override: bool,
}

/// Ranked candidate: catalog phase plus its demand.
struct Candidate<'a> {
    phase: &'a Phase,
    vehicles: u32,
    green_time_secs: u32,
}

/// Stateless selector over a fixed catalog and policy.
#[derive(Debug, Clone)]
pub struct PhaseSelector {
    catalog: Arc<PhaseCatalog>,
    policy: GreenTimePolicy,
}

impl PhaseSelector {
    /// Creates a selector.
    #[must_use]
    pub const fn new(catalog: Arc<PhaseCatalog>, policy: GreenTimePolicy) -> Self {
        Self { catalog, policy }
    }

    /// Catalog the selector ranks.
    #[must_use]
    pub fn catalog(&self) -> &PhaseCatalog {
        &self.catalog
    }

    /// Green time policy in force.
    #[must_use]
    pub const fn policy(&self) -> &GreenTimePolicy {
        &self.policy
    }

    /// Decides the next phase from a frozen snapshot and selection history.
    ///
    /// Returns `None` when no phase has waiting vehicles. An unknown
    /// `last_phase` is treated as having no history.
    #[must_use]
    pub fn decide(
        &self,
        snapshot: &VehicleCountSnapshot,
        last_phase: Option<PhaseId>,
        group_streak: u32,
    ) -> Option<Decision> {
        if snapshot.total() == 0 {
            return None;
        }

        let mut ranked: Vec<Candidate<'_>> = self
            .catalog
            .phases()
            .iter()
            .map(|phase| {
                let p = priority(&self.policy, &snapshot.counts, phase);
                Candidate {
                    phase,
                    vehicles: p.vehicles,
                    green_time_secs: p.green_time_secs,
                }
            })
            .filter(|c| c.vehicles > 0)
            .collect();
        if ranked.is_empty() {
            return None;
        }
        // sort_by is stable: ties keep catalog order
        ranked.sort_by(|a, b| b.vehicles.cmp(&a.vehicles));

        let last_group = last_phase.and_then(|id| self.catalog.group_of(id));
        let forced = last_group
            .filter(|_| group_streak >= self.policy.max_group_streak)
            .and_then(|last| ranked.iter().find(|c| c.phase.group != last));

        let (chosen, streak, fairness_override) = match forced {
            Some(candidate) => (candidate, 1, candidate.phase.id != ranked[0].phase.id),
            None => {
                let top = &ranked[0];
                let streak = if last_group == Some(top.phase.group) {
                    group_streak.saturating_add(1)
                } else {
                    1
                };
                (top, streak, false)
            }
        };

        debug!(
            candidates = ranked.len(),
            ?last_group,
            group_streak,
            chosen = %chosen.phase.name,
            "ranked phases"
        );

        Some(Decision {
            phase_id: chosen.phase.id,
            phase_name: chosen.phase.name.clone(),
            group: chosen.phase.group,
            vehicles: chosen.vehicles,
            green_time_secs: chosen.green_time_secs.max(self.policy.min_green),
            group_streak: streak,
            fairness_override,
        })
    }

    /// Decides from `snapshot` using the history stored in `state`, then
    /// commits the choice back into `state`.
    pub fn select(
        &self,
        snapshot: &VehicleCountSnapshot,
        state: &SharedTrafficState,
    ) -> Option<Decision> {
        let (last_phase, streak) = state.selection_history();
        let mut decision = self.decide(snapshot, last_phase, streak)?;
        decision.group_streak = state.commit_selection(decision.phase_id, decision.group);
        info!(
            phase = %decision.phase_name,
            vehicles = decision.vehicles,
            green_secs = decision.green_time_secs,
            streak = decision.group_streak,
            fairness_override = decision.fairness_override,
            "phase selected"
        );
        Some(decision)
    }
}
