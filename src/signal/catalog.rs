//! Phase catalog
//!
//! The immutable set of phases the controller may choose from. A phase is
//! a set of lanes allowed green together; every phase belongs to a
//! [`Group`], and each populated group is made of exactly two subphases.
//! The pairing is checked once when the catalog is built.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, InputError};

use super::lane::Lane;

/// Phase family used for fairness accounting and dual-subphase execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Group {
    /// The main two-way road.
    Avenue,
    /// The cross streets.
    Intersection,
}

impl Group {
    /// Every group, in a fixed order.
    pub const ALL: [Self; 2] = [Self::Avenue, Self::Intersection];

    const fn slot(self) -> usize {
        match self {
            Self::Avenue => 0,
            Self::Intersection => 1,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avenue => f.write_str("AVENUE"),
            Self::Intersection => f.write_str("INTERSECTION"),
        }
    }
}

/// Catalog identifier of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(pub u8);

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named set of lanes permitted green together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Catalog id.
    pub id: PhaseId,
    /// Unique name, used in cycle records.
    pub name: String,
    /// Lanes turned green, in command order.
    pub lanes: Vec<Lane>,
    /// Lanes that must be red while this phase is green.
    #[serde(default)]
    pub conflicts: Vec<Lane>,
    /// Owning group.
    pub group: Group,
}

impl Phase {
    fn new(id: u8, name: &str, lanes: &[usize], conflicts: &[usize], group: Group) -> Self {
        Self {
            id: PhaseId(id),
            name: name.to_string(),
            lanes: lanes.iter().map(|i| Lane::ALL[*i]).collect(),
            conflicts: conflicts.iter().map(|i| Lane::ALL[*i]).collect(),
            group,
        }
    }
}

/// The rig's stock phases.
///
/// | id | name             | lanes | group        |
/// |----|------------------|-------|--------------|
/// | 1  | AVENUE_OUTBOUND  | B, C  | AVENUE       |
/// | 2  | AVENUE_INBOUND   | E, F  | AVENUE       |
/// | 3  | CROSS_A          | A     | INTERSECTION |
/// | 4  | CROSS_D          | D     | INTERSECTION |
#[must_use]
pub fn standard_phases() -> Vec<Phase> {
    vec![
        Phase::new(1, "AVENUE_OUTBOUND", &[1, 2], &[0, 3], Group::Avenue),
        Phase::new(2, "AVENUE_INBOUND", &[4, 5], &[0, 3], Group::Avenue),
        Phase::new(3, "CROSS_A", &[0], &[1, 2, 4, 5], Group::Intersection),
        Phase::new(4, "CROSS_D", &[3], &[1, 2, 4, 5], Group::Intersection),
    ]
}

/// Validated, immutable phase catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseCatalog {
    phases: Vec<Phase>,
    /// Indices into `phases` of each group's two subphases, by group slot.
    pairs: [Option<(usize, usize)>; 2],
}

impl PhaseCatalog {
    /// Builds a catalog, checking ids, names, lanes and group pairing.
    ///
    /// Both subphases of a group are shown green at the same time, so a
    /// subphase may not list any of its partner's lanes as a conflict.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogError`] found.
    pub fn new(phases: Vec<Phase>) -> Result<Self, CatalogError> {
        if phases.is_empty() {
            return Err(CatalogError::Empty);
        }

        for (i, phase) in phases.iter().enumerate() {
            let earlier = &phases[..i];
            if earlier.iter().any(|p| p.id == phase.id) {
                return Err(CatalogError::DuplicatePhaseId(phase.id.0));
            }
            if earlier.iter().any(|p| p.name == phase.name) {
                return Err(CatalogError::DuplicatePhaseName(phase.name.clone()));
            }
            if phase.lanes.is_empty() {
                return Err(CatalogError::NoLanes(phase.name.clone()));
            }
            if let Some(lane) = phase.lanes.iter().find(|l| phase.conflicts.contains(l)) {
                return Err(CatalogError::SelfConflict {
                    phase: phase.name.clone(),
                    lane: *lane,
                });
            }
        }

        let mut pairs = [None; 2];
        for group in Group::ALL {
            let members: Vec<usize> = phases
                .iter()
                .enumerate()
                .filter(|(_, p)| p.group == group)
                .map(|(i, _)| i)
                .collect();
            match members.as_slice() {
                [] => {}
                [a, b] => {
                    check_pair(group, &phases[*a], &phases[*b])?;
                    check_pair(group, &phases[*b], &phases[*a])?;
                    pairs[group.slot()] = Some((*a, *b));
                }
                _ => {
                    return Err(CatalogError::GroupPairing {
                        group: group.to_string(),
                        found: members.len(),
                    });
                }
            }
        }

        Ok(Self { phases, pairs })
    }

    /// The stock four-phase catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            phases: standard_phases(),
            pairs: [Some((0, 1)), Some((2, 3))],
        }
    }

    /// All phases in definition order.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Looks a phase up by id.
    #[must_use]
    pub fn get(&self, id: PhaseId) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    /// Looks a phase up by exact name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Group of the phase with the given id, if it exists.
    #[must_use]
    pub fn group_of(&self, id: PhaseId) -> Option<Group> {
        self.get(id).map(|p| p.group)
    }

    /// The two subphases of `group`, in definition order.
    #[must_use]
    pub fn subphases(&self, group: Group) -> Option<(&Phase, &Phase)> {
        self.pairs[group.slot()].map(|(a, b)| (&self.phases[a], &self.phases[b]))
    }

    /// Resolves operator input (numeric id or name, case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`InputError::UnknownPhase`] with the nearest name when
    /// nothing matches.
    pub fn resolve(&self, input: &str) -> Result<&Phase, InputError> {
        let trimmed = input.trim();
        let found = trimmed.parse::<u8>().map_or_else(
            |_| {
                self.phases
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(trimmed))
            },
            |id| self.get(PhaseId(id)),
        );
        found.ok_or_else(|| InputError::UnknownPhase {
            input: trimmed.to_string(),
            suggestion: self.suggest(trimmed),
        })
    }

    /// Suggests the closest phase name when within edit distance 3.
    #[must_use]
    pub fn suggest(&self, input: &str) -> Option<String> {
        let upper = input.to_ascii_uppercase();
        self.phases
            .iter()
            .map(|p| (p.name.as_str(), strsim::damerau_levenshtein(&upper, &p.name)))
            .filter(|(_, dist)| *dist <= 3)
            .min_by_key(|(_, dist)| *dist)
            .map(|(name, _)| name.to_string())
    }
}

/// Rejects `phase` if any lane of `partner` is in its conflict set.
fn check_pair(group: Group, phase: &Phase, partner: &Phase) -> Result<(), CatalogError> {
    match partner.lanes.iter().find(|l| phase.conflicts.contains(l)) {
        Some(lane) => Err(CatalogError::PairConflict {
            group: group.to_string(),
            phase: phase.name.clone(),
            partner: partner.name.clone(),
            lane: *lane,
        }),
        None => Ok(()),
    }
}

impl Default for PhaseCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_validates() {
        let built = PhaseCatalog::new(standard_phases()).unwrap();
        assert_eq!(built, PhaseCatalog::standard());
    }

    #[test]
    fn test_standard_pairs() {
        let catalog = PhaseCatalog::standard();
        let (a, b) = catalog.subphases(Group::Avenue).unwrap();
        assert_eq!((a.name.as_str(), b.name.as_str()), ("AVENUE_OUTBOUND", "AVENUE_INBOUND"));
        let (a, b) = catalog.subphases(Group::Intersection).unwrap();
        assert_eq!((a.name.as_str(), b.name.as_str()), ("CROSS_A", "CROSS_D"));
    }

    #[test]
    fn test_lookup() {
        let catalog = PhaseCatalog::standard();
        assert_eq!(catalog.get(PhaseId(3)).unwrap().name, "CROSS_A");
        assert!(catalog.get(PhaseId(9)).is_none());
        assert_eq!(catalog.group_of(PhaseId(2)), Some(Group::Avenue));
        assert_eq!(catalog.group_of(PhaseId(0)), None);
        assert_eq!(catalog.by_name("CROSS_D").unwrap().id, PhaseId(4));
    }

    #[test]
    fn test_resolve_by_id_and_name() {
        let catalog = PhaseCatalog::standard();
        assert_eq!(catalog.resolve("1").unwrap().name, "AVENUE_OUTBOUND");
        assert_eq!(catalog.resolve("cross_d").unwrap().id, PhaseId(4));
    }

    #[test]
    fn test_resolve_suggests_nearby_name() {
        let catalog = PhaseCatalog::standard();
        let err = catalog.resolve("CROSS_X").unwrap_err();
        assert_eq!(
            err,
            InputError::UnknownPhase {
                input: "CROSS_X".to_string(),
                suggestion: Some("CROSS_A".to_string()),
            }
        );
        let err = catalog.resolve("12").unwrap_err();
        assert!(matches!(err, InputError::UnknownPhase { suggestion: None, .. }));
    }

    #[test]
    fn test_group_with_one_subphase_is_rejected() {
        let mut phases = standard_phases();
        phases.pop();
        assert_eq!(
            PhaseCatalog::new(phases),
            Err(CatalogError::GroupPairing {
                group: "INTERSECTION".to_string(),
                found: 1
            })
        );
    }

    #[test]
    fn test_group_with_three_subphases_is_rejected() {
        let mut phases = standard_phases();
        phases.push(Phase::new(5, "AVENUE_EXTRA", &[2], &[0], Group::Avenue));
        assert!(matches!(
            PhaseCatalog::new(phases),
            Err(CatalogError::GroupPairing { found: 3, .. })
        ));
    }

    #[test]
    fn test_single_group_catalog_is_allowed() {
        let phases: Vec<Phase> = standard_phases()
            .into_iter()
            .filter(|p| p.group == Group::Avenue)
            .collect();
        let catalog = PhaseCatalog::new(phases).unwrap();
        assert!(catalog.subphases(Group::Intersection).is_none());
        assert!(catalog.subphases(Group::Avenue).is_some());
    }

    #[test]
    fn test_duplicate_id_and_name_rejected() {
        let mut phases = standard_phases();
        phases[1].id = PhaseId(1);
        assert_eq!(PhaseCatalog::new(phases), Err(CatalogError::DuplicatePhaseId(1)));

        let mut phases = standard_phases();
        phases[3].name = "CROSS_A".to_string();
        assert_eq!(
            PhaseCatalog::new(phases),
            Err(CatalogError::DuplicatePhaseName("CROSS_A".to_string()))
        );
    }

    #[test]
    fn test_self_conflict_rejected() {
        let mut phases = standard_phases();
        phases[2].conflicts.push(Lane::ALL[0]);
        assert!(matches!(
            PhaseCatalog::new(phases),
            Err(CatalogError::SelfConflict { .. })
        ));
    }

    #[test]
    fn test_partner_lanes_in_conflicts_rejected() {
        let mut phases = standard_phases();
        // outbound may not run alongside inbound
        phases[0].conflicts = vec![Lane::ALL[4], Lane::ALL[5]];
        assert_eq!(
            PhaseCatalog::new(phases),
            Err(CatalogError::PairConflict {
                group: "AVENUE".to_string(),
                phase: "AVENUE_OUTBOUND".to_string(),
                partner: "AVENUE_INBOUND".to_string(),
                lane: Lane::ALL[4],
            })
        );
    }

    #[test]
    fn test_pair_conflict_checked_in_both_directions() {
        let mut phases = standard_phases();
        phases[3].conflicts.push(Lane::ALL[0]);
        let err = PhaseCatalog::new(phases).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::PairConflict { ref phase, ref partner, .. }
                if phase == "CROSS_D" && partner == "CROSS_A"
        ));
        assert!(err.to_string().contains("INTERSECTION"));
    }

    #[test]
    fn test_conflicts_outside_the_pair_are_allowed() {
        let mut phases = standard_phases();
        phases[2].conflicts = vec![Lane::ALL[1], Lane::ALL[2]];
        assert!(PhaseCatalog::new(phases).is_ok());
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert_eq!(PhaseCatalog::new(vec![]), Err(CatalogError::Empty));
    }

    #[test]
    fn test_phase_yaml_shape() {
        let yaml = "id: 7\nname: SIDE\nlanes: [0, 3]\ngroup: INTERSECTION\n";
        let phase: Phase = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(phase.id, PhaseId(7));
        assert_eq!(phase.lanes, vec![Lane::ALL[0], Lane::ALL[3]]);
        assert!(phase.conflicts.is_empty());
        assert!(serde_yaml::from_str::<Phase>("id: 1\nname: X\nlanes: [8]\ngroup: AVENUE\n").is_err());
    }
}
