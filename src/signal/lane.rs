//! Lanes, colors and the fixed lookup tables that name them.
//!
//! A lane is one of six detection zones, each with its own signal head.
//! Lanes carry two labels: the display letter (`A`-`F` by index) and the
//! letter of the physical head wired to it on the rig.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Number of lanes (and signal heads) on the rig.
pub const LANE_COUNT: usize = 6;

/// Display label for each lane index.
const LANE_LABELS: [char; LANE_COUNT] = ['A', 'B', 'C', 'D', 'E', 'F'];

/// Physical head letter driven for each logical lane on the stock wiring.
///
/// Lanes 2 and 4 are cross-wired: zone C feeds head E and zone E feeds
/// head C, so each avenue subphase lights one head per carriageway.
pub const DEFAULT_HEAD_MAP: [char; LANE_COUNT] = ['A', 'B', 'E', 'D', 'C', 'F'];

/// Per-lane vehicle counts, indexed by lane.
pub type LaneCounts = [u32; LANE_COUNT];

/// A validated lane index in `0..LANE_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Lane(u8);

impl Lane {
    /// Every lane in index order.
    pub const ALL: [Self; LANE_COUNT] = [Self(0), Self(1), Self(2), Self(3), Self(4), Self(5)];

    /// Validates a raw lane index.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidLane`] when `index` is outside `0..=5`.
    pub fn new(index: i64) -> Result<Self, InputError> {
        u8::try_from(index)
            .ok()
            .filter(|i| usize::from(*i) < LANE_COUNT)
            .map(Self)
            .ok_or(InputError::InvalidLane(index))
    }

    /// Zero-based lane index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Display label (`A`-`F`).
    #[must_use]
    pub const fn label(self) -> char {
        LANE_LABELS[self.0 as usize]
    }
}

impl TryFrom<i64> for Lane {
    type Error = InputError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Lane> for u8 {
    fn from(lane: Lane) -> Self {
        lane.0
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.0, self.label())
    }
}

/// Signal head color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaneColor {
    /// Proceed.
    Green,
    /// Clear the intersection.
    Yellow,
    /// Stop.
    Red,
}

impl LaneColor {
    /// Single-character wire code (`G`, `Y`, `R`).
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Green => 'G',
            Self::Yellow => 'Y',
            Self::Red => 'R',
        }
    }
}

impl fmt::Display for LaneColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Red => "RED",
        };
        f.write_str(name)
    }
}

impl FromStr for LaneColor {
    type Err = InputError;

    /// Accepts wire codes and full names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "G" | "GREEN" => Ok(Self::Green),
            "Y" | "YELLOW" => Ok(Self::Yellow),
            "R" | "RED" => Ok(Self::Red),
            _ => Err(InputError::InvalidColor(s.to_string())),
        }
    }
}

/// Lane → physical head letter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadMap([char; LANE_COUNT]);

impl HeadMap {
    /// Head letter wired to `lane`.
    #[must_use]
    pub const fn head(&self, lane: Lane) -> char {
        self.0[lane.index()]
    }
}

impl Default for HeadMap {
    fn default() -> Self {
        Self(DEFAULT_HEAD_MAP)
    }
}

impl FromStr for HeadMap {
    type Err = String;

    /// Parses six distinct letters `A`-`F`, e.g. `"ABEDCF"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let letters: Vec<char> = s.trim().chars().map(|c| c.to_ascii_uppercase()).collect();
        if letters.len() != LANE_COUNT {
            return Err(format!("expected {LANE_COUNT} head letters, got {}", letters.len()));
        }
        let mut map = ['A'; LANE_COUNT];
        for (slot, letter) in map.iter_mut().zip(&letters) {
            if !LANE_LABELS.contains(letter) {
                return Err(format!("'{letter}' is not a head letter A-F"));
            }
            *slot = *letter;
        }
        for (i, letter) in map.iter().enumerate() {
            if map[..i].contains(letter) {
                return Err(format!("head '{letter}' is wired to more than one lane"));
            }
        }
        Ok(Self(map))
    }
}

/// Validates a raw count vector from an external source.
///
/// # Errors
///
/// Returns [`InputError::InvalidCounts`] on a wrong length, a negative
/// value or a value that does not fit in `u32`.
pub fn parse_counts(raw: &[i64]) -> Result<LaneCounts, InputError> {
    if raw.len() != LANE_COUNT {
        return Err(InputError::InvalidCounts(format!(
            "expected {LANE_COUNT} values, got {}",
            raw.len()
        )));
    }
    let mut counts = [0; LANE_COUNT];
    for (slot, (i, value)) in counts.iter_mut().zip(raw.iter().enumerate()) {
        *slot = u32::try_from(*value).map_err(|_| {
            InputError::InvalidCounts(format!("lane {i} has out-of-range count {value}"))
        })?;
    }
    Ok(counts)
}

/// Parses a comma-separated count list such as `"1,0,2,0,0,3"`.
///
/// # Errors
///
/// Returns [`InputError::InvalidCounts`] for non-numeric entries or any
/// failure reported by [`parse_counts`].
pub fn parse_count_list(s: &str) -> Result<LaneCounts, InputError> {
    let raw = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| InputError::InvalidCounts(format!("'{}' is not a number", part.trim())))
        })
        .collect::<Result<Vec<_>, _>>()?;
    parse_counts(&raw)
}

/// Sum of all lane counts.
#[must_use]
pub fn total_vehicles(counts: &LaneCounts) -> u32 {
    counts.iter().fold(0_u32, |acc, c| acc.saturating_add(*c))
}
