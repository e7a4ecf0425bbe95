//! Error types for `signalrig`
//!
//! One error enum per concern, aggregated by [`SignalRigError`] which maps
//! every failure to a process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::signal::lane::{Lane, LaneColor};
use crate::signal::state::ControllerStatus;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `signalrig` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure, bad catalog)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Hardware link error
    pub const HARDWARE_ERROR: i32 = 4;

    /// Controller rejected the request (busy, already running)
    pub const CONTROL_ERROR: i32 = 5;

    /// Usage error (invalid arguments, malformed counts)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `signalrig` operations.
#[derive(Debug, Error)]
pub enum SignalRigError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Phase catalog definition error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Hardware link error
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Boundary input rejected
    #[error(transparent)]
    Input(#[from] InputError),

    /// Controller rejected the operation
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Cycle record could not be written
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SignalRigError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Catalog(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Hardware(_) => ExitCode::HARDWARE_ERROR,
            Self::Control(_) => ExitCode::CONTROL_ERROR,
            Self::Input(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) | Self::Persistence(_) => ExitCode::IO_ERROR,
            Self::Json(_) => ExitCode::ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", summarize(.errors))]
    ValidationError {
        /// Path (or label) of the configuration source
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

fn summarize(errors: &[ValidationIssue]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "policy.min_green")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Validation failure that prevents the configuration from being used
    Error,
    /// Potential issue that does not prevent loading
    Warning,
}

// ============================================================================
// Catalog Errors
// ============================================================================

/// Phase catalog definition errors, raised once at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The catalog has no phases at all
    #[error("phase catalog is empty")]
    Empty,

    /// Two phases share an id
    #[error("duplicate phase id {0}")]
    DuplicatePhaseId(u8),

    /// Two phases share a name
    #[error("duplicate phase name '{0}'")]
    DuplicatePhaseName(String),

    /// A phase has no lanes to turn green
    #[error("phase '{0}' has no lanes")]
    NoLanes(String),

    /// A phase lists one of its own lanes as a conflict
    #[error("phase '{phase}' lists its own lane {lane} as a conflict")]
    SelfConflict {
        /// Offending phase name
        phase: String,
        /// Lane present in both sets
        lane: Lane,
    },

    /// Paired subphases turn green together, so neither may conflict with
    /// the other's lanes
    #[error("group {group}: '{phase}' conflicts with lane {lane} of its partner '{partner}'")]
    PairConflict {
        /// Group name
        group: String,
        /// Phase listing the conflict
        phase: String,
        /// The other subphase of the group
        partner: String,
        /// Partner lane in `phase`'s conflict set
        lane: Lane,
    },

    /// A group does not have exactly two subphases
    #[error("group {group} must have exactly two subphases, found {found}")]
    GroupPairing {
        /// Group name
        group: String,
        /// Number of phases tagged with the group
        found: usize,
    },
}

// ============================================================================
// Hardware Errors
// ============================================================================

/// Failures delivering a single color command to the signal heads.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// Could not reach the hardware link
    #[error("connection to {addr} failed: {reason}")]
    ConnectionFailed {
        /// Link address
        addr: String,
        /// Underlying failure
        reason: String,
    },

    /// The command could not be written or the link dropped
    #[error("command {color} on lane {lane} failed: {reason}")]
    CommandFailed {
        /// Target lane
        lane: Lane,
        /// Requested color
        color: LaneColor,
        /// Underlying failure
        reason: String,
    },

    /// The controller acknowledged the command with an error line
    #[error("command {color} on lane {lane} rejected by rig: {reply}")]
    Rejected {
        /// Target lane
        lane: Lane,
        /// Requested color
        color: LaneColor,
        /// Acknowledgement line received
        reply: String,
    },

    /// I/O error on the link
    #[error("hardware link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Input Errors
// ============================================================================

/// Inputs rejected at the boundary before any I/O is attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    /// Lane index outside 0..=5
    #[error("invalid lane {0}: must be 0-5")]
    InvalidLane(i64),

    /// Color outside GREEN/YELLOW/RED
    #[error("invalid color '{0}': must be G, Y or R")]
    InvalidColor(String),

    /// Count vector malformed (wrong length, negative or non-numeric)
    #[error("invalid vehicle counts: {0}")]
    InvalidCounts(String),

    /// Phase id not present in the catalog
    #[error("unknown phase '{input}'{}", suggestion_suffix(.suggestion.as_deref()))]
    UnknownPhase {
        /// What the caller asked for
        input: String,
        /// Closest catalog name, when one is near enough
        suggestion: Option<String>,
    },
}

fn suggestion_suffix(suggestion: Option<&str>) -> String {
    suggestion.map_or_else(String::new, |s| format!(", did you mean '{s}'?"))
}

// ============================================================================
// Control Errors
// ============================================================================

/// Requests the controller refuses to act on.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Another sequence (or loop) already holds the rig
    #[error("{operation} rejected: another operation is in progress")]
    ConcurrentOperation {
        /// Rejected operation
        operation: &'static str,
        /// Controller status at the time of rejection
        status: Box<ControllerStatus>,
    },
}

// ============================================================================
// Persistence Errors
// ============================================================================

/// Cycle record write failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error writing the record
    #[error("cycle log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized
    #[error("cycle record serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `signalrig` operations.
pub type Result<T> = std::result::Result<T, SignalRigError>;

// ============================================================================
// Tests
// ============================================================================
