//! Configuration validation
//!
//! Runs on the deserialized [`RigConfig`] and collects every issue rather
//! than stopping at the first one.

use std::time::Duration;

use crate::config::schema::RigConfig;
use crate::error::{Severity, ValidationIssue};
use crate::signal::catalog::PhaseCatalog;

/// Yellow holds shorter than this draw a warning.
const MIN_SAFE_YELLOW: Duration = Duration::from_secs(3);

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration.
    pub fn validate(&mut self, config: &RigConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_policy(config);
        self.validate_timing(config);
        self.validate_hardware(config);
        self.validate_catalog(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn validate_policy(&mut self, config: &RigConfig) {
        let policy = &config.policy;
        if policy.min_green > policy.max_green {
            self.add_error(
                "policy.min_green",
                format!(
                    "min_green ({}) must not exceed max_green ({})",
                    policy.min_green, policy.max_green
                ),
            );
        }
        if policy.max_green == 0 {
            self.add_error("policy.max_green", "max_green must be at least 1 second");
        }
        if policy.per_vehicle == 0 {
            self.add_error("policy.per_vehicle", "per_vehicle must be greater than 0");
        }
        if policy.max_group_streak == 0 {
            self.add_error(
                "policy.max_group_streak",
                "max_group_streak must be at least 1",
            );
        }
    }

    fn validate_timing(&mut self, config: &RigConfig) {
        let timing = &config.timing;
        if timing.yellow < MIN_SAFE_YELLOW {
            self.add_warning(
                "timing.yellow",
                format!(
                    "yellow of {} is shorter than the usual 3s",
                    humantime::format_duration(timing.yellow)
                ),
            );
        }
        if timing.red_clearance.is_zero() {
            self.add_warning("timing.red_clearance", "no all-red clearance before green");
        }
        if timing.idle_poll.is_zero() {
            self.add_error("timing.idle_poll", "idle_poll must be greater than 0");
        }
        if timing.command_stagger > timing.yellow {
            self.add_warning(
                "timing.command_stagger",
                "command stagger is longer than the yellow hold",
            );
        }
    }

    fn validate_hardware(&mut self, config: &RigConfig) {
        let hardware = &config.hardware;
        if let Err(message) = hardware.parsed_head_map() {
            self.add_error("hardware.head_map", message);
        }
        if let Some(link) = &hardware.link {
            let valid = link
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                self.add_error(
                    "hardware.link",
                    format!("'{link}' is not a host:port address"),
                );
            }
        }
        if hardware.connect_timeout.is_zero() {
            self.add_error(
                "hardware.connect_timeout",
                "connect_timeout must be greater than 0",
            );
        }
    }

    fn validate_catalog(&mut self, config: &RigConfig) {
        if let Some(phases) = &config.catalog {
            if let Err(e) = PhaseCatalog::new(phases.clone()) {
                self.add_error("catalog", e.to_string());
            }
        }
    }

    fn add_error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }
}
