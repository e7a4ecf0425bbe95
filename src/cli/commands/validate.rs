//! `validate` command
//!
//! Loads each file through the full configuration pipeline and reports
//! every issue found.

use serde_json::json;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::ConfigLoader;
use crate::error::{ConfigError, Severity, SignalRigError, ValidationIssue};

/// Validates configuration files without touching the rig.
///
/// Every file is checked before returning; the first failure determines
/// the error.
///
/// # Errors
///
/// Returns a config error if any file fails to load or validate, or (with
/// `--strict`) carries warnings.
pub fn run(args: &ValidateArgs) -> Result<(), SignalRigError> {
    let loader = ConfigLoader::new();
    let mut first_error: Option<ConfigError> = None;
    let mut reports = Vec::with_capacity(args.files.len());

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let (issues, error) = match loader.load(path) {
            Ok(result) if args.strict && !result.warnings.is_empty() => {
                let errors: Vec<ValidationIssue> = result
                    .warnings
                    .into_iter()
                    .map(|w| ValidationIssue {
                        severity: Severity::Error,
                        ..w
                    })
                    .collect();
                (
                    errors.clone(),
                    Some(ConfigError::ValidationError {
                        path: path.display().to_string(),
                        errors,
                    }),
                )
            }
            Ok(result) => (result.warnings, None),
            Err(ConfigError::ValidationError { path, errors }) => (
                errors.clone(),
                Some(ConfigError::ValidationError { path, errors }),
            ),
            Err(e) => (Vec::new(), Some(e)),
        };

        match args.format {
            OutputFormat::Human => {
                match &error {
                    None => println!("{}: ok", path.display()),
                    Some(e) if issues.is_empty() => println!("{}: {e}", path.display()),
                    Some(_) => println!("{}: invalid", path.display()),
                }
                for issue in &issues {
                    println!("  {issue}");
                }
            }
            OutputFormat::Json => reports.push(json!({
                "file": path.display().to_string(),
                "valid": error.is_none(),
                "error": error.as_ref().map(ToString::to_string),
                "issues": issues
                    .iter()
                    .map(|i| json!({
                        "path": i.path,
                        "message": i.message,
                        "severity": match i.severity {
                            Severity::Error => "error",
                            Severity::Warning => "warning",
                        },
                    }))
                    .collect::<Vec<_>>(),
            })),
        }

        if let Some(e) = error {
            first_error.get_or_insert(e);
        }
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    first_error.map_or(Ok(()), |e| Err(e.into()))
}
