//! Configuration loader
//!
//! Pipeline:
//! 1. Environment variable expansion on the raw text
//! 2. YAML parsing into the typed [`RigConfig`]
//! 3. Validation, collecting every issue

use std::path::{Path, PathBuf};

use crate::config::schema::RigConfig;
use crate::config::validation::Validator;
use crate::error::{ConfigError, Severity, ValidationIssue};

/// Default maximum configuration file size (1 MiB).
const DEFAULT_MAX_CONFIG_SIZE: usize = 1024 * 1024;

/// Result of loading a configuration.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: RigConfig,
    /// Warnings encountered while loading and validating.
    pub warnings: Vec<ValidationIssue>,
}

/// Configuration loader.
#[derive(Debug)]
pub struct ConfigLoader {
    max_config_size: usize,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            max_config_size: env_or("SIGNALRIG_MAX_CONFIG_SIZE", DEFAULT_MAX_CONFIG_SIZE),
        }
    }
}

impl ConfigLoader {
    /// Creates a loader with limits from the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is too large, does not
    /// parse, or fails validation.
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > self.max_config_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {} bytes", self.max_config_size),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        self.load_from_str(&raw, path)
    }

    /// Loads and validates configuration text; `source` labels messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or fails validation.
    pub fn load_from_str(&self, raw: &str, source: &Path) -> Result<LoadResult, ConfigError> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut warnings = Vec::new();
        let expanded = expand_env(raw, source, &mut warnings)?;

        let config: RigConfig = if expanded.trim().is_empty() {
            RigConfig::default()
        } else {
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                path: source.to_path_buf(),
                message: e.to_string(),
            })?
        };

        let result = Validator::new().validate(&config);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: source.display().to_string(),
                errors: result.errors,
            });
        }
        warnings.extend(result.warnings);

        Ok(LoadResult { config, warnings })
    }
}

/// Expands `${VAR}` and `${VAR:-default}`; `$$` is a literal `$`.
///
/// An unset variable without a default expands to nothing and adds a
/// warning.
fn expand_env(
    raw: &str,
    source: &Path,
    warnings: &mut Vec<ValidationIssue>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let mut reference = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    reference.push(c);
                }
                if !closed {
                    return Err(ConfigError::ParseError {
                        path: source.to_path_buf(),
                        message: format!("unclosed environment variable reference: ${{{reference}"),
                    });
                }
                let (name, default) = reference
                    .split_once(":-")
                    .map_or((reference.as_str(), None), |(n, d)| (n, Some(d)));
                match (std::env::var(name), default) {
                    (Ok(value), _) => out.push_str(&value),
                    (Err(_), Some(default)) => out.push_str(default),
                    (Err(_), None) => warnings.push(ValidationIssue {
                        path: source.display().to_string(),
                        message: format!(
                            "environment variable '{name}' is not set, using empty string"
                        ),
                        severity: Severity::Warning,
                    }),
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Reads a parseable value from the environment, falling back to `default`.
pub fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Loads `path` if given, otherwise the stock configuration.
///
/// # Errors
///
/// See [`ConfigLoader::load`].
pub fn load_or_default(path: Option<&PathBuf>) -> Result<LoadResult, ConfigError> {
    path.map_or_else(
        || {
            Ok(LoadResult {
                config: RigConfig::default(),
                warnings: Vec::new(),
            })
        },
        |p| ConfigLoader::new().load(p),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(text: &str) -> Result<LoadResult, ConfigError> {
        ConfigLoader::new().load_from_str(text, Path::new("test.yaml"))
    }

    #[test]
    fn empty_text_is_default() {
        let result = load("").unwrap();
        assert_eq!(result.config, RigConfig::default());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn bom_is_ignored() {
        let result = load("\u{feff}policy:\n  max_green: 40\n").unwrap();
        assert_eq!(result.config.policy.max_green, 40);
    }

    #[test]
    fn env_expansion_with_default() {
        let result = load("hardware:\n  link: ${SIGNALRIG_TEST_UNSET_LINK:-127.0.0.1:7000}\n").unwrap();
        assert_eq!(result.config.hardware.link.as_deref(), Some("127.0.0.1:7000"));
    }

    #[test]
    fn env_expansion_missing_var_warns() {
        let mut warnings = Vec::new();
        let out = expand_env("a: ${SIGNALRIG_TEST_UNSET_VAR}x", Path::new("t"), &mut warnings).unwrap();
        assert_eq!(out, "a: x");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
    }

    #[test]
    fn dollar_escape_and_unclosed_reference() {
        let mut warnings = Vec::new();
        assert_eq!(expand_env("$$5", Path::new("t"), &mut warnings).unwrap(), "$5");
        assert!(expand_env("${OOPS", Path::new("t"), &mut warnings).is_err());
    }

    #[test]
    fn parse_error_names_source() {
        let err = load("policy: [").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref path, .. } if path == Path::new("test.yaml")));
    }

    #[test]
    fn validation_error_lists_all_issues() {
        let err = load("policy:\n  min_green: 60\n  per_vehicle: 0\n").unwrap_err();
        let ConfigError::ValidationError { errors, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn warnings_are_returned_with_config() {
        let result = load("timing:\n  yellow: 2s\n").unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, "timing.yellow");
    }

    #[test]
    fn load_missing_file() {
        let err = ConfigLoader::new()
            .load(Path::new("/definitely/not/here.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "policy:\n  max_group_streak: 2").unwrap();
        let result = ConfigLoader::new().load(file.path()).unwrap();
        assert_eq!(result.config.policy.max_group_streak, 2);
    }

    #[test]
    fn default_when_no_path() {
        let result = load_or_default(None).unwrap();
        assert_eq!(result.config, RigConfig::default());
    }
}
