//! Log subscriber setup
//!
//! Diagnostics go to stderr so stdout stays free for command output. The
//! filter comes from the global CLI flags: each `-v` raises this crate's
//! detail one step ahead of its dependencies, `-q` keeps errors only, and
//! `SIGNALRIG_LOG_LEVEL` replaces the whole directive when set.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

use crate::cli::args::{Cli, ColorChoice, LogFormatArg};

/// Environment variable holding a full filter directive.
pub const LOG_LEVEL_ENV: &str = "SIGNALRIG_LOG_LEVEL";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain lines, colored on a terminal.
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Human => Self::Human,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Logging options resolved from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// Line format.
    pub format: LogFormat,
    /// Number of `-v` flags.
    pub verbosity: u8,
    /// `-q`: errors only.
    pub quiet: bool,
    /// Color choice.
    pub color: ColorChoice,
}

impl LogSettings {
    /// Reads the global flags of a parsed command line.
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.log_format.into(),
            verbosity: cli.verbose,
            quiet: cli.quiet,
            color: cli.color,
        }
    }

    /// Filter directive for these settings.
    ///
    /// | flags  | dependencies | signalrig |
    /// |--------|--------------|-----------|
    /// | `-q`   | error        | error     |
    /// | none   | warn         | warn      |
    /// | `-v`   | warn         | info      |
    /// | `-vv`  | info         | debug     |
    /// | `-vvv` | debug        | trace     |
    #[must_use]
    pub fn directive(&self) -> String {
        if self.quiet {
            return "error".to_string();
        }
        let (rest, own) = match self.verbosity {
            0 => return "warn".to_string(),
            1 => ("warn", "info"),
            2 => ("info", "debug"),
            _ => ("debug", "trace"),
        };
        format!("{rest},{}={own}", env!("CARGO_CRATE_NAME"))
    }

    fn ansi(&self, stderr_is_terminal: bool, no_color: bool) -> bool {
        match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => stderr_is_terminal && !no_color,
        }
    }

    /// Installs the global subscriber. Later calls are ignored.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
            .unwrap_or_else(|_| EnvFilter::new(self.directive()));
        // module paths only help once debug output is on
        let targets = self.verbosity >= 2;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(targets)
            .with_writer(std::io::stderr);

        let _ = match self.format {
            LogFormat::Human => builder
                .with_ansi(self.ansi(
                    std::io::stderr().is_terminal(),
                    std::env::var_os("NO_COLOR").is_some(),
                ))
                .try_init(),
            LogFormat::Json => builder.json().flatten_event(true).try_init(),
        };
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn settings(verbosity: u8, quiet: bool) -> LogSettings {
        LogSettings {
            format: LogFormat::Human,
            verbosity,
            quiet,
            color: ColorChoice::Auto,
        }
    }

    #[test]
    fn directive_raises_own_crate_first() {
        assert_eq!(settings(0, false).directive(), "warn");
        assert_eq!(settings(1, false).directive(), "warn,signalrig=info");
        assert_eq!(settings(2, false).directive(), "info,signalrig=debug");
        assert_eq!(settings(9, false).directive(), "debug,signalrig=trace");
    }

    #[test]
    fn quiet_wins_over_verbosity() {
        assert_eq!(settings(3, true).directive(), "error");
    }

    #[test]
    fn color_choice_resolution() {
        let mut s = settings(0, false);
        assert!(s.ansi(true, false));
        assert!(!s.ansi(true, true));
        assert!(!s.ansi(false, false));
        s.color = ColorChoice::Always;
        assert!(s.ansi(false, true));
        s.color = ColorChoice::Never;
        assert!(!s.ansi(true, false));
    }

    #[test]
    fn settings_from_global_flags() {
        let cli = Cli::try_parse_from([
            "signalrig",
            "-vv",
            "--log-format",
            "json",
            "--color",
            "never",
            "version",
        ])
        .unwrap();
        let s = LogSettings::from_cli(&cli);
        assert_eq!(s.format, LogFormat::Json);
        assert_eq!(s.verbosity, 2);
        assert!(!s.quiet);
        assert_eq!(s.color, ColorChoice::Never);
    }

    #[test]
    fn init_is_repeatable() {
        settings(0, false).init();
        LogSettings {
            format: LogFormat::Json,
            ..settings(3, false)
        }
        .init();
    }
}
