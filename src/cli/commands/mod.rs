//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler, and
//! holds the wiring shared by the commands that drive the rig.

pub mod catalog;
pub mod cycle;
pub mod decide;
pub mod run;
pub mod validate;
pub mod version;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands, RigArgs};
use crate::config::{RigConfig, load_or_default};
use crate::error::{ConfigError, SignalRigError};
use crate::observability::events::EventEmitter;
use crate::persistence::{CycleRecorder, JsonlCycleLog, NullCycleLog};
use crate::signal::controller::TrafficController;
use crate::signal::hardware::{LinkSettings, SignalHead, SimulatedSignalHead, TcpSignalLink};

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// `cancel` fires on the first SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), SignalRigError> {
    match cli.command {
        Commands::Run(args) => run::run(&args, cancel).await,
        Commands::Cycle(args) => cycle::run(&args, cancel).await,
        Commands::Decide(args) => decide::run(&args),
        Commands::Catalog(args) => catalog::run(&args),
        Commands::Validate(args) => validate::run(&args),
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}

/// Loads the configuration at `path` (or the stock one) and logs warnings.
///
/// # Errors
///
/// Returns a config error if loading or validation fails.
pub fn load_config(path: Option<&std::path::PathBuf>) -> Result<RigConfig, SignalRigError> {
    if let Some(path) = path {
        tracing::info!(config = %path.display(), "loading configuration");
    }
    let result = load_or_default(path)?;
    for warning in &result.warnings {
        tracing::warn!(location = %warning.path, "{}", warning.message);
    }
    Ok(result.config)
}

/// Builds a controller from configuration plus command-line overrides.
///
/// # Errors
///
/// Returns a config error for a bad catalog or head map, and an I/O error
/// if the cycle log or events file cannot be opened.
pub fn build_controller(
    config: &RigConfig,
    rig: &RigArgs,
) -> Result<TrafficController, SignalRigError> {
    let catalog = config.build_catalog()?;

    let head: Arc<dyn SignalHead> = match rig.link.as_ref().or(config.hardware.link.as_ref()) {
        Some(addr) => {
            let head_map =
                config
                    .hardware
                    .parsed_head_map()
                    .map_err(|message| ConfigError::InvalidValue {
                        field: "hardware.head_map".to_string(),
                        value: config.hardware.head_map.clone(),
                        expected: message,
                    })?;
            tracing::info!(%addr, "using hardware link");
            Arc::new(TcpSignalLink::new(LinkSettings {
                addr: addr.clone(),
                head_map,
                connect_timeout: config.hardware.connect_timeout,
                ack_timeout: config.hardware.ack_timeout,
            }))
        }
        None => {
            tracing::info!("no hardware link configured, simulating signal heads");
            Arc::new(SimulatedSignalHead::new())
        }
    };

    let recorder: Arc<dyn CycleRecorder> = match rig
        .cycle_log
        .as_deref()
        .or(config.persistence.cycle_log.as_deref())
    {
        Some(path) => Arc::new(open_cycle_log(path)?),
        None => Arc::new(NullCycleLog),
    };

    let events = match &rig.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::stderr(),
    };

    Ok(TrafficController::builder()
        .catalog(catalog)
        .policy(config.policy)
        .timing(config.timing)
        .head(head)
        .reconnect_interval(config.hardware.reconnect_interval)
        .recorder(recorder)
        .events(Arc::new(events))
        .build())
}

fn open_cycle_log(path: &Path) -> Result<JsonlCycleLog, SignalRigError> {
    tracing::info!(path = %path.display(), "appending cycle records");
    Ok(JsonlCycleLog::open(path)?)
}
