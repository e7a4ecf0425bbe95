//! `catalog` command

use crate::cli::args::{CatalogArgs, OutputFormat};
use crate::error::SignalRigError;

use super::load_config;

/// Lists the phases of the configured (or stock) catalog.
///
/// # Errors
///
/// Returns a config error if the configuration or its catalog is invalid.
pub fn run(args: &CatalogArgs) -> Result<(), SignalRigError> {
    let config = load_config(args.config.as_ref())?;
    let catalog = config.build_catalog()?;

    match args.format {
        OutputFormat::Human => {
            for phase in catalog.phases() {
                let lanes: Vec<String> = phase.lanes.iter().map(ToString::to_string).collect();
                let conflicts: Vec<String> =
                    phase.conflicts.iter().map(ToString::to_string).collect();
                println!(
                    "{:<2} {:<18} {:<13} lanes {:<12} conflicts {}",
                    phase.id,
                    phase.name,
                    phase.group.to_string(),
                    lanes.join(","),
                    conflicts.join(",")
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(catalog.phases())?);
        }
    }
    Ok(())
}
