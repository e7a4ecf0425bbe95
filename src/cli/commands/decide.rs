//! `decide` command
//!
//! Runs the phase selector on a set of counts without touching the rig.

use std::sync::Arc;

use serde_json::json;

use crate::cli::args::{DecideArgs, OutputFormat};
use crate::error::SignalRigError;
use crate::signal::lane::parse_count_list;
use crate::signal::priority::{priority, traffic_level};
use crate::signal::selector::PhaseSelector;
use crate::signal::state::VehicleCountSnapshot;

use super::load_config;

/// Prints the decision for `--counts` given the selection history.
///
/// # Errors
///
/// Returns an error for malformed counts, an unknown `--last-phase`, or a
/// configuration problem.
pub fn run(args: &DecideArgs) -> Result<(), SignalRigError> {
    let config = load_config(args.config.as_ref())?;
    let catalog = Arc::new(config.build_catalog()?);
    let snapshot = VehicleCountSnapshot::new(parse_count_list(&args.counts)?);
    let last_phase = args
        .last_phase
        .as_deref()
        .map(|input| catalog.resolve(input).map(|p| p.id))
        .transpose()?;

    let selector = PhaseSelector::new(Arc::clone(&catalog), config.policy);
    let decision = selector.decide(&snapshot, last_phase, args.streak);
    let level = traffic_level(snapshot.total());

    match args.format {
        OutputFormat::Human => {
            println!("traffic: {} vehicles ({level})", snapshot.total());
            for phase in catalog.phases() {
                let p = priority(&config.policy, &snapshot.counts, phase);
                println!(
                    "  {:<2} {:<18} {:>3} vehicles  {:>3}s",
                    phase.id, phase.name, p.vehicles, p.green_time_secs
                );
            }
            match &decision {
                Some(d) => println!(
                    "next: {} for {}s (group {}, streak {}{})",
                    d.phase_name,
                    d.green_time_secs,
                    d.group,
                    d.group_streak,
                    if d.fairness_override {
                        ", fairness override"
                    } else {
                        ""
                    }
                ),
                None => println!("next: none, all lanes held red"),
            }
        }
        OutputFormat::Json => {
            let value = json!({
                "counts": snapshot.counts,
                "total_vehicles": snapshot.total(),
                "traffic_level": level,
                "decision": decision,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}
