//! `cycle` command
//!
//! Executes exactly one cycle from the given counts, either the phase the
//! selector would choose or an operator-named phase, and prints the report.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{CycleArgs, OutputFormat};
use crate::config::RigConfig;
use crate::error::SignalRigError;
use crate::signal::executor::{CyclePlan, CycleReport};
use crate::signal::lane::{LaneCounts, parse_count_list};
use crate::signal::priority::manual_green;
use crate::signal::selector::PhaseSelector;
use crate::signal::state::VehicleCountSnapshot;

use super::{build_controller, load_config};

/// Runs one cycle, or prints its plan with `--dry-run`.
///
/// # Errors
///
/// Returns an error for malformed counts, an unknown phase, or a
/// configuration problem.
pub async fn run(args: &CycleArgs, cancel: CancellationToken) -> Result<(), SignalRigError> {
    let config = load_config(args.rig.config.as_ref())?;
    let counts = parse_count_list(&args.counts)?;

    if args.dry_run {
        let plan = plan(&config, counts, args)?;
        return print_plan(plan.as_ref(), args.format);
    }

    let controller = build_controller(&config, &args.rig)?;
    controller.update_vehicle_counts(counts);

    // An interrupt aborts the cycle at its next state boundary.
    let watcher = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            controller.emergency_stop().await;
        })
    };

    let report = match &args.phase {
        Some(phase) => controller.run_phase(phase, args.green).await.map(Some),
        None => controller.run_one_cycle().await.map_err(Into::into),
    };
    watcher.abort();

    print_report(report?.as_ref(), args.format)
}

fn plan(
    config: &RigConfig,
    counts: LaneCounts,
    args: &CycleArgs,
) -> Result<Option<CyclePlan>, SignalRigError> {
    let catalog = config.build_catalog()?;
    let snapshot = VehicleCountSnapshot::new(counts);

    if let Some(input) = &args.phase {
        let phase = catalog.resolve(input)?;
        let green = manual_green(&config.policy, &counts, phase, args.green);
        return Ok(Some(CyclePlan::single(phase, green, counts, &config.timing)));
    }

    let selector = PhaseSelector::new(std::sync::Arc::new(catalog), config.policy);
    Ok(selector.decide(&snapshot, None, 0).and_then(|decision| {
        CyclePlan::for_decision(
            selector.catalog(),
            &decision,
            &snapshot,
            &config.timing,
            selector.policy(),
        )
    }))
}

fn print_plan(plan: Option<&CyclePlan>, format: OutputFormat) -> Result<(), SignalRigError> {
    match (plan, format) {
        (None, OutputFormat::Human) => println!("no traffic: all lanes held red"),
        (None, OutputFormat::Json) => println!("{}", json!({ "plan": null })),
        (Some(plan), OutputFormat::Human) => {
            println!(
                "{} (green {}s, nominal {})",
                plan.phase_name,
                plan.green_time_secs,
                humantime::format_duration(plan.nominal_duration())
            );
            for step in &plan.steps {
                let commands: Vec<String> = step
                    .commands
                    .iter()
                    .map(|c| format!("{}={}", c.lane, c.color))
                    .collect();
                println!(
                    "  {:<12} {:>6}  {}",
                    step.state.as_str(),
                    humantime::format_duration(step.hold).to_string(),
                    commands.join(" ")
                );
            }
        }
        (Some(plan), OutputFormat::Json) => {
            let steps: Vec<_> = plan
                .steps
                .iter()
                .map(|step| {
                    json!({
                        "state": step.state,
                        "hold_ms": u64::try_from(step.hold.as_millis()).unwrap_or(u64::MAX),
                        "commands": step.commands,
                    })
                })
                .collect();
            let value = json!({
                "phase_id": plan.phase_id,
                "phase_name": plan.phase_name,
                "green_time_secs": plan.green_time_secs,
                "counts": plan.counts,
                "nominal_duration_ms":
                    u64::try_from(plan.nominal_duration().as_millis()).unwrap_or(u64::MAX),
                "steps": steps,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn print_report(report: Option<&CycleReport>, format: OutputFormat) -> Result<(), SignalRigError> {
    match (report, format) {
        (None, OutputFormat::Human) => println!("no traffic: all lanes held red"),
        (None, OutputFormat::Json) => println!("{}", json!({ "report": null })),
        (Some(report), OutputFormat::Human) => {
            println!(
                "{} {} in {:.1}s (green {}s, {} vehicles, {} failed commands)",
                report.phase_name,
                report.outcome.as_str(),
                report.elapsed.as_secs_f64(),
                report.green_time_secs,
                report.total_vehicles,
                report.failed_commands
            );
        }
        (Some(report), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}
