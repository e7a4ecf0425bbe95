//! `run` command
//!
//! Starts the control loop, feeds it vehicle counts and stops it gracefully
//! on the first signal (or after `--duration`).

use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::cli::args::RunArgs;
use crate::error::SignalRigError;
use crate::feed::pump_counts;
use crate::signal::lane::parse_count_list;

use super::{build_controller, load_config};

/// Runs the controller until cancelled.
///
/// # Errors
///
/// Returns an error if configuration, the metrics endpoint, the feed or
/// the controller cannot be set up.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), SignalRigError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let config = load_config(args.rig.config.as_ref())?;
    let controller = build_controller(&config, &args.rig)?;
    if let Some(raw) = &args.initial_counts {
        controller.update_vehicle_counts(parse_count_list(raw)?);
    }

    let reader = open_feed(&args.feed).await?;
    controller.start().await?;

    let feed_cancel = cancel.child_token();
    let feed = {
        let controller = controller.clone();
        let feed_cancel = feed_cancel.clone();
        tokio::spawn(async move { pump_counts(reader, &controller, &feed_cancel).await })
    };

    match args.duration {
        Some(limit) => tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(limit) => {
                tracing::info!(?limit, "run duration reached");
            }
        },
        None => cancel.cancelled().await,
    }

    tracing::info!("stopping controller");
    feed_cancel.cancel();
    let status = controller.stop().await;

    match feed.await {
        Ok(Ok(accepted)) => tracing::info!(accepted, "count feed closed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "count feed failed"),
        Err(e) => tracing::warn!(error = %e, "count feed task failed"),
    }
    tracing::info!(
        last_phase = ?status.last_phase,
        hardware_online = status.hardware_online,
        "controller stopped, all lanes red"
    );
    Ok(())
}

async fn open_feed(
    source: &str,
) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, SignalRigError> {
    if source == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(source).await.map_err(|e| {
        SignalRigError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot open count feed {source}: {e}"),
        ))
    })?;
    tracing::info!(feed = source, "reading counts from file");
    Ok(Box::new(BufReader::new(file)))
}
