//! `signalrig` - Adaptive phase controller for a six-lane traffic-signal rig

use clap::Parser;
use tokio_util::sync::CancellationToken;

use signalrig::cli::args::Cli;
use signalrig::cli::commands;
use signalrig::error::ExitCode;
use signalrig::observability::LogSettings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LogSettings::from_cli(&cli).init();

    // First signal requests a graceful stop; a second one exits at once.
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }

        eprintln!("\nStopping: lanes go red after the current cycle... (press Ctrl+C again to force)");
        shutdown.cancel();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
            _ = sigterm.recv() => std::process::exit(ExitCode::TERMINATED),
        }
    });

    let result = commands::dispatch(cli, cancel).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
