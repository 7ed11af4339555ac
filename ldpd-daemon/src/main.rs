//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;

use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle};
use ldpd::InstanceHandle;
use ldpd::management::{ManagementRequest, ManagementResponse};
use ldpd_utils::ip::system_interfaces;
use ldpd_utils::southbound::LogRouteSync;
use nix::unistd::Uid;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinError;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive(
            "ldpd=debug"
                .parse()
                .unwrap_or_else(|_| LevelFilter::DEBUG.into()),
        );
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

// Logs the instance state. Triggered by SIGUSR1.
async fn dump_state(handle: &InstanceHandle) {
    for request in [
        ManagementRequest::ShowParameters,
        ManagementRequest::ShowNeighbors,
        ManagementRequest::ShowHellos,
        ManagementRequest::ShowBindings,
        ManagementRequest::ShowLabels,
    ] {
        let Some(response) = handle.request(request.clone()).await else {
            return;
        };
        match serde_json::to_string(&response) {
            Ok(data) => info!(?request, %data, "state dump"),
            Err(error) => warn!(?request, %error, "failed to encode state"),
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    // Learn the IPv4 interface addresses.
    let ifaces = system_interfaces().unwrap_or_else(|error| {
        warn!(%error, "failed to enumerate system interfaces");
        vec![]
    });

    // Start the LDP instance.
    let route_sync = Box::new(LogRouteSync::new(config.kernel.routes));
    let (handle, mut instance_task) =
        ldpd::spawn(config.ldp, ifaces, route_sync)?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT");
                break;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                break;
            }
            _ = sigusr1.recv() => {
                dump_state(&handle).await;
            }
            _ = &mut instance_task => {
                warn!("instance stopped unexpectedly");
                return Ok(());
            }
        }
    }

    // Graceful shutdown.
    let response = handle.request(ManagementRequest::Shutdown).await;
    let joined = instance_task.await;
    if shutdown_is_clean(response, joined) {
        info!("instance stopped");
    }

    Ok(())
}

// Logs whatever went wrong while stopping the instance.
fn shutdown_is_clean(
    response: Option<ManagementResponse>,
    joined: Result<(), JoinError>,
) -> bool {
    let mut clean = true;
    match response {
        Some(ManagementResponse::Ok) => (),
        Some(response) => {
            warn!(?response, "unexpected reply to the shutdown request");
            clean = false;
        }
        None => {
            warn!("instance exited before the shutdown request");
            clean = false;
        }
    }
    if let Err(error) = joined {
        error!(%error, "instance task failed");
        clean = false;
    }
    clean
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("LDP daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = match Config::load(config_file) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Failed to parse configuration file: {error}");
            std::process::exit(1);
        }
    };

    // Check for root privileges.
    if !Uid::effective().is_root() {
        eprintln!("need privileged user");
        std::process::exit(1);
    }

    // Initialize tracing.
    init_tracing(&config.logging);

    // We're ready to go!
    info!("starting up");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to create async runtime");
            std::process::exit(1);
        }
    };
    if let Err(error) = runtime.block_on(run(config)) {
        error!(%error, "fatal error");
        std::process::exit(1);
    }

    info!("exiting");
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_outcome() {
        assert!(shutdown_is_clean(Some(ManagementResponse::Ok), Ok(())));
        assert!(!shutdown_is_clean(None, Ok(())));
        assert!(!shutdown_is_clean(
            Some(ManagementResponse::Error("busy".to_owned())),
            Ok(()),
        ));

        let panicked = tokio::spawn(async { panic!("event loop"); }).await;
        assert!(!shutdown_is_clean(Some(ManagementResponse::Ok), panicked));
    }
}
