// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::net::SocketAddr;
use std::{env, process, sync::Arc};

use tokio::{net::TcpListener, signal, task::JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use speedtest_exporter::{
    collector::{self, SpeedtestCollector},
    config::{ExporterConfig, LogLevel},
    provider::SpeedtestNetProvider,
    refresher::Refresher,
    scheduler::Scheduler,
    server::{ExporterServer, InternetHealthProbe},
    snapshot::SnapshotCache,
};
use speedtest_net::{Client, ClientConfig};

const LISTEN_HOST: [u8; 4] = [0, 0, 0, 0];

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| LogLevel::parse(&val))
        .unwrap_or_default();

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level.as_directive());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ExporterConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {e}");
            process::exit(1);
        }
    };

    let client = match Client::new(ClientConfig::default()) {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating speedtest client: {e}");
            process::exit(1);
        }
    };
    let health_probe = match InternetHealthProbe::new() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("Error creating health check client: {e}");
            process::exit(1);
        }
    };

    let cache = Arc::new(SnapshotCache::new());
    let registry = match SpeedtestCollector::new(Arc::clone(&cache)).and_then(collector::registry) {
        Ok(r) => r,
        Err(e) => {
            error!("Error registering speedtest metrics: {e}");
            process::exit(1);
        }
    };

    let refresher = Refresher::new(
        Arc::new(SpeedtestNetProvider::new(client)),
        config.server.clone(),
        config.server_fallback,
        Arc::clone(&cache),
    );
    let scheduler = match Scheduler::new(refresher, config.refresh_interval()) {
        Ok(s) => s,
        Err(e) => {
            error!("Invalid configuration: {e}");
            process::exit(1);
        }
    };

    let addr = SocketAddr::from((LISTEN_HOST, config.listen_port));
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Could not listen on {addr}: {e}");
            process::exit(1);
        }
    };

    info!(
        "Starting Speedtest Exporter on port {}, refresh interval {}s",
        config.listen_port, config.refresh_interval_secs
    );

    let cancel = CancellationToken::new();

    let server = ExporterServer::new(Arc::clone(&cache), registry, health_probe);
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve(listener, server_cancel.clone()).await {
            error!("HTTP server error: {e}");
            server_cancel.cancel();
        }
    });

    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.start(true, scheduler_cancel).await;
    });

    tokio::select! {
        () = shutdown_signal() => {},
        () = cancel.cancelled() => {},
    }

    info!("Shutting down gracefully");
    cancel.cancel();
    let (server_result, scheduler_result) = tokio::join!(server_handle, scheduler_handle);
    log_task_failure("HTTP server", server_result);
    log_task_failure("Scheduler", scheduler_result);
}

fn log_task_failure(task: &str, result: Result<(), JoinError>) {
    match result {
        Err(e) if e.is_panic() => error!("{task} task panicked: {e}"),
        Err(e) => error!("{task} task failed: {e}"),
        Ok(()) => {}
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
