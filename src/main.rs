mod checker;
mod collab;
mod config;
mod eager_env;
mod metrics;
mod server;
mod transport;
mod utils;

use crate::{
    checker::{Checker, probe::Prober, scheduler::Scheduler},
    collab::KubernetesPeerProvider,
    config::Config,
    eager_env::check_env,
    metrics::PrometheusSink,
    server::{AppStateInner, start_server},
    transport::build_client,
};
use log::{error, info};
use std::{net::TcpListener, sync::Arc};
use tokio::signal::unix::{SignalKind, signal};

async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!("cannot listen for SIGTERM: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() {
    env_logger::builder()
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();
    check_env();

    let config = Config::from_env().expect("invalid configuration");

    let client = build_client(&config.transport).expect("failed to build http client");

    let metrics = Arc::new(
        PrometheusSink::new(config.histogram_buckets.clone()).expect("failed to register metrics"),
    );

    let provider = KubernetesPeerProvider::in_cluster(&config.discovery, client.clone())
        .expect("failed to set up neighbour discovery");

    let prober = Prober::new(client, config.checker.request_timeout, metrics.clone());
    let check_interval = config.checker.check_interval;

    let checker = Arc::new(Checker::new(
        config.checker,
        prober,
        provider,
        metrics.clone(),
    ));

    let scheduler = Scheduler::new(checker.clone(), check_interval);

    let state = Arc::new(AppStateInner::new(
        checker,
        metrics,
        config.server.hostname,
    ));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.server.port))
        .expect("Failed to bind PORT");

    info!(
        "Listening on {}",
        listener.local_addr().expect("Failed to get local address")
    );

    let server = start_server(state.clone(), listener).expect("Failed to start server");
    let server_handle = server.handle();

    scheduler.start();

    let shutdown_grace = config.server.shutdown_grace;
    let shutdown = tokio::spawn(async move {
        shutdown_signal().await;

        state.mark_not_ready();
        info!("Not ready anymore, shutting down in {shutdown_grace:?}");
        tokio::time::sleep(shutdown_grace).await;

        scheduler.stop().await;
        server_handle.stop(true).await;
    });

    server.await.expect("error while running server");

    if let Err(e) = shutdown.await {
        error!("shutdown task failed: {e}");
    }

    info!("Shut down");
}
