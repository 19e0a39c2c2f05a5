use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use valmiki_core::{InferenceService, ModelRegistry};

mod config;
mod engine;
mod grpc;
mod rest;
#[cfg(test)]
mod testing;

use config::Config;
use grpc::GrpcHandler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "valmikid starting");

    let config = Config::load()?;
    tracing::info!(
        model_dir = %config.model_dir.display(),
        rest = %config.rest_addr(),
        grpc = %config.grpc_addr(),
        workers = config.workers,
        "configuration loaded"
    );

    // Models load before either listener binds; a failure leaves the
    // registry NotReady and the daemon up so /health can report it.
    let registry = Arc::new(ModelRegistry::new());
    let loaded = {
        let registry = Arc::clone(&registry);
        let paths = config.model_paths();
        let pipeline = config.pipeline.clone();
        tokio::task::spawn_blocking(move || registry.initialize(&paths, &pipeline))
            .await
            .context("model loading task panicked")?
    };
    match loaded {
        Ok(()) => tracing::info!("models loaded; service ready"),
        Err(e) => tracing::error!(error = %e, "models failed to load; serving in not-ready state"),
    }

    let engine = engine::spawn_engine(
        InferenceService::new(registry),
        config.workers,
        config.request_timeout(),
    )
    .context("failed to spawn engine threads")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            shutdown_tx.closed().await;
            return;
        }
        tracing::info!("valmikid shutting down");
        let _ = shutdown_tx.send(true);
    });

    let listener = TcpListener::bind(config.rest_addr())
        .await
        .with_context(|| format!("failed to bind REST listener on {}", config.rest_addr()))?;
    tracing::info!(addr = %config.rest_addr(), "REST API listening");
    let rest = axum::serve(listener, rest::create_rest_router(engine.clone(), config.max_upload_bytes))
        .with_graceful_shutdown(shutdown(shutdown_rx.clone()));

    tracing::info!(addr = %config.grpc_addr(), "gRPC server listening");
    let grpc = tonic::transport::Server::builder()
        .add_service(GrpcHandler::new(engine).into_server())
        .serve_with_shutdown(config.grpc_addr(), shutdown(shutdown_rx));

    tokio::try_join!(
        async { rest.await.context("REST server failed") },
        async { grpc.await.context("gRPC server failed") },
    )?;

    tracing::info!("valmikid stopped");
    Ok(())
}

async fn shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
