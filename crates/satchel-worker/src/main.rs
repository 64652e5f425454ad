mod backend;
mod classify;
mod config;
mod control;
mod event;
mod executor;
mod fallback;
mod lifecycle;
mod proxy;
mod strategy;
mod worker;

use axum::routing::{any, get, post};
use axum::Router;
use backend::{HyperBackend, NetworkBackend};
use config::Config;
use control::{ControlHandle, ControlService};
use executor::StrategyExecutor;
use fallback::OfflineFallbackProvider;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use lifecycle::{store_name, LifecycleConfig, LifecycleManager};
use proxy::{control_handler, intercept_handler, status_handler, AppState};
use satchel_store::StoreRegistry;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use worker::Worker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = if Path::new("config.toml").exists() {
        match Config::load(Path::new("config.toml")) {
            Ok(c) => {
                tracing::info!("loaded config from config.toml");
                c
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load config.toml, using defaults");
                Config::default_config()
            }
        }
    } else {
        tracing::info!("no config.toml found, using defaults");
        Config::default_config()
    };

    let registry = Arc::new(StoreRegistry::new(config.cache.max_store_bytes));
    let active_name = store_name(&config.cache.prefix, config.cache.version);

    let backend: Arc<dyn NetworkBackend> = Arc::new(HyperBackend::new(
        config.upstream.url.clone(),
        config.scope.page_origin.clone(),
        config.probe_url(),
        Duration::from_millis(config.upstream.timeout_ms),
    ));

    let lifecycle = Arc::new(LifecycleManager::new(
        Arc::clone(&registry),
        Arc::clone(&backend),
        active_name.clone(),
        LifecycleConfig {
            online_gate: config.lifecycle.online_gate,
            skip_waiting: config.lifecycle.skip_waiting,
            sweep_interval: Duration::from_secs(config.lifecycle.sweep_interval_seconds),
            max_entry_age: Duration::from_secs(config.lifecycle.max_entry_age_seconds),
        },
    ));

    lifecycle.install();
    if config.lifecycle.skip_waiting {
        lifecycle.activate().await;
    }

    let store = registry
        .open(&active_name)
        .expect("open active cache store");
    let fallback = OfflineFallbackProvider::new(
        Arc::clone(&store),
        &config.shell_url(),
        config.fallback.flavor,
    );
    let executor = StrategyExecutor::new(
        store,
        Arc::clone(&backend),
        fallback,
        config.cache.max_body_bytes,
    );
    let worker = Worker::new(
        config.scope.clone(),
        config.policy,
        executor,
        Arc::clone(&lifecycle),
    );

    let shutdown = CancellationToken::new();

    // Control channel: in-process mpsc, also surfaced on the admin router.
    let (control, control_rx) = ControlHandle::channel();
    let control_service = ControlService::new(
        Arc::clone(&registry),
        Arc::clone(&backend),
        Arc::clone(&lifecycle),
        config.cache.prefix.clone(),
    );
    tokio::spawn(control_service.run(control_rx, shutdown.clone()));

    // Periodic age-based eviction.
    tokio::spawn(Arc::clone(&lifecycle).run_sweeper(shutdown.clone()));

    let state = Arc::new(AppState {
        worker,
        client: Client::builder(TokioExecutor::new()).build_http(),
        upstream_url: config.upstream.url.clone(),
        page_origin: config.scope.page_origin.clone(),
        control,
    });

    let intercept_router = Router::new()
        .route("/{*path}", any(intercept_handler))
        .route("/", any(intercept_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let admin_router = Router::new()
        .route("/api/control", post(control_handler))
        .route("/api/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state);

    let listen_addr = config.server.listen_addr.clone();
    let admin_addr = config.server.admin_addr.clone();

    tracing::info!(
        listen = %listen_addr,
        admin = %admin_addr,
        upstream = %config.upstream.url,
        store = %active_name,
        online_gate = config.lifecycle.online_gate,
        "satchel worker starting"
    );

    let intercept_listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind proxy to {listen_addr}: {e}"));
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind admin to {admin_addr}: {e}"));

    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(shutdown_clone).await;
    });

    let intercept_future = axum::serve(intercept_listener, intercept_router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let admin_future = axum::serve(admin_listener, admin_router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    tokio::select! {
        result = intercept_future => {
            if let Err(e) = result {
                tracing::error!(error = %e, "proxy server error");
            }
        }
        result = admin_future => {
            if let Err(e) = result {
                tracing::error!(error = %e, "admin server error");
            }
        }
    }

    tracing::info!("satchel worker shut down");
}

/// Listen for SIGINT (Ctrl+C) or SIGTERM and cancel the shutdown token.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    tracing::info!("shutdown signal received, draining connections...");
    token.cancel();
}
