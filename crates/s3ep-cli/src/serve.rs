//! `s3ep serve` — load a config file, build the application state, and
//! run the proxy until a shutdown signal arrives.
//!
//! TLS termination is out of scope for this binary: `config.tls` is
//! still parsed and validated so a deployment manifest can record
//! intent, but no TLS-serving crate is in this workspace's dependency
//! set, so `serve` always binds plain HTTP and logs a warning if
//! `tls.enabled` is set. Terminate TLS at a reverse proxy in front of
//! this process instead.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use s3ep_api::state::AppState;
use s3ep_core::Config;
use tokio::signal;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file.
    pub config: PathBuf,
}

pub fn run(args: &ServeArgs) -> anyhow::Result<u8> {
    let config = Config::load(&args.config)?;

    if config.tls.enabled {
        tracing::warn!(
            "tls.enabled is set in config but this binary does not terminate TLS itself; \
             run it behind a TLS-terminating reverse proxy"
        );
    }

    let bind_address = config.bind_address.clone();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_seconds);
    let state = AppState::build(config)?;
    let app = s3ep_api::app(state);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        tracing::info!(%bind_address, "s3ep listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

        Ok::<(), anyhow::Error>(())
    })?;

    Ok(0)
}

async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(timeout_secs = timeout.as_secs(), "shutdown signal received, draining in-flight requests");
}
