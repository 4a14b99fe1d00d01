use finance_tracker::{actions, realtime::subscribe_to_changes, router, select_backend, AppState, Config};
use std::net::SocketAddr;
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    if let Some(parent) = config.data_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let backend = select_backend(&config);
    let state = AppState::new(&backend);
    actions::restore_session(&state).await;

    let realtime = backend.remote.clone().map(|client| {
        let state = state.clone();
        subscribe_to_changes(client, move || {
            let state = state.clone();
            tokio::spawn(async move {
                state.reload().await;
            });
        })
    });

    state.reload().await;

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!(mode = backend.mode.label(), "listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(subscription) = &realtime {
        info!(state = ?subscription.state(), "closing realtime channel");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
