use color_eyre::eyre::WrapErr as _;
use tracing::info;

use tracker_link::{
    routes,
    setup::{setup_sentry, setup_tracing},
    state::{AppState, Config},
};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _sentry_guard = setup_sentry();

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()?
        .block_on(async { run_application().await })
}

async fn run_application() -> color_eyre::Result<()> {
    setup_tracing("tracker-link")?;

    let config = Config::from_env().wrap_err("Invalid configuration")?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    info!(
        client_id = %config.provider.client_id,
        redirect_uri = %config.provider.redirect_uri,
        state_mode = ?config.state_mode,
        "Configuration loaded"
    );

    let app_state = AppState::from_config(config)?;
    info!(storage = %app_state.store.location(), "Credential store ready");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, routes::routes(app_state))
        .await
        .wrap_err("Server exited")?;

    Ok(())
}
