use std::sync::Arc;

use tower_http::cors::CorsLayer;

use gemini_relay::{config::Config, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    // Fails fast: no credential, no server.
    let config = Config::from_env()?;
    let port = config.port;
    let state = Arc::new(AppState::new(config)?);

    let app = routes::create_router()
        .with_state(state)
        .layer(CorsLayer::very_permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("chat relay listening on http://localhost:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
