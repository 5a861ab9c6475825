mod app_state;
mod config;
mod router;
mod routes;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::from_filename("./lister-api/.env.local").ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::read_config().expect("Failed to read configuration");
    let address = format!("{}:{}", config.application.host, config.application.port);

    let app = router::create(config);

    let listener = TcpListener::bind(&address)
        .await
        .expect("Failed to bind address");
    tracing::info!("listening on {}", address);

    axum::serve(listener, app).await.expect("Server error");
}
