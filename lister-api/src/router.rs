use axum::{routing::get, Router};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::{app_state::AppState, config::Settings, routes};

pub fn create(config: Settings) -> Router<()> {
    let app_state = AppState::new(config);

    Router::new()
        .route("/", get(|| async { "twin graph model lister" }))
        .nest("/models", routes::models::router())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new()))
        .with_state(app_state)
}
