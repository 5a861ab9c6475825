use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use twingraph::{ManagedIdentityCredential, ModelDescriptor, TwinGraphClient, ADT_RESOURCE};

use crate::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_models))
}

/// HTTP-triggered model listing. Authenticates with the host's managed
/// identity, drains the full catalog and returns it as JSON. Any failure is
/// returned as a 400 with the underlying message; no retry is attempted.
#[instrument(name = "list_models", skip(app_state))]
pub async fn list_models(State(app_state): State<AppState>) -> Response {
    tracing::info!("handling model listing request");

    match fetch_all_models(&app_state).await {
        Ok(models) => {
            for model in &models {
                tracing::info!("Id: {}", model.id);
            }
            tracing::info!("Done");

            (StatusCode::OK, Json(models)).into_response()
        }
        Err(message) => {
            tracing::error!("Authentication or client creation error: {}", message);

            (StatusCode::BAD_REQUEST, message).into_response()
        }
    }
}

async fn fetch_all_models(app_state: &AppState) -> Result<Vec<ModelDescriptor>, String> {
    let settings = &app_state.settings.twingraph;
    let instance_url = settings
        .instance_url
        .parse()
        .map_err(|e: url::ParseError| e.to_string())?;

    let mut credential = ManagedIdentityCredential::new(ADT_RESOURCE);
    if let Some(endpoint) = &settings.identity_endpoint {
        credential = credential.with_endpoint(endpoint);
    }

    let client = TwinGraphClient::with_http_client(
        Box::new(credential),
        instance_url,
        app_state.http.clone(),
    );

    client
        .list_models()
        .try_collect()
        .await
        .map_err(|e| e.to_string())
}
