use std::env;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;

use super::AuthError;
use crate::{AccessToken, TokenCache, TokenCredential};

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// How long to wait before concluding no identity endpoint is reachable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Credential backed by the hosting environment's identity facility, scoped to
/// a fixed resource audience. Uses the App Service identity endpoint when
/// `IDENTITY_ENDPOINT` is set, the IMDS endpoint otherwise.
pub struct ManagedIdentityCredential {
    resource: String,
    endpoint_override: Option<String>,
    http: reqwest::Client,
    cache: TokenCache,
}

/// The identity endpoints serialize numbers as strings.
#[derive(Debug, Deserialize)]
struct ManagedIdentityTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    expires_on: Option<String>,
}

impl ManagedIdentityTokenResponse {
    fn expires_in_seconds(&self) -> i64 {
        if let Some(seconds) = self.expires_in.as_deref().and_then(|s| s.parse().ok()) {
            return seconds;
        }
        if let Some(timestamp) = self.expires_on.as_deref().and_then(|s| s.parse::<i64>().ok()) {
            return timestamp - OffsetDateTime::now_utc().unix_timestamp();
        }
        3600
    }
}

impl ManagedIdentityCredential {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            endpoint_override: None,
            http: reqwest::Client::new(),
            cache: TokenCache::new(),
        }
    }

    /// Requests tokens from `endpoint` instead of the autodetected one.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint_override = Some(endpoint.to_string());
        self
    }

    fn endpoint(&self) -> (String, &'static str, Option<(&'static str, String)>) {
        if let Some(endpoint) = &self.endpoint_override {
            return (endpoint.clone(), IMDS_API_VERSION, None);
        }
        match (env::var("IDENTITY_ENDPOINT"), env::var("IDENTITY_HEADER")) {
            (Ok(endpoint), Ok(secret)) => (
                endpoint,
                APP_SERVICE_API_VERSION,
                Some(("X-IDENTITY-HEADER", secret)),
            ),
            _ => (IMDS_ENDPOINT.to_string(), IMDS_API_VERSION, None),
        }
    }

    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        let (endpoint, api_version, secret_header) = self.endpoint();

        let mut req = self
            .http
            .get(&endpoint)
            .query(&[
                ("api-version", api_version),
                ("resource", self.resource.as_str()),
            ])
            .timeout(PROBE_TIMEOUT);
        req = match secret_header {
            Some((name, value)) => req.header(name, value),
            None => req.header("Metadata", "true"),
        };

        let resp = req
            .send()
            .await
            .map_err(|e| AuthError::NoManagedIdentity(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AuthError::NoManagedIdentity(format!(
                "identity endpoint returned {}",
                resp.status()
            )));
        }

        let token: ManagedIdentityTokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::ParsingError(e.to_string()))?;

        let expires_in_seconds = token.expires_in_seconds();
        Ok(AccessToken::new(token.access_token, expires_in_seconds))
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    /// The resource audience is fixed at construction; `scope` is not used by
    /// the identity endpoints.
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.cache.fresh().await {
            return Ok(token);
        }

        let token = self.request_token().await?;
        self.cache.store(token.clone()).await;

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ADT_RESOURCE, ADT_SCOPE};
    use httpmock::prelude::*;

    #[tokio::test]
    async fn acquires_a_token_from_the_identity_endpoint() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/identity/token")
                    .query_param("resource", ADT_RESOURCE)
                    .header("Metadata", "true");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "mi-token",
                    "expires_in": "3599",
                    "token_type": "Bearer"
                }));
            })
            .await;

        let credential = ManagedIdentityCredential::new(ADT_RESOURCE)
            .with_endpoint(&server.url("/identity/token"));

        let token = credential.get_token(ADT_SCOPE).await.unwrap();
        assert_eq!(token.token, "mi-token");
        assert!(token.is_fresh());
    }

    #[tokio::test]
    async fn unreachable_identity_endpoint_means_no_managed_identity() {
        let credential =
            ManagedIdentityCredential::new(ADT_RESOURCE).with_endpoint("http://127.0.0.1:1");

        let result = credential.get_token(ADT_SCOPE).await;
        assert!(matches!(result, Err(AuthError::NoManagedIdentity(_))));
    }
}
