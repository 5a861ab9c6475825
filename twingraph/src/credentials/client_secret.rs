use async_trait::async_trait;

use super::{error_description, AuthError, AUTHORITY_HOST};
use crate::{AccessToken, TokenCache, TokenCredential, TokenResponse};

/// Non-interactive credential backed by an app registration's client secret.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority_host: String,
    http: reqwest::Client,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            authority_host: AUTHORITY_HOST.to_string(),
            http: reqwest::Client::new(),
            cache: TokenCache::new(),
        }
    }

    /// Points the credential at a different authority, e.g. a sovereign cloud.
    pub fn with_authority_host(mut self, host: &str) -> Self {
        self.authority_host = host.trim_end_matches('/').to_string();
        self
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        );

        let resp = self
            .http
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(error_description(body)));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::ParsingError(e.to_string()))?;

        Ok(AccessToken::new(token.access_token, token.expires_in))
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.cache.fresh().await {
            return Ok(token);
        }

        let token = self.request_token(scope).await?;
        self.cache.store(token.clone()).await;

        Ok(token)
    }
}
