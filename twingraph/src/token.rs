use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuthError;

/// Scope requested for every twin graph data-plane call.
pub const ADT_SCOPE: &str = "https://digitaltwins.azure.net/.default";
/// Resource audience used by managed identity token requests.
pub const ADT_RESOURCE: &str = "https://digitaltwins.azure.net";

/// Refresh tokens this close to expiry instead of using the cached one.
const EXPIRY_MARGIN_SECONDS: i64 = 120;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: OffsetDateTime,
}

impl AccessToken {
    pub fn new(token: String, expires_in: i64) -> Self {
        Self {
            token,
            expires_on: OffsetDateTime::now_utc() + time::Duration::seconds(expires_in),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.expires_on
            > OffsetDateTime::now_utc() + time::Duration::seconds(EXPIRY_MARGIN_SECONDS)
    }
}

/// A strategy-agnostic provider of renewable access tokens. Implementations
/// cache their latest token and renew it when it goes stale.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError>;
}

/// Token cache shared by all credential implementations.
#[derive(Default)]
pub struct TokenCache(RwLock<Option<AccessToken>>);

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fresh(&self) -> Option<AccessToken> {
        self.0.read().await.as_ref().filter(|t| t.is_fresh()).cloned()
    }

    pub async fn store(&self, token: AccessToken) {
        *self.0.write().await = Some(token);
    }
}

/// Wire shape of a successful identity provider token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}
