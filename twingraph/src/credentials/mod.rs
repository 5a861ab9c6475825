mod client_secret;
mod interactive;
mod managed_identity;

pub use client_secret::*;
pub use interactive::*;
pub use managed_identity::*;

use thiserror::Error;

use crate::{EndpointConfig, TokenCredential, ADT_RESOURCE, ADT_SCOPE};

pub(crate) const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// How the credential for a client session is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStrategy {
    ClientSecret,
    InteractiveBrowser,
    ManagedIdentity,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Config has no client secret")]
    MissingClientSecret,
    #[error("Token request failed: {0}")]
    TokenRequest(String),
    #[error("Identity provider rejected the credential: {0}")]
    Rejected(String),
    #[error("Interactive sign-in failed: {0}")]
    BrowserFlow(String),
    #[error("Interactive sign-in timed out")]
    Timeout,
    #[error("No managed identity available: {0}")]
    NoManagedIdentity(String),
    #[error("Malformed token response: {0}")]
    ParsingError(String),
}

/// Resolves a credential using the selected strategy and verifies it by
/// acquiring a first token, so bad credentials fail before any listing call.
///
/// The interactive strategy opens the system browser and blocks until sign-in
/// completes or times out, then prints the signed-in username.
pub async fn resolve_credential(
    strategy: CredentialStrategy,
    config: &EndpointConfig,
) -> Result<Box<dyn TokenCredential>, AuthError> {
    match strategy {
        CredentialStrategy::ClientSecret => {
            let secret = config
                .client_secret
                .as_deref()
                .ok_or(AuthError::MissingClientSecret)?;
            let credential =
                ClientSecretCredential::new(&config.tenant_id, &config.client_id, secret);
            credential.get_token(ADT_SCOPE).await?;
            Ok(Box::new(credential))
        }
        CredentialStrategy::InteractiveBrowser => {
            let credential =
                InteractiveBrowserCredential::new(&config.tenant_id, &config.client_id);
            let record = credential.authenticate(DEFAULT_SIGN_IN_TIMEOUT).await?;
            println!("Successfully authenticated as: {}", record.username);
            Ok(Box::new(credential))
        }
        CredentialStrategy::ManagedIdentity => {
            let credential = ManagedIdentityCredential::new(ADT_RESOURCE);
            credential.get_token(ADT_SCOPE).await?;
            Ok(Box::new(credential))
        }
    }
}

/// Pulls `error_description` out of an identity provider error body, falling
/// back to the raw body.
pub(crate) fn error_description(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error_description")
                .and_then(|d| d.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_secret_strategy_requires_a_secret() {
        let config = EndpointConfig::new(
            "tenant",
            "client",
            None,
            "https://my-instance.api.weu.digitaltwins.azure.net",
        )
        .unwrap();

        let result = resolve_credential(CredentialStrategy::ClientSecret, &config).await;

        assert!(matches!(result, Err(AuthError::MissingClientSecret)));
    }

    #[test]
    fn error_description_prefers_the_provider_message() {
        let body = r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret provided."}"#;
        assert_eq!(
            error_description(body.to_string()),
            "AADSTS7000215: Invalid client secret provided."
        );

        assert_eq!(error_description("plain text".to_string()), "plain text");
    }
}
