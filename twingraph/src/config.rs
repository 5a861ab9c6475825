use std::env;

use thiserror::Error;
use url::Url;

/// Connection settings for a twin graph instance and the app registration used
/// to authenticate against it. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub instance_url: Url,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid instance URL: {0}")]
    InvalidUrl(String),
    #[error("Instance URL must use https, got '{0}'")]
    InsecureScheme(String),
}

impl EndpointConfig {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        instance_url: &str,
    ) -> Result<Self, ConfigError> {
        let instance_url =
            Url::parse(instance_url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        if instance_url.scheme() != "https" {
            return Err(ConfigError::InsecureScheme(instance_url.scheme().to_string()));
        }

        Ok(Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            instance_url,
        })
    }

    /// Reads the config from `ADT_TENANT_ID`, `ADT_CLIENT_ID`, `ADT_CLIENT_SECRET`
    /// (optional) and `ADT_INSTANCE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let tenant_id =
            env::var("ADT_TENANT_ID").map_err(|_| ConfigError::MissingVar("ADT_TENANT_ID"))?;
        let client_id =
            env::var("ADT_CLIENT_ID").map_err(|_| ConfigError::MissingVar("ADT_CLIENT_ID"))?;
        let client_secret = env::var("ADT_CLIENT_SECRET").ok();
        let instance_url = env::var("ADT_INSTANCE_URL")
            .map_err(|_| ConfigError::MissingVar("ADT_INSTANCE_URL"))?;

        Self::new(tenant_id, client_id, client_secret, &instance_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_instance_url() {
        let config = EndpointConfig::new(
            "tenant",
            "client",
            None,
            "https://my-instance.api.weu.digitaltwins.azure.net",
        )
        .unwrap();

        assert_eq!(config.instance_url.scheme(), "https");
    }

    #[test]
    fn rejects_http_instance_url() {
        let result = EndpointConfig::new("tenant", "client", None, "http://my-instance.example");

        assert!(matches!(result, Err(ConfigError::InsecureScheme(scheme)) if scheme == "http"));
    }

    #[test]
    fn rejects_unparseable_instance_url() {
        let result = EndpointConfig::new("tenant", "client", None, "not a url");

        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }
}
