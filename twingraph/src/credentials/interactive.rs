use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use super::{error_description, AuthError, AUTHORITY_HOST};
use crate::{AccessToken, TokenCache, TokenCredential, TokenResponse, ADT_SCOPE};

const CALLBACK_PORT: u16 = 8400;

pub const DEFAULT_SIGN_IN_TIMEOUT: Duration = Duration::from_secs(300);

/// Identity of the signed-in user, surfaced after an interactive flow.
#[derive(Debug)]
pub struct AuthenticationRecord {
    pub username: String,
}

/// Credential that signs a user in through the system browser. Silently renews
/// access tokens through the refresh token once `authenticate` has run.
pub struct InteractiveBrowserCredential {
    tenant_id: String,
    client_id: String,
    authority_host: String,
    http: reqwest::Client,
    cache: TokenCache,
    refresh_token: RwLock<Option<String>>,
}

impl InteractiveBrowserCredential {
    pub fn new(tenant_id: &str, client_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            authority_host: AUTHORITY_HOST.to_string(),
            http: reqwest::Client::new(),
            cache: TokenCache::new(),
            refresh_token: RwLock::new(None),
        }
    }

    pub fn with_authority_host(mut self, host: &str) -> Self {
        self.authority_host = host.trim_end_matches('/').to_string();
        self
    }

    /// Runs the sign-in flow, bounded by `timeout`:
    /// 1. Start a local listener on localhost:8400
    /// 2. Open the authorization URL in the system browser
    /// 3. Wait for the browser to call back with ?code=<value>
    /// 4. Exchange the code for tokens
    pub async fn authenticate(
        &self,
        timeout: Duration,
    ) -> Result<AuthenticationRecord, AuthError> {
        let redirect_uri = format!("http://localhost:{}/callback", CALLBACK_PORT);
        let authorize_url = self.authorize_url(&redirect_uri)?;

        println!("Opening browser for sign-in...");
        println!("If the browser doesn't open, visit:\n  {}\n", authorize_url);
        open_browser(&authorize_url);

        let code = tokio::time::timeout(timeout, wait_for_callback())
            .await
            .map_err(|_| AuthError::Timeout)??;

        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .await?;

        let username = response
            .id_token
            .as_deref()
            .and_then(username_from_id_token)
            .unwrap_or_else(|| "unknown".to_string());
        self.store(response).await;

        Ok(AuthenticationRecord { username })
    }

    fn authorize_url(&self, redirect_uri: &str) -> Result<String, AuthError> {
        let mut url = url::Url::parse(&format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority_host, self.tenant_id
        ))
        .map_err(|e| AuthError::BrowserFlow(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("response_mode", "query")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &format!("openid profile offline_access {}", ADT_SCOPE));

        Ok(url.to_string())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        );

        let resp = self
            .http
            .post(&token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(error_description(body)));
        }

        resp.json()
            .await
            .map_err(|e| AuthError::ParsingError(e.to_string()))
    }

    async fn store(&self, response: TokenResponse) -> AccessToken {
        if let Some(refresh) = response.refresh_token {
            *self.refresh_token.write().await = Some(refresh);
        }
        let token = AccessToken::new(response.access_token, response.expires_in);
        self.cache.store(token.clone()).await;
        token
    }
}

#[async_trait]
impl TokenCredential for InteractiveBrowserCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.cache.fresh().await {
            return Ok(token);
        }

        let refresh = self.refresh_token.read().await.clone();
        match refresh {
            Some(refresh) => {
                let response = self
                    .token_request(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", self.client_id.as_str()),
                        ("refresh_token", refresh.as_str()),
                        ("scope", scope),
                    ])
                    .await?;
                Ok(self.store(response).await)
            }
            None => Err(AuthError::BrowserFlow(
                "not signed in, run the interactive flow first".to_string(),
            )),
        }
    }
}

/// Opens a URL in the system default browser.
fn open_browser(url: &str) {
    #[cfg(target_os = "linux")]
    let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    #[cfg(target_os = "macos")]
    let _ = std::process::Command::new("open").arg(url).spawn();
    #[cfg(target_os = "windows")]
    let _ = std::process::Command::new("cmd").args(["/c", "start", url]).spawn();
}

/// Starts a minimal HTTP server, waits for one request to /callback and
/// returns the authorization code it carries.
async fn wait_for_callback() -> Result<String, AuthError> {
    let listener = TcpListener::bind(("127.0.0.1", CALLBACK_PORT))
        .await
        .map_err(|e| {
            AuthError::BrowserFlow(format!("failed to bind port {}: {}", CALLBACK_PORT, e))
        })?;

    println!("Waiting for browser callback on port {}...", CALLBACK_PORT);

    let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| AuthError::BrowserFlow(format!("failed to accept connection: {}", e)))?;

    let mut buf = vec![0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| AuthError::BrowserFlow(format!("failed to read from socket: {}", e)))?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let result = parse_callback(&request);

    // Show the user something so they know they can go back to the terminal.
    let body = match &result {
        Ok(_) => "<html><body><h2>Sign-in complete!</h2><p>You can close this tab.</p></body></html>",
        Err(_) => "<html><body><h2>Sign-in failed.</h2><p>Check the terminal for details.</p></body></html>",
    };
    let response = format!("HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n{}", body);
    let _ = stream.write_all(response.as_bytes()).await;

    result
}

/// Parses the authorization code (or the provider's error) from the callback
/// request line, e.g. "GET /callback?code=abc123 HTTP/1.1".
fn parse_callback(request: &str) -> Result<String, AuthError> {
    let line = request.lines().next().unwrap_or_default();
    let path = line.split_whitespace().nth(1).unwrap_or_default();
    let query = path.split('?').nth(1).unwrap_or_default();

    let mut code = None;
    let mut error = None;
    for param in query.split('&') {
        let mut parts = param.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some("code"), Some(v)) => code = Some(v.to_string()),
            (Some("error_description"), Some(v)) => error = Some(v.to_string()),
            (Some("error"), Some(v)) if error.is_none() => error = Some(v.to_string()),
            _ => {}
        }
    }

    match (code, error) {
        (Some(code), _) => Ok(code),
        (None, Some(error)) => Err(AuthError::BrowserFlow(error)),
        (None, None) => Err(AuthError::BrowserFlow(
            "callback did not contain an authorization code".to_string(),
        )),
    }
}

/// Best-effort username from the id_token claims, without signature checks.
fn username_from_id_token(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

    ["preferred_username", "upn", "name"]
        .iter()
        .find_map(|claim| claims.get(claim).and_then(|v| v.as_str()))
        .map(str::to_string)
}
