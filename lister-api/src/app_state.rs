use crate::config::Settings;

/// Shared by all request handlers. The reqwest client is reused across
/// invocations; it holds no per-request state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }
}
