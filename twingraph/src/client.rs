use std::collections::VecDeque;

use thiserror::Error;
use url::Url;

use crate::{AuthError, ModelDescriptor, ModelPage, TokenCredential, ADT_SCOPE};

const MODELS_API_VERSION: &str = "2020-10-31";

/// A session against one twin graph instance. Exclusively owns its credential;
/// creation never touches the network, connection validity is deferred to the
/// first listing call.
pub struct TwinGraphClient {
    credential: Box<dyn TokenCredential>,
    instance_url: Url,
    http: reqwest::Client,
}

impl TwinGraphClient {
    pub fn new(credential: Box<dyn TokenCredential>, instance_url: Url) -> Self {
        Self::with_http_client(credential, instance_url, reqwest::Client::new())
    }

    /// Reuses an existing HTTP client, e.g. one shared across requests by a
    /// hosting environment.
    pub fn with_http_client(
        credential: Box<dyn TokenCredential>,
        instance_url: Url,
        http: reqwest::Client,
    ) -> Self {
        Self {
            credential,
            instance_url,
            http,
        }
    }

    /// Lazily pages through every registered model. The returned stream pulls
    /// one descriptor at a time and fetches continuation pages transparently.
    pub fn list_models(&self) -> ModelStream<'_> {
        ModelStream {
            client: self,
            cursor: PageCursor::Start,
            buffer: VecDeque::new(),
        }
    }

    fn first_page_url(&self) -> Result<Url, ListingError> {
        let mut url = self
            .instance_url
            .join("models")
            .map_err(|e| ListingError::ResponseError(format!("bad instance URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("api-version", MODELS_API_VERSION);
        Ok(url)
    }

    async fn fetch_page(&self, url: Url) -> Result<ModelPage, ListingError> {
        let token = self.credential.get_token(ADT_SCOPE).await?;

        tracing::debug!("fetching model page from {}", url);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&token.token)
            .send()
            .await
            .map_err(|e| ListingError::ResponseError(e.to_string()))?;

        if resp.status() == 401 || resp.status() == 403 {
            return Err(ListingError::Unauthorized);
        }
        if !resp.status().is_success() {
            return Err(ListingError::ResponseError(format!(
                "catalog returned {}",
                resp.status()
            )));
        }

        resp.json::<ModelPage>().await.map_err(|e| {
            ListingError::ParsingError(format!("Failed to parse response as JSON: {}", e))
        })
    }
}

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("ResponseError: {0}")]
    ResponseError(String),
    #[error("ParsingError: {0}")]
    ParsingError(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

enum PageCursor {
    Start,
    Next(String),
    Done,
}

/// Pull-based traversal of the model catalog. Page fetches happen at page
/// boundaries; a failed fetch ends the stream, descriptors already yielded
/// stay valid. Not restartable.
pub struct ModelStream<'a> {
    client: &'a TwinGraphClient,
    cursor: PageCursor,
    buffer: VecDeque<ModelDescriptor>,
}

impl ModelStream<'_> {
    /// The next descriptor, or `None` once the catalog is exhausted.
    pub async fn try_next(&mut self) -> Result<Option<ModelDescriptor>, ListingError> {
        loop {
            if let Some(model) = self.buffer.pop_front() {
                return Ok(Some(model));
            }

            let url = match &self.cursor {
                PageCursor::Done => return Ok(None),
                PageCursor::Start => self.client.first_page_url(),
                PageCursor::Next(link) => self.client.instance_url.join(link).map_err(|e| {
                    ListingError::ParsingError(format!("bad continuation link: {}", e))
                }),
            };
            let url = match url {
                Ok(url) => url,
                Err(e) => {
                    self.cursor = PageCursor::Done;
                    return Err(e);
                }
            };

            let page = match self.client.fetch_page(url).await {
                Ok(page) => page,
                Err(e) => {
                    self.cursor = PageCursor::Done;
                    return Err(e);
                }
            };

            self.cursor = match page.next_link {
                Some(link) if !link.is_empty() => PageCursor::Next(link),
                _ => PageCursor::Done,
            };
            self.buffer.extend(page.value);
        }
    }

    /// Drains the remaining models into a vector.
    pub async fn try_collect(mut self) -> Result<Vec<ModelDescriptor>, ListingError> {
        let mut models = Vec::new();
        while let Some(model) = self.try_next().await? {
            models.push(model);
        }
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccessToken, AuthError};
    use async_trait::async_trait;
    use httpmock::prelude::*;

    struct StaticCredential;

    #[async_trait]
    impl TokenCredential for StaticCredential {
        async fn get_token(&self, _scope: &str) -> Result<AccessToken, AuthError> {
            Ok(AccessToken::new("test-token".to_string(), 3600))
        }
    }

    fn client_for(server: &MockServer) -> TwinGraphClient {
        TwinGraphClient::new(
            Box::new(StaticCredential),
            server.base_url().parse().unwrap(),
        )
    }

    async fn mock_two_page_catalog(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/models")
                    .query_param("api-version", MODELS_API_VERSION)
                    .header("authorization", "Bearer test-token");
                then.status(200).json_body(serde_json::json!({
                    "value": [
                        { "id": "dtmi:example:Room;1" },
                        { "id": "dtmi:example:Floor;1" }
                    ],
                    "nextLink": "/models-page-2?api-version=2020-10-31"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models-page-2");
                then.status(200).json_body(serde_json::json!({
                    "value": [
                        { "id": "dtmi:example:Building;1", "decommissioned": false }
                    ],
                    "nextLink": null
                }));
            })
            .await;
    }

    #[tokio::test]
    async fn yields_all_models_across_pages_in_page_order() {
        let server = MockServer::start_async().await;
        mock_two_page_catalog(&server).await;

        let client = client_for(&server);
        let models = client.list_models().try_collect().await.unwrap();

        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "dtmi:example:Room;1",
                "dtmi:example:Floor;1",
                "dtmi:example:Building;1"
            ]
        );
        assert!(models.iter().all(|m| !m.id.is_empty()));
    }

    #[tokio::test]
    async fn listing_twice_yields_the_same_ids() {
        let server = MockServer::start_async().await;
        mock_two_page_catalog(&server).await;

        let client = client_for(&server);
        let first = client.list_models().try_collect().await.unwrap();
        let second = client.list_models().try_collect().await.unwrap();

        let ids = |models: &[ModelDescriptor]| {
            let mut ids: Vec<_> = models.iter().map(|m| m.id.clone()).collect();
            ids.sort();
            ids
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn empty_catalog_terminates_immediately() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models");
                then.status(200)
                    .json_body(serde_json::json!({ "value": [] }));
            })
            .await;

        let client = client_for(&server);
        let mut stream = client.list_models();
        assert!(stream.try_next().await.unwrap().is_none());
        assert!(stream.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn denied_listing_fails_with_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models");
                then.status(403);
            })
            .await;

        let client = client_for(&server);
        let result = client.list_models().try_collect().await;
        assert!(matches!(result, Err(ListingError::Unauthorized)));
    }

    #[tokio::test]
    async fn unreachable_instance_fails_and_yields_nothing_afterwards() {
        let client = TwinGraphClient::new(
            Box::new(StaticCredential),
            "http://127.0.0.1:1".parse().unwrap(),
        );

        let mut stream = client.list_models();
        assert!(matches!(
            stream.try_next().await,
            Err(ListingError::ResponseError(_))
        ));
        // The stream is over after a failure; nothing else is yielded.
        assert!(stream.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_page_fails_with_parsing_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models");
                then.status(200).body("not json");
            })
            .await;

        let client = client_for(&server);
        let result = client.list_models().try_collect().await;
        assert!(matches!(result, Err(ListingError::ParsingError(_))));
    }

    #[tokio::test]
    async fn failure_mid_sequence_keeps_earlier_descriptors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/models")
                    .query_param("api-version", MODELS_API_VERSION);
                then.status(200).json_body(serde_json::json!({
                    "value": [{ "id": "dtmi:example:Room;1" }],
                    "nextLink": "/models-page-2"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models-page-2");
                then.status(500);
            })
            .await;

        let client = client_for(&server);
        let mut stream = client.list_models();

        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(first.id, "dtmi:example:Room;1");

        assert!(matches!(
            stream.try_next().await,
            Err(ListingError::ResponseError(_))
        ));
        assert!(stream.try_next().await.unwrap().is_none());
    }
}
