use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Document, DocumentContent, DocumentId};
use crate::services::auth_service::generate_service_token;

/// Upstream document persistence, addressed by numeric id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, doc_id: DocumentId) -> Result<Document, StoreError>;
    async fn update(&self, doc_id: DocumentId, content: &DocumentContent) -> Result<(), StoreError>;
}

/// Document Store reached over HTTP: `GET {base}/{id}` and `PUT {base}/{id}`.
#[derive(Debug)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    jwt_secret: Option<String>,
    service_name: String,
}

impl HttpDocumentStore {
    pub fn new(
        base_url: &str,
        jwt_secret: Option<String>,
        service_name: String,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            jwt_secret,
            service_name,
        })
    }

    fn url(&self, doc_id: DocumentId) -> String {
        format!("{}/{}", self.base_url, doc_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, StoreError> {
        match &self.jwt_secret {
            Some(secret) => {
                let token = generate_service_token(&self.service_name, secret)?;
                Ok(request.bearer_auth(token))
            }
            None => Ok(request),
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_by_id(&self, doc_id: DocumentId) -> Result<Document, StoreError> {
        debug!("Fetching document {} from {}", doc_id, self.base_url);
        let response = self.authorize(self.client.get(self.url(doc_id)))?.send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json::<Document>().await?),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(doc_id)),
            status => Err(StoreError::Status { id: doc_id, status }),
        }
    }

    async fn update(&self, doc_id: DocumentId, content: &DocumentContent) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.put(self.url(doc_id)).json(content))?
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(doc_id)),
            status => Err(StoreError::Status { id: doc_id, status }),
        }
    }
}
