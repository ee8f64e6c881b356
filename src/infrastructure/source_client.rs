use crate::domain::models::SourceDescriptor;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Fetches the raw schedule document from an external endpoint.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch_document(&self, source: &SourceDescriptor) -> Result<String, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestSourceClient {
    client: Client,
}

impl ReqwestSourceClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl SourceClient for ReqwestSourceClient {
    async fn fetch_document(&self, source: &SourceDescriptor) -> Result<String, InfraError> {
        let url = Url::parse(&source.url).map_err(|error| {
            InfraError::InvalidConfig(format!("source '{}' has invalid url: {error}", source.id))
        })?;

        let response = self.client.get(url).send().await.map_err(|error| {
            InfraError::Network(format!(
                "network error while fetching source '{}': {error}",
                source.id
            ))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!(
                "failed reading document from source '{}': {error}",
                source.id
            ))
        })?;

        if !status.is_success() {
            return Err(InfraError::Network(format!(
                "source '{}' returned http {}",
                source.id,
                status.as_u16()
            )));
        }
        Ok(body)
    }
}
