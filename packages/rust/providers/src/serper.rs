//! Serper (google.serper.dev) web search client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use researchflow_shared::{AppConfig, ResearchFlowError, Result, SourceRecord, WebSearch};

use crate::{api_key_from_env, build_client, endpoint, error_for_status};

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

/// [`WebSearch`] backed by the Serper API.
pub struct SerperSearch {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SerperSearch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Build from the `[serper]` config section, reading the key from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.serper.api_key_env)?;
        Self::new(config.serper.base_url.clone(), api_key)
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SourceRecord>> {
        let url = endpoint(&self.base_url, "search");

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&SearchRequest {
                q: query,
                num: num_results,
            })
            .send()
            .await
            .map_err(|e| ResearchFlowError::Network(format!("{url}: {e}")))?;

        let response = error_for_status(&url, response).await?;

        let body: SearchResponse = response.json().await.map_err(|e| {
            ResearchFlowError::Provider(format!("{url}: invalid search response: {e}"))
        })?;

        let records: Vec<SourceRecord> = body
            .organic
            .into_iter()
            .take(num_results)
            .map(|hit| SourceRecord {
                title: hit.title,
                link: hit.link,
                snippet: hit.snippet,
                key_points: Vec::new(),
            })
            .collect();

        debug!(results = records.len(), "search complete");
        Ok(records)
    }
}
