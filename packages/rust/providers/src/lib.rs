//! HTTP clients for the hosted services the pipeline delegates to.
//!
//! - [`SerperSearch`]: web search via the Serper API ([`WebSearch`])
//! - [`OpenAiChat`]: chat completions ([`TextGenerator`])
//! - [`OpenAiEmbeddings`]: text embeddings ([`TextEmbedder`])
//!
//! [`WebSearch`]: researchflow_shared::WebSearch
//! [`TextGenerator`]: researchflow_shared::TextGenerator
//! [`TextEmbedder`]: researchflow_shared::TextEmbedder

mod openai;
mod serper;

use std::time::Duration;

use reqwest::{Client, Response};

use researchflow_shared::{ResearchFlowError, Result};

pub use openai::{OpenAiChat, OpenAiEmbeddings};
pub use serper::SerperSearch;

/// User-Agent string for outgoing requests.
const USER_AGENT: &str = concat!("ResearchFlow/", env!("CARGO_PKG_VERSION"));

/// Default request timeout. Generation calls can be slow.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Longest error body excerpt carried into an error message.
const MAX_ERROR_EXCERPT: usize = 300;

/// Build a reqwest client with appropriate settings.
fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| ResearchFlowError::Network(format!("failed to build HTTP client: {e}")))
}

/// Read an API key from the named environment variable.
fn api_key_from_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ResearchFlowError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Join a base URL and an endpoint path without doubling slashes.
fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-success response into a provider error with a body excerpt.
async fn error_for_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(MAX_ERROR_EXCERPT).collect();
    Err(ResearchFlowError::Provider(format!(
        "{url}: HTTP {status}: {excerpt}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "/embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
        assert_eq!(endpoint("http://localhost:9000", "search"), "http://localhost:9000/search");
    }

    #[test]
    fn missing_key_is_config_error() {
        let err = api_key_from_env("RF_TEST_NONEXISTENT_PROVIDER_KEY_999").unwrap_err();
        assert!(err.to_string().contains("RF_TEST_NONEXISTENT_PROVIDER_KEY_999"));
    }
}
