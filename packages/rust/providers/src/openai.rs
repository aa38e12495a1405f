//! OpenAI-compatible chat completion and embedding clients.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use researchflow_shared::{
    AppConfig, GenerationRequest, ResearchFlowError, Result, TextEmbedder, TextGenerator,
};

use crate::{api_key_from_env, build_client, endpoint, error_for_status};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// [`TextGenerator`] backed by `/chat/completions`.
pub struct OpenAiChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    /// Build from the `[openai]` config section, reading the key from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.openai.api_key_env)?;
        Self::new(
            config.openai.base_url.clone(),
            api_key,
            config.openai.chat_model.clone(),
            config.openai.temperature,
        )
    }
}

#[async_trait]
impl TextGenerator for OpenAiChat {
    #[instrument(skip_all, fields(model = %self.model, json = request.json_mode))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = endpoint(&self.base_url, "chat/completions");

        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResearchFlowError::Network(format!("{url}: {e}")))?;

        let response = error_for_status(&url, response).await?;

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ResearchFlowError::Provider(format!("{url}: invalid chat response: {e}"))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ResearchFlowError::Provider(format!("{url}: reply had no content")))?;

        debug!(chars = text.len(), "generation complete");
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// [`TextEmbedder`] backed by `/embeddings`.
pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from the `[openai]` config section, reading the key from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.openai.api_key_env)?;
        Self::new(
            config.openai.base_url.clone(),
            api_key,
            config.openai.embedding_model.clone(),
        )
    }
}

#[async_trait]
impl TextEmbedder for OpenAiEmbeddings {
    #[instrument(skip_all, fields(model = %self.model, inputs = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = endpoint(&self.base_url, "embeddings");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| ResearchFlowError::Network(format!("{url}: {e}")))?;

        let response = error_for_status(&url, response).await?;

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            ResearchFlowError::Provider(format!("{url}: invalid embedding response: {e}"))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(ResearchFlowError::Provider(format!(
                "{url}: asked for {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // The API may answer out of order; `index` is authoritative.
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn chat_returns_first_choice_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"blog\": \"hi\"}"}}]
            })))
            .mount(&server)
            .await;

        let chat = OpenAiChat::new(server.uri(), "sk-test", "gpt-4o-mini", 0.9).unwrap();
        let reply = chat
            .generate(&GenerationRequest::new("You write.", "Write.").json())
            .await
            .unwrap();
        assert_eq!(reply, "{\"blog\": \"hi\"}");
    }

    #[tokio::test]
    async fn chat_without_choices_is_provider_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let chat = OpenAiChat::new(server.uri(), "sk-test", "m", 0.0).unwrap();
        let err = chat
            .generate(&GenerationRequest::new("s", "p"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no content"));
    }

    #[tokio::test]
    async fn chat_rate_limit_surfaces_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let chat = OpenAiChat::new(server.uri(), "sk-test", "m", 0.0).unwrap();
        let err = chat
            .generate(&GenerationRequest::new("s", "p"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn embeddings_are_reordered_by_index() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["first", "second"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                    {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let embedder =
            OpenAiEmbeddings::new(server.uri(), "sk-test", "text-embedding-3-small").unwrap();
        let vectors = embedder
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embeddings_count_mismatch_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0]}]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbeddings::new(server.uri(), "sk-test", "m").unwrap();
        let err = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("asked for 2 embeddings, got 1"));
    }

    #[tokio::test]
    async fn empty_embedding_input_makes_no_request() {
        // No mock mounted: any request would 404 and fail the call.
        let server = MockServer::start().await;
        let embedder = OpenAiEmbeddings::new(server.uri(), "sk-test", "m").unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
