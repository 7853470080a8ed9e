//! REST client for the image-generation endpoint.
//!
//! Sends `POST {api_url}/generate` with the prompt and pixel dimensions and
//! accepts either a raw `image/*` body or a JSON body carrying base64 data.
//! HTTP failures are classified into [`GenerationError::Retryable`] and
//! [`GenerationError::Fatal`] so the pipeline's retry loop can decide.

use adgen_core::services::{
    GenerationError, GenerationRequest, ImageGenerationService, ImagePayload,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Longest response body excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for a single generation endpoint.
pub struct HttpImageGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// JSON success body. Accepts both `image` and `b64_json` keys.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(alias = "b64_json")]
    image: String,
}

impl HttpImageGenerator {
    /// Create a client for `api_url`, e.g. `https://images.example.com/v1`.
    pub fn new(api_url: String, api_key: Option<String>, model: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, api_key, model)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: String,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    // ---- private helpers ----

    async fn read_payload(response: reqwest::Response) -> Result<ImagePayload, GenerationError> {
        let is_image = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("image/"));

        let body = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Retryable(format!("reading response body: {e}")))?;

        if is_image {
            return Ok(ImagePayload::Bytes(body.to_vec()));
        }
        parse_json_payload(&body)
    }
}

#[async_trait]
impl ImageGenerationService for HttpImageGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<ImagePayload, GenerationError> {
        let body = GenerateBody {
            prompt: &request.prompt,
            width: request.width,
            height: request.height,
            model: self.model.as_deref(),
        };

        let mut builder = self
            .client
            .post(format!("{}/generate", self.api_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(status = status.as_u16(), "Generation request rejected");
            return Err(classify_status(status.as_u16(), &text));
        }

        Self::read_payload(response).await
    }
}

/// Map a non-2xx status to a generation error.
///
/// Request timeout, rate limiting, and server faults are retryable; every
/// other client error is fatal.
pub fn classify_status(status: u16, body: &str) -> GenerationError {
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("generation API returned {status}: {excerpt}");
    match status {
        408 | 429 | 500..=599 => GenerationError::Retryable(message),
        _ => GenerationError::Fatal(message),
    }
}

/// Transport failures are retryable unless the request could not be built.
fn classify_transport(e: reqwest::Error) -> GenerationError {
    if e.is_builder() {
        GenerationError::Fatal(format!("invalid generation request: {e}"))
    } else {
        GenerationError::Retryable(format!("generation request failed: {e}"))
    }
}

/// Parse a JSON success body into a base64 payload.
///
/// A 2xx body without image data means the backend misbehaved; treated as
/// retryable.
pub fn parse_json_payload(body: &[u8]) -> Result<ImagePayload, GenerationError> {
    serde_json::from_slice::<GenerateResponse>(body)
        .map(|r| ImagePayload::Base64(r.image))
        .map_err(|e| GenerationError::Retryable(format!("unexpected generation response: {e}")))
}
