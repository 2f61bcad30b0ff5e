//! Image generation strategy: Gemini synthesises a picture of the dish.
//!
//! The request asks for both image and text modalities; the first reply part
//! carrying inline base64 data becomes the dish image. Server errors and
//! transport failures are retried with [`crate::retry::retry_with_backoff`];
//! a missing key or a 4xx answer fails on the first attempt.

use crate::config::PipelineConfig;
use crate::credentials::ApiKey;
use crate::error::{provider_transport, ExtractionError, ProviderError};
use crate::model::Image;
use crate::pipeline::vision::{generate_content_url, GenerateResponse};
use crate::prompts::generation_prompt;
use crate::provider::{validate_image, DishImageProvider};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

const SERVICE: &str = "gemini-image";

/// Generates a representative dish picture with Gemini.
pub struct GenerationImageProvider {
    client: reqwest::Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
    timeout_secs: u64,
    retry: RetryPolicy,
    text_only_is_error: bool,
}

impl GenerationImageProvider {
    pub fn new(api_key: ApiKey, config: &PipelineConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.generation_timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: config.gemini_base_url.clone(),
            model: config.generation_model.clone(),
            timeout_secs: config.generation_timeout_secs,
            retry: config.retry.clone(),
            text_only_is_error: config.text_only_is_error,
        })
    }

    async fn generate_once(
        &self,
        key: &str,
        body: &GenerationRequest<'_>,
        attempt: u32,
    ) -> Result<Option<Image>, ProviderError> {
        let start = Instant::now();
        let response = self
            .client
            .post(generate_content_url(&self.base_url, &self.model))
            .query(&[("key", key)])
            .json(body)
            .send()
            .await
            .map_err(|e| provider_transport(SERVICE, self.timeout_secs, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| provider_transport(SERVICE, self.timeout_secs, e))?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                message: text,
            });
        }

        debug!(attempt, "Generation reply in {:?}", start.elapsed());
        parse_generation_reply(&text, self.text_only_is_error)
    }
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    contents: Vec<TextContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: ImageGenerationConfig,
}

#[derive(Serialize)]
struct TextContent<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageGenerationConfig {
    response_modalities: [&'static str; 2],
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: usize,
}

impl<'a> GenerationRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            contents: vec![TextContent {
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: ImageGenerationConfig {
                response_modalities: ["IMAGE", "TEXT"],
                temperature: 0.7,
                top_k: 1,
                top_p: 0.9,
                max_output_tokens: 2048,
            },
        }
    }
}

#[async_trait]
impl DishImageProvider for GenerationImageProvider {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn provide_image(
        &self,
        dish_name: &str,
        restaurant_name: Option<&str>,
    ) -> Result<Option<Image>, ProviderError> {
        let key = self
            .api_key
            .require()
            .map_err(|hint| ProviderError::NotConfigured {
                service: SERVICE.to_string(),
                hint,
            })?;

        let prompt = generation_prompt(dish_name, restaurant_name);
        let body = GenerationRequest::new(&prompt);
        let label = format!("generate \"{}\"", dish_name);

        retry_with_backoff(&self.retry, &label, |attempt| {
            self.generate_once(key, &body, attempt)
        })
        .await
    }
}

/// Pull the generated image out of a `generateContent` reply.
///
/// The first part with inline data wins. A reply that only has text is
/// [`ProviderError::TextOnlyReply`] or `Ok(None)`, depending on
/// `text_only_is_error`.
pub(crate) fn parse_generation_reply(
    body: &str,
    text_only_is_error: bool,
) -> Result<Option<Image>, ProviderError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
            service: SERVICE.to_string(),
            detail: e.to_string(),
        })?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Api {
            service: SERVICE.to_string(),
            status: err.code.unwrap_or(0),
            message: err.message.unwrap_or_else(|| "Unknown API error".to_string()),
        });
    }

    let parts = parsed.first_parts();
    if parts.is_empty() {
        return Err(ProviderError::MalformedResponse {
            service: SERVICE.to_string(),
            detail: "no candidates in reply".into(),
        });
    }

    if let Some(inline) = parts.iter().find_map(|p| p.inline_data.as_ref()) {
        let bytes = STANDARD
            .decode(inline.data.trim())
            .map_err(|e| ProviderError::InvalidImage {
                detail: format!("inline data is not base64: {e}"),
            })?;
        return validate_image(bytes, inline.mime_type.as_deref()).map(Some);
    }

    if let Some(text) = parts.iter().find_map(|p| p.text.as_deref()) {
        debug!("Generation replied with text only: {}", text.trim());
    }
    if text_only_is_error {
        Err(ProviderError::TextOnlyReply {
            service: SERVICE.to_string(),
        })
    } else {
        Ok(None)
    }
}
