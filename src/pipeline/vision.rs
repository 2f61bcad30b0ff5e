//! Vision-model backends: send one image plus an instruction, get text back.
//!
//! Two backends sit behind the [`VisionModel`] trait:
//!
//! * [`GeminiVision`] calls the Gemini `generateContent` REST endpoint
//!   directly, with the API key resolved by [`crate::credentials`].
//! * [`LlmProviderVision`] goes through any `edgequake-llm` provider, so
//!   OpenAI, Anthropic, Ollama and friends can read menus too.
//!
//! Neither retries. A failed extraction goes back to the user, who decides
//! whether to try again.

use crate::config::PipelineConfig;
use crate::credentials::ApiKey;
use crate::error::{extraction_llm_error, extraction_transport, ExtractionError};
use crate::pipeline::encode::EncodedImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A service that reads an image and answers an instruction in text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Short service name used in logs and errors.
    fn name(&self) -> &str;

    /// Ask about one image.
    ///
    /// `Ok(None)` means the service answered but the answer had no text.
    async fn describe(
        &self,
        image: &EncodedImage,
        instruction: &str,
    ) -> Result<Option<String>, ExtractionError>;
}

// ── Gemini REST backend ──────────────────────────────────────────────────

/// Direct Gemini `generateContent` client.
pub struct GeminiVision {
    client: reqwest::Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl GeminiVision {
    pub fn new(api_key: ApiKey, config: &PipelineConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.extraction_timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: config.gemini_base_url.clone(),
            model: config.extraction_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.extraction_timeout_secs,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Inline { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    pub inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseInlineData {
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

impl GenerateResponse {
    /// Parts of the first candidate, or an empty slice.
    pub(crate) fn first_parts(&self) -> &[ResponsePart] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Text of the first part, trimmed.
    pub(crate) fn first_text(&self) -> Option<String> {
        self.first_parts()
            .first()
            .and_then(|p| p.text.as_deref())
            .map(|t| t.trim().to_string())
    }
}

/// URL of a Gemini `generateContent` call.
pub(crate) fn generate_content_url(base_url: &str, model: &str) -> String {
    format!("{}/models/{}:generateContent", base_url, model)
}

#[async_trait]
impl VisionModel for GeminiVision {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn describe(
        &self,
        image: &EncodedImage,
        instruction: &str,
    ) -> Result<Option<String>, ExtractionError> {
        let key = self.api_key.require_for_extraction(self.name())?;

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: &image.mime_type,
                            data: &image.data,
                        },
                    },
                    RequestPart::Text { text: instruction },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_k: 1,
                top_p: 1.0,
                max_output_tokens: self.max_tokens,
            },
        };

        debug!(
            model = %self.model,
            bytes = image.approx_bytes(),
            "Sending menu image to Gemini"
        );
        let start = Instant::now();

        let response = self
            .client
            .post(generate_content_url(&self.base_url, &self.model))
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| extraction_transport(self.name(), self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                service: self.name().to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| extraction_transport(self.name(), self.timeout_secs, e))?;
        debug!("Gemini replied in {:?}", start.elapsed());

        let parsed: GenerateResponse = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                return Err(ExtractionError::MalformedResponse {
                    detail: format!("Gemini envelope: {e}"),
                })
            }
        };

        if let Some(err) = parsed.error {
            return Err(ExtractionError::Api {
                service: self.name().to_string(),
                status: err.code.unwrap_or(status.as_u16()),
                message: err.message.unwrap_or_else(|| "Unknown API error".to_string()),
            });
        }

        Ok(parsed.first_text())
    }
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// Extraction through an `edgequake-llm` provider.
pub struct LlmProviderVision {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl LlmProviderVision {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.extraction_timeout_secs,
        }
    }

    /// Resolve the provider from the config, from most to least specific:
    /// pre-built provider, named provider, then
    /// `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, then auto-detection.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ExtractionError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VisionModel for LlmProviderVision {
    fn name(&self) -> &str {
        "llm-provider"
    }

    async fn describe(
        &self,
        image: &EncodedImage,
        instruction: &str,
    ) -> Result<Option<String>, ExtractionError> {
        let image_data = ImageData::new(image.data.clone(), image.mime_type.as_str()).with_detail("high");
        let messages = vec![ChatMessage::user_with_images(instruction, vec![image_data])];
        let options = self.build_options();

        let call = self.provider.chat(&messages, Some(&options));
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| ExtractionError::Timeout {
                service: self.name().to_string(),
                secs: self.timeout_secs,
            })?
            .map_err(|e| extraction_llm_error(self.name(), self.timeout_secs, e))?;

        debug!(
            "LLM provider: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        let text = response.content.trim().to_string();
        Ok(if text.is_empty() { None } else { Some(text) })
    }
}

fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, ExtractionError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config
        .model
        .as_deref()
        .unwrap_or(config.extraction_model.as_str());

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractionError::NotConfigured {
            service: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or GEMINI_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractionError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractionError::NotConfigured {
            service: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialStore, GEMINI_API_KEY};

    #[test]
    fn request_serialises_to_gemini_shape() {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: "AAAA",
                        },
                    },
                    RequestPart::Text { text: "read it" },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                top_k: 1,
                top_p: 1.0,
                max_output_tokens: 2048,
            },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["inline_data"]["mime_type"], "image/png");
        assert_eq!(v["contents"][0]["parts"][1]["text"], "read it");
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(v["generationConfig"]["topK"], 1);
    }

    #[test]
    fn first_text_of_reply() {
        let r: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  {\"dishes\":[]}\n"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(r.first_text().as_deref(), Some("{\"dishes\":[]}"));
    }

    #[test]
    fn reply_without_candidates_has_no_text() {
        let r: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(r.first_text().is_none());
        assert!(r.first_parts().is_empty());
    }

    #[test]
    fn url_shape() {
        assert_eq!(
            generate_content_url("https://host/v1beta", "gemini-2.5-flash"),
            "https://host/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn placeholder_key_fails_before_network() {
        let config = PipelineConfig::builder()
            // Unroutable: a request attempt would surface as Transport, not NotConfigured.
            .gemini_base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let key = CredentialStore::default().resolve(GEMINI_API_KEY);
        let vision = GeminiVision::new(key, &config).unwrap();
        let image = EncodedImage {
            data: "AAAA".into(),
            mime_type: "image/png".into(),
        };
        let err = vision.describe(&image, "read").await.unwrap_err();
        assert!(matches!(err, ExtractionError::NotConfigured { .. }), "got {err:?}");
    }
}
