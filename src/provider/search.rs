//! Image search strategy: Google Custom Search, then download.
//!
//! The search asks for a few medium-size photos and the candidates are
//! fetched in result order; the first response that is HTTP 200 with an
//! `image/*` content type wins. Search is not retried: a dish that finds
//! nothing is flagged and can be retried by hand.

use crate::config::PipelineConfig;
use crate::credentials::ApiKey;
use crate::error::{provider_transport, ExtractionError, ProviderError};
use crate::model::Image;
use crate::prompts::search_query;
use crate::provider::{validate_image, DishImageProvider};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "image-search";

/// Finds an existing photo of the dish on the web.
pub struct SearchImageProvider {
    client: reqwest::Client,
    api_key: ApiKey,
    engine_id: ApiKey,
    search_url: String,
    results: u8,
    search_timeout: Duration,
    download_timeout: Duration,
}

impl SearchImageProvider {
    pub fn new(
        api_key: ApiKey,
        engine_id: ApiKey,
        config: &PipelineConfig,
    ) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExtractionError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            engine_id,
            search_url: config.search_url.clone(),
            results: config.search_results,
            search_timeout: Duration::from_secs(config.search_timeout_secs),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
        })
    }

    /// Candidate image URLs for `query`, best first.
    async fn search(&self, key: &str, cx: &str, query: &str) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&search_params(key, cx, query, self.results))
            .timeout(self.search_timeout)
            .send()
            .await
            .map_err(|e| provider_transport(SERVICE, self.search_timeout.as_secs(), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| provider_transport(SERVICE, self.search_timeout.as_secs(), e))?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                message: body,
            });
        }
        parse_search_links(&body)
    }

    async fn download(&self, url: &str) -> Result<Image, ProviderError> {
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| provider_transport(SERVICE, self.download_timeout.as_secs(), e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProviderError::Api {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                message: format!("download of {url} failed"),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !is_image_content_type(content_type.as_deref()) {
            return Err(ProviderError::InvalidImage {
                detail: format!(
                    "{url} has content type {}",
                    content_type.as_deref().unwrap_or("<none>")
                ),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| provider_transport(SERVICE, self.download_timeout.as_secs(), e))?;
        validate_image(bytes.to_vec(), content_type.as_deref())
    }
}

#[async_trait]
impl DishImageProvider for SearchImageProvider {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn provide_image(
        &self,
        dish_name: &str,
        restaurant_name: Option<&str>,
    ) -> Result<Option<Image>, ProviderError> {
        let not_configured = |hint| ProviderError::NotConfigured {
            service: SERVICE.to_string(),
            hint,
        };
        let key = self.api_key.require().map_err(not_configured)?;
        let cx = self.engine_id.require().map_err(not_configured)?;

        let query = search_query(dish_name, restaurant_name);
        debug!(%query, "Searching dish image");
        let links = self.search(key, cx, &query).await?;
        if links.is_empty() {
            info!("No image results for \"{}\"", dish_name);
            return Ok(None);
        }

        for (i, link) in links.iter().enumerate() {
            match self.download(link).await {
                Ok(image) => {
                    debug!(
                        "\"{}\": candidate {} accepted ({} bytes)",
                        dish_name,
                        i + 1,
                        image.len()
                    );
                    return Ok(Some(image));
                }
                Err(e) => debug!("\"{}\": candidate {} rejected: {}", dish_name, i + 1, e),
            }
        }

        info!(
            "None of {} candidates for \"{}\" could be downloaded",
            links.len(),
            dish_name
        );
        Ok(None)
    }
}

/// Query parameters of a Custom Search image request.
pub(crate) fn search_params(key: &str, cx: &str, query: &str, num: u8) -> Vec<(&'static str, String)> {
    vec![
        ("key", key.to_string()),
        ("cx", cx.to_string()),
        ("q", query.to_string()),
        ("searchType", "image".to_string()),
        ("num", num.to_string()),
        ("imgSize", "medium".to_string()),
        ("imgType", "photo".to_string()),
        ("safe", "active".to_string()),
    ]
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    #[serde(default)]
    error: Option<SearchErrorBody>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

/// Candidate links from a Custom Search reply, in result order.
///
/// A reply without `items` is a legitimate "no results".
pub(crate) fn parse_search_links(body: &str) -> Result<Vec<String>, ProviderError> {
    let parsed: SearchResponse =
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

    Ok(parsed
        .items
        .into_iter()
        .filter_map(|i| i.link)
        .filter(|l| l.starts_with("http://") || l.starts_with("https://"))
        .collect())
}

/// Whether a `Content-Type` header value names an image.
pub(crate) fn is_image_content_type(value: Option<&str>) -> bool {
    value
        .map(|v| v.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialStore, SEARCH_API_KEY, SEARCH_ENGINE_ID};

    #[test]
    fn params_request_medium_safe_photos() {
        let params = search_params("k", "cx1", "dish: Pho food dish meal", 3);
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("searchType"), Some("image"));
        assert_eq!(get("num"), Some("3"));
        assert_eq!(get("imgSize"), Some("medium"));
        assert_eq!(get("imgType"), Some("photo"));
        assert_eq!(get("safe"), Some("active"));
        assert_eq!(get("q"), Some("dish: Pho food dish meal"));
    }

    #[test]
    fn links_in_result_order() {
        let body = r#"{"items":[
            {"link":"https://a.example/1.jpg"},
            {"title":"no link"},
            {"link":"ftp://b.example/2.jpg"},
            {"link":"http://c.example/3.png"}
        ]}"#;
        assert_eq!(
            parse_search_links(body).unwrap(),
            vec!["https://a.example/1.jpg", "http://c.example/3.png"]
        );
    }

    #[test]
    fn missing_items_is_no_results() {
        let body = r#"{"searchInformation":{"totalResults":"0"}}"#;
        assert!(parse_search_links(body).unwrap().is_empty());
    }

    #[test]
    fn error_envelope_is_api_error() {
        let body = r#"{"error":{"code":403,"message":"Daily limit exceeded"}}"#;
        match parse_search_links(body) {
            Err(ProviderError::Api {
                status, message, ..
            }) => {
                assert_eq!(status, 403);
                assert!(message.contains("Daily limit"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_search_links("<html>"),
            Err(ProviderError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn content_type_check() {
        assert!(is_image_content_type(Some("image/jpeg")));
        assert!(is_image_content_type(Some("Image/PNG; q=1")));
        assert!(!is_image_content_type(Some("text/html; charset=utf-8")));
        assert!(!is_image_content_type(None));
    }

    #[tokio::test]
    async fn placeholder_credentials_fail_before_network() {
        let config = PipelineConfig::builder()
            .search_url("http://127.0.0.1:9/customsearch")
            .build()
            .unwrap();
        let store = CredentialStore::default();
        let provider = SearchImageProvider::new(
            store.resolve(SEARCH_API_KEY),
            store.resolve(SEARCH_ENGINE_ID),
            &config,
        )
        .unwrap();
        let err = provider.provide_image("Pho", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured { .. }), "got {err:?}");
    }
}
