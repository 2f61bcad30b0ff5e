//! Error types for the menu-visualizer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractionError`]: **fatal** for the extraction step: no menu image,
//!   the vision service is not configured, or it could not be reached. The
//!   caller shows a message and a retry action.
//!
//! * [`ProviderError`]: **non-fatal**: one dish could not get an image. The
//!   enricher turns it into `image_load_error = true` on that dish and keeps
//!   going with the others.
//!
//! A reply that arrives but cannot be parsed is neither: the extractor
//! returns an empty [`crate::model::MenuExtractionResult`] instead, so callers
//! can tell "no dishes found" apart from "service unreachable".

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification shared by both error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Missing or placeholder credentials, invalid settings.
    Configuration,
    /// Network failure, timeout or non-success HTTP status.
    Transport,
    /// The service answered with something we could not interpret.
    MalformedResponse,
    /// A well-formed answer that simply contains nothing usable.
    NoResult,
}

/// All fatal errors returned by menu extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// `extract` was called without any menu image.
    #[error("No menu images supplied\nCapture or select at least one photo of the menu.")]
    EmptyInput,

    /// The first menu image could not be decoded or re-encoded.
    #[error("Menu image could not be encoded: {detail}")]
    InvalidImage { detail: String },

    // ── Service errors ────────────────────────────────────────────────────
    /// The API key is missing or still the placeholder value.
    #[error("Service '{service}' is not configured.\n{hint}")]
    NotConfigured { service: String, hint: String },

    /// The request never produced an HTTP response.
    #[error("Request to '{service}' failed: {detail}\nCheck your internet connection.")]
    Transport { service: String, detail: String },

    /// The request exceeded the configured timeout.
    #[error("Request to '{service}' timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    /// The service answered with a non-success status.
    #[error("Service '{service}' returned HTTP {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    /// The reply envelope itself was unusable.
    ///
    /// The extractor downgrades this to an empty result before it reaches
    /// callers; it is public so alternative backends can report it.
    #[error("Malformed reply: {detail}")]
    MalformedResponse { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation or credentials-file parsing failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExtractionError::NotConfigured { .. } | ExtractionError::InvalidConfig(_) => {
                ErrorCategory::Configuration
            }
            ExtractionError::MalformedResponse { .. } => ErrorCategory::MalformedResponse,
            ExtractionError::EmptyInput => ErrorCategory::NoResult,
            ExtractionError::Transport { .. }
            | ExtractionError::Timeout { .. }
            | ExtractionError::Api { .. }
            | ExtractionError::InvalidImage { .. }
            | ExtractionError::Internal(_) => ErrorCategory::Transport,
        }
    }
}

/// A non-fatal error for a single dish image.
///
/// Stored only transiently: the enricher logs it and flags the dish.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ProviderError {
    /// API key or search-engine id is missing or still the placeholder.
    #[error("{service} is not configured: {hint}")]
    NotConfigured { service: String, hint: String },

    /// Connection reset, DNS failure, body read error.
    #[error("{service} request failed: {detail}")]
    Transport { service: String, detail: String },

    /// The call took longer than the configured timeout.
    #[error("{service} request timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    /// Non-success HTTP status.
    #[error("{service} returned HTTP {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    /// The reply body did not have the expected structure.
    #[error("{service} reply could not be parsed: {detail}")]
    MalformedResponse { service: String, detail: String },

    /// The generation service answered with text but no image part.
    #[error("{service} replied with text only, no image")]
    TextOnlyReply { service: String },

    /// Downloaded or generated bytes are not a usable image.
    #[error("Invalid image data: {detail}")]
    InvalidImage { detail: String },

    /// Every allowed attempt failed with a retryable error.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ProviderError> },
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Server-side (5xx) failures, transport errors and timeouts are
    /// transient; missing credentials and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Transport { .. } | ProviderError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::NotConfigured { .. } => ErrorCategory::Configuration,
            ProviderError::Transport { .. }
            | ProviderError::Timeout { .. }
            | ProviderError::Api { .. } => ErrorCategory::Transport,
            ProviderError::MalformedResponse { .. } | ProviderError::InvalidImage { .. } => {
                ErrorCategory::MalformedResponse
            }
            ProviderError::TextOnlyReply { .. } => ErrorCategory::NoResult,
            ProviderError::RetriesExhausted { last, .. } => last.category(),
        }
    }
}

/// Map a `reqwest` failure onto [`ProviderError`], keeping timeouts distinct.
pub(crate) fn provider_transport(service: &str, secs: u64, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            service: service.to_string(),
            secs,
        }
    } else {
        ProviderError::Transport {
            service: service.to_string(),
            detail: e.to_string(),
        }
    }
}

/// Map a `reqwest` failure onto [`ExtractionError`], keeping timeouts distinct.
pub(crate) fn extraction_transport(service: &str, secs: u64, e: reqwest::Error) -> ExtractionError {
    if e.is_timeout() {
        ExtractionError::Timeout {
            service: service.to_string(),
            secs,
        }
    } else {
        ExtractionError::Transport {
            service: service.to_string(),
            detail: e.to_string(),
        }
    }
}

/// Map an `edgequake-llm` failure onto [`ExtractionError`].
///
/// Rejected or missing credentials are a configuration problem, not a
/// transport one.
pub(crate) fn extraction_llm_error(
    service: &str,
    secs: u64,
    e: edgequake_llm::LlmError,
) -> ExtractionError {
    use edgequake_llm::LlmError;
    match e {
        LlmError::AuthError(detail) | LlmError::ConfigError(detail) => {
            ExtractionError::NotConfigured {
                service: service.to_string(),
                hint: detail,
            }
        }
        LlmError::Timeout => ExtractionError::Timeout {
            service: service.to_string(),
            secs,
        },
        LlmError::RateLimited(message) => ExtractionError::Api {
            service: service.to_string(),
            status: 429,
            message,
        },
        other => ExtractionError::Transport {
            service: service.to_string(),
            detail: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::LlmError;

    #[test]
    fn llm_auth_failure_is_configuration() {
        let err = extraction_llm_error("openai", 60, LlmError::AuthError("invalid api key".into()));
        assert!(matches!(err, ExtractionError::NotConfigured { .. }));
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = extraction_llm_error("openai", 60, LlmError::ConfigError("OPENAI_API_KEY unset".into()));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn llm_network_failures_are_transport() {
        let err = extraction_llm_error("openai", 60, LlmError::Timeout);
        assert!(matches!(err, ExtractionError::Timeout { secs: 60, .. }));

        let err = extraction_llm_error("openai", 60, LlmError::NetworkError("reset".into()));
        assert!(matches!(err, ExtractionError::Transport { .. }));
        assert_eq!(err.category(), ErrorCategory::Transport);

        let err = extraction_llm_error("openai", 60, LlmError::RateLimited("slow down".into()));
        assert!(matches!(err, ExtractionError::Api { status: 429, .. }));
    }

    #[test]
    fn empty_input_display() {
        let msg = ExtractionError::EmptyInput.to_string();
        assert!(msg.contains("No menu images"), "got: {msg}");
    }

    #[test]
    fn server_errors_are_retryable() {
        let e = ProviderError::Api {
            service: "gemini".into(),
            status: 503,
            message: "overloaded".into(),
        };
        assert!(e.is_retryable());
        assert_eq!(e.category(), ErrorCategory::Transport);
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let e = ProviderError::Api {
            service: "gemini".into(),
            status: 400,
            message: "bad request".into(),
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn missing_credentials_fail_fast() {
        let e = ProviderError::NotConfigured {
            service: "gemini".into(),
            hint: "set GEMINI_API_KEY".into(),
        };
        assert!(!e.is_retryable());
        assert_eq!(e.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn exhausted_takes_category_of_last_error() {
        let e = ProviderError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ProviderError::Timeout {
                service: "gemini".into(),
                secs: 60,
            }),
        };
        assert_eq!(e.category(), ErrorCategory::Transport);
        assert!(e.to_string().contains("3 attempts"));
        // The wrapper itself is terminal.
        assert!(!e.is_retryable());
    }

    #[test]
    fn text_only_reply_is_no_result() {
        let e = ProviderError::TextOnlyReply {
            service: "gemini".into(),
        };
        assert_eq!(e.category(), ErrorCategory::NoResult);
    }

    #[test]
    fn extraction_categories() {
        assert_eq!(
            ExtractionError::NotConfigured {
                service: "gemini".into(),
                hint: String::new()
            }
            .category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            ExtractionError::Timeout {
                service: "gemini".into(),
                secs: 60
            }
            .category(),
            ErrorCategory::Transport
        );
    }
}
