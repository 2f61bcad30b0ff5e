//! API-key resolution.
//!
//! Every external service needs a key, looked up in this order:
//!
//! 1. a non-empty environment variable,
//! 2. a non-empty entry in a flat TOML credentials file,
//! 3. a placeholder value.
//!
//! A placeholder is never sent over the wire: [`ApiKey::require`] turns it
//! into a configuration error before any request is built, so a missing key
//! shows up as "not configured" rather than as an opaque HTTP 400.
//!
//! ```toml
//! # menuviz.toml
//! GEMINI_API_KEY = "AIza..."
//! GOOGLE_CUSTOM_SEARCH_API_KEY = "AIza..."
//! GOOGLE_CUSTOM_SEARCH_ENGINE_ID = "0123456789abcdef"
//! ```

use crate::error::ExtractionError;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an alternative credentials file.
pub const CONFIG_PATH_ENV: &str = "MENUVIZ_CONFIG";

/// Credentials file looked up in the working directory by default.
pub const DEFAULT_CONFIG_FILE: &str = "menuviz.toml";

/// A credential the pipeline knows how to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialKey {
    /// Environment variable and file entry name.
    pub name: &'static str,
    /// Value that means "never configured".
    pub placeholder: &'static str,
}

/// Gemini key, used for extraction and image generation.
pub const GEMINI_API_KEY: CredentialKey = CredentialKey {
    name: "GEMINI_API_KEY",
    placeholder: "YOUR_GEMINI_API_KEY",
};

/// Google Custom Search key, used by the search strategy.
pub const SEARCH_API_KEY: CredentialKey = CredentialKey {
    name: "GOOGLE_CUSTOM_SEARCH_API_KEY",
    placeholder: "YOUR_API_KEY",
};

/// Google Custom Search engine id (`cx`).
pub const SEARCH_ENGINE_ID: CredentialKey = CredentialKey {
    name: "GOOGLE_CUSTOM_SEARCH_ENGINE_ID",
    placeholder: "YOUR_SEARCH_ENGINE_ID",
};

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    ConfigFile,
    Placeholder,
}

/// A resolved key. The value is redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    key: CredentialKey,
    value: String,
    source: CredentialSource,
}

impl ApiKey {
    /// A key supplied directly by the caller, bypassing lookup.
    pub fn explicit(key: CredentialKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            source: CredentialSource::Environment,
        }
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn is_configured(&self) -> bool {
        self.source != CredentialSource::Placeholder
            && !self.value.trim().is_empty()
            && self.value != self.key.placeholder
    }

    /// The key value, or a hint explaining how to configure it.
    pub fn require(&self) -> Result<&str, String> {
        if self.is_configured() {
            Ok(&self.value)
        } else {
            Err(format!(
                "Set {} in the environment or in {}.",
                self.key.name, DEFAULT_CONFIG_FILE
            ))
        }
    }

    /// Same as [`ApiKey::require`], mapped onto an extraction error.
    pub fn require_for_extraction(&self, service: &str) -> Result<&str, ExtractionError> {
        self.require().map_err(|hint| ExtractionError::NotConfigured {
            service: service.to_string(),
            hint,
        })
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("name", &self.key.name)
            .field("value", &redact(&self.value))
            .field("source", &self.source)
            .finish()
    }
}

/// Keep a short prefix so two keys can be told apart in logs.
fn redact(value: &str) -> String {
    if value.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}***", value.chars().take(4).collect::<String>())
    }
}

/// Key lookup over a snapshot of the environment and the credentials file.
#[derive(Clone, Default)]
pub struct CredentialStore {
    env: HashMap<String, String>,
    file: HashMap<String, String>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("file_entries", &self.file.len())
            .finish()
    }
}

impl CredentialStore {
    /// Load the process environment and the credentials file.
    ///
    /// `path` wins over `MENUVIZ_CONFIG`, which wins over `./menuviz.toml`.
    /// A missing file contributes no entries; an unreadable or malformed one
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ExtractionError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env.get(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let file = read_credentials_file(&path)?;
        Ok(Self { env, file })
    }

    /// Build a store from explicit maps (useful for testing).
    pub fn with_sources(env: HashMap<String, String>, file: HashMap<String, String>) -> Self {
        Self { env, file }
    }

    pub fn resolve(&self, key: CredentialKey) -> ApiKey {
        let non_empty = |m: &HashMap<String, String>| {
            m.get(key.name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = non_empty(&self.env) {
            return ApiKey {
                key,
                value,
                source: CredentialSource::Environment,
            };
        }
        if let Some(value) = non_empty(&self.file) {
            return ApiKey {
                key,
                value,
                source: CredentialSource::ConfigFile,
            };
        }
        ApiKey {
            key,
            value: key.placeholder.to_string(),
            source: CredentialSource::Placeholder,
        }
    }
}

fn read_credentials_file(path: &Path) -> Result<HashMap<String, String>, ExtractionError> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No credentials file at {}", path.display());
            return Ok(HashMap::new());
        }
        Err(e) => {
            return Err(ExtractionError::InvalidConfig(format!(
                "cannot read {}: {e}",
                path.display()
            )))
        }
    };

    let table: toml::Table = text.parse().map_err(|e| {
        ExtractionError::InvalidConfig(format!("{} is not valid TOML: {e}", path.display()))
    })?;

    let entries: HashMap<String, String> = table
        .into_iter()
        .filter_map(|(k, v)| match v {
            toml::Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect();
    debug!(
        "Loaded {} credential entries from {}",
        entries.len(),
        path.display()
    );
    Ok(entries)
}
