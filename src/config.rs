//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::translation::CommitMode;

/// Locales the translation pass targets, with the language name given to the model.
pub const DEFAULT_TARGET_LOCALES: &[(&str, &str)] = &[
    ("fr_FR", "French"),
    ("it_IT", "Italian"),
    ("es_ES", "Spanish"),
    ("en_GB", "British English"),
    ("el_GR", "Greek"),
];

/// Service configuration.
#[derive(Debug, Clone)]
pub struct TourlyConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// HTTP listen port.
    pub port: u16,
    /// Emails allowed to use the admin routes (lowercased).
    pub admin_emails: Vec<String>,
    /// Header the upstream auth proxy uses to pass the caller's email.
    pub identity_header: String,
    /// Translation provider settings. `None` disables the translate route.
    pub translation: Option<TranslationConfig>,
    /// How merged translations are written back.
    pub commit_mode: CommitMode,
    /// Target locales as `(code, language name)` pairs.
    pub target_locales: Vec<(String, String)>,
}

/// OpenAI-compatible provider settings.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

impl Default for TourlyConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/tourly.db"),
            port: 8080,
            admin_emails: Vec::new(),
            identity_header: "x-authenticated-email".to_string(),
            translation: None,
            commit_mode: CommitMode::PerStep,
            target_locales: DEFAULT_TARGET_LOCALES
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl TourlyConfig {
    /// Build the configuration from `TOURLY_*` and `OPENAI_API_KEY` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("TOURLY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(port) = lookup("TOURLY_PORT") {
            config.port = port.parse().map_err(|e| ConfigError::InvalidValue {
                key: "TOURLY_PORT".into(),
                message: format!("{e}"),
            })?;
        }

        if let Some(emails) = lookup("TOURLY_ADMIN_EMAILS") {
            config.admin_emails = emails
                .split(',')
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }

        if let Some(header) = lookup("TOURLY_IDENTITY_HEADER") {
            config.identity_header = header.trim().to_lowercase();
        }

        if let Some(mode) = lookup("TOURLY_TRANSLATION_COMMIT") {
            config.commit_mode = mode.parse().map_err(|message| ConfigError::InvalidValue {
                key: "TOURLY_TRANSLATION_COMMIT".into(),
                message,
            })?;
        }

        if let Some(locales) = lookup("TOURLY_TARGET_LOCALES") {
            config.target_locales = parse_locales(&locales)?;
        }

        let model = lookup("TOURLY_TRANSLATION_MODEL");
        let base_url = lookup("TOURLY_OPENAI_BASE_URL");
        config.translation = match lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            Some(key) => Some(TranslationConfig {
                api_key: SecretString::from(key),
                model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
                base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            }),
            // Provider settings without a key are a misconfiguration, not "disabled".
            None if model.is_some() || base_url.is_some() => {
                return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".into()));
            }
            None => None,
        };

        Ok(config)
    }

    /// Tracked locale codes, in configured order.
    pub fn locale_codes(&self) -> Vec<String> {
        self.target_locales.iter().map(|(code, _)| code.clone()).collect()
    }
}

/// Parse `fr_FR=French,de_DE=German`. A bare code doubles as its language name.
fn parse_locales(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let locales: Vec<(String, String)> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((code, name)) => (code.trim().to_string(), name.trim().to_string()),
            None => (entry.to_string(), entry.to_string()),
        })
        .collect();

    if locales.is_empty() || locales.iter().any(|(code, _)| code.is_empty()) {
        return Err(ConfigError::InvalidValue {
            key: "TOURLY_TARGET_LOCALES".into(),
            message: format!("expected 'code=Language,...', got '{raw}'"),
        });
    }
    Ok(locales)
}
