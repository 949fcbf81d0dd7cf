//! Translation provider trait and the OpenAI-compatible implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::config::TranslationConfig;
use crate::error::TranslationError;
use crate::tours::model::{LocalizedText, TranslationMap};

/// One prompt for the provider.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub system: String,
    pub prompt: String,
}

/// The provider's answer: proposed translations per step.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TranslationBatch {
    pub steps: Vec<StepTranslation>,
}

/// Proposed translations for one step. `id` is echoed back by the model
/// and is not trusted to be a valid step id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepTranslation {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub translations: TranslationMap,
}

/// `null` locale entries are dropped instead of failing the whole batch.
fn lenient_map<'de, D>(deserializer: D) -> Result<TranslationMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<LocalizedText>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(locale, text)| text.map(|t| (locale, t)))
        .collect())
}

/// Produces translation proposals. Implementations never retry.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationBatch, TranslationError>;
}

/// Chat-completions client for OpenAI and compatible endpoints.
pub struct OpenAiTranslator {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiTranslator {
    pub fn new(config: &TranslationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl TranslationProvider for OpenAiTranslator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationBatch, TranslationError> {
        let body = serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });

        debug!(model = %self.model, "Requesting translations");
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::RequestFailed {
                status: "transport".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let reason = resp.text().await.unwrap_or_default();
            warn!(status = %status, "Translation provider returned an error");
            return Err(TranslationError::RequestFailed {
                status: status.to_string(),
                reason,
            });
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TranslationError::InvalidResponse(format!("body is not JSON: {e}")))?;
        parse_completion(&payload)
    }
}

/// Pull the batch out of a chat-completions response body.
pub fn parse_completion(payload: &serde_json::Value) -> Result<TranslationBatch, TranslationError> {
    let content = payload
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            TranslationError::InvalidResponse("missing choices[0].message.content".into())
        })?;

    serde_json::from_str(content)
        .map_err(|e| TranslationError::InvalidResponse(format!("content is not a translation batch: {e}")))
}
