//! Prompt construction for the translation provider.

use serde::Serialize;

use super::TranslationMode;
use crate::error::{Error, Result, TranslationError};
use crate::tours::model::{Step, TranslationMap};

pub const SYSTEM_PROMPT: &str = "You are a helpful localization assistant.";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptStep<'a> {
    id: String,
    title: &'a str,
    content: &'a str,
    current_translations: &'a TranslationMap,
}

fn mode_instruction(mode: TranslationMode) -> &'static str {
    match mode {
        TranslationMode::FillMissing => {
            "Only provide translations for locales/fields that are currently missing in 'currentTranslations'."
        }
        TranslationMode::OverrideAll => {
            "Provide fresh translations for ALL requested locales, completely overriding any existing ones."
        }
    }
}

fn prompt_error(e: serde_json::Error) -> Error {
    Error::Upstream(TranslationError::Prompt(e.to_string()))
}

/// Build the user prompt asking for every step in every target locale.
pub fn build_prompt(
    steps: &[Step],
    mode: TranslationMode,
    locales: &[(String, String)],
) -> Result<String> {
    let targets = locales
        .iter()
        .map(|(code, language)| format!("{code} ({language})"))
        .collect::<Vec<_>>()
        .join(", ");

    let tasks: Vec<PromptStep<'_>> = steps
        .iter()
        .map(|s| PromptStep {
            id: s.id.to_string(),
            title: &s.title,
            content: &s.content,
            current_translations: &s.translations,
        })
        .collect();
    let input = serde_json::to_string_pretty(&tasks).map_err(prompt_error)?;

    let example_locale = locales.first().map_or("fr_FR", |(code, _)| code.as_str());

    Ok(format!(
        r#"Translate the following onboarding tour steps into these target locales: {targets}.

Mode: {instruction}

IMPORTANT: You must return strictly valid JSON matching this exact structure:
{{
  "steps": [
    {{
      "id": "step-id",
      "translations": {{
        "{example_locale}": {{ "title": "translated title", "content": "translated content" }}
      }}
    }}
  ]
}}

Input Steps:
{input}
"#,
        instruction = mode_instruction(mode),
    ))
}
