//! Merge engine — reconciles provider proposals with stored translation maps.
//!
//! Pure: nothing here touches the store. The caller persists the outcome.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use super::TranslationMode;
use super::provider::StepTranslation;
use crate::tours::model::{LocalizedText, Step, TranslationMap};

/// Staged result of a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// New maps in proposal order, one per touched step.
    pub updates: Vec<(Uuid, TranslationMap)>,
    /// Proposal ids that matched no step of the tour.
    pub skipped: Vec<String>,
}

/// Merge `proposals` into the steps' stored maps.
///
/// Fill-missing only touches the tracked `locales`: a missing title is taken
/// from the proposal, then the stored entry, then the step's own title, and
/// content likewise. Override-all replaces the map wholesale.
pub fn merge_translations(
    steps: &[Step],
    proposals: &[StepTranslation],
    mode: TranslationMode,
    locales: &[String],
) -> MergeOutcome {
    let by_id: HashMap<Uuid, &Step> = steps.iter().map(|s| (s.id, s)).collect();
    let mut outcome = MergeOutcome::default();
    let mut staged: HashMap<Uuid, usize> = HashMap::new();

    for proposal in proposals {
        let Some(step) = Uuid::parse_str(proposal.id.trim())
            .ok()
            .and_then(|id| by_id.get(&id).copied())
        else {
            warn!(step_id = %proposal.id, "Translation proposal for unknown step skipped");
            outcome.skipped.push(proposal.id.clone());
            continue;
        };

        // A repeated id merges on top of the earlier result.
        let slot = *staged.entry(step.id).or_insert_with(|| {
            outcome.updates.push((step.id, step.translations.clone()));
            outcome.updates.len() - 1
        });
        let current = &mut outcome.updates[slot].1;

        match mode {
            TranslationMode::OverrideAll => *current = proposal.translations.clone(),
            TranslationMode::FillMissing => {
                fill_missing(current, step, &proposal.translations, locales)
            }
        }
    }

    outcome
}

fn fill_missing(current: &mut TranslationMap, step: &Step, proposed: &TranslationMap, locales: &[String]) {
    for locale in locales {
        let proposal = proposed.get(locale);
        let base = step.translations.get(locale);
        let entry = current.get(locale);

        let title = match entry.and_then(LocalizedText::title) {
            Some(_) => None,
            None => Some(
                proposal
                    .and_then(LocalizedText::title)
                    .or_else(|| base.and_then(LocalizedText::title))
                    .unwrap_or(step.title.as_str())
                    .to_string(),
            ),
        };
        let content = match entry.and_then(LocalizedText::content) {
            Some(_) => None,
            None => Some(
                proposal
                    .and_then(LocalizedText::content)
                    .or_else(|| base.and_then(LocalizedText::content))
                    .unwrap_or(step.content.as_str())
                    .to_string(),
            ),
        };

        if title.is_none() && content.is_none() {
            continue;
        }
        let entry = current.entry(locale.clone()).or_default();
        if let Some(title) = title {
            entry.title = Some(title);
        }
        if let Some(content) = content {
            entry.content = Some(content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::tours::model::Side;

    fn step(title: &str, content: &str, translations: TranslationMap) -> Step {
        let now = Utc::now();
        Step {
            id: Uuid::new_v4(),
            tour_id: Uuid::new_v4(),
            order_index: 0,
            title: title.into(),
            content: content.into(),
            icon: None,
            selector: "#anchor".into(),
            side: Side::Bottom,
            show_controls: true,
            pointer_padding: 10,
            pointer_radius: 10,
            next_route: None,
            prev_route: None,
            translations,
            created_at: now,
            updated_at: now,
        }
    }

    fn text(title: Option<&str>, content: Option<&str>) -> LocalizedText {
        LocalizedText {
            title: title.map(Into::into),
            content: content.map(Into::into),
        }
    }

    fn locales(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn fill_missing_keeps_complete_entries() {
        let existing = TranslationMap::from([("fr_FR".into(), LocalizedText::new("Bonjour", "Monde"))]);
        let s = step("Hello", "World", existing.clone());
        let proposal = StepTranslation {
            id: s.id.to_string(),
            translations: TranslationMap::from([
                ("fr_FR".into(), LocalizedText::new("Salut", "Terre")),
                ("it_IT".into(), LocalizedText::new("Ciao", "Mondo")),
            ]),
        };

        let outcome = merge_translations(
            std::slice::from_ref(&s),
            &[proposal],
            TranslationMode::FillMissing,
            &locales(&["fr_FR", "it_IT"]),
        );
        let map = &outcome.updates[0].1;
        assert_eq!(map["fr_FR"], existing["fr_FR"]);
        assert_eq!(map["it_IT"], LocalizedText::new("Ciao", "Mondo"));
    }

    #[test]
    fn fill_missing_fills_fields_independently() {
        let existing = TranslationMap::from([
            ("fr_FR".into(), text(Some("Bonjour"), None)),
            ("de_DE".into(), LocalizedText::new("Hallo", "Welt")),
        ]);
        let s = step("Hello", "World", existing);
        let proposal = StepTranslation {
            id: s.id.to_string(),
            translations: TranslationMap::from([("fr_FR".into(), text(Some("Salut"), Some("Monde")))]),
        };

        let outcome = merge_translations(
            std::slice::from_ref(&s),
            &[proposal],
            TranslationMode::FillMissing,
            &locales(&["fr_FR", "es_ES"]),
        );
        let map = &outcome.updates[0].1;
        assert_eq!(map["fr_FR"], LocalizedText::new("Bonjour", "Monde"));
        // No proposal for es_ES: falls back to the step's own text.
        assert_eq!(map["es_ES"], LocalizedText::new("Hello", "World"));
        // Untracked locales survive.
        assert_eq!(map["de_DE"], LocalizedText::new("Hallo", "Welt"));
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let existing = TranslationMap::from([("fr_FR".into(), text(Some(""), Some("Monde")))]);
        let s = step("Hello", "World", existing);
        let proposal = StepTranslation {
            id: s.id.to_string(),
            translations: TranslationMap::from([("fr_FR".into(), text(Some("Bonjour"), Some("Terre")))]),
        };

        let outcome = merge_translations(
            std::slice::from_ref(&s),
            &[proposal],
            TranslationMode::FillMissing,
            &locales(&["fr_FR"]),
        );
        assert_eq!(outcome.updates[0].1["fr_FR"], LocalizedText::new("Bonjour", "Monde"));
    }

    #[test]
    fn override_all_replaces_map() {
        let existing = TranslationMap::from([
            ("fr_FR".into(), LocalizedText::new("Bonjour", "Monde")),
            ("de_DE".into(), LocalizedText::new("Hallo", "Welt")),
        ]);
        let s = step("Hello", "World", existing);
        let proposed = TranslationMap::from([("it_IT".into(), LocalizedText::new("Ciao", "Mondo"))]);
        let proposal = StepTranslation {
            id: s.id.to_string(),
            translations: proposed.clone(),
        };

        let outcome = merge_translations(
            std::slice::from_ref(&s),
            &[proposal],
            TranslationMode::OverrideAll,
            &locales(&["fr_FR", "it_IT"]),
        );
        assert_eq!(outcome.updates, vec![(s.id, proposed)]);
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let s = step("Hello", "World", TranslationMap::new());
        let stray = Uuid::new_v4().to_string();
        let proposals = [
            StepTranslation {
                id: stray.clone(),
                translations: TranslationMap::new(),
            },
            StepTranslation {
                id: "not-a-uuid".into(),
                translations: TranslationMap::new(),
            },
        ];

        let outcome = merge_translations(
            std::slice::from_ref(&s),
            &proposals,
            TranslationMode::OverrideAll,
            &locales(&["fr_FR"]),
        );
        assert!(outcome.updates.is_empty());
        assert_eq!(outcome.skipped, vec![stray, "not-a-uuid".to_string()]);
    }

    #[test]
    fn steps_without_proposals_are_untouched() {
        let a = step("A", "a", TranslationMap::new());
        let b = step("B", "b", TranslationMap::new());
        let proposal = StepTranslation {
            id: b.id.to_string(),
            translations: TranslationMap::new(),
        };

        let outcome = merge_translations(
            &[a, b.clone()],
            &[proposal],
            TranslationMode::FillMissing,
            &locales(&["fr_FR"]),
        );
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].0, b.id);
        assert_eq!(outcome.updates[0].1["fr_FR"], LocalizedText::new("B", "b"));
    }
}
