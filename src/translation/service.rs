//! Translation service — prompt, provider call, merge, write-back.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::merge::merge_translations;
use super::prompt::{SYSTEM_PROMPT, build_prompt};
use super::provider::{TranslationProvider, TranslationRequest};
use super::{CommitMode, TranslationMode};
use crate::error::{Error, Result};
use crate::store::TourStore;
use crate::tours::model::{StepPatch, TourWithSteps};

pub struct TranslationService {
    store: Arc<dyn TourStore>,
    provider: Arc<dyn TranslationProvider>,
    locales: Vec<(String, String)>,
    commit: CommitMode,
}

impl TranslationService {
    pub fn new(
        store: Arc<dyn TourStore>,
        provider: Arc<dyn TranslationProvider>,
        locales: Vec<(String, String)>,
        commit: CommitMode,
    ) -> Self {
        Self {
            store,
            provider,
            locales,
            commit,
        }
    }

    fn locale_codes(&self) -> Vec<String> {
        self.locales.iter().map(|(code, _)| code.clone()).collect()
    }

    /// Translate every step of a tour and return the reloaded tour.
    ///
    /// Nothing is written unless the provider answers with a well-formed batch.
    pub async fn translate_tour(&self, tour_id: Uuid, mode: TranslationMode) -> Result<TourWithSteps> {
        let tour = self
            .store
            .get_tour(tour_id)
            .await?
            .ok_or_else(|| Error::tour_not_found(tour_id))?;

        if tour.steps.is_empty() {
            return Ok(tour);
        }

        let request = TranslationRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(&tour.steps, mode, &self.locales)?,
        };
        info!(
            tour_id = %tour_id,
            provider = self.provider.name(),
            mode = %mode,
            steps = tour.steps.len(),
            "Translating tour"
        );
        let batch = self.provider.translate(&request).await?;

        let outcome = merge_translations(&tour.steps, &batch.steps, mode, &self.locale_codes());
        if !outcome.skipped.is_empty() {
            warn!(tour_id = %tour_id, skipped = outcome.skipped.len(), "Provider returned unknown step ids");
        }

        match self.commit {
            CommitMode::PerStep => {
                for (step_id, map) in outcome.updates.iter() {
                    let patch = StepPatch::translations(map.clone());
                    match self.store.update_step(tour_id, *step_id, &patch).await {
                        Ok(_) => {}
                        // Deleted while the provider was working.
                        Err(Error::NotFound { entity: "Step", .. }) => {
                            warn!(tour_id = %tour_id, step_id = %step_id, "Step gone before translations were written");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            CommitMode::Atomic => {
                self.store
                    .set_step_translations(tour_id, &outcome.updates)
                    .await?;
            }
        }
        info!(tour_id = %tour_id, updated = outcome.updates.len(), "Translations applied");

        self.store
            .get_tour(tour_id)
            .await?
            .ok_or_else(|| Error::tour_not_found(tour_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::TranslationError;
    use crate::store::LibSqlBackend;
    use crate::tours::model::{LocalizedText, NewStep, NewTour, TranslationMap};
    use crate::translation::provider::TranslationBatch;

    /// Answers with a fixed batch, built from the prompt's step ids.
    struct StubProvider {
        answer: Box<dyn Fn(&[String]) -> std::result::Result<TranslationBatch, TranslationError> + Send + Sync>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl StubProvider {
        fn new(
            answer: impl Fn(&[String]) -> std::result::Result<TranslationBatch, TranslationError>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                answer: Box::new(answer),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TranslationProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn translate(
            &self,
            request: &TranslationRequest,
        ) -> std::result::Result<TranslationBatch, TranslationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let ids: Vec<String> = request
                .prompt
                .lines()
                .filter_map(|l| l.trim().strip_prefix("\"id\": \""))
                .map(|l| l.trim_end_matches(['"', ',']).to_string())
                .collect();
            (self.answer)(&ids)
        }
    }

    fn french_for(ids: &[String]) -> TranslationBatch {
        let json = serde_json::json!({
            "steps": ids.iter().map(|id| serde_json::json!({
                "id": id,
                "translations": { "fr_FR": { "title": "Titre", "content": "Contenu" } }
            })).collect::<Vec<_>>()
        });
        serde_json::from_value(json).unwrap()
    }

    fn locales() -> Vec<(String, String)> {
        vec![
            ("fr_FR".to_string(), "French".to_string()),
            ("it_IT".to_string(), "Italian".to_string()),
        ]
    }

    async fn seeded() -> (Arc<LibSqlBackend>, Uuid) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let tour = db
            .create_tour(&NewTour::new("welcome", "Welcome", "/dashboard"))
            .await
            .unwrap();
        db.create_step(tour.id, &NewStep::new("Hello", "World", "#a"))
            .await
            .unwrap();
        let mut done = NewStep::new("Done", "Finished", "#b");
        done.translations = Some(TranslationMap::from([(
            "fr_FR".to_string(),
            LocalizedText::new("Fini", "Terminé"),
        )]));
        db.create_step(tour.id, &done).await.unwrap();
        (db, tour.id)
    }

    #[tokio::test]
    async fn fill_missing_keeps_existing_and_falls_back() {
        let (db, tour_id) = seeded().await;
        let provider = StubProvider::new(|ids| Ok(french_for(ids)));
        let service = TranslationService::new(db.clone(), provider.clone(), locales(), CommitMode::PerStep);

        let tour = service
            .translate_tour(tour_id, TranslationMode::FillMissing)
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let first = &tour.steps[0].translations;
        assert_eq!(first["fr_FR"], LocalizedText::new("Titre", "Contenu"));
        // No Italian proposal: source text is copied in.
        assert_eq!(first["it_IT"], LocalizedText::new("Hello", "World"));

        let second = &tour.steps[1].translations;
        assert_eq!(second["fr_FR"], LocalizedText::new("Fini", "Terminé"));
    }

    #[tokio::test]
    async fn override_all_replaces_maps_atomically() {
        let (db, tour_id) = seeded().await;
        let provider = StubProvider::new(|ids| Ok(french_for(ids)));
        let service = TranslationService::new(db.clone(), provider, locales(), CommitMode::Atomic);

        let tour = service
            .translate_tour(tour_id, TranslationMode::OverrideAll)
            .await
            .unwrap();
        for step in &tour.steps {
            assert_eq!(step.translations.len(), 1);
            assert_eq!(step.translations["fr_FR"], LocalizedText::new("Titre", "Contenu"));
        }
    }

    #[tokio::test]
    async fn provider_failure_writes_nothing() {
        let (db, tour_id) = seeded().await;
        let before = db.get_tour(tour_id).await.unwrap().unwrap();
        let provider = StubProvider::new(|_| {
            Err(TranslationError::InvalidResponse("not json".into()))
        });
        let service = TranslationService::new(db.clone(), provider, locales(), CommitMode::PerStep);

        let err = service
            .translate_tour(tour_id, TranslationMode::OverrideAll)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(TranslationError::InvalidResponse(_))));

        let after = db.get_tour(tour_id).await.unwrap().unwrap();
        assert_eq!(before.steps, after.steps);
    }

    #[tokio::test]
    async fn unknown_step_ids_are_ignored() {
        let (db, tour_id) = seeded().await;
        let provider = StubProvider::new(|_| {
            Ok(french_for(&[Uuid::new_v4().to_string()]))
        });
        let service = TranslationService::new(db.clone(), provider, locales(), CommitMode::PerStep);

        let tour = service
            .translate_tour(tour_id, TranslationMode::OverrideAll)
            .await
            .unwrap();
        assert!(tour.steps[0].translations.is_empty());
        assert_eq!(tour.steps[1].translations.len(), 1);
    }

    /// Deletes one step while "translating", then answers for every prompted id.
    struct DeletingProvider {
        store: Arc<LibSqlBackend>,
        tour_id: Uuid,
        victim: Uuid,
    }

    #[async_trait]
    impl TranslationProvider for DeletingProvider {
        fn name(&self) -> &str {
            "deleting"
        }

        async fn translate(
            &self,
            request: &TranslationRequest,
        ) -> std::result::Result<TranslationBatch, TranslationError> {
            self.store
                .delete_step(self.tour_id, self.victim)
                .await
                .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
            let ids: Vec<String> = request
                .prompt
                .lines()
                .filter_map(|l| l.trim().strip_prefix("\"id\": \""))
                .map(|l| l.trim_end_matches(['"', ',']).to_string())
                .collect();
            Ok(french_for(&ids))
        }
    }

    #[tokio::test]
    async fn steps_deleted_mid_translation_are_skipped() {
        for commit in [CommitMode::PerStep, CommitMode::Atomic] {
            let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
            let tour = db
                .create_tour(&NewTour::new("welcome", "Welcome", "/"))
                .await
                .unwrap();
            let mut ids = Vec::new();
            for title in ["A", "B", "C"] {
                let step = db
                    .create_step(tour.id, &NewStep::new(title, "body", format!("#{title}")))
                    .await
                    .unwrap();
                ids.push(step.id);
            }
            let provider = Arc::new(DeletingProvider {
                store: db.clone(),
                tour_id: tour.id,
                victim: ids[1],
            });
            let service = TranslationService::new(db.clone(), provider, locales(), commit);

            let result = service
                .translate_tour(tour.id, TranslationMode::OverrideAll)
                .await
                .unwrap();

            let titles: Vec<&str> = result.steps.iter().map(|s| s.title.as_str()).collect();
            assert_eq!(titles, vec!["A", "C"], "{commit:?}");
            for step in &result.steps {
                assert_eq!(
                    step.translations["fr_FR"],
                    LocalizedText::new("Titre", "Contenu"),
                    "{commit:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn missing_tour_is_not_found_without_provider_call() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let provider = StubProvider::new(|ids| Ok(french_for(ids)));
        let service = TranslationService::new(db, provider.clone(), locales(), CommitMode::PerStep);

        let err = service
            .translate_tour(Uuid::new_v4(), TranslationMode::FillMissing)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "Tour", .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_tour_skips_provider() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let tour = db
            .create_tour(&NewTour::new("empty", "Empty", "/"))
            .await
            .unwrap();
        let provider = StubProvider::new(|ids| Ok(french_for(ids)));
        let service = TranslationService::new(db, provider.clone(), locales(), CommitMode::PerStep);

        let result = service
            .translate_tour(tour.id, TranslationMode::FillMissing)
            .await
            .unwrap();
        assert!(result.steps.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
