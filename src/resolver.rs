//! Active-tour resolution — which tours a visitor sees on a page.
//!
//! Selection happens in two passes: the store narrows by activity and device,
//! then path matching and locale projection run here.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::store::TourStore;
use crate::tours::model::{DeviceVisibility, Side, Step, Tour, TranslationMap};

/// What the playback client is asking for.
#[derive(Debug, Clone, Default)]
pub struct ActiveTourQuery {
    pub page_path: String,
    pub locale: Option<String>,
    pub device: Option<DeviceVisibility>,
}

impl ActiveTourQuery {
    pub fn new(page_path: impl Into<String>) -> Self {
        Self {
            page_path: page_path.into(),
            ..Self::default()
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_device(mut self, device: DeviceVisibility) -> Self {
        self.device = Some(device);
        self
    }

    /// The locale whose translations must be used, if any.
    fn translated_locale(&self) -> Option<&str> {
        self.locale
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !is_english(l))
    }
}

/// Card styling shared by every tour on the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationConfig {
    pub shadow_rgb: String,
    pub shadow_opacity: String,
    pub interact: bool,
    pub card_transition: serde_json::Value,
    pub bg_color: String,
    pub text_color: String,
    pub font_family: String,
}

impl PresentationConfig {
    fn from_tour(tour: &Tour) -> Self {
        Self {
            shadow_rgb: tour.shadow_rgb.clone(),
            shadow_opacity: tour.shadow_opacity.clone(),
            interact: tour.interact,
            card_transition: tour
                .card_transition
                .clone()
                .filter(|v| !v.is_null())
                .unwrap_or_else(default_card_transition),
            bg_color: tour.bg_color.clone(),
            text_color: tour.text_color.clone(),
            font_family: tour.font_family.clone(),
        }
    }
}

fn default_card_transition() -> serde_json::Value {
    serde_json::json!({ "type": "spring", "duration": 300 })
}

/// A step as served to the playback client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStep {
    pub icon: Option<String>,
    pub title: String,
    pub content: String,
    pub selector: String,
    pub side: Side,
    pub show_controls: bool,
    pub pointer_padding: i64,
    pub pointer_radius: i64,
    pub next_route: Option<String>,
    pub prev_route: Option<String>,
    pub translations: TranslationMap,
}

/// A tour as served to the playback client, keyed by its slug.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTour {
    pub tour: String,
    pub steps: Vec<ResolvedStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedTours {
    pub tours: Vec<ResolvedTour>,
    pub config: Option<PresentationConfig>,
}

/// Locale codes starting with `en` are served the authored text.
pub fn is_english(locale: &str) -> bool {
    locale.starts_with("en")
}

/// Bidirectional suffix match between the requested and stored page paths.
///
/// `/en/dashboard` matches a stored `/dashboard`, and `/dashboard` matches a
/// stored `/app/dashboard`. A blank request matches nothing.
pub fn path_matches(requested: &str, stored: &str) -> bool {
    if requested.is_empty() || stored.is_empty() {
        return false;
    }
    requested == stored || requested.ends_with(stored) || stored.ends_with(requested)
}

/// Project one step into the requested locale. `None` when the locale's
/// translation is incomplete.
fn project_step(step: Step, locale: Option<&str>) -> Option<ResolvedStep> {
    let (title, content) = match locale {
        Some(locale) => {
            let entry = step.translations.get(locale)?;
            (entry.title()?.to_string(), entry.content()?.to_string())
        }
        None => (step.title, step.content),
    };

    Some(ResolvedStep {
        icon: step.icon,
        title,
        content,
        selector: step.selector,
        side: step.side,
        show_controls: step.show_controls,
        pointer_padding: step.pointer_padding,
        pointer_radius: step.pointer_radius,
        next_route: step.next_route,
        prev_route: step.prev_route,
        translations: step.translations,
    })
}

/// Resolve the tours to serve for `query`.
///
/// Tours come back oldest first. A tour is dropped when it has no steps, or
/// when a translated locale is requested and any step lacks a complete
/// translation for it. The presentation config comes from the first matching
/// tour even if that tour is later dropped.
pub async fn resolve_active_tours(
    store: &dyn TourStore,
    query: &ActiveTourQuery,
) -> Result<ResolvedTours> {
    let page_path = query.page_path.trim();
    let matched: Vec<Tour> = store
        .list_active_tours(query.device)
        .await?
        .into_iter()
        .filter(|t| path_matches(page_path, &t.page_path))
        .collect();

    let Some(primary) = matched.first() else {
        return Ok(ResolvedTours::default());
    };
    let config = PresentationConfig::from_tour(primary);

    let ids: Vec<Uuid> = matched.iter().map(|t| t.id).collect();
    let mut steps_by_tour: HashMap<Uuid, Vec<Step>> = HashMap::new();
    for step in store.list_steps_for_tours(&ids).await? {
        steps_by_tour.entry(step.tour_id).or_default().push(step);
    }

    let locale = query.translated_locale();
    let mut tours = Vec::with_capacity(matched.len());
    for tour in matched {
        let steps = steps_by_tour.remove(&tour.id).unwrap_or_default();
        if steps.is_empty() {
            continue;
        }

        let projected: Option<Vec<ResolvedStep>> = steps
            .into_iter()
            .map(|step| project_step(step, locale))
            .collect();
        match projected {
            Some(steps) => tours.push(ResolvedTour {
                tour: tour.slug,
                steps,
            }),
            None => {
                debug!(tour = %tour.slug, locale = ?locale, "Tour dropped: incomplete translation");
            }
        }
    }

    Ok(ResolvedTours {
        tours,
        config: Some(config),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use crate::tours::model::{LocalizedText, NewStep, NewTour, StepPatch, TourPatch};

    async fn tour_with_steps(db: &LibSqlBackend, slug: &str, page_path: &str, titles: &[&str]) -> Tour {
        let tour = db
            .create_tour(&NewTour::new(slug, slug, page_path))
            .await
            .unwrap();
        for title in titles {
            db.create_step(tour.id, &NewStep::new(*title, format!("{title} body"), "#anchor"))
                .await
                .unwrap();
        }
        tour
    }

    fn slugs(resolved: &ResolvedTours) -> Vec<&str> {
        resolved.tours.iter().map(|t| t.tour.as_str()).collect()
    }

    #[test]
    fn suffix_matching_both_directions() {
        assert!(path_matches("/dashboard", "/dashboard"));
        assert!(path_matches("/en/dashboard", "/dashboard"));
        assert!(path_matches("/dashboard", "/app/dashboard"));
        assert!(!path_matches("/settings", "/dashboard"));
        assert!(!path_matches("", "/dashboard"));
    }

    #[test]
    fn english_detection() {
        assert!(is_english("en"));
        assert!(is_english("en_US"));
        assert!(is_english("en-GB"));
        assert!(!is_english("fr_FR"));
        assert!(ActiveTourQuery::new("/").with_locale("en_US").translated_locale().is_none());
        assert!(ActiveTourQuery::new("/").with_locale("  ").translated_locale().is_none());
        assert_eq!(
            ActiveTourQuery::new("/").with_locale("fr_FR").translated_locale(),
            Some("fr_FR")
        );
    }

    #[tokio::test]
    async fn no_match_returns_empty_without_config() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        tour_with_steps(&db, "dash", "/dashboard", &["a"]).await;

        let resolved = resolve_active_tours(&db, &ActiveTourQuery::new("/billing"))
            .await
            .unwrap();
        assert!(resolved.tours.is_empty());
        assert!(resolved.config.is_none());
        assert_eq!(
            serde_json::to_value(&resolved).unwrap(),
            serde_json::json!({"tours": [], "config": null})
        );
    }

    #[tokio::test]
    async fn matches_locale_prefixed_and_deep_routes() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        tour_with_steps(&db, "short", "/dashboard", &["a"]).await;
        tour_with_steps(&db, "deep", "/app/dashboard", &["b"]).await;

        let prefixed = resolve_active_tours(&db, &ActiveTourQuery::new("/en/dashboard"))
            .await
            .unwrap();
        assert_eq!(slugs(&prefixed), vec!["short"]);

        let bare = resolve_active_tours(&db, &ActiveTourQuery::new("/dashboard"))
            .await
            .unwrap();
        assert_eq!(slugs(&bare), vec!["short", "deep"]);
    }

    #[tokio::test]
    async fn config_comes_from_oldest_match_with_default_transition() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let first = tour_with_steps(&db, "first", "/p", &[]).await;
        db.update_tour(
            first.id,
            &TourPatch {
                shadow_rgb: Some("255,0,0".into()),
                interact: Some(true),
                ..TourPatch::default()
            },
        )
        .await
        .unwrap();
        tour_with_steps(&db, "second", "/p", &["a"]).await;

        let resolved = resolve_active_tours(&db, &ActiveTourQuery::new("/p")).await.unwrap();
        assert_eq!(slugs(&resolved), vec!["second"]);

        let config = resolved.config.unwrap();
        assert_eq!(config.shadow_rgb, "255,0,0");
        assert!(config.interact);
        assert_eq!(config.card_transition, default_card_transition());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cardTransition"]["type"], "spring");
        assert_eq!(json["bgColor"], "bg-white dark:bg-slate-900");
    }

    #[tokio::test]
    async fn incomplete_translation_drops_whole_tour() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let partial = tour_with_steps(&db, "partial", "/p", &["one", "two"]).await;
        let full = tour_with_steps(&db, "full", "/p", &["three"]).await;

        let partial_steps = db.get_tour(partial.id).await.unwrap().unwrap().steps;
        let fr = TranslationMap::from([("fr_FR".to_string(), LocalizedText::new("Un", "Premier"))]);
        db.update_step(partial.id, partial_steps[0].id, &StepPatch::translations(fr))
            .await
            .unwrap();

        let full_step = &db.get_tour(full.id).await.unwrap().unwrap().steps[0];
        let fr = TranslationMap::from([("fr_FR".to_string(), LocalizedText::new("Trois", "Troisième"))]);
        db.update_step(full.id, full_step.id, &StepPatch::translations(fr))
            .await
            .unwrap();

        let french = resolve_active_tours(&db, &ActiveTourQuery::new("/p").with_locale("fr_FR"))
            .await
            .unwrap();
        assert_eq!(slugs(&french), vec!["full"]);
        assert_eq!(french.tours[0].steps[0].title, "Trois");
        assert_eq!(french.tours[0].steps[0].content, "Troisième");

        let english = resolve_active_tours(&db, &ActiveTourQuery::new("/p").with_locale("en_US"))
            .await
            .unwrap();
        assert_eq!(slugs(&english), vec!["partial", "full"]);
        assert_eq!(english.tours[0].steps[0].title, "one");
        assert_eq!(english.tours[0].steps[0].translations.len(), 1);
    }

    #[tokio::test]
    async fn device_filter_and_inactive_tours() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let mut desktop = NewTour::new("desk", "Desk", "/p");
        desktop.device_visibility = Some(DeviceVisibility::Desktop);
        let desktop = db.create_tour(&desktop).await.unwrap();
        db.create_step(desktop.id, &NewStep::new("d", "d", "#d"))
            .await
            .unwrap();
        let hidden = tour_with_steps(&db, "hidden", "/p", &["h"]).await;
        db.toggle_active(hidden.id).await.unwrap();

        let any = resolve_active_tours(&db, &ActiveTourQuery::new("/p")).await.unwrap();
        assert!(any.tours.is_empty());

        let on_desktop = resolve_active_tours(
            &db,
            &ActiveTourQuery::new("/p").with_device(DeviceVisibility::Desktop),
        )
        .await
        .unwrap();
        assert_eq!(slugs(&on_desktop), vec!["desk"]);
    }

    #[tokio::test]
    async fn steps_serialize_in_camel_case_and_order() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        tour_with_steps(&db, "t", "/p", &["a", "b", "c"]).await;

        let resolved = resolve_active_tours(&db, &ActiveTourQuery::new("/p")).await.unwrap();
        let titles: Vec<&str> = resolved.tours[0].steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);

        let json = serde_json::to_value(&resolved.tours[0]).unwrap();
        assert_eq!(json["tour"], "t");
        assert_eq!(json["steps"][0]["showControls"], true);
        assert_eq!(json["steps"][0]["pointerPadding"], 10);
        assert_eq!(json["steps"][0]["side"], "bottom");
        assert!(json["steps"][0]["nextRoute"].is_null());
    }
}
