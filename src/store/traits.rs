//! `TourStore` trait — single async interface for tour and step persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::tours::model::{
    DeviceVisibility, NewStep, NewTour, Step, StepOrder, StepPatch, Tour, TourFilter, TourPatch,
    TourSummary, TourWithSteps, TranslationMap,
};

/// Backend-agnostic store for tours and their steps.
///
/// Every method is one transactional unit. After any mutating call returns,
/// each tour's step `order_index` values are exactly `0..N-1`.
#[async_trait]
pub trait TourStore: Send + Sync {
    // ── Tours ───────────────────────────────────────────────────────

    /// List tours with step counts, most recently created first.
    async fn list_tours(&self, filter: &TourFilter) -> Result<Vec<TourSummary>>;

    /// Get a tour with its steps ordered by `order_index`.
    async fn get_tour(&self, id: Uuid) -> Result<Option<TourWithSteps>>;

    /// Create a tour, applying defaults for omitted presentation fields.
    async fn create_tour(&self, new: &NewTour) -> Result<Tour>;

    /// Apply a partial update. Fails on an empty patch or an unknown id.
    async fn update_tour(&self, id: Uuid, patch: &TourPatch) -> Result<Tour>;

    /// Delete a tour and its steps. Absent ids are not an error.
    async fn delete_tour(&self, id: Uuid) -> Result<()>;

    /// Flip `is_active`.
    async fn toggle_active(&self, id: Uuid) -> Result<Tour>;

    /// Copy a tour and its steps (without translations) under a fresh slug.
    /// The copy always starts inactive.
    async fn duplicate_tour(&self, id: Uuid) -> Result<Tour>;

    // ── Steps ───────────────────────────────────────────────────────

    /// Append a step at the end of the tour.
    async fn create_step(&self, tour_id: Uuid, new: &NewStep) -> Result<Step>;

    /// Apply a partial update to a step scoped to its tour.
    async fn update_step(&self, tour_id: Uuid, step_id: Uuid, patch: &StepPatch) -> Result<Step>;

    /// Delete a step and close the gap it leaves. Absent ids are not an error.
    async fn delete_step(&self, tour_id: Uuid, step_id: Uuid) -> Result<()>;

    /// Move steps to new positions. `updates` must cover every step of the
    /// tour exactly once with a permutation of `0..N-1`.
    async fn reorder_steps(&self, tour_id: Uuid, updates: &[StepOrder]) -> Result<()>;

    /// Replace several steps' translation maps in one transaction.
    /// Steps no longer in the tour are skipped.
    async fn set_step_translations(
        &self,
        tour_id: Uuid,
        maps: &[(Uuid, TranslationMap)],
    ) -> Result<()>;

    // ── Resolver reads ──────────────────────────────────────────────

    /// Active tours visible on `device`, oldest first. With `None` only
    /// tours visible on all devices are returned.
    async fn list_active_tours(&self, device: Option<DeviceVisibility>) -> Result<Vec<Tour>>;

    /// Steps of the given tours, ordered by `order_index`.
    async fn list_steps_for_tours(&self, tour_ids: &[Uuid]) -> Result<Vec<Step>>;
}
