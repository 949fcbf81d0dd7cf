//! REST endpoints for tour authoring and playback.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, Method, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use super::context::{Admin, AdminPolicy, attach_identity};
use super::error::{ApiError, ApiResult};
use crate::error::{Error, TranslationError};
use crate::resolver::{ActiveTourQuery, resolve_active_tours};
use crate::store::TourStore;
use crate::tours::model::{
    ActiveFilter, NewStep, NewTour, StepOrder, StepPatch, TourFilter, TourPatch,
};
use crate::translation::{TranslationMode, TranslationService};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TourStore>,
    /// `None` when no provider is configured.
    pub translator: Option<Arc<TranslationService>>,
    pub admin_policy: Arc<dyn AdminPolicy>,
    /// Header carrying the caller's email, set by the auth proxy.
    pub identity_header: HeaderName,
}

/// Build the Axum router with every tour route.
pub fn tour_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/api/tours", get(list_tours).post(create_tour))
        .route("/api/tours/active", get(active_tours))
        .route(
            "/api/tours/{id}",
            get(get_tour).put(update_tour).delete(delete_tour),
        )
        .route("/api/tours/{id}/toggle", patch(toggle_tour))
        .route("/api/tours/{id}/duplicate", post(duplicate_tour))
        .route("/api/tours/{id}/steps", post(create_step))
        .route("/api/tours/{id}/steps/reorder", put(reorder_steps))
        .route(
            "/api/tours/{id}/steps/{step_id}",
            put(update_step).delete(delete_step),
        )
        .route("/api/tours/{id}/translate", post(translate_tour))
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(middleware::from_fn_with_state(state.clone(), attach_identity)),
        )
        .with_state(state)
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Ids that are not UUIDs cannot exist, so they are reported as missing.
fn tour_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::tour_not_found(raw).into())
}

fn step_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::step_not_found(raw).into())
}

fn optional_body<T: DeserializeOwned + Default>(raw: &Bytes) -> ApiResult<T> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "tourly"
    }))
}

// ── Tours ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    search: Option<String>,
    filter: Option<String>,
}

async fn list_tours(
    _admin: Admin,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = TourFilter {
        search: params.search,
        active: params.filter.as_deref().and_then(ActiveFilter::parse),
    };
    let tours = state.store.list_tours(&filter).await?;
    Ok(Json(json!({ "success": true, "tours": tours })))
}

async fn create_tour(
    Admin(admin): Admin,
    State(state): State<AppState>,
    payload: Result<Json<NewTour>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let tour = state.store.create_tour(&body(payload)?).await?;
    info!(tour_id = %tour.id, slug = %tour.slug, by = %admin.email, "Tour created");
    Ok(Json(json!({ "success": true, "tour": tour })))
}

async fn get_tour(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = tour_id(&id)?;
    let tour = state
        .store
        .get_tour(id)
        .await?
        .ok_or_else(|| Error::tour_not_found(id))?;
    Ok(Json(json!({ "success": true, "tour": tour })))
}

async fn update_tour(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<TourPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = tour_id(&id)?;
    let tour = state.store.update_tour(id, &body(payload)?).await?;
    Ok(Json(json!({ "success": true, "tour": tour })))
}

async fn delete_tour(
    Admin(admin): Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // Unparseable ids name nothing; deleting nothing succeeds.
    if let Ok(id) = Uuid::parse_str(&id) {
        state.store.delete_tour(id).await?;
        info!(tour_id = %id, by = %admin.email, "Tour delete requested");
    }
    Ok(Json(json!({ "success": true })))
}

async fn toggle_tour(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let tour = state.store.toggle_active(tour_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "tour": tour })))
}

async fn duplicate_tour(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let tour = state.store.duplicate_tour(tour_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "tour": tour })))
}

// ── Steps ───────────────────────────────────────────────────────────────

async fn create_step(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NewStep>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = tour_id(&id)?;
    let step = state.store.create_step(id, &body(payload)?).await?;
    Ok(Json(json!({ "success": true, "step": step })))
}

async fn reorder_steps(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Vec<StepOrder>>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = tour_id(&id)?;
    state.store.reorder_steps(id, &body(payload)?).await?;
    Ok(Json(json!({ "success": true })))
}

async fn update_step(
    _admin: Admin,
    State(state): State<AppState>,
    Path((id, step)): Path<(String, String)>,
    payload: Result<Json<StepPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let (id, step) = (tour_id(&id)?, step_id(&step)?);
    let step = state.store.update_step(id, step, &body(payload)?).await?;
    Ok(Json(json!({ "success": true, "step": step })))
}

async fn delete_step(
    _admin: Admin,
    State(state): State<AppState>,
    Path((id, step)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    if let (Ok(id), Ok(step)) = (Uuid::parse_str(&id), Uuid::parse_str(&step)) {
        state.store.delete_step(id, step).await?;
    }
    Ok(Json(json!({ "success": true })))
}

// ── Translation ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct TranslateBody {
    #[serde(default)]
    mode: TranslationMode,
}

async fn translate_tour(
    Admin(admin): Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    raw: Bytes,
) -> ApiResult<impl IntoResponse> {
    let id = tour_id(&id)?;
    let request: TranslateBody = optional_body(&raw)?;
    let translator = state
        .translator
        .as_ref()
        .ok_or(Error::Upstream(TranslationError::NotConfigured))?;

    info!(tour_id = %id, mode = %request.mode, by = %admin.email, "Translation requested");
    let tour = translator.translate_tour(id, request.mode).await?;
    Ok(Json(json!({ "success": true, "tour": tour })))
}

// ── Playback (public) ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ActiveParams {
    path: Option<String>,
    locale: Option<String>,
    device: Option<String>,
}

async fn active_tours(
    State(state): State<AppState>,
    Query(params): Query<ActiveParams>,
) -> ApiResult<impl IntoResponse> {
    let page_path = params
        .path
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::Validation("path is required".into()))?;

    let query = ActiveTourQuery {
        page_path,
        locale: params.locale.filter(|l| !l.trim().is_empty()),
        // Unknown device classes only see tours visible everywhere.
        device: params.device.and_then(|d| d.parse().ok()),
    };
    let resolved = resolve_active_tours(state.store.as_ref(), &query).await?;
    Ok(Json(json!({
        "success": true,
        "tours": resolved.tours,
        "config": resolved.config,
    })))
}
