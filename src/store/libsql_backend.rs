//! libSQL backend — async `TourStore` implementation.
//!
//! One connection is shared by every caller. A `RwLock` gate serializes
//! mutations (each runs as a single `BEGIN … COMMIT`) and keeps readers out
//! while a transaction is open on the shared connection.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use libsql::params::Params;
use libsql::{Connection, Database as LibSqlDatabase, Transaction, Value, params};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, Error, Result};
use crate::store::migrations;
use crate::store::traits::TourStore;
use crate::tours::model::{
    ActiveFilter, DEFAULT_BG_COLOR, DEFAULT_FONT_FAMILY, DEFAULT_POINTER_PADDING,
    DEFAULT_POINTER_RADIUS, DEFAULT_SHADOW_OPACITY, DEFAULT_SHADOW_RGB, DEFAULT_TEXT_COLOR,
    DeviceVisibility, LocalizedText, NewStep, NewTour, Side, Step, StepOrder, StepPatch, Tour,
    TourFilter, TourPatch, TourSummary, TourWithSteps, TranslationMap,
};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    gate: RwLock<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        // Cascades are declared in the schema but SQLite only enforces them per connection.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;
        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
            gate: RwLock::new(()),
        })
    }

    async fn begin(&self, op: &str) -> Result<Transaction> {
        self.conn
            .transaction()
            .await
            .map_err(|e| query_err(&format!("{op} begin"), e))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Transaction, result: Result<T>, op: &str) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| query_err(&format!("{op} commit"), e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback().await {
                warn!(op, error = %rb, "Rollback failed");
            }
            Err(err)
        }
    }
}

fn query_err(op: &str, e: libsql::Error) -> Error {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed: tours.tour_id") {
        return Error::Conflict("tour_id already exists".to_string());
    }
    Error::Storage(DatabaseError::Query(format!("{op}: {message}")))
}

/// Current time at the precision the database keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn now_str() -> String {
    format_datetime(&now())
}

/// Fixed-width RFC 3339 so lexical order matches chronological order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Case-insensitive substring match on name or page path. `needle` is already lowercased.
fn matches_search(tour: &Tour, needle: &str) -> bool {
    tour.name.to_lowercase().contains(needle) || tour.page_path.to_lowercase().contains(needle)
}

fn json_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn translations_text(map: &TranslationMap) -> Result<String> {
    serde_json::to_string(map)
        .map_err(|e| Error::Storage(DatabaseError::Serialization(e.to_string())))
}

/// Lenient parse: `null` locale entries are dropped rather than failing the row.
/// A corrupt column reads as an empty map.
fn parse_translations(raw: &str, step_id: Uuid) -> TranslationMap {
    match serde_json::from_str::<std::collections::BTreeMap<String, Option<LocalizedText>>>(raw) {
        Ok(m) => m.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect(),
        Err(e) => {
            warn!(step_id = %step_id, error = %e, "Unreadable translations column");
            TranslationMap::new()
        }
    }
}

/// Check that `updates` is a full permutation of the tour's current steps.
fn validate_reorder(current: &[Uuid], updates: &[StepOrder]) -> Result<()> {
    if updates.len() != current.len() {
        return Err(Error::Validation(format!(
            "reorder must cover all {} steps, got {}",
            current.len(),
            updates.len()
        )));
    }

    let known: HashSet<Uuid> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(updates.len());
    for update in updates {
        if !known.contains(&update.id) {
            return Err(Error::Validation(format!(
                "step {} does not belong to this tour",
                update.id
            )));
        }
        if !seen.insert(update.id) {
            return Err(Error::Validation(format!("step {} listed twice", update.id)));
        }
    }

    let mut positions: Vec<i64> = updates.iter().map(|u| u.order_index).collect();
    positions.sort_unstable();
    if positions.iter().enumerate().any(|(i, p)| *p != i as i64) {
        return Err(Error::Validation(format!(
            "order_index values must be a permutation of 0..{}",
            updates.len()
        )));
    }
    Ok(())
}

// ── Row mapping ─────────────────────────────────────────────────────

const TOUR_COLUMNS: &str = "id, tour_id, name, description, page_path, is_active, shadow_rgb, shadow_opacity, interact, card_transition, show_condition, bg_color, text_color, font_family, device_visibility, created_at, updated_at";

const STEP_COLUMNS: &str = "id, tour_id, order_index, title, content, icon, selector, side, show_controls, pointer_padding, pointer_radius, next_route, prev_route, translations, created_at, updated_at";

fn row_to_tour(row: &libsql::Row) -> Result<Tour> {
    let col = |name: &str, e: libsql::Error| {
        Error::Storage(DatabaseError::Query(format!("tour.{name}: {e}")))
    };

    let id_str: String = row.get(0).map_err(|e| col("id", e))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Query(format!("tour.id parse: {e}")))?;
    let slug: String = row.get(1).map_err(|e| col("tour_id", e))?;
    let name: String = row.get(2).map_err(|e| col("name", e))?;
    let description: Option<String> = row.get(3).ok();
    let page_path: String = row.get(4).map_err(|e| col("page_path", e))?;
    let is_active = row.get::<i64>(5).unwrap_or(0) != 0;
    let shadow_rgb: String = row
        .get(6)
        .unwrap_or_else(|_| DEFAULT_SHADOW_RGB.to_string());
    let shadow_opacity: String = row
        .get(7)
        .unwrap_or_else(|_| DEFAULT_SHADOW_OPACITY.to_string());
    let interact = row.get::<i64>(8).unwrap_or(0) != 0;
    let card_transition = row
        .get::<String>(9)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok());
    let show_condition = row
        .get::<String>(10)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok());
    let bg_color: String = row.get(11).unwrap_or_else(|_| DEFAULT_BG_COLOR.to_string());
    let text_color: String = row
        .get(12)
        .unwrap_or_else(|_| DEFAULT_TEXT_COLOR.to_string());
    let font_family: String = row
        .get(13)
        .unwrap_or_else(|_| DEFAULT_FONT_FAMILY.to_string());
    let device_visibility = row
        .get::<String>(14)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let created_at: String = row.get(15).unwrap_or_default();
    let updated_at: String = row.get(16).unwrap_or_default();

    Ok(Tour {
        id,
        slug,
        name,
        description,
        page_path,
        is_active,
        shadow_rgb,
        shadow_opacity,
        interact,
        card_transition,
        show_condition,
        bg_color,
        text_color,
        font_family,
        device_visibility,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn row_to_step(row: &libsql::Row) -> Result<Step> {
    let col = |name: &str, e: libsql::Error| {
        Error::Storage(DatabaseError::Query(format!("step.{name}: {e}")))
    };
    let uuid = |name: &str, s: String| {
        Uuid::parse_str(&s)
            .map_err(|e| Error::Storage(DatabaseError::Query(format!("step.{name} parse: {e}"))))
    };

    let id = uuid("id", row.get(0).map_err(|e| col("id", e))?)?;
    let tour_id = uuid("tour_id", row.get(1).map_err(|e| col("tour_id", e))?)?;
    let order_index: i64 = row.get(2).map_err(|e| col("order_index", e))?;
    let title: String = row.get(3).map_err(|e| col("title", e))?;
    let content: String = row.get(4).map_err(|e| col("content", e))?;
    let icon: Option<String> = row.get(5).ok();
    let selector: String = row.get(6).map_err(|e| col("selector", e))?;
    let side: Side = row
        .get::<String>(7)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let show_controls = row.get::<i64>(8).unwrap_or(1) != 0;
    let pointer_padding: i64 = row.get(9).unwrap_or(DEFAULT_POINTER_PADDING);
    let pointer_radius: i64 = row.get(10).unwrap_or(DEFAULT_POINTER_RADIUS);
    let next_route: Option<String> = row.get(11).ok();
    let prev_route: Option<String> = row.get(12).ok();
    let translations = row
        .get::<String>(13)
        .map(|s| parse_translations(&s, id))
        .unwrap_or_default();
    let created_at: String = row.get(14).unwrap_or_default();
    let updated_at: String = row.get(15).unwrap_or_default();

    Ok(Step {
        id,
        tour_id,
        order_index,
        title,
        content,
        icon,
        selector,
        side,
        show_controls,
        pointer_padding,
        pointer_radius,
        next_route,
        prev_route,
        translations,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

// ── Statement helpers (usable inside or outside a transaction) ──────

async fn fetch_tour(conn: &Connection, id: Uuid) -> Result<Option<Tour>> {
    let mut rows = conn
        .query(
            &format!("SELECT {TOUR_COLUMNS} FROM tours WHERE id = ?1"),
            params![id.to_string()],
        )
        .await
        .map_err(|e| query_err("fetch_tour", e))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_tour(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(query_err("fetch_tour row", e)),
    }
}

async fn require_tour(conn: &Connection, id: Uuid) -> Result<Tour> {
    fetch_tour(conn, id)
        .await?
        .ok_or_else(|| Error::tour_not_found(id))
}

async fn fetch_steps(conn: &Connection, tour_id: Uuid) -> Result<Vec<Step>> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {STEP_COLUMNS} FROM steps WHERE tour_id = ?1 ORDER BY order_index ASC"
            ),
            params![tour_id.to_string()],
        )
        .await
        .map_err(|e| query_err("fetch_steps", e))?;

    let mut steps = Vec::new();
    while let Some(row) = rows.next().await.map_err(|e| query_err("fetch_steps row", e))? {
        steps.push(row_to_step(&row)?);
    }
    Ok(steps)
}

async fn fetch_step(conn: &Connection, tour_id: Uuid, step_id: Uuid) -> Result<Option<Step>> {
    let mut rows = conn
        .query(
            &format!("SELECT {STEP_COLUMNS} FROM steps WHERE id = ?1 AND tour_id = ?2"),
            params![step_id.to_string(), tour_id.to_string()],
        )
        .await
        .map_err(|e| query_err("fetch_step", e))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_step(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(query_err("fetch_step row", e)),
    }
}

async fn slug_taken(conn: &Connection, slug: &str, except: Option<Uuid>) -> Result<bool> {
    let except = except.map(|id| id.to_string()).unwrap_or_default();
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM tours WHERE tour_id = ?1 AND id != ?2",
            params![slug, except],
        )
        .await
        .map_err(|e| query_err("slug_taken", e))?;

    match rows.next().await.map_err(|e| query_err("slug_taken row", e))? {
        Some(row) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
        None => Ok(false),
    }
}

/// First free `<slug>-copy`, `<slug>-copy-2`, `<slug>-copy-3`, …
async fn copy_slug(conn: &Connection, slug: &str) -> Result<String> {
    let base = format!("{slug}-copy");
    if !slug_taken(conn, &base, None).await? {
        return Ok(base);
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !slug_taken(conn, &candidate, None).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

async fn insert_tour(conn: &Connection, tour: &Tour) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO tours ({TOUR_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            tour.id.to_string(),
            tour.slug.as_str(),
            tour.name.as_str(),
            tour.description.as_deref(),
            tour.page_path.as_str(),
            tour.is_active as i64,
            tour.shadow_rgb.as_str(),
            tour.shadow_opacity.as_str(),
            tour.interact as i64,
            json_text(&tour.card_transition),
            json_text(&tour.show_condition),
            tour.bg_color.as_str(),
            tour.text_color.as_str(),
            tour.font_family.as_str(),
            tour.device_visibility.as_str(),
            format_datetime(&tour.created_at),
            format_datetime(&tour.updated_at),
        ],
    )
    .await
    .map_err(|e| query_err("insert_tour", e))?;
    Ok(())
}

async fn insert_step(conn: &Connection, step: &Step) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO steps ({STEP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            step.id.to_string(),
            step.tour_id.to_string(),
            step.order_index,
            step.title.as_str(),
            step.content.as_str(),
            step.icon.as_deref(),
            step.selector.as_str(),
            step.side.as_str(),
            step.show_controls as i64,
            step.pointer_padding,
            step.pointer_radius,
            step.next_route.as_deref(),
            step.prev_route.as_deref(),
            translations_text(&step.translations)?,
            format_datetime(&step.created_at),
            format_datetime(&step.updated_at),
        ],
    )
    .await
    .map_err(|e| query_err("insert_step", e))?;
    Ok(())
}

/// Renumber the tour's steps to `0..N-1` in one set-based statement,
/// keeping their relative `order_index` order.
async fn resequence(conn: &Connection, tour_id: Uuid) -> Result<u64> {
    conn.execute(
        "WITH numbered AS MATERIALIZED (
             SELECT id, row_number() OVER (ORDER BY order_index ASC) - 1 AS new_order
             FROM steps
             WHERE tour_id = ?1
         )
         UPDATE steps
         SET order_index = numbered.new_order
         FROM numbered
         WHERE steps.id = numbered.id",
        params![tour_id.to_string()],
    )
    .await
    .map_err(|e| query_err("resequence", e))
}

// ── Transaction bodies ──────────────────────────────────────────────

async fn update_tour_tx(conn: &Connection, id: Uuid, patch: &TourPatch) -> Result<Tour> {
    let mut tour = require_tour(conn, id).await?;

    if let Some(slug) = &patch.slug {
        if slug_taken(conn, slug, Some(id)).await? {
            return Err(Error::Conflict(format!("tour_id '{slug}' already exists")));
        }
    }

    patch.apply(&mut tour);
    tour.updated_at = now();

    conn.execute(
        "UPDATE tours SET tour_id = ?1, name = ?2, description = ?3, page_path = ?4, is_active = ?5, \
         shadow_rgb = ?6, shadow_opacity = ?7, interact = ?8, card_transition = ?9, show_condition = ?10, \
         bg_color = ?11, text_color = ?12, font_family = ?13, device_visibility = ?14, updated_at = ?15 \
         WHERE id = ?16",
        params![
            tour.slug.as_str(),
            tour.name.as_str(),
            tour.description.as_deref(),
            tour.page_path.as_str(),
            tour.is_active as i64,
            tour.shadow_rgb.as_str(),
            tour.shadow_opacity.as_str(),
            tour.interact as i64,
            json_text(&tour.card_transition),
            json_text(&tour.show_condition),
            tour.bg_color.as_str(),
            tour.text_color.as_str(),
            tour.font_family.as_str(),
            tour.device_visibility.as_str(),
            format_datetime(&tour.updated_at),
            id.to_string(),
        ],
    )
    .await
    .map_err(|e| query_err("update_tour", e))?;

    Ok(tour)
}

async fn toggle_active_tx(conn: &Connection, id: Uuid) -> Result<Tour> {
    let changed = conn
        .execute(
            "UPDATE tours SET is_active = 1 - is_active, updated_at = ?1 WHERE id = ?2",
            params![now_str(), id.to_string()],
        )
        .await
        .map_err(|e| query_err("toggle_active", e))?;

    if changed == 0 {
        return Err(Error::tour_not_found(id));
    }
    require_tour(conn, id).await
}

async fn duplicate_tour_tx(conn: &Connection, id: Uuid) -> Result<Tour> {
    let source = require_tour(conn, id).await?;
    let now = now();

    let copy = Tour {
        id: Uuid::new_v4(),
        slug: copy_slug(conn, &source.slug).await?,
        name: format!("{} (Copy)", source.name),
        is_active: false,
        created_at: now,
        updated_at: now,
        ..source
    };
    insert_tour(conn, &copy).await?;

    let steps = fetch_steps(conn, id).await?;
    for (position, step) in steps.into_iter().enumerate() {
        let cloned = Step {
            id: Uuid::new_v4(),
            tour_id: copy.id,
            order_index: position as i64,
            translations: TranslationMap::new(),
            created_at: now,
            updated_at: now,
            ..step
        };
        insert_step(conn, &cloned).await?;
    }

    Ok(copy)
}

async fn create_step_tx(conn: &Connection, tour_id: Uuid, new: &NewStep) -> Result<Step> {
    require_tour(conn, tour_id).await?;

    let max: Option<i64> = {
        let mut rows = conn
            .query(
                "SELECT MAX(order_index) FROM steps WHERE tour_id = ?1",
                params![tour_id.to_string()],
            )
            .await
            .map_err(|e| query_err("create_step max", e))?;
        match rows
            .next()
            .await
            .map_err(|e| query_err("create_step max row", e))?
        {
            Some(row) => row.get::<i64>(0).ok(),
            None => None,
        }
    };

    let now = now();
    let step = Step {
        id: Uuid::new_v4(),
        tour_id,
        order_index: max.map_or(0, |m| m + 1),
        title: new.title.clone(),
        content: new.content.clone(),
        icon: new.icon.clone(),
        selector: new.selector.clone(),
        side: new.side.unwrap_or_default(),
        show_controls: new.show_controls.unwrap_or(true),
        pointer_padding: new.pointer_padding.unwrap_or(DEFAULT_POINTER_PADDING),
        pointer_radius: new.pointer_radius.unwrap_or(DEFAULT_POINTER_RADIUS),
        next_route: new.next_route.clone(),
        prev_route: new.prev_route.clone(),
        translations: new.translations.clone().unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };
    insert_step(conn, &step).await?;
    Ok(step)
}

async fn update_step_tx(
    conn: &Connection,
    tour_id: Uuid,
    step_id: Uuid,
    patch: &StepPatch,
) -> Result<Step> {
    let mut step = fetch_step(conn, tour_id, step_id)
        .await?
        .ok_or_else(|| Error::step_not_found(step_id))?;

    patch.apply(&mut step);
    step.updated_at = now();

    conn.execute(
        "UPDATE steps SET title = ?1, content = ?2, icon = ?3, selector = ?4, side = ?5, \
         show_controls = ?6, pointer_padding = ?7, pointer_radius = ?8, next_route = ?9, \
         prev_route = ?10, translations = ?11, updated_at = ?12 \
         WHERE id = ?13 AND tour_id = ?14",
        params![
            step.title.as_str(),
            step.content.as_str(),
            step.icon.as_deref(),
            step.selector.as_str(),
            step.side.as_str(),
            step.show_controls as i64,
            step.pointer_padding,
            step.pointer_radius,
            step.next_route.as_deref(),
            step.prev_route.as_deref(),
            translations_text(&step.translations)?,
            format_datetime(&step.updated_at),
            step_id.to_string(),
            tour_id.to_string(),
        ],
    )
    .await
    .map_err(|e| query_err("update_step", e))?;

    Ok(step)
}

async fn delete_step_tx(conn: &Connection, tour_id: Uuid, step_id: Uuid) -> Result<bool> {
    let removed = conn
        .execute(
            "DELETE FROM steps WHERE id = ?1 AND tour_id = ?2",
            params![step_id.to_string(), tour_id.to_string()],
        )
        .await
        .map_err(|e| query_err("delete_step", e))?;

    if removed > 0 {
        resequence(conn, tour_id).await?;
    }
    Ok(removed > 0)
}

async fn reorder_steps_tx(conn: &Connection, tour_id: Uuid, updates: &[StepOrder]) -> Result<()> {
    require_tour(conn, tour_id).await?;

    let current: Vec<Uuid> = fetch_steps(conn, tour_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    validate_reorder(&current, updates)?;

    let now = now_str();
    for update in updates {
        conn.execute(
            "UPDATE steps SET order_index = ?1, updated_at = ?2 WHERE id = ?3 AND tour_id = ?4",
            params![
                update.order_index,
                now.as_str(),
                update.id.to_string(),
                tour_id.to_string()
            ],
        )
        .await
        .map_err(|e| query_err("reorder_steps", e))?;
    }
    Ok(())
}

async fn set_step_translations_tx(
    conn: &Connection,
    tour_id: Uuid,
    maps: &[(Uuid, TranslationMap)],
) -> Result<()> {
    require_tour(conn, tour_id).await?;

    let now = now_str();
    for (step_id, map) in maps {
        let changed = conn
            .execute(
                "UPDATE steps SET translations = ?1, updated_at = ?2 WHERE id = ?3 AND tour_id = ?4",
                params![
                    translations_text(map)?,
                    now.as_str(),
                    step_id.to_string(),
                    tour_id.to_string()
                ],
            )
            .await
            .map_err(|e| query_err("set_step_translations", e))?;
        if changed == 0 {
            warn!(tour_id = %tour_id, step_id = %step_id, "Step gone before translations were written");
        }
    }
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl TourStore for LibSqlBackend {
    // ── Tours ───────────────────────────────────────────────────────

    async fn list_tours(&self, filter: &TourFilter) -> Result<Vec<TourSummary>> {
        let _read = self.gate.read().await;

        let mut sql = format!(
            "SELECT {TOUR_COLUMNS}, (SELECT COUNT(*) FROM steps s WHERE s.tour_id = tours.id) \
             FROM tours WHERE 1=1"
        );
        match filter.active {
            Some(ActiveFilter::Active) => sql.push_str(" AND is_active = 1"),
            Some(ActiveFilter::Inactive) => sql.push_str(" AND is_active = 0"),
            None => {}
        }

        sql.push_str(" ORDER BY created_at DESC, rowid DESC");

        let mut rows = self
            .conn
            .query(&sql, ())
            .await
            .map_err(|e| query_err("list_tours", e))?;

        // SQLite LIKE only folds ASCII, so the search runs here.
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut tours = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| query_err("list_tours row", e))? {
            let tour = row_to_tour(&row)?;
            if needle.as_deref().is_some_and(|n| !matches_search(&tour, n)) {
                continue;
            }
            let steps_count: i64 = row.get(17).unwrap_or(0);
            tours.push(TourSummary { tour, steps_count });
        }
        Ok(tours)
    }

    async fn get_tour(&self, id: Uuid) -> Result<Option<TourWithSteps>> {
        let _read = self.gate.read().await;

        let Some(tour) = fetch_tour(&self.conn, id).await? else {
            return Ok(None);
        };
        let steps = fetch_steps(&self.conn, id).await?;
        Ok(Some(TourWithSteps { tour, steps }))
    }

    async fn create_tour(&self, new: &NewTour) -> Result<Tour> {
        new.validate()?;

        let now = now();
        let tour = Tour {
            id: Uuid::new_v4(),
            slug: new.slug.trim().to_string(),
            name: new.name.clone(),
            description: new.description.clone(),
            page_path: new.page_path.clone(),
            is_active: new.is_active.unwrap_or(true),
            shadow_rgb: new
                .shadow_rgb
                .clone()
                .unwrap_or_else(|| DEFAULT_SHADOW_RGB.to_string()),
            shadow_opacity: new
                .shadow_opacity
                .clone()
                .unwrap_or_else(|| DEFAULT_SHADOW_OPACITY.to_string()),
            interact: new.interact.unwrap_or(false),
            card_transition: new.card_transition.clone(),
            show_condition: new.show_condition.clone(),
            bg_color: new
                .bg_color
                .clone()
                .unwrap_or_else(|| DEFAULT_BG_COLOR.to_string()),
            text_color: new
                .text_color
                .clone()
                .unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
            font_family: new
                .font_family
                .clone()
                .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string()),
            device_visibility: new.device_visibility.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let _write = self.gate.write().await;
        let tx = self.begin("create_tour").await?;
        let result = async {
            if slug_taken(&tx, &tour.slug, None).await? {
                return Err(Error::Conflict(format!(
                    "tour_id '{}' already exists",
                    tour.slug
                )));
            }
            insert_tour(&tx, &tour).await
        }
        .await;
        finish(tx, result, "create_tour").await?;

        debug!(tour_id = %tour.id, slug = %tour.slug, "Tour created");
        Ok(tour)
    }

    async fn update_tour(&self, id: Uuid, patch: &TourPatch) -> Result<Tour> {
        if patch.is_empty() {
            return Err(Error::Validation("no fields to update".to_string()));
        }
        patch.validate()?;

        let _write = self.gate.write().await;
        let tx = self.begin("update_tour").await?;
        let result = update_tour_tx(&tx, id, patch).await;
        let tour = finish(tx, result, "update_tour").await?;

        debug!(tour_id = %id, "Tour updated");
        Ok(tour)
    }

    async fn delete_tour(&self, id: Uuid) -> Result<()> {
        let _write = self.gate.write().await;
        let tx = self.begin("delete_tour").await?;
        let result = async {
            tx.execute("DELETE FROM steps WHERE tour_id = ?1", params![id.to_string()])
                .await
                .map_err(|e| query_err("delete_tour steps", e))?;
            tx.execute("DELETE FROM tours WHERE id = ?1", params![id.to_string()])
                .await
                .map_err(|e| query_err("delete_tour", e))
        }
        .await;
        let removed = finish(tx, result, "delete_tour").await?;

        if removed > 0 {
            info!(tour_id = %id, "Tour deleted");
        }
        Ok(())
    }

    async fn toggle_active(&self, id: Uuid) -> Result<Tour> {
        let _write = self.gate.write().await;
        let tx = self.begin("toggle_active").await?;
        let result = toggle_active_tx(&tx, id).await;
        let tour = finish(tx, result, "toggle_active").await?;

        debug!(tour_id = %id, is_active = tour.is_active, "Tour toggled");
        Ok(tour)
    }

    async fn duplicate_tour(&self, id: Uuid) -> Result<Tour> {
        let _write = self.gate.write().await;
        let tx = self.begin("duplicate_tour").await?;
        let result = duplicate_tour_tx(&tx, id).await;
        let copy = finish(tx, result, "duplicate_tour").await?;

        info!(source = %id, tour_id = %copy.id, slug = %copy.slug, "Tour duplicated");
        Ok(copy)
    }

    // ── Steps ───────────────────────────────────────────────────────

    async fn create_step(&self, tour_id: Uuid, new: &NewStep) -> Result<Step> {
        new.validate()?;

        let _write = self.gate.write().await;
        let tx = self.begin("create_step").await?;
        let result = create_step_tx(&tx, tour_id, new).await;
        let step = finish(tx, result, "create_step").await?;

        debug!(tour_id = %tour_id, step_id = %step.id, order_index = step.order_index, "Step created");
        Ok(step)
    }

    async fn update_step(&self, tour_id: Uuid, step_id: Uuid, patch: &StepPatch) -> Result<Step> {
        if patch.is_empty() {
            return Err(Error::Validation("no fields to update".to_string()));
        }
        patch.validate()?;

        let _write = self.gate.write().await;
        let tx = self.begin("update_step").await?;
        let result = update_step_tx(&tx, tour_id, step_id, patch).await;
        let step = finish(tx, result, "update_step").await?;

        debug!(tour_id = %tour_id, step_id = %step_id, "Step updated");
        Ok(step)
    }

    async fn delete_step(&self, tour_id: Uuid, step_id: Uuid) -> Result<()> {
        let _write = self.gate.write().await;
        let tx = self.begin("delete_step").await?;
        let result = delete_step_tx(&tx, tour_id, step_id).await;
        let removed = finish(tx, result, "delete_step").await?;

        if removed {
            debug!(tour_id = %tour_id, step_id = %step_id, "Step deleted and siblings resequenced");
        }
        Ok(())
    }

    async fn reorder_steps(&self, tour_id: Uuid, updates: &[StepOrder]) -> Result<()> {
        let _write = self.gate.write().await;
        let tx = self.begin("reorder_steps").await?;
        let result = reorder_steps_tx(&tx, tour_id, updates).await;
        finish(tx, result, "reorder_steps").await?;

        debug!(tour_id = %tour_id, count = updates.len(), "Steps reordered");
        Ok(())
    }

    async fn set_step_translations(
        &self,
        tour_id: Uuid,
        maps: &[(Uuid, TranslationMap)],
    ) -> Result<()> {
        let _write = self.gate.write().await;
        let tx = self.begin("set_step_translations").await?;
        let result = set_step_translations_tx(&tx, tour_id, maps).await;
        finish(tx, result, "set_step_translations").await
    }

    // ── Resolver reads ──────────────────────────────────────────────

    async fn list_active_tours(&self, device: Option<DeviceVisibility>) -> Result<Vec<Tour>> {
        let _read = self.gate.read().await;

        let device = device.unwrap_or_default();
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TOUR_COLUMNS} FROM tours \
                     WHERE is_active = 1 AND (device_visibility = 'all' OR device_visibility = ?1) \
                     ORDER BY created_at ASC, rowid ASC"
                ),
                params![device.as_str()],
            )
            .await
            .map_err(|e| query_err("list_active_tours", e))?;

        let mut tours = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| query_err("list_active_tours row", e))?
        {
            tours.push(row_to_tour(&row)?);
        }
        Ok(tours)
    }

    async fn list_steps_for_tours(&self, tour_ids: &[Uuid]) -> Result<Vec<Step>> {
        if tour_ids.is_empty() {
            return Ok(Vec::new());
        }
        let _read = self.gate.read().await;

        let placeholders = (1..=tour_ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let values = tour_ids
            .iter()
            .map(|id| Value::Text(id.to_string()))
            .collect();

        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {STEP_COLUMNS} FROM steps WHERE tour_id IN ({placeholders}) \
                     ORDER BY order_index ASC"
                ),
                Params::Positional(values),
            )
            .await
            .map_err(|e| query_err("list_steps_for_tours", e))?;

        let mut steps = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| query_err("list_steps_for_tours row", e))?
        {
            steps.push(row_to_step(&row)?);
        }
        Ok(steps)
    }
}
