//! Tour and step data model — entities, typed inputs, and patches.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::Error;

pub const DEFAULT_SHADOW_RGB: &str = "0,0,0";
pub const DEFAULT_SHADOW_OPACITY: &str = "0.2";
pub const DEFAULT_BG_COLOR: &str = "bg-white dark:bg-slate-900";
pub const DEFAULT_TEXT_COLOR: &str = "text-slate-600 dark:text-slate-400";
pub const DEFAULT_FONT_FAMILY: &str = "font-sans";
pub const DEFAULT_POINTER_PADDING: i64 = 10;
pub const DEFAULT_POINTER_RADIUS: i64 = 10;

/// Which device classes a tour is shown on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceVisibility {
    #[default]
    All,
    Desktop,
    Mobile,
}

impl DeviceVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for DeviceVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceVisibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            other => Err(format!("unknown device visibility: {other}")),
        }
    }
}

/// Placement of the step card relative to its anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    LeftTop,
    LeftBottom,
    RightTop,
    RightBottom,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Left => "left",
            Self::Right => "right",
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::LeftTop => "left-top",
            Self::LeftBottom => "left-bottom",
            Self::RightTop => "right-top",
            Self::RightBottom => "right-bottom",
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown side: {s}"))
    }
}

/// One locale's override text. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl LocalizedText {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
        }
    }

    /// Non-empty title, if any.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    /// Non-empty content, if any.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }

    /// Both title and content present and non-empty.
    pub fn is_complete(&self) -> bool {
        self.title().is_some() && self.content().is_some()
    }
}

/// Locale code → override text.
pub type TranslationMap = BTreeMap<String, LocalizedText>;

/// A persisted tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub id: Uuid,
    /// Unique slug used by the playback client.
    #[serde(rename = "tour_id")]
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub page_path: String,
    pub is_active: bool,
    pub shadow_rgb: String,
    pub shadow_opacity: String,
    pub interact: bool,
    pub card_transition: Option<serde_json::Value>,
    /// Stored and returned verbatim; not interpreted server-side.
    pub show_condition: Option<serde_json::Value>,
    pub bg_color: String,
    pub text_color: String,
    pub font_family: String,
    pub device_visibility: DeviceVisibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tour in list views, with its step count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourSummary {
    #[serde(flatten)]
    pub tour: Tour,
    pub steps_count: i64,
}

/// A tour with its steps ordered by `order_index`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourWithSteps {
    #[serde(flatten)]
    pub tour: Tour,
    pub steps: Vec<Step>,
}

/// A persisted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    /// Owning tour's `id`.
    pub tour_id: Uuid,
    pub order_index: i64,
    pub title: String,
    pub content: String,
    pub icon: Option<String>,
    pub selector: String,
    pub side: Side,
    pub show_controls: bool,
    pub pointer_padding: i64,
    pub pointer_radius: i64,
    pub next_route: Option<String>,
    pub prev_route: Option<String>,
    #[serde(default)]
    pub translations: TranslationMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a tour. Blank identity fields fail validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTour {
    #[serde(default, rename = "tour_id")]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub page_path: String,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub shadow_rgb: Option<String>,
    #[serde(default)]
    pub shadow_opacity: Option<String>,
    #[serde(default)]
    pub interact: Option<bool>,
    #[serde(default)]
    pub card_transition: Option<serde_json::Value>,
    #[serde(default)]
    pub show_condition: Option<serde_json::Value>,
    #[serde(default)]
    pub bg_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub device_visibility: Option<DeviceVisibility>,
}

impl NewTour {
    pub fn new(
        slug: impl Into<String>,
        name: impl Into<String>,
        page_path: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            page_path: page_path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        require("tour_id", &self.slug)?;
        require("name", &self.name)?;
        require("page_path", &self.page_path)
    }
}

/// Partial tour update. Absent fields are left untouched; unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TourPatch {
    #[serde(default, rename = "tour_id")]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub page_path: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub shadow_rgb: Option<String>,
    #[serde(default)]
    pub shadow_opacity: Option<String>,
    #[serde(default)]
    pub interact: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub card_transition: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "double_option")]
    pub show_condition: Option<Option<serde_json::Value>>,
    #[serde(default)]
    pub bg_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub device_visibility: Option<DeviceVisibility>,
}

impl TourPatch {
    pub fn is_empty(&self) -> bool {
        self.slug.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.page_path.is_none()
            && self.is_active.is_none()
            && self.shadow_rgb.is_none()
            && self.shadow_opacity.is_none()
            && self.interact.is_none()
            && self.card_transition.is_none()
            && self.show_condition.is_none()
            && self.bg_color.is_none()
            && self.text_color.is_none()
            && self.font_family.is_none()
            && self.device_visibility.is_none()
    }

    /// Reject blank values for the required identity fields.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(slug) = &self.slug {
            require("tour_id", slug)?;
        }
        if let Some(name) = &self.name {
            require("name", name)?;
        }
        if let Some(page_path) = &self.page_path {
            require("page_path", page_path)?;
        }
        Ok(())
    }

    /// Copy every present field onto `tour`.
    pub fn apply(&self, tour: &mut Tour) {
        if let Some(v) = &self.slug {
            tour.slug = v.clone();
        }
        if let Some(v) = &self.name {
            tour.name = v.clone();
        }
        if let Some(v) = &self.description {
            tour.description = v.clone();
        }
        if let Some(v) = &self.page_path {
            tour.page_path = v.clone();
        }
        if let Some(v) = self.is_active {
            tour.is_active = v;
        }
        if let Some(v) = &self.shadow_rgb {
            tour.shadow_rgb = v.clone();
        }
        if let Some(v) = &self.shadow_opacity {
            tour.shadow_opacity = v.clone();
        }
        if let Some(v) = self.interact {
            tour.interact = v;
        }
        if let Some(v) = &self.card_transition {
            tour.card_transition = v.clone();
        }
        if let Some(v) = &self.show_condition {
            tour.show_condition = v.clone();
        }
        if let Some(v) = &self.bg_color {
            tour.bg_color = v.clone();
        }
        if let Some(v) = &self.text_color {
            tour.text_color = v.clone();
        }
        if let Some(v) = &self.font_family {
            tour.font_family = v.clone();
        }
        if let Some(v) = self.device_visibility {
            tour.device_visibility = v;
        }
    }
}

/// Fields for creating a step. `order_index` is always computed by the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStep {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub show_controls: Option<bool>,
    #[serde(default)]
    pub pointer_padding: Option<i64>,
    #[serde(default)]
    pub pointer_radius: Option<i64>,
    #[serde(default)]
    pub next_route: Option<String>,
    #[serde(default)]
    pub prev_route: Option<String>,
    #[serde(default)]
    pub translations: Option<TranslationMap>,
}

impl NewStep {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            selector: selector.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        require("title", &self.title)?;
        require("content", &self.content)?;
        require("selector", &self.selector)
    }
}

/// Partial step update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub icon: Option<Option<String>>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub show_controls: Option<bool>,
    #[serde(default)]
    pub pointer_padding: Option<i64>,
    #[serde(default)]
    pub pointer_radius: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub next_route: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub prev_route: Option<Option<String>>,
    #[serde(default)]
    pub translations: Option<TranslationMap>,
}

impl StepPatch {
    /// A patch that only replaces the translation map.
    pub fn translations(map: TranslationMap) -> Self {
        Self {
            translations: Some(map),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.icon.is_none()
            && self.selector.is_none()
            && self.side.is_none()
            && self.show_controls.is_none()
            && self.pointer_padding.is_none()
            && self.pointer_radius.is_none()
            && self.next_route.is_none()
            && self.prev_route.is_none()
            && self.translations.is_none()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let Some(title) = &self.title {
            require("title", title)?;
        }
        if let Some(content) = &self.content {
            require("content", content)?;
        }
        if let Some(selector) = &self.selector {
            require("selector", selector)?;
        }
        Ok(())
    }

    /// Copy every present field onto `step`.
    pub fn apply(&self, step: &mut Step) {
        if let Some(v) = &self.title {
            step.title = v.clone();
        }
        if let Some(v) = &self.content {
            step.content = v.clone();
        }
        if let Some(v) = &self.icon {
            step.icon = v.clone();
        }
        if let Some(v) = &self.selector {
            step.selector = v.clone();
        }
        if let Some(v) = self.side {
            step.side = v;
        }
        if let Some(v) = self.show_controls {
            step.show_controls = v;
        }
        if let Some(v) = self.pointer_padding {
            step.pointer_padding = v;
        }
        if let Some(v) = self.pointer_radius {
            step.pointer_radius = v;
        }
        if let Some(v) = &self.next_route {
            step.next_route = v.clone();
        }
        if let Some(v) = &self.prev_route {
            step.prev_route = v.clone();
        }
        if let Some(v) = &self.translations {
            step.translations = v.clone();
        }
    }
}

/// New position for one step in a reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOrder {
    pub id: Uuid,
    pub order_index: i64,
}

/// Active-state filter for the tour list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveFilter {
    Active,
    Inactive,
}

impl ActiveFilter {
    /// `"active"` / `"inactive"`; anything else means no filter.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Filters for listing tours.
#[derive(Debug, Clone, Default)]
pub struct TourFilter {
    /// Case-insensitive substring matched against name or page path.
    pub search: Option<String>,
    pub active: Option<ActiveFilter>,
}

fn require(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Distinguishes an absent key (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
