//! Rectangle annotation data model.
//!
//! Two representations live here: [`Annotation`], the entity as the
//! persistence layer stores it, and [`WorkingRectangle`], the in-memory edit
//! unit that carries a baseline snapshot for dirty tracking.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of an annotation. Persisted ids come from the gateway, local
/// ids are UUIDs generated before the first save.
pub type AnnotationId = String;

/// Minimum width/height of a rectangle in image pixels.
pub const MIN_RECT_SIZE: f32 = 5.0;

/// Side length of a freshly added rectangle.
pub const DEFAULT_RECT_SIZE: f32 = 100.0;

/// Color used when neither the user nor the stored annotation picked one.
pub const DEFAULT_COLOR: &str = "#F44336";

/// Generate a unique id for a rectangle that has not been persisted yet.
pub fn new_local_id() -> AnnotationId {
    uuid::Uuid::new_v4().to_string()
}

/// Current time as an ISO-8601 UTC timestamp with millisecond precision.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Annotation type discriminator. Only rectangles exist for now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    #[default]
    Rectangle,
}

// ── Persisted entity ────────────────────────────────────────────────────────

/// Coordinates as fetched from the store. Any field may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl From<PixelCoordinates> for Coordinates {
    fn from(c: PixelCoordinates) -> Self {
        Self {
            x: Some(c.x as f64),
            y: Some(c.y as f64),
            width: Some(c.width as f64),
            height: Some(c.height as f64),
        }
    }
}

/// Integer pixel coordinates sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCoordinates {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A rectangle annotation as the persistence layer stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(deserialize_with = "lenient_id")]
    pub id: AnnotationId,
    #[serde(default, deserialize_with = "lenient_image_id")]
    pub image_id: u64,
    #[serde(rename = "type", default)]
    pub kind: AnnotationType,
    #[serde(default)]
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Annotation {
    /// Build the stored entity for a create request once the store picked an id.
    pub fn from_create(id: AnnotationId, payload: &CreateAnnotationPayload) -> Self {
        Self {
            id,
            image_id: payload.image_id,
            kind: payload.kind,
            coordinates: payload.coordinates.into(),
            color: Some(payload.color.clone()),
            created_at: Some(payload.created_at.clone()),
            updated_at: None,
        }
    }

    /// Overwrite the mutable fields with an update request.
    pub fn apply_update(&mut self, payload: &UpdateAnnotationPayload) {
        self.kind = payload.kind;
        self.coordinates = payload.coordinates.into();
        self.color = Some(payload.color.clone());
        self.updated_at = Some(payload.updated_at.clone());
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

/// Ids may come back as numbers from some stores; keep them as strings.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Image ids are numeric; numeric strings are accepted and anything else
/// falls back to 0.
fn lenient_image_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s.trim().parse().unwrap_or(0),
        RawId::Number(n) => n.as_u64().unwrap_or(0),
    })
}

// ── Gateway payloads ────────────────────────────────────────────────────────

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotationPayload {
    pub image_id: u64,
    #[serde(rename = "type")]
    pub kind: AnnotationType,
    pub coordinates: PixelCoordinates,
    pub color: String,
    pub created_at: String,
}

impl CreateAnnotationPayload {
    pub fn from_rect(image_id: u64, rect: &WorkingRectangle, now: &str) -> Self {
        Self {
            image_id,
            kind: AnnotationType::Rectangle,
            coordinates: rect.pixel_coordinates(),
            color: rect.color.clone(),
            created_at: now.to_string(),
        }
    }
}

/// Body of an update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnotationPayload {
    pub id: AnnotationId,
    pub image_id: u64,
    #[serde(rename = "type")]
    pub kind: AnnotationType,
    pub coordinates: PixelCoordinates,
    pub color: String,
    pub updated_at: String,
}

impl UpdateAnnotationPayload {
    pub fn from_rect(image_id: u64, rect: &WorkingRectangle, now: &str) -> Self {
        Self {
            id: rect.id.clone(),
            image_id,
            kind: AnnotationType::Rectangle,
            coordinates: rect.pixel_coordinates(),
            color: rect.color.clone(),
            updated_at: now.to_string(),
        }
    }
}

// ── Working set ─────────────────────────────────────────────────────────────

/// The diffable part of a rectangle: geometry in image pixels plus color.
#[derive(Debug, Clone, PartialEq)]
pub struct RectShape {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: String,
}

/// Partial update merged into a working rectangle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RectanglePatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub color: Option<String>,
}

impl RectanglePatch {
    /// Patch produced by the end of a drag.
    pub fn moved_to(x: f32, y: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    /// Patch produced by the end of a resize.
    pub fn resized(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            width: Some(width),
            height: Some(height),
            color: None,
        }
    }

    pub fn recolored(color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            ..Default::default()
        }
    }
}

/// One rectangle in the edit session.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingRectangle {
    pub id: AnnotationId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: String,
    /// Last shape known to match the persisted state. `None` until the
    /// rectangle has been saved once.
    pub original: Option<RectShape>,
    /// True until the first save reconciles this rectangle.
    pub is_new: bool,
}

impl WorkingRectangle {
    /// Hydrate from a persisted annotation.
    ///
    /// Missing `x`/`y` become 0, missing or zero `width`/`height` become
    /// [`DEFAULT_RECT_SIZE`], and a missing or empty color becomes
    /// [`DEFAULT_COLOR`]. The baseline is taken after those defaults.
    pub fn from_annotation(annotation: &Annotation) -> Self {
        let c = &annotation.coordinates;
        let extent = |v: Option<f64>| match v {
            Some(v) if v != 0.0 && v.is_finite() => (v as f32).max(MIN_RECT_SIZE),
            _ => DEFAULT_RECT_SIZE,
        };
        let offset = |v: Option<f64>| v.filter(|v| v.is_finite()).unwrap_or(0.0) as f32;
        let color = annotation
            .color
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COLOR)
            .to_string();

        let mut rect = Self {
            id: annotation.id.clone(),
            x: offset(c.x),
            y: offset(c.y),
            width: extent(c.width),
            height: extent(c.height),
            color,
            original: None,
            is_new: false,
        };
        rect.commit_baseline();
        rect
    }

    /// A new, unsaved rectangle of the default size.
    pub fn new_local(x: f32, y: f32, color: impl Into<String>) -> Self {
        Self {
            id: new_local_id(),
            x,
            y,
            width: DEFAULT_RECT_SIZE,
            height: DEFAULT_RECT_SIZE,
            color: color.into(),
            original: None,
            is_new: true,
        }
    }

    pub fn shape(&self) -> RectShape {
        RectShape {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            color: self.color.clone(),
        }
    }

    /// Field-level comparison against the baseline. New rectangles are never
    /// "modified"; they are new.
    pub fn is_modified(&self) -> bool {
        if self.is_new {
            return false;
        }
        match &self.original {
            Some(original) => *original != self.shape(),
            None => false,
        }
    }

    /// Merge a patch, flooring width and height at [`MIN_RECT_SIZE`].
    pub fn apply(&mut self, patch: &RectanglePatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(width) = patch.width {
            self.width = width.max(MIN_RECT_SIZE);
        }
        if let Some(height) = patch.height {
            self.height = height.max(MIN_RECT_SIZE);
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
    }

    /// Mark the current shape as the persisted one. The baseline is replaced,
    /// never edited in place.
    pub fn commit_baseline(&mut self) {
        self.original = Some(self.shape());
        self.is_new = false;
    }

    /// Coordinates rounded to whole pixels for the store.
    pub fn pixel_coordinates(&self) -> PixelCoordinates {
        PixelCoordinates {
            x: self.x.round() as i32,
            y: self.y.round() as i32,
            width: self.width.round() as i32,
            height: self.height.round() as i32,
        }
    }

    /// Check if an image-space point lies inside this rectangle.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}
