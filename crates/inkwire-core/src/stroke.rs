//! Freehand strokes and their paint style.

use kurbo::{BezPath, Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Canvas background; eraser strokes paint with this color.
pub const BACKGROUND_COLOR: &str = "#ffffff";

/// Stroke errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrokeError {
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    #[error("Invalid stroke width: {0}")]
    InvalidWidth(f64),
    #[error("Stroke has no points")]
    EmptyStroke,
}

/// Opaque identifier of a drawing participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Owner of strokes whose origin is not known (e.g. snapshot strokes
    /// recorded without an owner).
    pub fn unknown() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Paint style shared by every point of a stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    /// CSS color string, e.g. `#f00`.
    pub color: String,
    /// Line width in device pixels. Always positive.
    pub width: f64,
    /// Eraser strokes paint in the background color.
    pub is_eraser: bool,
}

impl StrokeStyle {
    /// Create a style, rejecting non-positive or non-finite widths.
    pub fn new(color: impl Into<String>, width: f64, is_eraser: bool) -> Result<Self, StrokeError> {
        if !width.is_finite() || width <= 0.0 {
            return Err(StrokeError::InvalidWidth(width));
        }
        Ok(Self {
            color: color.into(),
            width,
            is_eraser,
        })
    }

    /// Plain pen style.
    pub fn pen(color: impl Into<String>, width: f64) -> Result<Self, StrokeError> {
        Self::new(color, width, false)
    }
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            width: 2.0,
            is_eraser: false,
        }
    }
}

/// One continuous drawn gesture.
///
/// Points are kept in temporal order. A stroke always holds at least one
/// point: it is created from its origin and only ever grows until it is
/// finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    points: Vec<Point>,
    style: StrokeStyle,
    owner: ParticipantId,
}

impl Stroke {
    /// Start a stroke at `origin`.
    pub fn begin(origin: Point, style: StrokeStyle, owner: ParticipantId) -> Self {
        Self {
            points: vec![origin],
            style,
            owner,
        }
    }

    /// Build a stroke from already-recorded points.
    pub fn from_points(
        points: Vec<Point>,
        style: StrokeStyle,
        owner: ParticipantId,
    ) -> Result<Self, StrokeError> {
        if points.is_empty() {
            return Err(StrokeError::EmptyStroke);
        }
        Ok(Self { points, style, owner })
    }

    /// Append points to the end of the stroke.
    pub(crate) fn extend_points(&mut self, points: impl IntoIterator<Item = Point>) {
        self.points.extend(points);
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn style(&self) -> &StrokeStyle {
        &self.style
    }

    pub fn owner(&self) -> &ParticipantId {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_eraser(&self) -> bool {
        self.style.is_eraser
    }

    /// The color this stroke is actually painted with.
    pub fn paint_color(&self) -> &str {
        if self.style.is_eraser {
            BACKGROUND_COLOR
        } else {
            &self.style.color
        }
    }

    /// Points from `from_index` to the end, for segment-incremental painting.
    pub fn segment_from(&self, from_index: usize) -> &[Point] {
        let start = from_index.min(self.points.len());
        &self.points[start..]
    }

    /// Bounding box of all points, without accounting for line width.
    pub fn bounds(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::ZERO;
        };
        self.points
            .iter()
            .fold(Rect::from_points(*first, *first), |rect, p| rect.union_pt(*p))
    }

    /// Polyline through all points.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();

        if let Some(first) = self.points.first() {
            path.move_to(*first);
            for point in self.points.iter().skip(1) {
                path.line_to(*point);
            }
        }

        path
    }
}

/// Whether both coordinates are finite.
pub fn is_finite_point(point: &Point) -> bool {
    point.x.is_finite() && point.y.is_finite()
}
