//! Accumulates the stroke currently drawn by the local participant.

use crate::stroke::{ParticipantId, Stroke, StrokeError, StrokeStyle, is_finite_point};
use kurbo::Point;

/// Builder for the local in-progress stroke.
///
/// At most one stroke is in progress at a time. The builder only holds
/// points; painting and event emission are driven by the engine.
#[derive(Debug, Clone)]
pub struct LocalStrokeBuilder {
    owner: ParticipantId,
    current: Option<Stroke>,
}

impl LocalStrokeBuilder {
    /// Create an idle builder for strokes owned by `owner`.
    pub fn new(owner: ParticipantId) -> Self {
        Self { owner, current: None }
    }

    /// Start a new stroke at `origin`.
    ///
    /// Fails with [`StrokeError::InvalidState`] if a stroke is already in
    /// progress; the existing stroke is left untouched.
    pub fn begin(&mut self, origin: Point, style: StrokeStyle) -> Result<&Stroke, StrokeError> {
        if self.current.is_some() {
            log::warn!("begin called while a local stroke is already in progress");
            return Err(StrokeError::InvalidState("stroke already in progress"));
        }
        if !is_finite_point(&origin) {
            log::warn!("begin called with non-finite origin {:?}", origin);
            return Err(StrokeError::InvalidState("non-finite stroke origin"));
        }
        let stroke = self
            .current
            .insert(Stroke::begin(origin, style, self.owner.clone()));
        Ok(&*stroke)
    }

    /// Append a point to the in-progress stroke.
    ///
    /// Returns the index of the point the new segment starts from, or
    /// `None` (with a warning) when no stroke is in progress.
    pub fn extend(&mut self, point: Point) -> Option<usize> {
        let Some(stroke) = self.current.as_mut() else {
            log::warn!("extend called with no local stroke in progress");
            return None;
        };
        if !is_finite_point(&point) {
            log::warn!("extend called with non-finite point {:?}", point);
            return None;
        }
        let from = stroke.len() - 1;
        stroke.extend_points([point]);
        Some(from)
    }

    /// Finish the in-progress stroke and hand it over, leaving the builder idle.
    pub fn end(&mut self) -> Option<Stroke> {
        self.current.take()
    }

    /// Drop the in-progress stroke without finalizing it.
    pub fn abandon(&mut self) -> Option<Stroke> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&Stroke> {
        self.current.as_ref()
    }

    pub fn is_drawing(&self) -> bool {
        self.current.is_some()
    }

    pub fn owner(&self) -> &ParticipantId {
        &self.owner
    }

    /// Owner for strokes begun from now on. A stroke in progress keeps its owner.
    pub fn set_owner(&mut self, owner: ParticipantId) {
        self.owner = owner;
    }
}
