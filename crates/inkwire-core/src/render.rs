//! Renderer collaborator interface.

use crate::canvas::CanvasState;
use crate::stroke::Stroke;

/// Paints strokes; implemented outside the engine.
///
/// The renderer only ever reads engine state. `paint_segment` is the cheap
/// path used while a stroke grows; `repaint_all` redraws from scratch after
/// any change that can affect stacking.
pub trait Renderer {
    /// Paint `stroke` from point `from_index` to its end.
    fn paint_segment(&mut self, stroke: &Stroke, from_index: usize);

    /// Clear and repaint the whole canvas.
    fn repaint_all(&mut self, canvas: &CanvasState<'_>);
}

/// Renderer that draws nothing, for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn paint_segment(&mut self, _stroke: &Stroke, _from_index: usize) {}

    fn repaint_all(&mut self, _canvas: &CanvasState<'_>) {}
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn paint_segment(&mut self, stroke: &Stroke, from_index: usize) {
        (**self).paint_segment(stroke, from_index);
    }

    fn repaint_all(&mut self, canvas: &CanvasState<'_>) {
        (**self).repaint_all(canvas);
    }
}

/// Records renderer calls so tests can assert on them.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingRenderer {
    /// `(owner, from_index, points painted)` per segment call.
    pub segments: Vec<(String, usize, usize)>,
    /// Finalized stroke count seen by each full repaint.
    pub repaints: Vec<usize>,
}

#[cfg(test)]
impl RecordingRenderer {
    pub fn repaint_count(&self) -> usize {
        self.repaints.len()
    }
}

#[cfg(test)]
impl Renderer for RecordingRenderer {
    fn paint_segment(&mut self, stroke: &Stroke, from_index: usize) {
        self.segments.push((
            stroke.owner().to_string(),
            from_index,
            stroke.segment_from(from_index).len(),
        ));
    }

    fn repaint_all(&mut self, canvas: &CanvasState<'_>) {
        self.repaints.push(canvas.finalized_count());
    }
}
