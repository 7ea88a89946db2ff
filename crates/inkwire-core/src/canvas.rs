//! Derived canvas state handed to renderers.

use crate::layers::LayerId;
use crate::stroke::Stroke;

/// One visible slice of finalized strokes.
#[derive(Debug, Clone, Copy)]
pub struct LayerView<'a> {
    /// `None` when the canvas has no layers (flat store).
    pub id: Option<LayerId>,
    pub name: &'a str,
    pub opacity: f64,
    pub strokes: &'a [Stroke],
}

/// Everything a renderer needs to repaint the canvas, bottom to top.
///
/// Built on demand from the engine's stores and never kept around: hidden
/// layers are already filtered out, and in-progress strokes always sit on
/// top regardless of layers.
#[derive(Debug, Clone, Default)]
pub struct CanvasState<'a> {
    layers: Vec<LayerView<'a>>,
    in_progress: Vec<&'a Stroke>,
}

impl<'a> CanvasState<'a> {
    pub fn new(layers: Vec<LayerView<'a>>, in_progress: Vec<&'a Stroke>) -> Self {
        Self { layers, in_progress }
    }

    /// Visible layers, bottom to top.
    pub fn layers(&self) -> &[LayerView<'a>] {
        &self.layers
    }

    /// Open strokes drawn above every layer.
    pub fn in_progress(&self) -> &[&'a Stroke] {
        &self.in_progress
    }

    /// Every stroke in paint order along with the opacity to paint it with.
    pub fn paint_order(&self) -> impl Iterator<Item = (&'a Stroke, f64)> + '_ {
        self.layers
            .iter()
            .flat_map(|view| view.strokes.iter().map(move |s| (s, view.opacity)))
            .chain(self.in_progress.iter().map(|s| (*s, 1.0)))
    }

    /// Number of finalized strokes in visible layers.
    pub fn finalized_count(&self) -> usize {
        self.layers.iter().map(|v| v.strokes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.finalized_count() == 0 && self.in_progress.is_empty()
    }
}
