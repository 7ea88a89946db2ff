//! Layer partitioning of finalized strokes.
//!
//! Layers form an ordered stack (order `0` is the bottom). Every layer
//! holds its own strokes; new strokes always go to the single active
//! layer. The manager keeps these invariants:
//!
//! - `order` values are exactly `0..len`, unique and contiguous.
//! - at least one layer exists, and the active id always names one of them.

use crate::stroke::{ParticipantId, Stroke};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for layers.
pub type LayerId = Uuid;

/// Name given to the layer every manager starts with.
pub const DEFAULT_LAYER_NAME: &str = "Layer 1";

/// Layer manager errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerError {
    #[error("Layer not found: {0}")]
    NotFound(LayerId),
    #[error("Opacity out of range [0, 1]: {0}")]
    OutOfRange(f64),
    #[error("No active layer")]
    NoActiveLayer,
    #[error("Cannot delete the last remaining layer")]
    LastLayer,
    #[error("Layers are not enabled for this canvas")]
    Disabled,
}

/// A named, independently visible slice of the canvas.
#[derive(Debug, Clone)]
pub struct Layer {
    id: LayerId,
    pub name: String,
    visible: bool,
    opacity: f64,
    order: usize,
    strokes: Vec<Stroke>,
    /// Global append sequence of each stroke, parallel to `strokes`.
    sequence: Vec<u64>,
}

impl Layer {
    fn new(name: impl Into<String>, order: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            order,
            strokes: Vec::new(),
            sequence: Vec::new(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Stacking position; `0` is the bottom.
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    fn push(&mut self, stroke: Stroke, seq: u64) {
        self.strokes.push(stroke);
        self.sequence.push(seq);
    }

    /// Sequence number and index of the newest stroke owned by one of `owners`.
    fn newest_owned_by(&self, owners: &[ParticipantId]) -> Option<(u64, usize)> {
        self.strokes
            .iter()
            .zip(&self.sequence)
            .enumerate()
            .rev()
            .find(|(_, (stroke, _))| owners.contains(stroke.owner()))
            .map(|(index, (_, seq))| (*seq, index))
    }
}

/// Ordered stack of layers with one active layer.
#[derive(Debug, Clone)]
pub struct LayerManager {
    /// Layers sorted by `order`, so `layers[i].order == i`.
    layers: Vec<Layer>,
    active: LayerId,
    next_seq: u64,
}

impl Default for LayerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerManager {
    /// Create a manager with a single active layer.
    pub fn new() -> Self {
        let base = Layer::new(DEFAULT_LAYER_NAME, 0);
        let active = base.id;
        Self {
            layers: vec![base],
            active,
            next_seq: 0,
        }
    }

    // --- Layer lifecycle ---

    /// Create a new empty layer on top of the stack.
    ///
    /// The active layer is not changed.
    pub fn create_layer(&mut self, name: impl Into<String>) -> LayerId {
        let layer = Layer::new(name, self.layers.len());
        let id = layer.id;
        self.layers.push(layer);
        log::debug!("created layer {}", id);
        id
    }

    /// Delete a layer and discard its strokes.
    ///
    /// If the deleted layer was active, the layer directly below it (or
    /// above, for the bottom layer) becomes active.
    pub fn delete_layer(&mut self, id: LayerId) -> Result<Layer, LayerError> {
        let index = self.index_of(id)?;
        if self.layers.len() == 1 {
            return Err(LayerError::LastLayer);
        }

        let removed = self.layers.remove(index);
        self.renumber();

        if self.active == id {
            let next = index.saturating_sub(1);
            self.active = self.layers[next].id;
        }
        log::debug!("deleted layer {} with {} strokes", id, removed.strokes.len());
        Ok(removed)
    }

    /// Route subsequent new strokes to `id`.
    pub fn set_active(&mut self, id: LayerId) -> Result<(), LayerError> {
        self.index_of(id)?;
        self.active = id;
        Ok(())
    }

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> Result<(), LayerError> {
        let index = self.index_of(id)?;
        self.layers[index].visible = visible;
        Ok(())
    }

    /// Set a layer's opacity; values outside `[0, 1]` are rejected.
    pub fn set_opacity(&mut self, id: LayerId, opacity: f64) -> Result<(), LayerError> {
        let index = self.index_of(id)?;
        if !(0.0..=1.0).contains(&opacity) {
            return Err(LayerError::OutOfRange(opacity));
        }
        self.layers[index].opacity = opacity;
        Ok(())
    }

    pub fn rename(&mut self, id: LayerId, name: impl Into<String>) -> Result<(), LayerError> {
        let index = self.index_of(id)?;
        self.layers[index].name = name.into();
        Ok(())
    }

    /// Move a layer to stacking position `new_order`.
    ///
    /// The target is clamped to the stack. Layers in between shift by one
    /// so orders stay unique and contiguous.
    pub fn reorder(&mut self, id: LayerId, new_order: usize) -> Result<(), LayerError> {
        let index = self.index_of(id)?;
        let target = new_order.min(self.layers.len() - 1);
        let layer = self.layers.remove(index);
        self.layers.insert(target, layer);
        self.renumber();
        Ok(())
    }

    fn renumber(&mut self) {
        for (order, layer) in self.layers.iter_mut().enumerate() {
            layer.order = order;
        }
    }

    // --- Strokes ---

    /// Append a finalized stroke to the active layer.
    pub fn route_stroke(&mut self, stroke: Stroke) -> Result<LayerId, LayerError> {
        let active = self.active;
        let seq = self.next_seq;
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.id == active)
            .ok_or(LayerError::NoActiveLayer)?;
        layer.push(stroke, seq);
        self.next_seq += 1;
        Ok(active)
    }

    /// Remove the most recently routed stroke owned by any of `local`, across all layers.
    pub fn undo_last(&mut self, local: &[ParticipantId]) -> Option<Stroke> {
        let (layer_index, stroke_index) = self
            .layers
            .iter()
            .enumerate()
            .filter_map(|(li, layer)| layer.newest_owned_by(local).map(|(seq, si)| (seq, li, si)))
            .max_by_key(|(seq, _, _)| *seq)
            .map(|(_, li, si)| (li, si))?;

        let layer = &mut self.layers[layer_index];
        layer.sequence.remove(stroke_index);
        Some(layer.strokes.remove(stroke_index))
    }

    /// Remove every stroke from every layer. Layers themselves are kept.
    pub fn clear_strokes(&mut self) {
        for layer in &mut self.layers {
            layer.strokes.clear();
            layer.sequence.clear();
        }
    }

    // --- Queries ---

    pub fn active_id(&self) -> LayerId {
        self.active
    }

    pub fn active(&self) -> Option<&Layer> {
        self.get(self.active)
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// All layers, bottom to top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Visible layers, bottom to top.
    pub fn visible_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.visible)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total number of strokes across all layers.
    pub fn stroke_count(&self) -> usize {
        self.layers.iter().map(|l| l.strokes.len()).sum()
    }

    fn index_of(&self, id: LayerId) -> Result<usize, LayerError> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(LayerError::NotFound(id))
    }
}
