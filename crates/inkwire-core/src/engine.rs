//! The stroke synchronization engine.
//!
//! [`Engine`] owns all drawing state of one canvas: the local builder, the
//! remote stroke table, finalized strokes (flat or layered), the renderer,
//! and the queue of outgoing wire events. Every entry point runs to
//! completion, so no locking is involved; the renderer only reads.
//!
//! Painting policy:
//! - growing a stroke (local or remote) paints just the new segment;
//! - anything that changes finalized strokes or layers triggers exactly
//!   one full repaint, or one per [`Engine::batch`].

use crate::builder::LocalStrokeBuilder;
use crate::canvas::{CanvasState, LayerView};
use crate::layers::{LayerError, LayerId, LayerManager};
use crate::protocol::{ClientMessage, MovePayload, StartPayload};
use crate::remote::RemoteStrokeTable;
use crate::render::Renderer;
use crate::store::StrokeStore;
use crate::stroke::{ParticipantId, Stroke, StrokeError, StrokeStyle};
use kurbo::Point;

/// Where finalized strokes live.
#[derive(Debug, Clone)]
enum StrokeStorage {
    Flat(StrokeStore),
    Layered(LayerManager),
}

impl StrokeStorage {
    fn append(&mut self, stroke: Stroke) -> Result<(), LayerError> {
        match self {
            StrokeStorage::Flat(store) => {
                store.append(stroke);
                Ok(())
            }
            StrokeStorage::Layered(layers) => layers.route_stroke(stroke).map(|_| ()),
        }
    }

    fn undo_last(&mut self, local: &[ParticipantId]) -> Option<Stroke> {
        match self {
            StrokeStorage::Flat(store) => store.undo_last(local),
            StrokeStorage::Layered(layers) => layers.undo_last(local),
        }
    }

    fn clear(&mut self) {
        match self {
            StrokeStorage::Flat(store) => store.clear(),
            StrokeStorage::Layered(layers) => layers.clear_strokes(),
        }
    }

    fn len(&self) -> usize {
        match self {
            StrokeStorage::Flat(store) => store.len(),
            StrokeStorage::Layered(layers) => layers.stroke_count(),
        }
    }

    fn views(&self) -> Vec<LayerView<'_>> {
        match self {
            StrokeStorage::Flat(store) => vec![LayerView {
                id: None,
                name: "",
                opacity: 1.0,
                strokes: store.strokes(),
            }],
            StrokeStorage::Layered(layers) => layers
                .visible_layers()
                .map(|layer| LayerView {
                    id: Some(layer.id()),
                    name: &layer.name,
                    opacity: layer.opacity(),
                    strokes: layer.strokes(),
                })
                .collect(),
        }
    }
}

/// Stroke engine for one canvas.
pub struct Engine<R: Renderer> {
    local: ParticipantId,
    /// Every id this participant has drawn under, `local` included.
    own_ids: Vec<ParticipantId>,
    builder: LocalStrokeBuilder,
    remote: RemoteStrokeTable,
    storage: StrokeStorage,
    renderer: R,
    /// Pending outgoing wire events.
    outgoing: Vec<ClientMessage>,
    /// Whether a snapshot was loaded on the current connection.
    hydrated: bool,
    batch_depth: usize,
    repaint_pending: bool,
}

impl<R: Renderer> Engine<R> {
    /// Create an engine with a flat stroke store.
    pub fn new(local: ParticipantId, renderer: R) -> Self {
        Self::with_storage(local, renderer, StrokeStorage::Flat(StrokeStore::new()))
    }

    /// Create an engine whose strokes are partitioned into layers.
    pub fn with_layers(local: ParticipantId, renderer: R) -> Self {
        Self::with_storage(local, renderer, StrokeStorage::Layered(LayerManager::new()))
    }

    fn with_storage(local: ParticipantId, renderer: R, storage: StrokeStorage) -> Self {
        Self {
            builder: LocalStrokeBuilder::new(local.clone()),
            own_ids: vec![local.clone()],
            local,
            remote: RemoteStrokeTable::new(),
            storage,
            renderer,
            outgoing: Vec::new(),
            hydrated: false,
            batch_depth: 0,
            repaint_pending: false,
        }
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    /// Draw under `id` from now on, e.g. when the relay assigned a new one.
    ///
    /// Strokes drawn under earlier ids stay locally undoable.
    pub fn set_local_participant(&mut self, id: ParticipantId) {
        if id == self.local {
            return;
        }
        log::info!("local participant {} is now {}", self.local, id);
        if !self.own_ids.contains(&id) {
            self.own_ids.push(id.clone());
        }
        self.builder.set_owner(id.clone());
        self.local = id;
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    // --- Local drawing ---

    /// Start a local stroke at `origin` and announce it.
    ///
    /// Fails with [`StrokeError::InvalidState`] if a stroke is already in
    /// progress; nothing is painted or sent in that case.
    pub fn begin(&mut self, origin: Point, style: StrokeStyle) -> Result<(), StrokeError> {
        let payload = StartPayload::new(origin, &style);
        let stroke = self.builder.begin(origin, style)?;
        self.renderer.paint_segment(stroke, 0);
        self.outgoing.push(ClientMessage::DrawStart(payload));
        Ok(())
    }

    /// Append a point to the local stroke, paint the new segment and announce it.
    ///
    /// No-op (logged) when no stroke is in progress.
    pub fn extend(&mut self, point: Point) {
        let Some(from) = self.builder.extend(point) else {
            return;
        };
        if let Some(stroke) = self.builder.current() {
            self.renderer.paint_segment(stroke, from);
        }
        self.outgoing.push(ClientMessage::DrawMove(MovePayload::single(point)));
    }

    /// Finalize the local stroke into the active store and announce it.
    pub fn end(&mut self) {
        let Some(stroke) = self.builder.end() else {
            return;
        };
        if let Err(e) = self.storage.append(stroke) {
            log::error!("failed to store local stroke: {}", e);
        }
        self.outgoing.push(ClientMessage::DrawEnd);
        self.request_repaint();
    }

    /// Clear the canvas for everyone.
    pub fn clear(&mut self) {
        self.clear_all();
        self.outgoing.push(ClientMessage::DrawClear);
    }

    /// Remove the most recent local stroke.
    ///
    /// Remote strokes are never undone, and undo is not broadcast.
    pub fn undo_last(&mut self) -> Option<Stroke> {
        let undone = self.storage.undo_last(&self.own_ids)?;
        self.request_repaint();
        Some(undone)
    }

    // --- Remote events ---

    /// A participant started a stroke. Any unfinished stroke of theirs is abandoned.
    pub fn on_remote_start(&mut self, participant: ParticipantId, points: Vec<Point>, style: StrokeStyle) {
        let key = participant.clone();
        if let Err(e) = self.remote.start(participant, points, style) {
            log::debug!("dropping start from {}: {}", key, e);
            return;
        }
        if let Some(stroke) = self.remote.get(&key) {
            self.renderer.paint_segment(stroke, 0);
        }
    }

    /// A participant extended their stroke. Dropped if they have none open.
    pub fn on_remote_move(&mut self, participant: &ParticipantId, points: Vec<Point>) {
        let Some(from) = self.remote.append(participant, points) else {
            return;
        };
        if let Some(stroke) = self.remote.get(participant) {
            self.renderer.paint_segment(stroke, from);
        }
    }

    /// A participant finished their stroke. No-op if they have none open.
    pub fn on_remote_end(&mut self, participant: &ParticipantId) {
        let Some(stroke) = self.remote.finish(participant) else {
            log::debug!("ignoring end from {} with no open stroke", participant);
            return;
        };
        if let Err(e) = self.storage.append(stroke) {
            log::error!("failed to store stroke from {}: {}", participant, e);
        }
        self.request_repaint();
    }

    /// Someone cleared the canvas.
    pub fn on_remote_clear(&mut self) {
        self.clear_all();
    }

    /// Drop finalized strokes and every participant's open stroke, local included.
    fn clear_all(&mut self) {
        self.storage.clear();
        self.remote.clear();
        if self.builder.abandon().is_some() {
            log::debug!("clear abandoned the local stroke in progress");
        }
        self.request_repaint();
    }

    // --- Hydration ---

    /// Load the relay's snapshot, at most once per connection.
    ///
    /// Strokes are appended in the order received. A second call on the
    /// same connection is an `InvalidState` no-op.
    pub fn hydrate(&mut self, strokes: Vec<Stroke>) -> Result<(), StrokeError> {
        if self.hydrated {
            log::warn!("ignoring second snapshot on the same connection");
            return Err(StrokeError::InvalidState("already hydrated on this connection"));
        }
        self.load_snapshot(strokes);
        Ok(())
    }

    /// Replace all finalized and remote in-progress strokes with a snapshot.
    ///
    /// Used after a reconnect, where appending would duplicate strokes
    /// already held locally.
    pub fn rehydrate(&mut self, strokes: Vec<Stroke>) -> Result<(), StrokeError> {
        if self.hydrated {
            log::warn!("ignoring second snapshot on the same connection");
            return Err(StrokeError::InvalidState("already hydrated on this connection"));
        }
        self.batch(|engine| {
            engine.storage.clear();
            engine.remote.clear();
            engine.load_snapshot(strokes);
        });
        Ok(())
    }

    fn load_snapshot(&mut self, strokes: Vec<Stroke>) {
        let count = strokes.len();
        for stroke in strokes {
            if let Err(e) = self.storage.append(stroke) {
                log::error!("failed to store snapshot stroke: {}", e);
            }
        }
        self.hydrated = true;
        log::debug!("hydrated {} strokes", count);
        self.request_repaint();
    }

    /// Forget per-connection state so the next connection can hydrate again.
    pub fn reset_connection(&mut self) {
        self.hydrated = false;
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    // --- Layers ---

    /// The layer manager, when layers are enabled.
    pub fn layers(&self) -> Option<&LayerManager> {
        match &self.storage {
            StrokeStorage::Layered(layers) => Some(layers),
            StrokeStorage::Flat(_) => None,
        }
    }

    fn with_layers_mut<T>(
        &mut self,
        f: impl FnOnce(&mut LayerManager) -> Result<T, LayerError>,
    ) -> Result<T, LayerError> {
        let StrokeStorage::Layered(layers) = &mut self.storage else {
            return Err(LayerError::Disabled);
        };
        let result = f(layers)?;
        self.request_repaint();
        Ok(result)
    }

    pub fn create_layer(&mut self, name: impl Into<String>) -> Result<LayerId, LayerError> {
        let name = name.into();
        self.with_layers_mut(|layers| Ok(layers.create_layer(name)))
    }

    pub fn delete_layer(&mut self, id: LayerId) -> Result<(), LayerError> {
        self.with_layers_mut(|layers| layers.delete_layer(id).map(|_| ()))
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> Result<(), LayerError> {
        self.with_layers_mut(|layers| layers.set_active(id))
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> Result<(), LayerError> {
        self.with_layers_mut(|layers| layers.set_visible(id, visible))
    }

    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: f64) -> Result<(), LayerError> {
        self.with_layers_mut(|layers| layers.set_opacity(id, opacity))
    }

    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> Result<(), LayerError> {
        let name = name.into();
        self.with_layers_mut(|layers| layers.rename(id, name))
    }

    pub fn reorder_layer(&mut self, id: LayerId, new_order: usize) -> Result<(), LayerError> {
        self.with_layers_mut(|layers| layers.reorder(id, new_order))
    }

    // --- Rendering ---

    /// Run `f` with repaints coalesced into at most one at the end.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.hold_repaints();
        let result = f(self);
        self.release_repaints();
        result
    }

    /// Defer full repaints until the matching [`Engine::release_repaints`].
    ///
    /// Holds nest; segment painting is not deferred.
    pub fn hold_repaints(&mut self) {
        self.batch_depth += 1;
    }

    /// Release one hold, repainting once if anything was deferred.
    pub fn release_repaints(&mut self) {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 && self.repaint_pending {
            self.repaint_now();
        }
    }

    fn request_repaint(&mut self) {
        if self.batch_depth > 0 {
            self.repaint_pending = true;
        } else {
            self.repaint_now();
        }
    }

    fn repaint_now(&mut self) {
        self.repaint_pending = false;
        let state = build_canvas_state(&self.storage, &self.remote, &self.builder);
        self.renderer.repaint_all(&state);
    }

    /// The current canvas, bottom to top.
    pub fn canvas_state(&self) -> CanvasState<'_> {
        build_canvas_state(&self.storage, &self.remote, &self.builder)
    }

    // --- Queries ---

    /// All finalized strokes in storage order, including hidden layers.
    pub fn strokes(&self) -> Vec<&Stroke> {
        match &self.storage {
            StrokeStorage::Flat(store) => store.strokes().iter().collect(),
            StrokeStorage::Layered(layers) => layers
                .layers()
                .iter()
                .flat_map(|layer| layer.strokes().iter())
                .collect(),
        }
    }

    pub fn stroke_count(&self) -> usize {
        self.storage.len()
    }

    pub fn remote_strokes(&self) -> &RemoteStrokeTable {
        &self.remote
    }

    pub fn local_stroke(&self) -> Option<&Stroke> {
        self.builder.current()
    }

    pub fn is_drawing(&self) -> bool {
        self.builder.is_drawing()
    }

    // --- Outgoing events ---

    /// Take pending outgoing events (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }
}

/// Finalized visible strokes, then remote open strokes, then the local one.
fn build_canvas_state<'a>(
    storage: &'a StrokeStorage,
    remote: &'a RemoteStrokeTable,
    builder: &'a LocalStrokeBuilder,
) -> CanvasState<'a> {
    let in_progress = remote
        .iter()
        .map(|(_, stroke)| stroke)
        .chain(builder.current())
        .collect();
    CanvasState::new(storage.views(), in_progress)
}
