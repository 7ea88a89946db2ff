//! Room registry and per-room canvas state.
//!
//! A room fans events out over a broadcast channel and keeps enough stroke
//! state to answer snapshot fetches: open strokes per participant and the
//! finalized strokes, capped at `max_strokes`.

use crate::config::ServerConfig;
use dashmap::DashMap;
use inkwire_core::protocol::{ClientMessage, ProtocolError, ServerMessage, SnapshotResponse};
use inkwire_core::{ParticipantId, RemoteStrokeTable, StrokeStore};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::debug;

/// A broadcast event tagged with its sender.
pub type RoomEvent = (ParticipantId, ServerMessage);

/// Stroke state the relay keeps for one room.
#[derive(Debug)]
pub struct RoomCanvas {
    open: RemoteStrokeTable,
    finalized: StrokeStore,
    max_strokes: usize,
}

impl RoomCanvas {
    pub fn new(max_strokes: usize) -> Self {
        Self {
            open: RemoteStrokeTable::new(),
            finalized: StrokeStore::new(),
            max_strokes,
        }
    }

    /// Apply one draw event from `from`.
    ///
    /// Malformed events are rejected and must not be forwarded.
    /// Non-draw messages are ignored.
    pub fn apply(&mut self, from: &ParticipantId, msg: &ClientMessage) -> Result<(), ProtocolError> {
        match msg {
            ClientMessage::DrawStart(payload) => {
                let (origin, style) = payload.clone().into_parts()?;
                self.open.start(from.clone(), vec![origin], style)?;
            }
            ClientMessage::DrawMove(payload) => {
                let points = payload.clone().into_points()?;
                self.open.append(from, points);
            }
            ClientMessage::DrawEnd => {
                if let Some(stroke) = self.open.finish(from) {
                    self.finalized.append(stroke);
                    let evicted = self.finalized.evict_oldest(self.max_strokes);
                    if evicted > 0 {
                        debug!("evicted {} oldest strokes", evicted);
                    }
                }
            }
            ClientMessage::DrawClear => {
                self.open.clear();
                self.finalized.clear();
            }
            ClientMessage::Join { .. } | ClientMessage::Leave | ClientMessage::SnapshotFetch => {}
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SnapshotResponse {
        SnapshotResponse::from_strokes(self.finalized.strokes())
    }

    pub fn stroke_count(&self) -> usize {
        self.finalized.len()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

/// Room state
pub struct Room {
    tx: broadcast::Sender<RoomEvent>,
    peers: HashSet<ParticipantId>,
    canvas: RoomCanvas,
}

impl Room {
    fn new(config: &ServerConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity);
        Self {
            tx,
            peers: HashSet::new(),
            canvas: RoomCanvas::new(config.max_strokes),
        }
    }
}

/// Result of joining a room.
pub struct Joined {
    /// Id the peer is known by in the room.
    pub participant: ParticipantId,
    pub rx: broadcast::Receiver<RoomEvent>,
    pub peer_count: usize,
}

/// Shared application state
pub struct AppState {
    rooms: DashMap<String, Room>,
    config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Add a peer to a room, creating the room if needed.
    ///
    /// If `requested` is already present in the room a fresh id is minted.
    pub fn join_room(&self, room_id: &str, requested: ParticipantId) -> Joined {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(&self.config));

        let participant = if room.peers.contains(&requested) || requested.is_unknown() {
            let minted = ParticipantId::random();
            debug!("participant {} taken in {}, using {}", requested, room_id, minted);
            minted
        } else {
            requested
        };

        room.peers.insert(participant.clone());
        Joined {
            participant,
            rx: room.tx.subscribe(),
            peer_count: room.peers.len(),
        }
    }

    /// Remove a peer from a room.
    ///
    /// A room is dropped only once it has neither peers nor finalized
    /// strokes, so a canvas survives everyone disconnecting at once.
    pub fn leave_room(&self, room_id: &str, participant: &ParticipantId) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.peers.remove(participant);
        }
        // Re-checked under the shard lock: a concurrent join keeps the room.
        let removed = self
            .rooms
            .remove_if(room_id, |_, room| room.peers.is_empty() && room.canvas.stroke_count() == 0);
        if removed.is_some() {
            debug!("room {} is empty, removed", room_id);
        }
    }

    /// Broadcast a message to everyone in the room.
    pub fn broadcast(&self, room_id: &str, from: &ParticipantId, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from.clone(), msg));
        }
    }

    /// Apply a draw event to the room canvas and fan it out.
    pub fn relay_draw(
        &self,
        room_id: &str,
        from: &ParticipantId,
        msg: ClientMessage,
    ) -> Result<(), ProtocolError> {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return Ok(());
        };
        room.canvas.apply(from, &msg)?;
        if let Some(relayed) = ServerMessage::relay_from(from.clone(), msg) {
            let _ = room.tx.send((from.clone(), relayed));
        }
        Ok(())
    }

    /// Finalized strokes of a room; empty if the room does not exist.
    pub fn snapshot(&self, room_id: &str) -> SnapshotResponse {
        self.rooms
            .get(room_id)
            .map(|room| room.canvas.snapshot())
            .unwrap_or_default()
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.peers.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
