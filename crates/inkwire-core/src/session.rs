//! Binds an [`Engine`] to a [`Transport`].
//!
//! The session joins the configured room when the transport connects,
//! fetches the snapshot, feeds inbound draw events to the engine's
//! reducer and flushes the engine's outgoing events. All inbound
//! failures are dropped: one bad event never stops the ones after it.

use crate::config::ClientConfig;
use crate::engine::Engine;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::render::Renderer;
use crate::stroke::{ParticipantId, Stroke, StrokeError, StrokeStyle};
use crate::transport::{SyncEvent, Transport};
use kurbo::Point;

/// A drawing session against one relay room.
pub struct SyncSession<R: Renderer, T: Transport> {
    engine: Engine<R>,
    transport: T,
    config: ClientConfig,
    /// Room confirmed by the relay on the current connection.
    joined_room: Option<String>,
    /// Connections opened so far; snapshots after the first one replace state.
    connections: u32,
    peer_count: usize,
}

impl<R: Renderer, T: Transport> SyncSession<R, T> {
    /// Create a session. The engine is layered if the config asks for it.
    pub fn new(config: ClientConfig, renderer: R, transport: T) -> Self {
        let engine = if config.layers_enabled {
            Engine::with_layers(config.participant.clone(), renderer)
        } else {
            Engine::new(config.participant.clone(), renderer)
        };
        Self {
            engine,
            transport,
            config,
            joined_room: None,
            connections: 0,
            peer_count: 0,
        }
    }

    pub fn engine(&self) -> &Engine<R> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<R> {
        &mut self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn local_participant(&self) -> &ParticipantId {
        self.engine.local_participant()
    }

    /// Room confirmed by the relay, if any.
    pub fn current_room(&self) -> Option<&str> {
        self.joined_room.as_deref()
    }

    /// Peers in the room as last reported by the relay.
    pub fn peer_count(&self) -> usize {
        self.peer_count
    }

    // --- Event loop ---

    /// Process every pending transport event, then flush outgoing events.
    ///
    /// Events drained in one pump are applied as one batch, so a snapshot
    /// and the live events following it repaint once.
    /// Returns the number of events processed.
    pub fn pump(&mut self) -> usize {
        let events = self.transport.poll_events();
        let count = events.len();
        self.engine.hold_repaints();
        for event in events {
            self.handle_event(event);
        }
        self.engine.release_repaints();
        self.flush();
        count
    }

    /// Handle one transport event.
    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Connected => self.on_connected(),
            SyncEvent::Disconnected => {
                log::info!("disconnected from relay");
                self.joined_room = None;
                self.engine.reset_connection();
            }
            SyncEvent::Message(msg) => self.handle_message(msg),
            SyncEvent::Error { message } => log::warn!("transport error: {}", message),
        }
    }

    /// Handle one relay message.
    pub fn handle_message(&mut self, msg: ServerMessage) {
        let Some(msg) = apply_draw_event(&mut self.engine, msg) else {
            return;
        };
        match msg {
            ServerMessage::Joined { room, participant, peer_count } => {
                log::info!("joined room {} as {} ({} peers)", room, participant, peer_count);
                self.joined_room = Some(room);
                self.peer_count = peer_count;
                // The relay attributes our strokes to the id it confirms.
                self.engine.set_local_participant(participant);
            }
            ServerMessage::PeerJoined { participant } => {
                log::debug!("peer {} joined", participant);
                self.peer_count += 1;
            }
            ServerMessage::PeerLeft { participant } => {
                log::debug!("peer {} left", participant);
                self.peer_count = self.peer_count.saturating_sub(1);
            }
            ServerMessage::Snapshot(snapshot) => {
                self.load_snapshot(snapshot.into_strokes());
            }
            ServerMessage::Error { message } => log::warn!("relay error: {}", message),
            ServerMessage::DrawStart { .. }
            | ServerMessage::DrawMove { .. }
            | ServerMessage::DrawEnd { .. }
            | ServerMessage::DrawClear { .. } => {}
        }
    }

    /// Parse and handle a raw relay frame. Malformed frames are dropped.
    pub fn handle_text(&mut self, json: &str) {
        match ServerMessage::from_json(json) {
            Ok(msg) => self.handle_message(msg),
            Err(e) => log::debug!("dropping malformed relay frame: {}", e),
        }
    }

    fn on_connected(&mut self) {
        self.connections += 1;
        log::info!("connected to relay, joining room {}", self.config.room);
        self.engine.reset_connection();
        self.send(ClientMessage::Join {
            room: self.config.room.clone(),
            participant: Some(self.config.participant.clone()),
        });
        self.send(ClientMessage::SnapshotFetch);
    }

    fn load_snapshot(&mut self, strokes: Vec<Stroke>) {
        let result = if self.connections > 1 {
            self.engine.rehydrate(strokes)
        } else {
            self.engine.hydrate(strokes)
        };
        if let Err(e) = result {
            log::debug!("snapshot not loaded: {}", e);
        }
    }

    /// Send every queued engine event.
    pub fn flush(&mut self) {
        for msg in self.engine.take_outgoing() {
            self.send(msg);
        }
    }

    fn send(&mut self, msg: ClientMessage) {
        if let Err(e) = self.transport.send(&msg) {
            log::debug!("dropping outgoing event: {}", e);
        }
    }

    // --- Local drawing ---

    pub fn begin(&mut self, origin: Point, style: StrokeStyle) -> Result<(), StrokeError> {
        let result = self.engine.begin(origin, style);
        self.flush();
        result
    }

    pub fn extend(&mut self, point: Point) {
        self.engine.extend(point);
        self.flush();
    }

    pub fn end(&mut self) {
        self.engine.end();
        self.flush();
    }

    pub fn clear(&mut self) {
        self.engine.clear();
        self.flush();
    }

    pub fn undo_last(&mut self) -> Option<Stroke> {
        self.engine.undo_last()
    }

    /// Leave the room without closing the transport.
    pub fn leave(&mut self) {
        if self.joined_room.take().is_some() {
            self.send(ClientMessage::Leave);
        }
    }
}

/// Apply a draw event to the engine's reducer.
///
/// Returns the message back when it is not a draw event.
fn apply_draw_event<R: Renderer>(engine: &mut Engine<R>, msg: ServerMessage) -> Option<ServerMessage> {
    match msg {
        ServerMessage::DrawStart { from, payload } => {
            match payload.into_parts() {
                Ok((origin, style)) => engine.on_remote_start(from, vec![origin], style),
                Err(e) => log::debug!("dropping start from {}: {}", from, e),
            }
            None
        }
        ServerMessage::DrawMove { from, payload } => {
            match payload.into_points() {
                Ok(points) => engine.on_remote_move(&from, points),
                Err(e) => log::debug!("dropping move from {}: {}", from, e),
            }
            None
        }
        ServerMessage::DrawEnd { from } => {
            engine.on_remote_end(&from);
            None
        }
        ServerMessage::DrawClear { from } => {
            log::debug!("canvas cleared by {}", from);
            engine.on_remote_clear();
            None
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MovePayload, SnapshotResponse, StartPayload, WireStroke};
    use crate::render::RecordingRenderer;
    use crate::transport::MemoryTransport;

    fn session() -> SyncSession<RecordingRenderer, MemoryTransport> {
        let config = ClientConfig {
            participant: ParticipantId::from("me"),
            room: "room-1".to_string(),
            ..ClientConfig::default()
        };
        SyncSession::new(config, RecordingRenderer::default(), MemoryTransport::new())
    }

    fn connected() -> SyncSession<RecordingRenderer, MemoryTransport> {
        let mut session = session();
        session.transport_mut().push_event(SyncEvent::Connected);
        session.pump();
        session.transport_mut().take_sent();
        session
    }

    fn start(from: &str, x: f64, y: f64) -> ServerMessage {
        ServerMessage::DrawStart {
            from: ParticipantId::from(from),
            payload: StartPayload {
                x,
                y,
                color: "#f00".to_string(),
                width: 2.0,
                is_eraser: false,
            },
        }
    }

    fn snapshot(points: &[(f64, f64)]) -> ServerMessage {
        ServerMessage::Snapshot(SnapshotResponse {
            strokes: points
                .iter()
                .map(|&(x, y)| WireStroke {
                    points: vec![Point::new(x, y)],
                    color: "#000".to_string(),
                    stroke_width: 1.0,
                    is_eraser: false,
                    owner_id: None,
                })
                .collect(),
        })
    }

    fn owned_wire_stroke(owner: &str, x: f64) -> WireStroke {
        WireStroke {
            points: vec![Point::new(x, x)],
            color: "#000".to_string(),
            stroke_width: 1.0,
            is_eraser: false,
            owner_id: Some(ParticipantId::from(owner)),
        }
    }

    #[test]
    fn test_connect_joins_and_fetches_snapshot() {
        let mut session = session();
        session.transport_mut().push_event(SyncEvent::Connected);
        session.pump();

        assert_eq!(
            session.transport().sent(),
            &[
                ClientMessage::Join {
                    room: "room-1".to_string(),
                    participant: Some(ParticipantId::from("me")),
                },
                ClientMessage::SnapshotFetch,
            ]
        );
    }

    #[test]
    fn test_joined_sets_room() {
        let mut session = connected();
        session.transport_mut().push_message(ServerMessage::Joined {
            room: "room-1".to_string(),
            participant: ParticipantId::from("me"),
            peer_count: 3,
        });
        session.pump();
        assert_eq!(session.current_room(), Some("room-1"));
        assert_eq!(session.peer_count(), 3);
    }

    #[test]
    fn test_snapshot_and_live_events_repaint_once() {
        let mut session = connected();
        session.transport_mut().push_message(snapshot(&[(1.0, 1.0), (2.0, 2.0)]));
        session.transport_mut().push_message(start("u1", 5.0, 5.0));
        session
            .transport_mut()
            .push_message(ServerMessage::DrawEnd { from: ParticipantId::from("u1") });
        session.pump();

        assert_eq!(session.engine().stroke_count(), 3);
        assert_eq!(session.engine().renderer().repaint_count(), 1);
        assert!(session.engine().is_hydrated());
    }

    #[test]
    fn test_live_event_before_snapshot_is_kept() {
        let mut session = connected();
        session.transport_mut().push_message(start("u1", 5.0, 5.0));
        session
            .transport_mut()
            .push_message(ServerMessage::DrawEnd { from: ParticipantId::from("u1") });
        session.pump();
        session.transport_mut().push_message(snapshot(&[(1.0, 1.0)]));
        session.pump();

        assert_eq!(session.engine().stroke_count(), 2);
    }

    #[test]
    fn test_local_drawing_is_sent() {
        let mut session = connected();
        session.begin(Point::new(0.0, 0.0), StrokeStyle::default()).unwrap();
        session.extend(Point::new(1.0, 1.0));
        session.end();

        let sent = session.transport_mut().take_sent();
        assert_eq!(sent.len(), 3);
        assert!(matches!(sent[0], ClientMessage::DrawStart(_)));
        assert_eq!(sent[1], ClientMessage::DrawMove(MovePayload::single(Point::new(1.0, 1.0))));
        assert_eq!(sent[2], ClientMessage::DrawEnd);
    }

    #[test]
    fn test_drawing_offline_still_works_locally() {
        let mut session = session();
        session.begin(Point::ZERO, StrokeStyle::default()).unwrap();
        session.end();
        assert_eq!(session.engine().stroke_count(), 1);
        assert!(session.transport().sent().is_empty());
    }

    #[test]
    fn test_malformed_events_are_dropped() {
        let mut session = connected();
        session.handle_text("not json");
        session.handle_text(r#"{"type":"draw:start","from":"u1","x":1}"#);
        session.handle_text(r##"{"type":"draw:start","from":"u1","x":1,"y":1,"color":"#f00","width":0}"##);
        session.transport_mut().push_message(ServerMessage::DrawMove {
            from: ParticipantId::from("u1"),
            payload: MovePayload::default(),
        });
        session.pump();

        assert!(session.engine().remote_strokes().is_empty());

        // Later valid events still apply.
        session.handle_text(r##"{"type":"draw:start","from":"u1","x":1,"y":1,"color":"#f00","width":2}"##);
        session.handle_text(r#"{"type":"draw:end","from":"u1"}"#);
        assert_eq!(session.engine().stroke_count(), 1);
    }

    #[test]
    fn test_peer_left_keeps_open_stroke() {
        let mut session = connected();
        session.transport_mut().push_message(start("u1", 0.0, 0.0));
        session.transport_mut().push_message(ServerMessage::PeerLeft {
            participant: ParticipantId::from("u1"),
        });
        session.pump();
        assert!(session.engine().remote_strokes().contains(&ParticipantId::from("u1")));
    }

    #[test]
    fn test_reconnect_replaces_canvas_from_snapshot() {
        let mut session = connected();
        session.transport_mut().push_message(snapshot(&[(1.0, 1.0)]));
        session.pump();
        session.begin(Point::ZERO, StrokeStyle::default()).unwrap();
        session.end();
        assert_eq!(session.engine().stroke_count(), 2);

        session.transport_mut().push_event(SyncEvent::Disconnected);
        session.transport_mut().push_event(SyncEvent::Connected);
        session.pump();
        assert!(!session.engine().is_hydrated());

        // The relay now holds both strokes; nothing is duplicated.
        session.transport_mut().push_message(snapshot(&[(1.0, 1.0), (0.0, 0.0)]));
        session.pump();
        assert_eq!(session.engine().stroke_count(), 2);
    }

    #[test]
    fn test_second_snapshot_on_same_connection_is_ignored() {
        let mut session = connected();
        session.transport_mut().push_message(snapshot(&[(1.0, 1.0)]));
        session.transport_mut().push_message(snapshot(&[(2.0, 2.0)]));
        session.pump();
        assert_eq!(session.engine().stroke_count(), 1);
    }

    #[test]
    fn test_remote_clear_via_wire() {
        let mut session = connected();
        session.transport_mut().push_message(snapshot(&[(1.0, 1.0), (2.0, 2.0)]));
        session.pump();
        session
            .transport_mut()
            .push_message(ServerMessage::DrawClear { from: ParticipantId::from("u2") });
        session.pump();
        assert_eq!(session.engine().stroke_count(), 0);
    }

    #[test]
    fn test_relay_assigned_id_is_adopted() {
        let mut session = connected();
        session.transport_mut().push_message(snapshot(&[]));
        session.begin(Point::ZERO, StrokeStyle::default()).unwrap();
        session.end();

        // Reconnect while the relay still holds the old socket: it mints a new id.
        session.transport_mut().push_event(SyncEvent::Disconnected);
        session.transport_mut().push_event(SyncEvent::Connected);
        session.transport_mut().push_message(ServerMessage::Joined {
            room: "room-1".to_string(),
            participant: ParticipantId::from("minted"),
            peer_count: 2,
        });
        session.pump();
        assert_eq!(session.local_participant().as_str(), "minted");

        session.begin(Point::new(1.0, 1.0), StrokeStyle::default()).unwrap();
        session.end();

        // The relay's snapshot carries both ids; both strokes stay undoable.
        session.transport_mut().push_message(ServerMessage::Snapshot(SnapshotResponse {
            strokes: vec![
                owned_wire_stroke("me", 0.0),
                owned_wire_stroke("other", 5.0),
                owned_wire_stroke("minted", 1.0),
            ],
        }));
        session.pump();
        assert_eq!(session.engine().stroke_count(), 3);

        assert_eq!(session.undo_last().unwrap().owner().as_str(), "minted");
        assert_eq!(session.undo_last().unwrap().owner().as_str(), "me");
        assert!(session.undo_last().is_none());
    }

    #[test]
    fn test_leave() {
        let mut session = connected();
        session.transport_mut().push_message(ServerMessage::Joined {
            room: "room-1".to_string(),
            participant: ParticipantId::from("me"),
            peer_count: 1,
        });
        session.pump();
        session.leave();
        assert_eq!(session.transport().sent(), &[ClientMessage::Leave]);
        assert!(session.current_room().is_none());
    }
}
