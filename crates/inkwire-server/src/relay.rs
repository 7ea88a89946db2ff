//! Per-connection relay loop.

use crate::room::{AppState, RoomEvent};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use inkwire_core::protocol::{ClientMessage, ServerMessage};
use inkwire_core::ParticipantId;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// One connected client.
pub struct Peer {
    id: ParticipantId,
    room: Option<String>,
    rx: Option<broadcast::Receiver<RoomEvent>>,
}

impl Default for Peer {
    fn default() -> Self {
        Self::new()
    }
}

impl Peer {
    /// A peer with a minted id, not in any room.
    pub fn new() -> Self {
        Self {
            id: ParticipantId::random(),
            room: None,
            rx: None,
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Handle one client message. Returns the replies for this client only.
    pub fn handle(&mut self, state: &AppState, msg: ClientMessage) -> Vec<ServerMessage> {
        match msg {
            ClientMessage::Join { room, participant } => {
                self.leave(state);

                let requested = participant.unwrap_or_else(|| self.id.clone());
                let joined = state.join_room(&room, requested);
                self.id = joined.participant;
                self.rx = Some(joined.rx);
                self.room = Some(room.clone());

                state.broadcast(
                    &room,
                    &self.id,
                    ServerMessage::PeerJoined {
                        participant: self.id.clone(),
                    },
                );
                info!("Peer {} joined room {}", self.id, room);

                vec![ServerMessage::Joined {
                    room,
                    participant: self.id.clone(),
                    peer_count: joined.peer_count,
                }]
            }
            ClientMessage::Leave => {
                self.leave(state);
                Vec::new()
            }
            ClientMessage::SnapshotFetch => match self.room {
                Some(ref room) => vec![ServerMessage::Snapshot(state.snapshot(room))],
                None => vec![not_in_room()],
            },
            draw => {
                let Some(ref room) = self.room else {
                    return vec![not_in_room()];
                };
                match state.relay_draw(room, &self.id, draw) {
                    Ok(()) => Vec::new(),
                    Err(e) => {
                        warn!("Rejected draw event from {}: {}", self.id, e);
                        vec![ServerMessage::Error {
                            message: format!("Invalid draw event: {}", e),
                        }]
                    }
                }
            }
        }
    }

    /// Leave the current room, if any, and tell the others.
    pub fn leave(&mut self, state: &AppState) {
        if let Some(room) = self.room.take() {
            state.leave_room(&room, &self.id);
            state.broadcast(
                &room,
                &self.id,
                ServerMessage::PeerLeft {
                    participant: self.id.clone(),
                },
            );
            info!("Peer {} left room {}", self.id, room);
        }
        self.rx = None;
    }

    /// Filter a room event for this peer. Own events are not echoed back.
    pub fn accept(&self, (from, msg): RoomEvent) -> Option<ServerMessage> {
        (from != self.id).then_some(msg)
    }
}

fn not_in_room() -> ServerMessage {
    ServerMessage::Error {
        message: "Not in a room".to_string(),
    }
}

async fn recv_room(rx: &mut Option<broadcast::Receiver<RoomEvent>>) -> Result<RoomEvent, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        // No room joined, wait forever
        None => std::future::pending().await,
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match msg.to_json() {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to encode {:?}: {}", msg, e);
            Ok(())
        }
    }
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut peer = Peer::new();
    info!("New connection: {}", peer.id());

    let (mut sender, mut receiver) = socket.split();

    'conn: loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = match ClientMessage::from_json(text.as_str()) {
                            Ok(client_msg) => peer.handle(&state, client_msg),
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer.id(), e);
                                vec![ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                }]
                            }
                        };
                        for reply in &replies {
                            if send_message(&mut sender, reply).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary and ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer.id(), e);
                        break;
                    }
                }
            }

            event = recv_room(&mut peer.rx) => {
                match event {
                    Ok(event) => {
                        if let Some(msg) = peer.accept(event) {
                            if send_message(&mut sender, &msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Peer {} lagged, {} events dropped", peer.id(), skipped);
                    }
                    Err(RecvError::Closed) => peer.rx = None,
                }
            }
        }
    }

    // Cleanup on disconnect
    peer.leave(&state);
    info!("Connection closed: {}", peer.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use inkwire_core::protocol::{MovePayload, StartPayload};
    use inkwire_core::StrokeStyle;
    use kurbo::Point;

    fn join(room: &str, participant: &str) -> ClientMessage {
        ClientMessage::Join {
            room: room.to_string(),
            participant: Some(ParticipantId::from(participant)),
        }
    }

    fn start() -> ClientMessage {
        ClientMessage::DrawStart(StartPayload::new(Point::new(1.0, 1.0), &StrokeStyle::default()))
    }

    fn drain(peer: &mut Peer) -> Vec<ServerMessage> {
        let id = peer.id.clone();
        let mut out = Vec::new();
        if let Some(rx) = peer.rx.as_mut() {
            while let Ok((from, msg)) = rx.try_recv() {
                if from != id {
                    out.push(msg);
                }
            }
        }
        out
    }

    #[test]
    fn test_join_replies_and_notifies() {
        let state = AppState::new(ServerConfig::default());
        let mut a = Peer::new();
        let mut b = Peer::new();

        let replies = a.handle(&state, join("r", "a"));
        assert_eq!(
            replies,
            vec![ServerMessage::Joined {
                room: "r".to_string(),
                participant: ParticipantId::from("a"),
                peer_count: 1,
            }]
        );
        b.handle(&state, join("r", "b"));

        assert_eq!(
            drain(&mut a),
            vec![ServerMessage::PeerJoined {
                participant: ParticipantId::from("b"),
            }]
        );
        // Own join is not echoed.
        assert!(drain(&mut b).is_empty());
    }

    #[test]
    fn test_draw_events_reach_others_only() {
        let state = AppState::new(ServerConfig::default());
        let mut a = Peer::new();
        let mut b = Peer::new();
        a.handle(&state, join("r", "a"));
        b.handle(&state, join("r", "b"));
        drain(&mut a);

        assert!(a.handle(&state, start()).is_empty());
        a.handle(&state, ClientMessage::DrawMove(MovePayload::single(Point::new(2.0, 2.0))));
        a.handle(&state, ClientMessage::DrawEnd);

        assert!(drain(&mut a).is_empty());
        let received = drain(&mut b);
        assert_eq!(received.len(), 3);
        assert!(matches!(&received[0], ServerMessage::DrawStart { from, .. } if from.as_str() == "a"));
        assert_eq!(received[2], ServerMessage::DrawEnd { from: ParticipantId::from("a") });
    }

    #[test]
    fn test_snapshot_fetch() {
        let state = AppState::new(ServerConfig::default());
        let mut a = Peer::new();
        a.handle(&state, join("r", "a"));
        a.handle(&state, start());
        a.handle(&state, ClientMessage::DrawEnd);

        let mut b = Peer::new();
        b.handle(&state, join("r", "b"));
        let replies = b.handle(&state, ClientMessage::SnapshotFetch);
        let [ServerMessage::Snapshot(snapshot)] = replies.as_slice() else {
            panic!("expected a snapshot, got {:?}", replies);
        };
        assert_eq!(snapshot.strokes.len(), 1);
    }

    #[test]
    fn test_requests_outside_room_are_errors() {
        let state = AppState::new(ServerConfig::default());
        let mut peer = Peer::new();
        assert!(matches!(
            peer.handle(&state, ClientMessage::SnapshotFetch).as_slice(),
            [ServerMessage::Error { .. }]
        ));
        assert!(matches!(peer.handle(&state, start()).as_slice(), [ServerMessage::Error { .. }]));
        assert!(peer.handle(&state, ClientMessage::Leave).is_empty());
    }

    #[test]
    fn test_malformed_draw_gets_error_reply() {
        let state = AppState::new(ServerConfig::default());
        let mut a = Peer::new();
        a.handle(&state, join("r", "a"));
        let replies = a.handle(&state, ClientMessage::DrawMove(MovePayload::default()));
        assert!(matches!(replies.as_slice(), [ServerMessage::Error { .. }]));
    }

    #[test]
    fn test_rejoin_moves_rooms() {
        let state = AppState::new(ServerConfig::default());
        let mut a = Peer::new();
        let mut b = Peer::new();
        a.handle(&state, join("one", "a"));
        b.handle(&state, join("one", "b"));

        a.handle(&state, join("two", "a"));
        assert_eq!(a.room(), Some("two"));
        assert_eq!(state.peer_count("one"), 1);
        assert_eq!(
            drain(&mut b),
            vec![ServerMessage::PeerLeft { participant: ParticipantId::from("a") }]
        );
    }

    #[test]
    fn test_solo_reconnect_keeps_canvas() {
        let state = AppState::new(ServerConfig::default());
        let mut first = Peer::new();
        first.handle(&state, join("r", "a"));
        first.handle(&state, start());
        first.handle(&state, ClientMessage::DrawEnd);
        first.handle(&state, start());
        first.handle(&state, ClientMessage::DrawEnd);
        first.leave(&state);

        let mut second = Peer::new();
        second.handle(&state, join("r", "a"));
        let replies = second.handle(&state, ClientMessage::SnapshotFetch);
        let [ServerMessage::Snapshot(snapshot)] = replies.as_slice() else {
            panic!("expected a snapshot, got {:?}", replies);
        };
        assert_eq!(snapshot.strokes.len(), 2);
        assert_eq!(second.id().as_str(), "a");
    }

    #[test]
    fn test_accept_filters_own_events() {
        let peer = Peer::new();
        let own = (peer.id().clone(), ServerMessage::DrawEnd { from: peer.id().clone() });
        assert!(peer.accept(own).is_none());
        let other = ServerMessage::DrawEnd { from: ParticipantId::from("x") };
        assert_eq!(peer.accept((ParticipantId::from("x"), other.clone())), Some(other));
    }

    #[test]
    fn test_leave_removes_empty_room() {
        let state = AppState::new(ServerConfig::default());
        let mut a = Peer::new();
        a.handle(&state, join("r", "a"));
        a.leave(&state);
        assert_eq!(state.room_count(), 0);
        assert_eq!(a.room(), None);
    }
}
