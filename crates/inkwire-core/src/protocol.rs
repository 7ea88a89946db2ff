//! Wire protocol between clients and the relay.
//!
//! Messages are JSON objects tagged by a `type` field:
//! ```json
//! { "type": "join", "room": "room-id", "participant": "u1" }
//! { "type": "draw:start", "x": 10, "y": 20, "color": "#f00", "width": 2, "isEraser": false }
//! { "type": "draw:move", "x": 11, "y": 21 }
//! { "type": "draw:move", "points": [{ "x": 12, "y": 22 }, { "x": 13, "y": 23 }] }
//! { "type": "draw:end" }
//! { "type": "draw:clear" }
//! { "type": "snapshot:fetch" }
//! ```
//! The relay forwards draw events with the sender attached as `from`.

use crate::stroke::{ParticipantId, Stroke, StrokeError, StrokeStyle, is_finite_point};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors. Inbound ones are dropped by the receiver.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed event: {0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Stroke(#[from] StrokeError),
}

/// Payload of a `draw:start` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    pub x: f64,
    pub y: f64,
    pub color: String,
    pub width: f64,
    #[serde(rename = "isEraser", default)]
    pub is_eraser: bool,
}

impl StartPayload {
    pub fn new(origin: Point, style: &StrokeStyle) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            color: style.color.clone(),
            width: style.width,
            is_eraser: style.is_eraser,
        }
    }

    /// Validate into a stroke origin and style.
    pub fn into_parts(self) -> Result<(Point, StrokeStyle), ProtocolError> {
        let origin = Point::new(self.x, self.y);
        if !is_finite_point(&origin) {
            return Err(ProtocolError::Malformed("non-finite start point"));
        }
        let style = StrokeStyle::new(self.color, self.width, self.is_eraser)?;
        Ok((origin, style))
    }
}

/// Payload of a `draw:move` event: a single point, a batch, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
}

impl MovePayload {
    pub fn single(point: Point) -> Self {
        Self {
            x: Some(point.x),
            y: Some(point.y),
            points: Vec::new(),
        }
    }

    pub fn batch(points: Vec<Point>) -> Self {
        Self {
            x: None,
            y: None,
            points,
        }
    }

    /// Validate into the carried points, the single point first.
    pub fn into_points(self) -> Result<Vec<Point>, ProtocolError> {
        let mut points = Vec::with_capacity(self.points.len() + 1);
        match (self.x, self.y) {
            (Some(x), Some(y)) => points.push(Point::new(x, y)),
            (None, None) => {}
            _ => return Err(ProtocolError::Malformed("move carries half a point")),
        }
        points.extend(self.points);

        if points.is_empty() {
            return Err(ProtocolError::Malformed("move carries no points"));
        }
        if !points.iter().all(is_finite_point) {
            return Err(ProtocolError::Malformed("non-finite move point"));
        }
        Ok(points)
    }
}

/// A finalized stroke as carried in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireStroke {
    pub points: Vec<Point>,
    pub color: String,
    #[serde(rename = "strokeWidth")]
    pub stroke_width: f64,
    #[serde(rename = "isEraser", default)]
    pub is_eraser: bool,
    #[serde(rename = "ownerId", default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<ParticipantId>,
}

impl WireStroke {
    pub fn from_stroke(stroke: &Stroke) -> Self {
        let style = stroke.style();
        Self {
            points: stroke.points().to_vec(),
            color: style.color.clone(),
            stroke_width: style.width,
            is_eraser: style.is_eraser,
            owner_id: (!stroke.owner().is_unknown()).then(|| stroke.owner().clone()),
        }
    }

    pub fn into_stroke(self) -> Result<Stroke, ProtocolError> {
        if !self.points.iter().all(is_finite_point) {
            return Err(ProtocolError::Malformed("non-finite snapshot point"));
        }
        let style = StrokeStyle::new(self.color, self.stroke_width, self.is_eraser)?;
        let owner = self.owner_id.unwrap_or_else(ParticipantId::unknown);
        Ok(Stroke::from_points(self.points, style, owner)?)
    }
}

/// Response to a snapshot fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub strokes: Vec<WireStroke>,
}

impl SnapshotResponse {
    pub fn from_strokes<'a>(strokes: impl IntoIterator<Item = &'a Stroke>) -> Self {
        Self {
            strokes: strokes.into_iter().map(WireStroke::from_stroke).collect(),
        }
    }

    /// Convert into strokes, skipping individually malformed ones.
    pub fn into_strokes(self) -> Vec<Stroke> {
        self.strokes
            .into_iter()
            .filter_map(|wire| match wire.into_stroke() {
                Ok(stroke) => Some(stroke),
                Err(e) => {
                    log::debug!("skipping malformed snapshot stroke: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Join a room, optionally keeping a stable participant id.
    #[serde(rename = "join")]
    Join {
        room: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant: Option<ParticipantId>,
    },
    /// Leave current room
    #[serde(rename = "leave")]
    Leave,
    #[serde(rename = "draw:start")]
    DrawStart(StartPayload),
    #[serde(rename = "draw:move")]
    DrawMove(MovePayload),
    #[serde(rename = "draw:end")]
    DrawEnd,
    #[serde(rename = "draw:clear")]
    DrawClear,
    /// Request the room's finalized strokes.
    #[serde(rename = "snapshot:fetch")]
    SnapshotFetch,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Messages received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Confirm room join.
    #[serde(rename = "joined")]
    Joined {
        room: String,
        participant: ParticipantId,
        peer_count: usize,
    },
    /// Peer joined the room
    #[serde(rename = "peer_joined")]
    PeerJoined { participant: ParticipantId },
    /// Peer left the room. Its open stroke, if any, stays open.
    #[serde(rename = "peer_left")]
    PeerLeft { participant: ParticipantId },
    #[serde(rename = "draw:start")]
    DrawStart {
        from: ParticipantId,
        #[serde(flatten)]
        payload: StartPayload,
    },
    #[serde(rename = "draw:move")]
    DrawMove {
        from: ParticipantId,
        #[serde(flatten)]
        payload: MovePayload,
    },
    #[serde(rename = "draw:end")]
    DrawEnd { from: ParticipantId },
    #[serde(rename = "draw:clear")]
    DrawClear { from: ParticipantId },
    /// Snapshot fetch response.
    #[serde(rename = "snapshot")]
    Snapshot(SnapshotResponse),
    /// Error message
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    /// Attach the sender to a client draw event for fan-out.
    ///
    /// Returns `None` for messages that are not draw events.
    pub fn relay_from(from: ParticipantId, msg: ClientMessage) -> Option<Self> {
        match msg {
            ClientMessage::DrawStart(payload) => Some(Self::DrawStart { from, payload }),
            ClientMessage::DrawMove(payload) => Some(Self::DrawMove { from, payload }),
            ClientMessage::DrawEnd => Some(Self::DrawEnd { from }),
            ClientMessage::DrawClear => Some(Self::DrawClear { from }),
            ClientMessage::Join { .. } | ClientMessage::Leave | ClientMessage::SnapshotFetch => None,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_event_wire_names() {
        let style = StrokeStyle::new("#f00", 2.0, true).unwrap();
        let msg = ClientMessage::DrawStart(StartPayload::new(Point::new(1.0, 2.0), &style));
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"draw:start""#));
        assert!(json.contains(r#""isEraser":true"#));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_unit_events_serialize_as_type_only() {
        assert_eq!(ClientMessage::DrawEnd.to_json().unwrap(), r#"{"type":"draw:end"}"#);
        assert_eq!(ClientMessage::DrawClear.to_json().unwrap(), r#"{"type":"draw:clear"}"#);
        let parsed = ClientMessage::from_json(r#"{"type":"draw:end","extra":1}"#).unwrap();
        assert_eq!(parsed, ClientMessage::DrawEnd);
    }

    #[test]
    fn test_server_move_single_point() {
        let json = r#"{"type":"draw:move","from":"u1","x":3,"y":4}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::DrawMove { from, payload } => {
                assert_eq!(from.as_str(), "u1");
                assert_eq!(payload.into_points().unwrap(), vec![Point::new(3.0, 4.0)]);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_server_move_batched_points() {
        let json = r#"{"type":"draw:move","from":"u1","points":[{"x":1,"y":1},{"x":2,"y":2}]}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::DrawMove { payload, .. } => {
                assert_eq!(payload.into_points().unwrap().len(), 2);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_move_validation() {
        assert!(MovePayload::default().into_points().is_err());
        let half = MovePayload {
            x: Some(1.0),
            y: None,
            points: Vec::new(),
        };
        assert!(half.into_points().is_err());
        let mixed = MovePayload {
            x: Some(0.0),
            y: Some(0.0),
            points: vec![Point::new(1.0, 1.0)],
        };
        assert_eq!(mixed.into_points().unwrap(), vec![Point::ZERO, Point::new(1.0, 1.0)]);
    }

    #[test]
    fn test_start_validation() {
        let payload = StartPayload {
            x: 0.0,
            y: 0.0,
            color: "#000".to_string(),
            width: -1.0,
            is_eraser: false,
        };
        assert!(matches!(payload.into_parts(), Err(ProtocolError::Stroke(StrokeError::InvalidWidth(_)))));
    }

    #[test]
    fn test_start_missing_field_is_rejected() {
        let json = r#"{"type":"draw:start","from":"u1","x":1,"y":1,"width":2}"#;
        assert!(ServerMessage::from_json(json).is_err());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let json = r##"{"type":"snapshot","strokes":[
            {"points":[{"x":1,"y":1}],"color":"#f00","strokeWidth":2,"isEraser":false},
            {"points":[],"color":"#0f0","strokeWidth":2},
            {"points":[{"x":2,"y":2}],"color":"#00f","strokeWidth":0}
        ]}"##;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::Snapshot(snapshot) => {
                assert_eq!(snapshot.strokes.len(), 3);
                let strokes = snapshot.into_strokes();
                assert_eq!(strokes.len(), 1);
                assert!(strokes[0].owner().is_unknown());
                assert_eq!(strokes[0].style().color, "#f00");
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_wire_stroke_keeps_owner() {
        let stroke = Stroke::begin(Point::ZERO, StrokeStyle::default(), ParticipantId::from("u7"));
        let wire = WireStroke::from_stroke(&stroke);
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains(r#""ownerId":"u7""#));
        assert!(json.contains(r#""strokeWidth":2.0"#));
        assert_eq!(wire.into_stroke().unwrap(), stroke);
    }

    #[test]
    fn test_relay_from_attaches_sender() {
        let relayed = ServerMessage::relay_from(ParticipantId::from("u1"), ClientMessage::DrawEnd);
        assert_eq!(relayed, Some(ServerMessage::DrawEnd { from: ParticipantId::from("u1") }));
        assert!(ServerMessage::relay_from(ParticipantId::from("u1"), ClientMessage::Leave).is_none());
    }

    #[test]
    fn test_joined_roundtrip() {
        let json = r#"{"type":"joined","room":"test","participant":"u1","peer_count":2}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::Joined { room, peer_count, .. } => {
                assert_eq!(room, "test");
                assert_eq!(peer_count, 2);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }
}
