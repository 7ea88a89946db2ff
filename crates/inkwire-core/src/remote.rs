//! In-flight strokes received from remote participants.

use crate::stroke::{ParticipantId, Stroke, StrokeError, StrokeStyle};
use kurbo::Point;
use std::collections::BTreeMap;

/// Per-participant in-progress strokes.
///
/// Each participant has at most one entry. Entries are inserted on a start
/// event and removed when the stroke is finished, superseded by a newer
/// start, or cleared. There is no expiry: a participant that disconnects
/// mid-stroke keeps its entry until a clear or its next start.
#[derive(Debug, Clone, Default)]
pub struct RemoteStrokeTable {
    strokes: BTreeMap<ParticipantId, Stroke>,
}

impl RemoteStrokeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a stroke for `participant`, replacing any unfinished one.
    ///
    /// Returns the abandoned stroke, if there was one.
    pub fn start(
        &mut self,
        participant: ParticipantId,
        points: Vec<Point>,
        style: StrokeStyle,
    ) -> Result<Option<Stroke>, StrokeError> {
        let stroke = Stroke::from_points(points, style, participant.clone())?;
        let abandoned = self.strokes.insert(participant, stroke);
        if let Some(ref old) = abandoned {
            log::debug!(
                "start from {} abandons unfinished stroke of {} points",
                old.owner(),
                old.len()
            );
        }
        Ok(abandoned)
    }

    /// Append points to the participant's open stroke.
    ///
    /// Returns the index the new segment starts from, or `None` when the
    /// participant has no open stroke (the points are dropped).
    pub fn append(&mut self, participant: &ParticipantId, points: Vec<Point>) -> Option<usize> {
        let Some(stroke) = self.strokes.get_mut(participant) else {
            log::debug!("dropping move from {} with no open stroke", participant);
            return None;
        };
        let from = stroke.len() - 1;
        stroke.extend_points(points);
        Some(from)
    }

    /// Close and remove the participant's open stroke.
    pub fn finish(&mut self, participant: &ParticipantId) -> Option<Stroke> {
        self.strokes.remove(participant)
    }

    /// Drop every open stroke.
    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    pub fn get(&self, participant: &ParticipantId) -> Option<&Stroke> {
        self.strokes.get(participant)
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.strokes.contains_key(participant)
    }

    /// Open strokes in participant-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &Stroke)> {
        self.strokes.iter()
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}
