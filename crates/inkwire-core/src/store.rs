//! Ordered store of finalized strokes.

use crate::stroke::{ParticipantId, Stroke};

/// Finalized strokes in insertion (back-to-front) order.
///
/// Only grows by appending; strokes leave through [`StrokeStore::undo_last`],
/// [`StrokeStore::clear`] or [`StrokeStore::evict_oldest`].
#[derive(Debug, Clone, Default)]
pub struct StrokeStore {
    strokes: Vec<Stroke>,
}

impl StrokeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized stroke on top of the existing ones.
    pub fn append(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Append every snapshot stroke in the order received.
    pub fn hydrate(&mut self, strokes: impl IntoIterator<Item = Stroke>) {
        self.strokes.extend(strokes);
    }

    /// Remove the most recently appended stroke owned by any of `local`.
    ///
    /// `local` lists every id this participant has drawn under. Strokes
    /// from other participants are never removed, even when they are newer.
    pub fn undo_last(&mut self, local: &[ParticipantId]) -> Option<Stroke> {
        let index = self.strokes.iter().rposition(|s| local.contains(s.owner()))?;
        Some(self.strokes.remove(index))
    }

    /// Remove every stroke.
    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    /// Drop the oldest strokes until at most `max` remain.
    /// Returns how many were dropped.
    pub fn evict_oldest(&mut self, max: usize) -> usize {
        let excess = self.strokes.len().saturating_sub(max);
        self.strokes.drain(..excess);
        excess
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeStyle;
    use kurbo::Point;

    fn stroke(owner: &str, x: f64) -> Stroke {
        Stroke::begin(Point::new(x, x), StrokeStyle::default(), ParticipantId::from(owner))
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = StrokeStore::new();
        store.append(stroke("a", 1.0));
        store.append(stroke("b", 2.0));
        assert_eq!(store.strokes()[0].owner().as_str(), "a");
        assert_eq!(store.strokes()[1].owner().as_str(), "b");
    }

    #[test]
    fn test_undo_skips_remote_strokes() {
        let me = ParticipantId::from("me");
        let mut store = StrokeStore::new();
        store.append(stroke("me", 1.0));
        store.append(stroke("other", 2.0));

        let undone = store.undo_last(std::slice::from_ref(&me)).unwrap();
        assert_eq!(undone.points(), &[Point::new(1.0, 1.0)]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.strokes()[0].owner().as_str(), "other");

        // Nothing local left.
        assert!(store.undo_last(std::slice::from_ref(&me)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_undo_matches_any_local_id() {
        let ids = [ParticipantId::from("me"), ParticipantId::from("me-2")];
        let mut store = StrokeStore::new();
        store.append(stroke("me", 1.0));
        store.append(stroke("me-2", 2.0));
        store.append(stroke("other", 3.0));

        assert_eq!(store.undo_last(&ids).unwrap().owner().as_str(), "me-2");
        assert_eq!(store.undo_last(&ids).unwrap().owner().as_str(), "me");
        assert!(store.undo_last(&ids).is_none());
    }

    #[test]
    fn test_hydrate_appends_in_order() {
        let mut store = StrokeStore::new();
        store.append(stroke("me", 0.0));
        store.hydrate(vec![stroke("a", 1.0), stroke("b", 2.0)]);
        let owners: Vec<&str> = store.strokes().iter().map(|s| s.owner().as_str()).collect();
        assert_eq!(owners, vec!["me", "a", "b"]);
    }

    #[test]
    fn test_evict_oldest() {
        let mut store = StrokeStore::new();
        for i in 0..5 {
            store.append(stroke("a", i as f64));
        }
        assert_eq!(store.evict_oldest(3), 2);
        assert_eq!(store.len(), 3);
        assert_eq!(store.strokes()[0].points(), &[Point::new(2.0, 2.0)]);
        assert_eq!(store.evict_oldest(10), 0);
    }
}
