// Per-kind connection index, kept sorted by y.
//
// A snap search binary-searches to the pointer's vertical band and fans out
// up and down until the vertical distance alone exceeds the best radius found
// so far, so a drag over a large program only touches nearby connectors.

use crate::error::{BlockError, Result};
use crate::{Connection, ConnectionId, Point};

/// One indexed connection and the position it was indexed at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub id: ConnectionId,
    pub position: Point,
}

/// Connections of a single kind, sorted by vertical coordinate.
#[derive(Debug, Clone, Default)]
pub struct ConnectionIndex {
    entries: Vec<IndexEntry>,
}

impl ConnectionIndex {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending y order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Insert a connection at its current position.
    /// Equal y values keep insertion order.
    pub(crate) fn add(&mut self, connection: &mut Connection) -> Result<()> {
        if connection.in_index {
            return Err(BlockError::AlreadyIndexed(connection.id));
        }

        let y = connection.position.y;
        let at = self.entries.partition_point(|e| e.position.y <= y);
        self.entries.insert(
            at,
            IndexEntry {
                id: connection.id,
                position: connection.position,
            },
        );
        connection.in_index = true;

        Ok(())
    }

    /// Remove a connection. Matches by identity among entries sharing its y.
    pub(crate) fn remove(&mut self, connection: &mut Connection) -> Result<()> {
        if !connection.in_index {
            return Err(BlockError::NotIndexed(connection.id));
        }

        let y = connection.position.y;
        let start = self.band_start(y);
        let found = self.entries[start..]
            .iter()
            .take_while(|e| e.position.y == y)
            .position(|e| e.id == connection.id)
            .map(|offset| start + offset);

        match found {
            Some(at) => {
                self.entries.remove(at);
                connection.in_index = false;
                Ok(())
            }
            None => Err(BlockError::IndexEntryMissing(connection.id)),
        }
    }

    /// First entry whose y is not above `y`
    fn band_start(&self, y: f32) -> usize {
        self.entries.partition_point(|e| e.position.y < y)
    }

    /// Nearest accepted entry within `max_radius` of `origin`.
    ///
    /// Entries are visited upwards from the band first, then downwards; the
    /// first entry found at the minimal distance wins. Returns the entry and
    /// its distance.
    pub(crate) fn closest<F>(
        &self,
        origin: Point,
        max_radius: f32,
        mut accept: F,
    ) -> Option<(ConnectionId, f32)>
    where
        F: FnMut(ConnectionId) -> bool,
    {
        let start = self.band_start(origin.y);
        let mut best: Option<ConnectionId> = None;
        let mut radius = max_radius;

        let mut consider = |entry: &IndexEntry, best: &mut Option<ConnectionId>, radius: &mut f32| {
            if !accept(entry.id) {
                return;
            }
            let distance = origin.distance_to(&entry.position);
            let improves = match best {
                None => distance <= *radius,
                Some(_) => distance < *radius,
            };
            if improves {
                *best = Some(entry.id);
                *radius = distance;
            }
        };

        for entry in self.entries[..start].iter().rev() {
            if origin.y - entry.position.y > radius {
                break;
            }
            consider(entry, &mut best, &mut radius);
        }
        for entry in &self.entries[start..] {
            if entry.position.y - origin.y > radius {
                break;
            }
            consider(entry, &mut best, &mut radius);
        }

        best.map(|id| (id, radius))
    }

    /// Every entry within `radius` of `origin`, without any filtering
    pub(crate) fn neighbours(&self, origin: Point, radius: f32) -> Vec<ConnectionId> {
        let start = self.band_start(origin.y);
        let mut found = Vec::new();

        for entry in self.entries[..start].iter().rev() {
            if origin.y - entry.position.y > radius {
                break;
            }
            if origin.distance_to(&entry.position) <= radius {
                found.push(entry.id);
            }
        }
        for entry in &self.entries[start..] {
            if entry.position.y - origin.y > radius {
                break;
            }
            if origin.distance_to(&entry.position) <= radius {
                found.push(entry.id);
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockId, ConnectionKind};
    use assert_matches::assert_matches;

    fn connection_at(x: f32, y: f32) -> Connection {
        let mut conn = Connection::new(BlockId::new(), ConnectionKind::InputValue, None);
        conn.position = Point::new(x, y);
        conn
    }

    fn ys(index: &ConnectionIndex) -> Vec<f32> {
        index.entries().iter().map(|e| e.position.y).collect()
    }

    #[test]
    fn test_add_keeps_y_order() {
        let mut index = ConnectionIndex::new();
        for y in [30.0, 10.0, 20.0, 10.0, 50.0] {
            let mut conn = connection_at(0.0, y);
            index.add(&mut conn).unwrap();
            assert!(conn.is_indexed());
        }
        assert_eq!(ys(&index), vec![10.0, 10.0, 20.0, 30.0, 50.0]);
    }

    #[test]
    fn test_double_add_is_rejected() {
        let mut index = ConnectionIndex::new();
        let mut conn = connection_at(0.0, 0.0);
        index.add(&mut conn).unwrap();
        assert_matches!(index.add(&mut conn), Err(BlockError::AlreadyIndexed(id)) if id == conn.id);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_matches_identity_among_equal_y() {
        let mut index = ConnectionIndex::new();
        let mut a = connection_at(0.0, 10.0);
        let mut b = connection_at(5.0, 10.0);
        let mut c = connection_at(9.0, 10.0);
        index.add(&mut a).unwrap();
        index.add(&mut b).unwrap();
        index.add(&mut c).unwrap();

        index.remove(&mut b).unwrap();
        assert!(!b.is_indexed());
        assert!(index.contains(a.id));
        assert!(!index.contains(b.id));
        assert!(index.contains(c.id));
    }

    #[test]
    fn test_remove_unindexed_is_rejected() {
        let mut index = ConnectionIndex::new();
        let mut conn = connection_at(0.0, 0.0);
        assert_matches!(index.remove(&mut conn), Err(BlockError::NotIndexed(_)));
    }

    #[test]
    fn test_remove_detects_stale_position() {
        let mut index = ConnectionIndex::new();
        let mut conn = connection_at(0.0, 0.0);
        index.add(&mut conn).unwrap();
        // Moving without re-indexing leaves the entry behind.
        conn.position = Point::new(0.0, 99.0);
        assert_matches!(index.remove(&mut conn), Err(BlockError::IndexEntryMissing(_)));
    }

    #[test]
    fn test_closest_within_radius() {
        let mut index = ConnectionIndex::new();
        let mut near = connection_at(10.0, 100.0);
        let mut far = connection_at(10.0, 140.0);
        let mut other = connection_at(300.0, 100.0);
        index.add(&mut near).unwrap();
        index.add(&mut far).unwrap();
        index.add(&mut other).unwrap();

        let (id, radius) = index.closest(Point::new(13.0, 104.0), 25.0, |_| true).unwrap();
        assert_eq!(id, near.id);
        assert_eq!(radius, 5.0);

        assert!(index.closest(Point::new(150.0, 500.0), 25.0, |_| true).is_none());
    }

    #[test]
    fn test_closest_respects_filter() {
        let mut index = ConnectionIndex::new();
        let mut near = connection_at(0.0, 0.0);
        let mut farther = connection_at(0.0, 10.0);
        index.add(&mut near).unwrap();
        index.add(&mut farther).unwrap();

        let skip = near.id;
        let (id, _) = index
            .closest(Point::new(0.0, 1.0), 25.0, |candidate| candidate != skip)
            .unwrap();
        assert_eq!(id, farther.id);
    }

    #[test]
    fn test_closest_tie_goes_to_first_visited() {
        let mut index = ConnectionIndex::new();
        let mut above = connection_at(0.0, 0.0);
        let mut below = connection_at(0.0, 20.0);
        index.add(&mut above).unwrap();
        index.add(&mut below).unwrap();

        // Both are 10 away; the upward scan runs first.
        let (id, radius) = index.closest(Point::new(0.0, 10.0), 25.0, |_| true).unwrap();
        assert_eq!(id, above.id);
        assert_eq!(radius, 10.0);
    }

    #[test]
    fn test_closest_scan_stops_outside_vertical_band() {
        let mut index = ConnectionIndex::new();
        let mut conns: Vec<Connection> = (0..50).map(|i| connection_at(0.0, i as f32 * 100.0)).collect();
        for conn in conns.iter_mut() {
            index.add(conn).unwrap();
        }

        let mut visited = 0;
        let result = index.closest(Point::new(1000.0, 2500.0), 25.0, |_| {
            visited += 1;
            true
        });
        assert!(result.is_none());
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_neighbours_unfiltered() {
        let mut index = ConnectionIndex::new();
        let mut a = connection_at(0.0, 0.0);
        let mut b = connection_at(10.0, 10.0);
        let mut c = connection_at(100.0, 0.0);
        index.add(&mut a).unwrap();
        index.add(&mut b).unwrap();
        index.add(&mut c).unwrap();

        let found = index.neighbours(Point::new(0.0, 5.0), 25.0);
        assert_eq!(found.len(), 2);
        assert!(found.contains(&a.id));
        assert!(found.contains(&b.id));
    }
}
