//! Snapshot stabilizer - suppresses no-op churn between polling cycles
//!
//! Downstream consumers only want entities whose volatile fields actually
//! changed since the previous snapshot.

use std::collections::HashMap;

use screener_core::Entity;

/// Delta between two successive aggregated snapshots.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDelta {
    /// Entities that are new or whose volatile fields changed.
    pub changed: Vec<Entity>,
    /// Set when membership or ordering of the snapshot changed.
    pub page_info_changed: bool,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && !self.page_info_changed
    }
}

/// Diff `next` against `previous`.
///
/// Volatile fields are compared bit-identically; an entity absent from
/// `previous` is changed by definition. A length mismatch short-circuits
/// to "everything changed".
pub fn diff(previous: &[Entity], next: &[Entity]) -> SnapshotDelta {
    if previous.len() != next.len() {
        return SnapshotDelta {
            changed: next.to_vec(),
            page_info_changed: true,
        };
    }

    let by_address: HashMap<String, &Entity> =
        previous.iter().map(|e| (e.address_key(), e)).collect();

    let changed: Vec<Entity> = next
        .iter()
        .filter(|e| match by_address.get(&e.address_key()) {
            Some(prev) => !e.volatile_fields_eq(prev),
            None => true,
        })
        .cloned()
        .collect();

    let page_info_changed = previous
        .iter()
        .zip(next.iter())
        .any(|(a, b)| a.address_key() != b.address_key());

    SnapshotDelta {
        changed,
        page_info_changed,
    }
}

/// Stateful wrapper holding the previous snapshot across cycles.
#[derive(Debug, Default)]
pub struct FeedStabilizer {
    previous: Vec<Entity>,
}

impl FeedStabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff against the retained snapshot, then retain `next`.
    pub fn observe(&mut self, next: &[Entity]) -> SnapshotDelta {
        let delta = diff(&self.previous, next);
        self.previous = next.to_vec();
        delta
    }

    pub fn last_snapshot(&self) -> &[Entity] {
        &self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(address: &str, volume: f64) -> Entity {
        Entity {
            id: address.to_string(),
            address: address.to_string(),
            name: String::new(),
            symbol: String::new(),
            created_at: None,
            market_cap: 0.0,
            volume_24h: volume,
            market_cap_delta_24h: 0.0,
            unique_holders: 0,
            image_uri: None,
        }
    }

    #[test]
    fn test_identical_snapshots_yield_empty_delta() {
        let snapshot = vec![entity("0xaa", 100.0), entity("0xbb", 200.0)];
        let delta = diff(&snapshot, &snapshot);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_volatile_change_is_emitted() {
        let prev = vec![entity("0xaa", 100.0), entity("0xbb", 200.0)];
        let next = vec![entity("0xaa", 150.0), entity("0xbb", 200.0)];

        let delta = diff(&prev, &next);
        assert_eq!(delta.changed.len(), 1);
        assert_eq!(delta.changed[0].address, "0xaa");
        assert!(!delta.page_info_changed);
    }

    #[test]
    fn test_new_entity_is_changed_by_definition() {
        let prev = vec![entity("0xaa", 100.0), entity("0xbb", 200.0)];
        let next = vec![entity("0xaa", 100.0), entity("0xcc", 300.0)];

        let delta = diff(&prev, &next);
        assert_eq!(delta.changed.len(), 1);
        assert_eq!(delta.changed[0].address, "0xcc");
        assert!(delta.page_info_changed);
    }

    #[test]
    fn test_length_mismatch_short_circuits() {
        let prev = vec![entity("0xaa", 100.0)];
        let next = vec![entity("0xaa", 100.0), entity("0xbb", 200.0)];

        let delta = diff(&prev, &next);
        assert_eq!(delta.changed.len(), 2);
        assert!(delta.page_info_changed);
    }

    #[test]
    fn test_reorder_sets_page_info_only() {
        let prev = vec![entity("0xaa", 100.0), entity("0xbb", 200.0)];
        let next = vec![entity("0xbb", 200.0), entity("0xaa", 100.0)];

        let delta = diff(&prev, &next);
        assert!(delta.changed.is_empty());
        assert!(delta.page_info_changed);
    }

    #[test]
    fn test_stabilizer_retains_snapshot() {
        let mut stabilizer = FeedStabilizer::new();

        let first = vec![entity("0xaa", 100.0)];
        let delta = stabilizer.observe(&first);
        // First observation: everything is new
        assert_eq!(delta.changed.len(), 1);

        let delta = stabilizer.observe(&first);
        assert!(delta.is_empty());
        assert_eq!(stabilizer.last_snapshot().len(), 1);
    }
}
