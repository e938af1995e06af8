//! Projection cursors: the last applied sequence number per stream.
//!
//! Replays at or below the cursor are ignored, which is what makes every
//! projection safe under redelivery.

use std::collections::HashMap;
use std::sync::RwLock;

use procureflow_core::{AggregateId, BusinessId};

use super::ProjectionError;

pub trait ProjectionCursorStore: Send + Sync {
    fn get_cursor(
        &self,
        business_id: BusinessId,
        aggregate_id: &AggregateId,
        projection_name: &str,
    ) -> Option<u64>;

    fn update_cursor(
        &self,
        business_id: BusinessId,
        aggregate_id: &AggregateId,
        projection_name: &str,
        sequence_number: u64,
    );

    /// Clear all cursors of one projection for a business (rebuilds).
    fn clear_cursors(&self, business_id: BusinessId, projection_name: &str);
}

type CursorKey = (BusinessId, AggregateId, String);

#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(
        &self,
        business_id: BusinessId,
        aggregate_id: &AggregateId,
        projection_name: &str,
    ) -> Option<u64> {
        let cursors = self.cursors.read().ok()?;
        cursors
            .get(&(business_id, aggregate_id.clone(), projection_name.to_string()))
            .copied()
    }

    fn update_cursor(
        &self,
        business_id: BusinessId,
        aggregate_id: &AggregateId,
        projection_name: &str,
        sequence_number: u64,
    ) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                (business_id, aggregate_id.clone(), projection_name.to_string()),
                sequence_number,
            );
        }
    }

    fn clear_cursors(&self, business_id: BusinessId, projection_name: &str) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|(b, _, name), _| !(*b == business_id && name == projection_name));
        }
    }
}

/// Decide whether `seq` is the next event to apply after `last`.
///
/// `Ok(false)` for replays. A gap is tolerated only for a stream the
/// projection has never seen (subscribed mid-stream).
pub(crate) fn is_next(last: u64, seq: u64) -> Result<bool, ProjectionError> {
    if seq == 0 {
        return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
    }
    if seq <= last {
        return Ok(false);
    }
    if seq != last + 1 && last != 0 {
        return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_are_skipped_and_gaps_rejected() {
        assert!(is_next(0, 1).unwrap());
        assert!(is_next(3, 4).unwrap());
        assert!(!is_next(3, 3).unwrap());
        assert!(!is_next(3, 1).unwrap());
        assert!(matches!(
            is_next(3, 5),
            Err(ProjectionError::NonMonotonicSequence { last: 3, found: 5 })
        ));
        assert!(is_next(0, 7).unwrap());
    }

    #[test]
    fn cursors_are_scoped_by_projection() {
        let store = InMemoryCursorStore::new();
        let business = BusinessId::new();
        let id = AggregateId::from("PO-1");

        store.update_cursor(business, &id, "purchasing.orders", 3);
        store.update_cursor(business, &id, "purchasing.seller_inbox", 1);
        store.clear_cursors(business, "purchasing.orders");

        assert_eq!(store.get_cursor(business, &id, "purchasing.orders"), None);
        assert_eq!(store.get_cursor(business, &id, "purchasing.seller_inbox"), Some(1));
    }
}
