// SPDX-License-Identifier: Apache-2.0

//! Time-ordered index of flow handles, used by the expiry sweep.

use crate::flow::{FlowHandle, Timestamp};
use std::collections::BTreeMap;

/// Multi-map from timestamp bucket to the flows last refreshed in that
/// second.
///
/// The index is maintained lazily: a refresh only inserts under the new
/// timestamp and never removes the entry under the old one. Stale entries
/// are recognized during the sweep by comparing the bucket timestamp with
/// the flow's `last_seen`; only the newest entry of a flow matches. The
/// refresh path inserts at most one entry per flow per second, which
/// bounds the growth of the index.
#[derive(Debug, Default)]
pub(crate) struct ExpiryIndex {
    buckets: BTreeMap<Timestamp, Vec<FlowHandle>>,
}

impl ExpiryIndex {
    pub(crate) fn new() -> ExpiryIndex {
        ExpiryIndex {
            buckets: BTreeMap::new(),
        }
    }

    /// Record that `handle` was refreshed at `ts`.
    pub(crate) fn insert(&mut self, ts: Timestamp, handle: FlowHandle) {
        self.buckets.entry(ts).or_default().push(handle);
    }

    /// Pop the oldest bucket if it is outside the expiration window, i.e.
    /// strictly older than `expiration` seconds before `now`.
    ///
    /// Buckets are ordered, so the first bucket inside the window ends the
    /// sweep. A backward clock jump makes `now` smaller than the bucket
    /// timestamp; such buckets count as young.
    pub(crate) fn pop_expired(
        &mut self,
        now: Timestamp,
        expiration: Timestamp,
    ) -> Option<(Timestamp, Vec<FlowHandle>)> {
        let (&ts, _) = self.buckets.first_key_value()?;
        match now.checked_sub(ts) {
            Some(age) if age > expiration => self.buckets.pop_first(),
            _ => None,
        }
    }

    /// Number of entries recorded under `ts`.
    #[cfg(test)]
    pub(crate) fn entries_at(&self, ts: Timestamp) -> usize {
        self.buckets.get(&ts).map_or(0, Vec::len)
    }

    /// Number of non-empty buckets.
    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ExpiryIndex;
    use crate::flow::FlowHandle;

    #[test]
    fn pops_buckets_oldest_first() {
        let mut index = ExpiryIndex::new();
        index.insert(5, FlowHandle::new(0));
        index.insert(3, FlowHandle::new(1));
        index.insert(3, FlowHandle::new(2));

        let (ts, handles) = index.pop_expired(10, 2).unwrap();
        assert_eq!(ts, 3);
        assert_eq!(handles, vec![FlowHandle::new(1), FlowHandle::new(2)]);

        let (ts, _) = index.pop_expired(10, 2).unwrap();
        assert_eq!(ts, 5);
        assert!(index.pop_expired(10, 2).is_none());
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let mut index = ExpiryIndex::new();
        index.insert(1, FlowHandle::new(0));
        // age == expiration stays
        assert!(index.pop_expired(3, 2).is_none());
        // age > expiration goes
        assert!(index.pop_expired(4, 2).is_some());
    }

    #[test]
    fn backward_clock_jump_keeps_buckets() {
        let mut index = ExpiryIndex::new();
        index.insert(100, FlowHandle::new(0));
        assert!(index.pop_expired(50, 2).is_none());
    }
}
