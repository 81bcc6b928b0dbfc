//! High-water-mark tracking for emitted entries.
//!
//! The watermark is the newest `published_at` the relay has already emitted.
//! Each cycle the fetched batch is filtered against it, and after emission the
//! loop commits a new value.  The watermark only ever moves forward.
//!
//! ## Ordering assumption
//!
//! Feeds list entries newest first.  [`filter_new`] walks the batch in that
//! order and stops at the first entry that is not newer than the watermark.
//! If a feed breaks the ordering, still-new entries behind a stale one are
//! skipped rather than emitted out of order.

use chrono::{DateTime, Utc};

use crate::source::Entry;

/// Split `entries` into the prefix that is newer than `current`, and the
/// candidate next watermark.
///
/// Returns the new entries in feed order (newest first) and the
/// `published_at` of the first of them, or `None` when nothing is new.
/// Pure: calling it twice with the same arguments gives the same answer.
pub fn filter_new(
    current: Option<DateTime<Utc>>,
    entries: &[Entry],
) -> (Vec<Entry>, Option<DateTime<Utc>>) {
    let fresh: Vec<Entry> = entries
        .iter()
        .take_while(|entry| current.map_or(true, |mark| entry.published_at > mark))
        .cloned()
        .collect();

    let candidate = fresh.first().map(|entry| entry.published_at);
    (fresh, candidate)
}

/// The watermark owned by one poll loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatermarkTracker {
    current: Option<DateTime<Utc>>,
}

impl WatermarkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<DateTime<Utc>> {
        self.current
    }

    /// [`filter_new`] against the current watermark.
    pub fn filter(&self, entries: &[Entry]) -> (Vec<Entry>, Option<DateTime<Utc>>) {
        filter_new(self.current, entries)
    }

    /// Advance to `candidate` if it is strictly newer.  Returns whether the
    /// watermark moved.
    pub fn commit(&mut self, candidate: Option<DateTime<Utc>>) -> bool {
        match (self.current, candidate) {
            (_, None) => false,
            (Some(mark), Some(next)) if next <= mark => false,
            (_, Some(next)) => {
                self.current = Some(next);
                true
            }
        }
    }

    /// True when both a TTL boundary and a watermark exist and the watermark
    /// is past the boundary.  An unset TTL never expires.
    pub fn has_passed(&self, ttl: Option<DateTime<Utc>>) -> bool {
        matches!((self.current, ttl), (Some(mark), Some(limit)) if mark > limit)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn entry(secs: i64, title: &str) -> Entry {
        Entry::new(title, at(secs))
    }

    #[test]
    fn unset_watermark_takes_everything() {
        let batch = vec![entry(5, "a"), entry(3, "b")];
        let (fresh, next) = filter_new(None, &batch);

        assert_eq!(fresh, batch);
        assert_eq!(next, Some(at(5)));
    }

    #[test]
    fn walk_stops_at_first_stale_entry() {
        let batch = vec![entry(5, "a"), entry(3, "b")];
        let (fresh, next) = filter_new(Some(at(4)), &batch);

        assert_eq!(fresh, vec![entry(5, "a")]);
        assert_eq!(next, Some(at(5)));
    }

    #[test]
    fn nothing_newer_yields_no_candidate() {
        let (fresh, next) = filter_new(Some(at(10)), &[entry(5, "a")]);

        assert!(fresh.is_empty());
        assert_eq!(next, None);
    }

    #[test]
    fn empty_batch() {
        assert_eq!(filter_new(None, &[]), (vec![], None));
        assert_eq!(filter_new(Some(at(1)), &[]), (vec![], None));
    }

    #[test]
    fn equal_timestamp_is_not_new() {
        let (fresh, next) = filter_new(Some(at(5)), &[entry(5, "a"), entry(4, "b")]);

        assert!(fresh.is_empty());
        assert_eq!(next, None);
    }

    #[test]
    fn out_of_order_entries_behind_a_stale_one_are_skipped() {
        // 7 is newer than the watermark but sits behind 3, which is not.
        let batch = vec![entry(9, "a"), entry(3, "b"), entry(7, "c")];
        let (fresh, next) = filter_new(Some(at(5)), &batch);

        assert_eq!(fresh, vec![entry(9, "a")]);
        assert_eq!(next, Some(at(9)));
    }

    #[test]
    fn filtering_is_repeatable() {
        let batch = vec![entry(8, "a"), entry(6, "b"), entry(2, "c")];
        assert_eq!(filter_new(Some(at(4)), &batch), filter_new(Some(at(4)), &batch));
    }

    #[test]
    fn fresh_entries_are_a_prefix_strictly_newer_than_watermark() {
        let batch: Vec<Entry> = (0..20).rev().map(|s| entry(s, &s.to_string())).collect();

        for mark in -1..21 {
            let (fresh, next) = filter_new(Some(at(mark)), &batch);
            assert!(fresh.iter().all(|e| e.published_at > at(mark)));
            assert_eq!(fresh.as_slice(), &batch[..fresh.len()]);
            assert_eq!(next, fresh.first().map(|e| e.published_at));
        }
    }

    #[test]
    fn commit_only_moves_forward() {
        let mut tracker = WatermarkTracker::new();

        assert!(!tracker.commit(None));
        assert_eq!(tracker.current(), None);

        assert!(tracker.commit(Some(at(5))));
        assert!(!tracker.commit(Some(at(5))));
        assert!(!tracker.commit(Some(at(3))));
        assert_eq!(tracker.current(), Some(at(5)));

        assert!(tracker.commit(Some(at(6))));
        assert_eq!(tracker.current(), Some(at(6)));
    }

    #[test]
    fn tracker_filters_against_its_own_watermark() {
        let mut tracker = WatermarkTracker::new();
        tracker.commit(Some(at(4)));
        let (fresh, _) = tracker.filter(&[entry(5, "a"), entry(3, "b")]);
        assert_eq!(fresh, vec![entry(5, "a")]);
    }

    #[test]
    fn ttl_is_disabled_unless_both_sides_are_set() {
        let unset = WatermarkTracker::new();
        assert!(!unset.has_passed(None));
        assert!(!unset.has_passed(Some(at(0))));

        let mut set = WatermarkTracker::new();
        set.commit(Some(at(10)));
        assert!(!set.has_passed(None));
        assert!(!set.has_passed(Some(at(10))));
        assert!(set.has_passed(Some(at(9))));
    }
}
