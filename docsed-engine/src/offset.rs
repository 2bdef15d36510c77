//! Structural offset safety.
//!
//! Every edit below a position shifts that position. Instead of trusting
//! call sites to process matches in the right order, the tracker records
//! each edit in *snapshot* coordinates and remaps any snapshot offset to its
//! current position. Operations compiled against one snapshot stay valid
//! across phases as long as every committed edit is recorded here.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edit {
    Delete { start: usize, end: usize },
    Insert { at: usize, len: usize },
}

#[derive(Clone, Debug, Default)]
pub struct OffsetTracker {
    edits: Vec<Edit>,
}

impl OffsetTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delete(&mut self, start: usize, end: usize) {
        if end > start {
            self.edits.push(Edit::Delete { start, end });
        }
    }

    pub fn record_insert(&mut self, at: usize, len: usize) {
        if len > 0 {
            self.edits.push(Edit::Insert { at, len });
        }
    }

    /// Map a snapshot offset to its current position.
    ///
    /// An insert at exactly `offset` does not shift it: the offset names the
    /// position where that text now begins. An offset inside a deleted range
    /// collapses onto the deletion point.
    #[must_use]
    pub fn remap(&self, offset: usize) -> usize {
        let mut effective = offset;
        for edit in &self.edits {
            if let Edit::Delete { start, end } = edit
                && offset > *start
                && offset < *end
            {
                effective = *start;
                break;
            }
        }

        let mut delta = 0i64;
        for edit in &self.edits {
            match edit {
                Edit::Delete { start, end } => {
                    if effective >= *end {
                        delta -= i64::try_from(end - start).unwrap_or(0);
                    }
                }
                Edit::Insert { at, len } => {
                    if *at < effective {
                        delta += i64::try_from(*len).unwrap_or(0);
                    }
                }
            }
        }
        usize::try_from(i64::try_from(effective).unwrap_or(0) + delta).unwrap_or(0)
    }

    /// Remap a snapshot range; the end is treated exclusively.
    #[must_use]
    pub fn remap_range(&self, start: usize, end: usize) -> (usize, usize) {
        (self.remap(start), self.remap(end))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn deletes_below_shift_down() {
        let mut t = OffsetTracker::new();
        t.record_delete(2, 5);
        assert_eq!(t.remap(10), 7);
        assert_eq!(t.remap(2), 2);
        assert_eq!(t.remap(1), 1);
    }

    #[test]
    fn inserts_below_shift_up() {
        let mut t = OffsetTracker::new();
        t.record_insert(3, 4);
        assert_eq!(t.remap(3), 3);
        assert_eq!(t.remap(4), 8);
        assert_eq!(t.remap(0), 0);
    }

    #[test]
    fn replace_keeps_following_text_stable_when_lengths_match() {
        let mut t = OffsetTracker::new();
        t.record_delete(5, 8);
        t.record_insert(5, 3);
        assert_eq!(t.remap(8), 8);
        assert_eq!(t.remap(12), 12);
    }

    #[test]
    fn offset_inside_deleted_range_collapses() {
        let mut t = OffsetTracker::new();
        t.record_delete(4, 9);
        assert_eq!(t.remap(6), 4);
    }

    proptest! {
        // Remapping through recorded edits must agree with literally applying
        // the edits to a string and tracking a marker character.
        #[test]
        fn remap_matches_sequential_application(
            edits in proptest::collection::vec((0usize..40, 1usize..5), 1..6),
            probe in 0usize..40,
        ) {
            let original: String = ('a'..='z').cycle().take(60).collect();
            let mut text = original.clone();
            let mut tracker = OffsetTracker::new();

            // Apply disjoint-safe edits highest-offset-first, as the
            // compiler does.
            let mut sorted = edits;
            sorted.sort_by(|a, b| b.0.cmp(&a.0));
            sorted.dedup_by_key(|e| e.0);
            // Keep edits disjoint: drop any that overlaps the previous one.
            let mut kept: Vec<(usize, usize)> = Vec::new();
            for (at, len) in sorted {
                if kept.last().is_none_or(|(prev, _)| at + len <= *prev) {
                    kept.push((at, len));
                }
            }

            for &(at, len) in &kept {
                text.replace_range(at..at + len, "XY");
                tracker.record_delete(at, at + len);
                tracker.record_insert(at, 2);
            }

            // The probe survives when it is outside every edited range.
            let outside = kept.iter().all(|(at, len)| probe < *at || probe >= at + len);
            if outside && probe < 60 {
                let expected = original.chars().nth(probe).unwrap();
                let remapped = tracker.remap(probe);
                prop_assert_eq!(text.chars().nth(remapped), Some(expected));
            }
        }
    }
}
