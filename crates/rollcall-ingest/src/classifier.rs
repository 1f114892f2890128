//! Entry/exit classification.
//!
//! Direction is a pure function of history within one (device, subject)
//! partition: the first event is an entry, every later one the complement of
//! the event before it. A late event inserted mid-history therefore flips
//! everything after it, and [`rederive`] reports exactly which rows change.
//!
//! ```text
//! before: 09:00 E   12:00 X   13:00 E
//! insert:           10:30
//! after:  09:00 E   10:30 X   12:00 E   13:00 X
//!                             ^^^^^^^   ^^^^^^^ changed
//! ```

use rollcall_core::Direction;

/// Direction of an event whose predecessor in the partition had `previous`.
///
/// # Examples
///
/// ```
/// use rollcall_core::Direction;
/// use rollcall_ingest::classifier::classify;
///
/// assert_eq!(classify(None), Direction::Entry);
/// assert_eq!(classify(Some(Direction::Entry)), Direction::Exit);
/// ```
#[must_use]
pub fn classify(previous: Option<Direction>) -> Direction {
    match previous {
        None => Direction::Entry,
        Some(direction) => direction.toggled(),
    }
}

/// One row whose stored direction disagrees with its derived direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reclassification {
    pub id: i64,
    pub from: Direction,
    pub to: Direction,
}

/// Re-derive directions for `events`, given in partition order and starting
/// right after an event with direction `previous`.
///
/// Returns the rows whose stored direction must change, in order.
///
/// # Examples
///
/// ```
/// use rollcall_core::Direction::{Entry, Exit};
/// use rollcall_ingest::classifier::rederive;
///
/// // A late event (id 9) landed between an entry and an exit.
/// let changes = rederive(Some(Entry), [(9, Entry), (2, Exit), (3, Entry)]);
/// let ids: Vec<_> = changes.iter().map(|c| c.id).collect();
/// assert_eq!(ids, vec![9, 2, 3]);
/// ```
pub fn rederive<I>(previous: Option<Direction>, events: I) -> Vec<Reclassification>
where
    I: IntoIterator<Item = (i64, Direction)>,
{
    let mut last = previous;
    let mut changes = Vec::new();
    for (id, stored) in events {
        let derived = classify(last);
        if derived != stored {
            changes.push(Reclassification {
                id,
                from: stored,
                to: derived,
            });
        }
        last = Some(derived);
    }
    changes
}

/// Directions for a fresh partition of `len` events.
#[must_use]
pub fn sequence(len: usize) -> Vec<Direction> {
    let mut last = None;
    (0..len)
        .map(|_| {
            let direction = classify(last);
            last = Some(direction);
            direction
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rollcall_core::Direction::{Entry, Exit};

    fn direction() -> impl Strategy<Value = Direction> {
        prop_oneof![Just(Entry), Just(Exit)]
    }

    #[test]
    fn test_workday_sequence() {
        assert_eq!(sequence(4), vec![Entry, Exit, Entry, Exit]);
    }

    #[test]
    fn test_late_event_flips_tail() {
        // 09:00 E (id 1) and 12:00 X (id 2) stored; 10:30 (id 3) inserted provisionally as Entry.
        let changes = rederive(Some(Entry), [(3, Entry), (2, Exit)]);
        assert_eq!(
            changes,
            vec![
                Reclassification { id: 3, from: Entry, to: Exit },
                Reclassification { id: 2, from: Exit, to: Entry },
            ]
        );
    }

    #[test]
    fn test_consistent_history_has_no_changes() {
        assert!(rederive(None, [(1, Entry), (2, Exit), (3, Entry)]).is_empty());
        assert!(rederive(Some(Exit), std::iter::empty()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_sequence_starts_with_entry_and_alternates(len in 1usize..200) {
            let directions = sequence(len);
            prop_assert_eq!(directions[0], Entry);
            for pair in directions.windows(2) {
                prop_assert_ne!(pair[0], pair[1]);
            }
        }

        #[test]
        fn prop_rederive_restores_alternation(
            previous in proptest::option::of(direction()),
            stored in proptest::collection::vec(direction(), 0..64),
        ) {
            let mut rows: Vec<(i64, Direction)> = stored.into_iter().enumerate().map(|(i, d)| (i as i64, d)).collect();
            for change in rederive(previous, rows.clone()) {
                rows[change.id as usize].1 = change.to;
            }

            let mut last = previous;
            for (_, direction) in &rows {
                prop_assert_eq!(*direction, classify(last));
                last = Some(*direction);
            }
            prop_assert!(rederive(previous, rows).is_empty());
        }

        #[test]
        fn prop_changes_only_report_real_differences(
            previous in proptest::option::of(direction()),
            stored in proptest::collection::vec(direction(), 0..64),
        ) {
            let rows: Vec<(i64, Direction)> = stored.iter().copied().enumerate().map(|(i, d)| (i as i64, d)).collect();
            for change in rederive(previous, rows) {
                prop_assert_ne!(change.from, change.to);
                prop_assert_eq!(change.from, stored[change.id as usize]);
            }
        }
    }
}
