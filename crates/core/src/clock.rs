//! Per-diagram Lamport clocks and the last-writer-wins comparison.

use crate::diagram::DiagramId;
use crate::operation::Operation;
use dashmap::DashMap;

/// Per-diagram Lamport clock service.
///
/// The clock is process-local and not persisted: after a restart the next
/// merge-on-receive advances it past any inbound operation it subsequently
/// sees, which restores monotonicity within a round trip.
///
/// The operation pipeline serializes all calls for a given diagram, so the
/// per-entry read-modify-write below never races for one diagram.
#[derive(Debug, Default)]
pub struct LamportClock {
    clocks: DashMap<DiagramId, u64>,
}

impl LamportClock {
    /// Creates an empty clock service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock for `diagram` by one tick and returns the new value.
    pub fn next(&self, diagram: &DiagramId) -> u64 {
        let mut entry = self.clocks.entry(diagram.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Merges a received clock value: `clock = max(clock, received) + 1`.
    ///
    /// Merging the same value twice is idempotent in effect: the second merge
    /// observes a local clock already past `received`.
    pub fn merge(&self, diagram: &DiagramId, received: u64) -> u64 {
        let mut entry = self.clocks.entry(diagram.clone()).or_insert(0);
        *entry = (*entry).max(received) + 1;
        *entry
    }

    /// Current clock value without advancing it.
    pub fn current(&self, diagram: &DiagramId) -> u64 {
        self.clocks.get(diagram).map(|v| *v).unwrap_or(0)
    }

    /// Forgets the clock for `diagram` (room eviction / diagram deletion).
    pub fn forget(&self, diagram: &DiagramId) {
        self.clocks.remove(diagram);
    }
}

/// Last-writer-wins comparison on the `(lamport_clock, wall_clock)` pair.
///
/// Exposed for clients and replay tooling; the server pipeline applies
/// arriving operations in order and does not consult this on the hot path.
pub fn should_apply(existing: Option<&Operation>, incoming: &Operation) -> bool {
    match existing {
        None => true,
        Some(existing) => {
            if incoming.lamport_clock != existing.lamport_clock {
                incoming.lamport_clock > existing.lamport_clock
            } else {
                incoming.wall_clock > existing.wall_clock
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::operation::{MovePayload, OperationBody};

    fn move_op(lamport: u64, wall: u64) -> Operation {
        Operation {
            id: format!("op-{lamport}-{wall}"),
            body: OperationBody::EntityMove(MovePayload {
                position: Position::default(),
            }),
            target_id: Some("e1".into()),
            lamport_clock: lamport,
            wall_clock: wall,
            user_id: "u1".into(),
            user_name: "Ada".into(),
            previous_state: None,
        }
    }

    #[test]
    fn next_is_monotonic_per_diagram() {
        let clock = LamportClock::new();
        let d = DiagramId::new("d1");
        assert_eq!(clock.next(&d), 1);
        assert_eq!(clock.next(&d), 2);
        assert_eq!(clock.current(&d), 2);
        assert_eq!(clock.current(&DiagramId::new("d2")), 0);
    }

    #[test]
    fn merge_takes_max_plus_one() {
        let clock = LamportClock::new();
        let d = DiagramId::new("d1");
        assert_eq!(clock.merge(&d, 10), 11);
        assert_eq!(clock.merge(&d, 3), 12);
    }

    #[test]
    fn repeated_merge_of_same_value_stays_ahead() {
        let clock = LamportClock::new();
        let d = DiagramId::new("d1");
        let first = clock.merge(&d, 7);
        let second = clock.merge(&d, 7);
        assert_eq!(first, 8);
        assert_eq!(second, 9);
        assert!(second > 7);
    }

    #[test]
    fn lww_prefers_higher_lamport_then_wall_clock() {
        let existing = move_op(5, 1000);
        assert!(should_apply(None, &existing));
        assert!(should_apply(Some(&existing), &move_op(6, 0)));
        assert!(!should_apply(Some(&existing), &move_op(4, 9999)));
        assert!(should_apply(Some(&existing), &move_op(5, 1001)));
        assert!(!should_apply(Some(&existing), &move_op(5, 1000)));
        assert!(!should_apply(Some(&existing), &move_op(5, 999)));
    }

    #[test]
    fn forget_resets_to_zero() {
        let clock = LamportClock::new();
        let d = DiagramId::new("d1");
        clock.merge(&d, 41);
        clock.forget(&d);
        assert_eq!(clock.current(&d), 0);
    }
}
