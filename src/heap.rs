//! The global event list: a min-priority structure ordering events by receive time, then
//! receiver priority, then receiver name, then sequence number.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::component::Id;
use crate::event::Event;

/// A single slot in the heap, carrying the pieces of the ordering key that are not already
/// on the [`Event`] itself (the receiver's priority and name, snapshotted at push time since
/// neither changes for the lifetime of a registered object).
struct HeapEntry {
    receive_time: f64,
    receiver_priority: i64,
    receiver_name: String,
    event: Event,
}

impl HeapEntry {
    fn key(&self) -> (f64, i64, &str, u64) {
        (
            self.receive_time,
            self.receiver_priority,
            self.receiver_name.as_str(),
            self.event.sequence_number,
        )
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `BinaryHeap` is a max-heap; reversing the comparison turns it into the min-heap over the
// ordering key that the scheduler needs, without a `Reverse<T>` wrapper at every call site.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let (t1, p1, n1, s1) = self.key();
        let (t2, p2, n2, s2) = other.key();
        t2.total_cmp(&t1)
            .then_with(|| p2.cmp(&p1))
            .then_with(|| n2.cmp(n1))
            .then_with(|| s2.cmp(&s1))
    }
}

/// Pending events ordered by `(receive_time, receiver.priority_key, receiver.name, sequence_number)`.
///
/// `pop_frontier` extracts every event tied at the head for a single receiver in one call, so
/// that the dispatcher can deliver simultaneous events to one object as a batch. Events for
/// different receivers sharing the same `receive_time` are never merged into one frontier: the
/// heap's ordering key already decides which receiver's frontier comes first.
#[derive(Default)]
pub struct EventHeap {
    heap: BinaryHeap<HeapEntry>,
}

impl EventHeap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event, recording the receiver's current priority and name for ordering.
    ///
    /// Complexity: O(log n).
    pub fn push(&mut self, event: Event, receiver_priority: i64, receiver_name: String) {
        self.heap.push(HeapEntry {
            receive_time: event.receive_time,
            receiver_priority,
            receiver_name,
            event,
        });
    }

    /// Returns the `receive_time` of the minimum event, or `None` if the heap is empty.
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.receive_time)
    }

    /// Returns the receiver of the minimum event, or `None` if the heap is empty.
    pub fn peek_receiver(&self) -> Option<Id> {
        self.heap.peek().map(|entry| entry.event.receiver)
    }

    /// Pops and returns every event tied with the minimum on both `receive_time` and
    /// `receiver`. The returned vector is never empty unless the heap was already empty.
    ///
    /// Complexity: O(k log n) for a frontier of size k.
    pub fn pop_frontier(&mut self) -> Vec<Event> {
        let mut frontier = Vec::new();
        let (time, receiver) = match self.heap.peek() {
            Some(entry) => (entry.receive_time, entry.event.receiver),
            None => return frontier,
        };
        while let Some(entry) = self.heap.peek() {
            if entry.receive_time != time || entry.event.receiver != receiver {
                break;
            }
            frontier.push(self.heap.pop().unwrap().event);
        }
        frontier
    }

    /// Returns `true` if there are no pending events.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Removes every pending event, discarding them without delivery.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Returns the pending events in heap-pop order, for checkpoint snapshotting.
    ///
    /// Draining is destructive: the heap is empty afterwards. Callers that need to keep
    /// simulating after taking a snapshot should feed the returned events back in, or take
    /// the snapshot via [`crate::Simulator::snapshot_heap`], which does this for them.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            events.push(entry.event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evt(seq: u64, time: f64, receiver: Id) -> Event {
        Event {
            sequence_number: seq,
            creation_time: 0.0,
            receive_time: time,
            sender: 0,
            receiver,
            message: Box::new(()),
        }
    }

    #[test]
    fn pops_in_time_order() {
        let mut heap = EventHeap::new();
        heap.push(evt(2, 5.0, 1), 0, "b".into());
        heap.push(evt(1, 2.0, 1), 0, "b".into());
        heap.push(evt(3, 8.0, 1), 0, "b".into());
        assert_eq!(heap.peek_time(), Some(2.0));
        let f1 = heap.pop_frontier();
        assert_eq!(f1.len(), 1);
        assert_eq!(f1[0].sequence_number, 1);
        assert_eq!(heap.peek_time(), Some(5.0));
    }

    #[test]
    fn frontier_groups_same_time_same_receiver() {
        let mut heap = EventHeap::new();
        heap.push(evt(1, 5.0, 1), 0, "a".into());
        heap.push(evt(2, 5.0, 1), 0, "a".into());
        heap.push(evt(3, 5.0, 2), 1, "b".into());
        let frontier = heap.pop_frontier();
        assert_eq!(frontier.len(), 2);
        assert!(frontier.iter().all(|e| e.receiver == 1));
        let next = heap.pop_frontier();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].receiver, 2);
    }

    #[test]
    fn frontier_orders_by_receiver_priority_then_name() {
        let mut heap = EventHeap::new();
        heap.push(evt(1, 5.0, 10), 5, "z".into());
        heap.push(evt(2, 5.0, 20), 1, "a".into());
        let first = heap.pop_frontier();
        assert_eq!(first[0].receiver, 20);
        let second = heap.pop_frontier();
        assert_eq!(second[0].receiver, 10);
    }

    #[test]
    fn empty_heap_yields_empty_frontier() {
        let mut heap = EventHeap::new();
        assert!(heap.is_empty());
        assert_eq!(heap.pop_frontier().len(), 0);
    }
}
