//! The per-session outbound buffer (spec.md §3/§4.2).

use std::collections::VecDeque;

/// A single server-to-client message, assigned a monotonic id at enqueue
/// time.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingArray {
    pub id: u64,
    pub payload: serde_json::Value,
    pub byte_size: usize,
}

/// Ordered, gap-free buffer of [`OutgoingArray`]s awaiting client
/// acknowledgement. Ids start at 1 and increase by exactly 1 per enqueue.
#[derive(Debug, Default)]
pub struct OutgoingQueue {
    items: VecDeque<OutgoingArray>,
    next_id: u64,
}

impl OutgoingQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Assigns the next id, measures the serialized size, and appends.
    pub fn enqueue(&mut self, payload: serde_json::Value) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let byte_size = payload.to_string().len();
        self.items.push_back(OutgoingArray {
            id,
            payload,
            byte_size,
        });
        id
    }

    /// Removes every array with id <= `upto`. Idempotent; a regression
    /// (`upto` below the current head id) is a silent no-op.
    pub fn acknowledge(&mut self, upto: u64) {
        while let Some(front) = self.items.front() {
            if front.id <= upto {
                self.items.pop_front();
            } else {
                break;
            }
        }
    }

    /// `(item count, total outstanding bytes)`, used as a heartbeat/state
    /// snapshot payload.
    pub fn outstanding(&self) -> (usize, usize) {
        (self.items.len(), self.items.iter().map(|a| a.byte_size).sum())
    }

    /// All currently unacknowledged arrays, in ascending id order. Does not
    /// remove anything — removal only happens via [`Self::acknowledge`].
    pub fn drain(&self) -> Vec<(u64, serde_json::Value)> {
        self.items
            .iter()
            .map(|a| (a.id, a.payload.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Id of the most recently enqueued array, if any.
    pub fn last_array_id(&self) -> Option<u64> {
        self.items.back().map(|a| a.id).or_else(|| {
            if self.next_id > 1 {
                Some(self.next_id - 1)
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_assigns_ascending_ids_starting_at_one() {
        let mut q = OutgoingQueue::new();
        assert_eq!(q.enqueue(serde_json::json!("a")), 1);
        assert_eq!(q.enqueue(serde_json::json!("b")), 2);
        assert_eq!(q.enqueue(serde_json::json!("c")), 3);
    }

    #[test]
    fn acknowledge_removes_head_through_upto_inclusive() {
        let mut q = OutgoingQueue::new();
        q.enqueue(serde_json::json!("a"));
        q.enqueue(serde_json::json!("b"));
        q.enqueue(serde_json::json!("c"));
        q.acknowledge(2);
        let drained = q.drain();
        assert_eq!(drained.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn acknowledge_is_idempotent() {
        let mut q = OutgoingQueue::new();
        q.enqueue(serde_json::json!("a"));
        q.acknowledge(1);
        q.acknowledge(1);
        assert!(q.is_empty());
    }

    #[test]
    fn acknowledge_ignores_regression_below_head() {
        let mut q = OutgoingQueue::new();
        q.enqueue(serde_json::json!("a"));
        q.enqueue(serde_json::json!("b"));
        q.acknowledge(1);
        q.acknowledge(0);
        let drained = q.drain();
        assert_eq!(drained.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn drain_never_removes_items() {
        let mut q = OutgoingQueue::new();
        q.enqueue(serde_json::json!("a"));
        assert_eq!(q.drain().len(), 1);
        assert_eq!(q.drain().len(), 1);
    }

    #[test]
    fn outstanding_sums_byte_sizes_of_unacked_items() {
        let mut q = OutgoingQueue::new();
        q.enqueue(serde_json::json!("a"));
        q.enqueue(serde_json::json!("bb"));
        let (count, bytes) = q.outstanding();
        assert_eq!(count, 2);
        assert_eq!(bytes, "\"a\"".len() + "\"bb\"".len());
    }

    #[test]
    fn last_array_id_tracks_tail_across_acknowledgement() {
        let mut q = OutgoingQueue::new();
        assert_eq!(q.last_array_id(), None);
        q.enqueue(serde_json::json!("a"));
        q.enqueue(serde_json::json!("b"));
        assert_eq!(q.last_array_id(), Some(2));
        q.acknowledge(2);
        assert_eq!(q.last_array_id(), Some(2));
    }

    #[test]
    fn no_gaps_across_interleaved_enqueue_and_acknowledge() {
        let mut q = OutgoingQueue::new();
        q.enqueue(serde_json::json!(1));
        q.acknowledge(1);
        q.enqueue(serde_json::json!(2));
        q.enqueue(serde_json::json!(3));
        let ids: Vec<u64> = q.drain().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
