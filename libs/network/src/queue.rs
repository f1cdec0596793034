//! Backpressure Queue
//!
//! Holds items the consumer has refused while it is over its high-water
//! mark, and replays them in arrival order once the consumer pulls.
//!
//! Invariants:
//! - FIFO: items reach the target in the order they were offered
//! - an item is handed over at most once, and only while `accepting`
//! - while anything is pending, new arrivals queue behind it

use std::collections::VecDeque;

/// Downstream consumer buffer
pub trait PushTarget<T> {
    /// Take ownership of `item`; returns whether more items are wanted
    fn push(&mut self, item: T) -> bool;
}

/// Unbounded collector, mostly useful in tests
impl<T> PushTarget<T> for Vec<T> {
    fn push(&mut self, item: T) -> bool {
        Vec::push(self, item);
        true
    }
}

/// Where an offered item ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Handed straight to the target
    Delivered,
    /// Held until the next pull
    Queued,
}

/// FIFO of refused items plus the target's last readiness signal
#[derive(Debug)]
pub struct BackpressureQueue<T> {
    pending: VecDeque<T>,
    accepting: bool,
    peak: usize,
}

impl<T> Default for BackpressureQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BackpressureQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            accepting: true,
            peak: 0,
        }
    }

    /// Offer one item
    ///
    /// Delivered directly when the target is accepting and nothing is
    /// pending; otherwise appended to the pending queue.
    pub fn offer<P: PushTarget<T>>(&mut self, item: T, target: &mut P) -> Offer {
        if self.accepting && self.pending.is_empty() {
            self.accepting = target.push(item);
            Offer::Delivered
        } else {
            self.pending.push_back(item);
            self.peak = self.peak.max(self.pending.len());
            Offer::Queued
        }
    }

    /// Consumer is ready for more
    ///
    /// Drains pending items in order until the target refuses or the queue
    /// is empty. Returns the number of items handed over.
    pub fn pull<P: PushTarget<T>>(&mut self, target: &mut P) -> usize {
        let mut delivered = 0;
        let mut wants_more = true;

        while wants_more {
            let Some(item) = self.pending.pop_front() else {
                break;
            };
            wants_more = target.push(item);
            delivered += 1;
        }

        self.accepting = wants_more && self.pending.is_empty();
        delivered
    }

    /// Whether the next offer goes straight through
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Largest pending length observed
    pub fn peak_len(&self) -> usize {
        self.peak
    }

    /// Drop everything pending; returns how many items were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Target that wants at most `capacity` buffered items
    struct Bounded {
        items: VecDeque<u32>,
        capacity: usize,
    }

    impl Bounded {
        fn new(capacity: usize) -> Self {
            Self {
                items: VecDeque::new(),
                capacity,
            }
        }
    }

    impl PushTarget<u32> for Bounded {
        fn push(&mut self, item: u32) -> bool {
            self.items.push_back(item);
            self.items.len() < self.capacity
        }
    }

    #[test]
    fn test_direct_delivery_while_accepting() {
        let mut queue = BackpressureQueue::new();
        let mut target = Vec::new();

        for i in 0..5 {
            assert_eq!(queue.offer(i, &mut target), Offer::Delivered);
        }

        assert_eq!(target, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert!(queue.is_accepting());
    }

    #[test]
    fn test_refusal_queues_following_items() {
        let mut queue = BackpressureQueue::new();
        let mut target = Bounded::new(2);

        assert_eq!(queue.offer(1, &mut target), Offer::Delivered);
        assert_eq!(queue.offer(2, &mut target), Offer::Delivered);
        assert!(!queue.is_accepting());

        assert_eq!(queue.offer(3, &mut target), Offer::Queued);
        assert_eq!(queue.offer(4, &mut target), Offer::Queued);
        assert_eq!(queue.len(), 2);
        assert_eq!(target.items, [1, 2]);
    }

    #[test]
    fn test_pull_preserves_order_and_stops_on_refusal() {
        let mut queue = BackpressureQueue::new();
        let mut target = Bounded::new(1);

        queue.offer(1, &mut target);
        for i in 2..=5 {
            assert_eq!(queue.offer(i, &mut target), Offer::Queued);
        }

        target.items.clear();
        assert_eq!(queue.pull(&mut target), 1);
        assert_eq!(target.items, [2]);
        assert!(!queue.is_accepting());
        assert_eq!(queue.len(), 3);

        let mut seen = vec![1, 2];
        while !queue.is_empty() {
            target.items.clear();
            queue.pull(&mut target);
            seen.extend(target.items.iter().copied());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_pull_resumes_accepting_once_drained() {
        let mut queue = BackpressureQueue::new();
        let mut target = Bounded::new(1);

        queue.offer(1, &mut target);
        queue.offer(2, &mut target);

        target.capacity = 10;
        assert_eq!(queue.pull(&mut target), 1);
        assert!(queue.is_accepting());
        assert_eq!(queue.offer(3, &mut target), Offer::Delivered);
        assert_eq!(target.items, [1, 2, 3]);
    }

    #[test]
    fn test_delivered_items_are_not_replayed() {
        let mut queue = BackpressureQueue::new();
        let mut target = Bounded::new(1);

        queue.offer(1, &mut target);
        queue.offer(2, &mut target);
        queue.offer(3, &mut target);

        target.items.clear();
        queue.pull(&mut target);
        target.items.clear();
        queue.pull(&mut target);
        target.items.clear();
        assert_eq!(queue.pull(&mut target), 0);
        assert!(target.items.is_empty());
    }

    #[test]
    fn test_pull_on_empty_queue_restores_accepting() {
        let mut queue = BackpressureQueue::new();
        let mut target = Bounded::new(1);

        queue.offer(1, &mut target);
        assert!(!queue.is_accepting());

        target.items.clear();
        assert_eq!(queue.pull(&mut target), 0);
        assert!(queue.is_accepting());
    }

    #[test]
    fn test_clear_and_peak() {
        let mut queue = BackpressureQueue::new();
        let mut target = Bounded::new(1);

        for i in 0..4 {
            queue.offer(i, &mut target);
        }
        assert_eq!(queue.peak_len(), 3);
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.peak_len(), 3);
    }
}
