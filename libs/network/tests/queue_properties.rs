//! Backpressure queue ordering properties

use dgram_stream::{BackpressureQueue, Offer, PushTarget};
use proptest::prelude::*;

/// Consumer that accepts up to `capacity` items between reads
struct Consumer {
    buffered: Vec<u32>,
    capacity: usize,
}

impl PushTarget<u32> for Consumer {
    fn push(&mut self, item: u32) -> bool {
        self.buffered.push(item);
        self.buffered.len() < self.capacity
    }
}

#[derive(Debug, Clone)]
enum Step {
    Arrive(u8),
    Read(u8),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1u8..10).prop_map(Step::Arrive),
        (0u8..10).prop_map(Step::Read),
    ]
}

proptest! {
    #[test]
    fn delivery_keeps_arrival_order(capacity in 1usize..8, steps in prop::collection::vec(step(), 1..60)) {
        let mut queue = BackpressureQueue::new();
        let mut consumer = Consumer { buffered: Vec::new(), capacity };
        let mut consumed = Vec::new();
        let mut next = 0u32;

        for step in steps {
            match step {
                Step::Arrive(count) => {
                    for _ in 0..count {
                        let outcome = queue.offer(next, &mut consumer);
                        if outcome == Offer::Delivered {
                            prop_assert!(consumer.buffered.len() <= capacity);
                        }
                        next += 1;
                    }
                }
                Step::Read(count) => {
                    let take = usize::from(count).min(consumer.buffered.len());
                    consumed.extend(consumer.buffered.drain(..take));
                    if consumer.buffered.len() < capacity {
                        queue.pull(&mut consumer);
                    }
                }
            }
        }

        // Resume pulling until everything has been handed over
        loop {
            consumed.append(&mut consumer.buffered);
            if queue.is_empty() {
                break;
            }
            queue.pull(&mut consumer);
        }

        prop_assert_eq!(consumed, (0..next).collect::<Vec<_>>());
    }

    #[test]
    fn nothing_lost_while_consumer_is_stalled(arrivals in 1u32..500, capacity in 1usize..4) {
        let mut queue = BackpressureQueue::new();
        let mut consumer = Consumer { buffered: Vec::new(), capacity };

        for i in 0..arrivals {
            queue.offer(i, &mut consumer);
        }

        let direct = consumer.buffered.len();
        prop_assert_eq!(direct, capacity.min(arrivals as usize));
        prop_assert_eq!(queue.len() + direct, arrivals as usize);
    }
}
