use std::sync::Arc;
use std::thread;

use stream_harness::buffer::{BoundedChannel, OverflowPolicy};

#[test]
fn test_drop_oldest_keeps_most_recent_items() {
    let ring = BoundedChannel::new(3, OverflowPolicy::DropOldest).unwrap();
    for i in 0..5 {
        assert!(ring.push(i), "drop-oldest always accepts");
    }

    assert_eq!(ring.drops(), 2);
    assert_eq!(ring.drain_upto(10), vec![2, 3, 4]);
    assert!(ring.is_empty());
}

#[test]
fn test_drop_oldest_drops_equal_pushes_minus_capacity() {
    let ring = BoundedChannel::new(4, OverflowPolicy::DropOldest).unwrap();
    for i in 0..37u32 {
        ring.push(i);
    }
    assert_eq!(ring.drops(), 33);
    assert_eq!(ring.snapshot(), vec![33, 34, 35, 36]);
}

#[test]
fn test_no_drops_below_capacity() {
    let ring = BoundedChannel::new(4, OverflowPolicy::DropOldest).unwrap();
    for i in 0..4 {
        ring.push(i);
    }
    assert_eq!(ring.drops(), 0);
    assert_eq!(ring.len(), 4);
}

#[test]
fn test_reject_newest_keeps_first_items() {
    let ring = BoundedChannel::new(2, OverflowPolicy::RejectNewest).unwrap();
    assert!(ring.push("a"));
    assert!(ring.push("b"));
    assert!(!ring.push("c"));
    assert!(!ring.push("d"));

    assert_eq!(ring.drops(), 2);
    assert_eq!(ring.snapshot(), vec!["a", "b"]);

    // Draining frees space again
    assert_eq!(ring.drain_upto(1), vec!["a"]);
    assert!(ring.push("e"));
    assert_eq!(ring.drain_upto(5), vec!["b", "e"]);
    assert_eq!(ring.drops(), 2);
}

#[test]
fn test_drain_upto_leaves_remainder() {
    let ring = BoundedChannel::new(10, OverflowPolicy::DropOldest).unwrap();
    for i in 0..7 {
        ring.push(i);
    }
    for k in [3usize, 0, 2, 10] {
        let before = ring.len();
        let drained = ring.drain_upto(k);
        assert_eq!(drained.len(), k.min(before));
        assert_eq!(ring.len(), before.saturating_sub(k));
    }
    assert!(ring.drain_upto(4).is_empty());
}

#[test]
fn test_concurrent_producer_and_consumer() {
    const ITEMS: u32 = 2000;
    let ring = Arc::new(BoundedChannel::new(64, OverflowPolicy::DropOldest).unwrap());

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 0..ITEMS {
                ring.push(i);
            }
        })
    };

    let mut received = Vec::new();
    while !producer.is_finished() {
        received.extend(ring.drain_upto(16));
        assert!(ring.len() <= ring.capacity());
    }
    producer.join().unwrap();
    received.extend(ring.drain_upto(usize::MAX));

    // Survivors arrive in push order and every push is accounted for.
    assert!(received.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(received.len() as u64 + ring.drops(), ITEMS as u64);
    assert_eq!(received.last(), Some(&(ITEMS - 1)));
}

#[test]
fn test_concurrent_producers_reject_newest() {
    let ring = Arc::new(BoundedChannel::new(50, OverflowPolicy::RejectNewest).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut accepted = 0u64;
                for i in 0..100 {
                    if ring.push(t * 1000 + i) {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();

    let accepted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(accepted, 50);
    assert_eq!(ring.drops(), 350);
    assert_eq!(ring.len(), 50);
}
