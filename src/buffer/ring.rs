use std::sync::{Mutex, MutexGuard};

use ringbuf::traits::{Consumer, Observer, Producer, RingBuffer};
use ringbuf::HeapRb;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// What a full channel does with the next push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest item to make room. The push succeeds.
    #[default]
    DropOldest,
    /// Leave the contents untouched and refuse the new item.
    RejectNewest,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            "reject-newest" => Ok(OverflowPolicy::RejectNewest),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown overflow policy '{}'",
                other
            ))),
        }
    }
}

struct Slots<T> {
    rb: HeapRb<T>,
    drops: u64,
}

/// Fixed-capacity FIFO shared between the acquisition thread and the driver.
///
/// Every push and drain runs inside one critical section, so the
/// check-capacity / evict-or-reject / append sequence is never observed half
/// done. Neither operation waits for space or data.
pub struct BoundedChannel<T> {
    slots: Mutex<Slots<T>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> BoundedChannel<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        if capacity == 0 {
            return Err(HarnessError::InvalidCapacity);
        }
        Ok(Self {
            slots: Mutex::new(Slots {
                rb: HeapRb::new(capacity),
                drops: 0,
            }),
            capacity,
            policy,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item, applying the overflow policy when full.
    /// Returns false only when `RejectNewest` refused the item.
    pub fn push(&self, item: T) -> bool {
        let mut slots = self.lock();
        match self.policy {
            OverflowPolicy::RejectNewest => match slots.rb.try_push(item) {
                Ok(()) => true,
                Err(_rejected) => {
                    slots.drops += 1;
                    false
                }
            },
            OverflowPolicy::DropOldest => {
                if slots.rb.push_overwrite(item).is_some() {
                    slots.drops += 1;
                }
                true
            }
        }
    }

    /// Remove up to `max_items` items, oldest first.
    pub fn drain_upto(&self, max_items: usize) -> Vec<T> {
        let mut slots = self.lock();
        let count = max_items.min(slots.rb.occupied_len());
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            match slots.rb.try_pop() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        items
    }

    /// Cumulative count of items evicted or rejected. Never decreases.
    pub fn drops(&self) -> u64 {
        self.lock().drops
    }

    pub fn len(&self) -> usize {
        self.lock().rb.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

impl<T: Clone> BoundedChannel<T> {
    /// Copy of the current contents in FIFO order, without removing them.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().rb.iter().cloned().collect()
    }
}

impl<T> std::fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("len", &self.len())
            .field("drops", &self.drops())
            .finish()
    }
}
