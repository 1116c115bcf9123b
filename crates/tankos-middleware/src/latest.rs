//! [`Latest`] – copy-on-publish slot for the most recent value.
//!
//! The producer builds a complete value, wraps it in an [`Arc`] *outside*
//! the lock and then swaps the pointer in.  Readers clone the [`Arc`] out.
//! The guard is only ever held for that pointer swap or clone, never across
//! I/O or computation, so a slow reader cannot stall the producer and no
//! reader can observe a value under construction.
//!
//! Every publish also stamps the slot with a monotonic sequence number and
//! the publish instant, which gives consumers a cheap staleness signal
//! ([`Latest::age`]) and a way to detect "nothing new yet"
//! ([`Latest::latest_after`]).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Slot<T> {
    value: Option<Arc<T>>,
    sequence: u64,
    published_at: Instant,
}

/// Shared handle to a single-producer, many-reader slot.
///
/// Cloning the handle is cheap; all clones observe the same slot.
///
/// # Example
///
/// ```
/// use tankos_middleware::Latest;
///
/// let slot = Latest::new();
/// assert!(slot.latest().is_none());
///
/// slot.publish(42_u32);
/// assert_eq!(slot.copy_out(), Some(42));
/// assert_eq!(slot.sequence(), 1);
/// ```
pub struct Latest<T> {
    inner: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Latest<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Latest<T> {
    /// Create an empty slot.  [`age`][Self::age] counts from now until the
    /// first publish.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slot {
                value: None,
                sequence: 0,
                published_at: Instant::now(),
            })),
        }
    }

    /// Replace the visible value and return its sequence number (starting
    /// at 1).
    pub fn publish(&self, value: T) -> u64 {
        let fresh = Arc::new(value);
        let (sequence, previous) = {
            let mut slot = self.inner.lock();
            let previous = slot.value.replace(fresh);
            slot.sequence += 1;
            slot.published_at = Instant::now();
            (slot.sequence, previous)
        };
        // The superseded value may be large; release it after the guard.
        drop(previous);
        sequence
    }

    /// Handle to the most recently published value, if any.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.inner.lock().value.clone()
    }

    /// Most recent value together with its sequence number.
    pub fn latest_with_sequence(&self) -> Option<(u64, Arc<T>)> {
        let slot = self.inner.lock();
        slot.value.as_ref().map(|v| (slot.sequence, Arc::clone(v)))
    }

    /// Most recent value only if it is newer than `sequence`.
    pub fn latest_after(&self, sequence: u64) -> Option<(u64, Arc<T>)> {
        let slot = self.inner.lock();
        match slot.value.as_ref() {
            Some(v) if slot.sequence > sequence => Some((slot.sequence, Arc::clone(v))),
            _ => None,
        }
    }

    /// Number of values published so far.
    pub fn sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    /// Time since the last publish, or since construction if nothing has
    /// been published yet.
    pub fn age(&self) -> Duration {
        let published_at = self.inner.lock().published_at;
        published_at.elapsed()
    }
}

impl<T: Clone> Latest<T> {
    /// Owned copy of the most recent value.
    pub fn copy_out(&self) -> Option<T> {
        self.latest().map(|v| T::clone(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn empty_slot_has_no_value() {
        let slot: Latest<String> = Latest::new();
        assert!(slot.latest().is_none());
        assert!(slot.latest_with_sequence().is_none());
        assert_eq!(slot.sequence(), 0);
    }

    #[test]
    fn publish_replaces_value_and_bumps_sequence() {
        let slot = Latest::new();
        assert_eq!(slot.publish("a".to_string()), 1);
        assert_eq!(slot.publish("b".to_string()), 2);
        let (seq, value) = slot.latest_with_sequence().unwrap();
        assert_eq!(seq, 2);
        assert_eq!(value.as_str(), "b");
    }

    #[test]
    fn reader_handle_survives_later_publish() {
        let slot = Latest::new();
        slot.publish(vec![1u8, 2, 3]);
        let held = slot.latest().unwrap();
        slot.publish(vec![9u8]);
        // The earlier handle still sees the complete earlier value.
        assert_eq!(*held, vec![1u8, 2, 3]);
        assert_eq!(*slot.latest().unwrap(), vec![9u8]);
    }

    #[test]
    fn latest_after_only_returns_newer_values() {
        let slot = Latest::new();
        assert!(slot.latest_after(0).is_none());
        slot.publish(10);
        assert_eq!(slot.latest_after(0).map(|(s, v)| (s, *v)), Some((1, 10)));
        assert!(slot.latest_after(1).is_none());
        slot.publish(11);
        assert_eq!(slot.latest_after(1).map(|(s, v)| (s, *v)), Some((2, 11)));
    }

    #[test]
    fn age_grows_until_publish_then_resets() {
        let slot = Latest::new();
        thread::sleep(Duration::from_millis(30));
        let before = slot.age();
        assert!(before >= Duration::from_millis(30));
        slot.publish(1);
        assert!(slot.age() < before);
    }

    #[test]
    fn clones_share_the_same_slot() {
        let producer = Latest::new();
        let reader = producer.clone();
        producer.publish(7);
        assert_eq!(reader.copy_out(), Some(7));
    }

    #[test]
    fn concurrent_readers_never_see_torn_values() {
        // Each published vector is uniform; a torn read would mix values.
        let slot = Latest::new();
        slot.publish(vec![0u32; 256]);

        let producer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for i in 1..500u32 {
                    slot.publish(vec![i; 256]);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = slot.clone();
                thread::spawn(move || {
                    let mut last_seq = 0;
                    for _ in 0..500 {
                        let (seq, value) = slot.latest_with_sequence().unwrap();
                        assert!(seq >= last_seq, "sequence went backwards");
                        last_seq = seq;
                        let first = value[0];
                        assert!(value.iter().all(|&v| v == first), "torn read");
                    }
                })
            })
            .collect();

        producer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
