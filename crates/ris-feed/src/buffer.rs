use std::collections::VecDeque;

/// Capacity used when none is configured.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// A fixed-capacity FIFO that evicts its oldest entry when full.
///
/// Besides the retained entries it counts every push and every eviction, so callers can
/// tell how much of the stream they missed.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    capacity: usize,
    entries: VecDeque<T>,
    pushed: u64,
    dropped: u64,
}

impl<T> Default for BoundedBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` entries (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: VecDeque::with_capacity(capacity), pushed: 0, dropped: 0 }
    }

    /// Appends `item`, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.dropped += 1;
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        self.pushed += 1;
        evicted
    }

    /// Maximum number of retained entries.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries pushed since creation.
    pub const fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Entries evicted since creation.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Most recently pushed entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Removes every retained entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Copies the retained entries, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_evict_at_capacity() {
        let mut buf = BoundedBuffer::new(2);
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert_eq!(buf.len(), 2);

        assert_eq!(buf.push(3), Some(1)); // evicts 1
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.to_vec(), vec![2, 3]);
        assert_eq!(buf.latest(), Some(&3));
        assert_eq!(buf.pushed(), 3);
        assert_eq!(buf.dropped(), 1);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut buf = BoundedBuffer::default();
        for i in 0..1_000 {
            buf.push(i);
            assert!(buf.len() <= DEFAULT_BUFFER_CAPACITY);
        }
        assert_eq!(buf.len(), DEFAULT_BUFFER_CAPACITY);
        assert_eq!(buf.iter().next(), Some(&900));
        assert_eq!(buf.dropped(), 900);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buf = BoundedBuffer::new(0);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.to_vec(), vec!["b"]);
    }

    #[test]
    fn clear_keeps_counters() {
        let mut buf = BoundedBuffer::new(4);
        buf.push(1);
        buf.push(2);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.pushed(), 2);
    }
}
