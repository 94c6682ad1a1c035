use std::collections::VecDeque;

/// Bounded FIFO between the native callback thread and the processing thread.
///
/// Wrap in `Arc<parking_lot::Mutex<RingBuffer<T>>>` for cross-thread access.
///
/// Overflow behavior: drops the oldest items so the consumer always sees the
/// most recent audio.
#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning how many old items were dropped to make room.
    pub fn push(&mut self, item: T) -> usize {
        let mut dropped = 0;
        while self.items.len() >= self.capacity {
            self.items.pop_front();
            dropped += 1;
        }
        self.items.push_back(item);
        dropped
    }

    /// Remove and return up to `max` items in arrival order.
    pub fn drain(&mut self, max: usize) -> Vec<T> {
        let count = max.min(self.items.len());
        self.items.drain(..count).collect()
    }

    /// Remove and return everything currently buffered.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain_in_order() {
        let mut buf = RingBuffer::new(10);
        for i in 1..=3 {
            assert_eq!(buf.push(i), 0);
        }

        assert_eq!(buf.len(), 3);
        assert_eq!(buf.drain(3), vec![1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_partial() {
        let mut buf = RingBuffer::new(10);
        for i in 1..=5 {
            buf.push(i);
        }

        assert_eq!(buf.drain(3), vec![1, 2, 3]);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.drain(10), vec![4, 5]); // more than available
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut buf = RingBuffer::new(4);
        for i in 1..=4 {
            buf.push(i);
        }
        assert_eq!(buf.push(5), 1);
        assert_eq!(buf.push(6), 1);

        assert_eq!(buf.len(), 4);
        assert_eq!(buf.drain_all(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut buf = RingBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push("a");
        assert_eq!(buf.push("b"), 1);
        assert_eq!(buf.drain_all(), vec!["b"]);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buf = RingBuffer::new(10);
        buf.push(1);
        buf.push(2);
        buf.clear();

        assert!(buf.is_empty());
        assert!(buf.drain(10).is_empty());
    }
}
