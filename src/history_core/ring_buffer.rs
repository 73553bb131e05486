//! Fixed-capacity FIFO buffer backing raw samples and bounded series

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is bumped to one so the buffer can always hold its
    /// latest value.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Build from an ordered sequence, keeping only the newest `capacity` items.
    pub fn from_vec(items: Vec<T>, capacity: usize) -> Self {
        let mut buffer = Self::new(capacity);
        for item in items {
            buffer.push(item);
        }
        buffer
    }

    /// Append, returning the evicted oldest item when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(value);
        evicted
    }

    /// Overwrite the newest item. Returns the previous value, or pushes when
    /// the buffer is empty.
    pub fn replace_last(&mut self, value: T) -> Option<T> {
        match self.items.back_mut() {
            Some(last) => Some(std::mem::replace(last, value)),
            None => {
                self.items.push_back(value);
                None
            }
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;

    #[test]
    fn filling_returns_none() {
        let mut rb = RingBuffer::new(3);
        assert_eq!(rb.push(1), None);
        assert_eq!(rb.push(2), None);
        assert_eq!(rb.push(3), None);
        assert!(rb.is_full());
    }

    #[test]
    fn full_evicts_oldest() {
        let mut rb = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);
        rb.push(3);
        assert_eq!(rb.push(4), Some(1));
        assert_eq!(rb.push(5), Some(2));
        assert_eq!(rb.to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn replace_swaps_latest() {
        let mut rb = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);
        assert_eq!(rb.replace_last(9), Some(2));
        assert_eq!(rb.to_vec(), vec![1, 9]);
    }

    #[test]
    fn replace_on_empty_pushes() {
        let mut rb = RingBuffer::new(2);
        assert_eq!(rb.replace_last(7), None);
        assert_eq!(rb.last(), Some(&7));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut rb = RingBuffer::new(0);
        assert_eq!(rb.capacity(), 1);
        rb.push(1);
        assert_eq!(rb.push(2), Some(1));
        assert_eq!(rb.len(), 1);
    }

    #[test]
    fn from_vec_keeps_newest() {
        let rb = RingBuffer::from_vec(vec![1, 2, 3, 4, 5], 2);
        assert_eq!(rb.to_vec(), vec![4, 5]);
        assert_eq!(rb.first(), Some(&4));
    }
}
