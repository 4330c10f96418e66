//! Bounded Ring Buffer
//!
//! Fixed-capacity FIFO used as a bounded recent-history store. Enqueueing
//! into a full buffer evicts and returns the oldest element.
//!
//! Not synchronized: share it behind an external lock.

use std::collections::vec_deque::{self, VecDeque};
use std::ops::{Bound, Range, RangeBounds};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffer<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty ring buffer
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            error!("RingBuffer capacity must be greater than 0");
            panic!("RingBuffer capacity must be greater than 0");
        }
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// Append to the back. Returns the evicted oldest element if full.
    pub fn enqueue(&mut self, value: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(value);
        evicted
    }

    /// Remove and return the oldest element
    pub fn dequeue(&mut self) -> Option<T> {
        self.buffer.pop_front()
    }

    /// Oldest element
    pub fn front(&self) -> Option<&T> {
        self.buffer.front()
    }

    /// Newest element
    pub fn back(&self) -> Option<&T> {
        self.buffer.back()
    }

    /// Element at `index`, counting from the oldest
    pub fn get(&self, index: usize) -> Option<&T> {
        self.buffer.get(index)
    }

    /// Remove the element at `index`, counting from the oldest.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn erase(&mut self, index: usize) -> T {
        match self.buffer.remove(index) {
            Some(value) => value,
            None => {
                error!(index, len = self.buffer.len(), "RingBuffer erase position out of range");
                panic!(
                    "RingBuffer erase position {index} out of range (len {})",
                    self.buffer.len()
                );
            }
        }
    }

    /// Remove a contiguous range of elements, returned oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the range is inverted or extends past the end.
    pub fn erase_range<R>(&mut self, range: R) -> Vec<T>
    where
        R: RangeBounds<usize>,
    {
        let range = self.checked_range(range);
        self.buffer.drain(range).collect()
    }

    /// Keep only the elements matching `keep`, preserving order
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.buffer.retain(keep);
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.buffer.iter()
    }

    pub fn iter_mut(&mut self) -> vec_deque::IterMut<'_, T> {
        self.buffer.iter_mut()
    }

    fn checked_range<R>(&self, range: R) -> Range<usize>
    where
        R: RangeBounds<usize>,
    {
        let len = self.buffer.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => Some(s),
            Bound::Excluded(&s) => s.checked_add(1),
            Bound::Unbounded => Some(0),
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.checked_add(1),
            Bound::Excluded(&e) => Some(e),
            Bound::Unbounded => Some(len),
        };

        match (start, end) {
            (Some(start), Some(end)) if start <= end && end <= len => start..end,
            _ => {
                error!(len, "RingBuffer erase range out of range");
                panic!("RingBuffer erase range out of range (len {len})");
            }
        }
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.buffer.iter()
    }
}

impl<T> IntoIterator for RingBuffer<T> {
    type Item = T;
    type IntoIter = vec_deque::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.buffer.into_iter()
    }
}
