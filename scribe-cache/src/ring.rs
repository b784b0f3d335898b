//! Fixed-capacity circular buffer.

use crate::{CacheError, CacheResult};
use std::collections::VecDeque;

/// A bounded history of the most recent items.
///
/// Pushing beyond capacity overwrites the oldest item; iteration always
/// runs oldest to newest. Capacity is fixed at construction and never zero.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// # Errors
    /// Returns [`CacheError::ZeroCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> CacheResult<Self> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Appends an item, dropping the oldest one once full. O(1).
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// All buffered items, oldest to newest.
    #[must_use]
    pub fn get_all(&self) -> Vec<&T> {
        self.items.iter().collect()
    }

    /// Iterates the buffered items, oldest to newest.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    /// The most recently pushed item, if any.
    #[must_use]
    pub fn peek_newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Removes every buffered item. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The fixed capacity this buffer was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
