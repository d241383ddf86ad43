use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Fixed-capacity, insertion-ordered buffer. Oldest entries are evicted first
/// once `capacity` is reached; iteration runs oldest to newest.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLog<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> BoundedLog<T> {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `item`, returning the evicted entry if the log was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn newest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.entries.get(idx)
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.entries.iter().cloned().collect()
    }
}

impl<T: Serialize> Serialize for BoundedLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_most_recent_in_order() {
        for n in [0usize, 1, 19, 20, 21, 57] {
            let mut log = BoundedLog::new(20);
            for i in 0..n {
                log.push(i);
            }
            assert_eq!(log.len(), n.min(20));
            let expected: Vec<usize> = (n.saturating_sub(20)..n).collect();
            assert_eq!(log.to_vec(), expected, "n = {}", n);
        }
    }

    #[test]
    fn test_push_reports_eviction() {
        let mut log = BoundedLog::new(2);
        assert_eq!(log.push('a'), None);
        assert_eq!(log.push('b'), None);
        assert_eq!(log.push('c'), Some('a'));
        assert_eq!(log.oldest(), Some(&'b'));
        assert_eq!(log.newest(), Some(&'c'));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut log = BoundedLog::new(0);
        log.push(1);
        log.push(2);
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.to_vec(), vec![2]);
    }

    #[test]
    fn test_serializes_as_array() {
        let mut log = BoundedLog::new(3);
        log.push(1u64);
        log.push(2u64);
        assert_eq!(serde_json::to_string(&log).unwrap(), "[1,2]");
    }
}
