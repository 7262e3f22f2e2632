//! Bounded ring buffer used for task history and the discovery list.
//! Oldest entries are dropped once the cap is reached.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    items: VecDeque<T>,
    max_len: usize,
}

impl<T> BoundedLog<T> {
    pub fn new(max_len: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_len,
        }
    }

    /// Append an entry, dropping the oldest ones past the cap.
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
        self.truncate();
    }

    /// Replace the whole content (keeps the newest `max_len` entries).
    pub fn replace(&mut self, items: Vec<T>) {
        self.items = items.into();
        self.truncate();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn truncate(&mut self) {
        while self.items.len() > self.max_len {
            self.items.pop_front();
        }
    }
}

impl<T: Clone> BoundedLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// The newest `limit` entries, oldest first.
    pub fn latest(&self, limit: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(limit);
        self.items.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest() {
        let mut log = BoundedLog::new(3);
        for i in 1..=5 {
            log.push(i);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn test_replace_truncates() {
        let mut log = BoundedLog::new(2);
        log.replace(vec![1, 2, 3, 4]);
        assert_eq!(log.to_vec(), vec![3, 4]);
    }

    #[test]
    fn test_latest() {
        let mut log = BoundedLog::new(10);
        for i in 0..6 {
            log.push(i);
        }
        assert_eq!(log.latest(2), vec![4, 5]);
        assert_eq!(log.latest(100).len(), 6);
    }

    #[test]
    fn test_zero_cap_keeps_nothing() {
        let mut log = BoundedLog::new(0);
        log.push("x");
        assert!(log.is_empty());
    }
}
