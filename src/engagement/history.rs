use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::scorer::EngagementMetrics;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: u64,
    pub metrics: EngagementMetrics,
}

/// Fixed-capacity rolling store of metrics, oldest first. Pushing into a
/// full buffer drops the oldest entry.
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries oldest to newest
    pub fn contents(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> + DoubleEndedIterator + '_ {
        self.entries.iter()
    }

    /// The newest `n` entries (fewer when the buffer is shorter), oldest first
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
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

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(t: u64, physical: u8) -> HistoryEntry {
        HistoryEntry {
            timestamp: t,
            metrics: EngagementMetrics::new(physical, 0, 0, 0),
        }
    }

    #[test]
    fn overflow_drops_oldest_and_keeps_order() {
        let mut history = HistoryBuffer::new(3);
        for t in 0..4 {
            history.push(entry(t, t as u8));
        }
        assert_eq!(history.len(), 3);
        let stamps: Vec<u64> = history.contents().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
        assert_eq!(history.latest().unwrap().timestamp, 3);
    }

    #[test]
    fn default_capacity_is_fifty() {
        let mut history = HistoryBuffer::default();
        for t in 0..51 {
            history.push(entry(t, 10));
        }
        assert_eq!(history.capacity(), 50);
        assert_eq!(history.len(), 50);
        assert!(history.contents().all(|e| e.timestamp != 0));
    }

    #[test]
    fn last_n_clips_to_length() {
        let mut history = HistoryBuffer::new(10);
        history.push(entry(1, 1));
        history.push(entry(2, 2));
        let last: Vec<u64> = history.last_n(5).map(|e| e.timestamp).collect();
        assert_eq!(last, vec![1, 2]);
        let last: Vec<u64> = history.last_n(1).map(|e| e.timestamp).collect();
        assert_eq!(last, vec![2]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut history = HistoryBuffer::new(0);
        history.push(entry(1, 1));
        history.push(entry(2, 2));
        assert_eq!(history.to_vec(), vec![entry(2, 2)]);
    }
}
