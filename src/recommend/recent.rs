use std::collections::{HashSet, VecDeque};

/// Ids recommended lately, bounded; the oldest insertion leaves first.
/// Inserting an id that is already present moves it to the newest position.
#[derive(Clone, Debug)]
pub struct RecentIds {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl Default for RecentIds {
    fn default() -> Self {
        Self::new(50)
    }
}

impl RecentIds {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn insert(&mut self, id: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.members.contains(id) {
            self.order.retain(|existing| existing != id);
        } else {
            self.members.insert(id.to_string());
        }
        self.order.push_back(id.to_string());

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
                log::debug!("Track {} is eligible again", evicted);
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut recent = RecentIds::new(2);
        recent.insert("a");
        recent.insert("b");
        recent.insert("c");
        assert!(!recent.contains("a"));
        assert!(recent.contains("b") && recent.contains("c"));
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn reinsert_refreshes_position() {
        let mut recent = RecentIds::new(2);
        recent.insert("a");
        recent.insert("b");
        recent.insert("a");
        recent.insert("c");
        assert!(recent.contains("a"));
        assert!(!recent.contains("b"));
        assert_eq!(recent.iter().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut recent = RecentIds::new(0);
        recent.insert("a");
        assert!(recent.is_empty());
        assert!(!recent.contains("a"));
    }
}
