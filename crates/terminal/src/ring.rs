use std::collections::VecDeque;

/// Bounded buffer of the most recent output chunks, oldest evicted first.
#[derive(Debug, Clone)]
pub struct OutputRing {
    chunks: VecDeque<String>,
    capacity: usize,
}

impl OutputRing {
    /// Create a ring holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chunks: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, chunk: String) {
        if self.chunks.len() == self.capacity {
            self.chunks.pop_front();
        }
        self.chunks.push_back(chunk);
    }

    /// The last `n` chunks in arrival order.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.chunks.len().saturating_sub(n);
        self.chunks.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut ring = OutputRing::new(3);
        for i in 0..5 {
            ring.push(format!("chunk-{i}"));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.recent(10), vec!["chunk-2", "chunk-3", "chunk-4"]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut ring = OutputRing::new(10);
        ring.push("a".into());
        ring.push("b".into());
        ring.push("c".into());
        assert_eq!(ring.recent(2), vec!["b", "c"]);
        assert!(ring.recent(0).is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut ring = OutputRing::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push("a".into());
        ring.push("b".into());
        assert_eq!(ring.recent(5), vec!["b"]);
    }
}
