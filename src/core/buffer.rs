//! Fixed-capacity rolling sample buffer.

use std::collections::VecDeque;

/// Ring of the most recent samples of one channel.
///
/// Pushing beyond capacity evicts the oldest sample, so the buffer always
/// holds the newest `capacity` samples in arrival order.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl ChannelBuffer {
    /// Create an empty buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one if the buffer is full.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the buffer holds `capacity` samples.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Copy the contents out, oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut buffer = ChannelBuffer::new(256);
        for i in 0..1000 {
            buffer.push(i as f64);
            assert!(buffer.len() <= 256);
        }
        assert!(buffer.is_full());
    }

    #[test]
    fn test_buffer_keeps_most_recent_in_order() {
        let mut buffer = ChannelBuffer::new(4);
        for i in 0..10 {
            buffer.push(i as f64);
        }
        assert_eq!(buffer.to_vec(), vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_buffer_partial_fill() {
        let mut buffer = ChannelBuffer::new(2500);
        buffer.push(1.0);
        buffer.push(2.0);
        assert_eq!(buffer.len(), 2);
        assert!(!buffer.is_full());
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
