//! Size-bounded message accumulator for the consumer loop.

use crate::consumer::ConsumedMessage;

/// Messages read since the last flush.
#[derive(Debug)]
pub struct MessageBatch {
    capacity: usize,
    messages: Vec<ConsumedMessage>,
}

impl MessageBatch {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: Vec::with_capacity(capacity),
        }
    }

    /// Appends a message. Returns true once the batch has reached capacity.
    pub fn push(&mut self, message: ConsumedMessage) -> bool {
        self.messages.push(message);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.messages.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Takes the accumulated messages and leaves the batch empty.
    pub fn take(&mut self) -> Vec<ConsumedMessage> {
        std::mem::replace(&mut self.messages, Vec::with_capacity(self.capacity))
    }
}
