use std::collections::VecDeque;

use shared::domain::Message;

/// Append-only message log that keeps at most `capacity` entries, evicting
/// the oldest first.
#[derive(Debug, Clone)]
pub struct BoundedLog {
    capacity: usize,
    entries: VecDeque<Message>,
}

impl BoundedLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    /// Rebuilds a log from stored messages, keeping only the newest
    /// `capacity` of them.
    pub fn from_messages(capacity: usize, messages: Vec<Message>) -> Self {
        let mut log = Self::new(capacity);
        let skip = messages.len().saturating_sub(log.capacity);
        log.entries.extend(messages.into_iter().skip(skip));
        log
    }

    /// Returns the evicted message, if the append pushed one out.
    pub fn append(&mut self, message: Message) -> Option<Message> {
        self.entries.push_back(message);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// The newest `n` messages, oldest first.
    pub fn tail(&self, n: usize) -> Vec<Message> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
