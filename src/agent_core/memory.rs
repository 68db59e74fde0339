//! ConversationMemory: bounded rolling window of conversation messages.
//!
//! Insertion order is preserved; once the window exceeds its capacity the
//! oldest message is evicted. Memory lives for the process lifetime only.

use std::collections::VecDeque;

use super::types::ConversationMessage;
use crate::inference::types::Role;

/// Default number of retained messages.
pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    messages: VecDeque<ConversationMessage>,
    capacity: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ConversationMemory {
    /// Create a memory holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entries past capacity.
    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push_back(ConversationMessage::new(role, content));
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// The full window, oldest first.
    pub fn history(&self) -> &VecDeque<ConversationMessage> {
        &self.messages
    }

    /// The window as a contiguous slice copy, oldest first.
    pub fn snapshot(&self) -> Vec<ConversationMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(memory: &ConversationMemory) -> Vec<String> {
        memory.history().iter().map(|m| m.content.clone()).collect()
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(ConversationMemory::default().capacity(), 20);
    }

    #[test]
    fn test_window_keeps_most_recent_in_order() {
        for capacity in [1usize, 2, 5, 20] {
            for total in [0usize, 1, capacity, capacity + 1, capacity * 3 + 2] {
                let mut memory = ConversationMemory::new(capacity);
                for i in 0..total {
                    let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                    memory.add(role, format!("m{i}"));
                    assert!(memory.len() <= capacity);
                }

                let expected: Vec<String> =
                    (total.saturating_sub(capacity)..total).map(|i| format!("m{i}")).collect();
                assert_eq!(contents(&memory), expected, "capacity={capacity} total={total}");
            }
        }
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut memory = ConversationMemory::new(0);
        memory.add(Role::User, "a");
        memory.add(Role::User, "b");
        assert_eq!(contents(&memory), vec!["b"]);
    }
}
