//! Stream lifecycle state and the flush gate.

use std::collections::VecDeque;

/// Lifecycle of one assembled response. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum StreamState {
    /// Before the head marker has been substituted.
    #[default]
    Shell,
    /// Relaying the synchronous document.
    Content,
    /// Document flushed, delivering deferred units.
    Deferred,
    /// Closed.
    Done,
}

impl StreamState {
    /// Move to `next` if it is strictly later. Returns whether it moved.
    pub fn advance(&mut self, next: StreamState) -> bool {
        if next > *self {
            tracing::trace!(from = ?*self, to = ?next, "Stream state transition");
            *self = next;
            true
        } else {
            false
        }
    }
}

/// Barrier that holds items back until the document is complete.
///
/// Items admitted while closed are queued and released in FIFO order on
/// `open`; nothing is ever dropped.
#[derive(Debug)]
pub struct FlushGate<T> {
    open: bool,
    queued: VecDeque<T>,
}

impl<T> Default for FlushGate<T> {
    fn default() -> Self {
        Self {
            open: false,
            queued: VecDeque::new(),
        }
    }
}

impl<T> FlushGate<T> {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Pass `item` through if open, otherwise queue it.
    pub fn admit(&mut self, item: T) -> Option<T> {
        if self.open {
            Some(item)
        } else {
            self.queued.push_back(item);
            None
        }
    }

    /// Open the gate and take everything that was waiting.
    pub fn open(&mut self) -> Vec<T> {
        self.open = true;
        self.queued.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_monotonic() {
        let mut state = StreamState::default();
        assert!(state.advance(StreamState::Content));
        assert!(state.advance(StreamState::Done));
        assert!(!state.advance(StreamState::Deferred));
        assert!(!state.advance(StreamState::Shell));
        assert_eq!(state, StreamState::Done);
    }

    #[test]
    fn test_gate_queues_fifo_until_open() {
        let mut gate = FlushGate::default();
        assert_eq!(gate.admit(1), None);
        assert_eq!(gate.admit(2), None);
        assert_eq!(gate.queued(), 2);
        assert_eq!(gate.open(), vec![1, 2]);
        assert_eq!(gate.admit(3), Some(3));
        assert!(gate.is_open());
    }
}
