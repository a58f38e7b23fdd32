//! Bounded per-session outbound queue.
//!
//! Producers (publishers) never wait: [`Outbox::push`] is synchronous. When
//! the queue is full the oldest droppable event is discarded to make room;
//! non-droppable events (status transitions, chat, notifications) are
//! always kept, even past capacity.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct Outbound {
    pub payload: Arc<str>,
    pub droppable: bool,
}

/// What happened to a pushed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Queued after evicting the oldest droppable item.
    DroppedOldest,
    /// The queue was full of non-droppable items; the new droppable item
    /// was discarded.
    DroppedIncoming,
    Closed,
}

#[derive(Debug, Default)]
struct OutboxState {
    queue: VecDeque<Outbound>,
    closed: bool,
}

#[derive(Debug)]
pub struct Outbox {
    state: Mutex<OutboxState>,
    notify: Notify,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(OutboxState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, OutboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: Outbound) -> Enqueued {
        let outcome = {
            let mut state = self.state();
            if state.closed {
                return Enqueued::Closed;
            }
            if state.queue.len() < self.capacity {
                state.queue.push_back(item);
                Enqueued::Queued
            } else if let Some(pos) = state.queue.iter().position(|o| o.droppable) {
                state.queue.remove(pos);
                state.queue.push_back(item);
                Enqueued::DroppedOldest
            } else if item.droppable {
                return Enqueued::DroppedIncoming;
            } else {
                state.queue.push_back(item);
                Enqueued::Queued
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Wait for the next item. Returns `None` once the outbox is closed.
    ///
    /// Intended for a single consumer (the session's writer task).
    pub async fn next(&self) -> Option<Outbound> {
        loop {
            {
                let mut state = self.state();
                if state.closed {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    return Some(item);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the outbox and discard anything still queued. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.state();
            state.closed = true;
            state.queue.clear();
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
