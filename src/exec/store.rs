//! The shared work queue workers pop [`Context`]s from, and fork new ones
//! back onto. A mutex-and-condvar queue with a shutdown flag, the same
//! shape the reference implementation's context store uses to let
//! `Executor::interrupt` wake every blocked worker at once.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use log::trace;

use super::context::Context;

struct Inner {
    queue: VecDeque<Context>,
    shutdown: bool,
}

/// A bounded, thread-safe queue of pending execution contexts.
pub struct ContextStore {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    max_queued: usize,
}

impl ContextStore {
    pub fn new(max_queued: usize) -> Self {
        ContextStore {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            max_queued,
        }
    }

    /// Push a context onto the queue, waking one waiting worker. Contexts
    /// pushed past `max_queued` are still accepted — the cap is advisory,
    /// logged so an operator can see a producer is outpacing its workers,
    /// not enforced with backpressure (the reference implementation has no
    /// bounded-channel blocking producer either).
    pub fn push(&self, ctx: Context) {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue.len() >= self.max_queued {
            trace!(
                "context store: queue depth {} exceeds configured max {}",
                inner.queue.len() + 1,
                self.max_queued
            );
        }
        inner.queue.push_back(ctx);
        drop(inner);
        self.not_empty.notify_one();
    }

    /// Pop the next context, blocking until one is available or the store
    /// is shut down (in which case this returns `None`).
    pub fn pop(&self) -> Option<Context> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(ctx) = inner.queue.pop_front() {
                trace!("context store: popped context {}", ctx.id());
                return Some(ctx);
            }
            if inner.shutdown {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Wake every blocked `pop` with `None` and stop accepting further
    /// work. Already-queued contexts are dropped.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shutdown = true;
        inner.queue.clear();
        drop(inner);
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_returns_none_after_shutdown_with_empty_queue() {
        let store = ContextStore::new(8);
        store.shutdown();
        assert!(store.pop().is_none());
    }

    #[test]
    fn push_then_pop_round_trips() {
        let store = ContextStore::new(8);
        store.push(Context::new(1));
        let ctx = store.pop().unwrap();
        assert_eq!(ctx.id(), 1);
    }

    #[test]
    fn shutdown_drains_pending_work() {
        let store = ContextStore::new(8);
        store.push(Context::new(1));
        store.push(Context::new(2));
        store.shutdown();
        assert!(store.pop().is_none());
    }
}
