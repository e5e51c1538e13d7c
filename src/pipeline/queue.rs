//! Bounded handoff between the worker and client threads.
//!
//! One mutex guards both the buffer and the lifecycle flag, so a `disable`
//! racing a `push` or `pop` is always observed consistently.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::fingerprint::Fingerprint;

/// Returned by `push` once the queue no longer accepts items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing buffered yet; more may arrive.
    Empty,
    /// Nothing buffered and nothing ever will be.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    /// Producer is done; buffered items may still be drained.
    Finished,
    /// Torn down; everything returns immediately.
    Disabled,
}

struct Inner {
    buffer: VecDeque<Fingerprint>,
    lifecycle: Lifecycle,
}

pub struct FingerprintQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl FingerprintQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(capacity),
                lifecycle: Lifecycle::Open,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    // A panicking holder cannot leave `Inner` half-updated, so poison is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue, blocking while the queue is full.
    pub fn push(&self, fingerprint: Fingerprint) -> Result<(), Closed> {
        debug_assert!(fingerprint.is_valid(), "invalid fingerprint reached the queue");

        let mut inner = self
            .not_full
            .wait_while(self.lock(), |inner| {
                inner.lifecycle == Lifecycle::Open && inner.buffer.len() >= self.capacity
            })
            .unwrap_or_else(PoisonError::into_inner);

        if inner.lifecycle != Lifecycle::Open {
            return Err(Closed);
        }
        inner.buffer.push_back(fingerprint);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue, blocking while the queue is empty. `None` means closed and drained.
    pub fn pop(&self) -> Option<Fingerprint> {
        let inner = self
            .not_empty
            .wait_while(self.lock(), |inner| {
                inner.lifecycle == Lifecycle::Open && inner.buffer.is_empty()
            })
            .unwrap_or_else(PoisonError::into_inner);
        self.take(inner)
    }

    pub fn try_pop(&self) -> Result<Fingerprint, TryRecvError> {
        let inner = self.lock();
        let open = inner.lifecycle == Lifecycle::Open;
        match self.take(inner) {
            Some(fingerprint) => Ok(fingerprint),
            None if open => Err(TryRecvError::Empty),
            None => Err(TryRecvError::Closed),
        }
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Result<Fingerprint, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if !inner.buffer.is_empty() || inner.lifecycle != Lifecycle::Open {
                return self.take(inner).ok_or(RecvTimeoutError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RecvTimeoutError::Timeout);
            }
            inner = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn take(&self, mut inner: MutexGuard<'_, Inner>) -> Option<Fingerprint> {
        if inner.lifecycle == Lifecycle::Disabled {
            return None;
        }
        let fingerprint = inner.buffer.pop_front()?;
        drop(inner);
        self.not_full.notify_one();
        Some(fingerprint)
    }

    /// Producer is done. Consumers drain what is buffered, then see `None`.
    pub fn finish(&self) {
        let mut inner = self.lock();
        if inner.lifecycle == Lifecycle::Open {
            inner.lifecycle = Lifecycle::Finished;
        }
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Tear down: discard buffered items and release every waiter. Idempotent.
    pub fn disable(&self) {
        let mut inner = self.lock();
        inner.lifecycle = Lifecycle::Disabled;
        inner.buffer.clear();
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// True until `disable` is called.
    pub fn is_enabled(&self) -> bool {
        self.lock().lifecycle != Lifecycle::Disabled
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
