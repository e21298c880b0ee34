//! Common utilities shared by the connection, channel and session engines

use std::{
    future::Future,
    ops::Deref,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use tokio::time::{Instant, Sleep};

/// Whether an engine event loop should keep running or stop after processing an event
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Running {
    Continue,
    Stop,
}

/// An immutable wrapper used for fields that must never be mutated once an actor is constructed,
/// e.g. a session's initial command point.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Constant<T> {
    value: T,
}

impl<T> Constant<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Constant<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// A resettable delay used to drive idle-timeout detection and scheduled flow-control retries.
#[derive(Debug)]
pub(crate) struct ResettableDelay {
    delay: Pin<Box<Sleep>>,
    duration: Duration,
}

impl ResettableDelay {
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            delay: Box::pin(tokio::time::sleep(duration)),
            duration,
        }
    }

    pub(crate) fn reset(&mut self) {
        let next = Instant::now() + self.duration;
        self.delay.as_mut().reset(next);
    }

    pub(crate) fn reset_to(&mut self, duration: Duration) {
        self.duration = duration;
        self.reset();
    }
}

impl Future for ResettableDelay {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.delay.as_mut().poll(cx)
    }
}

/// Returns true if `b` immediately follows `a`, i.e. `b == a + 1`.
pub(crate) fn is_consecutive(a: u32, b: u32) -> bool {
    a.wrapping_add(1) == b
}

/// Splits a sorted, deduplicated slice of ids into the index boundaries of its maximal
/// contiguous runs. Used to coalesce `session.completed` / `session.known-completed` ranges.
pub(crate) fn consecutive_run_ends(ids: &[u32]) -> Vec<usize> {
    let mut ends = Vec::new();
    for (i, pair) in ids.windows(2).enumerate() {
        if !is_consecutive(pair[0], pair[1]) {
            ends.push(i + 1);
        }
    }
    if !ids.is_empty() {
        ends.push(ids.len());
    }
    ends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_run_ends_splits_gaps() {
        let ids = [1u32, 2, 3, 5, 6, 9];
        let ends = consecutive_run_ends(&ids);
        assert_eq!(ends, vec![3, 5, 6]);
    }

    #[test]
    fn consecutive_run_ends_empty() {
        let ids: [u32; 0] = [];
        assert!(consecutive_run_ends(&ids).is_empty());
    }
}
