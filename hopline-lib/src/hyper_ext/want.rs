//! Want signal between a pipe body and its sender.
//!
//! The body side publishes a `usize` state and the sender side waits on it.
//! Only a change of value wakes the sender, and `0` is reserved for a dropped body.
// adapted from hyper's internal watch channel

use futures_util::task::AtomicWaker;
use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
  task::Context,
};

pub(super) const CLOSED: usize = 0;

struct Shared {
  state: AtomicUsize,
  waker: AtomicWaker,
}

/// Held by the body, publishes its demand
pub(super) struct Notifier {
  shared: Arc<Shared>,
}

/// Held by the sender, observes the demand
pub(super) struct Watcher {
  shared: Arc<Shared>,
}

pub(super) fn channel(initial: usize) -> (Notifier, Watcher) {
  debug_assert!(initial != CLOSED, "want state 0 is reserved for closed");
  let shared = Arc::new(Shared {
    state: AtomicUsize::new(initial),
    waker: AtomicWaker::new(),
  });
  (
    Notifier {
      shared: shared.clone(),
    },
    Watcher { shared },
  )
}

impl Notifier {
  pub(super) fn set(&mut self, state: usize) {
    if self.shared.state.swap(state, Ordering::SeqCst) != state {
      self.shared.waker.wake();
    }
  }
}

impl Drop for Notifier {
  fn drop(&mut self) {
    self.set(CLOSED);
  }
}

impl Watcher {
  /// Registers the current task for wake-up and returns the latest state
  pub(super) fn load(&mut self, cx: &mut Context<'_>) -> usize {
    self.shared.waker.register(cx.waker());
    self.shared.state.load(Ordering::SeqCst)
  }
}
