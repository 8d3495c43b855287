use super::proxy_exception::ProxyException;
use std::sync::{
  atomic::{AtomicBool, AtomicU64, Ordering},
  Arc, OnceLock,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
/// Terminal outcome of a request
pub enum Outcome {
  Completed,
  Failed(ProxyException),
}

/// Exactly-once terminal cell of a request.
/// The first of `complete` or `fail` wins, later calls leave the outcome untouched.
#[derive(Debug, Default)]
pub struct CompletionGuard {
  outcome: OnceLock<Outcome>,
  failed: CancellationToken,
}

impl CompletionGuard {
  /// Returns true if this call terminated the request
  pub fn complete(&self) -> bool {
    self.outcome.set(Outcome::Completed).is_ok()
  }

  /// Records the failure, returns true if this call terminated the request
  pub fn fail(&self, failure: ProxyException) -> bool {
    let won = self.outcome.set(Outcome::Failed(failure)).is_ok();
    if won {
      self.failed.cancel();
    }
    won
  }

  pub fn outcome(&self) -> Option<&Outcome> {
    self.outcome.get()
  }

  pub fn failure(&self) -> Option<&ProxyException> {
    match self.outcome.get() {
      Some(Outcome::Failed(failure)) => Some(failure),
      _ => None,
    }
  }

  pub fn is_terminated(&self) -> bool {
    self.outcome.get().is_some()
  }

  /// Resolves to the recorded failure, never on completion
  pub async fn failed(&self) -> &ProxyException {
    self.failed.cancelled().await;
    match self.failure() {
      Some(failure) => failure,
      // cancelled only after a failure was stored
      None => std::future::pending().await,
    }
  }
}

/// Per-request state shared by the tasks serving one request
#[derive(Debug, Default)]
pub(crate) struct ProxyState {
  pub(crate) guard: CompletionGuard,
  expecting_100: bool,
  request_body_complete: AtomicBool,
  received_body_before_continue: AtomicBool,
  request_bytes: Arc<AtomicU64>,
}

impl ProxyState {
  pub(crate) fn new(expecting_100: bool) -> Self {
    Self {
      expecting_100,
      ..Default::default()
    }
  }

  pub(crate) fn expecting_100(&self) -> bool {
    self.expecting_100
  }

  pub(crate) fn mark_request_body_complete(&self) {
    self.request_body_complete.store(true, Ordering::Release);
  }

  pub(crate) fn request_body_complete(&self) -> bool {
    self.request_body_complete.load(Ordering::Acquire)
  }

  /// Counter of request body bytes already handed to the upstream
  pub(crate) fn request_bytes(&self) -> Arc<AtomicU64> {
    self.request_bytes.clone()
  }

  /// Records whether body bytes went out before the upstream answered an `Expect: 100-continue` request
  pub(crate) fn note_early_response(&self) -> bool {
    let received = self.request_bytes.load(Ordering::Acquire) > 0;
    self.received_body_before_continue.store(received, Ordering::Release);
    received
  }
}
