use crate::error::ProxyError;
use std::{fmt, sync::Arc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Classification of why a request could not be completed
pub enum RejectReason {
  /// transport error while reading the downstream request
  IncomingRequestFail,
  /// error while sending the request to the upstream
  OutgoingRequestFail,
  /// error while reading the upstream response
  IncomingResponseFail,
  /// error or premature close while writing to the downstream
  OutgoingResponseFail,
  /// request without a resolvable host
  NoHostHeader,
}

impl RejectReason {
  pub fn as_str(&self) -> &'static str {
    match self {
      RejectReason::IncomingRequestFail => "incomingRequestFail",
      RejectReason::OutgoingRequestFail => "outgoingRequestFail",
      RejectReason::IncomingResponseFail => "incomingResponseFail",
      RejectReason::OutgoingResponseFail => "outgoingResponseFail",
      RejectReason::NoHostHeader => "noHostHeader",
    }
  }
}

impl fmt::Display for RejectReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Error)]
#[error("{reason} (status {status_code})")]
/// Classified failure of a single request, handed to the failure handler exactly once.
/// A status code of `0` means the downstream connection is already gone.
pub struct ProxyException {
  status_code: u16,
  reason: RejectReason,
  #[source]
  cause: Option<Arc<ProxyError>>,
}

impl ProxyException {
  pub fn new(status_code: u16, reason: RejectReason, cause: Option<ProxyError>) -> Self {
    Self {
      status_code,
      reason,
      cause: cause.map(Arc::new),
    }
  }

  pub fn status_code(&self) -> u16 {
    self.status_code
  }

  pub fn reason(&self) -> RejectReason {
    self.reason
  }

  pub fn cause(&self) -> Option<&ProxyError> {
    self.cause.as_deref()
  }
}
