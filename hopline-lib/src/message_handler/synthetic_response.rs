use super::proxy_exception::{ProxyException, RejectReason};
use crate::{
  hyper_ext::body::{empty, full, BoxBody},
  log::*,
};
use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};

const NO_HOST_HEADER_MESSAGE: &str = "Exhausted resources while trying to extract Host header from the request";

/// Receives the single classified failure of a request
pub trait FailureHandler: Send + Sync {
  /// Builds the downstream response when no response head has been sent yet
  fn respond(&self, failure: &ProxyException) -> Response<BoxBody>;

  /// Called once the response head is gone or the downstream connection is lost.
  /// The engine terminates the downstream body afterwards, so only bookkeeping is left here.
  fn abort(&self, failure: &ProxyException) {
    debug!("Request aborted after response head: {}", failure);
  }
}

#[derive(Debug, Clone, Copy, Default)]
/// Answers failures with a short plain text body
pub struct PlainTextFailureHandler;

impl FailureHandler for PlainTextFailureHandler {
  fn respond(&self, failure: &ProxyException) -> Response<BoxBody> {
    // status 0 and other invalid codes are refused here
    let status = StatusCode::from_u16(failure.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    let message = match (failure.reason(), failure.cause()) {
      (RejectReason::NoHostHeader, _) => NO_HOST_HEADER_MESSAGE.to_string(),
      (_, Some(cause)) => cause.to_string(),
      (_, None) => status.canonical_reason().unwrap_or_default().to_string(),
    };
    plain_text_response(status, message)
  }
}

/// build http response with a plain text body
pub(crate) fn plain_text_response(status: StatusCode, message: impl Into<String>) -> Response<BoxBody> {
  let message: String = message.into();
  let mut res = Response::new(full(Bytes::from(message)));
  *res.status_mut() = status;
  res.headers_mut().insert(
    header::CONTENT_TYPE,
    HeaderValue::from_static("text/plain;charset=UTF-8"),
  );
  res
}

/// build `101 Switching Protocols` answering a websocket handshake
pub(crate) fn switching_protocols_response(accept_key: &str, protocol: Option<HeaderValue>) -> Response<BoxBody> {
  let mut res = Response::new(empty());
  *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
  let headers = res.headers_mut();
  headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
  headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
  if let Ok(accept) = HeaderValue::from_str(accept_key) {
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
  }
  if let Some(protocol) = protocol {
    headers.insert(header::SEC_WEBSOCKET_PROTOCOL, protocol);
  }
  res
}

/// build an empty response with the given status
pub(crate) fn empty_response(status: StatusCode) -> Response<BoxBody> {
  let mut res = Response::new(empty());
  *res.status_mut() = status;
  res
    .headers_mut()
    .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
  res
}
