mod log_tracer;

use crate::{error::ProxyError, message_handler::ProxyException, target::Target};
use http::{HeaderMap, Method, StatusCode, Uri, Version};

pub use log_tracer::LoggingTracer;

#[derive(Debug, Clone, Copy)]
/// Metadata of an inbound request recorded at its start
pub struct RequestStart<'a> {
  pub request_id: &'a str,
  pub method: &'a Method,
  pub uri: &'a Uri,
  pub version: Version,
  pub scheme: &'a str,
  pub client_host: &'a str,
  pub headers: &'a HeaderMap,
}

/// Observer of request lifecycle events.
/// Callbacks return nothing so that an observer cannot steer the proxying itself.
#[allow(unused_variables)]
pub trait ProxyTracer: Send + Sync {
  fn incoming_request_start(&self, start: &RequestStart<'_>) {}
  fn incoming_request_end(&self, request_id: &str, bytes: u64) {}
  fn incoming_request_exception(&self, request_id: &str, error: &ProxyError) {}
  fn incoming_connection_prematurely_closed(&self, request_id: &str) {}
  fn next_hop_resolved(&self, request_id: &str, target: &Target) {}

  fn outgoing_request_initial(&self, request_id: &str, method: &Method, uri: &Uri, headers: &HeaderMap) {}
  fn outgoing_request_exception(&self, request_id: &str, error: &ProxyError) {}

  fn incoming_response_start(&self, request_id: &str, status: StatusCode, headers: &HeaderMap) {}
  fn incoming_response_end(&self, request_id: &str, bytes: u64) {}
  fn incoming_response_exception(&self, request_id: &str, error: &ProxyError) {}

  fn outgoing_response_initial(&self, request_id: &str) {}
  fn outgoing_response_headers_end(&self, request_id: &str, status: StatusCode, headers: &HeaderMap) {}
  fn outgoing_response_body_end(&self, request_id: &str) {}
  fn outgoing_response_exception(&self, request_id: &str, failure: &ProxyException) {}
  fn early_response_to_expect_continue(&self, request_id: &str, request_body_complete: bool) {}

  fn outgoing_websocket_initial(&self, request_id: &str, uri: &Uri, headers: &HeaderMap) {}
  fn outgoing_websocket_exception(&self, request_id: &str, error: &ProxyError) {}
  fn websocket_established(&self, request_id: &str) {}
  fn websocket_closed(&self, request_id: &str) {}
  fn websocket_exception(&self, request_id: &str, error: &ProxyError) {}
}

#[derive(Debug, Clone, Copy, Default)]
/// Tracer ignoring every event
pub struct NoopTracer;

impl ProxyTracer for NoopTracer {}
