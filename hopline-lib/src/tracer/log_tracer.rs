use super::{ProxyTracer, RequestStart};
use crate::{
  constants::log_event_names, error::ProxyError, log::*, message_handler::ProxyException, target::Target,
};
use http::{HeaderMap, Method, StatusCode, Uri};
use std::fmt::Write;

#[derive(Debug, Clone, Copy)]
/// Direction marker printed in front of each trace line
enum Leg {
  IncomingRequest,
  OutgoingRequest,
  IncomingResponse,
  OutgoingResponse,
  Misc,
}

impl Leg {
  fn graphic(&self) -> &'static str {
    match self {
      Leg::IncomingRequest => ">| ",
      Leg::OutgoingRequest => " |>",
      Leg::IncomingResponse => " |<",
      Leg::OutgoingResponse => "<| ",
      Leg::Misc => "   ",
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
/// Tracer writing every event to the `hopline::trace` target at trace level
pub struct LoggingTracer;

impl LoggingTracer {
  fn log(&self, leg: Leg, request_id: &str, message: &str) {
    trace!(target: log_event_names::MESSAGE_TRACE, "{} [{}] {}", leg.graphic(), request_id, message);
  }

  fn dump(&self, leg: Leg, request_id: &str, first_line: &str, headers: &HeaderMap) {
    let mut message = first_line.to_string();
    for (name, value) in headers.iter() {
      let _ = write!(message, "\n  {}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
    self.log(leg, request_id, &message);
  }
}

impl ProxyTracer for LoggingTracer {
  fn incoming_request_start(&self, start: &RequestStart<'_>) {
    let first_line = format!(
      "{} {} {:?} ({} from {})",
      start.method, start.uri, start.version, start.scheme, start.client_host
    );
    self.dump(Leg::IncomingRequest, start.request_id, &first_line, start.headers);
  }

  fn incoming_request_end(&self, request_id: &str, bytes: u64) {
    self.log(Leg::IncomingRequest, request_id, &format!("request body end ({bytes} bytes)"));
  }

  fn incoming_request_exception(&self, request_id: &str, error: &ProxyError) {
    self.log(Leg::IncomingRequest, request_id, &format!("request exception: {error}"));
  }

  fn incoming_connection_prematurely_closed(&self, request_id: &str) {
    self.log(Leg::IncomingRequest, request_id, "connection prematurely closed");
  }

  fn next_hop_resolved(&self, request_id: &str, target: &Target) {
    let host_header = target.host_header().unwrap_or("(transport default)");
    let message = format!("next hop {}{} host {}", target.authority(), target.uri(), host_header);
    self.log(Leg::Misc, request_id, &message);
  }

  fn outgoing_request_initial(&self, request_id: &str, method: &Method, uri: &Uri, headers: &HeaderMap) {
    self.dump(Leg::OutgoingRequest, request_id, &format!("{method} {uri}"), headers);
  }

  fn outgoing_request_exception(&self, request_id: &str, error: &ProxyError) {
    self.log(Leg::OutgoingRequest, request_id, &format!("request exception: {error}"));
  }

  fn incoming_response_start(&self, request_id: &str, status: StatusCode, headers: &HeaderMap) {
    self.dump(Leg::IncomingResponse, request_id, &status.to_string(), headers);
  }

  fn incoming_response_end(&self, request_id: &str, bytes: u64) {
    self.log(Leg::IncomingResponse, request_id, &format!("response body end ({bytes} bytes)"));
  }

  fn incoming_response_exception(&self, request_id: &str, error: &ProxyError) {
    self.log(Leg::IncomingResponse, request_id, &format!("response exception: {error}"));
  }

  fn outgoing_response_initial(&self, request_id: &str) {
    self.log(Leg::OutgoingResponse, request_id, "response start");
  }

  fn outgoing_response_headers_end(&self, request_id: &str, status: StatusCode, headers: &HeaderMap) {
    self.dump(Leg::OutgoingResponse, request_id, &status.to_string(), headers);
  }

  fn outgoing_response_body_end(&self, request_id: &str) {
    self.log(Leg::OutgoingResponse, request_id, "response body end");
  }

  fn outgoing_response_exception(&self, request_id: &str, failure: &ProxyException) {
    self.log(Leg::OutgoingResponse, request_id, &format!("response exception: {failure}"));
  }

  fn early_response_to_expect_continue(&self, request_id: &str, request_body_complete: bool) {
    let message = format!("response before 100 Continue, request body complete: {request_body_complete}");
    self.log(Leg::Misc, request_id, &message);
  }

  fn outgoing_websocket_initial(&self, request_id: &str, uri: &Uri, headers: &HeaderMap) {
    self.dump(Leg::OutgoingRequest, request_id, &format!("websocket {uri}"), headers);
  }

  fn outgoing_websocket_exception(&self, request_id: &str, error: &ProxyError) {
    self.log(Leg::OutgoingRequest, request_id, &format!("websocket exception: {error}"));
  }

  fn websocket_established(&self, request_id: &str) {
    self.log(Leg::Misc, request_id, "websocket established");
  }

  fn websocket_closed(&self, request_id: &str) {
    self.log(Leg::Misc, request_id, "websocket closed");
  }

  fn websocket_exception(&self, request_id: &str, error: &ProxyError) {
    self.log(Leg::Misc, request_id, &format!("websocket exception: {error}"));
  }
}
