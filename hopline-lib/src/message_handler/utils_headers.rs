use crate::error::*;
use http::{header, HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;

/// Hop header names which are never copied end to end.
/// Pseudo headers cannot be held in a `HeaderMap`, removing them is a no-op kept for completeness.
const HOP_BY_HOP_HEADERS: &[&str] = &[
  "connection",
  "keep-alive",
  "proxy-authenticate",
  "proxy-authorization",
  "te",
  "trailer",
  "transfer-encoding",
  "upgrade",
  "upgrade-insecure-requests",
  ":method",
  ":path",
  ":scheme",
  ":authority",
];

const X_HOST: HeaderName = HeaderName::from_static("x-host");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Lowercased header names announced in `Connection` values
fn connection_listed_names(headers: &HeaderMap) -> Vec<String> {
  headers
    .get_all(header::CONNECTION)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(','))
    .map(|name| name.trim().to_ascii_lowercase())
    .filter(|name| !name.is_empty())
    .collect()
}

/// Remove hop-by-hop headers in place, including those announced in `Connection`
pub fn remove_hop_by_hop_headers(headers: &mut HeaderMap) {
  for name in connection_listed_names(headers) {
    headers.remove(name.as_str());
  }
  HOP_BY_HOP_HEADERS.iter().for_each(|name| {
    headers.remove(*name);
  });
}

/// Copy every header of `from` into `to`, then drop hop-by-hop ones and those listed in the `Connection` of `from`
pub fn copy_end_to_end_headers(from: &HeaderMap, to: &mut HeaderMap) {
  for (name, value) in from.iter() {
    to.append(name.clone(), value.clone());
  }
  for name in connection_listed_names(from) {
    to.remove(name.as_str());
  }
  HOP_BY_HOP_HEADERS.iter().for_each(|name| {
    to.remove(*name);
  });
}

/// Copy end-to-end request headers and set forwarding headers for the upstream
pub fn propagate_request_headers(
  is_tls: bool,
  client_host: &str,
  from: &HeaderMap,
  orig_host: &str,
  to: &mut HeaderMap,
) -> ProxyResult<()> {
  copy_end_to_end_headers(from, to);
  to.insert(X_HOST, HeaderValue::from_str(orig_host)?);
  to.insert(X_FORWARDED_FOR, HeaderValue::from_str(client_host)?);
  to.insert(
    X_FORWARDED_PROTO,
    HeaderValue::from_static(if is_tls { "https" } else { "http" }),
  );
  Ok(())
}

/// Set `Host` to the given override, or remove it to leave it to the transport
pub(crate) fn override_host_header(headers: &mut HeaderMap, host_header: Option<&str>) -> ProxyResult<()> {
  match host_header {
    Some(host) => {
      headers.insert(header::HOST, HeaderValue::from_str(host)?);
    }
    None => {
      headers.remove(header::HOST);
    }
  }
  Ok(())
}

/// Overwrite `connection` and `keep-alive` to keep the downstream connection open
pub(crate) fn apply_keep_alive_headers(headers: &mut HeaderMap, keep_alive: &HeaderValue) {
  headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
  headers.insert(HeaderName::from_static("keep-alive"), keep_alive.clone());
}

/// Mark the downstream connection to be closed after the response
pub(crate) fn apply_connection_close(headers: &mut HeaderMap) {
  headers.remove("keep-alive");
  headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
}

/// Check if the message asks to close its connection
pub(crate) fn requests_close(headers: &HeaderMap) -> bool {
  connection_listed_names(headers).iter().any(|name| name == "close")
}

/// Check if the request asks to switch to websocket
pub(crate) fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
  headers
    .get(header::UPGRADE)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// Check for `Expect: 100-continue`
pub(crate) fn expects_continue(headers: &HeaderMap) -> bool {
  headers
    .get(header::EXPECT)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
}

/// Check if chunked is the final transfer coding
pub(crate) fn is_chunked(headers: &HeaderMap) -> bool {
  headers
    .get_all(header::TRANSFER_ENCODING)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(','))
    .last()
    .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Client address as sent in `x-forwarded-for`, with ipv4-mapped ipv6 addresses unwrapped
pub(crate) fn client_host(client_addr: &SocketAddr) -> String {
  client_addr.ip().to_canonical().to_string()
}
