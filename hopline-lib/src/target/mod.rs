mod route_table;

use crate::{
  error::*,
  hyper_ext::body::{BoxBody, RequestBody},
  message_handler::ProxyException,
};
use async_trait::async_trait;
use http::{Request, Response, Uri};

pub use route_table::{Route, RouteTable};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Resolved next hop of a request: upstream socket, request uri and `Host` override
pub struct Target {
  socket_host: String,
  socket_port: u16,
  uri: String,
  /// empty means no override, the `Host` header is removed and the transport default applies
  host_header: String,
}

impl Target {
  pub fn new(
    socket_host: impl Into<String>,
    socket_port: u16,
    uri: impl Into<String>,
    host_header: impl Into<String>,
  ) -> Self {
    Self {
      socket_host: socket_host.into(),
      socket_port,
      uri: uri.into(),
      host_header: host_header.into(),
    }
  }

  pub fn socket_host(&self) -> &str {
    &self.socket_host
  }

  pub fn socket_port(&self) -> u16 {
    self.socket_port
  }

  pub fn uri(&self) -> &str {
    &self.uri
  }

  pub fn host_header(&self) -> Option<&str> {
    (!self.host_header.is_empty()).then_some(self.host_header.as_str())
  }

  /// Same destination with `suffix` appended to the uri
  pub fn with_suffix(&self, suffix: &str) -> Self {
    Self {
      uri: format!("{}{}", self.uri, suffix),
      ..self.clone()
    }
  }

  /// `host:port`, bracketing ipv6 literals
  pub(crate) fn authority(&self) -> String {
    if self.socket_host.contains(':') && !self.socket_host.starts_with('[') {
      format!("[{}]:{}", self.socket_host, self.socket_port)
    } else {
      format!("{}:{}", self.socket_host, self.socket_port)
    }
  }

  /// Absolute uri of the target under the given scheme
  pub(crate) fn absolute_uri(&self, scheme: &str) -> ProxyResult<Uri> {
    let path = match self.uri.as_str() {
      "" => "/".to_string(),
      p if p.starts_with('/') => p.to_string(),
      p => format!("/{p}"),
    };
    format!("{scheme}://{}{path}", self.authority())
      .parse::<Uri>()
      .map_err(|e| ProxyError::InvalidTarget(format!("{}: {e}", self.authority())))
  }
}

/// Result of the next hop resolution
pub enum NextHop {
  /// Proxy the request to the target
  Forward(Target),
  /// The resolver answered the request itself, e.g., rejected it
  Handled(Response<BoxBody>),
}

#[async_trait]
/// Selects the next hop of each request. It is invoked exactly once per request.
pub trait TargetResolver: Send + Sync {
  async fn resolve(&self, req: &mut Request<RequestBody>, tls: bool) -> Result<NextHop, ProxyException>;
}
