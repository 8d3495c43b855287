use crate::{
  constants::*,
  count::{RequestCount, RequestIdGenerator},
};
use std::net::SocketAddr;
use tokio::time::Duration;

/// Global object containing proxy configurations and shared object like counters.
/// But note that in Globals, we do not have Mutex and RwLock. It is indeed, the context shared among async tasks.
pub struct Globals {
  /// Configuration parameters for proxy transport and request handlers
  pub proxy_config: ProxyConfig,

  /// Shared context - Counter for serving connections
  pub request_count: RequestCount,

  /// Shared context - Request id generator, lives as long as the process
  pub request_id: RequestIdGenerator,

  /// Shared context - Async task runtime handler
  pub runtime_handle: tokio::runtime::Handle,
}

/// Configuration parameters for proxy transport and request handlers
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ProxyConfig {
  pub listen_sockets: Vec<SocketAddr>, // when instantiate server
  pub tcp_listen_backlog: u32,         // when instantiate server
  pub max_clients: usize,              // when serving requests
  pub max_concurrent_streams: u32,     // when instantiate server
  pub keepalive: bool,                 // when instantiate server

  /// idle timeout of downstream connections, also advertised in `keep-alive`
  pub server_idle_timeout: Duration,
  /// optional upper bound of the whole connection handling
  pub connection_handling_timeout: Option<Duration>,

  pub upstream_connect_timeout: Duration,
  pub upstream_idle_timeout: Duration,
  pub upstream_max_idle_per_host: usize,
  /// receive timeout both for the upstream response head and gaps within its body
  pub upstream_receive_timeout: Duration,

  /// emit message traces at `trace` level
  pub trace_messages: bool,
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      listen_sockets: Vec::new(),
      tcp_listen_backlog: TCP_LISTEN_BACKLOG,
      max_clients: MAX_CLIENTS,
      max_concurrent_streams: MAX_CONCURRENT_STREAMS,
      keepalive: true,

      server_idle_timeout: Duration::from_secs(SERVER_IDLE_TIMEOUT_SEC),
      connection_handling_timeout: None,

      upstream_connect_timeout: Duration::from_secs(UPSTREAM_CONNECT_TIMEOUT_SEC),
      upstream_idle_timeout: Duration::from_secs(UPSTREAM_IDLE_TIMEOUT_SEC),
      upstream_max_idle_per_host: UPSTREAM_MAX_IDLE_PER_HOST,
      upstream_receive_timeout: Duration::from_secs(UPSTREAM_RECEIVE_TIMEOUT_SEC),

      trace_messages: false,
    }
  }
}

impl ProxyConfig {
  /// Value of the `keep-alive` response header, e.g., `timeout=55`
  pub fn keep_alive_value(&self) -> String {
    let secs = self.server_idle_timeout.as_secs().saturating_sub(KEEP_ALIVE_SLACK_SEC);
    format!("timeout={secs}")
  }
}
