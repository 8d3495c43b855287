pub const TCP_LISTEN_BACKLOG: u32 = 1024;
pub const MAX_CLIENTS: usize = 512;
pub const MAX_CONCURRENT_STREAMS: u32 = 64;

/// Idle timeout of downstream connections. The advertised keep-alive timeout is shorter by a few seconds.
pub const SERVER_IDLE_TIMEOUT_SEC: u64 = 60;
pub const KEEP_ALIVE_SLACK_SEC: u64 = 5;

pub const UPSTREAM_CONNECT_TIMEOUT_SEC: u64 = 10;
pub const UPSTREAM_IDLE_TIMEOUT_SEC: u64 = 15;
pub const UPSTREAM_MAX_IDLE_PER_HOST: usize = 30;
pub const UPSTREAM_RECEIVE_TIMEOUT_SEC: u64 = 300;

/// Header carrying the request id along a chain of proxies
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging event names
pub mod log_event_names {
  /// message trace
  pub const MESSAGE_TRACE: &str = "hopline::trace";
}
