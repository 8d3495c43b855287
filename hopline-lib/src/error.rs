use thiserror::Error;

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// Describes things that can go wrong in the hopline engine
#[derive(Debug, Error)]
pub enum ProxyError {
  // general errors
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  // body plumbing errors
  #[error("Receiver side of the pipe body is closed")]
  PipeBodyClosed,
  #[error("Pipe body write aborted")]
  PipeBodyWriteAborted,
  #[error("Failed to read request body: {0}")]
  FailedToReadRequestBody(String),
  #[error("Failed to read response body: {0}")]
  FailedToReadResponseBody(String),
  #[error("No data received from upstream within {0:?}")]
  UpstreamReceiveTimeout(std::time::Duration),
  #[error("Downstream connection closed before the response completed")]
  DownstreamClosed,

  // forwarder errors
  #[error("Failed to fetch from upstream: {0}")]
  FailedToFetchFromUpstream(String),
  #[error("Invalid upstream target: {0}")]
  InvalidTarget(String),

  // message construction errors
  #[error("Invalid header value: {0}")]
  InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

  // websocket errors
  #[error("No Sec-WebSocket-Key in upgrade request")]
  NoWebSocketKey,
  #[error("Failed to upgrade downstream connection: {0}")]
  FailedToUpgradeDownstream(String),
  #[error("WebSocket error: {0}")]
  WebSocket(String),

  // resolver errors, for resolvers to carry in a `ProxyException`
  #[error("Failed to resolve next hop: {0}")]
  FailedToResolveNextHop(String),

  // builder errors
  #[error("Failed to build proxy engine: {0}")]
  FailedToBuildProxyEngine(#[from] crate::message_handler::ProxyEngineBuilderError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ProxyError {
  fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
    ProxyError::WebSocket(e.to_string())
  }
}
