use crate::{
  error::{ProxyError, ProxyResult},
  log::*,
  target::Target,
};
use async_trait::async_trait;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use std::time::Duration;
use tokio::{
  io::{AsyncRead, AsyncWrite},
  net::TcpStream,
  time::timeout,
};
use tokio_tungstenite::{
  client_async,
  tungstenite::{self, client::IntoClientRequest},
  WebSocketStream,
};

/// Byte stream a websocket can run over
pub trait WebSocketIo: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T> WebSocketIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Established websocket to the upstream
pub struct UpstreamWebSocket {
  pub stream: WebSocketStream<Box<dyn WebSocketIo>>,
  /// subprotocol selected by the upstream
  pub protocol: Option<HeaderValue>,
}

#[derive(Debug)]
/// Failure to open a websocket to the upstream
pub enum WebSocketConnectError {
  /// The upstream answered the handshake with a regular http response
  Rejected { status: StatusCode, headers: HeaderMap },
  /// Any other failure
  Failed(ProxyError),
}

impl From<ProxyError> for WebSocketConnectError {
  fn from(e: ProxyError) -> Self {
    WebSocketConnectError::Failed(e)
  }
}

#[async_trait]
/// Opens websockets to upstream targets
pub trait ConnectWebSocket: Send + Sync {
  /// `headers` are the end-to-end headers to send along with the handshake, `Host` already settled
  async fn connect(&self, target: &Target, headers: HeaderMap) -> Result<UpstreamWebSocket, WebSocketConnectError>;
}

/// Handshake headers generated by the websocket client itself
const HANDSHAKE_HEADERS: &[header::HeaderName] = &[
  header::CONNECTION,
  header::UPGRADE,
  header::SEC_WEBSOCKET_KEY,
  header::SEC_WEBSOCKET_VERSION,
  header::SEC_WEBSOCKET_EXTENSIONS,
  header::SEC_WEBSOCKET_ACCEPT,
];

/// Plain tcp websocket connector
pub struct TcpWebSocketConnector {
  connect_timeout: Duration,
}

impl TcpWebSocketConnector {
  pub fn new(connect_timeout: Duration) -> Self {
    Self { connect_timeout }
  }
}

#[async_trait]
impl ConnectWebSocket for TcpWebSocketConnector {
  async fn connect(&self, target: &Target, headers: HeaderMap) -> Result<UpstreamWebSocket, WebSocketConnectError> {
    let uri = target.absolute_uri("ws")?;
    let mut request = uri.into_client_request().map_err(ProxyError::from)?;
    // the client filled in `Host` from the uri, an explicit one replaces it
    if headers.contains_key(header::HOST) {
      request.headers_mut().remove(header::HOST);
    }
    for (name, value) in headers.iter() {
      if !HANDSHAKE_HEADERS.contains(name) {
        request.headers_mut().append(name.clone(), value.clone());
      }
    }

    let stream = connect_tcp(target, self.connect_timeout).await?;
    let io: Box<dyn WebSocketIo> = Box::new(stream);
    match client_async(request, io).await {
      Ok((stream, response)) => {
        debug!("WebSocket established to {}", target.authority());
        Ok(UpstreamWebSocket {
          stream,
          protocol: response.headers().get(header::SEC_WEBSOCKET_PROTOCOL).cloned(),
        })
      }
      Err(tungstenite::Error::Http(response)) => Err(WebSocketConnectError::Rejected {
        status: response.status(),
        headers: response.headers().clone(),
      }),
      Err(e) => Err(WebSocketConnectError::Failed(e.into())),
    }
  }
}

async fn connect_tcp(target: &Target, connect_timeout: Duration) -> ProxyResult<TcpStream> {
  let addr = (target.socket_host(), target.socket_port());
  let stream = timeout(connect_timeout, TcpStream::connect(addr))
    .await
    .map_err(|_| ProxyError::WebSocket(format!("connect to {} timed out", target.authority())))??;
  stream.set_nodelay(true)?;
  Ok(stream)
}
