use super::{
  completion::ProxyState,
  handler_main::{insert_request_id, ProxyEngine, RequestContext},
  proxy_exception::{ProxyException, RejectReason},
  synthetic_response::{empty_response, switching_protocols_response},
  utils_headers::*,
};
use crate::{
  error::*,
  forwarder::WebSocketConnectError,
  hyper_ext::body::{BoxBody, RequestBody},
  log::*,
  target::Target,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
  tungstenite::{self, handshake::derive_accept_key, protocol::Role, Message},
  WebSocketStream,
};

impl ProxyEngine {
  /// Open a websocket to the target, then answer the downstream handshake and relay frames both ways
  pub(super) async fn tunnel_websocket(
    &self,
    mut req: Request<RequestBody>,
    ctx: &Arc<RequestContext>,
    state: &Arc<ProxyState>,
    target: &Target,
    orig_host: &str,
  ) -> Response<BoxBody> {
    let request_id = &ctx.request_id;
    let Some(key) = req.headers().get(header::SEC_WEBSOCKET_KEY).cloned() else {
      let failure = ProxyException::new(400, RejectReason::IncomingRequestFail, Some(ProxyError::NoWebSocketKey));
      return self.reject(ctx, state, failure);
    };

    let mut headers = HeaderMap::new();
    let prepared = propagate_request_headers(ctx.tls, &ctx.client_host, req.headers(), orig_host, &mut headers)
      .and_then(|_| override_host_header(&mut headers, target.host_header()))
      .and_then(|_| target.absolute_uri("ws"));
    let uri = match prepared {
      Ok(uri) => uri,
      Err(e) => {
        self.tracer.outgoing_websocket_exception(request_id, &e);
        return self.websocket_failure(ctx, state, e);
      }
    };
    self.tracer.outgoing_websocket_initial(request_id, &uri, &headers);

    let upstream = match self.ws_connector.connect(target, headers).await {
      Ok(upstream) => upstream,
      Err(WebSocketConnectError::Rejected { status, headers }) => {
        debug!("[{}] Upstream rejected the websocket handshake: {}", request_id, status);
        return self.websocket_rejected(ctx, state, status, &headers);
      }
      Err(WebSocketConnectError::Failed(e)) => {
        self.tracer.outgoing_websocket_exception(request_id, &e);
        return self.websocket_failure(ctx, state, e);
      }
    };

    // from here on the tunnel runs on its own, the handshake answer is the terminal response
    state.guard.complete();
    let upstream_protocol = upstream.protocol.clone();
    let on_upgrade = hyper::upgrade::on(&mut req);
    let tracer = self.tracer.clone();
    let ctx_tunnel = ctx.clone();
    self.globals.runtime_handle.spawn(async move {
      let request_id = &ctx_tunnel.request_id;
      let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
          let e = ProxyError::FailedToUpgradeDownstream(e.to_string());
          warn!("[{}] {}", request_id, e);
          tracer.websocket_exception(request_id, &e);
          return;
        }
      };
      let downstream = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
      tracer.websocket_established(request_id);
      match relay_websockets(downstream, upstream.stream).await {
        Ok(()) => tracer.websocket_closed(request_id),
        Err(e) => {
          debug!("[{}] WebSocket relay ended with error: {}", request_id, e);
          tracer.websocket_exception(request_id, &e);
        }
      }
    });

    let accept_key = derive_accept_key(key.as_bytes());
    let mut res = switching_protocols_response(&accept_key, upstream_protocol);
    insert_request_id(ctx, res.headers_mut());
    self
      .tracer
      .outgoing_response_headers_end(request_id, res.status(), res.headers());
    res
  }

  /// Relay the upstream refusal as a bodiless response
  fn websocket_rejected(&self, ctx: &RequestContext, state: &ProxyState, status: StatusCode, upstream: &HeaderMap) -> Response<BoxBody> {
    state.guard.complete();
    let mut res = empty_response(status);
    let headers = res.headers_mut();
    copy_end_to_end_headers(upstream, headers);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    apply_keep_alive_headers(headers, &self.keep_alive_value());
    insert_request_id(ctx, headers);
    self
      .tracer
      .outgoing_response_headers_end(&ctx.request_id, res.status(), res.headers());
    res
  }

  /// Answer a failed tunnel setup with `502 Bad Gateway`
  fn websocket_failure(&self, ctx: &RequestContext, state: &ProxyState, error: ProxyError) -> Response<BoxBody> {
    warn!("[{}] Failed to open websocket to upstream: {}", ctx.request_id, error);
    state.guard.fail(ProxyException::new(
      502,
      RejectReason::OutgoingRequestFail,
      Some(error),
    ));
    let mut res = empty_response(StatusCode::BAD_GATEWAY);
    let headers = res.headers_mut();
    apply_keep_alive_headers(headers, &self.keep_alive_value());
    insert_request_id(ctx, headers);
    self
      .tracer
      .outgoing_response_headers_end(&ctx.request_id, res.status(), res.headers());
    res
  }
}

/// Relays frames between two websockets until either side closes or fails.
/// Both sinks are closed exactly once when the relay ends.
pub(super) async fn relay_websockets<D, U>(downstream: WebSocketStream<D>, upstream: WebSocketStream<U>) -> ProxyResult<()>
where
  D: AsyncRead + AsyncWrite + Unpin,
  U: AsyncRead + AsyncWrite + Unpin,
{
  let (mut down_tx, mut down_rx) = downstream.split();
  let (mut up_tx, mut up_rx) = upstream.split();

  let result = tokio::select! {
    res = forward_frames(&mut down_rx, &mut up_tx) => res,
    res = forward_frames(&mut up_rx, &mut down_tx) => res,
  };
  // either side may already be gone
  let _ = down_tx.close().await;
  let _ = up_tx.close().await;
  result
}

/// Copies frames verbatim except pongs, stopping after a close frame went through
async fn forward_frames<S, K>(source: &mut S, sink: &mut K) -> ProxyResult<()>
where
  S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
  K: Sink<Message, Error = tungstenite::Error> + Unpin,
{
  while let Some(message) = source.next().await {
    let message = match message {
      Ok(message) => message,
      Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return Ok(()),
      Err(e) => return Err(e.into()),
    };
    // each hop answers pings itself, a relayed pong would be a duplicate
    if message.is_pong() {
      continue;
    }
    let is_close = message.is_close();
    match sink.send(message).await {
      Ok(()) => {}
      Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return Ok(()),
      Err(e) => return Err(e.into()),
    }
    if is_close {
      return Ok(());
    }
  }
  Ok(())
}
