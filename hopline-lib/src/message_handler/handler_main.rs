use super::{
  completion::ProxyState,
  proxy_exception::{ProxyException, RejectReason},
  synthetic_response::{FailureHandler, PlainTextFailureHandler},
  utils_headers::*,
};
use crate::{
  constants::REQUEST_ID_HEADER,
  error::*,
  forwarder::{ConnectWebSocket, ForwardRequest},
  globals::Globals,
  hyper_ext::body::{BoxBody, RequestBody},
  log::*,
  target::{NextHop, TargetResolver},
  tracer::{NoopTracer, ProxyTracer, RequestStart},
};
use derive_builder::Builder;
use http::{header, HeaderMap, HeaderValue, Request, Response, Version};
use std::{net::SocketAddr, sync::Arc};

/// Injected upstream http client
pub type DynForwarder = dyn ForwardRequest<BoxBody, BoxBody, Error = ProxyError>;

#[derive(Clone, Builder)]
/// Request-proxying engine.
/// It resolves the next hop of every inbound request, forwards it with streamed bodies or as a websocket tunnel,
/// and drives each request to exactly one terminal outcome.
pub struct ProxyEngine {
  pub(super) globals: Arc<Globals>,
  pub(super) forwarder: Arc<DynForwarder>,
  pub(super) ws_connector: Arc<dyn ConnectWebSocket>,
  pub(super) resolver: Arc<dyn TargetResolver>,
  #[builder(default = "Arc::new(NoopTracer)")]
  pub(super) tracer: Arc<dyn ProxyTracer>,
  #[builder(default = "Arc::new(PlainTextFailureHandler)")]
  pub(super) failure_handler: Arc<dyn FailureHandler>,
}

/// Per-request facts fixed at request start
pub(super) struct RequestContext {
  pub(super) request_id: String,
  pub(super) version: Version,
  pub(super) tls: bool,
  pub(super) client_host: String,
}

impl RequestContext {
  pub(super) fn is_http2(&self) -> bool {
    self.version == Version::HTTP_2
  }
}

impl ProxyEngine {
  /// Handle an inbound request and return the downstream response.
  /// The response body may still be streaming from the upstream when this returns.
  pub async fn handle_request(
    &self,
    mut req: Request<RequestBody>,
    client_addr: SocketAddr,
    tls_enabled: bool,
  ) -> Response<BoxBody> {
    let request_id = self.assign_request_id(req.headers_mut());
    let ctx = Arc::new(RequestContext {
      request_id,
      version: req.version(),
      tls: tls_enabled,
      client_host: client_host(&client_addr),
    });
    self.tracer.incoming_request_start(&RequestStart {
      request_id: &ctx.request_id,
      method: req.method(),
      uri: req.uri(),
      version: ctx.version,
      scheme: if tls_enabled { "https" } else { "http" },
      client_host: &ctx.client_host,
      headers: req.headers(),
    });
    let state = Arc::new(ProxyState::new(expects_continue(req.headers())));

    // dropped before completion when the downstream goes away while waiting for the upstream head
    let mut pending = PendingResponse {
      engine: self,
      ctx: &ctx,
      state: &state,
      armed: true,
    };
    let res = self.proxy(req, &ctx, &state).await;
    pending.armed = false;
    res
  }

  async fn proxy(&self, mut req: Request<RequestBody>, ctx: &Arc<RequestContext>, state: &Arc<ProxyState>) -> Response<BoxBody> {
    let target = match self.resolver.resolve(&mut req, ctx.tls).await {
      Ok(NextHop::Forward(target)) => target,
      Ok(NextHop::Handled(mut res)) => {
        debug!("[{}] Request handled by the resolver: {}", ctx.request_id, res.status());
        state.guard.complete();
        self.finalize_headers(ctx, res.headers_mut());
        return res;
      }
      Err(failure) => return self.reject(ctx, state, failure),
    };
    self.tracer.next_hop_resolved(&ctx.request_id, &target);

    let Some(orig_host) = original_host(&req, ctx) else {
      return self.reject(ctx, state, ProxyException::new(400, RejectReason::NoHostHeader, None));
    };

    if !ctx.is_http2() && is_websocket_upgrade(req.headers()) {
      return self.tunnel_websocket(req, ctx, state, &target, &orig_host).await;
    }
    self.forward_http(req, ctx, state, target, &orig_host).await
  }

  /// Use the request id given by a proxy in front, or assign a new one
  fn assign_request_id(&self, headers: &mut HeaderMap) -> String {
    if let Some(id) = headers
      .get(REQUEST_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .filter(|v| !v.is_empty())
    {
      return id.to_string();
    }
    let id = self.globals.request_id.next_id();
    headers.insert(REQUEST_ID_HEADER, HeaderValue::from(id));
    id.to_string()
  }

  /// `keep-alive` advertisement for http/1 downstream connections
  pub(super) fn keep_alive_value(&self) -> HeaderValue {
    HeaderValue::from_str(&self.globals.proxy_config.keep_alive_value())
      .unwrap_or_else(|_| HeaderValue::from_static("timeout=0"))
  }

  /// Adds the request id and, for http/1 without an explicit decision, keep-alive headers
  pub(super) fn finalize_headers(&self, ctx: &RequestContext, headers: &mut HeaderMap) {
    insert_request_id(ctx, headers);
    if !ctx.is_http2() && !headers.contains_key(header::CONNECTION) {
      apply_keep_alive_headers(headers, &self.keep_alive_value());
    }
  }

  /// Terminates the request with a failure before any response head went out.
  /// If another party already recorded a failure, that one is answered instead.
  pub(super) fn reject(&self, ctx: &RequestContext, state: &ProxyState, failure: ProxyException) -> Response<BoxBody> {
    let recorded = if state.guard.fail(failure.clone()) {
      None
    } else {
      state.guard.failure()
    };
    self.respond_failure(ctx, recorded.unwrap_or(&failure))
  }

  /// Answers a failure already recorded in the guard, before any response head went out
  pub(super) fn respond_failure(&self, ctx: &RequestContext, failure: &ProxyException) -> Response<BoxBody> {
    warn!("[{}] Request failed: {}", ctx.request_id, failure);
    let mut res = self.failure_handler.respond(failure);
    self.finalize_headers(ctx, res.headers_mut());
    self.tracer.outgoing_response_headers_end(&ctx.request_id, res.status(), res.headers());
    res
  }
}

/// Echo the request id downstream unless the response already carries one
pub(super) fn insert_request_id(ctx: &RequestContext, headers: &mut HeaderMap) {
  if headers.contains_key(REQUEST_ID_HEADER) {
    return;
  }
  if let Ok(id) = HeaderValue::from_str(&ctx.request_id) {
    headers.insert(REQUEST_ID_HEADER, id);
  }
}

/// Host as seen by the client: `:authority` for http/2, `Host` otherwise, each falling back to the other
fn original_host<B>(req: &Request<B>, ctx: &RequestContext) -> Option<String> {
  let authority = req.uri().authority().map(|a| a.as_str()).filter(|h| !h.is_empty());
  let host = req
    .headers()
    .get(header::HOST)
    .and_then(|v| v.to_str().ok())
    .filter(|h| !h.is_empty());
  let (primary, secondary) = if ctx.is_http2() { (authority, host) } else { (host, authority) };
  primary.or(secondary).map(str::to_string)
}

/// Reports a lost downstream if dropped while still armed
struct PendingResponse<'a> {
  engine: &'a ProxyEngine,
  ctx: &'a RequestContext,
  state: &'a ProxyState,
  armed: bool,
}

impl Drop for PendingResponse<'_> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let request_id = &self.ctx.request_id;
    self.engine.tracer.incoming_connection_prematurely_closed(request_id);
    self.state.guard.fail(ProxyException::new(
      0,
      RejectReason::OutgoingResponseFail,
      Some(ProxyError::DownstreamClosed),
    ));
    if let Some(failure) = self.state.guard.failure() {
      debug!("[{}] Downstream gone before the response head: {}", request_id, failure);
      self.engine.tracer.outgoing_response_exception(request_id, failure);
      self.engine.failure_handler.abort(failure);
    }
  }
}
