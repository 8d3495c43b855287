use super::{
  completion::ProxyState,
  handler_main::{insert_request_id, ProxyEngine, RequestContext},
  proxy_exception::{ProxyException, RejectReason},
  utils_headers::*,
};
use crate::{
  error::*,
  hyper_ext::{
    body::{empty, full, BodyLength, BoxBody, InboundBody, PipeBody, PipeSender, RequestBody},
    Pump, PumpError,
  },
  log::*,
  target::Target,
};
use http::{header, request, HeaderMap, HeaderValue, Request, Response, Version};
use http_body_util::BodyExt;
use hyper::{body::Body, ext::ReasonPhrase};
use std::sync::Arc;
use tokio::time::timeout;

impl ProxyEngine {
  /// Forward a plain http request and relay the upstream response
  pub(super) async fn forward_http(
    &self,
    req: Request<RequestBody>,
    ctx: &Arc<RequestContext>,
    state: &Arc<ProxyState>,
    target: Target,
    orig_host: &str,
  ) -> Response<BoxBody> {
    let request_id = &ctx.request_id;
    let (inbound, body) = req.into_parts();

    let mut outbound = match build_outbound_head(&inbound, ctx, &target, orig_host) {
      Ok(head) => head,
      Err(e) => {
        self.tracer.outgoing_request_exception(request_id, &e);
        let failure = ProxyException::new(502, RejectReason::OutgoingRequestFail, Some(e));
        return self.reject(ctx, state, failure);
      }
    };

    let body = match body.into_inbound() {
      InboundBody::Complete(bytes) => {
        state.mark_request_body_complete();
        if !bytes.is_empty() && !is_chunked(&inbound.headers) {
          outbound
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        }
        self.tracer.incoming_request_end(request_id, bytes.len() as u64);
        full(bytes)
      }
      InboundBody::Streaming(source) => {
        let (sender, pipe) = PipeBody::channel(BodyLength::from_headers(&inbound.headers));
        self.spawn_request_pump(ctx, state, source, sender);
        pipe.boxed_unsync()
      }
    };
    // hyper writes the head as soon as the request is polled, ahead of any body bytes
    self
      .tracer
      .outgoing_request_initial(request_id, &outbound.method, &outbound.uri, &outbound.headers);
    let outbound = Request::from_parts(outbound, body);

    let receive_timeout = self.globals.proxy_config.upstream_receive_timeout;
    let response = tokio::select! {
      biased;
      // the request side failed while waiting, its recorded failure is answered
      failure = state.guard.failed() => return self.respond_failure(ctx, failure),
      res = timeout(receive_timeout, self.forwarder.request(outbound)) => res,
    };
    let res = match response {
      Ok(Ok(res)) => res,
      Ok(Err(e)) => {
        self.tracer.outgoing_request_exception(request_id, &e);
        let failure = ProxyException::new(502, RejectReason::OutgoingRequestFail, Some(e));
        return self.reject(ctx, state, failure);
      }
      Err(_) => {
        let e = ProxyError::UpstreamReceiveTimeout(receive_timeout);
        self.tracer.outgoing_request_exception(request_id, &e);
        let failure = ProxyException::new(502, RejectReason::OutgoingRequestFail, Some(e));
        return self.reject(ctx, state, failure);
      }
    };
    self.relay_response(res, ctx, state)
  }

  /// Build the downstream response head from the upstream one and start relaying its body
  fn relay_response(&self, res: Response<BoxBody>, ctx: &Arc<RequestContext>, state: &Arc<ProxyState>) -> Response<BoxBody> {
    let request_id = &ctx.request_id;
    if let Some(failure) = state.guard.failure() {
      return self.respond_failure(ctx, failure);
    }

    let (upstream, body) = res.into_parts();
    self
      .tracer
      .incoming_response_start(request_id, upstream.status, &upstream.headers);
    self.tracer.outgoing_response_initial(request_id);

    let mut headers = HeaderMap::new();
    copy_end_to_end_headers(&upstream.headers, &mut headers);
    if !ctx.is_http2() && !requests_close(&upstream.headers) {
      apply_keep_alive_headers(&mut headers, &self.keep_alive_value());
    }
    // hyper consumes interim responses, so any response here is final
    if state.expecting_100() {
      self.handle_early_response(ctx, state, &mut headers);
    }
    insert_request_id(ctx, &mut headers);

    let body = if body.is_end_stream() {
      self.tracer.incoming_response_end(request_id, 0);
      if state.guard.complete() {
        self.tracer.outgoing_response_body_end(request_id);
      }
      empty()
    } else {
      let (sender, pipe) = PipeBody::channel(BodyLength::from_headers(&upstream.headers));
      self.spawn_response_relay(ctx, state, body, sender);
      pipe.boxed_unsync()
    };

    let mut res = Response::new(body);
    *res.status_mut() = upstream.status;
    *res.headers_mut() = headers;
    if let Some(reason) = upstream.extensions.get::<ReasonPhrase>() {
      res.extensions_mut().insert(reason.clone());
    }
    self
      .tracer
      .outgoing_response_headers_end(request_id, res.status(), res.headers());
    res
  }

  /// An upstream answering `Expect: 100-continue` before the whole body arrived leaves the
  /// downstream message boundary unknown, so that connection is closed after the response.
  fn handle_early_response(&self, ctx: &RequestContext, state: &ProxyState, headers: &mut HeaderMap) {
    let request_id = &ctx.request_id;
    let body_complete = state.request_body_complete();
    let body_started = state.note_early_response();
    self
      .tracer
      .early_response_to_expect_continue(request_id, body_complete);
    if body_complete {
      debug!("[{}] Final response to expect-continue after the request body", request_id);
      return;
    }
    warn!(
      "[{}] Upstream responded before the request body completed (body started: {}), closing downstream connection",
      request_id, body_started
    );
    if !ctx.is_http2() {
      apply_connection_close(headers);
    }
  }

  fn spawn_request_pump(&self, ctx: &Arc<RequestContext>, state: &Arc<ProxyState>, source: BoxBody, mut sink: PipeSender) {
    let tracer = self.tracer.clone();
    let ctx = ctx.clone();
    let state = state.clone();
    self.globals.runtime_handle.spawn(async move {
      let request_id = &ctx.request_id;
      let pump = Pump::new(None).with_progress(state.request_bytes());
      let result = tokio::select! {
        biased;
        _ = state.guard.failed() => None,
        res = pump.run(source, &mut sink) => Some(res),
      };
      match result {
        Some(Ok(bytes)) => {
          state.mark_request_body_complete();
          tracer.incoming_request_end(request_id, bytes);
        }
        Some(Err(PumpError::SinkClosed)) => {
          // upstream stopped reading, its response decides the outcome
          debug!("[{}] Upstream stopped reading the request body", request_id);
        }
        Some(Err(e)) => {
          let error = ProxyError::from(e);
          tracer.incoming_request_exception(request_id, &error);
          sink.abort();
          state.guard.fail(ProxyException::new(
            500,
            RejectReason::IncomingRequestFail,
            Some(error),
          ));
        }
        None => sink.abort(),
      }
    });
  }

  /// Pump the upstream body downstream. This task owns the outcome once the head is returned.
  fn spawn_response_relay(
    &self,
    ctx: &Arc<RequestContext>,
    state: &Arc<ProxyState>,
    source: BoxBody,
    mut sink: PipeSender,
  ) {
    let engine = self.clone();
    let ctx = ctx.clone();
    let state = state.clone();
    let idle_timeout = self.globals.proxy_config.upstream_receive_timeout;
    self.globals.runtime_handle.spawn(async move {
      let request_id = &ctx.request_id;
      let pump = Pump::new(Some(idle_timeout));
      // the upstream body is dropped with the pump, which closes the upstream connection if unfinished
      let result = tokio::select! {
        biased;
        _ = state.guard.failed() => None,
        res = pump.run(source, &mut sink) => Some(res),
      };
      let failure = match result {
        Some(Ok(bytes)) => {
          engine.tracer.incoming_response_end(request_id, bytes);
          if state.guard.complete() {
            engine.tracer.outgoing_response_body_end(request_id);
            return;
          }
          None
        }
        Some(Err(PumpError::SinkClosed)) => {
          engine.tracer.incoming_connection_prematurely_closed(request_id);
          Some(ProxyException::new(
            0,
            RejectReason::OutgoingResponseFail,
            Some(ProxyError::DownstreamClosed),
          ))
        }
        Some(Err(e)) => {
          let error = ProxyError::from(e);
          engine.tracer.incoming_response_exception(request_id, &error);
          Some(ProxyException::new(502, RejectReason::IncomingResponseFail, Some(error)))
        }
        None => None,
      };
      if let Some(failure) = failure {
        state.guard.fail(failure);
      }
      sink.abort();
      if let Some(failure) = state.guard.failure() {
        warn!("[{}] Response relay failed: {}", request_id, failure);
        engine.tracer.outgoing_response_exception(request_id, failure);
        engine.failure_handler.abort(failure);
      }
    });
  }
}

/// Outbound request head: forwarding headers, `Host` per target, always http/1.1 to the upstream
fn build_outbound_head(
  inbound: &request::Parts,
  ctx: &RequestContext,
  target: &Target,
  orig_host: &str,
) -> ProxyResult<request::Parts> {
  let mut headers = HeaderMap::new();
  propagate_request_headers(ctx.tls, &ctx.client_host, &inbound.headers, orig_host, &mut headers)?;
  override_host_header(&mut headers, target.host_header())?;

  let (mut head, _) = Request::new(()).into_parts();
  head.method = inbound.method.clone();
  head.uri = target.absolute_uri("http")?;
  head.version = Version::HTTP_11;
  head.headers = headers;
  Ok(head)
}
