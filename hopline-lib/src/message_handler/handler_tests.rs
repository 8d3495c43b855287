use super::{
  handler_websocket::relay_websockets, FailureHandler, PlainTextFailureHandler, ProxyEngine, ProxyEngineBuilder,
  ProxyException, RejectReason,
};
use crate::{
  error::ProxyError,
  forwarder::{ConnectWebSocket, ForwardRequest, UpstreamWebSocket, WebSocketConnectError, WebSocketIo},
  globals::{Globals, ProxyConfig},
  hyper_ext::body::{BoxBody, RequestBody},
  target::{NextHop, Target, TargetResolver},
  tracer::ProxyTracer,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{channel::mpsc, SinkExt, StreamExt};
use http::{request, HeaderMap, Request, Response, StatusCode, Version};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use std::{
  net::SocketAddr,
  sync::{Arc, Mutex},
  time::Duration,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{
  tungstenite::{protocol::Role, Message},
  WebSocketStream,
};

type FrameSender = mpsc::Sender<Result<Frame<Bytes>, ProxyError>>;

fn channel_body() -> (FrameSender, BoxBody) {
  let (tx, rx) = mpsc::channel(1);
  (tx, StreamBody::new(rx).boxed_unsync())
}

fn full_body(data: &'static str) -> BoxBody {
  Full::new(Bytes::from_static(data.as_bytes()))
    .map_err(|never| match never {})
    .boxed_unsync()
}

fn client_addr() -> SocketAddr {
  "10.0.0.1:40000".parse().unwrap()
}

/// Upstream stand-in answering with a prepared response, keeping what it received
#[derive(Default)]
struct MockForwarder {
  response: Mutex<Option<Response<BoxBody>>>,
  received: Mutex<Option<(request::Parts, BoxBody)>>,
}

impl MockForwarder {
  fn answering(res: Response<BoxBody>) -> Arc<Self> {
    Arc::new(Self {
      response: Mutex::new(Some(res)),
      ..Default::default()
    })
  }

  fn head(&self) -> request::Parts {
    let received = self.received.lock().unwrap();
    let (head, _) = received.as_ref().expect("no request reached the upstream");
    head.clone()
  }
}

#[async_trait]
impl ForwardRequest<BoxBody, BoxBody> for MockForwarder {
  type Error = ProxyError;

  async fn request(&self, req: Request<BoxBody>) -> Result<Response<BoxBody>, ProxyError> {
    let (head, body) = req.into_parts();
    self.received.lock().unwrap().replace((head, body));
    let res = self.response.lock().unwrap().take();
    match res {
      Some(res) => Ok(res),
      None => {
        futures::future::pending::<()>().await;
        unreachable!()
      }
    }
  }
}

/// Upstream that cannot be reached
struct FailingForwarder;

#[async_trait]
impl ForwardRequest<BoxBody, BoxBody> for FailingForwarder {
  type Error = ProxyError;

  async fn request(&self, _req: Request<BoxBody>) -> Result<Response<BoxBody>, ProxyError> {
    Err(ProxyError::FailedToFetchFromUpstream("connection refused".to_string()))
  }
}

struct FixedResolver(Target);

#[async_trait]
impl TargetResolver for FixedResolver {
  async fn resolve(&self, _req: &mut Request<RequestBody>, _tls: bool) -> Result<NextHop, ProxyException> {
    Ok(NextHop::Forward(self.0.clone()))
  }
}

#[derive(Default)]
struct MockWebSocketConnector {
  result: Mutex<Option<Result<UpstreamWebSocket, WebSocketConnectError>>>,
  headers: Mutex<Option<HeaderMap>>,
}

#[async_trait]
impl ConnectWebSocket for MockWebSocketConnector {
  async fn connect(&self, _target: &Target, headers: HeaderMap) -> Result<UpstreamWebSocket, WebSocketConnectError> {
    self.headers.lock().unwrap().replace(headers);
    self
      .result
      .lock()
      .unwrap()
      .take()
      .unwrap_or(Err(WebSocketConnectError::Failed(ProxyError::WebSocket("unreachable".to_string()))))
  }
}

#[derive(Default)]
struct RecordingTracer {
  events: Mutex<Vec<String>>,
}

impl RecordingTracer {
  fn record(&self, event: impl Into<String>) {
    self.events.lock().unwrap().push(event.into());
  }

  fn count(&self, event: &str) -> usize {
    self.events.lock().unwrap().iter().filter(|e| e.as_str() == event).count()
  }
}

impl ProxyTracer for RecordingTracer {
  fn incoming_connection_prematurely_closed(&self, _request_id: &str) {
    self.record("prematurely_closed");
  }
  fn outgoing_request_exception(&self, _request_id: &str, _error: &ProxyError) {
    self.record("outgoing_request_exception");
  }
  fn outgoing_response_body_end(&self, _request_id: &str) {
    self.record("outgoing_response_body_end");
  }
  fn outgoing_response_exception(&self, _request_id: &str, _failure: &ProxyException) {
    self.record("outgoing_response_exception");
  }
  fn early_response_to_expect_continue(&self, _request_id: &str, request_body_complete: bool) {
    self.record(format!("early_response:{request_body_complete}"));
  }
  fn outgoing_websocket_initial(&self, _request_id: &str, uri: &http::Uri, _headers: &HeaderMap) {
    self.record(format!("websocket_initial:{uri}"));
  }
}

/// Failure handler reporting every call on channels
struct RecordingFailureHandler {
  responded: UnboundedSender<ProxyException>,
  aborted: UnboundedSender<ProxyException>,
}

struct FailureLog {
  responded: UnboundedReceiver<ProxyException>,
  aborted: UnboundedReceiver<ProxyException>,
}

impl FailureHandler for RecordingFailureHandler {
  fn respond(&self, failure: &ProxyException) -> Response<BoxBody> {
    let _ = self.responded.send(failure.clone());
    PlainTextFailureHandler.respond(failure)
  }

  fn abort(&self, failure: &ProxyException) {
    let _ = self.aborted.send(failure.clone());
  }
}

struct Fixture {
  engine: ProxyEngine,
  tracer: Arc<RecordingTracer>,
  failures: FailureLog,
}

fn fixture(
  forwarder: Arc<dyn ForwardRequest<BoxBody, BoxBody, Error = ProxyError>>,
  ws_connector: Arc<MockWebSocketConnector>,
  config: ProxyConfig,
) -> Fixture {
  let globals = Arc::new(Globals {
    proxy_config: config,
    request_count: Default::default(),
    request_id: Default::default(),
    runtime_handle: tokio::runtime::Handle::current(),
  });
  let tracer = Arc::new(RecordingTracer::default());
  let (responded_tx, responded) = unbounded_channel();
  let (aborted_tx, aborted) = unbounded_channel();
  let engine = ProxyEngineBuilder::default()
    .globals(globals)
    .forwarder(forwarder)
    .ws_connector(ws_connector)
    .resolver(Arc::new(FixedResolver(Target::new(
      "upstream",
      8080,
      "/foo",
      "upstream.internal",
    ))))
    .tracer(tracer.clone())
    .failure_handler(Arc::new(RecordingFailureHandler {
      responded: responded_tx,
      aborted: aborted_tx,
    }))
    .build()
    .unwrap();
  Fixture {
    engine,
    tracer,
    failures: FailureLog { responded, aborted },
  }
}

fn get(host: Option<&str>) -> Request<RequestBody> {
  let mut builder = Request::builder().uri("/foo");
  if let Some(host) = host {
    builder = builder.header("host", host);
  }
  builder.body(RequestBody::Buffered(Bytes::new())).unwrap()
}

fn streamed_post(body: BoxBody) -> Request<RequestBody> {
  Request::builder()
    .method("POST")
    .uri("/upload")
    .header("host", "example.com")
    .body(RequestBody::Streamed(body))
    .unwrap()
}

fn websocket_handshake() -> Request<RequestBody> {
  Request::builder()
    .uri("/chat")
    .header("host", "example.com")
    .header("connection", "Upgrade")
    .header("upgrade", "websocket")
    .header("sec-websocket-version", "13")
    .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
    .body(RequestBody::Buffered(Bytes::new()))
    .unwrap()
}

#[tokio::test]
async fn forwards_with_rewritten_host_and_forwarding_headers() {
  let upstream = Response::builder()
    .header("content-type", "text/plain")
    .header("connection", "x-internal")
    .header("x-internal", "secret")
    .body(full_body("hello"))
    .unwrap();
  let forwarder = MockForwarder::answering(upstream);
  let f = fixture(forwarder.clone(), Default::default(), ProxyConfig::default());

  let res = f.engine.handle_request(get(Some("example.com")), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(res.headers()["content-type"], "text/plain");
  assert!(!res.headers().contains_key("x-internal"));
  assert_eq!(res.headers()["connection"], "keep-alive");
  assert_eq!(res.headers()["keep-alive"], "timeout=55");
  let request_id = res.headers()["x-request-id"].clone();

  let head = forwarder.head();
  assert_eq!(head.uri, "http://upstream:8080/foo");
  assert_eq!(head.headers["host"], "upstream.internal");
  assert_eq!(head.headers["x-host"], "example.com");
  assert_eq!(head.headers["x-forwarded-for"], "10.0.0.1");
  assert_eq!(head.headers["x-forwarded-proto"], "http");
  assert_eq!(head.headers["x-request-id"], request_id);

  let body = res.into_body().collect().await.unwrap().to_bytes();
  assert_eq!(body, "hello");
  tokio::task::yield_now().await;
  assert_eq!(f.tracer.count("outgoing_response_body_end"), 1);
}

#[tokio::test]
async fn given_request_id_is_kept() {
  let forwarder = MockForwarder::answering(Response::new(full_body("")));
  let f = fixture(forwarder.clone(), Default::default(), ProxyConfig::default());
  let mut req = get(Some("example.com"));
  req.headers_mut().insert("x-request-id", "abc-123".parse().unwrap());

  let res = f.engine.handle_request(req, client_addr(), true).await;
  assert_eq!(res.headers()["x-request-id"], "abc-123");
  let head = forwarder.head();
  assert_eq!(head.headers["x-request-id"], "abc-123");
  assert_eq!(head.headers["x-forwarded-proto"], "https");
}

#[tokio::test]
async fn missing_host_is_rejected() {
  let forwarder = Arc::new(MockForwarder::default());
  let mut f = fixture(forwarder.clone(), Default::default(), ProxyConfig::default());

  let res = f.engine.handle_request(get(None), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  assert!(res.headers().contains_key("x-request-id"));
  let failure = f.failures.responded.recv().await.unwrap();
  assert_eq!(failure.reason(), RejectReason::NoHostHeader);
  assert_eq!(failure.status_code(), 400);
  assert!(forwarder.received.lock().unwrap().is_none());

  let body = res.into_body().collect().await.unwrap().to_bytes();
  assert_eq!(
    body,
    "Exhausted resources while trying to extract Host header from the request"
  );
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
  let mut f = fixture(Arc::new(FailingForwarder), Default::default(), ProxyConfig::default());

  let res = f.engine.handle_request(get(Some("example.com")), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
  let failure = f.failures.responded.recv().await.unwrap();
  assert_eq!(failure.reason(), RejectReason::OutgoingRequestFail);
  assert_eq!(f.tracer.count("outgoing_request_exception"), 1);
  assert!(f.failures.aborted.try_recv().is_err());
}

#[tokio::test]
async fn silent_upstream_times_out() {
  let config = ProxyConfig {
    upstream_receive_timeout: Duration::from_millis(20),
    ..Default::default()
  };
  let mut f = fixture(Arc::new(MockForwarder::default()), Default::default(), config);

  let res = f.engine.handle_request(get(Some("example.com")), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
  let failure = f.failures.responded.recv().await.unwrap();
  assert_eq!(failure.reason(), RejectReason::OutgoingRequestFail);
  assert!(matches!(failure.cause(), Some(ProxyError::UpstreamReceiveTimeout(_))));
}

#[tokio::test]
async fn early_response_to_expect_continue_closes_connection() {
  let forwarder = MockForwarder::answering(Response::new(full_body("ok")));
  let f = fixture(forwarder.clone(), Default::default(), ProxyConfig::default());
  let (mut body_tx, body) = channel_body();
  let req = Request::builder()
    .method("POST")
    .uri("/upload")
    .header("host", "example.com")
    .header("expect", "100-continue")
    .header("content-length", "10")
    .body(RequestBody::Streamed(body))
    .unwrap();
  body_tx.send(Ok(Frame::data(Bytes::from_static(b"01234")))).await.unwrap();

  let res = f.engine.handle_request(req, client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(res.headers()["connection"], "close");
  assert!(!res.headers().contains_key("keep-alive"));
  assert_eq!(f.tracer.count("early_response:false"), 1);
  assert_eq!(forwarder.head().headers["expect"], "100-continue");

  let body = res.into_body().collect().await.unwrap().to_bytes();
  assert_eq!(body, "ok");
}

#[tokio::test]
async fn downstream_abort_mid_response_is_reported_once() {
  let (mut upstream_tx, upstream_body) = channel_body();
  let forwarder = MockForwarder::answering(Response::new(upstream_body));
  let mut f = fixture(forwarder, Default::default(), ProxyConfig::default());

  let res = f.engine.handle_request(get(Some("example.com")), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::OK);
  let mut body = res.into_body();
  upstream_tx.send(Ok(Frame::data(Bytes::from_static(b"part")))).await.unwrap();
  let frame = body.frame().await.unwrap().unwrap();
  assert_eq!(frame.into_data().unwrap(), "part");
  drop(body);

  let failure = f.failures.aborted.recv().await.unwrap();
  assert_eq!(failure.status_code(), 0);
  assert_eq!(failure.reason(), RejectReason::OutgoingResponseFail);
  assert!(upstream_tx.is_closed());

  tokio::task::yield_now().await;
  assert!(f.failures.aborted.try_recv().is_err());
  assert!(f.failures.responded.try_recv().is_err());
  assert_eq!(f.tracer.count("outgoing_response_exception"), 1);
  assert_eq!(f.tracer.count("prematurely_closed"), 1);
  assert_eq!(f.tracer.count("outgoing_response_body_end"), 0);
}

#[tokio::test]
async fn dropped_handler_before_head_reports_lost_downstream() {
  let mut f = fixture(Arc::new(MockForwarder::default()), Default::default(), ProxyConfig::default());
  let handling = f.engine.handle_request(get(Some("example.com")), client_addr(), false);
  let res = tokio::time::timeout(Duration::from_millis(10), handling).await;
  assert!(res.is_err());

  let failure = f.failures.aborted.recv().await.unwrap();
  assert_eq!(failure.status_code(), 0);
  assert_eq!(failure.reason(), RejectReason::OutgoingResponseFail);
  assert!(f.failures.responded.try_recv().is_err());
}

#[tokio::test]
async fn request_body_error_before_head_is_internal_error() {
  let forwarder = Arc::new(MockForwarder::default());
  let mut f = fixture(forwarder, Default::default(), ProxyConfig::default());
  let (mut body_tx, body) = channel_body();
  body_tx
    .send(Err(ProxyError::FailedToReadRequestBody("reset".to_string())))
    .await
    .unwrap();

  let res = f.engine.handle_request(streamed_post(body), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
  let failure = f.failures.responded.recv().await.unwrap();
  assert_eq!(failure.status_code(), 500);
  assert_eq!(failure.reason(), RejectReason::IncomingRequestFail);

  tokio::task::yield_now().await;
  assert!(f.failures.responded.try_recv().is_err());
  assert!(f.failures.aborted.try_recv().is_err());
}

#[tokio::test]
async fn request_body_error_after_head_aborts_response() {
  let (_upstream_tx, upstream_body) = channel_body();
  let forwarder = MockForwarder::answering(Response::new(upstream_body));
  let mut f = fixture(forwarder, Default::default(), ProxyConfig::default());
  let (mut body_tx, body) = channel_body();

  let res = f.engine.handle_request(streamed_post(body), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::OK);
  let mut res_body = res.into_body();
  body_tx
    .send(Err(ProxyError::FailedToReadRequestBody("reset".to_string())))
    .await
    .unwrap();

  assert!(res_body.frame().await.unwrap().is_err());
  let failure = f.failures.aborted.recv().await.unwrap();
  assert_eq!(failure.status_code(), 500);
  assert_eq!(failure.reason(), RejectReason::IncomingRequestFail);

  tokio::task::yield_now().await;
  assert!(f.failures.aborted.try_recv().is_err());
  assert!(f.failures.responded.try_recv().is_err());
}

#[tokio::test]
async fn upstream_body_error_mid_stream_aborts_once() {
  let (mut upstream_tx, upstream_body) = channel_body();
  let forwarder = MockForwarder::answering(Response::new(upstream_body));
  let mut f = fixture(forwarder, Default::default(), ProxyConfig::default());

  let res = f.engine.handle_request(get(Some("example.com")), client_addr(), false).await;
  let mut body = res.into_body();
  upstream_tx.send(Ok(Frame::data(Bytes::from_static(b"part")))).await.unwrap();
  assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap(), "part");
  upstream_tx
    .send(Err(ProxyError::FailedToReadResponseBody("reset".to_string())))
    .await
    .unwrap();

  assert!(body.frame().await.unwrap().is_err());
  let failure = f.failures.aborted.recv().await.unwrap();
  assert_eq!(failure.status_code(), 502);
  assert_eq!(failure.reason(), RejectReason::IncomingResponseFail);

  tokio::task::yield_now().await;
  assert!(f.failures.aborted.try_recv().is_err());
  assert!(f.failures.responded.try_recv().is_err());
  assert_eq!(f.tracer.count("outgoing_response_exception"), 1);
  assert_eq!(f.tracer.count("outgoing_response_body_end"), 0);
}

#[tokio::test]
async fn stalled_upstream_body_times_out() {
  let config = ProxyConfig {
    upstream_receive_timeout: Duration::from_millis(30),
    ..Default::default()
  };
  let (_upstream_tx, upstream_body) = channel_body();
  let forwarder = MockForwarder::answering(Response::new(upstream_body));
  let mut f = fixture(forwarder, Default::default(), config);

  let res = f.engine.handle_request(get(Some("example.com")), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::OK);
  let mut body = res.into_body();

  assert!(body.frame().await.unwrap().is_err());
  let failure = f.failures.aborted.recv().await.unwrap();
  assert_eq!(failure.status_code(), 502);
  assert_eq!(failure.reason(), RejectReason::IncomingResponseFail);
  assert!(matches!(failure.cause(), Some(ProxyError::UpstreamReceiveTimeout(_))));
  assert!(f.failures.responded.try_recv().is_err());
}

#[tokio::test]
async fn http2_request_uses_authority_without_keep_alive() {
  let forwarder = MockForwarder::answering(Response::new(full_body("h2")));
  let f = fixture(forwarder.clone(), Default::default(), ProxyConfig::default());
  let req = Request::builder()
    .version(Version::HTTP_2)
    .uri("https://h2.example.com/foo")
    .body(RequestBody::Buffered(Bytes::new()))
    .unwrap();

  let res = f.engine.handle_request(req, client_addr(), true).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert!(!res.headers().contains_key("connection"));
  assert!(!res.headers().contains_key("keep-alive"));
  assert!(res.headers().contains_key("x-request-id"));

  let head = forwarder.head();
  assert_eq!(head.headers["x-host"], "h2.example.com");
  assert_eq!(head.version, Version::HTTP_11);
}

#[tokio::test]
async fn upstream_close_is_not_turned_into_keep_alive() {
  let upstream = Response::builder()
    .header("connection", "close")
    .body(full_body("bye"))
    .unwrap();
  let forwarder = MockForwarder::answering(upstream);
  let f = fixture(forwarder, Default::default(), ProxyConfig::default());

  let res = f.engine.handle_request(get(Some("example.com")), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert!(!res.headers().contains_key("keep-alive"));
  assert!(!res.headers().contains_key("connection"));
  let body = res.into_body().collect().await.unwrap().to_bytes();
  assert_eq!(body, "bye");
}

#[tokio::test]
async fn response_after_complete_body_to_expect_continue_keeps_alive() {
  let forwarder = MockForwarder::answering(Response::new(full_body("ok")));
  let f = fixture(forwarder, Default::default(), ProxyConfig::default());
  let req = Request::builder()
    .method("POST")
    .uri("/upload")
    .header("host", "example.com")
    .header("expect", "100-continue")
    .header("content-length", "10")
    .body(RequestBody::Buffered(Bytes::from_static(b"0123456789")))
    .unwrap();

  let res = f.engine.handle_request(req, client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(res.headers()["connection"], "keep-alive");
  assert!(res.headers().contains_key("keep-alive"));
  assert_eq!(f.tracer.count("early_response:true"), 1);
  assert_eq!(f.tracer.count("early_response:false"), 0);
}

#[tokio::test]
async fn rejected_websocket_handshake_is_relayed_bodiless() {
  let mut upstream_headers = HeaderMap::new();
  upstream_headers.insert("www-authenticate", "Bearer".parse().unwrap());
  upstream_headers.insert("content-length", "12".parse().unwrap());
  let connector = Arc::new(MockWebSocketConnector {
    result: Mutex::new(Some(Err(WebSocketConnectError::Rejected {
      status: StatusCode::FORBIDDEN,
      headers: upstream_headers,
    }))),
    ..Default::default()
  });
  let f = fixture(Arc::new(MockForwarder::default()), connector.clone(), ProxyConfig::default());

  let res = f.engine.handle_request(websocket_handshake(), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);
  assert_eq!(res.headers()["www-authenticate"], "Bearer");
  assert_eq!(res.headers()["content-length"], "0");
  assert_eq!(res.headers()["connection"], "keep-alive");
  assert!(res.headers().contains_key("x-request-id"));

  let sent = connector.headers.lock().unwrap().clone().unwrap();
  assert_eq!(sent["host"], "upstream.internal");
  assert_eq!(sent["x-host"], "example.com");
  assert!(!sent.contains_key("upgrade"));
}

#[tokio::test]
async fn failed_websocket_connect_is_bad_gateway() {
  let f = fixture(Arc::new(MockForwarder::default()), Default::default(), ProxyConfig::default());

  let res = f.engine.handle_request(websocket_handshake(), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
  assert_eq!(res.headers()["content-length"], "0");
}

#[tokio::test]
async fn websocket_handshake_is_answered() {
  let (proxy_side, _server_side) = tokio::io::duplex(1024);
  let io: Box<dyn WebSocketIo> = Box::new(proxy_side);
  let upstream = UpstreamWebSocket {
    stream: WebSocketStream::from_raw_socket(io, Role::Client, None).await,
    protocol: Some("chat".parse().unwrap()),
  };
  let connector = Arc::new(MockWebSocketConnector {
    result: Mutex::new(Some(Ok(upstream))),
    ..Default::default()
  });
  let f = fixture(Arc::new(MockForwarder::default()), connector, ProxyConfig::default());

  let res = f.engine.handle_request(websocket_handshake(), client_addr(), false).await;
  assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
  assert_eq!(res.headers()["sec-websocket-accept"], "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
  assert_eq!(res.headers()["sec-websocket-protocol"], "chat");
  assert_eq!(res.headers()["upgrade"], "websocket");
  assert_eq!(f.tracer.count("websocket_initial:ws://upstream:8080/foo"), 1);
}

#[tokio::test]
async fn websocket_relay_is_symmetric() {
  let (client_io, downstream_io) = tokio::io::duplex(1024);
  let (upstream_io, server_io) = tokio::io::duplex(1024);
  let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
  let downstream = WebSocketStream::from_raw_socket(downstream_io, Role::Server, None).await;
  let upstream = WebSocketStream::from_raw_socket(upstream_io, Role::Client, None).await;
  let mut server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
  let relay = tokio::spawn(relay_websockets(downstream, upstream));

  client.send(Message::text("ping")).await.unwrap();
  assert_eq!(server.next().await.unwrap().unwrap(), Message::text("ping"));
  server.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
  assert_eq!(client.next().await.unwrap().unwrap(), Message::binary(vec![1u8, 2, 3]));

  client.close(None).await.unwrap();
  assert!(server.next().await.unwrap().unwrap().is_close());
  assert!(relay.await.unwrap().is_ok());
  assert!(!matches!(server.next().await, Some(Ok(Message::Close(_)))));
}

#[tokio::test]
async fn websocket_pings_are_answered_once() {
  let (client_io, downstream_io) = tokio::io::duplex(1024);
  let (upstream_io, server_io) = tokio::io::duplex(1024);
  let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
  let downstream = WebSocketStream::from_raw_socket(downstream_io, Role::Server, None).await;
  let upstream = WebSocketStream::from_raw_socket(upstream_io, Role::Client, None).await;
  let mut server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
  let _relay = tokio::spawn(relay_websockets(downstream, upstream));

  client.send(Message::Ping(Bytes::from_static(b"hb"))).await.unwrap();
  assert_eq!(client.next().await.unwrap().unwrap(), Message::Pong(Bytes::from_static(b"hb")));
  assert_eq!(server.next().await.unwrap().unwrap(), Message::Ping(Bytes::from_static(b"hb")));

  // the server's own pong goes out with its next writes and must not reach the client
  server.send(Message::text("after")).await.unwrap();
  server.send(Message::text("end")).await.unwrap();
  assert_eq!(client.next().await.unwrap().unwrap(), Message::text("after"));
  assert_eq!(client.next().await.unwrap().unwrap(), Message::text("end"));
}
