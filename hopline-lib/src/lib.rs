mod constants;
mod count;
mod error;
mod forwarder;
mod globals;
mod hyper_ext;
mod log;
mod message_handler;
mod proxy;
mod target;
mod tracer;

use crate::{
  count::RequestIdGenerator,
  forwarder::Forwarder,
  globals::Globals,
  log::*,
  message_handler::ProxyEngineBuilder,
  proxy::{connection_builder, Proxy},
};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use crate::{
  error::{ProxyError, ProxyResult},
  forwarder::{
    ConnectWebSocket, ForwardRequest, TcpWebSocketConnector, UpstreamWebSocket, WebSocketConnectError, WebSocketIo,
  },
  globals::ProxyConfig,
  hyper_ext::body::{BoxBody, RequestBody},
  message_handler::{
    copy_end_to_end_headers, propagate_request_headers, remove_hop_by_hop_headers, CompletionGuard, FailureHandler,
    Outcome, PlainTextFailureHandler, ProxyException, RejectReason,
  },
  target::{NextHop, Route, RouteTable, Target, TargetResolver},
  tracer::{LoggingTracer, NoopTracer, ProxyTracer, RequestStart},
};

/// Entrypoint that creates and spawns tasks of reverse proxy services
pub async fn entrypoint(
  proxy_config: &ProxyConfig,
  resolver: Arc<dyn TargetResolver>,
  runtime_handle: &tokio::runtime::Handle,
  cancel_token: Option<CancellationToken>,
) -> ProxyResult<()> {
  // For initial message logging
  if proxy_config.listen_sockets.iter().any(|addr| addr.is_ipv6()) {
    info!("Listen both IPv4 and IPv6")
  } else {
    info!("Listen IPv4")
  }
  for addr in proxy_config.listen_sockets.iter() {
    info!("Listen address: {}", addr);
  }
  if proxy_config.trace_messages {
    info!("Message tracing is enabled at trace level");
  }

  // build global
  let globals = Arc::new(Globals {
    proxy_config: proxy_config.clone(),
    request_count: Default::default(),
    request_id: RequestIdGenerator::default(),
    runtime_handle: runtime_handle.clone(),
  });

  // build the engine including a request forwarder and a websocket connector
  let forwarder = Arc::new(Forwarder::try_new(&globals)?);
  let ws_connector = Arc::new(TcpWebSocketConnector::new(globals.proxy_config.upstream_connect_timeout));
  let mut engine_builder = ProxyEngineBuilder::default();
  engine_builder
    .globals(globals.clone())
    .forwarder(forwarder)
    .ws_connector(ws_connector)
    .resolver(resolver);
  if globals.proxy_config.trace_messages {
    engine_builder.tracer(Arc::new(LoggingTracer));
  }
  let engine = Arc::new(engine_builder.build()?);

  let connection_builder = connection_builder(&globals);
  let cancel_token = cancel_token.unwrap_or_default();

  // spawn a proxy per listen socket, sharing the engine and the connection builder
  let addresses = globals.proxy_config.listen_sockets.clone();
  let join_handles = addresses.into_iter().map(|addr| {
    let proxy = Proxy {
      globals: globals.clone(),
      listening_on: addr,
      connection_builder: connection_builder.clone(),
      engine: engine.clone(),
    };
    let cancel_token = cancel_token.clone();
    globals.runtime_handle.spawn(async move { proxy.start(cancel_token).await })
  });

  // wait for all listeners
  let mut result = Ok(());
  for joined in join_all(join_handles).await {
    match joined {
      Ok(Ok(())) => {}
      Ok(Err(e)) => {
        error!("Some proxy services are down: {}", e);
        result = Err(e);
      }
      Err(e) => error!("Proxy service task failed: {}", e),
    }
  }
  result
}
