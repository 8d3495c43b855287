use super::socket::bind_tcp_socket;
use crate::{
  error::*,
  globals::Globals,
  hyper_ext::{
    body::{BoxBody, RequestBody},
    rt::LocalExecutor,
  },
  log::*,
  message_handler::ProxyEngine,
};
use futures::{select, FutureExt};
use http::{Request, Response};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{rt::TokioIo, server::conn::auto::Builder as ConnectionBuilder};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::sync::CancellationToken;

/// Wrapper function to hand a request of HTTP/1.1 or HTTP/2 over to the engine
async fn serve_request(
  req: Request<Incoming>,
  engine: Arc<ProxyEngine>,
  client_addr: SocketAddr,
) -> ProxyResult<Response<BoxBody>> {
  Ok(engine.handle_request(req.map(RequestBody::Incoming), client_addr, false).await)
}

#[derive(Clone)]
/// Proxy main object responsible to serve requests received from clients at the given socket address.
pub(crate) struct Proxy {
  /// global context shared among async tasks
  pub globals: Arc<Globals>,
  /// listen socket address
  pub listening_on: SocketAddr,
  /// hyper connection builder serving http request
  pub connection_builder: Arc<ConnectionBuilder<LocalExecutor>>,
  /// engine proxying every request
  pub engine: Arc<ProxyEngine>,
}

impl Proxy {
  /// Serves requests from clients
  fn serve_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
    let request_count = self.globals.request_count.clone();
    if request_count.increment() > self.globals.proxy_config.max_clients {
      request_count.decrement();
      debug!("Too many clients, dropping connection from {}", peer_addr);
      return;
    }
    trace!("Request incoming: current # {}", request_count.current());

    if let Err(e) = stream.set_nodelay(true) {
      debug!("Failed to set TCP_NODELAY: {}", e);
    }
    let server_clone = self.connection_builder.clone();
    let engine_clone = self.engine.clone();
    let handling_timeout = self.globals.proxy_config.connection_handling_timeout;

    self.globals.runtime_handle.clone().spawn(async move {
      let fut = server_clone.serve_connection_with_upgrades(
        TokioIo::new(stream),
        service_fn(move |req: Request<Incoming>| serve_request(req, engine_clone.clone(), peer_addr)),
      );

      if let Some(handling_timeout) = handling_timeout {
        timeout(handling_timeout, fut).await.ok();
      } else if let Err(e) = fut.await {
        debug!("Connection from {} closed with error: {}", peer_addr, e);
      }

      request_count.decrement();
      trace!("Request processed: current # {}", request_count.current());
    });
  }

  /// TCP listener service, i.e., http/2 and http/1.1 in cleartext
  async fn listener_service(&self) -> ProxyResult<()> {
    let tcp_socket = bind_tcp_socket(&self.listening_on)?;
    let tcp_listener = tcp_socket.listen(self.globals.proxy_config.tcp_listen_backlog)?;
    info!("Start TCP proxy serving on {}", self.listening_on);
    loop {
      match tcp_listener.accept().await {
        Ok((stream, client_addr)) => self.serve_connection(stream, client_addr),
        Err(e) => {
          error!("Failed to accept connection: {}", e);
          return Err(ProxyError::Io(e));
        }
      }
    }
  }

  /// Entrypoint of the listener, running until the service fails or the token is cancelled
  pub async fn start(&self, cancel_token: CancellationToken) -> ProxyResult<()> {
    select! {
      res = self.listener_service().fuse() => {
        error!("TCP proxy service on {} exited", self.listening_on);
        cancel_token.cancel();
        res
      },
      _ = cancel_token.cancelled().fuse() => {
        debug!("Cancel token is called for listener on {}", self.listening_on);
        Ok(())
      }
    }
  }
}
