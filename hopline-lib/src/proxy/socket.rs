use crate::{error::*, log::*};
use std::net::SocketAddr;
use tokio::net::TcpSocket;

/// Bind TCP socket to the given `SocketAddr` with `SO_REUSEADDR`,
/// so that the address can be bound again right after the listener is stopped.
pub(super) fn bind_tcp_socket(listening_on: &SocketAddr) -> ProxyResult<TcpSocket> {
  let tcp_socket = if listening_on.is_ipv6() {
    TcpSocket::new_v6()
  } else {
    TcpSocket::new_v4()
  }?;
  tcp_socket.set_reuseaddr(true)?;

  tcp_socket.bind(*listening_on).map_err(|e| {
    error!("Failed to bind TCP socket {}: {}", listening_on, e);
    ProxyError::Io(e)
  })?;

  Ok(tcp_socket)
}
