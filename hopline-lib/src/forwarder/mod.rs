mod client;
mod websocket;

pub use client::{ForwardRequest, Forwarder};
pub use websocket::{ConnectWebSocket, TcpWebSocketConnector, UpstreamWebSocket, WebSocketConnectError, WebSocketIo};
