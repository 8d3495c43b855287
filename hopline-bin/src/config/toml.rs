use crate::{
  constants::*,
  error::{anyhow, ensure},
};
use hopline_lib::{ProxyConfig, Route, Target};
use serde::Deserialize;
use std::{fs, net::SocketAddr};
use tokio::time::Duration;

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigToml {
  pub listen_port: Option<u16>,
  pub listen_ipv6: Option<bool>,
  pub tcp_listen_backlog: Option<u32>,
  pub max_concurrent_streams: Option<u32>,
  pub max_clients: Option<u32>,
  pub keepalive: Option<bool>,
  pub server_idle_timeout: Option<u64>,
  pub connection_handling_timeout: Option<u64>,
  pub trace_messages: Option<bool>,
  pub upstream: Option<UpstreamOption>,
  pub route: Option<Vec<RouteOption>>,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct UpstreamOption {
  pub connect_timeout: Option<u64>,
  pub idle_timeout: Option<u64>,
  pub max_idle_per_host: Option<usize>,
  pub receive_timeout: Option<u64>,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct RouteOption {
  pub prefix: Option<String>,
  pub host: String,
  pub port: u16,
  pub path: Option<String>,
  pub host_header: Option<String>,
}

impl TryInto<ProxyConfig> for &ConfigToml {
  type Error = anyhow::Error;

  fn try_into(self) -> std::result::Result<ProxyConfig, Self::Error> {
    let mut proxy_config = ProxyConfig::default();
    let port = self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT);
    ensure!(port != 0, "listen_port must not be 0");

    // NOTE: when [::]:xx is bound, both v4 and v6 listeners are enabled.
    let listen_addresses: Vec<&str> = if let Some(true) = self.listen_ipv6 {
      LISTEN_ADDRESSES_V6.to_vec()
    } else {
      LISTEN_ADDRESSES_V4.to_vec()
    };
    proxy_config.listen_sockets = listen_addresses
      .iter()
      .map(|addr| format!("{addr}:{port}").parse::<SocketAddr>())
      .collect::<Result<Vec<_>, _>>()?;

    // tcp backlog
    if let Some(backlog) = self.tcp_listen_backlog {
      proxy_config.tcp_listen_backlog = backlog;
    }

    // max values
    if let Some(c) = self.max_clients {
      proxy_config.max_clients = c as usize;
    }
    if let Some(c) = self.max_concurrent_streams {
      proxy_config.max_concurrent_streams = c;
    }

    // downstream connections
    if let Some(keepalive) = self.keepalive {
      proxy_config.keepalive = keepalive;
    }
    if let Some(timeout) = self.server_idle_timeout {
      ensure!(timeout > 0, "server_idle_timeout must be positive");
      proxy_config.server_idle_timeout = Duration::from_secs(timeout);
    }
    if let Some(timeout) = self.connection_handling_timeout {
      if timeout == 0u64 {
        proxy_config.connection_handling_timeout = None;
      } else {
        proxy_config.connection_handling_timeout = Some(Duration::from_secs(timeout));
      }
    }
    if let Some(trace) = self.trace_messages {
      proxy_config.trace_messages = trace;
    }

    // upstream connections
    if let Some(upstream) = &self.upstream {
      if let Some(x) = upstream.connect_timeout {
        proxy_config.upstream_connect_timeout = Duration::from_secs(x);
      }
      if let Some(x) = upstream.idle_timeout {
        proxy_config.upstream_idle_timeout = Duration::from_secs(x);
      }
      if let Some(x) = upstream.max_idle_per_host {
        proxy_config.upstream_max_idle_per_host = x;
      }
      if let Some(x) = upstream.receive_timeout {
        ensure!(x > 0, "upstream receive_timeout must be positive");
        proxy_config.upstream_receive_timeout = Duration::from_secs(x);
      }
    }

    Ok(proxy_config)
  }
}

impl ConfigToml {
  pub fn new(config_file: &str) -> std::result::Result<Self, anyhow::Error> {
    let config_str = fs::read_to_string(config_file)?;

    toml::from_str(&config_str).map_err(|e| anyhow!(e))
  }
}

impl RouteOption {
  pub fn build_route(&self) -> std::result::Result<Route, anyhow::Error> {
    ensure!(!self.host.is_empty(), "Missing upstream host in route");
    ensure!(self.port != 0, "Upstream port must not be 0");
    let prefix = self.prefix.as_deref().unwrap_or("/");
    ensure!(
      prefix.is_empty() || prefix.starts_with('/'),
      "Route prefix must start with '/': {prefix}"
    );
    let target = Target::new(
      self.host.as_str(),
      self.port,
      self.path.as_deref().unwrap_or_default(),
      self.host_header.as_deref().unwrap_or_default(),
    );
    Ok(Route::new(prefix, target))
  }
}
