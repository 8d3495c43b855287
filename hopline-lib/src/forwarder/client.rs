use crate::{
  error::{ProxyError, ProxyResult},
  globals::Globals,
  hyper_ext::{body::BoxBody, rt::LocalExecutor},
};
use async_trait::async_trait;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper_util::{
  client::legacy::{
    connect::{Connect, HttpConnector},
    Client,
  },
  rt::TokioTimer,
};
use std::sync::Arc;

#[async_trait]
/// Definition of the forwarder that simply forward requests from downstream client to upstream app servers.
/// Connection pooling is entirely up to the implementation.
pub trait ForwardRequest<B1, B2>: Send + Sync {
  type Error;
  async fn request(&self, req: Request<B1>) -> Result<Response<B2>, Self::Error>;
}

/// Forwarder http client struct backed by a pooled hyper client
pub struct Forwarder<C> {
  inner: Client<C, BoxBody>,
}

#[async_trait]
impl<C> ForwardRequest<BoxBody, BoxBody> for Forwarder<C>
where
  C: Send + Sync + Connect + Clone + 'static,
{
  type Error = ProxyError;

  async fn request(&self, req: Request<BoxBody>) -> ProxyResult<Response<BoxBody>> {
    let res = self
      .inner
      .request(req)
      .await
      .map_err(|e| ProxyError::FailedToFetchFromUpstream(e.to_string()))?;
    Ok(res.map(|body| {
      body
        .map_err(|e| ProxyError::FailedToReadResponseBody(e.to_string()))
        .boxed_unsync()
    }))
  }
}

impl Forwarder<HttpConnector> {
  /// Build inner client with plain http
  pub fn try_new(globals: &Arc<Globals>) -> ProxyResult<Self> {
    let config = &globals.proxy_config;
    let executor = LocalExecutor::new(globals.runtime_handle.clone());
    let mut http = HttpConnector::new();
    http.enforce_http(true);
    http.set_reuse_address(true);
    http.set_nodelay(true);
    http.set_connect_timeout(Some(config.upstream_connect_timeout));
    http.set_keepalive(Some(config.upstream_idle_timeout));
    let inner = Client::builder(executor)
      .pool_timer(TokioTimer::new())
      .pool_idle_timeout(config.upstream_idle_timeout)
      .pool_max_idle_per_host(config.upstream_max_idle_per_host)
      .build::<_, BoxBody>(http);

    Ok(Self { inner })
  }
}
