use super::{NextHop, Target, TargetResolver};
use crate::{
  hyper_ext::body::RequestBody,
  log::*,
  message_handler::{plain_text_response, ProxyException},
};
use async_trait::async_trait;
use http::{Request, StatusCode};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Path prefix routed to a target
pub struct Route {
  prefix: String,
  target: Target,
}

impl Route {
  /// Trailing `/` and `/*` of the prefix and of the target uri are ignored
  pub fn new(prefix: &str, target: Target) -> Self {
    let uri = trim_path(target.uri()).to_string();
    Self {
      prefix: trim_path(prefix).to_string(),
      target: Target { uri, ..target },
    }
  }

  fn matches(&self, path: &str) -> bool {
    path.starts_with(&self.prefix) && matches!(path.as_bytes().get(self.prefix.len()), None | Some(b'/'))
  }
}

fn trim_path(path: &str) -> &str {
  path.trim_end_matches('*').trim_end_matches('/')
}

#[derive(Debug, Clone, Default)]
/// Longest-prefix routing table
pub struct RouteTable {
  routes: Vec<Route>,
}

impl RouteTable {
  pub fn new(mut routes: Vec<Route>) -> Self {
    routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    Self { routes }
  }

  /// Target for the given path and query, with the matched prefix replaced by the route's uri
  pub fn find(&self, path_and_query: &str) -> Option<Target> {
    let path = path_and_query.split('?').next().unwrap_or_default();
    self
      .routes
      .iter()
      .find(|route| route.matches(path))
      .map(|route| route.target.with_suffix(&path_and_query[route.prefix.len()..]))
  }
}

#[async_trait]
impl TargetResolver for RouteTable {
  async fn resolve(&self, req: &mut Request<RequestBody>, _tls: bool) -> Result<NextHop, ProxyException> {
    let path_and_query = req.uri().path_and_query().map_or("/", |pq| pq.as_str());
    match self.find(path_and_query) {
      Some(target) => Ok(NextHop::Forward(target)),
      None => {
        debug!("No route for {}", path_and_query);
        Ok(NextHop::Handled(plain_text_response(StatusCode::NOT_FOUND, "No route found")))
      }
    }
  }
}
