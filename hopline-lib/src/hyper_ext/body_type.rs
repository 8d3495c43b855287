use crate::error::ProxyError;
use http_body_util::{combinators, BodyExt, Empty, Full};
use hyper::body::{Body, Bytes, Incoming};

/// Type for boxed body flowing through the engine in both directions.
/// Unsync since request bodies are only ever polled by a single task.
pub type BoxBody = combinators::UnsyncBoxBody<Bytes, ProxyError>;

/// Body of an inbound request handed to the engine
pub enum RequestBody {
  /// Body still arriving on a hyper connection
  Incoming(Incoming),
  /// Body already received in full by the caller
  Buffered(Bytes),
  /// Any other body stream
  Streamed(BoxBody),
}

/// Inbound body after checking whether it is already complete
pub(crate) enum InboundBody {
  Complete(Bytes),
  Streaming(BoxBody),
}

impl RequestBody {
  pub(crate) fn into_inbound(self) -> InboundBody {
    match self {
      RequestBody::Incoming(incoming) if incoming.is_end_stream() => InboundBody::Complete(Bytes::new()),
      RequestBody::Incoming(incoming) => InboundBody::Streaming(
        incoming
          .map_err(|e| ProxyError::FailedToReadRequestBody(e.to_string()))
          .boxed_unsync(),
      ),
      RequestBody::Buffered(bytes) => InboundBody::Complete(bytes),
      RequestBody::Streamed(body) if body.is_end_stream() => InboundBody::Complete(Bytes::new()),
      RequestBody::Streamed(body) => InboundBody::Streaming(body),
    }
  }
}

/// helper function to build a empty body
pub(crate) fn empty() -> BoxBody {
  Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

/// helper function to build a full body
pub(crate) fn full(body: Bytes) -> BoxBody {
  Full::new(body).map_err(|never| match never {}).boxed_unsync()
}
