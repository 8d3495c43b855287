mod completion;
mod handler_forward;
mod handler_main;
mod handler_websocket;
mod proxy_exception;
mod synthetic_response;
mod utils_headers;

#[cfg(test)]
mod handler_tests;

pub use completion::{CompletionGuard, Outcome};
pub use handler_main::{ProxyEngine, ProxyEngineBuilder, ProxyEngineBuilderError};
pub use proxy_exception::{ProxyException, RejectReason};
pub use synthetic_response::{FailureHandler, PlainTextFailureHandler};
pub use utils_headers::{copy_end_to_end_headers, propagate_request_headers, remove_hop_by_hop_headers};

pub(crate) use synthetic_response::plain_text_response;
pub(crate) use utils_headers::is_chunked;
