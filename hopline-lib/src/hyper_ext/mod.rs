mod body_pipe;
mod body_type;
mod executor;
mod pump;
mod want;

pub(crate) mod rt {
  pub(crate) use super::executor::LocalExecutor;
}
pub(crate) mod body {
  pub(crate) use super::body_pipe::{BodyLength, PipeBody, PipeSender};
  pub(crate) use super::body_type::{empty, full, InboundBody};
  pub use super::body_type::{BoxBody, RequestBody};
}
pub(crate) use pump::{Pump, PumpError};
