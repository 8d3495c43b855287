use super::body::{BoxBody, PipeSender};
use crate::error::ProxyError;
use http_body_util::BodyExt;
use hyper::body::{Bytes, Frame};
use std::{
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
  time::Duration,
};
use thiserror::Error;
use tokio::time::timeout;

#[derive(Debug, Error)]
/// Terminal error of a pump, exactly one per run
pub(crate) enum PumpError {
  #[error("Source failed: {0}")]
  Source(ProxyError),
  #[error("Sink closed before the source ended")]
  SinkClosed,
  #[error("Source stayed idle for {0:?}")]
  Timeout(Duration),
}

impl From<PumpError> for ProxyError {
  fn from(e: PumpError) -> Self {
    match e {
      PumpError::Source(e) => e,
      PumpError::SinkClosed => ProxyError::PipeBodyClosed,
      PumpError::Timeout(idle) => ProxyError::UpstreamReceiveTimeout(idle),
    }
  }
}

/// Moves frames from a body to a pipe, one frame at a time.
/// The next frame is read only after the sink accepted the previous one.
pub(crate) struct Pump {
  idle_timeout: Option<Duration>,
  progress: Option<Arc<AtomicU64>>,
}

impl Pump {
  pub(crate) fn new(idle_timeout: Option<Duration>) -> Self {
    Self {
      idle_timeout,
      progress: None,
    }
  }

  /// Counts every byte accepted by the sink into `progress` as the pump goes
  pub(crate) fn with_progress(mut self, progress: Arc<AtomicU64>) -> Self {
    self.progress = Some(progress);
    self
  }

  /// Runs until the source ends, returning the number of data bytes moved
  pub(crate) async fn run(&self, mut source: BoxBody, sink: &mut PipeSender) -> Result<u64, PumpError> {
    let mut transferred = 0u64;
    loop {
      let frame = tokio::select! {
        biased;
        _ = sink.closed() => return Self::closed_sink(sink, transferred),
        frame = self.next_frame(&mut source) => frame?,
      };
      let Some(frame) = frame else {
        return Ok(transferred);
      };
      match frame.into_data() {
        Ok(data) => {
          let len = data.len() as u64;
          if sink.send_data(data).await.is_err() {
            return Self::closed_sink(sink, transferred);
          }
          transferred += len;
          if let Some(progress) = &self.progress {
            progress.fetch_add(len, Ordering::AcqRel);
          }
        }
        Err(frame) => {
          if let Ok(trailers) = frame.into_trailers() {
            sink.send_trailers(trailers).map_err(|_| PumpError::SinkClosed)?;
          }
        }
      }
    }
  }

  async fn next_frame(&self, source: &mut BoxBody) -> Result<Option<Frame<Bytes>>, PumpError> {
    let frame = match self.idle_timeout {
      Some(idle) => timeout(idle, source.frame()).await.map_err(|_| PumpError::Timeout(idle))?,
      None => source.frame().await,
    };
    frame.transpose().map_err(PumpError::Source)
  }

  /// A consumer may drop a body with known length right after taking its last byte
  fn closed_sink(sink: &PipeSender, transferred: u64) -> Result<u64, PumpError> {
    if sink.is_delivered() {
      Ok(transferred)
    } else {
      Err(PumpError::SinkClosed)
    }
  }
}
