use super::want;
use crate::error::*;
use futures_channel::{mpsc, oneshot};
use futures_util::{future::poll_fn, stream::FusedStream, Future, Stream};
use http::{header, HeaderMap};
use hyper::body::{Body, Bytes, Frame, SizeHint};
use std::{
  pin::Pin,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  task::{ready, Context, Poll},
};

/// Body fed chunk by chunk from a `PipeSender`, with backpressure towards the sender.
/// It holds at most one chunk in flight, and the sender is told once the body is dropped.
// modeled on hyper's channel-backed `Incoming`
pub(crate) struct PipeBody {
  remaining: BodyLength,
  delivered: Arc<AtomicBool>,
  want_tx: want::Notifier,
  data_rx: mpsc::Receiver<ProxyResult<Bytes>>,
  trailers_rx: oneshot::Receiver<HeaderMap>,
}

/// Sending half of a `PipeBody`
pub(crate) struct PipeSender {
  want_rx: want::Watcher,
  delivered: Arc<AtomicBool>,
  data_tx: mpsc::Sender<ProxyResult<Bytes>>,
  trailers_tx: Option<oneshot::Sender<HeaderMap>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Length of a piped body as announced by its message head
pub(crate) enum BodyLength {
  Known(u64),
  Unknown,
}

impl BodyLength {
  /// Derives the length from `content-length` unless the message is chunked
  pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
    if crate::message_handler::is_chunked(headers) {
      return BodyLength::Unknown;
    }
    headers
      .get(header::CONTENT_LENGTH)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.trim().parse::<u64>().ok())
      .map_or(BodyLength::Unknown, BodyLength::Known)
  }

  fn consume(&mut self, amount: u64) {
    if let BodyLength::Known(known) = self {
      *known = known.saturating_sub(amount);
    }
  }
}

const WANT_PENDING: usize = 1;
const WANT_READY: usize = 2;

impl PipeBody {
  /// Creates a pipe whose sender becomes ready only after the body has been polled once,
  /// i.e., after the consumer actually started writing the message.
  pub(crate) fn channel(length: BodyLength) -> (PipeSender, PipeBody) {
    Self::new_channel(length, true)
  }

  pub(crate) fn new_channel(length: BodyLength, wanter: bool) -> (PipeSender, PipeBody) {
    let (data_tx, data_rx) = mpsc::channel(0);
    let (trailers_tx, trailers_rx) = oneshot::channel();
    let (want_tx, want_rx) = want::channel(if wanter { WANT_PENDING } else { WANT_READY });
    let delivered = Arc::new(AtomicBool::new(length == BodyLength::Known(0)));

    let tx = PipeSender {
      want_rx,
      delivered: delivered.clone(),
      data_tx,
      trailers_tx: Some(trailers_tx),
    };
    let rx = PipeBody {
      remaining: length,
      delivered,
      want_tx,
      data_rx,
      trailers_rx,
    };
    (tx, rx)
  }
}

impl Body for PipeBody {
  type Data = Bytes;
  type Error = ProxyError;

  fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
    self.want_tx.set(WANT_READY);

    if !self.data_rx.is_terminated() {
      if let Some(chunk) = ready!(Pin::new(&mut self.data_rx).poll_next(cx)?) {
        self.remaining.consume(chunk.len() as u64);
        if self.remaining == BodyLength::Known(0) {
          self.delivered.store(true, Ordering::Release);
        }
        return Poll::Ready(Some(Ok(Frame::data(chunk))));
      }
    }

    // trailers only after all data
    match ready!(Pin::new(&mut self.trailers_rx).poll(cx)) {
      Ok(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
      Err(_) => Poll::Ready(None),
    }
  }

  fn is_end_stream(&self) -> bool {
    self.remaining == BodyLength::Known(0)
  }

  fn size_hint(&self) -> SizeHint {
    match self.remaining {
      BodyLength::Known(len) => SizeHint::with_exact(len),
      BodyLength::Unknown => SizeHint::default(),
    }
  }
}

impl PipeSender {
  /// Check to see if this sender can send more data.
  pub(crate) fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<ProxyResult<()>> {
    ready!(self.poll_want(cx)?);
    self.data_tx.poll_ready(cx).map_err(|_| ProxyError::PipeBodyClosed)
  }

  fn poll_want(&mut self, cx: &mut Context<'_>) -> Poll<ProxyResult<()>> {
    match self.want_rx.load(cx) {
      WANT_READY => Poll::Ready(Ok(())),
      WANT_PENDING => Poll::Pending,
      _ => Poll::Ready(Err(ProxyError::PipeBodyClosed)),
    }
  }

  pub(crate) async fn ready(&mut self) -> ProxyResult<()> {
    poll_fn(|cx| self.poll_ready(cx)).await
  }

  /// True once the body handed out every byte of its known length
  pub(crate) fn is_delivered(&self) -> bool {
    self.delivered.load(Ordering::Acquire)
  }

  /// Resolves once the body half has been dropped
  pub(crate) async fn closed(&mut self) {
    poll_fn(|cx| match self.want_rx.load(cx) {
      want::CLOSED => Poll::Ready(()),
      _ => Poll::Pending,
    })
    .await
  }

  /// Send data once the body can take it.
  pub(crate) async fn send_data(&mut self, chunk: Bytes) -> ProxyResult<()> {
    self.ready().await?;
    self
      .data_tx
      .try_send(Ok(chunk))
      .map_err(|_| ProxyError::PipeBodyClosed)
  }

  /// Send trailers, which are emitted after the sender is dropped.
  pub(crate) fn send_trailers(&mut self, trailers: HeaderMap) -> ProxyResult<()> {
    let Some(tx) = self.trailers_tx.take() else {
      return Err(ProxyError::PipeBodyClosed);
    };
    tx.send(trailers).map_err(|_| ProxyError::PipeBodyClosed)
  }

  #[cfg(test)]
  fn try_send_data(&mut self, chunk: Bytes) -> Result<(), Bytes> {
    self
      .data_tx
      .try_send(Ok(chunk))
      .map_err(|err| err.into_inner().unwrap_or_default())
  }

  /// Terminates the body with an error so that the consumer does not see a clean end
  pub(crate) fn abort(mut self) {
    self.send_error(ProxyError::PipeBodyWriteAborted);
  }

  pub(crate) fn send_error(&mut self, err: ProxyError) {
    // clone so the send works even if buffer is full
    let _ = self.data_tx.clone().try_send(Err(err));
  }
}
