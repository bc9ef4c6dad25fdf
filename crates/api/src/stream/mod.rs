use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::ids::SessionId;
use crate::types::TurnRecord;

pub mod decoder;
mod worker;

pub use decoder::{DATA_PREFIX, FrameDecoder, StreamEvent};
pub(crate) use worker::{emit_error_event, forward_chunks};

pub type TurnWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Identifier for one streaming chat turn.
///
/// Must change on every send so events from an abandoned stream can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Routing key used for stale-event rejection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub session_id: SessionId,
    pub stream_id: StreamId,
}

impl StreamTarget {
    pub fn new(session_id: SessionId, stream_id: StreamId) -> Self {
        Self {
            session_id,
            stream_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStreamPayload {
    Scenario(String),
    Dialog(String),
    Complete(TurnRecord),
    Error(String),
}

impl From<StreamEvent> for TurnStreamPayload {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Scenario(text) => Self::Scenario(text),
            StreamEvent::Dialog(text) => Self::Dialog(text),
            StreamEvent::Complete(record) => Self::Complete(record),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnStreamEvent {
    pub target: StreamTarget,
    pub payload: TurnStreamPayload,
}

/// Receiving end of one turn stream. Dropping it cancels the worker.
pub struct TurnEventStream {
    target: StreamTarget,
    events: mpsc::UnboundedReceiver<TurnStreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct TurnStreamHandle {
    pub stream: TurnEventStream,
    pub worker: TurnWorker,
}

impl TurnEventStream {
    pub(crate) fn new(
        target: StreamTarget,
        events: mpsc::UnboundedReceiver<TurnStreamEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            target,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    pub async fn recv(&mut self) -> Option<TurnStreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TurnStreamEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for TurnEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

impl TurnStreamHandle {
    /// Builds a handle that decodes an arbitrary chunk stream.
    ///
    /// The returned worker must be spawned; it feeds every chunk through a [`FrameDecoder`]
    /// and forwards decoded events until `complete`, end-of-stream, an error or cancellation.
    pub fn from_chunks<S, B, E>(target: StreamTarget, chunks: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (event_tx, stream, mut cancel_rx) = make_event_stream(target.clone());
        let worker: TurnWorker = Box::pin(async move {
            forward_chunks(chunks, &target, &event_tx, &mut cancel_rx).await;
        });

        Self { stream, worker }
    }
}

pub fn make_event_stream(
    target: StreamTarget,
) -> (
    mpsc::UnboundedSender<TurnStreamEvent>,
    TurnEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        TurnEventStream::new(target, event_rx, cancel_tx),
        cancel_rx,
    )
}
