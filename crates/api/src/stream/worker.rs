use std::fmt;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use super::decoder::FrameDecoder;
use super::{StreamTarget, TurnStreamEvent, TurnStreamPayload};

pub(crate) const STREAM_ENDED_EARLY: &str = "stream ended before the turn completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForwardOutcome {
    Completed,
    Failed,
    Cancelled,
    ReceiverClosed,
}

pub(crate) fn emit_error_event(
    event_tx: &mpsc::UnboundedSender<TurnStreamEvent>,
    target: &StreamTarget,
    message: impl Into<String>,
) {
    let _ = event_tx.send(TurnStreamEvent {
        target: target.clone(),
        payload: TurnStreamPayload::Error(message.into()),
    });
}

/// Decodes `chunks` and forwards every event to `event_tx` in arrival order.
pub(crate) async fn forward_chunks<S, B, E>(
    chunks: S,
    target: &StreamTarget,
    event_tx: &mpsc::UnboundedSender<TurnStreamEvent>,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> ForwardOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut decoder = FrameDecoder::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut *cancel_rx => {
                tracing::debug!(
                    session_id = %target.session_id,
                    stream_id = target.stream_id.0,
                    "turn stream cancelled"
                );
                return ForwardOutcome::Cancelled;
            }
            next_chunk = chunks.next() => {
                match next_chunk {
                    Some(Ok(chunk)) => {
                        for event in decoder.push(chunk.as_ref()) {
                            let forwarded = event_tx.send(TurnStreamEvent {
                                target: target.clone(),
                                payload: event.into(),
                            });
                            if forwarded.is_err() {
                                return ForwardOutcome::ReceiverClosed;
                            }
                        }

                        if decoder.is_complete() {
                            tracing::debug!(
                                session_id = %target.session_id,
                                stream_id = target.stream_id.0,
                                malformed_frames = decoder.malformed_frames(),
                                "turn stream completed"
                            );
                            return ForwardOutcome::Completed;
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(
                            session_id = %target.session_id,
                            stream_id = target.stream_id.0,
                            error = %error,
                            "turn stream emitted a transport error"
                        );
                        emit_error_event(event_tx, target, format!("stream read failed: {error}"));
                        return ForwardOutcome::Failed;
                    }
                    None => return finish_stream(decoder, target, event_tx),
                }
            }
        }
    }
}

fn finish_stream(
    mut decoder: FrameDecoder,
    target: &StreamTarget,
    event_tx: &mpsc::UnboundedSender<TurnStreamEvent>,
) -> ForwardOutcome {
    if let Some(event) = decoder.finish() {
        let forwarded = event_tx.send(TurnStreamEvent {
            target: target.clone(),
            payload: event.into(),
        });
        if forwarded.is_err() {
            return ForwardOutcome::ReceiverClosed;
        }
    }

    if decoder.is_complete() {
        return ForwardOutcome::Completed;
    }

    tracing::warn!(
        session_id = %target.session_id,
        stream_id = target.stream_id.0,
        malformed_frames = decoder.malformed_frames(),
        "turn stream ended without a complete frame"
    );
    emit_error_event(event_tx, target, STREAM_ENDED_EARLY);
    ForwardOutcome::Failed
}
