use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::completion::{Completion, CompletionError, CompletionRequest};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Chunk(String),
    Error(CompletionError),
    End,
}

pub struct StreamParams {
    pub completion: Arc<dyn Completion>,
    pub request: CompletionRequest,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
    /// Longest wait tolerated for the stream to start or between two chunks.
    pub idle_timeout: Option<Duration>,
}

/// Runs completion streams on background tasks and funnels their output into
/// a single channel tagged with the stream id.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                completion,
                request,
                cancel_token,
                stream_id,
                idle_timeout,
            } = params;

            tokio::select! {
                _ = forward_chunks(completion, request, idle_timeout, &tx, stream_id) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }
}

async fn forward_chunks(
    completion: Arc<dyn Completion>,
    request: CompletionRequest,
    idle_timeout: Option<Duration>,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) {
    let started = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, completion.stream_completion(request))
            .await
            .unwrap_or(Err(CompletionError::Timeout(limit))),
        None => completion.stream_completion(request).await,
    };
    let mut stream = match started {
        Ok(stream) => stream,
        Err(err) => {
            warn!(stream_id, error = %err, "completion request failed");
            let _ = tx.send((StreamMessage::Error(err), stream_id));
            let _ = tx.send((StreamMessage::End, stream_id));
            return;
        }
    };

    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(CompletionError::Timeout(limit))),
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(chunk)) => {
                if tx.send((StreamMessage::Chunk(chunk), stream_id)).is_err() {
                    return;
                }
            }
            Some(Err(err)) => {
                warn!(stream_id, error = %err, "completion stream failed");
                let _ = tx.send((StreamMessage::Error(err), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
            None => {
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
        }
    }
}
