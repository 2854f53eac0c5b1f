//! Transient state for the assistant reply that is currently streaming.
//!
//! The reconciler is the only writer of the in-flight buffer. It never touches
//! committed messages: [`StreamingReconciler::complete`] hands the finished text
//! back to the caller, which commits it to the store.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::conversation::ConversationId;

#[derive(Debug)]
struct ActiveStream {
    stream_id: u64,
    conversation_id: ConversationId,
    buffer: String,
    cancel_token: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Streaming,
}

#[derive(Debug, Default)]
pub struct StreamingReconciler {
    current: Option<ActiveStream>,
    last_stream_id: u64,
}

impl StreamingReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> StreamPhase {
        if self.current.is_some() {
            StreamPhase::Streaming
        } else {
            StreamPhase::Idle
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_current(&self, stream_id: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|stream| stream.stream_id == stream_id)
    }

    /// Conversation the in-flight reply belongs to.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.current.as_ref().map(|stream| &stream.conversation_id)
    }

    /// Partial reply accumulated so far.
    pub fn buffer(&self) -> Option<&str> {
        self.current.as_ref().map(|stream| stream.buffer.as_str())
    }

    /// Starts a new stream with an empty buffer. Any stream still in flight is
    /// cancelled and its partial text dropped.
    pub fn begin(&mut self, conversation_id: ConversationId) -> (CancellationToken, u64) {
        self.cancel();

        self.last_stream_id += 1;
        let cancel_token = CancellationToken::new();
        debug!(
            stream_id = self.last_stream_id,
            conversation = %conversation_id,
            "stream started"
        );
        self.current = Some(ActiveStream {
            stream_id: self.last_stream_id,
            conversation_id,
            buffer: String::new(),
            cancel_token: cancel_token.clone(),
        });
        (cancel_token, self.last_stream_id)
    }

    /// Appends `chunk` to the buffer of stream `stream_id` and returns the
    /// accumulated text. Chunks from any other stream are ignored.
    pub fn push_chunk(&mut self, stream_id: u64, chunk: &str) -> Option<&str> {
        let stream = self
            .current
            .as_mut()
            .filter(|stream| stream.stream_id == stream_id)?;
        stream.buffer.push_str(chunk);
        Some(stream.buffer.as_str())
    }

    /// Ends stream `stream_id` successfully, returning the conversation and the
    /// final text to commit.
    pub fn complete(&mut self, stream_id: u64) -> Option<(ConversationId, String)> {
        if !self.is_current(stream_id) {
            return None;
        }
        let stream = self.current.take()?;
        debug!(
            stream_id,
            chars = stream.buffer.chars().count(),
            "stream completed"
        );
        Some((stream.conversation_id, stream.buffer))
    }

    /// Ends stream `stream_id` with an error. The partial text is discarded.
    pub fn fail(&mut self, stream_id: u64) -> Option<ConversationId> {
        if !self.is_current(stream_id) {
            return None;
        }
        let stream = self.current.take()?;
        debug!(
            stream_id,
            discarded_chars = stream.buffer.chars().count(),
            "stream failed"
        );
        Some(stream.conversation_id)
    }

    /// Aborts whatever is streaming. Returns the affected conversation.
    pub fn cancel(&mut self) -> Option<ConversationId> {
        let stream = self.current.take()?;
        stream.cancel_token.cancel();
        debug!(stream_id = stream.stream_id, "stream cancelled");
        Some(stream.conversation_id)
    }

    /// Aborts the in-flight stream only if it belongs to `conversation_id`.
    pub fn cancel_for(&mut self, conversation_id: &ConversationId) -> bool {
        if self.conversation_id() == Some(conversation_id) {
            self.cancel();
            true
        } else {
            false
        }
    }
}
