use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::time::Duration;

use super::completion::{ChunkStream, Completion, CompletionError, CompletionRequest};

/// Offline completion backend that answers every prompt with a canned reply
/// quoting the latest user message, streamed one word at a time.
#[derive(Debug, Clone, Default)]
pub struct EchoCompletion {
    chunk_delay: Option<Duration>,
}

impl EchoCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between chunks, to make the reply visibly stream.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay).filter(|delay| !delay.is_zero());
        self
    }

    pub fn reply_for(prompt: &str) -> String {
        format!(
            "This is an offline demo reply. You said: \"{prompt}\"\n\n\
             Connect a completion backend to get real answers."
        )
    }
}

/// Splits `text` into word chunks that concatenate back to `text`.
fn word_chunks(text: &str) -> Vec<String> {
    text.split_inclusive(char::is_whitespace)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Completion for EchoCompletion {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, CompletionError> {
        let prompt = request
            .history
            .iter()
            .rev()
            .find(|turn| turn.role.is_user())
            .map(|turn| turn.content.clone())
            .ok_or_else(|| {
                CompletionError::Rejected("history contains no user message".to_string())
            })?;

        let mut chunks = word_chunks(&Self::reply_for(&prompt));
        if let Some(limit) = request.max_output_tokens {
            chunks.truncate(limit as usize);
        }

        let chunks = stream::iter(chunks.into_iter().map(Ok::<String, CompletionError>));
        match self.chunk_delay {
            Some(delay) => Ok(chunks
                .then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    chunk
                })
                .boxed()),
            None => Ok(chunks.boxed()),
        }
    }
}
