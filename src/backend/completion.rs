//! Streaming completion contract.

use async_trait::async_trait;
use futures_util::Stream;
use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use crate::core::message::Role;

/// One prior turn as the completion backend sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub history: Vec<ChatTurn>,
    pub model: String,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The request could not be started.
    Unavailable(String),
    /// The backend refused the request.
    Rejected(String),
    /// The stream broke after it had started.
    Interrupted(String),
    /// The stream did not start, or went quiet, within the configured idle limit.
    Timeout(Duration),
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::Unavailable(reason) => {
                write!(f, "completion service unavailable: {reason}")
            }
            CompletionError::Rejected(reason) => write!(f, "completion request rejected: {reason}"),
            CompletionError::Interrupted(reason) => {
                write!(f, "response stream interrupted: {reason}")
            }
            CompletionError::Timeout(limit) => write!(
                f,
                "no response from the completion service for more than {}s",
                limit.as_secs_f32()
            ),
        }
    }
}

impl Error for CompletionError {}

/// Text chunks in delivery order. Ends after the last chunk or after the first
/// error.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

#[async_trait]
pub trait Completion: Send + Sync {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, CompletionError>;
}
