//! Capabilities the chat session depends on, plus the implementations that ship
//! with the binary.
//!
//! - [`persistence`]: remote conversation/message storage.
//! - [`completion`]: streamed assistant replies.
//! - [`identity`]: the signed-in user and its change notifications.

pub mod completion;
pub mod echo;
pub mod identity;
pub mod json_file;
pub mod local_identity;
pub mod memory;
pub mod persistence;

pub use completion::{ChatTurn, ChunkStream, Completion, CompletionError, CompletionRequest};
pub use echo::EchoCompletion;
pub use identity::{Identity, IdentityError, UserIdentity};
pub use json_file::JsonFileBackend;
pub use local_identity::LocalIdentity;
pub use memory::{MemoryBackend, RecordSet};
pub use persistence::{
    ConversationFilter, ConversationRecord, ConversationUpdate, MessageFilter, MessageRecord,
    Persistence, PersistenceError, SortOrder,
};
