use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use super::persistence::{
    ConversationFilter, ConversationRecord, ConversationUpdate, MessageFilter, MessageRecord,
    Persistence, PersistenceError, SortOrder,
};
use crate::core::conversation::ConversationId;
use crate::core::message::MessageId;

/// Plain collection of persisted records shared by the in-process backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSet {
    #[serde(default)]
    pub conversations: Vec<ConversationRecord>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

impl RecordSet {
    pub fn create_conversation(
        &mut self,
        record: &ConversationRecord,
    ) -> Result<(), PersistenceError> {
        if self.conversations.iter().any(|c| c.id == record.id) {
            return Err(PersistenceError::Rejected(format!(
                "conversation {} already exists",
                record.id
            )));
        }
        self.conversations.push(record.clone());
        Ok(())
    }

    pub fn update_conversation(
        &mut self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<(), PersistenceError> {
        let record = self
            .conversations
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| PersistenceError::NotFound(format!("conversation {id}")))?;
        if let Some(title) = &update.title {
            record.title = title.clone();
        }
        record.updated_at = update.updated_at;
        Ok(())
    }

    pub fn delete_conversation(&mut self, id: &ConversationId) -> Result<(), PersistenceError> {
        let before = self.conversations.len();
        self.conversations.retain(|c| &c.id != id);
        if self.conversations.len() == before {
            return Err(PersistenceError::NotFound(format!("conversation {id}")));
        }
        self.messages.retain(|m| &m.conversation_id != id);
        Ok(())
    }

    pub fn create_message(&mut self, record: &MessageRecord) -> Result<(), PersistenceError> {
        if !self
            .conversations
            .iter()
            .any(|c| c.id == record.conversation_id)
        {
            return Err(PersistenceError::NotFound(format!(
                "conversation {}",
                record.conversation_id
            )));
        }
        if self.messages.iter().any(|m| m.id == record.id) {
            return Err(PersistenceError::Rejected(format!(
                "message {} already exists",
                record.id
            )));
        }
        self.messages.push(record.clone());
        Ok(())
    }

    pub fn delete_message(&mut self, id: &MessageId) -> Result<(), PersistenceError> {
        let before = self.messages.len();
        self.messages.retain(|m| &m.id != id);
        if self.messages.len() == before {
            return Err(PersistenceError::NotFound(format!("message {id}")));
        }
        Ok(())
    }

    pub fn list_conversations(
        &self,
        filter: &ConversationFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Vec<ConversationRecord> {
        let mut matching: Vec<ConversationRecord> = self
            .conversations
            .iter()
            .filter(|c| c.owner == filter.owner)
            .cloned()
            .collect();
        matching.sort_by(|a, b| match order {
            SortOrder::Ascending => a.updated_at.cmp(&b.updated_at),
            SortOrder::Descending => b.updated_at.cmp(&a.updated_at),
        });
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        matching
    }

    pub fn list_messages(&self, filter: &MessageFilter, order: SortOrder) -> Vec<MessageRecord> {
        let mut matching: Vec<MessageRecord> = self
            .messages
            .iter()
            .filter(|m| m.conversation_id == filter.conversation_id)
            .cloned()
            .collect();
        // Messages appended within the same clock tick keep insertion order.
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if order == SortOrder::Descending {
            matching.reverse();
        }
        matching
    }
}

/// Persistence kept entirely in process memory. Used for `--ephemeral`
/// sessions and as the default test backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<RecordSet>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything currently stored.
    pub fn snapshot(&self) -> Result<RecordSet, PersistenceError> {
        self.with(|records| Ok(records.clone()))
    }

    fn with<T>(
        &self,
        f: impl FnOnce(&mut RecordSet) -> Result<T, PersistenceError>,
    ) -> Result<T, PersistenceError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| PersistenceError::Unavailable("record lock poisoned".to_string()))?;
        f(&mut guard)
    }
}

#[async_trait]
impl Persistence for MemoryBackend {
    async fn create_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<(), PersistenceError> {
        self.with(|records| records.create_conversation(record))
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<(), PersistenceError> {
        self.with(|records| records.update_conversation(id, update))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), PersistenceError> {
        self.with(|records| records.delete_conversation(id))
    }

    async fn create_message(&self, record: &MessageRecord) -> Result<(), PersistenceError> {
        self.with(|records| records.create_message(record))
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), PersistenceError> {
        self.with(|records| records.delete_message(id))
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationRecord>, PersistenceError> {
        self.with(|records| Ok(records.list_conversations(filter, order, limit)))
    }

    async fn list_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> Result<Vec<MessageRecord>, PersistenceError> {
        self.with(|records| Ok(records.list_messages(filter, order)))
    }
}
