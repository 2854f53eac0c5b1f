use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

use super::memory::RecordSet;
use super::persistence::{
    ConversationFilter, ConversationRecord, ConversationUpdate, MessageFilter, MessageRecord,
    Persistence, PersistenceError, SortOrder,
};
use crate::core::conversation::ConversationId;
use crate::core::message::MessageId;

/// Persistence backed by a single JSON document on disk.
///
/// Every acknowledged write has already been flushed: the whole record set is
/// serialized to a temp file next to the target and atomically renamed over it.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    records: Mutex<RecordSet>,
}

impl JsonFileBackend {
    /// Opens (or starts) the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let records = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|err| {
                PersistenceError::Unavailable(format!("failed to read {}: {err}", path.display()))
            })?;
            if contents.trim().is_empty() {
                RecordSet::default()
            } else {
                serde_json::from_str(&contents).map_err(|err| {
                    PersistenceError::Unavailable(format!(
                        "failed to parse {}: {err}",
                        path.display()
                    ))
                })?
            }
        } else {
            RecordSet::default()
        };

        debug!(
            path = %path.display(),
            conversations = records.conversations.len(),
            messages = records.messages.len(),
            "opened conversation store"
        );

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Applies `f` to a copy of the records and only keeps the result once it
    /// has been written to disk.
    fn mutate(
        &self,
        f: impl FnOnce(&mut RecordSet) -> Result<(), PersistenceError>,
    ) -> Result<(), PersistenceError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| PersistenceError::Unavailable("record lock poisoned".to_string()))?;
        let mut next = guard.clone();
        f(&mut next)?;
        write_atomically(&self.path, &next)?;
        *guard = next;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&RecordSet) -> T) -> Result<T, PersistenceError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| PersistenceError::Unavailable("record lock poisoned".to_string()))?;
        Ok(f(&guard))
    }
}

fn write_atomically(path: &Path, records: &RecordSet) -> Result<(), PersistenceError> {
    let io_error =
        |err: std::io::Error| PersistenceError::Unavailable(format!("{}: {err}", path.display()));

    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir).map_err(io_error)?;
    }

    let contents = serde_json::to_string_pretty(records)
        .map_err(|err| PersistenceError::Rejected(format!("failed to encode records: {err}")))?;

    let mut temp_file = match parent {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new_in("."),
    }
    .map_err(io_error)?;
    temp_file
        .write_all(contents.as_bytes())
        .map_err(io_error)?;
    temp_file.as_file_mut().sync_all().map_err(io_error)?;
    temp_file
        .persist(path)
        .map_err(|err| io_error(err.error))?;
    Ok(())
}

#[async_trait]
impl Persistence for JsonFileBackend {
    async fn create_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<(), PersistenceError> {
        self.mutate(|records| records.create_conversation(record))
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<(), PersistenceError> {
        self.mutate(|records| records.update_conversation(id, update))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), PersistenceError> {
        self.mutate(|records| records.delete_conversation(id))
    }

    async fn create_message(&self, record: &MessageRecord) -> Result<(), PersistenceError> {
        self.mutate(|records| records.create_message(record))
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), PersistenceError> {
        self.mutate(|records| records.delete_message(id))
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationRecord>, PersistenceError> {
        self.read(|records| records.list_conversations(filter, order, limit))
    }

    async fn list_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> Result<Vec<MessageRecord>, PersistenceError> {
        self.read(|records| records.list_messages(filter, order))
    }
}
