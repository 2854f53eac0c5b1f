//! The chat session: conversation store, streaming reconciler and the three
//! backend capabilities wired together.
//!
//! Every mutation is applied to the local store first and then mirrored to
//! persistence. Remote failures never roll local state back; they mark the
//! entity [`SyncStatus::Failed`] and queue a notification instead.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::backend::completion::{Completion, CompletionError, CompletionRequest};
use crate::backend::identity::{Identity, IdentityError, UserIdentity};
use crate::backend::persistence::{
    ConversationFilter, ConversationUpdate, MessageFilter, Persistence, PersistenceError,
    SortOrder,
};
use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::conversation::{Conversation, ConversationId};
use crate::core::message::{MessageId, Role, SyncStatus};
use crate::core::notification::Notification;
use crate::core::reconciler::StreamingReconciler;
use crate::core::store::{ConversationStore, UnsyncedEntity};
use crate::utils::logging::TranscriptLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub model: String,
    pub max_output_tokens: Option<u32>,
    pub persistence_timeout: Option<Duration>,
    pub stream_idle_timeout: Option<Duration>,
    /// Upper bound on conversations loaded at sign-in.
    pub conversation_limit: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: "echo".to_string(),
            max_output_tokens: None,
            persistence_timeout: Some(Duration::from_secs(10)),
            stream_idle_timeout: Some(Duration::from_secs(60)),
            conversation_limit: Some(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation needs a signed-in user.
    SignedOut,
    UnknownConversation(ConversationId),
    Identity(IdentityError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::SignedOut => write!(f, "not signed in; use /login first"),
            SessionError::UnknownConversation(id) => write!(f, "no conversation with id {id}"),
            SessionError::Identity(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Identity(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdentityError> for SessionError {
    fn from(err: IdentityError) -> Self {
        SessionError::Identity(err)
    }
}

/// What `send_message` started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub stream_id: u64,
}

/// Observable effect of one message from the completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// A chunk was appended to the in-flight reply.
    Partial { chunk: String },
    /// The reply finished and was committed as a message.
    Committed {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// The reply failed. Nothing was committed.
    Failed(CompletionError),
}

async fn bounded<T, F>(limit: Option<Duration>, call: F) -> Result<T, PersistenceError>
where
    F: Future<Output = Result<T, PersistenceError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(PersistenceError::Timeout(limit))),
        None => call.await,
    }
}

pub struct ChatSession {
    store: ConversationStore,
    reconciler: StreamingReconciler,
    persistence: Arc<dyn Persistence>,
    completion: Arc<dyn Completion>,
    identity: Arc<dyn Identity>,
    identity_rx: watch::Receiver<Option<UserIdentity>>,
    user: Option<UserIdentity>,
    stream_service: ChatStreamService,
    stream_rx: mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    notifications: VecDeque<Notification>,
    transcript: TranscriptLog,
    options: SessionOptions,
}

impl ChatSession {
    /// Builds a session over the given capabilities. If the identity already
    /// has a user, call [`ChatSession::hydrate`] to load their conversations.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        completion: Arc<dyn Completion>,
        identity: Arc<dyn Identity>,
        options: SessionOptions,
    ) -> Self {
        let mut identity_rx = identity.subscribe();
        identity_rx.borrow_and_update();
        let user = identity.current_user();
        let (stream_service, stream_rx) = ChatStreamService::new();

        Self {
            store: ConversationStore::new(),
            reconciler: StreamingReconciler::new(),
            persistence,
            completion,
            identity,
            identity_rx,
            user,
            stream_service,
            stream_rx,
            notifications: VecDeque::new(),
            transcript: TranscriptLog::new(),
            options,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut TranscriptLog {
        &mut self.transcript
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.store.active()
    }

    fn require_user(&mut self) -> Result<String, SessionError> {
        self.check_identity();
        self.user
            .as_ref()
            .map(|user| user.id.clone())
            .ok_or(SessionError::SignedOut)
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    pub fn unsynced(&self) -> Vec<UnsyncedEntity> {
        self.store.unsynced()
    }

    pub async fn login(&mut self) -> Result<UserIdentity, SessionError> {
        let user = self.identity.login().await?;
        self.apply_identity(Some(user.clone())).await;
        Ok(user)
    }

    pub async fn logout(&mut self) -> Result<(), SessionError> {
        self.identity.logout().await?;
        self.apply_identity(None).await;
        Ok(())
    }

    /// Picks up identity changes made outside this session. Returns true if
    /// the signed-in user changed.
    pub async fn sync_identity(&mut self) -> bool {
        if !self.identity_rx.has_changed().unwrap_or(false) {
            return false;
        }
        let user = self.identity_rx.borrow_and_update().clone();
        self.apply_identity(user).await
    }

    /// Drops local state as soon as the identity capability stops reporting
    /// the cached user. A newly signed-in user is loaded by `sync_identity`.
    fn check_identity(&mut self) {
        if !self.identity_rx.has_changed().unwrap_or(false) {
            return;
        }
        let current = self.identity_rx.borrow().as_ref().map(|user| user.id.clone());
        let cached = self.user.as_ref().map(|user| user.id.as_str());
        if current.as_deref() == cached {
            return;
        }

        info!("identity no longer matches; local conversations cleared");
        self.reconciler.cancel();
        self.store.clear();
        self.user = None;
    }

    async fn apply_identity(&mut self, user: Option<UserIdentity>) -> bool {
        self.identity_rx.borrow_and_update();

        let previous = self.user.as_ref().map(|user| user.id.as_str());
        if previous == user.as_ref().map(|user| user.id.as_str()) {
            self.user = user;
            return false;
        }

        self.reconciler.cancel();
        self.store.clear();
        self.user = user;

        match &self.user {
            Some(user) => {
                info!(user = %user.id, "identity changed; loading conversations");
                self.hydrate().await.is_ok()
            }
            None => {
                info!("signed out; local conversations cleared");
                true
            }
        }
    }

    /// Replaces the store with the signed-in user's conversations, newest
    /// first. A failed listing leaves the store empty and queues a
    /// notification. Returns the number of conversations loaded.
    pub async fn hydrate(&mut self) -> Result<usize, SessionError> {
        let owner = self.require_user()?;
        let limit = self.options.persistence_timeout;
        self.reconciler.cancel();
        self.store.clear();

        let filter = ConversationFilter { owner };
        let listed = bounded(
            limit,
            self.persistence.list_conversations(
                &filter,
                SortOrder::Descending,
                self.options.conversation_limit,
            ),
        )
        .await;
        let records = match listed {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "listing conversations failed");
                self.notify(Notification::error(format!(
                    "Could not load conversations: {err}"
                )));
                return Ok(0);
            }
        };

        let mut loaded = Vec::with_capacity(records.len());
        for record in records {
            let filter = MessageFilter {
                conversation_id: record.id.clone(),
            };
            let listed = bounded(
                limit,
                self.persistence.list_messages(&filter, SortOrder::Ascending),
            )
            .await;
            match listed {
                Ok(messages) => loaded.push(Conversation::from_records(record, messages)),
                Err(err) => {
                    warn!(conversation = %record.id, error = %err, "listing messages failed");
                    self.notify(Notification::error(format!(
                        "Could not load conversations: {err}"
                    )));
                    return Ok(0);
                }
            }
        }

        let count = loaded.len();
        for conversation in loaded {
            self.store.insert_loaded(conversation);
        }
        info!(count, "conversations loaded");
        Ok(count)
    }

    /// Creates an empty conversation, makes it active and mirrors it remotely.
    pub async fn create_conversation(&mut self) -> Result<ConversationId, SessionError> {
        let owner = self.require_user()?;
        let id = self.store.create_conversation();
        self.cancel_inactive_stream();
        debug!(conversation = %id, "conversation created");

        let record = match self.store.get(&id) {
            Some(conversation) => conversation.to_record(&owner),
            None => return Err(SessionError::UnknownConversation(id)),
        };
        let result = bounded(
            self.options.persistence_timeout,
            self.persistence.create_conversation(&record),
        )
        .await;
        self.settle_conversation(&id, result, "save the new conversation");
        Ok(id)
    }

    /// Makes `id` active. Unknown ids are ignored. A reply still streaming
    /// into another conversation is cancelled.
    pub fn select_conversation(&mut self, id: &ConversationId) -> bool {
        if !self.store.select(id) {
            return false;
        }
        self.cancel_inactive_stream();
        true
    }

    /// Removes the conversation locally and remotely. Returns false if it did
    /// not exist.
    pub async fn delete_conversation(&mut self, id: &ConversationId) -> Result<bool, SessionError> {
        self.require_user()?;
        self.reconciler.cancel_for(id);
        if self.store.delete(id).is_none() {
            return Ok(false);
        }
        debug!(conversation = %id, "conversation deleted");

        let result = bounded(
            self.options.persistence_timeout,
            self.persistence.delete_conversation(id),
        )
        .await;
        if let Err(err) = result {
            warn!(conversation = %id, error = %err, "remote delete failed");
            self.notify(Notification::error(format!(
                "Could not delete the conversation remotely: {err}"
            )));
        }
        Ok(true)
    }

    /// Appends a message, updating the title on the first append, and mirrors
    /// both the message and the conversation's new timestamp remotely.
    pub async fn append_message(
        &mut self,
        conversation_id: &ConversationId,
        role: Role,
        content: impl Into<String>,
    ) -> Result<MessageId, SessionError> {
        self.require_user()?;
        let appended = self
            .store
            .append_message(conversation_id, role, content)
            .ok_or_else(|| SessionError::UnknownConversation(conversation_id.clone()))?;
        let message_id = appended.message.id.clone();

        if let Err(err) = self.transcript.log_message(&appended.message) {
            warn!(error = %err, "transcript write failed");
            self.notify(Notification::warning(format!("Transcript logging failed: {err}")));
        }

        let record = match self.store.get(conversation_id) {
            Some(conversation) => conversation.message_record(&appended.message),
            None => return Err(SessionError::UnknownConversation(conversation_id.clone())),
        };
        let limit = self.options.persistence_timeout;

        let result = bounded(limit, self.persistence.create_message(&record)).await;
        match result {
            Ok(()) => self
                .store
                .mark_message(conversation_id, &message_id, SyncStatus::Synced),
            Err(err) => {
                warn!(message = %message_id, error = %err, "saving message failed");
                self.store
                    .mark_message(conversation_id, &message_id, SyncStatus::Failed);
                self.notify(Notification::error(format!("Could not save message: {err}")));
            }
        }

        let update = ConversationUpdate {
            title: appended.title,
            updated_at: appended.updated_at,
        };
        let result = bounded(
            limit,
            self.persistence.update_conversation(conversation_id, &update),
        )
        .await;
        self.settle_conversation(conversation_id, result, "update the conversation");

        Ok(message_id)
    }

    fn settle_conversation(
        &mut self,
        id: &ConversationId,
        result: Result<(), PersistenceError>,
        action: &str,
    ) {
        match result {
            Ok(()) => self.store.mark_conversation(id, SyncStatus::Synced),
            Err(err) => {
                warn!(conversation = %id, error = %err, "failed to {action}");
                self.store.mark_conversation(id, SyncStatus::Failed);
                self.notify(Notification::error(format!("Could not {action}: {err}")));
            }
        }
    }

    /// Returns the active conversation, creating one first if none is active.
    pub async fn ensure_conversation(&mut self) -> Result<ConversationId, SessionError> {
        match self.store.active_id() {
            Some(id) => Ok(id.clone()),
            None => self.create_conversation().await,
        }
    }

    /// Sends `input` as a user message in the active conversation and starts
    /// streaming the reply. Blank input does nothing. A reply still in flight
    /// is cancelled and replaced.
    pub async fn send_message(&mut self, input: &str) -> Result<Option<Submitted>, SessionError> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        self.require_user()?;

        if self.reconciler.cancel().is_some() {
            info!("reply in flight replaced by a new message");
        }

        let conversation_id = self.ensure_conversation().await?;
        let message_id = self
            .append_message(&conversation_id, Role::User, input)
            .await?;
        let stream_id = self.start_stream(conversation_id.clone())?;

        Ok(Some(Submitted {
            conversation_id,
            message_id,
            stream_id,
        }))
    }

    /// Replaces the trailing assistant reply with a fresh one. Does nothing
    /// unless the conversation ends with a user message followed by an
    /// assistant message.
    pub async fn regenerate(
        &mut self,
        conversation_id: &ConversationId,
    ) -> Result<Option<u64>, SessionError> {
        self.require_user()?;
        let Some(target) = self.store.regenerate_target(conversation_id) else {
            return Ok(None);
        };

        self.store.remove_last_message(conversation_id);
        debug!(conversation = %conversation_id, message = %target, "regenerating reply");

        let result = bounded(
            self.options.persistence_timeout,
            self.persistence.delete_message(&target),
        )
        .await;
        if let Err(err) = result {
            warn!(message = %target, error = %err, "remote message delete failed");
            self.notify(Notification::error(format!(
                "Could not delete the previous reply remotely: {err}"
            )));
        }

        self.start_stream(conversation_id.clone()).map(Some)
    }

    fn start_stream(&mut self, conversation_id: ConversationId) -> Result<u64, SessionError> {
        let history = self
            .store
            .get(&conversation_id)
            .map(Conversation::history)
            .ok_or_else(|| SessionError::UnknownConversation(conversation_id.clone()))?;

        let (cancel_token, stream_id) = self.reconciler.begin(conversation_id);
        self.stream_service.spawn_stream(StreamParams {
            completion: Arc::clone(&self.completion),
            request: CompletionRequest {
                history,
                model: self.options.model.clone(),
                max_output_tokens: self.options.max_output_tokens,
            },
            cancel_token,
            stream_id,
            idle_timeout: self.options.stream_idle_timeout,
        });
        Ok(stream_id)
    }

    fn cancel_inactive_stream(&mut self) {
        let streaming_elsewhere = self
            .reconciler
            .conversation_id()
            .is_some_and(|id| Some(id) != self.store.active_id());
        if streaming_elsewhere {
            self.reconciler.cancel();
        }
    }

    /// Aborts the reply in flight, dropping its partial text. Returns false if
    /// nothing was streaming.
    pub fn cancel_stream(&mut self) -> bool {
        self.reconciler.cancel().is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.reconciler.is_streaming()
    }

    /// Partial text of the reply in flight.
    pub fn streaming_text(&self) -> Option<&str> {
        self.reconciler.buffer()
    }

    /// Waits for the next change to the reply in flight. Returns `None` once
    /// nothing is streaming.
    pub async fn next_stream_update(&mut self) -> Option<StreamUpdate> {
        while self.reconciler.is_streaming() {
            let (message, stream_id) = self.stream_rx.recv().await?;
            self.check_identity();
            if let Some(update) = self.apply_stream_message(message, stream_id).await {
                return Some(update);
            }
        }
        None
    }

    /// Drives the reply in flight to its end.
    pub async fn finish_stream(&mut self) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = self.next_stream_update().await {
            updates.push(update);
        }
        updates
    }

    async fn apply_stream_message(
        &mut self,
        message: StreamMessage,
        stream_id: u64,
    ) -> Option<StreamUpdate> {
        match message {
            StreamMessage::Chunk(chunk) => {
                self.reconciler.push_chunk(stream_id, &chunk)?;
                Some(StreamUpdate::Partial { chunk })
            }
            StreamMessage::Error(err) => {
                self.reconciler.fail(stream_id)?;
                self.notify(Notification::error(format!("Response failed: {err}")));
                Some(StreamUpdate::Failed(err))
            }
            StreamMessage::End => {
                let (conversation_id, text) = self.reconciler.complete(stream_id)?;
                match self
                    .append_message(&conversation_id, Role::Assistant, text)
                    .await
                {
                    Ok(message_id) => Some(StreamUpdate::Committed {
                        conversation_id,
                        message_id,
                    }),
                    Err(err) => {
                        warn!(
                            conversation = %conversation_id,
                            error = %err,
                            "reply could not be committed"
                        );
                        self.notify(Notification::error(format!("Reply was dropped: {err}")));
                        None
                    }
                }
            }
        }
    }

    /// Content of the most recent assistant message in `conversation_id`.
    pub fn last_assistant_message(&self, conversation_id: &ConversationId) -> Option<&str> {
        self.store
            .get(conversation_id)?
            .last_assistant_message()
            .map(|message| message.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::completion::ChatTurn;
    use crate::core::conversation::DEFAULT_TITLE;
    use crate::utils::test_utils::{signed_in_session, signed_out_session, ScriptedCompletion};

    fn contents(session: &ChatSession, id: &ConversationId) -> Vec<(Role, String)> {
        session
            .store()
            .get(id)
            .expect("conversation")
            .messages
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn first_message_creates_conversation_and_commits_reply() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["Hey", " there"])).await;
        let session = &mut test.session;
        assert!(session.active_conversation().is_none());

        let submitted = session
            .send_message("Hi")
            .await
            .expect("send")
            .expect("submitted");

        assert_eq!(session.store().len(), 1);
        let conversation = session.active_conversation().expect("active");
        assert_eq!(conversation.id, submitted.conversation_id);
        assert_eq!(conversation.title, "Hi");

        let updates = session.finish_stream().await;
        assert!(matches!(
            updates.last(),
            Some(StreamUpdate::Committed { conversation_id, .. })
                if conversation_id == &submitted.conversation_id
        ));

        assert_eq!(
            test.completion.requests()[0].history,
            vec![ChatTurn::new(Role::User, "Hi")]
        );
        assert_eq!(
            contents(&test.session, &submitted.conversation_id),
            vec![
                (Role::User, "Hi".to_string()),
                (Role::Assistant, "Hey there".to_string()),
            ]
        );
        assert!(test.session.unsynced().is_empty());
    }

    #[tokio::test]
    async fn buffer_grows_with_each_chunk() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["A", "B", "C"])).await;
        let session = &mut test.session;
        let submitted = session.send_message("go").await.expect("send").expect("submitted");

        let mut observed = Vec::new();
        while let Some(update) = session.next_stream_update().await {
            match update {
                StreamUpdate::Partial { .. } => {
                    observed.push(session.streaming_text().expect("streaming").to_string())
                }
                StreamUpdate::Committed { .. } => break,
                StreamUpdate::Failed(err) => panic!("unexpected failure: {err}"),
            }
        }

        assert_eq!(observed, vec!["A", "AB", "ABC"]);
        assert!(session.streaming_text().is_none());
        assert_eq!(
            session.last_assistant_message(&submitted.conversation_id),
            Some("ABC")
        );
    }

    #[tokio::test]
    async fn stream_error_discards_partial_reply() {
        let err = CompletionError::Interrupted("reset".to_string());
        let mut test =
            signed_in_session(ScriptedCompletion::chunks(["A", "B"]).then_fail(err.clone())).await;
        let session = &mut test.session;
        let submitted = session.send_message("go").await.expect("send").expect("submitted");

        let updates = session.finish_stream().await;
        assert_eq!(updates.last(), Some(&StreamUpdate::Failed(err)));
        assert!(!session.is_streaming());
        assert!(session.streaming_text().is_none());
        assert_eq!(
            contents(session, &submitted.conversation_id),
            vec![(Role::User, "go".to_string())]
        );

        let notifications = session.drain_notifications();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].text.contains("reset"));
    }

    #[tokio::test]
    async fn empty_reply_still_commits_one_message() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(Vec::<String>::new())).await;
        let session = &mut test.session;
        let submitted = session.send_message("go").await.expect("send").expect("submitted");

        session.finish_stream().await;
        assert_eq!(
            contents(session, &submitted.conversation_id),
            vec![
                (Role::User, "go".to_string()),
                (Role::Assistant, String::new()),
            ]
        );
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"])).await;
        assert_eq!(test.session.send_message("   \n").await, Ok(None));
        assert!(test.session.store().is_empty());
        assert!(test.completion.requests().is_empty());
    }

    #[tokio::test]
    async fn regenerate_replaces_the_trailing_reply() {
        let completion = ScriptedCompletion::chunks(["first"]).followed_by(["Hel", "lo"]);
        let mut test = signed_in_session(completion).await;
        let session = &mut test.session;
        let submitted = session.send_message("Hi").await.expect("send").expect("submitted");
        session.finish_stream().await;
        let id = submitted.conversation_id;

        let stream_id = session.regenerate(&id).await.expect("regenerate");
        assert!(stream_id.is_some());
        assert_eq!(contents(session, &id), vec![(Role::User, "Hi".to_string())]);

        session.finish_stream().await;
        assert_eq!(
            contents(session, &id),
            vec![
                (Role::User, "Hi".to_string()),
                (Role::Assistant, "Hello".to_string()),
            ]
        );

        let requests = test.completion.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].history, vec![ChatTurn::new(Role::User, "Hi")]);

        let stored = test.persistence.inner().snapshot().expect("snapshot");
        let assistant: Vec<&str> = stored
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(assistant, vec!["Hello"]);
    }

    #[tokio::test]
    async fn regenerate_without_a_trailing_pair_is_a_no_op() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"])).await;
        let session = &mut test.session;
        let id = session.create_conversation().await.expect("create");

        assert_eq!(session.regenerate(&id).await, Ok(None));

        session
            .append_message(&id, Role::User, "question")
            .await
            .expect("append");
        assert_eq!(session.regenerate(&id).await, Ok(None));
        assert_eq!(
            contents(session, &id),
            vec![(Role::User, "question".to_string())]
        );
        assert!(test.completion.requests().is_empty());
        assert!(session.drain_notifications().is_empty());
    }

    #[tokio::test]
    async fn persistence_failures_keep_local_state_and_notify() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["ok"])).await;
        test.persistence.set_failing(true);
        let session = &mut test.session;

        let id = session.create_conversation().await.expect("create");
        assert!(session.store().contains(&id));
        assert_eq!(session.store().get(&id).map(|c| c.sync), Some(SyncStatus::Failed));

        let message_id = session
            .append_message(&id, Role::User, "kept")
            .await
            .expect("append");
        let message = session
            .store()
            .get(&id)
            .and_then(|c| c.message(&message_id))
            .expect("message");
        assert_eq!(message.sync, SyncStatus::Failed);
        assert_eq!(session.unsynced().len(), 2);

        let notifications = session.drain_notifications();
        assert_eq!(notifications.len(), 3);
        assert!(notifications
            .iter()
            .all(|n| n.text.contains("injected failure")));
    }

    #[tokio::test]
    async fn stalled_persistence_times_out() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["ok"])).await;
        test.persistence.set_stalled(true);
        let session = &mut test.session;

        let id = session.create_conversation().await.expect("create");
        assert_eq!(session.store().get(&id).map(|c| c.sync), Some(SyncStatus::Failed));
        let notifications = session.drain_notifications();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].text.contains("did not respond"));
    }

    #[tokio::test]
    async fn create_then_delete_leaves_nothing_selected() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"])).await;
        let session = &mut test.session;
        let id = session.create_conversation().await.expect("create");

        assert_eq!(session.delete_conversation(&id).await, Ok(true));
        assert!(session.store().is_empty());
        assert!(session.active_conversation().is_none());
        assert!(test
            .persistence
            .inner()
            .snapshot()
            .expect("snapshot")
            .conversations
            .is_empty());

        assert_eq!(test.session.delete_conversation(&id).await, Ok(false));
    }

    #[tokio::test]
    async fn signed_out_sessions_refuse_gated_operations() {
        let mut test = signed_out_session(ScriptedCompletion::chunks(["x"]));
        let session = &mut test.session;

        assert_eq!(session.send_message("Hi").await, Err(SessionError::SignedOut));
        assert_eq!(session.create_conversation().await, Err(SessionError::SignedOut));
        assert!(session.store().is_empty());
        assert!(test.completion.requests().is_empty());
    }

    #[tokio::test]
    async fn switching_conversations_cancels_the_stream() {
        let mut test =
            signed_in_session(ScriptedCompletion::chunks(["partial"]).then_stall()).await;
        let session = &mut test.session;
        let first = session.create_conversation().await.expect("create");
        session.send_message("Hi").await.expect("send");

        let update = session.next_stream_update().await;
        assert_eq!(
            update,
            Some(StreamUpdate::Partial {
                chunk: "partial".to_string()
            })
        );

        let second = session.create_conversation().await.expect("create");
        assert!(!session.is_streaming());
        assert!(session.next_stream_update().await.is_none());

        assert!(session.select_conversation(&first));
        assert_eq!(contents(session, &first), vec![(Role::User, "Hi".to_string())]);
        assert!(contents(session, &second).is_empty());
    }

    #[tokio::test]
    async fn deleting_the_streaming_conversation_cancels_it() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"]).then_stall()).await;
        let session = &mut test.session;
        let submitted = session.send_message("Hi").await.expect("send").expect("submitted");

        session
            .delete_conversation(&submitted.conversation_id)
            .await
            .expect("delete");
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn sending_during_a_stream_replaces_it() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["fresh"])).await;
        let session = &mut test.session;

        let first = session.send_message("one").await.expect("send").expect("submitted");
        let second = session.send_message("two").await.expect("send").expect("submitted");
        assert_eq!(first.conversation_id, second.conversation_id);
        assert_ne!(first.stream_id, second.stream_id);

        session.finish_stream().await;
        assert_eq!(
            contents(session, &second.conversation_id),
            vec![
                (Role::User, "one".to_string()),
                (Role::User, "two".to_string()),
                (Role::Assistant, "fresh".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn cancel_stream_is_silent() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"]).then_stall()).await;
        let session = &mut test.session;
        let submitted = session.send_message("Hi").await.expect("send").expect("submitted");

        assert!(session.cancel_stream());
        assert!(!session.cancel_stream());
        assert!(session.drain_notifications().is_empty());
        assert_eq!(contents(session, &submitted.conversation_id).len(), 1);
    }

    #[tokio::test]
    async fn login_hydrates_previous_conversations() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["Hey"])).await;
        let submitted = test
            .session
            .send_message("Hi")
            .await
            .expect("send")
            .expect("submitted");
        test.session.finish_stream().await;

        test.session.logout().await.expect("logout");
        assert!(test.session.store().is_empty());

        test.session.login().await.expect("login");
        let conversation = test
            .session
            .store()
            .get(&submitted.conversation_id)
            .expect("reloaded");
        assert_eq!(conversation.title, "Hi");
        assert_eq!(conversation.sync, SyncStatus::Synced);
        assert_eq!(
            contents(&test.session, &submitted.conversation_id),
            vec![
                (Role::User, "Hi".to_string()),
                (Role::Assistant, "Hey".to_string()),
            ]
        );
        assert!(test.session.active_conversation().is_none());
    }

    #[tokio::test]
    async fn failed_hydration_leaves_store_empty() {
        let mut test = signed_out_session(ScriptedCompletion::chunks(["x"]));
        test.persistence.set_failing(true);

        test.session.login().await.expect("login");
        assert!(test.session.store().is_empty());
        assert_eq!(test.session.drain_notifications().len(), 1);
    }

    #[tokio::test]
    async fn external_sign_out_is_picked_up() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"])).await;
        test.session.create_conversation().await.expect("create");

        test.identity.logout().await.expect("logout");
        assert!(test.session.sync_identity().await);
        assert!(test.session.user().is_none());
        assert!(test.session.store().is_empty());
        assert!(!test.session.sync_identity().await);
    }

    #[tokio::test]
    async fn replies_finishing_after_sign_out_are_not_committed() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["late"])).await;
        test.session.send_message("Hi").await.expect("send");

        test.identity.logout().await.expect("logout");
        let updates = test.session.finish_stream().await;

        assert!(!updates
            .iter()
            .any(|update| matches!(update, StreamUpdate::Committed { .. })));
        assert!(test.session.user().is_none());
        assert!(test.session.store().is_empty());
        assert!(!test.session.is_streaming());

        let stored = test.persistence.inner().snapshot().expect("snapshot");
        assert!(stored.messages.iter().all(|m| m.role == Role::User));
    }

    #[tokio::test]
    async fn gated_operations_notice_sign_out_without_polling() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"])).await;
        let id = test.session.create_conversation().await.expect("create");

        test.identity.logout().await.expect("logout");
        assert_eq!(
            test.session.append_message(&id, Role::User, "hello").await,
            Err(SessionError::SignedOut)
        );
        assert_eq!(
            test.session.create_conversation().await,
            Err(SessionError::SignedOut)
        );
        assert!(test.session.store().is_empty());

        let stored = test.persistence.inner().snapshot().expect("snapshot");
        assert_eq!(stored.conversations.len(), 1);
        assert!(stored.messages.is_empty());
    }

    #[tokio::test]
    async fn remote_delete_failure_keeps_local_removal() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"])).await;
        let id = test.session.create_conversation().await.expect("create");
        test.persistence.set_failing(true);

        assert_eq!(test.session.delete_conversation(&id).await, Ok(true));
        assert!(test.session.store().is_empty());
        assert!(test.session.active_conversation().is_none());

        let notifications = test.session.drain_notifications();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].text.contains("injected failure"));
    }

    #[tokio::test]
    async fn regenerate_streams_a_replacement_when_remote_delete_fails() {
        let completion = ScriptedCompletion::chunks(["first"]).followed_by(["second"]);
        let mut test = signed_in_session(completion).await;
        let session = &mut test.session;
        let submitted = session.send_message("Hi").await.expect("send").expect("submitted");
        session.finish_stream().await;
        let id = submitted.conversation_id;

        test.persistence.set_failing(true);
        let stream_id = session.regenerate(&id).await.expect("regenerate");
        assert!(stream_id.is_some());
        assert_eq!(contents(session, &id), vec![(Role::User, "Hi".to_string())]);

        let notifications = session.drain_notifications();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].text.contains("previous reply"));

        session.finish_stream().await;
        assert_eq!(
            contents(session, &id),
            vec![
                (Role::User, "Hi".to_string()),
                (Role::Assistant, "second".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn new_conversations_start_with_the_default_title() {
        let mut test = signed_in_session(ScriptedCompletion::chunks(["x"])).await;
        let id = test.session.create_conversation().await.expect("create");

        let stored = test
            .persistence
            .list_conversations(
                &ConversationFilter {
                    owner: "tester".to_string(),
                },
                SortOrder::Descending,
                None,
            )
            .await
            .expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].title, DEFAULT_TITLE);
    }
}
