use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::completion::{ChunkStream, Completion, CompletionError, CompletionRequest};
use crate::backend::local_identity::LocalIdentity;
use crate::backend::memory::MemoryBackend;
use crate::backend::persistence::{
    ConversationFilter, ConversationRecord, ConversationUpdate, MessageFilter, MessageRecord,
    Persistence, PersistenceError, SortOrder,
};
use crate::core::conversation::ConversationId;
use crate::core::message::MessageId;
use crate::core::session::{ChatSession, SessionOptions};

#[derive(Debug, Clone)]
enum Ending {
    Finish,
    Fail(CompletionError),
    Stall,
}

#[derive(Debug, Clone)]
struct Script {
    hangs: bool,
    refusal: Option<CompletionError>,
    chunks: Vec<String>,
    ending: Ending,
}

/// Completion backend that replays canned chunk sequences and records every
/// request it receives. Each call consumes the next script; the last one is
/// repeated.
#[derive(Debug)]
pub struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    fn from_script(script: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::from([script])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_script(Script {
            hangs: false,
            refusal: None,
            chunks: chunks.into_iter().map(Into::into).collect(),
            ending: Ending::Finish,
        })
    }

    pub fn refusing(err: CompletionError) -> Self {
        Self::from_script(Script {
            hangs: false,
            refusal: Some(err),
            chunks: Vec::new(),
            ending: Ending::Finish,
        })
    }

    /// Never returns from the request itself.
    pub fn hanging() -> Self {
        Self::from_script(Script {
            hangs: true,
            refusal: None,
            chunks: Vec::new(),
            ending: Ending::Finish,
        })
    }

    pub fn then_fail(self, err: CompletionError) -> Self {
        self.set_ending(Ending::Fail(err))
    }

    /// Never finishes after the scripted chunks.
    pub fn then_stall(self) -> Self {
        self.set_ending(Ending::Stall)
    }

    pub fn followed_by<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts.lock().unwrap().push_back(Script {
            hangs: false,
            refusal: None,
            chunks: chunks.into_iter().map(Into::into).collect(),
            ending: Ending::Finish,
        });
        self
    }

    fn set_ending(self, ending: Ending) -> Self {
        if let Some(script) = self.scripts.lock().unwrap().back_mut() {
            script.ending = ending;
        }
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.len() > 1 {
            scripts.pop_front().unwrap()
        } else {
            scripts.front().cloned().unwrap()
        }
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, CompletionError> {
        self.requests.lock().unwrap().push(request);
        let script = self.next_script();
        if script.hangs {
            futures_util::future::pending::<()>().await;
        }
        if let Some(err) = script.refusal {
            return Err(err);
        }

        let chunks = stream::iter(script.chunks.into_iter().map(Ok::<String, CompletionError>));
        Ok(match script.ending {
            Ending::Finish => chunks.boxed(),
            Ending::Fail(err) => chunks.chain(stream::once(async move { Err(err) })).boxed(),
            Ending::Stall => chunks.chain(stream::pending()).boxed(),
        })
    }
}

/// In-memory persistence whose calls can be made to fail or hang on demand.
#[derive(Debug, Default)]
pub struct FlakyPersistence {
    inner: MemoryBackend,
    failing: AtomicBool,
    stalled: AtomicBool,
}

impl FlakyPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), PersistenceError> {
        if self.stalled.load(Ordering::SeqCst) {
            futures_util::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for FlakyPersistence {
    async fn create_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<(), PersistenceError> {
        self.gate().await?;
        self.inner.create_conversation(record).await
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<(), PersistenceError> {
        self.gate().await?;
        self.inner.update_conversation(id, update).await
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), PersistenceError> {
        self.gate().await?;
        self.inner.delete_conversation(id).await
    }

    async fn create_message(&self, record: &MessageRecord) -> Result<(), PersistenceError> {
        self.gate().await?;
        self.inner.create_message(record).await
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), PersistenceError> {
        self.gate().await?;
        self.inner.delete_message(id).await
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationRecord>, PersistenceError> {
        self.gate().await?;
        self.inner.list_conversations(filter, order, limit).await
    }

    async fn list_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> Result<Vec<MessageRecord>, PersistenceError> {
        self.gate().await?;
        self.inner.list_messages(filter, order).await
    }
}

pub fn test_options() -> SessionOptions {
    SessionOptions {
        model: "test-model".to_string(),
        max_output_tokens: Some(256),
        persistence_timeout: Some(Duration::from_millis(200)),
        stream_idle_timeout: None,
        conversation_limit: None,
    }
}

pub struct TestSession {
    pub session: ChatSession,
    pub persistence: Arc<FlakyPersistence>,
    pub completion: Arc<ScriptedCompletion>,
    pub identity: Arc<LocalIdentity>,
}

/// Session over fresh test doubles, signed in as `tester`.
pub async fn signed_in_session(completion: ScriptedCompletion) -> TestSession {
    let mut test = signed_out_session(completion);
    test.session.login().await.expect("login");
    test
}

pub fn signed_out_session(completion: ScriptedCompletion) -> TestSession {
    let persistence = Arc::new(FlakyPersistence::new());
    let completion = Arc::new(completion);
    let identity = Arc::new(LocalIdentity::new(Some("Tester".to_string())));
    let session = ChatSession::new(
        persistence.clone(),
        completion.clone(),
        identity.clone(),
        test_options(),
    );
    TestSession {
        session,
        persistence,
        completion,
        identity,
    }
}
