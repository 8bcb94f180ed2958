//! Persistent state: chat history, quick prompts, and the API key.
//!
//! Everything persists through [`KeyValueStore`], a get/set/remove surface
//! over JSON values keyed by string — the shape of the browser's local
//! storage area. [`MemoryStore`] backs tests and ephemeral runs;
//! [`JsonFileStore`] keeps one JSON document on disk. The typed stores on
//! top own record shaping: UUID ids, RFC3339 creation stamps, partial
//! updates that touch only the provided fields, and thread deletion that
//! cascades to the thread's messages.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use uuid::Uuid;

/// Tracing target for persistent-state access.
pub(crate) const STORAGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::storage");

const THREADS_KEY: &str = "chat-threads";
const MESSAGES_KEY: &str = "chat-messages";
const QUICK_PROMPTS_KEY: &str = "quick-prompts";
const API_KEY_KEY: &str = "api-key";

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("failed to access persistent state: {0}")]
    Io(#[from] io::Error),

    /// Stored state did not match the expected record shape.
    #[error("persistent state is corrupted: {0}")]
    Corrupted(#[source] serde_json::Error),

    /// A record could not be encoded for storage.
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    /// An update or delete named a record that does not exist.
    #[error("no {kind} with id '{id}'")]
    MissingRecord {
        /// Record kind, for diagnostics.
        kind: &'static str,
        /// The id that failed to resolve.
        id: String,
    },
}

/// Get/set/remove of JSON values by string key.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under a key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Stores a value under a key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing store cannot be written.
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Removes a key and its value, if present.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Volatile store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The map outlives a panicking writer; recover it.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries().insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Store keeping all keys in one JSON document on disk.
///
/// Reads load the whole document; writes rewrite it. State volumes here are
/// a handful of chat threads and prompts, so simplicity wins over partial
/// updates.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store backed by the given file; the file need not exist
    /// yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<serde_json::Map<String, Value>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(serde_json::Map::new()),
            Err(error) => return Err(error.into()),
        };
        serde_json::from_str(&text).map_err(StoreError::Corrupted)
    }

    fn persist(&self, document: &serde_json::Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(document).map_err(StoreError::Encode)?;
        fs::write(&self.path, text)?;
        debug!(target: STORAGE_TARGET, path = %self.path.display(), "persisted state");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock();
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut document = self.load()?;
        document.insert(key.to_owned(), value);
        self.persist(&document)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut document = self.load()?;
        if document.remove(key).is_some() {
            self.persist(&document)?;
        }
        Ok(())
    }
}

/// Delivery state of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Sent but not yet answered.
    Pending,
    /// Answered (or delivered) successfully.
    Success,
    /// The exchange failed.
    Error,
}

/// Which side authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    /// The person asking.
    User,
    /// The answering assistant.
    Bot,
}

/// One conversation about one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThread {
    /// Record id.
    pub id: String,
    /// Thread title shown in history.
    pub title: String,
    /// Address of the page the thread is about.
    pub url: String,
    /// Favicon shown next to the thread; may be empty.
    pub icon: String,
    /// RFC3339 creation stamp.
    pub created_at: String,
}

/// Fields required to create a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThreadCreate {
    /// Thread title.
    pub title: String,
    /// Page address.
    pub url: String,
    /// Favicon address; may be empty.
    pub icon: String,
}

/// Partial thread update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatThreadUpdate {
    /// Id of the thread to update.
    pub id: String,
    /// New title, when changing.
    pub title: Option<String>,
    /// New page address, when changing.
    pub url: Option<String>,
    /// New favicon, when changing.
    pub icon: Option<String>,
}

/// One message within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Record id.
    pub id: String,
    /// Id of the containing thread.
    pub thread_id: String,
    /// Message text (question or answer, Markdown for answers).
    pub text: String,
    /// Delivery state.
    pub state: MessageState,
    /// Authoring side.
    pub sender: MessageSender,
    /// RFC3339 creation stamp.
    pub created_at: String,
}

/// Fields required to create a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageCreate {
    /// Id of the containing thread.
    pub thread_id: String,
    /// Message text.
    pub text: String,
    /// Initial delivery state.
    pub state: MessageState,
    /// Authoring side.
    pub sender: MessageSender,
}

/// Partial message update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessageUpdate {
    /// Id of the message to update.
    pub id: String,
    /// New text, when changing.
    pub text: Option<String>,
    /// New delivery state, when changing.
    pub state: Option<MessageState>,
    /// New authoring side, when changing.
    pub sender: Option<MessageSender>,
}

/// A reusable canned question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickPrompt {
    /// Record id.
    pub id: String,
    /// Short label shown on the button.
    pub title: String,
    /// The question text sent when picked.
    pub prompt: String,
    /// RFC3339 creation stamp.
    pub created_at: String,
}

/// Fields required to create a quick prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickPromptCreate {
    /// Short label shown on the button.
    pub title: String,
    /// The question text sent when picked.
    pub prompt: String,
}

/// Partial quick-prompt update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickPromptUpdate {
    /// Id of the quick prompt to update.
    pub id: String,
    /// New label, when changing.
    pub title: Option<String>,
    /// New question text, when changing.
    pub prompt: Option<String>,
}

/// Chat history: threads and their messages.
#[derive(Clone)]
pub struct ChatStore {
    store: Arc<dyn KeyValueStore>,
}

impl ChatStore {
    /// Creates a chat store over a key-value store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All threads, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be read.
    pub fn threads(&self) -> Result<Vec<ChatThread>, StoreError> {
        read_list(self.store.as_ref(), THREADS_KEY)
    }

    /// Creates a thread, assigning its id and creation stamp.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be updated.
    pub fn create_thread(&self, create: ChatThreadCreate) -> Result<ChatThread, StoreError> {
        let thread = ChatThread {
            id: fresh_id(),
            title: create.title,
            url: create.url,
            icon: create.icon,
            created_at: timestamp_now(),
        };
        let mut threads: Vec<ChatThread> = read_list(self.store.as_ref(), THREADS_KEY)?;
        threads.push(thread.clone());
        write_list(self.store.as_ref(), THREADS_KEY, &threads)?;
        Ok(thread)
    }

    /// Applies a partial update to a thread.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRecord`] when the id resolves to no
    /// thread, or another [`StoreError`] when stored state cannot be
    /// updated.
    pub fn update_thread(&self, update: ChatThreadUpdate) -> Result<ChatThread, StoreError> {
        let mut threads: Vec<ChatThread> = read_list(self.store.as_ref(), THREADS_KEY)?;
        let thread = threads
            .iter_mut()
            .find(|thread| thread.id == update.id)
            .ok_or(StoreError::MissingRecord {
                kind: "chat thread",
                id: update.id.clone(),
            })?;
        if let Some(title) = update.title {
            thread.title = title;
        }
        if let Some(url) = update.url {
            thread.url = url;
        }
        if let Some(icon) = update.icon {
            thread.icon = icon;
        }
        let updated = thread.clone();
        write_list(self.store.as_ref(), THREADS_KEY, &threads)?;
        Ok(updated)
    }

    /// Deletes a thread and every message in it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRecord`] when the id resolves to no
    /// thread, or another [`StoreError`] when stored state cannot be
    /// updated.
    pub fn delete_thread(&self, id: &str) -> Result<(), StoreError> {
        let mut threads: Vec<ChatThread> = read_list(self.store.as_ref(), THREADS_KEY)?;
        let before = threads.len();
        threads.retain(|thread| thread.id != id);
        if threads.len() == before {
            return Err(StoreError::MissingRecord {
                kind: "chat thread",
                id: id.to_owned(),
            });
        }
        write_list(self.store.as_ref(), THREADS_KEY, &threads)?;

        let mut messages: Vec<ChatMessage> = read_list(self.store.as_ref(), MESSAGES_KEY)?;
        messages.retain(|message| message.thread_id != id);
        write_list(self.store.as_ref(), MESSAGES_KEY, &messages)
    }

    /// Messages of one thread, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be read.
    pub fn messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let messages: Vec<ChatMessage> = read_list(self.store.as_ref(), MESSAGES_KEY)?;
        Ok(messages
            .into_iter()
            .filter(|message| message.thread_id == thread_id)
            .collect())
    }

    /// Creates a message, assigning its id and creation stamp.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be updated.
    pub fn create_message(&self, create: ChatMessageCreate) -> Result<ChatMessage, StoreError> {
        let message = ChatMessage {
            id: fresh_id(),
            thread_id: create.thread_id,
            text: create.text,
            state: create.state,
            sender: create.sender,
            created_at: timestamp_now(),
        };
        let mut messages: Vec<ChatMessage> = read_list(self.store.as_ref(), MESSAGES_KEY)?;
        messages.push(message.clone());
        write_list(self.store.as_ref(), MESSAGES_KEY, &messages)?;
        Ok(message)
    }

    /// Applies a partial update to a message.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRecord`] when the id resolves to no
    /// message, or another [`StoreError`] when stored state cannot be
    /// updated.
    pub fn update_message(&self, update: ChatMessageUpdate) -> Result<ChatMessage, StoreError> {
        let mut messages: Vec<ChatMessage> = read_list(self.store.as_ref(), MESSAGES_KEY)?;
        let message = messages
            .iter_mut()
            .find(|message| message.id == update.id)
            .ok_or(StoreError::MissingRecord {
                kind: "chat message",
                id: update.id.clone(),
            })?;
        if let Some(text) = update.text {
            message.text = text;
        }
        if let Some(state) = update.state {
            message.state = state;
        }
        if let Some(sender) = update.sender {
            message.sender = sender;
        }
        let updated = message.clone();
        write_list(self.store.as_ref(), MESSAGES_KEY, &messages)?;
        Ok(updated)
    }

    /// Deletes one message.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRecord`] when the id resolves to no
    /// message, or another [`StoreError`] when stored state cannot be
    /// updated.
    pub fn delete_message(&self, id: &str) -> Result<(), StoreError> {
        let mut messages: Vec<ChatMessage> = read_list(self.store.as_ref(), MESSAGES_KEY)?;
        let before = messages.len();
        messages.retain(|message| message.id != id);
        if messages.len() == before {
            return Err(StoreError::MissingRecord {
                kind: "chat message",
                id: id.to_owned(),
            });
        }
        write_list(self.store.as_ref(), MESSAGES_KEY, &messages)
    }
}

/// Reusable canned questions.
#[derive(Clone)]
pub struct QuickPromptStore {
    store: Arc<dyn KeyValueStore>,
}

impl QuickPromptStore {
    /// Creates a quick-prompt store over a key-value store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All quick prompts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be read.
    pub fn list(&self) -> Result<Vec<QuickPrompt>, StoreError> {
        read_list(self.store.as_ref(), QUICK_PROMPTS_KEY)
    }

    /// Seeds the given prompts once, on first run only.
    ///
    /// Returns whether seeding happened; an existing list — even an empty
    /// one the user emptied deliberately — is left alone.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be updated.
    pub fn seed(&self, presets: Vec<QuickPromptCreate>) -> Result<bool, StoreError> {
        if self.store.get(QUICK_PROMPTS_KEY)?.is_some() {
            return Ok(false);
        }
        let prompts: Vec<QuickPrompt> = presets
            .into_iter()
            .map(|preset| QuickPrompt {
                id: fresh_id(),
                title: preset.title,
                prompt: preset.prompt,
                created_at: timestamp_now(),
            })
            .collect();
        write_list(self.store.as_ref(), QUICK_PROMPTS_KEY, &prompts)?;
        Ok(true)
    }

    /// Creates a quick prompt, assigning its id and creation stamp.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be updated.
    pub fn create(&self, create: QuickPromptCreate) -> Result<QuickPrompt, StoreError> {
        let prompt = QuickPrompt {
            id: fresh_id(),
            title: create.title,
            prompt: create.prompt,
            created_at: timestamp_now(),
        };
        let mut prompts: Vec<QuickPrompt> = read_list(self.store.as_ref(), QUICK_PROMPTS_KEY)?;
        prompts.push(prompt.clone());
        write_list(self.store.as_ref(), QUICK_PROMPTS_KEY, &prompts)?;
        Ok(prompt)
    }

    /// Applies a partial update to a quick prompt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRecord`] when the id resolves to no
    /// prompt, or another [`StoreError`] when stored state cannot be
    /// updated.
    pub fn update(&self, update: QuickPromptUpdate) -> Result<QuickPrompt, StoreError> {
        let mut prompts: Vec<QuickPrompt> = read_list(self.store.as_ref(), QUICK_PROMPTS_KEY)?;
        let prompt = prompts
            .iter_mut()
            .find(|prompt| prompt.id == update.id)
            .ok_or(StoreError::MissingRecord {
                kind: "quick prompt",
                id: update.id.clone(),
            })?;
        if let Some(title) = update.title {
            prompt.title = title;
        }
        if let Some(text) = update.prompt {
            prompt.prompt = text;
        }
        let updated = prompt.clone();
        write_list(self.store.as_ref(), QUICK_PROMPTS_KEY, &prompts)?;
        Ok(updated)
    }

    /// Deletes one quick prompt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRecord`] when the id resolves to no
    /// prompt, or another [`StoreError`] when stored state cannot be
    /// updated.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut prompts: Vec<QuickPrompt> = read_list(self.store.as_ref(), QUICK_PROMPTS_KEY)?;
        let before = prompts.len();
        prompts.retain(|prompt| prompt.id != id);
        if prompts.len() == before {
            return Err(StoreError::MissingRecord {
                kind: "quick prompt",
                id: id.to_owned(),
            });
        }
        write_list(self.store.as_ref(), QUICK_PROMPTS_KEY, &prompts)
    }
}

/// The answer-service API key.
#[derive(Clone)]
pub struct ApiKeyStore {
    store: Arc<dyn KeyValueStore>,
}

impl ApiKeyStore {
    /// Creates an API-key store over a key-value store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The stored key, when one has been saved.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be read.
    pub fn get(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .store
            .get(API_KEY_KEY)?
            .and_then(|value| value.as_str().map(str::to_owned)))
    }

    /// Saves (or replaces) the key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when stored state cannot be updated.
    pub fn set(&self, key: &str) -> Result<(), StoreError> {
        self.store.set(API_KEY_KEY, Value::String(key.to_owned()))
    }
}

/// Opens the store selected by configuration: file-backed when a path is
/// configured, in-memory otherwise.
#[must_use]
pub fn open_store(settings: &tabwise_config::StorageSettings) -> Arc<dyn KeyValueStore> {
    match &settings.path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

fn timestamp_now() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

fn read_list<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Vec<T>, StoreError> {
    match store.get(key)? {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value).map_err(StoreError::Corrupted),
    }
}

fn write_list<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    items: &[T],
) -> Result<(), StoreError> {
    let value = serde_json::to_value(items).map_err(StoreError::Encode)?;
    store.set(key, value)
}
