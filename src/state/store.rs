//! Scoped state store.
//!
//! Keys a mutable key-value record by an identity tuple and memoizes the
//! record per key, so every handler that resolves the same scope sees the
//! same context object. Nothing here is persisted; contexts live for the
//! process runtime and die on explicit clear.

use crate::{ChatId, UserId};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Identity tuple for one logical state bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    /// The assistant identity that owns the bucket.
    pub bot_id: UserId,
    /// Chat the state belongs to.
    pub chat_id: ChatId,
    /// Acting identity (a user, or the assistant itself).
    pub user_id: UserId,
    /// Optional sub-thread discriminator.
    pub thread_id: Option<i64>,
}

impl ScopeKey {
    /// Key for a user acting in a chat.
    pub fn new(bot_id: UserId, chat_id: ChatId, user_id: UserId) -> Self {
        Self {
            bot_id,
            chat_id,
            user_id,
            thread_id: None,
        }
    }

    /// Key for state the assistant itself owns in a chat.
    pub fn bot_in_chat(bot_id: UserId, chat_id: ChatId) -> Self {
        Self::new(bot_id, chat_id, bot_id)
    }

    /// Narrow the key to a sub-thread.
    pub fn with_thread(mut self, thread_id: i64) -> Self {
        self.thread_id = Some(thread_id);
        self
    }
}

/// Mutable key-value record scoped to one [`ScopeKey`].
///
/// `update` is a shallow merge and is not atomic with a preceding `get`;
/// callers that need check-then-act must serialize externally.
#[derive(Debug, Default)]
pub struct StateContext {
    data: Mutex<HashMap<String, Value>>,
}

impl StateContext {
    /// Value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    /// Value stored under `key`, or `default`.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Store a single value.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data.lock().insert(key.into(), value);
    }

    /// Shallow-merge `partial` into the record and return the merged snapshot.
    pub fn update(&self, partial: HashMap<String, Value>) -> HashMap<String, Value> {
        let mut data = self.data.lock();
        data.extend(partial);
        data.clone()
    }

    /// Copy of the whole record.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data.lock().clone()
    }

    /// Discard the stored record.
    pub fn clear(&self) {
        self.data.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

/// Memoized registry of per-scope contexts.
#[derive(Debug, Default)]
pub struct ScopedStateStore {
    contexts: RwLock<HashMap<ScopeKey, Arc<StateContext>>>,
}

impl ScopedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing context for an equal key, or a freshly created one.
    ///
    /// Creation is memoized: repeated calls with equal keys return the same
    /// `Arc` until the key is removed.
    pub fn context(&self, key: &ScopeKey) -> Arc<StateContext> {
        if let Some(ctx) = self.contexts.read().get(key) {
            return Arc::clone(ctx);
        }
        let mut contexts = self.contexts.write();
        Arc::clone(contexts.entry(key.clone()).or_default())
    }

    /// Drop the memoized entry for `key`. Returns whether one existed.
    ///
    /// Handles already resolved for the key keep working on the detached
    /// context; the next `context` call mints a fresh one.
    pub fn remove(&self, key: &ScopeKey) -> bool {
        self.contexts.write().remove(key).is_some()
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}
