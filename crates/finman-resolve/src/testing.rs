//! Test doubles shared by the resolver and dispatcher tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use finman_ai::{ExtractError, Extractor, ImageRef, RawExtraction};
use finman_core::{IdentityKey, NewRecord, RecordId};
use finman_store::{EntryStore, MemoryEntryStore, StoreError};
use serde_json::Value;

use crate::error::ResolveError;
use crate::machine::{Resolver, ResolverConfig};
use crate::session::{ConversationId, IdentitySource, MemorySessionStore, SessionStore};
use crate::state::PendingResolution;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub text: String,
    pub has_image: bool,
    pub force_guess: bool,
}

/// Answers by exact prompt text. Unscripted text is unparseable.
#[derive(Default)]
pub struct ScriptedExtractor {
    answers: Mutex<HashMap<String, Option<Value>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, text: &str, json: Value) -> Self {
        self.answers.lock().unwrap().insert(text.into(), Some(json));
        self
    }

    /// Calls with `text` fail outright, as a network error would.
    pub fn fail(self, text: &str) -> Self {
        self.answers.lock().unwrap().insert(text.into(), None);
        self
    }

    pub fn set(&self, text: &str, json: Value) {
        self.answers.lock().unwrap().insert(text.into(), Some(json));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.text).collect()
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(
        &self,
        text: &str,
        image: Option<&ImageRef>,
        force_guess: bool,
    ) -> Result<RawExtraction, ExtractError> {
        self.calls.lock().unwrap().push(Call {
            text: text.into(),
            has_image: image.is_some(),
            force_guess,
        });
        match self.answers.lock().unwrap().get(text) {
            Some(Some(Value::Object(map))) => Ok(map.clone()),
            Some(Some(other)) => Err(ExtractError::Unparseable(other.to_string())),
            Some(None) => Err(ExtractError::Backend("scripted failure".into())),
            None => Err(ExtractError::Unparseable(format!("no script for {text:?}"))),
        }
    }
}

/// In-memory store that can be switched offline.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryEntryStore,
    down: AtomicBool,
    attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryEntryStore {
        &self.inner
    }
}

#[async_trait]
impl EntryStore for FlakyStore {
    async fn insert(&self, record: &NewRecord) -> Result<RecordId, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        self.inner.insert(record).await
    }
}

/// Memory sessions whose next `clear_pending` / `set_pending` calls can be
/// made to fail.
pub struct FlakySessions {
    inner: MemorySessionStore,
    failing_clears: AtomicUsize,
    failing_sets: AtomicUsize,
}

impl FlakySessions {
    pub fn new() -> Self {
        Self {
            inner: MemorySessionStore::new(Duration::hours(1)),
            failing_clears: AtomicUsize::new(0),
            failing_sets: AtomicUsize::new(0),
        }
    }

    pub fn bind_identity(&self, conv: &ConversationId, identity: IdentityKey) -> Result<(), ResolveError> {
        self.inner.bind_identity(conv, identity)
    }

    pub fn fail_clears(&self, n: usize) {
        self.failing_clears.store(n, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, n: usize) {
        self.failing_sets.store(n, Ordering::SeqCst);
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl IdentitySource for FlakySessions {
    async fn identity(&self, conv: &ConversationId) -> Option<IdentityKey> {
        self.inner.identity(conv).await
    }
}

#[async_trait]
impl SessionStore for FlakySessions {
    async fn pending(&self, conv: &ConversationId) -> Result<Option<PendingResolution>, ResolveError> {
        self.inner.pending(conv).await
    }

    async fn set_pending(
        &self,
        conv: &ConversationId,
        state: PendingResolution,
    ) -> Result<(), ResolveError> {
        if take_failure(&self.failing_sets) {
            return Err(ResolveError::Session("session write failed".into()));
        }
        self.inner.set_pending(conv, state).await
    }

    async fn clear_pending(&self, conv: &ConversationId) -> Result<(), ResolveError> {
        if take_failure(&self.failing_clears) {
            return Err(ResolveError::Session("session clear failed".into()));
        }
        self.inner.clear_pending(conv).await
    }
}

pub struct Harness {
    pub resolver: Arc<Resolver>,
    pub store: Arc<FlakyStore>,
    pub sessions: Arc<FlakySessions>,
}

pub fn me() -> IdentityKey {
    IdentityKey::from_phone("9699585045").unwrap()
}

pub fn conv() -> ConversationId {
    ConversationId::from("chat-1")
}

/// Resolver over `extractor` with `conv()` already authenticated as `me()`.
pub fn harness(extractor: Arc<dyn Extractor>, config: ResolverConfig) -> Harness {
    let store = Arc::new(FlakyStore::default());
    let sessions = Arc::new(FlakySessions::new());
    sessions.bind_identity(&conv(), me()).unwrap();
    let resolver = Arc::new(Resolver::new(
        extractor,
        store.clone(),
        sessions.clone(),
        sessions.clone(),
        config,
    ));
    Harness {
        resolver,
        store,
        sessions,
    }
}
