#![allow(dead_code)]

use async_trait::async_trait;
use cardchat::config::SettingsStore;
use cardchat::config::prompt::PromptConfig;
use cardchat::controller::{ ChatServices, ChatSessionController };
use cardchat::history::{ HistoryStore, MemoryHistoryStore };
use cardchat::host::{ CardInfo, CardTemplate, MemoryNoteStore, NoteStore, NoteType, StoreError };
use cardchat::llm::LlmError;
use cardchat::llm::chat::{ ByteStream, ChatClient, ChatRequest };
use cardchat::models::Role;
use futures::stream;
use std::collections::VecDeque;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const CARD_ID: i64 = 7;
pub const NOTE_ID: i64 = 70;
pub const DECK_ID: i64 = 3;

pub enum Reply {
    /// Whole event-stream body delivered as one chunk.
    Body(String),
    /// Chunks pushed by the test through the paired sender.
    Channel(mpsc::Receiver<Result<Vec<u8>, LlmError>>),
    Fail(LlmError),
}

/// A `ChatClient` that plays back queued replies and records every request.
#[derive(Default)]
pub struct ScriptedClient {
    streams: Mutex<VecDeque<Reply>>,
    completions: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn push_stream(&self, reply: Reply) {
        self.streams.lock().unwrap().push_back(reply);
    }

    pub fn push_body(&self, parts: &[&str]) {
        self.push_stream(Reply::Body(sse_body(parts)));
    }

    /// A stream that stays open until the returned sender is used or dropped.
    pub fn push_held(&self) -> mpsc::Sender<Result<Vec<u8>, LlmError>> {
        let (tx, rx) = mpsc::channel(8);
        self.push_stream(Reply::Channel(rx));
        tx
    }

    pub fn push_completion(&self, reply: Result<String, LlmError>) {
        self.completions.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.streams.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Body(body)) => Ok(Box::pin(stream::iter(vec![Ok::<_, LlmError>(body.into_bytes())]))),
            Some(Reply::Channel(rx)) => Ok(Box::pin(ReceiverStream::new(rx))),
            Some(Reply::Fail(e)) => Err(e),
            None => Err(LlmError::Connect("no scripted reply".to_string())),
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.completions.lock().unwrap().pop_front();
        reply.unwrap_or(Err(LlmError::EmptyResponse))
    }

    fn endpoint(&self) -> String {
        "scripted://chat".to_string()
    }
}

pub fn sse_line(content: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "choices": [{ "delta": { "content": content } }] }))
}

pub fn sse_body(parts: &[&str]) -> String {
    let mut body: String = parts
        .iter()
        .map(|p| sse_line(p))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

/// Memory host whose `add_note_with_type` fails on the given call numbers (1-based).
pub struct FlakyNoteStore {
    pub inner: MemoryNoteStore,
    fail_on: Vec<usize>,
    add_calls: AtomicUsize,
}

impl FlakyNoteStore {
    pub fn new(fail_on: Vec<usize>) -> Self {
        Self { inner: MemoryNoteStore::new(), fail_on, add_calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl NoteStore for FlakyNoteStore {
    async fn card(&self, card_id: i64) -> Result<CardInfo, StoreError> {
        self.inner.card(card_id).await
    }

    async fn note_fields(&self, note_id: i64) -> Result<Vec<(String, String)>, StoreError> {
        self.inner.note_fields(note_id).await
    }

    async fn set_note_field(&self, note_id: i64, field: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_note_field(note_id, field, value).await
    }

    async fn note_type(&self, name: &str) -> Result<Option<NoteType>, StoreError> {
        self.inner.note_type(name).await
    }

    async fn add_note_type(&self, note_type: &NoteType) -> Result<(), StoreError> {
        self.inner.add_note_type(note_type).await
    }

    async fn update_templates(&self, name: &str, templates: &[CardTemplate]) -> Result<(), StoreError> {
        self.inner.update_templates(name, templates).await
    }

    async fn add_note_with_type(
        &self,
        note_type: &str,
        deck_id: i64,
        fields: &[String],
        tags: &[String]
    ) -> Result<i64, StoreError> {
        let call = self.add_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(StoreError::Failed(format!("injected failure on call {}", call)));
        }
        self.inner.add_note_with_type(note_type, deck_id, fields, tags).await
    }

    async fn save(&self) -> Result<(), StoreError> {
        self.inner.save().await
    }
}

pub struct Harness {
    pub client: Arc<ScriptedClient>,
    pub history: Arc<MemoryHistoryStore>,
    pub notes: Arc<FlakyNoteStore>,
    pub services: ChatServices,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_failures(vec![]).await
    }

    pub async fn with_failures(fail_on: Vec<usize>) -> Self {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::default());
        let history = Arc::new(MemoryHistoryStore::new());
        let notes = Arc::new(FlakyNoteStore::new(fail_on));
        notes.inner.insert_card(CardInfo {
            card_id: CARD_ID,
            note_id: NOTE_ID,
            deck_id: DECK_ID,
            question_html: "<b>What is ATP?</b>".to_string(),
            answer_html: "Adenosine triphosphate".to_string(),
            tags: vec!["biology".to_string(), "cells".to_string()],
        }).await;

        let services = ChatServices {
            client: client.clone(),
            history: history.clone(),
            notes: notes.clone(),
            settings: Arc::new(SettingsStore::load(dir.path().join("config.json"))),
            prompts: Arc::new(PromptConfig::default()),
        };
        Self { client, history, notes, services, _dir: dir }
    }

    pub async fn controller(&self) -> ChatSessionController {
        let card = self.notes.card(CARD_ID).await.unwrap();
        ChatSessionController::new(self.services.clone(), card)
    }

    /// Logs a finished exchange directly, bypassing the network.
    pub async fn seed_conversation(&self) {
        self.history.add_message(CARD_ID, Role::User, "Why is ATP called energy currency?").await.unwrap();
        self.history
            .add_message(CARD_ID, Role::Assistant, "Its phosphate bonds release energy cells can spend.").await
            .unwrap();
    }
}

pub async fn collect<T>(mut rx: tokio::sync::mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
