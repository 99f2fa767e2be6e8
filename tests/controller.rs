mod common;

use async_trait::async_trait;
use cardchat::agent::ChatAgent;
use cardchat::controller::{ ChatError, ChatServices, ChatSessionController, SaveMode, TurnState };
use cardchat::history::{ HistoryError, HistoryStore, MemoryHistoryStore };
use cardchat::host::NoteStore;
use cardchat::llm::LlmError;
use cardchat::models::{ Conversation, Role };
use cardchat::session::SessionEvent;
use common::{ collect, sse_line, Harness, Reply, CARD_ID, NOTE_ID };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;

/// History whose writes hang while `stalled` is set.
#[derive(Default)]
struct StallingHistory {
    inner: MemoryHistoryStore,
    stalled: AtomicBool,
}

#[async_trait]
impl HistoryStore for StallingHistory {
    async fn add_message(&self, card_id: i64, role: Role, content: &str) -> Result<(), HistoryError> {
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.add_message(card_id, role, content).await
    }

    async fn get_conversation(&self, card_id: i64) -> Result<Conversation, HistoryError> {
        self.inner.get_conversation(card_id).await
    }

    async fn clear(&self, card_id: i64) -> Result<(), HistoryError> {
        self.inner.clear(card_id).await
    }
}

#[tokio::test]
async fn turn_streams_cumulative_text_and_logs_both_sides() {
    let h = Harness::new().await;
    h.client.push_body(&["Hel", "lo"]);
    let chat = h.controller().await;

    let events = collect(chat.send_turn("  hi there ").await.unwrap()).await;
    assert_eq!(
        events,
        vec![
            SessionEvent::Chunk("Hel".into()),
            SessionEvent::Chunk("Hello".into()),
            SessionEvent::Done("Hello".into())
        ]
    );

    let log = chat.history().await.unwrap();
    let entries: Vec<(Role, &str)> = log.messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(entries, vec![(Role::User, "hi there"), (Role::Assistant, "Hello")]);
    assert_eq!(chat.state(), TurnState::Idle);

    let request = &h.client.requests()[0];
    assert_eq!(request.stream, Some(true));
    assert_eq!(request.messages[0].role, "system");
    assert!(request.messages[0].content.contains("Question: What is ATP?"));
    assert!(request.messages[0].content.contains("Answer: Adenosine triphosphate"));
    assert_eq!(request.messages[1].content, "hi there");
}

#[tokio::test]
async fn second_send_is_rejected_while_awaiting() {
    let h = Harness::new().await;
    let feed = h.client.push_held();
    h.client.push_body(&["again"]);
    let chat = h.controller().await;

    let first = chat.send_turn("first").await.unwrap();
    assert_eq!(chat.state(), TurnState::AwaitingResponse);
    assert!(matches!(chat.send_turn("second").await, Err(ChatError::TurnInProgress)));

    feed.send(Ok(sse_line("done").into_bytes())).await.unwrap();
    drop(feed);
    let events = collect(first).await;
    assert_eq!(events.last(), Some(&SessionEvent::Done("done".into())));
    assert_eq!(chat.state(), TurnState::Idle);

    // only the accepted turn was logged
    let contents: Vec<String> = chat
        .history().await
        .unwrap()
        .messages.into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first", "done"]);

    collect(chat.send_turn("third").await.unwrap()).await;
    assert_eq!(chat.history().await.unwrap().len(), 4);
}

#[tokio::test]
async fn failed_turn_keeps_only_the_user_message() {
    let h = Harness::new().await;
    h.client.push_stream(Reply::Fail(LlmError::Status { status: 500, body: "boom".into() }));
    let chat = h.controller().await;

    let events = collect(chat.send_turn("hello?").await.unwrap()).await;
    assert_eq!(events, vec![SessionEvent::Error("request failed with status 500: boom".into())]);
    assert_eq!(chat.last_error().as_deref(), Some("request failed with status 500: boom"));
    assert_eq!(chat.state(), TurnState::Idle);

    let log = chat.history().await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log.messages[0].role, Role::User);
}

#[tokio::test]
async fn empty_reply_is_an_error() {
    let h = Harness::new().await;
    h.client.push_body(&[]);
    let chat = h.controller().await;

    let events = collect(chat.send_turn("hello?").await.unwrap()).await;
    assert_eq!(events, vec![SessionEvent::Error("no response received".into())]);
    assert_eq!(chat.history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_message_is_not_sent() {
    let h = Harness::new().await;
    let chat = h.controller().await;
    assert!(matches!(chat.send_turn("   ").await, Err(ChatError::EmptyMessage)));
    assert!(chat.history().await.unwrap().is_empty());
    assert!(h.client.requests().is_empty());
}

#[tokio::test]
async fn summary_needs_conversation_and_leaves_history_alone() {
    let h = Harness::new().await;
    let chat = h.controller().await;
    assert!(matches!(chat.summarize().await, Err(ChatError::NotEnoughConversation)));

    h.seed_conversation().await;
    h.client.push_body(&["## Notes\n", "ATP stores energy."]);
    let events = collect(chat.summarize().await.unwrap()).await;
    assert_eq!(events.last(), Some(&SessionEvent::Done("## Notes\nATP stores energy.".into())));
    assert_eq!(chat.history().await.unwrap().len(), 2);

    let request = h.client.requests().pop().unwrap();
    assert_eq!(request.temperature, 0.3);
    assert_eq!(request.messages.len(), 2);
    assert!(request.messages[1].content.contains("You: Why is ATP called energy currency?"));
    assert!(request.messages[1].content.contains("AI: Its phosphate bonds"));
}

#[tokio::test]
async fn summary_is_saved_by_replace_or_append() {
    let h = Harness::new().await;
    let chat = h.controller().await;

    chat.save_summary("Back", "First summary", SaveMode::Append).await.unwrap();
    chat.save_summary("Back", "Second summary", SaveMode::Append).await.unwrap();
    let fields = h.notes.note_fields(NOTE_ID).await.unwrap();
    assert_eq!(
        fields[1].1,
        "Adenosine triphosphate\n\n=== AI Chat Summary ===\nFirst summary\n\n=== AI Chat Summary ===\nSecond summary"
    );

    chat.save_summary("Back", "Only this", SaveMode::Replace).await.unwrap();
    assert_eq!(h.notes.note_fields(NOTE_ID).await.unwrap()[1].1, "Only this");
    assert_eq!(h.notes.inner.save_count(), 3);

    assert!(matches!(chat.save_summary("Extra", "x", SaveMode::Replace).await, Err(ChatError::Store(_))));
}

#[tokio::test]
async fn clearing_history_only_touches_this_card() {
    let h = Harness::new().await;
    h.seed_conversation().await;
    h.history.add_message(CARD_ID + 1, Role::User, "other card").await.unwrap();
    let chat = h.controller().await;

    chat.clear_history().await.unwrap();
    assert!(chat.history().await.unwrap().is_empty());
    assert_eq!(h.history.get_conversation(CARD_ID + 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn agent_follows_the_displayed_card() {
    let h = Harness::new().await;
    let agent = ChatAgent::with_services(h.services.clone());

    let first = agent.open_chat(CARD_ID).await.unwrap();
    let again = agent.open_chat(CARD_ID).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    agent.on_card_shown(CARD_ID).await;
    assert!(agent.current_chat().await.is_some());

    agent.on_card_shown(CARD_ID + 1).await;
    assert!(agent.current_chat().await.is_none());
    assert!(matches!(agent.open_chat(CARD_ID + 1).await, Err(ChatError::Store(_))));
}

#[tokio::test]
async fn abandoned_send_leaves_the_chat_idle() {
    let h = Harness::new().await;
    let history = Arc::new(StallingHistory::default());
    history.stalled.store(true, Ordering::SeqCst);
    let services = ChatServices { history: history.clone(), ..h.services.clone() };
    let card = h.notes.card(CARD_ID).await.unwrap();
    let chat = ChatSessionController::new(services, card);

    let abandoned = tokio::time::timeout(Duration::from_millis(20), chat.send_turn("hi")).await;
    assert!(abandoned.is_err());
    assert_eq!(chat.state(), TurnState::Idle);

    history.stalled.store(false, Ordering::SeqCst);
    h.client.push_body(&["hello"]);
    let events = collect(chat.send_turn("hi again").await.unwrap()).await;
    assert_eq!(events.last(), Some(&SessionEvent::Done("hello".into())));
    assert_eq!(chat.state(), TurnState::Idle);
}

#[tokio::test]
async fn failure_mid_stream_discards_partial_reply() {
    let h = Harness::new().await;
    let feed = h.client.push_held();
    let chat = h.controller().await;

    let rx = chat.send_turn("explain").await.unwrap();
    feed.send(Ok(sse_line("partial").into_bytes())).await.unwrap();
    feed.send(Err(LlmError::Connect("reset".into()))).await.unwrap();
    drop(feed);

    let events = collect(rx).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], SessionEvent::Chunk("partial".into()));
    assert!(matches!(&events[1], SessionEvent::Error(msg) if msg.contains("reset")));
    assert_eq!(chat.state(), TurnState::Idle);

    let log = chat.history().await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log.messages[0].role, Role::User);
    assert_eq!(log.messages[0].content, "explain");
}
