use futures::StreamExt;
use log::{ debug, info, warn };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::sync::mpsc::{ self, UnboundedReceiver };
use uuid::Uuid;

use crate::llm::LlmError;
use crate::llm::chat::{ ChatClient, ChatRequest };
use crate::llm::chat::sse::{ SseDecoder, SseEvent };

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// What a running session reports. `Chunk` always carries the whole text
/// accumulated so far. Exactly one `Done` or `Error` ends the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Chunk(String),
    Done(String),
    Error(String),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Chunk(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Streaming,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// `stream: true`, body decoded as server-sent events.
    Streaming,
    /// One JSON response, reported as a single chunk.
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingState {
    pub accumulated: String,
    pub phase: Phase,
    pub last_error: Option<String>,
}

impl Default for StreamingState {
    fn default() -> Self {
        Self { accumulated: String::new(), phase: Phase::Connecting, last_error: None }
    }
}

/// Read side of a session's [`StreamingState`], usable after the session
/// itself has been moved into [`StreamingSession::start`].
#[derive(Clone, Default)]
pub struct StateHandle(Arc<Mutex<StreamingState>>);

impl StateHandle {
    pub fn snapshot(&self) -> StreamingState {
        match self.0.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, state: &StreamingState) {
        match self.0.lock() {
            Ok(mut guard) => *guard = state.clone(),
            Err(poisoned) => *poisoned.into_inner() = state.clone(),
        }
    }
}

/// One chat-completion exchange. Consumed by [`StreamingSession::start`], so a
/// session can only ever run once.
pub struct StreamingSession {
    id: Uuid,
    client: Arc<dyn ChatClient>,
    request: ChatRequest,
    mode: ResponseMode,
    timeout: Duration,
    state: StateHandle,
}

impl StreamingSession {
    pub fn new(client: Arc<dyn ChatClient>, request: ChatRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            request: request.streaming(),
            mode: ResponseMode::Streaming,
            timeout: DEFAULT_TIMEOUT,
            state: StateHandle::default(),
        }
    }

    pub fn single_response(mut self) -> Self {
        self.request = self.request.single_response();
        self.mode = ResponseMode::Single;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn request(&self) -> &ChatRequest {
        &self.request
    }

    /// Phase, text and error as of the last phase change.
    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    fn set_phase(&self, state: &mut StreamingState, phase: Phase) {
        debug!("[{}] {:?} -> {:?}", self.id, state.phase, phase);
        state.phase = phase;
        self.state.publish(state);
    }

    /// Runs the exchange to completion, calling `on_chunk` with the cumulative
    /// text after every content-bearing event. Returns the final text, or the
    /// failure; an exchange that produced no text is `LlmError::EmptyResponse`.
    pub async fn execute<F>(&self, mut on_chunk: F) -> Result<String, LlmError>
        where F: FnMut(&str) + Send
    {
        info!(
            "[{}] Starting {:?} request to {} (model {})",
            self.id,
            self.mode,
            self.client.endpoint(),
            self.request.model
        );
        let mut state = StreamingState::default();
        let outcome = match
            tokio::time::timeout(self.timeout, self.drive(&mut state, &mut on_chunk)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(LlmError::Timeout),
        };
        let outcome = outcome.and_then(|_| {
            if state.accumulated.is_empty() { Err(LlmError::EmptyResponse) } else { Ok(()) }
        });

        match outcome {
            Ok(()) => {
                self.set_phase(&mut state, Phase::Done);
                info!("[{}] Completed with {} chars", self.id, state.accumulated.len());
                Ok(state.accumulated)
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                self.set_phase(&mut state, Phase::Error);
                warn!(
                    "[{}] Failed after {} chars: {}",
                    self.id,
                    state.accumulated.len(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn drive<F>(&self, state: &mut StreamingState, on_chunk: &mut F) -> Result<(), LlmError>
        where F: FnMut(&str) + Send
    {
        match self.mode {
            ResponseMode::Single => {
                let text = self.client.complete(&self.request).await?;
                self.set_phase(state, Phase::Streaming);
                if !text.is_empty() {
                    state.accumulated.push_str(&text);
                    on_chunk(&state.accumulated);
                }
                Ok(())
            }
            ResponseMode::Streaming => {
                let mut body = self.client.stream_chat(&self.request).await?;
                self.set_phase(state, Phase::Streaming);

                let mut decoder = SseDecoder::new();
                while let Some(chunk) = body.next().await {
                    for event in decoder.push(&chunk?) {
                        match event {
                            SseEvent::Delta(text) => {
                                state.accumulated.push_str(&text);
                                on_chunk(&state.accumulated);
                            }
                            SseEvent::Done => {
                                debug!("[{}] Received end-of-stream marker", self.id);
                                return Ok(());
                            }
                        }
                    }
                }
                if let Some(SseEvent::Delta(text)) = decoder.finish() {
                    state.accumulated.push_str(&text);
                    on_chunk(&state.accumulated);
                }
                Ok(())
            }
        }
    }

    /// Spawns the exchange and returns its events. The terminal event is
    /// always last; if the receiver is dropped early the remaining events are
    /// discarded and the exchange still runs to its end.
    pub fn start(self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let chunk_tx = tx.clone();
            let result = self.execute(move |text| {
                let _ = chunk_tx.send(SessionEvent::Chunk(text.to_string()));
            }).await;
            let terminal = match result {
                Ok(text) => SessionEvent::Done(text),
                Err(e) => SessionEvent::Error(e.to_string()),
            };
            let _ = tx.send(terminal);
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::llm::chat::{ ByteStream, RequestMessage };
    use futures::stream;

    enum Reply {
        Chunks(Vec<&'static str>),
        Refused,
        Hang,
        /// One chunk, then the connection drops.
        Broken(&'static str),
    }

    struct ScriptedClient {
        reply: Reply,
        single: Result<String, ()>,
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream, LlmError> {
            assert_eq!(request.stream, Some(true));
            match &self.reply {
                Reply::Chunks(chunks) => {
                    let items: Vec<Result<Vec<u8>, LlmError>> = chunks
                        .iter()
                        .map(|c| Ok(c.as_bytes().to_vec()))
                        .collect();
                    Ok(Box::pin(stream::iter(items)))
                }
                Reply::Refused => Err(LlmError::Status { status: 401, body: "bad key".into() }),
                Reply::Hang => Ok(Box::pin(stream::pending::<Result<Vec<u8>, LlmError>>())),
                Reply::Broken(chunk) => {
                    let items: Vec<Result<Vec<u8>, LlmError>> = vec![
                        Ok(chunk.as_bytes().to_vec()),
                        Err(LlmError::Connect("reset".into()))
                    ];
                    Ok(Box::pin(stream::iter(items)))
                }
            }
        }

        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            assert_eq!(request.stream, None);
            self.single.clone().map_err(|_| LlmError::EmptyResponse)
        }

        fn endpoint(&self) -> String {
            "scripted".to_string()
        }
    }

    fn session(reply: Reply) -> StreamingSession {
        let client = Arc::new(ScriptedClient { reply, single: Ok("whole answer".into()) });
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![RequestMessage::user("hi")],
            max_tokens: 10,
            temperature: 0.7,
            stream: None,
        };
        StreamingSession::new(client, request)
    }

    async fn collect(mut rx: UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn chunks_are_cumulative_and_done_is_last() {
        let events = collect(
            session(
                Reply::Chunks(
                    vec![
                        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
                        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
                        "data: [DONE]\n\n",
                        "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n"
                    ]
                )
            ).start()
        ).await;
        assert_eq!(
            events,
            vec![
                SessionEvent::Chunk("Hel".into()),
                SessionEvent::Chunk("Hello".into()),
                SessionEvent::Done("Hello".into())
            ]
        );
    }

    #[tokio::test]
    async fn no_content_is_one_error() {
        let events = collect(
            session(
                Reply::Chunks(
                    vec!["data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n", "data: [DONE]\n\n"]
                )
            ).start()
        ).await;
        assert_eq!(events, vec![SessionEvent::Error("no response received".into())]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let events = collect(
            session(
                Reply::Chunks(
                    vec![
                        "data: {oops\n",
                        ": keep-alive\n",
                        "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n"
                    ]
                )
            ).start()
        ).await;
        assert_eq!(events, vec![SessionEvent::Chunk("ok".into()), SessionEvent::Done("ok".into())]);
    }

    #[tokio::test]
    async fn transport_failure_never_reports_done() {
        let events = collect(session(Reply::Refused).start()).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Error(msg) => assert!(msg.contains("401")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn drop_after_chunks_ends_in_error() {
        let s = session(Reply::Broken("data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\n"));
        let state = s.state();
        let events = collect(s.start()).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SessionEvent::Chunk("par".into()));
        assert_eq!(events[1], SessionEvent::Error(LlmError::Connect("reset".into()).to_string()));
        assert_eq!(state.snapshot().phase, Phase::Error);
    }

    #[tokio::test]
    async fn state_reports_final_phase() {
        let ok = session(Reply::Chunks(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n"]));
        let ok_state = ok.state();
        assert_eq!(ok_state.snapshot().phase, Phase::Connecting);
        collect(ok.start()).await;
        let done = ok_state.snapshot();
        assert_eq!(done.phase, Phase::Done);
        assert_eq!(done.accumulated, "hi");
        assert_eq!(done.last_error, None);

        let refused = session(Reply::Refused);
        let refused_state = refused.state();
        collect(refused.start()).await;
        let failed = refused_state.snapshot();
        assert_eq!(failed.phase, Phase::Error);
        assert!(failed.last_error.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let result = session(Reply::Hang)
            .with_timeout(Duration::from_millis(50))
            .execute(|_| {}).await;
        assert!(matches!(result, Err(LlmError::Timeout)));
    }

    #[tokio::test]
    async fn single_response_is_one_chunk() {
        let s = session(Reply::Refused).single_response();
        assert_eq!(s.mode(), ResponseMode::Single);
        let events = collect(s.start()).await;
        assert_eq!(
            events,
            vec![
                SessionEvent::Chunk("whole answer".into()),
                SessionEvent::Done("whole answer".into())
            ]
        );
    }
}
