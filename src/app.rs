use ratatui::widgets::ListState;
use tokio::sync::mpsc;

use crate::client::{ChatClient, StreamEvent, ERROR_REPLY, NETWORK_ERROR_REPLY};
use crate::config::Config;
use crate::transcript::{Role, Transcript};
use crate::tui::AppEvent;

pub struct App {
    // Core state
    pub should_quit: bool,

    // Input state
    pub input: String,
    pub input_cursor: usize,

    // Conversation state
    pub transcript: Transcript,
    pub streaming: bool,
    accumulator: String,

    // Starter prompt list (visible while the transcript is empty)
    pub prompt_state: ListState,

    // Chat viewport state
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub follow: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Wiring
    pub config: Config,
    client: ChatClient,
    events: mpsc::UnboundedSender<AppEvent>,
    mutations: mpsc::UnboundedReceiver<()>,
}

impl App {
    pub fn new(config: Config, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        let client = ChatClient::new(&config);

        let mut transcript = Transcript::new();
        let mutations = transcript.subscribe();

        let mut prompt_state = ListState::default();
        if !config.prompts.is_empty() {
            prompt_state.select(Some(0));
        }

        Self {
            should_quit: false,

            input: String::new(),
            input_cursor: 0,

            transcript,
            streaming: false,
            accumulator: String::new(),

            prompt_state,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow: true,

            animation_frame: 0,

            config,
            client,
            events,
            mutations,
        }
    }

    /// Send the pending input as a user message and open the streaming
    /// exchange. Whitespace-only input is a no-op; so is submitting while a
    /// request is already in flight (rejected, not queued).
    pub fn submit(&mut self) {
        if self.streaming {
            return;
        }
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }

        self.input.clear();
        self.input_cursor = 0;

        self.transcript.push(Role::User, text);
        // Snapshot the wire payload before opening the assistant slot.
        let outbound = self.transcript.messages().to_vec();
        self.transcript.push(Role::Assistant, "");

        self.accumulator.clear();
        self.streaming = true;
        self.follow = true;

        let client = self.client.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            client.stream_chat(outbound, tx).await;
        });

        // Forward stream progress into the main event channel.
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if events.send(AppEvent::Stream(event)).is_err() {
                    break;
                }
            }
        });
    }

    /// Submit the highlighted starter prompt. Only meaningful while the
    /// transcript is empty and nothing has been typed.
    pub fn submit_selected_prompt(&mut self) {
        if !self.transcript.is_empty() || !self.input.trim().is_empty() {
            return;
        }
        let selected = self
            .prompt_state
            .selected()
            .and_then(|i| self.config.prompts.get(i).cloned());
        if let Some(prompt) = selected {
            self.input = prompt;
            self.submit();
        }
    }

    /// Apply one stream event to the transcript.
    pub fn on_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Delta(delta) => {
                self.accumulator.push_str(&delta);
                self.transcript.replace_last(self.accumulator.clone());
            }
            StreamEvent::Done { deltas } => {
                tracing::debug!(deltas, "stream finished");
                // A stream that never produced a delta must not leave an
                // empty assistant bubble.
                if self.accumulator.is_empty() {
                    self.transcript.replace_last(ERROR_REPLY);
                }
                self.finish_exchange();
            }
            StreamEvent::Failed => {
                self.transcript.replace_last(ERROR_REPLY);
                self.finish_exchange();
            }
            StreamEvent::NetworkError => {
                self.transcript.replace_last(NETWORK_ERROR_REPLY);
                self.finish_exchange();
            }
        }
    }

    fn finish_exchange(&mut self) {
        self.streaming = false;
        self.accumulator.clear();
        self.animation_frame = 0;
    }

    /// Start a new chat: clears the transcript and any pending input.
    /// Refused while a response streams; there is no cancellation, and the
    /// in-flight task would otherwise write into a fresh transcript.
    pub fn reset(&mut self) {
        if self.streaming {
            return;
        }
        self.transcript.clear();
        self.input.clear();
        self.input_cursor = 0;
        self.accumulator.clear();
        self.chat_scroll = 0;
        self.follow = true;
        if !self.config.prompts.is_empty() {
            self.prompt_state.select(Some(0));
        }
    }

    /// Drain transcript mutation notifications. Returns true if anything
    /// changed since the last call; the view uses this to re-pin the scroll
    /// position.
    pub fn take_mutations(&mut self) -> bool {
        let mut mutated = false;
        while self.mutations.try_recv().is_ok() {
            mutated = true;
        }
        mutated
    }

    // Starter prompt navigation
    pub fn prompt_nav_down(&mut self) {
        let len = self.config.prompts.len();
        if len > 0 {
            let i = self.prompt_state.selected().unwrap_or(0);
            self.prompt_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn prompt_nav_up(&mut self) {
        let i = self.prompt_state.selected().unwrap_or(0);
        self.prompt_state.select(Some(i.saturating_sub(1)));
    }

    // Chat scrolling. Scrolling up releases follow mode; jumping to the
    // bottom re-engages it.
    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
        self.follow = false;
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_half_page_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(self.chat_height / 2);
        self.follow = false;
    }

    pub fn scroll_half_page_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(self.chat_height / 2);
    }

    pub fn jump_to_bottom(&mut self) {
        self.follow = true;
        self.scroll_chat_to_bottom();
    }

    /// Pin the viewport to the bottom of the chat, estimating wrapped line
    /// counts the same way the renderer lays them out.
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.transcript.messages() {
            total_lines += 1; // Role line ("You:" or "AI:")
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // Blank line after message
        }

        if self.streaming {
            total_lines += 1; // "Thinking..." indicator
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.streaming {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = Config {
            // An endpoint nothing listens on; tests never await the exchange.
            endpoint: "http://127.0.0.1:9".to_string(),
            ..Config::default()
        };
        App::new(config, tx)
    }

    #[tokio::test]
    async fn submit_pushes_user_message_and_opens_assistant_slot() {
        let mut app = test_app();
        app.input = "How much is egress?".to_string();
        app.submit();

        assert_eq!(app.transcript.len(), 2);
        assert_eq!(app.transcript.messages()[0].role, Role::User);
        assert_eq!(app.transcript.messages()[0].content, "How much is egress?");
        assert_eq!(app.transcript.messages()[1].role, Role::Assistant);
        assert_eq!(app.transcript.messages()[1].content, "");
        assert!(app.streaming);
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn whitespace_only_submit_is_a_noop() {
        let mut app = test_app();
        app.input = "   \n\t ".to_string();
        app.submit();

        assert!(app.transcript.is_empty());
        assert!(!app.streaming);
    }

    #[tokio::test]
    async fn submit_while_streaming_is_a_noop() {
        let mut app = test_app();
        app.input = "first".to_string();
        app.submit();
        assert_eq!(app.transcript.len(), 2);

        app.input = "second".to_string();
        app.submit();

        // Rejected, not queued: transcript unchanged, input untouched.
        assert_eq!(app.transcript.len(), 2);
        assert_eq!(app.input, "second");
    }

    #[tokio::test]
    async fn deltas_accumulate_into_the_open_slot() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.submit();

        app.on_stream_event(StreamEvent::Delta("Hel".to_string()));
        app.on_stream_event(StreamEvent::Delta("lo".to_string()));

        assert_eq!(app.transcript.messages()[1].content, "Hello");

        app.on_stream_event(StreamEvent::Done { deltas: 2 });
        assert!(!app.streaming);
        assert_eq!(app.transcript.messages()[1].content, "Hello");
    }

    #[tokio::test]
    async fn empty_stream_installs_the_error_placeholder() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.submit();
        app.on_stream_event(StreamEvent::Done { deltas: 0 });

        // One user message plus one placeholder assistant message.
        assert_eq!(app.transcript.len(), 2);
        assert_eq!(app.transcript.messages()[1].content, ERROR_REPLY);
        assert!(!app.streaming);
    }

    #[tokio::test]
    async fn protocol_failure_installs_the_error_placeholder() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.submit();
        app.on_stream_event(StreamEvent::Failed);

        assert_eq!(app.transcript.messages()[1].content, ERROR_REPLY);
        assert!(!app.streaming);
    }

    #[tokio::test]
    async fn network_failure_installs_the_distinct_placeholder() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.submit();
        app.on_stream_event(StreamEvent::NetworkError);

        assert_eq!(app.transcript.messages()[1].content, NETWORK_ERROR_REPLY);
        assert!(!app.streaming);
    }

    #[tokio::test]
    async fn reset_clears_transcript_and_pending_input() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.submit();
        app.on_stream_event(StreamEvent::Done { deltas: 0 });

        app.input = "half-typed".to_string();
        app.reset();

        assert!(app.transcript.is_empty());
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn reset_is_refused_mid_stream() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.submit();

        app.reset();
        assert_eq!(app.transcript.len(), 2);
        assert!(app.streaming);
    }

    #[tokio::test]
    async fn selected_prompt_submits_as_user_input() {
        let mut app = test_app();
        app.prompt_state.select(Some(1));
        app.submit_selected_prompt();

        assert_eq!(app.transcript.len(), 2);
        assert_eq!(
            app.transcript.messages()[0].content,
            app.config.prompts[1]
        );
    }

    #[tokio::test]
    async fn prompt_submission_requires_an_empty_conversation() {
        let mut app = test_app();
        app.input = "typed something".to_string();
        app.submit_selected_prompt();
        assert!(app.transcript.is_empty());
    }

    #[tokio::test]
    async fn mutations_are_observable() {
        let mut app = test_app();
        assert!(!app.take_mutations());

        app.input = "hi".to_string();
        app.submit();
        assert!(app.take_mutations());
        assert!(!app.take_mutations());
    }
}
