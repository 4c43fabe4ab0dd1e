use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Ordered conversation history. Append-only, except that the final
/// message's content is rewritten while a response streams in.
#[derive(Default)]
pub struct Transcript {
    messages: Vec<Message>,
    subscribers: Vec<mpsc::UnboundedSender<()>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to mutation notifications. Every push, replace and clear
    /// sends one unit on the returned channel.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self) {
        self.subscribers.retain(|tx| tx.send(()).is_ok());
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
        self.notify();
    }

    /// Overwrite the content of the final message. Silent no-op on an empty
    /// transcript; the calling protocol never lets that happen.
    pub fn replace_last(&mut self, content: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            last.content = content.into();
            self.notify();
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.notify();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_appends_in_order() {
        let mut transcript = Transcript::new();
        transcript.push(Role::User, "hello");
        transcript.push(Role::Assistant, "hi");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].role, Role::User);
        assert_eq!(transcript.messages()[0].content, "hello");
        assert_eq!(transcript.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn replace_last_overwrites_only_the_final_message() {
        let mut transcript = Transcript::new();
        transcript.push(Role::User, "question");
        transcript.push(Role::Assistant, "");
        transcript.replace_last("partial");
        transcript.replace_last("partial answer");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].content, "question");
        assert_eq!(transcript.messages()[1].content, "partial answer");
    }

    #[test]
    fn replace_last_on_empty_transcript_is_a_noop() {
        let mut transcript = Transcript::new();
        transcript.replace_last("orphan");
        assert!(transcript.is_empty());
    }

    #[test]
    fn clear_empties_the_transcript() {
        let mut transcript = Transcript::new();
        transcript.push(Role::User, "a");
        transcript.push(Role::Assistant, "b");
        transcript.clear();
        assert!(transcript.is_empty());
    }

    #[test]
    fn subscribers_see_every_mutation() {
        let mut transcript = Transcript::new();
        let mut rx = transcript.subscribe();

        transcript.push(Role::User, "a");
        transcript.push(Role::Assistant, "");
        transcript.replace_last("b");
        transcript.clear();

        let mut notifications = 0;
        while rx.try_recv().is_ok() {
            notifications += 1;
        }
        assert_eq!(notifications, 4);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut transcript = Transcript::new();
        let rx = transcript.subscribe();
        drop(rx);
        transcript.push(Role::User, "a");
        assert!(transcript.subscribers.is_empty());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let message = Message {
            role: Role::Assistant,
            content: "hi".to_string(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
