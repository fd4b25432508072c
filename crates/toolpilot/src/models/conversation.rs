use std::ops::Deref;

use serde::{Deserialize, Serialize};

use super::message::Message;

/// An append-only, ordered sequence of messages.
///
/// The provider relies on the order of messages, so there is no way to
/// remove, reorder or edit a message once it has been pushed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation(Vec<Message>);

impl Conversation {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Seed a conversation with an optional system prompt and the user's message
    pub fn seeded<S: Into<String>>(system_prompt: Option<&str>, user_text: S) -> Self {
        let mut conversation = Self::new();
        if let Some(prompt) = system_prompt {
            conversation.push(Message::system().with_text(prompt));
        }
        conversation.push(Message::user().with_text(user_text));
        conversation
    }

    pub fn push(&mut self, message: Message) {
        self.0.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.0
    }
}

impl Deref for Conversation {
    type Target = [Message];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Extend<Message> for Conversation {
    fn extend<T: IntoIterator<Item = Message>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self(messages)
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
