use crate::error::TranscriptError;
use crate::model::{Message, MessageRole};

/// Conversation history sent to the model on every turn.
///
/// Index 0 always holds the system prompt and user/assistant messages
/// alternate after it. Only complete replies are ever appended.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn reset(&mut self, system_prompt: impl Into<String>) {
        self.messages.clear();
        self.messages.push(Message::system(system_prompt));
    }

    pub fn append(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        if role == MessageRole::System {
            return Err(TranscriptError::InvalidRole(role));
        }

        let content = content.into();
        if content.trim().is_empty() {
            return Err(TranscriptError::EmptyMessage(role));
        }

        if self.last().is_some_and(|last| last.role == role) {
            return Err(TranscriptError::OutOfTurn(role));
        }

        self.messages.push(Message { role, content });
        Ok(())
    }

    /// Drops a trailing user message that never got a reply.
    pub fn withdraw_pending_user(&mut self) -> Option<Message> {
        if self.last().is_some_and(|last| last.role == MessageRole::User) {
            self.messages.pop()
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
