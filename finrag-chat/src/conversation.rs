//! The ordered record of a chat.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The person asking questions.
    User,
    /// The assistant answering them.
    Assistant,
}

impl Speaker {
    /// The speaker expected to follow this one.
    pub fn next(self) -> Self {
        match self {
            Self::User => Self::Assistant,
            Self::Assistant => Self::User,
        }
    }

    /// Label used when rendering history into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who said it.
    pub speaker: Speaker,
    /// What was said.
    pub text: String,
}

impl Turn {
    /// A user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::User, text: text.into() }
    }

    /// An assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Assistant, text: text.into() }
    }
}

/// An append-only sequence of turns.
///
/// Turns are only ever added by the state machine, a user turn and its
/// answer together, so a `Conversation` always starts with the user and
/// alternates strictly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// An empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turn has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The most recent assistant answer.
    pub fn last_answer(&self) -> Option<&str> {
        self.turns.iter().rev().find(|t| t.speaker == Speaker::Assistant).map(|t| t.text.as_str())
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_answer_skips_trailing_user_turn() {
        let mut conversation = Conversation::new();
        conversation.push(Turn::user("q1"));
        conversation.push(Turn::assistant("a1"));
        conversation.push(Turn::user("q2"));
        assert_eq!(conversation.last_answer(), Some("a1"));
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn speakers_alternate() {
        assert_eq!(Speaker::User.next(), Speaker::Assistant);
        assert_eq!(Speaker::Assistant.next(), Speaker::User);
    }
}
