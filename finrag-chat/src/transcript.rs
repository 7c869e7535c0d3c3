//! The legacy single-string transcript format.
//!
//! Older front ends keep the whole chat in one string. Every turn is written
//! as a speaker prefix followed by the text and terminated by [`DELIMITER`]:
//!
//! ```text
//! Human: What was total revenue?<split>ChatBot: $25.2 billion.<split>
//! ```
//!
//! [`decode`] turns such a string into a [`Conversation`] and [`encode`]
//! does the reverse. Turn text must not contain the delimiter, so [`encode`]
//! strips it.

use thiserror::Error;
use tracing::warn;

use crate::conversation::{Conversation, Speaker, Turn};

/// Terminates every turn in a legacy transcript.
pub const DELIMITER: &str = "<split>";

/// Prefix of a user turn.
pub const USER_PREFIX: &str = "Human: ";

/// Prefix of an assistant turn.
pub const ASSISTANT_PREFIX: &str = "ChatBot: ";

/// Why a transcript string could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    /// The final turn is not followed by the delimiter.
    #[error("turn {position} is not terminated by '<split>'")]
    Unterminated {
        /// Zero-based index of the turn.
        position: usize,
    },

    /// A segment carries neither speaker prefix.
    #[error("turn {position} has no speaker prefix")]
    UnknownSpeaker {
        /// Zero-based index of the turn.
        position: usize,
    },

    /// Turns do not alternate starting with the user.
    #[error("turn {position} should be spoken by {expected:?}")]
    OutOfOrder {
        /// Zero-based index of the turn.
        position: usize,
        /// The speaker that should have been there.
        expected: Speaker,
    },

    /// The transcript ends on a user turn with no answer.
    #[error("turn {position} is a question without an answer")]
    Unanswered {
        /// Zero-based index of the turn.
        position: usize,
    },
}

fn prefix(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::User => USER_PREFIX,
        Speaker::Assistant => ASSISTANT_PREFIX,
    }
}

/// Parse a legacy transcript.
///
/// The empty string is the empty conversation. Every user turn must be
/// followed by an answer, so a decoded conversation can always take the
/// next question.
pub fn decode(transcript: &str) -> Result<Conversation, TranscriptError> {
    let mut conversation = Conversation::new();
    if transcript.is_empty() {
        return Ok(conversation);
    }

    let mut segments: Vec<&str> = transcript.split(DELIMITER).collect();
    // A terminated transcript always ends with an empty segment.
    if segments.pop() != Some("") {
        return Err(TranscriptError::Unterminated { position: segments.len() });
    }

    let mut expected = Speaker::User;
    for (position, segment) in segments.into_iter().enumerate() {
        let (speaker, text) = if let Some(text) = segment.strip_prefix(USER_PREFIX) {
            (Speaker::User, text)
        } else if let Some(text) = segment.strip_prefix(ASSISTANT_PREFIX) {
            (Speaker::Assistant, text)
        } else {
            return Err(TranscriptError::UnknownSpeaker { position });
        };

        if speaker != expected {
            return Err(TranscriptError::OutOfOrder { position, expected });
        }
        conversation.push(Turn { speaker, text: text.to_string() });
        expected = expected.next();
    }

    if expected == Speaker::Assistant {
        return Err(TranscriptError::Unanswered { position: conversation.len() - 1 });
    }
    Ok(conversation)
}

/// Remove every delimiter from `text`, including ones formed by removal.
fn strip_delimiter(text: &str) -> String {
    let mut stripped = text.replace(DELIMITER, "");
    while stripped.contains(DELIMITER) {
        stripped = stripped.replace(DELIMITER, "");
    }
    stripped
}

/// Render a conversation in the legacy format.
pub fn encode(conversation: &Conversation) -> String {
    let mut out = String::new();
    for turn in conversation.turns() {
        out.push_str(prefix(turn.speaker));
        if turn.text.contains(DELIMITER) {
            warn!(speaker = ?turn.speaker, "stripping transcript delimiter from turn text");
            out.push_str(&strip_delimiter(&turn.text));
        } else {
            out.push_str(&turn.text);
        }
        out.push_str(DELIMITER);
    }
    out
}
