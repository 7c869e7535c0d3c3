//! Prompt composition.
//!
//! A [`PromptComposer`] fills a template with the instruction, the retrieved
//! context and the user's question. Templates use `{name}` placeholders:
//!
//! | Placeholder     | Required | Replaced with                              |
//! |-----------------|----------|--------------------------------------------|
//! | `{instruction}` | yes      | the configured instruction text            |
//! | `{context}`     | yes      | retrieved chunk texts, best match first    |
//! | `{question}`    | yes      | the user's question                        |
//! | `{history}`     | no       | the last `max_history_turns` turns         |
//!
//! Literal braces are written `{{` and `}}`. Templates are parsed once, at
//! startup, so a malformed one is a configuration error rather than a
//! per-turn failure.

use finrag_rag::SearchResult;

use crate::conversation::Turn;
use crate::error::{ChatError, Result};

/// Instruction sent with every question unless configured otherwise.
pub const DEFAULT_INSTRUCTION: &str = "You are an assistant for question-answering tasks for \
Retrieval Augmented Generation system for the financial reports such as 10Q and 10K. Use the \
following pieces of retrieved context to answer the question. If you don't know the answer, just \
say that you don't know. Use two sentences maximum and keep the answer concise.";

/// Template used unless configured otherwise.
pub const DEFAULT_TEMPLATE: &str = "{instruction}\nQuestion: {question} \nContext: {context} \nAnswer:";

/// Separator placed between retrieved chunks in the context section.
pub const CONTEXT_DELIMITER: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Instruction,
    Context,
    Question,
    History,
}

impl Slot {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "instruction" => Some(Self::Instruction),
            "context" => Some(Self::Context),
            "question" => Some(Self::Question),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Slot),
}

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse and validate a template.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if a placeholder is unknown or
    /// unbalanced, or if `{instruction}`, `{context}` or `{question}` does
    /// not appear exactly once.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(ChatError::Config(format!(
                                    "unclosed placeholder '{{{name}' in prompt template"
                                )));
                            }
                        }
                    }
                    let slot = Slot::parse(name.trim()).ok_or_else(|| {
                        ChatError::Config(format!("unknown placeholder '{{{name}}}' in prompt template"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(slot));
                }
                '}' => {
                    return Err(ChatError::Config(
                        "unmatched '}' in prompt template (write '}}' for a literal brace)".to_string(),
                    ));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (slot, name) in [
            (Slot::Instruction, "instruction"),
            (Slot::Context, "context"),
            (Slot::Question, "question"),
        ] {
            let count = segments.iter().filter(|s| **s == Segment::Slot(slot)).count();
            if count != 1 {
                return Err(ChatError::Config(format!(
                    "prompt template must contain {{{name}}} exactly once, found {count}"
                )));
            }
        }

        Ok(Self { segments })
    }

    fn uses_history(&self) -> bool {
        self.segments.contains(&Segment::Slot(Slot::History))
    }
}

/// The parsed form of [`DEFAULT_TEMPLATE`].
impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Slot(Slot::Instruction),
                Segment::Literal("\nQuestion: ".to_string()),
                Segment::Slot(Slot::Question),
                Segment::Literal(" \nContext: ".to_string()),
                Segment::Slot(Slot::Context),
                Segment::Literal(" \nAnswer:".to_string()),
            ],
        }
    }
}

/// Builds the text sent to the language model.
///
/// Composition is a pure function of its inputs: the same question, chunks
/// and history always produce the same prompt.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    template: PromptTemplate,
    instruction: String,
    max_history_turns: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self {
            template: PromptTemplate::default(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            max_history_turns: 0,
        }
    }
}

impl PromptComposer {
    /// Create a composer from a template string.
    ///
    /// # Errors
    ///
    /// Propagates template validation errors from [`PromptTemplate::parse`].
    pub fn new(template: &str, instruction: impl Into<String>) -> Result<Self> {
        Ok(Self {
            template: PromptTemplate::parse(template)?,
            instruction: instruction.into(),
            max_history_turns: 0,
        })
    }

    /// Include up to `turns` prior turns wherever the template has `{history}`.
    pub fn with_max_history_turns(mut self, turns: usize) -> Self {
        self.max_history_turns = turns;
        self
    }

    /// The configured instruction.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Fill the template.
    ///
    /// `chunks` are expected in ranking order and are joined with
    /// [`CONTEXT_DELIMITER`]. With no chunks the context section is empty.
    pub fn compose(&self, question: &str, chunks: &[SearchResult], history: &[Turn]) -> String {
        let mut prompt = String::new();
        for segment in &self.template.segments {
            match segment {
                Segment::Literal(text) => prompt.push_str(text),
                Segment::Slot(Slot::Instruction) => prompt.push_str(&self.instruction),
                Segment::Slot(Slot::Question) => prompt.push_str(question),
                Segment::Slot(Slot::Context) => {
                    for (i, result) in chunks.iter().enumerate() {
                        if i > 0 {
                            prompt.push_str(CONTEXT_DELIMITER);
                        }
                        prompt.push_str(&result.chunk.text);
                    }
                }
                Segment::Slot(Slot::History) => self.render_history(&mut prompt, history),
            }
        }
        prompt
    }

    fn render_history(&self, prompt: &mut String, history: &[Turn]) {
        let start = history.len().saturating_sub(self.max_history_turns);
        for (i, turn) in history[start..].iter().enumerate() {
            if i > 0 {
                prompt.push('\n');
            }
            prompt.push_str(turn.speaker.label());
            prompt.push_str(": ");
            prompt.push_str(&turn.text);
        }
    }

    /// Whether prior turns influence composed prompts.
    pub fn uses_history(&self) -> bool {
        self.max_history_turns > 0 && self.template.uses_history()
    }
}
