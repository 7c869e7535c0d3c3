//! Property tests for the legacy transcript format.

use finrag_chat::transcript::{decode, encode};
use finrag_chat::{Speaker, TranscriptError};
use proptest::prelude::*;

/// Turn text: anything, including newlines and speaker prefixes, except the delimiter.
fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ?$.,\n]{0,40}",
        "(Human: |ChatBot: )[a-z ]{0,10}",
    ]
    .prop_filter("no delimiter", |t| !t.contains("<split>"))
}

fn render(pairs: &[(String, String)]) -> String {
    pairs.iter().map(|(q, a)| format!("Human: {q}<split>ChatBot: {a}<split>")).collect()
}

proptest! {
    #[test]
    fn prop_well_formed_transcripts_decode_faithfully(
        pairs in proptest::collection::vec((arb_text(), arb_text()), 0..6)
    ) {
        let transcript = render(&pairs);
        let conversation = decode(&transcript).unwrap();

        prop_assert_eq!(conversation.len(), pairs.len() * 2);
        for (i, turn) in conversation.turns().iter().enumerate() {
            let (q, a) = &pairs[i / 2];
            let (speaker, text) = if i % 2 == 0 { (Speaker::User, q) } else { (Speaker::Assistant, a) };
            prop_assert_eq!(turn.speaker, speaker);
            prop_assert_eq!(&turn.text, text);
        }
        prop_assert_eq!(encode(&conversation), transcript);
    }

    #[test]
    fn prop_truncated_transcripts_are_rejected(
        pairs in proptest::collection::vec((arb_text(), arb_text()), 1..4),
        cut in 1usize..8,
    ) {
        let transcript = render(&pairs);
        let truncated = &transcript[..transcript.len() - cut.min(transcript.len())];
        // Cutting into the final delimiter leaves an unterminated tail.
        prop_assume!(!truncated.ends_with("<split>") && !truncated.is_empty());
        let is_unterminated = matches!(decode(truncated), Err(TranscriptError::Unterminated { .. }));
        prop_assert!(is_unterminated);
    }
}

#[test]
fn unanswered_question_is_rejected() {
    assert_eq!(
        decode("Human: pending<split>"),
        Err(TranscriptError::Unanswered { position: 0 })
    );
}
