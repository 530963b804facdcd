//! Depth-tracked extraction of complete stanzas from a token stream.

use std::fmt;

use crate::error::ParserError;
use crate::markup::{classify_token, MarkupKind};
use crate::token::Token;

/// An ordered sequence of tokens spanning either a pass-through fragment
/// (root tag, inter-stanza whitespace, top-level declaration) or exactly
/// one complete stanza rooted at the threshold depth.
///
/// The string form of a `TokenSequence` is the concatenation of its
/// tokens' text, and is always byte-identical to the slice of the
/// original input that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence {
    tokens: Vec<Token>,
    complete: bool,
}

impl TokenSequence {
    fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Is this a complete stanza (as opposed to a pass-through fragment)?
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// The tokens making up this sequence, in stream order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// True if this sequence carries no tokens at all (never emitted by
    /// the extractor on its own, but useful for callers building one by
    /// hand, e.g. a hook constructing a replacement).
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Build a sequence directly from raw text, marked complete. Used by
    /// hooks that replace a stanza's contents wholesale.
    pub fn from_text(text: impl Into<String>) -> Self {
        TokenSequence {
            tokens: vec![Token::Content(text.into())],
            complete: true,
        }
    }
}

impl fmt::Display for TokenSequence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for token in &self.tokens {
            f.write_str(token.text())?;
        }
        Ok(())
    }
}

/// Tracks element depth across a stream of tokens and groups them into
/// [`TokenSequence`]s, emitting a sequence whenever one completes.
#[derive(Debug)]
pub struct StanzaExtractor {
    threshold: u32,
    current_depth: u32,
    current: TokenSequence,
}

impl StanzaExtractor {
    /// Default stanza depth in XMPP: the root `<stream:stream>` sits at
    /// depth 1, its direct children (stanzas) at depth 2.
    pub const DEFAULT_THRESHOLD: u32 = 2;

    /// Construct an extractor with the given depth threshold.
    pub fn new(threshold: u32) -> Self {
        StanzaExtractor {
            threshold,
            current_depth: 0,
            current: TokenSequence::default(),
        }
    }

    /// Feed one token in. Returns `Some(sequence)` whenever a pass-through
    /// fragment or a complete stanza was just finished.
    pub fn add(&mut self, token: Token) -> Result<Option<TokenSequence>, ParserError> {
        let original = self.current_depth;
        let kind = classify_token(&token);

        let (effective, next, is_reset, is_self_contained) = match kind {
            None => (original, original, false, false),
            Some(MarkupKind::Open) => (original + 1, original + 1, false, false),
            Some(MarkupKind::Close) => {
                if original == 0 {
                    return Err(ParserError::NegativeDepth);
                }
                (original, original - 1, false, false)
            }
            Some(MarkupKind::SelfContained) => (original + 1, original, false, true),
            Some(MarkupKind::Declaration) | Some(MarkupKind::Comment) => {
                (original, original, false, false)
            }
            Some(MarkupKind::Reset) => (1, 0, true, false),
        };

        self.current.push(token);
        self.current_depth = next;

        if is_reset {
            return Ok(Some(self.take()));
        }

        if effective < self.threshold {
            return Ok(Some(self.take()));
        }

        if next < self.threshold && self.threshold <= original {
            self.current.complete = true;
            return Ok(Some(self.take()));
        }

        if is_self_contained && effective == self.threshold {
            self.current.complete = true;
            return Ok(Some(self.take()));
        }

        Ok(None)
    }

    fn take(&mut self) -> TokenSequence {
        std::mem::take(&mut self.current)
    }

    /// Current element depth. Exposed for diagnostics and tests; always
    /// `>= 0` by construction (a negative transition is reported as an
    /// error instead of being applied).
    pub fn current_depth(&self) -> u32 {
        self.current_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn extract(input: &str, threshold: u32) -> Vec<TokenSequence> {
        let mut tokenizer = Tokenizer::new();
        let mut extractor = StanzaExtractor::new(threshold);
        let mut out = Vec::new();
        for c in input.chars() {
            for token in tokenizer.push(c) {
                if let Some(seq) = extractor.add(token).expect("valid depth") {
                    out.push(seq);
                }
            }
        }
        out
    }

    #[test]
    fn nested_stanza_extraction() {
        let seqs = extract("<a><A1 uwu=\"magic\"><A2><A3>uwu</A3></A2></A1></a>", 2);
        let complete: Vec<_> = seqs.iter().filter(|s| s.complete()).collect();
        assert_eq!(complete.len(), 1);
        assert_eq!(
            complete[0].to_string(),
            "<A1 uwu=\"magic\"><A2><A3>uwu</A3></A2></A1>"
        );
    }

    #[test]
    fn self_contained_at_threshold() {
        let seqs = extract("<stream:stream><iq to='x' id='1'/></stream:stream>", 2);
        let complete: Vec<_> = seqs.iter().filter(|s| s.complete()).collect();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].to_string(), "<iq to='x' id='1'/>");
    }

    #[test]
    fn stream_reset_emits_no_stanza() {
        let input = "<?xml version='1.0'?><stream:stream></stream:stream><?xml version='1.0'?><stream:stream>";
        let seqs = extract(input, 2);
        assert!(seqs.iter().all(|s| !s.complete()));
    }

    #[test]
    fn reconstructing_the_input_is_lossless() {
        let input = "<stream:stream><message><body>hi</body></message><presence/></stream:stream>";
        let seqs = extract(input, 2);
        let reassembled: String = seqs.iter().map(|s| s.to_string()).collect();
        assert_eq!(reassembled, input);
    }

    #[test]
    fn chunk_split_invariance() {
        let input = "<a><A1 uwu=\"magic\"><A2><A3>uwu</A3></A2></A1></a>";
        let whole = extract(input, 2);

        // Feed byte-by-byte through a separately constructed pipeline; same
        // extractor/tokenizer pairing always consumes char-at-a-time
        // regardless of how the caller chunks the underlying `&str`, so
        // splitting `input` into 1-char pieces must produce the same list.
        let mut tokenizer = Tokenizer::new();
        let mut extractor = StanzaExtractor::new(2);
        let mut chunked = Vec::new();
        for piece in input.split("").filter(|s| !s.is_empty()) {
            for c in piece.chars() {
                for token in tokenizer.push(c) {
                    if let Some(seq) = extractor.add(token).expect("valid depth") {
                        chunked.push(seq);
                    }
                }
            }
        }
        assert_eq!(chunked, whole);
    }

    #[test]
    fn negative_depth_is_an_error() {
        let mut extractor = StanzaExtractor::new(2);
        let err = extractor.add(Token::Markup("</a>".into())).unwrap_err();
        assert!(matches!(err, ParserError::NegativeDepth));
    }

    #[test]
    fn current_depth_reflects_a_partial_feed() {
        let mut tokenizer = Tokenizer::new();
        let mut extractor = StanzaExtractor::new(2);
        for c in "<stream:stream><message>".chars() {
            for token in tokenizer.push(c) {
                extractor.add(token).expect("valid depth");
            }
        }
        assert_eq!(extractor.current_depth(), 2);
    }

    #[test]
    fn freshly_constructed_sequence_is_empty() {
        assert!(TokenSequence::default().is_empty());
    }
}
