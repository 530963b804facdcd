//! Bidirectional stream processor: owns one tokenizer+extractor per
//! direction, applies that direction's hook to each emitted sequence,
//! and re-serializes the result back to bytes.

use std::str::from_utf8;

use crate::error::ParserError;
use crate::extractor::StanzaExtractor;
use crate::hook::{self, Hook, HookState};
use crate::tokenizer::Tokenizer;

/// One direction's tokenizer/extractor pair plus its hook. Independent
/// of the other direction except for the opaque, connection-shared
/// [`HookState`].
struct DirectionalStream {
    tokenizer: Tokenizer,
    extractor: StanzaExtractor,
    hook: Box<dyn Hook>,
    /// Bytes held back from the previous chunk because they looked like
    /// a UTF-8 sequence truncated at the chunk boundary, not genuinely
    /// malformed input.
    pending: Vec<u8>,
}

/// A multi-byte UTF-8 sequence is at most 4 bytes, so a decode error
/// whose valid prefix ends within the last 3 bytes of the buffer is
/// treated as "the rest hasn't arrived yet" rather than corruption.
const MAX_UTF8_SEQ_TAIL: usize = 3;

impl DirectionalStream {
    fn new(threshold: u32, hook: Box<dyn Hook>) -> Self {
        DirectionalStream {
            tokenizer: Tokenizer::new(),
            extractor: StanzaExtractor::new(threshold),
            hook,
            pending: Vec::new(),
        }
    }

    /// Tokenize, extract, hook, and re-serialize one chunk.
    fn process(&mut self, state: &mut HookState, chunk: &[u8]) -> Result<Vec<u8>, ParserError> {
        let mut buf = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut combined = std::mem::take(&mut self.pending);
            combined.extend_from_slice(chunk);
            combined
        };

        let valid_len = match from_utf8(&buf) {
            Ok(_) => buf.len(),
            Err(e) if buf.len() - e.valid_up_to() <= MAX_UTF8_SEQ_TAIL => e.valid_up_to(),
            Err(e) => return Err(ParserError::from(e)),
        };

        if valid_len < buf.len() {
            self.pending = buf.split_off(valid_len);
        }
        let text = from_utf8(&buf).expect("valid_up_to prefix is valid utf8");

        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            for token in self.tokenizer.push(c) {
                if let Some(sequence) = self.extractor.add(token)? {
                    if let Some(sequence) = hook::invoke(self.hook.as_mut(), state, sequence) {
                        out.push_str(&sequence.to_string());
                    }
                }
            }
        }

        Ok(out.into_bytes())
    }
}

/// Owns both directions of one connection plus the shared hook state and
/// the two mode flags from the connection's configuration.
pub struct StreamProcessor {
    client: DirectionalStream,
    server: DirectionalStream,
    state: HookState,
    /// Skip tokenization entirely and forward bytes verbatim. Set once
    /// inspection is no longer meaningful (e.g. after an encryption
    /// upgrade the proxy cannot see through).
    pub bypass: bool,
    /// Run tokenization (so hooks still observe stanzas) but always emit
    /// the original bytes rather than the re-serialized ones.
    pub no_modification: bool,
}

impl StreamProcessor {
    /// Construct a processor for one connection, given the depth
    /// threshold and the two directions' hooks.
    pub fn new(threshold: u32, client_hook: Box<dyn Hook>, server_hook: Box<dyn Hook>) -> Self {
        StreamProcessor {
            client: DirectionalStream::new(threshold, client_hook),
            server: DirectionalStream::new(threshold, server_hook),
            state: HookState::new(),
            bypass: false,
            no_modification: false,
        }
    }

    /// Process a chunk read from the downstream client, returning the
    /// bytes to write to the upstream server.
    pub fn client_chunk(&mut self, data: &[u8]) -> Result<Vec<u8>, ParserError> {
        Self::run(
            &mut self.client,
            &mut self.state,
            data,
            self.bypass,
            self.no_modification,
        )
    }

    /// Process a chunk read from the upstream server, returning the
    /// bytes to write to the downstream client.
    pub fn server_chunk(&mut self, data: &[u8]) -> Result<Vec<u8>, ParserError> {
        Self::run(
            &mut self.server,
            &mut self.state,
            data,
            self.bypass,
            self.no_modification,
        )
    }

    fn run(
        direction: &mut DirectionalStream,
        state: &mut HookState,
        data: &[u8],
        bypass: bool,
        no_modification: bool,
    ) -> Result<Vec<u8>, ParserError> {
        if bypass {
            return Ok(data.to_vec());
        }

        let rewritten = direction.process(state, data)?;

        if no_modification {
            Ok(data.to_vec())
        } else {
            Ok(rewritten)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{IdentityHook, ReplaceHook};

    #[test]
    fn identity_hooks_round_trip_bytes_unchanged() {
        let mut processor =
            StreamProcessor::new(2, Box::new(IdentityHook), Box::new(IdentityHook));
        let input = b"<?xml version='1.0'?><stream:stream><message><body>hi</body></message></stream:stream>";
        let out = processor.client_chunk(input).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn bypass_skips_tokenization_entirely() {
        let mut processor =
            StreamProcessor::new(2, Box::new(IdentityHook), Box::new(IdentityHook));
        processor.bypass = true;
        // Deliberately malformed/binary: would fail UTF-8 decoding if
        // tokenized, but bypass must return it untouched.
        let input = &[0xff, 0xfe, b'<'];
        let out = processor.client_chunk(input).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn no_modification_observes_but_emits_original_bytes() {
        let mut processor =
            StreamProcessor::new(2, Box::new(ReplaceHook), Box::new(IdentityHook));
        processor.no_modification = true;
        let encoded = base64::encode("HELLO");
        let input = format!(
            "<stream:stream><message>REPLACEME{}REPLACEME</message></stream:stream>",
            encoded
        );
        let out = processor.client_chunk(input.as_bytes()).unwrap();
        assert_eq!(out, input.as_bytes());
    }

    #[test]
    fn hook_substitution_end_to_end() {
        let mut processor = StreamProcessor::new(2, Box::new(ReplaceHook), Box::new(IdentityHook));
        let encoded = base64::encode("HELLO");
        let input = format!(
            "<stream:stream>REPLACEME{}REPLACEME</stream:stream>",
            encoded
        );
        let out = processor.client_chunk(input.as_bytes()).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out, "<stream:stream>HELLO</stream:stream>");
    }

    #[test]
    fn malformed_utf8_is_a_parser_error() {
        let mut processor =
            StreamProcessor::new(2, Box::new(IdentityHook), Box::new(IdentityHook));
        // An invalid byte followed by more than MAX_UTF8_SEQ_TAIL trailing
        // bytes cannot be a truncated sequence; it's genuine corruption.
        let mut input = b"<a>".to_vec();
        input.push(0xff);
        input.extend_from_slice(b"trailing-bytes");
        let out = processor.client_chunk(&input);
        assert!(out.is_err());
    }

    #[test]
    fn truncated_multibyte_char_at_chunk_boundary_is_buffered_not_errored() {
        let mut processor =
            StreamProcessor::new(2, Box::new(IdentityHook), Box::new(IdentityHook));
        let whole = "<a>caf\u{e9}</a>"; // 'é' is encoded as two UTF-8 bytes
        let bytes = whole.as_bytes();
        let split = bytes.len() - 1; // split inside the two-byte sequence
        let mut out = processor.client_chunk(&bytes[..split]).unwrap();
        out.extend(processor.client_chunk(&bytes[split..]).unwrap());
        assert_eq!(out, bytes);
    }

    #[test]
    fn chunked_input_produces_the_same_output_as_one_shot() {
        let whole = "<stream:stream><message><body>hi</body></message></stream:stream>";
        let mut one_shot =
            StreamProcessor::new(2, Box::new(IdentityHook), Box::new(IdentityHook));
        let one_shot_out = one_shot.client_chunk(whole.as_bytes()).unwrap();

        let mut chunked = StreamProcessor::new(2, Box::new(IdentityHook), Box::new(IdentityHook));
        let mut chunked_out = Vec::new();
        for byte in whole.as_bytes() {
            chunked_out.extend(chunked.client_chunk(&[*byte]).unwrap());
        }

        assert_eq!(one_shot_out, chunked_out);
    }
}
