//! The pluggable inspection point: a hook is invoked once per emitted
//! [`TokenSequence`] and may pass it through, replace it, or drop it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{error, warn};

use crate::extractor::TokenSequence;

/// Per-connection scratch space shared between a connection's two hooks.
/// Opaque to the proxy itself; hooks are free to stash whatever state
/// they need keyed by their own convention.
pub type HookState = HashMap<String, String>;

/// A stanza transformer invoked once per emitted [`TokenSequence`].
///
/// Implementations may inspect `sequence`, mutate `state`, and return:
/// - `Some(sequence)` unchanged, to pass it through;
/// - `Some(replacement)` built via [`TokenSequence::from_text`], to rewrite it;
/// - `None`, to drop it.
///
/// A hook that panics is treated the same as one that silently requested
/// pass-through: the panic is caught, logged, and the original sequence
/// is forwarded (see [`invoke`]). Hooks are otherwise invoked strictly in
/// the order their terminating token appeared in the input stream.
pub trait Hook: Send {
    /// Process one emitted sequence.
    fn call(&mut self, state: &mut HookState, sequence: TokenSequence) -> Option<TokenSequence>;
}

/// Runs `hook` over `sequence`, catching a panic and falling back to
/// passing the original sequence through unchanged. This is the only
/// place a hook panic is allowed to surface; it must never take the
/// connection down with it (see the error-handling contract).
pub fn invoke(
    hook: &mut dyn Hook,
    state: &mut HookState,
    sequence: TokenSequence,
) -> Option<TokenSequence> {
    let original = sequence.clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| hook.call(state, sequence)));
    match outcome {
        Ok(result) => result,
        Err(_) => {
            error!("hook panicked; forwarding original sequence unchanged");
            Some(original)
        }
    }
}

/// Identity hook: passes every sequence through unchanged. Useful as a
/// default and in idempotence tests.
#[derive(Debug, Default)]
pub struct IdentityHook;

impl Hook for IdentityHook {
    fn call(&mut self, _state: &mut HookState, sequence: TokenSequence) -> Option<TokenSequence> {
        Some(sequence)
    }
}

/// The shipped reference hook.
///
/// Scans the string form of each complete stanza for the literal
/// sentinel `REPLACEME<base64>REPLACEME`; if found, base64-decodes the
/// substring between the sentinels and substitutes the decoded text as
/// the outgoing stanza's string form. Non-matching or non-complete
/// sequences pass through unchanged. A decode failure is logged and the
/// original sequence is forwarded.
#[derive(Debug, Default)]
pub struct ReplaceHook;

const SENTINEL: &str = "REPLACEME";

impl Hook for ReplaceHook {
    fn call(&mut self, _state: &mut HookState, sequence: TokenSequence) -> Option<TokenSequence> {
        if !sequence.complete() {
            return Some(sequence);
        }

        let body = sequence.to_string();
        match extract_payload(&body) {
            Some(encoded) => match base64::decode(encoded) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(decoded) => Some(TokenSequence::from_text(decoded)),
                    Err(e) => {
                        warn!("REPLACEME payload was not valid UTF-8: {}", e);
                        Some(sequence)
                    }
                },
                Err(e) => {
                    warn!("failed to base64-decode REPLACEME payload: {}", e);
                    Some(sequence)
                }
            },
            None => Some(sequence),
        }
    }
}

/// Pull the substring between the first two `REPLACEME` sentinels, if any.
fn extract_payload(body: &str) -> Option<&str> {
    let after_first = body.split(SENTINEL).nth(1)?;
    let end = after_first.find(SENTINEL)?;
    Some(&after_first[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_non_complete_sequences_through() {
        let mut hook = ReplaceHook;
        let mut state = HookState::new();
        let seq = TokenSequence::default();
        assert_eq!(hook.call(&mut state, seq.clone()), Some(seq));
    }

    #[test]
    fn substitutes_decoded_payload() {
        let mut hook = ReplaceHook;
        let mut state = HookState::new();
        let encoded = base64::encode("HELLO");
        let body = format!("REPLACEME{}REPLACEME", encoded);
        let seq = TokenSequence::from_text(body);
        let result = hook.call(&mut state, seq).unwrap();
        assert_eq!(result.to_string(), "HELLO");
    }

    #[test]
    fn leaves_non_matching_stanza_untouched() {
        let mut hook = ReplaceHook;
        let mut state = HookState::new();
        let seq = TokenSequence::from_text("<body>hi</body>");
        let result = hook.call(&mut state, seq.clone()).unwrap();
        assert_eq!(result, seq);
    }

    #[test]
    fn bad_base64_forwards_original() {
        let mut hook = ReplaceHook;
        let mut state = HookState::new();
        let seq = TokenSequence::from_text("REPLACEMEnot-base64!!REPLACEME");
        let result = hook.call(&mut state, seq.clone()).unwrap();
        assert_eq!(result, seq);
    }

    #[test]
    fn panicking_hook_is_caught_and_original_is_forwarded() {
        struct Boom;
        impl Hook for Boom {
            fn call(&mut self, _: &mut HookState, _: TokenSequence) -> Option<TokenSequence> {
                panic!("boom");
            }
        }
        let mut hook = Boom;
        let mut state = HookState::new();
        let seq = TokenSequence::from_text("<message/>");
        let result = invoke(&mut hook, &mut state, seq.clone());
        assert_eq!(result, Some(seq));
    }
}
