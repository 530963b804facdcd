#![deny(unsafe_code, missing_docs, bare_trait_objects)]

//! Intercepting TLS-to-TLS proxy for XMPP: terminates a client's TLS
//! connection, segments both directions of the stream into stanzas, runs
//! each stanza through a pluggable hook, and forwards the result to an
//! upstream XMPP server over its own TLS connection.

pub mod config;
pub mod connection;
pub mod error;
pub mod extractor;
pub mod hook;
pub mod listener;
pub mod markup;
pub mod processor;
pub mod tls;
pub mod token;
pub mod tokenizer;

pub use crate::error::{Error, ParserError};
pub use crate::extractor::{StanzaExtractor, TokenSequence};
pub use crate::hook::{Hook, HookState};
pub use crate::processor::StreamProcessor;
pub use crate::token::Token;
pub use crate::tokenizer::Tokenizer;
