//! Crate-wide error types: a top-level `Error` covering I/O, TLS,
//! configuration, and parser failures, and a narrower `ParserError` for
//! the tokenizer/extractor layer.

use std::fmt;
use std::io::Error as IoError;
use std::str::Utf8Error;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(IoError),
    /// TLS handshake or certificate error
    Tls(native_tls::Error),
    /// Stanza-stream tokenization/extraction error
    Parser(ParserError),
    /// The configured server certificate could not be loaded
    Config(String),
    /// Shoud never happen
    InvalidState,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "IO error: {}", e),
            Error::Tls(e) => write!(fmt, "TLS error: {}", e),
            Error::Parser(e) => write!(fmt, "parser error: {}", e),
            Error::Config(msg) => write!(fmt, "configuration error: {}", msg),
            Error::InvalidState => write!(fmt, "invalid state"),
        }
    }
}

impl std::error::Error for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Self {
        Error::Tls(e)
    }
}

impl From<ParserError> for Error {
    fn from(e: ParserError) -> Self {
        Error::Parser(e)
    }
}

/// Causes for stream parsing errors
#[derive(Debug)]
pub enum ParserError {
    /// Encoding error: a chunk contained bytes that are not valid UTF-8.
    /// XMPP mandates UTF-8, so this is fatal for the direction that
    /// produced it.
    Utf8(Utf8Error),
    /// The extractor's depth counter went negative. A programming error,
    /// not a malformed-input condition; still reported per the
    /// fatal-depth policy rather than silently clamped.
    NegativeDepth,
}

impl fmt::Display for ParserError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParserError::Utf8(e) => write!(fmt, "UTF-8 error: {}", e),
            ParserError::NegativeDepth => write!(fmt, "extractor depth went negative"),
        }
    }
}

impl std::error::Error for ParserError {}

impl From<Utf8Error> for ParserError {
    fn from(e: Utf8Error) -> Self {
        ParserError::Utf8(e)
    }
}
