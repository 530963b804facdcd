//! Classification of a completed `Markup` token.

use crate::token::Token;

/// A classification of a `Markup` token.
///
/// `Reset` is a narrow literal-match sentinel used for XMPP stream
/// renegotiation; it takes precedence over every other classification.
/// Otherwise the first matching row in the table below wins, in the
/// order `Declaration → Comment → SelfContained → Close → Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    /// `<a>`, `<a x="1">`
    Open,
    /// `</a>`
    Close,
    /// `<a/>`, `<a x="1"/>`
    SelfContained,
    /// `<?xml ... ?>`
    Declaration,
    /// `<!-- ... -->`
    Comment,
    /// `<?xml version='1.0'?>` or `<?xml version="1.0"?>`, exactly
    Reset,
}

const RESET_SINGLE: &str = "<?xml version='1.0'?>";
const RESET_DOUBLE: &str = "<?xml version=\"1.0\"?>";

/// Classify a `Markup` token's text.
///
/// Invariantly `b starts with '<'` and `b ends with '>'` for any text
/// produced by [`crate::tokenizer::Tokenizer`]; this function does not
/// re-validate that, it only distinguishes between the markup kinds.
pub fn classify(b: &str) -> MarkupKind {
    if b == RESET_SINGLE || b == RESET_DOUBLE {
        return MarkupKind::Reset;
    }
    if is_declaration(b) {
        return MarkupKind::Declaration;
    }
    if is_comment(b) {
        return MarkupKind::Comment;
    }
    if is_self_contained(b) {
        return MarkupKind::SelfContained;
    }
    if is_close(b) {
        return MarkupKind::Close;
    }
    MarkupKind::Open
}

fn is_declaration(b: &str) -> bool {
    b.len() > 4 && b.starts_with("<?") && b.ends_with("?>")
}

fn is_comment(b: &str) -> bool {
    b.len() > 7 && b.starts_with("<!--") && b.ends_with("-->")
}

fn is_self_contained(b: &str) -> bool {
    b.len() > 3 && b.ends_with("/>")
}

fn is_close(b: &str) -> bool {
    b.len() > 3 && b.starts_with("</") && b.ends_with('>')
}

/// Classify a `Markup` [`Token`], returning `None` for `Content` tokens.
pub fn classify_token(token: &Token) -> Option<MarkupKind> {
    match token {
        Token::Markup(text) => Some(classify(text)),
        Token::Content(_) => None,
    }
}
