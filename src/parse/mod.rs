//! The three token-parser families (spec §4.A): URL, HTTP message, and
//! SAX-style XML. Each shares [`Outcome`] as its terminal result and
//! [`crate::token::Flow`] as its visitor's control signal.

pub mod http;
pub mod url;
pub mod xml;

use crate::token::Position;

/// Terminal result of a single parser pass, shared by all three parsers.
/// Parser-specific additional failure kinds live on `E`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<E> {
    Success,
    /// The visitor returned `Flow::Stop`.
    Abort,
    UnexpectedCharacter(Position),
    UnexpectedEnd(Position),
    InvalidArgument,
    Other(E),
}

impl<E> Outcome<E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Find the first occurrence of `needle` in `haystack` at or after `from`.
pub(crate) fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    memchr::memmem::find(&haystack[from..], needle).map(|p| p + from)
}
