//! Error families (spec §7), following the teacher's convention of one
//! `thiserror` enum per component composed behind `anyhow::Result` at the
//! CLI boundary.

use crate::token::Position;
use thiserror::Error;

/// Errors raised while tokenizing a URL, HTTP message or XML document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input at {0}")]
    UnexpectedEnd(Position),
    #[error("malformed input at {0}: {1}")]
    Malformed(Position, String),
    #[error("invalid escape sequence at {0}")]
    InvalidEscape(Position),
    #[error("nesting depth exceeded at {0}")]
    DepthExceeded(Position),
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedEnd(p)
            | ParseError::Malformed(p, _)
            | ParseError::InvalidEscape(p)
            | ParseError::DepthExceeded(p) => *p,
        }
    }
}

/// Errors raised while building a device/service/action descriptor tree.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("device description has no usable device element")]
    MissingDevice,
    #[error("action argument {arg:?} has no resolvable data type (unknown state variable {var:?})")]
    MissingArgumentType { arg: String, var: String },
    #[error("descriptor XML is malformed: {0}")]
    DescriptorFormat(#[from] ParseError),
    #[error("request for device description failed: {0}")]
    Transport(#[from] TransportError),
    #[error("device description response was not HTTP 200: {0}")]
    Http(#[from] HttpError),
}

/// Errors raised by the HTTP transport layer (spec §4.E).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve host {host:?}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] std::io::Error),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("send timed out after {0} ms")]
    SendTimeout(u64),
    #[error("receive timed out after {0} ms")]
    ReceiveTimeout(u64),
    #[error("connection closed before a complete response was received")]
    ConnectionClosed,
    #[error("response exceeded the maximum size of {0} bytes")]
    ResponseTooLarge(usize),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// An HTTP-level failure: a response was received but was not usable.
#[derive(Debug, Error)]
#[error("HTTP status {status}{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
pub struct HttpError {
    pub status: u16,
    pub reason: Option<String>,
}

/// Errors raised by the Digest authenticator (spec §4.F).
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("WWW-Authenticate header is missing required field {0:?}")]
    MissingChallengeField(&'static str),
    #[error("server rejected the computed Digest response")]
    Rejected,
    #[error("WWW-Authenticate header could not be parsed: {0}")]
    Malformed(String),
}

/// Errors raised while selecting and invoking a SOAP action (spec §4.G).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("action {0:?} matches more than one device/service; qualify it")]
    AmbiguousAction(String),
    #[error("no action named {0:?} was found")]
    UnknownAction(String),
    #[error("missing value for input argument {0:?}")]
    MissingInputArgument(String),
    #[error("input argument {0:?} matches more than one action parameter")]
    AmbiguousInputArgument(String),
    #[error("response action name {found:?} does not match the invoked action {expected:?}")]
    ResponseActionMismatch { expected: String, found: String },
    #[error("response contains unknown output argument {0:?}")]
    UnknownOutputArgument(String),
    #[error("SOAP response is malformed: {0}")]
    BadResponseFormat(String),
    #[error("bad escape sequence in response: {0}")]
    BadEscape(#[from] ParseError),
    #[error("failed to render output: {0}")]
    RenderFailure(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Digest(#[from] DigestError),
}

/// A non-fatal problem with the descriptor cache (spec §7: "never fatal").
#[derive(Debug, Error, Clone)]
pub enum CacheWarning {
    #[error("could not read cache file {path:?}: {message}")]
    Read { path: String, message: String },
    #[error("cache file {path:?} is not a valid descriptor tree: {message}")]
    Format { path: String, message: String },
    #[error("could not write cache file {path:?}: {message}")]
    Write { path: String, message: String },
}

/// Configuration/option errors surfaced before any network activity starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option {0:?}")]
    UnknownOption(String),
    #[error("option {0:?} is ambiguous")]
    AmbiguousOption(String),
    #[error("invalid value {value:?} for {option}: {reason}")]
    BadValue {
        option: &'static str,
        value: String,
        reason: String,
    },
    #[error("timeout must be at least {min} ms, got {got}")]
    TimeoutTooSmall { min: u64, got: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
