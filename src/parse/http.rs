//! HTTP request/response token parser (spec §4.A "HTTP parser").
//!
//! A state machine over a single message (request or response) with an
//! optional body, driving a [`HttpVisitor`] one event at a time. Designed to
//! be resumable: on `UnexpectedEnd` the transport grows its buffer and calls
//! `parse` again from the start with more bytes available (spec §4.E).

use super::Outcome;
use crate::charclass::{is_http_delimiter, is_http_tchar, is_xml_white_space};
use crate::token::{Flow, Position, PositionTracker, Token};

#[derive(Debug, Clone, Copy)]
pub enum HttpEvent {
    Request { method: Token, target: Token, version: Token },
    Status { version: Token, code: u16, reason: Token },
    Parameter { name: Token, value: Token },
    /// The full message length, once `Content-Length` made it computable.
    Expected { total_length: usize },
    Body { bytes: Token },
}

pub trait HttpVisitor {
    fn visit(&mut self, event: HttpEvent) -> Flow;
}

/// HTTP-parser-specific failure kinds layered on the shared [`Outcome`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFail {
    /// `Content-Length` appeared twice, or overflowed a signed long.
    DuplicateOrBadContentLength,
}

pub type HttpOutcome = Outcome<HttpFail>;

enum Kind {
    Request,
    Status,
}

pub fn parse(bytes: &[u8], visitor: &mut dyn HttpVisitor) -> HttpOutcome {
    let len = bytes.len();
    let mut pos = PositionTracker::new(8);
    let mut i = 0usize;

    macro_rules! at {
        ($i:expr) => {
            Position {
                line: pos.position().line,
                column: pos.position().column,
                line_start: pos.position().line_start,
            }
        };
    }

    // --- start line ---
    let first_space = match find_byte(bytes, i, b' ') {
        Some(p) => p,
        None => return Outcome::UnexpectedEnd(at!(i)),
    };
    // Disambiguate: a status line's first token is an HTTP version
    // (`HTTP/<digit>.<digit>`); a request line's first token is a method
    // followed by a space then the target.
    let first_token = &bytes[i..first_space];
    let kind = if first_token.starts_with(b"HTTP/") {
        Kind::Status
    } else {
        Kind::Request
    };

    for &b in &bytes[i..first_space] {
        pos.advance(i, b);
        i += 1;
    }

    match kind {
        Kind::Request => {
            let method = Token::new(0, first_space);
            for &b in &bytes[0..first_space] {
                if !is_http_tchar(b) {
                    return Outcome::UnexpectedCharacter(at!(0));
                }
            }
            i = first_space + 1;
            pos.advance(first_space, b' ');

            let target_start = i;
            let target_end = match find_byte(bytes, i, b' ') {
                Some(p) => p,
                None => return Outcome::UnexpectedEnd(at!(i)),
            };
            for off in target_start..target_end {
                if is_bad_control_byte(bytes[off]) {
                    return Outcome::UnexpectedCharacter(at!(off));
                }
                pos.advance(off, bytes[off]);
            }
            let target = Token::new(target_start, target_end - target_start);
            i = target_end + 1;
            pos.advance(target_end, b' ');

            let version_start = i;
            let version_end = match find_byte(bytes, i, b'\r') {
                Some(p) => p,
                None => return Outcome::UnexpectedEnd(at!(i)),
            };
            for off in version_start..version_end {
                pos.advance(off, bytes[off]);
            }
            let version = Token::new(version_start, version_end - version_start);
            i = version_end;

            if !consume_crlf(bytes, &mut i, &mut pos) {
                return Outcome::UnexpectedEnd(at!(i));
            }

            if visitor
                .visit(HttpEvent::Request { method, target, version })
                .is_stop()
            {
                return Outcome::Abort;
            }
        }
        Kind::Status => {
            let version = Token::new(0, first_space);
            i = first_space + 1;
            pos.advance_all(0, &bytes[0..=first_space]);

            let code_start = i;
            let code_end = match find_byte(bytes, i, b' ') {
                Some(p) => p,
                None => return Outcome::UnexpectedEnd(at!(i)),
            };
            let code_str = std::str::from_utf8(&bytes[code_start..code_end]).unwrap_or("");
            let code: u16 = match code_str.parse() {
                Ok(c) => c,
                Err(_) => return Outcome::UnexpectedCharacter(at!(code_start)),
            };
            for off in code_start..code_end {
                pos.advance(off, bytes[off]);
            }
            i = code_end + 1;
            pos.advance(code_end, b' ');

            let reason_start = i;
            let reason_end = match find_byte(bytes, i, b'\r') {
                Some(p) => p,
                None => return Outcome::UnexpectedEnd(at!(i)),
            };
            for off in reason_start..reason_end {
                if is_bad_control_byte(bytes[off]) {
                    return Outcome::UnexpectedCharacter(at!(off));
                }
                pos.advance(off, bytes[off]);
            }
            let reason = Token::new(reason_start, reason_end - reason_start);
            i = reason_end;

            if !consume_crlf(bytes, &mut i, &mut pos) {
                return Outcome::UnexpectedEnd(at!(i));
            }

            if visitor.visit(HttpEvent::Status { version, code, reason }).is_stop() {
                return Outcome::Abort;
            }
        }
    }

    // --- header fields ---
    let mut content_length: Option<usize> = None;
    loop {
        if bytes.len() < i + 2 {
            return Outcome::UnexpectedEnd(at!(i));
        }
        if &bytes[i..i + 2] == b"\r\n" {
            i += 2;
            pos.advance(i - 2, b'\r');
            pos.advance(i - 1, b'\n');
            break;
        }

        let name_start = i;
        let mut name_end = i;
        while name_end < len && bytes[name_end] != b':' {
            let b = bytes[name_end];
            if is_http_delimiter(b) || !(is_http_tchar(b)) {
                return Outcome::UnexpectedCharacter(at!(name_end));
            }
            name_end += 1;
        }
        if name_end >= len {
            return Outcome::UnexpectedEnd(at!(name_end));
        }
        let name = Token::new(name_start, name_end - name_start);
        for off in name_start..=name_end {
            pos.advance(off, bytes[off]);
        }
        i = name_end + 1;

        while i < len && (bytes[i] == b' ' || bytes[i] == b'\t') {
            pos.advance(i, bytes[i]);
            i += 1;
        }
        let value_start = i;
        let value_end = match find_byte(bytes, i, b'\r') {
            Some(p) => p,
            None => return Outcome::UnexpectedEnd(at!(i)),
        };
        let mut trimmed_end = value_end;
        while trimmed_end > value_start && is_xml_white_space(bytes[trimmed_end - 1]) {
            trimmed_end -= 1;
        }
        let value = Token::new(value_start, trimmed_end - value_start);
        for off in value_start..value_end {
            if is_bad_control_byte(bytes[off]) {
                return Outcome::UnexpectedCharacter(at!(off));
            }
            pos.advance(off, bytes[off]);
        }
        i = value_end;
        if !consume_crlf(bytes, &mut i, &mut pos) {
            return Outcome::UnexpectedEnd(at!(i));
        }

        if name.slice(bytes).eq_ignore_ascii_case(b"content-length") {
            if content_length.is_some() {
                return Outcome::Other(HttpFail::DuplicateOrBadContentLength);
            }
            let s = std::str::from_utf8(value.slice(bytes)).unwrap_or("");
            match s.parse::<i64>() {
                Ok(n) if n >= 0 => content_length = Some(n as usize),
                _ => return Outcome::Other(HttpFail::DuplicateOrBadContentLength),
            }
        }

        if visitor.visit(HttpEvent::Parameter { name, value }).is_stop() {
            return Outcome::Abort;
        }
    }

    // --- body ---
    match content_length {
        Some(n) => {
            if visitor
                .visit(HttpEvent::Expected { total_length: i + n })
                .is_stop()
            {
                return Outcome::Abort;
            }
            if bytes.len() < i + n {
                return Outcome::UnexpectedEnd(Position {
                    line: pos.position().line,
                    column: pos.position().column,
                    line_start: pos.position().line_start,
                });
            }
            let body = Token::new(i, n);
            if visitor.visit(HttpEvent::Body { bytes: body }).is_stop() {
                return Outcome::Abort;
            }
        }
        None => {
            let body = Token::new(i, len - i);
            if visitor.visit(HttpEvent::Body { bytes: body }).is_stop() {
                return Outcome::Abort;
            }
        }
    }

    Outcome::Success
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    memchr::memchr(needle, &bytes[from..]).map(|p| p + from)
}

/// Control bytes below 0x20 that aren't whitespace are rejected wherever a
/// token's raw bytes are scanned (spec §4.A).
fn is_bad_control_byte(b: u8) -> bool {
    b < 0x20 && !is_xml_white_space(b)
}

fn consume_crlf(bytes: &[u8], i: &mut usize, pos: &mut PositionTracker) -> bool {
    if bytes.len() < *i + 2 || bytes[*i] != b'\r' || bytes[*i + 1] != b'\n' {
        return false;
    }
    pos.advance(*i, b'\r');
    pos.advance(*i + 1, b'\n');
    *i += 2;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collector {
        requests: Vec<(String, String, String)>,
        statuses: Vec<(String, u16, String)>,
        params: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    }

    impl Collector {
        fn new() -> Self {
            Self {
                requests: vec![],
                statuses: vec![],
                params: vec![],
                body: None,
            }
        }
    }

    struct Driver<'a> {
        bytes: &'a [u8],
        c: Collector,
    }

    impl<'a> HttpVisitor for Driver<'a> {
        fn visit(&mut self, event: HttpEvent) -> Flow {
            match event {
                HttpEvent::Request { method, target, version } => {
                    self.c.requests.push((
                        String::from_utf8_lossy(method.slice(self.bytes)).into_owned(),
                        String::from_utf8_lossy(target.slice(self.bytes)).into_owned(),
                        String::from_utf8_lossy(version.slice(self.bytes)).into_owned(),
                    ));
                }
                HttpEvent::Status { version, code, reason } => {
                    self.c.statuses.push((
                        String::from_utf8_lossy(version.slice(self.bytes)).into_owned(),
                        code,
                        String::from_utf8_lossy(reason.slice(self.bytes)).into_owned(),
                    ));
                }
                HttpEvent::Parameter { name, value } => {
                    self.c.params.push((
                        String::from_utf8_lossy(name.slice(self.bytes)).into_owned(),
                        String::from_utf8_lossy(value.slice(self.bytes)).into_owned(),
                    ));
                }
                HttpEvent::Expected { .. } => {}
                HttpEvent::Body { bytes: tok } => {
                    self.c.body = Some(tok.slice(self.bytes).to_vec());
                }
            }
            Flow::Continue
        }
    }

    #[test]
    fn parses_literal_response_from_spec() {
        let msg = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc";
        let mut d = Driver { bytes: msg, c: Collector::new() };
        let outcome = parse(msg, &mut d);
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(d.c.statuses, vec![("HTTP/1.1".to_string(), 200, "OK".to_string())]);
        assert_eq!(d.c.params, vec![("Content-Length".to_string(), "3".to_string())]);
        assert_eq!(d.c.body, Some(b"abc".to_vec()));
    }

    #[test]
    fn truncated_body_yields_unexpected_end() {
        let msg = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc";
        let mut d = Driver { bytes: msg, c: Collector::new() };
        let outcome = parse(msg, &mut d);
        assert!(matches!(outcome, Outcome::UnexpectedEnd(_)));
    }

    #[test]
    fn duplicate_content_length_is_an_error() {
        let msg = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nContent-Length: 3\r\n\r\nabc";
        let mut d = Driver { bytes: msg, c: Collector::new() };
        let outcome = parse(msg, &mut d);
        assert_eq!(outcome, Outcome::Other(HttpFail::DuplicateOrBadContentLength));
    }

    #[test]
    fn parses_request_line() {
        let msg = b"GET /a/b HTTP/1.1\r\n\r\n";
        let mut d = Driver { bytes: msg, c: Collector::new() };
        let outcome = parse(msg, &mut d);
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(
            d.c.requests,
            vec![("GET".to_string(), "/a/b".to_string(), "HTTP/1.1".to_string())]
        );
    }

    #[test]
    fn no_content_length_consumes_remaining_bytes_as_body() {
        let msg = b"HTTP/1.1 200 OK\r\n\r\nhello";
        let mut d = Driver { bytes: msg, c: Collector::new() };
        let outcome = parse(msg, &mut d);
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(d.c.body, Some(b"hello".to_vec()));
    }

    #[test]
    fn control_byte_in_target_is_rejected() {
        let msg = b"GET /a\x01b HTTP/1.1\r\n\r\n";
        let mut d = Driver { bytes: msg, c: Collector::new() };
        let outcome = parse(msg, &mut d);
        assert!(matches!(outcome, Outcome::UnexpectedCharacter(_)));
    }

    #[test]
    fn control_byte_in_reason_is_rejected() {
        let msg = b"HTTP/1.1 200 O\x01K\r\n\r\n";
        let mut d = Driver { bytes: msg, c: Collector::new() };
        let outcome = parse(msg, &mut d);
        assert!(matches!(outcome, Outcome::UnexpectedCharacter(_)));
    }

    #[test]
    fn control_byte_in_header_value_is_rejected() {
        let msg = b"HTTP/1.1 200 OK\r\nX-Foo: a\x01b\r\n\r\n";
        let mut d = Driver { bytes: msg, c: Collector::new() };
        let outcome = parse(msg, &mut d);
        assert!(matches!(outcome, Outcome::UnexpectedCharacter(_)));
    }
}
