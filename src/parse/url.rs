//! URL token parser (spec §4.A "URL parser").
//!
//! A single left-to-right pass that locates the structural separators
//! (`://`, the authority's `@`/`:`, and the first `/`, `?`, `#`) and emits
//! tokens in document order. Percent-decoding is deliberately **not**
//! performed here — callers re-run character-class checks after decoding
//! (spec §4.A).

use super::Outcome;
use crate::token::{Flow, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlTokenKind {
    Protocol,
    User,
    Pass,
    Host,
    Port,
    Path,
    Search,
    Hash,
}

#[derive(Debug, Clone, Copy)]
pub struct UrlEvent {
    pub kind: UrlTokenKind,
    pub token: Token,
}

pub trait UrlVisitor {
    fn visit(&mut self, event: UrlEvent) -> Flow;
}

/// No parser-specific failure kinds beyond the shared [`Outcome`] set.
pub type UrlOutcome = Outcome<()>;

pub fn parse(bytes: &[u8], visitor: &mut dyn UrlVisitor) -> UrlOutcome {
    let len = bytes.len();

    let scheme_end = super::find_from(bytes, b"://", 0).map(|p| p + 3);
    let scan_start = scheme_end.unwrap_or(0);

    let mut slash = None;
    let mut question = None;
    let mut hash = None;
    let mut end_authority = len;
    let mut j = scan_start;
    while j < len {
        match bytes[j] {
            b'/' if slash.is_none() => {
                slash = Some(j);
                end_authority = j;
                break;
            }
            b'?' if question.is_none() => {
                question = Some(j);
                end_authority = j;
                break;
            }
            b'#' if hash.is_none() => {
                hash = Some(j);
                end_authority = j;
                break;
            }
            _ => {}
        }
        j += 1;
    }
    if slash.is_some() {
        while j < len {
            match bytes[j] {
                b'?' if question.is_none() => question = Some(j),
                b'#' if hash.is_none() => {
                    hash = Some(j);
                    break;
                }
                _ => {}
            }
            j += 1;
        }
    } else if question.is_some() && hash.is_none() {
        while j < len {
            if bytes[j] == b'#' {
                hash = Some(j);
                break;
            }
            j += 1;
        }
    }

    macro_rules! emit {
        ($kind:expr, $tok:expr) => {
            if visitor.visit(UrlEvent { kind: $kind, token: $tok }).is_stop() {
                return Outcome::Abort;
            }
        };
    }

    if let Some(end) = scheme_end {
        emit!(UrlTokenKind::Protocol, Token::new(0, end - 3));
    }

    let authority = &bytes[scan_start..end_authority];
    if scheme_end.is_some() && !authority.is_empty() {
        let at_pos = authority.iter().rposition(|&b| b == b'@');
        let (user_tok, pass_tok, hostport, hostport_base) = if let Some(at) = at_pos {
            let userinfo = &authority[..at];
            let colon = userinfo.iter().position(|&b| b == b':');
            let (user_tok, pass_tok) = match colon {
                Some(c) => (
                    Some(Token::new(scan_start, c)),
                    Some(Token::new(scan_start + c + 1, at - c - 1)),
                ),
                None => (Some(Token::new(scan_start, at)), None),
            };
            (user_tok, pass_tok, &authority[at + 1..], scan_start + at + 1)
        } else {
            (None, None, authority, scan_start)
        };

        if let Some(t) = user_tok {
            emit!(UrlTokenKind::User, t);
        }
        if let Some(t) = pass_tok {
            emit!(UrlTokenKind::Pass, t);
        }

        let colon = hostport.iter().rposition(|&b| b == b':');
        match colon {
            Some(c) => {
                emit!(UrlTokenKind::Host, Token::new(hostport_base, c));
                emit!(
                    UrlTokenKind::Port,
                    Token::new(hostport_base + c + 1, hostport.len() - c - 1)
                );
            }
            None => {
                emit!(UrlTokenKind::Host, Token::new(hostport_base, hostport.len()));
            }
        }
    }

    let path_start = slash;
    let path_end = question.or(hash).unwrap_or(len);
    if let Some(p) = path_start {
        // Path excludes the leading '/' itself per the literal scenario in
        // spec §8 ("Path=a/b" for "/a/b").
        let start = p + 1;
        if path_end > start {
            emit!(UrlTokenKind::Path, Token::new(start, path_end - start));
        } else {
            emit!(UrlTokenKind::Path, Token::new(start, 0));
        }
    }

    if let Some(q) = question {
        let start = q + 1;
        let end = hash.unwrap_or(len);
        emit!(UrlTokenKind::Search, Token::new(start, end.saturating_sub(start)));
    }

    if let Some(h) = hash {
        let start = h + 1;
        emit!(UrlTokenKind::Hash, Token::new(start, len - start));
    }

    Outcome::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collector;

    impl Collector {
        fn collect(bytes: &[u8]) -> (UrlOutcome, Vec<(UrlTokenKind, String)>) {
            struct C<'a> {
                bytes: &'a [u8],
                out: Vec<(UrlTokenKind, String)>,
            }
            impl<'a> UrlVisitor for C<'a> {
                fn visit(&mut self, event: UrlEvent) -> Flow {
                    let s = String::from_utf8_lossy(event.token.slice(self.bytes)).into_owned();
                    self.out.push((event.kind, s));
                    Flow::Continue
                }
            }
            let mut c = C { bytes, out: Vec::new() };
            let outcome = parse(bytes, &mut c);
            (outcome, c.out)
        }
    }

    #[test]
    fn full_url_literal_from_spec() {
        let url = b"http://u:p@host:8080/a/b?q=1#x";
        let (outcome, events) = Collector::collect(url);
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(events[0], (UrlTokenKind::Protocol, "http".to_string()));
        assert_eq!(events[1], (UrlTokenKind::User, "u".to_string()));
        assert_eq!(events[2], (UrlTokenKind::Pass, "p".to_string()));
        assert_eq!(events[3], (UrlTokenKind::Host, "host".to_string()));
        assert_eq!(events[4], (UrlTokenKind::Port, "8080".to_string()));
        assert_eq!(events[5], (UrlTokenKind::Path, "a/b".to_string()));
        assert_eq!(events[6], (UrlTokenKind::Search, "q=1".to_string()));
        assert_eq!(events[7], (UrlTokenKind::Hash, "x".to_string()));
    }

    #[test]
    fn bare_colon_in_authority_without_at_is_host_port() {
        let url = b"http://host:49000/x";
        let (_, events) = Collector::collect(url);
        assert!(events.contains(&(UrlTokenKind::Host, "host".to_string())));
        assert!(events.contains(&(UrlTokenKind::Port, "49000".to_string())));
    }

    #[test]
    fn no_scheme_emits_no_authority_tokens() {
        let url = b"/a/b?q=1";
        let (_, events) = Collector::collect(url);
        assert!(!events.iter().any(|(k, _)| *k == UrlTokenKind::Protocol));
        assert!(!events.iter().any(|(k, _)| *k == UrlTokenKind::Host));
        assert_eq!(events[0], (UrlTokenKind::Path, "a/b".to_string()));
        assert_eq!(events[1], (UrlTokenKind::Search, "q=1".to_string()));
    }

    #[test]
    fn visitor_stop_aborts_parse() {
        struct StopImmediately;
        impl UrlVisitor for StopImmediately {
            fn visit(&mut self, _event: UrlEvent) -> Flow {
                Flow::Stop
            }
        }
        let mut v = StopImmediately;
        let outcome = parse(b"http://host/path", &mut v);
        assert_eq!(outcome, Outcome::Abort);
    }
}
