//! SAX-style XML token parser (spec §4.A "SAX-XML parser").
//!
//! Events carry up to three tokens: an optional namespace prefix, a local
//! name, and an optional value. Entities inside text/attribute content are
//! **not** expanded — the caller runs [`crate::escape::unescape_xml`] on the
//! raw token when it needs the decoded value.

use super::Outcome;
use crate::charclass::{is_xml_name_char, is_xml_name_start_char, is_xml_white_space};
use crate::token::{Flow, Position, PositionTracker, Token};

#[derive(Debug, Clone, Copy)]
pub enum XmlEvent {
    /// `<?xml ...?>` declaration (first PI target case-insensitively `xml`).
    Xml,
    /// An attribute inside an `<?xml ...?>` declaration.
    ParseXml { name: Token, value: Token },
    /// A processing instruction other than `xml`.
    Instruction { target: Token },
    /// An attribute/content token inside a non-`xml` processing instruction.
    ParseInstruction { value: Token },
    StartTag {
        namespace: Option<Token>,
        local_name: Token,
        self_closing: bool,
    },
    EndTag {
        namespace: Option<Token>,
        local_name: Token,
    },
    Attribute {
        namespace: Option<Token>,
        local_name: Token,
        value: Token,
    },
    Content {
        value: Token,
    },
    CData {
        value: Token,
    },
}

pub trait XmlVisitor {
    fn visit(&mut self, event: XmlEvent) -> Flow;
}

/// XML-parser-specific failure kinds layered on the shared [`Outcome`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlFail {
    /// A qualified name contained more than one `:`.
    ExtraNamespaceColon,
    /// An end tag's name did not match its corresponding start tag.
    MismatchedEndTag,
    /// Nesting exceeded [`MAX_DEPTH`].
    DepthExceeded,
}

pub type XmlOutcome = Outcome<XmlFail>;

pub const MAX_DEPTH: usize = 16;

struct Cursor<'a> {
    bytes: &'a [u8],
    i: usize,
    pos: PositionTracker,
}

impl<'a> Cursor<'a> {
    fn len(&self) -> usize {
        self.bytes.len()
    }
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.i).copied()
    }
    fn peek_at(&self, off: usize) -> Option<u8> {
        self.bytes.get(self.i + off).copied()
    }
    fn advance(&mut self) {
        if let Some(b) = self.peek() {
            self.pos.advance(self.i, b);
            self.i += 1;
        }
    }
    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }
    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_xml_white_space(b) {
                self.advance();
            } else {
                break;
            }
        }
    }
    fn position(&self) -> Position {
        self.pos.position()
    }
    fn starts_with(&self, needle: &[u8]) -> bool {
        self.bytes[self.i..].starts_with(needle)
    }
}

pub fn parse(bytes: &[u8], visitor: &mut dyn XmlVisitor) -> XmlOutcome {
    let mut cur = Cursor {
        bytes,
        i: 0,
        pos: PositionTracker::new(8),
    };
    let mut stack: Vec<Token> = Vec::new();

    loop {
        cur.skip_whitespace();
        match cur.peek() {
            None => break,
            Some(b'<') => {
                if let Some(outcome) = parse_markup(&mut cur, visitor, &mut stack) {
                    return outcome;
                }
            }
            Some(_) => {
                if let Some(outcome) = parse_content(&mut cur, visitor) {
                    return outcome;
                }
            }
        }
    }

    if !stack.is_empty() {
        return Outcome::UnexpectedEnd(cur.position());
    }
    Outcome::Success
}

fn parse_content(cur: &mut Cursor, visitor: &mut dyn XmlVisitor) -> Option<XmlOutcome> {
    let start = cur.i;
    while let Some(b) = cur.peek() {
        if b == b'<' {
            break;
        }
        cur.advance();
    }
    let mut end = cur.i;
    // strip leading/trailing whitespace, preserve interior
    let mut trimmed_start = start;
    while trimmed_start < end && is_xml_white_space(cur.bytes[trimmed_start]) {
        trimmed_start += 1;
    }
    while end > trimmed_start && is_xml_white_space(cur.bytes[end - 1]) {
        end -= 1;
    }
    if emit(
        visitor,
        XmlEvent::Content {
            value: Token::new(trimmed_start, end - trimmed_start),
        },
    ) {
        return Some(Outcome::Abort);
    }
    None
}

fn parse_markup(cur: &mut Cursor, visitor: &mut dyn XmlVisitor, stack: &mut Vec<Token>) -> Option<XmlOutcome> {
    if cur.starts_with(b"<!--") {
        return parse_comment(cur);
    }
    if cur.starts_with(b"<![CDATA[") {
        return parse_cdata(cur, visitor);
    }
    if cur.starts_with(b"<?") {
        return parse_instruction(cur, visitor);
    }
    if cur.starts_with(b"</") {
        return parse_end_tag(cur, visitor, stack);
    }
    parse_start_tag(cur, visitor, stack)
}

fn parse_comment(cur: &mut Cursor) -> Option<XmlOutcome> {
    cur.advance_n(4);
    loop {
        if cur.i >= cur.len() {
            return Some(Outcome::UnexpectedEnd(cur.position()));
        }
        if cur.starts_with(b"-->") {
            cur.advance_n(3);
            return None;
        }
        cur.advance();
    }
}

fn parse_cdata(cur: &mut Cursor, visitor: &mut dyn XmlVisitor) -> Option<XmlOutcome> {
    cur.advance_n(9);
    let start = cur.i;
    loop {
        if cur.i >= cur.len() {
            return Some(Outcome::UnexpectedEnd(cur.position()));
        }
        if cur.starts_with(b"]]>") {
            let value = Token::new(start, cur.i - start);
            cur.advance_n(3);
            if emit(visitor, XmlEvent::CData { value }) {
                return Some(Outcome::Abort);
            }
            return None;
        }
        cur.advance();
    }
}

fn parse_instruction(cur: &mut Cursor, visitor: &mut dyn XmlVisitor) -> Option<XmlOutcome> {
    cur.advance_n(2);
    let name_start = cur.i;
    while let Some(b) = cur.peek() {
        if is_xml_name_char(b) {
            cur.advance();
        } else {
            break;
        }
    }
    let name = Token::new(name_start, cur.i - name_start);
    let is_xml_decl = name.slice(cur.bytes).eq_ignore_ascii_case(b"xml");

    if emit(visitor, if is_xml_decl { XmlEvent::Xml } else { XmlEvent::Instruction { target: name } }) {
        return Some(Outcome::Abort);
    }

    loop {
        cur.skip_whitespace();
        if cur.starts_with(b"?>") {
            cur.advance_n(2);
            return None;
        }
        if cur.i >= cur.len() {
            return Some(Outcome::UnexpectedEnd(cur.position()));
        }
        if is_xml_decl {
            let (attr_name, attr_value) = match parse_attribute(cur) {
                Ok(v) => v,
                Err(e) => return Some(e),
            };
            if emit(
                visitor,
                XmlEvent::ParseXml {
                    name: attr_name,
                    value: attr_value,
                },
            ) {
                return Some(Outcome::Abort);
            }
        } else {
            let start = cur.i;
            while let Some(b) = cur.peek() {
                if b == b'?' && cur.peek_at(1) == Some(b'>') {
                    break;
                }
                cur.advance();
            }
            if emit(
                visitor,
                XmlEvent::ParseInstruction {
                    value: Token::new(start, cur.i - start),
                },
            ) {
                return Some(Outcome::Abort);
            }
        }
    }
}

fn parse_attribute(cur: &mut Cursor) -> Result<(Token, Token), XmlOutcome> {
    let name_start = cur.i;
    while let Some(b) = cur.peek() {
        if is_xml_name_char(b) {
            cur.advance();
        } else {
            break;
        }
    }
    let name = Token::new(name_start, cur.i - name_start);
    cur.skip_whitespace();
    if cur.peek() != Some(b'=') {
        return Err(Outcome::UnexpectedCharacter(cur.position()));
    }
    cur.advance();
    cur.skip_whitespace();
    let quote = match cur.peek() {
        Some(q @ (b'"' | b'\'')) => q,
        _ => return Err(Outcome::UnexpectedCharacter(cur.position())),
    };
    cur.advance();
    let value_start = cur.i;
    while let Some(b) = cur.peek() {
        if b == quote {
            break;
        }
        cur.advance();
    }
    if cur.peek() != Some(quote) {
        return Err(Outcome::UnexpectedEnd(cur.position()));
    }
    let value = Token::new(value_start, cur.i - value_start);
    cur.advance();
    Ok((name, value))
}

fn parse_qualified_name(cur: &mut Cursor) -> Result<(Option<Token>, Token), XmlOutcome> {
    let start = cur.i;
    if !cur.peek().map(is_xml_name_start_char).unwrap_or(false) {
        return Err(Outcome::UnexpectedCharacter(cur.position()));
    }
    cur.advance();
    while let Some(b) = cur.peek() {
        if is_xml_name_char(b) {
            cur.advance();
        } else {
            break;
        }
    }
    let first_colon = cur.bytes[start..cur.i].iter().position(|&b| b == b':');
    match first_colon {
        None => Ok((None, Token::new(start, cur.i - start))),
        Some(rel) => {
            let colon_abs = start + rel;
            let namespace = Token::new(start, rel);
            let local_start = colon_abs + 1;
            if cur.bytes[local_start..cur.i].contains(&b':') {
                return Err(Outcome::Other(XmlFail::ExtraNamespaceColon));
            }
            Ok((Some(namespace), Token::new(local_start, cur.i - local_start)))
        }
    }
}

fn parse_start_tag(cur: &mut Cursor, visitor: &mut dyn XmlVisitor, stack: &mut Vec<Token>) -> Option<XmlOutcome> {
    cur.advance(); // '<'
    let (namespace, local_name) = match parse_qualified_name(cur) {
        Ok(v) => v,
        Err(e) => return Some(e),
    };

    if stack.len() >= MAX_DEPTH {
        return Some(Outcome::Other(XmlFail::DepthExceeded));
    }

    let qualified = Token::new(
        namespace.map(|n| n.start).unwrap_or(local_name.start),
        local_name.end() - namespace.map(|n| n.start).unwrap_or(local_name.start),
    );

    // Attributes are parsed ahead of the terminating '>' but must reach the
    // visitor only after `StartTag` — callers key attribute handling off the
    // stack frame `StartTag` pushes, so `Attribute` has to follow it.
    let mut attrs: Vec<(Option<Token>, Token, Token)> = Vec::new();

    loop {
        cur.skip_whitespace();
        match cur.peek() {
            Some(b'/') if cur.peek_at(1) == Some(b'>') => {
                cur.advance_n(2);
                if emit(
                    visitor,
                    XmlEvent::StartTag {
                        namespace,
                        local_name,
                        self_closing: true,
                    },
                ) {
                    return Some(Outcome::Abort);
                }
                for (attr_ns, attr_name, value) in attrs {
                    if emit(
                        visitor,
                        XmlEvent::Attribute {
                            namespace: attr_ns,
                            local_name: attr_name,
                            value,
                        },
                    ) {
                        return Some(Outcome::Abort);
                    }
                }
                if emit(visitor, XmlEvent::EndTag { namespace, local_name }) {
                    return Some(Outcome::Abort);
                }
                return None;
            }
            Some(b'>') => {
                cur.advance();
                if emit(
                    visitor,
                    XmlEvent::StartTag {
                        namespace,
                        local_name,
                        self_closing: false,
                    },
                ) {
                    return Some(Outcome::Abort);
                }
                for (attr_ns, attr_name, value) in attrs {
                    if emit(
                        visitor,
                        XmlEvent::Attribute {
                            namespace: attr_ns,
                            local_name: attr_name,
                            value,
                        },
                    ) {
                        return Some(Outcome::Abort);
                    }
                }
                stack.push(qualified);
                return None;
            }
            None => return Some(Outcome::UnexpectedEnd(cur.position())),
            _ => {
                let (attr_ns, attr_name) = match parse_qualified_name(cur) {
                    Ok(v) => v,
                    Err(e) => return Some(e),
                };
                cur.skip_whitespace();
                if cur.peek() != Some(b'=') {
                    return Some(Outcome::UnexpectedCharacter(cur.position()));
                }
                cur.advance();
                cur.skip_whitespace();
                let quote = match cur.peek() {
                    Some(q @ (b'"' | b'\'')) => q,
                    _ => return Some(Outcome::UnexpectedCharacter(cur.position())),
                };
                cur.advance();
                let value_start = cur.i;
                while let Some(b) = cur.peek() {
                    if b == quote {
                        break;
                    }
                    cur.advance();
                }
                if cur.peek() != Some(quote) {
                    return Some(Outcome::UnexpectedEnd(cur.position()));
                }
                let value = Token::new(value_start, cur.i - value_start);
                cur.advance();
                attrs.push((attr_ns, attr_name, value));
            }
        }
    }
}

fn parse_end_tag(cur: &mut Cursor, visitor: &mut dyn XmlVisitor, stack: &mut Vec<Token>) -> Option<XmlOutcome> {
    cur.advance_n(2); // '</'
    let (namespace, local_name) = match parse_qualified_name(cur) {
        Ok(v) => v,
        Err(e) => return Some(e),
    };
    cur.skip_whitespace();
    if cur.peek() != Some(b'>') {
        return Some(Outcome::UnexpectedCharacter(cur.position()));
    }
    cur.advance();

    let qualified_start = namespace.map(|n| n.start).unwrap_or(local_name.start);
    let qualified = Token::new(qualified_start, local_name.end() - qualified_start);

    match stack.pop() {
        Some(open) if open.slice(cur.bytes) == qualified.slice(cur.bytes) => {}
        _ => return Some(Outcome::Other(XmlFail::MismatchedEndTag)),
    }

    if emit(visitor, XmlEvent::EndTag { namespace, local_name }) {
        return Some(Outcome::Abort);
    }
    None
}

fn emit(visitor: &mut dyn XmlVisitor, event: XmlEvent) -> bool {
    visitor.visit(event).is_stop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Vec<String>);

    impl XmlVisitor for Log {
        fn visit(&mut self, event: XmlEvent) -> Flow {
            self.0.push(format!("{:?}", event_tag(&event)));
            Flow::Continue
        }
    }

    fn event_tag(e: &XmlEvent) -> &'static str {
        match e {
            XmlEvent::Xml => "Xml",
            XmlEvent::ParseXml { .. } => "ParseXml",
            XmlEvent::Instruction { .. } => "Instruction",
            XmlEvent::ParseInstruction { .. } => "ParseInstruction",
            XmlEvent::StartTag { .. } => "StartTag",
            XmlEvent::EndTag { .. } => "EndTag",
            XmlEvent::Attribute { .. } => "Attribute",
            XmlEvent::Content { .. } => "Content",
            XmlEvent::CData { .. } => "CData",
        }
    }

    #[test]
    fn self_closing_tag_emits_start_then_end() {
        let xml = b"<root/>";
        let mut log = Log::default();
        let outcome = parse(xml, &mut log);
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(log.0, vec!["StartTag", "EndTag"]);
    }

    #[test]
    fn mismatched_end_tag_is_rejected() {
        let xml = b"<a><b></a></b>";
        let mut log = Log::default();
        let outcome = parse(xml, &mut log);
        assert_eq!(outcome, Outcome::Other(XmlFail::MismatchedEndTag));
    }

    #[test]
    fn cdata_is_emitted_verbatim() {
        struct Capture(Vec<u8>, Vec<u8>);
        impl XmlVisitor for Capture {
            fn visit(&mut self, event: XmlEvent) -> Flow {
                if let XmlEvent::CData { value } = event {
                    self.1 = value.slice(&self.0).to_vec();
                }
                Flow::Continue
            }
        }
        let xml = b"<a><![CDATA[<raw> & stuff]]></a>";
        let mut cap = Capture(xml.to_vec(), vec![]);
        let outcome = parse(xml, &mut cap);
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(cap.1, b"<raw> & stuff");
    }

    #[test]
    fn namespace_prefix_splits_at_first_colon() {
        struct Capture {
            bytes: Vec<u8>,
            ns: Option<String>,
            local: String,
        }
        impl XmlVisitor for Capture {
            fn visit(&mut self, event: XmlEvent) -> Flow {
                if let XmlEvent::StartTag { namespace, local_name, .. } = event {
                    self.ns = namespace.map(|t| String::from_utf8_lossy(t.slice(&self.bytes)).into_owned());
                    self.local = String::from_utf8_lossy(local_name.slice(&self.bytes)).into_owned();
                }
                Flow::Continue
            }
        }
        let xml = b"<u:GetInfo/>";
        let mut cap = Capture {
            bytes: xml.to_vec(),
            ns: None,
            local: String::new(),
        };
        parse(xml, &mut cap);
        assert_eq!(cap.ns.as_deref(), Some("u"));
        assert_eq!(cap.local, "GetInfo");
    }

    #[test]
    fn unterminated_comment_is_unexpected_end() {
        let xml = b"<a><!-- oops </a>";
        let mut log = Log::default();
        let outcome = parse(xml, &mut log);
        assert!(matches!(outcome, Outcome::UnexpectedEnd(_)));
    }

    #[test]
    fn attribute_events_follow_their_start_tag() {
        // Consumers key attribute handling off the stack frame `StartTag`
        // pushes (e.g. `descriptor::cache_xml`'s driver); `Attribute` events
        // must therefore arrive after `StartTag`, not before it.
        let xml = b"<a x=\"1\" y=\"2\"/>";
        let mut log = Log::default();
        let outcome = parse(xml, &mut log);
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(log.0, vec!["StartTag", "Attribute", "Attribute", "EndTag"]);
    }

    #[test]
    fn xml_declaration_is_recognised_case_insensitively() {
        let xml = b"<?XML version=\"1.0\"?><a/>";
        let mut log = Log::default();
        let outcome = parse(xml, &mut log);
        assert_eq!(outcome, Outcome::Success);
        assert!(log.0.contains(&"Xml".to_string()));
        assert!(log.0.contains(&"ParseXml".to_string()));
    }
}
