//! SOAP response parse (spec §4.G "Response parse").
//!
//! SAX-walks the response body against a state machine enforcing
//! `s:Envelope → s:Body → u:<Action>Response → <arg-name>*`. The SOAP prefix
//! is discovered from the `xmlns:<prefix>` attribute declared on the
//! envelope element itself; the user (service) namespace prefix is taken
//! from the response element and must be declared with a value starting
//! `urn:dslforum-org:service:`.

use crate::descriptor::model::{Action, Direction};
use crate::error::{ParseError, QueryError};
use crate::escape::{unescape_xml, PREDEFINED_ENTITIES};
use crate::parse::xml::{self, XmlEvent, XmlFail, XmlVisitor};
use crate::parse::Outcome;
use crate::token::{Flow, Position};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    InEnvelope,
    InBody,
    InResponse,
    /// Inside an out-argument element, collecting its text content.
    InArg,
}

struct Driver<'a> {
    bytes: &'a [u8],
    action: &'a Action,
    state: State,
    depth: usize,
    envelope_depth: usize,
    body_depth: usize,
    response_depth: usize,
    envelope_prefix: Option<String>,
    envelope_prefix_declared: bool,
    response_prefix_declared: bool,
    current_arg: Option<String>,
    current_text: String,
    bound: HashMap<String, String>,
    error: Option<QueryError>,
}

impl<'a> Driver<'a> {
    fn fail(&mut self, err: QueryError) -> Flow {
        self.error = Some(err);
        Flow::Stop
    }
}

impl<'a> XmlVisitor for Driver<'a> {
    fn visit(&mut self, event: XmlEvent) -> Flow {
        match event {
            XmlEvent::StartTag {
                namespace,
                local_name,
                ..
            } => {
                self.depth += 1;
                let local = String::from_utf8_lossy(local_name.slice(self.bytes)).into_owned();
                let ns = namespace.map(|t| String::from_utf8_lossy(t.slice(self.bytes)).into_owned());

                match self.state {
                    State::Outside => {
                        if local != "Envelope" {
                            return self.fail(QueryError::BadResponseFormat(
                                "root element is not a SOAP Envelope".into(),
                            ));
                        }
                        let Some(prefix) = ns else {
                            return self.fail(QueryError::BadResponseFormat(
                                "SOAP Envelope has no namespace prefix".into(),
                            ));
                        };
                        self.envelope_prefix = Some(prefix);
                        self.envelope_depth = self.depth;
                        self.state = State::InEnvelope;
                    }
                    State::InEnvelope if self.depth == self.envelope_depth + 1 => {
                        if local != "Body" || ns.as_deref() != self.envelope_prefix.as_deref() {
                            return self.fail(QueryError::BadResponseFormat(
                                "expected SOAP Body inside Envelope".into(),
                            ));
                        }
                        self.body_depth = self.depth;
                        self.state = State::InBody;
                    }
                    State::InBody if self.depth == self.body_depth + 1 => {
                        let expected = format!("{}Response", self.action.name);
                        if local != expected {
                            return self.fail(QueryError::ResponseActionMismatch {
                                expected,
                                found: local,
                            });
                        }
                        if ns.is_none() {
                            return self.fail(QueryError::BadResponseFormat(
                                "response element has no namespace prefix".into(),
                            ));
                        }
                        self.response_depth = self.depth;
                        self.state = State::InResponse;
                    }
                    State::InResponse if self.depth == self.response_depth + 1 => {
                        if self.action.arguments.iter().any(|a| a.direction == Direction::Out && a.name == local)
                        {
                            self.current_arg = Some(local);
                            self.current_text.clear();
                            self.state = State::InArg;
                        } else {
                            return self.fail(QueryError::UnknownOutputArgument(local));
                        }
                    }
                    _ => {
                        return self.fail(QueryError::BadResponseFormat(format!(
                            "unexpected nested element {local:?}"
                        )));
                    }
                }
            }
            XmlEvent::Attribute {
                namespace, local_name, value,
            } => {
                let ns = namespace.map(|t| String::from_utf8_lossy(t.slice(self.bytes)).into_owned());
                if ns.as_deref() == Some("xmlns") {
                    let prefix = String::from_utf8_lossy(local_name.slice(self.bytes)).into_owned();
                    if self.state == State::InEnvelope
                        && self.depth == self.envelope_depth
                        && Some(&prefix) == self.envelope_prefix.as_ref()
                    {
                        self.envelope_prefix_declared = true;
                    }
                    if self.state == State::InResponse && self.depth == self.response_depth {
                        let uri = String::from_utf8_lossy(value.slice(self.bytes)).into_owned();
                        if uri.starts_with("urn:dslforum-org:service:") {
                            self.response_prefix_declared = true;
                        }
                    }
                }
            }
            XmlEvent::Content { value } => {
                if self.state == State::InArg {
                    self.current_text.push_str(&String::from_utf8_lossy(value.slice(self.bytes)));
                }
            }
            XmlEvent::EndTag { .. } => {
                match self.state {
                    State::InArg if self.depth == self.response_depth + 1 => {
                        let name = self.current_arg.take().expect("InArg without current_arg");
                        match unescape_xml(&self.current_text, PREDEFINED_ENTITIES) {
                            Ok(text) => {
                                self.bound.insert(name, text.into_owned());
                            }
                            Err(e) => return self.fail(QueryError::BadEscape(e)),
                        }
                        self.state = State::InResponse;
                    }
                    State::InResponse if self.depth == self.response_depth => {
                        if !self.response_prefix_declared {
                            return self.fail(QueryError::BadResponseFormat(
                                "response element's namespace prefix is not declared as a dslforum service URN"
                                    .into(),
                            ));
                        }
                        self.state = State::InBody;
                    }
                    State::InBody if self.depth == self.body_depth => {
                        self.state = State::InEnvelope;
                    }
                    State::InEnvelope if self.depth == self.envelope_depth => {
                        if !self.envelope_prefix_declared {
                            return self.fail(QueryError::BadResponseFormat(
                                "SOAP Envelope prefix was never declared with xmlns".into(),
                            ));
                        }
                        self.state = State::Outside;
                    }
                    _ => {}
                }
                self.depth -= 1;
            }
            _ => {}
        }
        Flow::Continue
    }
}

/// Parse a SOAP response body against `action`'s exact response contract and
/// return the bound `out` argument values (only the ones present).
pub fn parse_response(body: &[u8], action: &Action) -> Result<HashMap<String, String>, QueryError> {
    let mut driver = Driver {
        bytes: body,
        action,
        state: State::Outside,
        depth: 0,
        envelope_depth: 0,
        body_depth: 0,
        response_depth: 0,
        envelope_prefix: None,
        envelope_prefix_declared: false,
        response_prefix_declared: false,
        current_arg: None,
        current_text: String::new(),
        bound: HashMap::new(),
        error: None,
    };

    let outcome = xml::parse(body, &mut driver);
    if let Some(err) = driver.error {
        return Err(err);
    }
    match outcome {
        Outcome::Success => Ok(driver.bound),
        Outcome::UnexpectedCharacter(p) | Outcome::UnexpectedEnd(p) => {
            Err(QueryError::BadEscape(ParseError::Malformed(p, "malformed SOAP response".into())))
        }
        Outcome::Abort | Outcome::InvalidArgument => Err(QueryError::BadResponseFormat(
            "SOAP response parse aborted".into(),
        )),
        Outcome::Other(XmlFail::ExtraNamespaceColon) => Err(QueryError::BadEscape(ParseError::Malformed(
            Position::START,
            "extra namespace colon".into(),
        ))),
        Outcome::Other(XmlFail::MismatchedEndTag) => Err(QueryError::BadResponseFormat(
            "mismatched end tag in SOAP response".into(),
        )),
        Outcome::Other(XmlFail::DepthExceeded) => {
            Err(QueryError::BadEscape(ParseError::DepthExceeded(Position::START)))
        }
    }
}
