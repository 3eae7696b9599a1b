//! SCPD (service control point definition) parser (spec §4.D step 3).
//!
//! Collects each `scpd/actionList/action`'s name and its
//! `argumentList/argument` tuples `(name, relatedStateVariable, direction)`,
//! and each `scpd/serviceStateTable/stateVariable`'s `name -> dataType`.
//! [`resolve_argument_types`] then fills every argument's `data_type` by
//! looking up its `relatedStateVariable`; an unresolved argument fails the
//! whole build (spec: "any unresolved argument fails the build").

use crate::descriptor::model::{Action, Argument, Direction};
use crate::error::{DescriptorError, ParseError};
use crate::parse::xml::{self, XmlEvent, XmlFail, XmlVisitor};
use crate::parse::Outcome;
use crate::token::{Flow, Position};
use std::collections::HashMap;

#[derive(Default)]
struct ArgumentBuild {
    name: Option<String>,
    related_state_variable: Option<String>,
    direction: Option<Direction>,
}

#[derive(Default)]
struct ActionBuild {
    name: Option<String>,
    arguments: Vec<(String, String, Direction)>,
}

pub struct ScpdResult {
    pub actions: Vec<Action>,
    pub state_variables: HashMap<String, String>,
}

struct Driver<'a> {
    bytes: &'a [u8],
    path: Vec<String>,
    action_stack: Vec<ActionBuild>,
    argument_stack: Vec<ArgumentBuild>,
    actions: Vec<Action>,
    state_variables: HashMap<String, String>,
    current_state_variable: Option<String>,
    current_state_variable_type: Option<String>,
}

impl<'a> XmlVisitor for Driver<'a> {
    fn visit(&mut self, event: XmlEvent) -> Flow {
        match event {
            XmlEvent::StartTag { local_name, .. } => {
                let name = String::from_utf8_lossy(local_name.slice(self.bytes)).into_owned();
                self.path.push(name.clone());
                match name.as_str() {
                    "action" if self.in_action_list() => self.action_stack.push(ActionBuild::default()),
                    "argument" if self.in_argument_list() => {
                        self.argument_stack.push(ArgumentBuild::default())
                    }
                    "stateVariable" if self.in_state_table() => {
                        self.current_state_variable = None;
                        self.current_state_variable_type = None;
                    }
                    _ => {}
                }
            }
            XmlEvent::EndTag { local_name, .. } => {
                let name = String::from_utf8_lossy(local_name.slice(self.bytes)).into_owned();
                match name.as_str() {
                    "argument" => {
                        if let Some(a) = self.argument_stack.pop() {
                            if let (Some(name), Some(var), Some(dir)) =
                                (a.name, a.related_state_variable, a.direction)
                            {
                                if let Some(action) = self.action_stack.last_mut() {
                                    action.arguments.push((name, var, dir));
                                }
                            }
                        }
                    }
                    "action" => {
                        if let Some(a) = self.action_stack.pop() {
                            if let Some(name) = a.name {
                                self.actions.push(Action {
                                    name,
                                    arguments: a
                                        .arguments
                                        .into_iter()
                                        .map(|(n, v, d)| Argument {
                                            name: n,
                                            related_state_variable: v,
                                            direction: d,
                                            data_type: String::new(),
                                            value: None,
                                        })
                                        .collect(),
                                });
                            }
                        }
                    }
                    "stateVariable" => {
                        if let (Some(n), Some(t)) =
                            (self.current_state_variable.take(), self.current_state_variable_type.take())
                        {
                            self.state_variables.insert(n, t);
                        }
                    }
                    _ => {}
                }
                self.path.pop();
            }
            XmlEvent::Content { value } => {
                let text = String::from_utf8_lossy(value.slice(self.bytes)).into_owned();
                if text.is_empty() {
                    return Flow::Continue;
                }
                match self.path.last().map(String::as_str) {
                    Some("name") if self.argument_stack.is_empty() && !self.action_stack.is_empty() => {
                        self.action_stack.last_mut().unwrap().name.get_or_insert(text);
                    }
                    Some("name") if !self.argument_stack.is_empty() => {
                        self.argument_stack.last_mut().unwrap().name = Some(text);
                    }
                    Some("name") if self.in_state_variable() => {
                        self.current_state_variable = Some(text);
                    }
                    Some("relatedStateVariable") => {
                        if let Some(arg) = self.argument_stack.last_mut() {
                            arg.related_state_variable = Some(text);
                        }
                    }
                    Some("direction") => {
                        if let Some(arg) = self.argument_stack.last_mut() {
                            arg.direction = Some(if text.eq_ignore_ascii_case("in") {
                                Direction::In
                            } else {
                                Direction::Out
                            });
                        }
                    }
                    Some("dataType") => {
                        self.current_state_variable_type = Some(text);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Flow::Continue
    }
}

impl<'a> Driver<'a> {
    fn in_action_list(&self) -> bool {
        self.path.len() >= 2
            && self.path[self.path.len() - 2] == "actionList"
            && self.action_stack.is_empty()
    }
    fn in_argument_list(&self) -> bool {
        self.path.len() >= 2 && self.path[self.path.len() - 2] == "argumentList"
    }
    fn in_state_table(&self) -> bool {
        self.path.len() >= 2 && self.path[self.path.len() - 2] == "serviceStateTable"
    }
    fn in_state_variable(&self) -> bool {
        self.path.len() >= 3
            && self.path[self.path.len() - 2] == "stateVariable"
            && self.path[self.path.len() - 3] == "serviceStateTable"
    }
}

pub fn parse_scpd(bytes: &[u8]) -> Result<ScpdResult, ParseError> {
    let mut driver = Driver {
        bytes,
        path: Vec::new(),
        action_stack: Vec::new(),
        argument_stack: Vec::new(),
        actions: Vec::new(),
        state_variables: HashMap::new(),
        current_state_variable: None,
        current_state_variable_type: None,
    };
    let outcome = xml::parse(bytes, &mut driver);
    match outcome {
        Outcome::Success => Ok(ScpdResult {
            actions: driver.actions,
            state_variables: driver.state_variables,
        }),
        Outcome::UnexpectedCharacter(p) => Err(ParseError::Malformed(p, "unexpected character".into())),
        Outcome::UnexpectedEnd(p) => Err(ParseError::UnexpectedEnd(p)),
        Outcome::Abort | Outcome::InvalidArgument => {
            Err(ParseError::Malformed(Position::START, "aborted".into()))
        }
        Outcome::Other(XmlFail::ExtraNamespaceColon) => {
            Err(ParseError::Malformed(Position::START, "extra namespace colon".into()))
        }
        Outcome::Other(XmlFail::MismatchedEndTag) => {
            Err(ParseError::Malformed(Position::START, "mismatched end tag".into()))
        }
        Outcome::Other(XmlFail::DepthExceeded) => Err(ParseError::DepthExceeded(Position::START)),
    }
}

/// Fill every action argument's `data_type` from `state_variables`. Fails
/// the whole build if any argument's `relatedStateVariable` is unresolved.
pub fn resolve_argument_types(
    mut actions: Vec<Action>,
    state_variables: &HashMap<String, String>,
) -> Result<Vec<Action>, DescriptorError> {
    for action in &mut actions {
        for arg in &mut action.arguments {
            match state_variables.get(&arg.related_state_variable) {
                Some(ty) => arg.data_type = ty.clone(),
                None => {
                    return Err(DescriptorError::MissingArgumentType {
                        arg: arg.name.clone(),
                        var: arg.related_state_variable.clone(),
                    })
                }
            }
        }
    }
    Ok(actions)
}
