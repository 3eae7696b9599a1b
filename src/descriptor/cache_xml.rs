//! Descriptor cache file format (spec §4.D step 1 and step 4): a single XML
//! file mirroring the [`crate::descriptor::model`] tree exactly, so it can
//! be read back without any network activity when the requested URL matches.
//!
//! Schema: `object(name,url) > device(name) > service(name,type,path,control)
//! > action(name) > arg(name,var,type,dir)`. Every element validates that
//! all of its required attributes were present by the time its close tag is
//! reached.

use crate::descriptor::model::{Action, Argument, Device, Direction, Object, Service};
use crate::error::ParseError;
use crate::escape::{escape_xml, unescape_xml, PREDEFINED_ENTITIES};
use crate::parse::xml::{self, XmlEvent, XmlFail, XmlVisitor};
use crate::parse::Outcome;
use crate::token::{Flow, Position};
use std::fmt::Write as _;

/// Parse a cache file's contents. Returns `Ok(None)` if parsing succeeded
/// but the tree's `url` doesn't match `requested_url` (spec: "discard it").
pub fn parse_cache(bytes: &[u8], requested_url: &str) -> Result<Option<Object>, ParseError> {
    let mut driver = Driver {
        bytes,
        b: CacheBuilder::default(),
    };
    let outcome = xml::parse(bytes, &mut driver);
    match outcome {
        Outcome::Success => {}
        Outcome::UnexpectedCharacter(p) => {
            return Err(ParseError::Malformed(p, "unexpected character".into()))
        }
        Outcome::UnexpectedEnd(p) => return Err(ParseError::UnexpectedEnd(p)),
        Outcome::Abort | Outcome::InvalidArgument => {
            return Err(ParseError::Malformed(Position::START, "aborted".into()))
        }
        Outcome::Other(XmlFail::ExtraNamespaceColon) => {
            return Err(ParseError::Malformed(Position::START, "extra namespace colon".into()))
        }
        Outcome::Other(XmlFail::MismatchedEndTag) => {
            return Err(ParseError::Malformed(Position::START, "mismatched end tag".into()))
        }
        Outcome::Other(XmlFail::DepthExceeded) => return Err(ParseError::DepthExceeded(Position::START)),
    }

    let object = match driver.b.into_object()? {
        Some(obj) => obj,
        None => return Ok(None),
    };
    let url = unescape_xml(&object.url, PREDEFINED_ENTITIES)?.into_owned();
    if url == requested_url {
        Ok(Some(object))
    } else {
        Ok(None)
    }
}

/// Serialize a built tree back into cache-file XML, escaping `name`/`url`.
pub fn serialize_cache(obj: &Object) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<object name=\"{}\" url=\"{}\">",
        escape_xml(&obj.name),
        escape_xml(&obj.url)
    );
    for device in &obj.devices {
        let _ = write!(out, "<device name=\"{}\">", escape_xml(&device.name));
        for service in &device.services {
            let _ = write!(
                out,
                "<service name=\"{}\" type=\"{}\" path=\"{}\" control=\"{}\">",
                escape_xml(&service.name),
                escape_xml(&service.service_type),
                escape_xml(&service.scpd_path),
                escape_xml(&service.control_url)
            );
            for action in &service.actions {
                let _ = write!(out, "<action name=\"{}\">", escape_xml(&action.name));
                for arg in &action.arguments {
                    let dir = match arg.direction {
                        Direction::In => "in",
                        Direction::Out => "out",
                    };
                    let _ = write!(
                        out,
                        "<arg name=\"{}\" var=\"{}\" type=\"{}\" dir=\"{}\"/>",
                        escape_xml(&arg.name),
                        escape_xml(&arg.related_state_variable),
                        escape_xml(&arg.data_type),
                        dir
                    );
                }
                out.push_str("</action>");
            }
            out.push_str("</service>");
        }
        out.push_str("</device>");
    }
    out.push_str("</object>");
    out
}

#[derive(Default)]
struct PartialArg {
    name: Option<String>,
    var: Option<String>,
    data_type: Option<String>,
    dir: Option<Direction>,
}

#[derive(Default)]
struct PartialAction {
    name: Option<String>,
    args: Vec<Argument>,
}

#[derive(Default)]
struct PartialService {
    name: Option<String>,
    service_type: Option<String>,
    scpd_path: Option<String>,
    control_url: Option<String>,
    actions: Vec<Action>,
}

#[derive(Default)]
struct PartialDevice {
    name: Option<String>,
    services: Vec<Service>,
}

#[derive(Default)]
struct CacheBuilder {
    object_name: Option<String>,
    object_url: Option<String>,
    devices: Vec<Device>,
    device_stack: Vec<PartialDevice>,
    service_stack: Vec<PartialService>,
    action_stack: Vec<PartialAction>,
    arg_stack: Vec<PartialArg>,
    error: Option<ParseError>,
}

impl CacheBuilder {
    fn into_object(self) -> Result<Option<Object>, ParseError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        match (self.object_name, self.object_url) {
            (Some(name), Some(url)) => Ok(Some(Object {
                name,
                url,
                devices: self.devices,
            })),
            _ => Ok(None),
        }
    }

    fn fail(&mut self, msg: &str) -> Flow {
        self.error = Some(ParseError::Malformed(Position::START, msg.to_string()));
        Flow::Stop
    }
}

/// Drives [`xml::parse`] for [`CacheBuilder`], resolving attribute tokens
/// against the source bytes (the `XmlVisitor` contract hands back tokens,
/// not strings, so the driver needs to hold the buffer the builder doesn't).
struct Driver<'a> {
    bytes: &'a [u8],
    b: CacheBuilder,
}

impl<'a> XmlVisitor for Driver<'a> {
    fn visit(&mut self, event: XmlEvent) -> Flow {
        let bytes = self.bytes;
        let b = &mut self.b;
        match event {
            XmlEvent::StartTag { local_name, .. } => match local_name.slice(bytes) {
                b"device" => b.device_stack.push(PartialDevice::default()),
                b"service" => b.service_stack.push(PartialService::default()),
                b"action" => b.action_stack.push(PartialAction::default()),
                b"arg" => b.arg_stack.push(PartialArg::default()),
                _ => {}
            },
            XmlEvent::Attribute { local_name, value, .. } => {
                let name = String::from_utf8_lossy(local_name.slice(bytes)).into_owned();
                let val = String::from_utf8_lossy(value.slice(bytes)).into_owned();
                if let Some(arg) = b.arg_stack.last_mut() {
                    match name.as_str() {
                        "name" => arg.name = Some(val),
                        "var" => arg.var = Some(val),
                        "type" => arg.data_type = Some(val),
                        "dir" => arg.dir = Some(if val == "in" { Direction::In } else { Direction::Out }),
                        _ => {}
                    }
                } else if let Some(action) = b.action_stack.last_mut() {
                    if name == "name" {
                        action.name = Some(val);
                    }
                } else if let Some(service) = b.service_stack.last_mut() {
                    match name.as_str() {
                        "name" => service.name = Some(val),
                        "type" => service.service_type = Some(val),
                        "path" => service.scpd_path = Some(val),
                        "control" => service.control_url = Some(val),
                        _ => {}
                    }
                } else if let Some(device) = b.device_stack.last_mut() {
                    if name == "name" {
                        device.name = Some(val);
                    }
                } else {
                    match name.as_str() {
                        "name" => b.object_name = Some(val),
                        "url" => b.object_url = Some(val),
                        _ => {}
                    }
                }
            }
            XmlEvent::EndTag { local_name, .. } => match local_name.slice(bytes) {
                b"arg" => {
                    let a = b.arg_stack.pop().expect("arg end without matching start");
                    match (a.name, a.var, a.data_type, a.dir) {
                        (Some(name), Some(var), Some(data_type), Some(dir)) => {
                            if let Some(action) = b.action_stack.last_mut() {
                                action.args.push(Argument {
                                    name,
                                    related_state_variable: var,
                                    direction: dir,
                                    data_type,
                                    value: None,
                                });
                            }
                        }
                        _ => return b.fail("arg missing a required attribute"),
                    }
                }
                b"action" => {
                    let a = b.action_stack.pop().expect("action end without matching start");
                    match a.name {
                        Some(name) => {
                            if let Some(service) = b.service_stack.last_mut() {
                                service.actions.push(Action { name, arguments: a.args });
                            }
                        }
                        None => return b.fail("action missing name"),
                    }
                }
                b"service" => {
                    let s = b.service_stack.pop().expect("service end without matching start");
                    match (s.name, s.service_type, s.scpd_path, s.control_url) {
                        (Some(name), Some(service_type), Some(scpd_path), Some(control_url)) => {
                            if let Some(device) = b.device_stack.last_mut() {
                                device.services.push(Service {
                                    name,
                                    service_type,
                                    scpd_path,
                                    control_url,
                                    actions: s.actions,
                                });
                            }
                        }
                        _ => return b.fail("service missing a required attribute"),
                    }
                }
                b"device" => {
                    let d = b.device_stack.pop().expect("device end without matching start");
                    match d.name {
                        Some(name) => b.devices.push(Device { name, services: d.services }),
                        None => return b.fail("device missing name"),
                    }
                }
                b"object" => {
                    if b.object_name.is_none() || b.object_url.is_none() {
                        return b.fail("object missing name or url");
                    }
                }
                _ => {}
            },
            _ => {}
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_serialize_then_parse() {
        let obj = Object {
            name: "GW".into(),
            url: "http://host:49000/desc.xml".into(),
            devices: vec![Device {
                name: "InternetGatewayDevice".into(),
                services: vec![Service {
                    name: "WANIPConn1".into(),
                    service_type: "urn:dslforum-org:service:WANIPConnection:1".into(),
                    scpd_path: "/scpd.xml".into(),
                    control_url: "/control".into(),
                    actions: vec![Action {
                        name: "GetExternalIPAddress".into(),
                        arguments: vec![Argument {
                            name: "NewExternalIPAddress".into(),
                            related_state_variable: "ExternalIPAddress".into(),
                            direction: Direction::Out,
                            data_type: "string".into(),
                            value: None,
                        }],
                    }],
                }],
            }],
        };
        let xml_text = serialize_cache(&obj);
        let parsed = parse_cache(xml_text.as_bytes(), &obj.url).unwrap().unwrap();
        assert_eq!(parsed.name, obj.name);
        assert_eq!(
            parsed.devices[0].services[0].actions[0].arguments[0].data_type,
            "string"
        );
    }

    #[test]
    fn url_mismatch_discards_tree() {
        let obj = Object {
            name: "GW".into(),
            url: "http://host/a.xml".into(),
            devices: vec![],
        };
        let xml_text = serialize_cache(&obj);
        let parsed = parse_cache(xml_text.as_bytes(), "http://host/b.xml").unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn missing_required_attribute_is_an_error() {
        let bad = r#"<object name="GW" url="http://host/a.xml"><device name="D"><service name="S" type="t" path="/p"></service></device></object>"#;
        let err = parse_cache(bad.as_bytes(), "http://host/a.xml").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_, _)));
    }
}
