//! Device description parser (spec §4.D step 2): a SAX visitor over a
//! `root`-rooted UPnP device description document.
//!
//! Recognises three valid path shapes for a `device` element (`root/device`,
//! `root/device/deviceList/device`, and one further nesting) and the
//! corresponding `serviceList/service` shape nested under each. All
//! recognised devices are appended to the object's device list as siblings
//! (the model has no nested-device field — nesting in the document does not
//! imply nesting in the tree).

use crate::descriptor::model::{strip_urn_prefix, Device, Service};
use crate::error::ParseError;
use crate::parse::xml::{self, XmlEvent, XmlFail, XmlVisitor};
use crate::parse::Outcome;
use crate::token::{Flow, Position};

#[derive(Default)]
struct DeviceBuild {
    name: Option<String>,
    services: Vec<Service>,
}

#[derive(Default)]
struct ServiceBuild {
    name: Option<String>,
    service_type: Option<String>,
    scpd_path: Option<String>,
    control_url: Option<String>,
}

pub struct LiveResult {
    pub object_name: Option<String>,
    pub devices: Vec<Device>,
}

struct Driver<'a> {
    bytes: &'a [u8],
    path: Vec<String>,
    device_marks: Vec<bool>,
    service_marks: Vec<bool>,
    device_stack: Vec<DeviceBuild>,
    service_stack: Vec<ServiceBuild>,
    devices: Vec<Device>,
    object_name: Option<String>,
}

fn is_valid_device_path(path: &[String]) -> bool {
    let tags: Vec<&str> = path.iter().map(String::as_str).collect();
    matches!(
        tags.as_slice(),
        ["root", "device"]
            | ["root", "device", "deviceList", "device"]
            | ["root", "device", "deviceList", "device", "deviceList", "device"]
    )
}

fn is_valid_service_path(path: &[String]) -> bool {
    if path.len() < 2 {
        return false;
    }
    if path[path.len() - 1] != "service" || path[path.len() - 2] != "serviceList" {
        return false;
    }
    is_valid_device_path(&path[..path.len() - 2])
}

impl<'a> XmlVisitor for Driver<'a> {
    fn visit(&mut self, event: XmlEvent) -> Flow {
        match event {
            XmlEvent::StartTag { local_name, .. } => {
                let name = String::from_utf8_lossy(local_name.slice(self.bytes)).into_owned();
                self.path.push(name);
                if self.path.last().map(String::as_str) == Some("device") {
                    let valid = is_valid_device_path(&self.path);
                    self.device_marks.push(valid);
                    if valid {
                        self.device_stack.push(DeviceBuild::default());
                    }
                } else if self.path.last().map(String::as_str) == Some("service") {
                    let valid = is_valid_service_path(&self.path);
                    self.service_marks.push(valid);
                    if valid {
                        self.service_stack.push(ServiceBuild::default());
                    }
                }
            }
            XmlEvent::EndTag { local_name, .. } => {
                let name = String::from_utf8_lossy(local_name.slice(self.bytes)).into_owned();
                if name == "service" {
                    if let Some(valid) = self.service_marks.pop() {
                        if valid {
                            let s = self.service_stack.pop().expect("service build stack underflow");
                            if let (Some(name), Some(service_type), Some(scpd_path), Some(control_url)) =
                                (s.name, s.service_type, s.scpd_path, s.control_url)
                            {
                                if let Some(device) = self.device_stack.last_mut() {
                                    device.services.push(Service {
                                        name,
                                        service_type,
                                        scpd_path,
                                        control_url,
                                        actions: Vec::new(),
                                    });
                                }
                            }
                        }
                    }
                } else if name == "device" {
                    if let Some(valid) = self.device_marks.pop() {
                        if valid {
                            let d = self.device_stack.pop().expect("device build stack underflow");
                            if let Some(name) = d.name {
                                self.devices.push(Device { name, services: d.services });
                            }
                        }
                    }
                }
                self.path.pop();
            }
            XmlEvent::Content { value } => {
                let text = String::from_utf8_lossy(value.slice(self.bytes)).into_owned();
                if text.is_empty() {
                    return Flow::Continue;
                }
                match self.path.last().map(String::as_str) {
                    Some("friendlyName") => {
                        if self.object_name.is_none() {
                            self.object_name = Some(text);
                        }
                    }
                    Some("deviceType") => {
                        if let Some(device) = self.device_stack.last_mut() {
                            if device.name.is_none() {
                                device.name = Some(strip_urn_prefix(&text, "device").to_string());
                            }
                        }
                    }
                    Some("serviceType") => {
                        if let Some(service) = self.service_stack.last_mut() {
                            service.name.get_or_insert_with(|| strip_urn_prefix(&text, "service").to_string());
                            service.service_type = Some(text);
                        }
                    }
                    Some("SCPDURL") => {
                        if let Some(service) = self.service_stack.last_mut() {
                            service.scpd_path = Some(text);
                        }
                    }
                    Some("controlURL") => {
                        if let Some(service) = self.service_stack.last_mut() {
                            service.control_url = Some(text);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Flow::Continue
    }
}

pub fn parse_device_description(bytes: &[u8]) -> Result<LiveResult, ParseError> {
    let mut driver = Driver {
        bytes,
        path: Vec::new(),
        device_marks: Vec::new(),
        service_marks: Vec::new(),
        device_stack: Vec::new(),
        service_stack: Vec::new(),
        devices: Vec::new(),
        object_name: None,
    };
    let outcome = xml::parse(bytes, &mut driver);
    match outcome {
        Outcome::Success => Ok(LiveResult {
            object_name: driver.object_name,
            devices: driver.devices,
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
