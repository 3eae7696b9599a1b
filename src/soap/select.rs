//! Action selection by prefix match (spec §4.G).

use crate::descriptor::model::{Action, Device, Object, Service};
use crate::error::QueryError;

pub struct Selection<'a> {
    pub device: &'a Device,
    pub service: &'a Service,
    pub action: &'a Action,
}

/// Scan the tree for `(device?, service, action)` matches where each
/// supplied name is a **prefix** of the corresponding tree name. A `None`
/// device scopes nothing. Exactly one match selects; zero or multiple fail.
pub fn select_action<'a>(
    object: &'a Object,
    device: Option<&str>,
    service: &str,
    action: &str,
) -> Result<Selection<'a>, QueryError> {
    let mut matches: Vec<Selection<'a>> = Vec::new();

    for d in &object.devices {
        if let Some(dev_prefix) = device {
            if !d.name.starts_with(dev_prefix) {
                continue;
            }
        }
        for s in &d.services {
            if !s.name.starts_with(service) {
                continue;
            }
            for a in &s.actions {
                if a.name.starts_with(action) {
                    matches.push(Selection { device: d, service: s, action: a });
                }
            }
        }
    }

    match matches.len() {
        0 => Err(QueryError::UnknownAction(action.to_string())),
        1 => Ok(matches.into_iter().next().unwrap()),
        _ => Err(QueryError::AmbiguousAction(action.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::model::{Argument, Direction};

    fn sample() -> Object {
        Object {
            name: "gw".into(),
            url: "http://host/desc.xml".into(),
            devices: vec![Device {
                name: "InternetGatewayDevice".into(),
                services: vec![
                    Service {
                        name: "WANIPConnection".into(),
                        service_type: "urn:dslforum-org:service:WANIPConnection:1".into(),
                        scpd_path: "/wanip.xml".into(),
                        control_url: "/control/wanip".into(),
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
                    },
                    Service {
                        name: "WANPPPConnection".into(),
                        service_type: "urn:dslforum-org:service:WANPPPConnection:1".into(),
                        scpd_path: "/wanppp.xml".into(),
                        control_url: "/control/wanppp".into(),
                        actions: vec![Action {
                            name: "GetExternalIPAddress".into(),
                            arguments: vec![],
                        }],
                    },
                ],
            }],
        }
    }

    #[test]
    fn unambiguous_prefix_selects() {
        let obj = sample();
        let sel = select_action(&obj, None, "WANIP", "GetExt").unwrap();
        assert_eq!(sel.service.name, "WANIPConnection");
    }

    #[test]
    fn ambiguous_action_across_services_fails() {
        let obj = sample();
        let err = select_action(&obj, None, "WAN", "GetExt").unwrap_err();
        assert!(matches!(err, QueryError::AmbiguousAction(_)));
    }

    #[test]
    fn no_match_fails_as_unknown_action() {
        let obj = sample();
        let err = select_action(&obj, None, "WANIP", "NoSuchAction").unwrap_err();
        assert!(matches!(err, QueryError::UnknownAction(_)));
    }
}
