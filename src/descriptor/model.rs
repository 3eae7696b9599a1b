//! The owned descriptor tree (spec §3 "Descriptor tree"): built once from a
//! device description plus its services' SCPDs, then read many times during
//! queries.

/// Input/output direction of an [`Argument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub related_state_variable: String,
    pub direction: Direction,
    /// Inherited from the owning service's state-variable table during
    /// build; non-empty once the tree is fully built (spec §3 invariant).
    pub data_type: String,
    /// Populated only during a query lifecycle; cleared between queries for
    /// input arguments, retained for outputs until the next bind/clear.
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Action {
    pub fn input_argument(&self, name: &str) -> Option<&Argument> {
        self.arguments
            .iter()
            .find(|a| a.direction == Direction::In && a.name == name)
    }

    pub fn output_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.direction == Direction::Out)
    }
}

#[derive(Debug, Clone)]
pub struct Service {
    /// Suffix of `urn:dslforum-org:service:<NAME>`.
    pub name: String,
    /// Full service type URN.
    pub service_type: String,
    pub scpd_path: String,
    pub control_url: String,
    pub actions: Vec<Action>,
}

impl Service {
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    /// Suffix of `urn:dslforum-org:device:<NAME>`.
    pub name: String,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    /// The device-description URL that produced this tree.
    pub url: String,
    pub devices: Vec<Device>,
}

/// Strip a `urn:dslforum-org:<kind>:` prefix, returning the suffix, or the
/// whole string unchanged if the prefix doesn't match (spec §4.D).
pub fn strip_urn_prefix<'a>(value: &'a str, kind: &str) -> &'a str {
    let prefix = format!("urn:dslforum-org:{kind}:");
    value.strip_prefix(prefix.as_str()).unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_device_urn_prefix() {
        assert_eq!(
            strip_urn_prefix("urn:dslforum-org:device:InternetGatewayDevice:1", "device"),
            "InternetGatewayDevice:1"
        );
    }

    #[test]
    fn leaves_non_matching_value_unchanged() {
        assert_eq!(strip_urn_prefix("something-else", "device"), "something-else");
    }

    #[test]
    fn action_separates_inputs_from_outputs() {
        let action = Action {
            name: "SetConfig".into(),
            arguments: vec![
                Argument {
                    name: "NewValue".into(),
                    related_state_variable: "Value".into(),
                    direction: Direction::In,
                    data_type: "string".into(),
                    value: None,
                },
                Argument {
                    name: "NewStatus".into(),
                    related_state_variable: "Status".into(),
                    direction: Direction::Out,
                    data_type: "string".into(),
                    value: None,
                },
            ],
        };
        assert_eq!(action.input_argument("NewValue").unwrap().name, "NewValue");
        assert!(action.input_argument("NewStatus").is_none());
        let outs: Vec<&str> = action.output_arguments().map(|a| a.name.as_str()).collect();
        assert_eq!(outs, vec!["NewStatus"]);
    }

    #[test]
    fn service_looks_up_action_by_exact_name() {
        let service = Service {
            name: "Svc".into(),
            service_type: "urn:dslforum-org:service:Svc:1".into(),
            scpd_path: "/scpd.xml".into(),
            control_url: "/control".into(),
            actions: vec![Action {
                name: "GetInfo".into(),
                arguments: vec![],
            }],
        };
        assert!(service.action("GetInfo").is_some());
        assert!(service.action("GetOther").is_none());
    }
}
