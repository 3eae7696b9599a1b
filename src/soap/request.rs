//! SOAP envelope synthesis and the HTTP POST wrapper (spec §4.G).

use crate::descriptor::model::{Action, Direction, Service};
use crate::error::QueryError;
use crate::escape::escape_xml;
use std::collections::HashMap;
use std::fmt::Write as _;

const SOAP_ENCODING_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";
const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Bind every `in` argument against `bindings` and render the envelope body.
/// Duplicate assignments are expected to have already been rejected by the
/// caller that assembled `bindings` from the raw `var=value` argument list
/// (a `HashMap` cannot represent a duplicate key by construction).
pub fn build_envelope(
    action: &Action,
    service: &Service,
    bindings: &HashMap<String, String>,
) -> Result<String, QueryError> {
    let mut args = String::new();
    for arg in action.arguments.iter().filter(|a| a.direction == Direction::In) {
        let value = bindings
            .get(&arg.name)
            .ok_or_else(|| QueryError::MissingInputArgument(arg.name.clone()))?;
        let escaped = escape_xml(value);
        write!(args, "<{name}>{value}</{name}>", name = arg.name, value = escaped).unwrap();
    }

    let mut envelope = String::new();
    write!(
        envelope,
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
<s:Envelope s:encodingStyle=\"{encoding}\" xmlns:s=\"{envns}\">\
<s:Body>\
<u:{action} xmlns:u=\"{service_type}\">{args}</u:{action}>\
</s:Body>\
</s:Envelope>",
        encoding = SOAP_ENCODING_STYLE,
        envns = SOAP_ENVELOPE_NS,
        action = action.name,
        service_type = service.service_type,
        args = args,
    )
    .unwrap();

    Ok(envelope)
}

/// Wrap `envelope` in a complete HTTP/1.1 POST request (spec §4.G).
/// `auth_header` is `None` on the first attempt and `Some` on a 401 retry.
pub fn build_http_request(
    host_header: &str,
    control_url: &str,
    service_type: &str,
    action_name: &str,
    envelope: &str,
    auth_header: Option<&str>,
) -> Vec<u8> {
    let body = envelope.as_bytes();
    let mut request = String::new();
    write!(
        request,
        "POST {path} HTTP/1.1\r\n\
Host: {host}\r\n\
Connection: keep-alive\r\n\
SOAPAction: \"{service_type}#{action}\"\r\n\
Content-Type: text/xml; charset=utf-8\r\n\
Content-Length: {len}\r\n",
        path = control_url,
        host = host_header,
        service_type = service_type,
        action = action_name,
        len = body.len(),
    )
    .unwrap();
    if let Some(auth) = auth_header {
        write!(request, "Authorization: {auth}\r\n").unwrap();
    }
    request.push_str("\r\n");

    let mut out = request.into_bytes();
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::model::Argument;

    fn action() -> Action {
        Action {
            name: "SetConnectionType".into(),
            arguments: vec![Argument {
                name: "NewConnectionType".into(),
                related_state_variable: "ConnectionType".into(),
                direction: Direction::In,
                data_type: "string".into(),
                value: None,
            }],
        }
    }

    fn service() -> Service {
        Service {
            name: "WANIPConnection".into(),
            service_type: "urn:dslforum-org:service:WANIPConnection:1".into(),
            scpd_path: "/wanip.xml".into(),
            control_url: "/control/wanip".into(),
            actions: vec![],
        }
    }

    #[test]
    fn envelope_escapes_input_values() {
        let mut bindings = HashMap::new();
        bindings.insert("NewConnectionType".to_string(), "IP_Rout&ed".to_string());
        let env = build_envelope(&action(), &service(), &bindings).unwrap();
        assert!(env.contains("<NewConnectionType>IP_Rout&amp;ed</NewConnectionType>"));
        assert!(env.contains("xmlns:u=\"urn:dslforum-org:service:WANIPConnection:1\""));
        assert!(env.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
    }

    #[test]
    fn missing_input_argument_fails() {
        let bindings = HashMap::new();
        let err = build_envelope(&action(), &service(), &bindings).unwrap_err();
        assert!(matches!(err, QueryError::MissingInputArgument(_)));
    }

    #[test]
    fn request_has_soap_action_and_content_length() {
        let raw = build_http_request(
            "192.168.1.1:49000",
            "/control/wanip",
            "urn:dslforum-org:service:WANIPConnection:1",
            "GetExternalIPAddress",
            "<envelope/>",
            None,
        );
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("POST /control/wanip HTTP/1.1\r\n"));
        assert!(text.contains("SOAPAction: \"urn:dslforum-org:service:WANIPConnection:1#GetExternalIPAddress\"\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("<envelope/>"));
    }
}
