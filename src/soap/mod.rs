//! SOAP query engine (spec §4.G): selects an action by prefix match,
//! synthesizes the request envelope, drives it through the HTTP transport
//! with Digest retry, parses the response, and renders the bound output
//! arguments.

pub mod render;
pub mod request;
pub mod response;
pub mod select;

pub use render::{render, OutputFormat};
pub use select::{select_action, Selection};

use crate::descriptor::model::Object;
use crate::digest::{self, DigestState};
use crate::error::QueryError;
use crate::transport::RequestContext;
use std::collections::HashMap;

/// Run one query end to end: select the action, bind inputs, POST the
/// envelope (retrying once on 401 with a computed Digest header), parse the
/// response, and return the rendered bytes.
pub fn query(
    object: &Object,
    ctx: &mut RequestContext,
    digest: &mut DigestState,
    user: &str,
    password: &str,
    device: Option<&str>,
    service: &str,
    action: &str,
    bindings: &HashMap<String, String>,
    format: OutputFormat,
) -> Result<Vec<u8>, QueryError> {
    let selection = select_action(object, device, service, action)?;
    let envelope = request::build_envelope(selection.action, selection.service, bindings)?;

    let host_header = format!("{}:{}", ctx.host, ctx.port);
    let raw = request::build_http_request(
        &host_header,
        &selection.service.control_url,
        &selection.service.service_type,
        &selection.action.name,
        &envelope,
        None,
    );

    let outcome = ctx.request(&raw).map_err(QueryError::Transport)?;

    let resolved_arguments = if outcome.status == 401 {
        let challenge_value = outcome
            .header("WWW-Authenticate")
            .ok_or(crate::error::DigestError::MissingChallengeField("WWW-Authenticate"))?;
        let challenge = digest::parse_challenge(challenge_value)?;
        let auth = digest::authorization_header(
            &challenge,
            digest,
            "POST",
            &selection.service.control_url,
            user,
            password,
        );
        let raw_retry = request::build_http_request(
            &host_header,
            &selection.service.control_url,
            &selection.service.service_type,
            &selection.action.name,
            &envelope,
            Some(&auth),
        );
        let retry_outcome = ctx.request(&raw_retry).map_err(QueryError::Transport)?;
        if retry_outcome.status != 200 {
            return Err(QueryError::Http(crate::error::HttpError {
                status: retry_outcome.status,
                reason: None,
            }));
        }
        response::parse_response(&retry_outcome.content, selection.action)?
    } else if outcome.status == 200 {
        response::parse_response(&outcome.content, selection.action)?
    } else {
        return Err(QueryError::Http(crate::error::HttpError {
            status: outcome.status,
            reason: None,
        }));
    };

    render::render(selection.action, &resolved_arguments, format)
}
