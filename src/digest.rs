//! HTTP Digest authentication (spec §4.F): parses a `WWW-Authenticate`
//! challenge and computes the matching `Authorization` header, RFC 2617
//! `qop=auth` when offered, falling back to the RFC 2069 form otherwise.
//!
//! `auth-int` and `algorithm=MD5-sess` are not implemented (spec: "still
//! emit a best-effort auth form rather than failing outright") — we fold
//! `MD5-sess` down to plain `MD5` and ignore `auth-int`, which the server
//! is free to reject with another 401.

use crate::error::DigestError;
use md5::{Digest, Md5};
use rand::Rng;
use std::fmt::Write as _;

#[derive(Debug, Clone)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
    pub opaque: Option<String>,
}

/// Per-connection Digest state carried across requests (spec §3).
#[derive(Debug, Default, Clone)]
pub struct DigestState {
    pub cnonce: Option<String>,
    pub nonce_count: u32,
}

impl DigestState {
    fn next_nc(&mut self) -> u32 {
        self.nonce_count += 1;
        self.nonce_count
    }

    fn cnonce(&mut self) -> &str {
        if self.cnonce.is_none() {
            self.cnonce = Some(generate_cnonce());
        }
        self.cnonce.as_ref().unwrap()
    }
}

fn generate_cnonce() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 4] = rng.gen();
    hex::encode(bytes)
}

/// Parse a `WWW-Authenticate: Digest ...` header value (spec §4.F token
/// stream: scheme, then comma-separated `name=value` pairs, quoted or not).
pub fn parse_challenge(header_value: &str) -> Result<Challenge, DigestError> {
    let trimmed = header_value.trim();
    let rest = match trimmed.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("digest") => rest.trim_start(),
        _ => return Err(DigestError::Malformed("missing Digest scheme".into())),
    };

    let mut realm = None;
    let mut nonce = None;
    let mut qop = None;
    let mut algorithm = None;
    let mut opaque = None;

    for field in split_params(rest) {
        let Some((name, value)) = field.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = unquote(value.trim());
        match name {
            "realm" => realm = Some(value),
            "nonce" => nonce = Some(value),
            "qop" => qop = Some(value),
            "algorithm" => algorithm = Some(value),
            "opaque" => opaque = Some(value),
            _ => {}
        }
    }

    Ok(Challenge {
        realm: realm.ok_or(DigestError::MissingChallengeField("realm"))?,
        nonce: nonce.ok_or(DigestError::MissingChallengeField("nonce"))?,
        qop,
        algorithm,
        opaque,
    })
}

/// Split on commas that are not inside a quoted string.
fn split_params(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        out.push(last);
    }
    out
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

/// Does the challenge offer `qop=auth` (preferring it over `auth-int` if
/// both are listed, per RFC 2617)?
fn offers_qop_auth(challenge: &Challenge) -> bool {
    challenge
        .qop
        .as_deref()
        .map(|q| q.split(',').any(|v| v.trim() == "auth"))
        .unwrap_or(false)
}

fn md5_hex(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b":");
        }
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Compute the `Authorization: Digest ...` header for one request.
pub fn authorization_header(
    challenge: &Challenge,
    state: &mut DigestState,
    method: &str,
    uri: &str,
    user: &str,
    password: &str,
) -> String {
    let ha1 = md5_hex(&[user, &challenge.realm, password]);
    let ha2 = md5_hex(&[method, uri]);

    let mut header = String::new();
    write!(
        header,
        "Digest username=\"{user}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\"",
        user = user,
        realm = challenge.realm,
        nonce = challenge.nonce,
        uri = uri
    )
    .unwrap();

    if offers_qop_auth(challenge) {
        let nc = state.next_nc();
        let nc_str = format!("{:08x}", nc);
        let cnonce = state.cnonce().to_string();
        let response = md5_hex(&[&ha1, &challenge.nonce, &nc_str, &cnonce, "auth", &ha2]);
        write!(
            header,
            ", qop=auth, nc={nc}, cnonce=\"{cnonce}\", response=\"{response}\"",
            nc = nc_str,
            cnonce = cnonce,
            response = response
        )
        .unwrap();
    } else {
        // RFC 2069: response = MD5(HA1:nonce:HA2), no qop/nc/cnonce.
        let response = md5_hex(&[&ha1, &challenge.nonce, &ha2]);
        write!(header, ", response=\"{response}\"", response = response).unwrap();
    }

    if let Some(opaque) = &challenge.opaque {
        write!(header, ", opaque=\"{opaque}\"").unwrap();
    }

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc2617_challenge() {
        let c = parse_challenge(
            r#"Digest realm="testrealm@host.com", qop="auth", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#,
        )
        .unwrap();
        assert_eq!(c.realm, "testrealm@host.com");
        assert_eq!(c.qop.as_deref(), Some("auth"));
        assert!(offers_qop_auth(&c));
        assert_eq!(c.opaque.as_deref(), Some("5ccc069c403ebaf9f0171e9517f40e41"));
    }

    #[test]
    fn rfc2069_fallback_when_no_qop() {
        let c = parse_challenge(r#"Digest realm="r", nonce="n""#).unwrap();
        assert!(!offers_qop_auth(&c));
        let mut state = DigestState::default();
        let header = authorization_header(&c, &mut state, "GET", "/x", "u", "p");
        assert!(header.contains("response="));
        assert!(!header.contains("qop="));
        assert!(!header.contains("nc="));
    }

    #[test]
    fn qop_auth_increments_nonce_count_each_call() {
        let c = parse_challenge(r#"Digest realm="r", nonce="n", qop="auth""#).unwrap();
        let mut state = DigestState::default();
        let h1 = authorization_header(&c, &mut state, "GET", "/x", "u", "p");
        let h2 = authorization_header(&c, &mut state, "GET", "/x", "u", "p");
        assert!(h1.contains("nc=00000001"));
        assert!(h2.contains("nc=00000002"));
        // cnonce is stable across requests on the same connection.
        let cnonce = state.cnonce.clone().unwrap();
        assert!(h1.contains(&cnonce));
        assert!(h2.contains(&cnonce));
    }

    #[test]
    fn missing_realm_is_an_error() {
        let err = parse_challenge(r#"Digest nonce="n""#).unwrap_err();
        assert!(matches!(err, DigestError::MissingChallengeField("realm")));
    }

    #[test]
    fn scheme_is_matched_case_insensitively() {
        let c = parse_challenge(r#"digest realm="r", nonce="n""#).unwrap();
        assert_eq!(c.realm, "r");
        let c = parse_challenge(r#"DIGEST realm="r", nonce="n""#).unwrap();
        assert_eq!(c.realm, "r");
    }

    #[test]
    fn algorithm_is_recorded() {
        let c = parse_challenge(r#"Digest realm="r", nonce="n", algorithm=MD5-sess"#).unwrap();
        assert_eq!(c.algorithm.as_deref(), Some("MD5-sess"));
    }
}
