//! SSDP discovery (spec §4.H): multicast `M-SEARCH` on a local interface,
//! `select`-paced receive loop bounded by `ctx.timeout`, HTTP-parser-based
//! extraction of `ST`/`SERVER`/`LOCATION` from each 200-OK reply.

use crate::error::TransportError;
use crate::parse::http::{self, HttpEvent, HttpOutcome};
use crate::parse::Outcome;
use crate::token::Flow;
use crate::transport::TIMEOUT_RESOLUTION;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_PORT: u16 = 1900;
pub const SEARCH_TARGET: &str = "urn:dslforum-org:device:InternetGatewayDevice:1";

const DATAGRAM_BUFFER_SIZE: usize = 4096;

/// One discovery record: a gateway that answered with `ST` matching
/// [`SEARCH_TARGET`] (spec §4.H; emitted in arrival order, no dedup per §5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub server: String,
    pub location: String,
}

/// Run one discovery round on `local_addr` for up to `timeout`, returning
/// every matching reply in arrival order.
pub fn discover(local_addr: Ipv4Addr, timeout: Duration) -> Result<Vec<Discovery>, TransportError> {
    let socket = bind_multicast(local_addr)?;
    let request = build_msearch(clamp_mx(timeout));
    let dest: SocketAddr = SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT).into();
    socket
        .send_to(request.as_bytes(), &SockAddr::from(dest))
        .map_err(TransportError::Io)?;

    let socket: UdpSocket = socket.into();
    let mut results = Vec::new();
    let start = Instant::now();
    let mut buf = [0u8; DATAGRAM_BUFFER_SIZE];

    loop {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(results);
        }
        let wait = (timeout - elapsed).min(TIMEOUT_RESOLUTION);
        socket.set_read_timeout(Some(wait)).ok();

        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                if from.port() != SSDP_PORT {
                    continue;
                }
                if let Some(d) = parse_reply(&buf[..n]) {
                    results.push(d);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(TransportError::Io(e)),
        }
    }
}

fn bind_multicast(local_addr: Ipv4Addr) -> Result<Socket, TransportError> {
    let socket =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(TransportError::SocketCreate)?;
    let bind_addr: SocketAddr = SocketAddrV4::new(local_addr, 0).into();
    socket
        .bind(&SockAddr::from(bind_addr))
        .map_err(|e| TransportError::Connect {
            addr: bind_addr.to_string(),
            source: e,
        })?;
    socket.set_multicast_loop_v4(false).ok();
    socket.set_multicast_ttl_v4(3).ok();
    socket
        .join_multicast_v4(&SSDP_MULTICAST_ADDR, &local_addr)
        .map_err(|e| TransportError::Connect {
            addr: format!("{SSDP_MULTICAST_ADDR}"),
            source: e,
        })?;
    Ok(socket)
}

/// `MX = clamp(ctx.timeout/1000 - 1, 1, 5)`.
fn clamp_mx(timeout: Duration) -> u64 {
    let secs = (timeout.as_millis() / 1000) as i64;
    (secs - 1).clamp(1, 5) as u64
}

fn build_msearch(mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
HOST: {addr}:{port}\r\n\
MAN: \"ssdp:discover\"\r\n\
MX: {mx}\r\n\
ST: {st}\r\n\
\r\n",
        addr = SSDP_MULTICAST_ADDR,
        port = SSDP_PORT,
        mx = mx,
        st = SEARCH_TARGET,
    )
}

#[derive(Default)]
struct ReplyCollector {
    status: Option<u16>,
    headers: Vec<(usize, usize, usize, usize)>,
}

impl http::HttpVisitor for ReplyCollector {
    fn visit(&mut self, event: HttpEvent) -> Flow {
        match event {
            HttpEvent::Status { code, .. } => self.status = Some(code),
            HttpEvent::Parameter { name, value } => {
                self.headers.push((name.start, name.len, value.start, value.len))
            }
            _ => {}
        }
        Flow::Continue
    }
}

fn parse_reply(bytes: &[u8]) -> Option<Discovery> {
    let mut collector = ReplyCollector::default();
    let outcome: HttpOutcome = http::parse(bytes, &mut collector);
    if !matches!(outcome, Outcome::Success) || collector.status != Some(200) {
        return None;
    }

    let headers: Vec<(String, String)> = collector
        .headers
        .into_iter()
        .map(|(ns, nl, vs, vl)| {
            (
                String::from_utf8_lossy(&bytes[ns..ns + nl]).into_owned(),
                String::from_utf8_lossy(&bytes[vs..vs + vl]).into_owned(),
            )
        })
        .collect();

    let find = |name: &str| -> Option<String> {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };

    let st = find("ST")?;
    if st != SEARCH_TARGET {
        return None;
    }
    let server = find("SERVER").unwrap_or_default();
    let location = find("LOCATION")?;
    Some(Discovery { server, location })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mx_clamps_to_one_to_five_seconds() {
        assert_eq!(clamp_mx(Duration::from_millis(500)), 1);
        assert_eq!(clamp_mx(Duration::from_millis(3000)), 2);
        assert_eq!(clamp_mx(Duration::from_millis(60_000)), 5);
    }

    #[test]
    fn msearch_carries_the_target_search_type_and_mx() {
        let req = build_msearch(3);
        assert!(req.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(req.contains("MX: 3\r\n"));
        assert!(req.contains(&format!("ST: {SEARCH_TARGET}\r\n")));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn matching_reply_is_extracted() {
        let reply = format!(
            "HTTP/1.1 200 OK\r\nST: {st}\r\nSERVER: Foo/1.0 UPnP/1.0\r\nLOCATION: http://192.168.1.1:49000/desc.xml\r\n\r\n",
            st = SEARCH_TARGET
        );
        let d = parse_reply(reply.as_bytes()).unwrap();
        assert_eq!(d.server, "Foo/1.0 UPnP/1.0");
        assert_eq!(d.location, "http://192.168.1.1:49000/desc.xml");
    }

    #[test]
    fn reply_with_mismatched_search_target_is_discarded() {
        let reply = "HTTP/1.1 200 OK\r\nST: urn:dslforum-org:device:Other:1\r\nLOCATION: http://h/x\r\n\r\n";
        assert!(parse_reply(reply.as_bytes()).is_none());
    }

    #[test]
    fn non_200_reply_is_discarded() {
        let reply = "HTTP/1.1 404 Not Found\r\n\r\n";
        assert!(parse_reply(reply.as_bytes()).is_none());
    }
}
