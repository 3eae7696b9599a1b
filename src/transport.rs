//! HTTP transport (spec §4.E): a reusable request/response context driving
//! one TCP connection at a time, non-blocking receive polled with `select`
//! at `TIMEOUT_RESOLUTION` ms per iteration (spec §5's single-threaded
//! cooperative model — no threads, no async runtime).

use crate::error::{HttpError, TransportError};
use crate::parse::http::{self, HttpEvent, HttpFail, HttpOutcome};
use crate::parse::Outcome;
use crate::token::Flow;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Wall-clock the `select`-based receive loop waits per iteration (spec
/// §1/§4.E/§4.H all share this constant).
pub const TIMEOUT_RESOLUTION: Duration = Duration::from_millis(100);

/// Cap on an accumulated HTTP response (spec §4.E: "exceeding is fatal").
pub const MAX_RESPONSE_SIZE: usize = 0x100000;

const INITIAL_BUFFER_SIZE: usize = 0x10000;

/// Outcome of one `request()` call (spec §4.E's `request(ctx)` contract).
pub struct RequestOutcome {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content: Vec<u8>,
    pub duration: Duration,
}

impl RequestOutcome {
    /// Case-insensitive header lookup (spec §4.F needs `WWW-Authenticate`).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A mutable session context reused across requests on one connection
/// (spec §3 "HTTP request context").
pub struct RequestContext {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub auth_header: Option<String>,
    resolved_addresses: Vec<SocketAddr>,
    address_cursor: usize,
    stream: Option<TcpStream>,
}

impl RequestContext {
    pub fn new(host: String, port: u16, timeout: Duration) -> Self {
        Self {
            host,
            port,
            timeout,
            auth_header: None,
            resolved_addresses: Vec::new(),
            address_cursor: 0,
            stream: None,
        }
    }

    /// Build the address list from `(host, port)` (spec: `resolve(ctx)`).
    pub fn resolve(&mut self) -> Result<(), TransportError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Resolve {
                host: self.host.clone(),
                source: e,
            })?
            .collect();
        self.resolved_addresses = addrs;
        self.address_cursor = 0;
        Ok(())
    }

    /// Close any socket and rewind the address cursor (spec: `reset(ctx)`).
    pub fn reset(&mut self) {
        self.stream = None;
        self.address_cursor = 0;
    }

    fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.resolved_addresses.is_empty() {
            self.resolve()?;
        }
        let mut last_err = None;
        while self.address_cursor < self.resolved_addresses.len() {
            let addr = self.resolved_addresses[self.address_cursor];
            match connect_with_options(addr, self.timeout) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    last_err = Some(e);
                    self.address_cursor += 1;
                }
            }
        }
        Err(last_err.unwrap_or(TransportError::Connect {
            addr: format!("{}:{}", self.host, self.port),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no resolved addresses"),
        }))
    }

    /// Send `request_bytes` (a complete HTTP request) and read a response
    /// (spec §4.E's receive loop, including the buffer-doubling growth and
    /// the 401-retry contract).
    pub fn request(&mut self, request_bytes: &[u8]) -> Result<RequestOutcome, TransportError> {
        let start = Instant::now();
        self.ensure_connected()?;
        self.auth_header = None;

        {
            let stream = self.stream.as_mut().expect("connected above");
            stream
                .write_all(request_bytes)
                .map_err(|_| TransportError::SendTimeout(self.timeout.as_millis() as u64))?;
        }

        let mut buffer = vec![0u8; INITIAL_BUFFER_SIZE];
        let mut filled = 0usize;

        loop {
            if start.elapsed() > self.timeout {
                return Err(TransportError::ReceiveTimeout(self.timeout.as_millis() as u64));
            }

            let stream = self.stream.as_mut().expect("connected above");
            match read_available(stream, &mut buffer, filled, TIMEOUT_RESOLUTION) {
                ReadStep::Data(n) => {
                    if n == 0 {
                        // peer closed; let the last parse attempt decide.
                        return finish_parse(&buffer[..filled], start.elapsed());
                    }
                    filled += n;
                }
                ReadStep::WouldBlock => {}
                ReadStep::Err(e) => return Err(TransportError::Io(e)),
            }

            match parse_response(&buffer[..filled]) {
                ParseStep::Complete { status, headers, content_start, content_len } => {
                    let content = buffer[content_start..content_start + content_len].to_vec();
                    return Ok(RequestOutcome {
                        status,
                        headers,
                        content,
                        duration: start.elapsed(),
                    });
                }
                ParseStep::NeedMore { required } => {
                    if required > MAX_RESPONSE_SIZE {
                        return Err(TransportError::ResponseTooLarge(MAX_RESPONSE_SIZE));
                    }
                    if buffer.len() < required {
                        let mut new_len = buffer.len().max(1);
                        while new_len < required {
                            new_len = (new_len * 2).min(MAX_RESPONSE_SIZE.max(new_len));
                            if new_len >= MAX_RESPONSE_SIZE {
                                new_len = MAX_RESPONSE_SIZE;
                                break;
                            }
                        }
                        buffer.resize(new_len, 0);
                    }
                    if filled >= MAX_RESPONSE_SIZE {
                        return Err(TransportError::ResponseTooLarge(MAX_RESPONSE_SIZE));
                    }
                }
                ParseStep::Failed(status) => {
                    return Ok(RequestOutcome {
                        status,
                        headers: Vec::new(),
                        content: Vec::new(),
                        duration: start.elapsed(),
                    });
                }
            }
        }
    }
}

fn finish_parse(bytes: &[u8], duration: Duration) -> Result<RequestOutcome, TransportError> {
    match parse_response(bytes) {
        ParseStep::Complete { status, headers, content_start, content_len } => Ok(RequestOutcome {
            status,
            headers,
            content: bytes[content_start..content_start + content_len].to_vec(),
            duration,
        }),
        _ => Err(TransportError::ConnectionClosed),
    }
}

enum ParseStep {
    Complete {
        status: u16,
        headers: Vec<(String, String)>,
        content_start: usize,
        content_len: usize,
    },
    NeedMore {
        required: usize,
    },
    Failed(u16),
}

#[derive(Default)]
struct ResponseCollector {
    status: Option<u16>,
    headers: Vec<(usize, usize, usize, usize)>,
    content: Option<(usize, usize)>,
}

impl crate::parse::http::HttpVisitor for ResponseCollector {
    fn visit(&mut self, event: HttpEvent) -> Flow {
        match event {
            HttpEvent::Status { code, .. } => self.status = Some(code),
            HttpEvent::Parameter { name, value } => {
                self.headers.push((name.start, name.len, value.start, value.len))
            }
            HttpEvent::Body { bytes } => self.content = Some((bytes.start, bytes.len)),
            _ => {}
        }
        Flow::Continue
    }
}

fn parse_response(bytes: &[u8]) -> ParseStep {
    let mut collector = ResponseCollector::default();
    let outcome: HttpOutcome = http::parse(bytes, &mut collector);
    match outcome {
        Outcome::Success => {
            let status = collector.status.unwrap_or(0);
            let (start, len) = collector.content.unwrap_or((bytes.len(), 0));
            let headers = collector
                .headers
                .into_iter()
                .map(|(ns, nl, vs, vl)| {
                    (
                        String::from_utf8_lossy(&bytes[ns..ns + nl]).into_owned(),
                        String::from_utf8_lossy(&bytes[vs..vs + vl]).into_owned(),
                    )
                })
                .collect();
            ParseStep::Complete {
                status,
                headers,
                content_start: start,
                content_len: len,
            }
        }
        Outcome::UnexpectedEnd(_) => ParseStep::NeedMore { required: bytes.len() + 1 },
        Outcome::Other(HttpFail::DuplicateOrBadContentLength) => ParseStep::Failed(0),
        _ => ParseStep::Failed(0),
    }
}

enum ReadStep {
    Data(usize),
    WouldBlock,
    Err(std::io::Error),
}

fn read_available(
    stream: &mut TcpStream,
    buffer: &mut [u8],
    filled: usize,
    wait: Duration,
) -> ReadStep {
    stream.set_read_timeout(Some(wait)).ok();
    match stream.read(&mut buffer[filled..]) {
        Ok(n) => ReadStep::Data(n),
        Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            ReadStep::WouldBlock
        }
        Err(e) => ReadStep::Err(e),
    }
}

fn connect_with_options(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, TransportError> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(TransportError::SocketCreate)?;
    socket
        .connect_timeout(&SockAddr::from(addr), timeout)
        .map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
    socket.set_keepalive(true).ok();
    socket.set_nodelay(true).ok();
    socket.set_write_timeout(Some(timeout)).ok();
    Ok(socket.into())
}

/// Translate a completed [`RequestOutcome`] into the §7 HTTP-error family
/// when the status isn't 200.
pub fn status_to_error(status: u16, reason: Option<String>) -> Option<HttpError> {
    if status == 200 {
        None
    } else {
        Some(HttpError { status, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_reports_status_and_body() {
        let msg = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc";
        match parse_response(msg) {
            ParseStep::Complete { status, content_start, content_len, .. } => {
                assert_eq!(status, 200);
                assert_eq!(&msg[content_start..content_start + content_len], b"abc");
            }
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn parse_response_requests_more_on_truncation() {
        let msg = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc";
        match parse_response(msg) {
            ParseStep::NeedMore { .. } => {}
            _ => panic!("expected NeedMore"),
        }
    }

    #[test]
    fn status_to_error_is_none_for_200() {
        assert!(status_to_error(200, None).is_none());
        assert!(status_to_error(404, Some("Not Found".into())).is_some());
    }
}
