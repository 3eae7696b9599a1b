mod charclass;
mod cli;
mod config;
mod descriptor;
mod diag;
mod digest;
mod error;
mod escape;
mod interactive;
mod parse;
mod soap;
mod ssdp;
mod token;
mod transport;
mod utf8;

use clap::Parser;
use cli::{Cli, PathSelector};
use config::Config;
use descriptor::builder::{self, DescriptionFetcher};
use descriptor::model::Object;
use diag::Diag;
use digest::DigestState;
use error::{ConfigError, DescriptorError};
use soap::OutputFormat;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::path::PathBuf;
use std::time::Duration;
use transport::RequestContext;

const DEFAULT_PORT: u16 = 49000;

fn main() -> anyhow::Result<()> {
    std::env::remove_var("POSIXLY_CORRECT");

    let cli = Cli::parse();
    let diag = Diag::new(cli.verbose);
    let config = Config::load().unwrap_or_else(|e| {
        diag.cause(&e);
        Config::default()
    });

    let timeout_ms = cli.timeout.unwrap_or(config.default_timeout_ms);
    config::validate_timeout_ms(timeout_ms)?;
    let timeout = Duration::from_millis(timeout_ms);

    let format = match cli.format {
        Some(f) => f.into(),
        None => parse_format(&config.default_format)?,
    };

    if cli.scan {
        return run_scan(timeout, &diag);
    }

    let host_url = cli
        .host
        .clone()
        .or_else(|| config.default_host.clone())
        .ok_or_else(|| anyhow::anyhow!("no host given: pass -o|--host or set default_host in the config file"))?;
    let parsed = parse_host_url(&host_url)?;

    let user = cli.user.clone().or_else(|| config.default_user.clone()).unwrap_or_default();
    let password = cli.password.clone().unwrap_or_default();
    let cache = cli.cache.clone().or(config.default_cache_path.clone());

    let ctx = RequestContext::new(parsed.host, parsed.port, timeout);
    let mut session = Session::new(ctx, host_url, parsed.device_path, cache, user, password, format, diag);

    if cli.interactive {
        interactive::run(&mut session)?;
        return Ok(());
    }

    if cli.list {
        let text = session.list()?;
        print!("{text}");
        return Ok(());
    }

    let path = cli
        .path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("expected [<device>/]<service>/<action>, or pass --list/--interactive/--scan"))?;
    let bytes = session.query(&path, &cli.bindings)?;
    use std::io::Write as _;
    std::io::stdout().write_all(&bytes)?;
    if bytes.last() != Some(&b'\n') {
        println!();
    }
    Ok(())
}

fn parse_format(name: &str) -> anyhow::Result<OutputFormat> {
    match name.to_ascii_uppercase().as_str() {
        "CSV" => Ok(OutputFormat::Csv),
        "JSON" => Ok(OutputFormat::Json),
        "XML" => Ok(OutputFormat::Xml),
        _ => Err(ConfigError::BadValue {
            option: "format",
            value: name.to_string(),
            reason: "expected CSV, JSON or XML".to_string(),
        }
        .into()),
    }
}

/// Parsed `-o|--host` URL (spec §8: only the `http` scheme, default port
/// [`DEFAULT_PORT`]).
struct ParsedHostUrl {
    host: String,
    port: u16,
    device_path: String,
}

fn parse_host_url(url: &str) -> anyhow::Result<ParsedHostUrl> {
    struct Collector<'a> {
        bytes: &'a [u8],
        host: Option<String>,
        port: Option<String>,
        path: Option<String>,
    }
    impl<'a> parse::url::UrlVisitor for Collector<'a> {
        fn visit(&mut self, event: parse::url::UrlEvent) -> token::Flow {
            use parse::url::UrlTokenKind::*;
            let text = || String::from_utf8_lossy(event.token.slice(self.bytes)).into_owned();
            match event.kind {
                Host => self.host = Some(text()),
                Port => self.port = Some(text()),
                Path => self.path = Some(text()),
                _ => {}
            }
            token::Flow::Continue
        }
    }

    let bytes = url.as_bytes();
    let mut collector = Collector {
        bytes,
        host: None,
        port: None,
        path: None,
    };
    let outcome = parse::url::parse(bytes, &mut collector);
    if !matches!(outcome, parse::Outcome::Success) {
        anyhow::bail!("could not parse host URL {url:?}");
    }
    let host = collector
        .host
        .ok_or_else(|| anyhow::anyhow!("host URL {url:?} has no host component"))?;
    let port = match collector.port {
        Some(p) => p.parse::<u16>().map_err(|_| anyhow::anyhow!("invalid port in {url:?}"))?,
        None => DEFAULT_PORT,
    };
    Ok(ParsedHostUrl {
        host,
        port,
        device_path: collector.path.unwrap_or_default(),
    })
}

/// Run SSDP discovery on the interface that would route toward the SSDP
/// multicast group, and print each reply. There is no CLI flag to pick a
/// different interface (spec §6 lists none), so this mirrors the usual
/// "connect a UDP socket without sending" trick to ask the kernel which
/// local address it would use.
fn run_scan(timeout: Duration, diag: &Diag) -> anyhow::Result<()> {
    let local_addr = detect_local_ipv4()?;
    diag.trace(&format!("scanning from local interface {local_addr}"));
    let discoveries = ssdp::discover(local_addr, timeout)?;
    for d in &discoveries {
        println!("{}\t{}", d.server, d.location);
    }
    Ok(())
}

fn detect_local_ipv4() -> anyhow::Result<Ipv4Addr> {
    let probe = UdpSocket::bind("0.0.0.0:0")?;
    probe.connect(SocketAddrV4::new(ssdp::SSDP_MULTICAST_ADDR, ssdp::SSDP_PORT))?;
    match probe.local_addr()?.ip() {
        std::net::IpAddr::V4(addr) => Ok(addr),
        std::net::IpAddr::V6(_) => anyhow::bail!("no local IPv4 interface is available for SSDP discovery"),
    }
}

/// Adapts [`RequestContext`] to [`DescriptionFetcher`]: every path the
/// builder asks for is a plain `GET` against the same host/port the rest of
/// the session already talks to.
struct HttpFetcher<'a> {
    ctx: &'a mut RequestContext,
}

impl<'a> DescriptionFetcher for HttpFetcher<'a> {
    fn get(&mut self, path: &str) -> Result<Vec<u8>, DescriptorError> {
        let request = format!(
            "GET /{path} HTTP/1.1\r\nHost: {host}:{port}\r\nConnection: keep-alive\r\n\r\n",
            path = path.trim_start_matches('/'),
            host = self.ctx.host,
            port = self.ctx.port,
        );
        let outcome = self.ctx.request(request.as_bytes())?;
        if outcome.status != 200 {
            return Err(DescriptorError::Http(error::HttpError {
                status: outcome.status,
                reason: None,
            }));
        }
        Ok(outcome.content)
    }
}

/// The single session value both the one-shot query path and the
/// interactive REPL drive (design note: one value in place of the source's
/// process-wide globals). Owns the connection, the Digest state carried
/// across requests on it, and the descriptor tree, built lazily on first
/// use and then reused for the rest of the process's life.
pub struct Session {
    ctx: RequestContext,
    digest: DigestState,
    user: String,
    password: String,
    cache_path: Option<PathBuf>,
    requested_url: String,
    device_path: String,
    object: Option<Object>,
    format: OutputFormat,
    pub diag: Diag,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    fn new(
        ctx: RequestContext,
        requested_url: String,
        device_path: String,
        cache_path: Option<PathBuf>,
        user: String,
        password: String,
        format: OutputFormat,
        diag: Diag,
    ) -> Self {
        Self {
            ctx,
            digest: DigestState::default(),
            user,
            password,
            cache_path,
            requested_url,
            device_path,
            object: None,
            format,
            diag,
        }
    }

    fn ensure_object(&mut self) -> anyhow::Result<()> {
        if self.object.is_some() {
            return Ok(());
        }
        let mut fetcher = HttpFetcher { ctx: &mut self.ctx };
        let report = builder::build(
            self.cache_path.as_deref(),
            &self.requested_url,
            &self.device_path,
            &mut fetcher,
        )?;
        self.diag.fetch_duration("device description", report.device_description_duration);
        for (name, duration) in &report.scpd_durations {
            self.diag.fetch_duration(&format!("SCPD {name}"), *duration);
        }
        if let Some(warning) = &report.cache_warning {
            self.diag.cache_warning(warning);
        }
        self.object = Some(report.object);
        Ok(())
    }

    /// List every `device/service/action` path the gateway exposes.
    pub fn list(&mut self) -> anyhow::Result<String> {
        self.ensure_object()?;
        use std::fmt::Write as _;
        let object = self.object.as_ref().expect("just built");
        let mut out = String::new();
        for device in &object.devices {
            for service in &device.services {
                for action in &service.actions {
                    writeln!(out, "{}/{}/{}", device.name, service.name, action.name)?;
                }
            }
        }
        Ok(out)
    }

    /// Run one query: select the action named by `path`, bind `raw_bindings`
    /// (`var=value` strings), and return the rendered output bytes.
    pub fn query(&mut self, path: &str, raw_bindings: &[String]) -> anyhow::Result<Vec<u8>> {
        let selector: PathSelector = cli::parse_path(path)?;
        let bindings: HashMap<String, String> = cli::parse_bindings(raw_bindings)?;
        self.ensure_object()?;
        let object = self.object.as_ref().expect("just built");

        let bytes = soap::query(
            object,
            &mut self.ctx,
            &mut self.digest,
            &self.user,
            &self.password,
            selector.device.as_deref(),
            &selector.service,
            &selector.action,
            &bindings,
            self.format,
        )?;
        Ok(bytes)
    }
}
