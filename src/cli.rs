//! Command-line surface (spec §6), modeled on the teacher's `clap::Parser`
//! derive in `main.rs` — a single flat struct with `global = true` flags
//! plus a trailing positional/var-args pair, rather than the teacher's
//! `#[command(subcommand)]` tree (this CLI has one action, not a family of
//! subcommands).

use crate::error::{ConfigError, QueryError};
use clap::Parser;
use std::collections::HashMap;

#[derive(Parser, Debug)]
#[command(
    name = "tr64c",
    version,
    about = "TR-064 home-gateway remote-configuration client"
)]
pub struct Cli {
    /// Positional `[<device>/]<service>/<action>` path. Omit to just connect
    /// (with `--list` or `--scan`) or drop into `--interactive`.
    #[arg(value_name = "PATH")]
    pub path: Option<String>,

    /// `var=value` bindings for the selected action's `in` arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub bindings: Vec<String>,

    /// Descriptor cache file.
    #[arg(short, long, value_name = "FILE")]
    pub cache: Option<std::path::PathBuf>,

    /// Output rendering format.
    #[arg(short, long, value_enum, value_name = "FORMAT")]
    pub format: Option<OutputFormatArg>,

    /// Drop into an interactive query session.
    #[arg(short, long)]
    pub interactive: bool,

    /// List every action the gateway exposes, then exit.
    #[arg(short, long)]
    pub list: bool,

    /// Gateway URL, e.g. `http://192.168.1.1:49000`.
    #[arg(short = 'o', long, value_name = "URL")]
    pub host: Option<String>,

    /// Digest auth password.
    #[arg(short, long)]
    pub password: Option<String>,

    /// Run SSDP discovery instead of querying a fixed host.
    #[arg(short, long)]
    pub scan: bool,

    /// Per-request timeout in milliseconds (>= `TIMEOUT_RESOLUTION`).
    #[arg(short, long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Digest auth username.
    #[arg(short, long)]
    pub user: Option<String>,

    /// Repeatable verbosity (`-v`, `-vv`, `-vvv`).
    #[arg(short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Force UTF-8 output regardless of the platform default locale.
    #[arg(long)]
    pub utf8: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormatArg {
    Csv,
    Json,
    Xml,
}

impl From<OutputFormatArg> for crate::soap::OutputFormat {
    fn from(value: OutputFormatArg) -> Self {
        match value {
            OutputFormatArg::Csv => crate::soap::OutputFormat::Csv,
            OutputFormatArg::Json => crate::soap::OutputFormat::Json,
            OutputFormatArg::Xml => crate::soap::OutputFormat::Xml,
        }
    }
}

/// A parsed `[[<device>/]<service>/<action>]` positional path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSelector {
    pub device: Option<String>,
    pub service: String,
    pub action: String,
}

/// Split `path` on `/`; two segments select `service/action`, three select
/// `device/service/action`. Any other count is a bad value.
pub fn parse_path(path: &str) -> Result<PathSelector, ConfigError> {
    let segments: Vec<&str> = path.split('/').collect();
    match segments.as_slice() {
        [service, action] => Ok(PathSelector {
            device: None,
            service: service.to_string(),
            action: action.to_string(),
        }),
        [device, service, action] => Ok(PathSelector {
            device: Some(device.to_string()),
            service: service.to_string(),
            action: action.to_string(),
        }),
        _ => Err(ConfigError::BadValue {
            option: "PATH",
            value: path.to_string(),
            reason: "expected [<device>/]<service>/<action>".to_string(),
        }),
    }
}

/// Parse `var=value` pairs into bindings. A variable assigned more than
/// once is `AmbiguousInputArgument` — a `HashMap` would otherwise silently
/// collapse the duplicate, losing exactly the condition spec §4.G requires
/// to be reported.
pub fn parse_bindings(raw: &[String]) -> Result<HashMap<String, String>, QueryError> {
    let mut bindings = HashMap::new();
    for pair in raw {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            QueryError::MissingInputArgument(format!("{pair:?} is not a var=value pair"))
        })?;
        if bindings.insert(name.to_string(), value.to_string()).is_some() {
            return Err(QueryError::AmbiguousInputArgument(name.to_string()));
        }
    }
    Ok(bindings)
}
