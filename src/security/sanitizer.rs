//! Allow-list validation of untrusted tool inputs.
//!
//! Every field is screened first (length, control characters, shell
//! metacharacters) and then parsed against the grammar for its role. Input
//! that does not fit is rejected; nothing is escaped or repaired.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use url::{Host, Url};

use crate::config::{SanitizerConfig, ToolsConfig};

static REGISTRY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("registry id pattern"));

/// Characters a shell would reinterpret. None of the grammars below need them.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '<', '>', '(', ')', '{', '}', '\'', '"', '\\', '*', '?', '!', '#',
];

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("missing required field")]
    Missing,
    #[error("empty value")]
    Empty,
    #[error("value too long")]
    TooLong,
    #[error("control character")]
    ControlCharacter,
    #[error("whitespace")]
    Whitespace,
    #[error("shell metacharacter")]
    ShellMetacharacter,
    #[error("leading dash")]
    OptionInjection,
    #[error("not an IP address, CIDR block or hostname")]
    InvalidTarget,
    #[error("private or loopback target")]
    PrivateTarget,
    #[error("not a valid http(s) URL")]
    InvalidUrl,
    #[error("unregistered identifier")]
    UnknownIdentifier,
    #[error("malformed identifier")]
    MalformedIdentifier,
    #[error("unsupported value")]
    UnsupportedValue,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Missing => "missing",
            RejectReason::Empty => "empty",
            RejectReason::TooLong => "too_long",
            RejectReason::ControlCharacter => "control_character",
            RejectReason::Whitespace => "whitespace",
            RejectReason::ShellMetacharacter => "shell_metacharacter",
            RejectReason::OptionInjection => "option_injection",
            RejectReason::InvalidTarget => "invalid_target",
            RejectReason::PrivateTarget => "private_target",
            RejectReason::InvalidUrl => "invalid_url",
            RejectReason::UnknownIdentifier => "unknown_identifier",
            RejectReason::MalformedIdentifier => "malformed_identifier",
            RejectReason::UnsupportedValue => "unsupported_value",
        }
    }
}

/// A field that failed validation. Carries no copy of the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}` rejected: {reason}")]
pub struct RejectedInput {
    pub field: &'static str,
    pub reason: RejectReason,
}

impl RejectedInput {
    pub fn new(field: &'static str, reason: RejectReason) -> Self {
        Self { field, reason }
    }
}

/// A validated scan target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Ip(IpAddr),
    Cidr { network: IpAddr, prefix: u8 },
    Hostname(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Ip(ip) => write!(f, "{}", ip),
            Target::Cidr { network, prefix } => write!(f, "{}/{}", network, prefix),
            Target::Hostname(host) => f.write_str(host),
        }
    }
}

/// A wordlist resolved through the server-side registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wordlist {
    pub id: String,
    pub path: PathBuf,
}

/// Closed set of nmap scan profiles, each mapped to fixed flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanType {
    #[default]
    Quick,
    Full,
    Service,
    Ping,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Quick => "quick",
            ScanType::Full => "full",
            ScanType::Service => "service",
            ScanType::Ping => "ping",
        }
    }

    pub fn nmap_flags(&self) -> &'static [&'static str] {
        match self {
            ScanType::Quick => &["-T4", "-F"],
            ScanType::Full => &["-T4", "-p-"],
            ScanType::Service => &["-T4", "-sV"],
            ScanType::Ping => &["-sn"],
        }
    }
}

/// One validated field of a tool request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedField {
    pub name: &'static str,
    pub raw: String,
    pub normalized: String,
}

/// The request-scoped product of sanitization: validated fields plus the
/// argument vector handed to the process spawner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedCommandArgs {
    pub tool: &'static str,
    pub fields: Vec<SanitizedField>,
    pub argv: Vec<String>,
}

impl SanitizedCommandArgs {
    pub fn new(tool: &'static str) -> Self {
        Self {
            tool,
            fields: Vec::new(),
            argv: Vec::new(),
        }
    }

    pub fn field(mut self, name: &'static str, raw: &str, normalized: impl Into<String>) -> Self {
        self.fields.push(SanitizedField {
            name,
            raw: raw.to_string(),
            normalized: normalized.into(),
        });
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }
}

/// `[a-z0-9][a-z0-9_-]{0,63}`, the grammar for registry lookups.
pub fn is_registry_identifier(id: &str) -> bool {
    REGISTRY_ID.is_match(id)
}

/// Validates tool fields against configurable allow-list grammars.
pub struct InputSanitizer {
    config: SanitizerConfig,
    wordlists: BTreeMap<String, PathBuf>,
}

impl InputSanitizer {
    pub fn new(config: &SanitizerConfig, tools: &ToolsConfig) -> Self {
        let wordlists = tools
            .wordlists
            .iter()
            .map(|(id, path)| (id.clone(), PathBuf::from(path)))
            .collect();

        Self {
            config: config.clone(),
            wordlists,
        }
    }

    /// Validate a scan target: IP, CIDR block or hostname.
    pub fn target(&self, field: &'static str, raw: &str) -> Result<Target, RejectedInput> {
        screen(field, raw, self.config.max_target_len)?;
        let reject = |reason| RejectedInput::new(field, reason);

        let target = if let Ok(ip) = raw.parse::<IpAddr>() {
            Target::Ip(ip)
        } else if let Some((addr, prefix)) = raw.split_once('/') {
            let network: IpAddr = addr.parse().map_err(|_| reject(RejectReason::InvalidTarget))?;
            let max_prefix = if network.is_ipv4() { 32 } else { 128 };
            let prefix: u8 = parse_decimal(prefix)
                .filter(|p| *p <= max_prefix)
                .ok_or_else(|| reject(RejectReason::InvalidTarget))?;
            Target::Cidr { network, prefix }
        } else if is_hostname(raw) {
            Target::Hostname(raw.to_ascii_lowercase())
        } else {
            return Err(reject(RejectReason::InvalidTarget));
        };

        if self.config.deny_private_targets && is_private_target(&target) {
            return Err(reject(RejectReason::PrivateTarget));
        }
        Ok(target)
    }

    /// Validate an absolute http(s) URL with no userinfo, query or fragment.
    pub fn url(&self, field: &'static str, raw: &str) -> Result<Url, RejectedInput> {
        screen(field, raw, self.config.max_url_len)?;
        let reject = |reason| RejectedInput::new(field, reason);

        if !has_valid_percent_escapes(raw) {
            return Err(reject(RejectReason::InvalidUrl));
        }

        let url = Url::parse(raw).map_err(|_| reject(RejectReason::InvalidUrl))?;
        if !matches!(url.scheme(), "http" | "https")
            || !url.username().is_empty()
            || url.password().is_some()
            || url.query().is_some()
            || url.fragment().is_some()
        {
            return Err(reject(RejectReason::InvalidUrl));
        }

        let target = match url.host() {
            Some(Host::Domain(domain)) if is_hostname(domain) => Target::Hostname(domain.to_string()),
            Some(Host::Ipv4(ip)) => Target::Ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => Target::Ip(IpAddr::V6(ip)),
            _ => return Err(reject(RejectReason::InvalidUrl)),
        };
        if self.config.deny_private_targets && is_private_target(&target) {
            return Err(reject(RejectReason::PrivateTarget));
        }

        Ok(url)
    }

    /// Resolve a wordlist identifier through the registry. Paths are never
    /// accepted from the client.
    pub fn wordlist(&self, field: &'static str, raw: &str) -> Result<Wordlist, RejectedInput> {
        screen(field, raw, 64)?;
        if !is_registry_identifier(raw) {
            return Err(RejectedInput::new(field, RejectReason::MalformedIdentifier));
        }
        self.wordlists
            .get(raw)
            .map(|path| Wordlist {
                id: raw.to_string(),
                path: path.clone(),
            })
            .ok_or(RejectedInput::new(field, RejectReason::UnknownIdentifier))
    }

    /// Map a scan profile name onto the closed [`ScanType`] set.
    pub fn scan_type(&self, field: &'static str, raw: Option<&str>) -> Result<ScanType, RejectedInput> {
        let Some(raw) = raw else {
            return Ok(ScanType::default());
        };
        screen(field, raw, 16)?;
        match raw {
            "quick" => Ok(ScanType::Quick),
            "full" => Ok(ScanType::Full),
            "service" => Ok(ScanType::Service),
            "ping" => Ok(ScanType::Ping),
            _ => Err(RejectedInput::new(field, RejectReason::UnsupportedValue)),
        }
    }

    /// Validate the tail of a forwarded route: `/`-separated segments of
    /// `[A-Za-z0-9._~-]`, no empty, `.` or `..` segments, no escapes.
    pub fn route_tail(&self, field: &'static str, raw: &str) -> Result<String, RejectedInput> {
        screen(field, raw, self.config.max_url_len)?;
        let reject = |reason| RejectedInput::new(field, reason);

        let segments: Vec<&str> = raw.split('/').collect();
        for segment in &segments {
            if segment.is_empty() || *segment == "." || *segment == ".." {
                return Err(reject(RejectReason::UnsupportedValue));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '~' | '-'))
            {
                return Err(reject(RejectReason::UnsupportedValue));
            }
        }
        Ok(segments.join("/"))
    }
}

/// Checks shared by every grammar.
fn screen(field: &'static str, raw: &str, max_len: usize) -> Result<(), RejectedInput> {
    let reject = |reason| Err(RejectedInput::new(field, reason));

    if raw.is_empty() {
        return reject(RejectReason::Empty);
    }
    if raw.len() > max_len {
        return reject(RejectReason::TooLong);
    }
    if raw.chars().any(char::is_control) {
        return reject(RejectReason::ControlCharacter);
    }
    if raw.chars().any(char::is_whitespace) {
        return reject(RejectReason::Whitespace);
    }
    if raw.contains(SHELL_METACHARACTERS) {
        return reject(RejectReason::ShellMetacharacter);
    }
    if raw.starts_with('-') {
        return reject(RejectReason::OptionInjection);
    }
    Ok(())
}

/// RFC 1123 hostname. A purely numeric final label is refused so that
/// malformed dotted quads are not taken for names.
fn is_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    let labels: Vec<&str> = s.split('.').collect();
    let valid_labels = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    });
    let numeric_tld = labels
        .last()
        .is_some_and(|tld| tld.bytes().all(|b| b.is_ascii_digit()));
    valid_labels && !numeric_tld
}

fn parse_decimal(s: &str) -> Option<u8> {
    if s.is_empty() || s.len() > 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn has_valid_percent_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !(bytes[i + 1].is_ascii_hexdigit() && bytes[i + 2].is_ascii_hexdigit())
            {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

fn is_private_target(target: &Target) -> bool {
    match target {
        Target::Ip(ip) | Target::Cidr { network: ip, .. } => is_private_ip(ip),
        Target::Hostname(host) => {
            let host = host.to_ascii_lowercase();
            host == "localhost" || host.ends_with(".localhost") || host.ends_with(".local")
        }
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(&mapped);
            }
            is_private_v6(v6)
        }
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // fc00::/7 unique local
        || (first & 0xffc0) == 0xfe80 // fe80::/10 link local
}
