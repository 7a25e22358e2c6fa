//! Probe module: reaching the target and judging what came back.
//!
//! [`Resolver`] walks a [`TransportPolicy`] until some transport yields a
//! usable response; [`classify`] turns that response into a [`Classification`].

mod classify;
mod http;
mod resolver;
#[cfg(test)]
pub(crate) mod testing;

pub use classify::*;
pub use http::*;
pub use resolver::*;

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Per-attempt timeout used when nothing else is configured.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on how much of a response body is kept.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The capability to perform one HTTP-like GET against a URL.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawResponse, ProbeError>> + Send;
}

/// What a fetcher hands back when the request completed.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub ok: bool,
    pub status: Option<u16>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            ok: (200..300).contains(&status),
            status: Some(status),
            body: body.into(),
        }
    }

    /// A completed response is worth classifying if it says anything at all.
    pub fn is_usable(&self) -> bool {
        self.ok || self.status.is_some() || !self.body.is_empty()
    }
}

/// Outcome of a resolution, fed to the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub succeeded: bool,
    /// `None` is the error sentinel.
    pub status: Option<u16>,
    pub body: String,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn from_response(resp: RawResponse) -> Self {
        Self {
            succeeded: resp.ok,
            status: resp.status,
            body: truncate_bytes(&resp.body, MAX_BODY_BYTES).to_string(),
            error: None,
        }
    }

    /// A synthetic failed result carrying only an error token.
    pub fn failed(token: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            status: None,
            body: String::new(),
            error: Some(token.into()),
        }
    }

    /// Status for display: the numeric code or the error token.
    pub fn status_label(&self) -> String {
        match (self.status, &self.error) {
            (Some(code), _) => code.to_string(),
            (None, Some(err)) => err.clone(),
            (None, None) => "error".to_string(),
        }
    }
}

/// How a probe reaches the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Direct,
    /// A third-party relay. `prefix` either contains a `{url}` placeholder or
    /// has the encoded target appended to it.
    Relay { id: String, prefix: String },
}

impl Transport {
    pub fn relay(id: impl Into<String>, prefix: impl Into<String>) -> Self {
        Transport::Relay {
            id: id.into(),
            prefix: prefix.into(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Transport::Direct => "direct".to_string(),
            Transport::Relay { id, .. } => format!("relay:{}", id),
        }
    }

    /// The URL actually requested when probing `target` through this transport.
    pub fn request_url(&self, target: &str) -> String {
        match self {
            Transport::Direct => target.to_string(),
            Transport::Relay { prefix, .. } => {
                let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
                if prefix.contains("{url}") {
                    prefix.replace("{url}", &encoded)
                } else {
                    format!("{}{}", prefix, encoded)
                }
            }
        }
    }
}

/// Relays tried after the direct request and any user-supplied relay.
pub fn builtin_relays() -> Vec<Transport> {
    vec![
        Transport::relay("allorigins", "https://api.allorigins.win/raw?url="),
        Transport::relay("corsproxy", "https://corsproxy.io/?url="),
        Transport::relay("codetabs", "https://api.codetabs.com/v1/proxy?quest="),
    ]
}

/// Ordered list of transports plus the per-attempt timeout.
#[derive(Debug, Clone)]
pub struct TransportPolicy {
    pub transports: Vec<Transport>,
    pub timeout: Duration,
}

impl TransportPolicy {
    /// Direct first, then the user relay when set, then the built-in relays.
    pub fn standard(user_relay: Option<&str>, timeout: Duration) -> Self {
        let mut transports = vec![Transport::Direct];
        if let Some(prefix) = user_relay.map(str::trim).filter(|p| !p.is_empty()) {
            transports.push(Transport::relay("custom", prefix));
        }
        transports.extend(builtin_relays());
        Self { transports, timeout }
    }

    /// Worst-case time to exhaust every transport.
    pub fn worst_case(&self) -> Duration {
        self.timeout * self.transports.len() as u32
    }
}

/// Whether `url` is an acceptable probe target.
pub fn is_valid_target(url: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^https?://\S+$").unwrap());
    re.is_match(url.trim())
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
