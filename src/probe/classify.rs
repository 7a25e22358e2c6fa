//! Response classification.

use serde::{Deserialize, Serialize};

use crate::db::Health;

use super::ProbeResult;

/// Detection phrase used when none is configured.
pub const DEFAULT_DETECTION_PHRASE: &str = "temporarily unavailable";

/// Lowercase substrings that mark an interstitial challenge page.
const CHALLENGE_SIGNATURES: &[&str] = &[
    "just a moment",
    "checking your browser",
    "cf-browser-verification",
    "cf-challenge",
    "attention required",
    "ddos protection by",
];

/// The verdict on one probe result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub state: Health,
    pub reason: String,
}

impl Classification {
    pub fn new(state: Health, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: reason.into(),
        }
    }
}

/// Map a probe result to a state. First matching rule wins:
/// transport errors, 5xx, challenge page, detection phrase, plain 200,
/// then every other status as unknown.
pub fn classify(result: &ProbeResult, phrase: &str) -> Classification {
    let code = match (result.status, &result.error) {
        (Some(code), None) => code,
        (_, Some(err)) => return Classification::new(Health::Unknown, err.as_str()),
        (None, None) => return Classification::new(Health::Unknown, "error"),
    };

    match code {
        500..=599 => Classification::new(Health::Down, format!("http{}", code)),
        200 => {
            let body = result.body.to_lowercase();
            let phrase = phrase.trim().to_lowercase();
            if CHALLENGE_SIGNATURES.iter().any(|sig| body.contains(sig)) {
                Classification::new(Health::Down, "challenge")
            } else if !phrase.is_empty() && body.contains(&phrase) {
                Classification::new(Health::Down, "phrase")
            } else {
                Classification::new(Health::Up, "ok")
            }
        }
        // 403/404 may come from a relay refusing us; never authoritative.
        _ => Classification::new(Health::Unknown, format!("http{}", code)),
    }
}
