//! Transport resolution: try each transport in order until one answers.

use crate::db::AttemptRecord;

use super::{Fetcher, ProbeError, ProbeResult, Transport, TransportPolicy};

/// Error token for a resolution where no transport produced a usable result.
pub const ALL_FAILED: &str = "all-failed";

/// A single step of a resolution.
#[derive(Debug, Clone)]
pub struct ProbeAttempt {
    pub transport: String,
    pub request_url: String,
}

impl ProbeAttempt {
    pub fn new(transport: &Transport, target: &str) -> Self {
        Self {
            transport: transport.label(),
            request_url: transport.request_url(target),
        }
    }

    fn record(self, status: Option<u16>, error: Option<String>) -> AttemptRecord {
        AttemptRecord {
            transport: self.transport,
            request_url: self.request_url,
            status,
            error,
        }
    }
}

/// Final result of walking the policy, plus how it got there.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub result: ProbeResult,
    /// Label of the transport that produced `result`, or `all-failed`.
    pub transport: String,
    pub trail: Vec<AttemptRecord>,
}

/// Walks a [`TransportPolicy`] strictly sequentially.
pub struct Resolver<F> {
    fetcher: F,
}

impl<F: Fetcher> Resolver<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn resolve(&self, target: &str, policy: &TransportPolicy) -> Resolution {
        let mut trail = Vec::with_capacity(policy.transports.len());

        for transport in &policy.transports {
            let attempt = ProbeAttempt::new(transport, target);

            // Dropping the fetch future on timeout cancels the request.
            let outcome = tokio::time::timeout(
                policy.timeout,
                self.fetcher.fetch(&attempt.request_url, policy.timeout),
            )
            .await
            .unwrap_or(Err(ProbeError::Timeout(policy.timeout)));

            match outcome {
                Ok(resp) if resp.is_usable() => {
                    tracing::debug!(
                        "Resolver: {} answered with {:?}",
                        attempt.transport,
                        resp.status
                    );
                    let label = attempt.transport.clone();
                    trail.push(attempt.record(resp.status, None));
                    return Resolution {
                        result: ProbeResult::from_response(resp),
                        transport: label,
                        trail,
                    };
                }
                Ok(_) => {
                    tracing::debug!("Resolver: {} returned an empty response", attempt.transport);
                    trail.push(attempt.record(None, Some("empty response".to_string())));
                }
                Err(e) => {
                    tracing::debug!("Resolver: {} failed: {}", attempt.transport, e);
                    trail.push(attempt.record(None, Some(e.to_string())));
                }
            }
        }

        tracing::warn!("Resolver: all {} transports failed for {}", trail.len(), target);
        Resolution {
            result: ProbeResult::failed(ALL_FAILED),
            transport: ALL_FAILED.to_string(),
            trail,
        }
    }
}
