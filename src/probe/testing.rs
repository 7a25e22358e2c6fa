//! Scripted fetcher for exercising the probe pipeline without a network.

use crate::probe::{Fetcher, ProbeError, RawResponse};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted reply for one request URL.
#[derive(Clone)]
pub enum Reply {
    Respond(RawResponse),
    Fail(String),
    Hang,
}

/// Fetcher that answers from a script and records every requested URL.
/// Unscripted URLs fail with a network error.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url: impl Into<String>, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(url.into(), reply);
        self
    }

    pub fn set(&self, url: impl Into<String>, reply: Reply) {
        self.replies.lock().unwrap().insert(url.into(), reply);
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<RawResponse, ProbeError> {
        self.requested.lock().unwrap().push(url.to_string());
        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(Reply::Respond(resp)) => Ok(resp),
            Some(Reply::Fail(msg)) => Err(ProbeError::Network(msg)),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProbeError::Network("woke up".to_string()))
            }
            None => Err(ProbeError::Network("connection refused".to_string())),
        }
    }
}
