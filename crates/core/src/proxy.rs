// SPDX-License-Identifier: MIT

//! Proxy pool model.
//!
//! Selection is runtime-owned; the executor only ever receives one resolved
//! endpoint. Passwords must never reach logs, events, run_result frames, or
//! persisted records: `Display` and `Debug` omit them, and `redacted()`
//! strips them before anything leaves the selection path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool {0:?} has no endpoints")]
    Empty(String),
    #[error("pool {pool:?} endpoint {index}: username and password must appear together")]
    UnpairedCredentials { pool: String, index: usize },
    #[error("pool {pool:?} endpoint {index}: port must be 1-65535")]
    ZeroPort { pool: String, index: usize },
    #[error("pool {0:?}: recency_window is only meaningful for the random strategy")]
    RecencyWithoutRandom(String),
    #[error("pool {0:?}: recency_window must be positive")]
    ZeroRecencyWindow(String),
    #[error("pool {0:?}: sticky configuration requires the sticky strategy")]
    StickyWithoutSticky(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        }
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single proxy endpoint. Serialization includes credentials (the
/// resolved endpoint must reach the executor intact); use `redacted()`
/// before persisting or reporting.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyEndpoint {
    /// `protocol://host:port`, the form passed to the browser's
    /// `--proxy-server` flag. Never contains userinfo.
    pub fn server_arg(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// Copy with the password stripped. Username is retained for
    /// observability.
    pub fn redacted(&self) -> Self {
        Self { password: None, ..self.clone() }
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }
}

// Manual Debug so accidental {:?} in logs can never leak a password.
impl std::fmt::Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyEndpoint")
            .field("protocol", &self.protocol.as_str())
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.server_arg())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStrategy {
    RoundRobin,
    Random,
    Sticky,
}

impl ProxyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyStrategy::RoundRobin => "round_robin",
            ProxyStrategy::Random => "random",
            ProxyStrategy::Sticky => "sticky",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StickyScope {
    Job,
    Domain,
    Origin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickyConfig {
    pub scope: StickyScope,
    /// Expiry for sticky assignments; no TTL means assignments live for
    /// the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

/// A named, ordered set of endpoints plus a selection strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPool {
    pub name: String,
    pub strategy: ProxyStrategy,
    pub endpoints: Vec<ProxyEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky: Option<StickyConfig>,
    /// Ring size of recently-used indices excluded from random selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency_window: Option<usize>,
}

impl ProxyPool {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.endpoints.is_empty() {
            return Err(PoolError::Empty(self.name.clone()));
        }
        for (index, ep) in self.endpoints.iter().enumerate() {
            if ep.port == 0 {
                return Err(PoolError::ZeroPort { pool: self.name.clone(), index });
            }
            if ep.username.is_some() != ep.password.is_some() {
                return Err(PoolError::UnpairedCredentials { pool: self.name.clone(), index });
            }
        }
        match self.recency_window {
            Some(0) => return Err(PoolError::ZeroRecencyWindow(self.name.clone())),
            Some(_) if self.strategy != ProxyStrategy::Random => {
                return Err(PoolError::RecencyWithoutRandom(self.name.clone()));
            }
            _ => {}
        }
        if self.sticky.is_some() && self.strategy != ProxyStrategy::Sticky {
            return Err(PoolError::StickyWithoutSticky(self.name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
