// SPDX-License-Identifier: MIT

//! Proxy selection.
//!
//! State lives in the runtime process only; nothing is persisted. The
//! executor receives one resolved endpoint and never selects.

use parking_lot::Mutex;
use quarry_core::{JobId, ProxyEndpoint, ProxyPool, ProxyStrategy, StickyScope};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("unknown proxy pool {0:?}")]
    UnknownPool(String),
    #[error("pool {0:?} has no sticky key to derive (no explicit key, job, or url)")]
    NoStickyKey(String),
}

/// Request attributes selection keys are derived from.
#[derive(Debug, Clone, Default)]
pub struct SelectionCtx<'a> {
    /// Explicit sticky key; wins over every scope derivation.
    pub sticky_key: Option<&'a str>,
    pub job_id: Option<&'a JobId>,
    /// Target URL pieces for domain/origin scopes.
    pub scheme: Option<&'a str>,
    pub host: Option<&'a str>,
    pub port: Option<u16>,
}

struct PoolState {
    pool: ProxyPool,
    /// round_robin cursor.
    cursor: usize,
    /// random + recency: indices of the last `recency_window` committed
    /// selections, oldest first.
    recent: VecDeque<usize>,
    /// sticky assignments: key → (endpoint index, assigned-at).
    sticky: HashMap<String, (usize, Instant)>,
}

/// Stateful selector over named pools. Selection is serialized per pool.
#[derive(Default)]
pub struct ProxySelector {
    pools: Mutex<HashMap<String, PoolState>>,
}

impl ProxySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validated pool. Replaces existing state for the name.
    pub fn add_pool(&self, pool: ProxyPool) {
        self.pools.lock().insert(
            pool.name.clone(),
            PoolState { pool, cursor: 0, recent: VecDeque::new(), sticky: HashMap::new() },
        );
    }

    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Select and commit an endpoint.
    pub fn select(&self, pool: &str, ctx: &SelectionCtx<'_>) -> Result<ProxyEndpoint, SelectError> {
        self.pick(pool, ctx, true)
    }

    /// Preview the next selection without advancing any state.
    pub fn peek(&self, pool: &str, ctx: &SelectionCtx<'_>) -> Result<ProxyEndpoint, SelectError> {
        self.pick(pool, ctx, false)
    }

    fn pick(
        &self,
        pool_name: &str,
        ctx: &SelectionCtx<'_>,
        commit: bool,
    ) -> Result<ProxyEndpoint, SelectError> {
        let mut pools = self.pools.lock();
        let state = pools
            .get_mut(pool_name)
            .ok_or_else(|| SelectError::UnknownPool(pool_name.to_string()))?;

        let index = match state.pool.strategy {
            ProxyStrategy::RoundRobin => {
                let index = state.cursor % state.pool.endpoints.len();
                if commit {
                    state.cursor = (state.cursor + 1) % state.pool.endpoints.len();
                }
                index
            }
            ProxyStrategy::Random => Self::pick_random(state, commit),
            ProxyStrategy::Sticky => Self::pick_sticky(state, ctx, commit)?,
        };
        Ok(state.pool.endpoints[index].clone())
    }

    fn pick_random(state: &mut PoolState, commit: bool) -> usize {
        let count = state.pool.endpoints.len();
        let window = state.pool.recency_window.unwrap_or(0).min(count.saturating_sub(1));

        let candidates: Vec<usize> =
            (0..count).filter(|i| !state.recent.contains(i)).collect();
        let index = if candidates.is_empty() {
            // Everything is recent: fall back to the least-recently-used.
            state.recent.front().copied().unwrap_or(0)
        } else {
            candidates[rand::rng().random_range(0..candidates.len())]
        };

        // The ring advances only on committed selections; peek never does.
        if commit && window > 0 {
            state.recent.retain(|&i| i != index);
            state.recent.push_back(index);
            while state.recent.len() > window {
                state.recent.pop_front();
            }
        }
        index
    }

    fn pick_sticky(
        state: &mut PoolState,
        ctx: &SelectionCtx<'_>,
        commit: bool,
    ) -> Result<usize, SelectError> {
        let scope = state.pool.sticky.as_ref().map(|s| s.scope).unwrap_or(StickyScope::Job);
        let ttl = state.pool.sticky.as_ref().and_then(|s| s.ttl_ms).map(Duration::from_millis);

        // Key precedence: explicit stickyKey > scope derivation.
        let key = if let Some(key) = ctx.sticky_key {
            key.to_string()
        } else {
            match scope {
                StickyScope::Job => ctx
                    .job_id
                    .map(|j| j.as_str().to_string())
                    .ok_or_else(|| SelectError::NoStickyKey(state.pool.name.clone()))?,
                StickyScope::Domain => ctx
                    .host
                    .map(str::to_string)
                    .ok_or_else(|| SelectError::NoStickyKey(state.pool.name.clone()))?,
                StickyScope::Origin => match (ctx.scheme, ctx.host, ctx.port) {
                    (Some(scheme), Some(host), Some(port)) => format!("{scheme}://{host}:{port}"),
                    _ => return Err(SelectError::NoStickyKey(state.pool.name.clone())),
                },
            }
        };

        if let Some((index, assigned_at)) = state.sticky.get(&key) {
            let expired = ttl.is_some_and(|ttl| assigned_at.elapsed() >= ttl);
            if !expired {
                return Ok(*index);
            }
        }

        // New or expired key: next endpoint by rotation.
        let index = state.cursor % state.pool.endpoints.len();
        if commit {
            state.cursor = (state.cursor + 1) % state.pool.endpoints.len();
            state.sticky.insert(key, (index, Instant::now()));
        }
        Ok(index)
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
