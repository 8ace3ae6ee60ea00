// SPDX-License-Identifier: MIT

//! Browser acquisition.
//!
//! The concrete CDP driver is an external collaborator; this module owns
//! the launch-option assembly (proxy flag, sandbox env), the reuse wrapper
//! with idle termination, and the trait scripts see a session through.

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::ProxyEndpoint;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// `QUARRY_NO_SANDBOX=1` disables the browser sandbox.
pub const ENV_NO_SANDBOX: &str = "QUARRY_NO_SANDBOX";

/// Idle seconds before a reusable browser is torn down.
pub const ENV_IDLE_TIMEOUT: &str = "QUARRY_BROWSER_IDLE_TIMEOUT";

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("page authentication failed: {0}")]
    Authenticate(String),
}

/// Assembled launch options. Proxy selection already happened on the
/// runtime side; this only applies the resolved endpoint.
#[derive(Debug, Clone, Default)]
pub struct LaunchOpts {
    pub proxy: Option<ProxyEndpoint>,
    pub no_sandbox: bool,
    pub extra_args: Vec<String>,
}

impl LaunchOpts {
    /// Build options from the resolved proxy and process environment.
    pub fn from_env(proxy: Option<ProxyEndpoint>) -> Self {
        let no_sandbox = std::env::var(ENV_NO_SANDBOX).is_ok_and(|v| v == "1");
        Self { proxy, no_sandbox, extra_args: Vec::new() }
    }

    /// Chromium argument list. The proxy flag never carries credentials;
    /// those go through page-level `authenticate`.
    pub fn chromium_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={}", proxy.server_arg()));
        }
        if self.no_sandbox {
            args.push("--no-sandbox".to_string());
            args.push("--disable-setuid-sandbox".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// One launched browser context, as a script sees it.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Page-level proxy authentication, when the endpoint has credentials.
    async fn authenticate(&self, username: &str, password: &str) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Launches browser sessions. Implemented by the external CDP driver; the
/// executor ships `NullBrowser` for proxyless/headless-free runs and tests.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, opts: &LaunchOpts) -> Result<Arc<dyn BrowserSession>, BrowserError>;
}

/// Driver that produces inert sessions. Scripts that never touch the
/// browser (API extractions, tests) run against this.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBrowser;

struct NullSession;

#[async_trait]
impl BrowserSession for NullSession {
    async fn authenticate(&self, _username: &str, _password: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for NullBrowser {
    async fn launch(&self, _opts: &LaunchOpts) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        Ok(Arc::new(NullSession))
    }
}

struct CachedSession {
    session: Arc<dyn BrowserSession>,
    args: Vec<String>,
    last_used: Instant,
}

/// Reuses one launched session across runs in the same process, as long
/// as the launch arguments match and the idle window has not elapsed.
pub struct ReusableBrowser {
    driver: Arc<dyn BrowserDriver>,
    idle_timeout: Duration,
    cached: Mutex<Option<CachedSession>>,
}

impl ReusableBrowser {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        let idle_timeout = std::env::var(ENV_IDLE_TIMEOUT)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT);
        Self { driver, idle_timeout, cached: Mutex::new(None) }
    }

    pub fn with_idle_timeout(driver: Arc<dyn BrowserDriver>, idle_timeout: Duration) -> Self {
        Self { driver, idle_timeout, cached: Mutex::new(None) }
    }

    /// Acquire a session, reusing the cached one when possible.
    pub async fn acquire(&self, opts: &LaunchOpts) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        let args = opts.chromium_args();
        let stale = {
            let mut cached = self.cached.lock();
            match cached.take() {
                Some(entry)
                    if entry.args == args && entry.last_used.elapsed() < self.idle_timeout =>
                {
                    let session = entry.session.clone();
                    *cached = Some(CachedSession { last_used: Instant::now(), ..entry });
                    return Ok(session);
                }
                other => other,
            }
        };
        if let Some(entry) = stale {
            // Mismatched args or idle-expired: tear down outside the lock.
            let _ = entry.session.close().await;
        }

        let session = self.driver.launch(opts).await?;
        *self.cached.lock() = Some(CachedSession {
            session: session.clone(),
            args,
            last_used: Instant::now(),
        });
        Ok(session)
    }

    /// Drop the cached session (e.g. `--no-browser-reuse`).
    pub async fn release(&self) {
        let cached = self.cached.lock().take();
        if let Some(entry) = cached {
            let _ = entry.session.close().await;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{BrowserDriver, BrowserError, BrowserSession, LaunchOpts};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeState {
        launches: Vec<Vec<String>>,
        auths: Vec<(String, String)>,
        closes: usize,
    }

    /// Fake browser for tests: records launch args and auth calls.
    #[derive(Clone, Default)]
    pub struct FakeBrowser {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeBrowser {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn launches(&self) -> Vec<Vec<String>> {
            self.inner.lock().launches.clone()
        }

        pub fn auths(&self) -> Vec<(String, String)> {
            self.inner.lock().auths.clone()
        }

        pub fn closes(&self) -> usize {
            self.inner.lock().closes
        }
    }

    struct FakeSession {
        inner: Arc<Mutex<FakeState>>,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn authenticate(&self, username: &str, password: &str) -> Result<(), BrowserError> {
            self.inner.lock().auths.push((username.to_string(), password.to_string()));
            Ok(())
        }

        async fn close(&self) -> Result<(), BrowserError> {
            self.inner.lock().closes += 1;
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserDriver for FakeBrowser {
        async fn launch(&self, opts: &LaunchOpts) -> Result<Arc<dyn BrowserSession>, BrowserError> {
            self.inner.lock().launches.push(opts.chromium_args());
            Ok(Arc::new(FakeSession { inner: self.inner.clone() }))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBrowser;

#[cfg(test)]
#[path = "browser_tests.rs"]
mod tests;
