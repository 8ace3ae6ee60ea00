// SPDX-License-Identifier: MIT

//! Notification adapters.
//!
//! Invoked best-effort after a run's data is persisted; adapter failures
//! are logged and never change the run outcome or exit code.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod notify;
mod webhook;

pub use notify::{NoopAdapter, NotifyAdapter, NotifyError, RunReport};
pub use webhook::{WebhookAdapter, WebhookConfig};

#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotifyAdapter;
