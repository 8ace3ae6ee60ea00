// SPDX-License-Identifier: MIT

//! The Quarry executor: the child process that hosts a script against a
//! headless browser and streams frames back over stdout.
//!
//! Layers, bottom up: the stdout guard protects the binary channel, the
//! observing sink watches every write for terminal events and failures,
//! the emit API serializes writes and assigns `seq`, and the driver runs
//! the script lifecycle and derives the executor's declared outcome.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod browser;
pub mod driver;
pub mod emit;
pub mod guard;
pub mod script;
pub mod sink;

pub use browser::{BrowserDriver, BrowserError, BrowserSession, LaunchOpts, NullBrowser, ReusableBrowser};
pub use driver::{crash_result, run_lifecycle};
pub use emit::{EmitError, Emitter};
pub use guard::{install_stdout_guard, StdoutGuard};
pub use script::{
    resolve_script, LoadError, PrepareAction, Script, ScriptContext, ScriptError, ScriptRegistry,
    TerminalSignal,
};
pub use sink::{ObservingSink, RawFrameSink, TerminalState, VecSink, WriterSink};

#[cfg(any(test, feature = "test-support"))]
pub use browser::FakeBrowser;
