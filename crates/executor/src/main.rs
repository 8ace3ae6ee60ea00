// SPDX-License-Identifier: MIT

//! `quarryx` — the executor child process.
//!
//! Protocol: one length-prefixed RunRequest frame arrives on stdin; event
//! and control frames leave on stdout; human logs go to stderr. The
//! process always exits 0 — hard crashes are what non-zero exit codes are
//! for, and the runtime treats those as authoritative.

use quarry_core::{RunRequest, RunResult};
use quarry_executor::{
    crash_result, install_stdout_guard, resolve_script, run_lifecycle, Emitter, NullBrowser,
    ObservingSink, ReusableBrowser, ScriptRegistry,
};
use quarry_executor::sink::WriterSink;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

mod scripts;

/// Absolute path scripts are resolved against, forwarded by the runtime.
const ENV_RESOLVE_FROM: &str = "QUARRY_RESOLVE_FROM";

/// Shared handle over the guarded stdout fd.
struct IpcWriter(std::sync::Arc<parking_lot::Mutex<std::fs::File>>);

impl Write for IpcWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

fn read_run_request() -> Result<RunRequest, String> {
    let mut stdin = std::io::stdin().lock();
    let payload = quarry_wire::read_frame_blocking(&mut stdin)
        .map_err(|e| format!("run request read failed: {e}"))?
        .ok_or_else(|| "stdin closed before run request".to_string())?;
    quarry_wire::decode_payload(&payload).map_err(|e| format!("run request decode failed: {e}"))
}

fn write_result_and_drain(emitter: Option<&Emitter>, ipc: &mut IpcWriter, result: &RunResult) {
    // run_result write failures are swallowed; the runtime falls back to
    // the exit code and its own observations.
    match emitter {
        Some(emitter) => {
            if let Err(err) = emitter.write_run_result(result) {
                tracing::warn!(error = %err, "run_result write failed");
            }
        }
        None => {
            if let Ok(payload) =
                quarry_wire::encode_frame(&quarry_wire::Frame::RunResult(result.clone()))
            {
                if let Err(err) = quarry_wire::write_frame_blocking(ipc, &payload) {
                    tracing::warn!(error = %err, "run_result write failed");
                }
            }
        }
    }
    let _ = ipc.flush();
}

fn main() {
    // Logs must go to stderr before the guard swaps fd 1.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("QUARRY_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let guard = match install_stdout_guard() {
        Ok(guard) => guard,
        Err(err) => {
            tracing::error!(error = %err, "stdout guard install failed");
            std::process::exit(0);
        }
    };
    let mut ipc = IpcWriter(guard.ipc_writer());

    let request = match read_run_request() {
        Ok(request) => request,
        Err(message) => {
            tracing::error!(%message, "invalid run request");
            write_result_and_drain(None, &mut ipc, &crash_result(message));
            std::process::exit(0);
        }
    };
    if let Err(err) = request.run.validate() {
        tracing::error!(error = %err, "run meta rejected");
        write_result_and_drain(None, &mut ipc, &crash_result(err.to_string()));
        std::process::exit(0);
    }

    let mut registry = ScriptRegistry::new();
    scripts::register_builtin(&mut registry);
    let resolve_from = std::env::var(ENV_RESOLVE_FROM).ok().map(PathBuf::from);
    let script = match resolve_script(&registry, &request.job.script, resolve_from.as_deref()) {
        Ok(script) => script,
        Err(err) => {
            tracing::error!(error = %err, "script load failed");
            write_result_and_drain(None, &mut ipc, &crash_result(err.to_string()));
            std::process::exit(0);
        }
    };

    let sink = ObservingSink::new(Box::new(WriterSink::new(IpcWriter(guard.ipc_writer()))));
    let emitter = Emitter::new(sink, request.run.clone());
    let browser = ReusableBrowser::new(Arc::new(NullBrowser));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "tokio runtime build failed");
            write_result_and_drain(None, &mut ipc, &crash_result(err.to_string()));
            std::process::exit(0);
        }
    };

    let result = runtime.block_on(async {
        let result = run_lifecycle(&request, script, &browser, emitter.clone()).await;
        // --no-browser-reuse on the runtime side: tear the session down
        // instead of caching it for a later run in this process.
        if std::env::var("QUARRY_NO_BROWSER_REUSE").is_ok_and(|v| v == "1") {
            browser.release().await;
        }
        result
    });
    tracing::info!(
        run_id = %request.run.run_id,
        status = %result.outcome.status,
        "run finished"
    );

    write_result_and_drain(Some(&emitter), &mut ipc, &result);
    std::process::exit(0);
}
