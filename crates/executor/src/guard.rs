// SPDX-License-Identifier: MIT

//! The stdout guard.
//!
//! The executor's stdout is a binary IPC channel; any stray text write by
//! third-party code would corrupt framing. The guard clones the real
//! stdout fd for IPC use, then points fd 1 at a pipe whose reader
//! forwards stray writes to stderr with a short preview. Composition at
//! the fd level — no stream proxying, so nothing downstream can observe
//! a patched object with diverging internals. All fd handling goes
//! through owned descriptors; no raw-fd conversions.

use parking_lot::Mutex;
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsFd, AsRawFd};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Preview length for redirected stray writes.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("stdout guard already installed")]
    AlreadyInstalled,
    #[error("stdout guard setup failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stdout guard setup failed: {0}")]
    Sys(#[from] nix::Error),
}

/// Handle to the guarded channel. The `ipc` writer is the only path to
/// the real stdout; everything writing to fd 1 lands on stderr instead.
pub struct StdoutGuard {
    ipc: Arc<Mutex<File>>,
}

impl StdoutGuard {
    /// The raw IPC writer that bypasses the redirection.
    pub fn ipc_writer(&self) -> Arc<Mutex<File>> {
        self.ipc.clone()
    }
}

static GUARD: OnceLock<StdoutGuard> = OnceLock::new();

fn escape_preview(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out = String::new();
    for c in text.chars().take(PREVIEW_CHARS) {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    if text.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}

/// Keep an owned clone of the real stdout, then repoint fd 1 at a pipe.
/// Returns (real stdout, pipe read end).
fn redirect_fd1() -> Result<(File, File), GuardError> {
    let stdout = std::io::stdout();
    let real = stdout.as_fd().try_clone_to_owned()?;

    let (pipe_read, pipe_write) = nix::unistd::pipe()?;
    nix::unistd::dup2(pipe_write.as_raw_fd(), stdout.as_raw_fd())?;
    // fd 1 now holds the pipe's only surviving write end; dropping this
    // one lets the drain thread see EOF when the process winds down.
    drop(pipe_write);

    Ok((File::from(real), File::from(pipe_read)))
}

/// Install the guard. Must run exactly once, before any emit.
///
/// Returns the process-wide guard; a second call is an error rather than
/// a silent re-install.
pub fn install_stdout_guard() -> Result<&'static StdoutGuard, GuardError> {
    if GUARD.get().is_some() {
        return Err(GuardError::AlreadyInstalled);
    }

    let (real_stdout, mut pipe_reader) = redirect_fd1()?;

    // Drain stray writes for the life of the process.
    std::thread::Builder::new()
        .name("stdout-guard".to_string())
        .spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match pipe_reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        tracing::warn!(
                            preview = %escape_preview(&buf[..n]),
                            bytes = n,
                            "stray stdout write redirected to stderr"
                        );
                    }
                }
            }
        })?;

    let guard = StdoutGuard { ipc: Arc::new(Mutex::new(real_stdout)) };
    match GUARD.set(guard) {
        Ok(()) => Ok(GUARD.get().unwrap_or_else(|| unreachable!("guard just set"))),
        Err(_) => Err(GuardError::AlreadyInstalled),
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
