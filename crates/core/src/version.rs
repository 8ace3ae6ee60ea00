// SPDX-License-Identifier: MIT

//! Contract versioning.
//!
//! One canonical version identifies the CLI, the emit contract, and the IPC
//! contract in lockstep. Within a 0.x series only additive changes are
//! allowed, so compatibility requires equal major and minor components.

use thiserror::Error;

/// The canonical contract version; every event envelope carries it.
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("unparseable contract version {0:?}")]
    Unparseable(String),
    #[error("contract version {theirs} is incompatible with runtime {ours}")]
    Incompatible { ours: String, theirs: String },
}

fn major_minor(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Check an envelope's `contract_version` against this runtime.
///
/// Pre-1.0, minor bumps may add fields, so both sides must agree on
/// major.minor; the patch component never breaks compatibility.
pub fn check_contract(theirs: &str) -> Result<(), VersionError> {
    let ours = CONTRACT_VERSION;
    let Some(our_mm) = major_minor(ours) else {
        return Err(VersionError::Unparseable(ours.to_string()));
    };
    let Some(their_mm) = major_minor(theirs) else {
        return Err(VersionError::Unparseable(theirs.to_string()));
    };
    if our_mm != their_mm {
        return Err(VersionError::Incompatible {
            ours: ours.to_string(),
            theirs: theirs.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
