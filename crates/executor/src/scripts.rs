// SPDX-License-Identifier: MIT

//! Built-in scripts shipped with the executor binary.
//!
//! Real deployments compile their extraction scripts into a binary that
//! links `quarry-executor`; these built-ins exist for smoke runs and for
//! exercising the pipeline end to end (`--script noop` etc.).

use async_trait::async_trait;
use quarry_executor::{Script, ScriptContext, ScriptError, ScriptRegistry};
use std::sync::Arc;

/// Emits nothing and returns; the run completes with an auto terminal.
struct Noop;

#[async_trait]
impl Script for Noop {
    async fn run(&self, _ctx: &ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// Emits `count` item events (param `count`, default 1), then returns.
struct EmitItems;

#[async_trait]
impl Script for EmitItems {
    async fn run(&self, ctx: &ScriptContext) -> Result<(), ScriptError> {
        let count = ctx
            .job
            .params
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(1);
        for n in 1..=count {
            ctx.emit
                .item(serde_json::json!({ "n": n }))
                .map_err(|e| ScriptError::new(e.to_string()))?;
        }
        Ok(())
    }
}

/// Fails with the message in param `message` (default "always-fail").
struct AlwaysFail;

#[async_trait]
impl Script for AlwaysFail {
    async fn run(&self, ctx: &ScriptContext) -> Result<(), ScriptError> {
        let message = ctx
            .job
            .params
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("always-fail");
        Err(ScriptError::new(message))
    }
}

pub fn register_builtin(registry: &mut ScriptRegistry) {
    registry
        .register("noop", Arc::new(Noop))
        .register("emit-items", Arc::new(EmitItems))
        .register("always-fail", Arc::new(AlwaysFail));
}
