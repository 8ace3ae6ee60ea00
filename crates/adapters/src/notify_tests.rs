// SPDX-License-Identifier: MIT

use super::*;
use quarry_core::{FinalOutcome, RunId};

fn report(outcome: FinalOutcome) -> RunReport {
    RunReport {
        run_id: RunId::from_string("run-1"),
        job_id: None,
        outcome,
        exit_code: outcome.exit_code(),
        duration_ms: 1200,
        stats: Default::default(),
    }
}

#[tokio::test]
async fn noop_always_succeeds() {
    let adapter = NoopAdapter;
    assert!(adapter.notify(&report(FinalOutcome::Success)).await.is_ok());
}

#[tokio::test]
async fn fake_records_reports() {
    let adapter = FakeNotifyAdapter::new();
    adapter.notify(&report(FinalOutcome::ScriptError)).await.unwrap();

    let reports = adapter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, FinalOutcome::ScriptError);
    assert_eq!(reports[0].exit_code, 1);
}

#[tokio::test]
async fn failing_fake_fails() {
    let adapter = FakeNotifyAdapter::failing();
    assert!(adapter.notify(&report(FinalOutcome::Success)).await.is_err());
    assert!(adapter.reports().is_empty());
}

#[test]
fn report_serialization_has_no_credentials_shaped_fields() {
    let json = serde_json::to_string(&report(FinalOutcome::Success)).unwrap();
    assert!(!json.contains("password"));
    assert!(!json.contains("proxy"));
}
