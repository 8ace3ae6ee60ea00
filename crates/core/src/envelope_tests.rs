// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

fn envelope(payload: EventPayload) -> EventEnvelope {
    EventEnvelope {
        contract_version: crate::version::CONTRACT_VERSION.to_string(),
        event_id: EventId::from_string("evt-0000000000000000001"),
        run_id: RunId::from_string("run-1"),
        job_id: None,
        parent_run_id: None,
        attempt: 1,
        ts: chrono::DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
        seq: 1,
        payload,
    }
}

#[parameterized(
    item = { EventType::Item, false, false },
    artifact = { EventType::Artifact, false, false },
    checkpoint = { EventType::Checkpoint, false, false },
    enqueue = { EventType::Enqueue, true, false },
    rotate_proxy = { EventType::RotateProxy, true, false },
    log = { EventType::Log, true, false },
    run_error = { EventType::RunError, false, true },
    run_complete = { EventType::RunComplete, false, true },
)]
fn droppable_and_terminal_classification(ty: EventType, droppable: bool, terminal: bool) {
    assert_eq!(ty.is_droppable(), droppable);
    assert_eq!(ty.is_terminal(), terminal);
}

#[test]
fn envelope_serializes_with_single_type_tag() {
    let env = envelope(EventPayload::Item { data: serde_json::json!({"k": "v"}) });
    let value = serde_json::to_value(&env).unwrap();

    assert_eq!(value["type"], "item");
    assert_eq!(value["seq"], 1);
    assert_eq!(value["data"]["k"], "v");
    // Optional fields are omitted when absent
    assert!(value.get("job_id").is_none());
    assert!(value.get("parent_run_id").is_none());
}

#[test]
fn envelope_roundtrips_through_json() {
    let env = envelope(EventPayload::RunError {
        error_type: "script_error".into(),
        message: "TypeError: x".into(),
        stack: Some("at line 3".into()),
    });
    let json = serde_json::to_string(&env).unwrap();
    let back: EventEnvelope = serde_json::from_str(&json).unwrap();

    assert_eq!(back, env);
    assert_eq!(back.event_type(), EventType::RunError);
}

#[test]
fn skipped_run_complete_carries_flag() {
    let env = envelope(EventPayload::RunComplete {
        summary: None,
        skipped: true,
        reason: Some("nothing to do".into()),
    });
    let value = serde_json::to_value(&env).unwrap();
    assert_eq!(value["skipped"], true);
    assert_eq!(value["reason"], "nothing to do");

    // Default path omits the flag entirely
    let env = envelope(EventPayload::RunComplete { summary: None, skipped: false, reason: None });
    let value = serde_json::to_value(&env).unwrap();
    assert!(value.get("skipped").is_none());
}

#[test]
fn enqueue_spec_flattens_into_payload() {
    let mut params = std::collections::BTreeMap::new();
    params.insert("page".to_string(), serde_json::json!(2));
    let env = envelope(EventPayload::Enqueue {
        spec: EnqueueSpec {
            target: "listing".into(),
            params,
            source: None,
            category: Some("deep".into()),
        },
    });
    let value = serde_json::to_value(&env).unwrap();
    assert_eq!(value["target"], "listing");
    assert_eq!(value["params"]["page"], 2);
    assert_eq!(value["category"], "deep");
}

#[test]
fn timestamps_serialize_as_rfc3339_utc() {
    let env = envelope(EventPayload::Checkpoint { state: serde_json::json!({}) });
    let value = serde_json::to_value(&env).unwrap();
    let ts = value["ts"].as_str().unwrap();
    assert!(ts.starts_with("2026-01-02T03:04:05"), "got {ts}");
}
