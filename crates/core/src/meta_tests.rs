// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn root_meta_validates() {
    let meta = RunMeta::root(RunId::from_string("r1"));
    assert_eq!(meta.attempt, 1);
    assert!(meta.validate().is_ok());
}

#[test]
fn first_attempt_with_parent_is_rejected() {
    let mut meta = RunMeta::root(RunId::from_string("r1"));
    meta.parent_run_id = Some(RunId::from_string("r0"));
    assert_eq!(meta.validate(), Err(MetaError::FirstAttemptWithParent));
}

#[test]
fn retry_without_parent_is_rejected() {
    let mut meta = RunMeta::root(RunId::from_string("r1"));
    meta.attempt = 2;
    assert_eq!(meta.validate(), Err(MetaError::RetryWithoutParent));

    meta.parent_run_id = Some(RunId::from_string("r0"));
    assert!(meta.validate().is_ok());
}

#[test]
fn zero_attempt_is_rejected() {
    let mut meta = RunMeta::root(RunId::from_string("r1"));
    meta.attempt = 0;
    assert_eq!(meta.validate(), Err(MetaError::ZeroAttempt(0)));
}

#[test]
fn children_are_fresh_first_attempts() {
    let child = RunMeta::child(Some(JobId::from_string("job-7")));
    assert_eq!(child.attempt, 1);
    assert!(child.parent_run_id.is_none());
    assert!(child.validate().is_ok());
}

#[test]
fn run_request_roundtrips() {
    let req = RunRequest {
        run: RunMeta::root(RunId::from_string("r1")),
        job: JobSpec { script: "listing".into(), params: Default::default() },
        proxy: None,
        storage: Some(RunPartition::new(
            "shop",
            "default",
            chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            RunId::from_string("r1"),
        )),
    };
    let json = serde_json::to_string(&req).unwrap();
    let back: RunRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(back, req);
    assert_eq!(back.storage.unwrap().day.to_string(), "2026-01-02");
}
