// SPDX-License-Identifier: MIT

use super::*;
use quarry_core::{RunId, RunPartition};
use yare::parameterized;

fn part() -> RunPartition {
    RunPartition::new(
        "shop",
        "default",
        chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        RunId::from_string("run-1"),
    )
}

#[test]
fn partition_dir_orders_keys() {
    assert_eq!(
        partition_dir(&part(), "item"),
        "source=shop/category=default/day=2026-01-02/run_id=run-1/event_type=item"
    );
}

#[test]
fn run_dir_omits_event_type() {
    assert_eq!(run_dir(&part()), "source=shop/category=default/day=2026-01-02/run_id=run-1");
}

#[parameterized(
    slash = { "a/b", "a_b" },
    backslash = { "a\\b", "a_b" },
    equals = { "k=v", "k_v" },
    empty = { "", "_" },
    clean = { "plain-value.1", "plain-value.1" },
)]
fn sanitize_cases(input: &str, expected: &str) {
    assert_eq!(sanitize_value(input), expected);
}
