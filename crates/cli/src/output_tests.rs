// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn table_aligns_columns() {
    let table = render_table(
        &["run", "events"],
        &[
            vec!["run-1".to_string(), "2".to_string()],
            vec!["run-with-long-id".to_string(), "100".to_string()],
        ],
    );
    let lines: Vec<&str> = table.lines().collect();
    assert!(lines[0].starts_with("RUN"));
    assert!(lines[1].starts_with("run-1"));
    // Both value columns start at the same offset
    let offset = lines[1].find('2').unwrap();
    assert_eq!(&lines[2][offset..offset + 3], "100");
}

#[test]
fn empty_table_prints_placeholder() {
    let table = render_table(&["a"], &[]);
    assert!(table.contains("(none)"));
}
