// SPDX-License-Identifier: MIT

// Installing the guard redirects this process's fd 1, so the fd plumbing
// itself is exercised by the workspace specs against the real binary;
// here we cover the preview formatting.

use super::*;

#[test]
fn preview_escapes_newlines() {
    assert_eq!(escape_preview(b"a\nb\rc"), "a\\nb\\rc");
}

#[test]
fn preview_truncates_at_200_chars() {
    let long = "x".repeat(300);
    let preview = escape_preview(long.as_bytes());
    assert_eq!(preview.chars().count(), 201); // 200 chars + ellipsis
    assert!(preview.ends_with('…'));
}

#[test]
fn preview_tolerates_invalid_utf8() {
    let preview = escape_preview(&[0xFF, 0xFE, b'o', b'k']);
    assert!(preview.contains("ok"));
}
