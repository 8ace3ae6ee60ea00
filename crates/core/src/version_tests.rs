// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn same_version_is_compatible() {
    assert!(check_contract(CONTRACT_VERSION).is_ok());
}

#[test]
fn patch_difference_is_compatible() {
    let (major, minor) = major_minor(CONTRACT_VERSION).unwrap();
    assert!(check_contract(&format!("{major}.{minor}.99")).is_ok());
}

#[test]
fn minor_difference_is_incompatible_pre_1_0() {
    let (major, minor) = major_minor(CONTRACT_VERSION).unwrap();
    let theirs = format!("{}.{}.0", major, minor + 1);
    assert!(matches!(
        check_contract(&theirs),
        Err(VersionError::Incompatible { .. })
    ));
}

#[test]
fn garbage_is_unparseable() {
    assert_eq!(
        check_contract("not-a-version"),
        Err(VersionError::Unparseable("not-a-version".into()))
    );
}
