//! Locations of checked-in fixture files.

use std::path::PathBuf;

/// Absolute path of `relative` under the testkit `fixtures/` directory.
pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(relative)
}

/// Read a fixture file as UTF-8.
pub fn read_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|error| panic!("fixture {relative} unreadable: {error}"))
}
