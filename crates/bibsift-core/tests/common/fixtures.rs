//! Test fixture loading utilities

use std::path::PathBuf;

/// Get the path to a fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_fixtures")
        .join(name)
}

/// Load a fixture file as a string
#[allow(dead_code)]
pub fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", name))
}

/// Path of a BibTeX database fixture
#[allow(dead_code)]
pub fn bibtex_fixture(name: &str) -> PathBuf {
    fixture_path(&format!("bibtex/{}", name))
}

/// Path of a LaTeX manuscript fixture
#[allow(dead_code)]
pub fn manuscript_fixture(name: &str) -> PathBuf {
    fixture_path(&format!("manuscript/{}", name))
}
