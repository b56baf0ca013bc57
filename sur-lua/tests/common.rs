//! Common test utilities for sur-lua integration tests.

use std::io::Write;

use sur_lua::{LoadOutcome, LoadedSublet, SubletLoader};
use tempfile::NamedTempFile;

/// Write `code` to a temporary `.lua` file.
pub fn write_sublet(code: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("sublet")
        .suffix(".lua")
        .tempfile()
        .expect("Failed to create sublet file");
    file.write_all(code.as_bytes())
        .expect("Failed to write sublet file");
    file
}

/// Load `code` as a sublet, panicking unless it loads.
#[track_caller]
pub fn load_sublet(code: &str) -> LoadedSublet {
    let file = write_sublet(code);
    match SubletLoader::default().load(file.path()) {
        LoadOutcome::Loaded(sublet) => sublet,
        LoadOutcome::Failed(failure) => panic!("sublet failed to load: {}", failure.message),
        LoadOutcome::Missing => panic!("sublet file vanished"),
    }
}
