//! File helpers exposed to sublet scripts.
//!
//! Luau ships without an `io` library, but sublets commonly poll files such
//! as `/proc/acpi/thermal_zone/*/temperature`. These helpers never throw;
//! failures come back as `nil, message`.

use std::path::Path;

use mlua::{Lua, Result, Table};

/// Register the file helpers into `scope`.
///
/// # Functions
///
/// - `read_file(path)` - Whole file as a string, or `nil, err`
/// - `read_lines(path)` - File split into lines, or `nil, err`
/// - `exists(path)` - Whether the path exists
pub fn register(lua: &Lua, scope: &Table) -> Result<()> {
    scope.set(
        "read_file",
        lua.create_function(|_, path: String| Ok(read_file(&path)))?,
    )?;

    scope.set(
        "read_lines",
        lua.create_function(|_, path: String| Ok(read_lines(&path)))?,
    )?;

    scope.set(
        "exists",
        lua.create_function(|_, path: String| Ok(Path::new(&path).exists()))?,
    )?;

    Ok(())
}

fn read_file(path: &str) -> (Option<String>, Option<String>) {
    match std::fs::read_to_string(path) {
        Ok(content) => (Some(content), None),
        Err(e) => (None, Some(format!("cannot read file '{}': {}", path, e))),
    }
}

fn read_lines(path: &str) -> (Option<Vec<String>>, Option<String>) {
    match std::fs::read_to_string(path) {
        Ok(content) => (Some(content.lines().map(str::to_string).collect()), None),
        Err(e) => (None, Some(format!("cannot read file '{}': {}", path, e))),
    }
}
