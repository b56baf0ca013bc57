//! Failure taxonomy for sublet loading and dispatch.
//!
//! Every error that crosses the Lua boundary is an [`LuaError`]. Before it is
//! shown to the operator it is classified into a [`Failure`]:
//!
//! - [`FailureKind::Soft`]: an explicit textual failure. That is a string
//!   passed to the scope's `error`, which arrives as [`SubletError::Script`],
//!   or "File not found" and "Wrong number of arguments". Reported as a
//!   single line.
//! - [`FailureKind::Defect`]: anything else. Errors the VM raises on its own
//!   (indexing nil, calling nil, bad arithmetic) arrive as plain
//!   `RuntimeError`s and land here, as do non-string error values, wrong
//!   value types, missing blocks, syntax errors and timeouts. Reported with
//!   message and trace.

use std::fmt;
use std::sync::Arc;

use mlua::prelude::*;
use thiserror::Error;

/// Marker Luau appends to error messages carrying a traceback.
const TRACEBACK_MARKER: &str = "stack traceback:";

/// Validation failures raised by the sublet vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubletError {
    #[error("Unknown value type")]
    UnknownValueType,
    #[error("No block given")]
    NoBlockGiven,
    #[error("File not found")]
    FileNotFound { path: String },
    #[error("Wrong number of arguments ({got} for {need})")]
    WrongArity { got: u32, need: u32 },
    #[error("Attribute `{0}` is read-only")]
    ReadOnly(String),
    /// Raised by a script through `error("...")`.
    #[error("{0}")]
    Script(String),
}

impl SubletError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SubletError::FileNotFound { .. }
            | SubletError::WrongArity { .. }
            | SubletError::Script(_) => FailureKind::Soft,
            _ => FailureKind::Defect,
        }
    }

    /// Wrap into a Lua error so it can be raised from a Rust callback.
    pub fn into_lua(self) -> LuaError {
        LuaError::external(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Soft,
    Defect,
}

/// A classified failure ready to be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub trace: Option<String>,
}

impl Failure {
    pub fn is_soft(&self) -> bool {
        self.kind == FailureKind::Soft
    }

    /// Classify a Lua error.
    pub fn from_lua(err: &LuaError) -> Self {
        let mut failure = Self::classify(err);
        if failure.trace.is_none() {
            failure.trace = outer_traceback(err);
        }
        failure
    }

    fn classify(err: &LuaError) -> Self {
        match err {
            LuaError::CallbackError { cause, .. } => Self::classify(cause),
            LuaError::WithContext { cause, .. } => Self::classify(cause),
            LuaError::ExternalError(inner) => Self::from_external(inner),
            LuaError::RuntimeError(msg) => {
                let (message, trace) = split_traceback(msg);
                Self {
                    kind: FailureKind::Defect,
                    message,
                    trace,
                }
            }
            LuaError::SyntaxError { message, .. } => Self {
                kind: FailureKind::Defect,
                message: message.clone(),
                trace: None,
            },
            other => {
                let (message, trace) = split_traceback(&other.to_string());
                Self {
                    kind: FailureKind::Defect,
                    message,
                    trace,
                }
            }
        }
    }

    fn from_external(inner: &Arc<dyn std::error::Error>) -> Self {
        match inner.downcast_ref::<SubletError>() {
            Some(err) => Self {
                kind: err.kind(),
                message: err.to_string(),
                trace: None,
            },
            None => Self {
                kind: FailureKind::Defect,
                message: inner.to_string(),
                trace: None,
            },
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Returns the first traceback found while unwrapping callback errors.
fn outer_traceback(err: &LuaError) -> Option<String> {
    match err {
        LuaError::CallbackError { traceback, cause } => {
            let (_, trace) = split_traceback(traceback);
            trace
                .or_else(|| (!traceback.trim().is_empty()).then(|| traceback.trim().to_string()))
                .or_else(|| outer_traceback(cause))
        }
        LuaError::WithContext { cause, .. } => outer_traceback(cause),
        _ => None,
    }
}

fn split_traceback(msg: &str) -> (String, Option<String>) {
    match msg.find(TRACEBACK_MARKER) {
        Some(pos) => {
            let message = msg[..pos].trim_end().to_string();
            let trace = msg[pos..].trim_end().to_string();
            (message, Some(trace))
        }
        None => (msg.trim_end().to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_error_is_soft() {
        let lua = Lua::new();
        let raise = lua
            .create_function(|_, msg: String| -> LuaResult<()> {
                Err(SubletError::Script(msg).into_lua())
            })
            .unwrap();
        lua.globals().set("raise", raise).unwrap();

        let err = lua.load(r#"raise("sensor offline")"#).exec().unwrap_err();
        let failure = Failure::from_lua(&err);
        assert!(failure.is_soft());
        assert_eq!(failure.message, "sensor offline");
    }

    #[test]
    fn vm_runtime_errors_are_defects() {
        let lua = Lua::new();
        for code in [
            "local t = nil; t.x = 1",
            "undefined_fn()",
            "local x = nil; local y = x + 1",
            "error({})",
            r#"error("builtin error, not the scope's")"#,
        ] {
            let err = lua.load(code).exec().unwrap_err();
            let failure = Failure::from_lua(&err);
            assert_eq!(failure.kind, FailureKind::Defect, "{code}");
        }
    }

    #[test]
    fn defect_keeps_traceback() {
        let lua = Lua::new();
        let func: LuaFunction = lua
            .load("function() local t = nil; return t.x end")
            .eval()
            .unwrap();
        let failure = Failure::from_lua(&func.call::<()>(()).unwrap_err());
        assert_eq!(failure.kind, FailureKind::Defect);
        assert!(failure.message.contains("attempt to index nil"));
        assert!(failure.trace.unwrap().starts_with("stack traceback:"));
    }

    #[test]
    fn file_not_found_is_soft() {
        let err = SubletError::FileNotFound {
            path: "/nope".into(),
        }
        .into_lua();
        let failure = Failure::from_lua(&err);
        assert_eq!(failure.kind, FailureKind::Soft);
        assert_eq!(failure.message, "File not found");
    }

    #[test]
    fn wrong_value_type_is_defect() {
        let failure = Failure::from_lua(&SubletError::UnknownValueType.into_lua());
        assert_eq!(failure.kind, FailureKind::Defect);
        assert_eq!(failure.message, "Unknown value type");
    }

    #[test]
    fn external_error_through_lua_keeps_classification() {
        let lua = Lua::new();
        let raise = lua
            .create_function(|_, ()| -> LuaResult<()> {
                Err(SubletError::WrongArity { got: 5, need: 4 }.into_lua())
            })
            .unwrap();
        lua.globals().set("raise", raise).unwrap();

        let err = lua.load("raise()").exec().unwrap_err();
        let failure = Failure::from_lua(&err);
        assert!(failure.is_soft());
        assert_eq!(failure.message, "Wrong number of arguments (5 for 4)");
    }

    #[test]
    fn syntax_error_is_defect() {
        let lua = Lua::new();
        let err = lua.load("local x = ").exec().unwrap_err();
        assert_eq!(Failure::from_lua(&err).kind, FailureKind::Defect);
    }

    #[test]
    fn split_traceback_separates_trace() {
        let (message, trace) = split_traceback("boom\nstack traceback:\n\t[C]: in ?");
        assert_eq!(message, "boom");
        assert!(trace.unwrap().starts_with("stack traceback:"));
    }
}
