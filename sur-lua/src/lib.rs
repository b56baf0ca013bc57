//! Luau sublet runtime for the sur test harness.
//!
//! A sublet is a small panel widget script. This crate evaluates sublet
//! scripts in a sandboxed scope, records the capabilities they declare
//! (events, hooks, helpers) and invokes them with synthesized arguments.
//!
//! # Example
//!
//! ```lua
//! interval = 30
//!
//! on("mouse_down", function(s, x, y, button)
//!     s.data = "clicked at " .. x .. "," .. y
//! end)
//!
//! function run()
//!     data = "ready"
//! end
//! ```

pub mod capabilities;
pub mod dispatch;
pub mod failure;
pub mod fs_utils;
pub mod loader;
pub mod runtime;
pub mod sublet;
pub mod sublet_api;

pub use capabilities::{
    Arity, Capabilities, Capability, CapabilityEntry, Role, SUBLET_EVENTS, SUBLET_HOOKS,
};
pub use dispatch::{ArgumentPolicy, Dummy};
pub use failure::{Failure, FailureKind, SubletError};
pub use loader::{LoadOutcome, LoadedSublet, SubletLoader};
pub use runtime::{ExecutionLimits, LuaRuntime};
pub use sublet::{Geometry, Sublet, DEFAULT_INTERVAL};
pub use sublet_api::{SubletHandle, SubletScope};
