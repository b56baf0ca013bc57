//! Luau runtime used to evaluate sublets.
//!
//! Each script evaluation and each handler call gets its own wall-clock
//! budget. Luau polls the interrupt callback at calls and loop back-edges;
//! once the budget is spent the running chunk fails, the harness reports it
//! like any other failure and the operator gets the menu back.
//!
//! Scripts are compiled with optimization level 2 and debug level 1 so error
//! messages keep their line information.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::debug;
use mlua::prelude::*;
use mlua::{Compiler, FromLuaMulti, IntoLuaMulti};

/// How long a sublet may run before it is cut off.
///
/// The budget covers one evaluation of the sublet file, or one invocation of
/// a handler picked from the menu. `--timeout-ms` sets it from the command
/// line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// `Duration::ZERO` lets a sublet run forever.
    pub timeout: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
        }
    }
}

impl ExecutionLimits {
    /// No budget at all; a looping handler blocks the harness.
    pub fn unlimited() -> Self {
        Self {
            timeout: Duration::ZERO,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn is_limited(&self) -> bool {
        !self.timeout.is_zero()
    }
}

/// Point in time after which the running sublet code is stopped.
///
/// Shared between the runtime, which arms it around every entry into Lua,
/// and the interrupt callback, which checks it.
#[derive(Debug, Clone, Default)]
struct Deadline(Rc<Cell<Option<Instant>>>);

impl Deadline {
    fn arm(&self, budget: Duration) {
        self.0.set(Some(Instant::now() + budget));
    }

    fn disarm(&self) {
        self.0.set(None);
    }

    fn expired(&self) -> bool {
        self.0.get().is_some_and(|at| Instant::now() >= at)
    }
}

/// A Luau VM that enforces [`ExecutionLimits`] on sublet code.
pub struct LuaRuntime {
    lua: Lua,
    limits: ExecutionLimits,
    deadline: Deadline,
    compiler: Compiler,
}

impl LuaRuntime {
    pub fn new() -> LuaResult<Self> {
        Self::new_with_limits(ExecutionLimits::default())
    }

    pub fn new_with_limits(limits: ExecutionLimits) -> LuaResult<Self> {
        let lua = Lua::new();
        lua.load_std_libs(LuaStdLib::ALL_SAFE)?;

        let deadline = Deadline::default();
        if limits.is_limited() {
            let budget = limits.timeout;
            let watched = deadline.clone();
            lua.set_interrupt(move |_| {
                if watched.expired() {
                    watched.disarm();
                    return Err(LuaError::external(format!(
                        "Script execution timeout after {budget:?}"
                    )));
                }
                Ok(LuaVmState::Continue)
            });
        }

        let compiler = Compiler::new()
            .set_optimization_level(2)
            .set_debug_level(1);

        Ok(Self {
            lua,
            limits,
            deadline,
            compiler,
        })
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Run `f` with the deadline armed, if there is one.
    fn guarded<T>(&self, f: impl FnOnce() -> LuaResult<T>) -> LuaResult<T> {
        if self.limits.is_limited() {
            self.deadline.arm(self.limits.timeout);
        }
        let result = f();
        self.deadline.disarm();
        result
    }

    /// Call a sublet handler under the execution budget.
    pub fn call_with_timeout<R: FromLuaMulti>(
        &self,
        callback: &LuaFunction,
        args: impl IntoLuaMulti,
    ) -> LuaResult<R> {
        self.guarded(|| callback.call::<R>(args))
    }

    /// Evaluate `code` with `env` as its global environment.
    ///
    /// Functions the chunk defines keep `env` as their environment.
    pub fn exec_in(&self, code: &str, chunk_name: &str, env: &LuaTable) -> LuaResult<()> {
        let bytecode = self.compiler.compile(code)?;
        let chunk = self
            .lua
            .load(bytecode)
            .set_name(format!("@{chunk_name}"))
            .set_environment(env.clone());

        self.guarded(|| chunk.exec())
    }

    /// Read a sublet file and evaluate it in `env`.
    pub fn exec_file_in(&self, path: &Path, env: &LuaTable) -> LuaResult<()> {
        let code = std::fs::read_to_string(path)
            .map_err(|e| LuaError::external(format!("Failed to read {}: {e}", path.display())))?;

        debug!("Evaluating {} ({} bytes)", path.display(), code.len());
        self.exec_in(&code, &path.display().to_string(), env)
    }

    pub fn inner(&self) -> &Lua {
        &self.lua
    }
}
