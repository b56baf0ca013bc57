//! Loading sublets from disk.
//!
//! Each sublet gets its own Luau VM. Loading evaluates the script in a
//! [`SubletScope`], runs the `configure` block and the `run` handler when
//! declared, and finally normalizes the descriptor.

use std::cell::Ref;
use std::path::Path;

use log::{debug, info, warn};
use mlua::prelude::*;

use crate::capabilities::CapabilityEntry;
use crate::dispatch::{ArgumentPolicy, Dummy};
use crate::failure::{Failure, SubletError};
use crate::runtime::{ExecutionLimits, LuaRuntime};
use crate::sublet::Sublet;
use crate::sublet_api::{SubletHandle, SubletScope};

/// Result of loading one path.
pub enum LoadOutcome {
    /// The path does not name an existing file.
    Missing,
    Failed(Failure),
    Loaded(LoadedSublet),
}

impl LoadOutcome {
    pub fn loaded(self) -> Option<LoadedSublet> {
        match self {
            LoadOutcome::Loaded(sublet) => Some(sublet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubletLoader {
    limits: ExecutionLimits,
}

impl SubletLoader {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn load(&self, path: &Path) -> LoadOutcome {
        if !path.is_file() {
            debug!("Skipping {}: not a file", path.display());
            return LoadOutcome::Missing;
        }

        match self.try_load(path) {
            Ok(sublet) => {
                info!(
                    "Loaded sublet '{}' from {} ({} capabilities)",
                    sublet.name(),
                    path.display(),
                    sublet.capabilities().len()
                );
                LoadOutcome::Loaded(sublet)
            }
            Err(err) => {
                warn!("Failed to load sublet {}: {}", path.display(), err);
                LoadOutcome::Failed(Failure::from_lua(&err))
            }
        }
    }

    fn try_load(&self, path: &Path) -> LuaResult<LoadedSublet> {
        let runtime = LuaRuntime::new_with_limits(self.limits.clone())?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let scope = SubletScope::new(runtime.inner(), Sublet::new(name))?;
        let dummy = runtime.inner().create_userdata(Dummy::new())?;

        runtime.exec_file_in(path, &scope.env)?;

        let loaded = LoadedSublet {
            scope,
            dummy,
            runtime,
        };

        loaded.configure()?;
        if loaded.handle().capabilities().responds_to("run") {
            loaded.call("run")?;
        }
        loaded.handle().sublet_mut().normalize();

        Ok(loaded)
    }
}

/// A sublet that loaded successfully, together with its VM.
pub struct LoadedSublet {
    scope: SubletScope,
    dummy: LuaAnyUserData,
    runtime: LuaRuntime,
}

impl LoadedSublet {
    pub fn name(&self) -> String {
        self.sublet().name().to_string()
    }

    pub fn handle(&self) -> &SubletHandle {
        &self.scope.handle
    }

    pub fn sublet(&self) -> Ref<'_, Sublet> {
        self.scope.handle.sublet()
    }

    /// Attributes currently set on the sublet, in display order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.sublet().attributes()
    }

    /// Discover capabilities from the live registry.
    pub fn capabilities(&self) -> Vec<CapabilityEntry> {
        self.scope.handle.capabilities().discover()
    }

    /// Invoke a capability by name, with arguments picked from its arity.
    pub fn invoke(&self, name: &str) -> Result<(), Failure> {
        debug!("Invoking '{}' on sublet '{}'", name, self.name());
        self.call(name).map_err(|err| Failure::from_lua(&err))
    }

    fn call(&self, name: &str) -> LuaResult<()> {
        let (callback, arity) = {
            let caps = self.scope.handle.capabilities();
            let cap = caps
                .get(name)
                .ok_or_else(|| {
                    SubletError::Script(format!("undefined capability '{name}'")).into_lua()
                })?;
            (cap.callback.clone(), cap.arity)
        };

        let args = ArgumentPolicy::for_arity(arity).build(
            self.runtime.inner(),
            &self.scope.userdata,
            &self.dummy,
        )?;
        self.runtime.call_with_timeout::<()>(&callback, args)
    }

    fn configure(&self) -> LuaResult<()> {
        let configure = self.scope.handle.capabilities().configure();
        match configure {
            Some(block) => self
                .runtime
                .call_with_timeout::<()>(&block, self.scope.userdata.clone()),
            None => Ok(()),
        }
    }
}
