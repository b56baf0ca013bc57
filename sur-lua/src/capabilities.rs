//! Capability registry for loaded sublets.
//!
//! A capability is anything the operator can invoke on a sublet: a
//! recognized event (`run`, `mouse_down`, ...), a lifecycle hook
//! (`client_create`, `exit`, ...) or an ad-hoc helper the script installed.
//! Scripts populate the registry while they are evaluated; discovery is a
//! plain walk over it in a fixed order.

use std::fmt;

use indexmap::IndexMap;
use log::debug;
use mlua::prelude::*;

use crate::failure::SubletError;

/// Recognized events and the maximum number of arguments their handlers take.
pub const SUBLET_EVENTS: [(&str, u32); 4] = [
    ("run", 0),
    ("mouse_down", 4),
    ("mouse_over", 1),
    ("mouse_out", 1),
];

/// Recognized lifecycle hooks. Each handler takes the sublet.
pub const SUBLET_HOOKS: [&str; 11] = [
    "client_create",
    "client_configure",
    "client_focus",
    "client_kill",
    "tag_create",
    "tag_kill",
    "view_create",
    "view_configure",
    "view_focus",
    "view_kill",
    "exit",
];

/// Maximum handler arity of a recognized event.
pub fn event_max_arity(name: &str) -> Option<u32> {
    SUBLET_EVENTS
        .iter()
        .find(|(event, _)| *event == name)
        .map(|(_, need)| *need)
}

pub fn is_hook(name: &str) -> bool {
    SUBLET_HOOKS.contains(&name)
}

/// Number of positional arguments a handler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(u32),
    /// Accepts any number of arguments.
    Variadic,
}

impl Arity {
    pub fn from_parts(num_params: u32, is_vararg: bool) -> Self {
        if is_vararg {
            Arity::Variadic
        } else {
            Arity::Fixed(num_params)
        }
    }

    /// Inspect a Luau function through `debug.info(f, "a")`.
    pub fn detect(lua: &Lua, func: &LuaFunction) -> LuaResult<Self> {
        let debug_lib: LuaTable = lua.globals().get("debug")?;
        let info: LuaFunction = debug_lib.get("info")?;
        let (num_params, is_vararg): (u32, bool) = info.call((func.clone(), "a"))?;
        Ok(Self::from_parts(num_params, is_vararg))
    }

    /// Whether a handler of this arity may be bound to an event taking `need`.
    pub fn fits(self, need: u32) -> bool {
        match self {
            Arity::Variadic => true,
            Arity::Fixed(n) => n <= need,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{n}"),
            Arity::Variadic => f.write_str("any"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Event,
    Hook,
    Helper,
}

impl Role {
    /// Role a capability named `name` takes when a script defines it.
    pub fn for_name(name: &str) -> Self {
        if event_max_arity(name).is_some() {
            Role::Event
        } else if is_hook(name) {
            Role::Hook
        } else {
            Role::Helper
        }
    }
}

/// A registered capability.
#[derive(Clone)]
pub struct Capability {
    pub name: String,
    pub arity: Arity,
    pub role: Role,
    pub callback: LuaFunction,
}

/// Discovered view of a capability, as listed to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityEntry {
    pub name: String,
    pub arity: Arity,
    pub helper: bool,
}

/// All capabilities of one sublet.
#[derive(Default)]
pub struct Capabilities {
    entries: IndexMap<String, Capability>,
    configure: Option<LuaFunction>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler through `on(name, f)`.
    ///
    /// Event handlers are checked against the event's maximum arity. Names
    /// that are neither events nor hooks are ignored and `Ok(None)` is
    /// returned.
    pub fn on(&mut self, lua: &Lua, name: &str, func: LuaFunction) -> LuaResult<Option<Role>> {
        let arity = Arity::detect(lua, &func)?;

        if let Some(need) = event_max_arity(name) {
            if !arity.fits(need) {
                let got = match arity {
                    Arity::Fixed(n) => n,
                    Arity::Variadic => 0,
                };
                return Err(SubletError::WrongArity { got, need }.into_lua());
            }
            self.insert(name, arity, Role::Event, func);
            return Ok(Some(Role::Event));
        }

        if is_hook(name) {
            self.insert(name, arity, Role::Hook, func);
            return Ok(Some(Role::Hook));
        }

        debug!("Ignoring handler for unknown event '{}'", name);
        Ok(None)
    }

    /// Install a function defined directly by the script.
    ///
    /// Event and hook names become handlers without an arity check; any
    /// other name becomes a helper.
    pub fn define(&mut self, lua: &Lua, name: &str, func: LuaFunction) -> LuaResult<Role> {
        let arity = Arity::detect(lua, &func)?;
        let role = Role::for_name(name);
        self.insert(name, arity, role, func);
        Ok(role)
    }

    fn insert(&mut self, name: &str, arity: Arity, role: Role, callback: LuaFunction) {
        debug!("Installed {:?} capability '{}' (arity {})", role, name, arity);
        self.entries.insert(
            name.to_string(),
            Capability {
                name: name.to_string(),
                arity,
                role,
                callback,
            },
        );
    }

    pub fn set_configure(&mut self, func: LuaFunction) {
        self.configure = Some(func);
    }

    pub fn configure(&self) -> Option<LuaFunction> {
        self.configure.clone()
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    pub fn responds_to(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// List capabilities: events in [`SUBLET_EVENTS`] order, then hooks in
    /// [`SUBLET_HOOKS`] order, then helpers in the order they were defined.
    pub fn discover(&self) -> Vec<CapabilityEntry> {
        let events = SUBLET_EVENTS.iter().map(|(name, _)| *name);
        let hooks = SUBLET_HOOKS.iter().copied();

        let mut found: Vec<CapabilityEntry> = events
            .chain(hooks)
            .filter_map(|name| self.entries.get(name))
            .filter(|cap| cap.role != Role::Helper)
            .map(|cap| CapabilityEntry {
                name: cap.name.clone(),
                arity: cap.arity,
                helper: false,
            })
            .collect();

        found.extend(
            self.entries
                .values()
                .filter(|cap| cap.role == Role::Helper)
                .map(|cap| CapabilityEntry {
                    name: cap.name.clone(),
                    arity: cap.arity,
                    helper: true,
                }),
        );

        found
    }
}
