//! Luau vocabulary available to sublet scripts.
//!
//! A sublet script runs in its own environment table bound to one sublet.
//! Global reads and writes in that environment resolve, in order, against:
//!
//! 1. the vocabulary (`watch`, `on`, `helper`, `error`, `read_file`, ...),
//! 2. the sublet's fields (`interval`, `data`, `geometry`, ...),
//! 3. capabilities the script has defined,
//! 4. ad-hoc attributes the script has written,
//! 5. the standard library globals.
//!
//! Handlers receive the sublet as a userdata exposing the same vocabulary
//! as methods (`s:watch(path)`) and the same fields (`s.data = "x"`).
//!
//! ```lua
//! interval = 30
//!
//! configure("temp", function(s)
//!     s.zone = "THRM"
//! end)
//!
//! on("mouse_down", function(s, x, y, button)
//!     s.data = "clicked"
//! end)
//!
//! helper(function(s)
//!     function s:celsius(raw)
//!         return raw // 1000
//!     end
//! end)
//!
//! function run()
//!     data = read_file("/proc/acpi/thermal_zone/THRM/temperature") or "n/a"
//! end
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use log::debug;
use mlua::prelude::*;

use crate::capabilities::Capabilities;
use crate::failure::SubletError;
use crate::fs_utils;
use crate::sublet::Sublet;

/// Functions every sublet scope provides, besides the file helpers.
pub const VOCABULARY: [&str; 8] = [
    "watch",
    "unwatch",
    "show",
    "hide",
    "hidden",
    "configure",
    "on",
    "helper",
];

/// Shared handle to one sublet and its capabilities.
#[derive(Clone)]
pub struct SubletHandle {
    sublet: Rc<RefCell<Sublet>>,
    capabilities: Rc<RefCell<Capabilities>>,
}

impl SubletHandle {
    pub fn new(sublet: Sublet) -> Self {
        Self {
            sublet: Rc::new(RefCell::new(sublet)),
            capabilities: Rc::new(RefCell::new(Capabilities::new())),
        }
    }

    pub fn sublet(&self) -> Ref<'_, Sublet> {
        self.sublet.borrow()
    }

    pub fn sublet_mut(&self) -> RefMut<'_, Sublet> {
        self.sublet.borrow_mut()
    }

    pub fn capabilities(&self) -> Ref<'_, Capabilities> {
        self.capabilities.borrow()
    }

    /// Resolve `name` against fields, capabilities and attributes.
    ///
    /// Returns `None` when the sublet knows nothing under that name.
    pub fn lookup(&self, lua: &Lua, name: &str) -> LuaResult<Option<LuaValue>> {
        let sublet = self.sublet.borrow();
        let value = match name {
            "name" => sublet.name().into_lua(lua)?,
            "interval" => sublet.interval().into_lua(lua)?,
            "data" => sublet.data().into_lua(lua)?,
            "background" => sublet.background().into_lua(lua)?,
            "foreground" => sublet.foreground().into_lua(lua)?,
            "path" => sublet
                .path()
                .map(|p| p.display().to_string())
                .into_lua(lua)?,
            "visible" => LuaValue::Boolean(!sublet.is_hidden()),
            "geometry" => LuaValue::Table(sublet.geometry().to_lua_table(lua)?),
            _ => {
                if let Some(cap) = self.capabilities.borrow().get(name) {
                    return Ok(Some(LuaValue::Function(cap.callback.clone())));
                }
                if sublet.has_attribute(name) {
                    return Ok(Some(sublet.attribute(name)));
                }
                return Ok(None);
            }
        };
        Ok(Some(value))
    }

    /// Write `value` under `name`.
    ///
    /// Known fields go through their validating setters, functions become
    /// capabilities and everything else is stored as an attribute.
    pub fn assign(&self, lua: &Lua, name: &str, value: LuaValue) -> LuaResult<()> {
        if name == "geometry" || VOCABULARY.contains(&name) {
            return Err(SubletError::ReadOnly(name.to_string()).into_lua());
        }

        let mut sublet = self.sublet.borrow_mut();
        match name {
            "interval" => sublet.set_interval(&value).map_err(SubletError::into_lua),
            "data" => sublet.set_data(&value).map_err(SubletError::into_lua),
            "background" => {
                sublet.set_background(&value);
                Ok(())
            }
            "foreground" => {
                sublet.set_foreground(&value);
                Ok(())
            }
            "name" => match value {
                LuaValue::String(s) => {
                    sublet.set_name(s.to_string_lossy().to_string());
                    Ok(())
                }
                _ => Err(SubletError::UnknownValueType.into_lua()),
            },
            "path" if value.is_nil() => {
                sublet.unwatch();
                Ok(())
            }
            "path" => sublet.watch(&value).map_err(SubletError::into_lua),
            "visible" => match value {
                LuaValue::Boolean(true) => {
                    sublet.show();
                    Ok(())
                }
                LuaValue::Boolean(false) => {
                    sublet.hide();
                    Ok(())
                }
                _ => Err(SubletError::UnknownValueType.into_lua()),
            },
            _ => match value {
                LuaValue::Function(func) => {
                    drop(sublet);
                    let role = self.capabilities.borrow_mut().define(lua, name, func)?;
                    debug!("Script defined {:?} '{}'", role, name);
                    Ok(())
                }
                value => {
                    sublet.set_attribute(name, value);
                    Ok(())
                }
            },
        }
    }

    pub fn watch(&self, path: &LuaValue) -> LuaResult<()> {
        self.sublet
            .borrow_mut()
            .watch(path)
            .map_err(SubletError::into_lua)
    }

    /// `configure(name, block)`: remember the block run right after loading.
    pub fn configure(&self, name: LuaValue, block: LuaValue) -> LuaResult<()> {
        let block = require_block(block)?;
        let name = symbol_name(&name)?;

        debug!("Configure block for '{}'", name);
        self.capabilities.borrow_mut().set_configure(block);
        Ok(())
    }

    /// `on(name, block)`: bind an event or hook handler.
    pub fn on(&self, lua: &Lua, name: LuaValue, block: LuaValue) -> LuaResult<()> {
        let block = require_block(block)?;
        let name = symbol_name(&name)?;

        self.capabilities.borrow_mut().on(lua, &name, block)?;
        Ok(())
    }

    /// `helper(block)`: install helper capabilities.
    ///
    /// A function block is called with the sublet and defines helpers by
    /// assigning functions onto it. A table block contributes its function
    /// fields directly.
    pub fn helper(&self, lua: &Lua, receiver: &LuaAnyUserData, block: LuaValue) -> LuaResult<()> {
        match block {
            LuaValue::Function(func) => func.call::<()>(receiver.clone()),
            LuaValue::Table(table) => {
                for pair in table.pairs::<String, LuaValue>() {
                    let (name, value) = pair?;
                    if let LuaValue::Function(func) = value {
                        self.capabilities.borrow_mut().define(lua, &name, func)?;
                    }
                }
                Ok(())
            }
            LuaValue::Nil => Err(SubletError::NoBlockGiven.into_lua()),
            _ => Err(SubletError::UnknownValueType.into_lua()),
        }
    }
}

fn require_block(block: LuaValue) -> LuaResult<LuaFunction> {
    match block {
        LuaValue::Function(func) => Ok(func),
        LuaValue::Nil => Err(SubletError::NoBlockGiven.into_lua()),
        _ => Err(SubletError::UnknownValueType.into_lua()),
    }
}

/// Names passed to `configure` and `on` must look like identifiers.
fn symbol_name(value: &LuaValue) -> LuaResult<String> {
    let LuaValue::String(name) = value else {
        return Err(SubletError::UnknownValueType.into_lua());
    };
    let name = name.to_string_lossy().to_string();

    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(SubletError::UnknownValueType.into_lua())
    }
}

impl LuaUserData for SubletHandle {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("watch", |_, this, path: LuaValue| this.watch(&path));
        methods.add_method("unwatch", |_, this, ()| {
            this.sublet_mut().unwatch();
            Ok(())
        });
        methods.add_method("show", |_, this, ()| {
            this.sublet_mut().show();
            Ok(())
        });
        methods.add_method("hide", |_, this, ()| {
            this.sublet_mut().hide();
            Ok(())
        });
        methods.add_method("hidden", |_, this, ()| Ok(this.sublet().is_hidden()));
        methods.add_method(
            "configure",
            |_, this, (name, block): (LuaValue, LuaValue)| this.configure(name, block),
        );
        methods.add_method(
            "on",
            |lua, this, (name, block): (LuaValue, LuaValue)| this.on(lua, name, block),
        );
        methods.add_function(
            "helper",
            |lua, (ud, block): (LuaAnyUserData, LuaValue)| {
                let this = ud.borrow::<SubletHandle>()?.clone();
                this.helper(lua, &ud, block)
            },
        );

        methods.add_meta_method(LuaMetaMethod::Index, |lua, this, key: String| {
            Ok(this.lookup(lua, &key)?.unwrap_or(LuaValue::Nil))
        });
        methods.add_meta_method(
            LuaMetaMethod::NewIndex,
            |lua, this, (key, value): (String, LuaValue)| this.assign(lua, &key, value),
        );
        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
            Ok(format!("sublet<{}>", this.sublet().name()))
        });
    }
}

/// Environment a sublet script is evaluated in.
pub struct SubletScope {
    pub handle: SubletHandle,
    /// The sublet as seen by Lua code; handlers receive this value.
    pub userdata: LuaAnyUserData,
    pub env: LuaTable,
}

impl SubletScope {
    pub fn new(lua: &Lua, sublet: Sublet) -> LuaResult<Self> {
        let handle = SubletHandle::new(sublet);
        let userdata = lua.create_userdata(handle.clone())?;
        let vocabulary = create_vocabulary(lua, &handle, &userdata)?;

        let env = lua.create_table()?;
        let meta = lua.create_table()?;

        let index_handle = handle.clone();
        let index_vocabulary = vocabulary.clone();
        let globals = lua.globals();
        meta.set(
            "__index",
            lua.create_function(move |lua, (_, key): (LuaTable, LuaValue)| {
                let LuaValue::String(key) = key else {
                    return Ok(LuaValue::Nil);
                };
                let key = key.to_string_lossy().to_string();

                let vocab: LuaValue = index_vocabulary.raw_get(key.as_str())?;
                if !vocab.is_nil() {
                    return Ok(vocab);
                }
                if let Some(value) = index_handle.lookup(lua, &key)? {
                    return Ok(value);
                }
                globals.get(key.as_str())
            })?,
        )?;

        let assign_handle = handle.clone();
        meta.set(
            "__newindex",
            lua.create_function(
                move |lua, (_, key, value): (LuaTable, String, LuaValue)| {
                    if vocabulary.contains_key(key.as_str())? {
                        return Err(SubletError::ReadOnly(key).into_lua());
                    }
                    assign_handle.assign(lua, &key, value)
                },
            )?,
        )?;

        let setmetatable: LuaFunction = lua.globals().get("setmetatable")?;
        setmetatable.call::<()>((env.clone(), meta))?;

        Ok(Self {
            handle,
            userdata,
            env,
        })
    }
}

fn create_vocabulary(
    lua: &Lua,
    handle: &SubletHandle,
    userdata: &LuaAnyUserData,
) -> LuaResult<LuaTable> {
    let vocab = lua.create_table()?;

    let h = handle.clone();
    vocab.set(
        "watch",
        lua.create_function(move |_, path: LuaValue| h.watch(&path))?,
    )?;

    let h = handle.clone();
    vocab.set(
        "unwatch",
        lua.create_function(move |_, ()| {
            h.sublet_mut().unwatch();
            Ok(())
        })?,
    )?;

    let h = handle.clone();
    vocab.set(
        "show",
        lua.create_function(move |_, ()| {
            h.sublet_mut().show();
            Ok(())
        })?,
    )?;

    let h = handle.clone();
    vocab.set(
        "hide",
        lua.create_function(move |_, ()| {
            h.sublet_mut().hide();
            Ok(())
        })?,
    )?;

    let h = handle.clone();
    vocab.set(
        "hidden",
        lua.create_function(move |_, ()| Ok(h.sublet().is_hidden()))?,
    )?;

    let h = handle.clone();
    vocab.set(
        "configure",
        lua.create_function(move |_, (name, block): (LuaValue, LuaValue)| {
            h.configure(name, block)
        })?,
    )?;

    let h = handle.clone();
    vocab.set(
        "on",
        lua.create_function(move |lua, (name, block): (LuaValue, LuaValue)| {
            h.on(lua, name, block)
        })?,
    )?;

    let h = handle.clone();
    let receiver = userdata.clone();
    vocab.set(
        "helper",
        lua.create_function(move |lua, block: LuaValue| h.helper(lua, &receiver, block))?,
    )?;

    // Strings become soft script failures; other values take the builtin
    // path and are reported as defects.
    let builtin_error: LuaFunction = lua.globals().get("error")?;
    vocab.set(
        "error",
        lua.create_function(move |_, (message, level): (LuaValue, LuaValue)| match message {
            LuaValue::String(msg) => {
                Err::<(), _>(SubletError::Script(msg.to_string_lossy().to_string()).into_lua())
            }
            other => builtin_error.call::<()>((other, level)),
        })?,
    )?;

    fs_utils::register(lua, &vocab)?;

    Ok(vocab)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Arity, Role};
    use crate::failure::{Failure, FailureKind};

    fn eval_in(lua: &Lua, scope: &SubletScope, code: &str) -> LuaResult<()> {
        lua.load(code)
            .set_environment(scope.env.clone())
            .exec()
    }

    fn scope(lua: &Lua) -> SubletScope {
        SubletScope::new(lua, Sublet::new("test")).unwrap()
    }

    #[test]
    fn top_level_setters() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(&lua, &scope, r##"interval = 30; data = "ok"; background = "#ffffff""##).unwrap();

        let sublet = scope.handle.sublet();
        assert_eq!(sublet.interval(), 30);
        assert_eq!(sublet.data(), Some("ok"));
        assert_eq!(sublet.background(), Some("#ffffff"));
    }

    #[test]
    fn wrong_type_for_data_fails() {
        let lua = Lua::new();
        let scope = scope(&lua);

        let err = eval_in(&lua, &scope, "data = 42").unwrap_err();
        assert!(err.to_string().contains("Unknown value type"));
    }

    #[test]
    fn unknown_identifiers_are_attributes() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(
            &lua,
            &scope,
            r#"
            zone = "THRM"
            copy = zone .. "!"
            missing_is_nil = (never_set == nil)
            "#,
        )
        .unwrap();

        let sublet = scope.handle.sublet();
        let copy: String = String::from_lua(sublet.attribute("copy"), &lua).unwrap();
        assert_eq!(copy, "THRM!");
        assert_eq!(sublet.attribute("missing_is_nil"), LuaValue::Boolean(true));
    }

    #[test]
    fn geometry_is_synthetic_and_read_only() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(&lua, &scope, "w = geometry.width").unwrap();
        let width = i64::from_lua(scope.handle.sublet().attribute("w"), &lua).unwrap();
        assert_eq!(width, 20);

        assert!(eval_in(&lua, &scope, "geometry = 1").is_err());
    }

    #[test]
    fn visibility_vocabulary() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(&lua, &scope, "hide(); was_hidden = hidden(); show()").unwrap();
        let sublet = scope.handle.sublet();
        assert!(!sublet.is_hidden());
        assert_eq!(sublet.attribute("was_hidden"), LuaValue::Boolean(true));
    }

    #[test]
    fn watch_missing_file_fails_and_keeps_path_unset() {
        let lua = Lua::new();
        let scope = scope(&lua);

        let err = eval_in(&lua, &scope, r#"watch("/definitely/not/here")"#).unwrap_err();
        assert!(err.to_string().contains("File not found"));
        assert!(scope.handle.sublet().path().is_none());
    }

    #[test]
    fn on_requires_block_and_symbol() {
        let lua = Lua::new();
        let scope = scope(&lua);

        let err = eval_in(&lua, &scope, r#"on("run")"#).unwrap_err();
        assert!(err.to_string().contains("No block given"));

        let err = eval_in(&lua, &scope, r#"on("not a symbol", function() end)"#).unwrap_err();
        assert!(err.to_string().contains("Unknown value type"));

        let err = eval_in(&lua, &scope, r#"on(42, function() end)"#).unwrap_err();
        assert!(err.to_string().contains("Unknown value type"));
    }

    #[test]
    fn on_registers_event_with_arity() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(&lua, &scope, r#"on("mouse_down", function(s, x, y, b) end)"#).unwrap();

        let caps = scope.handle.capabilities();
        let cap = caps.get("mouse_down").unwrap();
        assert_eq!(cap.arity, Arity::Fixed(4));
        assert_eq!(cap.role, Role::Event);
    }

    #[test]
    fn configure_requires_block() {
        let lua = Lua::new();
        let scope = scope(&lua);

        let err = eval_in(&lua, &scope, r#"configure("temp")"#).unwrap_err();
        assert!(err.to_string().contains("No block given"));

        eval_in(&lua, &scope, r#"configure("temp", function(s) end)"#).unwrap();
        assert!(scope.handle.capabilities().configure().is_some());
    }

    #[test]
    fn helper_function_block_defines_helpers() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(
            &lua,
            &scope,
            r#"
            helper(function(s)
                function s:celsius(raw) return raw // 1000 end
            end)
            "#,
        )
        .unwrap();

        let caps = scope.handle.capabilities();
        let cap = caps.get("celsius").unwrap();
        assert_eq!(cap.role, Role::Helper);
        assert_eq!(cap.arity, Arity::Fixed(2));
    }

    #[test]
    fn helper_table_block_defines_helpers() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(&lua, &scope, r#"helper({ refresh = function(s) end, note = "x" })"#).unwrap();

        let caps = scope.handle.capabilities();
        assert_eq!(caps.get("refresh").unwrap().role, Role::Helper);
        assert!(!caps.responds_to("note"));
    }

    #[test]
    fn helper_without_block_fails() {
        let lua = Lua::new();
        let scope = scope(&lua);

        let err = eval_in(&lua, &scope, "helper()").unwrap_err();
        assert!(err.to_string().contains("No block given"));
    }

    #[test]
    fn top_level_function_definitions() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(
            &lua,
            &scope,
            r#"
            function run() data = "x" end
            function format_temp(t) return t .. " C" end
            "#,
        )
        .unwrap();

        let caps = scope.handle.capabilities();
        assert_eq!(caps.get("run").unwrap().role, Role::Event);
        assert_eq!(caps.get("format_temp").unwrap().role, Role::Helper);
    }

    #[test]
    fn vocabulary_is_read_only() {
        let lua = Lua::new();
        let scope = scope(&lua);

        assert!(eval_in(&lua, &scope, "watch = 1").is_err());
        assert!(eval_in(&lua, &scope, "read_file = 1").is_err());
    }

    #[test]
    fn userdata_exposes_fields_and_methods() {
        let lua = Lua::new();
        let scope = scope(&lua);
        lua.globals().set("s", scope.userdata.clone()).unwrap();

        lua.load(
            r#"
            s.data = "from handler"
            s:hide()
            s.counter = 1
            s.counter = s.counter + 1
            "#,
        )
        .exec()
        .unwrap();

        let sublet = scope.handle.sublet();
        assert_eq!(sublet.data(), Some("from handler"));
        assert!(sublet.is_hidden());
        assert_eq!(i64::from_lua(sublet.attribute("counter"), &lua).unwrap(), 2);
    }

    #[test]
    fn standard_library_is_reachable() {
        let lua = Lua::new();
        let scope = scope(&lua);

        eval_in(&lua, &scope, r#"data = string.upper("abc")"#).unwrap();
        assert_eq!(scope.handle.sublet().data(), Some("ABC"));
    }

    #[test]
    fn error_with_string_is_soft() {
        let lua = Lua::new();
        let scope = scope(&lua);

        let err = eval_in(&lua, &scope, r#"error("sensor offline")"#).unwrap_err();
        let failure = Failure::from_lua(&err);
        assert_eq!(failure.kind, FailureKind::Soft);
        assert_eq!(failure.message, "sensor offline");
    }

    #[test]
    fn error_with_non_string_is_defect() {
        let lua = Lua::new();
        let scope = scope(&lua);

        for code in ["error({})", "error(42)", "local t = nil; t.x = 1", "undefined_fn()"] {
            let err = eval_in(&lua, &scope, code).unwrap_err();
            assert_eq!(Failure::from_lua(&err).kind, FailureKind::Defect, "{code}");
        }
    }
}
