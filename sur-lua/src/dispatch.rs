//! Argument construction for invoking sublet capabilities.
//!
//! Sublet handlers come with different signatures: a file-watch trigger
//! takes nothing, a mouse click takes coordinates and a button, a hook just
//! takes the sublet. The calling convention is picked from the handler's
//! declared arity, not from its name.

use std::collections::HashMap;

use mlua::prelude::*;

use crate::capabilities::Arity;

/// Synthetic pointer position passed to four-argument handlers.
pub const MOUSE_X: i64 = 5;
pub const MOUSE_Y: i64 = 5;
/// Synthetic button passed to four-argument handlers.
pub const MOUSE_BUTTON: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentPolicy {
    /// `(sublet, dummy)`
    SubletAndDummy,
    /// `(sublet, x, y, button)`
    MouseClick,
    /// `()`
    Nothing,
    /// `(sublet)`
    SubletOnly,
}

impl ArgumentPolicy {
    pub fn for_arity(arity: Arity) -> Self {
        match arity {
            Arity::Fixed(2) => ArgumentPolicy::SubletAndDummy,
            Arity::Fixed(4) => ArgumentPolicy::MouseClick,
            Arity::Fixed(0) => ArgumentPolicy::Nothing,
            _ => ArgumentPolicy::SubletOnly,
        }
    }

    pub fn build(
        self,
        lua: &Lua,
        sublet: &LuaAnyUserData,
        dummy: &LuaAnyUserData,
    ) -> LuaResult<LuaMultiValue> {
        let sublet = LuaValue::UserData(sublet.clone());
        match self {
            ArgumentPolicy::SubletAndDummy => {
                (sublet, LuaValue::UserData(dummy.clone())).into_lua_multi(lua)
            }
            ArgumentPolicy::MouseClick => {
                (sublet, MOUSE_X, MOUSE_Y, MOUSE_BUTTON).into_lua_multi(lua)
            }
            ArgumentPolicy::Nothing => Ok(LuaMultiValue::new()),
            ArgumentPolicy::SubletOnly => sublet.into_lua_multi(lua),
        }
    }
}

/// Permissive stand-in for collaborators the harness cannot provide.
///
/// Every field write is kept; reading a field that was never written yields
/// the dummy itself, and so does calling it.
#[derive(Debug, Default)]
pub struct Dummy {
    fields: HashMap<String, LuaValue>,
}

impl Dummy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LuaUserData for Dummy {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_function(
            LuaMetaMethod::Index,
            |_, (ud, key): (LuaAnyUserData, LuaValue)| {
                let stored = match &key {
                    LuaValue::String(key) => {
                        let key = key.to_string_lossy().to_string();
                        ud.borrow::<Dummy>()?.fields.get(&key).cloned()
                    }
                    _ => None,
                };
                Ok(stored.unwrap_or(LuaValue::UserData(ud)))
            },
        );

        methods.add_meta_method_mut(
            LuaMetaMethod::NewIndex,
            |_, this, (key, value): (String, LuaValue)| {
                this.fields.insert(key, value);
                Ok(())
            },
        );

        methods.add_meta_function(
            LuaMetaMethod::Call,
            |_, (ud, _args): (LuaAnyUserData, LuaMultiValue)| Ok(ud),
        );

        methods.add_meta_method(LuaMetaMethod::ToString, |_, _, ()| Ok("dummy"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table() {
        assert_eq!(
            ArgumentPolicy::for_arity(Arity::Fixed(2)),
            ArgumentPolicy::SubletAndDummy
        );
        assert_eq!(
            ArgumentPolicy::for_arity(Arity::Fixed(4)),
            ArgumentPolicy::MouseClick
        );
        assert_eq!(
            ArgumentPolicy::for_arity(Arity::Fixed(0)),
            ArgumentPolicy::Nothing
        );
        assert_eq!(
            ArgumentPolicy::for_arity(Arity::Fixed(1)),
            ArgumentPolicy::SubletOnly
        );
        assert_eq!(
            ArgumentPolicy::for_arity(Arity::Fixed(3)),
            ArgumentPolicy::SubletOnly
        );
        assert_eq!(
            ArgumentPolicy::for_arity(Arity::Variadic),
            ArgumentPolicy::SubletOnly
        );
    }

    #[test]
    fn dummy_reads_back_writes() {
        let lua = Lua::new();
        lua.globals()
            .set("dummy", lua.create_userdata(Dummy::new()).unwrap())
            .unwrap();

        let (stored, chained): (String, bool) = lua
            .load(
                r#"
                dummy.title = "xterm"
                return dummy.title, dummy.anything.goes == dummy
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(stored, "xterm");
        assert!(chained);
    }

    #[test]
    fn dummy_is_callable() {
        let lua = Lua::new();
        lua.globals()
            .set("dummy", lua.create_userdata(Dummy::new()).unwrap())
            .unwrap();

        let same: bool = lua.load("return dummy:focus() == dummy").eval().unwrap();
        assert!(same);
    }

    #[test]
    fn mouse_click_arguments() {
        let lua = Lua::new();
        let sublet = lua.create_userdata(Dummy::new()).unwrap();
        let dummy = lua.create_userdata(Dummy::new()).unwrap();

        let args = ArgumentPolicy::MouseClick
            .build(&lua, &sublet, &dummy)
            .unwrap();
        let values: Vec<LuaValue> = args.into_iter().collect();
        assert_eq!(values.len(), 4);
        assert_eq!(i64::from_lua(values[1].clone(), &lua).unwrap(), MOUSE_X);
        assert_eq!(i64::from_lua(values[2].clone(), &lua).unwrap(), MOUSE_Y);
        assert_eq!(i64::from_lua(values[3].clone(), &lua).unwrap(), MOUSE_BUTTON);
    }

    #[test]
    fn nothing_builds_no_arguments() {
        let lua = Lua::new();
        let sublet = lua.create_userdata(Dummy::new()).unwrap();
        let dummy = lua.create_userdata(Dummy::new()).unwrap();

        let args = ArgumentPolicy::Nothing.build(&lua, &sublet, &dummy).unwrap();
        assert!(args.is_empty());
    }
}
