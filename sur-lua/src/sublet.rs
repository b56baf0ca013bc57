//! Sublet descriptor.
//!
//! Holds the well-known sublet fields with typed setters plus an ordered
//! attribute map for every other identifier a script writes.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use mlua::prelude::*;

use crate::failure::SubletError;

/// Interval used when a sublet sets none or a non-positive one.
pub const DEFAULT_INTERVAL: i64 = 60;

/// Rectangle reported by `geometry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    /// Fixed stand-in, the harness has no panel to measure.
    pub const SYNTHETIC: Geometry = Geometry {
        x: 10,
        y: 10,
        width: 20,
        height: 20,
    };

    pub fn to_lua_table(self, lua: &Lua) -> LuaResult<LuaTable> {
        let table = lua.create_table()?;
        table.set("x", self.x)?;
        table.set("y", self.y)?;
        table.set("width", self.width)?;
        table.set("height", self.height)?;
        Ok(table)
    }
}

#[derive(Debug, Clone)]
pub struct Sublet {
    name: String,
    interval: i64,
    data: Option<String>,
    background: Option<String>,
    foreground: Option<String>,
    path: Option<PathBuf>,
    visible: bool,
    attributes: IndexMap<String, LuaValue>,
}

impl Sublet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: DEFAULT_INTERVAL,
            data: None,
            background: None,
            foreground: None,
            path: None,
            visible: true,
            attributes: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Set the interval from a script value. Only integral numbers are accepted.
    pub fn set_interval(&mut self, value: &LuaValue) -> Result<(), SubletError> {
        self.interval = match value {
            LuaValue::Integer(n) => (*n).into(),
            LuaValue::Number(n) if n.fract() == 0.0 && n.is_finite() => *n as i64,
            _ => return Err(SubletError::UnknownValueType),
        };
        Ok(())
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn set_data(&mut self, value: &LuaValue) -> Result<(), SubletError> {
        match value {
            LuaValue::String(s) => {
                self.data = Some(s.to_string_lossy().to_string());
                Ok(())
            }
            _ => Err(SubletError::UnknownValueType),
        }
    }

    pub fn background(&self) -> Option<&str> {
        self.background.as_deref()
    }

    /// Any value is accepted; strings and numbers are kept as the color spec.
    pub fn set_background(&mut self, value: &LuaValue) {
        if let Some(color) = color_spec(value) {
            self.background = Some(color);
        }
    }

    pub fn foreground(&self) -> Option<&str> {
        self.foreground.as_deref()
    }

    pub fn set_foreground(&mut self, value: &LuaValue) {
        if let Some(color) = color_spec(value) {
            self.foreground = Some(color);
        }
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::SYNTHETIC
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Watch a file. The path is only recorded when the file exists.
    pub fn watch(&mut self, value: &LuaValue) -> Result<(), SubletError> {
        let LuaValue::String(path) = value else {
            return Err(SubletError::UnknownValueType);
        };
        let path = path.to_string_lossy().to_string();
        if !Path::new(&path).exists() {
            return Err(SubletError::FileNotFound { path });
        }

        debug!("Sublet '{}' watches {}", self.name, path);
        self.path = Some(PathBuf::from(path));
        Ok(())
    }

    pub fn unwatch(&mut self) {
        self.path = None;
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_hidden(&self) -> bool {
        !self.visible
    }

    /// Read an ad-hoc attribute, `Nil` if it was never written.
    pub fn attribute(&self, name: &str) -> LuaValue {
        self.attributes.get(name).cloned().unwrap_or(LuaValue::Nil)
    }

    /// Write an ad-hoc attribute. Writing `nil` removes it.
    pub fn set_attribute(&mut self, name: &str, value: LuaValue) {
        if value.is_nil() {
            self.attributes.shift_remove(name);
        } else {
            self.attributes.insert(name.to_string(), value);
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Force the interval positive.
    pub fn normalize(&mut self) {
        if self.interval <= 0 {
            debug!(
                "Sublet '{}' has interval {}, using {}",
                self.name, self.interval, DEFAULT_INTERVAL
            );
            self.interval = DEFAULT_INTERVAL;
        }
    }

    /// Currently set attributes as `(name, rendered value)` pairs.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut out = vec![("interval".to_string(), self.interval.to_string())];

        if let Some(data) = &self.data {
            out.push(("data".to_string(), data.clone()));
        }
        if let Some(bg) = &self.background {
            out.push(("background".to_string(), bg.clone()));
        }
        if let Some(fg) = &self.foreground {
            out.push(("foreground".to_string(), fg.clone()));
        }
        if let Some(path) = &self.path {
            out.push(("path".to_string(), path.display().to_string()));
        }
        out.push(("visible".to_string(), self.visible.to_string()));

        out.extend(
            self.attributes
                .iter()
                .map(|(name, value)| (name.clone(), render_value(value))),
        );
        out
    }
}

fn color_spec(value: &LuaValue) -> Option<String> {
    match value {
        LuaValue::String(s) => Some(s.to_string_lossy().to_string()),
        LuaValue::Integer(_) | LuaValue::Number(_) => Some(render_value(value)),
        _ => None,
    }
}

/// Render a Lua value the way the attribute dump shows it.
pub fn render_value(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => String::new(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(n) => n.to_string(),
        LuaValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        LuaValue::Number(n) => n.to_string(),
        LuaValue::String(s) => s.to_string_lossy().to_string(),
        other => format!("{}: {:p}", other.type_name(), other.to_pointer()),
    }
}
