//! # Script Engine
//!
//! One Lua interpreter for the whole process, behind one lock.
//!
//! ```text
//! render thread ──┐
//!                 ├──► Mutex<Lua> ──► namespace "node_a" { draw, touch, ... }
//! other thread  ──┘                   namespace "node_b" { ... }
//!                                     poflua.functions (copied into each)
//!                                     topd / drawconfig / getfile / pof.*
//! ```
//!
//! Every logical operation (a load, a hook call, a dispatched call) holds the
//! lock from start to finish. Primitives run *inside* that critical section,
//! so they must never lock the engine again; they only touch the host side
//! (directory, outbox, registry, catalogs), which has its own locks.

use std::sync::Arc;

use mlua::{Lua, Table, UserData, UserDataFields, Value, Variadic};
use parking_lot::Mutex;
use pof_core::{FontInfo, FramebufferInfo, PixelFormat, TextureInfo};

use crate::error::ScriptResult;
use crate::event::ScriptArg;
use crate::host::{HostMessage, ScriptHost};

/// Lua run once at engine start. Defines the member functions every
/// namespace receives.
const PRELUDE: &str = r"
poflua = { functions = {} }
local F = poflua.functions

function F:out(...) topd(self.pdself, 'out', ...) end
function F:send(...) topd(self.pdself, 'send', ...) end
function F:touchconfig(...) topd(self.pdself, 'touchconfig', ...) end
function F:drawconfig(...) drawconfig(self.pdself, ...) end
function F:addreceive(name) topd(self.pdself, 'receive', name) end
function F:getfile(...) return getfile(self.pdself, ...) end
function F:print(...) topd(self.pdself, 'print', ...) end

function F:gettexture(name) return pof.textures_get(self:getsym(name) or '_') end
function F:getfbo(name) return pof.fbo_get(self:getsym(name) or '_') end
function F:getfont(name) return pof.fonts_get(self:getsym(name) or '_') end
";

/// Prepended to every node chunk. Kept on one line so error line numbers
/// match the script file.
pub(crate) const CHUNK_HEADER: &str =
    "local M = ...; local function print(...) topd(M.pdself, 'print', ...) end; ";

/// Framebuffer snapshot handed to scripts by `pof.fbo_get`.
#[derive(Clone, Debug)]
pub struct FramebufferRef(pub FramebufferInfo);

impl UserData for FramebufferRef {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |_, this| Ok(this.0.name.clone()));
        fields.add_field_method_get("width", |_, this| Ok(this.0.width));
        fields.add_field_method_get("height", |_, this| Ok(this.0.height));
        fields.add_field_method_get("format", |_, this| Ok(this.0.format.name()));
        fields.add_field_method_get("samples", |_, this| Ok(this.0.samples));
        fields.add_field_method_get("id", |_, this| Ok(this.0.object.to_string()));
    }
}

/// Texture snapshot handed to scripts by `pof.textures_get`.
#[derive(Clone, Debug)]
pub struct TextureRef(pub TextureInfo);

impl UserData for TextureRef {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("width", |_, this| Ok(this.0.width));
        fields.add_field_method_get("height", |_, this| Ok(this.0.height));
        fields.add_field_method_get("id", |_, this| Ok(this.0.object.to_string()));
    }
}

/// Font snapshot handed to scripts by `pof.fonts_get`.
#[derive(Clone, Debug)]
pub struct FontRef(pub FontInfo);

impl UserData for FontRef {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("path", |_, this| Ok(this.0.path.to_string_lossy().into_owned()));
        fields.add_field_method_get("size", |_, this| Ok(this.0.size));
    }
}

/// The shared interpreter.
pub struct ScriptEngine {
    lua: Mutex<Lua>,
    host: ScriptHost,
}

impl ScriptEngine {
    /// Creates the interpreter, installs host primitives and runs the
    /// prelude.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Interpreter`](crate::ScriptError::Interpreter) if any
    /// primitive cannot be registered.
    pub fn new(host: ScriptHost) -> ScriptResult<Self> {
        let lua = Lua::new();
        install_primitives(&lua, &host)?;
        lua.load(PRELUDE).set_name("=poflua").exec()?;
        tracing::debug!("script engine ready");

        Ok(Self {
            lua: Mutex::new(lua),
            host,
        })
    }

    /// Host side shared with the primitives.
    #[must_use]
    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    /// Runs `f` with exclusive access to the interpreter.
    ///
    /// Blocks until the lock is free. `f` must not call back into the engine.
    pub fn with_lock<R>(&self, f: impl FnOnce(&Lua) -> R) -> R {
        let lua = self.lua.lock();
        f(&lua)
    }

    /// Evaluates `code` at global scope.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Interpreter`](crate::ScriptError::Interpreter) with the
    /// interpreter message.
    pub fn exec(&self, code: &str) -> ScriptResult<()> {
        self.with_lock(|lua| lua.load(code).set_name("=exec").exec())?;
        Ok(())
    }

    /// Whether a node may use `name` as its namespace: the global is unset
    /// or already holds that node's namespace. Primitives, the prelude and
    /// standard libraries are never available.
    #[must_use]
    pub fn namespace_available(&self, name: &str) -> bool {
        self.with_lock(|lua| owns_global(lua, name).unwrap_or(false))
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine").finish_non_exhaustive()
    }
}

/// Returns the namespace table for `name`, creating it (or a fresh one when
/// `reset`), and copies the prelude member functions into it.
pub(crate) fn prepare_namespace(lua: &Lua, name: &str, reset: bool) -> mlua::Result<Table> {
    if !owns_global(lua, name)? {
        return Err(mlua::Error::runtime(format!("global '{name}' is not a node namespace")));
    }
    let globals = lua.globals();
    let existing = if reset {
        None
    } else {
        globals.get::<Option<Table>>(name)?
    };
    let namespace = match existing {
        Some(table) => table,
        None => {
            let table = lua.create_table()?;
            globals.set(name, table.clone())?;
            table
        }
    };

    namespace.set("pdself", name)?;
    let functions: Table = globals.get::<Table>("poflua")?.get("functions")?;
    for pair in functions.pairs::<Value, Value>() {
        let (key, value) = pair?;
        namespace.set(key, value)?;
    }
    Ok(namespace)
}

/// Whether global `name` is unset or a namespace table whose `pdself` is
/// `name`.
pub(crate) fn owns_global(lua: &Lua, name: &str) -> mlua::Result<bool> {
    match lua.globals().get::<Value>(name)? {
        Value::Nil => Ok(true),
        Value::Table(table) => Ok(matches!(
            table.raw_get::<Value>("pdself")?,
            Value::String(s) if s.to_string_lossy() == name
        )),
        _ => Ok(false),
    }
}

fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_string_lossy()),
        _ => None,
    }
}

fn install_primitives(lua: &Lua, host: &ScriptHost) -> mlua::Result<()> {
    let globals = lua.globals();

    let outbox = host.outbox.clone();
    let topd = lua.create_function(move |_, values: Variadic<Value>| {
        if !matches!(values.first(), Some(Value::String(_))) {
            return Ok(());
        }
        let mut args = values.iter().filter_map(ScriptArg::from_value);
        let (Some(ScriptArg::Text(node)), Some(ScriptArg::Text(selector))) = (args.next(), args.next()) else {
            return Ok(());
        };
        outbox.post(HostMessage {
            node,
            selector,
            args: args.collect(),
        });
        Ok(())
    })?;
    globals.set("topd", topd)?;

    let directory = Arc::clone(&host.directory);
    let drawconfig = lua.create_function(move |_, (node, command, flag): (Value, Value, Value)| {
        let (Some(node), Some(command)) = (text(&node), text(&command)) else {
            return Ok(());
        };
        let Some(entry) = directory.get(&node) else {
            return Ok(());
        };
        match command.as_str() {
            "do" => entry.flags.request_redraw(),
            "force" => entry.flags.request_force(),
            "continuousForce" => entry.flags.set_continuous_force(truthy(&flag)),
            other => tracing::debug!(node, command = other, "unknown drawconfig command"),
        }
        Ok(())
    })?;
    globals.set("drawconfig", drawconfig)?;

    let directory = Arc::clone(&host.directory);
    let getfile = lua.create_function(move |_, (node, file): (Value, Value)| {
        let (Some(node), Some(file)) = (text(&node), text(&file)) else {
            return Ok(None);
        };
        let Some(entry) = directory.get(&node) else {
            return Ok(None);
        };
        match entry.search.resolve(&file) {
            Some(path) => Ok(Some(path.to_string_lossy().into_owned())),
            None => {
                tracing::warn!(node, file, "getfile: can't open");
                Ok(None)
            }
        }
    })?;
    globals.set("getfile", getfile)?;

    let pof = lua.create_table()?;

    let (exchange, registry) = (Arc::clone(&host.exchange), host.registry.clone());
    pof.set(
        "textures_get",
        lua.create_function(move |_, address: Value| {
            Ok(text(&address)
                .and_then(|a| exchange.resolve_texture(registry.textures(), &a))
                .map(TextureRef))
        })?,
    )?;

    let (exchange, registry) = (Arc::clone(&host.exchange), host.registry.clone());
    pof.set(
        "fbo_get",
        lua.create_function(move |_, address: Value| {
            Ok(text(&address)
                .and_then(|a| exchange.resolve_framebuffer(&registry, &a))
                .map(FramebufferRef))
        })?,
    )?;

    let (exchange, fonts) = (Arc::clone(&host.exchange), Arc::clone(&host.fonts));
    pof.set(
        "fonts_get",
        lua.create_function(move |_, address: Value| {
            Ok(text(&address)
                .and_then(|a| exchange.resolve_font(&fonts, &a))
                .map(FontRef))
        })?,
    )?;

    pof.set("formats", {
        let formats = lua.create_table()?;
        for format in [PixelFormat::Rgb, PixelFormat::Rgba, PixelFormat::Rgba16] {
            formats.push(format.name())?;
        }
        formats
    })?;

    globals.set("pof", pof)?;
    globals.set("FORCE_DRAW", false)?;
    Ok(())
}
