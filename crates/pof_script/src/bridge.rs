//! # Script Bridge
//!
//! Per-node adapter between one Lua namespace and the shared engine.
//!
//! ## State Machine
//!
//! ```text
//!              load() ok
//! unloaded ───────────────► loaded { draw?, touch? }
//!    ▲  │ load() err (logged, retried next frame)   │
//!    │  └──────────┘                                 │
//!    └──────────── reload() / rebind() ◄─────────────┘
//! ```
//!
//! Hook presence is looked up once per load and cached. Runtime errors in
//! hooks are logged and leave the node loaded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mlua::{Function, IntoLua, Lua, MultiValue, Table, Value};
use parking_lot::Mutex;

use crate::engine::{owns_global, prepare_namespace, ScriptEngine, CHUNK_HEADER};
use crate::error::{ScriptError, ScriptResult};
use crate::event::{AsyncEvent, CallKind, ScriptArg};
use crate::host::{HostMessage, SearchPath};

/// Where a node's script comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptSource {
    /// Script file, looked up through the node's search path.
    pub file: Option<String>,
    /// Inline code, run after the file.
    pub inline: String,
}

impl ScriptSource {
    /// Inline-only source.
    #[must_use]
    pub fn inline(code: impl Into<String>) -> Self {
        Self {
            file: None,
            inline: code.into(),
        }
    }

    /// File-only source.
    #[must_use]
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            inline: String::new(),
        }
    }
}

#[derive(Clone, Debug)]
enum SymbolState {
    Requested,
    Resolved(String),
}

/// Per-bridge name → address-string table filled by the host round trip.
///
/// Shared between the bridge and the `getsym` function it installs in its
/// namespace.
#[derive(Clone, Debug, Default)]
pub struct SymbolCache {
    entries: Arc<Mutex<HashMap<String, SymbolState>>>,
}

impl SymbolCache {
    /// Returns the address for `name` once resolved.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<String> {
        match self.entries.lock().get(name) {
            Some(SymbolState::Resolved(address)) => Some(address.clone()),
            _ => None,
        }
    }

    /// Marks `name` as requested. Returns `true` the first time only.
    pub fn request(&self, name: &str) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(name) {
            return false;
        }
        entries.insert(name.to_owned(), SymbolState::Requested);
        true
    }

    /// Stores the host's answer for `name`.
    pub fn resolve(&self, name: &str, address: &str) {
        self.entries
            .lock()
            .insert(name.to_owned(), SymbolState::Resolved(address.to_owned()));
    }

    /// Forgets unanswered requests so they are sent again.
    pub fn forget_pending(&self) {
        self.entries
            .lock()
            .retain(|_, state| matches!(state, SymbolState::Resolved(_)));
    }

    /// Number of resolved names.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|state| matches!(state, SymbolState::Resolved(_)))
            .count()
    }
}

/// One node's view of the interpreter.
pub struct ScriptBridge {
    engine: Arc<ScriptEngine>,
    name: String,
    source: ScriptSource,
    search: SearchPath,
    body: String,
    loaded: bool,
    drawable: bool,
    touchable: bool,
    reset_pending: bool,
    symbols: SymbolCache,
}

impl ScriptBridge {
    /// Creates an unloaded bridge for namespace `name`. The script file is
    /// read right away; a missing file is logged and only the inline code
    /// runs.
    #[must_use]
    pub fn new(engine: Arc<ScriptEngine>, name: &str, source: ScriptSource, search: SearchPath) -> Self {
        let mut bridge = Self {
            engine,
            name: name.to_owned(),
            source,
            search,
            body: String::new(),
            loaded: false,
            drawable: false,
            touchable: false,
            reset_pending: false,
            symbols: SymbolCache::default(),
        };
        bridge.body = bridge.assemble_body();
        bridge
    }

    /// Namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the script evaluated successfully since the last reload.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether the namespace defined `draw` at load time.
    #[must_use]
    pub const fn has_draw(&self) -> bool {
        self.drawable
    }

    /// Whether the namespace defined `touch` at load time.
    #[must_use]
    pub const fn has_touch(&self) -> bool {
        self.touchable
    }

    /// The bridge's symbol table.
    #[must_use]
    pub fn symbols(&self) -> &SymbolCache {
        &self.symbols
    }

    /// The shared engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<ScriptEngine> {
        &self.engine
    }

    /// Evaluates the script into the namespace and caches hook presence.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Load`] with the interpreter message; the bridge stays
    /// unloaded so the next draw retries.
    pub fn load(&mut self) -> ScriptResult<()> {
        let reset = std::mem::take(&mut self.reset_pending);
        let chunk = format!("{CHUNK_HEADER}{}", self.body);

        let result = self.engine.with_lock(|lua| -> mlua::Result<(bool, bool)> {
            let namespace = prepare_namespace(lua, &self.name, reset)?;
            namespace.set("getsym", self.getsym_function(lua)?)?;
            lua.load(chunk.as_str())
                .set_name(format!("={}", self.name))
                .call::<()>(namespace.clone())?;
            Ok((is_function(&namespace, "draw")?, is_function(&namespace, "touch")?))
        });

        match result {
            Ok((drawable, touchable)) => {
                self.loaded = true;
                self.drawable = drawable;
                self.touchable = touchable;
                tracing::debug!(node = %self.name, drawable, touchable, "script loaded");
                Ok(())
            }
            Err(err) => {
                self.loaded = false;
                let message = err.to_string();
                tracing::error!(node = %self.name, %message, "script load failed");
                Err(ScriptError::Load {
                    node: self.name.clone(),
                    message,
                })
            }
        }
    }

    /// Loads if needed, then runs `draw` with `FORCE_DRAW` set to `force`.
    /// No-op when the namespace has no `draw`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Load`] or [`ScriptError::Call`]; both are already
    /// logged.
    pub fn call_draw(&mut self, force: bool) -> ScriptResult<()> {
        if !self.loaded {
            self.load()?;
        }
        if !self.drawable {
            return Ok(());
        }

        let result = self.engine.with_lock(|lua| -> mlua::Result<()> {
            let globals = lua.globals();
            globals.set("FORCE_DRAW", force)?;
            let namespace: Table = globals.get(self.name.as_str())?;
            let draw: Function = namespace.get("draw")?;
            draw.call::<()>(namespace)
        });
        result.map_err(|err| self.call_failed("draw", &err))
    }

    /// Runs `touch(event, a, b, c)` when the namespace defines it.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Call`], already logged.
    pub fn call_touch(&self, event: &str, a: f32, b: f32, c: f32) -> ScriptResult<()> {
        if !self.touchable {
            return Ok(());
        }

        let result = self.engine.with_lock(|lua| -> mlua::Result<()> {
            let namespace: Table = lua.globals().get(self.name.as_str())?;
            let touch: Function = namespace.get("touch")?;
            touch.call::<()>((namespace, event, a, b, c))
        });
        result.map_err(|err| self.call_failed("touch", &err))
    }

    /// Calls `function` by `kind` with `args`. Missing functions and unloaded
    /// scripts are silent no-ops.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Call`], already logged.
    pub fn dispatch(&self, kind: CallKind, function: &str, args: Vec<ScriptArg>) -> ScriptResult<()> {
        if !self.loaded {
            tracing::debug!(node = %self.name, function, "call dropped, script not loaded");
            return Ok(());
        }

        let result = self.engine.with_lock(|lua| -> mlua::Result<()> {
            let globals = lua.globals();
            let (target, namespace) = match kind {
                CallKind::Global => (globals.get::<Value>(function)?, None),
                CallKind::Function | CallKind::Method => {
                    let namespace: Table = globals.get(self.name.as_str())?;
                    (namespace.get::<Value>(function)?, Some(namespace))
                }
            };
            let Value::Function(target) = target else {
                return Ok(());
            };

            let mut values = Vec::with_capacity(args.len() + 1);
            if let (CallKind::Method, Some(namespace)) = (kind, namespace) {
                values.push(Value::Table(namespace));
            }
            for arg in args {
                values.push(arg.into_lua(lua)?);
            }
            target.call::<()>(MultiValue::from_vec(values))
        });
        result.map_err(|err| self.call_failed(function, &err))
    }

    /// Applies one queued event.
    ///
    /// # Errors
    ///
    /// Whatever [`ScriptBridge::dispatch`] returns.
    pub fn apply_event(&self, event: AsyncEvent) -> ScriptResult<()> {
        match event {
            AsyncEvent::Call { kind, function, args } => self.dispatch(kind, &function, args),
            AsyncEvent::SymbolResolved { name, address } => {
                self.symbols.resolve(&name, &address);
                Ok(())
            }
        }
    }

    /// Re-reads the script and drops back to unloaded. With `reset` the
    /// namespace table is discarded on the next load.
    pub fn reload(&mut self, reset: bool) {
        self.body = self.assemble_body();
        self.loaded = false;
        self.drawable = false;
        self.touchable = false;
        self.reset_pending = reset;
        tracing::debug!(node = %self.name, reset, "script reload requested");
    }

    /// Evaluates `code` right away with `M` bound to the namespace (nil if
    /// it does not exist yet).
    ///
    /// # Errors
    ///
    /// [`ScriptError::Load`] with the interpreter message, already logged.
    pub fn eval(&self, code: &str) -> ScriptResult<()> {
        let result = self.engine.with_lock(|lua| -> mlua::Result<()> {
            let namespace: Option<Table> = lua.globals().get(self.name.as_str())?;
            lua.load(format!("local M = ...; {code}"))
                .set_name(format!("={}", self.name))
                .call::<()>(namespace)
        });
        result.map_err(|err| {
            let message = err.to_string();
            tracing::error!(node = %self.name, %message, "eval failed");
            ScriptError::Load {
                node: self.name.clone(),
                message,
            }
        })
    }

    /// Moves the bridge to namespace `name`. The old namespace global is
    /// dropped and the bridge starts over unloaded.
    pub fn rebind(&mut self, name: &str) {
        if name == self.name {
            return;
        }
        self.remove_namespace();
        self.name = name.to_owned();
        self.loaded = false;
        self.drawable = false;
        self.touchable = false;
        self.symbols.forget_pending();
    }

    fn remove_namespace(&self) {
        // only our own table, never a global the name happens to shadow
        let result = self.engine.with_lock(|lua| {
            if owns_global(lua, &self.name)? {
                lua.globals().set(self.name.as_str(), Value::Nil)?;
            }
            Ok::<_, mlua::Error>(())
        });
        if let Err(err) = result {
            tracing::error!(node = %self.name, %err, "namespace teardown failed");
        }
    }

    fn getsym_function(&self, lua: &Lua) -> mlua::Result<Function> {
        let cache = self.symbols.clone();
        let outbox = self.engine.host().outbox.clone();
        let node = self.name.clone();
        lua.create_function(move |_, (_this, name): (Value, String)| {
            if let Some(address) = cache.lookup(&name) {
                return Ok(Some(address));
            }
            if cache.request(&name) {
                outbox.post(HostMessage {
                    node: node.clone(),
                    selector: "_getsym_".to_owned(),
                    args: vec![ScriptArg::Text(name)],
                });
            }
            Ok(None)
        })
    }

    fn call_failed(&self, function: &str, err: &mlua::Error) -> ScriptError {
        let message = err.to_string();
        tracing::error!(node = %self.name, function, %message, "script call failed");
        ScriptError::Call {
            node: self.name.clone(),
            function: function.to_owned(),
            message,
        }
    }

    fn assemble_body(&self) -> String {
        let mut body = String::new();
        if let Some(file) = &self.source.file {
            match self.read_file(file) {
                Ok(text) => {
                    body.push_str(&text);
                    body.push('\n');
                }
                Err(err) => tracing::error!(node = %self.name, %err, "script file unavailable"),
            }
        }
        body.push_str(&self.source.inline);
        body
    }

    fn read_file(&self, file: &str) -> ScriptResult<String> {
        let path = self.search.resolve(file).ok_or_else(|| ScriptError::NotFound {
            file: file.to_owned(),
        })?;
        std::fs::read_to_string(&path).map_err(|source| ScriptError::Io { path, source })
    }
}

impl Drop for ScriptBridge {
    fn drop(&mut self) {
        self.remove_namespace();
    }
}

impl fmt::Debug for ScriptBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptBridge")
            .field("name", &self.name)
            .field("loaded", &self.loaded)
            .field("drawable", &self.drawable)
            .field("touchable", &self.touchable)
            .finish_non_exhaustive()
    }
}

fn is_function(namespace: &Table, key: &str) -> mlua::Result<bool> {
    Ok(matches!(namespace.get::<Value>(key)?, Value::Function(_)))
}
