//! Script node: one Lua namespace, its event queue and its touch routing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pof_script::{
    AsyncEventQueue, CallKind, EventSender, NodeDirectory, NodeEntry, NodeFlags, ScriptArg, ScriptBridge,
    ScriptEngine, ScriptResult, ScriptSource, SearchPath, TouchConfig,
};

use super::{flag, number};
use crate::config::ScriptNodeConfig;

static PRIVATE_NAMES: AtomicUsize = AtomicUsize::new(0);

/// Attribute message accepted by a [`ScriptNode`].
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptAttribute {
    /// `reload` / `reset`: re-read the script, `reset` also clears the
    /// namespace.
    Reload {
        /// Discard the namespace table.
        reset: bool,
    },
    /// `lua code...`: evaluate right away.
    Eval(String),
    /// `bang`: request one redraw.
    Bang,
    /// `force`: force the next redraw.
    Force,
    /// `continuousForce 0|1`
    ContinuousForce(bool),
    /// `f|m|g function args...`: queue a call.
    Call {
        /// Lookup rule.
        kind: CallKind,
        /// Function name.
        function: String,
        /// Arguments.
        args: Vec<ScriptArg>,
    },
    /// `name new`: move to another namespace.
    Rename(String),
}

impl ScriptAttribute {
    /// Parses `selector args...`. Unknown selectors and malformed
    /// arguments give `None`.
    #[must_use]
    pub fn from_message(selector: &str, args: &[ScriptArg]) -> Option<Self> {
        if let Some(kind) = CallKind::from_selector(selector) {
            let (function, rest) = args.split_first()?;
            return Some(Self::Call {
                kind,
                function: function.as_text()?.to_owned(),
                args: rest.to_vec(),
            });
        }

        let attribute = match selector {
            "reload" => Self::Reload {
                reset: number(args, 0).is_some_and(|n| n != 0.0),
            },
            "reset" => Self::Reload { reset: true },
            "lua" => Self::Eval(args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")),
            "bang" => Self::Bang,
            "force" => Self::Force,
            "continuousForce" => Self::ContinuousForce(flag(args, 0)?),
            "name" => Self::Rename(args.first()?.as_text()?.to_owned()),
            _ => return None,
        };
        Some(attribute)
    }
}

/// Scene node driving one script namespace.
///
/// The node registers itself in the [`NodeDirectory`] on creation and
/// unregisters (dropping its receivers) when dropped.
#[derive(Debug)]
pub struct ScriptNode {
    bridge: ScriptBridge,
    queue: AsyncEventQueue,
    flags: Arc<NodeFlags>,
    touch: Arc<Mutex<TouchConfig>>,
    directory: Arc<NodeDirectory>,
    touches: HashSet<i64>,
}

impl ScriptNode {
    /// Creates and registers the node. A missing, empty or taken name is
    /// replaced by a private one. The first draw loads the script.
    #[must_use]
    pub fn new(engine: &Arc<ScriptEngine>, config: &ScriptNodeConfig, search: SearchPath) -> Self {
        let directory = Arc::clone(&engine.host().directory);
        let flags = Arc::new(NodeFlags::default());
        let queue = AsyncEventQueue::new(Arc::clone(&flags));
        let touch = Arc::new(Mutex::new(TouchConfig::default()));
        let entry = NodeEntry {
            flags: Arc::clone(&flags),
            events: queue.sender(),
            search: search.clone(),
            touch: Arc::clone(&touch),
        };

        // a name is taken by another node or by any non-namespace global
        let claim = |name: &str| engine.namespace_available(name) && directory.register(name, entry.clone());
        let requested = config.name.as_deref().filter(|name| !name.is_empty());
        let name = match requested {
            Some(name) if claim(name) => name.to_owned(),
            _ => {
                if let Some(name) = requested {
                    tracing::warn!(name, "script name taken, using a private one");
                }
                loop {
                    let candidate = format!("poflua{}", PRIVATE_NAMES.fetch_add(1, Ordering::Relaxed));
                    if claim(&candidate) {
                        break candidate;
                    }
                }
            }
        };

        let source = ScriptSource {
            file: config.file.clone(),
            inline: config.code.clone(),
        };
        let bridge = ScriptBridge::new(Arc::clone(engine), &name, source, search);
        flags.request_redraw();

        Self {
            bridge,
            queue,
            flags,
            touch,
            directory,
            touches: HashSet::new(),
        }
    }

    /// Namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.bridge.name()
    }

    /// The node's bridge.
    #[must_use]
    pub fn bridge(&self) -> &ScriptBridge {
        &self.bridge
    }

    /// Redraw flags shared with the scheduler.
    #[must_use]
    pub fn flags(&self) -> &Arc<NodeFlags> {
        &self.flags
    }

    /// Current touch routing.
    #[must_use]
    pub fn touch_config(&self) -> TouchConfig {
        *self.touch.lock()
    }

    /// Producer handle for other threads.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.queue.sender()
    }

    /// Number of events waiting for the next draw.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Whether the scheduler should draw this node this frame.
    #[must_use]
    pub fn needs_draw(&self) -> bool {
        self.flags.is_triggered() || self.flags.continuous_force() || !self.bridge.is_loaded()
    }

    /// Queues a call from any thread. Raises the trigger.
    pub fn send_async(&self, kind: CallKind, function: &str, args: Vec<ScriptArg>) -> bool {
        self.queue.sender().call(kind, function, args)
    }

    /// Render-thread frame step: loads if needed, applies queued events in
    /// order, then runs `draw` with the force flag.
    ///
    /// # Errors
    ///
    /// The load or `draw` failure, already logged. Queued calls that fail
    /// are logged and skipped.
    pub fn draw(&mut self) -> ScriptResult<()> {
        let force = self.flags.take_force() || self.flags.continuous_force();
        self.flags.take_trigger();

        let loaded = if self.bridge.is_loaded() {
            Ok(())
        } else {
            self.bridge.load()
        };
        for event in self.queue.drain() {
            // failures are logged by the bridge
            let _ = self.bridge.apply_event(event);
        }
        loaded?;

        self.bridge.call_draw(force)
    }

    /// Routes a touch press. Returns whether the touch is captured.
    pub fn touch_down(&mut self, x: f32, y: f32, id: i64) -> bool {
        let config = self.touch_config();
        if !self.bridge.has_touch() || !config.contains(x, y) {
            return false;
        }
        if !config.multi && !self.touches.is_empty() {
            return false;
        }

        self.touches.insert(id);
        let _ = self.bridge.call_touch("down", x, y, id as f32);
        config.capture
    }

    /// Routes a touch move for a touch this node accepted.
    pub fn touch_moved(&mut self, x: f32, y: f32, id: i64) {
        if !self.touches.contains(&id) {
            return;
        }
        let config = self.touch_config();
        if !config.dynamic && !config.contains(x, y) {
            return;
        }
        let _ = self.bridge.call_touch("moved", x, y, id as f32);
    }

    /// Routes a touch release and forgets the touch.
    pub fn touch_up(&mut self, x: f32, y: f32, id: i64) {
        if self.touches.remove(&id) {
            let _ = self.bridge.call_touch("up", x, y, id as f32);
        }
    }

    /// Applies an attribute message.
    ///
    /// # Errors
    ///
    /// Only [`ScriptAttribute::Eval`] can fail, with the interpreter
    /// message.
    pub fn apply(&mut self, attribute: ScriptAttribute) -> ScriptResult<()> {
        match attribute {
            ScriptAttribute::Reload { reset } => {
                self.directory.clear_receivers(self.bridge.name());
                self.bridge.reload(reset);
                self.flags.request_redraw();
            }
            ScriptAttribute::Eval(code) => self.bridge.eval(&code)?,
            ScriptAttribute::Bang => self.flags.request_redraw(),
            ScriptAttribute::Force => {
                self.flags.request_force();
                self.flags.request_redraw();
            }
            ScriptAttribute::ContinuousForce(on) => {
                self.flags.set_continuous_force(on);
                self.flags.request_redraw();
            }
            ScriptAttribute::Call { kind, function, args } => {
                self.send_async(kind, &function, args);
            }
            ScriptAttribute::Rename(name) => {
                if !self.bridge.engine().namespace_available(&name) {
                    tracing::warn!(node = self.bridge.name(), name, "rename refused, name is a global");
                } else if self.directory.rename(self.bridge.name(), &name) {
                    self.bridge.rebind(&name);
                    self.flags.request_redraw();
                } else if name != self.bridge.name() {
                    tracing::warn!(node = self.bridge.name(), name, "rename refused, name taken");
                }
            }
        }
        Ok(())
    }
}

impl Drop for ScriptNode {
    fn drop(&mut self) {
        self.directory.unregister(self.bridge.name());
    }
}
