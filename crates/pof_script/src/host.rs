//! # Host Plumbing
//!
//! What script primitives need from the host, gathered in one place so the
//! engine can capture it without reaching for globals:
//!
//! - [`NodeDirectory`]: script node name → flags, queue, search path, touch
//!   config, plus receiver bindings
//! - [`Outbox`]: messages scripts send back to the host (`topd`)
//! - [`ScriptHost`]: the bundle handed to [`ScriptEngine::new`](crate::ScriptEngine::new)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use pof_core::{FontCatalog, ResourceRegistry, SymbolExchange};

use crate::event::{EventSender, ScriptArg};

/// Redraw scheduling flags of one node, shared with the scheduler.
#[derive(Debug, Default)]
pub struct NodeFlags {
    trigger: AtomicBool,
    force: AtomicBool,
    continuous_force: AtomicBool,
}

impl NodeFlags {
    /// Requests one redraw.
    pub fn request_redraw(&self) {
        self.trigger.store(true, Ordering::Release);
    }

    /// Returns whether a redraw is pending.
    pub fn is_triggered(&self) -> bool {
        self.trigger.load(Ordering::Acquire)
    }

    /// Clears and returns the pending redraw.
    pub fn take_trigger(&self) -> bool {
        self.trigger.swap(false, Ordering::AcqRel)
    }

    /// Forces the next redraw regardless of change detection.
    pub fn request_force(&self) {
        self.force.store(true, Ordering::Release);
    }

    /// Clears and returns the one-shot force flag.
    pub fn take_force(&self) -> bool {
        self.force.swap(false, Ordering::AcqRel)
    }

    /// Sets continuous forcing.
    pub fn set_continuous_force(&self, on: bool) {
        self.continuous_force.store(on, Ordering::Release);
    }

    /// Returns whether every frame is forced.
    pub fn continuous_force(&self) -> bool {
        self.continuous_force.load(Ordering::Acquire)
    }
}

/// Touch routing of a script node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchConfig {
    /// Width of the touch area, centred on the node.
    pub width: f32,
    /// Height of the touch area, centred on the node.
    pub height: f32,
    /// Whether a touch that lands here is captured.
    pub capture: bool,
    /// Whether the node keeps following a touch that leaves the area.
    pub dynamic: bool,
    /// Whether several touches may be tracked at once.
    pub multi: bool,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            width: 200.0,
            height: 200.0,
            capture: true,
            dynamic: false,
            multi: false,
        }
    }
}

impl TouchConfig {
    /// Applies a `touchconfig` command: `size w h`, `dont_capture n` or
    /// `multi n`. Malformed commands are ignored.
    pub fn apply(&mut self, args: &[ScriptArg]) {
        let Some((command, rest)) = args.split_first() else {
            return;
        };
        let number = |i: usize| rest.get(i).and_then(ScriptArg::as_number);

        match command.as_text() {
            Some("size") => {
                if let (Some(w), Some(h)) = (number(0), number(1)) {
                    self.width = w as f32;
                    self.height = h as f32;
                }
            }
            Some("dont_capture") => {
                if let Some(n) = number(0) {
                    self.capture = n == 0.0 || n == 3.0;
                    self.dynamic = n >= 2.0;
                }
            }
            Some("multi") => {
                if let Some(n) = number(0) {
                    self.multi = n != 0.0;
                }
            }
            _ => tracing::debug!(?command, "unknown touchconfig command"),
        }
    }

    /// Returns whether `(x, y)`, relative to the node centre, lies inside.
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x.abs() <= self.width / 2.0 && y.abs() <= self.height / 2.0
    }
}

/// Ordered list of directories searched for script-relative files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Creates a search path from `dirs`, first match wins.
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Appends a directory.
    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }

    /// Searched directories.
    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Returns the absolute path of the first existing match.
    #[must_use]
    pub fn resolve(&self, file: &str) -> Option<PathBuf> {
        let path = Path::new(file);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
            .and_then(|found| found.canonicalize().ok())
    }
}

/// A message a script sent to the host through `topd`.
#[derive(Clone, Debug, PartialEq)]
pub struct HostMessage {
    /// Sending node.
    pub node: String,
    /// Selector (`out`, `send`, `print`, `_getsym_`, ...).
    pub selector: String,
    /// Remaining arguments.
    pub args: Vec<ScriptArg>,
}

impl HostMessage {
    /// Arguments joined by spaces, as printed to the log.
    #[must_use]
    pub fn joined_args(&self) -> String {
        self.args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
    }
}

/// Script → host message channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Outbox {
    sender: Sender<HostMessage>,
    receiver: Receiver<HostMessage>,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Posts a message. Never blocks.
    pub fn post(&self, message: HostMessage) {
        // both ends live in self, the channel cannot be closed here
        let _ = self.sender.send(message);
    }

    /// Removes and returns every posted message in order.
    pub fn drain(&self) -> Vec<HostMessage> {
        self.receiver.try_iter().collect()
    }

    /// Number of pending messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

/// What the host knows about one script node.
#[derive(Clone, Debug)]
pub struct NodeEntry {
    /// Redraw flags.
    pub flags: Arc<NodeFlags>,
    /// Producer end of the node's event queue.
    pub events: EventSender,
    /// Where the node's files are looked up.
    pub search: SearchPath,
    /// Touch routing, updated by `touchconfig`.
    pub touch: Arc<Mutex<TouchConfig>>,
}

/// Registry of live script nodes and of the receiver names bound to them.
#[derive(Debug, Default)]
pub struct NodeDirectory {
    nodes: RwLock<HashMap<String, NodeEntry>>,
    receivers: RwLock<HashMap<String, Vec<String>>>,
}

impl NodeDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`. Returns `false` and leaves the directory unchanged
    /// if the name is taken.
    pub fn register(&self, name: &str, entry: NodeEntry) -> bool {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(name) {
            return false;
        }
        nodes.insert(name.to_owned(), entry);
        true
    }

    /// Removes `name` and every receiver bound to it.
    pub fn unregister(&self, name: &str) -> Option<NodeEntry> {
        self.clear_receivers(name);
        self.nodes.write().remove(name)
    }

    /// Moves an entry to a new name. Returns `false` if `to` is taken or
    /// `from` unknown.
    pub fn rename(&self, from: &str, to: &str) -> bool {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(to) {
            return false;
        }
        let Some(entry) = nodes.remove(from) else {
            return false;
        };
        nodes.insert(to.to_owned(), entry);
        drop(nodes);
        self.clear_receivers(from);
        true
    }

    /// Returns a copy of the entry for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<NodeEntry> {
        self.nodes.read().get(name).cloned()
    }

    /// Returns whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.read().contains_key(name)
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns whether no node is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Binds receiver `receiver` to `node`. Binding twice is a no-op.
    pub fn bind_receiver(&self, receiver: &str, node: &str) {
        let mut receivers = self.receivers.write();
        let bound = receivers.entry(receiver.to_owned()).or_default();
        if !bound.iter().any(|n| n == node) {
            bound.push(node.to_owned());
        }
    }

    /// Nodes bound to `receiver`, in binding order.
    #[must_use]
    pub fn receivers_of(&self, receiver: &str) -> Vec<String> {
        self.receivers.read().get(receiver).cloned().unwrap_or_default()
    }

    /// Drops every receiver binding of `node`.
    pub fn clear_receivers(&self, node: &str) {
        let mut receivers = self.receivers.write();
        receivers.retain(|_, nodes| {
            nodes.retain(|n| n != node);
            !nodes.is_empty()
        });
    }
}

/// Everything script primitives can reach on the host side.
#[derive(Clone, Debug)]
pub struct ScriptHost {
    /// Shared framebuffers (and, through it, the texture catalog).
    pub registry: ResourceRegistry,
    /// Address string exchange.
    pub exchange: Arc<SymbolExchange>,
    /// Loaded fonts.
    pub fonts: Arc<FontCatalog>,
    /// Live script nodes.
    pub directory: Arc<NodeDirectory>,
    /// Script → host messages.
    pub outbox: Outbox,
}

impl ScriptHost {
    /// Creates a host around `registry` with fresh exchange, fonts,
    /// directory and outbox.
    #[must_use]
    pub fn new(registry: ResourceRegistry) -> Self {
        Self {
            registry,
            exchange: Arc::new(SymbolExchange::new()),
            fonts: Arc::new(FontCatalog::new()),
            directory: Arc::new(NodeDirectory::new()),
            outbox: Outbox::new(),
        }
    }
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new(ResourceRegistry::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AsyncEventQueue;

    fn entry() -> (NodeEntry, AsyncEventQueue) {
        let flags = Arc::new(NodeFlags::default());
        let queue = AsyncEventQueue::new(Arc::clone(&flags));
        let entry = NodeEntry {
            flags,
            events: queue.sender(),
            search: SearchPath::default(),
            touch: Arc::new(Mutex::new(TouchConfig::default())),
        };
        (entry, queue)
    }

    #[test]
    fn test_flags() {
        let flags = NodeFlags::default();
        flags.request_redraw();
        assert!(flags.take_trigger());
        assert!(!flags.take_trigger());

        flags.request_force();
        assert!(flags.take_force());
        flags.set_continuous_force(true);
        assert!(flags.continuous_force());
    }

    #[test]
    fn test_touchconfig_commands() {
        let mut touch = TouchConfig::default();
        touch.apply(&["size".into(), 40.0.into(), 20.0.into()]);
        assert_eq!((touch.width, touch.height), (40.0, 20.0));
        assert!(touch.contains(20.0, -10.0));
        assert!(!touch.contains(21.0, 0.0));

        touch.apply(&["dont_capture".into(), 2.0.into()]);
        assert!(!touch.capture);
        assert!(touch.dynamic);
        touch.apply(&["dont_capture".into(), 3.0.into()]);
        assert!(touch.capture);
        assert!(touch.dynamic);

        touch.apply(&["multi".into(), 1.0.into()]);
        assert!(touch.multi);

        // missing operand leaves size alone
        touch.apply(&["size".into(), 1.0.into()]);
        assert_eq!(touch.width, 40.0);
    }

    #[test]
    fn test_search_path_resolve() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.lua"), "-- a").unwrap();

        let search = SearchPath::new(vec![PathBuf::from("/nonexistent"), dir.path().to_path_buf()]);
        let found = search.resolve("a.lua").unwrap();
        assert!(found.is_absolute());
        assert!(found.ends_with("a.lua"));
        assert!(search.resolve("missing.lua").is_none());
    }

    #[test]
    fn test_directory_register_and_receivers() {
        let directory = NodeDirectory::new();
        let (a, _qa) = entry();
        let (b, _qb) = entry();

        assert!(directory.register("a", a.clone()));
        assert!(!directory.register("a", b.clone()));
        assert!(directory.register("b", b));

        directory.bind_receiver("ctl", "a");
        directory.bind_receiver("ctl", "b");
        directory.bind_receiver("ctl", "a");
        assert_eq!(directory.receivers_of("ctl"), vec!["a", "b"]);

        directory.unregister("a");
        assert_eq!(directory.receivers_of("ctl"), vec!["b"]);
        assert!(!directory.contains("a"));

        assert!(directory.rename("b", "c"));
        assert!(directory.receivers_of("ctl").is_empty());
        assert!(directory.contains("c"));
    }

    #[test]
    fn test_outbox_order() {
        let outbox = Outbox::new();
        for selector in ["out", "send", "print"] {
            outbox.post(HostMessage {
                node: "n".into(),
                selector: selector.into(),
                args: vec![1.0.into(), "x".into()],
            });
        }
        let drained = outbox.drain();
        let selectors: Vec<_> = drained.iter().map(|m| m.selector.as_str()).collect();
        assert_eq!(selectors, ["out", "send", "print"]);
        assert_eq!(drained[2].joined_args(), "1 x");
        assert!(outbox.is_empty());
    }
}
