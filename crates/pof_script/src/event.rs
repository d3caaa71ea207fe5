//! # Async Event Queue
//!
//! Carries calls from producer threads (message delivery, receivers, the
//! symbol round trip) to the render thread, which drains a node's queue once
//! per frame before running its hooks.
//!
//! ```text
//! producer thread ──► EventSender::push ──┐        (never blocks)
//! producer thread ──► EventSender::push ──┤
//!                                         ▼
//!                              AsyncEventQueue (FIFO per node)
//!                                         │
//! render thread ◄──── drain() ◄───────────┘        (once per frame)
//! ```
//!
//! Pushing also raises the node's trigger flag so the redraw scheduler picks
//! the node up on the next frame.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use mlua::{IntoLua, Lua, Value};

use crate::host::NodeFlags;

/// A typed scalar passed between the host and a script.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptArg {
    /// Numeric value.
    Number(f64),
    /// Text value.
    Text(String),
    /// Address string of a native object, as minted by the symbol exchange.
    Symbol(String),
}

impl ScriptArg {
    /// Returns the text, for `Text` and `Symbol` values.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Symbol(text) => Some(text),
            Self::Number(_) => None,
        }
    }

    /// Returns the number, for `Number` values.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts an interpreter value. Numbers and strings pass through,
    /// booleans become 0/1, anything else is dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(Self::Number(*i as f64)),
            Value::Number(n) => Some(Self::Number(*n)),
            Value::Boolean(b) => Some(Self::Number(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => Some(Self::Text(s.to_string_lossy())),
            _ => None,
        }
    }
}

impl From<f64> for ScriptArg {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ScriptArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ScriptArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for ScriptArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) | Self::Symbol(text) => f.write_str(text),
        }
    }
}

impl IntoLua for ScriptArg {
    fn into_lua(self, lua: &Lua) -> mlua::Result<Value> {
        match self {
            Self::Number(n) => Ok(Value::Number(n)),
            Self::Text(text) | Self::Symbol(text) => lua.create_string(&text).map(Value::String),
        }
    }
}

/// How a queued call finds its function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Member of the node namespace, called without `self`.
    Function,
    /// Member of the node namespace, called with the namespace as `self`.
    Method,
    /// Global function.
    Global,
}

impl CallKind {
    /// Message selector used by patches: `f`, `m` or `g`.
    #[must_use]
    pub const fn selector(self) -> &'static str {
        match self {
            Self::Function => "f",
            Self::Method => "m",
            Self::Global => "g",
        }
    }

    /// Parses a message selector.
    #[must_use]
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "f" => Some(Self::Function),
            "m" => Some(Self::Method),
            "g" => Some(Self::Global),
            _ => None,
        }
    }
}

/// One queued unit of work for a node's interpreter namespace.
#[derive(Clone, Debug, PartialEq)]
pub enum AsyncEvent {
    /// Call a script function.
    Call {
        /// Lookup rule.
        kind: CallKind,
        /// Function name.
        function: String,
        /// Arguments, in order.
        args: Vec<ScriptArg>,
    },
    /// Answer to a `getsym` request.
    SymbolResolved {
        /// Name the script asked for.
        name: String,
        /// Address string minted by the host.
        address: String,
    },
}

/// Producer end of a node's queue. Cheap to clone, usable from any thread.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: Sender<AsyncEvent>,
    flags: Arc<NodeFlags>,
}

impl EventSender {
    /// Enqueues `event` and raises the node trigger. Never blocks.
    ///
    /// Returns `false` if the node is gone.
    pub fn push(&self, event: AsyncEvent) -> bool {
        if self.sender.send(event).is_err() {
            tracing::trace!("event dropped, node queue closed");
            return false;
        }
        self.flags.request_redraw();
        true
    }

    /// Enqueues a function call.
    pub fn call(&self, kind: CallKind, function: &str, args: Vec<ScriptArg>) -> bool {
        self.push(AsyncEvent::Call {
            kind,
            function: function.to_owned(),
            args,
        })
    }
}

/// Unbounded, ordered, multi-producer queue owned by one script node.
#[derive(Debug)]
pub struct AsyncEventQueue {
    sender: Sender<AsyncEvent>,
    receiver: Receiver<AsyncEvent>,
    flags: Arc<NodeFlags>,
}

impl AsyncEventQueue {
    /// Creates a queue that raises `flags.trigger` on every push.
    #[must_use]
    pub fn new(flags: Arc<NodeFlags>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            flags,
        }
    }

    /// Gets a producer handle for another thread.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
            flags: Arc::clone(&self.flags),
        }
    }

    /// Removes and returns everything queued so far, in enqueue order.
    pub fn drain(&self) -> Vec<AsyncEvent> {
        self.receiver.try_iter().collect()
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn number(n: f64) -> ScriptArg {
        ScriptArg::Number(n)
    }

    #[test]
    fn test_fifo_and_trigger() {
        let flags = Arc::new(NodeFlags::default());
        let queue = AsyncEventQueue::new(Arc::clone(&flags));
        let sender = queue.sender();

        assert!(!flags.is_triggered());
        for i in 0_i32..3 {
            sender.call(CallKind::Function, "step", vec![number(f64::from(i))]);
        }
        assert!(flags.is_triggered());
        assert_eq!(queue.len(), 3);

        let drained = queue.drain();
        let order: Vec<_> = drained
            .iter()
            .map(|e| match e {
                AsyncEvent::Call { args, .. } => args[0].as_number().unwrap(),
                AsyncEvent::SymbolResolved { .. } => -1.0,
            })
            .collect();
        assert_eq!(order, vec![0.0, 1.0, 2.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_per_producer_order_across_threads() {
        let queue = AsyncEventQueue::new(Arc::new(NodeFlags::default()));
        let producers: Vec<_> = (0_i32..4)
            .map(|p| {
                let sender = queue.sender();
                thread::spawn(move || {
                    for i in 0_i32..100 {
                        sender.call(CallKind::Method, "tick", vec![number(f64::from(p)), number(f64::from(i))]);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut last = [-1.0; 4];
        for event in queue.drain() {
            let AsyncEvent::Call { args, .. } = event else {
                panic!("unexpected event");
            };
            let p = args[0].as_number().unwrap() as usize;
            let i = args[1].as_number().unwrap();
            assert!(i > last[p]);
            last[p] = i;
        }
        assert_eq!(last, [99.0; 4]);
    }

    #[test]
    fn test_push_after_queue_dropped() {
        let queue = AsyncEventQueue::new(Arc::new(NodeFlags::default()));
        let sender = queue.sender();
        drop(queue);
        assert!(!sender.call(CallKind::Global, "f", Vec::new()));
    }

    #[test]
    fn test_arg_display() {
        assert_eq!(number(3.0).to_string(), "3");
        assert_eq!(number(0.5).to_string(), "0.5");
        assert_eq!(ScriptArg::from("bg").to_string(), "bg");
    }

    #[test]
    fn test_call_kind_selectors() {
        for kind in [CallKind::Function, CallKind::Method, CallKind::Global] {
            assert_eq!(CallKind::from_selector(kind.selector()), Some(kind));
        }
        assert_eq!(CallKind::from_selector("x"), None);
    }
}
