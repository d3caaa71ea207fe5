//! # POF Script
//!
//! Lua scripting for scene nodes, sharing one interpreter:
//! - [`ScriptEngine`]: the interpreter behind a single lock, with host
//!   primitives (`topd`, `drawconfig`, `getfile`, `pof.*`)
//! - [`ScriptBridge`]: one node's namespace, hooks and symbol cache
//! - [`AsyncEventQueue`]: calls from any thread, drained on the render thread
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pof_script::{ScriptBridge, ScriptEngine, ScriptHost, ScriptSource, SearchPath};
//!
//! let engine = Arc::new(ScriptEngine::new(ScriptHost::default()).unwrap());
//! let mut bridge = ScriptBridge::new(
//!     Arc::clone(&engine),
//!     "hello",
//!     ScriptSource::inline("function M:draw() self:out('frame') end"),
//!     SearchPath::default(),
//! );
//!
//! bridge.call_draw(false).unwrap();
//! assert_eq!(engine.host().outbox.drain()[0].selector, "out");
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bridge;
pub mod engine;
pub mod error;
pub mod event;
pub mod host;

pub use bridge::{ScriptBridge, ScriptSource, SymbolCache};
pub use engine::{FontRef, FramebufferRef, ScriptEngine, TextureRef};
pub use error::{ScriptError, ScriptResult};
pub use event::{AsyncEvent, AsyncEventQueue, CallKind, EventSender, ScriptArg};
pub use host::{HostMessage, NodeDirectory, NodeEntry, NodeFlags, Outbox, ScriptHost, SearchPath, TouchConfig};
