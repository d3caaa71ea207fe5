//! # POF
//!
//! Scene runtime tying shared framebuffers and Lua script nodes together.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         PofRuntime                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  FramebufferNode ──► ResourceRegistry ──► GpuDevice          │
//! │  ScriptNode ──► ScriptBridge ──► ScriptEngine (one lock)     │
//! │       ▲                                   │                  │
//! │       └── AsyncEventQueue ◄── outbox ◄────┘ (begin_frame)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use pof::{PofConfig, PofRuntime};
//! use pof_core::HeadlessDevice;
//!
//! let config = PofConfig::from_toml_str(r#"
//! [[framebuffers]]
//! name = "scene"
//! width = 64.0
//! height = 64.0
//!
//! [[scripts]]
//! name = "ctl"
//! code = "function M:draw() self:out('tick') end"
//! "#).unwrap();
//!
//! let mut runtime = PofRuntime::new(config).unwrap();
//! runtime.build_scene();
//!
//! let mut device = HeadlessDevice::new();
//! let targets = runtime.run_frame(&mut device);
//! assert_eq!(targets.len(), 1);
//!
//! runtime.begin_frame(&mut device);
//! assert_eq!(runtime.take_host_messages()[0].selector, "out");
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod nodes;
pub mod runtime;

pub use config::{FontConfig, FramebufferDefaults, FramebufferNodeConfig, PofConfig, RunConfig, ScriptNodeConfig};
pub use error::{PofError, PofResult};
pub use nodes::{FramebufferAttribute, FramebufferNode, FramebufferTarget, ScriptAttribute, ScriptNode};
pub use runtime::{PofRuntime, RuntimeStats};
