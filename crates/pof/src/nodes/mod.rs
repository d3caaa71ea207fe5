//! # Scene Nodes
//!
//! The two node kinds the runtime instantiates from configuration:
//!
//! - [`FramebufferNode`]: draws its children into a shared, named render target
//! - [`ScriptNode`]: runs a Lua namespace each frame and routes touches to it
//!
//! Both accept attribute messages ([`FramebufferAttribute`],
//! [`ScriptAttribute`]) parsed from a selector plus arguments, the way a
//! patch would send them.

pub mod framebuffer;
pub mod script;

pub use framebuffer::{FramebufferAttribute, FramebufferNode, FramebufferTarget};
pub use script::{ScriptAttribute, ScriptNode};

use pof_script::ScriptArg;

/// Reads argument `i` as a number.
fn number(args: &[ScriptArg], i: usize) -> Option<f64> {
    args.get(i).and_then(ScriptArg::as_number)
}

/// Reads argument `i` as a flag (non-zero number). Missing means `true`.
fn flag(args: &[ScriptArg], i: usize) -> Option<bool> {
    match args.get(i) {
        None => Some(true),
        Some(arg) => arg.as_number().map(|n| n != 0.0),
    }
}
