//! # Runtime
//!
//! Owns everything a scene needs and pumps it once per frame.
//!
//! ## Frame Flow
//!
//! ```text
//! begin_frame(device)
//!   ├─ drain deferred GPU deletions
//!   └─ answer the outbox: print, _getsym_, touchconfig, receive, (forward rest)
//! draw_frame(device)
//!   ├─ bind every framebuffer node
//!   └─ draw every script node that asked for it
//! ```
//!
//! The runtime is render-thread only. Other threads talk to script nodes
//! through their [`EventSender`](pof_script::EventSender)s.

use std::sync::Arc;

use pof_core::{FontInfo, GpuDevice, ResourceRegistry};
use pof_script::{AsyncEvent, CallKind, HostMessage, ScriptArg, ScriptEngine, ScriptHost, SearchPath};

use crate::config::{FramebufferNodeConfig, PofConfig, ScriptNodeConfig};
use crate::error::PofResult;
use crate::nodes::{FramebufferNode, FramebufferTarget, ScriptNode};

/// Counters accumulated over the runtime's life.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Frames pumped.
    pub frames: u64,
    /// Framebuffer binds that produced a target.
    pub framebuffer_draws: u64,
    /// Script draws that completed.
    pub script_draws: u64,
    /// Script draws that failed (load or runtime error).
    pub script_errors: u64,
    /// GPU objects freed from the deferred queue.
    pub deletions: u64,
    /// Outbox messages handled or forwarded.
    pub host_messages: u64,
}

/// The scene host.
#[derive(Debug)]
pub struct PofRuntime {
    config: PofConfig,
    engine: Arc<ScriptEngine>,
    search: SearchPath,
    framebuffers: Vec<FramebufferNode>,
    scripts: Vec<ScriptNode>,
    forwarded: Vec<HostMessage>,
    stats: RuntimeStats,
}

impl PofRuntime {
    /// Creates the engine and publishes configured fonts. Nodes are added
    /// by [`PofRuntime::build_scene`] or one by one.
    ///
    /// # Errors
    ///
    /// [`PofError::Script`](crate::PofError::Script) if the interpreter
    /// cannot start.
    pub fn new(config: PofConfig) -> PofResult<Self> {
        let host = ScriptHost::new(ResourceRegistry::new());
        for font in &config.fonts {
            host.fonts.publish(
                &font.name,
                FontInfo {
                    path: font.path.clone(),
                    size: font.size,
                },
            );
        }
        let engine = Arc::new(ScriptEngine::new(host)?);
        let search = SearchPath::new(config.search_paths.clone());

        tracing::info!(
            search_paths = config.search_paths.len(),
            fonts = config.fonts.len(),
            "runtime started"
        );
        Ok(Self {
            config,
            engine,
            search,
            framebuffers: Vec::new(),
            scripts: Vec::new(),
            forwarded: Vec::new(),
            stats: RuntimeStats::default(),
        })
    }

    /// Instantiates every node listed in the configuration.
    pub fn build_scene(&mut self) {
        let framebuffers = self.config.framebuffers.clone();
        let scripts = self.config.scripts.clone();
        for config in &framebuffers {
            self.add_framebuffer(config);
        }
        for config in &scripts {
            self.add_script(config);
        }
        tracing::info!(
            framebuffers = self.framebuffers.len(),
            scripts = self.scripts.len(),
            "scene built"
        );
    }

    /// Adds a framebuffer node. Returns its resource name.
    pub fn add_framebuffer(&mut self, config: &FramebufferNodeConfig) -> String {
        let node = FramebufferNode::new(self.registry(), config, &self.config.framebuffer);
        let name = node.name().to_owned();
        self.framebuffers.push(node);
        name
    }

    /// Adds a script node searching the runtime path. Returns the name it
    /// registered under.
    pub fn add_script(&mut self, config: &ScriptNodeConfig) -> String {
        let node = ScriptNode::new(&self.engine, config, self.search.clone());
        let name = node.name().to_owned();
        self.scripts.push(node);
        name
    }

    /// Removes the first framebuffer node using resource `name`, releasing
    /// its reference.
    pub fn remove_framebuffer(&mut self, name: &str) -> bool {
        let Some(index) = self.framebuffers.iter().position(|n| n.name() == name) else {
            return false;
        };
        self.framebuffers.remove(index);
        true
    }

    /// Removes script node `name`, dropping its namespace and receivers.
    pub fn remove_script(&mut self, name: &str) -> bool {
        let Some(index) = self.scripts.iter().position(|n| n.name() == name) else {
            return false;
        };
        self.scripts.remove(index);
        true
    }

    /// The loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &PofConfig {
        &self.config
    }

    /// The shared interpreter.
    #[must_use]
    pub fn engine(&self) -> &Arc<ScriptEngine> {
        &self.engine
    }

    /// Host-side state shared with the interpreter.
    #[must_use]
    pub fn host(&self) -> &ScriptHost {
        self.engine.host()
    }

    /// The framebuffer registry.
    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry {
        &self.engine.host().registry
    }

    /// Framebuffer nodes in creation order.
    #[must_use]
    pub fn framebuffers(&self) -> &[FramebufferNode] {
        &self.framebuffers
    }

    /// Framebuffer node using resource `name`.
    pub fn framebuffer_mut(&mut self, name: &str) -> Option<&mut FramebufferNode> {
        self.framebuffers.iter_mut().find(|n| n.name() == name)
    }

    /// Script nodes in creation order.
    #[must_use]
    pub fn scripts(&self) -> &[ScriptNode] {
        &self.scripts
    }

    /// Script node `name`.
    #[must_use]
    pub fn script(&self, name: &str) -> Option<&ScriptNode> {
        self.scripts.iter().find(|n| n.name() == name)
    }

    /// Script node `name`, mutably.
    pub fn script_mut(&mut self, name: &str) -> Option<&mut ScriptNode> {
        self.scripts.iter_mut().find(|n| n.name() == name)
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// Start-of-frame step: frees deferred GPU objects, then handles what
    /// scripts sent since the last frame. Returns the number of objects
    /// freed.
    pub fn begin_frame(&mut self, device: &mut dyn GpuDevice) -> usize {
        let freed = self.registry().drain_deferred_deletions(device);
        self.stats.deletions += freed as u64;

        for message in self.engine.host().outbox.drain() {
            self.stats.host_messages += 1;
            self.route(message);
        }
        freed
    }

    /// Draws the scene: binds framebuffers, then draws script nodes that
    /// need it. Returns the targets children would render into.
    pub fn draw_frame(&mut self, device: &mut dyn GpuDevice) -> Vec<FramebufferTarget> {
        let mut targets = Vec::with_capacity(self.framebuffers.len());
        for node in &mut self.framebuffers {
            if let Some(target) = node.draw(device) {
                targets.push(target);
            }
        }
        self.stats.framebuffer_draws += targets.len() as u64;

        for node in &mut self.scripts {
            if !node.needs_draw() {
                continue;
            }
            match node.draw() {
                Ok(()) => self.stats.script_draws += 1,
                // already logged by the bridge
                Err(_) => self.stats.script_errors += 1,
            }
        }
        targets
    }

    /// One full frame.
    pub fn run_frame(&mut self, device: &mut dyn GpuDevice) -> Vec<FramebufferTarget> {
        self.begin_frame(device);
        let targets = self.draw_frame(device);
        self.stats.frames += 1;
        targets
    }

    /// Delivers an inbound message to every node bound to `receiver`, as a
    /// queued `M:receive(receiver, selector, args...)` call. `list`,
    /// `float` and `symbol` selectors are left out. Returns the number of
    /// nodes reached.
    pub fn deliver(&self, receiver: &str, selector: &str, args: &[ScriptArg]) -> usize {
        let mut payload = Vec::with_capacity(args.len() + 2);
        payload.push(ScriptArg::Text(receiver.to_owned()));
        if !matches!(selector, "list" | "float" | "symbol") {
            payload.push(ScriptArg::Text(selector.to_owned()));
        }
        payload.extend_from_slice(args);

        let directory = &self.engine.host().directory;
        let mut reached = 0;
        for node in directory.receivers_of(receiver) {
            let Some(entry) = directory.get(&node) else {
                continue;
            };
            if entry.events.call(CallKind::Method, "receive", payload.clone()) {
                reached += 1;
            }
        }
        if reached == 0 {
            tracing::trace!(receiver, selector, "no script bound to receiver");
        }
        reached
    }

    /// Takes the messages scripts sent for the host (`out`, `send`, ...).
    pub fn take_host_messages(&mut self) -> Vec<HostMessage> {
        std::mem::take(&mut self.forwarded)
    }

    /// Reallocates every sized framebuffer after a context loss and asks
    /// all scripts to redraw. Returns the number restored.
    pub fn restore_textures(&mut self, device: &mut dyn GpuDevice) -> usize {
        let restored = self.registry().restore_all(device);
        for node in &self.scripts {
            node.flags().request_redraw();
        }
        tracing::info!(restored, "textures restored");
        restored
    }

    /// Drops every node, then frees all GPU objects they held. Returns the
    /// number of objects freed.
    pub fn shutdown(mut self, device: &mut dyn GpuDevice) -> usize {
        self.scripts.clear();
        self.framebuffers.clear();
        let freed = self.registry().drain_deferred_deletions(device);
        self.stats.deletions += freed as u64;
        tracing::info!(
            frames = self.stats.frames,
            deletions = self.stats.deletions,
            "runtime shut down"
        );
        freed
    }

    fn route(&mut self, message: HostMessage) {
        let directory = &self.engine.host().directory;
        match message.selector.as_str() {
            "print" => tracing::info!(node = %message.node, "{}", message.joined_args()),
            "_getsym_" => {
                let Some(entry) = directory.get(&message.node) else {
                    tracing::warn!(node = %message.node, "symbol request from unknown node");
                    return;
                };
                for name in message.args.iter().filter_map(ScriptArg::as_text) {
                    let address = self.engine.host().exchange.encode(name);
                    entry.events.push(AsyncEvent::SymbolResolved {
                        name: name.to_owned(),
                        address,
                    });
                }
            }
            "touchconfig" => match directory.get(&message.node) {
                Some(entry) => entry.touch.lock().apply(&message.args),
                None => tracing::warn!(node = %message.node, "touchconfig from unknown node"),
            },
            "receive" => {
                for name in message.args.iter().filter_map(ScriptArg::as_text) {
                    directory.bind_receiver(name, &message.node);
                }
            }
            _ => self.forwarded.push(message),
        }
    }
}
