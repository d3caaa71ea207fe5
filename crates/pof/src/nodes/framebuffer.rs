//! Framebuffer node: a named render target shared by every node using the
//! same name.

use std::sync::atomic::{AtomicUsize, Ordering};

use pof_core::{
    BindOutcome, BindRequest, FramebufferHandle, FramebufferInfo, GpuDevice, ObjectId, PixelFormat, ResourceRegistry,
};
use pof_script::ScriptArg;

use super::{flag, number};
use crate::config::{FramebufferDefaults, FramebufferNodeConfig};

static PRIVATE_NAMES: AtomicUsize = AtomicUsize::new(0);

/// Where a frame's children are rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferTarget {
    /// GPU object to draw into.
    pub object: ObjectId,
    /// Target width.
    pub width: u32,
    /// Target height.
    pub height: u32,
    /// Clear before drawing.
    pub clear: bool,
}

/// Attribute message accepted by a [`FramebufferNode`].
#[derive(Clone, Debug, PartialEq)]
pub enum FramebufferAttribute {
    /// `size w h`
    Size(f32, f32),
    /// `width w`
    Width(f32),
    /// `height h`
    Height(f32),
    /// `format RGB|RGBA|RGBA16`
    Format(PixelFormat),
    /// `samples n`
    Samples(u32),
    /// `quality 0|1`
    Quality(bool),
    /// `clear 0|1`
    Clear(bool),
    /// `update 0|1`
    Update(bool),
    /// `set name`: switch to another shared resource
    Set(String),
}

impl FramebufferAttribute {
    /// Parses `selector args...`. Unknown selectors and malformed
    /// arguments give `None`.
    #[must_use]
    pub fn from_message(selector: &str, args: &[ScriptArg]) -> Option<Self> {
        let attribute = match selector {
            "size" => Self::Size(number(args, 0)? as f32, number(args, 1)? as f32),
            "width" => Self::Width(number(args, 0)? as f32),
            "height" => Self::Height(number(args, 0)? as f32),
            "format" => Self::Format(args.first()?.as_text()?.parse().ok()?),
            "samples" | "numsamples" => Self::Samples(number(args, 0)?.max(0.0) as u32),
            "quality" => Self::Quality(flag(args, 0)?),
            "clear" => Self::Clear(flag(args, 0)?),
            "update" => Self::Update(flag(args, 0)?),
            "set" => Self::Set(args.first()?.as_text()?.to_owned()),
            _ => return None,
        };
        Some(attribute)
    }
}

/// Scene node owning one reference to a shared framebuffer.
///
/// Dropping the node drops its handle, which releases the reference.
#[derive(Debug)]
pub struct FramebufferNode {
    registry: ResourceRegistry,
    handle: FramebufferHandle,
    width: f32,
    height: f32,
    format: Option<PixelFormat>,
    samples: Option<u32>,
    quality: bool,
    clear: bool,
    update: bool,
}

impl FramebufferNode {
    /// Acquires the configured resource. A node without a name gets a
    /// private one.
    #[must_use]
    pub fn new(registry: &ResourceRegistry, config: &FramebufferNodeConfig, defaults: &FramebufferDefaults) -> Self {
        let name = match &config.name {
            Some(name) => name.clone(),
            None => format!("fbo{}", PRIVATE_NAMES.fetch_add(1, Ordering::Relaxed)),
        };

        Self {
            registry: registry.clone(),
            handle: registry.acquire(&name),
            width: config.width,
            height: config.height,
            format: config.format.or(defaults.format),
            samples: config.samples.or(defaults.samples),
            quality: config.quality.unwrap_or(defaults.quality),
            clear: config.clear.unwrap_or(defaults.clear),
            update: config.update,
        }
    }

    /// Name of the shared resource.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Switches to resource `name`, releasing the current one.
    pub fn set_name(&mut self, name: &str) {
        if name == self.handle.name() {
            return;
        }
        let previous = std::mem::replace(&mut self.handle, self.registry.acquire(name));
        tracing::debug!(from = previous.name(), to = name, "framebuffer node renamed");
        drop(previous);
    }

    /// Applies an attribute message. Takes effect at the next draw.
    pub fn apply(&mut self, attribute: FramebufferAttribute) {
        match attribute {
            FramebufferAttribute::Size(w, h) => {
                self.width = w;
                self.height = h;
            }
            FramebufferAttribute::Width(w) => self.width = w,
            FramebufferAttribute::Height(h) => self.height = h,
            FramebufferAttribute::Format(format) => self.format = Some(format),
            FramebufferAttribute::Samples(samples) => self.samples = Some(samples),
            FramebufferAttribute::Quality(quality) => self.quality = quality,
            FramebufferAttribute::Clear(clear) => self.clear = clear,
            FramebufferAttribute::Update(update) => self.update = update,
            FramebufferAttribute::Set(name) => self.set_name(&name),
        }
    }

    /// Snapshot of the shared resource.
    #[must_use]
    pub fn info(&self) -> FramebufferInfo {
        self.registry.info(&self.handle)
    }

    /// Whether children are rendered into the target each frame.
    #[must_use]
    pub const fn updates(&self) -> bool {
        self.update
    }

    /// Binds the resource with this node's request. Returns the target to
    /// render children into, or `None` when updates are off or nothing is
    /// allocated (draw skipped).
    pub fn draw(&mut self, device: &mut dyn GpuDevice) -> Option<FramebufferTarget> {
        let mut request = BindRequest::sized(self.width, self.height);
        request.format = self.format;
        request.samples = self.samples;

        let outcome = match self.registry.bind(&self.handle, device, request) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(name = self.name(), %err, "framebuffer unavailable, draw skipped");
                return None;
            }
        };
        if outcome == BindOutcome::Unallocated {
            return None;
        }
        self.registry.set_quality(&self.handle, device, self.quality);

        if !self.update {
            return None;
        }
        let info = self.info();
        Some(FramebufferTarget {
            object: info.object,
            width: info.width,
            height: info.height,
            clear: self.clear,
        })
    }

    /// The texture to show in the parent scene, when allocated.
    #[must_use]
    pub fn composite(&self) -> Option<FramebufferInfo> {
        let info = self.info();
        info.allocated.then_some(info)
    }

    /// Whether `(x, y)`, relative to the node centre, lies on the quad.
    /// Uses this node's own size, not the shared resource's.
    #[must_use]
    pub fn hit_test(&self, x: f32, y: f32) -> bool {
        let (w, h) = (self.width, self.height);
        w > 0.0 && h > 0.0 && x.abs() <= w / 2.0 && y.abs() <= h / 2.0
    }
}
