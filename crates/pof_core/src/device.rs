//! # GPU Device Seam
//!
//! The registry never talks to a graphics API directly. The host implements
//! [`GpuDevice`] on the thread that owns the graphics context and passes it
//! by `&mut` into every operation that creates or destroys GPU storage.
//! Holding the device *is* the proof of being on the render thread.
//!
//! ```text
//! ┌──────────────────┐   allocate / destroy / set_filter   ┌─────────────┐
//! │ ResourceRegistry │ ──────────────────────────────────► │  GpuDevice  │
//! └──────────────────┘        (&mut, render thread)        └─────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Pixel format of a framebuffer's colour attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGB.
    #[serde(rename = "RGB")]
    Rgb,
    /// 8-bit RGBA.
    #[default]
    #[serde(rename = "RGBA")]
    Rgba,
    /// 16-bit RGBA.
    #[serde(rename = "RGBA16")]
    Rgba16,
}

impl PixelFormat {
    /// Returns the textual name used in patches and config files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgb => "RGB",
            Self::Rgba => "RGBA",
            Self::Rgba16 => "RGBA16",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RGB" => Ok(Self::Rgb),
            "RGBA" => Ok(Self::Rgba),
            "RGBA16" => Ok(Self::Rgba16),
            other => Err(format!("unknown pixel format '{other}'")),
        }
    }
}

/// Texture sampling filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFilter {
    /// Nearest-neighbour sampling.
    Nearest,
    /// Bilinear sampling.
    #[default]
    Linear,
}

impl TextureFilter {
    /// Maps the node `quality` flag onto a filter.
    #[must_use]
    pub const fn from_quality(quality: bool) -> Self {
        if quality {
            Self::Linear
        } else {
            Self::Nearest
        }
    }
}

/// Storage layout of an allocated framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferDesc {
    /// Width in pixels (non-zero when allocated).
    pub width: u32,
    /// Height in pixels (non-zero when allocated).
    pub height: u32,
    /// Colour format.
    pub format: PixelFormat,
    /// MSAA sample count (0 = no multisampling).
    pub samples: u32,
}

/// Identity of a GPU framebuffer object, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Id never handed to a live object.
    pub const NONE: Self = Self(0);

    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fbo#{}", self.0)
    }
}

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// An owned GPU framebuffer object.
///
/// Created without touching the GPU; storage is attached later by
/// [`GpuDevice::allocate`]. Dropping the value does NOT free GPU storage:
/// objects must be handed to [`GpuDevice::destroy`], which the registry does
/// through its deferred deletion queue.
#[derive(Debug)]
pub struct FramebufferObject {
    id: ObjectId,
    allocation: Option<FramebufferDesc>,
    filter: TextureFilter,
}

impl FramebufferObject {
    /// Creates a new, unallocated object with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)),
            allocation: None,
            filter: TextureFilter::default(),
        }
    }

    /// Returns the object id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns whether GPU storage is attached.
    #[inline]
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.allocation.is_some()
    }

    /// Returns the current storage layout, if allocated.
    #[inline]
    #[must_use]
    pub const fn allocation(&self) -> Option<&FramebufferDesc> {
        self.allocation.as_ref()
    }

    /// Returns the current sampling filter.
    #[inline]
    #[must_use]
    pub const fn filter(&self) -> TextureFilter {
        self.filter
    }

    pub(crate) fn mark_allocated(&mut self, desc: FramebufferDesc) {
        self.allocation = Some(desc);
        self.filter = TextureFilter::default();
    }

    pub(crate) fn mark_unallocated(&mut self) {
        self.allocation = None;
    }

    pub(crate) fn record_filter(&mut self, filter: TextureFilter) {
        self.filter = filter;
    }
}

impl Default for FramebufferObject {
    fn default() -> Self {
        Self::new()
    }
}

/// The graphics context, as seen by the registry.
///
/// Implemented by the host. Every method runs on the context-owning thread.
pub trait GpuDevice {
    /// Attaches storage described by `desc` to `object`.
    ///
    /// If the object already has storage it is reallocated in place. Fresh
    /// storage samples with the default filter.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] if the backend cannot provide the storage.
    fn allocate(&mut self, object: &FramebufferObject, desc: &FramebufferDesc) -> Result<(), DeviceError>;

    /// Frees the object and all of its GPU storage.
    fn destroy(&mut self, object: FramebufferObject);

    /// Changes texture sampling of an allocated object.
    fn set_filter(&mut self, object: &FramebufferObject, filter: TextureFilter);
}

/// Counters kept by [`HeadlessDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Successful `allocate` calls.
    pub allocations: u64,
    /// `destroy` calls.
    pub destructions: u64,
    /// Rejected `allocate` calls.
    pub failures: u64,
    /// Objects currently holding storage.
    pub live: usize,
}

/// In-memory device for tests and headless runs.
///
/// Tracks every object it has allocated and counts traffic, so callers can
/// assert exactly how often storage was created or freed.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    live: HashMap<ObjectId, FramebufferDesc>,
    filters: HashMap<ObjectId, TextureFilter>,
    stats: DeviceStats,
    max_dimension: Option<u32>,
    lost: bool,
}

impl HeadlessDevice {
    /// Creates a device without limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device rejecting any dimension above `max_dimension`.
    #[must_use]
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: Some(max_dimension),
            ..Self::default()
        }
    }

    /// Returns traffic counters.
    #[must_use]
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            live: self.live.len(),
            ..self.stats
        }
    }

    /// Returns the storage attached to `id`, if any.
    #[must_use]
    pub fn storage(&self, id: ObjectId) -> Option<&FramebufferDesc> {
        self.live.get(&id)
    }

    /// Returns the last filter applied to `id`.
    #[must_use]
    pub fn filter(&self, id: ObjectId) -> Option<TextureFilter> {
        self.filters.get(&id).copied()
    }

    /// Simulates a context loss: all storage vanishes and allocation fails
    /// until [`HeadlessDevice::restore`] is called.
    pub fn lose_context(&mut self) {
        self.live.clear();
        self.filters.clear();
        self.lost = true;
    }

    /// Ends a simulated context loss.
    pub fn restore(&mut self) {
        self.lost = false;
    }
}

impl GpuDevice for HeadlessDevice {
    fn allocate(&mut self, object: &FramebufferObject, desc: &FramebufferDesc) -> Result<(), DeviceError> {
        if self.lost {
            self.stats.failures += 1;
            return Err(DeviceError::ContextLost);
        }
        if let Some(max) = self.max_dimension {
            if desc.width > max || desc.height > max {
                self.stats.failures += 1;
                return Err(DeviceError::AllocationFailed {
                    width: desc.width,
                    height: desc.height,
                    format: desc.format,
                    samples: desc.samples,
                    reason: format!("exceeds maximum dimension {max}"),
                });
            }
        }
        self.live.insert(object.id(), *desc);
        self.filters.remove(&object.id());
        self.stats.allocations += 1;
        Ok(())
    }

    fn destroy(&mut self, object: FramebufferObject) {
        self.live.remove(&object.id());
        self.filters.remove(&object.id());
        self.stats.destructions += 1;
    }

    fn set_filter(&mut self, object: &FramebufferObject, filter: TextureFilter) {
        self.filters.insert(object.id(), filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(width: u32, height: u32) -> FramebufferDesc {
        FramebufferDesc {
            width,
            height,
            format: PixelFormat::Rgba,
            samples: 0,
        }
    }

    #[test]
    fn test_pixel_format_names() {
        for format in [PixelFormat::Rgb, PixelFormat::Rgba, PixelFormat::Rgba16] {
            assert_eq!(format.name().parse::<PixelFormat>(), Ok(format));
        }
        assert!("BGRA".parse::<PixelFormat>().is_err());
        assert_eq!(PixelFormat::default(), PixelFormat::Rgba);
    }

    #[test]
    fn test_object_ids_unique() {
        let a = FramebufferObject::new();
        let b = FramebufferObject::new();
        assert_ne!(a.id(), b.id());
        assert!(!a.is_allocated());
    }

    #[test]
    fn test_headless_counts() {
        let mut device = HeadlessDevice::new();
        let object = FramebufferObject::new();

        device.allocate(&object, &desc(64, 32)).unwrap();
        assert_eq!(device.storage(object.id()), Some(&desc(64, 32)));
        assert_eq!(device.stats().live, 1);

        device.destroy(object);
        let stats = device.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.destructions, 1);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn test_headless_limits_and_context_loss() {
        let mut device = HeadlessDevice::with_max_dimension(128);
        let object = FramebufferObject::new();

        assert!(matches!(
            device.allocate(&object, &desc(256, 16)),
            Err(DeviceError::AllocationFailed { width: 256, .. })
        ));

        device.lose_context();
        assert_eq!(device.allocate(&object, &desc(16, 16)), Err(DeviceError::ContextLost));
        device.restore();
        assert!(device.allocate(&object, &desc(16, 16)).is_ok());
        assert_eq!(device.stats().failures, 2);
    }

    #[test]
    fn test_reallocation_resets_filter() {
        let mut device = HeadlessDevice::new();
        let object = FramebufferObject::new();

        device.allocate(&object, &desc(8, 8)).unwrap();
        device.set_filter(&object, TextureFilter::Nearest);
        assert_eq!(device.filter(object.id()), Some(TextureFilter::Nearest));

        device.allocate(&object, &desc(16, 16)).unwrap();
        assert_eq!(device.filter(object.id()), None);
    }
}
