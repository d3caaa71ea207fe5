//! # Shared Framebuffer Registry
//!
//! Process-wide map from symbolic name to a GPU render target. Any number of
//! nodes may hold the same name; the target lives as long as one of them
//! does.
//!
//! ## Lifetime
//!
//! ```text
//! acquire("cam") ──► refs 1 ──► clone ──► refs 2 ──► drop ──► refs 1 ──► drop ──► refs 0
//!                                                                              │
//!                           entry removed, name reusable immediately ◄─────────┤
//!                                                                              ▼
//!                                                 object pushed to deferred queue
//!                                                                              │
//!                        begin of next frame (render thread) ──► drain ──► GpuDevice::destroy
//! ```
//!
//! ## Thread Safety
//!
//! - `acquire` / `release` / handle `Clone` / `Drop`: any thread
//! - `bind`, `set_quality`, `restore_all`, `drain_deferred_deletions`: render
//!   thread only, enforced by the `&mut dyn GpuDevice` parameter
//!
//! Lock order is map → resource → deferred queue. The deferred queue is a
//! leaf lock and never held while calling the device.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::{TextureCatalog, TextureInfo, TextureSource};
use crate::device::{FramebufferDesc, FramebufferObject, GpuDevice, ObjectId, PixelFormat, TextureFilter};
use crate::error::{ResourceError, ResourceResult};

/// Size/format request issued once per frame by the node drawing into a
/// resource.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BindRequest {
    /// Requested width. Negative clamps to 0; 0 keeps the stored width.
    pub width: f32,
    /// Requested height. Negative clamps to 0; 0 keeps the stored height.
    pub height: f32,
    /// Requested format, `None` keeps the stored format.
    pub format: Option<PixelFormat>,
    /// Requested MSAA samples, `None` keeps the stored count.
    pub samples: Option<u32>,
}

impl BindRequest {
    /// Size-only request.
    #[must_use]
    pub const fn sized(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            format: None,
            samples: None,
        }
    }

    /// Sets the requested format.
    #[must_use]
    pub const fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the requested sample count.
    #[must_use]
    pub const fn with_samples(mut self, samples: u32) -> Self {
        self.samples = Some(samples);
        self
    }
}

/// What a [`ResourceRegistry::bind`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindOutcome {
    /// Size is zero on an axis; nothing is allocated.
    Unallocated,
    /// Existing storage already matched the request.
    Reused,
    /// Storage was (re)allocated in place.
    Allocated,
    /// Format or samples changed: the old object was deferred and a new one
    /// allocated.
    Recreated,
}

/// Read-only snapshot of a registry entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramebufferInfo {
    /// Symbolic name.
    pub name: String,
    /// Stored width.
    pub width: u32,
    /// Stored height.
    pub height: u32,
    /// Stored format.
    pub format: PixelFormat,
    /// Stored MSAA samples.
    pub samples: u32,
    /// Current GPU object.
    pub object: ObjectId,
    /// Whether the GPU object holds storage.
    pub allocated: bool,
    /// Number of live handles.
    pub ref_count: usize,
}

/// State of one named render target.
#[derive(Debug)]
struct NamedResource {
    width: u32,
    height: u32,
    format: PixelFormat,
    samples: u32,
    /// `None` once the entry has been removed and the object deferred.
    object: Option<FramebufferObject>,
}

impl NamedResource {
    fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::default(),
            samples: 0,
            object: Some(FramebufferObject::new()),
        }
    }

    const fn desc(&self) -> FramebufferDesc {
        FramebufferDesc {
            width: self.width,
            height: self.height,
            format: self.format,
            samples: self.samples,
        }
    }
}

#[derive(Debug)]
struct ResourceSlot {
    name: String,
    state: Mutex<NamedResource>,
}

#[derive(Debug)]
struct Entry {
    slot: Arc<ResourceSlot>,
    refs: usize,
}

#[derive(Debug)]
struct RegistryShared {
    entries: Mutex<HashMap<String, Entry>>,
    deferred: Mutex<Vec<FramebufferObject>>,
    textures: Arc<TextureCatalog>,
}

impl RegistryShared {
    fn defer(&self, object: FramebufferObject) {
        tracing::trace!(object = %object.id(), "framebuffer deferred for deletion");
        self.deferred.lock().push(object);
    }

    fn retain(&self, slot: &Arc<ResourceSlot>) {
        let mut entries = self.entries.lock();
        match entries.get_mut(&slot.name) {
            Some(entry) if Arc::ptr_eq(&entry.slot, slot) => entry.refs += 1,
            _ => tracing::error!(name = %slot.name, "cloned a framebuffer handle whose entry is gone"),
        }
    }

    fn release(&self, slot: &Arc<ResourceSlot>) -> ResourceResult<()> {
        let mut entries = self.entries.lock();
        let entry = match entries.get_mut(&slot.name) {
            Some(entry) if Arc::ptr_eq(&entry.slot, slot) && entry.refs > 0 => entry,
            _ => {
                return Err(ResourceError::NotAcquired {
                    name: slot.name.clone(),
                })
            }
        };

        entry.refs -= 1;
        if entry.refs > 0 {
            return Ok(());
        }

        entries.remove(&slot.name);
        let object = slot.state.lock().object.take();
        drop(entries);

        if let Some(object) = object {
            self.withdraw_texture(&slot.name, object.id());
            self.defer(object);
        }
        tracing::debug!(name = %slot.name, "framebuffer released");
        Ok(())
    }

    fn withdraw_texture(&self, name: &str, object: ObjectId) {
        let ours = self
            .textures
            .get(name)
            .is_some_and(|t| t.source == TextureSource::Framebuffer && t.object == object);
        if ours {
            self.textures.withdraw(name);
        }
    }
}

/// Shared, reference-counted access to a named render target.
///
/// `Clone` takes another reference, `Drop` gives it back. When the last
/// handle goes, the name is free for reuse at once and the GPU object waits
/// in the deferred deletion queue.
pub struct FramebufferHandle {
    shared: Arc<RegistryShared>,
    slot: Arc<ResourceSlot>,
    released: bool,
}

impl FramebufferHandle {
    /// Returns the symbolic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.slot.name
    }
}

impl Clone for FramebufferHandle {
    fn clone(&self) -> Self {
        self.shared.retain(&self.slot);
        Self {
            shared: Arc::clone(&self.shared),
            slot: Arc::clone(&self.slot),
            released: false,
        }
    }
}

impl Drop for FramebufferHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.shared.release(&self.slot) {
            tracing::error!(%err, "framebuffer handle dropped twice");
        }
    }
}

impl fmt::Debug for FramebufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferHandle")
            .field("name", &self.slot.name)
            .finish_non_exhaustive()
    }
}

/// Name-addressed registry of shared framebuffers.
///
/// Cheap to clone; clones share the same map and deferred queue.
///
/// ## Usage
///
/// ```rust
/// use pof_core::{BindRequest, HeadlessDevice, ResourceRegistry};
///
/// let registry = ResourceRegistry::new();
/// let mut device = HeadlessDevice::new();
///
/// let cam = registry.acquire("cam");
/// registry.bind(&cam, &mut device, BindRequest::sized(640.0, 480.0)).unwrap();
/// drop(cam);
///
/// // once per frame, render thread
/// registry.drain_deferred_deletions(&mut device);
/// ```
#[derive(Clone, Debug)]
pub struct ResourceRegistry {
    shared: Arc<RegistryShared>,
}

impl ResourceRegistry {
    /// Creates a registry with a private texture catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_textures(Arc::new(TextureCatalog::new()))
    }

    /// Creates a registry publishing framebuffer textures into `textures`.
    #[must_use]
    pub fn with_textures(textures: Arc<TextureCatalog>) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                entries: Mutex::new(HashMap::new()),
                deferred: Mutex::new(Vec::new()),
                textures,
            }),
        }
    }

    /// Returns the texture catalog this registry publishes into.
    #[must_use]
    pub fn textures(&self) -> &Arc<TextureCatalog> {
        &self.shared.textures
    }

    /// Takes a reference to the resource named `name`, creating an empty,
    /// unallocated one on first use. Never fails; any string is a valid name.
    #[must_use]
    pub fn acquire(&self, name: &str) -> FramebufferHandle {
        let mut entries = self.shared.entries.lock();
        let slot = match entries.get_mut(name) {
            Some(entry) => {
                entry.refs += 1;
                Arc::clone(&entry.slot)
            }
            None => {
                let slot = Arc::new(ResourceSlot {
                    name: name.to_owned(),
                    state: Mutex::new(NamedResource::new()),
                });
                entries.insert(
                    name.to_owned(),
                    Entry {
                        slot: Arc::clone(&slot),
                        refs: 1,
                    },
                );
                tracing::debug!(name, "framebuffer created");
                slot
            }
        };
        drop(entries);

        FramebufferHandle {
            shared: Arc::clone(&self.shared),
            slot,
            released: false,
        }
    }

    /// Gives back the reference held by `handle`.
    ///
    /// Equivalent to dropping it, but reports contract violations.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotAcquired`] if the entry has no outstanding
    /// reference.
    pub fn release(&self, mut handle: FramebufferHandle) -> ResourceResult<()> {
        handle.released = true;
        let result = handle.shared.release(&handle.slot);
        if let Err(err) = &result {
            tracing::error!(%err, "framebuffer release contract violated");
        }
        result
    }

    /// Sizes the resource for drawing. Render thread only.
    ///
    /// - negative sizes clamp to 0, a 0 keeps the stored dimension
    /// - format or sample change: old object deferred, new one allocated
    /// - otherwise reallocates only when unallocated or the size differs
    ///
    /// Publishes the resource texture under its name when allocated.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Device`] if the device rejects the allocation. The
    /// resource is then left unallocated.
    pub fn bind(
        &self,
        handle: &FramebufferHandle,
        device: &mut dyn GpuDevice,
        request: BindRequest,
    ) -> ResourceResult<BindOutcome> {
        let width = clamp_dimension(request.width);
        let height = clamp_dimension(request.height);

        let mut state = handle.slot.state.lock();
        if width != 0 {
            state.width = width;
        }
        if height != 0 {
            state.height = height;
        }
        if state.width == 0 || state.height == 0 {
            return Ok(BindOutcome::Unallocated);
        }

        let format_changed = request.format.is_some_and(|f| f != state.format);
        let samples_changed = request.samples.is_some_and(|s| s != state.samples);

        let mut outcome = BindOutcome::Reused;
        if format_changed || samples_changed {
            if let Some(old) = state.object.replace(FramebufferObject::new()) {
                self.shared.withdraw_texture(&handle.slot.name, old.id());
                self.shared.defer(old);
            }
            if let Some(format) = request.format {
                state.format = format;
            }
            if let Some(samples) = request.samples {
                state.samples = samples;
            }
            outcome = BindOutcome::Recreated;
        }

        let desc = state.desc();
        let Some(object) = state.object.as_mut() else {
            return Ok(BindOutcome::Unallocated);
        };

        let stale = object
            .allocation()
            .map_or(true, |a| a.width != desc.width || a.height != desc.height);
        if stale {
            if let Err(err) = device.allocate(object, &desc) {
                object.mark_unallocated();
                self.shared.withdraw_texture(&handle.slot.name, object.id());
                tracing::error!(name = %handle.slot.name, %err, "framebuffer allocation failed");
                return Err(err.into());
            }
            object.mark_allocated(desc);
            tracing::debug!(
                name = %handle.slot.name,
                object = %object.id(),
                width = desc.width,
                height = desc.height,
                format = %desc.format,
                samples = desc.samples,
                "framebuffer allocated"
            );
            if outcome == BindOutcome::Reused {
                outcome = BindOutcome::Allocated;
            }
        }

        self.shared.textures.publish(
            &handle.slot.name,
            TextureInfo {
                object: object.id(),
                width: desc.width,
                height: desc.height,
                source: TextureSource::Framebuffer,
            },
        );
        Ok(outcome)
    }

    /// Applies the `quality` flag (linear vs nearest sampling) when the
    /// resource is allocated. Render thread only.
    pub fn set_quality(&self, handle: &FramebufferHandle, device: &mut dyn GpuDevice, quality: bool) {
        let filter = TextureFilter::from_quality(quality);
        let mut state = handle.slot.state.lock();
        if let Some(object) = state.object.as_mut() {
            if object.is_allocated() && object.filter() != filter {
                device.set_filter(object, filter);
                object.record_filter(filter);
            }
        }
    }

    /// Snapshot of the resource behind `handle`.
    #[must_use]
    pub fn info(&self, handle: &FramebufferHandle) -> FramebufferInfo {
        let refs = self.ref_count(handle.name()).unwrap_or(0);
        snapshot(&handle.slot, refs)
    }

    /// Side-effect-free lookup by name. Never creates an entry.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<FramebufferInfo> {
        let (slot, refs) = {
            let entries = self.shared.entries.lock();
            let entry = entries.get(name)?;
            (Arc::clone(&entry.slot), entry.refs)
        };
        Some(snapshot(&slot, refs))
    }

    /// Number of live handles for `name`, `None` if no such entry.
    #[must_use]
    pub fn ref_count(&self, name: &str) -> Option<usize> {
        self.shared.entries.lock().get(name).map(|e| e.refs)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Returns whether no resource is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.entries.lock().is_empty()
    }

    /// Number of objects waiting in the deferred deletion queue.
    #[must_use]
    pub fn pending_deletions(&self) -> usize {
        self.shared.deferred.lock().len()
    }

    /// Destroys every deferred object. Render thread, once per frame, before
    /// any allocation of that frame. Returns the number destroyed.
    pub fn drain_deferred_deletions(&self, device: &mut dyn GpuDevice) -> usize {
        let doomed = std::mem::take(&mut *self.shared.deferred.lock());
        let count = doomed.len();
        for object in doomed {
            tracing::trace!(object = %object.id(), "framebuffer destroyed");
            device.destroy(object);
        }
        count
    }

    /// Reallocates every sized resource after the graphics context was
    /// recreated. Returns the number of resources restored.
    pub fn restore_all(&self, device: &mut dyn GpuDevice) -> usize {
        let slots: Vec<Arc<ResourceSlot>> = self
            .shared
            .entries
            .lock()
            .values()
            .map(|e| Arc::clone(&e.slot))
            .collect();

        let mut restored = 0;
        for slot in slots {
            let mut state = slot.state.lock();
            if state.width == 0 || state.height == 0 {
                continue;
            }
            let desc = state.desc();
            let Some(object) = state.object.as_mut() else {
                continue;
            };
            match device.allocate(object, &desc) {
                Ok(()) => {
                    object.mark_allocated(desc);
                    restored += 1;
                }
                Err(err) => {
                    object.mark_unallocated();
                    self.shared.withdraw_texture(&slot.name, object.id());
                    tracing::error!(name = %slot.name, %err, "framebuffer restore failed");
                }
            }
        }
        restored
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_dimension(value: f32) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value as u32
    }
}

fn snapshot(slot: &ResourceSlot, refs: usize) -> FramebufferInfo {
    let state = slot.state.lock();
    let (object, allocated) = state
        .object
        .as_ref()
        .map_or((ObjectId::NONE, false), |o| (o.id(), o.is_allocated()));
    FramebufferInfo {
        name: slot.name.clone(),
        width: state.width,
        height: state.height,
        format: state.format,
        samples: state.samples,
        object,
        allocated,
        ref_count: refs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;

    #[test]
    fn test_acquire_twice_release_twice() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();

        let a = registry.acquire("cam");
        let b = registry.acquire("cam");
        assert_eq!(registry.ref_count("cam"), Some(2));

        registry.release(a).unwrap();
        assert_eq!(registry.ref_count("cam"), Some(1));
        assert_eq!(registry.pending_deletions(), 0);

        registry.release(b).unwrap();
        assert_eq!(registry.ref_count("cam"), None);
        assert_eq!(registry.pending_deletions(), 1);

        assert_eq!(registry.drain_deferred_deletions(&mut device), 1);
        assert_eq!(registry.pending_deletions(), 0);
        assert_eq!(device.stats().destructions, 1);
    }

    #[test]
    fn test_clone_and_drop_count() {
        let registry = ResourceRegistry::new();
        let a = registry.acquire("x");
        let b = a.clone();
        assert_eq!(registry.ref_count("x"), Some(2));
        drop(a);
        assert_eq!(registry.ref_count("x"), Some(1));
        drop(b);
        assert!(registry.is_empty());
        assert_eq!(registry.pending_deletions(), 1);
    }

    #[test]
    fn test_name_reusable_after_last_release() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();

        let first = registry.acquire("bg");
        registry.bind(&first, &mut device, BindRequest::sized(8.0, 8.0)).unwrap();
        let old_object = registry.info(&first).object;
        drop(first);

        let second = registry.acquire("bg");
        let fresh = registry.info(&second);
        assert_ne!(fresh.object, old_object);
        assert!(!fresh.allocated);
        assert_eq!((fresh.width, fresh.height), (0, 0));
        assert_eq!(fresh.ref_count, 1);

        // the old object only lives in the queue
        assert_eq!(registry.pending_deletions(), 1);
        assert!(device.storage(old_object).is_some());
        registry.drain_deferred_deletions(&mut device);
        assert!(device.storage(old_object).is_none());
    }

    #[test]
    fn test_bind_idempotent() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("a");

        let req = BindRequest::sized(320.0, 240.0);
        assert_eq!(registry.bind(&fb, &mut device, req).unwrap(), BindOutcome::Allocated);
        assert_eq!(registry.bind(&fb, &mut device, req).unwrap(), BindOutcome::Reused);
        assert_eq!(device.stats().allocations, 1);
    }

    #[test]
    fn test_bind_resize_in_place() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("a");

        registry.bind(&fb, &mut device, BindRequest::sized(100.0, 100.0)).unwrap();
        let object = registry.info(&fb).object;
        assert_eq!(
            registry.bind(&fb, &mut device, BindRequest::sized(200.0, 50.0)).unwrap(),
            BindOutcome::Allocated
        );

        let info = registry.info(&fb);
        assert_eq!(info.object, object);
        assert_eq!((info.width, info.height), (200, 50));
        assert_eq!(registry.pending_deletions(), 0);
    }

    #[test]
    fn test_bind_format_change_recreates() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("a");

        registry.bind(&fb, &mut device, BindRequest::sized(64.0, 64.0)).unwrap();
        let before = registry.info(&fb).object;

        let outcome = registry
            .bind(&fb, &mut device, BindRequest::sized(64.0, 64.0).with_format(PixelFormat::Rgba16))
            .unwrap();
        assert_eq!(outcome, BindOutcome::Recreated);

        let after = registry.info(&fb);
        assert_ne!(after.object, before);
        assert_eq!(after.format, PixelFormat::Rgba16);
        assert!(after.allocated);
        assert_eq!(registry.pending_deletions(), 1);

        // same format again is a no-op
        let outcome = registry
            .bind(&fb, &mut device, BindRequest::sized(64.0, 64.0).with_format(PixelFormat::Rgba16))
            .unwrap();
        assert_eq!(outcome, BindOutcome::Reused);
    }

    #[test]
    fn test_bind_samples_change_recreates() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("a");

        registry.bind(&fb, &mut device, BindRequest::sized(10.0, 10.0)).unwrap();
        let outcome = registry
            .bind(&fb, &mut device, BindRequest::sized(10.0, 10.0).with_samples(4))
            .unwrap();
        assert_eq!(outcome, BindOutcome::Recreated);
        assert_eq!(registry.info(&fb).samples, 4);
        assert_eq!(device.stats().allocations, 2);
    }

    #[test]
    fn test_negative_size_stays_unallocated() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("neg");

        let outcome = registry.bind(&fb, &mut device, BindRequest::sized(-5.0, 100.0)).unwrap();
        assert_eq!(outcome, BindOutcome::Unallocated);
        assert!(!registry.info(&fb).allocated);
        assert_eq!(device.stats().allocations, 0);
        assert!(registry.textures().get("neg").is_none());
    }

    #[test]
    fn test_zero_keeps_stored_size() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("k");

        registry.bind(&fb, &mut device, BindRequest::sized(30.0, 20.0)).unwrap();
        assert_eq!(registry.bind(&fb, &mut device, BindRequest::sized(0.0, 0.0)).unwrap(), BindOutcome::Reused);
        let info = registry.info(&fb);
        assert_eq!((info.width, info.height), (30, 20));
    }

    #[test]
    fn test_allocation_failure_leaves_unallocated() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::with_max_dimension(100);
        let fb = registry.acquire("big");

        assert!(matches!(
            registry.bind(&fb, &mut device, BindRequest::sized(4096.0, 4096.0)),
            Err(ResourceError::Device(_))
        ));
        assert!(!registry.info(&fb).allocated);
    }

    #[test]
    fn test_texture_published_and_withdrawn() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("tex");

        registry.bind(&fb, &mut device, BindRequest::sized(16.0, 8.0)).unwrap();
        let texture = registry.textures().get("tex").unwrap();
        assert_eq!((texture.width, texture.height), (16, 8));
        assert_eq!(texture.source, TextureSource::Framebuffer);

        drop(fb);
        assert!(registry.textures().get("tex").is_none());
    }

    #[test]
    fn test_lookup_is_side_effect_free() {
        let registry = ResourceRegistry::new();
        assert!(registry.lookup("ghost").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_set_quality_only_when_allocated() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("q");

        registry.set_quality(&fb, &mut device, false);
        let object = registry.info(&fb).object;
        assert!(device.filter(object).is_none());

        registry.bind(&fb, &mut device, BindRequest::sized(4.0, 4.0)).unwrap();
        registry.set_quality(&fb, &mut device, false);
        assert_eq!(device.filter(object), Some(TextureFilter::Nearest));
    }

    #[test]
    fn test_restore_all_after_context_loss() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let sized = registry.acquire("sized");
        let _empty = registry.acquire("empty");
        registry.bind(&sized, &mut device, BindRequest::sized(32.0, 32.0)).unwrap();

        device.lose_context();
        device.restore();
        assert_eq!(registry.restore_all(&mut device), 1);
        assert!(device.storage(registry.info(&sized).object).is_some());
    }

    #[test]
    fn test_failed_recreate_withdraws_texture() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::with_max_dimension(100);
        let fb = registry.acquire("bg");
        registry.bind(&fb, &mut device, BindRequest::sized(64.0, 64.0)).unwrap();
        let old = registry.info(&fb).object;
        assert_eq!(registry.textures().get("bg").map(|t| t.object), Some(old));

        let request = BindRequest::sized(4096.0, 64.0).with_format(PixelFormat::Rgba16);
        assert!(registry.bind(&fb, &mut device, request).is_err());
        registry.drain_deferred_deletions(&mut device);

        assert!(!registry.info(&fb).allocated);
        assert!(device.storage(old).is_none());
        assert!(registry.textures().get("bg").is_none());
    }

    #[test]
    fn test_failed_resize_withdraws_texture() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::with_max_dimension(100);
        let fb = registry.acquire("grow");
        registry.bind(&fb, &mut device, BindRequest::sized(50.0, 50.0)).unwrap();

        assert!(registry.bind(&fb, &mut device, BindRequest::sized(500.0, 50.0)).is_err());
        assert!(registry.textures().get("grow").is_none());

        // a later successful bind publishes again
        registry.bind(&fb, &mut device, BindRequest::sized(80.0, 80.0)).unwrap();
        assert_eq!(registry.textures().get("grow").map(|t| t.width), Some(80));
    }

    #[test]
    fn test_failed_restore_withdraws_texture() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("lost");
        registry.bind(&fb, &mut device, BindRequest::sized(16.0, 16.0)).unwrap();

        device.lose_context();
        assert_eq!(registry.restore_all(&mut device), 0);
        assert!(!registry.info(&fb).allocated);
        assert!(registry.textures().get("lost").is_none());
    }

    #[test]
    fn test_quality_survives_context_restore() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("q");
        registry.bind(&fb, &mut device, BindRequest::sized(8.0, 8.0)).unwrap();
        registry.set_quality(&fb, &mut device, false);
        let object = registry.info(&fb).object;
        assert_eq!(device.filter(object), Some(TextureFilter::Nearest));

        device.lose_context();
        device.restore();
        assert_eq!(registry.restore_all(&mut device), 1);
        registry.bind(&fb, &mut device, BindRequest::sized(8.0, 8.0)).unwrap();
        registry.set_quality(&fb, &mut device, false);
        assert_eq!(device.filter(object), Some(TextureFilter::Nearest));
    }

    #[test]
    fn test_quality_reapplied_after_resize() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("r");
        registry.bind(&fb, &mut device, BindRequest::sized(8.0, 8.0)).unwrap();
        registry.set_quality(&fb, &mut device, false);

        registry.bind(&fb, &mut device, BindRequest::sized(16.0, 16.0)).unwrap();
        let object = registry.info(&fb).object;
        assert_eq!(device.filter(object), None);
        registry.set_quality(&fb, &mut device, false);
        assert_eq!(device.filter(object), Some(TextureFilter::Nearest));
    }

    #[test]
    fn test_release_from_other_thread_is_deferred() {
        let registry = ResourceRegistry::new();
        let mut device = HeadlessDevice::new();
        let fb = registry.acquire("shared");
        registry.bind(&fb, &mut device, BindRequest::sized(8.0, 8.0)).unwrap();

        std::thread::spawn(move || drop(fb)).join().unwrap();

        assert_eq!(device.stats().destructions, 0);
        assert_eq!(registry.pending_deletions(), 1);
        registry.drain_deferred_deletions(&mut device);
        assert_eq!(device.stats().destructions, 1);
        assert_eq!(device.stats().live, 0);
    }
}
