//! # POF Core
//!
//! Shared GPU render targets for a scene graph whose nodes are driven by
//! scripts:
//! - a name-addressed, reference-counted framebuffer registry
//! - deferred GPU deletion, drained once per frame on the render thread
//! - an address-string exchange so scripts can name native objects
//!
//! ## Threading Rules
//!
//! 1. **Only the render thread touches the GPU** - every call that allocates
//!    or destroys takes `&mut dyn GpuDevice`
//! 2. **Release is safe anywhere** - dropping the last handle only enqueues
//! 3. **Lookups never create** - only `acquire` brings a resource to life
//!
//! ## Example
//!
//! ```rust
//! use pof_core::{BindRequest, HeadlessDevice, ResourceRegistry, SymbolExchange};
//!
//! let registry = ResourceRegistry::new();
//! let exchange = SymbolExchange::new();
//! let mut device = HeadlessDevice::new();
//!
//! let cam = registry.acquire("cam");
//! registry.bind(&cam, &mut device, BindRequest::sized(320.0, 240.0)).unwrap();
//!
//! let address = exchange.encode("cam");
//! assert!(exchange.resolve_framebuffer(&registry, &address).is_some());
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod catalog;
pub mod device;
pub mod error;
pub mod registry;
pub mod symbol;

pub use catalog::{Catalog, FontCatalog, FontInfo, TextureCatalog, TextureInfo, TextureSource};
pub use device::{
    DeviceStats, FramebufferDesc, FramebufferObject, GpuDevice, HeadlessDevice, ObjectId, PixelFormat, TextureFilter,
};
pub use error::{DeviceError, ResourceError, ResourceResult};
pub use registry::{BindOutcome, BindRequest, FramebufferHandle, FramebufferInfo, ResourceRegistry};
pub use symbol::{SymbolAddress, SymbolExchange};
