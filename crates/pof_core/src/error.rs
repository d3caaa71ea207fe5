//! # Core Error Types
//!
//! Errors raised by the GPU device seam and the resource registry.

use thiserror::Error;

use crate::device::PixelFormat;

/// Errors reported by a [`GpuDevice`](crate::device::GpuDevice) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not provide storage for the requested framebuffer.
    #[error("framebuffer allocation failed: {width}x{height} {format:?} x{samples}: {reason}")]
    AllocationFailed {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Requested pixel format.
        format: PixelFormat,
        /// Requested MSAA sample count.
        samples: u32,
        /// Backend-specific reason.
        reason: String,
    },

    /// The graphics context is gone (lost or not yet created).
    #[error("graphics context unavailable")]
    ContextLost,
}

/// Errors that can occur in the resource registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// `release` was called for a name with no outstanding reference.
    ///
    /// This is a lifetime bug in the caller, not transient script content.
    #[error("release of '{name}' without an outstanding reference")]
    NotAcquired {
        /// Name of the resource.
        name: String,
    },

    /// The device refused to allocate the resource.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Result type for registry operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
