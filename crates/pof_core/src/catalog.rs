//! # Named Catalogs
//!
//! Name-addressed tables of native objects that scripts may look up through
//! the symbol exchange: textures (published by framebuffers, images, video
//! players) and fonts.
//!
//! Lookups never create entries. Only the owner of an object publishes or
//! withdraws it.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::device::ObjectId;

/// Where a catalogued texture comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureSource {
    /// Colour attachment of a shared framebuffer.
    Framebuffer,
    /// Any other host object (image, video frame, ...).
    External,
}

/// A texture that scripts can draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    /// GPU object backing the texture.
    pub object: ObjectId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Publisher kind.
    pub source: TextureSource,
}

/// A loaded font face.
#[derive(Clone, Debug, PartialEq)]
pub struct FontInfo {
    /// Font file the face was loaded from.
    pub path: PathBuf,
    /// Nominal size in points.
    pub size: f32,
}

/// Thread-safe name → value table.
#[derive(Debug)]
pub struct Catalog<T> {
    entries: RwLock<HashMap<String, T>>,
}

impl<T: Clone> Catalog<T> {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Publishes `value` under `name`, returning the value it replaced.
    pub fn publish(&self, name: &str, value: T) -> Option<T> {
        self.entries.write().insert(name.to_owned(), value)
    }

    /// Withdraws the entry under `name`.
    pub fn withdraw(&self, name: &str) -> Option<T> {
        self.entries.write().remove(name)
    }

    /// Returns a copy of the entry under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<T> {
        self.entries.read().get(name).cloned()
    }

    /// Returns whether `name` is published.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Returns the number of published entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Clone> Default for Catalog<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Catalog of drawable textures.
pub type TextureCatalog = Catalog<TextureInfo>;

/// Catalog of font faces.
pub type FontCatalog = Catalog<FontInfo>;
