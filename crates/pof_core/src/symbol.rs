//! # Symbol Exchange
//!
//! Scripts cannot hold native pointers. Instead they trade *address strings*:
//! opaque tokens minted by the host for a name, later exchanged back for a
//! native lookup.
//!
//! ## Address Layout
//!
//! ```text
//! 0x 0000002a 00000007
//!    └─epoch─┘└─index─┘
//! ```
//!
//! - `index` is a slot in an append-only interner; a name keeps its index for
//!   the lifetime of the exchange, so encoding is deterministic
//! - `epoch` identifies the exchange instance; an address minted by a
//!   different (e.g. torn down) exchange decodes to `None`
//!
//! Decoding never touches a registry: resolution looks names up in a
//! side-effect-free way and only reports what exists right now.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::catalog::{FontCatalog, FontInfo, TextureCatalog, TextureInfo};
use crate::registry::{FramebufferInfo, ResourceRegistry};

static NEXT_EPOCH: AtomicU32 = AtomicU32::new(1);

/// A decoded address string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymbolAddress {
    epoch: u32,
    index: u32,
}

impl SymbolAddress {
    /// Parses `0x` + 16 hex digits. Any other shape yields `None`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.strip_prefix("0x")?;
        if digits.len() != 16 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let epoch = u32::from_str_radix(&digits[..8], 16).ok()?;
        let index = u32::from_str_radix(&digits[8..], 16).ok()?;
        Some(Self { epoch, index })
    }

    /// Exchange instance that minted the address.
    #[must_use]
    pub const fn epoch(self) -> u32 {
        self.epoch
    }

    /// Interner slot.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}{:08x}", self.epoch, self.index)
    }
}

#[derive(Debug, Default)]
struct Interner {
    names: Vec<String>,
    indices: HashMap<String, u32>,
}

/// Host-owned table turning names into address strings and back.
#[derive(Debug)]
pub struct SymbolExchange {
    epoch: u32,
    interner: RwLock<Interner>,
}

impl SymbolExchange {
    /// Creates an exchange with a fresh epoch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            interner: RwLock::new(Interner::default()),
        }
    }

    /// Returns this exchange's epoch.
    #[must_use]
    pub const fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Mints the address string for `name`. Same name, same string.
    pub fn encode(&self, name: &str) -> String {
        if let Some(&index) = self.interner.read().indices.get(name) {
            return self.address(index).to_string();
        }

        let mut interner = self.interner.write();
        // raced with another writer
        if let Some(&index) = interner.indices.get(name) {
            return self.address(index).to_string();
        }
        let index = interner.names.len() as u32;
        interner.names.push(name.to_owned());
        interner.indices.insert(name.to_owned(), index);
        drop(interner);

        tracing::trace!(name, index, "symbol interned");
        self.address(index).to_string()
    }

    /// Returns the name behind `address`, or `None` for malformed, foreign or
    /// never-minted addresses.
    #[must_use]
    pub fn decode(&self, address: &str) -> Option<String> {
        let address = SymbolAddress::parse(address)?;
        if address.epoch != self.epoch {
            return None;
        }
        self.interner.read().names.get(address.index as usize).cloned()
    }

    /// Number of interned names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interner.read().names.len()
    }

    /// Returns whether nothing has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interner.read().names.is_empty()
    }

    /// Resolves a framebuffer address; `None` unless the resource exists and
    /// is allocated.
    #[must_use]
    pub fn resolve_framebuffer(&self, registry: &ResourceRegistry, address: &str) -> Option<FramebufferInfo> {
        let name = self.decode(address)?;
        registry.lookup(&name).filter(|info| info.allocated)
    }

    /// Resolves a texture address.
    #[must_use]
    pub fn resolve_texture(&self, textures: &TextureCatalog, address: &str) -> Option<TextureInfo> {
        textures.get(&self.decode(address)?)
    }

    /// Resolves a font address.
    #[must_use]
    pub fn resolve_font(&self, fonts: &FontCatalog, address: &str) -> Option<FontInfo> {
        fonts.get(&self.decode(address)?)
    }

    const fn address(&self, index: u32) -> SymbolAddress {
        SymbolAddress {
            epoch: self.epoch,
            index,
        }
    }
}

impl Default for SymbolExchange {
    fn default() -> Self {
        Self::new()
    }
}
