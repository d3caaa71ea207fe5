//! # Configuration
//!
//! Loaded once at startup from TOML.
//!
//! ```toml
//! search_paths = ["scripts", "media"]
//!
//! [framebuffer]
//! format = "RGBA16"
//! quality = false
//!
//! [[fonts]]
//! name = "sans"
//! path = "media/DejaVuSans.ttf"
//! size = 14.0
//!
//! [[framebuffers]]
//! name = "feedback"
//! width = 640.0
//! height = 480.0
//!
//! [[scripts]]
//! name = "ctl"
//! file = "ctl.lua"
//! code = "M.speed = 2"
//! ```

use std::path::{Path, PathBuf};

use pof_core::PixelFormat;
use serde::{Deserialize, Serialize};

use crate::error::{PofError, PofResult};

/// Root configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PofConfig {
    /// Directories searched for script files, in order.
    pub search_paths: Vec<PathBuf>,
    /// Defaults for framebuffer nodes.
    pub framebuffer: FramebufferDefaults,
    /// Headless run settings.
    pub run: RunConfig,
    /// Fonts published in the font catalog.
    pub fonts: Vec<FontConfig>,
    /// Framebuffer nodes of the scene.
    pub framebuffers: Vec<FramebufferNodeConfig>,
    /// Script nodes of the scene.
    pub scripts: Vec<ScriptNodeConfig>,
}

impl PofConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// [`PofError::Config`] on invalid TOML or unknown values.
    pub fn from_toml_str(text: &str) -> PofResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file. Relative search paths are taken
    /// relative to the file's directory.
    ///
    /// # Errors
    ///
    /// [`PofError::Io`] if the file cannot be read, [`PofError::Config`] if
    /// it does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> PofResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PofError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;

        if let Some(base) = path.parent() {
            for dir in &mut config.search_paths {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
            if config.search_paths.is_empty() {
                config.search_paths.push(base.to_path_buf());
            }
        }
        Ok(config)
    }
}

/// Values applied to framebuffer nodes that do not set them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramebufferDefaults {
    /// Pixel format; unset keeps whatever the shared resource has.
    pub format: Option<PixelFormat>,
    /// MSAA samples; unset keeps whatever the shared resource has.
    pub samples: Option<u32>,
    /// Linear (true) or nearest (false) sampling.
    pub quality: bool,
    /// Clear before drawing children.
    pub clear: bool,
}

impl Default for FramebufferDefaults {
    fn default() -> Self {
        Self {
            format: None,
            samples: None,
            quality: true,
            clear: false,
        }
    }
}

/// Headless run settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Frames to run.
    pub frames: u32,
    /// Reject allocations above this dimension (simulates a small GPU).
    pub max_dimension: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frames: 60,
            max_dimension: None,
        }
    }
}

/// A font to publish.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    /// Catalog name.
    pub name: String,
    /// Font file.
    pub path: PathBuf,
    /// Size in points.
    #[serde(default = "default_font_size")]
    pub size: f32,
}

const fn default_font_size() -> f32 {
    12.0
}

/// One framebuffer node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramebufferNodeConfig {
    /// Shared resource name; unset gives the node a private one.
    pub name: Option<String>,
    /// Requested width.
    pub width: f32,
    /// Requested height.
    pub height: f32,
    /// Requested format.
    pub format: Option<PixelFormat>,
    /// Requested samples.
    pub samples: Option<u32>,
    /// Overrides the default sampling quality.
    pub quality: Option<bool>,
    /// Overrides the default clear flag.
    pub clear: Option<bool>,
    /// Render children into the target (false: only show the last image).
    pub update: bool,
}

impl Default for FramebufferNodeConfig {
    fn default() -> Self {
        Self {
            name: None,
            width: 0.0,
            height: 0.0,
            format: None,
            samples: None,
            quality: None,
            clear: None,
            update: true,
        }
    }
}

/// One script node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptNodeConfig {
    /// Namespace name; unset or taken gives the node a private one.
    pub name: Option<String>,
    /// Script file, looked up through the search path.
    pub file: Option<String>,
    /// Inline code run after the file.
    pub code: String,
}
