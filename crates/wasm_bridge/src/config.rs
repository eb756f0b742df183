//! Runtime configuration for hosting a module.
//!
//! Values come from `BRIDGE_*` environment variables, optionally overridden by
//! positional command line arguments, or are constructed programmatically.

use std::env;
use std::path::PathBuf;
use wgpu::{PowerPreference, PresentMode};
use winit::dpi::PhysicalSize;

/// Shader directory used when none is configured.
pub const DEFAULT_SHADER_DIR: &str = "shaders";
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Runtime configuration for the bridge and the player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Path to the `.wasm` module, if one was given.
    pub module_path: Option<PathBuf>,
    /// Directory holding `<name>.wgsl` / `<name>.json` shader assets.
    pub shader_dir: PathBuf,
    /// Whether presentation waits for vertical sync.
    pub vsync: bool,
    /// Whether to prefer a low-power adapter.
    pub low_power: bool,
    /// Initial window or headless target width.
    pub width: u32,
    /// Initial window or headless target height.
    pub height: u32,
}

impl BridgeConfig {
    /// Construct a configuration with explicit values. Sizes are clamped to at least 1.
    #[inline]
    #[must_use]
    pub fn new(
        module_path: Option<PathBuf>,
        shader_dir: PathBuf,
        vsync: bool,
        low_power: bool,
        size: (u32, u32),
    ) -> Self {
        Self {
            module_path,
            shader_dir,
            vsync,
            low_power,
            width: size.0.max(1),
            height: size.1.max(1),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// - `BRIDGE_MODULE`: path to the module
    /// - `BRIDGE_SHADERS`: shader directory (default: `shaders`)
    /// - `BRIDGE_VSYNC`: set to "0" to disable vsync (default: enabled)
    /// - `BRIDGE_LOW_POWER`: set to "1" to request a low-power adapter
    /// - `BRIDGE_WIDTH` / `BRIDGE_HEIGHT`: initial size (default: 1280x720)
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let dimension = |key: &str, default: u32| {
            lookup(key)
                .and_then(|val| val.parse::<u32>().ok())
                .filter(|val| *val > 0)
                .unwrap_or(default)
        };
        Self {
            module_path: lookup("BRIDGE_MODULE")
                .filter(|val| !val.is_empty())
                .map(PathBuf::from),
            shader_dir: lookup("BRIDGE_SHADERS")
                .filter(|val| !val.is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_SHADER_DIR), PathBuf::from),
            vsync: lookup("BRIDGE_VSYNC").as_deref() != Some("0"),
            low_power: lookup("BRIDGE_LOW_POWER").as_deref() == Some("1"),
            width: dimension("BRIDGE_WIDTH", DEFAULT_WIDTH),
            height: dimension("BRIDGE_HEIGHT", DEFAULT_HEIGHT),
        }
    }

    /// Override the module path and shader directory with positional arguments.
    ///
    /// The first argument is the module, the second the shader directory.
    #[must_use]
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        if let Some(module) = args.next() {
            self.module_path = Some(PathBuf::from(module));
        }
        if let Some(shaders) = args.next() {
            self.shader_dir = PathBuf::from(shaders);
        }
        self
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub const fn present_mode(&self) -> PresentMode {
        if self.vsync {
            PresentMode::AutoVsync
        } else {
            PresentMode::AutoNoVsync
        }
    }

    #[inline]
    #[must_use]
    pub const fn power_preference(&self) -> PowerPreference {
        if self.low_power {
            PowerPreference::LowPower
        } else {
            PowerPreference::HighPerformance
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(
            None,
            PathBuf::from(DEFAULT_SHADER_DIR),
            true,
            false,
            (DEFAULT_WIDTH, DEFAULT_HEIGHT),
        )
    }
}
