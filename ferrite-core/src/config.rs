use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::{FerriteError, FerriteResult};

/// Engine settings. `Default` gives a working configuration; `from_env` layers
/// `FERRITE_*` environment overrides on top.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub app_name: String,
    pub app_version: u32,
    /// Index into the enumerated physical devices. Ignored when that device cannot
    /// render to the window surface.
    pub preferred_device: Option<usize>,
    pub validation: bool,
    /// Bound on every fence wait and image acquire.
    pub fence_timeout: Duration,
    pub staging_capacity: u64,
    pub max_meshes: u32,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub clear_color: [f32; 4],
}

pub const DEFAULT_STAGING_CAPACITY: u64 = 20 * 1024 * 1024;
pub const DEFAULT_MAX_MESHES: u32 = 256;
pub const DEFAULT_SHADER_DIR: &str = "assets/shaders";

const VERTEX_SHADER_FILE: &str = "mesh.vert";
const FRAGMENT_SHADER_FILE: &str = "mesh.frag";

impl Default for EngineConfig {
    fn default() -> Self {
        let shader_dir = PathBuf::from(DEFAULT_SHADER_DIR);
        Self {
            app_name: "Ferrite".to_string(),
            app_version: 1,
            preferred_device: None,
            validation: cfg!(debug_assertions),
            fence_timeout: Duration::from_secs(1),
            staging_capacity: DEFAULT_STAGING_CAPACITY,
            max_meshes: DEFAULT_MAX_MESHES,
            vertex_shader: shader_dir.join(VERTEX_SHADER_FILE),
            fragment_shader: shader_dir.join(FRAGMENT_SHADER_FILE),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Rejects settings no engine can run with.
    pub fn validate(&self) -> FerriteResult<()> {
        if self.staging_capacity == 0 {
            return Err(FerriteError::InvalidConfig("staging_capacity must be at least one byte".into()));
        }
        if self.max_meshes == 0 {
            return Err(FerriteError::InvalidConfig("max_meshes must be at least one".into()));
        }
        if self.fence_timeout.is_zero() {
            return Err(FerriteError::InvalidConfig("fence_timeout must be positive".into()));
        }
        Ok(())
    }

    /// Applies `FERRITE_DEVICE_INDEX`, `FERRITE_VALIDATION`, `FERRITE_FENCE_TIMEOUT_MS`,
    /// `FERRITE_STAGING_BYTES` and `FERRITE_SHADER_DIR` as returned by `lookup`.
    /// Unparseable values are skipped.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("FERRITE_DEVICE_INDEX") {
            match value.trim().parse::<usize>() {
                Ok(index) => self.preferred_device = Some(index),
                Err(_) => warn!("Ignoring FERRITE_DEVICE_INDEX={:?}: not a device index", value),
            }
        }

        if let Some(value) = lookup("FERRITE_VALIDATION") {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.validation = true,
                "0" | "false" | "off" | "no" => self.validation = false,
                _ => warn!("Ignoring FERRITE_VALIDATION={:?}: expected a boolean", value),
            }
        }

        if let Some(value) = lookup("FERRITE_FENCE_TIMEOUT_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.fence_timeout = Duration::from_millis(ms),
                _ => warn!("Ignoring FERRITE_FENCE_TIMEOUT_MS={:?}: expected a positive integer", value),
            }
        }

        if let Some(value) = lookup("FERRITE_STAGING_BYTES") {
            match value.trim().parse::<u64>() {
                Ok(bytes) if bytes > 0 => self.staging_capacity = bytes,
                _ => warn!("Ignoring FERRITE_STAGING_BYTES={:?}: expected a positive integer", value),
            }
        }

        if let Some(dir) = lookup("FERRITE_SHADER_DIR") {
            let dir = PathBuf::from(dir);
            self.vertex_shader = dir.join(VERTEX_SHADER_FILE);
            self.fragment_shader = dir.join(FRAGMENT_SHADER_FILE);
        }
    }
}
