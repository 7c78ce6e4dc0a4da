//! Engine configuration.
//!
//! Defaults are compiled in; a few knobs can be overridden through
//! `SUBPASS_*` environment variables:
//!
//! | variable | field | accepted |
//! |---|---|---|
//! | `SUBPASS_FRAMES_IN_FLIGHT` | `frames_in_flight` | 1..=4 |
//! | `SUBPASS_MAX_TEXTURES` | `max_textures` | ≥ 1 |
//! | `SUBPASS_VALIDATION` | `enable_validation` | `0`, `1`, `true`, `false` |
//! | `SUBPASS_FENCE_TIMEOUT_NS` | `fence_timeout_ns` | ≥ 1 |
//! | `SUBPASS_SHADER_DIR` | `shader_dir` | any path |

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Upper bound on frame contexts in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Engine-wide settings, resolved once before any GPU resource exists.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Number of frame contexts cycled by the scheduler.
    pub frames_in_flight: usize,
    /// Hard cap on distinct textures (the default texture included).
    pub max_textures: usize,
    /// Enable the Khronos validation layer and debug messenger.
    pub enable_validation: bool,
    /// Fence wait bound in nanoseconds; `u64::MAX` waits forever.
    pub fence_timeout_ns: u64,
    /// Directory holding the compiled `.spv` shaders.
    pub shader_dir: PathBuf,
    /// Initial window width in logical pixels.
    pub window_width: u32,
    /// Initial window height in logical pixels.
    pub window_height: u32,
    /// Clear color of the presented image, linear RGBA.
    pub clear_color: [f32; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            max_textures: 16,
            enable_validation: cfg!(debug_assertions),
            fence_timeout_ns: u64::MAX,
            shader_dir: PathBuf::from("shaders"),
            window_width: 800,
            window_height: 600,
            clear_color: [36.0 / 255.0, 47.0 / 255.0, 87.0 / 255.0, 1.0],
        }
    }
}

impl EngineConfig {
    /// Defaults with `SUBPASS_*` environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but malformed or out
    /// of range.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on a malformed or out-of-range value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("SUBPASS_FRAMES_IN_FLIGHT") {
            config.frames_in_flight = parse("SUBPASS_FRAMES_IN_FLIGHT", &value)?;
        }
        if let Some(value) = lookup("SUBPASS_MAX_TEXTURES") {
            config.max_textures = parse("SUBPASS_MAX_TEXTURES", &value)?;
        }
        if let Some(value) = lookup("SUBPASS_VALIDATION") {
            config.enable_validation = parse_bool("SUBPASS_VALIDATION", &value)?;
        }
        if let Some(value) = lookup("SUBPASS_FENCE_TIMEOUT_NS") {
            config.fence_timeout_ns = parse("SUBPASS_FENCE_TIMEOUT_NS", &value)?;
        }
        if let Some(value) = lookup("SUBPASS_SHADER_DIR") {
            config.shader_dir = PathBuf::from(value);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.max_textures == 0 {
            return Err(Error::Config("max_textures must be at least 1".to_string()));
        }
        if self.fence_timeout_ns == 0 {
            return Err(Error::Config(
                "fence_timeout_ns must be greater than 0".to_string(),
            ));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(Error::Config("window size must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: cannot parse {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected 0/1/true/false, got {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.max_textures, 16);
        assert_eq!(config.fence_timeout_ns, u64::MAX);
        assert_eq!(config.shader_dir, PathBuf::from("shaders"));
        assert_eq!((config.window_width, config.window_height), (800, 600));
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SUBPASS_FRAMES_IN_FLIGHT", "3"),
            ("SUBPASS_MAX_TEXTURES", "4"),
            ("SUBPASS_VALIDATION", "TRUE"),
            ("SUBPASS_FENCE_TIMEOUT_NS", "1000000000"),
            ("SUBPASS_SHADER_DIR", "/opt/shaders"),
        ]))
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.max_textures, 4);
        assert!(config.enable_validation);
        assert_eq!(config.fence_timeout_ns, 1_000_000_000);
        assert_eq!(config.shader_dir, PathBuf::from("/opt/shaders"));
    }

    #[test]
    fn test_frames_in_flight_out_of_range() {
        for bad in ["0", "5"] {
            let err = EngineConfig::from_lookup(lookup(&[("SUBPASS_FRAMES_IN_FLIGHT", bad)]));
            assert!(matches!(err, Err(Error::Config(_))), "{bad}");
        }
    }

    #[test]
    fn test_malformed_values() {
        assert!(EngineConfig::from_lookup(lookup(&[("SUBPASS_MAX_TEXTURES", "many")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("SUBPASS_VALIDATION", "yes")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("SUBPASS_FENCE_TIMEOUT_NS", "0")])).is_err());
    }
}
