//! Configuration system
//!
//! Renderer settings are plain serde structs loadable from `.toml` or `.ron`.
//! Every capacity used to size GPU-visible arrays comes from here and is fixed
//! for the lifetime of the renderer.

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str_with_format(&contents, path)
    }

    /// Parse configuration text, picking the format from the file extension of `path`
    fn from_str_with_format(contents: &str, path: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Serialize configuration text in the format named by the extension of `path`
    fn to_string_with_format(&self, path: &str) -> Result<String, ConfigError> {
        if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = self.to_string_with_format(path)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values parsed but rejected by validation
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Top-level renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Depth of the frame-resource ring
    pub frames_in_flight: usize,
    /// Render target width in pixels
    pub width: u32,
    /// Render target height in pixels
    pub height: u32,
    /// Capacity of the per-frame object constant array
    pub max_objects: usize,
    /// Capacity of the local light array and of each visible-light index list
    pub max_local_lights: usize,
    /// Shadow settings
    pub shadows: ShadowSettings,
    /// LOD selection
    pub lod: LodSettings,
    /// Post-processing toggles
    pub post: PostProcessSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            width: 1920,
            height: 1080,
            max_objects: 1024,
            max_local_lights: 32,
            shadows: ShadowSettings::default(),
            lod: LodSettings::default(),
            post: PostProcessSettings::default(),
        }
    }
}

impl Config for RendererSettings {}

impl RendererSettings {
    /// Aspect ratio of the render targets
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Reject settings that would size a GPU array at zero or break an algorithm
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid("frames_in_flight must be at least 1".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "resolution {}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        if self.max_objects == 0 {
            return Err(ConfigError::Invalid("max_objects must be at least 1".into()));
        }
        if self.max_local_lights == 0 {
            return Err(ConfigError::Invalid("max_local_lights must be at least 1".into()));
        }
        self.shadows.validate()?;
        self.lod.validate()
    }
}

/// Directional and local shadow settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Number of directional cascades
    pub cascade_count: usize,
    /// Square resolution of each cascade layer
    pub cascade_resolution: u32,
    /// Square resolution of each local light layer
    pub local_resolution: u32,
    /// World units added past each cascade's far split when fitting its box
    pub split_padding: f32,
    /// Distance the light eye is pulled back from the cascade center
    pub light_distance: f32,
    /// Margin added to both ends of the light-space depth range
    pub z_padding: f32,
    /// |cos| between light direction and +Y above which +Z becomes the up axis
    pub up_swap_threshold: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            cascade_count: 3,
            cascade_resolution: 2048,
            local_resolution: 1024,
            split_padding: 5.0,
            light_distance: 100.0,
            z_padding: 50.0,
            up_swap_threshold: 0.9,
        }
    }
}

impl ShadowSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cascade_count == 0 {
            return Err(ConfigError::Invalid("cascade_count must be at least 1".into()));
        }
        if self.cascade_resolution == 0 || self.local_resolution == 0 {
            return Err(ConfigError::Invalid("shadow resolutions must be non-zero".into()));
        }
        if self.split_padding < 0.0 || self.z_padding < 0.0 {
            return Err(ConfigError::Invalid("shadow paddings must not be negative".into()));
        }
        if self.light_distance <= 0.0 {
            return Err(ConfigError::Invalid("light_distance must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.up_swap_threshold) {
            return Err(ConfigError::Invalid(format!(
                "up_swap_threshold {} outside [0, 1)",
                self.up_swap_threshold
            )));
        }
        Ok(())
    }
}

/// LOD selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodSettings {
    /// Strictly descending projected-size thresholds in pixels; a size above
    /// `thresholds[i]` selects LOD `i`, anything smaller the next one down
    pub thresholds: Vec<f32>,
    /// Bypass projected-size selection and use this LOD for every object
    pub pinned: Option<usize>,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            thresholds: vec![200.0, 100.0, 50.0, 25.0, 10.0],
            pinned: None,
        }
    }
}

impl LodSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.windows(2).any(|w| w[0] <= w[1]) {
            return Err(ConfigError::Invalid(format!(
                "LOD thresholds {:?} are not strictly descending",
                self.thresholds
            )));
        }
        if self.thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ConfigError::Invalid("LOD thresholds must be finite and non-negative".into()));
        }
        Ok(())
    }
}

/// Post-processing toggles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessSettings {
    /// Screen-space reflections
    pub ssr: bool,
    /// Volumetric light shafts from the sun
    pub god_rays: bool,
    /// Chromatic aberration
    pub chromatic_aberration: bool,
    /// Vignetting
    pub vignette: bool,
    /// Temporal anti-aliasing (also enables projection jitter)
    pub taa: bool,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            ssr: true,
            god_rays: true,
            chromatic_aberration: false,
            vignette: true,
            taa: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = RendererSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.shadows.cascade_count, 3);
        assert_eq!(settings.lod.thresholds, vec![200.0, 100.0, 50.0, 25.0, 10.0]);
    }

    #[test]
    fn test_toml_round_trip_and_partial_files() {
        let mut settings = RendererSettings::default();
        settings.max_local_lights = 8;
        settings.lod.pinned = Some(2);

        let text = settings.to_string_with_format("settings.toml").unwrap();
        let parsed = RendererSettings::from_str_with_format(&text, "settings.toml").unwrap();
        assert_eq!(parsed, settings);

        // Missing sections fall back to defaults
        let partial = RendererSettings::from_str_with_format(
            "frames_in_flight = 2\n[shadows]\ncascade_count = 4\n",
            "settings.toml",
        )
        .unwrap();
        assert_eq!(partial.frames_in_flight, 2);
        assert_eq!(partial.shadows.cascade_count, 4);
        assert_eq!(partial.shadows.cascade_resolution, 2048);
    }

    #[test]
    fn test_ron_parses() {
        let parsed = RendererSettings::from_str_with_format(
            "(width: 640, height: 480, post: (taa: false))",
            "viewer.ron",
        )
        .unwrap();
        assert_eq!(parsed.width, 640);
        assert!(!parsed.post.taa);
        assert!(parsed.post.ssr);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = RendererSettings::from_str_with_format("", "settings.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = RendererSettings::default();
        settings.frames_in_flight = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        let mut settings = RendererSettings::default();
        settings.lod.thresholds = vec![50.0, 100.0];
        assert!(settings.validate().is_err());

        let mut settings = RendererSettings::default();
        settings.shadows.up_swap_threshold = 1.0;
        assert!(settings.validate().is_err());
    }
}
