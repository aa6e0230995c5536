//! Avatar configuration
//!
//! Every tunable of the controller lives here with its default. Files are
//! TOML; every field is optional and falls back to the default.

use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration parse and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML could not be decoded
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML could not be encoded
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of its allowed range
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Names looked up in the loaded asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetNames {
    /// Idle loop clip
    pub idle: String,
    /// Talk loop clip
    pub talk: String,
    /// Lip-parting morph target
    pub lip_open: String,
    /// Jaw-dropping morph target (optional in the asset)
    pub jaw_open: String,
    /// Left eyelid morph target
    pub blink_left: String,
    /// Right eyelid morph target
    pub blink_right: String,
}

impl Default for AssetNames {
    fn default() -> Self {
        Self {
            idle: "Idle".to_string(),
            talk: "Talk".to_string(),
            lip_open: "LipOpen".to_string(),
            jaw_open: "JawOpen".to_string(),
            blink_left: "BlinkLeft".to_string(),
            blink_right: "BlinkRight".to_string(),
        }
    }
}

/// Body crossfade timings, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Fade-in of the idle loop when the avatar first appears
    pub intro_fade: f64,
    /// Idle to Talk crossfade
    pub talk_fade_in: f64,
    /// Settle time after talking stops before blending back
    pub return_delay: f64,
    /// Talk to Idle crossfade
    pub idle_fade_in: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            intro_fade: 0.2,
            talk_fade_in: 0.25,
            return_delay: 0.25,
            idle_fade_in: 0.62,
        }
    }
}

/// Procedural blink timings, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Shortest rest between blinks
    pub interval_min: f64,
    /// Longest rest between blinks
    pub interval_max: f64,
    /// Eyelid closing time
    pub close_duration: f64,
    /// Time held fully shut
    pub hold_duration: f64,
    /// Eyelid opening time
    pub open_duration: f64,
    /// Probability that a blink is followed by a second one
    pub double_chance: f64,
    /// Rest before the second blink of a double
    pub double_gap: f64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            interval_min: 2.4,
            interval_max: 5.8,
            close_duration: 0.075,
            hold_duration: 0.03,
            open_duration: 0.09,
            double_chance: 0.18,
            double_gap: 0.18,
        }
    }
}

/// Loudness extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmplitudeConfig {
    /// Number of waveform samples per RMS window
    pub window_size: usize,
    /// RMS below this is treated as silence
    pub noise_floor: f32,
    /// Gain applied after the noise floor
    pub gain: f32,
    /// Fraction of the previous estimate kept each frame
    pub retention: f32,
}

impl Default for AmplitudeConfig {
    fn default() -> Self {
        Self {
            window_size: 1024,
            noise_floor: 0.02,
            gain: 6.5,
            retention: 0.7,
        }
    }
}

/// Lip/jaw response to loudness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisemeConfig {
    /// Lip opening held while talking, even in silence
    pub lip_baseline: f32,
    /// Lip opening per unit of amplitude
    pub lip_gain: f32,
    /// Jaw opening per unit of amplitude
    pub jaw_gain: f32,
    /// Per-frame approach rate of the lips
    pub lip_rate: f32,
    /// Per-frame approach rate of the jaw
    pub jaw_rate: f32,
}

impl Default for VisemeConfig {
    fn default() -> Self {
        Self {
            lip_baseline: 0.06,
            lip_gain: 1.25,
            jaw_gain: 0.6,
            lip_rate: 0.35,
            jaw_rate: 0.25,
        }
    }
}

/// Top-level avatar configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Asset lookup names
    pub names: AssetNames,
    /// Body crossfades
    pub blend: BlendConfig,
    /// Eyelid blinks
    pub blink: BlinkConfig,
    /// Loudness extraction
    pub amplitude: AmplitudeConfig,
    /// Mouth response
    pub viseme: VisemeConfig,
    /// Logging
    pub log: LogConfig,
}

impl AvatarConfig {
    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AvatarConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        debug!("Loaded avatar config from {:?}", path);
        Ok(config)
    }

    /// Encode as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Check every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let blend = &self.blend;
        check_duration("blend.intro_fade", blend.intro_fade)?;
        check_duration("blend.talk_fade_in", blend.talk_fade_in)?;
        check_duration("blend.return_delay", blend.return_delay)?;
        check_duration("blend.idle_fade_in", blend.idle_fade_in)?;

        let blink = &self.blink;
        check_duration("blink.interval_min", blink.interval_min)?;
        check_duration("blink.interval_max", blink.interval_max)?;
        check_duration("blink.close_duration", blink.close_duration)?;
        check_duration("blink.hold_duration", blink.hold_duration)?;
        check_duration("blink.open_duration", blink.open_duration)?;
        check_duration("blink.double_gap", blink.double_gap)?;
        check_unit("blink.double_chance", blink.double_chance)?;
        if blink.interval_min > blink.interval_max {
            return Err(ConfigError::Invalid(format!(
                "blink.interval_min ({}) exceeds blink.interval_max ({})",
                blink.interval_min, blink.interval_max
            )));
        }

        let amplitude = &self.amplitude;
        if amplitude.window_size == 0 {
            return Err(ConfigError::Invalid(
                "amplitude.window_size must be at least 1".to_string(),
            ));
        }
        check_duration("amplitude.noise_floor", amplitude.noise_floor as f64)?;
        check_duration("amplitude.gain", amplitude.gain as f64)?;
        check_unit("amplitude.retention", amplitude.retention as f64)?;

        let viseme = &self.viseme;
        check_unit("viseme.lip_baseline", viseme.lip_baseline as f64)?;
        check_duration("viseme.lip_gain", viseme.lip_gain as f64)?;
        check_duration("viseme.jaw_gain", viseme.jaw_gain as f64)?;
        check_unit("viseme.lip_rate", viseme.lip_rate as f64)?;
        check_unit("viseme.jaw_rate", viseme.jaw_rate as f64)?;

        Ok(())
    }
}

fn check_duration(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{field} must be a finite, non-negative number (got {value})"
        )));
    }
    Ok(())
}

fn check_unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be within [0, 1] (got {value})"
        )));
    }
    Ok(())
}
