//! AvatarFlow Core - Avatar Animation & Lip-Sync Controller
//!
//! This crate contains the per-frame logic that keeps a single humanoid avatar
//! alive while it listens and speaks:
//! - Idle/Talk body blending with timed crossfades and a delayed return to idle
//! - Procedural eyelid blinks (with occasional double blinks)
//! - Audio amplitude extraction and smoothed lip/jaw morph weights
//! - Composition of all of the above behind one frame entry point
//!
//! Asset loading, rendering and audio transport are collaborators: the core
//! consumes a resolved [`AvatarAsset`] and a [`SignalSource`], and produces
//! clip weights and morph influences for the host to read after each frame.

#![warn(missing_docs)]

use thiserror::Error;

pub mod amplitude;
pub mod blend;
pub mod blink;
#[cfg(feature = "audio")]
pub mod capture;
pub mod clock;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod library;
pub mod logging;
pub mod mixer;
pub mod morph;
pub mod random;
pub mod source;
pub mod viseme;

// --- Re-exports grouped by category ---

// Asset & Channels
pub use library::{AvatarAsset, ClipInfo, ClipLibrary, MeshMorphs, MorphTarget};
pub use morph::{MeshId, MeshInfluences, MorphChannel};

// Body Animation
pub use blend::{BodyAnimationBlender, ClipWeights, CrossfadeEdge, ReturnTransition};
pub use mixer::{AnimationMixer, ClipAction, ClipSlot};

// Face
pub use blink::{BlinkController, BlinkPhase};
pub use viseme::VisemeDriver;

// Audio
pub use amplitude::AmplitudeExtractor;
#[cfg(feature = "audio")]
pub use capture::MicrophoneCapture;
pub use source::{level_tap, waveform_tap, LevelTap, LevelWriter, SignalSource, SourcePoll};
pub use source::{TapWriter, WaveformTap};

// Composition
pub use controller::{AvatarController, AvatarParts, FramePose, PlaybackEvent};

// Time & Randomness
pub use clock::{Clock, ManualClock, MonotonicClock, TimePoint};
pub use random::{RandomSource, SeededRandom};

// Configuration, Logging & Diagnostics
pub use config::{
    AmplitudeConfig, AssetNames, AvatarConfig, BlendConfig, BlinkConfig, ConfigError,
    VisemeConfig,
};
pub use diagnostics::{
    check_rig_integrity, DiagnosticEvent, Diagnostics, IssueSeverity, RigIssue,
};
pub use logging::LogConfig;

/// Core error types
#[derive(Error, Debug)]
pub enum AvatarError {
    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem access failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Asset manifest could not be decoded
    #[error("Asset manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// A named animation clip is absent from the asset
    #[error("Clip not found: {name}")]
    ClipMissing {
        /// Name that was looked up
        name: String,
    },

    /// A named morph target is absent from every mesh of the asset
    #[error("Morph target not found: {name}")]
    MorphMissing {
        /// Name that was looked up
        name: String,
    },

    /// The audio signal source is not (yet) producing data
    #[error("Signal source unavailable: {0}")]
    SourceUnavailable(String),

    /// The audio input device could not be opened
    #[cfg(feature = "audio")]
    #[error("Audio device error: {0}")]
    AudioDevice(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, AvatarError>;
