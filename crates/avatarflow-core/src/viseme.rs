//! Viseme Driver - loudness to lip and jaw morphs
//!
//! Mouth shapes are approximated from loudness alone. Both channels approach
//! their target each frame rather than snapping to it; the jaw uses a slower
//! rate than the lips so it trails them slightly.

use crate::config::VisemeConfig;
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::library::{ClipLibrary, MorphTarget};
use crate::morph::{MeshInfluences, MorphChannel};
use tracing::debug;

/// Below this distance a channel lands exactly on its target
const SNAP_EPSILON: f32 = 1e-4;

/// Lip opening target for a loudness estimate
pub fn lip_target(config: &VisemeConfig, amplitude: f32, talking: bool) -> f32 {
    if !talking {
        return 0.0;
    }
    (config.lip_baseline + amplitude * config.lip_gain).clamp(0.0, 1.0)
}

/// Jaw opening target for a loudness estimate
pub fn jaw_target(config: &VisemeConfig, amplitude: f32, talking: bool) -> f32 {
    if !talking {
        return 0.0;
    }
    (amplitude * config.jaw_gain).clamp(0.0, 1.0)
}

/// Move `current` a fraction `rate` of the way to `target`
///
/// Never overshoots, and lands exactly once within [`SNAP_EPSILON`].
pub fn approach(current: f32, target: f32, rate: f32) -> f32 {
    let next = current + (target - current) * rate.clamp(0.0, 1.0);
    if (target - next).abs() < SNAP_EPSILON {
        target
    } else {
        next
    }
}

/// Writes smoothed lip/jaw weights from loudness and the talking flag
#[derive(Debug)]
pub struct VisemeDriver {
    config: VisemeConfig,
    lip: Option<MorphChannel>,
    jaw: Option<MorphChannel>,
    lip_value: f32,
    jaw_value: f32,
}

impl VisemeDriver {
    /// Create a driver for the library's mouth channels
    ///
    /// A missing lip channel is reported once and turns the lips into a
    /// no-op. A missing jaw channel is skipped without a report.
    pub fn new(library: &ClipLibrary, config: VisemeConfig, diagnostics: &Diagnostics) -> Self {
        let lip = library.channel(MorphTarget::LipOpen).cloned();
        if lip.is_none() {
            diagnostics.report(DiagnosticEvent::ChannelMissing {
                target: MorphTarget::LipOpen,
                name: MorphTarget::LipOpen.asset_name(library.names()).to_string(),
            });
        }

        let jaw = library.channel(MorphTarget::JawOpen).cloned();
        if jaw.is_none() {
            debug!("No jaw channel, viseme drives lips only");
        }

        Self {
            config,
            lip,
            jaw,
            lip_value: 0.0,
            jaw_value: 0.0,
        }
    }

    /// Approach the targets for this frame and write the channels
    pub fn update(&mut self, amplitude: f32, talking: bool, meshes: &mut MeshInfluences) {
        let amplitude = if amplitude.is_finite() {
            amplitude.clamp(0.0, 1.0)
        } else {
            0.0
        };

        if let Some(lip) = &self.lip {
            let target = lip_target(&self.config, amplitude, talking);
            self.lip_value = approach(self.lip_value, target, self.config.lip_rate);
            lip.write(meshes, self.lip_value);
        }

        if let Some(jaw) = &self.jaw {
            let target = jaw_target(&self.config, amplitude, talking);
            self.jaw_value = approach(self.jaw_value, target, self.config.jaw_rate);
            jaw.write(meshes, self.jaw_value);
        }
    }

    /// Current lip weight
    pub fn lip(&self) -> f32 {
        self.lip_value
    }

    /// Current jaw weight
    pub fn jaw(&self) -> f32 {
        self.jaw_value
    }

    /// Whether a lip channel is driven
    pub fn has_lip(&self) -> bool {
        self.lip.is_some()
    }

    /// Whether a jaw channel is driven
    pub fn has_jaw(&self) -> bool {
        self.jaw.is_some()
    }
}
