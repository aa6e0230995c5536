//! Blink Controller - procedural eyelid blinks
//!
//! A four-phase state machine stepped by the frame clock:
//!
//! ```text
//! Resting --deadline--> Closing --0.075s--> Holding --0.03s--> Opening --0.09s--> Resting
//! ```
//!
//! Every cycle may be followed by a quick second blink; a second blink never
//! schedules a third. Left and right eyelids are always written with the same
//! value.

use crate::clock::TimePoint;
use crate::config::BlinkConfig;
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::library::{ClipLibrary, MorphTarget};
use crate::morph::{MeshInfluences, MorphChannel};
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Upper bound on phase changes applied in one frame (zero-length phases)
const MAX_TRANSITIONS_PER_FRAME: usize = 16;

/// Phase of the blink cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlinkPhase {
    /// Eyes open, waiting for the next deadline
    Resting,
    /// Eyelids coming down
    Closing,
    /// Eyelids fully shut
    Holding,
    /// Eyelids coming back up
    Opening,
}

impl BlinkPhase {
    /// The phase that follows this one
    pub fn next(self) -> BlinkPhase {
        match self {
            BlinkPhase::Resting => BlinkPhase::Closing,
            BlinkPhase::Closing => BlinkPhase::Holding,
            BlinkPhase::Holding => BlinkPhase::Opening,
            BlinkPhase::Opening => BlinkPhase::Resting,
        }
    }
}

/// Procedural blink state machine
pub struct BlinkController {
    config: BlinkConfig,
    random: Box<dyn RandomSource>,
    channels: Vec<MorphChannel>,
    phase: BlinkPhase,
    entered_at: TimePoint,
    next_blink_at: TimePoint,
    /// A second blink was drawn for the current cycle
    double_pending: bool,
    /// The current cycle is itself the second blink of a double
    in_double: bool,
    weight: f32,
    cycles: u64,
}

impl BlinkController {
    /// Create a resting controller with its first deadline drawn from `now`
    ///
    /// Missing blink channels are reported once; the state machine still runs.
    pub fn new(
        library: &ClipLibrary,
        config: BlinkConfig,
        random: Box<dyn RandomSource>,
        diagnostics: &Diagnostics,
        now: TimePoint,
    ) -> Self {
        let mut channels = Vec::with_capacity(2);
        for target in [MorphTarget::BlinkLeft, MorphTarget::BlinkRight] {
            match library.channel(target) {
                // Emptied by a conflict with the mouth, already reported
                Some(channel) if channel.is_empty() => {}
                Some(channel) => channels.push(channel.clone()),
                None => {
                    diagnostics.report(DiagnosticEvent::ChannelMissing {
                        target,
                        name: target.asset_name(library.names()).to_string(),
                    });
                }
            }
        }

        let mut controller = Self {
            config,
            random,
            channels,
            phase: BlinkPhase::Resting,
            entered_at: now,
            next_blink_at: now,
            double_pending: false,
            in_double: false,
            weight: 0.0,
            cycles: 0,
        };
        controller.next_blink_at = now + controller.draw_interval();
        debug!("First blink at {:.3}", controller.next_blink_at);
        controller
    }

    fn draw_interval(&mut self) -> f64 {
        self.random
            .uniform(self.config.interval_min, self.config.interval_max)
    }

    /// Step the state machine to `now` and write both eyelids
    ///
    /// Returns the blink weight written this frame.
    pub fn update(&mut self, now: TimePoint, meshes: &mut MeshInfluences) -> f32 {
        for _ in 0..MAX_TRANSITIONS_PER_FRAME {
            if !self.advance(now) {
                break;
            }
        }

        self.weight = self.phase_weight(now);
        for channel in &self.channels {
            channel.write(meshes, self.weight);
        }
        self.weight
    }

    /// Apply at most one transition. Returns whether one happened.
    ///
    /// Entry times are the exact moment the previous phase ended, so a long
    /// frame never stretches a cycle.
    fn advance(&mut self, now: TimePoint) -> bool {
        let ends_at = match self.phase {
            BlinkPhase::Resting => self.next_blink_at,
            BlinkPhase::Closing => self.entered_at + self.config.close_duration,
            BlinkPhase::Holding => self.entered_at + self.config.hold_duration,
            BlinkPhase::Opening => self.entered_at + self.config.open_duration,
        };
        if now < ends_at {
            return false;
        }

        let next = self.phase.next();
        match next {
            BlinkPhase::Closing => {
                if !self.in_double {
                    self.double_pending = self.random.chance(self.config.double_chance);
                }
            }
            BlinkPhase::Resting => self.complete_cycle(ends_at),
            BlinkPhase::Holding | BlinkPhase::Opening => {}
        }

        trace!("Blink {:?} -> {:?} at {:.3}", self.phase, next, ends_at);
        self.phase = next;
        self.entered_at = ends_at;
        true
    }

    fn complete_cycle(&mut self, at: TimePoint) {
        self.cycles += 1;
        if self.double_pending {
            self.double_pending = false;
            self.in_double = true;
            self.next_blink_at = at + self.config.double_gap;
            debug!("Double blink scheduled for {:.3}", self.next_blink_at);
        } else {
            self.in_double = false;
            self.next_blink_at = at + self.draw_interval();
            trace!("Next blink at {:.3}", self.next_blink_at);
        }
    }

    fn phase_weight(&self, now: TimePoint) -> f32 {
        match self.phase {
            BlinkPhase::Resting => 0.0,
            BlinkPhase::Closing => {
                let p = progress(now - self.entered_at, self.config.close_duration);
                p * p
            }
            BlinkPhase::Holding => 1.0,
            BlinkPhase::Opening => {
                let p = progress(now - self.entered_at, self.config.open_duration);
                let eased = 1.0 - (1.0 - p) * (1.0 - p);
                1.0 - eased
            }
        }
    }

    /// Current phase
    pub fn phase(&self) -> BlinkPhase {
        self.phase
    }

    /// Weight written by the last update
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// When the current resting period ends
    pub fn next_blink_at(&self) -> TimePoint {
        self.next_blink_at
    }

    /// When the current phase was entered
    pub fn phase_entered_at(&self) -> TimePoint {
        self.entered_at
    }

    /// Number of completed Resting -> ... -> Resting cycles
    pub fn cycles_completed(&self) -> u64 {
        self.cycles
    }

    /// Whether a second blink was drawn for the cycle in progress
    pub fn double_pending(&self) -> bool {
        self.double_pending
    }

    /// Whether any eyelid channel is driven
    pub fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }
}

fn progress(elapsed: f64, duration: f64) -> f32 {
    if duration <= 0.0 {
        return 1.0;
    }
    (elapsed / duration).clamp(0.0, 1.0) as f32
}

impl std::fmt::Debug for BlinkController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlinkController")
            .field("phase", &self.phase)
            .field("entered_at", &self.entered_at)
            .field("next_blink_at", &self.next_blink_at)
            .field("double_pending", &self.double_pending)
            .field("weight", &self.weight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetNames;
    use crate::library::{AvatarAsset, ClipInfo, MeshMorphs};
    use crate::random::SeededRandom;

    struct FixedRandom {
        interval: f64,
        double: bool,
    }

    impl RandomSource for FixedRandom {
        fn uniform(&mut self, _min: f64, _max: f64) -> f64 {
            self.interval
        }

        fn chance(&mut self, _probability: f64) -> bool {
            self.double
        }
    }

    fn rig(targets: &[&str]) -> (ClipLibrary, MeshInfluences) {
        let asset = AvatarAsset {
            clips: vec![ClipInfo::new("Idle", 4.0), ClipInfo::new("Talk", 2.0)],
            meshes: vec![
                MeshMorphs::new("Head", targets),
                MeshMorphs::new("Lashes", &["BlinkLeft", "BlinkRight"]),
            ],
        };
        (
            ClipLibrary::resolve(&asset, &AssetNames::default()),
            asset.influences(),
        )
    }

    fn fixed(interval: f64, double: bool) -> Box<dyn RandomSource> {
        Box::new(FixedRandom { interval, double })
    }

    #[test]
    fn test_first_deadline_in_range() {
        let (library, _) = rig(&["BlinkLeft", "BlinkRight"]);
        let blink = BlinkController::new(
            &library,
            BlinkConfig::default(),
            Box::new(SeededRandom::from_seed(3)),
            &Diagnostics::new(),
            10.0,
        );
        assert_eq!(blink.phase(), BlinkPhase::Resting);
        let wait = blink.next_blink_at() - 10.0;
        assert!((2.4..=5.8).contains(&wait), "wait {}", wait);
    }

    #[test]
    fn test_phase_weights() {
        let (library, mut meshes) = rig(&["BlinkLeft", "BlinkRight"]);
        let mut blink = BlinkController::new(
            &library,
            BlinkConfig::default(),
            fixed(3.0, false),
            &Diagnostics::new(),
            0.0,
        );

        assert_eq!(blink.update(2.9, &mut meshes), 0.0);

        // Half-way through closing: 0.5^2
        let w = blink.update(3.0375, &mut meshes);
        assert_eq!(blink.phase(), BlinkPhase::Closing);
        assert!((w - 0.25).abs() < 1e-4, "closing weight {}", w);

        let w = blink.update(3.09, &mut meshes);
        assert_eq!(blink.phase(), BlinkPhase::Holding);
        assert_eq!(w, 1.0);

        // Half-way through opening: (1 - 0.5)^2
        let w = blink.update(3.15, &mut meshes);
        assert_eq!(blink.phase(), BlinkPhase::Opening);
        assert!((w - 0.25).abs() < 1e-4, "opening weight {}", w);

        let w = blink.update(3.3, &mut meshes);
        assert_eq!(blink.phase(), BlinkPhase::Resting);
        assert_eq!(w, 0.0);
        assert_eq!(blink.cycles_completed(), 1);
    }

    #[test]
    fn test_left_and_right_written_identically() {
        let (library, mut meshes) = rig(&["BlinkLeft", "LipOpen", "BlinkRight"]);
        let mut blink = BlinkController::new(
            &library,
            BlinkConfig::default(),
            fixed(1.0, false),
            &Diagnostics::new(),
            0.0,
        );

        let mut t = 0.0;
        while t < 1.3 {
            blink.update(t, &mut meshes);
            let head = meshes.influences("Head").unwrap();
            let lashes = meshes.influences("Lashes").unwrap();
            assert_eq!(head[0], head[2]);
            assert_eq!(head[1], 0.0);
            assert_eq!(lashes[0], lashes[1]);
            assert_eq!(head[0], lashes[0]);
            t += 0.005;
        }
    }

    #[test]
    fn test_long_frame_keeps_cycle_timing() {
        let (library, mut meshes) = rig(&["BlinkLeft", "BlinkRight"]);
        let mut blink = BlinkController::new(
            &library,
            BlinkConfig::default(),
            fixed(2.5, false),
            &Diagnostics::new(),
            0.0,
        );

        // One huge frame skips a whole cycle.
        blink.update(2.8, &mut meshes);
        assert_eq!(blink.phase(), BlinkPhase::Resting);
        assert_eq!(blink.cycles_completed(), 1);
        let expected = 2.5 + 0.075 + 0.03 + 0.09 + 2.5;
        assert!((blink.next_blink_at() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_double_blink_does_not_chain() {
        let (library, mut meshes) = rig(&["BlinkLeft", "BlinkRight"]);
        let mut blink = BlinkController::new(
            &library,
            BlinkConfig::default(),
            fixed(3.0, true),
            &Diagnostics::new(),
            0.0,
        );

        let first_end = 3.0 + 0.075 + 0.03 + 0.09;
        blink.update(first_end, &mut meshes);
        assert_eq!(blink.cycles_completed(), 1);
        assert!((blink.next_blink_at() - (first_end + 0.18)).abs() < 1e-9);

        let second_end = first_end + 0.18 + 0.075 + 0.03 + 0.09;
        blink.update(second_end, &mut meshes);
        assert_eq!(blink.cycles_completed(), 2);
        assert!((blink.next_blink_at() - (second_end + 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_missing_channels_still_run() {
        let asset = AvatarAsset {
            clips: Vec::new(),
            meshes: vec![MeshMorphs::new("Head", &["LipOpen"])],
        };
        let library = ClipLibrary::resolve(&asset, &AssetNames::default());
        let mut meshes = asset.influences();
        let (diagnostics, rx) = Diagnostics::with_channel(8);

        let mut blink = BlinkController::new(
            &library,
            BlinkConfig::default(),
            fixed(0.5, false),
            &diagnostics,
            0.0,
        );
        assert!(!blink.has_channels());
        assert_eq!(rx.len(), 2);

        blink.update(0.55, &mut meshes);
        assert_eq!(blink.phase(), BlinkPhase::Closing);
        assert_eq!(meshes.influences("Head"), Some(&[0.0][..]));
    }

    #[test]
    fn test_zero_length_phases_do_not_hang() {
        let (library, mut meshes) = rig(&["BlinkLeft", "BlinkRight"]);
        let config = BlinkConfig {
            interval_min: 0.0,
            interval_max: 0.0,
            close_duration: 0.0,
            hold_duration: 0.0,
            open_duration: 0.0,
            ..BlinkConfig::default()
        };
        let mut blink = BlinkController::new(
            &library,
            config,
            fixed(0.0, false),
            &Diagnostics::new(),
            0.0,
        );
        blink.update(1.0, &mut meshes);
        assert!(blink.cycles_completed() > 0);
    }
}
