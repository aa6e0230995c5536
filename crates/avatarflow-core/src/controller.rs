//! Avatar Controller - one frame entry point for the whole avatar
//!
//! Owns the four sub-controllers and the morph store. The host calls
//! [`AvatarController::set_talking`] whenever its speech state changes and
//! [`AvatarController::tick`] once per rendered frame, then reads the clip
//! weights from the returned [`FramePose`] and the morph influences from
//! [`AvatarController::meshes`].
//!
//! # Frame order
//!
//! 1. Sample the clock once
//! 2. Forward a talking edge to the body blender
//! 3. Fire due body transitions and advance the clips
//! 4. Sample loudness and drive the mouth
//! 5. Step the blink state machine
//!
//! Mouth and eyelids write disjoint channels, so 4 and 5 are independent.

use crate::amplitude::AmplitudeExtractor;
use crate::blend::{BodyAnimationBlender, ClipWeights};
use crate::blink::{BlinkController, BlinkPhase};
use crate::clock::{Clock, MonotonicClock, TimePoint};
use crate::config::AvatarConfig;
use crate::diagnostics::{check_rig_integrity, DiagnosticEvent, Diagnostics, RigIssue};
use crate::library::{AvatarAsset, ClipLibrary};
use crate::morph::MeshInfluences;
use crate::random::{RandomSource, SeededRandom};
use crate::source::SignalSource;
use crate::viseme::VisemeDriver;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/// Speech playback lifecycle reported by the host's audio player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Speech audio started playing
    Started,
    /// Speech audio reached its end
    Ended,
    /// Speech audio was stopped by the host
    Stopped,
    /// The host refused to start playback (e.g. autoplay policy)
    Blocked,
}

/// Collaborators injected into the controller
pub struct AvatarParts {
    /// Frame clock
    pub clock: Box<dyn Clock>,
    /// Random draws for blink scheduling
    pub random: Box<dyn RandomSource>,
    /// Live audio signal, if any
    pub source: Option<Box<dyn SignalSource>>,
    /// Diagnostics reporter
    pub diagnostics: Diagnostics,
}

impl Default for AvatarParts {
    fn default() -> Self {
        Self {
            clock: Box::new(MonotonicClock::new()),
            random: Box::new(SeededRandom::from_entropy()),
            source: None,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Everything the renderer needs from one frame, besides the morph store
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FramePose {
    /// Clock time of the frame
    pub time: TimePoint,
    /// Idle clip weight
    pub idle_weight: f32,
    /// Talk clip weight
    pub talk_weight: f32,
    /// Eyelid weight, both eyes
    pub blink: f32,
    /// Lip opening
    pub lip: f32,
    /// Jaw opening
    pub jaw: f32,
    /// Smoothed loudness
    pub amplitude: f32,
    /// Talking flag applied this frame
    pub talking: bool,
}

/// Root controller of a single avatar
pub struct AvatarController {
    clock: Box<dyn Clock>,
    library: ClipLibrary,
    meshes: MeshInfluences,
    blender: BodyAnimationBlender,
    blink: BlinkController,
    amplitude: AmplitudeExtractor,
    viseme: VisemeDriver,
    diagnostics: Diagnostics,
    /// Level set by the host
    talking: bool,
    /// Level last forwarded to the blender
    applied_talking: bool,
    last_tick: TimePoint,
    last_pose: FramePose,
    frames: u64,
    torn_down: bool,
}

impl AvatarController {
    /// Create a controller with wall-clock time, OS randomness and no audio
    pub fn new(asset: &AvatarAsset, config: AvatarConfig) -> Result<Self> {
        Self::with_parts(asset, config, AvatarParts::default())
    }

    /// Create a controller from explicit collaborators
    ///
    /// Fails only on invalid configuration. Missing clips and channels are
    /// reported through the diagnostics and degrade to no-ops. Eyelid
    /// bindings shared with the mouth are dropped from the blink side.
    pub fn with_parts(
        asset: &AvatarAsset,
        config: AvatarConfig,
        parts: AvatarParts,
    ) -> Result<Self> {
        config.validate()?;
        let AvatarParts {
            clock,
            random,
            source,
            diagnostics,
        } = parts;

        // Resolve everything before any sub-controller runs.
        let library = ClipLibrary::resolve(asset, &config.names);
        let meshes = asset.influences();
        let now = clock.now();

        // Eyelids never write an influence the mouth owns.
        let mut eyelids = library.clone();
        for (eyelid, mouth) in eyelids.separate_blink_from_mouth() {
            diagnostics.report(DiagnosticEvent::ChannelConflict { eyelid, mouth });
        }

        let mut blender = BodyAnimationBlender::new(&library, config.blend, &diagnostics);
        let blink = BlinkController::new(&eyelids, config.blink, random, &diagnostics, now);
        let viseme = VisemeDriver::new(&library, config.viseme, &diagnostics);
        let amplitude = AmplitudeExtractor::new(config.amplitude, source, &diagnostics);

        blender.start(now);

        info!(
            "Avatar controller ready: {} mesh(es), body {}",
            meshes.meshes().len(),
            if blender.is_static() { "static" } else { "animated" }
        );

        Ok(Self {
            clock,
            library,
            meshes,
            blender,
            blink,
            amplitude,
            viseme,
            diagnostics,
            talking: false,
            applied_talking: false,
            last_tick: now,
            last_pose: FramePose {
                time: now,
                ..FramePose::default()
            },
            frames: 0,
            torn_down: false,
        })
    }

    /// Set the talking level; the body reacts on the next tick
    pub fn set_talking(&mut self, talking: bool) {
        if self.torn_down {
            return;
        }
        self.talking = talking;
    }

    /// Apply a speech playback lifecycle event
    pub fn handle_playback(&mut self, event: PlaybackEvent) {
        if self.torn_down {
            return;
        }
        debug!("Playback event: {:?}", event);
        match event {
            PlaybackEvent::Started => {
                // A new playback; earlier outages no longer apply.
                self.diagnostics.resolve_transient();
                self.set_talking(true);
            }
            PlaybackEvent::Ended | PlaybackEvent::Stopped => {
                self.set_talking(false);
                self.amplitude.reset();
            }
            PlaybackEvent::Blocked => {
                self.set_talking(false);
                self.amplitude.reset();
                self.diagnostics.report(DiagnosticEvent::SourceUnavailable {
                    reason: "speech playback blocked by host".to_string(),
                });
            }
        }
    }

    /// Advance one frame
    ///
    /// After teardown this returns the last pose unchanged.
    pub fn tick(&mut self) -> FramePose {
        if self.torn_down {
            return self.last_pose;
        }

        let now = self.clock.now().max(self.last_tick);
        let delta_time = now - self.last_tick;
        self.last_tick = now;

        if self.talking != self.applied_talking {
            self.applied_talking = self.talking;
            self.blender.set_talking(self.talking, now);
        }
        self.blender.tick(now, delta_time);

        let amplitude = self.amplitude.sample();
        self.viseme.update(amplitude, self.talking, &mut self.meshes);
        let blink = self.blink.update(now, &mut self.meshes);

        let ClipWeights { idle, talk } = self.blender.weights();
        self.last_pose = FramePose {
            time: now,
            idle_weight: idle,
            talk_weight: talk,
            blink,
            lip: self.viseme.lip(),
            jaw: self.viseme.jaw(),
            amplitude,
            talking: self.talking,
        };

        self.frames += 1;
        trace!(
            "Frame {}: idle={:.2} talk={:.2} blink={:.2} lip={:.2}",
            self.frames,
            idle,
            talk,
            blink,
            self.last_pose.lip
        );
        self.last_pose
    }

    /// Cancel pending transitions and stop sampling; later calls are no-ops
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.blender.teardown();
        self.amplitude.detach_source();
        self.torn_down = true;
        info!("Avatar controller torn down after {} frame(s)", self.frames);
    }

    /// Attach or replace the audio signal
    pub fn set_source(&mut self, source: Box<dyn SignalSource>) {
        if self.torn_down {
            return;
        }
        self.amplitude.set_source(source);
    }

    /// Morph influences written by the last frame
    pub fn meshes(&self) -> &MeshInfluences {
        &self.meshes
    }

    /// The resolved clip library
    pub fn library(&self) -> &ClipLibrary {
        &self.library
    }

    /// Static problems with the loaded rig
    pub fn rig_issues(&self) -> Vec<RigIssue> {
        check_rig_integrity(&self.library)
    }

    /// Diagnostics reporter shared with the sub-controllers
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Body blender
    pub fn blender(&self) -> &BodyAnimationBlender {
        &self.blender
    }

    /// Current blink phase
    pub fn blink_phase(&self) -> BlinkPhase {
        self.blink.phase()
    }

    /// Blink state machine
    pub fn blink(&self) -> &BlinkController {
        &self.blink
    }

    /// Talking level set by the host
    pub fn is_talking(&self) -> bool {
        self.talking
    }

    /// Last computed pose
    pub fn last_pose(&self) -> FramePose {
        self.last_pose
    }

    /// Number of ticks so far
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Whether [`AvatarController::teardown`] has run
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for AvatarController {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for AvatarController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarController")
            .field("talking", &self.talking)
            .field("frames", &self.frames)
            .field("blender", &self.blender)
            .field("blink", &self.blink)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::library::{ClipInfo, MeshMorphs};
    use crate::mixer::ClipSlot;
    use crate::source::level_tap;

    const DT: f64 = 1.0 / 60.0;

    fn asset() -> AvatarAsset {
        AvatarAsset {
            clips: vec![ClipInfo::new("Idle", 4.0), ClipInfo::new("Talk", 2.0)],
            meshes: vec![MeshMorphs::new(
                "Head",
                &["LipOpen", "JawOpen", "BlinkLeft", "BlinkRight"],
            )],
        }
    }

    fn controller(clock: &ManualClock) -> AvatarController {
        let parts = AvatarParts {
            clock: Box::new(clock.clone()),
            random: Box::new(SeededRandom::from_seed(11)),
            source: None,
            diagnostics: Diagnostics::new(),
        };
        AvatarController::with_parts(&asset(), AvatarConfig::default(), parts).unwrap()
    }

    fn run(avatar: &mut AvatarController, clock: &ManualClock, seconds: f64) -> FramePose {
        let frames = (seconds / DT).round() as usize;
        let mut pose = avatar.last_pose();
        for _ in 0..frames {
            clock.advance(DT);
            pose = avatar.tick();
        }
        pose
    }

    #[test]
    fn test_idle_fades_in_on_start() {
        let clock = ManualClock::new(0.0);
        let mut avatar = controller(&clock);
        let pose = run(&mut avatar, &clock, 0.5);
        assert_eq!(pose.idle_weight, 1.0);
        assert_eq!(pose.talk_weight, 0.0);
    }

    #[test]
    fn test_talking_edge_reaches_blender() {
        let clock = ManualClock::new(0.0);
        let mut avatar = controller(&clock);
        run(&mut avatar, &clock, 0.5);

        avatar.set_talking(true);
        let pose = run(&mut avatar, &clock, 0.5);
        assert!(pose.talking);
        assert_eq!(pose.talk_weight, 1.0);
        assert_eq!(avatar.blender().destination(), ClipSlot::Talk);
        // Baseline lip opening even in silence
        assert!((pose.lip - 0.06).abs() < 1e-3);
        assert_eq!(pose.jaw, 0.0);
    }

    #[test]
    fn test_playback_lifecycle() {
        let clock = ManualClock::new(0.0);
        let mut avatar = controller(&clock);
        let (writer, tap) = level_tap();
        avatar.set_source(Box::new(tap));
        writer.set(0.1);

        avatar.handle_playback(PlaybackEvent::Started);
        let pose = run(&mut avatar, &clock, 0.5);
        assert!(pose.talking);
        assert!(pose.amplitude > 0.0);

        avatar.handle_playback(PlaybackEvent::Ended);
        assert!(!avatar.is_talking());
        writer.set(0.0);
        let pose = run(&mut avatar, &clock, 2.0);
        assert_eq!(pose.amplitude, 0.0);
        assert_eq!(pose.lip, 0.0);
        assert_eq!(pose.idle_weight, 1.0);
    }

    #[test]
    fn test_blocked_playback_reports() {
        let clock = ManualClock::new(0.0);
        let mut avatar = controller(&clock);
        avatar.handle_playback(PlaybackEvent::Started);
        avatar.handle_playback(PlaybackEvent::Blocked);
        let pose = avatar.tick();

        assert!(!pose.talking);
        assert!(avatar.diagnostics().has_reported(&DiagnosticEvent::SourceUnavailable {
            reason: "speech playback blocked by host".to_string(),
        }));
    }

    #[test]
    fn test_each_blocked_playback_reported() {
        let clock = ManualClock::new(0.0);
        let (diagnostics, rx) = Diagnostics::with_channel(8);
        let parts = AvatarParts {
            clock: Box::new(clock.clone()),
            random: Box::new(SeededRandom::from_seed(11)),
            source: None,
            diagnostics,
        };
        let mut avatar =
            AvatarController::with_parts(&asset(), AvatarConfig::default(), parts).unwrap();

        avatar.handle_playback(PlaybackEvent::Started);
        avatar.handle_playback(PlaybackEvent::Blocked);
        run(&mut avatar, &clock, 0.1);

        avatar.handle_playback(PlaybackEvent::Started);
        avatar.handle_playback(PlaybackEvent::Ended);
        run(&mut avatar, &clock, 0.1);

        avatar.handle_playback(PlaybackEvent::Started);
        avatar.handle_playback(PlaybackEvent::Blocked);
        // Same outage, no new playback attempt in between
        avatar.handle_playback(PlaybackEvent::Blocked);

        let blocked = rx
            .try_iter()
            .filter(|e| matches!(e, DiagnosticEvent::SourceUnavailable { .. }))
            .count();
        assert_eq!(blocked, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AvatarConfig::default();
        config.blink.double_chance = 2.0;
        let result = AvatarController::with_parts(&asset(), config, AvatarParts::default());
        assert!(matches!(result, Err(crate::AvatarError::Config(_))));
    }

    #[test]
    fn test_teardown_freezes() {
        let clock = ManualClock::new(0.0);
        let mut avatar = controller(&clock);
        avatar.set_talking(true);
        run(&mut avatar, &clock, 1.0);
        avatar.set_talking(false);
        avatar.tick();

        avatar.teardown();
        assert!(avatar.is_torn_down());
        let frozen = avatar.last_pose();
        let pose = run(&mut avatar, &clock, 10.0);
        assert_eq!(pose, frozen);
        assert_eq!(pose.talk_weight, 1.0);
    }
}
