//! Body Animation Blender - Idle/Talk crossfades
//!
//! Owns playback of the two body loops and decides when to hand weight from
//! one to the other:
//! - talking starts: fast crossfade Idle -> Talk, Talk restarted from frame 0
//! - talking stops: wait a short settle delay, then a slower Talk -> Idle
//!
//! The settle delay is an owned [`ReturnTransition`] compared against the
//! frame clock. A new edge always replaces it, so two transitions can never
//! compete for the same clip pair.

use crate::clock::TimePoint;
use crate::config::BlendConfig;
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::library::ClipLibrary;
use crate::mixer::{AnimationMixer, ClipSlot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/// The delayed return to idle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReturnTransition {
    /// Nothing scheduled
    None,
    /// Blend back to idle once the clock reaches `deadline`
    Pending {
        /// When the Talk -> Idle crossfade starts
        deadline: TimePoint,
    },
}

/// A crossfade in flight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossfadeEdge {
    /// Clip losing weight
    pub from: ClipSlot,
    /// Clip gaining weight
    pub to: ClipSlot,
    /// Total length in seconds
    pub duration: f64,
    /// Time since the crossfade started
    pub elapsed: f64,
    started_at: TimePoint,
}

/// Body clip weights for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipWeights {
    /// Weight of the idle loop
    pub idle: f32,
    /// Weight of the talk loop
    pub talk: f32,
}

/// Idle/Talk blender
#[derive(Debug)]
pub struct BodyAnimationBlender {
    config: BlendConfig,
    /// `None` when a clip is missing: the avatar holds a static pose
    mixer: Option<AnimationMixer>,
    destination: ClipSlot,
    talking: bool,
    pending: ReturnTransition,
    crossfade: Option<CrossfadeEdge>,
    torn_down: bool,
}

impl BodyAnimationBlender {
    /// Create a blender for the library's idle and talk clips
    ///
    /// A missing clip is reported once and leaves the blender inert.
    pub fn new(library: &ClipLibrary, config: BlendConfig, diagnostics: &Diagnostics) -> Self {
        let mixer = match (library.idle_clip(), library.talk_clip()) {
            (Some(idle), Some(talk)) => Some(AnimationMixer::new(idle.clone(), talk.clone())),
            _ => {
                for name in library.missing_clips() {
                    diagnostics.report(DiagnosticEvent::ClipMissing {
                        name: name.to_string(),
                    });
                }
                None
            }
        };

        Self {
            config,
            mixer,
            destination: ClipSlot::Idle,
            talking: false,
            pending: ReturnTransition::None,
            crossfade: None,
            torn_down: false,
        }
    }

    /// Bring the idle loop in from weight 0
    pub fn start(&mut self, now: TimePoint) {
        let fade = self.config.intro_fade;
        let Some(mixer) = self.active_mixer() else {
            return;
        };

        let idle = mixer.action_mut(ClipSlot::Idle);
        idle.reset();
        idle.looping = true;
        idle.set_weight(0.0);
        idle.play();
        idle.fade_to(1.0, fade, now);

        info!("Body blender started, idle fading in over {:.2}s", fade);
    }

    /// Apply the talking flag (edge-triggered; repeated values are ignored)
    pub fn set_talking(&mut self, talking: bool, now: TimePoint) {
        if self.torn_down || talking == self.talking {
            return;
        }
        self.talking = talking;

        if let ReturnTransition::Pending { deadline } = self.pending {
            debug!("Return to idle (due {:.3}) superseded at {:.3}", deadline, now);
        }
        self.pending = ReturnTransition::None;

        if self.mixer.is_none() {
            return;
        }

        if talking {
            self.begin_talk(now);
        } else {
            let deadline = now + self.config.return_delay;
            self.pending = ReturnTransition::Pending { deadline };
            debug!("Return to idle scheduled for {:.3}", deadline);
        }
    }

    fn begin_talk(&mut self, now: TimePoint) {
        let duration = self.config.talk_fade_in;
        let Some(mixer) = self.active_mixer() else {
            return;
        };

        let idle = mixer.action_mut(ClipSlot::Idle);
        if !idle.running {
            idle.set_weight(0.0);
            idle.looping = true;
            idle.play();
        }

        let talk = mixer.action_mut(ClipSlot::Talk);
        talk.reset();
        talk.looping = true;
        talk.play();

        mixer.crossfade(ClipSlot::Idle, ClipSlot::Talk, duration, now);
        self.begin_edge(ClipSlot::Idle, ClipSlot::Talk, duration, now);
    }

    fn begin_return(&mut self, at: TimePoint) {
        let duration = self.config.idle_fade_in;
        let Some(mixer) = self.active_mixer() else {
            return;
        };

        let talk = mixer.action_mut(ClipSlot::Talk);
        if !talk.running {
            debug!("Talk clip had stopped before the return to idle, restarting it");
            talk.looping = true;
            talk.play();
        }

        let idle = mixer.action_mut(ClipSlot::Idle);
        idle.reset();
        idle.looping = true;
        idle.play();

        mixer.crossfade(ClipSlot::Talk, ClipSlot::Idle, duration, at);
        self.begin_edge(ClipSlot::Talk, ClipSlot::Idle, duration, at);
    }

    fn begin_edge(&mut self, from: ClipSlot, to: ClipSlot, duration: f64, at: TimePoint) {
        if let Some(previous) = self.crossfade {
            if previous.to != to {
                debug!(
                    "Crossfade {:?} -> {:?} cut short after {:.3}s",
                    previous.from, previous.to, previous.elapsed
                );
            }
        }

        self.destination = to;
        self.crossfade = Some(CrossfadeEdge {
            from,
            to,
            duration,
            elapsed: 0.0,
            started_at: at,
        });
        debug!("Crossfade {:?} -> {:?} over {:.2}s", from, to, duration);
    }

    /// Fire a due return to idle, then advance the clips (call every frame)
    pub fn tick(&mut self, now: TimePoint, delta_time: f64) {
        if self.torn_down {
            return;
        }

        if let ReturnTransition::Pending { deadline } = self.pending {
            if now >= deadline {
                self.pending = ReturnTransition::None;
                // Timed from the deadline, not from the frame that noticed it.
                self.begin_return(deadline);
            }
        }

        if let Some(mixer) = self.mixer.as_mut() {
            mixer.update(now, delta_time);
        }

        if let Some(edge) = self.crossfade.as_mut() {
            edge.elapsed = (now - edge.started_at).max(0.0);
            if edge.elapsed >= edge.duration {
                trace!("Crossfade {:?} -> {:?} complete", edge.from, edge.to);
                self.crossfade = None;
            }
        }
    }

    /// Cancel any scheduled transition; later calls are ignored
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        if self.pending != ReturnTransition::None {
            debug!("Cancelling pending return to idle on teardown");
        }
        self.pending = ReturnTransition::None;
        self.crossfade = None;
        self.torn_down = true;
    }

    fn active_mixer(&mut self) -> Option<&mut AnimationMixer> {
        if self.torn_down {
            return None;
        }
        self.mixer.as_mut()
    }

    /// Current clip weights; all zero when the blender is inert
    pub fn weights(&self) -> ClipWeights {
        match &self.mixer {
            Some(mixer) => ClipWeights {
                idle: mixer.action(ClipSlot::Idle).weight(),
                talk: mixer.action(ClipSlot::Talk).weight(),
            },
            None => ClipWeights::default(),
        }
    }

    /// The clip currently being blended towards (or resting at)
    pub fn destination(&self) -> ClipSlot {
        self.destination
    }

    /// The scheduled return to idle
    pub fn pending(&self) -> ReturnTransition {
        self.pending
    }

    /// The crossfade in flight, if any
    pub fn crossfade(&self) -> Option<&CrossfadeEdge> {
        self.crossfade.as_ref()
    }

    /// Underlying mixer, absent when a clip is missing
    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.mixer.as_ref()
    }

    /// Whether the blender drives no animation at all
    pub fn is_static(&self) -> bool {
        self.mixer.is_none()
    }

    /// Last applied talking flag
    pub fn is_talking(&self) -> bool {
        self.talking
    }
}
