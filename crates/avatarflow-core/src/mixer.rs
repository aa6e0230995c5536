//! Animation Mixer - looping clip playback with linear weight fades
//!
//! A minimal stand-in for a scene-graph animation mixer: one [`ClipAction`]
//! per body clip, each with a playhead, a blend weight and at most one
//! in-flight weight fade. The mixer is advanced once per frame.

use crate::clock::TimePoint;
use crate::library::ClipInfo;
use serde::{Deserialize, Serialize};

/// The two body clips the blender drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipSlot {
    /// Resting loop
    Idle,
    /// Speaking loop
    Talk,
}

impl ClipSlot {
    /// The other slot
    pub fn other(self) -> ClipSlot {
        match self {
            ClipSlot::Idle => ClipSlot::Talk,
            ClipSlot::Talk => ClipSlot::Idle,
        }
    }
}

/// Linear ramp of an action's weight, timed against the frame clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct WeightFade {
    from: f32,
    to: f32,
    start: TimePoint,
    duration: f64,
}

impl WeightFade {
    fn value(&self, now: TimePoint) -> f32 {
        if self.duration <= 0.0 {
            return self.to;
        }
        let t = ((now - self.start) / self.duration).clamp(0.0, 1.0) as f32;
        self.from + (self.to - self.from) * t
    }

    fn finished(&self, now: TimePoint) -> bool {
        now - self.start >= self.duration
    }
}

/// Playback state of one clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipAction {
    /// The clip being played
    pub clip: ClipInfo,
    /// Current playback time in seconds
    pub time: TimePoint,
    /// Whether playback is active
    pub running: bool,
    /// Whether the clip wraps at its end
    pub looping: bool,
    /// Playback speed multiplier (1.0 = normal)
    pub speed: f32,
    weight: f32,
    fade: Option<WeightFade>,
}

impl ClipAction {
    /// Create a stopped action at weight 0
    pub fn new(clip: ClipInfo) -> Self {
        Self {
            clip,
            time: 0.0,
            running: false,
            looping: true,
            speed: 1.0,
            weight: 0.0,
            fade: None,
        }
    }

    /// Current blend weight
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Set the weight immediately, cancelling any fade
    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight.clamp(0.0, 1.0);
        self.fade = None;
    }

    /// Whether a weight fade is in flight
    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Weight the in-flight fade is heading to
    pub fn fade_target(&self) -> Option<f32> {
        self.fade.map(|f| f.to)
    }

    /// Start playback
    pub fn play(&mut self) {
        self.running = true;
    }

    /// Stop playback without touching the playhead
    pub fn stop(&mut self) {
        self.running = false;
        self.fade = None;
    }

    /// Rewind to the first frame
    pub fn reset(&mut self) {
        self.time = 0.0;
    }

    /// Ramp the weight linearly from its current value to `target`,
    /// starting at `now`
    ///
    /// Replaces any fade already in flight. Reaching 0 stops the action.
    pub fn fade_to(&mut self, target: f32, duration: f64, now: TimePoint) {
        let fade = WeightFade {
            from: self.weight,
            to: target.clamp(0.0, 1.0),
            start: now,
            duration: duration.max(0.0),
        };
        if fade.finished(now) {
            self.finish_fade(fade.to);
        } else {
            self.fade = Some(fade);
        }
    }

    fn finish_fade(&mut self, target: f32) {
        self.weight = target;
        self.fade = None;
        if target <= 0.0 {
            self.running = false;
        }
    }

    /// Advance the playhead by `delta_time` and the fade to `now`
    /// (call every frame)
    pub fn update(&mut self, now: TimePoint, delta_time: f64) {
        if !self.running {
            return;
        }

        let duration = self.clip.duration;
        if duration > 0.0 {
            self.time += delta_time * self.speed as f64;
            if self.looping {
                if self.time >= duration {
                    self.time %= duration;
                }
            } else if self.time >= duration {
                self.time = duration;
            }
        }

        if let Some(fade) = self.fade {
            if fade.finished(now) {
                self.finish_fade(fade.to);
            } else {
                self.weight = fade.value(now);
            }
        }
    }
}

/// Idle and Talk actions advanced together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationMixer {
    idle: ClipAction,
    talk: ClipAction,
}

impl AnimationMixer {
    /// Create a mixer with both actions stopped at weight 0
    pub fn new(idle: ClipInfo, talk: ClipInfo) -> Self {
        Self {
            idle: ClipAction::new(idle),
            talk: ClipAction::new(talk),
        }
    }

    /// Action for a slot
    pub fn action(&self, slot: ClipSlot) -> &ClipAction {
        match slot {
            ClipSlot::Idle => &self.idle,
            ClipSlot::Talk => &self.talk,
        }
    }

    /// Mutable action for a slot
    pub fn action_mut(&mut self, slot: ClipSlot) -> &mut ClipAction {
        match slot {
            ClipSlot::Idle => &mut self.idle,
            ClipSlot::Talk => &mut self.talk,
        }
    }

    /// Hand the weight over from one clip to the other
    ///
    /// Both ramps start at the actions' current weights, so restarting a
    /// crossfade mid-way never jumps and the weights never sum above 1.
    pub fn crossfade(&mut self, from: ClipSlot, to: ClipSlot, duration: f64, now: TimePoint) {
        self.action_mut(to).fade_to(1.0, duration, now);
        self.action_mut(from).fade_to(0.0, duration, now);
    }

    /// Advance both actions (call every frame)
    pub fn update(&mut self, now: TimePoint, delta_time: f64) {
        self.idle.update(now, delta_time);
        self.talk.update(now, delta_time);
    }

    /// Stop both actions and zero their weights
    pub fn stop_all(&mut self) {
        for slot in [ClipSlot::Idle, ClipSlot::Talk] {
            let action = self.action_mut(slot);
            action.stop();
            action.set_weight(0.0);
        }
    }
}
