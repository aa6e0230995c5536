//! Audio signal sources
//!
//! The amplitude extractor polls a [`SignalSource`] once per frame. Sources
//! are fed by the host's audio subsystem, usually from its own callback
//! thread, so every handoff here is lock-free and last-write-wins:
//!
//! - [`waveform_tap`]: the audio side pushes raw samples into a [`TapWriter`];
//!   the newest window is published through `arc-swap` and read by a
//!   [`WaveformTap`].
//! - [`level_tap`]: the audio side already knows its loudness and publishes a
//!   single RMS scalar through an atomic.

use arc_swap::ArcSwap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// What a source produced for this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourcePoll<'a> {
    /// Time-domain samples, newest last
    Samples(&'a [f32]),
    /// A precomputed RMS level
    Level(f32),
    /// Nothing to read right now
    Unavailable(&'static str),
}

/// A live audio signal polled once per frame
pub trait SignalSource: Send {
    /// Return up to `window` of the newest samples, or a level
    ///
    /// Must never block.
    fn poll(&mut self, window: usize) -> SourcePoll<'_>;
}

/// Window buffers a writer keeps for reuse besides the published one
const SPARE_WINDOWS: usize = 2;

struct TapShared {
    latest: ArcSwap<Vec<f32>>,
    published: AtomicBool,
    live: AtomicBool,
}

/// Create a connected waveform writer/reader pair keeping `capacity` samples
pub fn waveform_tap(capacity: usize) -> (TapWriter, WaveformTap) {
    let capacity = capacity.max(1);
    let shared = Arc::new(TapShared {
        latest: ArcSwap::from_pointee(Vec::new()),
        published: AtomicBool::new(false),
        live: AtomicBool::new(true),
    });
    let writer = TapWriter {
        ring: VecDeque::with_capacity(capacity),
        capacity,
        spares: (0..SPARE_WINDOWS)
            .map(|_| Arc::new(Vec::with_capacity(capacity)))
            .collect(),
        shared: Arc::clone(&shared),
    };
    let reader = WaveformTap {
        shared,
        snapshot: Arc::new(Vec::new()),
    };
    (writer, reader)
}

/// Audio-thread side of a waveform tap
///
/// Pushing does not allocate once the tap is warm: the ring never grows past
/// its capacity and published windows are recycled after the reader lets go.
pub struct TapWriter {
    ring: VecDeque<f32>,
    capacity: usize,
    spares: Vec<Arc<Vec<f32>>>,
    shared: Arc<TapShared>,
}

impl TapWriter {
    /// Append mono samples and publish the newest window
    pub fn push(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let newest = &samples[samples.len().saturating_sub(self.capacity)..];
        self.make_room(newest.len());
        self.ring.extend(newest.iter().copied());
        self.publish();
    }

    /// Append interleaved frames, averaging the channels down to mono
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        if channels <= 1 {
            self.push(data);
            return;
        }
        if data.is_empty() {
            return;
        }
        let frames = data.len().div_ceil(channels);
        let skip = frames.saturating_sub(self.capacity);
        self.make_room(frames - skip);
        self.ring.extend(
            data.chunks(channels)
                .skip(skip)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
        self.publish();
    }

    /// Publish silence, e.g. when playback pauses
    pub fn clear(&mut self) {
        self.ring.clear();
        self.publish();
    }

    /// Drop the oldest samples so `incoming` more fit within capacity
    fn make_room(&mut self, incoming: usize) {
        let keep = self.capacity.saturating_sub(incoming);
        let excess = self.ring.len().saturating_sub(keep);
        self.ring.drain(..excess);
    }

    fn publish(&mut self) {
        let mut window = self.take_spare();
        match Arc::get_mut(&mut window) {
            Some(buffer) => {
                buffer.clear();
                buffer.extend(self.ring.iter().copied());
            }
            None => window = Arc::new(self.ring.iter().copied().collect()),
        }

        let previous = self.shared.latest.swap(window);
        self.shared.published.store(true, Ordering::Release);
        if self.spares.len() < SPARE_WINDOWS {
            self.spares.push(previous);
        }
    }

    /// A buffer the reader no longer holds, or a fresh one if it holds them all
    fn take_spare(&mut self) -> Arc<Vec<f32>> {
        match self.spares.iter().position(|w| Arc::strong_count(w) == 1) {
            Some(index) => self.spares.swap_remove(index),
            None => Arc::new(Vec::with_capacity(self.capacity)),
        }
    }
}

impl Drop for TapWriter {
    fn drop(&mut self) {
        self.shared.live.store(false, Ordering::Release);
    }
}

/// Render-thread side of a waveform tap
pub struct WaveformTap {
    shared: Arc<TapShared>,
    snapshot: Arc<Vec<f32>>,
}

impl WaveformTap {
    /// Whether the writer still exists
    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::Acquire)
    }
}

impl SignalSource for WaveformTap {
    fn poll(&mut self, window: usize) -> SourcePoll<'_> {
        if !self.is_live() {
            return SourcePoll::Unavailable("audio writer closed");
        }
        if !self.shared.published.load(Ordering::Acquire) {
            return SourcePoll::Unavailable("no samples yet");
        }

        self.snapshot = self.shared.latest.load_full();
        let start = self.snapshot.len().saturating_sub(window);
        SourcePoll::Samples(&self.snapshot[start..])
    }
}

/// Create a connected level writer/reader pair
pub fn level_tap() -> (LevelWriter, LevelTap) {
    let bits = Arc::new(AtomicU32::new(f32::NAN.to_bits()));
    (
        LevelWriter {
            bits: Arc::clone(&bits),
        },
        LevelTap { bits },
    )
}

/// Audio-thread side of a level tap
#[derive(Debug)]
pub struct LevelWriter {
    bits: Arc<AtomicU32>,
}

impl LevelWriter {
    /// Publish the current RMS level
    pub fn set(&self, level: f32) {
        let level = if level.is_finite() { level.max(0.0) } else { 0.0 };
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }
}

impl Drop for LevelWriter {
    fn drop(&mut self) {
        self.bits.store(f32::NAN.to_bits(), Ordering::Relaxed);
    }
}

/// Render-thread side of a level tap
#[derive(Debug)]
pub struct LevelTap {
    bits: Arc<AtomicU32>,
}

impl SignalSource for LevelTap {
    fn poll(&mut self, _window: usize) -> SourcePoll<'_> {
        let level = f32::from_bits(self.bits.load(Ordering::Relaxed));
        if level.is_nan() {
            SourcePoll::Unavailable("no level published")
        } else {
            SourcePoll::Level(level)
        }
    }
}
