//! Amplitude Extractor - smoothed speech loudness
//!
//! Once per frame: RMS over the newest waveform window, noise floor removed,
//! gain applied, clamped to [0, 1], then exponentially smoothed across
//! frames so the mouth does not flutter.

use crate::config::AmplitudeConfig;
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::source::{SignalSource, SourcePoll};
use tracing::{debug, trace};

/// Per-frame loudness estimate in [0, 1]
pub struct AmplitudeExtractor {
    config: AmplitudeConfig,
    source: Option<Box<dyn SignalSource>>,
    diagnostics: Diagnostics,
    /// Unsmoothed value of the last sample
    raw: f32,
    /// Smoothed value
    value: f32,
    unavailable: bool,
    frames: u64,
}

impl AmplitudeExtractor {
    /// Create an extractor; without a source it emits constant 0
    pub fn new(
        config: AmplitudeConfig,
        source: Option<Box<dyn SignalSource>>,
        diagnostics: &Diagnostics,
    ) -> Self {
        Self {
            config,
            source,
            diagnostics: diagnostics.clone(),
            raw: 0.0,
            value: 0.0,
            unavailable: false,
            frames: 0,
        }
    }

    /// Replace the signal source
    pub fn set_source(&mut self, source: Box<dyn SignalSource>) {
        debug!("Amplitude source attached");
        self.source = Some(source);
        self.unavailable = false;
        // The new source gets its own outage reports.
        self.diagnostics.resolve_transient();
    }

    /// Stop sampling and drop the source
    pub fn detach_source(&mut self) -> Option<Box<dyn SignalSource>> {
        if self.source.is_some() {
            debug!("Amplitude source detached");
        }
        self.unavailable = false;
        self.source.take()
    }

    /// Whether a source is attached
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Poll the source and return the new smoothed estimate (call every frame)
    pub fn sample(&mut self) -> f32 {
        let rms = self.poll_rms();
        self.raw = self.shape(rms);

        let retention = self.config.retention;
        self.value = (self.value * retention + self.raw * (1.0 - retention)).clamp(0.0, 1.0);

        self.frames += 1;
        if self.frames % 600 == 0 {
            trace!(
                "Amplitude: raw={:.3} smoothed={:.3} after {} frames",
                self.raw,
                self.value,
                self.frames
            );
        }
        self.value
    }

    fn poll_rms(&mut self) -> f32 {
        let window = self.config.window_size;
        let Some(source) = self.source.as_mut() else {
            return 0.0;
        };

        let (rms, missing) = match source.poll(window) {
            SourcePoll::Samples(samples) => (calculate_rms(samples), None),
            SourcePoll::Level(level) => (level, None),
            SourcePoll::Unavailable(reason) => (0.0, Some(reason)),
        };

        match missing {
            Some(reason) if !self.unavailable => {
                self.unavailable = true;
                self.diagnostics.report(DiagnosticEvent::SourceUnavailable {
                    reason: reason.to_string(),
                });
            }
            None if self.unavailable => {
                self.unavailable = false;
                debug!("Amplitude source recovered");
                self.diagnostics.resolve_transient();
            }
            _ => {}
        }
        rms
    }

    /// Noise floor, gain and clamp
    fn shape(&self, rms: f32) -> f32 {
        if !rms.is_finite() {
            return 0.0;
        }
        ((rms - self.config.noise_floor) * self.config.gain).clamp(0.0, 1.0)
    }

    /// Drop the estimate back to 0 (e.g. when playback stops)
    pub fn reset(&mut self) {
        self.raw = 0.0;
        self.value = 0.0;
    }

    /// Smoothed estimate of the last sample
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Unsmoothed estimate of the last sample
    pub fn raw(&self) -> f32 {
        self.raw
    }

    /// Whether the last poll found the source unavailable
    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }
}

impl std::fmt::Debug for AmplitudeExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmplitudeExtractor")
            .field("has_source", &self.source.is_some())
            .field("raw", &self.raw)
            .field("value", &self.value)
            .field("unavailable", &self.unavailable)
            .finish()
    }
}

/// Root-mean-square of a window, treating NaN/Inf samples as silence
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples
        .iter()
        .map(|&s| if s.is_finite() { s * s } else { 0.0 })
        .sum();
    (sum / samples.len() as f32).sqrt()
}
