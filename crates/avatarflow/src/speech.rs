//! Speech audio for offline runs: a WAV file or a synthetic stand-in

use anyhow::{Context, Result};
use std::f32::consts::TAU;
use std::path::Path;

/// Mono speech samples
#[derive(Debug, Clone)]
pub struct Speech {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Speech {
    /// Load a WAV file, downmixed to mono
    pub fn load_wav(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("cannot open WAV {}", path.display()))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .context("WAV read error")?
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<f32>, _>>()
                .context("WAV read error")?,
        };

        let channels = spec.channels.max(1) as usize;
        let samples = if channels > 1 {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        } else {
            interleaved
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// A syllable-paced tone roughly shaped like speech
    ///
    /// A 180Hz carrier with a few harmonics, gated on and off about four
    /// times a second with short pauses between "words".
    pub fn synthetic(seconds: f64, sample_rate: u32) -> Self {
        let count = (seconds.max(0.0) * sample_rate as f64) as usize;
        let rate = sample_rate as f32;
        let samples = (0..count)
            .map(|i| {
                let t = i as f32 / rate;
                let carrier = (t * 180.0 * TAU).sin()
                    + 0.5 * (t * 360.0 * TAU).sin()
                    + 0.25 * (t * 540.0 * TAU).sin();
                let syllable = (t * 4.0 * TAU / 2.0).sin().abs();
                let word_gap = if (t % 1.3) > 1.1 { 0.0 } else { 1.0 };
                carrier * syllable * word_gap * 0.18
            })
            .collect();

        Self {
            samples,
            sample_rate,
        }
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Hands out consecutive chunks of a [`Speech`] buffer as playback advances
#[derive(Debug)]
pub struct Playback {
    speech: Speech,
    cursor: usize,
}

impl Playback {
    pub fn new(speech: Speech) -> Self {
        Self { speech, cursor: 0 }
    }

    /// Samples covering the next `seconds` of playback; empty once finished
    pub fn advance(&mut self, seconds: f64) -> &[f32] {
        let wanted = (seconds * self.speech.sample_rate as f64).round() as usize;
        let start = self.cursor;
        let end = (start + wanted).min(self.speech.samples.len());
        self.cursor = end;
        &self.speech.samples[start..end]
    }

    pub fn finished(&self) -> bool {
        self.cursor >= self.speech.samples.len()
    }
}
