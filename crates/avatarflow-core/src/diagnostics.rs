//! Diagnostics - recoverable problem reporting
//!
//! Nothing in the frame loop is allowed to fail. Instead, sub-controllers
//! degrade to a no-op and report what is missing through this side channel.
//!
//! # Features
//!
//! - **DiagnosticEvent**: a missing clip/channel, a blink/mouth channel conflict
//!   or an unavailable signal source.
//! - **Diagnostics**: shared reporter that logs each event once and forwards it
//!   to an optional bounded channel.
//! - **check_rig_integrity**: static validation of a resolved [`ClipLibrary`].

use crate::library::{ClipLibrary, MorphTarget};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A recoverable problem observed at runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticEvent {
    /// A configured clip is absent from the asset
    ClipMissing {
        /// Clip name that was looked up
        name: String,
    },
    /// A morph channel is absent from every mesh
    ChannelMissing {
        /// Semantic target
        target: MorphTarget,
        /// Asset name that was looked up
        name: String,
    },
    /// An eyelid channel shared influences with a mouth channel
    ChannelConflict {
        /// Eyelid target that gave up the shared influences
        eyelid: MorphTarget,
        /// Mouth target that kept them
        mouth: MorphTarget,
    },
    /// The audio signal is not available right now
    SourceUnavailable {
        /// Why, in words
        reason: String,
    },
}

impl DiagnosticEvent {
    /// Whether the event describes the asset (as opposed to a transient condition)
    pub fn is_configuration(&self) -> bool {
        !matches!(self, DiagnosticEvent::SourceUnavailable { .. })
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::ClipMissing { name } => {
                write!(f, "clip '{}' not found, body animation disabled", name)
            }
            DiagnosticEvent::ChannelMissing { target, name } => {
                write!(f, "morph channel {} ('{}') not found", target, name)
            }
            DiagnosticEvent::ChannelConflict { eyelid, mouth } => {
                write!(
                    f,
                    "morph channels {} and {} share an influence, blink no longer drives it",
                    eyelid, mouth
                )
            }
            DiagnosticEvent::SourceUnavailable { reason } => {
                write!(f, "audio signal unavailable: {}", reason)
            }
        }
    }
}

struct DiagnosticsInner {
    seen: Mutex<HashSet<DiagnosticEvent>>,
    sender: Option<Sender<DiagnosticEvent>>,
}

/// Shared, deduplicating diagnostics reporter
///
/// Each distinct event is emitted once. Transient events can be re-armed
/// with [`Diagnostics::resolve_transient`] once the condition clears.
#[derive(Clone)]
pub struct Diagnostics {
    inner: Arc<DiagnosticsInner>,
}

impl Diagnostics {
    /// Reporter that only logs
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DiagnosticsInner {
                seen: Mutex::new(HashSet::new()),
                sender: None,
            }),
        }
    }

    /// Reporter that also forwards events to the returned receiver
    ///
    /// Forwarding never blocks; events are dropped when the channel is full.
    pub fn with_channel(capacity: usize) -> (Self, Receiver<DiagnosticEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        let diagnostics = Self {
            inner: Arc::new(DiagnosticsInner {
                seen: Mutex::new(HashSet::new()),
                sender: Some(tx),
            }),
        };
        (diagnostics, rx)
    }

    /// Report an event. Returns `true` the first time it is seen.
    pub fn report(&self, event: DiagnosticEvent) -> bool {
        if !self.inner.seen.lock().insert(event.clone()) {
            return false;
        }

        warn!("{}", event);

        if let Some(sender) = &self.inner.sender {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    debug!("Diagnostics channel full, dropping: {}", dropped);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        true
    }

    /// Forget transient events so they are reported again on recurrence
    pub fn resolve_transient(&self) {
        self.inner.seen.lock().retain(|e| e.is_configuration());
    }

    /// Whether an event has been reported
    pub fn has_reported(&self, event: &DiagnosticEvent) -> bool {
        self.inner.seen.lock().contains(event)
    }

    /// Number of distinct events currently recorded
    pub fn reported_count(&self) -> usize {
        self.inner.seen.lock().len()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("reported", &self.reported_count())
            .field("forwarding", &self.inner.sender.is_some())
            .finish()
    }
}

/// Represents an issue found in a resolved rig
#[derive(Debug, Clone)]
pub struct RigIssue {
    /// Severity level of the issue
    pub severity: IssueSeverity,
    /// Human-readable description
    pub message: String,
}

/// Severity level of a rig issue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IssueSeverity {
    /// The rig breaks a controller invariant
    Error,
    /// A feature will silently be a no-op
    Warning,
    /// Informational message
    Info,
}

/// Check a resolved library for missing resources and conflicting channels
///
/// This performs multiple checks:
/// 1. Clip presence and length
/// 2. Morph channel presence (required vs. optional)
/// 3. Blink and viseme channels writing the same influence
pub fn check_rig_integrity(library: &ClipLibrary) -> Vec<RigIssue> {
    let mut issues = Vec::new();
    let names = library.names();

    // 1. Clips
    for name in library.missing_clips() {
        issues.push(RigIssue {
            severity: IssueSeverity::Warning,
            message: format!("Clip '{}' is missing; the body will hold a static pose", name),
        });
    }
    for clip in [library.idle_clip(), library.talk_clip()].into_iter().flatten() {
        if clip.duration.is_nan() || clip.duration <= 0.0 {
            issues.push(RigIssue {
                severity: IssueSeverity::Warning,
                message: format!(
                    "Clip '{}' has non-positive duration {}; it will not advance",
                    clip.name, clip.duration
                ),
            });
        }
    }

    // 2. Channels
    for target in library.missing_channels() {
        let severity = if target.is_optional() {
            IssueSeverity::Info
        } else {
            IssueSeverity::Warning
        };
        issues.push(RigIssue {
            severity,
            message: format!(
                "Morph channel {} ('{}') is missing",
                target,
                target.asset_name(names)
            ),
        });
    }

    // 3. Blink and viseme must never write the same influence
    for eye in [MorphTarget::BlinkLeft, MorphTarget::BlinkRight] {
        for mouth in [MorphTarget::LipOpen, MorphTarget::JawOpen] {
            if let (Some(a), Some(b)) = (library.channel(eye), library.channel(mouth)) {
                if a.overlaps(b) {
                    issues.push(RigIssue {
                        severity: IssueSeverity::Error,
                        message: format!("Channels {} and {} share an influence", eye, mouth),
                    });
                }
            }
        }
    }

    issues
}
