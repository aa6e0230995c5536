//! Clip Library - named clips and morph channels resolved from a loaded asset
//!
//! The asset loader is a collaborator; the core only sees an [`AvatarAsset`]
//! describing which clips exist and which morph targets each mesh exposes.
//! [`ClipLibrary::resolve`] turns that into read-only handles once, at load.

use crate::config::AssetNames;
use crate::morph::{MeshInfluences, MorphChannel};
use crate::{AvatarError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// A baked animation clip as reported by the asset loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInfo {
    /// Clip name
    pub name: String,
    /// Clip length in seconds
    pub duration: f64,
}

impl ClipInfo {
    /// Create a clip description
    pub fn new(name: impl Into<String>, duration: f64) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }
}

/// Morph targets exposed by one mesh, in influence-array order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshMorphs {
    /// Mesh name
    pub name: String,
    /// Morph target names; the position is the influence index
    pub targets: Vec<String>,
}

impl MeshMorphs {
    /// Create a mesh description
    pub fn new(name: impl Into<String>, targets: &[&str]) -> Self {
        Self {
            name: name.into(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Influence index of a target
    pub fn index_of(&self, target: &str) -> Option<usize> {
        self.targets.iter().position(|t| t == target)
    }
}

/// The resolved result of loading an avatar asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarAsset {
    /// Baked clips
    #[serde(default)]
    pub clips: Vec<ClipInfo>,
    /// Meshes carrying morph targets
    #[serde(default)]
    pub meshes: Vec<MeshMorphs>,
}

impl AvatarAsset {
    /// Decode a manifest from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON manifest from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Zeroed influence arrays, one per mesh, in asset order
    pub fn influences(&self) -> MeshInfluences {
        let mut meshes = MeshInfluences::new();
        for mesh in &self.meshes {
            meshes.add_mesh(mesh.name.clone(), mesh.targets.len());
        }
        meshes
    }
}

/// Semantic facial controls driven by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MorphTarget {
    /// Lips parting
    LipOpen,
    /// Jaw dropping
    JawOpen,
    /// Left eyelid closing
    BlinkLeft,
    /// Right eyelid closing
    BlinkRight,
}

impl MorphTarget {
    /// Every target, in resolution order
    pub const ALL: [MorphTarget; 4] = [
        MorphTarget::LipOpen,
        MorphTarget::JawOpen,
        MorphTarget::BlinkLeft,
        MorphTarget::BlinkRight,
    ];

    /// Name of this target in the asset
    pub fn asset_name<'a>(&self, names: &'a AssetNames) -> &'a str {
        match self {
            MorphTarget::LipOpen => &names.lip_open,
            MorphTarget::JawOpen => &names.jaw_open,
            MorphTarget::BlinkLeft => &names.blink_left,
            MorphTarget::BlinkRight => &names.blink_right,
        }
    }

    /// Optional targets are skipped silently when absent
    pub fn is_optional(&self) -> bool {
        matches!(self, MorphTarget::JawOpen)
    }
}

impl fmt::Display for MorphTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MorphTarget::LipOpen => "LipOpen",
            MorphTarget::JawOpen => "JawOpen",
            MorphTarget::BlinkLeft => "BlinkLeft",
            MorphTarget::BlinkRight => "BlinkRight",
        };
        f.write_str(name)
    }
}

/// Read-only handles to the clips and morph channels the core needs
#[derive(Debug, Clone, PartialEq)]
pub struct ClipLibrary {
    names: AssetNames,
    clips: HashMap<String, ClipInfo>,
    channels: HashMap<MorphTarget, MorphChannel>,
}

impl ClipLibrary {
    /// Resolve clip and morph names against a loaded asset
    ///
    /// Lookups that fail are simply absent from the library; callers decide
    /// whether that is worth a diagnostic.
    pub fn resolve(asset: &AvatarAsset, names: &AssetNames) -> Self {
        let clips: HashMap<String, ClipInfo> = asset
            .clips
            .iter()
            .map(|c| (c.name.clone(), c.clone()))
            .collect();

        let mut channels = HashMap::new();
        for target in MorphTarget::ALL {
            let wanted = target.asset_name(names);
            let bindings: Vec<(usize, usize)> = asset
                .meshes
                .iter()
                .enumerate()
                .filter_map(|(mesh_id, mesh)| mesh.index_of(wanted).map(|idx| (mesh_id, idx)))
                .collect();

            if bindings.is_empty() {
                debug!("Morph target {} ('{}') not found on any mesh", target, wanted);
                continue;
            }

            debug!(
                "Resolved morph target {} to {} binding(s)",
                target,
                bindings.len()
            );
            channels.insert(target, MorphChannel::new(bindings));
        }

        info!(
            "Clip library resolved: {} clip(s), {}/{} morph channel(s)",
            clips.len(),
            channels.len(),
            MorphTarget::ALL.len()
        );

        Self {
            names: names.clone(),
            clips,
            channels,
        }
    }

    /// Names this library was resolved with
    pub fn names(&self) -> &AssetNames {
        &self.names
    }

    /// Look up any clip by name
    pub fn clip(&self, name: &str) -> Option<&ClipInfo> {
        self.clips.get(name)
    }

    /// The configured idle clip, if present
    pub fn idle_clip(&self) -> Option<&ClipInfo> {
        self.clip(&self.names.idle)
    }

    /// The configured talk clip, if present
    pub fn talk_clip(&self) -> Option<&ClipInfo> {
        self.clip(&self.names.talk)
    }

    /// Channel for a semantic target, if it resolved
    pub fn channel(&self, target: MorphTarget) -> Option<&MorphChannel> {
        self.channels.get(&target)
    }

    /// Configured clip names that did not resolve
    pub fn missing_clips(&self) -> Vec<&str> {
        [self.names.idle.as_str(), self.names.talk.as_str()]
            .into_iter()
            .filter(|name| !self.clips.contains_key(*name))
            .collect()
    }

    /// Fail with [`AvatarError::ClipMissing`] unless both body clips resolved
    pub fn require_clips(&self) -> Result<()> {
        match self.missing_clips().first() {
            Some(name) => Err(AvatarError::ClipMissing {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Fail with [`AvatarError::MorphMissing`] for the first absent required target
    pub fn require_channels(&self) -> Result<()> {
        match self.missing_channels().into_iter().find(|t| !t.is_optional()) {
            Some(target) => Err(AvatarError::MorphMissing {
                name: target.asset_name(&self.names).to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Targets that did not resolve
    pub fn missing_channels(&self) -> Vec<MorphTarget> {
        MorphTarget::ALL
            .into_iter()
            .filter(|t| !self.channels.contains_key(t))
            .collect()
    }

    /// Take influences shared with the mouth away from the eyelid channels
    ///
    /// The mouth keeps every binding it resolved; an eyelid channel may end
    /// up empty. Returns the `(eyelid, mouth)` pairs that overlapped.
    pub fn separate_blink_from_mouth(&mut self) -> Vec<(MorphTarget, MorphTarget)> {
        let mut conflicts = Vec::new();
        for mouth in [MorphTarget::LipOpen, MorphTarget::JawOpen] {
            let Some(mouth_channel) = self.channels.get(&mouth).cloned() else {
                continue;
            };
            for eyelid in [MorphTarget::BlinkLeft, MorphTarget::BlinkRight] {
                if let Some(channel) = self.channels.get_mut(&eyelid) {
                    let dropped = channel.remove_shared(&mouth_channel);
                    if dropped > 0 {
                        debug!(
                            "Dropped {} {} binding(s) shared with {}",
                            dropped, eyelid, mouth
                        );
                        conflicts.push((eyelid, mouth));
                    }
                }
            }
        }
        conflicts
    }
}
