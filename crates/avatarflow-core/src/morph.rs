//! Morph channels and the per-mesh influence store
//!
//! A semantic facial control (e.g. "BlinkLeft") may live on several meshes at
//! once. A [`MorphChannel`] is the set of `(mesh, index)` pairs for one such
//! control; writing the channel writes every pair with the same value.

use serde::{Deserialize, Serialize};

/// Index of a mesh inside [`MeshInfluences`]
pub type MeshId = usize;

/// One scalar facial control spread across one or more meshes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphChannel {
    bindings: Vec<(MeshId, usize)>,
}

impl MorphChannel {
    /// Create a channel from its bindings. Duplicate pairs are collapsed.
    pub fn new(mut bindings: Vec<(MeshId, usize)>) -> Self {
        bindings.sort_unstable();
        bindings.dedup();
        Self { bindings }
    }

    /// The `(mesh, influence index)` pairs of this channel
    pub fn bindings(&self) -> &[(MeshId, usize)] {
        &self.bindings
    }

    /// Whether the channel resolved to nothing
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Whether the two channels share at least one binding
    pub fn overlaps(&self, other: &MorphChannel) -> bool {
        self.bindings.iter().any(|b| other.bindings.contains(b))
    }

    /// Drop every binding `other` also holds. Returns how many were dropped.
    pub fn remove_shared(&mut self, other: &MorphChannel) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|b| !other.bindings.contains(b));
        before - self.bindings.len()
    }

    /// Write `value` to every binding
    pub fn write(&self, meshes: &mut MeshInfluences, value: f32) {
        for &(mesh, index) in &self.bindings {
            meshes.set(mesh, index, value);
        }
    }

    /// Read the value of the first binding (all bindings hold the same value)
    pub fn read(&self, meshes: &MeshInfluences) -> Option<f32> {
        self.bindings
            .first()
            .and_then(|&(mesh, index)| meshes.get(mesh, index))
    }
}

/// A mesh's morph influence array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSlot {
    /// Mesh name as it appears in the asset
    pub name: String,
    /// One weight per morph target of the mesh
    pub influences: Vec<f32>,
}

/// Morph influence arrays for every mesh of the avatar
///
/// This is the output consumed by the skinning/rendering collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshInfluences {
    meshes: Vec<MeshSlot>,
}

impl MeshInfluences {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh with `morph_count` zeroed influences
    pub fn add_mesh(&mut self, name: impl Into<String>, morph_count: usize) -> MeshId {
        self.meshes.push(MeshSlot {
            name: name.into(),
            influences: vec![0.0; morph_count],
        });
        self.meshes.len() - 1
    }

    /// All meshes
    pub fn meshes(&self) -> &[MeshSlot] {
        &self.meshes
    }

    /// Influence array for a mesh by name
    pub fn influences(&self, name: &str) -> Option<&[f32]> {
        self.meshes
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.influences.as_slice())
    }

    /// Read one influence
    pub fn get(&self, mesh: MeshId, index: usize) -> Option<f32> {
        self.meshes.get(mesh)?.influences.get(index).copied()
    }

    /// Write one influence. Out-of-range bindings are ignored.
    pub fn set(&mut self, mesh: MeshId, index: usize, value: f32) {
        if let Some(slot) = self
            .meshes
            .get_mut(mesh)
            .and_then(|m| m.influences.get_mut(index))
        {
            *slot = value;
        }
    }

    /// Zero every influence
    pub fn clear(&mut self) {
        for mesh in &mut self.meshes {
            mesh.influences.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_heads() -> MeshInfluences {
        let mut meshes = MeshInfluences::new();
        meshes.add_mesh("Head", 4);
        meshes.add_mesh("Eyelashes", 2);
        meshes
    }

    #[test]
    fn test_channel_writes_all_bindings() {
        let mut meshes = two_heads();
        let blink = MorphChannel::new(vec![(0, 2), (1, 0)]);

        blink.write(&mut meshes, 0.75);

        assert_eq!(meshes.get(0, 2), Some(0.75));
        assert_eq!(meshes.get(1, 0), Some(0.75));
        assert_eq!(meshes.get(0, 0), Some(0.0));
        assert_eq!(blink.read(&meshes), Some(0.75));
    }

    #[test]
    fn test_out_of_range_binding_ignored() {
        let mut meshes = two_heads();
        let channel = MorphChannel::new(vec![(5, 0), (1, 9)]);
        channel.write(&mut meshes, 1.0);
        assert!(meshes.meshes().iter().all(|m| m.influences.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_overlap_and_dedup() {
        let a = MorphChannel::new(vec![(0, 1), (0, 1), (1, 0)]);
        let b = MorphChannel::new(vec![(1, 0)]);
        let c = MorphChannel::new(vec![(0, 3)]);

        assert_eq!(a.bindings().len(), 2);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_remove_shared_keeps_the_rest() {
        let mut blink = MorphChannel::new(vec![(0, 0), (1, 0)]);
        let lip = MorphChannel::new(vec![(0, 0)]);

        assert_eq!(blink.remove_shared(&lip), 1);
        assert_eq!(blink.bindings(), &[(1, 0)]);
        assert!(!blink.overlaps(&lip));
        assert_eq!(blink.remove_shared(&lip), 0);
    }

    #[test]
    fn test_lookup_by_name_and_clear() {
        let mut meshes = two_heads();
        meshes.set(1, 1, 0.5);
        assert_eq!(meshes.influences("Eyelashes"), Some(&[0.0, 0.5][..]));

        meshes.clear();
        assert_eq!(meshes.influences("Eyelashes"), Some(&[0.0, 0.0][..]));
        assert!(meshes.influences("Body").is_none());
    }
}
