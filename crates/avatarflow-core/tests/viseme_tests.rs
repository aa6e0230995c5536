use avatarflow_core::viseme::{approach, jaw_target, lip_target};
use avatarflow_core::{
    AssetNames, AvatarAsset, ClipLibrary, DiagnosticEvent, Diagnostics, MeshMorphs, MorphTarget,
    VisemeConfig, VisemeDriver,
};
use proptest::prelude::*;

fn driver(targets: &[&str]) -> (VisemeDriver, avatarflow_core::MeshInfluences, Diagnostics) {
    let asset = AvatarAsset {
        clips: Vec::new(),
        meshes: vec![
            MeshMorphs::new("Head", targets),
            MeshMorphs::new("Teeth", &["JawOpen"]),
        ],
    };
    let library = ClipLibrary::resolve(&asset, &AssetNames::default());
    let diagnostics = Diagnostics::new();
    let driver = VisemeDriver::new(&library, VisemeConfig::default(), &diagnostics);
    (driver, asset.influences(), diagnostics)
}

#[test]
fn test_reference_targets() {
    let config = VisemeConfig::default();

    assert!((lip_target(&config, 0.0, true) - 0.06).abs() < 1e-6);
    assert_eq!(jaw_target(&config, 0.0, true), 0.0);

    assert_eq!(lip_target(&config, 1.0, true), 1.0);
    assert!((jaw_target(&config, 1.0, true) - 0.6).abs() < 1e-6);
}

#[test]
fn test_converges_without_overshoot() {
    let (mut viseme, mut meshes, _) = driver(&["LipOpen", "JawOpen"]);
    let config = VisemeConfig::default();
    let lip_goal = lip_target(&config, 0.4, true);
    let jaw_goal = jaw_target(&config, 0.4, true);

    let mut frames = 0;
    while viseme.lip() != lip_goal || viseme.jaw() != jaw_goal {
        viseme.update(0.4, true, &mut meshes);
        assert!(viseme.lip() <= lip_goal);
        assert!(viseme.jaw() <= jaw_goal);
        frames += 1;
        assert!(frames < 64, "did not converge");
    }

    // Holding the target leaves the value exactly where it is.
    for _ in 0..10 {
        viseme.update(0.4, true, &mut meshes);
        assert_eq!(viseme.lip(), lip_goal);
        assert_eq!(viseme.jaw(), jaw_goal);
    }
}

#[test]
fn test_jaw_written_to_every_mesh() {
    let (mut viseme, mut meshes, _) = driver(&["LipOpen", "JawOpen"]);
    for _ in 0..5 {
        viseme.update(0.8, true, &mut meshes);
    }
    let head = meshes.influences("Head").unwrap();
    let teeth = meshes.influences("Teeth").unwrap();
    assert_eq!(head[1], teeth[0]);
    assert!(teeth[0] > 0.0);
}

#[test]
fn test_missing_lip_channel_is_noop() {
    let (mut viseme, mut meshes, diagnostics) = driver(&["Frown"]);
    assert!(diagnostics.has_reported(&DiagnosticEvent::ChannelMissing {
        target: MorphTarget::LipOpen,
        name: "LipOpen".to_string(),
    }));

    viseme.update(1.0, true, &mut meshes);
    assert_eq!(meshes.influences("Head"), Some(&[0.0][..]));
    // The optional jaw still works on the other mesh.
    assert!(meshes.influences("Teeth").unwrap()[0] > 0.0);
}

proptest! {
    #[test]
    fn prop_silent_when_not_talking(a in 0.0f32..=1.0) {
        let config = VisemeConfig::default();
        prop_assert_eq!(lip_target(&config, a, false), 0.0);
        prop_assert_eq!(jaw_target(&config, a, false), 0.0);
    }

    #[test]
    fn prop_talking_targets_bounded(a in 0.0f32..=1.0) {
        let config = VisemeConfig::default();
        let lip = lip_target(&config, a, true);
        let jaw = jaw_target(&config, a, true);
        prop_assert!((0.06 - 1e-6..=1.0).contains(&lip));
        prop_assert!((0.0..=0.6 + 1e-6).contains(&jaw));
        prop_assert!(lip >= jaw);
    }

    #[test]
    fn prop_approach_never_overshoots(
        current in 0.0f32..=1.0,
        target in 0.0f32..=1.0,
        rate in 0.0f32..=1.0,
    ) {
        let next = approach(current, target, rate);
        let (lo, hi) = if current <= target { (current, target) } else { (target, current) };
        prop_assert!(next >= lo && next <= hi);
    }
}
