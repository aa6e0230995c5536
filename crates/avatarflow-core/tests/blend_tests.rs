use avatarflow_core::{
    AssetNames, AvatarAsset, BlendConfig, BodyAnimationBlender, ClipInfo, ClipLibrary, ClipSlot,
    Diagnostics, ReturnTransition,
};
use proptest::prelude::*;

const DT: f64 = 1.0 / 60.0;

fn library() -> ClipLibrary {
    let asset = AvatarAsset {
        clips: vec![ClipInfo::new("Idle", 3.2), ClipInfo::new("Talk", 1.7)],
        meshes: Vec::new(),
    };
    ClipLibrary::resolve(&asset, &AssetNames::default())
}

fn blender() -> BodyAnimationBlender {
    let mut blender =
        BodyAnimationBlender::new(&library(), BlendConfig::default(), &Diagnostics::new());
    blender.start(0.0);
    blender
}

/// Tick at 60fps for `seconds`, checking the weight invariants every frame
fn run(blender: &mut BodyAnimationBlender, now: &mut f64, seconds: f64) {
    let frames = (seconds / DT).round() as usize;
    for _ in 0..frames {
        *now += DT;
        blender.tick(*now, DT);
        let w = blender.weights();
        assert!((0.0..=1.0).contains(&w.idle), "idle weight {}", w.idle);
        assert!((0.0..=1.0).contains(&w.talk), "talk weight {}", w.talk);
        assert!(w.idle + w.talk <= 1.0 + 1e-5, "weights summed to {}", w.idle + w.talk);
    }
}

#[test]
fn test_quick_stop_start_keeps_talking() {
    let mut blender = blender();
    let mut now = 0.0;
    run(&mut blender, &mut now, 1.0);

    blender.set_talking(true, now);
    run(&mut blender, &mut now, 0.4);
    assert_eq!(blender.weights().talk, 1.0);

    // Stop, then resume well inside the 0.25s settle delay.
    blender.set_talking(false, now);
    run(&mut blender, &mut now, 0.1);
    blender.set_talking(true, now);
    assert_eq!(blender.pending(), ReturnTransition::None);

    let mut last_talk = blender.weights().talk;
    for _ in 0..120 {
        now += DT;
        blender.tick(now, DT);
        assert_eq!(blender.destination(), ClipSlot::Talk);
        let talk = blender.weights().talk;
        assert!(talk >= last_talk, "talk weight dipped {} -> {}", last_talk, talk);
        last_talk = talk;
    }
    assert_eq!(last_talk, 1.0);
}

#[test]
fn test_second_stop_replaces_deadline() {
    let mut blender = blender();
    let mut now = 0.0;
    run(&mut blender, &mut now, 0.5);

    blender.set_talking(true, now);
    run(&mut blender, &mut now, 0.5);
    blender.set_talking(false, now);
    let first = blender.pending();

    run(&mut blender, &mut now, 0.1);
    blender.set_talking(true, now);
    blender.set_talking(false, now);
    let second = blender.pending();

    match (first, second) {
        (
            ReturnTransition::Pending { deadline: a },
            ReturnTransition::Pending { deadline: b },
        ) => assert!(b > a),
        other => panic!("expected two pending returns, got {:?}", other),
    }
}

#[test]
fn test_talk_restarts_from_first_frame() {
    let mut blender = blender();
    let mut now = 0.0;
    blender.set_talking(true, now);
    run(&mut blender, &mut now, 1.0);
    let talk_time = blender.mixer().unwrap().action(ClipSlot::Talk).time;
    assert!(talk_time > 0.9);

    blender.set_talking(false, now);
    run(&mut blender, &mut now, 0.1);
    blender.set_talking(true, now);
    assert_eq!(blender.mixer().unwrap().action(ClipSlot::Talk).time, 0.0);
}

#[test]
fn test_talk_loops_indefinitely() {
    let mut blender = blender();
    let mut now = 0.0;
    blender.set_talking(true, now);
    run(&mut blender, &mut now, 10.0);

    let talk = blender.mixer().unwrap().action(ClipSlot::Talk);
    assert!(talk.running);
    assert!(talk.time < 1.7);
    assert_eq!(talk.weight(), 1.0);
}

proptest! {
    #[test]
    fn prop_toggles_keep_weights_sane(
        toggles in prop::collection::vec((any::<bool>(), 0.0f64..1.0), 1..20)
    ) {
        let mut blender = blender();
        let mut now = 0.0;
        let mut talking = false;

        for (flag, gap) in toggles {
            blender.set_talking(flag, now);
            talking = flag;
            run(&mut blender, &mut now, gap);
        }
        run(&mut blender, &mut now, 2.0);

        let w = blender.weights();
        if talking {
            prop_assert_eq!(blender.destination(), ClipSlot::Talk);
            prop_assert_eq!(w.talk, 1.0);
            prop_assert_eq!(w.idle, 0.0);
        } else {
            prop_assert_eq!(blender.destination(), ClipSlot::Idle);
            prop_assert_eq!(w.idle, 1.0);
            prop_assert_eq!(w.talk, 0.0);
        }
    }
}
