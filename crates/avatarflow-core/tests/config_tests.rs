use avatarflow_core::{AvatarAsset, AvatarConfig, AvatarError, ClipLibrary, ConfigError};
use std::io::Write;

#[test]
fn test_load_config_and_manifest_from_disk() {
    let dir = tempfile::tempdir().unwrap();

    let config_path = dir.path().join("avatar.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(
        file,
        r#"
[names]
idle = "IdleAnim"
talk = "TalkAnim"

[blink]
double_chance = 0.5

[log]
level = "debug"
"#
    )
    .unwrap();

    let manifest_path = dir.path().join("avatar.json");
    std::fs::write(
        &manifest_path,
        r#"{
            "clips": [
                { "name": "IdleAnim", "duration": 5.0 },
                { "name": "TalkAnim", "duration": 3.0 }
            ],
            "meshes": [
                { "name": "Wolf3D_Head", "targets": ["LipOpen", "BlinkLeft", "BlinkRight"] }
            ]
        }"#,
    )
    .unwrap();

    let config = AvatarConfig::load(&config_path).unwrap();
    assert_eq!(config.blink.double_chance, 0.5);
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.blend.idle_fade_in, 0.62);

    let asset = AvatarAsset::load(&manifest_path).unwrap();
    let library = ClipLibrary::resolve(&asset, &config.names);
    assert!(library.require_clips().is_ok());
    assert!(library.require_channels().is_ok());
}

#[test]
fn test_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    assert!(matches!(
        AvatarConfig::load(&missing),
        Err(ConfigError::Io(_))
    ));
    assert!(matches!(
        AvatarAsset::load(&missing),
        Err(AvatarError::Io(_))
    ));
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[amplitude]\nretention = 1.5\n").unwrap();

    let err = AvatarConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("amplitude.retention"));
}
