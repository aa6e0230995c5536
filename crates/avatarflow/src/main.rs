//! AvatarFlow - headless avatar simulation
//!
//! Plays the part of the render loop and audio player for the controller:
//! frames are stepped on a manual clock, speech is fed through a waveform
//! tap, and every frame's pose is written as one JSON line.

mod logging_setup;
mod speech;

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use avatarflow_core::{
    waveform_tap, AvatarAsset, AvatarConfig, AvatarController, AvatarParts, ClipInfo,
    ClipLibrary, Diagnostics, FramePose, IssueSeverity, ManualClock, MeshMorphs, PlaybackEvent,
    SeededRandom, TapWriter,
};
use serde::Serialize;
use speech::{Playback, Speech};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Sample rate of the synthetic speech stand-in
const SYNTH_SAMPLE_RATE: u32 = 16_000;

/// Run the avatar animation controller offline and print one JSON pose per frame
#[derive(Debug, FromArgs)]
struct Args {
    /// avatar configuration (TOML)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
    /// asset manifest (JSON); a built-in demo rig is used when omitted
    #[argh(option, short = 'a')]
    asset: Option<PathBuf>,
    /// speech audio (WAV); a synthetic tone is used when omitted
    #[argh(option, short = 'w')]
    wav: Option<PathBuf>,
    /// frames per second
    #[argh(option, default = "60")]
    fps: u32,
    /// seconds to simulate
    #[argh(option, short = 'd', default = "8.0")]
    duration: f64,
    /// seconds of silence before speech starts
    #[argh(option, default = "1.0")]
    lead_in: f64,
    /// length of the synthetic speech in seconds
    #[argh(option, default = "3.0")]
    speech_length: f64,
    /// blink seed, for reproducible runs
    #[argh(option)]
    seed: Option<u64>,
    /// write poses here instead of stdout
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,
    /// fail when a clip or required morph target is missing
    #[argh(switch)]
    strict: bool,
    /// print rig issues and exit
    #[argh(switch)]
    check: bool,
    /// capture the default microphone in real time (needs the `audio` feature)
    #[argh(switch)]
    mic: bool,
    /// enable debug logging
    #[argh(switch, short = 'v')]
    verbose: bool,
}

#[derive(Serialize)]
struct FrameLine {
    frame: u64,
    #[serde(flatten)]
    pose: FramePose,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => AvatarConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => AvatarConfig::default(),
    };
    if args.verbose {
        config.log.level = "debug".to_string();
    }

    let _log_guard = logging_setup::init(&config.log).context("Failed to initialize logging")?;
    info!("AvatarFlow {} starting", env!("CARGO_PKG_VERSION"));

    let asset = match &args.asset {
        Some(path) => AvatarAsset::load(path)
            .with_context(|| format!("Failed to load asset manifest {:?}", path))?,
        None => demo_asset(&config),
    };

    let library = ClipLibrary::resolve(&asset, &config.names);
    if args.check {
        return report_rig(&library);
    }
    if args.strict {
        library.require_clips()?;
        library.require_channels()?;
    }

    if args.fps == 0 {
        bail!("--fps must be at least 1");
    }

    let out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    if args.mic {
        run_microphone(&args, &asset, config, out)
    } else {
        run_offline(&args, &asset, config, out)
    }
}

/// Step the controller on a manual clock, feeding speech through a tap
fn run_offline(
    args: &Args,
    asset: &AvatarAsset,
    config: AvatarConfig,
    mut out: Box<dyn Write>,
) -> Result<()> {
    let speech = match &args.wav {
        Some(path) => Speech::load_wav(path)?,
        None => Speech::synthetic(args.speech_length, SYNTH_SAMPLE_RATE),
    };
    info!(
        "Speech: {:.2}s at {}Hz, starting at {:.2}s",
        speech.duration(),
        speech.sample_rate,
        args.lead_in
    );

    let (mut writer, tap) = waveform_tap(config.amplitude.window_size);
    let clock = ManualClock::new(0.0);
    let (diagnostics, events) = Diagnostics::with_channel(64);
    let parts = AvatarParts {
        clock: Box::new(clock.clone()),
        random: Box::new(match args.seed {
            Some(seed) => SeededRandom::from_seed(seed),
            None => SeededRandom::from_entropy(),
        }),
        source: Some(Box::new(tap)),
        diagnostics,
    };
    let mut avatar = AvatarController::with_parts(asset, config, parts)?;

    let frame_time = 1.0 / args.fps as f64;
    let frames = (args.duration.max(0.0) * args.fps as f64).round() as u64;
    let mut playback: Option<Playback> = None;
    let mut speech = Some(speech);

    for frame in 1..=frames {
        let now = frame as f64 * frame_time;
        clock.set(now);

        if let Some(pending) = speech.take() {
            if now >= args.lead_in {
                avatar.handle_playback(PlaybackEvent::Started);
                playback = Some(Playback::new(pending));
            } else {
                speech = Some(pending);
            }
        }

        if let Some(active) = playback.as_mut() {
            feed(&mut writer, active.advance(frame_time));
            if active.finished() {
                avatar.handle_playback(PlaybackEvent::Ended);
                writer.clear();
                playback = None;
            }
        }

        let pose = avatar.tick();
        write_line(&mut out, frame, pose)?;
    }

    out.flush().context("Failed to flush output")?;
    avatar.teardown();

    let reported: Vec<_> = events.try_iter().collect();
    info!(
        "Simulated {} frame(s), {} blink(s), {} diagnostic(s)",
        frames,
        avatar.blink().cycles_completed(),
        reported.len()
    );
    Ok(())
}

fn feed(writer: &mut TapWriter, chunk: &[f32]) {
    if !chunk.is_empty() {
        writer.push(chunk);
    }
}

fn write_line(out: &mut Box<dyn Write>, frame: u64, pose: FramePose) -> Result<()> {
    serde_json::to_writer(&mut *out, &FrameLine { frame, pose })?;
    out.write_all(b"\n")?;
    Ok(())
}

#[cfg(feature = "audio")]
fn run_microphone(
    args: &Args,
    asset: &AvatarAsset,
    config: AvatarConfig,
    mut out: Box<dyn Write>,
) -> Result<()> {
    use avatarflow_core::{MicrophoneCapture, MonotonicClock};
    use std::time::Duration;

    let (writer, tap) = waveform_tap(config.amplitude.window_size);
    let capture = MicrophoneCapture::start(writer)?;
    info!("Listening on '{}'", capture.device_name());

    let parts = AvatarParts {
        clock: Box::new(MonotonicClock::new()),
        random: Box::new(match args.seed {
            Some(seed) => SeededRandom::from_seed(seed),
            None => SeededRandom::from_entropy(),
        }),
        source: Some(Box::new(tap)),
        diagnostics: Diagnostics::new(),
    };
    let mut avatar = AvatarController::with_parts(asset, config, parts)?;
    avatar.set_talking(true);

    let frame_time = Duration::from_secs_f64(1.0 / args.fps as f64);
    let frames = (args.duration.max(0.0) * args.fps as f64).round() as u64;
    for frame in 1..=frames {
        std::thread::sleep(frame_time);
        let pose = avatar.tick();
        write_line(&mut out, frame, pose)?;
    }

    out.flush().context("Failed to flush output")?;
    avatar.teardown();
    drop(capture);
    Ok(())
}

#[cfg(not(feature = "audio"))]
fn run_microphone(
    _args: &Args,
    _asset: &AvatarAsset,
    _config: AvatarConfig,
    _out: Box<dyn Write>,
) -> Result<()> {
    bail!("--mic needs a build with the `audio` feature")
}

fn report_rig(library: &ClipLibrary) -> Result<()> {
    let issues = avatarflow_core::check_rig_integrity(library);
    if issues.is_empty() {
        info!("Rig OK");
        return Ok(());
    }

    let mut errors = 0;
    for issue in &issues {
        match issue.severity {
            IssueSeverity::Error => {
                errors += 1;
                error!("{}", issue.message);
            }
            IssueSeverity::Warning => warn!("{}", issue.message),
            IssueSeverity::Info => info!("{}", issue.message),
        }
    }
    if errors > 0 {
        bail!("rig has {} error(s)", errors);
    }
    Ok(())
}

/// A minimal rig exposing every name the config asks for
fn demo_asset(config: &AvatarConfig) -> AvatarAsset {
    let names = &config.names;
    AvatarAsset {
        clips: vec![
            ClipInfo::new(names.idle.clone(), 4.0),
            ClipInfo::new(names.talk.clone(), 2.4),
        ],
        meshes: vec![
            MeshMorphs {
                name: "Head".to_string(),
                targets: vec![
                    names.lip_open.clone(),
                    names.jaw_open.clone(),
                    names.blink_left.clone(),
                    names.blink_right.clone(),
                ],
            },
            MeshMorphs {
                name: "Eyelashes".to_string(),
                targets: vec![names.blink_left.clone(), names.blink_right.clone()],
            },
            MeshMorphs {
                name: "Teeth".to_string(),
                targets: vec![names.jaw_open.clone()],
            },
        ],
    }
}
