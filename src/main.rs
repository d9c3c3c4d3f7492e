//! zekit CLI: records a demo pattern, then plays it live or exports a WAV.
//!
//! Usage:
//!   zekit [--config zekit.toml] [--flash zekit.flash] [--seconds N] [--wav out.wav]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, fs};

use zk_host::{ControlEvent, Controller, Cue, HostConfig};

const DEFAULT_SECONDS: u32 = 8;

struct Args {
    config: Option<PathBuf>,
    flash: Option<PathBuf>,
    wav: Option<PathBuf>,
    seconds: u32,
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().skip(1).collect();
    let value = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: zekit [--config FILE] [--flash FILE] [--seconds N] [--wav FILE]");
        std::process::exit(0);
    }
    let seconds = match value("--seconds") {
        Some(s) => s.parse().unwrap_or_else(|_| {
            eprintln!("Invalid --seconds value: {}", s);
            std::process::exit(1);
        }),
        None => DEFAULT_SECONDS,
    };
    Args {
        config: value("--config").map(PathBuf::from),
        flash: value("--flash").map(PathBuf::from),
        wav: value("--wav").map(PathBuf::from),
        seconds,
    }
}

/// Record a short pattern into slot 0, store it and start playback.
fn demo_cues() -> Vec<Cue> {
    use ControlEvent::*;
    vec![
        Cue::new(0, Waveform(2)),
        Cue::new(10, RecordPress),
        Cue::new(20, NoteOn { note: 48, velocity: 100 }),
        Cue::new(30, NoteOff { note: 48 }),
        Cue::new(40, NoteOn { note: 51, velocity: 100 }),
        Cue::new(50, NoteOff { note: 51 }),
        Cue::new(60, Tap),
        Cue::new(70, NoteOn { note: 55, velocity: 100 }),
        Cue::new(80, NoteOff { note: 55 }),
        Cue::new(90, NextPress),
        Cue::new(100, NoteOn { note: 58, velocity: 100 }),
        Cue::new(105, NoteOn { note: 62, velocity: 100 }),
        Cue::new(110, NoteOff { note: 58 }),
        Cue::new(115, NoteOff { note: 62 }),
        Cue::new(120, RecordPress),
        Cue::new(130, SavePattern),
        Cue::new(140, PlayPress),
        // transpose up a fourth halfway through
        Cue::new(4000, NoteOn { note: 53, velocity: 100 }),
    ]
}

fn main() {
    env_logger::init();
    let args = parse_args();

    let mut config = HostConfig::load(args.config.as_deref());
    if let Some(path) = args.flash {
        config.set_flash_image(path);
    }
    let flash_path = config.flash_image().map(Path::to_path_buf);

    let mut ctrl = Controller::new(config);
    if let Some(path) = flash_path.as_deref().filter(|p| p.exists()) {
        ctrl.load_flash_image(path).unwrap_or_else(|e| {
            eprintln!("Failed to load flash image {}: {}", path.display(), e);
            std::process::exit(1);
        });
    }

    let cues = demo_cues();
    match args.wav {
        Some(wav) => render_to_wav(&mut ctrl, &cues, &wav, args.seconds),
        None => play_audio(&mut ctrl, &cues, args.seconds),
    }

    if let Some(path) = flash_path {
        ctrl.save_flash_image(&path).unwrap_or_else(|e| {
            eprintln!("Failed to write flash image {}: {}", path.display(), e);
            std::process::exit(1);
        });
    }
}

fn play_audio(ctrl: &mut Controller, cues: &[Cue], seconds: u32) {
    ctrl.play();
    println!("Playing for {} s...", seconds);

    let start = Instant::now();
    let end = Duration::from_secs(seconds as u64);
    let mut pending = cues.iter().peekable();
    while ctrl.is_playing() && start.elapsed() < end {
        let now = start.elapsed().as_millis() as u32;
        while let Some(cue) = pending.next_if(|c| c.at_ms <= now) {
            if let Err(e) = ctrl.send(cue.event) {
                log::warn!("{:?}: {}", cue.event, e);
            }
        }
        if let Some((pattern, transport)) = ctrl.position() {
            print!("\rPattern: {:02} | {:?}      ", pattern, transport);
            let _ = std::io::Write::flush(&mut std::io::stdout());
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if ctrl.is_finished() {
        eprintln!("\nAudio output stopped early; see the log for details.");
    }
    ctrl.stop();

    println!("\rDone.                         ");
}

fn render_to_wav(ctrl: &mut Controller, cues: &[Cue], path: &Path, seconds: u32) {
    let sample_rate = ctrl.config().sample_rate();
    println!("Rendering {} s to {} at {} Hz...", seconds, path.display(), sample_rate);

    let wav = ctrl.render_to_wav(cues, seconds).unwrap_or_else(|e| {
        eprintln!("Render failed: {}", e);
        std::process::exit(1);
    });
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path.display(), e);
        std::process::exit(1);
    });

    println!("Done.");
}
