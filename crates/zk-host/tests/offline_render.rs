//! Offline rendering and flash image persistence through the controller.

use zk_host::{ControlEvent, Controller, Cue, HostConfig};
use zk_ir::MidiMessage;
use zk_store::{FlashStorage, PatternStore};

fn record_and_save() -> Vec<Cue> {
    use ControlEvent::*;
    vec![
        Cue::new(0, RecordPress),
        Cue::new(10, NoteOn { note: 45, velocity: 100 }),
        Cue::new(20, NoteOff { note: 45 }),
        Cue::new(30, Tap),
        Cue::new(40, NoteOn { note: 52, velocity: 100 }),
        Cue::new(50, NoteOff { note: 52 }),
        Cue::new(60, RecordPress),
        Cue::new(70, SavePattern),
        Cue::new(80, PlayPress),
    ]
}

fn controller() -> Controller {
    Controller::new(HostConfig::load(None))
}

#[test]
fn offline_render_plays_recorded_pattern() {
    let mut ctrl = controller();
    let frames = ctrl.render_frames(&record_and_save(), 48_000).unwrap();
    assert_eq!(frames.len(), 48_000);
    // the pattern starts at 80 ms and is still sounding a second later
    assert!(frames[47_000..].iter().any(|f| f.right != 0));
    assert!(frames.iter().all(|f| f.left == 0));
}

#[test]
fn flash_image_round_trips_through_a_file() {
    let mut ctrl = controller();
    ctrl.render_frames(&record_and_save(), 4_800).unwrap();
    assert!(ctrl.flash().write_count() > 0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zekit.flash");
    ctrl.save_flash_image(&path).unwrap();

    let mut reloaded = controller();
    reloaded.load_flash_image(&path).unwrap();
    let store = PatternStore::new(reloaded.flash().clone());
    let pattern = store.load_pattern(0).unwrap();
    assert_eq!(pattern.len(), 2);
    assert_eq!(pattern.root, 45);
    assert_eq!(
        store.flash().read_word(zk_store::layout::pattern_page(0)),
        ctrl.flash().read_word(zk_store::layout::pattern_page(0))
    );
}

#[test]
fn settings_saved_from_cues_persist() {
    let mut ctrl = controller();
    let mut settings = ctrl.config().settings();
    settings.midi_channel = 2;
    let cues = [
        Cue::new(0, ControlEvent::SaveSettings(settings)),
        // filtered: wrong channel
        Cue::new(10, ControlEvent::Midi(MidiMessage::NoteOn { channel: 0, note: 60, velocity: 90 })),
    ];
    let frames = ctrl.render_frames(&cues, 4_800).unwrap();
    assert!(frames.iter().all(|f| f.right == 0));

    let store = PatternStore::new(ctrl.flash().clone());
    assert_eq!(store.read_settings().map(|s| s.midi_channel), Some(2));
}

#[test]
fn wav_export_has_expected_length() {
    let mut ctrl = controller();
    let wav = ctrl.render_to_wav(&record_and_save(), 1).unwrap();
    let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
    assert_eq!(reader.spec().sample_rate, 48_000);
    // one second of stereo frames
    assert_eq!(reader.len(), 96_000);
}
