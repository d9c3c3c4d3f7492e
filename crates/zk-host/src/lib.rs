//! Headless controller for the zekit synthesizer.
//!
//! Owns the flash image and runs the synth either live (on an audio
//! producer thread fed through an SPSC event ring) or offline into a frame
//! buffer. The CLI and tests share this API.

mod config;
mod error;
mod session;
mod wav;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use zk_audio::{AudioOutput, CpalOutput};
use zk_engine::SeqState;
use zk_store::{FlashStorage, MemoryFlash};

pub use config::HostConfig;
pub use error::HostError;
pub use session::{ControlEvent, Cue, Session};
pub use wav::{frames_to_wav, write_wav};
pub use zk_engine::Frame;

/// Control events queued between audio blocks.
const EVENT_QUEUE: usize = 256;

/// Headless synth controller: owns the flash image and manages playback.
pub struct Controller {
    config: HostConfig,
    flash: MemoryFlash,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    events: HeapProd<ControlEvent>,
    stop_signal: Arc<AtomicBool>,
    status: Arc<Status>,
    thread: Option<JoinHandle<MemoryFlash>>,
}

/// State published by the audio thread.
#[derive(Default)]
struct Status {
    finished: AtomicBool,
    pattern: AtomicU8,
    sequencer: AtomicU8,
}

impl Status {
    fn publish<F: FlashStorage>(&self, session: &Session<F>) {
        let synth = session.synth();
        self.pattern.store(synth.get_pattern(), Ordering::Relaxed);
        let state = match synth.sequencer_state() {
            SeqState::Reset => 0,
            SeqState::Play => 1,
            SeqState::Record(_) => 2,
        };
        self.sequencer.store(state, Ordering::Relaxed);
    }
}

/// Coarse sequencer state as seen from the control thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Stopped,
    Playing,
    Recording,
}

impl Controller {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            flash: MemoryFlash::new(),
            playback: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // --- Flash image ---

    /// Current flash contents. Stale while live playback runs.
    pub fn flash(&self) -> &MemoryFlash {
        &self.flash
    }

    pub fn load_flash_image(&mut self, path: &Path) -> Result<(), HostError> {
        self.stop();
        let bytes = std::fs::read(path)?;
        self.flash = MemoryFlash::from_image(&bytes);
        log::info!("loaded flash image {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn save_flash_image(&self, path: &Path) -> Result<(), HostError> {
        std::fs::write(path, self.flash.to_image())?;
        log::info!("wrote flash image {}", path.display());
        Ok(())
    }

    // --- Real-time playback ---

    pub fn play(&mut self) {
        self.stop();

        let flash = std::mem::take(&mut self.flash);
        let (events, consumer) = HeapRb::<ControlEvent>::new(EVENT_QUEUE).split();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Status::default());

        let stop = stop_signal.clone();
        let shared = status.clone();
        let config = self.config.clone();

        let thread = std::thread::spawn(move || audio_thread(config, flash, consumer, stop, shared));

        self.playback = Some(PlaybackHandle {
            events,
            stop_signal,
            status,
            thread: Some(thread),
        });
    }

    /// Stop playback and take the flash contents back from the audio thread.
    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                match handle.join() {
                    Ok(flash) => self.flash = flash,
                    Err(_) => log::error!("audio thread panicked; flash changes lost"),
                }
            }
        }
    }

    /// Queue a control event for the next block boundary.
    pub fn send(&mut self, event: ControlEvent) -> Result<(), HostError> {
        let pb = self.playback.as_mut().ok_or(HostError::EventDropped)?;
        pb.events.try_push(event).map_err(|_| HostError::EventDropped)
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.status.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.status.finished.load(Ordering::Relaxed))
    }

    /// Current pattern and sequencer state of the running synth.
    pub fn position(&self) -> Option<(u8, Transport)> {
        let pb = self.playback.as_ref()?;
        if pb.status.finished.load(Ordering::Relaxed) {
            return None;
        }
        let transport = match pb.status.sequencer.load(Ordering::Relaxed) {
            1 => Transport::Playing,
            2 => Transport::Recording,
            _ => Transport::Stopped,
        };
        Some((pb.status.pattern.load(Ordering::Relaxed), transport))
    }

    // --- Offline rendering ---

    /// Render `max_frames` frames at the configured rate, applying `cues`.
    /// Flash writes made by the cues are kept.
    pub fn render_frames(&mut self, cues: &[Cue], max_frames: usize) -> Result<Vec<Frame>, HostError> {
        self.stop();
        let sample_rate = self.config.sample_rate();
        let mut session = Session::new(&self.config, sample_rate, &mut self.flash);
        let frames = session.render_cued(cues, max_frames)?;
        Ok(frames)
    }

    pub fn render_to_wav(&mut self, cues: &[Cue], seconds: u32) -> Result<Vec<u8>, HostError> {
        let sample_rate = self.config.sample_rate();
        let frames = self.render_frames(cues, (sample_rate * seconds) as usize)?;
        Ok(frames_to_wav(&frames, sample_rate)?)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn audio_thread(
    config: HostConfig,
    flash: MemoryFlash,
    mut events: HeapCons<ControlEvent>,
    stop_signal: Arc<AtomicBool>,
    status: Arc<Status>,
) -> MemoryFlash {
    let (mut output, consumer) = match CpalOutput::new() {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("{}", e);
            status.finished.store(true, Ordering::Relaxed);
            return flash;
        }
    };

    let mut session = Session::new(&config, output.sample_rate(), flash);
    if let Err(e) = output.build_stream(consumer).and_then(|_| output.start()) {
        log::error!("{}", e);
        status.finished.store(true, Ordering::Relaxed);
        return session.into_flash();
    }

    'run: while !stop_signal.load(Ordering::Relaxed) {
        while let Some(event) = events.try_pop() {
            if let Err(e) = session.apply(event) {
                log::error!("store error: {}", e);
                if session.is_poisoned() {
                    log::error!("flash store is unusable, stopping");
                    break 'run;
                }
            }
        }
        output.write_spin(session.render_block());
        status.publish(&session);
    }

    let _ = output.stop();
    status.finished.store(true, Ordering::Relaxed);
    session.into_flash()
}
