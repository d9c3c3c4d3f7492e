//! Clock arbitration between the internal tempo, an external pulse train
//! and MIDI clock.
//!
//! Hardware and MIDI entry points only record what happened. The owner
//! then drains [`ClockArbiter::poll`] until it returns `None`, which yields
//! the resulting [`ClockEvent`]s in order. At most one of the external and
//! MIDI sources is active at a time: each can only be activated from the
//! internal state, and leaves it again by timeout or an explicit stop.

use heapless::Deque;
use zk_ir::{ClockSettings, Timestamp};

/// Default internal half-step interval (ms).
pub const DEFAULT_INTERVAL_MS: u32 = 250;

/// Minimum spacing of external pulses (ms); closer pulses are bounce.
pub const DEFAULT_DEBOUNCE_MS: u32 = 20;

/// Number of taps averaged by tap tempo.
pub const TAP_COUNT: usize = 3;

const EVENT_QUEUE: usize = 8;

/// What the sequencer should do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockEvent {
    /// Restart from step 0 and play.
    Start,
    /// Resume playing from the current step.
    Continue,
    /// Halt and silence.
    Stop,
    /// Advance one half-step.
    HalfStep,
    /// The external or MIDI source went silent; fall back to internal.
    TimedOut,
}

/// The source currently driving the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    Internal,
    External,
    Midi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ExternalClock {
    last: Timestamp,
    interval: u32,
    half_period: u32,
    due_half: Option<Timestamp>,
    edge_pending: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MidiClock {
    last: Timestamp,
    counter: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Internal,
    External(ExternalClock),
    Midi(MidiClock),
}

/// Multi-source clock state.
#[derive(Debug)]
pub struct ClockArbiter {
    source: Source,
    interval: u32,
    stamp: Timestamp,
    taps: [Timestamp; TAP_COUNT],
    tap_count: usize,
    timeout: u32,
    debounce: u32,
    divisor: u8,
    events: Deque<ClockEvent, EVENT_QUEUE>,
}

impl Default for ClockArbiter {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_MS, DEFAULT_DEBOUNCE_MS, ClockSettings::default())
    }
}

impl ClockArbiter {
    pub fn new(interval_ms: u32, debounce_ms: u32, settings: ClockSettings) -> Self {
        Self {
            source: Source::Internal,
            interval: interval_ms.max(1),
            stamp: Timestamp::default(),
            taps: [Timestamp::default(); TAP_COUNT],
            tap_count: 0,
            timeout: settings.timeout_ms as u32,
            debounce: debounce_ms,
            divisor: settings.midi_divisor.max(1),
            events: Deque::new(),
        }
    }

    /// Apply persisted clock settings.
    pub fn configure(&mut self, settings: ClockSettings) {
        self.timeout = settings.timeout_ms as u32;
        self.divisor = settings.midi_divisor.max(1);
    }

    pub fn source(&self) -> ClockSource {
        match self.source {
            Source::Internal => ClockSource::Internal,
            Source::External(_) => ClockSource::External,
            Source::Midi(_) => ClockSource::Midi,
        }
    }

    /// Internal half-step interval (ms).
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Smoothed external pulse interval, if an external clock is running.
    pub fn external_interval(&self) -> Option<u32> {
        match self.source {
            Source::External(ext) if ext.interval > 0 => Some(ext.interval),
            _ => None,
        }
    }

    /// Make the internal clock fire on the next poll.
    pub fn seed(&mut self, now: Timestamp) {
        self.stamp = now.sub_millis(self.interval);
    }

    /// Register a tap. On the third tap in a row, sets the internal
    /// half-step interval from the two tap spacings and returns it.
    pub fn tap(&mut self, now: Timestamp) -> Option<u32> {
        if self.tap_count > 0 && now.since(self.taps[self.tap_count - 1]) > self.timeout {
            self.tap_count = 0;
        }
        self.taps[self.tap_count] = now;
        self.tap_count += 1;
        if self.tap_count < TAP_COUNT {
            return None;
        }
        self.tap_count = 0;
        let dt1 = self.taps[1].since(self.taps[0]);
        let dt2 = self.taps[2].since(self.taps[1]);
        // Taps mark quarter notes; a half-step is a sixteenth.
        self.interval = ((dt1 + dt2) >> 3).max(1);
        log::debug!("tap tempo: {} ms per half-step", self.interval);
        Some(self.interval)
    }

    /// A hardware clock input started. Ignored while MIDI clock is active.
    pub fn external_start(&mut self, now: Timestamp) {
        match self.source {
            Source::Midi(_) => {
                log::debug!("external start ignored: MIDI clock active");
            }
            _ => {
                log::debug!("clock source -> external");
                self.source = Source::External(ExternalClock {
                    last: now,
                    interval: 0,
                    half_period: 0,
                    due_half: None,
                    edge_pending: true,
                });
                self.push(ClockEvent::Start);
            }
        }
    }

    /// A hardware clock pulse. The first pulse arms the external source.
    pub fn external_edge(&mut self, now: Timestamp) {
        if self.source == Source::Internal {
            self.external_start(now);
            return;
        }
        match &mut self.source {
            Source::Internal | Source::Midi(_) => {}
            Source::External(ext) => {
                let dt = now.since(ext.last);
                if dt < self.debounce {
                    return;
                }
                ext.interval = if ext.interval == 0 {
                    dt
                } else {
                    (ext.interval * 3 + dt) >> 2
                };
                ext.half_period = dt / 2;
                ext.last = now;
                ext.edge_pending = true;
            }
        }
    }

    /// MIDI Start: activate MIDI clock and restart the pattern.
    pub fn midi_start(&mut self, now: Timestamp) {
        if self.activate_midi(now) {
            self.push(ClockEvent::Start);
        }
    }

    /// MIDI Continue: activate MIDI clock and resume.
    pub fn midi_continue(&mut self, now: Timestamp) {
        if self.activate_midi(now) {
            self.push(ClockEvent::Continue);
        }
    }

    /// MIDI Stop: hand back to the internal clock.
    pub fn midi_stop(&mut self) {
        if let Source::Midi(_) = self.source {
            log::debug!("clock source -> internal (MIDI stop)");
            self.source = Source::Internal;
            self.push(ClockEvent::Stop);
        }
    }

    /// MIDI timing clock. Every `divisor`-th tick is a half-step, starting
    /// with the first one after Start/Continue.
    pub fn midi_tick(&mut self, now: Timestamp) {
        let divisor = self.divisor;
        let fire = match &mut self.source {
            Source::Midi(midi) => {
                midi.last = now;
                let fire = midi.counter == 0;
                midi.counter = (midi.counter + 1) % divisor;
                fire
            }
            _ => false,
        };
        if fire {
            self.push(ClockEvent::HalfStep);
        }
    }

    /// Next clock event due at `now`. `running` gates the internal clock.
    pub fn poll(&mut self, now: Timestamp, running: bool) -> Option<ClockEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        let timeout = self.timeout;
        match &mut self.source {
            Source::Internal => {
                if running && now.since(self.stamp) >= self.interval {
                    self.stamp = now;
                    return Some(ClockEvent::HalfStep);
                }
                None
            }
            Source::External(ext) => {
                if now.since(ext.last) > timeout {
                    return Some(self.time_out(now));
                }
                if let Some(due) = ext.due_half {
                    if ext.edge_pending || reached(now, due) {
                        ext.due_half = None;
                        return Some(ClockEvent::HalfStep);
                    }
                }
                if ext.edge_pending {
                    ext.edge_pending = false;
                    if ext.half_period > 0 {
                        ext.due_half = Some(ext.last.add_millis(ext.half_period));
                    }
                    return Some(ClockEvent::HalfStep);
                }
                None
            }
            Source::Midi(midi) => {
                if now.since(midi.last) > timeout {
                    return Some(self.time_out(now));
                }
                None
            }
        }
    }

    fn time_out(&mut self, now: Timestamp) -> ClockEvent {
        log::debug!("clock source {:?} timed out", self.source());
        self.source = Source::Internal;
        self.stamp = now;
        ClockEvent::TimedOut
    }

    fn activate_midi(&mut self, now: Timestamp) -> bool {
        match self.source {
            Source::External(_) => {
                log::debug!("MIDI clock ignored: external clock active");
                false
            }
            Source::Internal => {
                log::debug!("clock source -> MIDI");
                self.source = Source::Midi(MidiClock {
                    last: now,
                    counter: 0,
                });
                true
            }
            Source::Midi(ref mut midi) => {
                midi.last = now;
                midi.counter = 0;
                true
            }
        }
    }

    fn push(&mut self, event: ClockEvent) {
        if self.events.is_full() {
            self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }
}

/// Wrapping "now is at or past `due`".
fn reached(now: Timestamp, due: Timestamp) -> bool {
    (now.since(due) as i32) >= 0
}
