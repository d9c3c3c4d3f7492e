//! Host configuration: the embedded `config.toml` merged with an optional
//! user file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use zk_engine::{EngineConfig, MAX_GLIDE_SHIFT};
use zk_ir::{ClockSettings, Settings, SystemFlags};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    audio: AudioConfig,
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    storage: StorageConfig,
}

#[derive(Clone, Deserialize, Default)]
struct AudioConfig {
    sample_rate: Option<u32>,
    block_frames: Option<usize>,
}

#[derive(Clone, Deserialize, Default)]
struct EngineSection {
    glide_shift: Option<u32>,
    debounce_ms: Option<u32>,
    half_step_ms: Option<u32>,
}

#[derive(Clone, Deserialize, Default)]
struct SettingsSection {
    midi_channel: Option<u8>,
    retrigger: Option<bool>,
    env_loop: Option<bool>,
    track: Option<bool>,
    glide: Option<bool>,
    tuning_trim: Option<i8>,
    bend_range: Option<u8>,
    midi_divisor: Option<u8>,
    timeout_ms: Option<u16>,
}

#[derive(Clone, Deserialize, Default)]
struct StorageConfig {
    flash_image: Option<PathBuf>,
}

/// Resolved host configuration.
#[derive(Clone)]
pub struct HostConfig {
    audio: AudioConfig,
    engine: EngineSection,
    settings: SettingsSection,
    storage: StorageConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::load(None)
    }
}

impl HostConfig {
    /// Embedded defaults, overridden by `user` if it exists and parses.
    pub fn load(user: Option<&Path>) -> Self {
        let mut base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });

        if let Some(path) = user {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                    Ok(user) => merge(&mut base, user),
                    Err(e) => {
                        log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                    }
                },
                Err(e) => {
                    log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                }
            }
        }

        Self {
            audio: base.audio,
            engine: base.engine,
            settings: base.settings,
            storage: base.storage,
        }
    }

    /// Sample rate for offline rendering.
    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate.unwrap_or(48_000).max(1000)
    }

    /// Engine parameters at `sample_rate`.
    pub fn engine_config(&self, sample_rate: u32) -> EngineConfig {
        let fallback = EngineConfig::default();
        EngineConfig {
            sample_rate,
            block_frames: self.audio.block_frames.unwrap_or(fallback.block_frames),
            glide_shift: self
                .engine
                .glide_shift
                .unwrap_or(fallback.glide_shift)
                .clamp(1, MAX_GLIDE_SHIFT),
            debounce_ms: self.engine.debounce_ms.unwrap_or(fallback.debounce_ms),
            half_step_ms: self
                .engine
                .half_step_ms
                .unwrap_or(fallback.half_step_ms)
                .max(1),
        }
    }

    /// Power-on settings used while flash holds none.
    pub fn settings(&self) -> Settings {
        let fallback = Settings::default();
        let s = &self.settings;
        let mut system = SystemFlags::empty();
        system.set(SystemFlags::RETRIGGER, s.retrigger.unwrap_or(false));
        system.set(SystemFlags::ENV_LOOP, s.env_loop.unwrap_or(false));
        system.set(SystemFlags::TRACK, s.track.unwrap_or(false));
        system.set(SystemFlags::GLIDE, s.glide.unwrap_or(false));
        Settings {
            midi_channel: s.midi_channel.unwrap_or(fallback.midi_channel),
            system,
            tuning_trim: s.tuning_trim.unwrap_or(fallback.tuning_trim),
            bend_range: s.bend_range.unwrap_or(fallback.bend_range),
            clock: ClockSettings {
                midi_divisor: s.midi_divisor.unwrap_or(fallback.clock.midi_divisor),
                timeout_ms: s.timeout_ms.unwrap_or(fallback.clock.timeout_ms),
            },
        }
        .sanitized()
    }

    /// Flash image file to load at startup and write back on exit.
    pub fn flash_image(&self) -> Option<&Path> {
        self.storage.flash_image.as_deref()
    }

    pub fn set_flash_image(&mut self, path: PathBuf) {
        self.storage.flash_image = Some(path);
    }
}

fn take<T>(base: &mut Option<T>, user: Option<T>) {
    if user.is_some() {
        *base = user;
    }
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    take(&mut base.audio.sample_rate, user.audio.sample_rate);
    take(&mut base.audio.block_frames, user.audio.block_frames);

    take(&mut base.engine.glide_shift, user.engine.glide_shift);
    take(&mut base.engine.debounce_ms, user.engine.debounce_ms);
    take(&mut base.engine.half_step_ms, user.engine.half_step_ms);

    let (b, u) = (&mut base.settings, user.settings);
    take(&mut b.midi_channel, u.midi_channel);
    take(&mut b.retrigger, u.retrigger);
    take(&mut b.env_loop, u.env_loop);
    take(&mut b.track, u.track);
    take(&mut b.glide, u.glide);
    take(&mut b.tuning_trim, u.tuning_trim);
    take(&mut b.bend_range, u.bend_range);
    take(&mut b.midi_divisor, u.midi_divisor);
    take(&mut b.timeout_ms, u.timeout_ms);

    take(&mut base.storage.flash_image, user.storage.flash_image);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn user_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn embedded_defaults_match_engine_defaults() {
        let config = HostConfig::load(None);
        assert_eq!(config.sample_rate(), 48_000);
        assert_eq!(config.engine_config(200_000), EngineConfig::default());
        assert_eq!(config.settings(), Settings::default());
        assert_eq!(config.flash_image(), None);
    }

    #[test]
    fn user_file_overrides_some_keys() {
        let file = user_file(
            "[settings]\nmidi_channel = 3\nglide = true\n\n[engine]\nhalf_step_ms = 100\n",
        );
        let config = HostConfig::load(Some(file.path()));
        let settings = config.settings();
        assert_eq!(settings.midi_channel, 3);
        assert_eq!(settings.system, SystemFlags::GLIDE);
        assert_eq!(settings.bend_range, 2);
        assert_eq!(config.engine_config(48_000).half_step_ms, 100);
        assert_eq!(config.engine_config(48_000).debounce_ms, 20);
    }

    #[test]
    fn malformed_user_file_is_ignored() {
        let file = user_file("[settings\nmidi_channel = ");
        let config = HostConfig::load(Some(file.path()));
        assert_eq!(config.settings(), Settings::default());
    }

    #[test]
    fn missing_user_file_is_ignored() {
        let config = HostConfig::load(Some(Path::new("/nonexistent/zekit.toml")));
        assert_eq!(config.sample_rate(), 48_000);
    }

    #[test]
    fn out_of_range_settings_are_clamped() {
        let file = user_file("[settings]\nmidi_channel = 40\nbend_range = 60\nmidi_divisor = 0\n");
        let settings = HostConfig::load(Some(file.path())).settings();
        assert_eq!(settings.midi_channel, 16);
        assert_eq!(settings.bend_range, 24);
        assert_eq!(settings.clock.midi_divisor, 1);
    }
}
