use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
/// Every pipeline stage takes this by reference; nothing reads ambient state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding one subdirectory of band GeoTIFFs per scene.
    pub raw_dir: PathBuf,
    /// Region-of-interest polygon (GeoJSON). Validated before any extraction.
    pub boundary_path: PathBuf,
    /// Where score.json, score.mid, audio.wav and the video land.
    pub output_dir: PathBuf,

    /// Number of scanline buckets per scene. Every Frame has exactly this
    /// many values per index, which is what makes global z-score
    /// normalization well-defined across scenes.
    pub bucket_count: usize,
    /// Fixed global tempo. A configuration constant, never derived from data.
    pub tempo_bpm: f64,
    /// Length of one bucket step in beats.
    pub step_beats: f64,

    /// Scene order for the final score. Scenes whose season is not listed
    /// are dropped with a warning.
    pub season_order: Vec<String>,

    /// Continue past a failed scene, leaving a silent gap segment in the
    /// score, instead of aborting the run.
    pub skip_failed_scenes: bool,

    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,

    pub registers: RegisterConfig,
    pub rhythm: RhythmConfig,
    pub synth: SynthConfig,
    pub video: VideoConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("raw_data"),
            boundary_path: PathBuf::from("boundary.geojson"),
            output_dir: PathBuf::from("out"),
            bucket_count: 96,
            tempo_bpm: 112.0,
            step_beats: 0.25,
            season_order: ["Spring", "Summer", "Autumn", "Winter"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_failed_scenes: false,
            workers: 0,
            registers: RegisterConfig::default(),
            rhythm: RhythmConfig::default(),
            synth: SynthConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

/// Pitch register bounds per melodic voice (inclusive MIDI note numbers).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub piano: Register,
    pub guitar: Register,
    pub pad: Register,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            // Piano mid register carries the vegetation melody.
            piano: Register { low: 60, high: 84 },
            // Guitar sits low to convey built-up mass.
            guitar: Register { low: 36, high: 60 },
            // Pad floats between them, long sustains.
            pad: Register { low: 48, high: 72 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Register {
    pub low: u8,
    pub high: u8,
}

impl Register {
    pub fn midpoint(&self) -> f64 {
        (self.low as f64 + self.high as f64) / 2.0
    }

    /// Semitones per standard deviation: the register spans ±2σ.
    pub fn semitones_per_sigma(&self) -> f64 {
        (self.high as f64 - self.low as f64) / 4.0
    }
}

/// Rhythm voice settings. Pulses come from change between consecutive
/// buckets, not from raw values — uniform regions stay silent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    /// Which index drives the pulse train.
    pub reference: ReferenceIndex,
    /// Minimum |delta| between consecutive bucket means to emit a pulse.
    pub threshold: f64,
    /// Delta mapped to maximum velocity; larger deltas clamp.
    pub full_scale_delta: f64,
    /// Also compare the first bucket of a scene against the last bucket of
    /// the previous scene.
    pub across_scenes: bool,
    /// General MIDI percussion key for the pulse (38 = acoustic snare).
    pub percussion_key: u8,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            reference: ReferenceIndex::Vegetation,
            threshold: 0.05,
            full_scale_delta: 0.5,
            across_scenes: false,
            percussion_key: 38,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceIndex {
    Vegetation,
    BuiltUp,
    Water,
}

/// Audio synthesis settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Directory of per-instrument WAV samples. When present (and readable),
    /// the sample-bank synthesizer is selected; otherwise the oscillator
    /// fallback is used if allowed.
    pub sample_bank_dir: Option<PathBuf>,
    /// Permit the lower-fidelity oscillator fallback when no sample bank is
    /// available. When false and no bank exists, rendering fails.
    pub allow_fallback: bool,
    pub sample_rate: u32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_bank_dir: None,
            allow_fallback: true,
            sample_rate: 44_100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 24,
        }
    }
}

impl AppConfig {
    /// Load config from an explicit path, or from
    /// `~/.config/terratone/config.toml`. Returns default config if no file
    /// exists. Logs a warning if the file exists but can't be parsed.
    pub fn load(override_path: Option<&Path>) -> Self {
        let config_path = override_path
            .map(|p| p.to_path_buf())
            .or_else(Self::config_path);
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the default config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = AppConfig::default();
        assert_eq!(c.bucket_count, 96);
        assert!(c.registers.piano.low >= crate::MIDI_PITCH_MIN);
        assert!(c.registers.piano.high <= crate::MIDI_PITCH_MAX);
        assert_eq!(c.season_order.len(), 4);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: AppConfig = toml::from_str(
            r#"
            bucket_count = 12
            [rhythm]
            threshold = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(c.bucket_count, 12);
        assert_eq!(c.rhythm.threshold, 0.1);
        assert_eq!(c.tempo_bpm, 112.0);
        assert_eq!(c.rhythm.percussion_key, 38);
    }

    #[test]
    fn register_midpoint_and_scale() {
        let r = Register { low: 60, high: 84 };
        assert_eq!(r.midpoint(), 72.0);
        assert_eq!(r.semitones_per_sigma(), 6.0);
    }
}
