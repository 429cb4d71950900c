use std::collections::HashMap;
use std::path::Path;

use crate::config::SynthConfig;
use crate::render::RenderError;
use crate::score::{Score, Voice};
use crate::timeline::RenderTimeline;

/// Waveform synthesis strategy. Selected once up front from the config and
/// the environment (sample bank present or not), never probed mid-render.
pub trait Synthesizer {
    fn name(&self) -> &'static str;

    /// Render the whole score into a mono f32 buffer at `sample_rate`,
    /// placing every event at the absolute time the timeline assigns it.
    fn render(&self, score: &Score, timeline: &RenderTimeline, sample_rate: u32) -> Vec<f32>;
}

/// Pick the synthesis strategy: the sample bank when one is configured and
/// loadable, the oscillator fallback otherwise (if permitted).
pub fn select_synthesizer(config: &SynthConfig) -> Result<Box<dyn Synthesizer>, RenderError> {
    if let Some(dir) = &config.sample_bank_dir {
        match SampleBankSynth::load(dir) {
            Ok(bank) => {
                log::info!("Using sample bank from {}", dir.display());
                return Ok(Box::new(bank));
            }
            Err(e) => {
                log::warn!("Sample bank unavailable ({}), considering fallback", e);
            }
        }
    }
    if config.allow_fallback {
        log::info!("Using oscillator fallback synthesis");
        Ok(Box::new(OscillatorSynth))
    } else {
        Err(RenderError::NoSynthesizer)
    }
}

fn pitch_to_freq(pitch: u8) -> f64 {
    440.0 * 2f64.powf((pitch as f64 - 69.0) / 12.0)
}

/// Mix one rendered note into the output buffer at `start` seconds.
fn mix_at(out: &mut [f32], sample_rate: u32, start: f64, note: &[f32]) {
    let offset = (start * sample_rate as f64).round() as usize;
    for (i, &s) in note.iter().enumerate() {
        if let Some(slot) = out.get_mut(offset + i) {
            *slot += s;
        }
    }
}

/// Peak-normalize in place to the given ceiling.
pub fn normalize(buf: &mut [f32], ceiling: f32) {
    let peak = buf.iter().fold(0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let gain = ceiling / peak;
        for s in buf.iter_mut() {
            *s *= gain;
        }
    }
}

fn render_events<F>(
    score: &Score,
    timeline: &RenderTimeline,
    sample_rate: u32,
    mut voice_note: F,
) -> Vec<f32>
where
    F: FnMut(Voice, u8, u8, f64) -> Vec<f32>,
{
    // Half a second of tail so releases past the final bucket aren't cut.
    let total = timeline.total_seconds() + 0.5;
    let mut out = vec![0f32; (total * sample_rate as f64).ceil() as usize];

    for (scene_idx, scene) in score.scenes.iter().enumerate() {
        for ev in &scene.events {
            let start = timeline.event_seconds(scene_idx, ev.start);
            let duration = ev.duration * timeline.seconds_per_beat();
            let note = voice_note(ev.voice, ev.pitch, ev.velocity, duration);
            mix_at(&mut out, sample_rate, start, &note);
        }
    }

    normalize(&mut out, 0.9);
    out
}

// ── Oscillator fallback ───────────────────────────────────────────────

/// Lower fidelity than the sample bank but exactly pitch-accurate: each
/// voice is a bounded-frequency oscillator with a simple amplitude envelope.
pub struct OscillatorSynth;

/// Oscillators never run outside this band regardless of register config.
const FREQ_MIN: f64 = 20.0;
const FREQ_MAX: f64 = 4200.0;

impl Synthesizer for OscillatorSynth {
    fn name(&self) -> &'static str {
        "oscillator"
    }

    fn render(&self, score: &Score, timeline: &RenderTimeline, sample_rate: u32) -> Vec<f32> {
        render_events(score, timeline, sample_rate, |voice, pitch, velocity, dur| {
            oscillator_note(voice, pitch, velocity, dur, sample_rate)
        })
    }
}

fn oscillator_note(
    voice: Voice,
    pitch: u8,
    velocity: u8,
    duration: f64,
    sample_rate: u32,
) -> Vec<f32> {
    let freq = pitch_to_freq(pitch).clamp(FREQ_MIN, FREQ_MAX);
    let amp = velocity as f32 / 127.0;
    let (attack, release) = match voice {
        Voice::Piano => (0.005, 0.08),
        Voice::Guitar => (0.01, 0.10),
        Voice::Pad => (0.15, 0.30),
        Voice::Rhythm => (0.001, 0.12),
    };
    let n = ((duration + release) * sample_rate as f64).ceil() as usize;
    let mut note = Vec::with_capacity(n);

    // Deterministic noise for the percussion voice.
    let mut lcg: u32 = 0x2545_f491;

    for i in 0..n {
        let t = i as f64 / sample_rate as f64;
        let raw = match voice {
            Voice::Rhythm => {
                lcg = lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let noise = (lcg >> 8) as f64 / (1u32 << 24) as f64 * 2.0 - 1.0;
                // Fast exponential decay reads as a drum hit.
                noise * (-18.0 * t).exp()
            }
            Voice::Guitar => {
                // Sine plus a touch of second harmonic for body.
                let w = 2.0 * std::f64::consts::PI * freq * t;
                0.8 * w.sin() + 0.2 * (2.0 * w).sin()
            }
            _ => (2.0 * std::f64::consts::PI * freq * t).sin(),
        };
        let env = envelope(t, duration, attack, release);
        note.push((raw * env) as f32 * amp);
    }
    note
}

fn envelope(t: f64, duration: f64, attack: f64, release: f64) -> f64 {
    if t < attack {
        t / attack
    } else if t < duration {
        1.0
    } else {
        (1.0 - (t - duration) / release).max(0.0)
    }
}

// ── Sample bank ───────────────────────────────────────────────────────

/// External instrument samples, one WAV per voice, recorded at A4 (69).
/// Pitch is reached by playback-rate scaling with linear interpolation.
pub struct SampleBankSynth {
    samples: HashMap<Voice, Vec<f32>>,
    sample_rate: u32,
}

/// Reference pitch the bank samples are recorded at.
const BANK_REFERENCE_PITCH: u8 = 69;

impl SampleBankSynth {
    pub fn load(dir: &Path) -> Result<Self, RenderError> {
        let mut samples = HashMap::new();
        let mut sample_rate = 0u32;
        for voice in Voice::ALL {
            let path = dir.join(format!("{}.wav", voice.name().to_lowercase()));
            let mut reader = hound::WavReader::open(&path).map_err(|e| {
                RenderError::SampleBank(format!("{}: {}", path.display(), e))
            })?;
            let spec = reader.spec();
            if sample_rate == 0 {
                sample_rate = spec.sample_rate;
            } else if sample_rate != spec.sample_rate {
                return Err(RenderError::SampleBank(format!(
                    "{}: sample rate {} differs from bank rate {}",
                    path.display(),
                    spec.sample_rate,
                    sample_rate
                )));
            }
            let mono = read_mono(&mut reader, spec)
                .map_err(|e| RenderError::SampleBank(format!("{}: {}", path.display(), e)))?;
            if mono.is_empty() {
                return Err(RenderError::SampleBank(format!(
                    "{}: empty sample",
                    path.display()
                )));
            }
            samples.insert(voice, mono);
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    fn note(&self, voice: Voice, pitch: u8, velocity: u8, duration: f64, out_rate: u32) -> Vec<f32> {
        let sample = &self.samples[&voice];
        let amp = velocity as f32 / 127.0;
        // Percussion plays at its native pitch.
        let rate = if voice == Voice::Rhythm {
            1.0
        } else {
            2f64.powf((pitch as f64 - BANK_REFERENCE_PITCH as f64) / 12.0)
        };
        let step = rate * self.sample_rate as f64 / out_rate as f64;
        let max_out = ((duration + 0.3) * out_rate as f64).ceil() as usize;

        let mut note = Vec::new();
        let mut pos = 0.0f64;
        while note.len() < max_out {
            let i = pos as usize;
            if i + 1 >= sample.len() {
                break;
            }
            let frac = (pos - i as f64) as f32;
            let s = sample[i] * (1.0 - frac) + sample[i + 1] * frac;
            note.push(s * amp);
            pos += step;
        }
        // Short fade-out so truncated samples don't click.
        let fade = ((0.01 * out_rate as f64) as usize).max(1);
        for (k, s) in note.iter_mut().rev().take(fade).enumerate() {
            *s *= k as f32 / fade as f32;
        }
        note
    }
}

fn read_mono(
    reader: &mut hound::WavReader<std::io::BufReader<std::fs::File>>,
    spec: hound::WavSpec,
) -> Result<Vec<f32>, hound::Error> {
    let channels = spec.channels as usize;
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()?
        }
    };
    Ok(samples
        .chunks(channels)
        .map(|c| c.iter().sum::<f32>() / channels as f32)
        .collect())
}

impl Synthesizer for SampleBankSynth {
    fn name(&self) -> &'static str {
        "sample-bank"
    }

    fn render(&self, score: &Score, timeline: &RenderTimeline, sample_rate: u32) -> Vec<f32> {
        render_events(score, timeline, sample_rate, |voice, pitch, velocity, dur| {
            self.note(voice, pitch, velocity, dur, sample_rate)
        })
    }
}
