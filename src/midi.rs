use std::path::Path;

use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};
use thiserror::Error;

use crate::config::{AppConfig, Register};
use crate::score::{Score, Voice};
use crate::timeline::RenderTimeline;
use crate::{MIDI_PITCH_MAX, MIDI_PITCH_MIN};

#[derive(Error, Debug)]
pub enum MidiError {
    #[error("Pitch {pitch} out of range [{low}, {high}] for {voice} in scene {scene:?}")]
    PitchOutOfRange {
        voice: &'static str,
        pitch: u8,
        low: u8,
        high: u8,
        scene: String,
    },
    #[error("IO error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MIDI encoding error: {0}")]
    Encode(String),
}

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// General MIDI programs: acoustic grand, overdriven guitar, pad 3 (polysynth).
fn program_of(voice: Voice) -> u8 {
    match voice {
        Voice::Piano => 0,
        Voice::Guitar => 29,
        Voice::Pad => 90,
        Voice::Rhythm => 0, // channel 10 ignores the program
    }
}

fn channel_of(voice: Voice) -> u8 {
    match voice {
        Voice::Piano => 0,
        Voice::Guitar => 1,
        Voice::Pad => 2,
        Voice::Rhythm => 9,
    }
}

/// Emit the score as SMF Format 1: a tempo track plus one track per voice,
/// all at the fixed configured tempo.
///
/// Tick placement goes through the same RenderTimeline beat arithmetic the
/// video renderer uses, so audio and scanline cannot drift apart.
pub fn emit(score: &Score, config: &AppConfig) -> Result<Smf<'static>, MidiError> {
    validate_registers(score, config)?;

    let timeline = RenderTimeline::for_score(score, config);

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo track
    let mut tempo_track: Track<'static> = Vec::new();
    let tempo_microseconds = (60_000_000.0 / config.tempo_bpm).round() as u32;
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
    });
    smf.tracks.push(tempo_track);

    for voice in Voice::ALL {
        smf.tracks.push(voice_track(score, &timeline, voice));
    }

    Ok(smf)
}

pub fn write_midi(score: &Score, config: &AppConfig, path: &Path) -> Result<(), MidiError> {
    let smf = emit(score, config)?;
    let mut buf = Vec::new();
    smf.write(&mut buf)
        .map_err(|e| MidiError::Encode(e.to_string()))?;
    std::fs::write(path, &buf).map_err(|e| MidiError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    log::info!("Wrote MIDI: {} ({} tracks)", path.display(), smf.tracks.len());
    Ok(())
}

/// Absolute tick of a beat position. 480 TPQ with quarter-beat steps keeps
/// every bucket boundary on an exact integer tick.
fn beats_to_ticks(beats: f64) -> u32 {
    (beats * TICKS_PER_QUARTER as f64).round() as u32
}

fn voice_track(score: &Score, timeline: &RenderTimeline, voice: Voice) -> Track<'static> {
    let channel = u4::new(channel_of(voice));
    let mut track: Track<'static> = Vec::new();

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::TrackName(voice.name().as_bytes())),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(program_of(voice)),
            },
        },
    });

    // Collect (tick, is_off, pitch, velocity); note-offs sort before
    // note-ons at the same tick so overlapping sustains retire cleanly.
    let mut moments: Vec<(u32, bool, u8, u8)> = Vec::new();
    for (scene_idx, scene) in score.scenes.iter().enumerate() {
        for ev in scene.events.iter().filter(|e| e.voice == voice) {
            let on = beats_to_ticks(timeline.scene_start_beats(scene_idx) + ev.start);
            let off = beats_to_ticks(
                timeline.scene_start_beats(scene_idx) + ev.start + ev.duration,
            );
            moments.push((on, false, ev.pitch, ev.velocity));
            moments.push((off, true, ev.pitch, 0));
        }
    }
    moments.sort_by_key(|&(tick, is_off, pitch, _)| (tick, !is_off, pitch));

    let mut last_tick = 0u32;
    for (tick, is_off, pitch, vel) in moments {
        let delta = tick - last_tick;
        last_tick = tick;
        let message = if is_off {
            MidiMessage::NoteOff {
                key: u7::new(pitch),
                vel: u7::new(0),
            }
        } else {
            MidiMessage::NoteOn {
                key: u7::new(pitch),
                vel: u7::new(vel),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi { channel, message },
        });
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
    });
    track
}

/// Defensive re-validation at the boundary: the generator's clamps make a
/// violation impossible in-process, but scores also arrive from disk.
fn validate_registers(score: &Score, config: &AppConfig) -> Result<(), MidiError> {
    let full = Register {
        low: MIDI_PITCH_MIN,
        high: MIDI_PITCH_MAX,
    };
    for scene in &score.scenes {
        for ev in &scene.events {
            let register = match ev.voice {
                Voice::Piano => &config.registers.piano,
                Voice::Guitar => &config.registers.guitar,
                Voice::Pad => &config.registers.pad,
                Voice::Rhythm => &full,
            };
            if ev.pitch < register.low || ev.pitch > register.high {
                return Err(MidiError::PitchOutOfRange {
                    voice: ev.voice.name(),
                    pitch: ev.pitch,
                    low: register.low,
                    high: register.high,
                    scene: scene.label.clone(),
                });
            }
        }
    }
    Ok(())
}
