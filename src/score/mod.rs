pub mod generate;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::Coverage;
use crate::{MIDI_PITCH_MAX, MIDI_PITCH_MIN};

/// Bumped whenever the persisted layout changes shape.
pub const SCORE_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ScoreFileError {
    #[error("IO error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt score: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Piano,
    Guitar,
    Pad,
    Rhythm,
}

impl Voice {
    pub const ALL: [Voice; 4] = [Voice::Piano, Voice::Guitar, Voice::Pad, Voice::Rhythm];

    pub fn name(&self) -> &'static str {
        match self {
            Voice::Piano => "Piano",
            Voice::Guitar => "Guitar",
            Voice::Pad => "Pad",
            Voice::Rhythm => "Rhythm",
        }
    }
}

/// One symbolic musical instruction. `start` and `duration` are in beats
/// relative to the owning scene's segment start; absolute placement is the
/// timeline's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub voice: Voice,
    pub pitch: u8,
    pub start: f64,
    pub duration: f64,
    pub velocity: u8,
}

/// All events for one scene's segment, in bucket order, plus the gauge
/// samples the video overlays read. A gap scene (skipped acquisition) keeps
/// its slot in the sequence with no events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneScore {
    pub label: String,
    #[serde(default)]
    pub gap: bool,
    pub events: Vec<NoteEvent>,
    #[serde(default)]
    pub gauges: Vec<Coverage>,
}

/// The complete symbolic score: scene order is the vector order and total
/// duration is scenes × the fixed segment length, known before rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub version: u32,
    pub bucket_count: usize,
    pub scenes: Vec<SceneScore>,
}

impl Score {
    pub fn event_count(&self) -> usize {
        self.scenes.iter().map(|s| s.events.len()).sum()
    }
}

/// Serialize a score to pretty JSON (the persisted form is meant to be
/// read by humans as well as reloaded).
pub fn serialize(score: &Score) -> Result<String, ScoreFileError> {
    validate(score)?;
    serde_json::to_string_pretty(score).map_err(|e| ScoreFileError::Corrupt(e.to_string()))
}

/// Parse and validate a persisted score.
pub fn deserialize(json: &str) -> Result<Score, ScoreFileError> {
    let score: Score =
        serde_json::from_str(json).map_err(|e| ScoreFileError::Corrupt(e.to_string()))?;
    validate(&score)?;
    Ok(score)
}

pub fn save(score: &Score, path: &Path) -> Result<(), ScoreFileError> {
    let json = serialize(score)?;
    std::fs::write(path, json).map_err(|e| ScoreFileError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

pub fn load(path: &Path) -> Result<Score, ScoreFileError> {
    let json = std::fs::read_to_string(path).map_err(|e| ScoreFileError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    deserialize(&json)
}

/// Structural checks shared by both directions: integers and finite floats
/// only, pitches inside the playable register, events inside their segment.
fn validate(score: &Score) -> Result<(), ScoreFileError> {
    if score.version != SCORE_FORMAT_VERSION {
        return Err(ScoreFileError::Corrupt(format!(
            "unsupported score version {} (expected {})",
            score.version, SCORE_FORMAT_VERSION
        )));
    }
    if score.bucket_count == 0 {
        return Err(ScoreFileError::Corrupt("bucket_count is zero".to_string()));
    }
    for scene in &score.scenes {
        if scene.gap && !scene.events.is_empty() {
            return Err(ScoreFileError::Corrupt(format!(
                "gap scene {:?} carries events",
                scene.label
            )));
        }
        for ev in &scene.events {
            if !(MIDI_PITCH_MIN..=MIDI_PITCH_MAX).contains(&ev.pitch) {
                return Err(ScoreFileError::Corrupt(format!(
                    "pitch {} out of range in scene {:?}",
                    ev.pitch, scene.label
                )));
            }
            if ev.velocity == 0 || ev.velocity > 127 {
                return Err(ScoreFileError::Corrupt(format!(
                    "velocity {} out of range in scene {:?}",
                    ev.velocity, scene.label
                )));
            }
            if !ev.start.is_finite() || ev.start < 0.0 {
                return Err(ScoreFileError::Corrupt(format!(
                    "bad start time {} in scene {:?}",
                    ev.start, scene.label
                )));
            }
            if !ev.duration.is_finite() || ev.duration <= 0.0 {
                return Err(ScoreFileError::Corrupt(format!(
                    "bad duration {} in scene {:?}",
                    ev.duration, scene.label
                )));
            }
        }
        for g in &scene.gauges {
            for v in [g.vegetation, g.built_up, g.water] {
                if !v.is_finite() {
                    return Err(ScoreFileError::Corrupt(format!(
                        "non-finite gauge value in scene {:?}",
                        scene.label
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_score() -> Score {
        Score {
            version: SCORE_FORMAT_VERSION,
            bucket_count: 2,
            scenes: vec![
                SceneScore {
                    label: "Spring_20250420".to_string(),
                    gap: false,
                    events: vec![
                        NoteEvent {
                            voice: Voice::Piano,
                            pitch: 72,
                            start: 0.0,
                            duration: 0.25,
                            velocity: 80,
                        },
                        NoteEvent {
                            voice: Voice::Rhythm,
                            pitch: 38,
                            start: 0.25,
                            duration: 0.25,
                            velocity: 100,
                        },
                    ],
                    gauges: vec![Coverage {
                        vegetation: 0.4,
                        built_up: 0.3,
                        water: 0.05,
                    }],
                },
                SceneScore {
                    label: "Winter_20250115".to_string(),
                    gap: true,
                    events: vec![],
                    gauges: vec![],
                },
            ],
        }
    }

    #[test]
    fn round_trip_is_exact() {
        let score = sample_score();
        let json = serialize(&score).unwrap();
        let back = deserialize(&json).unwrap();
        assert_eq!(back, score);
    }

    #[test]
    fn round_trip_preserves_awkward_floats() {
        let mut score = sample_score();
        score.scenes[0].events[0].start = 0.1 + 0.2; // 0.30000000000000004
        let back = deserialize(&serialize(&score).unwrap()).unwrap();
        assert_eq!(back.scenes[0].events[0].start, score.scenes[0].events[0].start);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            deserialize("{\"version\": 1"),
            Err(ScoreFileError::Corrupt(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_pitch() {
        let json = r#"{"version":1,"bucket_count":1,"scenes":[{"label":"a","events":
            [{"voice":"piano","pitch":"sixty","start":0.0,"duration":0.25,"velocity":80}]}]}"#;
        assert!(matches!(deserialize(json), Err(ScoreFileError::Corrupt(_))));
    }

    #[test]
    fn rejects_out_of_register_pitch() {
        let mut score = sample_score();
        score.scenes[0].events[0].pitch = 5;
        assert!(serialize(&score).is_err());
    }

    #[test]
    fn rejects_out_of_range_velocity() {
        // MIDI velocity is 7-bit; anything larger would be silently
        // bit-masked downstream instead of played as written.
        let json = r#"{"version":1,"bucket_count":1,"scenes":[{"label":"a","events":
            [{"voice":"piano","pitch":60,"start":0.0,"duration":0.25,"velocity":200}]}]}"#;
        assert!(matches!(deserialize(json), Err(ScoreFileError::Corrupt(_))));

        let mut score = sample_score();
        score.scenes[0].events[0].velocity = 0;
        assert!(serialize(&score).is_err());
    }

    #[test]
    fn rejects_wrong_version() {
        let mut score = sample_score();
        score.version = 99;
        assert!(serialize(&score).is_err());
    }

    #[test]
    fn rejects_nan_timing() {
        let json = r#"{"version":1,"bucket_count":1,"scenes":[{"label":"a","events":
            [{"voice":"piano","pitch":60,"start":null,"duration":0.25,"velocity":80}]}]}"#;
        assert!(matches!(deserialize(json), Err(ScoreFileError::Corrupt(_))));
    }

    #[test]
    fn rejects_gap_scene_with_events() {
        let mut score = sample_score();
        score.scenes[1].gap = true;
        score.scenes[1].events = score.scenes[0].events.clone();
        assert!(serialize(&score).is_err());
    }

    #[test]
    fn save_and_load_file() {
        let score = sample_score();
        let path = std::env::temp_dir().join(format!("terratone_score_{}.json", std::process::id()));
        save(&score, &path).unwrap();
        let back = load(&path).unwrap();
        assert_eq!(back, score);
        std::fs::remove_file(path).ok();
    }
}
