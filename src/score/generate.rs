use thiserror::Error;

use crate::aggregate::Frame;
use crate::config::{AppConfig, ReferenceIndex, Register};
use crate::score::{NoteEvent, Score, SceneScore, Voice, SCORE_FORMAT_VERSION};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("No scenes to sonify")]
    EmptyScoreInput,
}

/// One slot in the ordered score input sequence. `frame: None` marks a
/// scene that was skipped during extraction; it keeps its position and
/// becomes a silent gap segment.
#[derive(Debug, Clone)]
pub struct SceneInput {
    pub label: String,
    pub frame: Option<Frame>,
}

/// Mean and standard deviation over all bucket values of all scenes for one
/// index. Computed once per run — a pitch in Spring is comparable to the
/// same pitch in Winter because both are normalized against the same stats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalStats {
    pub mean: f64,
    pub std: f64,
}

pub fn mean_std<I: IntoIterator<Item = f64>>(values: I) -> GlobalStats {
    let values: Vec<f64> = values.into_iter().collect();
    if values.is_empty() {
        return GlobalStats { mean: 0.0, std: 0.0 };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = var.sqrt();
    // All-equal inputs can leave a std of a few ulps when the mean is not
    // exactly representable (three 0.4s → std ~5e-17); normalizing against
    // that amplifies rounding noise into full semitones. Collapse anything
    // below the accumulated rounding scale to an exact zero so the
    // degenerate guard in z_score fires.
    let noise_floor = f64::EPSILON * mean.abs().max(1.0) * n;
    GlobalStats {
        mean,
        std: if std <= noise_floor { 0.0 } else { std },
    }
}

/// Zero-std inputs (all values equal) normalize to zero instead of dividing
/// by zero.
pub fn z_score(value: f64, stats: GlobalStats) -> f64 {
    if stats.std == 0.0 {
        0.0
    } else {
        (value - stats.mean) / stats.std
    }
}

/// Affine map from z-score into a bounded register: the register midpoint
/// at z = 0, one quarter of the span per standard deviation, clamped at the
/// register edges. The result can never leave the playable range.
pub fn affine_pitch(z: f64, register: &Register) -> u8 {
    let raw = register.midpoint() + z * register.semitones_per_sigma();
    raw.round().clamp(register.low as f64, register.high as f64) as u8
}

/// Note velocity from the same z-score, clamped into MIDI's 1..=127.
pub fn velocity(z: f64) -> u8 {
    (76.0 + z * 16.0).round().clamp(1.0, 127.0) as u8
}

/// Pulse velocity proportional to delta magnitude, clamped at full scale.
fn pulse_velocity(delta: f64, full_scale: f64) -> u8 {
    let ratio = if full_scale > 0.0 {
        (delta / full_scale).clamp(0.0, 1.0)
    } else {
        1.0
    };
    (64.0 + ratio * 63.0).round() as u8
}

fn reference_values<'a>(frame: &'a Frame, reference: ReferenceIndex) -> &'a [f64] {
    match reference {
        ReferenceIndex::Vegetation => &frame.vegetation,
        ReferenceIndex::BuiltUp => &frame.built_up,
        ReferenceIndex::Water => &frame.water,
    }
}

/// Convert the full ordered frame sequence into a Score.
///
/// Normalization is global (step 1), so the complete sequence must be in
/// hand before any note can be produced; pitch mapping and the rhythm
/// trigger are pure functions of (value, stats, config), making the output
/// reproducible bit-for-bit.
pub fn generate(inputs: &[SceneInput], config: &AppConfig) -> Result<Score, GenerateError> {
    if inputs.is_empty() || inputs.iter().all(|s| s.frame.is_none()) {
        return Err(GenerateError::EmptyScoreInput);
    }

    let frames = || inputs.iter().filter_map(|s| s.frame.as_ref());
    let veg_stats = mean_std(frames().flat_map(|f| f.vegetation.iter().copied()));
    let built_stats = mean_std(frames().flat_map(|f| f.built_up.iter().copied()));
    let water_stats = mean_std(frames().flat_map(|f| f.water.iter().copied()));

    log::info!(
        "Global stats — vegetation μ={:.4} σ={:.4}, built-up μ={:.4} σ={:.4}, water μ={:.4} σ={:.4}",
        veg_stats.mean,
        veg_stats.std,
        built_stats.mean,
        built_stats.std,
        water_stats.mean,
        water_stats.std
    );

    let step = config.step_beats;
    let mut scenes = Vec::with_capacity(inputs.len());
    // Last reference value of the previous sounding scene, for the optional
    // cross-boundary rhythm delta.
    let mut prev_scene_tail: Option<f64> = None;

    for input in inputs {
        let frame = match &input.frame {
            Some(f) => f,
            None => {
                scenes.push(SceneScore {
                    label: input.label.clone(),
                    gap: true,
                    events: Vec::new(),
                    gauges: Vec::new(),
                });
                prev_scene_tail = None;
                continue;
            }
        };

        let reference = reference_values(frame, config.rhythm.reference);
        let mut events = Vec::new();

        for (i, ((&veg, &built), &water)) in frame
            .vegetation
            .iter()
            .zip(&frame.built_up)
            .zip(&frame.water)
            .enumerate()
        {
            // All four voices share this start: vertical alignment across
            // voices at every bucket.
            let start = i as f64 * step;

            let zv = z_score(veg, veg_stats);
            events.push(NoteEvent {
                voice: Voice::Piano,
                pitch: affine_pitch(zv, &config.registers.piano),
                start,
                duration: step,
                velocity: velocity(zv),
            });

            let zb = z_score(built, built_stats);
            events.push(NoteEvent {
                voice: Voice::Guitar,
                pitch: affine_pitch(zb, &config.registers.guitar),
                start,
                duration: step * 2.0,
                velocity: velocity(zb),
            });

            let zw = z_score(water, water_stats);
            events.push(NoteEvent {
                voice: Voice::Pad,
                pitch: affine_pitch(zw, &config.registers.pad),
                start,
                duration: step * 4.0,
                velocity: velocity(zw),
            });

            // Rhythm comes from change, not level: uniform stretches stay
            // silent, edges and transitions pulse.
            let previous = if i > 0 {
                Some(reference[i - 1])
            } else if config.rhythm.across_scenes {
                prev_scene_tail
            } else {
                None
            };
            if let Some(prev) = previous {
                let delta = (reference[i] - prev).abs();
                if delta > config.rhythm.threshold {
                    events.push(NoteEvent {
                        voice: Voice::Rhythm,
                        pitch: config.rhythm.percussion_key,
                        start,
                        duration: step,
                        velocity: pulse_velocity(delta, config.rhythm.full_scale_delta),
                    });
                }
            }
        }

        prev_scene_tail = reference.last().copied();
        scenes.push(SceneScore {
            label: input.label.clone(),
            gap: false,
            events,
            gauges: frame.coverage.clone(),
        });
    }

    Ok(Score {
        version: SCORE_FORMAT_VERSION,
        bucket_count: config.bucket_count,
        scenes,
    })
}
