pub mod synth;
pub mod video;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::AppConfig;
use crate::score::Score;
use crate::timeline::RenderTimeline;
use synth::select_synthesizer;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No synthesizer available: sample bank missing and fallback disabled")]
    NoSynthesizer,
    #[error("Sample bank error: {0}")]
    SampleBank(String),
    #[error("Muxer error: {0}")]
    Muxer(String),
    #[error("WAV write error for {path}: {message}")]
    Wav { path: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct RenderOutputs {
    pub audio_path: PathBuf,
    pub video_path: PathBuf,
}

/// Synthesize the score to WAV and render the synchronized video.
///
/// One RenderTimeline instance drives both halves; the audio buffer length,
/// the note placement and the per-frame scanline position are all derived
/// from it.
pub fn render(score: &Score, config: &AppConfig) -> Result<RenderOutputs, RenderError> {
    std::fs::create_dir_all(&config.output_dir)?;

    let timeline = RenderTimeline::for_score(score, config);
    let synthesizer = select_synthesizer(&config.synth)?;
    log::info!(
        "Rendering {} scenes ({:.1}s) with {} synthesis",
        score.scenes.len(),
        timeline.total_seconds(),
        synthesizer.name()
    );

    let samples = synthesizer.render(score, &timeline, config.synth.sample_rate);

    let audio_path = config.output_dir.join("audio.wav");
    write_wav(&samples, config.synth.sample_rate, &audio_path)?;
    log::info!("Wrote audio: {}", audio_path.display());

    let video_path = config.output_dir.join("terratone.mp4");
    video::render_video(score, &timeline, &config.video, &audio_path, &video_path)?;

    Ok(RenderOutputs {
        audio_path,
        video_path,
    })
}

fn write_wav(samples: &[f32], sample_rate: u32, path: &Path) -> Result<(), RenderError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| RenderError::Wav {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    for &s in samples {
        writer.write_sample(s).map_err(|e| RenderError::Wav {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    }
    writer.finalize().map_err(|e| RenderError::Wav {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
