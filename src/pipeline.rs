use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;

use crate::aggregate::aggregate;
use crate::boundary::{Boundary, BoundaryError};
use crate::config::AppConfig;
use crate::extract::{extract_scene, ExtractError};
use crate::midi::{write_midi, MidiError};
use crate::render::{render, RenderError, RenderOutputs};
use crate::scene::{discover_scenes, DiscoveryError, SceneSource};
use crate::score::generate::{generate, GenerateError, SceneInput};
use crate::score::{Score, ScoreFileError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    #[error("Extraction failed for scene {scene}: {source}")]
    Scene {
        scene: String,
        #[source]
        source: ExtractError,
    },
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    ScoreFile(#[from] ScoreFileError),
    #[error(transparent)]
    Midi(#[from] MidiError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract and aggregate all scenes, in parallel across scenes, returning
/// score inputs in the strict discovery order.
///
/// Per-scene failures follow the configured policy: abort (default) or log
/// and carry a gap marker forward. Rasters live only inside the per-scene
/// closure, so peak memory is one in-flight scene per worker plus the
/// accumulated frames.
fn extract_frames(
    scenes: &[SceneSource],
    config: &AppConfig,
) -> Result<Vec<SceneInput>, PipelineError> {
    let workers = config.resolve_workers();
    log::info!("Extracting {} scenes with {} workers", scenes.len(), workers);

    let pb = ProgressBar::new(scenes.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .expect("rayon pool");

    // par_iter + collect keeps input order; generation requires it.
    let results: Vec<Result<SceneInput, PipelineError>> = pool.install(|| {
        scenes
            .par_iter()
            .map(|source| {
                let outcome = extract_scene(source).map(|indices| SceneInput {
                    label: source.label(),
                    frame: Some(aggregate(&indices, config.bucket_count)),
                });
                pb.inc(1);
                outcome.map_err(|e| PipelineError::Scene {
                    scene: source.label(),
                    source: e,
                })
            })
            .collect()
    });
    pb.finish_and_clear();

    let mut inputs = Vec::with_capacity(results.len());
    for (source, result) in scenes.iter().zip(results) {
        match result {
            Ok(input) => inputs.push(input),
            Err(e) if config.skip_failed_scenes => {
                log::warn!("Skipping scene {} with a gap: {}", source.label(), e);
                inputs.push(SceneInput {
                    label: source.label(),
                    frame: None,
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(inputs)
}

/// Stage 1-4: scenes on disk → validated boundary → frames → score.
pub fn build_score(config: &AppConfig) -> Result<Score, PipelineError> {
    let boundary = Boundary::load(&config.boundary_path)?;
    log::info!(
        "Boundary OK ({} polygon{})",
        boundary.polygons.len(),
        if boundary.polygons.len() == 1 { "" } else { "s" }
    );

    let scenes = discover_scenes(config)?;
    log::info!(
        "Score order: {}",
        scenes
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let inputs = extract_frames(&scenes, config)?;
    let score = generate(&inputs, config)?;
    log::info!(
        "Generated score: {} scenes, {} events",
        score.scenes.len(),
        score.event_count()
    );
    Ok(score)
}

pub fn score_path(config: &AppConfig) -> PathBuf {
    config.output_dir.join("score.json")
}

pub fn midi_path(config: &AppConfig) -> PathBuf {
    config.output_dir.join("score.mid")
}

/// `score` subcommand: build and persist the score.
pub fn run_score(config: &AppConfig) -> Result<PathBuf, PipelineError> {
    let score = build_score(config)?;
    std::fs::create_dir_all(&config.output_dir)?;
    let path = score_path(config);
    crate::score::save(&score, &path)?;
    log::info!("Wrote score: {}", path.display());
    Ok(path)
}

/// `midi` subcommand: reload the persisted score and emit the MIDI file.
pub fn run_midi(config: &AppConfig, input: Option<&Path>) -> Result<PathBuf, PipelineError> {
    let input = input.map(Path::to_path_buf).unwrap_or_else(|| score_path(config));
    let score = crate::score::load(&input)?;
    std::fs::create_dir_all(&config.output_dir)?;
    let out = midi_path(config);
    write_midi(&score, config, &out)?;
    Ok(out)
}

/// `render` subcommand: reload the persisted score and produce audio+video.
pub fn run_render(config: &AppConfig, input: Option<&Path>) -> Result<RenderOutputs, PipelineError> {
    let input = input.map(Path::to_path_buf).unwrap_or_else(|| score_path(config));
    let score = crate::score::load(&input)?;
    Ok(render(&score, config)?)
}

/// `run` subcommand: the whole pipeline. Completed stage outputs stay on
/// disk even when a later stage fails, so reruns can start mid-pipeline.
pub fn run_all(config: &AppConfig) -> Result<RenderOutputs, PipelineError> {
    let path = run_score(config)?;
    run_midi(config, Some(&path))?;
    run_render(config, Some(&path))
}
