use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use image::{Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::VideoConfig;
use crate::render::RenderError;
use crate::score::{Score, SceneScore};
use crate::timeline::RenderTimeline;

/// Background tint per season, matched on the scene label prefix.
fn season_tint(label: &str) -> Rgb<u8> {
    if label.starts_with("Spring") {
        Rgb([144, 238, 144])
    } else if label.starts_with("Summer") {
        Rgb([34, 139, 34])
    } else if label.starts_with("Autumn") {
        Rgb([205, 92, 92])
    } else {
        Rgb([135, 206, 235])
    }
}

const SCANLINE_COLOR: Rgb<u8> = Rgb([255, 50, 50]);
const GAUGE_COLORS: [Rgb<u8>; 3] = [
    Rgb([60, 200, 60]),   // vegetation
    Rgb([200, 200, 200]), // built-up
    Rgb([60, 120, 230]),  // water
];

/// Per-scene backdrop built purely from the persisted gauge values: one
/// horizontal band per bucket, tinted by that bucket's index coverage over
/// the season base color. No raster access — the score file is enough.
fn scene_backdrop(scene: &SceneScore, video: &VideoConfig) -> RgbImage {
    let tint = season_tint(&scene.label);
    let buckets = scene.gauges.len();
    RgbImage::from_fn(video.width, video.height, |_, y| {
        if buckets == 0 {
            // Gap scene: dimmed season gradient only.
            let shade = 0.25 + 0.15 * (y as f64 / video.height as f64);
            return Rgb([
                (tint[0] as f64 * shade) as u8,
                (tint[1] as f64 * shade) as u8,
                (tint[2] as f64 * shade) as u8,
            ]);
        }
        let bucket = (y as usize * buckets / video.height as usize).min(buckets - 1);
        let g = &scene.gauges[bucket];
        let r = 0.25 * tint[0] as f64 + 170.0 * g.built_up;
        let gr = 0.25 * tint[1] as f64 + 170.0 * g.vegetation;
        let b = 0.25 * tint[2] as f64 + 170.0 * g.water;
        Rgb([r.min(255.0) as u8, gr.min(255.0) as u8, b.min(255.0) as u8])
    })
}

/// Draw the horizontal scanline marker across the frame.
fn draw_scanline(frame: &mut RgbImage, row: u32) {
    let h = frame.height();
    for dy in 0..4u32 {
        let y = (row + dy).min(h - 1);
        for x in 0..frame.width() {
            frame.put_pixel(x, y, SCANLINE_COLOR);
        }
    }
}

/// Three horizontal gauge bars, bottom-left, fed by the current bucket's
/// coverage fractions.
fn draw_gauges(frame: &mut RgbImage, values: [f64; 3]) {
    let bar_w = frame.width() / 4;
    let bar_h = 14u32;
    let x0 = 16u32;
    let y0 = frame.height().saturating_sub(3 * (bar_h + 8) + 16);
    for (i, (&value, color)) in values.iter().zip(GAUGE_COLORS).enumerate() {
        let y = y0 + i as u32 * (bar_h + 8);
        let filled = (value.clamp(0.0, 1.0) * bar_w as f64) as u32;
        for dy in 0..bar_h {
            // The stack needs ~82 rows; smaller frames get whatever fits.
            if y + dy >= frame.height() {
                break;
            }
            for dx in 0..bar_w {
                if x0 + dx >= frame.width() {
                    break;
                }
                let px = if dx < filled { color } else { Rgb([30, 30, 30]) };
                frame.put_pixel(x0 + dx, y + dy, px);
            }
        }
    }
}

/// Compose the video frame for playback time `t`. The scanline row and the
/// gauge bucket both come from the shared timeline — no second clock.
pub fn compose_frame(
    score: &Score,
    timeline: &RenderTimeline,
    backdrops: &[RgbImage],
    video: &VideoConfig,
    t: f64,
) -> RgbImage {
    let (scene_idx, bucket) = timeline.position_at(t);
    let mut frame = backdrops[scene_idx].clone();
    draw_scanline(&mut frame, timeline.scanline_row(t, video.height));
    let scene = &score.scenes[scene_idx];
    let values = scene
        .gauges
        .get(bucket)
        .map(|g| [g.vegetation, g.built_up, g.water])
        .unwrap_or([0.0; 3]);
    draw_gauges(&mut frame, values);
    frame
}

/// Render all frames and pipe them raw into ffmpeg, muxing against the
/// synthesized audio. ffmpeg is the external muxer; it not being on PATH is
/// a reportable failure, not a panic.
pub fn render_video(
    score: &Score,
    timeline: &RenderTimeline,
    video: &VideoConfig,
    audio_path: &Path,
    out_path: &Path,
) -> Result<(), RenderError> {
    let backdrops: Vec<RgbImage> = score
        .scenes
        .iter()
        .map(|s| scene_backdrop(s, video))
        .collect();

    let total_frames = (timeline.total_seconds() * video.fps as f64).ceil() as u64;

    let mut child = Command::new("ffmpeg")
        .args(["-y", "-f", "rawvideo", "-pixel_format", "rgb24"])
        .args(["-video_size", &format!("{}x{}", video.width, video.height)])
        .args(["-framerate", &video.fps.to_string()])
        .args(["-i", "-"])
        .args(["-i", &audio_path.display().to_string()])
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
        .args(["-c:a", "aac", "-shortest"])
        .arg(out_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| RenderError::Muxer(format!("failed to start ffmpeg: {}", e)))?;

    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    {
        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| RenderError::Muxer("ffmpeg stdin unavailable".to_string()))?;
        for n in 0..total_frames {
            let t = n as f64 / video.fps as f64;
            let frame = compose_frame(score, timeline, &backdrops, video, t);
            stdin
                .write_all(frame.as_raw())
                .map_err(|e| RenderError::Muxer(format!("ffmpeg pipe closed: {}", e)))?;
            pb.inc(1);
        }
    }
    pb.finish_and_clear();

    let status = child
        .wait()
        .map_err(|e| RenderError::Muxer(e.to_string()))?;
    if !status.success() {
        return Err(RenderError::Muxer(format!(
            "ffmpeg exited with {}",
            status
        )));
    }
    log::info!("Wrote video: {}", out_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Coverage;
    use crate::score::SCORE_FORMAT_VERSION;

    fn video() -> VideoConfig {
        VideoConfig {
            width: 64,
            height: 48,
            fps: 24,
        }
    }

    fn score_with_gauges() -> Score {
        let gauges = vec![
            Coverage {
                vegetation: 1.0,
                built_up: 0.0,
                water: 0.0,
            },
            Coverage {
                vegetation: 0.0,
                built_up: 1.0,
                water: 0.0,
            },
        ];
        Score {
            version: SCORE_FORMAT_VERSION,
            bucket_count: 2,
            scenes: vec![
                SceneScore {
                    label: "Spring_20250420".to_string(),
                    gap: false,
                    events: vec![],
                    gauges: gauges.clone(),
                },
                SceneScore {
                    label: "Winter_20250115".to_string(),
                    gap: false,
                    events: vec![],
                    gauges,
                },
            ],
        }
    }

    #[test]
    fn backdrop_has_frame_dimensions() {
        let score = score_with_gauges();
        let img = scene_backdrop(&score.scenes[0], &video());
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn scanline_position_follows_timeline() {
        let score = score_with_gauges();
        let v = video();
        let tl = RenderTimeline::new(2, 0.25, 120.0, 2);
        let backdrops: Vec<RgbImage> =
            score.scenes.iter().map(|s| scene_backdrop(s, &v)).collect();
        // Start of scene 1, bucket 0: scanline at the top.
        let frame = compose_frame(&score, &tl, &backdrops, &v, 0.0);
        assert_eq!(frame.get_pixel(0, 0), &SCANLINE_COLOR);
        // Just past the first segment: scene 2 bucket 0, scanline back at
        // the top — the sync scenario.
        let d = tl.segment_seconds();
        assert_eq!(tl.position_at(d + 1e-6), (1, 0));
        let frame = compose_frame(&score, &tl, &backdrops, &v, d + 1e-6);
        assert_eq!(frame.get_pixel(0, 0), &SCANLINE_COLOR);
    }

    #[test]
    fn gauges_fit_inside_short_frames() {
        // A 48-row frame cannot hold the full gauge stack; drawing must
        // clip to the frame instead of indexing past it.
        let score = score_with_gauges();
        let v = video();
        let tl = RenderTimeline::new(2, 0.25, 120.0, 2);
        let backdrops: Vec<RgbImage> =
            score.scenes.iter().map(|s| scene_backdrop(s, &v)).collect();
        let frame = compose_frame(&score, &tl, &backdrops, &v, 0.1);
        assert_eq!((frame.width(), frame.height()), (64, 48));

        // Even a frame too small for a single bar must render.
        let tiny = VideoConfig {
            width: 20,
            height: 10,
            fps: 24,
        };
        let backdrops: Vec<RgbImage> = score
            .scenes
            .iter()
            .map(|s| scene_backdrop(s, &tiny))
            .collect();
        let frame = compose_frame(&score, &tl, &backdrops, &tiny, 0.1);
        assert_eq!((frame.width(), frame.height()), (20, 10));
    }

    #[test]
    fn gap_scene_backdrop_is_dimmed() {
        let scene = SceneScore {
            label: "Summer_x".to_string(),
            gap: true,
            events: vec![],
            gauges: vec![],
        };
        let img = scene_backdrop(&scene, &video());
        // Dim: every channel well below the full season tint.
        let px = img.get_pixel(32, 24);
        assert!(px[1] < 139);
    }
}
