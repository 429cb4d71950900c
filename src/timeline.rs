use crate::config::AppConfig;

/// The shared clock for audio and video.
///
/// Every scene occupies a fixed segment of `bucket_count * step_beats`
/// beats at a fixed tempo, so (scene, bucket) maps to absolute time by pure
/// arithmetic. The MIDI emitter and the video renderer both go through this
/// struct — neither owns a timing source of its own, which is what makes
/// the scanline marker and the sounding notes agree at every instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTimeline {
    pub bucket_count: usize,
    pub step_beats: f64,
    pub tempo_bpm: f64,
    pub scene_count: usize,
}

impl RenderTimeline {
    pub fn new(bucket_count: usize, step_beats: f64, tempo_bpm: f64, scene_count: usize) -> Self {
        Self {
            bucket_count,
            step_beats,
            tempo_bpm,
            scene_count,
        }
    }

    pub fn from_config(config: &AppConfig, scene_count: usize) -> Self {
        Self::new(
            config.bucket_count,
            config.step_beats,
            config.tempo_bpm,
            scene_count,
        )
    }

    /// Timeline for a persisted score. The bucket count comes from the
    /// score itself — a score generated under one config must replay with
    /// the segment geometry it was written with, or (scene, bucket)
    /// attribution drifts between the notes and the clock.
    pub fn for_score(score: &crate::score::Score, config: &AppConfig) -> Self {
        Self::new(
            score.bucket_count,
            config.step_beats,
            config.tempo_bpm,
            score.scenes.len(),
        )
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    /// Fixed length of one scene's segment, in beats.
    pub fn segment_beats(&self) -> f64 {
        self.bucket_count as f64 * self.step_beats
    }

    pub fn segment_seconds(&self) -> f64 {
        self.segment_beats() * self.seconds_per_beat()
    }

    pub fn scene_start_beats(&self, scene: usize) -> f64 {
        scene as f64 * self.segment_beats()
    }

    /// Absolute beat position of a bucket. Identical for all four voices —
    /// vertical alignment across voices is the defining structure.
    pub fn bucket_start_beats(&self, scene: usize, bucket: usize) -> f64 {
        self.scene_start_beats(scene) + bucket as f64 * self.step_beats
    }

    /// Absolute time of an event given its segment-relative start.
    pub fn event_seconds(&self, scene: usize, start_beats: f64) -> f64 {
        (self.scene_start_beats(scene) + start_beats) * self.seconds_per_beat()
    }

    pub fn total_seconds(&self) -> f64 {
        self.scene_count as f64 * self.segment_seconds()
    }

    /// Which (scene, bucket) is sounding at playback time `t`. Clamps to the
    /// final bucket at or past the end of the score.
    pub fn position_at(&self, t: f64) -> (usize, usize) {
        let beats = t.max(0.0) / self.seconds_per_beat();
        let scene = ((beats / self.segment_beats()) as usize).min(self.scene_count.saturating_sub(1));
        let within = beats - self.scene_start_beats(scene);
        let bucket = ((within / self.step_beats) as usize).min(self.bucket_count.saturating_sub(1));
        (scene, bucket)
    }

    /// Pixel row of the scanline marker for an image of `height` rows:
    /// bucket position plus intra-bucket progress, top-to-bottom.
    pub fn scanline_row(&self, t: f64, height: u32) -> u32 {
        let (scene, bucket) = self.position_at(t);
        let bucket_start = self.event_seconds(scene, bucket as f64 * self.step_beats);
        let step_secs = self.step_beats * self.seconds_per_beat();
        let frac = ((t - bucket_start) / step_secs).clamp(0.0, 1.0);
        let pos = (bucket as f64 + frac) / self.bucket_count as f64;
        ((pos * height as f64) as u32).min(height.saturating_sub(1))
    }
}
