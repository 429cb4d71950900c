pub mod aggregate;
pub mod boundary;
pub mod config;
pub mod extract;
pub mod midi;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod scene;
pub mod score;
pub mod timeline;

/// Band file keys we need per scene.
/// B03 green, B04 red, B08 near-infrared, B11 shortwave-infrared,
/// SCL scene classification.
pub const REQUIRED_BANDS: &[&str] = &["B03", "B04", "B08", "B11", "SCL"];

/// SCL classes counted as valid ground pixels.
/// 4 vegetation, 5 bare soil, 6 water, 7 unclassified.
pub const VALID_SCL_CLASSES: &[u16] = &[4, 5, 6, 7];

/// Playable MIDI register — no emitted pitch may leave this range.
pub const MIDI_PITCH_MIN: u8 = 21;
pub const MIDI_PITCH_MAX: u8 = 108;

/// Application name for XDG paths
pub const APP_NAME: &str = "terratone";
