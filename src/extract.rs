use thiserror::Error;

use crate::raster::{read_band, Band, RasterError};
use crate::scene::SceneSource;
use crate::{REQUIRED_BANDS, VALID_SCL_CLASSES};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid raster for scene {scene}: {message}")]
    InvalidRaster { scene: String, message: String },
    #[error("Boundary mask left no valid pixels in scene {scene}")]
    EmptyMask { scene: String },
    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// One derived per-pixel scalar field, masked. Invalid pixels are NaN and
/// excluded from every downstream statistic.
#[derive(Debug, Clone)]
pub struct IndexRaster {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl IndexRaster {
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}

/// The three index fields for one scene.
pub struct IndexSet {
    pub vegetation: IndexRaster,
    pub built_up: IndexRaster,
    pub water: IndexRaster,
}

/// Compute the three masked index rasters for one scene.
///
/// vegetation = nd(NIR, red), built-up = nd(SWIR, NIR), water = nd(green, NIR)
/// where nd(a, b) = (a - b) / (a + b), NaN where the denominator is zero.
///
/// The validity mask is the scene-classification band (vegetation, bare
/// soil, water, unclassified) intersected with nonzero reflectance; imagery
/// arrives already clipped to the boundary polygon, whose nodata pixels read
/// as zero.
pub fn extract_scene(source: &SceneSource) -> Result<IndexSet, ExtractError> {
    let scene = source.label();

    let mut bands: Vec<Band> = Vec::with_capacity(REQUIRED_BANDS.len());
    for key in REQUIRED_BANDS {
        let path = source
            .band_path(key)
            .ok_or_else(|| ExtractError::InvalidRaster {
                scene: scene.clone(),
                message: format!("missing band {}", key),
            })?;
        bands.push(read_band(&path)?);
    }

    // Bring every band to the reference (green) grid.
    let (height, width) = bands[0].shape();
    if width == 0 || height == 0 {
        return Err(ExtractError::InvalidRaster {
            scene,
            message: "reference band has zero extent".to_string(),
        });
    }
    // Differing resolutions (10 m vs 20 m bands) are expected and handled by
    // resampling; a differing footprint means the files do not describe the
    // same extent and is a hard error.
    let aspect_ref = width as f64 / height as f64;
    for (key, b) in REQUIRED_BANDS.iter().zip(&bands) {
        let aspect = b.width as f64 / b.height as f64;
        if b.width == 0 || b.height == 0 || (aspect / aspect_ref - 1.0).abs() > 0.05 {
            return Err(ExtractError::InvalidRaster {
                scene: scene.clone(),
                message: format!(
                    "band {} shape {}x{} does not match reference {}x{}",
                    key, b.width, b.height, width, height
                ),
            });
        }
    }
    let bands: Vec<Band> = bands
        .into_iter()
        .map(|b| b.resample_nearest(height, width))
        .collect();

    let green = &bands[0];
    let red = &bands[1];
    let nir = &bands[2];
    let swir = &bands[3];
    let scl = &bands[4];

    let mask: Vec<bool> = (0..width * height)
        .map(|i| {
            let class = scl.data[i] as u16;
            VALID_SCL_CLASSES.contains(&class) && green.data[i] != 0.0
        })
        .collect();

    let indices = IndexSet {
        vegetation: normalized_difference(nir, red, &mask),
        built_up: normalized_difference(swir, nir, &mask),
        water: normalized_difference(green, nir, &mask),
    };

    if indices.vegetation.valid_count() == 0 {
        return Err(ExtractError::EmptyMask { scene });
    }

    log::debug!(
        "Scene {}: {}x{} px, {} valid",
        scene,
        width,
        height,
        indices.vegetation.valid_count()
    );

    Ok(indices)
}

/// (a - b) / (a + b), defined only where the denominator is nonzero and the
/// pixel passes the mask.
fn normalized_difference(a: &Band, b: &Band, mask: &[bool]) -> IndexRaster {
    let data: Vec<f32> = a
        .data
        .iter()
        .zip(&b.data)
        .zip(mask)
        .map(|((&av, &bv), &ok)| {
            let denom = av + bv;
            if !ok || denom == 0.0 || !denom.is_finite() {
                f32::NAN
            } else {
                (av - bv) / denom
            }
        })
        .collect();
    IndexRaster {
        width: a.width,
        height: a.height,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(width: usize, height: usize, data: Vec<f32>) -> Band {
        Band::new(width, height, data)
    }

    #[test]
    fn normalized_difference_basic() {
        let a = band(2, 1, vec![3.0, 1.0]);
        let b = band(2, 1, vec![1.0, 1.0]);
        let r = normalized_difference(&a, &b, &[true, true]);
        assert_eq!(r.get(0, 0), 0.5);
        assert_eq!(r.get(0, 1), 0.0);
    }

    #[test]
    fn zero_denominator_is_invalid() {
        let a = band(1, 1, vec![1.0]);
        let b = band(1, 1, vec![-1.0]);
        let r = normalized_difference(&a, &b, &[true]);
        assert!(r.get(0, 0).is_nan());
        assert_eq!(r.valid_count(), 0);
    }

    fn write_scene_dir(name: &str, scl_class: u16, bands: &[&str]) -> std::path::PathBuf {
        use tiff::encoder::{colortype, TiffEncoder};

        let dir = std::env::temp_dir().join(format!(
            "terratone_scene_{}_{}",
            std::process::id(),
            name
        ));
        std::fs::create_dir_all(&dir).unwrap();
        for key in bands {
            let data: Vec<u16> = if *key == "SCL" {
                vec![scl_class; 4]
            } else {
                // Distinct per band so indices come out nonzero.
                let base = match *key {
                    "B03" => 200,
                    "B04" => 300,
                    "B08" => 600,
                    _ => 400,
                };
                vec![base; 4]
            };
            let path = dir.join(format!("T52SDG_20250420T021341_{}.tif", key));
            let file = std::fs::File::create(path).unwrap();
            let mut enc = TiffEncoder::new(file).unwrap();
            enc.write_image::<colortype::Gray16>(2, 2, &data).unwrap();
        }
        dir
    }

    fn source_for(dir: &std::path::Path) -> crate::scene::SceneSource {
        crate::scene::SceneSource {
            dir: dir.to_path_buf(),
            date: "20250420".to_string(),
            season: "Spring".to_string(),
        }
    }

    #[test]
    fn extract_scene_from_band_files() {
        let dir = write_scene_dir("ok", 4, &["B03", "B04", "B08", "B11", "SCL"]);
        let indices = extract_scene(&source_for(&dir)).unwrap();
        // vegetation = (600 - 300) / 900
        assert!((indices.vegetation.get(0, 0) - 1.0 / 3.0).abs() < 1e-6);
        // built-up = (400 - 600) / 1000
        assert!((indices.built_up.get(0, 0) + 0.2).abs() < 1e-6);
        // water = (200 - 600) / 800
        assert!((indices.water.get(0, 0) + 0.5).abs() < 1e-6);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_band_is_invalid_raster() {
        let dir = write_scene_dir("noband", 4, &["B03", "B04", "B08", "SCL"]);
        assert!(matches!(
            extract_scene(&source_for(&dir)),
            Err(ExtractError::InvalidRaster { .. })
        ));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn fully_masked_scene_is_empty_mask() {
        // SCL class 9 (cloud) everywhere: nothing valid remains.
        let dir = write_scene_dir("cloudy", 9, &["B03", "B04", "B08", "B11", "SCL"]);
        assert!(matches!(
            extract_scene(&source_for(&dir)),
            Err(ExtractError::EmptyMask { .. })
        ));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn masked_pixels_are_invalid() {
        let a = band(2, 1, vec![3.0, 3.0]);
        let b = band(2, 1, vec![1.0, 1.0]);
        let r = normalized_difference(&a, &b, &[true, false]);
        assert_eq!(r.valid_count(), 1);
        assert!(r.get(0, 1).is_nan());
    }
}
