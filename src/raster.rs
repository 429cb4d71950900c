use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TIFF decode error in {path}: {message}")]
    Decode { path: String, message: String },
    #[error("Unsupported sample format in {path}")]
    UnsupportedFormat { path: String },
}

/// One decoded single-band raster, row-major f32.
#[derive(Debug, Clone)]
pub struct Band {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Band {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Nearest-neighbor resample to a target shape. Band resolutions differ
    /// between spectral bands (10m vs 20m), so everything is brought to the
    /// reference band's grid before index math.
    pub fn resample_nearest(&self, height: usize, width: usize) -> Band {
        if (self.height, self.width) == (height, width) {
            return self.clone();
        }
        let mut data = Vec::with_capacity(width * height);
        for r in 0..height {
            let sr = (r * self.height) / height;
            for c in 0..width {
                let sc = (c * self.width) / width;
                data.push(self.get(sr, sc));
            }
        }
        Band::new(width, height, data)
    }
}

/// Decode the first image of a GeoTIFF into an f32 band.
pub fn read_band(path: &Path) -> Result<Band, RasterError> {
    let file = File::open(path).map_err(|e| RasterError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| RasterError::Decode {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let (width, height) = decoder.dimensions().map_err(|e| RasterError::Decode {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let image = decoder.read_image().map_err(|e| RasterError::Decode {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let data: Vec<f32> = match image {
        DecodingResult::U8(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U16(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I16(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => {
            return Err(RasterError::UnsupportedFormat {
                path: path.display().to_string(),
            })
        }
    };

    if data.len() != (width as usize) * (height as usize) {
        return Err(RasterError::Decode {
            path: path.display().to_string(),
            message: format!(
                "pixel count {} does not match {}x{}",
                data.len(),
                width,
                height
            ),
        });
    }

    Ok(Band::new(width as usize, height as usize, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity_is_clone() {
        let b = Band::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let r = b.resample_nearest(2, 2);
        assert_eq!(r.data, b.data);
    }

    #[test]
    fn resample_upscales_nearest() {
        let b = Band::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let r = b.resample_nearest(4, 4);
        assert_eq!(r.shape(), (4, 4));
        assert_eq!(r.get(0, 0), 1.0);
        assert_eq!(r.get(0, 3), 2.0);
        assert_eq!(r.get(3, 0), 3.0);
        assert_eq!(r.get(3, 3), 4.0);
    }

    #[test]
    fn read_band_round_trip() {
        use tiff::encoder::{colortype, TiffEncoder};

        let path = std::env::temp_dir().join(format!("terratone_band_{}.tif", std::process::id()));
        let data: Vec<u16> = vec![0, 100, 200, 300, 400, 500];
        {
            let file = File::create(&path).unwrap();
            let mut enc = TiffEncoder::new(file).unwrap();
            enc.write_image::<colortype::Gray16>(3, 2, &data).unwrap();
        }
        let band = read_band(&path).unwrap();
        assert_eq!(band.shape(), (2, 3));
        assert_eq!(band.get(0, 1), 100.0);
        assert_eq!(band.get(1, 2), 500.0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn read_band_missing_file() {
        let r = read_band(Path::new("/nonexistent/band.tif"));
        assert!(matches!(r, Err(RasterError::Io { .. })));
    }

    #[test]
    fn resample_downscales() {
        let b = Band::new(4, 4, (0..16).map(|i| i as f32).collect());
        let r = b.resample_nearest(2, 2);
        assert_eq!(r.shape(), (2, 2));
        assert_eq!(r.get(0, 0), 0.0);
        assert_eq!(r.get(1, 1), 10.0);
    }
}
