use serde::{Deserialize, Serialize};

use crate::extract::{IndexRaster, IndexSet};

/// Index thresholds for the coverage gauges (tuned: vegetation relaxed to
/// catch spring sprouts, built-up raised to reject bare ground).
pub const VEG_THRESHOLD: f32 = 0.2;
pub const BUILT_THRESHOLD: f32 = 0.05;
pub const WATER_THRESHOLD: f32 = 0.0;

/// Per-scene numeric features: one value per scanline bucket per index,
/// rows top-to-bottom. Always exactly `bucket_count` long — empty buckets
/// inherit the nearest populated bucket's value so downstream statistics
/// never see a hole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub vegetation: Vec<f64>,
    pub built_up: Vec<f64>,
    pub water: Vec<f64>,
    /// Fraction of valid pixels per bucket above each index threshold.
    /// Drives the video gauges only, never the music.
    pub coverage: Vec<Coverage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub vegetation: f64,
    pub built_up: f64,
    pub water: f64,
}

/// Reduce one scene's index rasters to a Frame of `bucket_count` scanline
/// buckets.
pub fn aggregate(indices: &IndexSet, bucket_count: usize) -> Frame {
    Frame {
        vegetation: bucket_means(&indices.vegetation, bucket_count),
        built_up: bucket_means(&indices.built_up, bucket_count),
        water: bucket_means(&indices.water, bucket_count),
        coverage: bucket_coverage(indices, bucket_count),
    }
}

/// Mean of valid pixels per row-group bucket, with edge-hold fill.
fn bucket_means(raster: &IndexRaster, bucket_count: usize) -> Vec<f64> {
    let mut sums = vec![0.0f64; bucket_count];
    let mut counts = vec![0usize; bucket_count];

    for row in 0..raster.height {
        let bucket = row * bucket_count / raster.height.max(1);
        for col in 0..raster.width {
            let v = raster.get(row, col);
            if v.is_finite() {
                sums[bucket] += v as f64;
                counts[bucket] += 1;
            }
        }
    }

    let means: Vec<Option<f64>> = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| if c > 0 { Some(s / c as f64) } else { None })
        .collect();

    edge_hold(&means)
}

/// Replace each empty bucket with the value of the nearest populated bucket
/// (ties go to the earlier one). An all-empty frame becomes all zeros; the
/// extractor's empty-mask check makes that unreachable in the pipeline.
fn edge_hold(values: &[Option<f64>]) -> Vec<f64> {
    let populated: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_some()).collect();
    if populated.is_empty() {
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            Some(x) => *x,
            None => {
                let nearest = populated
                    .iter()
                    .min_by_key(|&&p| (p.abs_diff(i), p))
                    .unwrap();
                values[*nearest].unwrap()
            }
        })
        .collect()
}

/// Per-bucket fraction of valid pixels above each index threshold.
fn bucket_coverage(indices: &IndexSet, bucket_count: usize) -> Vec<Coverage> {
    let veg = threshold_fractions(&indices.vegetation, bucket_count, VEG_THRESHOLD);
    let built = threshold_fractions(&indices.built_up, bucket_count, BUILT_THRESHOLD);
    let water = threshold_fractions(&indices.water, bucket_count, WATER_THRESHOLD);
    veg.into_iter()
        .zip(built)
        .zip(water)
        .map(|((vegetation, built_up), water)| Coverage {
            vegetation,
            built_up,
            water,
        })
        .collect()
}

fn threshold_fractions(raster: &IndexRaster, bucket_count: usize, threshold: f32) -> Vec<f64> {
    let mut above = vec![0usize; bucket_count];
    let mut valid = vec![0usize; bucket_count];
    for row in 0..raster.height {
        let bucket = row * bucket_count / raster.height.max(1);
        for col in 0..raster.width {
            let v = raster.get(row, col);
            if v.is_finite() {
                valid[bucket] += 1;
                if v > threshold {
                    above[bucket] += 1;
                }
            }
        }
    }
    above
        .iter()
        .zip(&valid)
        .map(|(&a, &v)| if v > 0 { a as f64 / v as f64 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::IndexRaster;

    fn raster(width: usize, height: usize, data: Vec<f32>) -> IndexRaster {
        assert_eq!(data.len(), width * height);
        IndexRaster {
            width,
            height,
            data,
        }
    }

    #[test]
    fn frame_length_equals_bucket_count() {
        let r = raster(2, 8, vec![0.5; 16]);
        for buckets in [1, 3, 8, 13] {
            let means = bucket_means(&r, buckets);
            assert_eq!(means.len(), buckets);
        }
    }

    #[test]
    fn bucket_means_are_row_group_means() {
        // 4 rows, 1 col, 2 buckets: rows {0,1} and {2,3}.
        let r = raster(1, 4, vec![0.0, 1.0, 2.0, 3.0]);
        let means = bucket_means(&r, 2);
        assert_eq!(means, vec![0.5, 2.5]);
    }

    #[test]
    fn empty_bucket_inherits_nearest_value() {
        // Middle rows entirely NaN: bucket 1 of 3 is empty and must take a
        // neighbor's value, not produce a gap.
        let mut data = vec![0.2f32; 6];
        data[2] = f32::NAN;
        data[3] = f32::NAN;
        data[4] = 0.8;
        data[5] = 0.8;
        let r = raster(1, 6, data);
        let means = bucket_means(&r, 3);
        assert_eq!(means.len(), 3);
        assert_eq!(means[0], 0.2f32 as f64);
        // Nearest populated bucket, earlier on tie.
        assert_eq!(means[1], means[0]);
        assert_eq!(means[2], 0.8f32 as f64);
    }

    #[test]
    fn edge_hold_fills_leading_and_trailing() {
        let v = edge_hold(&[None, Some(1.0), None, None]);
        assert_eq!(v, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn edge_hold_prefers_nearest() {
        let v = edge_hold(&[Some(1.0), None, None, Some(4.0)]);
        assert_eq!(v, vec![1.0, 1.0, 4.0, 4.0]);
    }

    #[test]
    fn all_empty_is_zeros() {
        let v = edge_hold(&[None, None]);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn coverage_counts_thresholded_pixels() {
        // One bucket, 4 valid pixels, 2 above the vegetation threshold.
        let veg = raster(4, 1, vec![0.5, 0.3, 0.1, 0.0]);
        let fr = threshold_fractions(&veg, 1, VEG_THRESHOLD);
        assert_eq!(fr, vec![0.5]);
    }
}
