use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::AppConfig;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Raw data directory {0} does not exist")]
    MissingRawDir(String),
    #[error("No scenes found under {0}")]
    NoScenes(String),
}

/// One scene directory on disk: a set of band GeoTIFFs for one acquisition.
#[derive(Debug, Clone)]
pub struct SceneSource {
    pub dir: PathBuf,
    /// Acquisition date, YYYYMMDD, parsed from band filenames.
    pub date: String,
    /// Season label derived from the acquisition month.
    pub season: String,
}

impl SceneSource {
    /// Human-facing scene label, carried into the persisted score.
    pub fn label(&self) -> String {
        format!("{}_{}", self.season, self.date)
    }

    /// Locate the band file whose name contains the given key (e.g. "B08").
    pub fn band_path(&self, key: &str) -> Option<PathBuf> {
        std::fs::read_dir(&self.dir).ok()?.find_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(key) && name.to_lowercase().ends_with(".tif") {
                Some(entry.path())
            } else {
                None
            }
        })
    }
}

/// Northern-hemisphere meteorological seasons from the acquisition month.
pub fn season_of(date: &str) -> &'static str {
    let month: u32 = date.get(4..6).and_then(|m| m.parse().ok()).unwrap_or(0);
    match month {
        3..=5 => "Spring",
        6..=8 => "Summer",
        9..=11 => "Autumn",
        _ => "Winter",
    }
}

/// Discover scene directories under the configured raw directory and return
/// them in score order: the configured season order, ties broken by
/// acquisition date. Scenes whose season is not in the order list are
/// dropped with a warning — never silently.
pub fn discover_scenes(config: &AppConfig) -> Result<Vec<SceneSource>, DiscoveryError> {
    if !config.raw_dir.is_dir() {
        return Err(DiscoveryError::MissingRawDir(
            config.raw_dir.display().to_string(),
        ));
    }

    let date_re = Regex::new(r"_(\d{8})T").unwrap();
    let mut scenes: Vec<SceneSource> = Vec::new();

    for entry in WalkDir::new(&config.raw_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(scene) = scene_from_dir(entry.path(), &date_re) {
            scenes.push(scene);
        } else {
            log::warn!(
                "Skipping {}: no band file with a parseable acquisition date",
                entry.path().display()
            );
        }
    }

    if scenes.is_empty() {
        return Err(DiscoveryError::NoScenes(config.raw_dir.display().to_string()));
    }

    order_scenes(&mut scenes, &config.season_order);
    Ok(scenes)
}

fn scene_from_dir(dir: &Path, date_re: &Regex) -> Option<SceneSource> {
    let date = std::fs::read_dir(dir).ok()?.find_map(|entry| {
        let entry = entry.ok()?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.to_lowercase().ends_with(".tif") {
            return None;
        }
        date_re
            .captures(&name)
            .map(|c| c.get(1).unwrap().as_str().to_string())
    })?;
    let season = season_of(&date).to_string();
    Some(SceneSource {
        dir: dir.to_path_buf(),
        date,
        season,
    })
}

/// Sort scenes into the requested seasonal order (strict total order:
/// season rank, then date). Unlisted seasons are dropped.
fn order_scenes(scenes: &mut Vec<SceneSource>, season_order: &[String]) {
    scenes.retain(|s| {
        let keep = season_order.iter().any(|o| o == &s.season);
        if !keep {
            log::warn!(
                "Dropping scene {} — season {:?} not in configured order",
                s.dir.display(),
                s.season
            );
        }
        keep
    });
    scenes.sort_by_key(|s| {
        let rank = season_order.iter().position(|o| o == &s.season).unwrap();
        (rank, s.date.clone())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_from_month() {
        assert_eq!(season_of("20250415"), "Spring");
        assert_eq!(season_of("20250701"), "Summer");
        assert_eq!(season_of("20251010"), "Autumn");
        assert_eq!(season_of("20250115"), "Winter");
        assert_eq!(season_of("20251215"), "Winter");
    }

    #[test]
    fn ordering_follows_season_then_date() {
        let mk = |date: &str| SceneSource {
            dir: PathBuf::from("/tmp"),
            date: date.to_string(),
            season: season_of(date).to_string(),
        };
        let mut scenes = vec![mk("20250115"), mk("20250701"), mk("20250420"), mk("20250410")];
        let order: Vec<String> = ["Spring", "Summer", "Autumn", "Winter"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        order_scenes(&mut scenes, &order);
        let dates: Vec<&str> = scenes.iter().map(|s| s.date.as_str()).collect();
        assert_eq!(dates, vec!["20250410", "20250420", "20250701", "20250115"]);
    }

    #[test]
    fn unlisted_season_is_dropped() {
        let mut scenes = vec![SceneSource {
            dir: PathBuf::from("/tmp"),
            date: "20250701".to_string(),
            season: "Summer".to_string(),
        }];
        order_scenes(&mut scenes, &["Winter".to_string()]);
        assert!(scenes.is_empty());
    }
}
