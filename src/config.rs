//! Processing options for heatmap aggregation and clearing
//!
//! The command-line tools fill a [`TileQcConfig`] and call
//! [`TileQcConfig::validate`] before touching any input file.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What happens to reads inside selected low-quality subtiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearMethod {
    /// Aggregate and select only, no output file
    #[default]
    None,
    /// Drop the read from the output
    Delete,
    /// Keep the read but replace every base with `N`
    Change,
}

impl ClearMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Delete => "delete",
            Self::Change => "change",
        }
    }
}

impl fmt::Display for ClearMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClearMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "delete" => Ok(Self::Delete),
            "change" => Ok(Self::Change),
            _ => Err(ConfigurationError::UnknownMethod {
                kind: "clearing",
                value: s.to_string(),
            }),
        }
    }
}

/// Where the set of low-quality subtiles comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Statistical cutoff over the aggregated matrices
    #[default]
    Auto,
    /// Coordinates handed over by the caller
    User,
    /// Coordinates read from a JSON manifest
    File,
}

impl FromStr for SelectionMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "user" => Ok(Self::User),
            "file" => Ok(Self::File),
            _ => Err(ConfigurationError::UnknownMethod {
                kind: "selection",
                value: s.to_string(),
            }),
        }
    }
}

/// Options shared by every file pipeline of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileQcConfig {
    /// Grid resolution per tile (matrix is `matrix_size x matrix_size`)
    pub matrix_size: usize,
    /// Mean read quality thresholds, one matrix set per threshold
    pub thresholds: Vec<u32>,
    /// Aggregate every n-th read only
    pub read_rate: usize,
    pub clear_method: ClearMethod,
    pub selection_method: SelectionMethod,
    /// Low-quality cluster manifest for [`SelectionMethod::File`]
    pub manifest_path: Option<PathBuf>,
    /// Threshold whose matrices drive AUTO selection, defaults to the first one
    pub selection_threshold: Option<u32>,
    /// Worker slots for multi-file runs
    pub threads: usize,
    /// Directory for cleared output, defaults to the input file's directory
    pub output_dir: Option<PathBuf>,
}

impl Default for TileQcConfig {
    fn default() -> Self {
        Self {
            matrix_size: 10,
            thresholds: vec![20],
            read_rate: 1,
            clear_method: ClearMethod::None,
            selection_method: SelectionMethod::Auto,
            manifest_path: None,
            selection_threshold: None,
            threads: 1,
            output_dir: None,
        }
    }
}

impl TileQcConfig {
    pub fn new(matrix_size: usize, thresholds: Vec<u32>, read_rate: usize) -> Self {
        Self {
            matrix_size,
            thresholds,
            read_rate,
            ..Self::default()
        }
    }

    pub fn with_clearing(
        mut self,
        clear_method: ClearMethod,
        selection_method: SelectionMethod,
    ) -> Self {
        self.clear_method = clear_method;
        self.selection_method = selection_method;
        self
    }

    pub fn with_manifest(mut self, manifest_path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(manifest_path.into());
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Check every option; the first problem found is returned
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("matrix size", self.matrix_size as i64)?;
        positive("read rate", self.read_rate as i64)?;
        positive("thread count", self.threads as i64)?;

        if self.thresholds.is_empty() {
            return Err(ConfigurationError::ThresholdSpec(String::new()));
        }
        for &threshold in &self.thresholds {
            positive("quality threshold", i64::from(threshold))?;
        }

        if self.selection_method == SelectionMethod::File && self.manifest_path.is_none() {
            return Err(ConfigurationError::MissingManifest);
        }
        if let Some(threshold) = self.selection_threshold {
            if !self.thresholds.contains(&threshold) {
                return Err(ConfigurationError::SelectionThreshold(threshold));
            }
        }
        Ok(())
    }

    /// Threshold used for AUTO selection
    pub fn effective_selection_threshold(&self) -> u32 {
        self.selection_threshold
            .or_else(|| self.thresholds.first().copied())
            .unwrap_or(20)
    }
}

fn positive(option: &'static str, value: i64) -> Result<(), ConfigurationError> {
    if value <= 0 {
        return Err(ConfigurationError::NonPositive { option, value });
    }
    Ok(())
}

/// Parse a threshold list such as `20`, `20,30` or `20-25,30`
///
/// Ranges are inclusive. The result is sorted and deduplicated.
pub fn parse_thresholds(spec: &str) -> Result<Vec<u32>, ConfigurationError> {
    let invalid = || ConfigurationError::ThresholdSpec(spec.to_string());
    let mut thresholds = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid());
        }
        match part.split_once('-') {
            Some((min, max)) => {
                let min: u32 = min.trim().parse().map_err(|_| invalid())?;
                let max: u32 = max.trim().parse().map_err(|_| invalid())?;
                if min > max {
                    return Err(ConfigurationError::ThresholdRange { min, max });
                }
                thresholds.extend(min..=max);
            }
            None => thresholds.push(part.parse().map_err(|_| invalid())?),
        }
    }

    if let Some(&zero) = thresholds.iter().find(|&&t| t == 0) {
        return Err(ConfigurationError::NonPositive {
            option: "quality threshold",
            value: i64::from(zero),
        });
    }
    thresholds.sort_unstable();
    thresholds.dedup();
    Ok(thresholds)
}
