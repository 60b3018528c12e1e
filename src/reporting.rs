//! Heatmap export and multi-file reporting
//!
//! - Per-file heatmap JSON (`sample.heatmaps.json`) with one grid per
//!   threshold and subtile property
//! - Per-file pipeline reports
//! - Batch summary across every file of a run

use crate::aggregator::{AggregationCounts, TileHeatmaps};
use crate::clearing::ClearingStats;
use crate::coordinates::{FlowCellRegistry, SubtileProperty};
use crate::error::{Error, Result};
use crate::matrix::TileExtent;
use crate::reads::SequenceFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Grids of one tile at one quality threshold, indexed `[y][x]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdHeatmap {
    pub threshold: u32,
    pub read_density: Vec<Vec<f64>>,
    pub average_quality: Vec<Vec<f64>>,
    pub rate_of_lowq_reads: Vec<Vec<f64>>,
    /// Only for aligned input
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mapping_quality: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileHeatmapReport {
    pub flow_cell: String,
    pub lane: u32,
    pub tile: u32,
    pub extent: TileExtent,
    pub reads: u64,
    pub heatmaps: Vec<ThresholdHeatmap>,
    /// Mean quality per base position
    pub base_quality: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapReport {
    pub input: PathBuf,
    pub matrix_size: usize,
    pub thresholds: Vec<u32>,
    pub counts: AggregationCounts,
    pub tiles: Vec<TileHeatmapReport>,
}

impl HeatmapReport {
    pub fn new(input: &Path, heatmaps: &TileHeatmaps, registry: &FlowCellRegistry) -> Self {
        let tiles = heatmaps
            .tiles()
            .map(|tile| {
                let layers: Vec<ThresholdHeatmap> = heatmaps
                    .thresholds()
                    .iter()
                    .filter_map(|&threshold| heatmaps.matrix(&tile, threshold))
                    .map(|matrix| ThresholdHeatmap {
                        threshold: matrix.threshold(),
                        read_density: matrix.grid(SubtileProperty::ReadDensity),
                        average_quality: matrix.grid(SubtileProperty::AverageQuality),
                        rate_of_lowq_reads: matrix.grid(SubtileProperty::RateOfLowqReads),
                        mapping_quality: matrix
                            .has_mapping_quality()
                            .then(|| matrix.grid(SubtileProperty::MappingQuality)),
                    })
                    .collect();
                let reads = heatmaps
                    .thresholds()
                    .first()
                    .and_then(|&t| heatmaps.matrix(&tile, t))
                    .map_or(0, |m| m.total_reads());

                TileHeatmapReport {
                    flow_cell: registry.name(tile.flow_cell).unwrap_or_default(),
                    lane: tile.lane,
                    tile: tile.tile,
                    extent: heatmaps.extent(&tile).copied().unwrap_or(TileExtent::at(0, 0)),
                    reads,
                    heatmaps: layers,
                    base_quality: heatmaps
                        .base_profile(&tile)
                        .map(|p| p.positions().map(|(_, q)| q).collect())
                        .unwrap_or_default(),
                }
            })
            .collect();

        Self {
            input: input.to_path_buf(),
            matrix_size: heatmaps.matrix_size(),
            thresholds: heatmaps.thresholds().to_vec(),
            counts: heatmaps.counts(),
            tiles,
        }
    }
}

/// `sample.heatmaps.json` next to the input or inside `output_dir`
pub fn heatmaps_path(input: &Path, output_dir: Option<&Path>) -> Result<PathBuf> {
    let parts = SequenceFormat::detect(input)?;
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(format!("{}.heatmaps.json", parts.stem)))
}

/// Write any report as pretty JSON
pub fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    let json_content = serde_json::to_string_pretty(value).map_err(|e| Error::io(path, e.into()))?;
    std::fs::write(path, json_content).map_err(|e| Error::io(path, e))
}

/// Outcome of one file pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub counts: AggregationCounts,
    pub tiles: usize,
    pub heatmaps: PathBuf,
    pub selected_subtiles: usize,
    /// Absent when the run only aggregated
    pub clearing: Option<ClearingStats>,
    pub cleared_output: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
}

impl FileReport {
    /// Fraction of all reads deleted or masked
    pub fn cleared_fraction(&self) -> f64 {
        match &self.clearing {
            Some(stats) if stats.total_reads > 0 => {
                stats.cleared_reads as f64 / stats.total_reads as f64
            }
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub input: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_files: usize,
    pub succeeded_files: usize,
    pub failed_files: usize,
    pub total_reads: u64,
    pub cleared_reads: u64,
    pub selected_subtiles: usize,
    /// Files whose cleared fraction exceeds the reporter limit
    pub flagged_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
    pub summary: BatchSummary,
}

/// Batch reporter for multi-file runs
pub struct BatchReporter {
    pub max_cleared_fraction: f64,
}

impl Default for BatchReporter {
    fn default() -> Self {
        Self {
            max_cleared_fraction: 0.1, // 10% of a file's reads
        }
    }
}

impl BatchReporter {
    pub fn new(max_cleared_fraction: f64) -> Self {
        Self {
            max_cleared_fraction,
        }
    }

    pub fn generate_report(&self, results: &[(PathBuf, Result<FileReport>)]) -> BatchReport {
        let mut files = Vec::new();
        let mut failures = Vec::new();
        for (input, result) in results {
            match result {
                Ok(report) => files.push(report.clone()),
                Err(e) => failures.push(FileFailure {
                    input: input.clone(),
                    error: e.to_string(),
                }),
            }
        }

        let summary = BatchSummary {
            total_files: results.len(),
            succeeded_files: files.len(),
            failed_files: failures.len(),
            total_reads: files.iter().map(|f| f.counts.total_reads).sum(),
            cleared_reads: files
                .iter()
                .filter_map(|f| f.clearing.as_ref())
                .map(|c| c.cleared_reads)
                .sum(),
            selected_subtiles: files.iter().map(|f| f.selected_subtiles).sum(),
            flagged_files: files
                .iter()
                .filter(|f| !self.evaluate_file(f))
                .map(|f| f.input.clone())
                .collect(),
        };

        BatchReport {
            files,
            failures,
            summary,
        }
    }

    pub fn export_json<P: AsRef<Path>>(&self, report: &BatchReport, path: P) -> Result<()> {
        write_json(report, path)
    }

    /// False when too much of the file was cleared
    pub fn evaluate_file(&self, report: &FileReport) -> bool {
        report.cleared_fraction() <= self.max_cleared_fraction
    }
}
