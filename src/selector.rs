//! Low-quality cluster selection
//!
//! Turns aggregated tile matrices into the set of subtiles to clear:
//! - AUTO: statistical cutoff on the rate of low-quality reads
//! - USER: coordinates picked by the caller
//! - FILE: coordinates from a JSON manifest
//!
//! USER and FILE selections are checked against the aggregated tiles so
//! a manifest from another run cannot silently clear nothing.

use crate::aggregator::TileHeatmaps;
use crate::config::{SelectionMethod, TileQcConfig};
use crate::coordinates::{FlowCellRegistry, SubtileCoordinates};
use crate::error::{ConfigurationError, Result, UnknownTileError};
use crate::manifest::read_manifest;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

/// Standard deviations above the mean low-quality rate a cell must exceed
pub const AUTO_STDDEV_FACTOR: f64 = 2.0;

/// Where the selection comes from, with the data each strategy needs
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionStrategy {
    /// Rank cells of the matrices aggregated for `threshold`
    Auto { threshold: u32 },
    User(Vec<SubtileCoordinates>),
    File(PathBuf),
}

impl SelectionStrategy {
    /// Strategy described by `config`; `user` is consulted for USER only
    pub fn from_config(
        config: &TileQcConfig,
        user: &[SubtileCoordinates],
    ) -> std::result::Result<Self, ConfigurationError> {
        Ok(match config.selection_method {
            SelectionMethod::Auto => Self::Auto {
                threshold: config.effective_selection_threshold(),
            },
            SelectionMethod::User => Self::User(user.to_vec()),
            SelectionMethod::File => Self::File(
                config
                    .manifest_path
                    .clone()
                    .ok_or(ConfigurationError::MissingManifest)?,
            ),
        })
    }
}

/// Distribution of low-quality rates used by AUTO selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDistribution {
    /// Non-empty cells taken into account
    pub cells: usize,
    pub mean: f64,
    pub stddev: f64,
}

/// Low-quality cluster selector
pub struct LowQualitySelector {
    pub stddev_factor: f64,
}

impl Default for LowQualitySelector {
    fn default() -> Self {
        Self {
            stddev_factor: AUTO_STDDEV_FACTOR,
        }
    }
}

impl LowQualitySelector {
    pub fn new(stddev_factor: f64) -> Self {
        Self { stddev_factor }
    }

    /// Run `strategy` against the aggregated data
    pub fn select(
        &self,
        strategy: &SelectionStrategy,
        heatmaps: &TileHeatmaps,
        registry: &FlowCellRegistry,
    ) -> Result<BTreeSet<SubtileCoordinates>> {
        let selection = match strategy {
            SelectionStrategy::Auto { threshold } => self.auto_select(heatmaps, *threshold),
            SelectionStrategy::User(subtiles) => validate_selection(subtiles, heatmaps, registry)?,
            SelectionStrategy::File(path) => {
                let subtiles = read_manifest(path, registry)?;
                info!("Loaded {} subtiles from {}", subtiles.len(), path.display());
                validate_selection(&subtiles, heatmaps, registry)?
            }
        };
        info!("Selected {} low-quality subtiles", selection.len());
        Ok(selection)
    }

    /// Mean and population standard deviation of the rate over non-empty cells
    pub fn rate_distribution(&self, heatmaps: &TileHeatmaps, threshold: u32) -> RateDistribution {
        let rates: Vec<f64> = heatmaps
            .matrices(threshold)
            .flat_map(|matrix| matrix.cells())
            .filter(|(_, cell)| cell.read_count > 0)
            .map(|(_, cell)| cell.lowq_rate())
            .collect();

        if rates.is_empty() {
            return RateDistribution {
                cells: 0,
                mean: 0.0,
                stddev: 0.0,
            };
        }
        let n = rates.len() as f64;
        let mean = rates.iter().sum::<f64>() / n;
        let variance = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        RateDistribution {
            cells: rates.len(),
            mean,
            stddev: variance.sqrt(),
        }
    }

    /// Rate a cell must exceed to be selected, `None` when nothing can be selected
    pub fn auto_cutoff(&self, heatmaps: &TileHeatmaps, threshold: u32) -> Option<f64> {
        let distribution = self.rate_distribution(heatmaps, threshold);
        if distribution.cells == 0 || distribution.stddev == 0.0 {
            return None;
        }
        Some(distribution.mean + self.stddev_factor * distribution.stddev)
    }

    /// Cells whose low-quality rate lies above the cutoff
    pub fn auto_select(
        &self,
        heatmaps: &TileHeatmaps,
        threshold: u32,
    ) -> BTreeSet<SubtileCoordinates> {
        let Some(cutoff) = self.auto_cutoff(heatmaps, threshold) else {
            return BTreeSet::new();
        };
        info!("AUTO cutoff for Q{}: low-quality rate > {:.4}", threshold, cutoff);

        heatmaps
            .matrices(threshold)
            .flat_map(|matrix| matrix.cells())
            .filter(|(_, cell)| cell.read_count > 0)
            .filter(|(_, cell)| {
                let rate = cell.lowq_rate();
                rate > cutoff && rate > 0.0
            })
            .map(|(subtile, _)| subtile)
            .collect()
    }
}

/// Check caller-supplied subtiles against the aggregated tiles
pub fn validate_selection(
    subtiles: &[SubtileCoordinates],
    heatmaps: &TileHeatmaps,
    registry: &FlowCellRegistry,
) -> std::result::Result<BTreeSet<SubtileCoordinates>, UnknownTileError> {
    let size = heatmaps.matrix_size();
    subtiles
        .iter()
        .map(|subtile| {
            let tile = subtile.tile_coordinates();
            if !heatmaps.contains_tile(&tile) {
                return Err(UnknownTileError::Tile {
                    flow_cell: registry.name(tile.flow_cell).unwrap_or_default(),
                    lane: tile.lane,
                    tile: tile.tile,
                });
            }
            if subtile.x as usize >= size || subtile.y as usize >= size {
                return Err(UnknownTileError::Cell {
                    tile: tile.tile,
                    x: subtile.x,
                    y: subtile.y,
                    matrix_size: size,
                });
            }
            Ok(*subtile)
        })
        .collect()
}

/// Parse a user-picked subtile written as `FLOWCELL:LANE:TILE:X:Y`
///
/// The flow cell may be empty for legacy identifiers (`:1:120:3:4`).
pub fn parse_subtile_spec(
    spec: &str,
    registry: &FlowCellRegistry,
) -> std::result::Result<SubtileCoordinates, ConfigurationError> {
    let invalid = || ConfigurationError::SubtileSpec(spec.to_string());
    let fields: Vec<&str> = spec.trim().split(':').collect();
    let [flow_cell, lane, tile, x, y] = fields.as_slice() else {
        return Err(invalid());
    };
    let number = |field: &str| field.parse::<u32>().map_err(|_| invalid());
    let (lane, tile, x, y) = (number(*lane)?, number(*tile)?, number(*x)?, number(*y)?);
    Ok(SubtileCoordinates {
        flow_cell: registry.intern(flow_cell),
        lane,
        tile,
        x,
        y,
    })
}
