//! Tile QC Tools
//!
//! Flow-cell tile quality heatmaps and low-quality cluster clearing for
//! Illumina reads (FASTQ, SAM or BAM).
//!
//! This library provides shared functionality for:
//! - Hierarchical flow-cell coordinates and read identifier parsing
//! - Per-tile quality matrices over a configurable grid
//! - Low-quality subtile selection (AUTO, USER, FILE)
//! - Clearing of selected reads (DELETE, CHANGE) with JSON manifests
//! - Heatmap export and multi-file reporting

pub mod aggregator;
pub mod cancel;
pub mod clearing;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod manifest;
pub mod matrix;
pub mod parser;
pub mod pipeline;
pub mod reads;
pub mod reporting;
pub mod selector;

pub use aggregator::{TileHeatmaps, TileQualityAggregator};
pub use cancel::CancellationToken;
pub use clearing::{ClearedPaths, ClearingEngine, ClearingStats};
pub use config::{parse_thresholds, ClearMethod, SelectionMethod, TileQcConfig};
pub use coordinates::{
    Coordinates, FlowCellId, FlowCellRegistry, SequenceCoordinates, SubtileCoordinates,
    TileCoordinates,
};
pub use error::{Error, Result};
pub use parser::parse_identifier;
pub use pipeline::TilePipeline;
pub use reporting::{BatchReporter, FileReport};
pub use selector::{parse_subtile_spec, LowQualitySelector, SelectionStrategy};
