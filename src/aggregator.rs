//! Tile quality aggregation (first pass)
//!
//! Streams reads once and builds, for every quality threshold and every
//! observed tile, a `matrix_size x matrix_size` grid of subtile statistics.
//!
//! Tile extents are only known once a tile's last read has been seen, so
//! reads are buffered per tile as compact points and binned when the pass
//! is finished. Binning then depends only on the set of a tile's reads,
//! never on their arrival order.

use crate::cancel::CancellationToken;
use crate::config::TileQcConfig;
use crate::coordinates::{
    FlowCellRegistry, SequenceCoordinates, SubtileCoordinates, TileBpCoordinates,
    TileCoordinates,
};
use crate::error::{Error, Result};
use crate::matrix::{QualityMatrix, TileExtent};
use crate::parser::parse_identifier;
use crate::reads::{ReadRecord, ReadSource};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Read counters of one aggregation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationCounts {
    /// Primary records of the source
    pub total_reads: u64,
    /// Secondary and supplementary alignments, left out of every count below
    #[serde(default)]
    pub secondary_alignments: u64,
    /// Records kept by the sampling rate
    pub sampled_reads: u64,
    /// Sampled records with a parseable position
    pub located_reads: u64,
    /// Sampled records whose identifier matched no dialect
    pub unlocated_reads: u64,
}

#[derive(Debug, Clone, Copy)]
struct ReadPoint {
    x: u32,
    y: u32,
    mean_quality: Option<f64>,
    mapping_quality: Option<u8>,
}

impl ReadPoint {
    fn sort_key(&self, other: &Self) -> Ordering {
        let quality = match (self.mean_quality, other.mean_quality) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (a, b) => a.is_some().cmp(&b.is_some()),
        };
        (self.x, self.y)
            .cmp(&(other.x, other.y))
            .then(quality)
            .then(self.mapping_quality.cmp(&other.mapping_quality))
    }
}

#[derive(Debug)]
struct TileBuffer {
    extent: TileExtent,
    points: Vec<ReadPoint>,
    profile: Vec<BaseQuality>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct BaseQuality {
    sum: u64,
    count: u64,
}

/// Mean quality per sequencing cycle of one tile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileBaseProfile {
    #[serde(skip)]
    tile: TileCoordinates,
    mean_quality: Vec<f64>,
}

impl TileBaseProfile {
    fn from_sums(tile: TileCoordinates, sums: &[BaseQuality]) -> Self {
        let mean_quality = sums
            .iter()
            .map(|b| {
                if b.count == 0 {
                    0.0
                } else {
                    b.sum as f64 / b.count as f64
                }
            })
            .collect();
        Self { tile, mean_quality }
    }

    pub fn tile(&self) -> TileCoordinates {
        self.tile
    }

    /// Number of base positions observed
    pub fn len(&self) -> usize {
        self.mean_quality.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean_quality.is_empty()
    }

    pub fn mean_quality(&self, position: TileBpCoordinates) -> Option<f64> {
        if position.tile_coordinates() != self.tile {
            return None;
        }
        self.mean_quality.get(position.base_position as usize).copied()
    }

    pub fn positions(&self) -> impl Iterator<Item = (TileBpCoordinates, f64)> + '_ {
        self.mean_quality
            .iter()
            .enumerate()
            .map(|(i, &q)| (self.tile.base_position(i as u32), q))
    }
}

/// Streaming accumulator for one input file
pub struct TileQualityAggregator {
    registry: Arc<FlowCellRegistry>,
    matrix_size: usize,
    thresholds: Vec<u32>,
    read_rate: u64,
    tiles: HashMap<TileCoordinates, TileBuffer>,
    counts: AggregationCounts,
}

impl TileQualityAggregator {
    pub fn new(registry: Arc<FlowCellRegistry>, config: &TileQcConfig) -> Self {
        Self {
            registry,
            matrix_size: config.matrix_size,
            thresholds: config.thresholds.clone(),
            read_rate: config.read_rate.max(1) as u64,
            tiles: HashMap::new(),
            counts: AggregationCounts::default(),
        }
    }

    /// Account for one record; only every `read_rate`-th primary record is used
    pub fn add_record(&mut self, record: &ReadRecord) {
        if !record.is_primary() {
            self.counts.secondary_alignments += 1;
            return;
        }
        self.counts.total_reads += 1;
        if (self.counts.total_reads - 1) % self.read_rate != 0 {
            return;
        }
        self.counts.sampled_reads += 1;

        match parse_identifier(&record.identifier(), &self.registry) {
            Ok(coordinates) => {
                self.counts.located_reads += 1;
                self.add_located(coordinates, record);
            }
            Err(e) => {
                self.counts.unlocated_reads += 1;
                if self.counts.unlocated_reads == 1 {
                    debug!("Read {:?} has no tile position: {}", record.identifier(), e);
                }
            }
        }
    }

    fn add_located(&mut self, coordinates: SequenceCoordinates, record: &ReadRecord) {
        let buffer = self
            .tiles
            .entry(coordinates.tile_coordinates())
            .or_insert_with(|| TileBuffer {
                extent: TileExtent::at(coordinates.x, coordinates.y),
                points: Vec::new(),
                profile: Vec::new(),
            });

        buffer.extent.include(coordinates.x, coordinates.y);
        buffer.points.push(ReadPoint {
            x: coordinates.x,
            y: coordinates.y,
            mean_quality: record.mean_quality(),
            mapping_quality: record.mapping_quality,
        });

        let read_length = record.quality.as_ref().map_or(0, Vec::len);
        if buffer.profile.len() < read_length {
            buffer.profile.resize(read_length, BaseQuality::default());
        }
        for (slot, phred) in buffer.profile.iter_mut().zip(record.phred_scores()) {
            slot.sum += u64::from(phred);
            slot.count += 1;
        }
    }

    /// Consume a whole source, checking `cancel` periodically
    pub fn aggregate_source(
        &mut self,
        source: ReadSource,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = source.path().to_path_buf();
        let mut processed = 0u64;
        for record in source {
            let record = record?;
            self.add_record(&record);
            processed += 1;
            if cancel.should_stop(processed) {
                return Err(Error::Cancelled(path));
            }
        }
        info!(
            "Aggregated {} reads from {} ({} sampled, {} without position, {} tiles)",
            self.counts.total_reads,
            path.display(),
            self.counts.sampled_reads,
            self.counts.unlocated_reads,
            self.tiles.len()
        );
        Ok(())
    }

    pub fn counts(&self) -> AggregationCounts {
        self.counts
    }

    /// Bin every buffered read and freeze the result
    pub fn finish(self) -> TileHeatmaps {
        let mut extents = BTreeMap::new();
        let mut matrices = BTreeMap::new();
        let mut base_profiles = BTreeMap::new();

        for (tile, mut buffer) in self.tiles {
            // Sorted so floating-point sums do not depend on arrival order
            buffer.points.sort_unstable_by(|a, b| a.sort_key(b));

            for &threshold in &self.thresholds {
                let mut matrix = QualityMatrix::new(tile, threshold, self.matrix_size);
                for point in &buffer.points {
                    let (x, y) = buffer.extent.bin(point.x, point.y, self.matrix_size);
                    matrix.add_read(x, y, point.mean_quality, point.mapping_quality);
                }
                matrices.insert((tile, threshold), matrix);
            }

            base_profiles.insert(tile, TileBaseProfile::from_sums(tile, &buffer.profile));
            extents.insert(tile, buffer.extent);
        }

        TileHeatmaps {
            matrix_size: self.matrix_size,
            thresholds: self.thresholds,
            extents,
            matrices,
            base_profiles,
            counts: self.counts,
        }
    }
}

/// Frozen result of the aggregation pass
#[derive(Debug, Clone)]
pub struct TileHeatmaps {
    matrix_size: usize,
    thresholds: Vec<u32>,
    extents: BTreeMap<TileCoordinates, TileExtent>,
    matrices: BTreeMap<(TileCoordinates, u32), QualityMatrix>,
    base_profiles: BTreeMap<TileCoordinates, TileBaseProfile>,
    counts: AggregationCounts,
}

impl TileHeatmaps {
    pub fn matrix_size(&self) -> usize {
        self.matrix_size
    }

    pub fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    pub fn counts(&self) -> AggregationCounts {
        self.counts
    }

    /// Observed tiles in coordinate order
    pub fn tiles(&self) -> impl Iterator<Item = TileCoordinates> + '_ {
        self.extents.keys().copied()
    }

    pub fn contains_tile(&self, tile: &TileCoordinates) -> bool {
        self.extents.contains_key(tile)
    }

    pub fn extent(&self, tile: &TileCoordinates) -> Option<&TileExtent> {
        self.extents.get(tile)
    }

    pub fn matrix(&self, tile: &TileCoordinates, threshold: u32) -> Option<&QualityMatrix> {
        self.matrices.get(&(*tile, threshold))
    }

    /// Matrices of every tile for one threshold
    pub fn matrices(&self, threshold: u32) -> impl Iterator<Item = &QualityMatrix> + '_ {
        self.matrices
            .iter()
            .filter(move |((_, t), _)| *t == threshold)
            .map(|(_, matrix)| matrix)
    }

    pub fn base_profile(&self, tile: &TileCoordinates) -> Option<&TileBaseProfile> {
        self.base_profiles.get(tile)
    }

    /// Subtile a read position falls into, using the finalized extents
    pub fn locate(&self, coordinates: &SequenceCoordinates) -> Option<SubtileCoordinates> {
        let tile = coordinates.tile_coordinates();
        let extent = self.extents.get(&tile)?;
        let (x, y) = extent.bin(coordinates.x, coordinates.y, self.matrix_size);
        Some(tile.subtile(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CANCEL_CHECK_INTERVAL;
    use crate::coordinates::SubtileProperty;
    use crate::reads::Compression;
    use std::io::Cursor;
    use std::path::Path;

    fn record(id: &str, quality: &[u8]) -> ReadRecord {
        ReadRecord::new(id, &vec![b'A'; quality.len()], quality)
    }

    fn reads() -> Vec<ReadRecord> {
        let mut reads = Vec::new();
        for x in 0..10u32 {
            for y in 0..10u32 {
                // bottom-right corner of tile 11 is poor quality
                let quality: &[u8] = if x >= 8 && y >= 8 { b"++++" } else { b"IIII" };
                reads.push(record(
                    &format!("I:R:FC1:1:11:{}:{} 1:N:0:A", x * 100, y * 100),
                    quality,
                ));
            }
        }
        reads.push(record("I:R:FC1:1:12:5:5 1:N:0:A", b"IIII"));
        reads.push(record("not-a-position", b"IIII"));
        reads
    }

    fn aggregate(
        reads: &[ReadRecord],
        config: &TileQcConfig,
    ) -> (Arc<FlowCellRegistry>, TileHeatmaps) {
        let registry = Arc::new(FlowCellRegistry::new());
        let mut aggregator = TileQualityAggregator::new(registry.clone(), config);
        for read in reads {
            aggregator.add_record(read);
        }
        (registry, aggregator.finish())
    }

    #[test]
    fn test_density_sums_to_tile_reads() {
        let config = TileQcConfig::new(5, vec![20, 30], 1);
        let (registry, heatmaps) = aggregate(&reads(), &config);
        let fc = registry.lookup("FC1").unwrap();
        let tile11 = TileCoordinates { flow_cell: fc, lane: 1, tile: 11 };
        let tile12 = TileCoordinates { flow_cell: fc, lane: 1, tile: 12 };

        assert_eq!(heatmaps.tiles().count(), 2);
        for threshold in [20, 30] {
            assert_eq!(heatmaps.matrix(&tile11, threshold).unwrap().total_reads(), 100);
            assert_eq!(heatmaps.matrix(&tile12, threshold).unwrap().total_reads(), 1);
        }
        assert_eq!(heatmaps.matrices(20).count(), 2);

        let counts = heatmaps.counts();
        assert_eq!(counts.total_reads, 102);
        assert_eq!(counts.located_reads, 101);
        assert_eq!(counts.unlocated_reads, 1);
    }

    #[test]
    fn test_low_quality_corner_is_visible() {
        let config = TileQcConfig::new(5, vec![20], 1);
        let (registry, heatmaps) = aggregate(&reads(), &config);
        let tile = TileCoordinates {
            flow_cell: registry.lookup("FC1").unwrap(),
            lane: 1,
            tile: 11,
        };
        let matrix = heatmaps.matrix(&tile, 20).unwrap();
        // x, y in 0..=900 over 5 cells: 800 and 900 land in cell 4
        let corner = matrix.properties(4, 4).unwrap();
        assert_eq!(corner.get(SubtileProperty::ReadDensity), Some(4.0));
        assert_eq!(corner.get(SubtileProperty::RateOfLowqReads), Some(1.0));
        assert_eq!(corner.get(SubtileProperty::AverageQuality), Some(10.0));
        let other = matrix.properties(0, 0).unwrap();
        assert_eq!(other.get(SubtileProperty::RateOfLowqReads), Some(0.0));
        assert_eq!(other.get(SubtileProperty::AverageQuality), Some(40.0));
    }

    #[test]
    fn test_sampling_keeps_every_nth_read() {
        let config = TileQcConfig::new(5, vec![20], 3);
        let (_, heatmaps) = aggregate(&reads(), &config);
        let counts = heatmaps.counts();
        assert_eq!(counts.total_reads, 102);
        assert_eq!(counts.sampled_reads, 34);
        let assigned: u64 = heatmaps.matrices(20).map(|m| m.total_reads()).sum();
        assert_eq!(assigned, counts.located_reads);
    }

    #[test]
    fn test_order_independent_result() {
        let config = TileQcConfig::new(7, vec![20, 25], 1);
        let forward = reads();
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut interleaved: Vec<ReadRecord> = forward.iter().step_by(2).cloned().collect();
        interleaved.extend(forward.iter().skip(1).step_by(2).cloned());

        let (_, a) = aggregate(&forward, &config);
        for permuted in [reversed, interleaved] {
            let (_, b) = aggregate(&permuted, &config);
            for tile in a.tiles() {
                assert_eq!(a.extent(&tile), b.extent(&tile));
                for threshold in [20, 25] {
                    assert_eq!(a.matrix(&tile, threshold), b.matrix(&tile, threshold));
                }
            }
        }
    }

    #[test]
    fn test_locate_uses_final_extent() {
        let config = TileQcConfig::new(10, vec![20], 1);
        let (registry, heatmaps) = aggregate(&reads(), &config);
        let fc = registry.lookup("FC1").unwrap();
        let located = heatmaps
            .locate(&SequenceCoordinates { flow_cell: fc, lane: 1, tile: 11, x: 900, y: 0 })
            .unwrap();
        assert_eq!((located.x, located.y), (9, 0));
        assert!(heatmaps
            .locate(&SequenceCoordinates { flow_cell: fc, lane: 2, tile: 11, x: 0, y: 0 })
            .is_none());
    }

    #[test]
    fn test_base_profile() {
        let config = TileQcConfig::default();
        let reads = vec![
            record("I:R:FC1:1:11:1:1", b"I+"),
            record("I:R:FC1:1:11:2:2", b"+++"),
        ];
        let (registry, heatmaps) = aggregate(&reads, &config);
        let tile = TileCoordinates {
            flow_cell: registry.lookup("FC1").unwrap(),
            lane: 1,
            tile: 11,
        };
        let profile = heatmaps.base_profile(&tile).unwrap();
        assert_eq!(profile.len(), 3);
        assert_eq!(profile.mean_quality(tile.base_position(0)), Some(25.0));
        assert_eq!(profile.mean_quality(tile.base_position(1)), Some(10.0));
        assert_eq!(profile.mean_quality(tile.base_position(2)), Some(10.0));
        assert_eq!(profile.mean_quality(tile.base_position(3)), None);
    }

    #[test]
    fn test_secondary_and_unqualified_records() {
        let primary = record("I:R:FC1:1:11:10:10", b"IIII");
        let mut secondary = ReadRecord::new("I:R:FC1:1:11:10:10", b"", b"");
        secondary.quality = None;
        secondary.flags = 0x100;
        let mut supplementary = record("I:R:FC1:1:11:900:900", b"++++");
        supplementary.flags = 0x800;
        let mut unqualified = ReadRecord::new("I:R:FC1:1:11:10:10", b"ACGT", b"");
        unqualified.quality = None;

        let config = TileQcConfig::new(2, vec![20], 1);
        let reads = [primary, secondary, supplementary, unqualified];
        let (registry, heatmaps) = aggregate(&reads, &config);
        let counts = heatmaps.counts();
        assert_eq!(counts.total_reads, 2);
        assert_eq!(counts.secondary_alignments, 2);

        let tile = TileCoordinates {
            flow_cell: registry.lookup("FC1").unwrap(),
            lane: 1,
            tile: 11,
        };
        // the supplementary record does not widen the extent
        assert_eq!(heatmaps.extent(&tile), Some(&TileExtent::at(10, 10)));
        let cell = heatmaps.matrix(&tile, 20).unwrap().properties(0, 0).unwrap();
        assert_eq!(cell.get(SubtileProperty::ReadDensity), Some(2.0));
        assert_eq!(cell.get(SubtileProperty::AverageQuality), Some(40.0));
        assert_eq!(cell.get(SubtileProperty::RateOfLowqReads), Some(0.0));
    }

    #[test]
    fn test_cancelled_aggregation_stops() {
        let mut text = String::new();
        for i in 0..CANCEL_CHECK_INTERVAL + 10 {
            text.push_str(&format!("@I:R:FC1:1:11:{i}:{i}\nACGT\n+\nIIII\n"));
        }
        let source = ReadSource::from_reader(
            Path::new("reads.fastq"),
            Box::new(Cursor::new(text.into_bytes())),
            Compression::None,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let registry = Arc::new(FlowCellRegistry::new());
        let config = TileQcConfig::default();
        let mut aggregator = TileQualityAggregator::new(registry, &config);
        let result = aggregator.aggregate_source(source, &cancel);
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert_eq!(aggregator.counts().total_reads, CANCEL_CHECK_INTERVAL);
    }
}
