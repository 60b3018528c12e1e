//! Per-tile quality matrices
//!
//! A tile's observed x/y extent is split linearly into a
//! `size x size` grid. Each grid cell keeps running sums from which the
//! subtile properties are derived.

use crate::coordinates::{SubtileCoordinates, SubtileProperties, SubtileProperty, TileCoordinates};
use serde::{Deserialize, Serialize};

/// Observed bounding box of a tile's raw read positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileExtent {
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileExtent {
    /// Extent covering a single point
    pub fn at(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        }
    }

    pub fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Grid cell of a raw position; positions outside the extent are clamped
    pub fn bin(&self, x: u32, y: u32, size: usize) -> (u32, u32) {
        (
            bin_axis(x, self.min_x, self.max_x, size),
            bin_axis(y, self.min_y, self.max_y, size),
        )
    }
}

fn bin_axis(value: u32, min: u32, max: u32, size: usize) -> u32 {
    let width = max.saturating_sub(min);
    if width == 0 || size <= 1 {
        return 0;
    }
    let offset = value.saturating_sub(min) as f64;
    let cell = (offset / width as f64 * size as f64).floor() as usize;
    cell.min(size - 1) as u32
}

/// Running sums of one grid cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellStats {
    pub read_count: u64,
    /// Reads that carried a quality string
    pub quality_count: u64,
    /// Sum of per-read mean qualities
    pub quality_sum: f64,
    /// Reads whose mean quality is below the matrix threshold
    pub lowq_count: u64,
    pub mapq_sum: u64,
    pub mapq_count: u64,
}

impl CellStats {
    /// Mean over reads with qualities only
    pub fn average_quality(&self) -> f64 {
        ratio(self.quality_sum, self.quality_count)
    }

    pub fn lowq_rate(&self) -> f64 {
        ratio(self.lowq_count as f64, self.quality_count)
    }

    /// Mean mapping quality, `None` when no read carried one
    pub fn mapping_quality(&self) -> Option<f64> {
        (self.mapq_count > 0).then(|| self.mapq_sum as f64 / self.mapq_count as f64)
    }
}

fn ratio(numerator: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

/// Quality grid of one tile for one quality threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMatrix {
    #[serde(skip)]
    tile: TileCoordinates,
    threshold: u32,
    size: usize,
    /// Row-major, index `y * size + x`
    cells: Vec<CellStats>,
}

impl QualityMatrix {
    pub fn new(tile: TileCoordinates, threshold: u32, size: usize) -> Self {
        Self {
            tile,
            threshold,
            size,
            cells: vec![CellStats::default(); size * size],
        }
    }

    pub fn tile(&self) -> TileCoordinates {
        self.tile
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cell(&self, x: u32, y: u32) -> Option<&CellStats> {
        self.index(x, y).map(|i| &self.cells[i])
    }

    /// Record one read in cell `(x, y)`
    ///
    /// A read without qualities adds to the density only.
    pub fn add_read(
        &mut self,
        x: u32,
        y: u32,
        mean_quality: Option<f64>,
        mapping_quality: Option<u8>,
    ) {
        let Some(i) = self.index(x, y) else {
            return;
        };
        let threshold = f64::from(self.threshold);
        let cell = &mut self.cells[i];
        cell.read_count += 1;
        if let Some(quality) = mean_quality {
            cell.quality_count += 1;
            cell.quality_sum += quality;
            if quality < threshold {
                cell.lowq_count += 1;
            }
        }
        if let Some(mapq) = mapping_quality {
            cell.mapq_sum += u64::from(mapq);
            cell.mapq_count += 1;
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        let (x, y) = (x as usize, y as usize);
        (x < self.size && y < self.size).then_some(y * self.size + x)
    }

    /// Reads assigned to this tile
    pub fn total_reads(&self) -> u64 {
        self.cells.iter().map(|c| c.read_count).sum()
    }

    pub fn has_mapping_quality(&self) -> bool {
        self.cells.iter().any(|c| c.mapq_count > 0)
    }

    /// Derived properties of cell `(x, y)`
    pub fn properties(&self, x: u32, y: u32) -> Option<SubtileProperties> {
        let cell = self.cell(x, y)?;
        let mut properties = SubtileProperties::new(self.tile.subtile(x, y));
        properties.set(SubtileProperty::ReadDensity, cell.read_count as f64);
        properties.set(SubtileProperty::AverageQuality, cell.average_quality());
        properties.set(SubtileProperty::RateOfLowqReads, cell.lowq_rate());
        if let Some(mapq) = cell.mapping_quality() {
            properties.set(SubtileProperty::MappingQuality, mapq);
        }
        Some(properties)
    }

    /// Every cell with its coordinates, row by row
    pub fn cells(&self) -> impl Iterator<Item = (SubtileCoordinates, &CellStats)> + '_ {
        let size = self.size;
        self.cells.iter().enumerate().map(move |(i, cell)| {
            let (x, y) = ((i % size) as u32, (i / size) as u32);
            (self.tile.subtile(x, y), cell)
        })
    }

    /// One property as a `size x size` grid indexed `[y][x]`
    ///
    /// Cells lacking the property (mapping quality) read as 0.
    pub fn grid(&self, property: SubtileProperty) -> Vec<Vec<f64>> {
        let size = self.size as u32;
        (0..size)
            .map(|y| {
                (0..size)
                    .map(|x| {
                        self.properties(x, y)
                            .and_then(|p| p.get(property))
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::FlowCellRegistry;

    fn tile() -> TileCoordinates {
        let registry = FlowCellRegistry::new();
        TileCoordinates {
            flow_cell: registry.intern("FC"),
            lane: 1,
            tile: 1101,
        }
    }

    #[test]
    fn test_binning_covers_extent() {
        let mut extent = TileExtent::at(1000, 2000);
        extent.include(2000, 3000);
        assert_eq!(extent.bin(1000, 2000, 10), (0, 0));
        assert_eq!(extent.bin(1099, 2099, 10), (0, 0));
        assert_eq!(extent.bin(1100, 2100, 10), (1, 1));
        assert_eq!(extent.bin(1550, 2999, 10), (5, 9));
        // max edge is clamped into the last cell
        assert_eq!(extent.bin(2000, 3000, 10), (9, 9));
        // outside the observed extent
        assert_eq!(extent.bin(10, 9000, 10), (0, 9));
    }

    #[test]
    fn test_zero_width_extent_bins_to_first_cell() {
        let extent = TileExtent::at(500, 500);
        assert_eq!(extent.bin(500, 500, 10), (0, 0));
        assert_eq!(extent.bin(900, 100, 10), (0, 0));
    }

    #[test]
    fn test_cell_properties() {
        let mut matrix = QualityMatrix::new(tile(), 20, 4);
        matrix.add_read(1, 2, Some(30.0), None);
        matrix.add_read(1, 2, Some(10.0), None);
        matrix.add_read(1, 2, Some(19.5), None);

        let props = matrix.properties(1, 2).unwrap();
        assert_eq!(props.get(SubtileProperty::ReadDensity), Some(3.0));
        assert!((props.get(SubtileProperty::AverageQuality).unwrap() - 59.5 / 3.0).abs() < 1e-9);
        assert!((props.get(SubtileProperty::RateOfLowqReads).unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(props.get(SubtileProperty::MappingQuality), None);

        let empty = matrix.properties(0, 0).unwrap();
        assert_eq!(empty.get(SubtileProperty::AverageQuality), Some(0.0));
        assert_eq!(empty.get(SubtileProperty::RateOfLowqReads), Some(0.0));

        assert!(matrix.properties(4, 0).is_none());
    }

    #[test]
    fn test_mapping_quality_only_when_present() {
        let mut matrix = QualityMatrix::new(tile(), 20, 2);
        matrix.add_read(0, 0, Some(35.0), Some(60));
        matrix.add_read(0, 0, Some(35.0), Some(20));
        matrix.add_read(0, 0, Some(35.0), None);
        assert!(matrix.has_mapping_quality());
        let props = matrix.properties(0, 0).unwrap();
        assert_eq!(props.get(SubtileProperty::MappingQuality), Some(40.0));
        assert_eq!(matrix.total_reads(), 3);
    }

    #[test]
    fn test_reads_without_quality_count_as_density_only() {
        let mut matrix = QualityMatrix::new(tile(), 20, 2);
        matrix.add_read(1, 1, Some(40.0), Some(60));
        matrix.add_read(1, 1, None, Some(0));

        let props = matrix.properties(1, 1).unwrap();
        assert_eq!(props.get(SubtileProperty::ReadDensity), Some(2.0));
        assert_eq!(props.get(SubtileProperty::AverageQuality), Some(40.0));
        assert_eq!(props.get(SubtileProperty::RateOfLowqReads), Some(0.0));
        assert_eq!(props.get(SubtileProperty::MappingQuality), Some(30.0));

        assert_eq!(matrix.grid(SubtileProperty::AverageQuality)[1], vec![0.0, 40.0]);
        assert_eq!(matrix.grid(SubtileProperty::MappingQuality)[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_grid_layout() {
        let mut matrix = QualityMatrix::new(tile(), 20, 3);
        matrix.add_read(2, 0, Some(30.0), None);
        matrix.add_read(0, 1, Some(30.0), None);
        let grid = matrix.grid(SubtileProperty::ReadDensity);
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], vec![0.0, 0.0, 1.0]);
        assert_eq!(grid[1], vec![1.0, 0.0, 0.0]);
        let occupied: Vec<_> = matrix
            .cells()
            .filter(|(_, c)| c.read_count > 0)
            .map(|(s, _)| (s.x, s.y))
            .collect();
        assert_eq!(occupied, vec![(2, 0), (0, 1)]);
    }
}
