//! Per-file pipeline and multi-file batch runner
//!
//! Each input file goes through the same sequential phases:
//! 1. aggregate tile matrices (first read of the source)
//! 2. select low-quality subtiles
//! 3. clear them (second read of the source), unless the method is NONE
//!
//! Files of a batch are independent and run on a `rayon` pool. They only
//! share the flow-cell registry and the cancellation token.

use crate::aggregator::{TileHeatmaps, TileQualityAggregator};
use crate::cancel::CancellationToken;
use crate::clearing::{ClearedPaths, ClearingEngine};
use crate::config::{ClearMethod, TileQcConfig};
use crate::coordinates::{FlowCellRegistry, SubtileCoordinates};
use crate::error::{Error, Result};
use crate::reads::ReadSource;
use crate::reporting::{heatmaps_path, write_json, FileReport, HeatmapReport};
use crate::selector::{LowQualitySelector, SelectionStrategy};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the tile QC phases for one or more files with a fixed configuration
pub struct TilePipeline {
    config: TileQcConfig,
    registry: Arc<FlowCellRegistry>,
    strategy: SelectionStrategy,
    selector: LowQualitySelector,
    cancel: CancellationToken,
}

impl TilePipeline {
    /// Validates `config`; no file is opened when it is rejected
    pub fn new(config: TileQcConfig, registry: Arc<FlowCellRegistry>) -> Result<Self> {
        Self::with_user_selection(config, registry, Vec::new())
    }

    /// Pipeline for USER selection with the caller's subtiles
    pub fn with_user_selection(
        config: TileQcConfig,
        registry: Arc<FlowCellRegistry>,
        user_selection: Vec<SubtileCoordinates>,
    ) -> Result<Self> {
        config.validate()?;
        let strategy = SelectionStrategy::from_config(&config, &user_selection)?;
        Ok(Self {
            config,
            registry,
            strategy,
            selector: LowQualitySelector::default(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &TileQcConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FlowCellRegistry> {
        &self.registry
    }

    /// Token stopping every running and future file of this pipeline
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// First pass only
    pub fn aggregate(&self, input: &Path) -> Result<TileHeatmaps> {
        let source = ReadSource::open(input)?;
        let mut aggregator = TileQualityAggregator::new(self.registry.clone(), &self.config);
        aggregator.aggregate_source(source, &self.cancel)?;
        Ok(aggregator.finish())
    }

    /// Every phase for one file
    pub fn process_file(&self, input: &Path) -> Result<FileReport> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(input.to_path_buf()));
        }
        let output_dir = self.config.output_dir.as_deref();
        if let Some(dir) = output_dir {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }

        info!("Processing {}", input.display());
        let heatmaps = self.aggregate(input)?;
        let heatmaps_file = heatmaps_path(input, output_dir)?;
        write_json(&HeatmapReport::new(input, &heatmaps, &self.registry), &heatmaps_file)?;

        let selection = self.selector.select(&self.strategy, &heatmaps, &self.registry)?;

        let mut report = FileReport {
            input: input.to_path_buf(),
            counts: heatmaps.counts(),
            tiles: heatmaps.tiles().count(),
            heatmaps: heatmaps_file,
            selected_subtiles: selection.len(),
            clearing: None,
            cleared_output: None,
            manifest: None,
        };

        if self.config.clear_method == ClearMethod::None {
            return Ok(report);
        }

        let paths = ClearedPaths::for_input(input, self.config.clear_method, output_dir)?;
        let engine = ClearingEngine::new(
            &heatmaps,
            &selection,
            &self.registry,
            self.config.clear_method,
        );
        let stats = engine.clear_file(ReadSource::open(input)?, &paths, &self.cancel)?;
        write_json(&stats, &paths.stats)?;

        report.clearing = Some(stats);
        report.cleared_output = Some(paths.output);
        report.manifest = Some(paths.manifest);
        Ok(report)
    }

    /// Run every file on a pool of `threads` workers
    ///
    /// Results come back in input order. A failing file does not stop the
    /// others; only a pool that cannot be built fails the whole batch.
    pub fn process_batch(&self, inputs: &[PathBuf]) -> Result<Vec<(PathBuf, Result<FileReport>)>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()?;

        let results: Vec<(PathBuf, Result<FileReport>)> = pool.install(|| {
            inputs
                .par_iter()
                .map(|input| (input.clone(), self.process_file(input)))
                .collect()
        });

        for (input, result) in &results {
            if let Err(e) = result {
                warn!("{} failed: {}", input.display(), e);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionMethod;
    use crate::error::ConfigurationError;

    fn write_fastq(dir: &Path, name: &str) -> PathBuf {
        let mut text = String::new();
        for x in 0..10u32 {
            for y in 0..10u32 {
                let quality = if x == 9 && y == 9 { "++++++" } else { "IIIIII" };
                text.push_str(&format!(
                    "@M1:7:FCX:1:1101:{}:{} 1:N:0:1\nACGTAC\n+\n{}\n",
                    x * 50,
                    y * 50,
                    quality
                ));
            }
        }
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let config = TileQcConfig::new(0, vec![20], 1);
        let err = TilePipeline::new(config, Arc::new(FlowCellRegistry::new())).err();
        assert!(matches!(
            err,
            Some(Error::Configuration(ConfigurationError::NonPositive { .. }))
        ));
    }

    #[test]
    fn test_aggregate_only() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fastq(dir.path(), "run.fastq");
        let pipeline =
            TilePipeline::new(TileQcConfig::new(10, vec![20], 1), Arc::new(FlowCellRegistry::new()))
                .unwrap();

        let report = pipeline.process_file(&input).unwrap();
        assert_eq!(report.counts.total_reads, 100);
        assert_eq!(report.tiles, 1);
        assert_eq!(report.selected_subtiles, 1);
        assert!(report.clearing.is_none());
        assert!(dir.path().join("run.heatmaps.json").exists());
    }

    #[test]
    fn test_delete_run_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fastq(dir.path(), "run.fastq");
        let out = dir.path().join("out");
        let mut config = TileQcConfig::new(10, vec![20], 1)
            .with_clearing(ClearMethod::Delete, SelectionMethod::Auto);
        config.output_dir = Some(out.clone());
        let pipeline = TilePipeline::new(config, Arc::new(FlowCellRegistry::new())).unwrap();

        let report = pipeline.process_file(&input).unwrap();
        let stats = report.clearing.unwrap();
        assert_eq!((stats.total_reads, stats.cleared_reads, stats.written_reads), (100, 1, 99));
        assert!(out.join("run.cleared.delete.fastq").exists());
        assert!(out.join("run.cleared.delete.json").exists());
        assert!(out.join("run.cleared.delete.stats.json").exists());
        assert!(out.join("run.heatmaps.json").exists());
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_fastq(dir.path(), "a.fastq");
        let b = write_fastq(dir.path(), "b.fastq");
        let missing = dir.path().join("missing.fastq");
        let config = TileQcConfig::new(10, vec![20], 1)
            .with_clearing(ClearMethod::Change, SelectionMethod::Auto)
            .with_threads(2);
        let pipeline = TilePipeline::new(config, Arc::new(FlowCellRegistry::new())).unwrap();

        let results = pipeline
            .process_batch(&[a.clone(), missing.clone(), b.clone()])
            .unwrap();
        let inputs: Vec<&PathBuf> = results.iter().map(|(p, _)| p).collect();
        assert_eq!(inputs, vec![&a, &missing, &b]);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());
        // both files see the same flow cell through the shared registry
        assert_eq!(pipeline.registry().len(), 1);
    }

    #[test]
    fn test_cancelled_pipeline_skips_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fastq(dir.path(), "run.fastq");
        let config = TileQcConfig::new(10, vec![20], 1)
            .with_clearing(ClearMethod::Delete, SelectionMethod::Auto);
        let pipeline = TilePipeline::new(config, Arc::new(FlowCellRegistry::new())).unwrap();
        pipeline.cancellation_token().cancel();

        assert!(matches!(pipeline.process_file(&input), Err(Error::Cancelled(_))));
        assert!(!dir.path().join("run.cleared.delete.fastq").exists());
    }
}
