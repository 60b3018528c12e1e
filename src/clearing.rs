//! Clearing of low-quality clusters (second pass)
//!
//! Re-reads the original source and, for every read located in a selected
//! subtile, either drops it (DELETE) or replaces its bases with `N`
//! (CHANGE). Reads without a parseable position are always kept as they
//! are. Output goes to a temporary file that is renamed into place only
//! when the whole pass succeeded.

use crate::aggregator::TileHeatmaps;
use crate::cancel::CancellationToken;
use crate::config::ClearMethod;
use crate::coordinates::{FlowCellRegistry, SubtileCoordinates};
use crate::error::{Error, Result};
use crate::manifest::write_manifest;
use crate::parser::parse_identifier;
use crate::reads::{OutputSink, ReadRecord, ReadSource, RecordSink, SequenceFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Clearing run statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearingStats {
    pub method: ClearMethod,
    pub total_reads: u64,
    /// Reads deleted or masked
    pub cleared_reads: u64,
    pub written_reads: u64,
    /// Reads passed through because their identifier had no position
    pub unlocated_reads: u64,
    pub cleared_subtiles: usize,
}

/// Output locations of a clearing run, derived from the input name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedPaths {
    /// `sample.cleared.<method>.fastq.gz`
    pub output: PathBuf,
    /// `sample.cleared.<method>.json`
    pub manifest: PathBuf,
    /// `sample.cleared.<method>.stats.json`
    pub stats: PathBuf,
}

impl ClearedPaths {
    pub fn for_input(input: &Path, method: ClearMethod, output_dir: Option<&Path>) -> Result<Self> {
        let parts = SequenceFormat::detect(input)?;
        let dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let base = format!("{}.cleared.{}", parts.stem, method);
        Ok(Self {
            output: dir.join(format!("{base}{}", parts.extension)),
            manifest: dir.join(format!("{base}.json")),
            stats: dir.join(format!("{base}.stats.json")),
        })
    }
}

/// Removes a temporary output file unless it was committed
struct TempOutput {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl TempOutput {
    fn new(target: &Path) -> Self {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        Self {
            temp: target.with_file_name(name),
            target: target.to_path_buf(),
            committed: false,
        }
    }

    fn commit(mut self) -> Result<()> {
        std::fs::rename(&self.temp, &self.target).map_err(|e| Error::io(&self.target, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        if !self.committed && self.temp.exists() {
            if let Err(e) = std::fs::remove_file(&self.temp) {
                debug!("Could not remove {}: {}", self.temp.display(), e);
            }
        }
    }
}

/// Applies one clearing method for one selection
pub struct ClearingEngine<'a> {
    heatmaps: &'a TileHeatmaps,
    selection: &'a BTreeSet<SubtileCoordinates>,
    registry: &'a FlowCellRegistry,
    method: ClearMethod,
}

impl<'a> ClearingEngine<'a> {
    pub fn new(
        heatmaps: &'a TileHeatmaps,
        selection: &'a BTreeSet<SubtileCoordinates>,
        registry: &'a FlowCellRegistry,
        method: ClearMethod,
    ) -> Self {
        Self {
            heatmaps,
            selection,
            registry,
            method,
        }
    }

    /// `None` when the read cannot be located, otherwise whether it is selected
    fn is_selected(&self, record: &ReadRecord) -> Option<bool> {
        let coordinates = parse_identifier(&record.identifier(), self.registry).ok()?;
        Some(
            self.heatmaps
                .locate(&coordinates)
                .is_some_and(|subtile| self.selection.contains(&subtile)),
        )
    }

    /// Stream `records` through the clearing rule into `sink`
    pub fn clear_records<I, S>(
        &self,
        records: I,
        sink: &mut S,
        cancel: &CancellationToken,
        path: &Path,
    ) -> Result<ClearingStats>
    where
        I: IntoIterator<Item = Result<ReadRecord>>,
        S: RecordSink,
    {
        let mut stats = ClearingStats {
            method: self.method,
            cleared_subtiles: self.selection.len(),
            ..ClearingStats::default()
        };

        for record in records {
            if cancel.should_stop(stats.total_reads) {
                return Err(Error::Cancelled(path.to_path_buf()));
            }
            let record = record?;
            stats.total_reads += 1;

            let selected = match self.is_selected(&record) {
                Some(selected) => selected,
                None => {
                    stats.unlocated_reads += 1;
                    false
                }
            };

            let written = match (selected, self.method) {
                (true, ClearMethod::Delete) => {
                    stats.cleared_reads += 1;
                    false
                }
                (true, ClearMethod::Change) => {
                    stats.cleared_reads += 1;
                    sink.write_masked(&record)?;
                    true
                }
                _ => {
                    sink.write(&record)?;
                    true
                }
            };
            if written {
                stats.written_reads += 1;
            }
        }
        Ok(stats)
    }

    /// Clear `source` into `paths.output` and write the manifest of cleared subtiles
    pub fn clear_file(
        &self,
        source: ReadSource,
        paths: &ClearedPaths,
        cancel: &CancellationToken,
    ) -> Result<ClearingStats> {
        let input = source.path().to_path_buf();
        let temp = TempOutput::new(&paths.output);

        let mut sink = OutputSink::for_source(&source, &temp.temp)?;
        let stats = self.clear_records(source, &mut sink, cancel, &input)?;
        sink.finish()?;
        temp.commit()?;

        write_manifest(&paths.manifest, self.selection, self.registry)?;
        info!(
            "Cleared {} of {} reads ({}) from {} into {}",
            stats.cleared_reads,
            stats.total_reads,
            self.method,
            input.display(),
            paths.output.display()
        );
        Ok(stats)
    }
}
