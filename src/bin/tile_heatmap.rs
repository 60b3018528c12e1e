//! Tile Heatmap Tool
//!
//! Aggregate per-tile quality matrices and export them as JSON heatmaps.

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tile_qc_tools::reporting::BatchReporter;
use tile_qc_tools::{parse_thresholds, FlowCellRegistry, TilePipeline, TileQcConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("tile-heatmap")
        .version("0.1.0")
        .about("Per-tile quality heatmaps for FASTQ, SAM and BAM files")
        .author("Megan Johnson")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Input FASTQ, SAM or BAM file(s), compressed FASTQ supported")
                .num_args(1..)
                .action(ArgAction::Append)
                .required(true),
        )
        .arg(
            Arg::new("matrix_size")
                .short('m')
                .long("matrix-size")
                .value_name("N")
                .help("Grid resolution per tile (N x N subtiles)")
                .value_parser(clap::value_parser!(usize))
                .default_value("10"),
        )
        .arg(
            Arg::new("thresholds")
                .short('q')
                .long("thresholds")
                .value_name("LIST")
                .help("Mean quality thresholds, e.g. 20 or 20,25-27")
                .default_value("20"),
        )
        .arg(
            Arg::new("read_rate")
                .short('r')
                .long("read-rate")
                .value_name("N")
                .help("Aggregate every N-th read only")
                .value_parser(clap::value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("N")
                .help("Files processed in parallel")
                .value_parser(clap::value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output-dir")
                .value_name("DIRECTORY")
                .help("Directory for heatmap JSON files (default: next to each input)"),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .value_name("JSON")
                .help("Output JSON file for the batch summary")
                .default_value("tile_heatmap_summary.json"),
        )
        .get_matches();

    // Parse arguments
    let inputs: Vec<PathBuf> = matches
        .get_many::<String>("input")
        .context("no input files given")?
        .map(PathBuf::from)
        .collect();
    let thresholds = parse_thresholds(
        matches
            .get_one::<String>("thresholds")
            .context("missing --thresholds")?,
    )?;
    let mut config = TileQcConfig::new(
        *matches.get_one::<usize>("matrix_size").context("missing --matrix-size")?,
        thresholds,
        *matches.get_one::<usize>("read_rate").context("missing --read-rate")?,
    )
    .with_threads(*matches.get_one::<usize>("threads").context("missing --threads")?);
    config.output_dir = matches.get_one::<String>("output_dir").map(PathBuf::from);
    let summary_file = PathBuf::from(
        matches
            .get_one::<String>("summary")
            .context("missing --summary")?,
    );

    println!("🗺️  Tile Heatmap");
    println!("Input files: {}", inputs.len());
    println!("Matrix size: {0}x{0}", config.matrix_size);
    println!("Quality thresholds: {:?}", config.thresholds);
    println!("Read rate: 1/{}", config.read_rate);

    let pipeline = TilePipeline::new(config, Arc::new(FlowCellRegistry::new()))?;
    let results = pipeline.process_batch(&inputs)?;

    println!("📊 Heatmap Results:");
    for (input, result) in &results {
        match result {
            Ok(report) => {
                println!("  {}", input.display());
                println!(
                    "    Reads: {} ({} sampled, {} without position)",
                    report.counts.total_reads,
                    report.counts.sampled_reads,
                    report.counts.unlocated_reads
                );
                if report.counts.secondary_alignments > 0 {
                    println!(
                        "    Secondary/supplementary alignments skipped: {}",
                        report.counts.secondary_alignments
                    );
                }
                println!("    Tiles: {}", report.tiles);
                println!("    Low-quality subtile candidates: {}", report.selected_subtiles);
                println!("    Heatmaps: {}", report.heatmaps.display());
            }
            Err(e) => println!("  ❌ {}: {}", input.display(), e),
        }
    }

    let reporter = BatchReporter::default();
    let report = reporter.generate_report(&results);
    reporter.export_json(&report, &summary_file)?;
    println!("💾 Summary saved to: {}", summary_file.display());

    if report.summary.failed_files > 0 {
        bail!(
            "{} of {} files failed",
            report.summary.failed_files,
            report.summary.total_files
        );
    }
    Ok(())
}
