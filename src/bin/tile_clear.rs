//! Tile Clear Tool
//!
//! Remove or mask reads from low-quality flow-cell subtiles.

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tile_qc_tools::reporting::BatchReporter;
use tile_qc_tools::{
    parse_subtile_spec, parse_thresholds, ClearMethod, FlowCellRegistry, SelectionMethod,
    TilePipeline, TileQcConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("tile-clear")
        .version("0.1.0")
        .about("Delete or mask reads from low-quality flow-cell subtiles")
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
            Arg::new("method")
                .long("method")
                .value_name("METHOD")
                .help("Clearing method: delete or change (mask bases with N)")
                .default_value("delete"),
        )
        .arg(
            Arg::new("selection")
                .short('s')
                .long("selection")
                .value_name("METHOD")
                .help("Selection method: auto, user or file")
                .default_value("auto"),
        )
        .arg(
            Arg::new("manifest")
                .long("manifest")
                .value_name("JSON")
                .help("Low-quality cluster manifest for --selection file"),
        )
        .arg(
            Arg::new("subtile")
                .long("subtile")
                .value_name("FLOWCELL:LANE:TILE:X:Y")
                .help("Subtile to clear for --selection user (repeatable)")
                .action(ArgAction::Append),
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
            Arg::new("selection_threshold")
                .long("selection-threshold")
                .value_name("SCORE")
                .help("Threshold whose matrices drive auto selection (default: first)")
                .value_parser(clap::value_parser!(u32)),
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
                .help("Directory for cleared files (default: next to each input)"),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .value_name("JSON")
                .help("Output JSON file for the batch summary")
                .default_value("tile_clear_summary.json"),
        )
        .arg(
            Arg::new("max_cleared")
                .long("max-cleared")
                .value_name("FRACTION")
                .help("Flag files with a larger fraction of cleared reads")
                .value_parser(clap::value_parser!(f64))
                .default_value("0.1"),
        )
        .get_matches();

    // Parse arguments
    let inputs: Vec<PathBuf> = matches
        .get_many::<String>("input")
        .context("no input files given")?
        .map(PathBuf::from)
        .collect();
    let clear_method: ClearMethod = matches
        .get_one::<String>("method")
        .context("missing --method")?
        .parse()?;
    if clear_method == ClearMethod::None {
        bail!("--method none only aggregates, use tile-heatmap instead");
    }
    let selection_method: SelectionMethod = matches
        .get_one::<String>("selection")
        .context("missing --selection")?
        .parse()?;
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
    .with_clearing(clear_method, selection_method)
    .with_threads(*matches.get_one::<usize>("threads").context("missing --threads")?);
    if let Some(manifest) = matches.get_one::<String>("manifest") {
        config = config.with_manifest(manifest);
    }
    config.selection_threshold = matches.get_one::<u32>("selection_threshold").copied();
    config.output_dir = matches.get_one::<String>("output_dir").map(PathBuf::from);
    let summary_file = PathBuf::from(
        matches
            .get_one::<String>("summary")
            .context("missing --summary")?,
    );
    let max_cleared = *matches
        .get_one::<f64>("max_cleared")
        .context("missing --max-cleared")?;

    let registry = Arc::new(FlowCellRegistry::new());
    let user_selection = matches
        .get_many::<String>("subtile")
        .unwrap_or_default()
        .map(|spec| parse_subtile_spec(spec, &registry))
        .collect::<Result<Vec<_>, _>>()?;

    println!("🧹 Tile Clear");
    println!("Input files: {}", inputs.len());
    println!("Clearing method: {}", config.clear_method);
    println!("Selection: {:?}", config.selection_method);
    println!("Matrix size: {0}x{0}", config.matrix_size);
    println!("Quality thresholds: {:?}", config.thresholds);

    let pipeline = TilePipeline::with_user_selection(config, registry, user_selection)?;
    let results = pipeline.process_batch(&inputs)?;

    println!("📊 Clearing Results:");
    for (input, result) in &results {
        match result {
            Ok(report) => {
                println!("  {}", input.display());
                println!("    Selected subtiles: {}", report.selected_subtiles);
                if let Some(stats) = &report.clearing {
                    println!(
                        "    Reads cleared: {} of {} ({:.2}%)",
                        stats.cleared_reads,
                        stats.total_reads,
                        report.cleared_fraction() * 100.0
                    );
                    println!("    Reads without position: {}", stats.unlocated_reads);
                }
                if let Some(output) = &report.cleared_output {
                    println!("    Output: {}", output.display());
                }
                if let Some(manifest) = &report.manifest {
                    println!("    Manifest: {}", manifest.display());
                }
            }
            Err(e) => println!("  ❌ {}: {}", input.display(), e),
        }
    }

    let reporter = BatchReporter::new(max_cleared);
    let report = reporter.generate_report(&results);
    for flagged in &report.summary.flagged_files {
        println!(
            "⚠️  More than {:.1}% of reads cleared in {}",
            max_cleared * 100.0,
            flagged.display()
        );
    }
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
