//! Tilestream CLI - streaming raster measurements and regularization.
//!
//! This is a demonstration CLI for the Tilestream library.

use anyhow::{anyhow, bail, Context};
use std::path::PathBuf;
use tilestream::prelude::*;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("tilestream");

    if args.len() < 2 {
        print_usage(program);
        return;
    }

    let result = match args[1].as_str() {
        "list" => list_filters(),
        "stats" => Options::parse(&args[2..]).and_then(|opts| statistics(&opts)),
        "confusion" => Options::parse(&args[2..]).and_then(|opts| confusion(&opts)),
        "regularize" => Options::parse(&args[2..]).and_then(|opts| regularize(&opts)),
        "help" | "--help" | "-h" => {
            print_usage(program);
            Ok(())
        }
        other => Err(anyhow!("Unknown command: {}", other)),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("Tilestream v{}", tilestream::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list                               List all available filters");
    println!("  stats <image>                      Per-band statistics as JSON");
    println!("  confusion <reference> <produced>   Confusion matrix as CSV");
    println!("  regularize <in> <out>              Majority voting over a label map");
    println!("  help                               Show this help message");
    println!();
    println!("Options:");
    println!("  --config <file.toml>  Streaming, execution and statistics settings");
    println!("  --ram <MB>            Memory budget per streaming division");
    println!("  --threads <N>         Worker threads per division (0 = all cores)");
    println!("  --nodata <L>          NoData label (confusion, regularize; default 0)");
    println!("  --radius <R>          Voting radius (regularize; default 1)");
    println!("  --undecided <L>       Label for ties (regularize; default keeps the original)");
}

/// Positional arguments plus the shared options.
#[derive(Debug, Default)]
struct Options {
    positional: Vec<String>,
    config: AppConfig,
    nodata: i64,
    radius: u64,
    undecided: Option<i64>,
}

impl Options {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut options = Options {
            radius: 1,
            ..Default::default()
        };
        let mut ram = None;
        let mut threads = None;
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| anyhow!("{} requires a value", name))
            };
            match arg.as_str() {
                "--config" => {
                    let path = value("--config")?;
                    options.config = AppConfig::load(&path)
                        .with_context(|| format!("loading configuration '{}'", path))?;
                }
                "--ram" => ram = Some(value("--ram")?.parse::<usize>().context("--ram")?),
                "--threads" => {
                    threads = Some(value("--threads")?.parse::<usize>().context("--threads")?)
                }
                "--nodata" => options.nodata = value("--nodata")?.parse().context("--nodata")?,
                "--radius" => options.radius = value("--radius")?.parse().context("--radius")?,
                "--undecided" => {
                    options.undecided = Some(value("--undecided")?.parse().context("--undecided")?)
                }
                flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
                _ => options.positional.push(arg.clone()),
            }
        }

        // Command-line values win over the file.
        if let Some(mb) = ram {
            options.config.streaming = StreamingConfig::new().with_memory_budget_mb(mb);
        }
        if let Some(threads) = threads {
            options.config.execution.max_threads = threads;
        }
        Ok(options)
    }

    fn path(&self, index: usize, what: &str) -> anyhow::Result<PathBuf> {
        self.positional
            .get(index)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("missing {} path", what))
    }

    fn pipeline(&self, graph: PipelineGraph) -> Pipeline {
        Pipeline::new(graph)
            .with_streaming(self.config.streaming.clone())
            .with_options(self.config.execution.to_options().with_progress(log_progress))
    }
}

fn log_progress(update: ProgressUpdate) {
    match update {
        ProgressUpdate::Progress { percent, estimated_remaining_ms, .. } => {
            log::info!(
                "{:5.1}% done, about {} ms left",
                percent,
                estimated_remaining_ms.unwrap_or(0)
            );
        }
        ProgressUpdate::Completed { total_duration_ms, divisions } => {
            log::info!("{} division(s) in {} ms", divisions, total_duration_ms);
        }
        _ => {}
    }
}

fn list_filters() -> anyhow::Result<()> {
    let registry = FilterRegistry::with_builtins()?;
    println!("Available filters ({} total):", registry.len());
    println!();
    for metadata in registry.list() {
        println!("  {} [{}]", metadata.id, metadata.category.display_name());
        println!("      {}", metadata.description);
        for param in &metadata.parameters {
            println!("      --{} (default {}): {}", param.name, param.default, param.description);
        }
        println!();
    }
    Ok(())
}

fn statistics(options: &Options) -> anyhow::Result<()> {
    let input = options.path(0, "image")?;
    let mut graph = PipelineGraph::new();
    let source = graph.add_source(ImageFileSource::open(&input)?);

    let mut pipeline = options.pipeline(graph);
    let accumulator = StreamingStatistics::with_config(options.config.statistics.clone());
    let mut stats = PersistentFilter::new(accumulator, &[source]);
    pipeline.update(&mut stats)?;

    let result = stats
        .take_result()
        .ok_or_else(|| anyhow!("statistics produced no result"))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn confusion(options: &Options) -> anyhow::Result<()> {
    let reference = options.path(0, "reference")?;
    let produced = options.path(1, "produced")?;
    let mut graph = PipelineGraph::new();
    let r = graph.add_source(ImageFileSource::open(&reference)?);
    let p = graph.add_source(ImageFileSource::open(&produced)?);

    let mut pipeline = options.pipeline(graph);
    let mut matrix = PersistentFilter::new(ConfusionMatrixAccumulator::new(options.nodata), &[r, p]);
    pipeline.update(&mut matrix)?;

    let matrix = matrix
        .take_result()
        .ok_or_else(|| anyhow!("confusion matrix produced no result"))?;
    print!("{}", matrix.to_csv());
    println!("#Overall accuracy: {:.6}", matrix.overall_accuracy());
    println!("#Kappa: {:.6}", matrix.kappa());
    let (precisions, recalls, f_scores) = (matrix.precisions(), matrix.recalls(), matrix.f_scores());
    for (i, label) in matrix.labels.iter().enumerate() {
        println!(
            "#Label {}: precision {:.6}, recall {:.6}, F-score {:.6}",
            label, precisions[i], recalls[i], f_scores[i]
        );
    }
    Ok(())
}

fn regularize(options: &Options) -> anyhow::Result<()> {
    let input = options.path(0, "input")?;
    let output = options.path(1, "output")?;
    let mut graph = PipelineGraph::new();
    let source = graph.add_source(ImageFileSource::open(&input)?);

    let policy = match options.undecided {
        Some(label) => TiePolicy::Undecided(label),
        None => TiePolicy::KeepOriginal,
    };
    let vote = graph.add_filter(
        MajorityVotingFilter::new(options.radius)
            .with_nodata(options.nodata)
            .with_tie_policy(policy),
    );
    graph.connect(source, vote, 0)?;

    let mut pipeline = options.pipeline(graph);
    let mut writer = RasterWriter::new(vote).with_path(&output);
    let report = pipeline.update(&mut writer)?;
    log::info!(
        "Wrote {} ({} pixel(s), {} division(s))",
        output.display(),
        report.pixels,
        report.divisions
    );
    Ok(())
}
