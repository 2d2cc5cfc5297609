use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use dag_align::align::{Aligner, EngineKind};
use dag_align::error::{AlignError, Result};
use dag_align::graph::{load_graph, GraphFormat};
use dag_align::io::{read_queries, write_records};
use dag_align::params::ScoreParams;

#[derive(Parser)]
#[command(name = "dag-align")]
#[command(about = "Local alignment of DNA reads to a directed acyclic sequence graph", long_about = None)]
#[command(version)]
struct Cli {
    /// Reference graph format: vg or txt
    #[arg(short = 'm', long = "mode", value_name = "FORMAT")]
    mode: String,

    /// Reference graph file
    #[arg(short = 'r', long = "ref", value_name = "FILE")]
    rfile: PathBuf,

    /// Query file (FASTA/FASTQ, optionally .gz)
    #[arg(short = 'q', long = "query", value_name = "FILE")]
    qfile: PathBuf,

    /// Output file (default: stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Number of threads (default: all available cores)
    #[arg(short = 't', long = "threads", value_name = "INT")]
    threads: Option<usize>,

    /// Score for a base match
    #[arg(long = "match", value_name = "INT", default_value = "1")]
    match_score: i32,

    /// Penalty for a base mismatch
    #[arg(long, value_name = "INT", default_value = "1")]
    mismatch: i32,

    /// Penalty for an inserted query base
    #[arg(long, value_name = "INT", default_value = "1")]
    ins: i32,

    /// Penalty for a deleted reference character
    #[arg(long, value_name = "INT", default_value = "1")]
    del: i32,

    /// Use the scalar phase-1 engines instead of the lane-packed ones
    #[arg(long)]
    scalar: bool,

    /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
    #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
    verbosity: i32,
}

fn run(cli: Cli) -> Result<()> {
    let params = ScoreParams::new(cli.match_score, cli.mismatch, cli.ins, cli.del)?;
    let format = GraphFormat::parse(&cli.mode)?;

    log::info!("reference file = {} (in {} format)", cli.rfile.display(), cli.mode);
    log::info!("query file = {}", cli.qfile.display());

    let graph = load_graph(format, &cli.rfile)?;
    let reads = read_queries(&cli.qfile)?;
    log::info!("total count of reads = {}", reads.len());

    let mut threads = cli.threads.unwrap_or_else(num_cpus::get);
    if threads < 1 {
        log::warn!("invalid thread count {}, using 1 thread", threads);
        threads = 1;
    }

    let engine = if cli.scalar {
        EngineKind::Scalar
    } else {
        EngineKind::Lanes
    };
    let aligner = Aligner::new(&graph, params, threads, engine)?;
    let (records, timings) = aligner.align(&reads)?;
    log::info!(
        "phase timings (s): phase 1 = {:.3}, phase 1-reverse = {:.3}, phase 2 = {:.3}",
        timings.phase1.as_secs_f64(),
        timings.phase1_rev.as_secs_f64(),
        timings.phase2.as_secs_f64()
    );

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|e| {
            AlignError::InvalidArgument(format!("cannot create {}: {}", path.display(), e))
        })?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    write_records(&mut out, &graph, &reads, &records)?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
