use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use cola_rs::{ArraySink, ColaConfig, ColaEngine, RunReport, WindowKind};
use ndarray::{s, Array2, ArrayD, IxDyn};

/// Stream a signal through a constant overlap-add identity reconstruction
/// and report the round-trip error.
#[derive(Parser, Debug)]
#[command(name = "cola", version, about)]
struct Cli {
    /// Whitespace-delimited ASCII matrix, one row per sample, one column per channel
    #[arg(long)]
    input: Option<PathBuf>,

    /// Samples to synthesize when no input file is given
    #[arg(long, default_value_t = 1024)]
    synth_samples: usize,

    /// Channels to synthesize when no input file is given
    #[arg(long, default_value_t = 4)]
    synth_channels: usize,

    /// Window length in samples
    #[arg(long, default_value_t = 256)]
    n_samples: usize,

    /// Overlap between successive windows in samples
    #[arg(long, default_value_t = 128)]
    n_overlap: usize,

    /// Window family: hann, hamming, blackman, triangular or boxcar
    #[arg(long, default_value = "hann")]
    window: String,

    /// Samples per feed call
    #[arg(long, default_value_t = 512)]
    chunk_size: usize,

    /// Sampling rate in Hz, used for duration reporting only
    #[arg(long, default_value_t = 1.0)]
    sample_rate: f64,

    /// Write the reconstructed ASCII matrix here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if cli.chunk_size == 0 {
        return Err("chunk-size must be > 0".into());
    }
    let window = WindowKind::from_name(&cli.window)
        .ok_or_else(|| format!("unknown window family: {}", cli.window))?;

    let (signal, input_label) = match &cli.input {
        Some(path) => (read_ascii_matrix(path)?, path.display().to_string()),
        None => (
            Array2::ones((cli.synth_channels, cli.synth_samples)),
            "<synthetic>".to_string(),
        ),
    };
    let n_channels = signal.nrows();
    let n_total = signal.ncols();

    log::info!(
        "Streaming {} channel(s) of {} samples from {}",
        n_channels,
        n_total,
        input_label
    );

    let config = ColaConfig::new(cli.n_samples, cli.n_overlap, n_total)
        .with_window(window)
        .with_sample_rate(cli.sample_rate);
    let sink = ArraySink::new(vec![ArrayD::zeros(IxDyn(&[n_channels, n_total]))])?;
    let mut engine = ColaEngine::new(config.clone(), |spans| spans, sink)?;

    let started = Instant::now();
    let mut fed = 0;
    while fed < n_total {
        let stop = (fed + cli.chunk_size).min(n_total);
        engine.feed(&[signal.slice(s![.., fed..stop]).into_dyn()])?;
        fed = stop;
    }
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let n_windows = engine.windows_processed();
    let reconstructed = engine.into_sink().into_arrays().remove(0);

    let max_error = reconstructed
        .iter()
        .zip(signal.iter())
        .map(|(got, want)| (got - want).abs())
        .fold(0.0, f64::max);

    log::info!(
        "Reconstructed {} samples across {} channel(s) in {} window(s) ({:.2} ms)",
        n_total,
        n_channels,
        n_windows,
        elapsed_ms
    );

    if let Some(path) = &cli.output {
        write_ascii_matrix(path, &reconstructed)?;
    }

    let report = RunReport::new(
        input_label,
        n_channels,
        &config,
        n_windows,
        cli.chunk_size,
        max_error,
        elapsed_ms,
    );
    if let Some(path) = &cli.report {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }

    println!(
        "max reconstruction error: {:.3e} ({} windows, {:.2} ms)",
        report.max_reconstruction_error, report.n_windows, report.elapsed_ms
    );
    Ok(())
}

/// Read an ASCII matrix with one row per sample and one column per channel,
/// returning it as channels x time.
fn read_ascii_matrix(path: &Path) -> Result<Array2<f64>, Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (ln, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| format!("{}:{}: {}", path.display(), ln + 1, e))?;
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(format!("{}: input contains no samples", path.display()).into());
    }
    let n_channels = rows[0].len();
    if rows.iter().any(|r| r.len() != n_channels) {
        return Err(format!("{}: rows have differing column counts", path.display()).into());
    }

    let mut data = Array2::zeros((n_channels, rows.len()));
    for (t, row) in rows.iter().enumerate() {
        for (c, &value) in row.iter().enumerate() {
            data[[c, t]] = value;
        }
    }
    Ok(data)
}

/// Write a channels x time array as one ASCII row per sample.
fn write_ascii_matrix(path: &Path, data: &ArrayD<f64>) -> Result<(), Box<dyn Error>> {
    let n_channels = data.shape()[0];
    let n_times = data.shape()[1];
    let mut out = String::new();
    for t in 0..n_times {
        for c in 0..n_channels {
            if c > 0 {
                out.push(' ');
            }
            out.push_str(&format!("{:.12e}", data[[c, t]]));
        }
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}
