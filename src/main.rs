mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;

use cli::Cli;
use sonoprint::config::{self, Config, OutputFormat};
use sonoprint::{Fingerprint, Fingerprinter, FrequencyBand};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    // CLI flags win over the config file
    let format = cli.format.unwrap_or(cfg.output.format);
    let queue_capacity = cli.queue_capacity.unwrap_or(cfg.pipeline.queue_capacity);

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("sonoprint - acoustic landmark fingerprints");
    log::info!("Input: {}", cli.input.display());
    log::info!("Queue capacity: {}, format: {:?}", queue_capacity, format);

    let mut fingerprinter = Fingerprinter::with_config(queue_capacity, cfg.resampler);
    fingerprinter
        .open(&cli.input)
        .with_context(|| format!("Cannot fingerprint {}", cli.input.display()))?;

    let mut out: Box<dyn Write> = match cli.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output: {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner} {pos} fingerprints")
            .context("Invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut count = 0usize;
    let mut peaks = 0usize;
    while let Some(fingerprint) = fingerprinter.next_fingerprint() {
        write_fingerprint(&mut out, &fingerprint, format)?;
        count += 1;
        peaks += fingerprint.peak_count();
        pb.set_position(count as u64);

        if cli.limit.is_some_and(|limit| count >= limit) {
            log::info!("Reached limit of {} fingerprints", count);
            break;
        }
    }
    fingerprinter.stop();
    out.flush().context("Failed to flush output")?;

    pb.finish_and_clear();
    log::info!("Done! {} fingerprints, {} landmarks", count, peaks);
    Ok(())
}

fn write_fingerprint(out: &mut dyn Write, fingerprint: &Fingerprint, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, fingerprint).context("Failed to encode fingerprint")?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            write!(out, "{:>8}", fingerprint.frame_index)?;
            for band in FrequencyBand::ALL {
                write!(out, "  {}: {:?}", band.label(), fingerprint.band(band))?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}
