use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use clap::{self, Parser};

use seisfetch::{FdsnClient, FileNameFormat, FileWriter, OutputFormat, RequestSpec, Retriever};

/// Download segmented waveforms from an FDSN data center.
///
/// Settings come from a JSON file, flags override single fields. Without a
/// file every setting up to --output-dir must be given as a flag.
#[derive(clap::Parser)]
#[command(version)]
struct Cmd {
    /// JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Data center name (IRIS, GFZ, ...) or base URL
    #[arg(long)]
    client: Option<String>,
    #[arg(long)]
    network: Option<String>,
    /// Comma separated station codes, wildcards allowed
    #[arg(long)]
    stations: Option<String>,
    /// Comma separated channel codes, wildcards allowed
    #[arg(long)]
    channels: Option<String>,
    /// e.g. 2014-08-01T00:00:00Z
    #[arg(long)]
    start: Option<DateTime<Utc>>,
    #[arg(long)]
    end: Option<DateTime<Utc>>,
    /// Segment length in seconds
    #[arg(long)]
    duration: Option<f64>,
    /// Distinct channels a segment must contain
    #[arg(long)]
    channel_count: Option<usize>,
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    location: Option<String>,
    /// Reject segments more than one sample short
    #[arg(long)]
    strict_length: bool,
    /// strftime pattern for the file name timestamp, or "default"
    #[arg(long)]
    file_name_format: Option<FileNameFormat>,
    /// sac or mseed3
    #[arg(long)]
    format: Option<OutputFormat>,
    /// Detrend and remove the instrument response
    #[arg(long)]
    preprocess: bool,
    /// Lowpass at 2.5 Hz and resample to 1 Hz before response removal
    #[arg(long)]
    filter_resample: bool,
    /// Network timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,
    /// More logging, repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn required<T>(value: Option<T>, flag: &str) -> anyhow::Result<T> {
    value.ok_or_else(|| anyhow!("--{} is required without --config", flag))
}

impl Cmd {
    fn request(self) -> anyhow::Result<RequestSpec> {
        let mut spec = match &self.config {
            Some(path) => RequestSpec::from_json_file(path)?,
            None => RequestSpec::new(
                &required(self.client.clone(), "client")?,
                &required(self.network.clone(), "network")?,
                &required(self.stations.clone(), "stations")?,
                &required(self.channels.clone(), "channels")?,
                required(self.start, "start")?,
                required(self.end, "end")?,
                required(self.duration, "duration")?,
                required(self.channel_count, "channel-count")?,
                required(self.output_dir.clone(), "output-dir")?,
            ),
        };
        if let Some(v) = self.client {
            spec.client = v;
        }
        if let Some(v) = self.network {
            spec.network = v;
        }
        if let Some(v) = self.stations {
            spec.stations = v;
        }
        if let Some(v) = self.channels {
            spec.channels = v;
        }
        if let Some(v) = self.start {
            spec.start_time = v;
        }
        if let Some(v) = self.end {
            spec.end_time = v;
        }
        if let Some(v) = self.duration {
            spec.segment_duration = v;
        }
        if let Some(v) = self.channel_count {
            spec.channel_count = v;
        }
        if let Some(v) = self.output_dir {
            spec.output_dir = v;
        }
        if let Some(v) = self.location {
            spec.location = v;
        }
        if let Some(v) = self.file_name_format {
            spec.file_name_format = v;
        }
        if let Some(v) = self.format {
            spec.output_format = v;
        }
        if let Some(v) = self.timeout {
            spec.timeout = v;
        }
        spec.strict_length |= self.strict_length;
        spec.preprocess |= self.preprocess;
        spec.filter_resample |= self.filter_resample;
        Ok(spec)
    }
}

fn run(spec: RequestSpec) -> anyhow::Result<()> {
    let timeout = Duration::try_from_secs_f64(spec.timeout)
        .map_err(|e| anyhow!("invalid timeout {}: {}", spec.timeout, e))?;
    let client = FdsnClient::new(&spec.client, timeout)?;
    let writer = FileWriter::new(spec.output_format);
    log::info!(
        "{} {}.{} [{}] {} to {} in {} s segments -> {}",
        client.name(),
        spec.network,
        spec.stations,
        spec.channels,
        spec.start_time,
        spec.end_time,
        spec.segment_duration,
        spec.output_dir.display()
    );
    Retriever::new(spec, client, writer).run()?;
    Ok(())
}

fn main() -> ExitCode {
    let cmd = Cmd::parse();
    let level = match cmd.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();

    let result = cmd.request().and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
