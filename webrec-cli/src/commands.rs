//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Subcommand;
use webrec_core::recording::{RecordingReport, finalize_file, inspect_file};
use webrec_core::{DurationStrategy, WebrecConfig};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the recording server
    Server {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Where finished recordings are written and served from
        #[arg(long)]
        recordings_dir: Option<PathBuf>,
        /// Where media is buffered while a recording is in progress
        #[arg(long)]
        scratch_dir: Option<PathBuf>,
        /// Static site served at /
        #[arg(long)]
        public_dir: Option<PathBuf>,
        /// How recording durations are computed
        #[arg(long, value_enum)]
        duration_strategy: Option<DurationStrategy>,
    },
    /// Show header metadata and timing of a WebM file
    Inspect {
        /// File to inspect
        file: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Finalize a raw captured stream into a seekable recording
    Finalize {
        /// Raw capture (header followed by clusters)
        input: PathBuf,
        /// Destination file
        output: PathBuf,
        /// How the duration is computed
        #[arg(long, value_enum, default_value_t = DurationStrategy::Content)]
        strategy: DurationStrategy,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Server {
            host,
            port,
            recordings_dir,
            scratch_dir,
            public_dir,
            duration_strategy,
        } => {
            // Flags override environment, which overrides defaults
            let mut config = WebrecConfig::from_env();
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = recordings_dir {
                config.storage.recordings_dir = dir;
            }
            if let Some(dir) = scratch_dir {
                config.storage.scratch_dir = dir;
            }
            if public_dir.is_some() {
                config.server.public_dir = public_dir;
            }
            if let Some(strategy) = duration_strategy {
                config.recording.duration_strategy = strategy;
            }
            webrec_web::run_server(config)
                .await
                .context("server failed")
        }
        Commands::Inspect { file, json } => inspect(&file, json).await,
        Commands::Finalize {
            input,
            output,
            strategy,
        } => finalize(input, output, strategy).await,
    }
}

async fn inspect(file: &Path, json: bool) -> anyhow::Result<()> {
    let path = file.to_path_buf();
    let report = tokio::task::spawn_blocking(move || inspect_file(&path))
        .await?
        .with_context(|| format!("cannot inspect {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

async fn finalize(
    input: PathBuf,
    output: PathBuf,
    strategy: DurationStrategy,
) -> anyhow::Result<()> {
    if strategy == DurationStrategy::Timing {
        bail!("timing-based duration needs a live session; use --strategy content");
    }

    let report = tokio::task::spawn_blocking(move || finalize_file(&input, &output))
        .await?
        .context("finalize failed")?;

    println!(
        "Wrote {} ({} media bytes, duration {:.0} ms)",
        report.path.display(),
        report.media_bytes,
        report.content_duration_ms().unwrap_or_default()
    );
    Ok(())
}

fn print_report(report: &RecordingReport) {
    let header = &report.header;
    let info = &header.info;

    println!("File:           {}", report.path.display());
    println!(
        "DocType:        {} (version {})",
        header.ebml.doc_type, header.ebml.doc_type_version
    );
    println!("Header bytes:   {}", report.header_bytes);
    println!("Media bytes:    {}", report.media_bytes);
    println!("TimecodeScale:  {} ns", info.timecode_scale);
    match info.duration_ms() {
        Some(ms) => println!("Duration:       {ms:.0} ms (stored)"),
        None => println!("Duration:       not set"),
    }
    match report.content_duration_ms() {
        Some(ms) => println!("Content span:   {ms:.0} ms"),
        None => println!("Content span:   no blocks"),
    }
    println!(
        "Clusters:       {} with {} blocks",
        report.span.clusters, report.span.blocks
    );
    if let Some(recorded_at) = info.recorded_at() {
        println!("Recorded at:    {}", recorded_at.to_rfc3339());
    }
    if let Some(app) = &info.writing_app {
        println!("Writing app:    {app}");
    }
    for track in &header.tracks.entries {
        println!(
            "Track {}:        {} {}",
            track.number,
            track.kind(),
            track.codec_id
        );
    }
}
