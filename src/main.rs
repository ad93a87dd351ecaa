use anyhow::Context;
use clap::Parser;
use earshot::cli::{Cli, Commands};
use earshot::{Config, Controller, load_engine};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Devices) => list_devices(),
        None => run(cli).await,
    }
}

/// Logs go to stderr so piped transcripts on stdout stay clean.
fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "cpal-audio")]
fn list_devices() -> anyhow::Result<()> {
    let devices = earshot::audio::capture::list_devices()?;
    if devices.is_empty() {
        println!("No audio input devices found.");
    } else {
        for name in devices {
            println!("{}", name);
        }
    }
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_devices() -> anyhow::Result<()> {
    anyhow::bail!("this build has no audio device support; rebuild with `--features cpal-audio`")
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("earshot.toml"));
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?
        .with_env_overrides();
    let config = cli.apply_overrides(config);

    let engine = load_engine(&config).context("loading recognition engine")?;

    if std::io::stdin().is_terminal() {
        run_microphone(&config, engine).await
    } else {
        run_pipe(&config, engine).await
    }
}

#[cfg(feature = "cpal-audio")]
async fn run_microphone(
    config: &Config,
    engine: Box<dyn earshot::RecognitionEngine>,
) -> anyhow::Result<()> {
    use earshot::audio::capture::{CpalCaptureSource, suppress_audio_warnings};
    use earshot::sink::StdoutSink;

    suppress_audio_warnings();
    let capture = CpalCaptureSource::new(config.audio.device.as_deref(), config.audio.sample_rate)?;

    let mut controller = Controller::new(
        config,
        Box::new(capture),
        engine,
        Box::new(StdoutSink),
    )?;
    controller.start()?;
    eprintln!("(Press Ctrl-C to stop)");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    controller.stop()?;
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
async fn run_microphone(
    _config: &Config,
    _engine: Box<dyn earshot::RecognitionEngine>,
) -> anyhow::Result<()> {
    anyhow::bail!(
        "this build has no microphone support; rebuild with `--features cpal-audio` \
         or pipe WAV data on stdin"
    )
}

/// Transcribe WAV data from stdin, then exit once the queue is drained.
async fn run_pipe(
    config: &Config,
    engine: Box<dyn earshot::RecognitionEngine>,
) -> anyhow::Result<()> {
    use earshot::audio::capture::WavCaptureSource;
    use earshot::sink::StdoutSink;

    let capture =
        WavCaptureSource::from_stdin(config.audio.sample_rate).context("reading WAV from stdin")?;

    let mut controller = Controller::new(
        config,
        Box::new(capture),
        engine,
        Box::new(StdoutSink),
    )?;
    controller.start()?;
    controller.drain()?;
    Ok(())
}
