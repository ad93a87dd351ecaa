//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "earshot",
    about = "Streaming microphone speech recognition",
    version = &*crate::version_string().leak()
)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Recognition mode, selecting the model under <model-dir>/<mode>
    #[arg(long)]
    pub mode: Option<String>,

    /// Directory holding one model per mode
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Audio input device name (see `earshot devices`)
    #[arg(long)]
    pub device: Option<String>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, mut config: crate::config::Config) -> crate::config::Config {
        if let Some(mode) = &self.mode {
            config.recognition.mode = mode.clone();
        }
        if let Some(model_dir) = &self.model_dir {
            config.recognition.model_dir = model_dir.clone();
        }
        if let Some(device) = &self.device {
            config.audio.device = Some(device.clone());
        }
        config
    }
}
