use clap::Parser;

use std::path::PathBuf;

use eni_routing_lib::{config, logging};

pub const ENV_VAR_DOWNGRADE: &str = "ENI_ROUTING_DOWNGRADE";

/// Migrates per-interface policy routing between the legacy and current addressing schemes
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Configuration file holding the interface inventory
    #[arg(
        short,
        long,
        env = config::ENV_VAR,
        default_value = config::DEFAULT_PATH,
        )]
    pub config_path: PathBuf,

    /// Move interfaces back from the current to the legacy scheme
    #[arg(long, env = ENV_VAR_DOWNGRADE)]
    pub downgrade: bool,

    /// Write logs to this file instead of stdout
    #[arg(long, env = logging::ENV_VAR_LOG_FILE, default_value = None)]
    pub log_file: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
