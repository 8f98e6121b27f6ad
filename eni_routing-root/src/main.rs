use std::path::Path;
use std::process;

use eni_routing_lib::config::{self, Config};
use eni_routing_lib::logging;
use eni_routing_lib::migrate::MigrationOutcome;

mod cli;

// Avoid musl's default allocator due to degraded performance
// https://nickb.dev/blog/default-musl-allocator-considered-harmful-to-performance
#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

async fn load_config(path: &Path) -> Result<Config, exitcode::ExitCode> {
    config::read(path).await.map_err(|err| match err {
        config::Error::NoFile => {
            tracing::error!(path = %path.display(), "configuration file not found");
            exitcode::NOINPUT
        }
        err => {
            tracing::error!(error = %err, path = %path.display(), "error reading configuration");
            exitcode::CONFIG
        }
    })
}

fn exit_status(outcome: &MigrationOutcome) -> Result<(), exitcode::ExitCode> {
    if outcome.failed > 0 {
        tracing::warn!(
            failed = outcome.failed,
            unreconciled = outcome.unreconciled.len(),
            "some interfaces were not migrated"
        );
        Err(exitcode::TEMPFAIL)
    } else {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
async fn migrate(config: Config, downgrade: bool) -> Result<MigrationOutcome, exitcode::ExitCode> {
    use eni_routing_lib::migrate::Migrator;
    use eni_routing_lib::routing::RealNetlinkOps;

    let inventory = config.inventory().map_err(|err| {
        tracing::error!(error = %err, "invalid interface inventory");
        exitcode::CONFIG
    })?;
    let netlink = RealNetlinkOps::connect().map_err(|err| {
        tracing::error!(error = %err, "error opening netlink socket");
        exitcode::OSERR
    })?;

    let migrator = Migrator::new(netlink, inventory).with_families(config.families);
    Ok(migrator.migrate_datapath(downgrade).await)
}

#[cfg(not(target_os = "linux"))]
async fn migrate(_config: Config, _downgrade: bool) -> Result<MigrationOutcome, exitcode::ExitCode> {
    tracing::error!("policy routing migration is only supported on linux");
    Err(exitcode::UNAVAILABLE)
}

async fn run(args: cli::Cli) -> Result<(), exitcode::ExitCode> {
    let config = load_config(&args.config_path).await?;
    tracing::debug!(
        families = ?config.families,
        interfaces = config.interfaces.len(),
        "configuration loaded"
    );
    let outcome = migrate(config, args.downgrade).await?;
    exit_status(&outcome)
}

/// a single migration run has no use for more than one thread
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = cli::parse();

    match &args.log_file {
        Some(path) => {
            if let Err(err) = logging::setup_log_file(path) {
                eprintln!("failed to open log file {}: {err}", path.display());
                process::exit(exitcode::CANTCREAT);
            }
        }
        None => logging::setup_stdout(),
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting {}",
        env!("CARGO_PKG_NAME")
    );

    match run(args).await {
        Ok(_) => (),
        Err(exitcode::OK) => (),
        Err(code) => {
            tracing::warn!("abnormal exit");
            process::exit(code);
        }
    }
}
