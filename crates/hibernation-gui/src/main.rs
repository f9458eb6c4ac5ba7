use anyhow::{Context, Result};
use clap::Parser;
use hibernation_core::config::DEFAULT_CONFIG_PATH;
use hibernation_core::{Config, HibernationHelper, VERSION};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod ui;

/// Hibernation Helper - check, enable, test and disable Linux hibernation
#[derive(Parser, Debug)]
#[command(name = "hibernation-helper")]
#[command(version = VERSION)]
#[command(about = "Hibernation Helper - set up and test Linux hibernation", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "HIBERNATION_HELPER_CONFIG")]
    config: PathBuf,

    /// Write the default configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "hibernation_core=trace"
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(output) = cli.generate_config {
        return generate_config(&output);
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let log_dir = init_logging(&config, cli.log_level.as_deref())?;
    info!(
        "Hibernation Helper v{} starting, logs in {}",
        VERSION,
        log_dir.display()
    );

    let helper = Arc::new(HibernationHelper::from_config(config));
    app::run(helper)?;

    info!("Hibernation Helper exiting");
    Ok(())
}

/// Generate default configuration file
fn generate_config(output: &Path) -> Result<()> {
    Config::default()
        .save_to_file(output)
        .with_context(|| format!("Failed to save configuration file {}", output.display()))?;

    println!("Configuration written to {}", output.display());
    Ok(())
}

fn log_dir(config: &Config) -> PathBuf {
    config
        .logging
        .log_dir
        .clone()
        .or_else(|| dirs::state_dir().map(|dir| dir.join("hibernation-helper")))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

/// Initialize file logging. The terminal belongs to the UI, so nothing goes to stdout.
fn init_logging(config: &Config, level: Option<&str>) -> Result<PathBuf> {
    let dir = log_dir(config);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&dir, "hibernation-helper.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log filter: {}", level))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .with(filter)
        .init();

    // Prevent _guard from being dropped
    std::mem::forget(_guard);

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["hibernation-helper"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.generate_config.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "hibernation-helper",
            "--config",
            "/tmp/hh.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/hh.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_generate_config_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        generate_config(&path).unwrap();
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_log_dir_prefers_configured() {
        let mut config = Config::default();
        config.logging.log_dir = Some(PathBuf::from("/var/log/hibernation-helper"));
        assert_eq!(log_dir(&config), PathBuf::from("/var/log/hibernation-helper"));
    }
}
