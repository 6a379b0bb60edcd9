//! netverify - service-driven firewall verification
//!
//! Runs one verification stage (config, operational, or traffic) against the
//! managed device, or pushes configuration derived from the service
//! inventory. Exits non-zero when the stage fails.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netverify_assertions::Stage;
use netverify_verifier::device::{apply_candidate, JunosRestDriver};
use netverify_verifier::output::{self, OutputFormat};
use netverify_verifier::{logging, Config, Verifier, VerifyError};
use tokio::sync::watch;
use tracing::{info, warn};

/// Verify a managed firewall against the services the cluster exposes.
#[derive(Debug, Parser)]
#[command(name = "netverify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Address where service node ports are exposed.
    #[arg(long, global = true, env = "NETVERIFY_TARGET_HOST")]
    target_host: Option<String>,

    /// Device NETCONF port.
    #[arg(long, global = true, env = "NETVERIFY_DEVICE_PORT")]
    device_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one verification stage.
    Verify {
        /// Stage to run: config, operational, or traffic.
        stage: Stage,
    },

    /// Push configuration to the device.
    Configure {
        #[command(subcommand)]
        mode: ConfigureMode,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigureMode {
    /// Merge a baseline configuration file.
    Initial {
        /// Junos XML configuration to merge.
        #[arg(long)]
        file: PathBuf,
    },

    /// Push one application and permit policy per exposed service.
    Policy,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.target_host {
            config.target_host = Some(host.clone());
        }
        if let Some(port) = self.device_port {
            config.device.port = port;
        }
    }

    async fn run(self, config: Config, cancel: watch::Receiver<bool>) -> Result<()> {
        match self.command {
            Commands::Verify { stage } => {
                let verifier = Verifier::from_config(&config).await?.with_cancel(cancel);
                let verdict = verifier.verify(stage).await?;
                output::print_verdict(&verdict, self.format);

                let summary = verdict.summary().map_err(VerifyError::from)?;
                if self.format == OutputFormat::Table {
                    output::print_success(&output::summary_message(&summary));
                }
                Ok(())
            }
            Commands::Configure { mode } => {
                let password = config
                    .device
                    .password
                    .as_deref()
                    .context("NETVERIFY_DEVICE_PASSWORD is required to push configuration")?;
                let driver = JunosRestDriver::new(
                    &config.device_rest_url(),
                    &config.device.username,
                    password,
                    config.http_timeout,
                )?;

                match mode {
                    ConfigureMode::Initial { file } => {
                        let candidate = std::fs::read_to_string(&file)
                            .with_context(|| format!("failed to read {}", file.display()))?;
                        apply_candidate(&driver, &candidate).await?;
                        output::print_success(&format!("Merged {}", file.display()));
                    }
                    ConfigureMode::Policy => {
                        let verifier = Verifier::from_config(&config).await?.with_cancel(cancel);
                        let services = verifier.configure_policies(&driver).await?;
                        output::print_success(&format!(
                            "Committed policies for {services} service(s)"
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    cli.apply_overrides(&mut config);
    logging::init(&config.log_level, config.log_format)?;

    info!(
        checker_url = %config.checker_url,
        coordinator_url = %config.coordinator_url,
        device = %config.device.host,
        "Configuration loaded"
    );

    // Ctrl-C cancels any barrier wait in progress
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    if let Err(e) = cli.run(config, cancel_rx).await {
        output::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
