//! Command implementations

pub mod config;
pub mod update_packages;
pub mod user;

use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use crate::app::AppContext;
use crate::application::command::{DryRun, SpellCommand};
use crate::application::connection::ConnectionManager;
use crate::application::ports::ConfigStore;
use crate::application::runner::Runner;
use crate::domain::config::{SpellConfig, parse_config};
use crate::domain::filter::TargetFilter;
use crate::domain::result::{all_succeeded, sort_records_by_target};
use crate::domain::run::{DEFAULT_BATCH_SIZE, RunOptions, RunType};
use crate::domain::target::{PortRange, TargetConfig};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::juju::JujuCliDialer;
use crate::infra::network::TokioNetworkProbe;
use crate::infra::tunnel::SshTunnelLauncher;

/// Target selection and dispatch flags shared by every command.
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    /// Dispatch strategy
    #[arg(long, default_value = "serial", value_parser = ["serial", "batch", "parallel"])]
    pub run_type: String,

    /// Targets per batch with `--run-type batch`
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: NonZeroUsize,

    /// Select controllers, e.g. "customer=acme,globex tags=prod"
    #[arg(long)]
    pub filter: Option<TargetFilter>,

    /// Models to act on (names, regexes or model-mapping keys)
    #[arg(long, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Ping every controller first and stop if any is unreachable
    #[arg(long)]
    pub pre_check: bool,

    /// Report what would run without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Per-controller timeout in seconds
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,
}

impl TargetArgs {
    /// Run options for these flags; `port_range` comes from the global config.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown run type.
    pub fn run_options(&self, port_range: Option<PortRange>) -> Result<RunOptions> {
        Ok(RunOptions {
            run_type: RunType::from_name(&self.run_type, self.batch_size)?,
            pre_check: self.pre_check,
            port_range,
            target_timeout: Duration::from_secs(self.timeout),
        })
    }
}

/// Load and validate the global and personal configuration.
///
/// # Errors
///
/// Returns an error if a file is missing or unreadable, or fails validation.
pub fn load_config(store: &impl ConfigStore) -> Result<SpellConfig> {
    let path = store.path()?;
    let (global, personal) = store.load_sources()?;
    parse_config(global, personal).with_context(|| format!("in {}", path.display()))
}

/// Controllers selected by `--filter`, in config order.
///
/// # Errors
///
/// Returns an error when a non-empty filter matches nothing.
pub fn select_targets(config: SpellConfig, args: &TargetArgs) -> Result<Vec<TargetConfig>> {
    let filter = args.filter.clone().unwrap_or_default();
    Ok(filter.apply(config.controllers)?)
}

fn confirmation_prompt(summary: &str, targets: &[TargetConfig]) -> String {
    let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
    format!(
        "Run '{summary}' on {} controller(s) [{}]?",
        targets.len(),
        names.join(", ")
    )
}

/// Runs `command` on the selected controllers and renders the records.
///
/// Returns `true` when every controller succeeded.
///
/// # Errors
///
/// Returns an error for configuration problems, a declined-prompt failure,
/// an unsupported strategy, or a rendering failure.
pub async fn execute<S: SpellCommand>(app: &AppContext, args: &TargetArgs, command: S) -> Result<bool> {
    let config = load_config(&app.config_store)?;
    let port_range = config.connection.port_range;
    let targets = select_targets(config, args)?;
    let options = args.run_options(port_range)?;

    if command.is_mutating()
        && !args.dry_run
        && !app.confirm(&confirmation_prompt(&command.summary(), &targets))?
    {
        app.output.warn("Cancelled.");
        return Ok(true);
    }

    info!(
        command = command.name(),
        targets = targets.len(),
        dry_run = args.dry_run,
        "dispatching"
    );

    let manager = ConnectionManager::new(
        JujuCliDialer::new(TokioCommandRunner::default()),
        SshTunnelLauncher::new(TokioCommandRunner::default()),
        TokioNetworkProbe,
    );
    let runner = Runner::new(&manager);
    let run = async {
        if args.dry_run {
            runner.run(&targets, &DryRun(&command), options).await
        } else {
            runner.run(&targets, &command, options).await
        }
    };
    let mut records = tokio::select! {
        records = run => records?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, releasing connections");
            for error in manager.release_all().await {
                warn!(error = %error, "connection release failed");
            }
            anyhow::bail!("interrupted");
        }
    };
    if options.run_type.is_concurrent() {
        sort_records_by_target(&mut records);
    }

    app.renderer().render_records(&records)?;
    Ok(all_succeeded(&records))
}
