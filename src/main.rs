//! mystack CLI - start, stop and inspect per-user stacks

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use mystack::config::{OrchestratorConfig, PartialFailurePolicy, Timing};
use mystack::platform::{create_client, KubePlatform};
use mystack::store::FileSpecStore;
use mystack::telemetry::{init_logging, LogFormat};
use mystack::Orchestrator;

/// mystack - isolated per-user application stacks on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "mystack", version, about, long_about = None)]
struct Cli {
    /// Log output format: text or json
    #[arg(long, env = "MYSTACK_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Path to a kubeconfig; inferred when omitted
    #[arg(long, env = "MYSTACK_KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,

    /// Directory holding `<name>.yaml` stack specifications
    #[arg(long, env = "MYSTACK_SPECS_DIR", default_value = ".", global = true)]
    specs_dir: PathBuf,

    /// Polling period used when a specification omits period-seconds
    #[arg(
        long,
        env = "MYSTACK_DEFAULT_PERIOD_SECONDS",
        default_value_t = mystack::config::DEFAULT_PERIOD_SECONDS,
        global = true
    )]
    default_period_seconds: u32,

    /// Timeout used when a specification omits its timeout
    #[arg(
        long,
        env = "MYSTACK_DEFAULT_TIMEOUT_SECONDS",
        default_value_t = mystack::config::DEFAULT_TIMEOUT_SECONDS,
        global = true
    )]
    default_timeout_seconds: u32,

    /// Delete the namespace when creation fails part-way
    #[arg(long, env = "MYSTACK_CLEANUP_ON_FAILURE", global = true)]
    cleanup_on_failure: bool,

    /// After delete, wait up to this many seconds for the namespace to disappear
    #[arg(long, env = "MYSTACK_WAIT_FOR_DELETION_SECONDS", global = true)]
    wait_for_deletion_seconds: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a stack for a user and wait until it is ready
    Run {
        /// Owner of the stack
        username: String,
        /// Name of the stack specification
        stack: String,
    },

    /// Delete a user's stack
    Delete {
        /// Owner of the stack
        username: String,
    },

    /// List the routable hostnames of a user's stack
    Apps {
        /// Owner of the stack
        username: String,
    },
}

impl GlobalArgs {
    fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            default_timing: Timing::new(self.default_period_seconds, self.default_timeout_seconds),
            partial_failure: if self.cleanup_on_failure {
                PartialFailurePolicy::DeleteNamespace
            } else {
                PartialFailurePolicy::LeavePartial
            },
            deletion_wait: self
                .wait_for_deletion_seconds
                .map(|timeout| Timing::new(mystack::config::DEFAULT_PERIOD_SECONDS, timeout)),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format)?;

    let client = create_client(cli.global.kubeconfig.as_deref()).await?;
    let config = cli.global.orchestrator_config();
    let platform = KubePlatform::new(client).with_field_manager(config.field_manager.clone());
    let store = FileSpecStore::new(&cli.global.specs_dir);

    let orchestrator = Orchestrator::builder(Arc::new(platform), Arc::new(store))
        .config(config)
        .build();

    match cli.command {
        Commands::Run { username, stack } => {
            orchestrator.create(&username, &stack).await?;
            info!(user = %username, stack = %stack, "stack is running");
        }
        Commands::Delete { username } => {
            orchestrator.delete(&username).await?;
            info!(user = %username, "stack deleted");
        }
        Commands::Apps { username } => {
            for hostname in orchestrator.apps(&username).await? {
                println!("{hostname}");
            }
        }
    }

    Ok(())
}
