use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use super::args::BaseArgs;
use super::commands;
use crate::entity::Timestamp;
use crate::error::StoreError;
use crate::operation::{AsyncOperation, OperationTracker, UserNotifier};
use crate::progress::{NullIndicator, ProgressIndicator};
use crate::rest::RestClient;
use crate::service::Services;
use crate::transport::HttpTransport;
use crate::worker::WorkerPool;

#[derive(Parser)]
#[command(name = "fieldstore")]
#[command(about = "Inspect and maintain a fieldstore backend")]
struct Cli {
    #[command(flatten)]
    args: BaseArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print change log entries for a collection
    Changes {
        /// Collection name, e.g. `missions`
        collection: String,
        /// Only entries at or after this time (milliseconds since the epoch)
        #[arg(long, default_value_t = 0)]
        since: Timestamp,
    },
    /// Delete old change log entries from every tracked collection
    Prune {
        /// Delete entries at or before this time instead of applying the retention period
        #[arg(long)]
        before: Option<Timestamp>,
    },
    /// Check whether a mission name is taken
    NameExists { name: String },
    /// List the public missions of a city, or one owner's private ones
    Missions {
        #[arg(long)]
        city: String,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Update the local mission snapshot of an owner from the change log
    Sync {
        #[arg(long)]
        owner: String,
    },
}

impl Commands {
    fn indicator(&self) -> &'static str {
        match self {
            Commands::Changes { .. } | Commands::Missions { .. } | Commands::NameExists { .. } => {
                "Loading"
            }
            Commands::Prune { .. } => "Pruning",
            Commands::Sync { .. } => "Syncing",
        }
    }
}

/// Prints user messages on stderr, keeping stdout for results.
struct StderrNotifier;

impl UserNotifier for StderrNotifier {
    fn notify(&self, message: &str) {
        eprintln!("{message}");
    }
}

fn indicator(progress: bool) -> Box<dyn ProgressIndicator> {
    #[cfg(feature = "progress_bar")]
    if progress {
        return Box::new(crate::progress::ConsoleIndicator);
    }
    let _ = progress;
    Box::new(NullIndicator)
}

/// Runs `work` on the worker pool as one tracked operation and waits for its outcome.
fn run_operation<F>(
    runtime: &tokio::runtime::Runtime,
    pool: &WorkerPool,
    tracker: &OperationTracker,
    label: &str,
    work: F,
) -> Result<Value>
where
    F: Future<Output = Result<Value, StoreError>> + Send + 'static,
{
    let outcome: Rc<RefCell<Option<Result<Value, String>>>> = Rc::new(RefCell::new(None));
    let on_value = outcome.clone();
    let on_error = outcome.clone();
    let operation = AsyncOperation::new(pool.submit(work))
        .indicator(label)
        .on_success(move |value| *on_value.borrow_mut() = Some(Ok(value.unwrap_or(Value::Null))))
        .on_exception(move |e| *on_error.borrow_mut() = Some(Err(e.to_string())));
    runtime.block_on(operation.start(tracker));

    let result = outcome.borrow_mut().take();
    match result {
        Some(Ok(value)) => Ok(value),
        Some(Err(message)) => Err(anyhow!(message)),
        None => Err(anyhow!("the request ended without a result")),
    }
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.args.apply_logging()?;
    let config = cli.args.store_config()?;

    let transport = HttpTransport::from_config(&config)?;
    let services = Services::new(RestClient::new(Arc::new(transport)), &config);
    let pool = WorkerPool::from_config(&config)?;
    let tracker = OperationTracker::new(indicator(cli.args.progress), StderrNotifier);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let label = cli.command.indicator();
    let output = match cli.command {
        Commands::Changes { collection, since } => run_operation(
            &runtime,
            &pool,
            &tracker,
            label,
            commands::changes(services, collection, since),
        ),
        Commands::Prune { before } => run_operation(
            &runtime,
            &pool,
            &tracker,
            label,
            commands::prune(services, before, config.change_log_retention),
        ),
        Commands::NameExists { name } => run_operation(
            &runtime,
            &pool,
            &tracker,
            label,
            commands::name_exists(services, name),
        ),
        Commands::Missions { city, owner } => run_operation(
            &runtime,
            &pool,
            &tracker,
            label,
            commands::missions(services, city, owner),
        ),
        Commands::Sync { owner } => {
            let snapshots = config.snapshots()?;
            run_operation(
                &runtime,
                &pool,
                &tracker,
                label,
                commands::sync(services, snapshots, owner),
            )
        }
    }?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
