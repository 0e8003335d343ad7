use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use ledger_anchor::anchor::{Reconciler, Scheduler};
use ledger_anchor::config::{init_tracing, Cli, Command, DatabaseArgs, LedgerArgs};
use ledger_anchor::ledger::evm::EvmLedger;
use ledger_anchor::ledger::{probe, Deadline, Ledger};
use ledger_anchor::server::{self, AppState};
use ledger_anchor::state::memory::MemoryStore;
use ledger_anchor::state::{AnchorStore, Database, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Command::Serve {
            server: server_args,
            database,
            ledger,
            scheduler,
        } => {
            let scheduler_config = scheduler.scheduler_config()?;
            if database.memory_store {
                warn!("Using in-memory store; state is lost on exit");
                serve(Arc::new(MemoryStore::new()), &server_args.bind, &ledger, scheduler_config)
                    .await
            } else {
                let db = open_database(&database).await?;
                serve(Arc::new(db), &server_args.bind, &ledger, scheduler_config).await
            }
        }
        Command::RunOnce { database, ledger } => {
            if database.memory_store {
                run_once(Arc::new(MemoryStore::new()), &ledger).await
            } else {
                let db = open_database(&database).await?;
                run_once(Arc::new(db), &ledger).await
            }
        }
        Command::Migrate { database } => {
            database.validate_persistent()?;
            open_database(&database).await?;
            info!("Migrations applied");
            Ok(())
        }
    }
}

async fn open_database(args: &DatabaseArgs) -> anyhow::Result<Database> {
    args.validate()?;
    let url = args.database_url.as_deref().unwrap_or_default();

    let db = Database::connect(url, args.max_connections)
        .await
        .context("connecting to PostgreSQL")?;
    db.migrate().await.context("running migrations")?;
    Ok(db)
}

/// Connect, probe and record the ledger configuration.
///
/// Every failure here is logged and yields `None`: the HTTP API keeps
/// running without anchoring.
async fn init_ledger(args: &LedgerArgs, store: &dyn AnchorStore) -> Option<Arc<dyn Ledger>> {
    let config = match args.evm_config() {
        None => {
            warn!("No ledger configured, anchoring disabled");
            return None;
        }
        Some(Err(e)) => {
            error!(error = %e, "Invalid ledger configuration, anchoring disabled");
            return None;
        }
        Some(Ok(config)) => config,
    };

    let client = match EvmLedger::connect(config).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Ledger connection failed, anchoring disabled");
            return None;
        }
    };
    let snapshot = client.snapshot();

    let ledger: Arc<dyn Ledger> = Arc::new(Deadline::new(Arc::new(client), args.call_timeout()));

    if args.ledger_probe {
        if let Err(e) = probe(ledger.as_ref()).await {
            error!(error = %e, "Ledger probe failed, anchoring disabled");
            return None;
        }
    }

    if let Err(e) = store.record_ledger_config(&snapshot).await {
        warn!(error = %e, "Could not persist ledger configuration");
    }

    Some(ledger)
}

async fn serve<S: Store + 'static>(
    store: Arc<S>,
    bind: &str,
    ledger_args: &LedgerArgs,
    scheduler_config: ledger_anchor::anchor::SchedulerConfig,
) -> anyhow::Result<()> {
    let ledger = init_ledger(ledger_args, store.as_ref()).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = ledger.clone().map(|ledger| {
        let reconciler = Arc::new(Reconciler::new(store.clone(), ledger));
        let scheduler = Scheduler::new(reconciler, scheduler_config);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(rx).await })
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for shutdown signal");
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let state = AppState { store, ledger };
    server::serve(state, bind, shutdown_rx).await?;

    if let Some(task) = scheduler_task {
        task.await.context("scheduler task")?;
    }

    Ok(())
}

async fn run_once<S: Store + 'static>(store: Arc<S>, ledger_args: &LedgerArgs) -> anyhow::Result<()> {
    let ledger = init_ledger(ledger_args, store.as_ref())
        .await
        .context("ledger unavailable")?;

    let reconciler = Reconciler::new(store, ledger);
    let outcomes = reconciler.run_tick().await?;
    info!(passes = outcomes.len(), "Tick complete");
    Ok(())
}
