/// Command line and environment configuration.
///
/// Every flag can also be set through the environment variable named next
/// to it; a `.env` file in the working directory is loaded first.
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::anchor::SchedulerConfig;
use crate::crypto::sensitive::SecretHex;
use crate::error::{AnchorError, Result};
use crate::ledger::evm::EvmConfig;

pub const DEFAULT_LOG_FILTER: &str = "ledger_anchor=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "ledger-anchor")]
#[command(about = "Notarizes campus records on an EVM ledger in batched reconciler passes")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API and the periodic reconciler
    Serve {
        #[command(flatten)]
        server: ServerArgs,
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        ledger: LedgerArgs,
        #[command(flatten)]
        scheduler: SchedulerArgs,
    },
    /// Run exactly one reconciler tick and exit
    RunOnce {
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        ledger: LedgerArgs,
    },
    /// Apply pending database migrations and exit
    Migrate {
        #[command(flatten)]
        database: DatabaseArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Listen address for the HTTP API
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: String,
}

#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "10")]
    pub max_connections: u32,

    /// Keep all state in process memory (development only)
    #[arg(long, env = "MEMORY_STORE", default_value = "false")]
    pub memory_store: bool,
}

impl DatabaseArgs {
    pub fn validate(&self) -> Result<()> {
        if !self.memory_store && self.database_url.as_deref().is_none_or(str::is_empty) {
            return Err(AnchorError::Config(
                "DATABASE_URL is required unless --memory-store is set".into(),
            ));
        }
        Ok(())
    }

    /// Like [`validate`](Self::validate), for commands that only make sense
    /// against PostgreSQL.
    pub fn validate_persistent(&self) -> Result<()> {
        if self.memory_store {
            return Err(AnchorError::Config(
                "--memory-store has no schema to migrate; set DATABASE_URL instead".into(),
            ));
        }
        self.validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// JSON-RPC endpoint of the EVM node
    #[arg(long, env = "LEDGER_RPC_URL")]
    pub ledger_rpc_url: Option<String>,

    /// Deployed notarization contract address
    #[arg(long, env = "LEDGER_CONTRACT_ADDRESS")]
    pub ledger_contract_address: Option<String>,

    /// Hex private key of the signing account
    #[arg(long, env = "LEDGER_PRIVATE_KEY", hide_env_values = true)]
    pub ledger_private_key: Option<SecretHex>,

    /// maxFeePerGas in wei (0 = node gas price)
    #[arg(long, env = "LEDGER_GAS_FEE_CAP", default_value = "0")]
    pub gas_fee_cap: u64,

    /// Gas limit per write (0 = node estimate)
    #[arg(long, env = "LEDGER_GAS_LIMIT", default_value = "0")]
    pub gas_limit: u64,

    /// Deadline for every ledger call, in seconds
    #[arg(long, env = "LEDGER_TIMEOUT_SECS", default_value = "30")]
    pub ledger_timeout_secs: u64,

    /// Receipt polling interval, in milliseconds
    #[arg(long, env = "LEDGER_RECEIPT_POLL_MS", default_value = "1000")]
    pub receipt_poll_ms: u64,

    /// Verify the contract round-trip with the sentinel key at startup
    #[arg(long, env = "LEDGER_PROBE", default_value = "true", action = clap::ArgAction::Set)]
    pub ledger_probe: bool,
}

impl LedgerArgs {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }

    /// `None` when no ledger is configured at all; an error when it is
    /// only partly configured or malformed.
    pub fn evm_config(&self) -> Option<Result<EvmConfig>> {
        let (url, address, key) = match (
            self.ledger_rpc_url.as_ref().filter(|v| !v.is_empty()),
            self.ledger_contract_address.as_ref().filter(|v| !v.is_empty()),
            self.ledger_private_key.as_ref().filter(|k| !k.is_empty()),
        ) {
            (None, None, None) => return None,
            (Some(url), Some(address), Some(key)) => (url, address, key),
            _ => {
                return Some(Err(AnchorError::Config(
                    "LEDGER_RPC_URL, LEDGER_CONTRACT_ADDRESS and LEDGER_PRIVATE_KEY must be set together"
                        .into(),
                )))
            }
        };

        if !key.is_well_formed() {
            return Some(Err(AnchorError::Config(
                "LEDGER_PRIVATE_KEY must be 32 bytes of hex".into(),
            )));
        }
        if self.ledger_timeout_secs == 0 {
            return Some(Err(AnchorError::Config(
                "LEDGER_TIMEOUT_SECS must be positive".into(),
            )));
        }

        Some(Ok(EvmConfig {
            rpc_url: url.clone(),
            contract_address: address.clone(),
            private_key: key.clone(),
            gas_fee_cap: self.gas_fee_cap,
            gas_limit: self.gas_limit,
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_ms.max(1)),
            call_timeout: self.call_timeout(),
        }))
    }
}

#[derive(Args, Debug, Clone)]
pub struct SchedulerArgs {
    /// Seconds between reconciler ticks
    #[arg(long, env = "ANCHOR_PERIOD_SECS", default_value = "60")]
    pub anchor_period_secs: u64,

    /// Run the first tick at startup instead of after one period
    #[arg(long, env = "ANCHOR_RUN_IMMEDIATELY", default_value = "false")]
    pub anchor_run_immediately: bool,
}

impl SchedulerArgs {
    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        if self.anchor_period_secs == 0 {
            return Err(AnchorError::Config(
                "ANCHOR_PERIOD_SECS must be positive".into(),
            ));
        }
        Ok(SchedulerConfig {
            period: Duration::from_secs(self.anchor_period_secs),
            run_immediately: self.anchor_run_immediately,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Filter used when RUST_LOG is unset
    #[arg(long, env = "LOG_FILTER", default_value = DEFAULT_LOG_FILTER, global = true)]
    pub log_filter: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON", default_value = "false", global = true)]
    pub log_json: bool,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `--log-filter`.
pub fn init_tracing(args: &LogArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_filter));

    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
