//! Leasehold command-line tool.
//!
//! Provides the `leasehold` binary for operating on a lock database:
//! hold a lease until interrupted, inspect lock rows, run a sweep, or
//! force-release a lock left behind by a dead instance.
//!
//! Reads configuration from environment variables:
//! - `LEASEHOLD_DB_PATH`: SQLite database file path (default: "leasehold.db")
//! - `LEASEHOLD_*` timing overrides, see `LockConfig::from_env`

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use leasehold_coordinator::{LockConfig, LockCoordinator};
use leasehold_storage::{LockStore, SqliteLockStore};

const ENV_DB_PATH: &str = "LEASEHOLD_DB_PATH";
const DEFAULT_DB_PATH: &str = "leasehold.db";

/// Database-backed lease locks.
#[derive(Parser)]
#[command(name = "leasehold", about = "Database-backed lease locks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Acquire and keep a lease until Ctrl-C or the duration elapses.
    Hold {
        /// Path to the lock database file.
        #[arg(short, long)]
        db: Option<String>,

        /// Lock name.
        #[arg(short, long)]
        name: String,

        /// Give the lease up after this many seconds.
        #[arg(long)]
        for_secs: Option<u64>,
    },

    /// Print lock rows as JSON.
    Status {
        #[arg(short, long)]
        db: Option<String>,

        /// Only this lock.
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete rows expired for longer than the grace window.
    Sweep {
        #[arg(short, long)]
        db: Option<String>,

        /// Grace window in seconds (default: LEASEHOLD_SWEEP_GRACE_SECS).
        #[arg(long)]
        grace_secs: Option<u32>,
    },

    /// Delete a lock row on behalf of its holder.
    Release {
        #[arg(short, long)]
        db: Option<String>,

        #[arg(short, long)]
        name: String,

        /// Holder identity as shown by `status`.
        #[arg(long)]
        holder: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Hold { db, name, for_secs } => {
            run_hold(&db_path(db), &name, for_secs.map(Duration::from_secs)).await
        }
        Commands::Status { db, name } => run_status(&db_path(db), name.as_deref()),
        Commands::Sweep { db, grace_secs } => run_sweep(&db_path(db), grace_secs),
        Commands::Release { db, name, holder } => run_release(&db_path(db), &name, &holder),
    };
    process::exit(exit_code);
}

fn db_path(arg: Option<String>) -> String {
    arg.or_else(|| std::env::var(ENV_DB_PATH).ok())
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
}

fn load_config() -> Result<LockConfig, i32> {
    LockConfig::from_env().map_err(|e| {
        eprintln!("Error: invalid configuration: {}", e);
        1
    })
}

fn open_store(db_path: &str) -> Result<SqliteLockStore, i32> {
    SqliteLockStore::open(db_path).map_err(|e| {
        eprintln!("Error: failed to open database '{}': {}", db_path, e);
        3
    })
}

fn print_json(value: &serde_json::Value) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}

/// Execute the hold subcommand.
///
/// Returns exit code: 0 = clean shutdown, 1 = configuration error,
/// 3 = database error.
async fn run_hold(db_path: &str, name: &str, hold_for: Option<Duration>) -> i32 {
    let config = match load_config() {
        Ok(c) => c,
        Err(code) => return code,
    };
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let coordinator = match LockCoordinator::new(Arc::new(store), config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let lease = match coordinator.lease(name) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    lease.activate().await;
    tracing::info!(lease = %lease.status(), db = db_path, "holding lease");

    let expiry = async {
        match hold_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            } else {
                tracing::info!("interrupted");
            }
        }
        _ = expiry => tracing::info!("hold duration elapsed"),
    }

    lease.shutdown().await;
    coordinator.shutdown().await;
    0
}

/// Execute the status subcommand.
///
/// Returns exit code: 0 = success, 3 = database error.
fn run_status(db_path: &str, name: Option<&str>) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let records = match name {
        Some(name) => store.get(name).map(|rec| rec.into_iter().collect::<Vec<_>>()),
        None => store.list(),
    };
    match records {
        Ok(records) => {
            print_json(&serde_json::json!({ "locks": records }));
            0
        }
        Err(e) => {
            eprintln!("Error: failed to read locks: {}", e);
            3
        }
    }
}

/// Execute the sweep subcommand.
///
/// Returns exit code: 0 = success, 1 = configuration error,
/// 3 = database error.
fn run_sweep(db_path: &str, grace_secs: Option<u32>) -> i32 {
    let grace_secs = match grace_secs {
        Some(g) => g,
        None => match load_config() {
            Ok(c) => c.sweep_grace_secs,
            Err(code) => return code,
        },
    };
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    match store.clear_expired(grace_secs) {
        Ok(removed) => {
            tracing::info!(removed, grace_secs, "sweep finished");
            print_json(&serde_json::json!({ "removed": removed, "grace_secs": grace_secs }));
            0
        }
        Err(e) => {
            eprintln!("Error: sweep failed: {}", e);
            3
        }
    }
}

/// Execute the release subcommand.
///
/// Returns exit code: 0 = row deleted, 2 = no row held by that holder,
/// 3 = database error.
fn run_release(db_path: &str, name: &str, holder: &str) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    match store.release(name, holder) {
        Ok(released) => {
            print_json(&serde_json::json!({ "name": name, "holder": holder, "released": released }));
            if released {
                tracing::warn!(lock = name, holder, "lock force-released");
                0
            } else {
                2
            }
        }
        Err(e) => {
            eprintln!("Error: release failed: {}", e);
            3
        }
    }
}
