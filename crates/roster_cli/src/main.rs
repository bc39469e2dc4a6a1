//! roster maintenance CLI.
//!
//! # Responsibility
//! - Run drift checks and reconciliation against a store file.
//! - Print a member's eligible items for support investigations.
//! - Emit machine-readable JSON on stdout; diagnostics go to stderr.

use clap::{Parser, Subcommand};
use log::error;
use roster_core::{
    open_db_with_timeout, CanonicalId, EligibilityResolver, MemberRepository, MembershipReconciler,
    RosterConfig, SqliteDocumentStore, StoreGroupRepository, StoreItemRepository,
    StoreMemberRepository,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit status when the store was busy and the command may be retried.
const EXIT_TEMPFAIL: u8 = 75;

/// roster - membership reconciliation and eligibility
#[derive(Parser, Debug)]
#[command(name = "roster")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite store path; overrides config and environment
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print core linkage info
    Ping,

    /// Report membership drift without writing
    Check,

    /// Rebuild group membership caches
    Reconcile {
        /// Only this group
        #[arg(long)]
        group: Option<String>,
    },

    /// List items a member is eligible to see
    Eligible {
        /// Member id (plain or 24-hex)
        member: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            if failure.transient {
                ExitCode::from(EXIT_TEMPFAIL)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

struct Failure {
    message: String,
    transient: bool,
}

impl Failure {
    fn fatal(message: impl ToString) -> Self {
        Self {
            message: message.to_string(),
            transient: false,
        }
    }

    fn from_error(err: impl std::fmt::Display, transient: bool) -> Self {
        Self {
            message: err.to_string(),
            transient,
        }
    }
}

fn load_config(cli: &Cli) -> Result<RosterConfig, Failure> {
    let base = match &cli.config {
        Some(path) => RosterConfig::load(path).map_err(Failure::fatal)?,
        None => RosterConfig::default(),
    };
    let mut config = base.with_env_overrides().map_err(Failure::fatal)?;
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    if let Some(log_dir) = &config.log_dir {
        roster_core::init_logging(&config.log_level, log_dir).map_err(Failure::fatal)?;
    }
    Ok(config)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Failure> {
    let text = serde_json::to_string_pretty(value).map_err(Failure::fatal)?;
    println!("{text}");
    Ok(())
}

fn run(cli: Cli) -> Result<(), Failure> {
    if matches!(cli.command, Commands::Ping) {
        println!("roster_core ping={}", roster_core::ping());
        println!("roster_core version={}", roster_core::core_version());
        return Ok(());
    }

    let config = load_config(&cli)?;
    let db_path = config.db_path.clone().ok_or_else(|| {
        Failure::fatal("no store configured; pass --db or set ROSTER_DB_PATH")
    })?;
    let conn = open_db_with_timeout(&db_path, config.store_timeout())
        .map_err(|err| Failure::from_error(&err, err.is_transient()))?;
    let store = SqliteDocumentStore::new(&conn);
    let collections = &config.collections;
    let members = StoreMemberRepository::new(&store, collections.members.as_str());
    let groups = StoreGroupRepository::new(&store, collections.groups.as_str());

    match cli.command {
        Commands::Ping => Ok(()),
        Commands::Check => {
            let reconciler = MembershipReconciler::new(members, groups, config.member_role.as_str());
            let report = reconciler
                .check_drift()
                .map_err(|err| Failure::from_error(&err, err.is_transient()))?;
            print_json(&report)
        }
        Commands::Reconcile { group: None } => {
            let reconciler = MembershipReconciler::new(members, groups, config.member_role.as_str());
            let report = reconciler.reconcile_all().map_err(|err| {
                error!("event=cli_reconcile module=cli status=error error={err}");
                Failure::from_error(&err, err.is_transient())
            })?;
            print_json(&report)
        }
        Commands::Reconcile { group: Some(raw) } => {
            let group_id = CanonicalId::parse(&raw).map_err(Failure::fatal)?;
            let reconciler = MembershipReconciler::new(members, groups, config.member_role.as_str());
            let drift = reconciler
                .reconcile_group(&group_id)
                .map_err(|err| Failure::from_error(&err, err.is_transient()))?;
            print_json(&drift)
        }
        Commands::Eligible { member } => {
            let member_id = CanonicalId::parse(&member).map_err(Failure::fatal)?;
            let member = members
                .get_member(&member_id)
                .map_err(|err| Failure::from_error(&err, err.is_transient()))?
                .ok_or_else(|| Failure::fatal(format!("member not found: {member_id}")))?;
            let items = StoreItemRepository::new(&store, collections.items.as_str());
            let resolver = EligibilityResolver::new(groups, items);
            let eligibility = resolver
                .resolve(&member)
                .map_err(|err| Failure::from_error(&err, err.is_transient()))?;
            print_json(&eligibility)
        }
    }
}
