//! Salon Rewards: loyalty snapshot and fleet report tool.
//!
//! Opens a workspace's record store, recomputes every member's loyalty state
//! and prints the requested view as JSON for export collaborators.

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use salon_core::config::{AppConfig, StoreBackend};
use salon_core::event_bus::noop_sink;
use salon_core::loyalty::PurchaseEvent;
use salon_core::store::{InMemoryStore, JsonFileStore};
use salon_core::{Money, RecordStore};
use salon_loyalty::{MemberDirectory, MemberFilter, NewMember};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "salon-rewards")]
#[command(about = "Loyalty snapshots and fleet statistics for a salon workspace")]
#[command(version)]
struct Cli {
    /// Workspace (tenant) to open (overrides config)
    #[arg(long, env = "SALON_LOYALTY__WORKSPACE")]
    workspace: Option<String>,

    /// Store collections as JSON files under this directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enroll demo members with purchase history if the workspace is empty
    #[arg(long, default_value_t = false)]
    seed_demo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fleet-wide statistics
    Stats,
    /// Members with their loyalty snapshots
    Members {
        /// Free-text match on name, email or phone
        #[arg(long)]
        query: Option<String>,
        /// Only members currently on this tier
        #[arg(long)]
        tier: Option<String>,
    },
    /// The tier catalog
    Tiers,
    /// Membership plans
    Plans,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salon_rewards=info,salon_loyalty=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(workspace) = cli.workspace {
        config.workspace = workspace;
    }
    if let Some(dir) = cli.data_dir {
        config.store.backend = StoreBackend::JsonFile;
        config.store.data_dir = dir;
    }

    info!(
        workspace = %config.workspace,
        backend = ?config.store.backend,
        streak_mode = ?config.loyalty.streak_mode,
        "Configuration loaded"
    );

    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::JsonFile => Arc::new(
            JsonFileStore::new(&config.store.data_dir)
                .with_context(|| format!("opening {}", config.store.data_dir.display()))?,
        ),
    };

    let directory = MemberDirectory::new(store, &config.workspace, &config.loyalty, noop_sink())?;
    if cli.seed_demo {
        seed_demo(&directory)?;
    }

    let now = Utc::now();
    match cli.command {
        Command::Stats => print_json(&directory.fleet_stats(now)?),
        Command::Members { query, tier } => {
            let filter = MemberFilter {
                query,
                tier_id: tier,
            };
            print_json(&directory.list_members(&filter, now)?)
        }
        Command::Tiers => print_json(&directory.tier_catalog()?),
        Command::Plans => print_json(&directory.plans().list_plans()?),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A handful of members spread across the tiers.
fn seed_demo(directory: &MemberDirectory) -> anyhow::Result<()> {
    if !directory.list_members(&MemberFilter::default(), Utc::now())?.is_empty() {
        info!("Workspace already has members, skipping demo seed");
        return Ok(());
    }
    directory.plans().seed_defaults()?;

    let now = Utc::now();
    let (anjali, _) = directory.enroll(demo_member("Anjali Mehta", "1988-04-12", None), now)?;
    let (dev, _) = directory.enroll(
        demo_member("Dev Kapoor", "1995-11-30", Some(anjali.referral_code.clone())),
        now,
    )?;
    let (sana, _) = directory.enroll(demo_member("Sana Qureshi", "2001-07-08", None), now)?;

    for day in 0..12 {
        directory.record_purchase(PurchaseEvent::sale(
            anjali.id,
            Money::from_major(2_400),
            now - Duration::days(day),
        ))?;
    }
    directory.record_purchase(PurchaseEvent::sale(
        dev.id,
        Money::from_major(11_500),
        now - Duration::days(3),
    ))?;
    directory.record_purchase(PurchaseEvent::sale(
        sana.id,
        Money::from_major(1_800),
        now - Duration::days(20),
    ))?;
    directory.record_purchase(PurchaseEvent::refund(
        sana.id,
        Money::from_major(300),
        now - Duration::days(19),
    ))?;

    info!(members = 3, "Seeded demo members");
    Ok(())
}

fn demo_member(name: &str, dob: &str, referral_code: Option<String>) -> NewMember {
    let slug = name.split_whitespace().next().unwrap_or(name).to_lowercase();
    NewMember {
        name: name.to_string(),
        email: format!("{slug}@example.com"),
        phone: String::new(),
        date_of_birth: NaiveDate::parse_from_str(dob, "%Y-%m-%d").ok(),
        referral_code,
    }
}
