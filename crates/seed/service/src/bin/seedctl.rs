//! seedctl - operator CLI for the SocialSeed growth core.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use seed_phase::RegisterAccount;
use seed_risk::FixedAuthenticitySignal;
use seed_service::telemetry::init_tracing;
use seed_service::{open_storage, GrowthService, SeedConfig, SimulatedExecutor};
use seed_types::{ActionType, Clock, ManualClock, Platform};
use serde_json::json;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "seedctl")]
#[command(about = "SocialSeed growth core operator CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SEED_CONFIG")]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default configuration as TOML
    DefaultConfig,

    /// Load and validate the configuration, then print the effective TOML
    CheckConfig,

    /// Run a scripted burst of actions against in-memory storage
    Simulate {
        /// Platform of the simulated account
        #[arg(long, value_enum, default_value_t = PlatformArg::Tiktok)]
        platform: PlatformArg,

        /// Age of the simulated account in days
        #[arg(long, default_value_t = 0)]
        age_days: i64,

        /// Action type to submit
        #[arg(long, value_enum, default_value_t = ActionArg::Follow)]
        action: ActionArg,

        /// Number of actions to submit
        #[arg(short = 'n', long, default_value_t = 6)]
        count: usize,

        /// Bot likelihood of every target; omit to simulate a failing signal
        #[arg(long)]
        bot_likelihood: Option<f64>,

        /// Fail every n-th execution
        #[arg(long)]
        fail_every: Option<usize>,

        /// Simulated seconds between two submissions
        #[arg(long, default_value_t = 150)]
        spacing_secs: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PlatformArg {
    Tiktok,
    Instagram,
    Twitter,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Tiktok => Platform::Tiktok,
            PlatformArg::Instagram => Platform::Instagram,
            PlatformArg::Twitter => Platform::Twitter,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Follow,
    Like,
    Comment,
    Unfollow,
}

impl From<ActionArg> for ActionType {
    fn from(value: ActionArg) -> Self {
        match value {
            ActionArg::Follow => ActionType::Follow,
            ActionArg::Like => ActionType::Like,
            ActionArg::Comment => ActionType::Comment,
            ActionArg::Unfollow => ActionType::Unfollow,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::DefaultConfig => {
            print!("{}", SeedConfig::default().to_toml()?);
        }
        Commands::CheckConfig => {
            let config = SeedConfig::load(cli.config.as_deref())
                .context("configuration is invalid")?;
            print!("{}", config.to_toml()?);
        }
        Commands::Simulate {
            platform,
            age_days,
            action,
            count,
            bot_likelihood,
            fail_every,
            spacing_secs,
        } => {
            let mut config = SeedConfig::load(cli.config.as_deref())?;
            if cli.verbose {
                config.logging.level = "debug".to_string();
            }
            init_tracing(&config.logging)?;

            let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
            let signal = match bot_likelihood {
                Some(value) => FixedAuthenticitySignal::constant(value),
                None => FixedAuthenticitySignal::unavailable(),
            };
            let mut executor = SimulatedExecutor::new(clock.clone());
            if let Some(n) = fail_every {
                executor = executor.fail_every(n);
            }

            let service = GrowthService::new(
                &config,
                open_storage(&config.storage).await?,
                clock.clone(),
                Arc::new(signal),
                Arc::new(executor),
            )?;
            let spacing = chrono::Duration::seconds(spacing_secs.max(0));
            simulate(
                &service,
                platform.into(),
                age_days,
                action.into(),
                count,
                clock,
                spacing,
            )
            .await?;
        }
    }

    Ok(())
}

async fn simulate(
    service: &GrowthService,
    platform: Platform,
    age_days: i64,
    action_type: ActionType,
    count: usize,
    clock: Arc<ManualClock>,
    spacing: chrono::Duration,
) -> Result<()> {
    let account = service
        .register_account(RegisterAccount {
            platform,
            username: format!("sim-{platform}"),
            platform_created_at: Some(clock.now() - chrono::Duration::days(age_days)),
        })
        .await?;
    println!("{}", serde_json::to_string(&json!({ "account": account }))?);

    for i in 0..count {
        let target = format!("@target{i}");
        let entry = service
            .submit(seed_gate::ActionRequest {
                account_id: account.account_id.clone(),
                action_type,
                target_identifier: target,
            })
            .await?;

        let execution = if entry.decision.decision.allows_execution() {
            service
                .dispatch(&entry.action.action_id)
                .await?
                .execution
        } else {
            None
        };

        println!(
            "{}",
            serde_json::to_string(&json!({
                "target": entry.action.target_identifier,
                "band": entry.assessment.risk_band,
                "score": entry.assessment.score,
                "decision": entry.decision,
                "execution": execution,
            }))?
        );
        clock.advance(spacing);
    }

    let account = service.account(&account.account_id).await?;
    let statistics = service.statistics(&account.account_id).await?;
    println!(
        "{}",
        serde_json::to_string(&json!({
            "phase": account.phase,
            "health_score": account.health_score,
            "statistics": statistics,
        }))?
    );
    Ok(())
}
