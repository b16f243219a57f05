//! osmotic-cli: command-line front end for the Osmotic decay-rate engine.
//!
//! Evaluates rates, conviction, accrued balances and funding targets under a
//! configured parameter profile, and prints the result as JSON.

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use osmotic_core::error::{DecayError, OsmoticError};
use osmotic_core::{DecayParameters, FixedPoint, RateCalculator, Threshold};
use osmotic_decay::DecayEngine;
use osmotic_ledger::{FlowBook, FlowKey};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::settings::Settings;

/// Osmotic decay-rate engine.
#[derive(Parser, Debug)]
#[command(name = "osmotic-cli", version, about = "Decay-rate engine for adaptive flows and conviction funding")]
struct Cli {
    /// Settings file (default: <config dir>/osmotic/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Parameter profile (default: the chain's profile, then `default_profile`)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Chain id whose network profile applies
    #[arg(long, global = true)]
    chain_id: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rate after easing from `last` toward `target` for `elapsed` seconds.
    Rate(RateArgs),
    /// Conviction after holding `staked` for `elapsed` seconds.
    Conviction(ConvictionArgs),
    /// Amount streamed over `elapsed` seconds by an easing rate.
    Integral(RateArgs),
    /// Funding rate for a stake under the stake-ratio threshold.
    TargetRate(TargetRateArgs),
    /// Funding rate for a conviction under the weighted threshold.
    Reward(RewardArgs),
    /// Compare the closed-form balance of a flow with a per-second simulation.
    Simulate(SimulateArgs),
    /// List profiles and networks.
    Profiles,
}

#[derive(Args, Debug)]
struct RateArgs {
    /// Seconds since the last update.
    #[arg(long, allow_negative_numbers = true)]
    elapsed: i64,

    /// Rate at the last update (tokens per second).
    #[arg(long, default_value = "0")]
    last: FixedPoint,

    /// Target rate (tokens per second).
    #[arg(long)]
    target: FixedPoint,

    /// Per-second decay, overriding the profile.
    #[arg(long)]
    decay: Option<FixedPoint>,
}

#[derive(Args, Debug)]
struct ConvictionArgs {
    #[arg(long, allow_negative_numbers = true)]
    elapsed: i64,

    /// Conviction at the last update.
    #[arg(long, default_value = "0")]
    last: FixedPoint,

    /// Tokens staked throughout the window.
    #[arg(long)]
    staked: FixedPoint,

    #[arg(long)]
    decay: Option<FixedPoint>,
}

#[derive(Args, Debug)]
struct TargetRateArgs {
    #[arg(long)]
    staked: FixedPoint,

    #[arg(long)]
    total_staked: FixedPoint,

    /// Funds available to all proposals.
    #[arg(long)]
    funds: FixedPoint,

    #[arg(long)]
    max_ratio: Option<FixedPoint>,

    #[arg(long)]
    min_stake_ratio: Option<FixedPoint>,
}

#[derive(Args, Debug)]
struct RewardArgs {
    #[arg(long)]
    conviction: FixedPoint,

    #[arg(long)]
    total_staked: FixedPoint,

    #[arg(long)]
    funds: FixedPoint,

    #[arg(long)]
    max_ratio: Option<FixedPoint>,

    #[arg(long)]
    weight: Option<FixedPoint>,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Length of the simulated window in seconds.
    #[arg(long, default_value_t = 86_400)]
    seconds: u64,

    /// Target rate of the flow, which starts at rate zero.
    #[arg(long)]
    target: FixedPoint,

    #[arg(long)]
    decay: Option<FixedPoint>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let (profile, params) = settings
        .resolve_profile(cli.profile.as_deref(), cli.chain_id)
        .context("failed to resolve parameter profile")?;
    info!(%profile, decay = %params.decay, "using profile");

    let output = execute(&cli.command, &settings, &profile, &params)
        .context("command failed")?;
    let rendered = serde_json::to_string_pretty(&output).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

fn execute(
    command: &Commands,
    settings: &Settings,
    profile: &str,
    params: &DecayParameters,
) -> Result<Value, OsmoticError> {
    let engine = DecayEngine::new();
    let value = match command {
        Commands::Rate(args) => {
            let decay = args.decay.unwrap_or(params.decay);
            let rate = engine.calculate_rate(args.elapsed, args.last, args.target, decay)?;
            json!({ "profile": profile, "decay": decay, "rate": rate })
        }
        Commands::Conviction(args) => {
            let decay = args.decay.unwrap_or(params.decay);
            let conviction =
                engine.calculate_conviction(args.elapsed, args.last, args.staked, decay)?;
            json!({ "profile": profile, "decay": decay, "conviction": conviction })
        }
        Commands::Integral(args) => {
            let decay = args.decay.unwrap_or(params.decay);
            let amount = engine.calculate_integral(args.elapsed, args.last, args.target, decay)?;
            json!({ "profile": profile, "decay": decay, "amount": amount })
        }
        Commands::TargetRate(args) => {
            let max_ratio = args.max_ratio.unwrap_or(params.max_ratio);
            let min_stake_ratio = match (args.min_stake_ratio, params.threshold) {
                (Some(ratio), _) | (None, Threshold::MinStakeRatio(ratio)) => ratio,
                (None, Threshold::Weight(_)) => return Err(missing(profile, "min_stake_ratio")),
            };
            let rate = engine.calculate_target_rate(
                args.staked,
                args.total_staked,
                max_ratio,
                min_stake_ratio,
                args.funds,
            )?;
            json!({ "profile": profile, "target_rate": rate })
        }
        Commands::Reward(args) => {
            let max_ratio = args.max_ratio.unwrap_or(params.max_ratio);
            let weight = match (args.weight, params.threshold) {
                (Some(weight), _) | (None, Threshold::Weight(weight)) => weight,
                (None, Threshold::MinStakeRatio(_)) => return Err(missing(profile, "weight")),
            };
            let reward = engine.calculate_reward(
                args.conviction,
                args.total_staked,
                max_ratio,
                weight,
                args.funds,
            )?;
            json!({ "profile": profile, "reward": reward })
        }
        Commands::Simulate(args) => simulate(args, args.decay.unwrap_or(params.decay))?,
        Commands::Profiles => {
            let mut profiles = serde_json::Map::new();
            for name in settings.profiles.keys() {
                let resolved = settings.profile(name)?;
                profiles.insert(name.clone(), json!(resolved));
            }
            json!({
                "active": profile,
                "default_profile": settings.default_profile,
                "profiles": profiles,
                "networks": settings.networks,
            })
        }
    };
    Ok(value)
}

fn missing(profile: &str, parameter: &str) -> OsmoticError {
    DecayError::InvalidConfiguration(format!(
        "profile {profile} has no {parameter}; pass --{}",
        parameter.replace('_', "-")
    ))
    .into()
}

/// Run a flow second by second with the recurrence and compare the
/// trapezoidal sum of its rates with the ledger's closed-form balance.
fn simulate(args: &SimulateArgs, decay: FixedPoint) -> Result<Value, OsmoticError> {
    let engine = DecayEngine::new();
    let book = FlowBook::new(Arc::new(DecayEngine::new()));
    let key = FlowKey::new("simulation", "sender", "receiver");
    book.create_flow(key.clone(), args.target, decay, 0)?;

    let mut rate = FixedPoint::ZERO;
    let mut stepped = FixedPoint::ZERO;
    for _ in 0..args.seconds {
        let next = engine.calculate_rate(1, rate, args.target, decay)?;
        // (rate + next) / 2
        let step = rate
            .try_add(next)?
            .checked_div(FixedPoint::from_tokens(2))
            .ok_or(DecayError::NumericOverflow)?;
        stepped = stepped.try_add(step)?;
        rate = next;
    }

    let end = i64::try_from(args.seconds)
        .map_err(|_| DecayError::InvalidArgument("simulation window too long".to_string()))?;
    let closed_form = book.balance_at(&key, end)?;
    let final_rate = book.flow_rate_at(&key, end)?;
    let relative_error = if closed_form.is_zero() {
        0.0
    } else {
        (closed_form.to_f64_lossy() - stepped.to_f64_lossy()).abs() / closed_form.to_f64_lossy()
    };
    debug!(seconds = args.seconds, relative_error, "simulation finished");

    Ok(json!({
        "seconds": args.seconds,
        "decay": decay,
        "closed_form": closed_form,
        "stepped": stepped,
        "relative_error": relative_error,
        "final_rate": final_rate,
        "stepped_final_rate": rate,
    }))
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so that stdout carries only the JSON result.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
