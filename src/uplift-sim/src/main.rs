//! Uplift simulator. Runs a seeded end-to-end experiment against the
//! in-memory store: simulated users flow through assignment, exposures and
//! conversions accumulate, and the allocation optimizer reweights variants
//! between rounds. Useful for eyeballing strategy behavior without any
//! external infrastructure.

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{info, warn};
use uplift_core::types::{
    AllocationStrategy, BanditAlgorithm, ExperimentDefinition, ExperimentType, MetricKind,
    MetricSpec, Variant,
};
use uplift_core::{SharedRng, SystemClock, UpliftConfig};
use uplift_platform::ExperimentService;
use uplift_store::MemoryStore;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "uplift-sim")]
#[command(about = "Seeded end-to-end experiment simulation")]
#[command(version)]
struct Cli {
    /// PRNG seed for both the engine and simulated user behavior
    #[arg(long, env = "UPLIFT_SIM__SEED", default_value_t = 42)]
    seed: u64,

    /// Total simulated users
    #[arg(long, env = "UPLIFT_SIM__USERS", default_value_t = 6000)]
    users: usize,

    /// Reallocation rounds across the run
    #[arg(long, env = "UPLIFT_SIM__ROUNDS", default_value_t = 12)]
    rounds: usize,

    /// Allocation strategy: thompson, ucb1, epsilon-greedy or dynamic
    #[arg(long, env = "UPLIFT_SIM__STRATEGY", default_value = "thompson")]
    strategy: String,
}

fn parse_strategy(name: &str) -> anyhow::Result<AllocationStrategy> {
    match name {
        "thompson" => Ok(AllocationStrategy::Bandit(BanditAlgorithm::ThompsonSampling)),
        "ucb1" => Ok(AllocationStrategy::Bandit(BanditAlgorithm::Ucb1)),
        "epsilon-greedy" => Ok(AllocationStrategy::Bandit(BanditAlgorithm::EpsilonGreedy {
            epsilon: 0.1,
        })),
        "dynamic" => Ok(AllocationStrategy::Dynamic),
        other => anyhow::bail!("unknown strategy '{other}'"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uplift_sim=info,uplift_platform=info,uplift_allocation=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let strategy = parse_strategy(&cli.strategy)?;

    let mut config = UpliftConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        UpliftConfig::default()
    });
    // Simulation rounds stand in for wall-clock hours.
    config.allocation.reeval_interval_secs = 0;

    info!(
        seed = cli.seed,
        users = cli.users,
        rounds = cli.rounds,
        strategy = %cli.strategy,
        "Uplift simulation starting"
    );

    let store = Arc::new(MemoryStore::new());
    let service = ExperimentService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        Arc::new(SharedRng::seeded(cli.seed)),
        Arc::new(SystemClock::new()),
        &config,
    );

    // Three arms with hidden true conversion rates; the middle one is the
    // configured control.
    let true_rates = [0.05_f64, 0.08, 0.12];
    let start_weights = [33.34, 33.33, 33.33];
    let variants: Vec<Variant> = ["control", "treatment-a", "treatment-b"]
        .iter()
        .enumerate()
        .map(|(index, name)| Variant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            weight: start_weights[index],
            is_control: index == 0,
            config: serde_json::json!({ "arm": index }),
        })
        .collect();
    let rate_of = |variant_id: Uuid, variants: &[Variant]| -> f64 {
        variants
            .iter()
            .position(|v| v.id == variant_id)
            .map(|index| true_rates[index])
            .unwrap_or(0.0)
    };

    let experiment = service.create_experiment(ExperimentDefinition {
        name: "simulated-offer".to_string(),
        experiment_type: ExperimentType::SingleFactor,
        variants: variants.clone(),
        metrics: vec![MetricSpec {
            id: "conversion".to_string(),
            kind: MetricKind::ConversionRate,
            is_primary: true,
        }],
        confidence_level: 0.95,
        min_sample_size: 200,
        strategy,
    })?;
    service.start_experiment(experiment.id)?;

    let mut behavior = StdRng::seed_from_u64(cli.seed.wrapping_add(1));
    let users_per_round = (cli.users / cli.rounds).max(1);
    let mut next_user = 0usize;

    for round in 0..cli.rounds {
        for _ in 0..users_per_round {
            let user_id = format!("user-{next_user}");
            next_user += 1;

            let variant_id = service.assign(experiment.id, &user_id)?;
            service.record_exposure(experiment.id, &user_id, Some(Uuid::new_v4()))?;

            if behavior.gen::<f64>() < rate_of(variant_id, &variants) {
                let order_value = 15.0 + behavior.gen::<f64>() * 20.0;
                service.record_event(
                    experiment.id,
                    &user_id,
                    "conversion",
                    order_value,
                    Some(Uuid::new_v4()),
                )?;
            }
        }

        match service.optimizer().reallocate(experiment.id) {
            Ok(Some(snapshot)) => {
                let weights: Vec<String> = snapshot
                    .weights
                    .iter()
                    .map(|w| format!("{}={:.1}", w.name, w.weight))
                    .collect();
                info!(round, weights = %weights.join(" "), "weights reallocated");
            }
            Ok(None) => info!(round, "reallocation skipped (gated)"),
            Err(error) => warn!(round, error = %error, "reallocation failed"),
        }
    }

    let report = service.stop_experiment(experiment.id)?;

    println!("=== Simulation Report ===");
    println!("Samples:  {}", report.total_samples);
    for outcome in &report.outcomes {
        println!(
            "{:<14} {:<12} observed={:.4} control={:.4} lift={:+.1}% confidence={:.2} significant={}",
            outcome.variant_name,
            outcome.metric_id,
            outcome.observed,
            outcome.control_value,
            outcome.lift_pct,
            outcome.confidence,
            outcome.significant,
        );
    }
    match report.winner {
        Some(winner_id) => {
            let name = variants
                .iter()
                .find(|v| v.id == winner_id)
                .map(|v| v.name.as_str())
                .unwrap_or("unknown");
            println!("Winner:   {name}");
        }
        None => println!("Winner:   none (control stands)"),
    }
    println!("Note:     {}", report.recommendation);

    Ok(())
}
