use anyhow::Result;
use clap::Parser;
use itertools::Itertools;
use std::time::Duration;
use tempo_engine::{LeafEvaluation, PlanOutcome, PlannerConfig, Rewards, Selection, Strategy, evaluate, plan};
use tempo_model::compile::Mode;
use tempo_planners::domains::{Domain, Instance, Params};

/// Receding-horizon planner for temporal problems with probabilistic effects.
#[derive(Debug, Parser)]
#[clap(name = "tempo-plan", rename_all = "kebab-case")]
struct Args {
    /// Benchmark domain: one of "simple", "strips-prob", "machine-shop"
    #[clap(long, default_value = "machine-shop")]
    domain: Domain,
    /// Search algorithm: "mcts" or "rtdp"
    #[clap(long, default_value = "mcts")]
    solver: Strategy,
    /// How MCTS backs up values: one of "avg", "max", "rootInterval"
    #[clap(long, default_value = "avg")]
    selection: Selection,
    /// "regular" to schedule starts and ends separately, "combination" to start sets of actions together
    #[clap(long, default_value = "regular")]
    mode: Mode,
    /// Latest time at which the goals must hold.
    #[clap(long, default_value = "27")]
    deadline: i64,
    /// Time allowed to the search before each decision, in seconds.
    #[clap(long, default_value = "10")]
    search_time: f64,
    /// Maximum depth of the search below the current state.
    #[clap(long, default_value = "40")]
    search_depth: u32,
    /// Exploration constant of UCT.
    #[clap(long, default_value = "10")]
    exploration: f64,
    /// Number of runs, each with its own seed.
    #[clap(long, default_value = "1")]
    runs: usize,
    /// Number of pieces and machines (machine-shop).
    #[clap(long, default_value = "2")]
    objects: usize,
    /// Number of parts (simple) or of garbage actions (strips-prob).
    #[clap(long, default_value = "0")]
    garbage: usize,
    /// Seed of the first run.
    #[clap(long, default_value = "0")]
    seed: u64,
    #[clap(long, default_value = "1")]
    goal_reward: f64,
    /// Cost of each step that does not reach the goals.
    #[clap(long, default_value = "0")]
    step_cost: f64,
    /// Evaluate leaves with random rollouts instead of the relaxed planning graph.
    #[clap(long)]
    rollout: bool,
    /// Keep the subtree of the reached state from one decision to the next.
    #[clap(long)]
    reuse_tree: bool,
    /// Logging level to use: one of "error", "warn", "info", "debug", "trace"
    #[clap(short, long, default_value = "info")]
    log_level: tracing::Level,
}

fn main() -> Result<()> {
    // Terminate the process if a thread panics.
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));

    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::Uptime::from(std::time::Instant::now()))
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    anyhow::ensure!(args.search_time > 0.0, "The search time must be positive");
    let config = PlannerConfig {
        strategy: args.solver,
        selection: args.selection,
        leaf: if args.rollout {
            LeafEvaluation::Rollout
        } else {
            LeafEvaluation::Heuristic
        },
        exploration: args.exploration,
        search_depth: args.search_depth,
        search_time: Duration::from_secs_f64(args.search_time),
        reuse_tree: args.reuse_tree,
        rewards: Rewards {
            goal: args.goal_reward,
            step: -args.step_cost.abs(),
            ..Default::default()
        },
        ..Default::default()
    };
    println!(
        "domain: {}  mode: {}  solver: {}  selection: {}  deadline: {}  search time: {}s  depth: {}",
        args.domain, args.mode, config.strategy, config.selection, args.deadline, args.search_time, config.search_depth
    );

    let params = Params {
        objects: args.objects,
        garbage: args.garbage,
        deadline: args.deadline,
    };
    let instance = Instance::new(args.domain, params, args.mode)?;
    let compiled = instance.compile(args.mode);
    println!(
        "{} ground actions, {} search actions",
        instance.problem.actions().len(),
        compiled.problem.actions().len()
    );

    let evaluation = evaluate(args.runs, args.seed, |rng| {
        let result = plan(&compiled.problem, &compiled.heuristic, &config, rng)?;
        for step in &result.steps {
            println!("{:>6}: {}", step.time, step.action);
        }
        match result.outcome {
            PlanOutcome::Success { makespan } => println!("Plan found, makespan: {makespan}"),
            PlanOutcome::NoPlan { reason } => println!("No plan found ({reason})"),
        }
        Ok(result)
    })?;
    if args.runs > 1 {
        println!("{evaluation}");
        if !evaluation.makespans.is_empty() {
            println!("makespans: [{}]", evaluation.makespans.iter().join(", "));
        }
    }

    if evaluation.successes() == 0 {
        std::process::exit(2);
    }
    Ok(())
}
