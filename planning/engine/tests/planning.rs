use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::time::Duration as Time;
use tempo_engine::*;
use tempo_model::compile::{AllowAll, ConvertedProblem, combine, decompose};
use tempo_model::*;

fn config(strategy: Strategy, selection: Selection, iterations: u64) -> PlannerConfig {
    PlannerConfig {
        strategy,
        selection,
        max_iterations: Some(iterations),
        search_time: Time::from_secs(60),
        ..Default::default()
    }
}

/// `a` (duration `da`) achieves `p`, `b` (duration `db`) achieves `q`.
fn two_actions(da: i64, db: i64, deadline: i64, goals: &[&str]) -> Problem {
    let mut world = World::new();
    let p = world.intern(&["p"]);
    let q = world.intern(&["q"]);
    let mut pb = Problem::new("two-actions", world);
    pb.add_action(DurativeAction::new("a", Duration::fixed(da)).effect(p, true))
        .unwrap();
    pb.add_action(DurativeAction::new("b", Duration::fixed(db)).effect(q, true))
        .unwrap();
    for g in goals {
        let atom = pb.world.atom(&[*g]).unwrap();
        pb.goals.insert(atom);
    }
    pb.deadline = Some(deadline);
    pb
}

fn run(pb: &ConvertedProblem, heuristic: &ConvertedProblem, config: &PlannerConfig, seed: u64) -> Plan {
    let mut rng = SmallRng::seed_from_u64(seed);
    plan(pb, heuristic, config, &mut rng).unwrap()
}

#[test]
fn single_durative_action() {
    let pb = decompose(&two_actions(4, 4, 10, &["p"]));
    let plan = run(&pb, &pb, &config(Strategy::Mcts, Selection::Avg, 50), 0);
    assert_eq!(plan.outcome, PlanOutcome::Success { makespan: 4 });
    assert_eq!(
        plan.steps,
        vec![
            PlanStep {
                action: "start_a".to_string(),
                time: 0
            },
            PlanStep {
                action: "end_a".to_string(),
                time: 4
            },
        ]
    );
}

#[test]
fn single_durative_action_in_combination_mode() {
    let combined = combine(&two_actions(4, 4, 10, &["p"]), &AllowAll, false);
    for strategy in [Strategy::Mcts, Strategy::Rtdp] {
        let plan = run(&combined.problem, &combined.split, &config(strategy, Selection::Avg, 50), 0);
        assert_eq!(plan.outcome, PlanOutcome::Success { makespan: 4 }, "{strategy}");
        // starting b along with a is harmless
        assert!(["a", "a,b"].contains(&plan.steps[0].action.as_str()));
    }
}

#[test]
fn all_selections_and_strategies() {
    let pb = decompose(&two_actions(4, 4, 10, &["p"]));
    for (strategy, selection) in [
        (Strategy::Mcts, Selection::Max),
        (Strategy::Mcts, Selection::RootInterval),
        (Strategy::Rtdp, Selection::Avg),
    ] {
        let plan = run(&pb, &pb, &config(strategy, selection, 50), 1);
        assert_eq!(plan.makespan(), Some(4), "{strategy} {selection}");
    }
}

#[test]
fn goals_initially_satisfied() {
    let mut pb = two_actions(4, 4, 10, &["p"]);
    pb.init = pb.goals.clone();
    let pb = decompose(&pb);
    let plan = run(&pb, &pb, &config(Strategy::Mcts, Selection::Avg, 10), 0);
    assert_eq!(plan.outcome, PlanOutcome::Success { makespan: 0 });
    assert!(plan.steps.is_empty());
}

#[test]
fn action_longer_than_the_deadline() {
    let pb = two_actions(20, 20, 10, &["p"]);
    let regular = decompose(&pb);
    let plan = run(&regular, &regular, &config(Strategy::Mcts, Selection::Avg, 20), 0);
    assert!(!plan.is_success());

    let combined = combine(&pb, &AllowAll, false);
    let plan = run(&combined.problem, &combined.split, &config(Strategy::Mcts, Selection::Avg, 20), 0);
    assert_eq!(
        plan.outcome,
        PlanOutcome::NoPlan {
            reason: NoPlanReason::DeadlineExceeded
        }
    );
}

#[test]
fn concurrent_actions_meet_the_deadline() {
    // executing a and b one after the other would take 8
    let pb = two_actions(4, 4, 6, &["p", "q"]);
    let regular = decompose(&pb);
    let plan = run(&regular, &regular, &config(Strategy::Mcts, Selection::Avg, 300), 0);
    assert_eq!(plan.makespan(), Some(4));
    assert_eq!(plan.steps.len(), 4);

    let combined = combine(&pb, &AllowAll, false);
    let plan = run(&combined.problem, &combined.split, &config(Strategy::Mcts, Selection::Avg, 100), 0);
    assert_eq!(plan.makespan(), Some(4));
    assert_eq!(plan.steps[0].action, "a,b");
}

#[test]
fn runs_are_reproducible() {
    let pb = decompose(&two_actions(3, 2, 10, &["p", "q"]));
    let config = config(Strategy::Mcts, Selection::Avg, 40);
    let first = run(&pb, &pb, &config, 7);
    let second = run(&pb, &pb, &config, 7);
    assert_eq!(first.steps, second.steps);
    assert_eq!(first.outcome, second.outcome);
}

#[test]
fn evaluation_of_a_probabilistic_problem() {
    let mut world = World::new();
    let g = world.intern(&["g"]);
    let mut pb = Problem::new("retry", world);
    pb.add_action(
        DurativeAction::new("try", Duration::fixed(1))
            .probabilistic_effect(ProbabilisticEffect::new(Distribution::bernoulli(0.8, [Lit::pos(g)]))),
    )
    .unwrap();
    pb.goals.insert(g);
    pb.deadline = Some(20);
    let pb = decompose(&pb);
    let config = config(Strategy::Mcts, Selection::Avg, 30);

    let evaluation = evaluate(10, 0, |rng| plan(&pb, &pb, &config, rng)).unwrap();
    assert_eq!(evaluation.runs, 10);
    // the action can be retried until it succeeds
    assert_eq!(evaluation.successes(), 10);
    assert!(evaluation.makespans.iter().all(|&m| (1..=20).contains(&m)));
}

#[test]
fn step_limit() {
    let pb = decompose(&two_actions(4, 4, 10, &["p"]));
    let limited = PlannerConfig {
        max_steps: 1,
        ..config(Strategy::Mcts, Selection::Avg, 50)
    };
    let plan = run(&pb, &pb, &limited, 0);
    assert_eq!(
        plan.outcome,
        PlanOutcome::NoPlan {
            reason: NoPlanReason::StepLimit
        }
    );
    assert_eq!(plan.steps.len(), 1);

    // the goal reached by the last allowed step
    let just_enough = PlannerConfig {
        max_steps: 2,
        ..config(Strategy::Mcts, Selection::Avg, 50)
    };
    let plan = run(&pb, &pb, &just_enough, 0);
    assert_eq!(plan.outcome, PlanOutcome::Success { makespan: 4 });
}

#[test]
fn unfixed_times() {
    let pb = decompose(&two_actions(4, 4, 10, &["p"]));
    let config = PlannerConfig {
        fix_time: false,
        ..config(Strategy::Mcts, Selection::Avg, 50)
    };
    let plan = run(&pb, &pb, &config, 0);
    assert_eq!(plan.outcome, PlanOutcome::Success { makespan: 4 });
    let times = plan.steps.iter().map(|s| s.time).collect::<Vec<_>>();
    assert_eq!(times, vec![0, 4]);
}
