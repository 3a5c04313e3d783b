use crate::search::{Context, Mcts, Rtdp, Search};
use crate::{Mdp, PlanStn, PlannerConfig, ScheduleError, Selection, StepError, Strategy, Trpg};
use derive_more::derive::Display;
use rand::rngs::SmallRng;
use tempo_model::compile::{ConvertedProblem, Mode};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Failures of the planning loop. They denote a bug: the search only proposes actions that are
/// applicable and keep the schedule consistent.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("Executing {0} made the schedule inconsistent")]
    InconsistentSchedule(String),
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum NoPlanReason {
    #[display("no applicable action")]
    NoLegalAction,
    #[display("deadline exceeded")]
    DeadlineExceeded,
    #[display("step limit reached")]
    StepLimit,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PlanOutcome {
    /// The goals were achieved, the last action ending at `makespan`.
    Success { makespan: i64 },
    NoPlan { reason: NoPlanReason },
}

/// Action executed by the planning loop.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PlanStep {
    pub action: String,
    /// Time at which the action was executed.
    pub time: i64,
}

/// Result of one execution of the planning loop.
#[derive(Clone, Debug)]
pub struct Plan {
    pub outcome: PlanOutcome,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PlanOutcome::Success { .. })
    }

    pub fn makespan(&self) -> Option<i64> {
        match self.outcome {
            PlanOutcome::Success { makespan } => Some(makespan),
            PlanOutcome::NoPlan { .. } => None,
        }
    }
}

/// Receding-horizon planning: search for the best action in the current state, execute it with a
/// sampled outcome, and repeat until the goals hold, no action is applicable or the deadline is
/// exceeded.
///
/// `heuristic_problem` is the decomposition of the same problem, on which the relaxed planning
/// graph is computed. In regular mode, it is usually `problem` itself.
#[instrument(skip_all, fields(problem = %problem.name, mode = %problem.mode))]
pub fn plan(
    problem: &ConvertedProblem,
    heuristic_problem: &ConvertedProblem,
    config: &PlannerConfig,
    rng: &mut SmallRng,
) -> Result<Plan, PlanError> {
    let mdp = Mdp::new(problem, config.rewards);
    let ctx = Context::new(mdp.clone(), Trpg::new(heuristic_problem), config.clone());
    let mut search: Box<dyn Search + '_> = match config.strategy {
        Strategy::Mcts => Box::new(Mcts::new(ctx)),
        Strategy::Rtdp => Box::new(Rtdp::new(ctx)),
    };
    let regular = problem.mode == Mode::Regular;

    let mut state = mdp.initial_state();
    let mut schedule = PlanStn::new(problem.deadline);
    let mut steps = Vec::new();
    let finish = |outcome: PlanOutcome, steps: Vec<PlanStep>| {
        match outcome {
            PlanOutcome::Success { makespan } => info!("Plan found, makespan: {makespan}"),
            PlanOutcome::NoPlan { reason } => info!("No plan found: {reason}"),
        }
        Ok(Plan { outcome, steps })
    };

    for _ in 0..config.max_steps {
        let now = if regular { schedule.current_end_time() } else { state.time() };
        if problem.deadline.is_some_and(|d| now > d) {
            let reason = NoPlanReason::DeadlineExceeded;
            return finish(PlanOutcome::NoPlan { reason }, steps);
        }
        if mdp.is_terminal(&state) {
            return finish(PlanOutcome::Success { makespan: now }, steps);
        }

        let Some(decision) = search.search(&state, regular.then_some(&schedule), rng)? else {
            let reason = if mdp.is_late(&state) {
                NoPlanReason::DeadlineExceeded
            } else {
                NoPlanReason::NoLegalAction
            };
            return finish(PlanOutcome::NoPlan { reason }, steps);
        };
        let name = problem.action(decision.action).name();
        let transition = mdp.step(&state, decision.action, rng)?;

        let time = if regular {
            let tp = schedule.add(problem, decision.action)?;
            if config.fix_time {
                let (earliest, latest) = schedule.legal_interval(tp).unwrap_or((now, now));
                let time = match decision.window {
                    Some((lo, _)) if config.selection == Selection::RootInterval && earliest <= lo && lo <= latest => lo,
                    _ => earliest,
                };
                schedule.fix(tp, time);
            }
            if !schedule.is_consistent() {
                return Err(PlanError::InconsistentSchedule(name.to_string()));
            }
            schedule.earliest(tp).unwrap_or(now)
        } else {
            state.time()
        };
        debug!(
            "[{time:>4}] {name}  ->  {}",
            transition.state.displayable(&problem.world)
        );
        steps.push(PlanStep {
            action: name.to_string(),
            time,
        });
        search.advance(decision.action, &transition.state);
        state = transition.state;
    }

    if mdp.is_terminal(&state) {
        let makespan = if regular { schedule.current_end_time() } else { state.time() };
        let within_deadline = problem.deadline.is_none_or(|d| makespan <= d);
        if within_deadline {
            return finish(PlanOutcome::Success { makespan }, steps);
        }
    }
    let reason = NoPlanReason::StepLimit;
    finish(PlanOutcome::NoPlan { reason }, steps)
}
