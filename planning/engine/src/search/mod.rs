//! Online search engines: each call chooses the next action to execute.

mod intervals;
mod mcts;
mod rtdp;
mod tree;

pub use intervals::*;
pub use mcts::Mcts;
pub use rtdp::Rtdp;

use crate::{LeafEvaluation, Mdp, PlanStn, PlannerConfig, StepError, Trpg};
use rand::Rng;
use rand::rngs::SmallRng;
use std::time::{Duration, Instant};
use tempo_model::compile::Mode;
use tempo_model::{ActionId, State};

/// Action chosen by a search.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Decision {
    pub action: ActionId,
    /// Preferred window for the start time of the action, if the search estimated one.
    pub window: Option<(i64, i64)>,
}

pub trait Search {
    /// Chooses the action to execute in `state`, or `None` if no action is applicable.
    /// In regular mode, `schedule` is the schedule of the actions executed so far.
    fn search(
        &mut self,
        state: &State,
        schedule: Option<&PlanStn>,
        rng: &mut SmallRng,
    ) -> Result<Option<Decision>, StepError>;

    /// Notifies the search that `action` was executed and resulted in `state`.
    fn advance(&mut self, _action: ActionId, _state: &State) {}
}

/// Ingredients shared by the search engines.
#[derive(Clone)]
pub struct Context<'a> {
    pub mdp: Mdp<'a>,
    pub heuristic: Trpg<'a>,
    pub config: PlannerConfig,
}

impl<'a> Context<'a> {
    pub fn new(mdp: Mdp<'a>, heuristic: Trpg<'a>, config: PlannerConfig) -> Self {
        Context { mdp, heuristic, config }
    }

    /// Current time of a state: carried by the state in combination mode, given by the makespan of
    /// the schedule in regular mode.
    pub fn now(&self, state: &State, schedule: Option<&PlanStn>) -> i64 {
        match self.mdp.problem().mode {
            Mode::Combination => state.time(),
            Mode::Regular => schedule.map_or(0, |s| s.current_end_time()),
        }
    }

    /// Estimated value of a state that the search does not expand further.
    pub fn leaf_value(
        &self,
        state: &State,
        now: i64,
        depth_left: u32,
        rng: &mut impl Rng,
    ) -> Result<f64, StepError> {
        match self.config.leaf {
            LeafEvaluation::Heuristic => Ok(self.heuristic.value(state, now)),
            LeafEvaluation::Rollout => self.rollout(state, depth_left, rng),
        }
    }

    /// Discounted return of a random walk of at most `depth` steps from a non-terminal state.
    fn rollout(&self, state: &State, depth: u32, rng: &mut impl Rng) -> Result<f64, StepError> {
        let mut state = state.clone();
        let mut total = 0.0;
        let mut discount = 1.0;
        for _ in 0..depth {
            let legal = self.mdp.legal_actions(&state);
            if legal.is_empty() {
                return Ok(total + discount * self.config.rewards.dead_end);
            }
            let action = legal[rng.random_range(0..legal.len())];
            let transition = self.mdp.step(&state, action, rng)?;
            total += discount * transition.reward;
            if transition.terminal {
                break;
            }
            discount *= self.config.discount;
            state = transition.state;
        }
        Ok(total)
    }
}

/// Stopping criterion of a search.
struct Budget {
    start: Instant,
    max_iterations: Option<u64>,
    search_time: Duration,
}

impl Budget {
    fn start(config: &PlannerConfig) -> Self {
        Budget {
            start: Instant::now(),
            max_iterations: config.max_iterations,
            search_time: config.search_time,
        }
    }

    fn is_exhausted(&self, iterations: u64) -> bool {
        self.max_iterations.is_some_and(|max| iterations >= max) || self.start.elapsed() >= self.search_time
    }
}
