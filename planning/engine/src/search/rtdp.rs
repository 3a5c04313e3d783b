use crate::search::{Budget, Context, Decision, Search};
use crate::{PlanStn, StepError};
use hashbrown::HashMap;
use rand::Rng;
use rand::rngs::SmallRng;
use tempo_model::compile::Mode;
use tempo_model::{ActionId, State};
use tracing::debug;

/// Real-time dynamic programming.
///
/// Each trial walks greedily from the current state, sampling outcomes, and sets the value of every
/// visited state to its best Q-value `max_a sum_s' p(s'|s,a) (r(s') + gamma V(s'))`. Values of
/// states never updated are estimated by the leaf evaluation. The value table is kept from one
/// decision to the next.
pub struct Rtdp<'a> {
    ctx: Context<'a>,
    values: HashMap<State, f64>,
    /// Time of the current decision, used as the time of every state in regular mode.
    base_time: i64,
}

impl<'a> Rtdp<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Rtdp {
            ctx,
            values: HashMap::new(),
            base_time: 0,
        }
    }

    /// Current estimate of the value of `state`, if it was ever updated.
    pub fn value(&self, state: &State) -> Option<f64> {
        self.values.get(state).copied()
    }

    fn estimate(&self, state: &State, rng: &mut SmallRng) -> Result<f64, StepError> {
        if let Some(&v) = self.values.get(state) {
            return Ok(v);
        }
        let now = match self.ctx.mdp.problem().mode {
            Mode::Combination => state.time(),
            Mode::Regular => self.base_time,
        };
        self.ctx.leaf_value(state, now, self.ctx.config.search_depth, rng)
    }

    fn q_value(&self, state: &State, action: ActionId, rng: &mut SmallRng) -> Result<f64, StepError> {
        let mut q = 0.0;
        for (p, transition) in self.ctx.mdp.transitions(state, action)? {
            let future = if transition.terminal {
                0.0
            } else {
                self.ctx.config.discount * self.estimate(&transition.state, rng)?
            };
            q += p * (transition.reward + future);
        }
        Ok(q)
    }

    /// Best action among `actions` (ties broken at random), after updating the value of `state`.
    fn greedy(&mut self, state: &State, actions: &[ActionId], rng: &mut SmallRng) -> Result<(ActionId, f64), StepError> {
        let mut best = Vec::new();
        let mut best_q = f64::NEG_INFINITY;
        for &action in actions {
            let q = self.q_value(state, action, rng)?;
            if q > best_q + 1e-12 {
                best.clear();
                best_q = q;
            }
            if (q - best_q).abs() <= 1e-12 {
                best.push(action);
            }
        }
        let action = best[rng.random_range(0..best.len())];
        self.values.insert(state.clone(), best_q);
        Ok((action, best_q))
    }

    fn trial(&mut self, root: &State, root_actions: &[ActionId], rng: &mut SmallRng) -> Result<(), StepError> {
        let mut state = root.clone();
        let mut actions = root_actions.to_vec();
        for _ in 0..self.ctx.config.search_depth {
            if self.ctx.mdp.is_terminal(&state) {
                break;
            }
            if actions.is_empty() {
                self.values.insert(state, self.ctx.config.rewards.dead_end);
                break;
            }
            let (action, _) = self.greedy(&state, &actions, rng)?;
            state = self.ctx.mdp.step(&state, action, rng)?.state;
            actions = self.ctx.mdp.legal_actions(&state);
        }
        Ok(())
    }
}

impl Search for Rtdp<'_> {
    fn search(
        &mut self,
        state: &State,
        schedule: Option<&PlanStn>,
        rng: &mut SmallRng,
    ) -> Result<Option<Decision>, StepError> {
        self.base_time = self.ctx.now(state, schedule);
        let problem = self.ctx.mdp.problem();
        // only the first action is checked against the schedule
        let root_actions: Vec<ActionId> = self
            .ctx
            .mdp
            .legal_actions(state)
            .into_iter()
            .filter(|&a| match schedule {
                Some(schedule) => {
                    let mut schedule = schedule.clone();
                    schedule.add(problem, a).is_ok() && schedule.is_consistent()
                }
                None => true,
            })
            .collect();
        if root_actions.is_empty() {
            debug!("No legal action");
            return Ok(None);
        }

        let budget = Budget::start(&self.ctx.config);
        let mut trials = 0;
        loop {
            self.trial(state, &root_actions, rng)?;
            trials += 1;
            if budget.is_exhausted(trials) {
                break;
            }
        }
        let (action, value) = self.greedy(state, &root_actions, rng)?;
        debug!(
            "{trials} trials, {} states valued, best: {} ({value:.4})",
            self.values.len(),
            problem.action(action).name()
        );
        Ok(Some(Decision { action, window: None }))
    }
}
