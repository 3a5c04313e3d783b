use crate::Rewards;
use itertools::Itertools;
use rand::Rng;
use tempo_model::compile::{ConvertedProblem, Mode};
use tempo_model::{Action, ActionId, Durative, Outcome, State, draw};
use thiserror::Error;

/// Errors raised when the search asks for a transition that does not exist. They denote a bug in
/// the caller: legal actions are always applicable.
#[derive(Error, Debug, PartialEq)]
pub enum StepError {
    #[error("{action} is not applicable in the current state")]
    NotApplicable { action: String },
    #[error("{action} cannot be executed in {mode} mode")]
    WrongMode { action: String, mode: Mode },
    #[error("No outcome of {action} is defined in the current state")]
    NoOutcome { action: String },
}

/// Result of executing one action.
#[derive(Clone, Debug)]
pub struct Transition {
    pub state: State,
    pub reward: f64,
    /// True if the goals hold in `state`, before the deadline.
    pub terminal: bool,
}

/// Deterministic part of a transition, with the outcome tables that remain to be drawn.
struct Partial<'a> {
    state: State,
    draws: Vec<&'a [Outcome]>,
}

/// View of a converted problem as a Markov decision process.
///
/// In regular mode, time is not part of the state: it is tracked by a [PlanStn](crate::PlanStn)
/// maintained by the caller. In combination mode, each durative action is pushed in the queue of
/// executing actions when started, and every step lets time progress until the next one ends.
#[derive(Clone)]
pub struct Mdp<'a> {
    problem: &'a ConvertedProblem,
    rewards: Rewards,
}

impl<'a> Mdp<'a> {
    pub fn new(problem: &'a ConvertedProblem, rewards: Rewards) -> Self {
        Mdp { problem, rewards }
    }

    pub fn problem(&self) -> &'a ConvertedProblem {
        self.problem
    }

    pub fn rewards(&self) -> &Rewards {
        &self.rewards
    }

    pub fn initial_state(&self) -> State {
        self.problem.init.clone()
    }

    /// True if the goals hold in time.
    pub fn is_terminal(&self, state: &State) -> bool {
        self.problem.is_goal(state) && !self.is_late(state)
    }

    /// In combination mode, a state whose time exceeds the deadline is a dead end.
    pub fn is_late(&self, state: &State) -> bool {
        self.problem.mode == Mode::Combination && self.problem.deadline.is_some_and(|d| state.time() > d)
    }

    /// Actions that may be chosen in `state`, in the order of the problem.
    pub fn legal_actions(&self, state: &State) -> Vec<ActionId> {
        if self.is_late(state) {
            return Vec::new();
        }
        self.problem.ids().filter(|&id| self.is_legal(state, id)).collect()
    }

    pub fn is_legal(&self, state: &State, id: ActionId) -> bool {
        let action = self.problem.action(id);
        let available = match (self.problem.mode, action) {
            (Mode::Regular, Action::Instantaneous(_) | Action::Start(_) | Action::End(_)) => true,
            (
                Mode::Combination,
                Action::Instantaneous(_) | Action::Durative(_) | Action::Combination(_) | Action::NoOp,
            ) => true,
            _ => false,
        };
        available && action.is_applicable(state) && self.is_relevant(state, action)
    }

    /// A start is irrelevant when neither it nor its end could change anything in `state`.
    fn is_relevant(&self, state: &State, action: &Action) -> bool {
        let Action::Start(start) = action else {
            return true;
        };
        let Action::End(end) = self.problem.action(start.end) else {
            return true;
        };
        let useless = start
            .effects
            .add
            .iter()
            .filter(|&a| a != start.marker)
            .all(|a| state.is_set(a))
            && state.entails_none(&start.effects.del)
            && state.entails_all(&end.effects.add)
            && state.entails_none(&end.effects.del)
            && end.prob.iter().all(|p| state.entails_all(&p.targets));
        !useless
    }

    /// Executes `id` in `state`, drawing the outcome of its probabilistic effects with `rng`.
    pub fn step(&self, state: &State, id: ActionId, rng: &mut impl Rng) -> Result<Transition, StepError> {
        let Partial { state: mut next, draws } = self.successor(state, id)?;
        for outcomes in draws {
            let i = draw(outcomes, rng).ok_or_else(|| StepError::NoOutcome {
                action: self.problem.action(id).name().to_string(),
            })?;
            outcomes[i].apply(&mut next);
        }
        Ok(self.transition(next))
    }

    /// All possible results of executing `id` in `state`, with their probability.
    pub fn transitions(&self, state: &State, id: ActionId) -> Result<Vec<(f64, Transition)>, StepError> {
        let Partial { state: next, draws } = self.successor(state, id)?;
        if draws.is_empty() {
            return Ok(vec![(1.0, self.transition(next))]);
        }
        let transitions = draws
            .iter()
            .map(|outcomes| outcomes.iter())
            .multi_cartesian_product()
            .map(|combination| {
                let mut s = next.clone();
                let mut p = 1.0;
                for outcome in combination {
                    outcome.apply(&mut s);
                    p *= outcome.probability;
                }
                (p, self.transition(s))
            })
            .collect();
        Ok(transitions)
    }

    fn transition(&self, state: State) -> Transition {
        let terminal = self.is_terminal(&state);
        let reward = if terminal { self.rewards.goal } else { self.rewards.step };
        Transition {
            state,
            reward,
            terminal,
        }
    }

    /// Applies the deterministic effects of `id`. Distributions are evaluated in `state`, before
    /// anything is applied.
    fn successor(&self, state: &State, id: ActionId) -> Result<Partial<'a>, StepError> {
        let action = self.problem.action(id);
        if !action.is_applicable(state) {
            return Err(StepError::NotApplicable {
                action: action.name().to_string(),
            });
        }
        let mut next = state.clone();
        let mut draws = Vec::new();
        match (self.problem.mode, action) {
            (Mode::Regular, Action::Instantaneous(_) | Action::Start(_) | Action::End(_))
            | (Mode::Combination, Action::Instantaneous(_)) => {
                if let Some(effects) = action.immediate_effects() {
                    effects.apply(&mut next);
                }
                self.add_draws(state, action, &mut draws);
            }
            (Mode::Combination, Action::Durative(d)) => {
                start(&mut next, id, d);
                self.progress(state, &mut next, &mut draws);
            }
            (Mode::Combination, Action::Combination(c)) => {
                for &member in &c.members {
                    if let Action::Durative(d) = self.problem.action(member) {
                        start(&mut next, member, d);
                    }
                }
                self.progress(state, &mut next, &mut draws);
            }
            (Mode::Combination, Action::NoOp) => self.progress(state, &mut next, &mut draws),
            (mode, _) => {
                return Err(StepError::WrongMode {
                    action: action.name().to_string(),
                    mode,
                });
            }
        }
        Ok(Partial { state: next, draws })
    }

    /// Lets time pass until the next executing actions end, and applies their end effects.
    fn progress(&self, before: &State, next: &mut State, draws: &mut Vec<&'a [Outcome]>) {
        let Some((delta, finished)) = next.queue_mut().pop_next() else {
            return;
        };
        next.queue_mut().advance(delta);
        next.set_time(next.time() + delta);
        for id in finished {
            let action = self.problem.action(id);
            if let Action::Durative(d) = action {
                d.effects.apply(next);
            }
            self.add_draws(before, action, draws);
        }
    }

    fn add_draws(&self, before: &State, action: &'a Action, draws: &mut Vec<&'a [Outcome]>) {
        for effect in action.probabilistic_effects() {
            draws.push(effect.distribution.outcomes(before));
        }
    }
}

fn start(state: &mut State, id: ActionId, action: &Durative) {
    action.start_effects.apply(state);
    state.add(action.marker);
    state.queue_mut().push(id, action.duration.min);
}
