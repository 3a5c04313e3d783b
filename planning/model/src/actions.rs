use crate::{Atom, AtomSet, Conditions, Effects, ProbabilisticEffect, State};
use std::fmt::{Display, Formatter};

/// Index of an action in a [ConvertedProblem](crate::compile::ConvertedProblem).
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct ActionId(u32);

impl From<ActionId> for usize {
    fn from(id: ActionId) -> Self {
        id.0 as usize
    }
}

impl From<usize> for ActionId {
    fn from(i: usize) -> Self {
        ActionId(i as u32)
    }
}

impl Display for ActionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bounds on the duration of a durative action.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Duration {
    pub min: i64,
    pub max: i64,
}

impl Duration {
    pub fn fixed(d: i64) -> Self {
        Duration { min: d, max: d }
    }
    pub fn bounded(min: i64, max: i64) -> Self {
        Duration { min, max }
    }
}

#[derive(Clone, Debug)]
pub struct Instantaneous {
    pub name: String,
    pub pre: Conditions,
    pub effects: Effects,
    pub prob: Vec<ProbabilisticEffect>,
}

/// Start of a decomposed durative action.
#[derive(Clone, Debug)]
pub struct Start {
    pub name: String,
    pub pre: Conditions,
    pub effects: Effects,
    pub duration: Duration,
    pub end: ActionId,
    /// Set while the action executes.
    pub marker: Atom,
}

/// End of a decomposed durative action.
#[derive(Clone, Debug)]
pub struct End {
    pub name: String,
    pub pre: Conditions,
    pub effects: Effects,
    pub prob: Vec<ProbabilisticEffect>,
    pub start: ActionId,
    pub marker: Atom,
}

/// Durative action executed as a whole, in combination mode.
/// Start effects (and the marker) are applied when it starts, `effects` and `prob` when it ends.
#[derive(Clone, Debug)]
pub struct Durative {
    pub name: String,
    pub pre: Conditions,
    pub start_effects: Effects,
    pub effects: Effects,
    pub prob: Vec<ProbabilisticEffect>,
    pub duration: Duration,
    pub marker: Atom,
}

/// Set of durative actions started together.
#[derive(Clone, Debug)]
pub struct Combination {
    pub name: String,
    pub pre: Conditions,
    pub members: Vec<ActionId>,
    pub markers: AtomSet,
}

#[derive(Clone, Debug)]
pub enum Action {
    Instantaneous(Instantaneous),
    Start(Start),
    End(End),
    Durative(Durative),
    Combination(Combination),
    /// Lets the executing actions progress without starting anything.
    NoOp,
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Instantaneous(a) => &a.name,
            Action::Start(a) => &a.name,
            Action::End(a) => &a.name,
            Action::Durative(a) => &a.name,
            Action::Combination(a) => &a.name,
            Action::NoOp => "noop",
        }
    }

    /// Preconditions on the state. The no-op has none: its applicability depends on the queue of
    /// executing actions.
    pub fn preconditions(&self) -> Option<&Conditions> {
        match self {
            Action::Instantaneous(a) => Some(&a.pre),
            Action::Start(a) => Some(&a.pre),
            Action::End(a) => Some(&a.pre),
            Action::Durative(a) => Some(&a.pre),
            Action::Combination(a) => Some(&a.pre),
            Action::NoOp => None,
        }
    }

    pub fn preconditions_mut(&mut self) -> Option<&mut Conditions> {
        match self {
            Action::Instantaneous(a) => Some(&mut a.pre),
            Action::Start(a) => Some(&mut a.pre),
            Action::End(a) => Some(&mut a.pre),
            Action::Durative(a) => Some(&mut a.pre),
            Action::Combination(a) => Some(&mut a.pre),
            Action::NoOp => None,
        }
    }

    /// Effects applied at the instant the action is chosen.
    pub fn immediate_effects(&self) -> Option<&Effects> {
        match self {
            Action::Instantaneous(a) => Some(&a.effects),
            Action::Start(a) => Some(&a.effects),
            Action::End(a) => Some(&a.effects),
            Action::Durative(a) => Some(&a.start_effects),
            Action::Combination(_) | Action::NoOp => None,
        }
    }

    pub fn probabilistic_effects(&self) -> &[ProbabilisticEffect] {
        match self {
            Action::Instantaneous(a) => &a.prob,
            Action::End(a) => &a.prob,
            Action::Durative(a) => &a.prob,
            Action::Start(_) | Action::Combination(_) | Action::NoOp => &[],
        }
    }

    /// True if the preconditions hold in `state`.
    pub fn is_applicable(&self, state: &State) -> bool {
        match self.preconditions() {
            Some(pre) => pre.holds(state),
            None => !state.queue().is_empty(),
        }
    }

    pub fn is_instantaneous(&self) -> bool {
        matches!(self, Action::Instantaneous(_))
    }
}
