use crate::{Atom, AtomSet, Lit, State, World};
use itertools::Itertools;
use rand::Rng;
use smallvec::SmallVec;

/// Conjunction of literals: atoms required to be true and atoms required to be false.
#[derive(Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct Conditions {
    pub pos: AtomSet,
    pub neg: AtomSet,
}

impl Conditions {
    pub fn add(&mut self, lit: Lit) {
        if lit.value {
            self.pos.insert(lit.atom);
        } else {
            self.neg.insert(lit.atom);
        }
    }

    pub fn with(mut self, lit: Lit) -> Self {
        self.add(lit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty() && self.neg.is_empty()
    }

    pub fn holds(&self, state: &State) -> bool {
        state.entails_all(&self.pos) && state.entails_none(&self.neg)
    }

    pub fn union(&self, other: &Conditions) -> Conditions {
        Conditions {
            pos: self.pos.union(&other.pos),
            neg: self.neg.union(&other.neg),
        }
    }

    /// An atom required to be both true and false, if any.
    pub fn contradiction(&self) -> Option<Atom> {
        self.pos.common(&self.neg)
    }

    pub fn lits(&self) -> impl Iterator<Item = Lit> + '_ {
        self.pos.iter().map(Lit::pos).chain(self.neg.iter().map(Lit::neg))
    }

    pub fn format(&self, world: &World) -> String {
        self.lits().map(|l| world.display_lit(l)).join(" ")
    }
}

/// Deterministic effects: atoms made true and atoms made false.
#[derive(Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct Effects {
    pub add: AtomSet,
    pub del: AtomSet,
}

impl Effects {
    pub fn add(&mut self, lit: Lit) {
        if lit.value {
            self.add.insert(lit.atom);
        } else {
            self.del.insert(lit.atom);
        }
    }

    pub fn with(mut self, lit: Lit) -> Self {
        self.add(lit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.del.is_empty()
    }

    pub fn union(&self, other: &Effects) -> Effects {
        Effects {
            add: self.add.union(&other.add),
            del: self.del.union(&other.del),
        }
    }

    /// An atom set both true and false, if any.
    pub fn contradiction(&self) -> Option<Atom> {
        self.add.common(&self.del)
    }

    /// Deletes are applied before adds.
    pub fn apply(&self, state: &mut State) {
        for a in self.del.iter() {
            state.del(a);
        }
        for a in self.add.iter() {
            state.add(a);
        }
    }

    pub fn lits(&self) -> impl Iterator<Item = Lit> + '_ {
        self.add.iter().map(Lit::pos).chain(self.del.iter().map(Lit::neg))
    }
}

/// One possible outcome of a probabilistic effect.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub probability: f64,
    pub assignment: SmallVec<[Lit; 4]>,
}

impl Outcome {
    pub fn new(probability: f64, assignment: impl IntoIterator<Item = Lit>) -> Self {
        Outcome {
            probability,
            assignment: assignment.into_iter().collect(),
        }
    }

    /// The outcome that changes nothing.
    pub fn nothing(probability: f64) -> Self {
        Outcome::new(probability, [])
    }

    pub fn apply(&self, state: &mut State) {
        for lit in &self.assignment {
            state.set_to(lit.atom, lit.value);
        }
    }
}

/// Discrete distribution over outcomes, possibly depending on the state in which it is evaluated.
#[derive(Clone, Debug, PartialEq)]
pub enum Distribution {
    Table(Vec<Outcome>),
    /// Uses the `then` table in states where `condition` holds and the `otherwise` table elsewhere.
    Conditional {
        condition: Lit,
        then: Vec<Outcome>,
        otherwise: Vec<Outcome>,
    },
}

impl Distribution {
    /// Shorthand for the common `{p: assignment, 1-p: {}}` distribution.
    /// The empty outcome is omitted when `p` is 1.
    pub fn bernoulli(p: f64, assignment: impl IntoIterator<Item = Lit>) -> Self {
        let mut outcomes = vec![Outcome::new(p, assignment)];
        if 1.0 - p > 0.0 {
            outcomes.push(Outcome::nothing(1.0 - p));
        }
        Distribution::Table(outcomes)
    }

    /// Outcomes that may occur when the effect is applied in `state`.
    pub fn outcomes(&self, state: &State) -> &[Outcome] {
        match self {
            Distribution::Table(outcomes) => outcomes.as_slice(),
            Distribution::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if state.holds(*condition) {
                    then.as_slice()
                } else {
                    otherwise.as_slice()
                }
            }
        }
    }

    /// Every outcome that may occur in some state.
    pub fn all_outcomes(&self) -> impl Iterator<Item = &Outcome> + '_ {
        let (first, second): (&[Outcome], &[Outcome]) = match self {
            Distribution::Table(outcomes) => (outcomes.as_slice(), &[]),
            Distribution::Conditional { then, otherwise, .. } => (then.as_slice(), otherwise.as_slice()),
        };
        first.iter().chain(second.iter())
    }

    pub(crate) fn tables(&self) -> Vec<&[Outcome]> {
        match self {
            Distribution::Table(outcomes) => vec![outcomes.as_slice()],
            Distribution::Conditional { then, otherwise, .. } => vec![then.as_slice(), otherwise.as_slice()],
        }
    }
}

/// Effect whose result is drawn from a distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilisticEffect {
    /// Atoms that some outcome may modify.
    pub targets: AtomSet,
    pub distribution: Distribution,
}

impl ProbabilisticEffect {
    /// Builds the effect, its targets being all atoms assigned by some outcome.
    pub fn new(distribution: Distribution) -> Self {
        let targets = distribution
            .all_outcomes()
            .flat_map(|o| o.assignment.iter().map(|l| l.atom))
            .collect();
        ProbabilisticEffect { targets, distribution }
    }

    /// Draws the index of one outcome, according to the outcome weights in `state`.
    /// Returns `None` when no outcome is defined for this state.
    pub fn sample(&self, state: &State, rng: &mut impl Rng) -> Option<usize> {
        draw(self.distribution.outcomes(state), rng)
    }
}

/// Draws the index of one of the outcomes, according to their weights.
/// Returns `None` if there is no outcome with a positive weight.
pub fn draw(outcomes: &[Outcome], rng: &mut impl Rng) -> Option<usize> {
    let total: f64 = outcomes.iter().map(|o| o.probability).sum();
    if outcomes.is_empty() || total <= 0.0 {
        return None;
    }
    let mut r = rng.random::<f64>() * total;
    for (i, o) in outcomes.iter().enumerate() {
        if r < o.probability {
            return Some(i);
        }
        r -= o.probability;
    }
    Some(outcomes.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn conditional_distribution() {
        let mut world = World::new();
        let on = world.intern(&["on", "x", "m"]);
        let at = world.intern(&["at", "x", "m"]);
        let eff = ProbabilisticEffect::new(Distribution::Conditional {
            condition: Lit::pos(on),
            then: vec![Outcome::new(1.0, [Lit::neg(on)])],
            otherwise: vec![Outcome::new(1.0, [Lit::pos(at)])],
        });
        assert_eq!(eff.targets.iter().collect::<Vec<_>>(), vec![on, at]);

        let mut rng = SmallRng::seed_from_u64(0);
        let s = State::with_atoms(world.len(), [on]);
        let i = eff.sample(&s, &mut rng).unwrap();
        assert_eq!(eff.distribution.outcomes(&s)[i].assignment.as_slice(), &[Lit::neg(on)]);
        let s = State::new(world.len());
        let i = eff.sample(&s, &mut rng).unwrap();
        assert_eq!(eff.distribution.outcomes(&s)[i].assignment.as_slice(), &[Lit::pos(at)]);
    }

    #[test]
    fn sampling_follows_weights() {
        let mut world = World::new();
        let got = world.intern(&["got", "x"]);
        let eff = ProbabilisticEffect::new(Distribution::bernoulli(0.9, [Lit::pos(got)]));
        let state = State::new(world.len());
        let mut rng = SmallRng::seed_from_u64(42);
        let n = 10_000;
        let mut successes = 0;
        for _ in 0..n {
            let i = eff.sample(&state, &mut rng).unwrap();
            let mut next = state.clone();
            eff.distribution.outcomes(&state)[i].apply(&mut next);
            if next.is_set(got) {
                successes += 1;
            }
        }
        let ratio = successes as f64 / n as f64;
        assert!((ratio - 0.9).abs() < 0.02, "ratio: {ratio}");
    }
}
