use crate::errors::ModelError;
use crate::{Atom, AtomSet, Conditions, Duration, Effects, Lit, ProbabilisticEffect, World};
use itertools::Itertools;

/// Timing of a condition of a durative action.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Timing {
    /// Must hold when the action starts.
    Start,
    /// Must hold over the whole execution.
    Overall,
    /// Must hold when the action ends.
    End,
}

/// Ground instantaneous action, as provided by the domain layer.
#[derive(Clone, Debug)]
pub struct InstantaneousAction {
    pub name: String,
    pub pre: Conditions,
    pub effects: Effects,
    pub prob: Vec<ProbabilisticEffect>,
}

impl InstantaneousAction {
    pub fn new(name: impl Into<String>) -> Self {
        InstantaneousAction {
            name: name.into(),
            pre: Conditions::default(),
            effects: Effects::default(),
            prob: Vec::new(),
        }
    }

    pub fn condition(mut self, atom: Atom, value: bool) -> Self {
        self.pre.add(Lit::new(atom, value));
        self
    }

    pub fn effect(mut self, atom: Atom, value: bool) -> Self {
        self.effects.add(Lit::new(atom, value));
        self
    }

    pub fn probabilistic_effect(mut self, effect: ProbabilisticEffect) -> Self {
        self.prob.push(effect);
        self
    }
}

/// Ground durative action, as provided by the domain layer.
#[derive(Clone, Debug)]
pub struct DurativeAction {
    pub name: String,
    pub duration: Duration,
    pub start_pre: Conditions,
    pub overall_pre: Conditions,
    pub end_pre: Conditions,
    pub start_effects: Effects,
    /// Effects at the end of the action.
    pub effects: Effects,
    /// Probabilistic effects, realized at the end of the action.
    pub prob: Vec<ProbabilisticEffect>,
}

impl DurativeAction {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        DurativeAction {
            name: name.into(),
            duration,
            start_pre: Conditions::default(),
            overall_pre: Conditions::default(),
            end_pre: Conditions::default(),
            start_effects: Effects::default(),
            effects: Effects::default(),
            prob: Vec::new(),
        }
    }

    pub fn condition(mut self, timing: Timing, atom: Atom, value: bool) -> Self {
        let lit = Lit::new(atom, value);
        match timing {
            Timing::Start => self.start_pre.add(lit),
            Timing::Overall => self.overall_pre.add(lit),
            Timing::End => self.end_pre.add(lit),
        }
        self
    }

    pub fn start_effect(mut self, atom: Atom, value: bool) -> Self {
        self.start_effects.add(Lit::new(atom, value));
        self
    }

    pub fn effect(mut self, atom: Atom, value: bool) -> Self {
        self.effects.add(Lit::new(atom, value));
        self
    }

    pub fn probabilistic_effect(mut self, effect: ProbabilisticEffect) -> Self {
        self.prob.push(effect);
        self
    }

    /// Atoms that may be modified at the end of the action: end effects and probabilistic targets.
    pub fn end_writes(&self) -> Effects {
        let targets: AtomSet = self.prob.iter().flat_map(|p| p.targets.iter()).collect();
        Effects {
            add: self.effects.add.union(&targets),
            del: self.effects.del.union(&targets),
        }
    }
}

#[derive(Clone, Debug)]
pub enum GroundAction {
    Instantaneous(InstantaneousAction),
    Durative(DurativeAction),
}

impl GroundAction {
    pub fn name(&self) -> &str {
        match self {
            GroundAction::Instantaneous(a) => &a.name,
            GroundAction::Durative(a) => &a.name,
        }
    }
}

impl From<InstantaneousAction> for GroundAction {
    fn from(a: InstantaneousAction) -> Self {
        GroundAction::Instantaneous(a)
    }
}

impl From<DurativeAction> for GroundAction {
    fn from(a: DurativeAction) -> Self {
        GroundAction::Durative(a)
    }
}

/// Ground planning problem: the input of the compilers.
#[derive(Clone, Debug)]
pub struct Problem {
    pub name: String,
    pub world: World,
    /// Atoms true in the initial state. All others are false.
    pub init: AtomSet,
    pub goals: AtomSet,
    /// Latest time at which the goals must be achieved, relative to the plan start.
    pub deadline: Option<i64>,
    actions: Vec<GroundAction>,
}

impl Problem {
    pub fn new(name: impl Into<String>, world: World) -> Self {
        Problem {
            name: name.into(),
            world,
            init: AtomSet::new(),
            goals: AtomSet::new(),
            deadline: None,
            actions: Vec::new(),
        }
    }

    pub fn actions(&self) -> &[GroundAction] {
        &self.actions
    }

    /// Adds an action after checking that it is well formed.
    pub fn add_action(&mut self, action: impl Into<GroundAction>) -> Result<(), ModelError> {
        let action = action.into();
        if self.actions.iter().any(|a| a.name() == action.name()) {
            return Err(ModelError::DuplicateAction(action.name().to_string()));
        }
        self.check(&action)?;
        self.actions.push(action);
        Ok(())
    }

    fn check(&self, action: &GroundAction) -> Result<(), ModelError> {
        let name = action.name();
        match action {
            GroundAction::Instantaneous(a) => {
                self.check_conditions(name, &a.pre, "precondition")?;
                self.check_effects(name, &a.effects, "effect")?;
                self.check_probabilistic(name, &a.prob)
            }
            GroundAction::Durative(a) => {
                if a.duration.min < 0 || a.duration.min > a.duration.max {
                    return Err(ModelError::InvalidDuration {
                        action: name.to_string(),
                        min: a.duration.min,
                        max: a.duration.max,
                    });
                }
                self.check_conditions(name, &a.start_pre, "start")?;
                self.check_conditions(name, &a.overall_pre, "overall")?;
                self.check_conditions(name, &a.end_pre, "end")?;
                self.check_effects(name, &a.start_effects, "start")?;
                self.check_effects(name, &a.effects, "end")?;
                self.check_probabilistic(name, &a.prob)
            }
        }
    }

    fn check_conditions(&self, action: &str, pre: &Conditions, phase: &'static str) -> Result<(), ModelError> {
        self.check_known(action, pre.pos.iter().chain(pre.neg.iter()))?;
        match pre.contradiction() {
            Some(atom) => Err(ModelError::ConflictingPreconditions {
                action: action.to_string(),
                atom: self.world.display(atom).to_string(),
                phase,
            }),
            None => Ok(()),
        }
    }

    fn check_effects(&self, action: &str, effects: &Effects, phase: &'static str) -> Result<(), ModelError> {
        self.check_known(action, effects.add.iter().chain(effects.del.iter()))?;
        match effects.contradiction() {
            Some(atom) => Err(ModelError::ConflictingEffects {
                action: action.to_string(),
                atom: self.world.display(atom).to_string(),
                phase,
            }),
            None => Ok(()),
        }
    }

    fn check_probabilistic(&self, action: &str, effects: &[ProbabilisticEffect]) -> Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidDistribution {
            action: action.to_string(),
            reason,
        };
        for eff in effects {
            self.check_known(action, eff.targets.iter())?;
            for table in eff.distribution.tables() {
                if table.is_empty() {
                    return Err(invalid("no outcome".to_string()));
                }
                if let Some(o) = table.iter().find(|o| !(o.probability > 0.0 && o.probability <= 1.0)) {
                    return Err(invalid(format!("probability {} out of (0, 1]", o.probability)));
                }
                let total: f64 = table.iter().map(|o| o.probability).sum();
                if (total - 1.0).abs() > 1e-6 {
                    return Err(invalid(format!("probabilities sum to {total}")));
                }
                for o in table {
                    let mut outcome = Effects::default();
                    o.assignment.iter().for_each(|l| outcome.add(*l));
                    self.check_effects(action, &outcome, "outcome")?;
                }
            }
        }
        Ok(())
    }

    fn check_known(&self, action: &str, mut atoms: impl Iterator<Item = Atom>) -> Result<(), ModelError> {
        if atoms.any(|a| usize::from(a) >= self.world.len()) {
            Err(ModelError::UnknownAtom(action.to_string()))
        } else {
            Ok(())
        }
    }

    /// Human readable summary of the goals.
    pub fn format_goals(&self) -> String {
        self.goals.iter().map(|a| self.world.display(a)).join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Distribution, Outcome};

    #[test]
    fn rejects_ill_formed_actions() {
        let mut world = World::new();
        let p = world.intern(&["p"]);
        let q = world.intern(&["q"]);
        let mut pb = Problem::new("test", world);

        let a = DurativeAction::new("a", Duration::fixed(2))
            .condition(Timing::Overall, p, true)
            .condition(Timing::Overall, p, false);
        assert!(matches!(
            pb.add_action(a),
            Err(ModelError::ConflictingPreconditions { phase: "overall", .. })
        ));

        // the same atom may have different values at different phases
        let b = DurativeAction::new("b", Duration::fixed(2))
            .condition(Timing::Start, p, true)
            .condition(Timing::End, p, false);
        assert_eq!(pb.add_action(b), Ok(()));

        let c = InstantaneousAction::new("c").effect(q, true).effect(q, false);
        assert!(matches!(pb.add_action(c), Err(ModelError::ConflictingEffects { .. })));

        let d = DurativeAction::new("d", Duration::bounded(3, 2));
        assert!(matches!(pb.add_action(d), Err(ModelError::InvalidDuration { .. })));

        let e = InstantaneousAction::new("e").probabilistic_effect(ProbabilisticEffect::new(Distribution::Table(vec![
            Outcome::new(0.5, [Lit::pos(q)]),
            Outcome::nothing(0.2),
        ])));
        assert!(matches!(pb.add_action(e), Err(ModelError::InvalidDistribution { .. })));

        let b2 = InstantaneousAction::new("b");
        assert_eq!(pb.add_action(b2), Err(ModelError::DuplicateAction("b".to_string())));
        assert_eq!(pb.actions().len(), 1);
    }

    #[test]
    fn certain_bernoulli_effects_are_accepted() {
        let mut world = World::new();
        let p = world.intern(&["p"]);
        let mut pb = Problem::new("test", world);
        for (name, probability) in [("sure", 1.0), ("likely", 0.9)] {
            let effect = ProbabilisticEffect::new(Distribution::bernoulli(probability, [Lit::pos(p)]));
            assert_eq!(pb.add_action(InstantaneousAction::new(name).probabilistic_effect(effect)), Ok(()));
        }
        let GroundAction::Instantaneous(sure) = &pb.actions()[0] else {
            panic!("expected an instantaneous action")
        };
        assert_eq!(sure.prob[0].distribution, Distribution::Table(vec![Outcome::new(1.0, [Lit::pos(p)])]));
    }
}
