use crate::compile::decompose::{add_guard, contradicts, decompose, instantaneous_writes, marker_of};
use crate::compile::{ConvertedProblem, Mode};
use crate::{
    Action, ActionId, AtomSet, Combination, Conditions, Durative, Effects, GroundAction, Instantaneous, Lit, Problem,
    State,
};
use itertools::Itertools;
use tracing::{debug, warn};

/// Domain-specific rule restricting which durative actions may be started together.
pub trait CombinationFilter {
    /// Whether `candidate` may join the (pairwise compatible) `members`.
    fn allows(&self, members: &[&Durative], candidate: &Durative) -> bool;
}

/// Accepts any set of pairwise compatible actions.
pub struct AllowAll;

impl CombinationFilter for AllowAll {
    fn allows(&self, _members: &[&Durative], _candidate: &Durative) -> bool {
        true
    }
}

/// Result of the combination compilation.
pub struct CombinedProblem {
    /// Actions of the search: instantaneous, durative, combinations and the no-op.
    pub problem: ConvertedProblem,
    /// Decomposition of the same problem, over the same atoms. Durative actions share their
    /// execution marker with their start action, so states of `problem` can be evaluated on `split`.
    pub split: ConvertedProblem,
}

/// Builds the combination-mode problem:
///  - each durative action is kept whole, guarded by its own execution marker;
///  - mutually exclusive actions are guarded against each other's execution;
///  - every set of at least two pairwise compatible durative actions accepted by `filter` becomes a
///    [Combination] (only the maximal ones if `maximal_only`);
///  - a no-op is appended.
///
/// Sets are enumerated recursively, adding candidates in a fixed order and abandoning a branch as
/// soon as a candidate is incompatible with the current set. The number of sets is still
/// exponential in the number of pairwise compatible durative actions.
pub fn combine(problem: &Problem, filter: &dyn CombinationFilter, maximal_only: bool) -> CombinedProblem {
    let split = decompose(problem);
    let mut world = split.world.clone();
    let mut actions = Vec::with_capacity(problem.actions().len() + 1);

    for action in problem.actions() {
        match action {
            GroundAction::Instantaneous(a) => actions.push(Action::Instantaneous(Instantaneous {
                name: a.name.clone(),
                pre: a.pre.clone(),
                effects: a.effects.clone(),
                prob: a.prob.clone(),
            })),
            GroundAction::Durative(a) => {
                let marker = marker_of(&mut world, &a.name);
                let pre = a.start_pre.union(&a.overall_pre).union(&a.end_pre);
                if let Some(atom) = pre.contradiction() {
                    warn!("{} can never be applied: it requires {} to be both true and false", a.name, world.display(atom));
                }
                actions.push(Action::Durative(Durative {
                    name: a.name.clone(),
                    pre: pre.with(Lit::neg(marker)),
                    start_effects: a.start_effects.clone(),
                    effects: a.effects.clone().with(Lit::neg(marker)),
                    prob: a.prob.clone(),
                    duration: a.duration,
                    marker,
                }));
            }
        }
    }
    debug_assert_eq!(world.len(), split.world.len());

    let mutexes = (0..actions.len())
        .tuple_combinations()
        .filter(|&(i, j)| are_mutex(&actions[i], &actions[j]))
        .collect_vec();
    for (i, j) in mutexes {
        debug!("mutex: {} / {}", actions[i].name(), actions[j].name());
        if let Action::Durative(b) = &actions[j] {
            let marker = b.marker;
            add_guard(&mut actions, ActionId::from(i), marker);
        }
        if let Action::Durative(a) = &actions[i] {
            let marker = a.marker;
            add_guard(&mut actions, ActionId::from(j), marker);
        }
    }

    let durative = (0..actions.len())
        .filter(|&i| matches!(actions[i], Action::Durative(_)))
        .map(ActionId::from)
        .collect_vec();
    let mut sets = Vec::new();
    enumerate(&actions, &durative, filter, 0, &mut Vec::new(), &mut sets);
    if maximal_only {
        let all = sets.clone();
        sets.retain(|s| !all.iter().any(|o| o.len() > s.len() && s.iter().all(|m| o.contains(m))));
    }
    debug!("{} combinations of {} durative actions", sets.len(), durative.len());

    for members in sets {
        let mut pre = Conditions::default();
        let mut markers = AtomSet::new();
        for &m in &members {
            if let Action::Durative(d) = &actions[usize::from(m)] {
                pre = pre.union(&d.pre);
                markers.insert(d.marker);
            }
        }
        let name = members.iter().map(|&m| actions[usize::from(m)].name()).join(",");
        actions.push(Action::Combination(Combination {
            name,
            pre,
            members,
            markers,
        }));
    }
    actions.push(Action::NoOp);

    let problem = ConvertedProblem {
        name: problem.name.clone(),
        mode: Mode::Combination,
        init: State::with_atoms(world.len(), problem.init.iter()),
        world,
        goals: problem.goals.clone(),
        deadline: problem.deadline,
        actions,
    };
    CombinedProblem { problem, split }
}

/// Atoms possibly modified by an action at any point of its execution.
fn writes(action: &Action) -> Effects {
    match action {
        Action::Durative(d) => instantaneous_writes(&d.start_effects.union(&d.effects), &d.prob),
        Action::Instantaneous(a) => instantaneous_writes(&a.effects, &a.prob),
        _ => Effects::default(),
    }
}

/// Two actions are mutually exclusive if they cannot overlap: their preconditions are inconsistent,
/// their effects conflict, or the effects of one may violate the preconditions of the other.
/// Instantaneous actions never overlap.
pub fn are_mutex(a: &Action, b: &Action) -> bool {
    if a.is_instantaneous() && b.is_instantaneous() {
        return false;
    }
    let (Some(pa), Some(pb)) = (a.preconditions(), b.preconditions()) else {
        return false;
    };
    let (wa, wb) = (writes(a), writes(b));
    let inconsistent_preconditions = pa.pos.intersects(&pb.neg) || pa.neg.intersects(&pb.pos);
    let conflicting_outcomes = wa.del.intersects(&wb.add) || wa.add.intersects(&wb.del);
    inconsistent_preconditions || conflicting_outcomes || contradicts(pa, &wb) || contradicts(pb, &wa)
}

fn enumerate(
    actions: &[Action],
    durative: &[ActionId],
    filter: &dyn CombinationFilter,
    from: usize,
    current: &mut Vec<ActionId>,
    out: &mut Vec<Vec<ActionId>>,
) {
    let as_durative = |id: ActionId| match &actions[usize::from(id)] {
        Action::Durative(d) => Some(d),
        _ => None,
    };
    for k in from..durative.len() {
        let Some(candidate) = as_durative(durative[k]) else {
            continue;
        };
        let members = current.iter().filter_map(|&m| as_durative(m)).collect_vec();
        if members.iter().any(|m| candidate.pre.neg.contains(m.marker)) {
            continue;
        }
        if !filter.allows(&members, candidate) {
            continue;
        }
        current.push(durative[k]);
        if current.len() > 1 {
            out.push(current.clone());
        }
        enumerate(actions, durative, filter, k + 1, current, out);
        current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Duration, DurativeAction, InstantaneousAction, Timing, World};

    fn members(pb: &ConvertedProblem) -> Vec<String> {
        pb.actions()
            .iter()
            .filter(|a| matches!(a, Action::Combination(_)))
            .map(|a| a.name().to_string())
            .sorted()
            .collect()
    }

    fn problem() -> Problem {
        let mut world = World::new();
        let p = world.intern(&["p"]);
        let q = world.intern(&["q"]);
        let r = world.intern(&["r"]);
        let s = world.intern(&["s"]);
        let mut pb = Problem::new("combination", world);
        pb.add_action(DurativeAction::new("x", Duration::fixed(2)).condition(Timing::Overall, p, true).effect(q, true))
            .unwrap();
        // deletes the condition of `x`
        pb.add_action(DurativeAction::new("y", Duration::fixed(3)).effect(p, false))
            .unwrap();
        pb.add_action(DurativeAction::new("z", Duration::fixed(1)).effect(r, true))
            .unwrap();
        pb.add_action(DurativeAction::new("w", Duration::fixed(1)).effect(s, true))
            .unwrap();
        pb.add_action(InstantaneousAction::new("i1").effect(s, false)).unwrap();
        pb.add_action(InstantaneousAction::new("i2").effect(s, true)).unwrap();
        pb
    }

    #[test]
    fn pairwise_compatible_sets() {
        let combined = combine(&problem(), &AllowAll, false);
        let pb = &combined.problem;
        assert_eq!(pb.mode, Mode::Combination);
        assert_eq!(
            members(pb),
            vec!["x,w", "x,z", "x,z,w", "y,w", "y,z", "y,z,w", "z,w"]
                .into_iter()
                .map(String::from)
                .sorted()
                .collect_vec()
        );
        assert!(matches!(pb.actions().last(), Some(Action::NoOp)));

        // no combination contains two mutually exclusive actions
        for action in pb.actions() {
            if let Action::Combination(c) = action {
                for (a, b) in c.members.iter().tuple_combinations() {
                    assert!(!are_mutex(pb.action(*a), pb.action(*b)), "{}", c.name);
                }
                assert_eq!(c.markers.len(), c.members.len());
            }
        }

        // guards: x and y cannot overlap, and `i1` cannot occur while `w` executes
        let marker = |name: &str| pb.world.atom(&["in-execution", &format!("start-{name}")]).unwrap();
        let pre = |name: &str| pb.action(pb.find(name).unwrap()).preconditions().unwrap().clone();
        assert!(pre("x").neg.contains(marker("y")));
        assert!(pre("y").neg.contains(marker("x")));
        assert!(pre("i1").neg.contains(marker("w")));
        assert!(!pre("i1").neg.contains(marker("z")));
        assert!(!pre("w").neg.contains(marker("z")));
        // instantaneous actions are never mutually exclusive
        assert!(!are_mutex(pb.action(pb.find("i1").unwrap()), pb.action(pb.find("i2").unwrap())));
    }

    #[test]
    fn maximal_sets_and_filter() {
        let combined = combine(&problem(), &AllowAll, true);
        assert_eq!(members(&combined.problem), vec!["x,z,w".to_string(), "y,z,w".to_string()]);

        struct NoW;
        impl CombinationFilter for NoW {
            fn allows(&self, members: &[&Durative], candidate: &Durative) -> bool {
                candidate.name != "w" || members.is_empty()
            }
        }
        let combined = combine(&problem(), &NoW, false);
        assert_eq!(members(&combined.problem), vec!["x,z".to_string(), "y,z".to_string()]);
    }

    #[test]
    fn split_problem_shares_markers() {
        let combined = combine(&problem(), &AllowAll, false);
        let (pb, split) = (&combined.problem, &combined.split);
        assert_eq!(pb.world.len(), split.world.len());
        assert_eq!(pb.init, split.init);
        let Action::Durative(x) = pb.action(pb.find("x").unwrap()) else {
            panic!()
        };
        let Action::Start(start_x) = split.action(split.find("start_x").unwrap()) else {
            panic!()
        };
        assert_eq!(x.marker, start_x.marker);
    }
}
