use crate::compile::{ConvertedProblem, Mode};
use crate::{
    Action, ActionId, Atom, Conditions, DurativeAction, Effects, End, GroundAction, Instantaneous, Lit, Problem, Start,
    State, World,
};
use tracing::debug;

/// Marker atom that is true while the durative action `name` is executing.
pub(crate) fn marker_of(world: &mut World, name: &str) -> Atom {
    world.intern(&["in-execution", &format!("start-{name}")])
}

/// True if applying `writes` would violate `pre`.
pub(crate) fn contradicts(pre: &Conditions, writes: &Effects) -> bool {
    pre.pos.intersects(&writes.del) || pre.neg.intersects(&writes.add)
}

/// Atoms possibly modified by an instantaneous action, probabilistic targets counting as both
/// added and deleted.
pub(crate) fn instantaneous_writes(effects: &Effects, prob: &[crate::ProbabilisticEffect]) -> Effects {
    let mut writes = effects.clone();
    for p in prob {
        writes.add.extend(p.targets.iter());
        writes.del.extend(p.targets.iter());
    }
    writes
}

pub(crate) fn add_guard(actions: &mut [Action], id: ActionId, marker: Atom) {
    if let Some(pre) = actions[usize::from(id)].preconditions_mut() {
        pre.add(Lit::neg(marker));
    }
}

/// Engine actions resulting from one ground action.
#[derive(Copy, Clone)]
enum Compiled {
    Instantaneous(ActionId),
    Durative { start: ActionId, end: ActionId, marker: Atom },
}

/// Splits each durative action `A` into `start_A` and `end_A`, linked by the marker
/// `(in-execution start-A)`, and adds mutual exclusion guards:
///  - hard: if the start effects of `B` contradict an OVERALL condition of `A`, neither can start
///    while the other is executing;
///  - soft: if the end effects of `B` contradict an OVERALL condition of `A`, `B` cannot end while
///    `A` is executing;
///  - an instantaneous action whose effects contradict an OVERALL condition of `A` cannot occur
///    while `A` is executing.
pub fn decompose(problem: &Problem) -> ConvertedProblem {
    let mut world = problem.world.clone();
    let mut actions = Vec::with_capacity(2 * problem.actions().len());
    let mut compiled = Vec::with_capacity(problem.actions().len());

    for action in problem.actions() {
        match action {
            GroundAction::Instantaneous(a) => {
                compiled.push(Compiled::Instantaneous(ActionId::from(actions.len())));
                actions.push(Action::Instantaneous(Instantaneous {
                    name: a.name.clone(),
                    pre: a.pre.clone(),
                    effects: a.effects.clone(),
                    prob: a.prob.clone(),
                }));
            }
            GroundAction::Durative(a) => {
                let marker = marker_of(&mut world, &a.name);
                let start = ActionId::from(actions.len());
                let end = ActionId::from(actions.len() + 1);
                let (s, e) = split(a, marker, start, end);
                compiled.push(Compiled::Durative { start, end, marker });
                actions.push(Action::Start(s));
                actions.push(Action::End(e));
            }
        }
    }

    for (ia, a) in problem.actions().iter().enumerate() {
        let (GroundAction::Durative(a), Compiled::Durative { start: a_start, marker: a_marker, .. }) = (a, compiled[ia])
        else {
            continue;
        };
        if a.overall_pre.is_empty() {
            continue;
        }
        for (ib, b) in problem.actions().iter().enumerate() {
            if ia == ib {
                continue;
            }
            match (b, compiled[ib]) {
                (
                    GroundAction::Durative(b),
                    Compiled::Durative {
                        start: b_start,
                        end: b_end,
                        marker: b_marker,
                    },
                ) => {
                    if contradicts(&a.overall_pre, &b.start_effects) {
                        debug!("hard mutex: {} / {}", a.name, b.name);
                        add_guard(&mut actions, b_start, a_marker);
                        add_guard(&mut actions, a_start, b_marker);
                    }
                    if contradicts(&a.overall_pre, &b.end_writes()) {
                        debug!("soft mutex: {} / {}", a.name, b.name);
                        add_guard(&mut actions, b_end, a_marker);
                    }
                }
                (GroundAction::Instantaneous(b), Compiled::Instantaneous(id)) => {
                    if contradicts(&a.overall_pre, &instantaneous_writes(&b.effects, &b.prob)) {
                        debug!("mutex: {} / {}", a.name, b.name);
                        add_guard(&mut actions, id, a_marker);
                    }
                }
                _ => unreachable!(),
            }
        }
    }

    ConvertedProblem {
        name: problem.name.clone(),
        mode: Mode::Regular,
        init: State::with_atoms(world.len(), problem.init.iter()),
        world,
        goals: problem.goals.clone(),
        deadline: problem.deadline,
        actions,
    }
}

fn split(a: &DurativeAction, marker: Atom, start_id: ActionId, end_id: ActionId) -> (Start, End) {
    // OVERALL conditions established by the start effects need not hold before the start
    let overall = Conditions {
        pos: a.overall_pre.pos.difference(&a.start_effects.add),
        neg: a.overall_pre.neg.difference(&a.start_effects.del),
    };
    let start = Start {
        name: format!("start_{}", a.name),
        pre: a.start_pre.union(&overall).with(Lit::neg(marker)),
        effects: a.start_effects.clone().with(Lit::pos(marker)),
        duration: a.duration,
        end: end_id,
        marker,
    };
    let end = End {
        name: format!("end_{}", a.name),
        pre: a.end_pre.union(&a.overall_pre).with(Lit::pos(marker)),
        effects: a.effects.clone().with(Lit::neg(marker)),
        prob: a.prob.clone(),
        start: start_id,
        marker,
    };
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Distribution, Duration, InstantaneousAction, ProbabilisticEffect, Timing};

    fn pre(pb: &ConvertedProblem, name: &str) -> Conditions {
        let id = pb.find(name).unwrap();
        pb.action(id).preconditions().unwrap().clone()
    }

    #[test]
    fn split_into_start_and_end() {
        let mut world = World::new();
        let p = world.intern(&["p"]);
        let q = world.intern(&["q"]);
        let r = world.intern(&["r"]);
        let mut pb = Problem::new("split", world);
        pb.add_action(
            DurativeAction::new("a", Duration::fixed(3))
                .condition(Timing::Start, r, true)
                .condition(Timing::Overall, p, true)
                .condition(Timing::Overall, q, true)
                .start_effect(q, true)
                .effect(p, false)
                .probabilistic_effect(ProbabilisticEffect::new(Distribution::bernoulli(0.5, [Lit::pos(r)]))),
        )
        .unwrap();

        let converted = decompose(&pb);
        assert_eq!(converted.actions().len(), 2);
        let marker = converted.world.atom(&["in-execution", "start-a"]).unwrap();
        let Action::Start(start) = converted.action(ActionId::from(0)) else {
            panic!()
        };
        let Action::End(end) = converted.action(ActionId::from(1)) else {
            panic!()
        };
        assert_eq!(start.name, "start_a");
        assert_eq!(start.end, ActionId::from(1));
        assert_eq!(end.start, ActionId::from(0));
        assert_eq!(start.duration, Duration::fixed(3));

        // q is established by the start effect and is not required before
        assert!(start.pre.pos.contains(p) && start.pre.pos.contains(r) && !start.pre.pos.contains(q));
        assert!(start.pre.neg.contains(marker));
        assert!(start.effects.add.contains(marker) && start.effects.add.contains(q));

        assert!(end.pre.pos.contains(p) && end.pre.pos.contains(q) && end.pre.pos.contains(marker));
        assert!(!end.pre.pos.contains(r));
        assert!(end.effects.del.contains(marker) && end.effects.del.contains(p));
        assert_eq!(end.prob.len(), 1);
        assert_eq!(converted.init.num_atoms(), 4);
    }

    #[test]
    fn mutex_guards() {
        let mut world = World::new();
        let p = world.intern(&["p"]);
        let mut pb = Problem::new("mutex", world);
        // `a` needs p during its whole execution
        pb.add_action(DurativeAction::new("a", Duration::fixed(4)).condition(Timing::Overall, p, true))
            .unwrap();
        // `hard` deletes p when it starts
        pb.add_action(DurativeAction::new("hard", Duration::fixed(2)).start_effect(p, false))
            .unwrap();
        // `soft` deletes p when it ends
        pb.add_action(DurativeAction::new("soft", Duration::fixed(2)).effect(p, false))
            .unwrap();
        // `inst` may delete p
        pb.add_action(
            InstantaneousAction::new("inst")
                .probabilistic_effect(ProbabilisticEffect::new(Distribution::bernoulli(0.5, [Lit::neg(p)]))),
        )
        .unwrap();
        // `free` does not interfere
        pb.add_action(DurativeAction::new("free", Duration::fixed(1)).effect(p, true))
            .unwrap();

        let converted = decompose(&pb);
        let marker = |name: &str| {
            converted
                .world
                .atom(&["in-execution", &format!("start-{name}")])
                .unwrap()
        };

        // hard mutex: each start is guarded against the other
        assert!(pre(&converted, "start_hard").neg.contains(marker("a")));
        assert!(pre(&converted, "start_a").neg.contains(marker("hard")));
        assert!(!pre(&converted, "end_hard").neg.contains(marker("a")));

        // soft mutex: only the end carries the guard
        assert!(pre(&converted, "end_soft").neg.contains(marker("a")));
        assert!(!pre(&converted, "start_soft").neg.contains(marker("a")));
        assert!(!pre(&converted, "start_a").neg.contains(marker("soft")));
        assert!(!pre(&converted, "end_a").neg.contains(marker("soft")));

        assert!(pre(&converted, "inst").neg.contains(marker("a")));

        assert_eq!(pre(&converted, "start_free").neg.len(), 1);
        assert_eq!(pre(&converted, "end_free").neg.len(), 0);
        assert!(!pre(&converted, "start_a").neg.contains(marker("free")));
    }
}
