use hashbrown::HashMap;
use tempo_model::compile::ConvertedProblem;
use tempo_model::{Action, ActionId, Atom, Conditions, Lit, State};

/// Temporal relaxed planning graph over a decomposed problem.
///
/// Delete effects are ignored: a literal, once reached, stays reachable. Each start makes its end
/// available after the minimal duration, and the outcomes of probabilistic effects become available
/// after the expected number of retries, i.e. an outcome of probability `p` of an action of
/// duration `d` is reached `d * (1/p - 1)` after the action.
///
/// Actions that are executing in the evaluated state (their marker is set) may end immediately.
#[derive(Clone)]
pub struct Trpg<'a> {
    problem: &'a ConvertedProblem,
}

impl<'a> Trpg<'a> {
    pub fn new(problem: &'a ConvertedProblem) -> Self {
        Trpg { problem }
    }

    pub fn problem(&self) -> &'a ConvertedProblem {
        self.problem
    }

    /// Earliest time at which the goals are reachable from `state`, which holds at time `now`.
    /// Infinite if they are not reachable before the deadline.
    pub fn goal_time(&self, state: &State, now: i64) -> f64 {
        let deadline = self.problem.deadline.map_or(f64::INFINITY, |d| d as f64);
        let num_atoms = state.num_atoms();
        let mut pos = state.clone();
        let mut neg = State::with_atoms(num_atoms, (0..num_atoms).map(Atom::from).filter(|&a| !state.is_set(a)));
        let mut t = now as f64;

        let mut earliest_end: HashMap<ActionId, f64> = HashMap::new();
        let mut remaining = Vec::new();
        for id in self.problem.ids() {
            match self.problem.action(id) {
                Action::End(end) => {
                    if state.is_set(end.marker) {
                        earliest_end.insert(id, t);
                    }
                    remaining.push(id);
                }
                Action::Start(_) | Action::Instantaneous(_) => remaining.push(id),
                _ => {}
            }
        }
        let mut delayed: Vec<(f64, Lit)> = Vec::new();

        loop {
            if pos.entails_all(&self.problem.goals) {
                return t;
            }
            if t > deadline {
                return f64::INFINITY;
            }
            let mut changed = false;

            delayed.retain(|&(at, lit)| {
                if at <= t {
                    relax(&mut pos, &mut neg, lit);
                    changed = true;
                    false
                } else {
                    true
                }
            });

            let mut k = 0;
            while k < remaining.len() {
                let id = remaining[k];
                let action = self.problem.action(id);
                let ready = match action {
                    Action::End(_) => earliest_end.get(&id).is_some_and(|&e| e <= t),
                    _ => true,
                };
                let reachable = action.preconditions().is_some_and(|pre| is_reachable(pre, &pos, &neg));
                if !(ready && reachable) {
                    k += 1;
                    continue;
                }
                remaining.swap_remove(k);
                changed = true;

                if let Action::Start(start) = action {
                    let end = t + start.duration.min as f64;
                    let e = earliest_end.entry(start.end).or_insert(end);
                    *e = e.min(end);
                }
                if let Some(effects) = action.immediate_effects() {
                    for lit in effects.lits() {
                        relax(&mut pos, &mut neg, lit);
                    }
                }
                let duration = match action {
                    Action::End(end) => match self.problem.action(end.start) {
                        Action::Start(start) => start.duration.min as f64,
                        _ => 0.0,
                    },
                    _ => 0.0,
                };
                for effect in action.probabilistic_effects() {
                    for outcome in effect.distribution.all_outcomes() {
                        let at = t + duration / outcome.probability;
                        for &lit in &outcome.assignment {
                            if at <= t {
                                relax(&mut pos, &mut neg, lit);
                            } else {
                                delayed.push((at, lit));
                            }
                        }
                    }
                }
            }

            if !changed {
                let next_delayed = delayed.iter().map(|&(at, _)| at).fold(f64::INFINITY, f64::min);
                let next_end = remaining
                    .iter()
                    .filter_map(|id| earliest_end.get(id))
                    .copied()
                    .filter(|&e| e > t)
                    .fold(f64::INFINITY, f64::min);
                let next = next_delayed.min(next_end);
                if next.is_infinite() {
                    return f64::INFINITY;
                }
                t = next;
            }
        }
    }

    /// Value in `[0, 1]` of `state` at time `now`: [logistic] of the goal time when there is a
    /// deadline, `1 / (1 + t)` otherwise.
    pub fn value(&self, state: &State, now: i64) -> f64 {
        let t = self.goal_time(state, now);
        match self.problem.deadline {
            Some(deadline) => logistic(t, deadline as f64),
            None if t.is_finite() => 1.0 / (1.0 + t),
            None => 0.0,
        }
    }
}

fn is_reachable(pre: &Conditions, pos: &State, neg: &State) -> bool {
    pos.entails_all(&pre.pos) && neg.entails_all(&pre.neg)
}

fn relax(pos: &mut State, neg: &mut State, lit: Lit) {
    if lit.value {
        pos.add(lit.atom);
    } else {
        neg.add(lit.atom);
    }
}

/// Decreasing function with `f(0) = 1` and `f(t) = 0` for any `t >= deadline`: a logistic curve
/// centered on `deadline / 2` with steepness `10 / deadline`, rescaled to hit both end points.
pub fn logistic(t: f64, deadline: f64) -> f64 {
    if deadline <= 0.0 || !(t < deadline) {
        return 0.0;
    }
    let k = 10.0 / deadline;
    let sigma = |x: f64| 1.0 / (1.0 + (k * (x - deadline / 2.0)).exp());
    ((sigma(t) - sigma(deadline)) / (sigma(0.0) - sigma(deadline))).clamp(0.0, 1.0)
}
