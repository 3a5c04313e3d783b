use crate::search::tree::{ANodeId, ActionNode, SNodeId, StateNode, Stats, Tree};
use crate::search::{Budget, Context, Decision, Search};
use crate::{PlanStn, Selection, StepError, Timepoint};
use itertools::Itertools;
use rand::Rng;
use rand::rngs::SmallRng;
use tempo_model::{ActionId, State};
use tracing::{debug, trace};

/// Monte-Carlo tree search with UCT selection.
///
/// The tree alternates state nodes and action nodes. In regular mode, each action node carries the
/// schedule obtained by appending its action to the schedule of its parent, and actions leading to
/// an inconsistent schedule are never added to the tree.
pub struct Mcts<'a> {
    ctx: Context<'a>,
    tree: Option<Tree>,
}

impl<'a> Mcts<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Mcts { ctx, tree: None }
    }

    /// Number of nodes in the current tree.
    pub fn num_nodes(&self) -> usize {
        self.tree.as_ref().map_or(0, |t| t.num_nodes())
    }

    fn score(&self, stats: &Stats) -> f64 {
        match self.ctx.config.selection {
            Selection::RootInterval => stats.intervals.max_value().unwrap_or(stats.value),
            Selection::Avg | Selection::Max => stats.value,
        }
    }

    /// UCT choice among the children of `node`, unvisited children first.
    fn select(&self, tree: &Tree, node: SNodeId, rng: &mut SmallRng) -> Option<ANodeId> {
        let n = tree.state(node);
        let unvisited = n
            .children
            .iter()
            .copied()
            .filter(|&a| tree.action(a).stats.visits == 0)
            .collect_vec();
        if !unvisited.is_empty() {
            return Some(unvisited[rng.random_range(0..unvisited.len())]);
        }
        let ln_n = (n.stats.visits.max(1) as f64).ln();
        let uct = |a: ANodeId| {
            let stats = &tree.action(a).stats;
            self.score(stats) + self.ctx.config.exploration * (ln_n / stats.visits as f64).sqrt()
        };
        n.children.iter().copied().max_by(|&a, &b| uct(a).total_cmp(&uct(b)))
    }

    /// Creates the node of `state`, with one child per legal action whose schedule is consistent,
    /// and returns it together with its estimated value.
    fn expand(
        &self,
        tree: &mut Tree,
        state: State,
        depth: u32,
        schedule: Option<&PlanStn>,
        rng: &mut SmallRng,
    ) -> Result<(SNodeId, f64), StepError> {
        let problem = self.ctx.mdp.problem();
        let mut children = Vec::new();
        for action in self.ctx.mdp.legal_actions(&state) {
            let (schedule, timepoint) = match schedule {
                Some(schedule) => {
                    let mut schedule = schedule.clone();
                    let Ok(tp) = schedule.add(problem, action) else {
                        continue;
                    };
                    if !schedule.is_consistent() {
                        trace!("{} leads to an inconsistent schedule", problem.action(action).name());
                        continue;
                    }
                    (Some(schedule), Some(tp))
                }
                None => (None, None),
            };
            children.push(tree.push_action(ActionNode {
                action,
                schedule,
                timepoint,
                children: Default::default(),
                stats: Stats::default(),
            }));
        }
        let dead_end = children.is_empty();
        let id = tree.push_state(StateNode {
            state,
            depth,
            children,
            stats: Stats::default(),
        });

        let value = if dead_end {
            self.ctx.config.rewards.dead_end
        } else if self.ctx.config.selection == Selection::Max {
            self.evaluate_children(tree, id, rng)?
        } else {
            let node = tree.state(id);
            let now = self.ctx.now(&node.state, schedule);
            let depth_left = self.ctx.config.search_depth.saturating_sub(tree.relative_depth(id));
            self.ctx.leaf_value(&node.state, now, depth_left, rng)?
        };
        tree.state_mut(id).stats.record(value, None);
        Ok((id, value))
    }

    /// Evaluates a random subset of the children of a new node, and returns the best of them.
    fn evaluate_children(&self, tree: &mut Tree, node: SNodeId, rng: &mut SmallRng) -> Result<f64, StepError> {
        let children = tree.state(node).children.clone();
        let k = self.ctx.config.max_children.clamp(1, children.len());
        let depth_left = self
            .ctx
            .config
            .search_depth
            .saturating_sub(tree.relative_depth(node) + 1);
        let mut best = f64::NEG_INFINITY;
        for i in rand::seq::index::sample(rng, children.len(), k) {
            let child = children[i];
            let action = tree.action(child);
            let transition = self.ctx.mdp.step(&tree.state(node).state, action.action, rng)?;
            let mut value = transition.reward;
            if !transition.terminal {
                let now = self.ctx.now(&transition.state, action.schedule.as_ref());
                value += self.ctx.config.discount * self.ctx.leaf_value(&transition.state, now, depth_left, rng)?;
            }
            tree.action_mut(child).stats.record(value, None);
            best = best.max(value);
        }
        Ok(best)
    }

    /// One iteration from `node`: selection, expansion of the first new state, and backup.
    /// `root_tp` is the timepoint of the action chosen at the root in this iteration.
    ///
    /// Returns the value to back up, together with the legal window of `root_tp` in the deepest
    /// schedule reached by the iteration (root interval selection only).
    fn simulate(
        &self,
        tree: &mut Tree,
        node: SNodeId,
        root_tp: Option<Timepoint>,
        rng: &mut SmallRng,
    ) -> Result<(f64, Option<(i64, i64)>), StepError> {
        if tree.relative_depth(node) >= self.ctx.config.search_depth {
            return Ok((self.score(&tree.state(node).stats), None));
        }
        let Some(a) = self.select(tree, node, rng) else {
            return Ok((self.ctx.config.rewards.dead_end, None));
        };
        let root_tp = root_tp.or(tree.action(a).timepoint);
        let transition = self
            .ctx
            .mdp
            .step(&tree.state(node).state, tree.action(a).action, rng)?;

        let mut ret = transition.reward;
        let mut window = None;
        if !transition.terminal {
            let future = match tree.action(a).children.get(&transition.state).copied() {
                Some(child) => {
                    let (value, w) = self.simulate(tree, child, root_tp, rng)?;
                    window = w;
                    value
                }
                None => {
                    let schedule = tree.action(a).schedule.clone();
                    let depth = tree.state(node).depth + 1;
                    let (child, value) = self.expand(tree, transition.state.clone(), depth, schedule.as_ref(), rng)?;
                    tree.action_mut(a).children.insert(transition.state, child);
                    value
                }
            };
            ret += self.ctx.config.discount * future;
        }

        if self.ctx.config.selection == Selection::RootInterval && window.is_none() {
            window = match (root_tp, &tree.action(a).schedule) {
                (Some(tp), Some(schedule)) => schedule.legal_interval(tp),
                _ => None,
            };
        }
        tree.action_mut(a).stats.record(ret, window);

        match self.ctx.config.selection {
            Selection::Max => {
                let best = tree
                    .state(node)
                    .children
                    .iter()
                    .map(|&c| &tree.action(c).stats)
                    .filter(|s| s.visits > 0)
                    .map(|s| s.value)
                    .fold(f64::NEG_INFINITY, f64::max);
                let stats = &mut tree.state_mut(node).stats;
                stats.visits += 1;
                stats.value = best;
                Ok((best, window))
            }
            Selection::Avg | Selection::RootInterval => {
                tree.state_mut(node).stats.record(ret, window);
                Ok((ret, window))
            }
        }
    }

    /// Visited child of the root with the best value, the most visited in case of ties.
    fn decision(&self, tree: &Tree) -> Option<Decision> {
        let root = tree.state(tree.root);
        let problem = self.ctx.mdp.problem();
        for &c in &root.children {
            let child = tree.action(c);
            debug!(
                "{:<30} visits: {:>6}  value: {:.4}",
                problem.action(child.action).name(),
                child.stats.visits,
                self.score(&child.stats)
            );
        }
        let best = root
            .children
            .iter()
            .map(|&c| tree.action(c))
            .filter(|c| c.stats.visits > 0)
            .max_by(|a, b| {
                self.score(&a.stats)
                    .total_cmp(&self.score(&b.stats))
                    .then(a.stats.visits.cmp(&b.stats.visits))
            })?;
        let window = match self.ctx.config.selection {
            Selection::RootInterval => best.stats.intervals.best().map(|s| (s.lo, s.hi)),
            _ => None,
        };
        Some(Decision {
            action: best.action,
            window,
        })
    }
}

impl Search for Mcts<'_> {
    fn search(
        &mut self,
        state: &State,
        schedule: Option<&PlanStn>,
        rng: &mut SmallRng,
    ) -> Result<Option<Decision>, StepError> {
        let mut tree = match self.tree.take() {
            Some(mut tree) if self.ctx.config.reuse_tree && tree.state(tree.root).state == *state => {
                if let Some(schedule) = schedule {
                    tree.reschedule(self.ctx.mdp.problem(), schedule);
                }
                tree
            }
            _ => {
                let mut tree = Tree::new();
                let (root, _) = self.expand(&mut tree, state.clone(), 0, schedule, rng)?;
                tree.root = root;
                tree
            }
        };
        let root = tree.root;
        if tree.state(root).children.is_empty() {
            debug!("No legal action");
            return Ok(None);
        }

        let budget = Budget::start(&self.ctx.config);
        let mut iterations = 0;
        loop {
            self.simulate(&mut tree, root, None, rng)?;
            iterations += 1;
            if budget.is_exhausted(iterations) {
                break;
            }
        }
        debug!(
            "{iterations} iterations, {} nodes, root value: {:.4}",
            tree.num_nodes(),
            self.score(&tree.state(root).stats)
        );
        let decision = self.decision(&tree);
        self.tree = Some(tree);
        Ok(decision)
    }

    fn advance(&mut self, action: ActionId, state: &State) {
        let keep = self.ctx.config.reuse_tree && self.tree.as_mut().is_some_and(|t| t.reroot(action, state));
        if !keep {
            self.tree = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LeafEvaluation, Mdp, PlannerConfig, Rewards, Trpg};
    use rand::SeedableRng;
    use tempo_model::compile::{ConvertedProblem, decompose};
    use tempo_model::*;

    /// `good` achieves the goal, `trap` makes it unreachable.
    fn trap() -> ConvertedProblem {
        let mut world = World::new();
        let g = world.intern(&["g"]);
        let dead = world.intern(&["dead"]);
        let mut pb = Problem::new("trap", world);
        pb.add_action(InstantaneousAction::new("trap").condition(dead, false).effect(dead, true))
            .unwrap();
        pb.add_action(InstantaneousAction::new("good").condition(dead, false).effect(g, true))
            .unwrap();
        pb.goals.insert(g);
        decompose(&pb)
    }

    fn config(selection: Selection, iterations: u64) -> PlannerConfig {
        PlannerConfig {
            selection,
            max_iterations: Some(iterations),
            search_time: std::time::Duration::from_secs(60),
            ..Default::default()
        }
    }

    fn search(pb: &ConvertedProblem, config: PlannerConfig, seed: u64) -> Option<Decision> {
        let ctx = Context::new(Mdp::new(pb, Rewards::default()), Trpg::new(pb), config);
        let mut mcts = Mcts::new(ctx);
        let mut rng = SmallRng::seed_from_u64(seed);
        let schedule = PlanStn::new(pb.deadline);
        mcts.search(&pb.init, Some(&schedule), &mut rng).unwrap()
    }

    #[test]
    fn avoids_dead_ends() {
        let pb = trap();
        let good = pb.find("good").unwrap();
        for selection in [Selection::Avg, Selection::Max, Selection::RootInterval] {
            for seed in 0..5 {
                let decision = search(&pb, config(selection, 50), seed).unwrap();
                assert_eq!(decision.action, good, "{selection}");
            }
        }
    }

    #[test]
    fn rollouts_reach_dead_ends() {
        let pb = trap();
        let rewards = Rewards::default();
        let config = PlannerConfig {
            leaf: LeafEvaluation::Rollout,
            ..config(Selection::Avg, 50)
        };
        let ctx = Context::new(Mdp::new(&pb, rewards), Trpg::new(&pb), config.clone());
        let mut rng = SmallRng::seed_from_u64(0);
        let trapped = after(&pb, pb.find("trap").unwrap());
        assert_eq!(ctx.leaf_value(&trapped, 0, 10, &mut rng).unwrap(), rewards.dead_end);
        for _ in 0..20 {
            let v = ctx.leaf_value(&pb.init, 0, 10, &mut rng).unwrap();
            assert!(v == rewards.goal || v == config.discount * rewards.dead_end, "{v}");
        }
        // no step left
        assert_eq!(ctx.leaf_value(&pb.init, 0, 0, &mut rng).unwrap(), 0.0);

        let good = pb.find("good").unwrap();
        for seed in 0..5 {
            assert_eq!(search(&pb, config.clone(), seed).unwrap().action, good);
        }
    }

    #[test]
    fn single_action_with_minimal_budget() {
        let mut world = World::new();
        let g = world.intern(&["g"]);
        let mut pb = Problem::new("single", world);
        pb.add_action(DurativeAction::new("a", Duration::fixed(4)).effect(g, true))
            .unwrap();
        pb.goals.insert(g);
        pb.deadline = Some(10);
        let pb = decompose(&pb);
        let decision = search(&pb, config(Selection::Avg, 1), 0).unwrap();
        assert_eq!(decision.action, pb.find("start_a").unwrap());
    }

    #[test]
    fn inconsistent_actions_are_not_proposed() {
        let mut world = World::new();
        let g = world.intern(&["g"]);
        let mut pb = Problem::new("too-long", world);
        pb.add_action(DurativeAction::new("a", Duration::fixed(20)).effect(g, true))
            .unwrap();
        pb.goals.insert(g);
        pb.deadline = Some(10);
        let pb = decompose(&pb);
        // the start is consistent, but no end can follow it: the only child is a dead end
        let decision = search(&pb, config(Selection::Avg, 20), 0).unwrap();
        assert_eq!(decision.action, pb.find("start_a").unwrap());

        let mut schedule = PlanStn::new(pb.deadline);
        schedule.add(&pb, decision.action).unwrap();
        let ctx = Context::new(Mdp::new(&pb, Rewards::default()), Trpg::new(&pb), config(Selection::Avg, 20));
        let mut mcts = Mcts::new(ctx);
        let mut rng = SmallRng::seed_from_u64(0);
        let state = after(&pb, decision.action);
        assert_eq!(mcts.search(&state, Some(&schedule), &mut rng).unwrap(), None);
    }

    fn after(pb: &ConvertedProblem, action: ActionId) -> State {
        let mdp = Mdp::new(pb, Rewards::default());
        let mut rng = SmallRng::seed_from_u64(0);
        mdp.step(&pb.init, action, &mut rng).unwrap().state
    }

    #[test]
    fn root_interval_window() {
        let mut world = World::new();
        let g = world.intern(&["g"]);
        let mut pb = Problem::new("window", world);
        pb.add_action(DurativeAction::new("a", Duration::fixed(4)).effect(g, true))
            .unwrap();
        pb.goals.insert(g);
        pb.deadline = Some(10);
        let pb = decompose(&pb);
        let decision = search(&pb, config(Selection::RootInterval, 30), 1).unwrap();
        let (lo, hi) = decision.window.unwrap();
        assert!(0 <= lo && lo <= hi && hi <= 6, "{lo} {hi}");
    }

    #[test]
    fn tree_reuse() {
        let pb = trap();
        let mut config = config(Selection::Avg, 30);
        config.reuse_tree = true;
        let mdp = Mdp::new(&pb, Rewards::default());
        let ctx = Context::new(mdp.clone(), Trpg::new(&pb), config);
        let mut mcts = Mcts::new(ctx);
        let mut rng = SmallRng::seed_from_u64(3);
        let decision = mcts.search(&pb.init, None, &mut rng).unwrap().unwrap();
        assert!(mcts.num_nodes() > 1);
        // unknown outcome: the tree is dropped
        mcts.advance(decision.action, &State::new(pb.init.num_atoms() + 1));
        assert_eq!(mcts.num_nodes(), 0);

        let trap = pb.find("trap").unwrap();
        mcts.search(&pb.init, None, &mut rng).unwrap();
        let next = mdp.step(&pb.init, trap, &mut rng).unwrap().state;
        let before = mcts.num_nodes();
        mcts.advance(trap, &next);
        assert_eq!(mcts.num_nodes(), before);
        // the new root is a dead end
        assert_eq!(mcts.search(&next, None, &mut rng).unwrap(), None);
    }

    /// `c` and then `a` start at time 0, and `a` can never end: ending `c` at 8 would place it
    /// after the end of `a`, due at 5.
    #[test]
    fn reused_tree_follows_fixed_times() {
        let mut world = World::new();
        let gc = world.intern(&["got", "c"]);
        let ga = world.intern(&["got", "a"]);
        let never = world.intern(&["never"]);
        let mut pb = Problem::new("blocked", world);
        pb.add_action(DurativeAction::new("c", Duration::fixed(8)).effect(gc, true))
            .unwrap();
        pb.add_action(
            DurativeAction::new("a", Duration::fixed(5))
                .condition(Timing::End, never, true)
                .effect(ga, true),
        )
        .unwrap();
        pb.goals.insert(gc);
        pb.deadline = Some(20);
        let pb = decompose(&pb);

        let mut config = config(Selection::Avg, 200);
        config.reuse_tree = true;
        let mdp = Mdp::new(&pb, Rewards::default());
        let mut mcts = Mcts::new(Context::new(mdp.clone(), Trpg::new(&pb), config));
        let mut rng = SmallRng::seed_from_u64(0);
        let mut state = pb.init.clone();
        let mut schedule = PlanStn::new(pb.deadline);
        for name in ["start_c", "start_a"] {
            mcts.search(&state, Some(&schedule), &mut rng).unwrap();
            let action = pb.find(name).unwrap();
            let tp = schedule.add(&pb, action).unwrap();
            let earliest = schedule.earliest(tp).unwrap();
            schedule.fix(tp, earliest);
            state = mdp.step(&state, action, &mut rng).unwrap().state;
            mcts.advance(action, &state);
            assert!(mcts.num_nodes() > 0, "tree dropped after {name}");
        }
        assert!(schedule.is_consistent());
        // the subtree was built while `start_a` could still be delayed until 3
        assert_eq!(mcts.search(&state, Some(&schedule), &mut rng).unwrap(), None);
    }
}
