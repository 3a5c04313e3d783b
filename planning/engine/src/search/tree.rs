use crate::search::IntervalValues;
use crate::{PlanStn, Timepoint};
use hashbrown::HashMap;
use tempo_model::compile::ConvertedProblem;
use tempo_model::{ActionId, State};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SNodeId(u32);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ANodeId(u32);

/// Returns observed through a node.
#[derive(Clone, Default, Debug)]
pub struct Stats {
    pub visits: u32,
    /// Running mean of the returns, or best child value for state nodes in max mode.
    pub value: f64,
    /// Returns, by start time of the action chosen at the root.
    pub intervals: IntervalValues,
}

impl Stats {
    pub fn record(&mut self, ret: f64, window: Option<(i64, i64)>) {
        self.visits += 1;
        self.value += (ret - self.value) / self.visits as f64;
        if let Some((lo, hi)) = window {
            self.intervals.update(ret, lo, hi);
        }
    }
}

pub struct StateNode {
    pub state: State,
    /// Number of actions executed since the first decision.
    pub depth: u32,
    /// One child per legal action whose schedule is consistent.
    pub children: Vec<ANodeId>,
    pub stats: Stats,
}

pub struct ActionNode {
    pub action: ActionId,
    /// Schedule once the action is appended (regular mode).
    pub schedule: Option<PlanStn>,
    /// Timepoint of the action in `schedule`.
    pub timepoint: Option<Timepoint>,
    /// Resulting states seen so far.
    pub children: HashMap<State, SNodeId>,
    pub stats: Stats,
}

/// Arena of alternating state and action nodes.
pub struct Tree {
    snodes: Vec<StateNode>,
    anodes: Vec<ActionNode>,
    pub root: SNodeId,
}

impl Tree {
    pub fn new() -> Self {
        Tree {
            snodes: Vec::new(),
            anodes: Vec::new(),
            root: SNodeId(0),
        }
    }

    pub fn push_state(&mut self, node: StateNode) -> SNodeId {
        self.snodes.push(node);
        SNodeId(self.snodes.len() as u32 - 1)
    }

    pub fn push_action(&mut self, node: ActionNode) -> ANodeId {
        self.anodes.push(node);
        ANodeId(self.anodes.len() as u32 - 1)
    }

    pub fn state(&self, id: SNodeId) -> &StateNode {
        &self.snodes[id.0 as usize]
    }

    pub fn state_mut(&mut self, id: SNodeId) -> &mut StateNode {
        &mut self.snodes[id.0 as usize]
    }

    pub fn action(&self, id: ANodeId) -> &ActionNode {
        &self.anodes[id.0 as usize]
    }

    pub fn action_mut(&mut self, id: ANodeId) -> &mut ActionNode {
        &mut self.anodes[id.0 as usize]
    }

    pub fn num_nodes(&self) -> usize {
        self.snodes.len() + self.anodes.len()
    }

    /// Depth of a node below the current root.
    pub fn relative_depth(&self, id: SNodeId) -> u32 {
        self.state(id).depth.saturating_sub(self.state(self.root).depth)
    }

    /// Makes the child of the root reached by `action` and resulting in `state` the new root.
    /// Returns false if the tree holds no such node.
    pub fn reroot(&mut self, action: ActionId, state: &State) -> bool {
        let child = self
            .state(self.root)
            .children
            .iter()
            .find(|&&a| self.action(a).action == action)
            .and_then(|&a| self.action(a).children.get(state).copied());
        match child {
            Some(child) => {
                self.root = child;
                true
            }
            None => false,
        }
    }

    /// Rebuilds the schedules of the nodes below the root by appending their actions to
    /// `schedule`, and detaches the actions that would make it inconsistent.
    ///
    /// Schedules computed before the last decision ignore the times fixed since then, and may
    /// accept actions that the actual schedule rejects. Windows observed with the previous
    /// root action are cleared.
    pub fn reschedule(&mut self, problem: &ConvertedProblem, schedule: &PlanStn) {
        let mut stack = vec![(self.root, schedule.clone())];
        while let Some((node, schedule)) = stack.pop() {
            let children = std::mem::take(&mut self.state_mut(node).children);
            let mut kept = Vec::with_capacity(children.len());
            for a in children {
                let mut next = schedule.clone();
                let Ok(tp) = next.add(problem, self.action(a).action) else {
                    continue;
                };
                if !next.is_consistent() {
                    continue;
                }
                stack.extend(self.action(a).children.values().map(|&s| (s, next.clone())));
                let anode = self.action_mut(a);
                anode.stats.intervals = Default::default();
                anode.schedule = Some(next);
                anode.timepoint = Some(tp);
                kept.push(a);
            }
            let snode = self.state_mut(node);
            snode.stats.intervals = Default::default();
            snode.children = kept;
        }
    }
}
