use crate::Time;
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;

/// Identifier of a timepoint in an [Stn]. The origin is always `VId(0)`.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct VId(u32);

impl From<VId> for usize {
    fn from(v: VId) -> Self {
        v.0 as usize
    }
}

impl From<usize> for VId {
    fn from(i: usize) -> Self {
        VId(i as u32)
    }
}

type EdgeId = u32;

/// Edge of the distance graph: `time(target) - time(source) <= weight`
#[derive(Copy, Clone, Debug)]
struct Constraint<W> {
    source: VId,
    target: VId,
    weight: W,
}

/// Shortest distances from and to the origin.
///  - `forward` is the length of the shortest path `origin -> node`, i.e. the latest time of the node.
///  - `backward` is the length of the shortest path `node -> origin`, i.e. the opposite of its earliest time.
#[derive(Copy, Clone, Debug)]
struct Distance<W> {
    forward: W,
    backward: W,
}

#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Debug)]
pub enum NetworkStatus {
    Consistent,
    Inconsistent,
}

/// Incremental STN over timepoints labelled with `N`.
///
/// Every timepoint is constrained to occur at or after the origin, so that its distance to the
/// origin is always finite. Upper bounds are optional: a timepoint with no path from the origin has
/// a latest time of `W::infty()`.
///
/// Constraints are only ever tightened. Each tightening is propagated immediately (à la Cesta & Oddi),
/// starting from the modified edge, so queries never need a full recomputation. A negative cycle can
/// only go through the edge just tightened, which is detected when the propagation loops back to it.
/// Once inconsistent, a network stays inconsistent: later constraints are recorded but not propagated.
///
/// Cloning gives an independent deep copy, which is how hypothetical branches are explored.
#[derive(Clone)]
pub struct Stn<N, W> {
    labels: Vec<N>,
    ids: HashMap<N, VId>,
    constraints: Vec<Constraint<W>>,
    /// Tightest edge between two timepoints, if any.
    index: HashMap<(VId, VId), EdgeId>,
    forward_edges: Vec<Vec<EdgeId>>,
    backward_edges: Vec<Vec<EdgeId>>,
    distances: Vec<Distance<W>>,
    status: NetworkStatus,
}

impl<N: Clone + Eq + Hash + Debug, W: Time> Stn<N, W> {
    /// Creates a network whose only timepoint is the origin, labelled with `origin`.
    pub fn new(origin: N) -> Self {
        let mut stn = Stn {
            labels: Vec::new(),
            ids: HashMap::new(),
            constraints: Vec::new(),
            index: HashMap::new(),
            forward_edges: Vec::new(),
            backward_edges: Vec::new(),
            distances: Vec::new(),
            status: NetworkStatus::Consistent,
        };
        let id = stn.add_node(origin);
        debug_assert_eq!(id, stn.origin());
        stn.distances[0].forward = W::zero();
        stn
    }

    pub fn origin(&self) -> VId {
        VId(0)
    }

    pub fn num_nodes(&self) -> usize {
        self.labels.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Returns the timepoint labelled with `label`, creating it in `[0, +inf)` if it does not exist yet.
    pub fn add_node(&mut self, label: N) -> VId {
        if let Some(&id) = self.ids.get(&label) {
            return id;
        }
        let id = VId::from(self.labels.len());
        self.labels.push(label.clone());
        self.ids.insert(label, id);
        self.forward_edges.push(Vec::new());
        self.backward_edges.push(Vec::new());
        self.distances.push(Distance {
            forward: W::infty(),
            backward: W::zero(),
        });
        id
    }

    pub fn node(&self, label: &N) -> Option<VId> {
        self.ids.get(label).copied()
    }

    pub fn contains(&self, label: &N) -> bool {
        self.ids.contains_key(label)
    }

    pub fn label(&self, node: VId) -> &N {
        &self.labels[usize::from(node)]
    }

    pub fn labels(&self) -> impl Iterator<Item = &N> + '_ {
        self.labels.iter()
    }

    pub fn status(&self) -> NetworkStatus {
        self.status
    }

    pub fn is_consistent(&self) -> bool {
        self.status == NetworkStatus::Consistent
    }

    /// Constrains `time(a) - time(b)` to lie in `[lower, upper]`, where a missing bound is unconstrained.
    /// Both timepoints are created if needed. Returns the status of the network afterwards.
    pub fn insert(&mut self, a: &N, b: &N, lower: Option<W>, upper: Option<W>) -> NetworkStatus {
        let a = self.add_node(a.clone());
        let b = self.add_node(b.clone());
        if let Some(ub) = upper {
            self.add_edge(b, a, ub);
        }
        if let Some(lb) = lower {
            self.add_edge(a, b, -lb);
        }
        self.status
    }

    /// Adds the constraint `time(target) - time(source) <= weight`.
    /// Has no effect if an edge at least as tight is already present.
    pub fn add_edge(&mut self, source: VId, target: VId, weight: W) -> NetworkStatus {
        if !weight.is_finite() {
            return self.status;
        }
        let edge = match self.index.get(&(source, target)) {
            Some(&e) if self.constraints[e as usize].weight <= weight => return self.status,
            Some(&e) => {
                self.constraints[e as usize].weight = weight;
                e
            }
            None => {
                let e = self.constraints.len() as EdgeId;
                self.constraints.push(Constraint { source, target, weight });
                self.index.insert((source, target), e);
                self.forward_edges[usize::from(source)].push(e);
                self.backward_edges[usize::from(target)].push(e);
                e
            }
        };
        if self.status == NetworkStatus::Consistent {
            self.status = self.propagate(edge);
        }
        self.status
    }

    /// Pins the timepoint to `time` (relative to the origin).
    pub fn fix(&mut self, label: &N, time: W) -> NetworkStatus {
        let origin = self.label(self.origin()).clone();
        self.insert(label, &origin, Some(time), Some(time))
    }

    /// Earliest time of the timepoint, i.e. the opposite of its shortest distance to the origin.
    pub fn earliest(&self, label: &N) -> Option<W> {
        self.node(label).map(|n| -self.bdist(n))
    }

    /// Latest time of the timepoint, i.e. its shortest distance from the origin.
    /// `W::infty()` if the timepoint has no upper bound.
    pub fn latest(&self, label: &N) -> Option<W> {
        self.node(label).map(|n| self.fdist(n))
    }

    /// Tightest window `(earliest, latest)` currently derivable for the timepoint.
    pub fn legal_interval(&self, label: &N) -> Option<(W, W)> {
        self.node(label).map(|n| (-self.bdist(n), self.fdist(n)))
    }

    fn fdist(&self, n: VId) -> W {
        self.distances[usize::from(n)].forward
    }

    fn bdist(&self, n: VId) -> W {
        self.distances[usize::from(n)].backward
    }

    fn propagate(&mut self, edge: EdgeId) -> NetworkStatus {
        let c = self.constraints[edge as usize];
        if c.source == c.target {
            return if c.weight < W::zero() {
                NetworkStatus::Inconsistent
            } else {
                NetworkStatus::Consistent
            };
        }
        if self.propagate_backward(c) == NetworkStatus::Inconsistent {
            return NetworkStatus::Inconsistent;
        }
        self.propagate_forward(c)
    }

    /// Updates distances to the origin after `c` was tightened.
    /// Distances to the origin are always finite, so any negative cycle through `c` is caught here.
    fn propagate_backward(&mut self, c: Constraint<W>) -> NetworkStatus {
        let candidate = self.bdist(c.target) + c.weight;
        if candidate >= self.bdist(c.source) {
            return NetworkStatus::Consistent;
        }
        if c.source == self.origin() {
            return NetworkStatus::Inconsistent;
        }
        self.distances[usize::from(c.source)].backward = candidate;
        let mut queue = VecDeque::new();
        queue.push_back(c.source);
        while let Some(u) = queue.pop_front() {
            let du = self.bdist(u);
            for i in 0..self.backward_edges[usize::from(u)].len() {
                let e = self.constraints[self.backward_edges[usize::from(u)][i] as usize];
                let candidate = du + e.weight;
                if candidate < self.bdist(e.source) {
                    if e.source == c.target || e.source == self.origin() {
                        return NetworkStatus::Inconsistent;
                    }
                    self.distances[usize::from(e.source)].backward = candidate;
                    if !queue.contains(&e.source) {
                        queue.push_back(e.source);
                    }
                }
            }
        }
        NetworkStatus::Consistent
    }

    /// Updates distances from the origin after `c` was tightened.
    fn propagate_forward(&mut self, c: Constraint<W>) -> NetworkStatus {
        let from = self.fdist(c.source);
        if !from.is_finite() {
            return NetworkStatus::Consistent;
        }
        let candidate = from + c.weight;
        if candidate >= self.fdist(c.target) {
            return NetworkStatus::Consistent;
        }
        let mut queue = VecDeque::new();
        self.distances[usize::from(c.target)].forward = candidate;
        queue.push_back(c.target);
        while let Some(u) = queue.pop_front() {
            let du = self.fdist(u);
            if du + self.bdist(u) < W::zero() {
                return NetworkStatus::Inconsistent;
            }
            for i in 0..self.forward_edges[usize::from(u)].len() {
                let e = self.constraints[self.forward_edges[usize::from(u)][i] as usize];
                let candidate = du + e.weight;
                if candidate < self.fdist(e.target) {
                    if e.target == c.source || e.target == self.origin() {
                        return NetworkStatus::Inconsistent;
                    }
                    self.distances[usize::from(e.target)].forward = candidate;
                    if !queue.contains(&e.target) {
                        queue.push_back(e.target);
                    }
                }
            }
        }
        NetworkStatus::Consistent
    }
}
