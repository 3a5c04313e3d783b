use crate::{ActionId, Atom, AtomSet, Lit, World};
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// Actions currently executing, each with the time left before it ends.
///
/// Entries are kept sorted by remaining duration (then by action), so that two queues holding the
/// same entries compare and hash equal.
#[derive(Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct ActionQueue {
    entries: Vec<(i64, ActionId)>,
}

impl ActionQueue {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn push(&mut self, action: ActionId, remaining: i64) {
        let entry = (remaining, action);
        let i = self.entries.partition_point(|e| *e < entry);
        self.entries.insert(i, entry);
    }

    /// Removes the actions that finish first. Returns their remaining duration together with all of
    /// them, or `None` if nothing is executing.
    pub fn pop_next(&mut self) -> Option<(i64, Vec<ActionId>)> {
        let &(min, _) = self.entries.first()?;
        let n = self.entries.iter().take_while(|(d, _)| *d == min).count();
        let actions = self.entries.drain(..n).map(|(_, a)| a).collect();
        Some((min, actions))
    }

    /// Time elapsed: decreases the remaining duration of every entry by `delta`.
    pub fn advance(&mut self, delta: i64) {
        for (remaining, _) in &mut self.entries {
            *remaining -= delta;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, ActionId)> + '_ {
        self.entries.iter().copied()
    }
}

/// State: the set of atoms that are true, together with the actions in execution and the current
/// time. The two latter only evolve in combination mode, where time is carried by the state.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct State {
    /// The i^th bit gives the value of the atom whose index is i.
    atoms: FixedBitSet,
    queue: ActionQueue,
    time: i64,
}

impl State {
    /// A state where all `num_atoms` atoms are false.
    pub fn new(num_atoms: usize) -> Self {
        State {
            atoms: FixedBitSet::with_capacity(num_atoms),
            queue: ActionQueue::default(),
            time: 0,
        }
    }

    pub fn with_atoms(num_atoms: usize, atoms: impl IntoIterator<Item = Atom>) -> Self {
        let mut state = State::new(num_atoms);
        for a in atoms {
            state.add(a);
        }
        state
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_set(&self, atom: Atom) -> bool {
        self.atoms.contains(atom.into())
    }

    pub fn set_to(&mut self, atom: Atom, value: bool) {
        self.atoms.set(atom.into(), value)
    }

    pub fn add(&mut self, atom: Atom) {
        self.set_to(atom, true);
    }

    pub fn del(&mut self, atom: Atom) {
        self.set_to(atom, false);
    }

    pub fn holds(&self, lit: Lit) -> bool {
        self.is_set(lit.atom) == lit.value
    }

    pub fn entails_all(&self, atoms: &AtomSet) -> bool {
        atoms.iter().all(|a| self.is_set(a))
    }

    pub fn entails_none(&self, atoms: &AtomSet) -> bool {
        atoms.iter().all(|a| !self.is_set(a))
    }

    /// Iterator over all atoms that are true in the state.
    pub fn atoms(&self) -> impl Iterator<Item = Atom> + '_ {
        self.atoms.ones().map(Atom::from)
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn set_time(&mut self, time: i64) {
        self.time = time;
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut ActionQueue {
        &mut self.queue
    }

    pub fn displayable<'a>(&'a self, world: &'a World) -> DispState<'a> {
        DispState(self, world)
    }
}

pub struct DispState<'a>(&'a State, &'a World);

impl Display for DispState<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.atoms().map(|a| self.1.display(a)).format(", "))?;
        if !self.0.queue.is_empty() {
            write!(
                f,
                " executing: {}",
                self.0.queue.iter().map(|(d, a)| format!("{a}:{d}")).format(" ")
            )?;
        }
        if self.0.time != 0 {
            write!(f, " @{}", self.0.time)?;
        }
        Ok(())
    }
}
