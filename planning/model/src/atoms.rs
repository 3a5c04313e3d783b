use compact_str::CompactString;
use core::num::NonZeroU32;
use hashbrown::HashMap;
use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};

/// Compact, numeric representation of a ground atom.
///
/// An atom is an s-expression of symbols such as `(at x0 m1)` where `at` is a fluent
/// and `x0` and `m1` are its two arguments. Atoms are interned in a [World].
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct Atom(NonZeroU32);

impl From<Atom> for usize {
    fn from(atom: Atom) -> Self {
        (atom.0.get() - 1) as usize
    }
}

impl From<usize> for Atom {
    fn from(i: usize) -> Self {
        let raw = u32::try_from(i + 1).ok().and_then(NonZeroU32::new);
        Atom(raw.expect("Atom index out of the u32 range"))
    }
}

/// Literal: association of an atom to a boolean value.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct Lit {
    pub atom: Atom,
    pub value: bool,
}

impl Lit {
    pub fn new(atom: Atom, value: bool) -> Self {
        Lit { atom, value }
    }
    pub fn pos(atom: Atom) -> Self {
        Lit::new(atom, true)
    }
    pub fn neg(atom: Atom) -> Self {
        Lit::new(atom, false)
    }
}

impl std::ops::Not for Lit {
    type Output = Lit;
    fn not(self) -> Self::Output {
        Lit::new(self.atom, !self.value)
    }
}

/// A small set of atoms, kept sorted so that equal sets have equal representations.
#[derive(Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct AtomSet(SmallVec<[Atom; 4]>);

impl AtomSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, atom: Atom) -> bool {
        self.0.binary_search(&atom).is_ok()
    }

    /// Adds the atom, returning false if it was already present.
    pub fn insert(&mut self, atom: Atom) -> bool {
        match self.0.binary_search(&atom) {
            Ok(_) => false,
            Err(i) => {
                self.0.insert(i, atom);
                true
            }
        }
    }

    pub fn remove(&mut self, atom: Atom) -> bool {
        match self.0.binary_search(&atom) {
            Ok(i) => {
                self.0.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Atom> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &AtomSet) -> AtomSet {
        let mut result = self.clone();
        result.extend(other.iter());
        result
    }

    pub fn difference(&self, other: &AtomSet) -> AtomSet {
        self.iter().filter(|a| !other.contains(*a)).collect()
    }

    pub fn intersects(&self, other: &AtomSet) -> bool {
        self.iter().any(|a| other.contains(a))
    }

    pub fn is_subset(&self, other: &AtomSet) -> bool {
        self.iter().all(|a| other.contains(a))
    }

    /// Some atom present in both sets.
    pub fn common(&self, other: &AtomSet) -> Option<Atom> {
        self.iter().find(|a| other.contains(*a))
    }
}

impl Extend<Atom> for AtomSet {
    fn extend<T: IntoIterator<Item = Atom>>(&mut self, iter: T) {
        for atom in iter {
            self.insert(atom);
        }
    }
}

impl FromIterator<Atom> for AtomSet {
    fn from_iter<T: IntoIterator<Item = Atom>>(iter: T) -> Self {
        let mut set = AtomSet::new();
        set.extend(iter);
        set
    }
}

/// Keeps track of all atoms that can appear in a state.
#[derive(Clone, Debug, Default)]
pub struct World {
    /// Symbols of each atom, indexed by the atom's id.
    expressions: Vec<Box<[CompactString]>>,
    ids: HashMap<Box<[CompactString]>, Atom>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of atoms known so far.
    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    /// Returns the atom for the given s-expression, creating it if needed.
    pub fn intern<S: AsRef<str>>(&mut self, sexpr: &[S]) -> Atom {
        let key: Box<[CompactString]> = sexpr.iter().map(|s| CompactString::from(s.as_ref())).collect();
        if let Some(&atom) = self.ids.get(&key) {
            return atom;
        }
        let atom = Atom::from(self.expressions.len());
        self.expressions.push(key.clone());
        self.ids.insert(key, atom);
        atom
    }

    /// Retrieves the atom of an s-expression. Returns None if no such atom is known.
    pub fn atom<S: AsRef<str>>(&self, sexpr: &[S]) -> Option<Atom> {
        let key: Box<[CompactString]> = sexpr.iter().map(|s| CompactString::from(s.as_ref())).collect();
        self.ids.get(&key).copied()
    }

    pub fn expression(&self, atom: Atom) -> &[CompactString] {
        &self.expressions[usize::from(atom)]
    }

    pub fn atoms(&self) -> impl Iterator<Item = Atom> + '_ {
        (0..self.expressions.len()).map(Atom::from)
    }

    pub fn display(&self, atom: Atom) -> DispAtom<'_> {
        DispAtom(atom, self)
    }

    pub fn display_lit(&self, lit: Lit) -> String {
        if lit.value {
            self.display(lit.atom).to_string()
        } else {
            format!("(not {})", self.display(lit.atom))
        }
    }
}

/// An atom together with its world, for display.
pub struct DispAtom<'a>(Atom, &'a World);

impl Display for DispAtom<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.1.expression(self.0).iter().format(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning() {
        let mut world = World::new();
        let a = world.intern(&["at", "x0", "m1"]);
        let b = world.intern(&["free", "m1"]);
        assert_ne!(a, b);
        assert_eq!(world.intern(&["at", "x0", "m1"]), a);
        assert_eq!(world.atom(&["free", "m1"]), Some(b));
        assert_eq!(world.atom(&["free", "m0"]), None);
        assert_eq!(world.len(), 2);
        assert_eq!(world.display(a).to_string(), "(at x0 m1)");
        assert_eq!(world.display_lit(Lit::neg(b)), "(not (free m1))");
    }

    #[test]
    fn atom_sets() {
        let atoms: Vec<Atom> = (0..5).map(Atom::from).collect();
        let s1: AtomSet = [atoms[3], atoms[1], atoms[3]].into_iter().collect();
        let s2: AtomSet = [atoms[1], atoms[3]].into_iter().collect();
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 2);
        let s3: AtomSet = [atoms[0], atoms[3], atoms[4]].into_iter().collect();
        assert!(s1.intersects(&s3));
        assert_eq!(s1.common(&s3), Some(atoms[3]));
        assert!(!s1.is_subset(&s3));
        assert!(s2.is_subset(&s1.union(&s3)));
        assert_eq!(s3.difference(&s1).iter().collect::<Vec<_>>(), vec![atoms[0], atoms[4]]);
    }

    #[test]
    fn atom_indices() {
        let last = u32::MAX as usize - 1;
        assert_eq!(usize::from(Atom::from(last)), last);
        assert_ne!(Atom::from(last), Atom::from(last - 1));
    }

    #[test]
    #[should_panic]
    fn atom_index_overflow() {
        let _ = Atom::from(u32::MAX as usize);
    }
}
