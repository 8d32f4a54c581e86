//! Canonical identifiers for molecular graphs, used as the final equality test between
//! two fragments.

use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::consts::ElementProperties;
use crate::error::IdentifierError;
use crate::molecule::{Molecule, Molecule3D};

/// Produces a string that is identical for isomorphic graphs and differs otherwise.
pub trait CanonicalIdentifier: Sync {
    fn identify(&self, molecule: &Molecule3D) -> Result<String, IdentifierError>;
}

struct Fnv1aHasher(u64);

impl Fnv1aHasher {
    fn new() -> Self {
        Self(0xcbf29ce484222325)
    }
}

impl Hasher for Fnv1aHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct AtomInvariant {
    atomic_number: u8,
    charge: i8,
    degree: usize,
    singles: u8,
    doubles: u8,
    triples: u8,
    aromatic_bonds: u8,
}

fn atom_invariant(molecule: &Molecule3D, atom: usize) -> AtomInvariant {
    let mut invariant = AtomInvariant {
        atomic_number: molecule.get_atomic_number(atom),
        charge: molecule.charge(atom),
        degree: molecule.degree(atom),
        singles: 0,
        doubles: 0,
        triples: 0,
        aromatic_bonds: 0,
    };
    for bond in molecule.get_atom_bonds(atom).unwrap_or_default() {
        match bond.bond_order().code() {
            1 => invariant.singles += 1,
            2 => invariant.doubles += 1,
            3 => invariant.triples += 1,
            _ => invariant.aromatic_bonds += 1,
        }
    }
    invariant
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = Fnv1aHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn ranks_from_values(values: &[u64]) -> Vec<usize> {
    let n = values.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by_key(|&i| values[i]);
    let mut ranks = vec![0usize; n];
    for i in 1..n {
        ranks[indices[i]] = if values[indices[i]] == values[indices[i - 1]] {
            ranks[indices[i - 1]]
        } else {
            i
        };
    }
    ranks
}

fn count_distinct(ranks: &[usize]) -> usize {
    let mut sorted = ranks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

/// Neighbor ranks paired with the connecting bond code, sorted.
fn neighborhood(molecule: &Molecule3D, ranks: &[usize], atom: usize) -> Vec<(usize, u8)> {
    let mut neighbors: Vec<(usize, u8)> = molecule
        .get_atom_bonds(atom)
        .unwrap_or_default()
        .iter()
        .map(|bond| (ranks[bond.target()], bond.bond_order().code()))
        .collect();
    neighbors.sort_unstable();
    neighbors
}

fn morgan_refine(molecule: &Molecule3D, ranks: &mut Vec<usize>) {
    let mut previous_distinct = count_distinct(ranks);
    loop {
        let values: Vec<u64> = (0..molecule.len())
            .map(|atom| hash_of(&(ranks[atom], neighborhood(molecule, ranks, atom))))
            .collect();
        let refined = ranks_from_values(&values);
        let distinct = count_distinct(&refined);
        if distinct <= previous_distinct {
            return;
        }
        *ranks = refined;
        previous_distinct = distinct;
    }
}

/// Promotes one atom of the lowest tied rank at a time, keeping the promotion whose refined
/// ranking yields the smallest invariant trace. The trace does not depend on atom numbering.
fn break_ties(molecule: &Molecule3D, ranks: &mut Vec<usize>, invariants: &[AtomInvariant]) {
    let n = ranks.len();
    while count_distinct(ranks) < n {
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        let Some(tied_rank) = sorted.windows(2).find(|pair| pair[0] == pair[1]).map(|pair| pair[0])
        else {
            return;
        };
        let max_rank = sorted.last().copied().unwrap_or(0);
        let mut best: Option<(Vec<u64>, Vec<usize>)> = None;
        for candidate in (0..n).filter(|&atom| ranks[atom] == tied_rank) {
            let mut trial = ranks.clone();
            trial[candidate] = max_rank + 1;
            morgan_refine(molecule, &mut trial);
            let mut by_rank: Vec<usize> = (0..n).collect();
            by_rank.sort_by_key(|&atom| trial[atom]);
            let trace: Vec<u64> = by_rank
                .iter()
                .map(|&atom| hash_of(&(&invariants[atom], neighborhood(molecule, &trial, atom))))
                .collect();
            if best.as_ref().map_or(true, |(best_trace, _)| trace < *best_trace) {
                best = Some((trace, trial));
            }
        }
        match best {
            Some((_, trial)) => *ranks = trial,
            None => return,
        }
    }
}

/// Morgan-style canonical labeling.
///
/// ```
/// use fragmentation::prelude::*;
/// let water = Molecule3D::from_xyz_str("O 0 0 0.1\nH 0.96 0 0\nH -0.24 0.93 0\n").unwrap();
/// let shuffled = Molecule3D::from_xyz_str("H 0.96 0 0\nO 0 0 0.1\nH -0.24 0.93 0\n").unwrap();
/// let labeler = CanonicalLabeler;
/// assert_eq!(labeler.identify(&water).unwrap(), labeler.identify(&shuffled).unwrap());
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalLabeler;

impl CanonicalLabeler {
    /// Canonical rank of every atom, a permutation of `0..len`.
    pub fn canonical_ranks(&self, molecule: &Molecule3D) -> Vec<usize> {
        let n = molecule.len();
        if n == 0 {
            return Vec::new();
        }
        let invariants: Vec<AtomInvariant> = (0..n).map(|atom| atom_invariant(molecule, atom)).collect();
        let initial: Vec<u64> = invariants.iter().map(hash_of).collect();
        let mut ranks = ranks_from_values(&initial);
        morgan_refine(molecule, &mut ranks);
        break_ties(molecule, &mut ranks, &invariants);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&atom| ranks[atom]);
        let mut final_ranks = vec![0; n];
        for (rank, atom) in order.into_iter().enumerate() {
            final_ranks[atom] = rank;
        }
        final_ranks
    }
}

impl CanonicalIdentifier for CanonicalLabeler {
    /// Atoms in canonical order followed by the sorted canonical edge list, e.g.
    /// `O,H,H|0-1:1,0-2:1`.
    fn identify(&self, molecule: &Molecule3D) -> Result<String, IdentifierError> {
        if molecule.is_empty() {
            return Err(IdentifierError::EmptyGraph);
        }
        let ranks = self.canonical_ranks(molecule);
        let mut atoms = vec![String::new(); molecule.len()];
        for (atom, &rank) in ranks.iter().enumerate() {
            let atomic_number = molecule.get_atomic_number(atom);
            let symbol = atomic_number
                .atomic_symbol()
                .ok_or(IdentifierError::UnknownElement(atomic_number))?;
            atoms[rank] = match molecule.charge(atom) {
                0 => symbol.to_string(),
                charge => format!("{symbol}{charge:+}"),
            };
        }
        let mut edges: Vec<(usize, usize, u8)> = molecule
            .get_edges_with_order()
            .into_iter()
            .map(|(atom1, atom2, order)| {
                let (rank1, rank2) = (ranks[atom1], ranks[atom2]);
                (rank1.min(rank2), rank1.max(rank2), order.code())
            })
            .collect();
        edges.sort_unstable();
        let edges = edges
            .iter()
            .map(|(rank1, rank2, code)| format!("{rank1}-{rank2}:{code}"))
            .join(",");
        Ok(format!("{}|{}", atoms.join(","), edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::bond::{BondOrder, BondTarget};

    fn chain(atomic_numbers: &[u8], order: &[usize]) -> Molecule3D {
        // atoms listed in `order` positions, bonded along the original chain
        let mut inverse = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            inverse[old] = new;
        }
        let atoms = order
            .iter()
            .map(|&old| {
                let bonds = if old + 1 < order.len() {
                    vec![BondTarget::single(inverse[old + 1])]
                } else {
                    Vec::new()
                };
                Atom::new(atomic_numbers[old]).with_bonds(bonds)
            })
            .collect();
        Molecule3D::from_atoms(atoms)
    }

    #[test]
    fn relabeling_keeps_the_identifier() {
        let atomic_numbers = [6, 6, 8, 7, 6];
        let reference = CanonicalLabeler.identify(&chain(&atomic_numbers, &[0, 1, 2, 3, 4])).unwrap();
        let shuffled = CanonicalLabeler.identify(&chain(&atomic_numbers, &[3, 0, 4, 2, 1])).unwrap();
        assert_eq!(reference, shuffled);
        let other = CanonicalLabeler.identify(&chain(&[6, 8, 6, 7, 6], &[0, 1, 2, 3, 4])).unwrap();
        assert_ne!(reference, other);
    }

    #[test]
    fn symmetric_rings_get_a_total_order() {
        let ring = Molecule3D::from_atoms(
            (0..6)
                .map(|i| Atom::new(6).with_bonds(vec![BondTarget::new((i + 1) % 6, BondOrder::Aromatic)]))
                .collect(),
        );
        let mut ranks = CanonicalLabeler.canonical_ranks(&ring);
        ranks.sort_unstable();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn bond_orders_and_charges_matter() {
        let single = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1)]),
            Atom::new(8),
        ]);
        let double = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::new(1, BondOrder::Double)]),
            Atom::new(8),
        ]);
        let charged = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1)]),
            Atom::new(8).with_charge(-1),
        ]);
        let ids: Vec<String> = [single, double, charged]
            .iter()
            .map(|m| CanonicalLabeler.identify(m).unwrap())
            .collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[0], ids[2]);
        assert!(ids[2].contains("O-1"));
    }

    #[test]
    fn failures() {
        assert_eq!(CanonicalLabeler.identify(&Molecule3D::new()), Err(IdentifierError::EmptyGraph));
        let mut unknown = Molecule3D::new();
        unknown.add_atom(Atom::new(200));
        assert_eq!(CanonicalLabeler.identify(&unknown), Err(IdentifierError::UnknownElement(200)));
    }
}
