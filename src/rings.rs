//! Ring perception for pattern matching and the smallest-ring queries behind the `RING>n`
//! and `OMRING>n` rule options.

use std::collections::{HashMap, VecDeque};

use petgraph::algo::{connected_components, dijkstra};
use petgraph::graph::NodeIndex;

use crate::consts::{ElementProperties, RING_SEARCH_LIMIT};
use crate::molecule::{Molecule, Molecule3D};

/// Ring membership of atoms and bonds.
///
/// Ring counts refer to a smallest set of smallest rings, ring sizes to the smallest cycle
/// through an atom.
#[derive(Debug, Clone, Default)]
pub struct RingInfo {
    ring_bonds: HashMap<(usize, usize), usize>,
    smallest_ring: Vec<Option<usize>>,
    ring_count: Vec<usize>,
    ring_bond_count: Vec<usize>,
    rings: Vec<Vec<usize>>,
}

fn edge_key(atom1: usize, atom2: usize) -> (usize, usize) {
    (atom1.min(atom2), atom1.max(atom2))
}

impl RingInfo {
    pub fn perceive<M: Molecule>(molecule: &M) -> RingInfo {
        let atom_count = molecule.len();
        let edges = molecule.get_edges();
        let edge_index: HashMap<(usize, usize), usize> = edges
            .iter()
            .enumerate()
            .map(|(index, &(a, b))| (edge_key(a, b), index))
            .collect();

        let mut info = RingInfo {
            smallest_ring: vec![None; atom_count],
            ring_count: vec![0; atom_count],
            ring_bond_count: vec![0; atom_count],
            ..Default::default()
        };

        // shortest cycle through every edge
        let mut candidates: Vec<(Vec<usize>, Vec<u64>)> = Vec::new();
        for &(atom1, atom2) in &edges {
            let Some(path) = shortest_path_avoiding(molecule, atom1, atom2) else {
                continue;
            };
            let size = path.len();
            info.ring_bonds.insert(edge_key(atom1, atom2), size);
            for &atom in &path {
                let smallest = &mut info.smallest_ring[atom];
                *smallest = Some(smallest.map_or(size, |current| current.min(size)));
            }
            let mut bits = vec![0u64; edges.len().div_ceil(64)];
            for (index, &atom) in path.iter().enumerate() {
                let next = path[(index + 1) % size];
                if let Some(&edge) = edge_index.get(&edge_key(atom, next)) {
                    bits[edge / 64] |= 1 << (edge % 64);
                }
            }
            if !candidates.iter().any(|(_, existing)| *existing == bits) {
                candidates.push((path, bits));
            }
        }

        for &(atom1, atom2) in info.ring_bonds.keys() {
            info.ring_bond_count[atom1] += 1;
            info.ring_bond_count[atom2] += 1;
        }

        let graph = molecule.to_ungraph();
        let cyclomatic = (edges.len() + connected_components(&graph)).saturating_sub(atom_count);
        candidates.sort_by_key(|(path, _)| path.len());
        let mut basis: Vec<Vec<u64>> = Vec::new();
        for (path, bits) in candidates {
            if info.rings.len() == cyclomatic {
                break;
            }
            if is_independent(&basis, &bits) {
                basis.push(bits);
                for &atom in &path {
                    info.ring_count[atom] += 1;
                }
                info.rings.push(path);
            }
        }
        info
    }

    pub fn rings(&self) -> &[Vec<usize>] {
        &self.rings
    }

    pub fn is_ring_atom(&self, atom: usize) -> bool {
        self.smallest_ring.get(atom).is_some_and(Option::is_some)
    }

    pub fn is_ring_bond(&self, atom1: usize, atom2: usize) -> bool {
        self.ring_bonds.contains_key(&edge_key(atom1, atom2))
    }

    pub fn ring_count(&self, atom: usize) -> usize {
        self.ring_count.get(atom).copied().unwrap_or(0)
    }

    pub fn smallest_ring_size(&self, atom: usize) -> Option<usize> {
        self.smallest_ring.get(atom).copied().flatten()
    }

    pub fn ring_bond_count(&self, atom: usize) -> usize {
        self.ring_bond_count.get(atom).copied().unwrap_or(0)
    }
}

/// Atoms of the shortest cycle closed by the bond `atom1`-`atom2`, starting at `atom1`.
fn shortest_path_avoiding<M: Molecule>(molecule: &M, atom1: usize, atom2: usize) -> Option<Vec<usize>> {
    let mut previous = vec![usize::MAX; molecule.len()];
    previous[atom1] = atom1;
    let mut queue = VecDeque::from([atom1]);
    while let Some(atom) = queue.pop_front() {
        for neighbor in molecule.neighbors(atom) {
            if atom == atom1 && neighbor == atom2 {
                continue;
            }
            if previous[neighbor] != usize::MAX {
                continue;
            }
            previous[neighbor] = atom;
            if neighbor == atom2 {
                let mut path = vec![atom2];
                let mut current = atom2;
                while current != atom1 {
                    current = previous[current];
                    path.push(current);
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(neighbor);
        }
    }
    None
}

/// Gaussian elimination over GF(2) on edge bitsets.
fn is_independent(basis: &[Vec<u64>], bits: &[u64]) -> bool {
    let mut rows: Vec<Vec<u64>> = basis.to_vec();
    rows.push(bits.to_vec());
    let words = bits.len();
    let mut rank = 0;
    for bit in 0..words * 64 {
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        let Some(pivot) = (rank..rows.len()).find(|&row| rows[row][word] & mask != 0) else {
            continue;
        };
        rows.swap(rank, pivot);
        for row in 0..rows.len() {
            if row != rank && rows[row][word] & mask != 0 {
                let pivot_row = rows[rank].clone();
                for (target, source) in rows[row].iter_mut().zip(&pivot_row) {
                    *target ^= source;
                }
            }
        }
        rank += 1;
    }
    rank == rows.len()
}

/// Smallest ring containing a given bond.
pub trait RingQuery: Sync {
    /// Size of the smallest ring through the bond `atom1`-`atom2` that has at most
    /// `size_limit` atoms, or `None`. With `metal_only` only rings containing a metal count.
    fn smallest_ring(
        &self,
        molecule: &Molecule3D,
        atom1: usize,
        atom2: usize,
        size_limit: usize,
        metal_only: bool,
    ) -> Option<usize>;
}

/// Default [`RingQuery`]. Requested size limits are capped at `size_limit`.
#[derive(Debug, Clone, Copy)]
pub struct RingFinder {
    pub size_limit: usize,
}

impl Default for RingFinder {
    fn default() -> Self {
        RingFinder {
            size_limit: RING_SEARCH_LIMIT,
        }
    }
}

impl RingFinder {
    pub fn new(size_limit: usize) -> Self {
        RingFinder { size_limit }
    }
}

impl RingQuery for RingFinder {
    /// ```
    /// use fragmentation::prelude::*;
    /// use fragmentation::bond::BondTarget;
    /// let ring = Molecule3D::from_atoms(vec![
    ///     Atom::new(6).with_bonds(vec![BondTarget::single(1), BondTarget::single(2)]),
    ///     Atom::new(6).with_bonds(vec![BondTarget::single(2)]),
    ///     Atom::new(6),
    /// ]);
    /// let finder = RingFinder::default();
    /// assert_eq!(finder.smallest_ring(&ring, 0, 1, 6, false), Some(3));
    /// assert_eq!(finder.smallest_ring(&ring, 0, 1, 2, false), None);
    /// assert_eq!(finder.smallest_ring(&ring, 0, 1, 6, true), None);
    /// ```
    fn smallest_ring(
        &self,
        molecule: &Molecule3D,
        atom1: usize,
        atom2: usize,
        size_limit: usize,
        metal_only: bool,
    ) -> Option<usize> {
        if !molecule.has_bond(atom1, atom2) {
            return None;
        }
        let limit = size_limit.min(self.size_limit);
        if metal_only {
            return smallest_metal_ring(molecule, atom1, atom2, limit);
        }
        let mut graph = molecule.to_ungraph();
        let (start, goal) = (NodeIndex::new(atom2), NodeIndex::new(atom1));
        if let Some(edge) = graph.find_edge(goal, start) {
            graph.remove_edge(edge);
        }
        let distances = dijkstra(&graph, start, Some(goal), |_| 1usize);
        distances
            .get(&goal)
            .map(|distance| distance + 1)
            .filter(|&size| size <= limit)
    }
}

/// Bounded search over simple paths closing the bond; only rings with a metal atom count.
fn smallest_metal_ring(molecule: &Molecule3D, atom1: usize, atom2: usize, limit: usize) -> Option<usize> {
    let mut on_path = vec![false; molecule.len()];
    on_path[atom1] = true;
    on_path[atom2] = true;
    let has_metal = molecule.get_atomic_number(atom1).is_metal()
        || molecule.get_atomic_number(atom2).is_metal();
    let mut best = None;
    extend_metal_ring(
        molecule,
        &RingSearch {
            closing: atom1,
            first: atom2,
            limit,
        },
        atom2,
        2,
        has_metal,
        &mut on_path,
        &mut best,
    );
    best
}

struct RingSearch {
    closing: usize,
    first: usize,
    limit: usize,
}

fn extend_metal_ring(
    molecule: &Molecule3D,
    search: &RingSearch,
    current: usize,
    size: usize,
    has_metal: bool,
    on_path: &mut [bool],
    best: &mut Option<usize>,
) {
    for next in molecule.neighbors(current) {
        if next == search.closing {
            if current != search.first && has_metal && best.map_or(true, |b| size < b) {
                *best = Some(size);
            }
            continue;
        }
        if on_path[next] || size + 1 > search.limit || best.is_some_and(|b| size + 1 >= b) {
            continue;
        }
        on_path[next] = true;
        let metal = has_metal || molecule.get_atomic_number(next).is_metal();
        extend_metal_ring(molecule, search, next, size + 1, metal, on_path, best);
        on_path[next] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::bond::BondTarget;

    fn ring_of(atomic_numbers: &[u8]) -> Molecule3D {
        let size = atomic_numbers.len();
        Molecule3D::from_atoms(
            atomic_numbers
                .iter()
                .enumerate()
                .map(|(index, &z)| Atom::new(z).with_bonds(vec![BondTarget::single((index + 1) % size)]))
                .collect(),
        )
    }

    #[test]
    fn fused_rings_have_two_sssr_members() {
        // naphthalene-like skeleton: two six-membered rings sharing the 0-5 bond
        let mut molecule = ring_of(&[6; 6]);
        let mut previous = 5;
        for _ in 0..4 {
            let atom = molecule.add_atom(Atom::new(6));
            molecule.add_bond(previous, atom, Default::default());
            previous = atom;
        }
        molecule.add_bond(previous, 0, Default::default());
        let info = RingInfo::perceive(&molecule);
        assert_eq!(info.rings().len(), 2);
        assert_eq!(info.ring_count(0), 2);
        assert_eq!(info.ring_count(2), 1);
        assert_eq!(info.smallest_ring_size(7), Some(6));
        assert_eq!(info.ring_bond_count(0), 3);
        assert!(info.is_ring_bond(0, 5));
    }

    #[test]
    fn chains_have_no_rings() {
        let chain = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1)]),
            Atom::new(8),
        ]);
        let info = RingInfo::perceive(&chain);
        assert!(!info.is_ring_atom(0));
        assert!(!info.is_ring_bond(0, 1));
        assert_eq!(RingFinder::default().smallest_ring(&chain, 0, 1, 8, false), None);
    }

    #[test]
    fn metal_rings_need_a_metal() {
        // chelate: Fe0-N1-C2-C3-N4-Fe0
        let chelate = ring_of(&[26, 7, 6, 6, 7]);
        let finder = RingFinder::default();
        assert_eq!(finder.smallest_ring(&chelate, 1, 2, 8, true), Some(5));
        assert_eq!(finder.smallest_ring(&chelate, 1, 2, 4, true), None);
        let organic = ring_of(&[6, 7, 6, 6, 7]);
        assert_eq!(finder.smallest_ring(&organic, 1, 2, 8, true), None);
        assert_eq!(finder.smallest_ring(&organic, 1, 2, 8, false), Some(5));
    }
}
