//! Canonical atom order of a fragment, rooted at one of its attachment points.
//!
//! The walk runs depth first from the host atom over the placeholder graph. Whenever a
//! node has several unvisited neighbors, each neighbor is viewed as a ligand (the subtree
//! hanging off it) and the ligands are ranked level by level: heavier atoms first, then
//! atoms with more connections. Placeholder and link atoms weigh nothing.

use std::cmp::Ordering;
use std::collections::VecDeque;

use log::{trace, warn};

use crate::consts::ElementProperties;
use crate::fragment::Fragment;
use crate::molecule::{Molecule, Molecule3D};

/// Siblings that no ligand comparison could tell apart. They were visited in ascending
/// atom index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingTie {
    pub parent: usize,
    pub atoms: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalWalk {
    /// Atom indices of the placeholder graph in visiting order.
    pub order: Vec<usize>,
    pub ties: Vec<SiblingTie>,
}

impl CanonicalWalk {
    pub fn is_unambiguous(&self) -> bool {
        self.ties.is_empty()
    }
}

/// (mass number, connection count) of an atom, the key compared along walks and ligands.
pub fn atom_priority(graph: &Molecule3D, atom: usize) -> (u16, usize) {
    (
        graph.get_atomic_number(atom).mass_number().unwrap_or(0),
        graph.degree(atom),
    )
}

/// Walks the placeholder graph of `fragment` from the host of `attachment_point`. The
/// placeholder of that attachment point is never entered. `None` for unknown points.
pub fn canonical_walk(fragment: &Fragment, attachment_point: usize) -> Option<CanonicalWalk> {
    let ap = fragment.attachment_points.get(attachment_point)?;
    let graph = fragment.placeholder_graph();
    let mut walker = Walker {
        graph: &graph,
        visited: vec![false; graph.len()],
        walk: CanonicalWalk::default(),
    };
    walker.visited[fragment.placeholder_index(attachment_point)] = true;
    walker.visit(ap.host, 0);
    let walk = walker.walk;
    if !walk.ties.is_empty() {
        warn!(
            "canonical walk from atom {} ('{}') left {} sibling tie(s) unresolved, broken by atom index",
            ap.host,
            ap.class,
            walk.ties.len()
        );
    }
    Some(walk)
}

struct Walker<'a> {
    graph: &'a Molecule3D,
    visited: Vec<bool>,
    walk: CanonicalWalk,
}

impl Walker<'_> {
    fn visit(&mut self, atom: usize, depth: usize) {
        self.visited[atom] = true;
        self.walk.order.push(atom);
        trace!("{:indent$}atom {atom}", "", indent = depth * 2);

        let mut children: Vec<usize> = self
            .graph
            .neighbors(atom)
            .filter(|&neighbor| !self.visited[neighbor])
            .collect();
        if children.len() > 1 {
            children.sort_unstable();
            let mut ranked: Vec<(usize, Ligand)> = children
                .iter()
                .map(|&child| (child, Ligand::new(self.graph, child, atom, &self.visited)))
                .collect();
            ranked.sort_by(|(_, a), (_, b)| a.compare(b));
            self.record_ties(atom, &ranked);
            children = ranked.into_iter().map(|(child, _)| child).collect();
        }
        for child in children {
            // a ring may have reached it through an earlier sibling
            if !self.visited[child] {
                self.visit(child, depth + 1);
            }
        }
    }

    fn record_ties(&mut self, parent: usize, ranked: &[(usize, Ligand)]) {
        let mut start = 0;
        for end in 1..=ranked.len() {
            if end < ranked.len() && ranked[start].1.compare(&ranked[end].1) == Ordering::Equal {
                continue;
            }
            if end - start > 1 {
                self.walk.ties.push(SiblingTie {
                    parent,
                    atoms: ranked[start..end].iter().map(|(atom, _)| *atom).collect(),
                });
            }
            start = end;
        }
    }
}

/// Breadth-first levels of the subtree seeded at one neighbor, each level's priorities
/// sorted from highest to lowest.
struct Ligand {
    levels: Vec<Vec<(u16, usize)>>,
}

impl Ligand {
    fn new(graph: &Molecule3D, seed: usize, parent: usize, visited: &[bool]) -> Ligand {
        let mut seen = visited.to_vec();
        seen[parent] = true;
        seen[seed] = true;
        let mut levels = Vec::new();
        let mut frontier = VecDeque::from([seed]);
        while !frontier.is_empty() {
            let mut level: Vec<(u16, usize)> = frontier.iter().map(|&atom| atom_priority(graph, atom)).collect();
            level.sort_unstable_by(|a, b| b.cmp(a));
            levels.push(level);
            let mut next = VecDeque::new();
            for atom in frontier {
                for neighbor in graph.neighbors(atom) {
                    if !seen[neighbor] {
                        seen[neighbor] = true;
                        next.push_back(neighbor);
                    }
                }
            }
            frontier = next;
        }
        Ligand { levels }
    }

    /// `Less` when `self` ranks before `other`.
    fn compare(&self, other: &Ligand) -> Ordering {
        for (mine, theirs) in self.levels.iter().zip(&other.levels) {
            for (a, b) in mine.iter().zip(theirs) {
                match b.cmp(a) {
                    Ordering::Equal => continue,
                    decided => return decided,
                }
            }
            match theirs.len().cmp(&mine.len()) {
                Ordering::Equal => continue,
                decided => return decided,
            }
        }
        other.levels.len().cmp(&self.levels.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::bond::{BondOrder, BondTarget};
    use crate::fragment::AttachmentPoint;
    use crate::rules::AttachmentPointClass;
    use crate::vector::Vector;

    fn ap(host: usize) -> AttachmentPoint {
        AttachmentPoint::new(host, AttachmentPointClass::new("R", 0), BondOrder::Single, Vector::new(1.0, 0.0, 0.0))
    }

    #[test]
    fn heavier_branches_are_visited_first() {
        // C0 carries H1, Cl2 and C3, which carries O4
        let molecule = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1), BondTarget::single(2), BondTarget::single(3)]),
            Atom::new(1),
            Atom::new(17),
            Atom::new(6).with_bonds(vec![BondTarget::single(4)]),
            Atom::new(8),
        ]);
        let fragment = Fragment::new(molecule, vec![ap(0)], (0..5).collect());
        let walk = fragment.canonical_walk(0).unwrap();
        assert_eq!(walk.order, vec![0, 2, 3, 4, 1]);
        assert!(walk.is_unambiguous());
    }

    #[test]
    fn deeper_levels_break_ties() {
        // C0 carries C1-N3 and C2-O4: the oxygen branch is heavier one level down
        let molecule = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1), BondTarget::single(2)]),
            Atom::new(6).with_bonds(vec![BondTarget::single(3)]),
            Atom::new(6).with_bonds(vec![BondTarget::single(4)]),
            Atom::new(7),
            Atom::new(8),
        ]);
        let fragment = Fragment::new(molecule, vec![ap(0)], (0..5).collect());
        assert_eq!(fragment.canonical_walk(0).unwrap().order, vec![0, 2, 4, 1, 3]);
    }

    #[test]
    fn equivalent_siblings_are_recorded_as_ties() {
        // a methyl carbon: three hydrogens cannot be told apart
        let molecule = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1), BondTarget::single(2), BondTarget::single(3)]),
            Atom::new(1),
            Atom::new(1),
            Atom::new(1),
        ]);
        let fragment = Fragment::new(molecule, vec![ap(0)], (0..4).collect());
        let walk = fragment.canonical_walk(0).unwrap();
        assert_eq!(walk.order, vec![0, 1, 2, 3]);
        assert_eq!(
            walk.ties,
            vec![SiblingTie {
                parent: 0,
                atoms: vec![1, 2, 3]
            }]
        );
        assert!(fragment.canonical_walk(1).is_none());
    }

    #[test]
    fn other_placeholders_weigh_nothing() {
        // O1 on C0 plus a second attachment point on C0
        let molecule = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1)]),
            Atom::new(8),
        ]);
        let fragment = Fragment::new(molecule, vec![ap(0), ap(0)], vec![0, 1]);
        // placeholders are atoms 2 and 3; the walk from the first never enters atom 2
        assert_eq!(fragment.canonical_walk(0).unwrap().order, vec![0, 1, 3]);
        assert_eq!(fragment.canonical_walk(1).unwrap().order, vec![0, 1, 2]);
    }
}
