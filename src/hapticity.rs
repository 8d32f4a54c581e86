//! Multi-center (hapto) ligands: the atoms that bind a metal collectively are rebonded to a
//! single dummy link atom at their centroid, so the ligand is cut from the metal once.

use std::collections::{BTreeSet, HashSet, VecDeque};

use log::debug;

use crate::atom::Atom;
use crate::bond::BondOrder;
use crate::consts::{ElementProperties, DUMMY_ATOMIC_NUMBER, LINK_ATOM_TOLERANCE};
use crate::molecule::{Molecule, Molecule3D};
use crate::resolver::TargetBond;
use crate::rules::CuttingRule;
use crate::vector::Vector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// `members` are now bonded to `link` instead of `center`.
    Merged {
        link: usize,
        center: usize,
        /// Side of the rule the center atom plays.
        center_side: usize,
        members: Vec<usize>,
    },
    /// Fewer than two ligand atoms share the center.
    TooSmall,
    /// A member lost its bond to the center to an earlier cut. Nothing was modified.
    NeighborhoodChanged,
    /// Neither atom of the seed bond can act as the center.
    NoCenter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticityMerger {
    /// Distance within which an existing link atom is reused.
    pub tolerance: f64,
}

impl Default for HapticityMerger {
    fn default() -> Self {
        HapticityMerger {
            tolerance: LINK_ATOM_TOLERANCE,
        }
    }
}

impl HapticityMerger {
    pub fn new(tolerance: f64) -> Self {
        HapticityMerger { tolerance }
    }

    /// Gathers the ligand atoms bonded to the center of `seed` and rebonds them to a link atom.
    /// `candidates` are all targets the rule resolved in this molecule.
    pub fn merge(
        &self,
        molecule: &mut Molecule3D,
        rule: &CuttingRule,
        seed: &TargetBond,
        candidates: &[TargetBond],
    ) -> MergeOutcome {
        let Some(center_side) = center_side(molecule, rule, seed) else {
            debug!("{}: no metal center in bond {:?}", rule.name, seed.atoms);
            return MergeOutcome::NoCenter;
        };
        let center = seed.atoms[center_side];
        let ligand_side = 1 - center_side;

        let eligible: HashSet<usize> = candidates
            .iter()
            .filter(|target| target.rule == seed.rule && target.atoms[center_side] == center)
            .map(|target| target.atoms[ligand_side])
            .collect();
        let members = cluster(molecule, seed.atoms[ligand_side], &eligible);
        if members.len() < 2 {
            debug!(
                "{}: atom {} alone on center {center}, no multi-center bond",
                rule.name, seed.atoms[ligand_side]
            );
            return MergeOutcome::TooSmall;
        }
        if let Some(&lost) = members.iter().find(|&&member| !molecule.has_bond(member, center)) {
            debug!(
                "{}: atom {lost} is no longer bonded to center {center}, merge abandoned",
                rule.name
            );
            return MergeOutcome::NeighborhoodChanged;
        }

        let positions: Vec<Vector> = members.iter().map(|&member| molecule.position(member)).collect();
        let centroid = Vector::centroid(&positions).unwrap_or_default();
        let link = self
            .find_link(molecule, centroid)
            .unwrap_or_else(|| molecule.add_atom(Atom::dummy().with_position_vector(centroid)));
        for &member in &members {
            molecule.remove_bond(member, center);
            molecule.add_bond(member, link, BondOrder::Single);
        }
        debug!(
            "{}: atoms {members:?} bound to center {center} through link atom {link}",
            rule.name
        );
        MergeOutcome::Merged {
            link,
            center,
            center_side,
            members,
        }
    }

    fn find_link(&self, molecule: &Molecule3D, position: Vector) -> Option<usize> {
        (0..molecule.len()).find(|&atom| {
            molecule.get_atomic_number(atom) == DUMMY_ATOMIC_NUMBER
                && molecule.position(atom).distance(&position) <= self.tolerance
        })
    }
}

/// The side naming a metal in the rule, or else the side whose atom is a metal.
fn center_side(molecule: &Molecule3D, rule: &CuttingRule, seed: &TargetBond) -> Option<usize> {
    rule.metal_side().or_else(|| {
        match seed.atoms.map(|atom| molecule.get_atomic_number(atom).is_metal()) {
            [true, false] => Some(0),
            [false, true] => Some(1),
            _ => None,
        }
    })
}

/// Eligible atoms reachable from `seed` through eligible atoms only, ascending.
fn cluster(molecule: &Molecule3D, seed: usize, eligible: &HashSet<usize>) -> Vec<usize> {
    let mut members = BTreeSet::from([seed]);
    let mut queue = VecDeque::from([seed]);
    while let Some(atom) = queue.pop_front() {
        for neighbor in molecule.neighbors(atom) {
            if eligible.contains(&neighbor) && members.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }
    members.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::BondTarget;

    /// Iron over an allyl fragment C1-C2-C3, plus a chloride on the iron.
    fn allyl_iron() -> Molecule3D {
        Molecule3D::from_atoms(vec![
            Atom::new(26)
                .with_position((0.0, 0.0, 0.0))
                .with_bonds(vec![
                    BondTarget::single(1),
                    BondTarget::single(2),
                    BondTarget::single(3),
                    BondTarget::single(4),
                ]),
            Atom::new(6)
                .with_position((-1.2, 0.0, 2.0))
                .with_bonds(vec![BondTarget::single(2)]),
            Atom::new(6)
                .with_position((0.0, 0.6, 2.0))
                .with_bonds(vec![BondTarget::single(3)]),
            Atom::new(6).with_position((1.2, 0.0, 2.0)),
            Atom::new(17).with_position((0.0, 0.0, -2.2)),
        ])
    }

    fn rule() -> CuttingRule {
        CuttingRule::new("FeC", "[Fe]", "[C]", "~", 1, vec![crate::rules::RuleOption::Hapticity]).unwrap()
    }

    fn targets(rule: &CuttingRule) -> Vec<TargetBond> {
        [1, 2, 3].map(|carbon| TargetBond::new(rule, 0, carbon)).to_vec()
    }

    #[test]
    fn members_move_to_one_link_atom() {
        let mut molecule = allyl_iron();
        let rule = rule();
        let targets = targets(&rule);
        let outcome = HapticityMerger::default().merge(&mut molecule, &rule, &targets[0], &targets);
        assert_eq!(
            outcome,
            MergeOutcome::Merged {
                link: 5,
                center: 0,
                center_side: 0,
                members: vec![1, 2, 3]
            }
        );
        assert_eq!(molecule.len(), 6);
        assert_eq!(molecule.degree(0), 1);
        assert_eq!(molecule.neighbors(5).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!((molecule.position(5) - Vector::new(0.0, 0.2, 2.0)).length() < 1e-9);
    }

    #[test]
    fn existing_link_atoms_are_reused() {
        let mut molecule = allyl_iron();
        let existing = molecule.add_atom(Atom::dummy().with_position((0.0, 0.205, 2.0)));
        let rule = rule();
        let targets = targets(&rule);
        let MergeOutcome::Merged { link, .. } =
            HapticityMerger::default().merge(&mut molecule, &rule, &targets[1], &targets)
        else {
            panic!("merge expected");
        };
        assert_eq!(link, existing);
        assert_eq!(molecule.len(), 6);
    }

    #[test]
    fn lone_atoms_are_not_merged() {
        let mut molecule = allyl_iron();
        let rule = rule();
        let targets = targets(&rule);
        let before = molecule.clone();
        let outcome = HapticityMerger::default().merge(&mut molecule, &rule, &targets[0], &targets[..1]);
        assert_eq!(outcome, MergeOutcome::TooSmall);
        assert_eq!(molecule, before);
    }

    #[test]
    fn changed_neighborhoods_leave_the_molecule_alone() {
        let mut molecule = allyl_iron();
        molecule.remove_bond(0, 3);
        let before = molecule.clone();
        let rule = rule();
        let targets = targets(&rule);
        let outcome = HapticityMerger::default().merge(&mut molecule, &rule, &targets[0], &targets);
        assert_eq!(outcome, MergeOutcome::NeighborhoodChanged);
        assert_eq!(molecule, before);
    }
}
