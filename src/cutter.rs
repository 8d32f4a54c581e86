//! Severs resolved target bonds and records an attachment point on each side.

use std::collections::HashSet;

use log::debug;

use crate::compatibility::CompatibilityMatrix;
use crate::fragment::AttachmentPoint;
use crate::hapticity::{HapticityMerger, MergeOutcome};
use crate::molecule::Molecule3D;
use crate::resolver::{ResolvedMatches, TargetBond};
use crate::rules::{CuttingRule, RuleRegistry};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CutOutcome {
    pub attachment_points: Vec<AttachmentPoint>,
    /// Bonds severed, a multi-center ligand counting once.
    pub cuts: usize,
    /// Targets left alone because an earlier cut changed their surroundings.
    pub skipped: usize,
}

pub struct MoleculeCutter<'a> {
    registry: &'a RuleRegistry,
    merger: HapticityMerger,
}

impl<'a> MoleculeCutter<'a> {
    pub fn new(registry: &'a RuleRegistry) -> Self {
        MoleculeCutter {
            registry,
            merger: HapticityMerger::default(),
        }
    }

    pub fn with_merger(mut self, merger: HapticityMerger) -> Self {
        self.merger = merger;
        self
    }

    /// Cuts the targets of every rule in processing order, growing `matrix` with the class
    /// pair of each cut. The molecule is modified in place.
    pub fn cut(
        &self,
        molecule: &mut Molecule3D,
        resolved: &ResolvedMatches,
        matrix: &mut CompatibilityMatrix,
    ) -> CutOutcome {
        let mut outcome = CutOutcome::default();
        for (name, targets) in &resolved.targets {
            let Some(rule) = self.registry.get(name) else {
                continue;
            };
            if rule.is_hapto() {
                self.cut_multi_center(molecule, rule, targets, matrix, &mut outcome);
                continue;
            }
            for target in targets {
                let [atom0, atom1] = target.atoms;
                if molecule.remove_bond(atom0, atom1).is_none() {
                    debug!("{name}: bond {atom0}-{atom1} already gone");
                    outcome.skipped += 1;
                    continue;
                }
                self.record(molecule, rule, [atom0, atom1], matrix, &mut outcome);
            }
        }
        outcome
    }

    fn cut_multi_center(
        &self,
        molecule: &mut Molecule3D,
        rule: &CuttingRule,
        targets: &[TargetBond],
        matrix: &mut CompatibilityMatrix,
        outcome: &mut CutOutcome,
    ) {
        let mut consumed: HashSet<(usize, usize)> = HashSet::new();
        for target in targets {
            let [atom0, atom1] = target.atoms;
            if consumed.contains(&(atom0, atom1)) {
                continue;
            }
            match self.merger.merge(molecule, rule, target, targets) {
                MergeOutcome::Merged {
                    link,
                    center,
                    center_side,
                    members,
                } => {
                    let by_side = |other: usize| {
                        let mut atoms = [center; 2];
                        atoms[1 - center_side] = other;
                        atoms
                    };
                    consumed.extend(members.into_iter().map(|member| {
                        let [atom0, atom1] = by_side(member);
                        (atom0, atom1)
                    }));
                    self.record(molecule, rule, by_side(link), matrix, outcome);
                }
                _ => outcome.skipped += 1,
            }
        }
    }

    /// Creates one attachment point per end of a severed bond (atoms listed by rule side),
    /// each pointing at the former partner, and registers the class pair.
    fn record(
        &self,
        molecule: &Molecule3D,
        rule: &CuttingRule,
        atoms: [usize; 2],
        matrix: &mut CompatibilityMatrix,
        outcome: &mut CutOutcome,
    ) {
        let order = rule.bond_order();
        let classes = [rule.class(0), rule.class(1)];
        for (index, &host) in atoms.iter().enumerate() {
            let partner = atoms[1 - index];
            outcome.attachment_points.push(AttachmentPoint::new(
                host,
                classes[index].clone(),
                order,
                molecule.position(partner) - molecule.position(host),
            ));
        }
        matrix.add_pair(&classes[0], &classes[1]);
        outcome.cuts += 1;
        debug!(
            "{}: cut {}-{} into {} and {}",
            rule.name, atoms[0], atoms[1], classes[0], classes[1]
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::bond::{BondOrder, BondTarget};
    use crate::matching::SmartsMatcher;
    use crate::molecule::Molecule;
    use crate::resolver::BondMatchResolver;
    use crate::rings::RingFinder;
    use crate::vector::Vector;

    fn cut(registry: &RuleRegistry, molecule: &mut Molecule3D, matrix: &mut CompatibilityMatrix) -> CutOutcome {
        let resolved = BondMatchResolver::new(registry, &SmartsMatcher::default(), &RingFinder::default())
            .resolve(molecule)
            .unwrap();
        MoleculeCutter::new(registry).cut(molecule, &resolved, matrix)
    }

    #[test]
    fn single_bond_cut() {
        let registry = RuleRegistry::parse("CTR C1 1 [C] [O] -\n").unwrap();
        let mut molecule = Molecule3D::from_atoms(vec![
            Atom::new(6)
                .with_position((0.0, 0.0, 0.0))
                .with_bonds(vec![BondTarget::single(1)]),
            Atom::new(8).with_position((1.4, 0.0, 0.1)),
        ]);
        let mut matrix = CompatibilityMatrix::new();
        let outcome = cut(&registry, &mut molecule, &mut matrix);
        assert_eq!(outcome.cuts, 1);
        assert!(!molecule.has_bond(0, 1));
        let [carbon, oxygen] = outcome.attachment_points.as_slice() else {
            panic!("two attachment points expected");
        };
        assert_eq!((carbon.host, carbon.class.to_string()), (0, "C1:0".to_string()));
        assert_eq!((oxygen.host, oxygen.class.to_string()), (1, "C1:1".to_string()));
        assert_eq!(carbon.direction, Vector::new(1.4, 0.0, 0.1));
        assert_eq!(oxygen.bond_order, BondOrder::Single);
        assert!(matrix.compatible("C1:0", "C1:1"));
    }

    #[test]
    fn explicit_bond_orders_are_kept() {
        let registry = RuleRegistry::parse("CTR CN 1 [C] [N] =\n").unwrap();
        let mut molecule = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::new(1, BondOrder::Double)]),
            Atom::new(7),
        ]);
        let mut matrix = CompatibilityMatrix::new();
        let outcome = cut(&registry, &mut molecule, &mut matrix);
        assert!(outcome
            .attachment_points
            .iter()
            .all(|ap| ap.bond_order == BondOrder::Double));
        assert_eq!(matrix.bond_order("CN"), Some(BondOrder::Double));
    }

    #[test]
    fn bonds_cut_by_an_earlier_rule_are_skipped() {
        let registry = RuleRegistry::parse("CTR A 1 [C] [O] -\nCTR B 2 [#6] [#8] -\n").unwrap();
        let mut molecule = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1)]),
            Atom::new(8),
        ]);
        let mut matrix = CompatibilityMatrix::new();
        let outcome = cut(&registry, &mut molecule, &mut matrix);
        assert_eq!((outcome.cuts, outcome.skipped), (1, 1));
        assert!(matrix.partners("B:0").is_none());
    }

    #[test]
    fn multi_center_ligands_are_cut_once() {
        let registry = RuleRegistry::parse("CTR FeC 1 [Fe] [C] ~ HAPTO\n").unwrap();
        let mut molecule = Molecule3D::from_atoms(vec![
            Atom::new(26).with_position((0.0, 0.0, 0.0)).with_bonds(vec![
                BondTarget::single(1),
                BondTarget::single(2),
                BondTarget::single(3),
            ]),
            Atom::new(6)
                .with_position((-1.2, 0.0, 2.0))
                .with_bonds(vec![BondTarget::single(2)]),
            Atom::new(6)
                .with_position((0.0, 0.6, 2.0))
                .with_bonds(vec![BondTarget::single(3)]),
            Atom::new(6).with_position((1.2, 0.0, 2.0)),
        ]);
        let mut matrix = CompatibilityMatrix::new();
        let outcome = cut(&registry, &mut molecule, &mut matrix);
        assert_eq!(outcome.cuts, 1);
        assert_eq!(molecule.len(), 5);
        assert_eq!(molecule.degree(4), 3);
        assert_eq!(molecule.degree(0), 0);
        let hosts: Vec<(usize, String)> = outcome
            .attachment_points
            .iter()
            .map(|ap| (ap.host, ap.class.to_string()))
            .collect();
        assert_eq!(hosts, vec![(0, "FeC:0".to_string()), (4, "FeC:1".to_string())]);
    }
}
