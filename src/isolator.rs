//! Splits a cut molecule into one fragment per connected component.

use crate::error::FragmenterError;
use crate::fragment::{AttachmentPoint, Fragment};
use crate::molecule::{Molecule, Molecule3D};

/// Partitions `molecule` into fragments, components ordered by their lowest atom index.
/// Attachment points follow their hosts with hosts renumbered locally; every fragment records
/// the parent index of each of its atoms.
///
/// ```
/// use fragmentation::isolator::isolate;
/// use fragmentation::prelude::*;
/// let molecule = Molecule3D::from_xyz_str("C 0 0 0\nO 1.43 0 0.1\nNa 9 9 9\n").unwrap();
/// let fragments = isolate(&molecule, &[]).unwrap();
/// assert_eq!(fragments.len(), 2);
/// assert_eq!(fragments[1].parent_atoms, vec![2]);
/// ```
pub fn isolate(molecule: &Molecule3D, attachment_points: &[AttachmentPoint]) -> Result<Vec<Fragment>, FragmenterError> {
    let components = molecule.get_components();
    // (component, local index) of every parent atom
    let mut placement = vec![(0, 0); molecule.len()];
    for (component_index, component) in components.iter().enumerate() {
        for (local, &atom) in component.iter().enumerate() {
            placement[atom] = (component_index, local);
        }
    }

    let mut aps: Vec<Vec<AttachmentPoint>> = vec![Vec::new(); components.len()];
    for ap in attachment_points {
        let (component_index, local) = placement[ap.host];
        aps[component_index].push(AttachmentPoint {
            host: local,
            ..ap.clone()
        });
    }

    components
        .into_iter()
        .zip(aps)
        .map(|(atoms, aps)| {
            let piece = molecule.subgraph(&atoms);
            if piece.len() != atoms.len() {
                return Err(FragmenterError::AtomCountMismatch {
                    expected: atoms.len(),
                    found: piece.len(),
                });
            }
            Ok(Fragment::new(piece, aps, atoms))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::bond::{BondOrder, BondTarget};
    use crate::rules::AttachmentPointClass;
    use crate::vector::Vector;
    use rand::seq::SliceRandom;
    use rand::Rng;

    #[test]
    fn attachment_points_follow_their_hosts() {
        // C0-C1 | O2-H3, the C1-O2 bond was cut
        let molecule = Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1)]),
            Atom::new(6),
            Atom::new(8).with_bonds(vec![BondTarget::single(3)]),
            Atom::new(1),
        ]);
        let aps = [
            AttachmentPoint::new(1, AttachmentPointClass::new("CO", 0), BondOrder::Single, Vector::new(1.0, 0.0, 0.0)),
            AttachmentPoint::new(2, AttachmentPointClass::new("CO", 1), BondOrder::Single, Vector::new(-1.0, 0.0, 0.0)),
        ];
        let fragments = isolate(&molecule, &aps).unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].parent_atoms, vec![0, 1]);
        assert_eq!(fragments[0].attachment_points[0].host, 1);
        assert_eq!(fragments[1].parent_atoms, vec![2, 3]);
        assert_eq!(fragments[1].attachment_points[0].host, 0);
        assert_eq!(fragments[1].attachment_points[0].class.subclass, 1);
        assert!(fragments[1].molecule.has_bond(0, 1));
    }

    #[test]
    fn every_atom_lands_in_exactly_one_fragment() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let size = rng.gen_range(1..40);
            let mut molecule = Molecule3D::new();
            for _ in 0..size {
                molecule.add_atom(Atom::new(6));
            }
            let mut atoms: Vec<usize> = (0..size).collect();
            atoms.shuffle(&mut rng);
            for pair in atoms.windows(2) {
                if rng.gen_bool(0.6) {
                    molecule.add_bond(pair[0], pair[1], BondOrder::Single);
                }
            }

            let fragments = isolate(&molecule, &[]).unwrap();
            let total: usize = fragments.iter().map(Fragment::atom_count).sum();
            assert_eq!(total, molecule.len());
            let mut seen = vec![0; size];
            for fragment in &fragments {
                for &atom in &fragment.parent_atoms {
                    seen[atom] += 1;
                }
            }
            assert!(seen.iter().all(|&count| count == 1));
            let bonds: usize = fragments.iter().map(Fragment::bond_count).sum();
            assert_eq!(bonds, molecule.number_of_bonds());
        }
    }
}
