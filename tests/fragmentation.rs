use std::sync::atomic::{AtomicUsize, Ordering};

use fragmentation::error::IdentifierError;
use fragmentation::prelude::*;
use fragmentation::sdf::{read_fragments, write_fragments};
use rand::seq::SliceRandom;

fn methanol_core() -> Molecule3D {
    Molecule3D::from_atoms(vec![
        Atom::new(6)
            .with_position((0.0, 0.0, 0.0))
            .with_bonds(vec![BondTarget::single(1)]),
        Atom::new(8).with_position((1.4, 0.0, 0.1)),
    ])
    .with_title("C-O")
}

fn ethanol() -> Molecule3D {
    Molecule3D::from_xyz_str(
        "C -1.2 0.0 0.0\nC 0.3 0.0 0.1\nO 0.8 1.3 0.0\nH 1.7 1.3 0.0\n\
         H -1.6 1.0 0.0\nH -1.6 -0.5 0.9\nH -1.6 -0.5 -0.9\nH 0.7 -0.5 -0.8\nH 0.7 -0.5 0.9\n",
    )
    .unwrap()
    .with_title("ethanol")
}

fn allyl_iron() -> Molecule3D {
    Molecule3D::from_atoms(vec![
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
    ])
    .with_title("allyl iron")
}

fn fragments_of(rules: &str, molecule: &Molecule3D, matrix: &mut CompatibilityMatrix) -> Vec<Fragment> {
    Fragmenter::new(RuleRegistry::parse(rules).unwrap())
        .fragment_molecule(0, molecule, matrix)
        .unwrap()
        .unwrap()
}

/// Same atoms and bonds listed in a shuffled order, attachment points following their hosts.
fn relabeled(fragment: &Fragment, rng: &mut impl rand::Rng) -> Fragment {
    let n = fragment.atom_count();
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let mut new_index = vec![0; n];
    for (new, &old) in order.iter().enumerate() {
        new_index[old] = new;
    }

    let source = &fragment.molecule;
    let mut molecule = Molecule3D::new();
    for &old in &order {
        molecule.add_atom(
            Atom::new(source.get_atomic_number(old))
                .with_position_vector(source.position(old))
                .with_charge(source.charge(old)),
        );
    }
    for (a, b, bond_order) in source.get_edges_with_order() {
        molecule.add_bond(new_index[a], new_index[b], bond_order);
    }
    let attachment_points = fragment
        .attachment_points
        .iter()
        .map(|ap| AttachmentPoint {
            host: new_index[ap.host],
            ..ap.clone()
        })
        .collect();
    Fragment::new(molecule, attachment_points, order)
}

struct Counting(AtomicUsize);

impl CanonicalIdentifier for Counting {
    fn identify(&self, molecule: &Molecule3D) -> Result<String, IdentifierError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        CanonicalLabeler.identify(molecule)
    }
}

#[test]
fn single_rule_cuts_carbon_oxygen() {
    let mut matrix = CompatibilityMatrix::new();
    let fragments = fragments_of("CTR C1 1 [C] [O] -\n", &methanol_core(), &mut matrix);
    assert_eq!(fragments.len(), 2);
    let classes: Vec<String> = fragments
        .iter()
        .flat_map(|fragment| fragment.attachment_points.iter().map(|ap| ap.class.to_string()))
        .collect();
    assert_eq!(classes, vec!["C1:0", "C1:1"]);
    assert_eq!(matrix.partners("C1:0").unwrap().iter().collect::<Vec<_>>(), vec!["C1:1"]);
    assert_eq!(matrix.partners("C1:1").unwrap().iter().collect::<Vec<_>>(), vec!["C1:0"]);
}

#[test]
fn matrix_does_not_grow_on_repeated_molecules() {
    let fragmenter = Fragmenter::new(RuleRegistry::parse("CTR C1 1 [C] [O] -\n").unwrap());
    let once = fragmenter.run(&[methanol_core()]).unwrap();
    let twice = fragmenter.run(&[methanol_core(), methanol_core()]).unwrap();
    assert_eq!(once.matrix.to_string(), twice.matrix.to_string());
    assert_eq!(twice.library.len(), 2);
    assert!(twice.library.iter().all(|(_, count)| count == 2));
}

#[test]
fn symmetric_rules_give_one_class() {
    let mut matrix = CompatibilityMatrix::new();
    let fragments = fragments_of("CTR CC 1 [C] [C] -\n", &ethanol(), &mut matrix);
    assert_eq!(fragments.len(), 2);
    assert!(fragments
        .iter()
        .flat_map(|fragment| &fragment.attachment_points)
        .all(|ap| ap.class.to_string() == "CC:0"));
    assert!(matrix.compatible("CC:0", "CC:0"));
    assert_eq!(matrix.len(), 1);
}

#[test]
fn multi_center_ligand_gets_a_link_atom() {
    let mut matrix = CompatibilityMatrix::new();
    let fragments = fragments_of("CTR FeC 1 [Fe] [C] ~ HAPTO\n", &allyl_iron(), &mut matrix);
    assert_eq!(fragments.len(), 2);
    let aps: usize = fragments.iter().map(|fragment| fragment.attachment_points.len()).sum();
    assert_eq!(aps, 2);

    let ligand = fragments
        .iter()
        .find(|fragment| fragment.atom_count() == 4)
        .unwrap();
    let link = (0..4)
        .find(|&atom| ligand.molecule.get_atomic_number(atom) == 0)
        .unwrap();
    assert_eq!(ligand.molecule.degree(link), 3);
    assert_eq!(ligand.attachment_points[0].host, link);
    assert_eq!(ligand.attachment_points[0].class.to_string(), "FeC:1");
    assert!(matrix.compatible("FeC:0", "FeC:1"));
}

#[test]
fn atoms_are_conserved() {
    let molecule = ethanol();
    let mut matrix = CompatibilityMatrix::new();
    let fragments = fragments_of("CTR CC 1 [C] [C] -\nCTR OH 2 [O] [H] -\n", &molecule, &mut matrix);
    let atoms: usize = fragments.iter().map(Fragment::atom_count).sum();
    assert_eq!(atoms, molecule.len());
    let mut parents: Vec<usize> = fragments
        .iter()
        .flat_map(|fragment| fragment.parent_atoms.iter().copied())
        .collect();
    parents.sort_unstable();
    assert_eq!(parents, (0..molecule.len()).collect::<Vec<_>>());
}

#[test]
fn fragment_equality_is_reflexive_and_symmetric() {
    let mut matrix = CompatibilityMatrix::new();
    let fragments = fragments_of("CTR CC 1 [C] [C] -\nCTR OH 2 [O] [H] -\n", &ethanol(), &mut matrix);
    let comparator = FragmentComparator::new(&CanonicalLabeler);
    for a in &fragments {
        assert!(comparator.same_frag_of(a, a).unwrap());
        for b in &fragments {
            assert_eq!(
                comparator.same_frag_of(a, b).unwrap(),
                comparator.same_frag_of(b, a).unwrap()
            );
        }
    }
}

#[test]
fn fragment_equality_ignores_atom_order() {
    let mut rng = rand::thread_rng();
    let mut matrix = CompatibilityMatrix::new();
    let fragments = fragments_of("CTR CC 1 [C] [C] -\n", &ethanol(), &mut matrix);
    let comparator = FragmentComparator::new(&CanonicalLabeler);
    for fragment in &fragments {
        for _ in 0..10 {
            let shuffled = relabeled(fragment, &mut rng);
            assert!(comparator.same_frag_of(fragment, &shuffled).unwrap());
        }
    }
}

#[test]
fn cheap_checks_run_before_the_identifier() {
    let mut matrix = CompatibilityMatrix::new();
    let fragments = fragments_of("CTR CC 1 [C] [C] -\nCTR OH 2 [O] [H] -\n", &ethanol(), &mut matrix);
    let counting = Counting(AtomicUsize::new(0));
    let comparator = FragmentComparator::new(&counting);
    let hydrogen = fragments.iter().find(|fragment| fragment.atom_count() == 1).unwrap();
    let methyl = fragments.iter().find(|fragment| fragment.atom_count() == 4).unwrap();
    assert!(!comparator.same_frag_of(hydrogen, methyl).unwrap());
    assert_eq!(counting.0.load(Ordering::SeqCst), 0);
}

#[test]
fn descriptors_survive_an_sdf_round_trip() {
    let mut matrix = CompatibilityMatrix::new();
    let fragments = fragments_of("CTR CC 1 [C] [C] -\nCTR OH 2 [O] [H] -\n", &ethanol(), &mut matrix);
    let mut buffer = Vec::new();
    write_fragments(&mut buffer, &fragments).unwrap();
    let restored = read_fragments(buffer.as_slice()).unwrap();
    assert_eq!(restored.len(), fragments.len());
    for (before, after) in fragments.iter().zip(&restored) {
        assert_eq!(before.class_descriptor(), after.class_descriptor());
        assert_eq!(before.attachment_points_descriptor(), after.attachment_points_descriptor());
        assert_eq!(before.directions_descriptor(), after.directions_descriptor());
        assert_eq!(before.atom_count(), after.atom_count());
        assert_eq!(before.bond_count(), after.bond_count());
    }
}

#[test]
fn matrix_file_round_trip() {
    let fragmenter = Fragmenter::new(RuleRegistry::parse("CTR CC 1 [C] [C] -\nCTR OH 2 [O] [H] -\n").unwrap());
    let mut run = fragmenter.run(&[ethanol()]).unwrap();
    run.matrix.set_capping("OH:1", "H");
    let path = std::env::temp_dir().join(format!("fragmentation-matrix-{}.txt", std::process::id()));
    run.matrix.write_to(&path).unwrap();
    let restored = CompatibilityMatrix::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(restored, run.matrix);
    assert_eq!(restored.capping("OH:1"), Some("H"));
    assert_eq!(restored.bond_order("CC"), Some(BondOrder::Single));
}
