use crate::atom::Atom;
use crate::bond::{BondOrder, BondTarget};
use crate::consts::{ElementProperties, BOND_SEARCH_THRESHOLD, BOND_TOLERANCE};
use crate::error::XyzError;
use crate::molecular_formula::MolecularFormula;
use crate::vector::Vector;
use kiddo::{KdTree, SquaredEuclidean};
use nohash_hasher::IntMap;
use petgraph::prelude::*;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Graph view shared by molecules, fragments and the placeholder-augmented fragment graphs.
pub trait Molecule {
    fn atomic_numbers(&self) -> &[u8];
    fn atom_bonds(&self) -> &[Vec<BondTarget>];

    fn len(&self) -> usize {
        self.atomic_numbers().len()
    }
    fn is_empty(&self) -> bool {
        self.atomic_numbers().is_empty()
    }
    fn get_atomic_number(&self, atom_index: usize) -> u8 {
        self.atomic_numbers()[atom_index]
    }
    fn get_atom_bonds(&self, atom_index: usize) -> Option<&[BondTarget]> {
        self.atom_bonds().get(atom_index).map(|bonds| bonds.as_slice())
    }
    fn neighbors(&self, atom_index: usize) -> impl Iterator<Item = usize> + '_ {
        self.get_atom_bonds(atom_index)
            .unwrap_or_default()
            .iter()
            .map(|bond| bond.target())
    }
    fn degree(&self, atom_index: usize) -> usize {
        self.get_atom_bonds(atom_index).map_or(0, |bonds| bonds.len())
    }
    fn bond_order_between(&self, atom1: usize, atom2: usize) -> Option<BondOrder> {
        self.get_atom_bonds(atom1)?
            .iter()
            .find(|bond| bond.target() == atom2)
            .map(|bond| bond.bond_order())
    }
    fn has_bond(&self, atom1: usize, atom2: usize) -> bool {
        self.bond_order_between(atom1, atom2).is_some()
    }
    /// Aromaticity is read from the input bond orders, no perception takes place.
    fn is_aromatic(&self, atom_index: usize) -> bool {
        self.get_atom_bonds(atom_index)
            .unwrap_or_default()
            .iter()
            .any(|bond| bond.bond_order() == BondOrder::Aromatic)
    }
    fn number_of_bonds(&self) -> usize {
        self.atom_bonds().iter().map(|bonds| bonds.len()).sum::<usize>() / 2
    }

    fn get_edges(&self) -> Vec<(usize, usize)> {
        self.get_edges_with_order()
            .into_iter()
            .map(|(atom1, atom2, _)| (atom1, atom2))
            .collect()
    }
    fn get_edges_with_order(&self) -> Vec<(usize, usize, BondOrder)> {
        self.atom_bonds()
            .iter()
            .enumerate()
            .flat_map(|(atom_index, bonds)| {
                bonds.iter().filter_map(move |bond| {
                    (atom_index < bond.target()).then_some((
                        atom_index,
                        bond.target(),
                        bond.bond_order(),
                    ))
                })
            })
            .collect()
    }

    /// Node weights are atomic numbers, edge weights bond orders. Node `i` is atom `i`.
    fn to_ungraph(&self) -> UnGraph<u8, BondOrder> {
        let mut graph = UnGraph::<u8, BondOrder>::default();
        for &atomic_number in self.atomic_numbers() {
            graph.add_node(atomic_number);
        }
        for (atom1, atom2, order) in self.get_edges_with_order() {
            graph.add_edge(NodeIndex::new(atom1), NodeIndex::new(atom2), order);
        }
        graph
    }

    fn get_components(&self) -> Vec<Vec<usize>> {
        let mut connected_components = vec![];
        let mut visited_atoms = vec![false; self.len()];
        let mut stack = Vec::with_capacity(self.len());
        while let Some(index) = visited_atoms.iter().position(|&a| !a) {
            let mut component = self.traverse_component(&mut stack, index, &mut visited_atoms);
            component.sort();
            connected_components.push(component);
            stack.clear();
        }
        connected_components
    }

    fn traverse_component(
        &self,
        stack: &mut Vec<usize>,
        start: usize,
        visited_atoms: &mut [bool],
    ) -> Vec<usize> {
        let mut current_component = Vec::new();
        stack.push(start);
        visited_atoms[start] = true;

        while let Some(index) = stack.pop() {
            current_component.push(index);
            for target in self.neighbors(index) {
                if !visited_atoms[target] {
                    stack.push(target);
                    visited_atoms[target] = true;
                }
            }
        }

        current_component
    }

    fn molecular_formula(&self) -> MolecularFormula {
        MolecularFormula::from_atomic_numbers(self.atomic_numbers())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Molecule3D {
    pub title: String,
    pub atomic_numbers: Vec<u8>,
    pub charges: Vec<i8>,
    pub positions: Vec<Vector>,
    /// Named properties carried through SDF data fields.
    pub data_fields: BTreeMap<String, String>,
    atom_bonds: Vec<Vec<BondTarget>>,
}

impl Molecule for Molecule3D {
    fn atomic_numbers(&self) -> &[u8] {
        &self.atomic_numbers
    }
    fn atom_bonds(&self) -> &[Vec<BondTarget>] {
        &self.atom_bonds
    }
}

impl Molecule3D {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builds a molecule from atoms. Bonds listed on the atoms are kept (and mirrored onto
    /// their targets); when no atom lists any bond, bonds are perceived from the coordinates.
    ///
    /// ```
    /// use fragmentation::prelude::*;
    /// let atom1 = Atom::new(6).with_position((0.0, 0.0, 0.0));
    /// let atom2 = Atom::new(8).with_position((1.43, 0.0, 0.0));
    /// let molecule = Molecule3D::from_atoms(vec![atom1, atom2]);
    /// assert!(molecule.has_bond(0, 1));
    /// ```
    pub fn from_atoms(atoms: Vec<Atom>) -> Self {
        let perceive = atoms.iter().all(|atom| atom.bonds.is_empty());
        let mut molecule = Molecule3D::new();
        let mut bonds = Vec::new();
        for atom in atoms {
            let index = molecule.len();
            bonds.extend(atom.bonds.iter().map(|bond| (index, *bond)));
            molecule.add_atom(Atom {
                bonds: Vec::new(),
                ..atom
            });
        }
        if perceive {
            molecule.identify_bonds(BOND_SEARCH_THRESHOLD);
        } else {
            for (index, bond) in bonds {
                molecule.add_bond(index, bond.target(), bond.bond_order());
            }
        }
        molecule
    }

    /// Appends an atom without bonds and returns its index.
    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atomic_numbers.push(atom.atomic_number);
        self.charges.push(atom.charge);
        self.positions.push(atom.position_vector.unwrap_or_default());
        self.atom_bonds.push(Vec::new());
        self.atomic_numbers.len() - 1
    }

    /// Adds an undirected bond. Returns false for self bonds, unknown atoms or existing bonds.
    pub fn add_bond(&mut self, atom1: usize, atom2: usize, bond_order: BondOrder) -> bool {
        if atom1 == atom2 || atom1 >= self.len() || atom2 >= self.len() || self.has_bond(atom1, atom2)
        {
            return false;
        }
        self.atom_bonds[atom1].push(BondTarget::new(atom2, bond_order));
        self.atom_bonds[atom2].push(BondTarget::new(atom1, bond_order));
        true
    }

    /// Removes the bond between two atoms, returning its order if it existed.
    pub fn remove_bond(&mut self, atom1: usize, atom2: usize) -> Option<BondOrder> {
        let order = self.bond_order_between(atom1, atom2)?;
        self.atom_bonds[atom1].retain(|bond| bond.target() != atom2);
        self.atom_bonds[atom2].retain(|bond| bond.target() != atom1);
        Some(order)
    }

    pub fn position(&self, atom_index: usize) -> Vector {
        self.positions.get(atom_index).copied().unwrap_or_default()
    }

    pub fn charge(&self, atom_index: usize) -> i8 {
        self.charges.get(atom_index).copied().unwrap_or_default()
    }

    /// A structure counts as flat when it has more than one atom and every z coordinate is zero.
    pub fn is_three_dimensional(&self) -> bool {
        self.len() <= 1 || self.positions.iter().any(|position| position.z != 0.0)
    }

    /// Copies the atoms in `atoms` (in that order) and the bonds among them into a new molecule.
    pub fn subgraph(&self, atoms: &[usize]) -> Molecule3D {
        let new_indices: IntMap<usize, usize> = atoms
            .iter()
            .enumerate()
            .map(|(new_index, &old_index)| (old_index, new_index))
            .collect();
        let atom_bonds = atoms
            .iter()
            .map(|&old_index| {
                self.atom_bonds[old_index]
                    .iter()
                    .filter_map(|bond| {
                        new_indices
                            .get(&bond.target())
                            .map(|&target| BondTarget::new(target, bond.bond_order()))
                    })
                    .collect()
            })
            .collect();
        Molecule3D {
            title: self.title.clone(),
            atomic_numbers: atoms.iter().map(|&i| self.atomic_numbers[i]).collect(),
            charges: atoms.iter().map(|&i| self.charge(i)).collect(),
            positions: atoms.iter().map(|&i| self.position(i)).collect(),
            data_fields: BTreeMap::new(),
            atom_bonds,
        }
    }

    /// Reads an XYZ block; the first two lines (count and comment) are optional.
    pub fn from_xyz_str(content: &str) -> Result<Molecule3D, XyzError> {
        let mut lines = content.lines().enumerate().peekable();
        let mut title = String::new();
        if let Some((_, first)) = lines.peek() {
            if first.trim().parse::<usize>().is_ok() {
                lines.next();
                title = lines
                    .next()
                    .map(|(_, line)| line.trim().to_string())
                    .unwrap_or_default();
            }
        }
        let mut atoms = Vec::new();
        for (line_number, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let atom = Atom::from_xyz_line(line).map_err(|error| match error {
                XyzError::InvalidLine { line, .. } => XyzError::InvalidLine {
                    line_number: line_number + 1,
                    line,
                },
                other => other,
            })?;
            atoms.push(atom);
        }
        Ok(Molecule3D::from_atoms(atoms).with_title(title))
    }

    pub fn from_xyz<P: AsRef<Path>>(filepath: P) -> Result<Molecule3D, XyzError> {
        let content = std::fs::read_to_string(filepath)?;
        Molecule3D::from_xyz_str(&content)
    }

    pub fn build_tree(&self) -> KdTree<f64, 3> {
        let mut tree: KdTree<f64, 3> = KdTree::with_capacity(self.len().max(1));
        for (index, position_vector) in self.positions.iter().enumerate() {
            tree.add(&position_vector.as_array(), index as u64);
        }
        tree
    }

    /// Replaces all bonds with single bonds perceived from covalent radii.
    pub fn identify_bonds(&mut self, threshold: f64) {
        let threshold_squared = threshold.powi(2);
        let kdtree = self.build_tree();
        let bonds = self
            .positions
            .par_iter()
            .enumerate()
            .map(|(index, position)| {
                let mut bonds = kdtree
                    .within::<SquaredEuclidean>(&position.as_array(), threshold_squared)
                    .iter()
                    .filter_map(|neighbor| {
                        let neighbor_index = neighbor.item as usize;
                        (neighbor_index != index
                            && self.is_bonded(
                                index,
                                neighbor_index,
                                neighbor.distance,
                                BOND_TOLERANCE,
                            ))
                        .then(|| BondTarget::single(neighbor_index))
                    })
                    .collect::<Vec<BondTarget>>();
                bonds.sort_by_key(|bond| bond.target);
                bonds
            })
            .collect::<Vec<Vec<BondTarget>>>();
        self.atom_bonds = bonds;
    }

    /// Checks whether two atoms are bonded based on their covalent radii and squared distance
    fn is_bonded(&self, index1: usize, index2: usize, squared_distance: f64, tolerance: f64) -> bool {
        let (Some(radius1), Some(radius2)) = (
            self.atomic_numbers[index1].covalent_radius(),
            self.atomic_numbers[index2].covalent_radius(),
        ) else {
            return false;
        };
        squared_distance < ((radius1 + radius2) * tolerance).powi(2)
    }

    /// Returns a vector to the center of the Molecule
    ///
    /// ```
    /// use fragmentation::prelude::*;
    /// let atom1 = Atom::new(6).with_position((0.0, 0.0, 0.0));
    /// let atom2 = Atom::new(6).with_position((1.0, 0.0, 0.0));
    /// let atom3 = Atom::new(6).with_position((2.0, 0.0, 0.0));
    /// let molecule = Molecule3D::from_atoms(vec![atom1, atom2, atom3]);
    /// assert_eq!(molecule.center(), Vector::new(1.0, 0.0, 0.0));
    /// ```
    pub fn center(&self) -> Vector {
        Vector::centroid(&self.positions).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethanol() -> Molecule3D {
        let xyz = "9
ethanol
C   -0.0011   -0.0052    0.0057
C    1.5129    0.0008   -0.0012
O    2.0012    1.3419   -0.0096
H   -0.3940   -1.0244    0.0110
H   -0.3860    0.5067    0.8870
H   -0.3831    0.5123   -0.8771
H    1.8933   -0.5193   -0.8893
H    1.8855   -0.5264    0.8855
H    2.9613    1.3211   -0.0139
";
        Molecule3D::from_xyz_str(xyz).unwrap()
    }

    #[test]
    fn xyz_bonds_are_perceived() {
        let molecule = ethanol();
        assert_eq!(molecule.title, "ethanol");
        assert_eq!(molecule.len(), 9);
        assert_eq!(molecule.number_of_bonds(), 8);
        assert!(molecule.has_bond(0, 1));
        assert!(molecule.has_bond(1, 2));
        assert!(!molecule.has_bond(0, 2));
        assert!(molecule.is_three_dimensional());
    }

    #[test]
    fn xyz_reports_bad_lines() {
        let error = Molecule3D::from_xyz_str("C 0.0 0.0\n").unwrap_err();
        assert!(matches!(error, XyzError::InvalidLine { line_number: 1, .. }));
        let error = Molecule3D::from_xyz_str("Qq 0.0 0.0 0.0\n").unwrap_err();
        assert!(matches!(error, XyzError::UnknownElement(_)));
    }

    #[test]
    fn add_and_remove_bonds() {
        let mut molecule = Molecule3D::new();
        let carbon = molecule.add_atom(Atom::new(6));
        let oxygen = molecule.add_atom(Atom::new(8));
        assert!(molecule.add_bond(carbon, oxygen, BondOrder::Double));
        assert!(!molecule.add_bond(oxygen, carbon, BondOrder::Single));
        assert!(!molecule.add_bond(carbon, carbon, BondOrder::Single));
        assert_eq!(molecule.bond_order_between(oxygen, carbon), Some(BondOrder::Double));
        assert_eq!(molecule.remove_bond(oxygen, carbon), Some(BondOrder::Double));
        assert_eq!(molecule.remove_bond(oxygen, carbon), None);
        assert_eq!(molecule.number_of_bonds(), 0);
    }

    #[test]
    fn components_and_subgraphs() {
        let mut molecule = ethanol();
        molecule.remove_bond(1, 2);
        let components = molecule.get_components();
        assert_eq!(components.len(), 2);
        assert_eq!(components.iter().map(|c| c.len()).sum::<usize>(), 9);

        let hydroxyl = molecule.subgraph(&[2, 8]);
        assert_eq!(hydroxyl.atomic_numbers, vec![8, 1]);
        assert!(hydroxyl.has_bond(0, 1));
        assert_eq!(hydroxyl.position(0), molecule.position(2));
    }

    #[test]
    fn flat_structures_are_detected() {
        let flat = Molecule3D::from_atoms(vec![
            Atom::new(6).with_position((0.0, 0.0, 0.0)),
            Atom::new(8).with_position((1.4, 0.0, 0.0)),
        ]);
        assert!(!flat.is_three_dimensional());
        assert!(Molecule3D::from_atoms(vec![Atom::new(6)]).is_three_dimensional());
    }

    #[test]
    fn ungraph_keeps_indices_and_orders() {
        let molecule = ethanol();
        let graph = molecule.to_ungraph();
        assert_eq!(graph.node_count(), 9);
        assert_eq!(graph.edge_count(), 8);
        assert_eq!(graph[NodeIndex::new(2)], 8);
    }
}
