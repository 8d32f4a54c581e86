//! Fragments and their attachment points, including the descriptor strings that persist
//! attachment points alongside a stored fragment.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::atom::Atom;
use crate::bond::BondOrder;
use crate::error::DescriptorError;
use crate::molecular_formula::MolecularFormula;
use crate::molecule::{Molecule, Molecule3D};
use crate::ordering::{canonical_walk, CanonicalWalk};
use crate::rules::AttachmentPointClass;
use crate::vector::Vector;

/// A severed bond, recorded on the atom that kept it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPoint {
    pub host: usize,
    pub class: AttachmentPointClass,
    pub bond_order: BondOrder,
    /// Points from the host towards the former partner atom.
    pub direction: Vector,
}

impl AttachmentPoint {
    pub fn new(host: usize, class: AttachmentPointClass, bond_order: BondOrder, direction: Vector) -> Self {
        AttachmentPoint {
            host,
            class,
            bond_order,
            direction,
        }
    }
}

/// A connected piece of a cut molecule.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub molecule: Molecule3D,
    pub attachment_points: Vec<AttachmentPoint>,
    /// Index of every fragment atom in the molecule it was cut from.
    pub parent_atoms: Vec<usize>,
    walks: Vec<OnceLock<Option<CanonicalWalk>>>,
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.molecule == other.molecule
            && self.attachment_points == other.attachment_points
            && self.parent_atoms == other.parent_atoms
    }
}

impl Fragment {
    pub fn new(molecule: Molecule3D, attachment_points: Vec<AttachmentPoint>, parent_atoms: Vec<usize>) -> Self {
        let walks = attachment_points.iter().map(|_| OnceLock::new()).collect();
        Fragment {
            molecule,
            attachment_points,
            parent_atoms,
            walks,
        }
    }

    /// Atoms of the fragment, hapticity link atoms included.
    pub fn atom_count(&self) -> usize {
        self.molecule.len()
    }

    pub fn bond_count(&self) -> usize {
        self.molecule.number_of_bonds()
    }

    pub fn formula(&self) -> MolecularFormula {
        self.molecule.molecular_formula()
    }

    pub fn sorted_classes(&self) -> Vec<AttachmentPointClass> {
        let mut classes: Vec<AttachmentPointClass> = self
            .attachment_points
            .iter()
            .map(|ap| ap.class.clone())
            .collect();
        classes.sort();
        classes
    }

    /// Index of the placeholder atom standing in for an attachment point in
    /// [`Fragment::placeholder_graph`].
    pub fn placeholder_index(&self, attachment_point: usize) -> usize {
        self.molecule.len() + attachment_point
    }

    /// The fragment with every attachment point materialized as a dummy atom at the tip of
    /// its direction vector, bonded to its host with the attachment point's bond order.
    pub fn placeholder_graph(&self) -> Molecule3D {
        let mut graph = self.molecule.clone();
        for ap in &self.attachment_points {
            let tip = graph.position(ap.host) + ap.direction;
            let placeholder = graph.add_atom(Atom::dummy().with_position_vector(tip));
            graph.add_bond(ap.host, placeholder, ap.bond_order);
        }
        graph
    }

    /// Deterministic atom order rooted at an attachment point, computed once per point.
    pub fn canonical_walk(&self, attachment_point: usize) -> Option<&CanonicalWalk> {
        self.walks
            .get(attachment_point)?
            .get_or_init(|| canonical_walk(self, attachment_point))
            .as_ref()
    }

    /// Attachment points grouped by host in ascending host order, each group in creation order.
    fn by_host(&self) -> BTreeMap<usize, Vec<&AttachmentPoint>> {
        let mut hosts: BTreeMap<usize, Vec<&AttachmentPoint>> = BTreeMap::new();
        for ap in &self.attachment_points {
            hosts.entry(ap.host).or_default().push(ap);
        }
        hosts
    }

    fn descriptor<F>(&self, separator: char, entry: F) -> String
    where
        F: Fn(&AttachmentPoint) -> String,
    {
        self.by_host()
            .into_iter()
            .map(|(host, aps)| {
                let entries: Vec<String> = aps.into_iter().map(&entry).collect();
                format!("{}{separator}{}", host + 1, entries.join(","))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `CLASS` descriptor: `<host>#<rule>:<subclass>:<order>[,...]` per host, hosts 1-based.
    ///
    /// ```
    /// use fragmentation::prelude::*;
    /// let molecule = Molecule3D::from_xyz_str("C 0 0 0\nO 1.43 0 0.1\n").unwrap();
    /// let ap = AttachmentPoint::new(1, AttachmentPointClass::new("C1", 1), BondOrder::Single, Vector::new(-1.0, 0.0, 0.0));
    /// let fragment = Fragment::new(molecule, vec![ap], vec![0, 1]);
    /// assert_eq!(fragment.class_descriptor(), "2#C1:1:1");
    /// assert_eq!(fragment.attachment_points_descriptor(), "2:1");
    /// ```
    pub fn class_descriptor(&self) -> String {
        self.descriptor('#', |ap| format!("{}:{}", ap.class, ap.bond_order.code()))
    }

    /// `ATTACHMENT_POINTS` descriptor: `<host>:<order>[,<order>...]` per host.
    pub fn attachment_points_descriptor(&self) -> String {
        self.descriptor(':', |ap| ap.bond_order.code().to_string())
    }

    /// `AP_DIRECTIONS` descriptor: `<host>#x;y;z[,...]` with the tip coordinates.
    pub fn directions_descriptor(&self) -> String {
        self.descriptor('#', |ap| {
            let tip = self.molecule.position(ap.host) + ap.direction;
            format!("{:.4};{:.4};{:.4}", tip.x, tip.y, tip.z)
        })
    }

    /// Restores a stored fragment from its descriptors. The `ATTACHMENT_POINTS` descriptor,
    /// when present, has to agree with the orders in `CLASS`; without `AP_DIRECTIONS` the
    /// directions are zero.
    pub fn from_descriptors(
        molecule: Molecule3D,
        class: &str,
        attachment_points: Option<&str>,
        directions: Option<&str>,
    ) -> Result<Fragment, DescriptorError> {
        let atom_count = molecule.len();
        let mut aps = Vec::new();
        for (host, entries) in split_entries(class, '#', atom_count)? {
            for entry in entries.split(',') {
                let mut parts = entry.rsplitn(3, ':');
                let (Some(order), Some(subclass), Some(rule)) = (parts.next(), parts.next(), parts.next()) else {
                    return Err(DescriptorError::InvalidClass(entry.to_string()));
                };
                let bond_order = parse_order(order)?;
                let class = format!("{rule}:{subclass}")
                    .parse::<AttachmentPointClass>()
                    .map_err(DescriptorError::InvalidClass)?
                    .with_bond_order(bond_order);
                aps.push(AttachmentPoint::new(host, class, bond_order, Vector::default()));
            }
        }

        if let Some(descriptor) = attachment_points {
            let mut orders = Vec::new();
            for (host, entries) in split_entries(descriptor, ':', atom_count)? {
                for order in entries.split(',') {
                    orders.push((host, parse_order(order)?));
                }
            }
            let expected: Vec<(usize, BondOrder)> = aps.iter().map(|ap| (ap.host, ap.bond_order)).collect();
            if orders != expected {
                return Err(DescriptorError::Mismatch(format!(
                    "CLASS '{class}' against ATTACHMENT_POINTS '{descriptor}'"
                )));
            }
        }

        if let Some(descriptor) = directions {
            let mut tips = Vec::new();
            for (host, entries) in split_entries(descriptor, '#', atom_count)? {
                for entry in entries.split(',') {
                    let coordinates = entry
                        .split(';')
                        .map(|value| value.parse::<f64>())
                        .collect::<Result<Vec<f64>, _>>()
                        .map_err(|_| DescriptorError::MalformedEntry(entry.to_string()))?;
                    let &[x, y, z] = coordinates.as_slice() else {
                        return Err(DescriptorError::MalformedEntry(entry.to_string()));
                    };
                    tips.push((host, Vector::new(x, y, z)));
                }
            }
            if tips.len() != aps.len() || tips.iter().zip(&aps).any(|((host, _), ap)| *host != ap.host) {
                return Err(DescriptorError::Mismatch(format!(
                    "CLASS '{class}' against AP_DIRECTIONS '{descriptor}'"
                )));
            }
            for ((host, tip), ap) in tips.into_iter().zip(aps.iter_mut()) {
                ap.direction = tip - molecule.position(host);
            }
        }

        let parent_atoms = (0..atom_count).collect();
        Ok(Fragment::new(molecule, aps, parent_atoms))
    }
}

/// Splits `<host><separator><rest>` entries, converting hosts to 0-based indices.
fn split_entries(descriptor: &str, separator: char, atom_count: usize) -> Result<Vec<(usize, &str)>, DescriptorError> {
    descriptor
        .split_whitespace()
        .map(|entry| {
            let (host, rest) = entry
                .split_once(separator)
                .ok_or_else(|| DescriptorError::MalformedEntry(entry.to_string()))?;
            let host = host
                .parse::<usize>()
                .ok()
                .filter(|&host| host > 0)
                .ok_or_else(|| DescriptorError::InvalidHost(host.to_string()))?;
            if host > atom_count {
                return Err(DescriptorError::HostOutOfRange {
                    host,
                    atoms: atom_count,
                });
            }
            if rest.is_empty() {
                return Err(DescriptorError::MalformedEntry(entry.to_string()));
            }
            Ok((host - 1, rest))
        })
        .collect()
}

fn parse_order(code: &str) -> Result<BondOrder, DescriptorError> {
    code.parse::<u8>()
        .ok()
        .and_then(BondOrder::from_code)
        .ok_or_else(|| DescriptorError::InvalidBondOrder(code.to_string()))
}
