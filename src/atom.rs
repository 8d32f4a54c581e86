use crate::bond::BondTarget;
use crate::consts::{ElementProperties, DUMMY_ATOMIC_NUMBER};
use crate::error::XyzError;
use crate::vector::Vector;

/// Builder-style description of a single atom, consumed by [`crate::molecule::Molecule3D`].
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Atom {
    pub atomic_number: u8,
    pub charge: i8,
    pub position_vector: Option<Vector>,
    pub bonds: Vec<BondTarget>,
}

impl Atom {
    pub fn new(atomic_number: u8) -> Atom {
        Atom {
            atomic_number,
            ..Default::default()
        }
    }

    /// Placeholder atom, used for attachment points and hapticity link atoms.
    pub fn dummy() -> Atom {
        Atom::new(DUMMY_ATOMIC_NUMBER)
    }

    pub fn with_position(mut self, position: (f64, f64, f64)) -> Self {
        self.position_vector = Some(Vector::new(position.0, position.1, position.2));
        self
    }

    pub fn with_position_vector(mut self, position: Vector) -> Self {
        self.position_vector = Some(position);
        self
    }

    pub fn with_charge(mut self, charge: i8) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_bonds(mut self, bonds: Vec<BondTarget>) -> Self {
        self.bonds = bonds;
        self
    }

    /// Parses one `<symbol> <x> <y> <z>` line of an XYZ file.
    ///
    /// ```
    /// use fragmentation::prelude::*;
    /// let atom = Atom::from_xyz_line("Cl 0.0 1.5 -2.0").unwrap();
    /// assert_eq!(atom.atomic_number, 17);
    /// assert_eq!(atom.position_vector, Some(Vector::new(0.0, 1.5, -2.0)));
    /// ```
    pub fn from_xyz_line(line: &str) -> Result<Atom, XyzError> {
        let invalid = || XyzError::InvalidLine {
            line_number: 0,
            line: line.to_string(),
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 4 {
            return Err(invalid());
        }
        let atomic_number = parts[0]
            .atomic_number()
            .ok_or_else(|| XyzError::UnknownElement(parts[0].to_string()))?;
        let mut coordinates = [0.0; 3];
        for (coordinate, part) in coordinates.iter_mut().zip(&parts[1..]) {
            *coordinate = part.parse::<f64>().map_err(|_| invalid())?;
        }
        Ok(Atom::new(atomic_number).with_position_vector(Vector::from(coordinates)))
    }

    pub fn atomic_symbol(&self) -> Option<&'static str> {
        self.atomic_number.atomic_symbol()
    }

    pub fn is_dummy(&self) -> bool {
        self.atomic_number == DUMMY_ATOMIC_NUMBER
    }

    /// Distance between two atoms, zero when either has no position.
    ///
    /// ```
    /// use fragmentation::prelude::*;
    /// let atom1 = Atom::new(6).with_position((0.0,0.0,0.0));
    /// let atom2 = Atom::new(6).with_position((1.0,0.0,0.0));
    /// assert_eq!(atom1.distance(&atom2),1.0);
    /// ```
    pub fn distance(&self, other: &Atom) -> f64 {
        let (Some(position), Some(other_position)) = (self.position_vector, other.position_vector)
        else {
            return 0.0;
        };
        position.distance(&other_position)
    }
}
