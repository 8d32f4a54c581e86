use core::fmt::{Display, Formatter};

/// One entry of an atom's adjacency list.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct BondTarget {
    pub target: usize,
    pub bond_order: BondOrder,
}

impl BondTarget {
    pub fn new(target: usize, bond_order: BondOrder) -> BondTarget {
        BondTarget { target, bond_order }
    }
    pub fn single(target: usize) -> BondTarget {
        BondTarget::new(target, BondOrder::Single)
    }
    pub fn bond_order(&self) -> BondOrder {
        self.bond_order
    }
    pub fn target(&self) -> usize {
        self.target
    }
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Parses the bond type column of a V2000 bond block.
    pub fn from_sdf_str(slice: &str) -> Option<BondOrder> {
        match slice.trim() {
            "1" => Some(BondOrder::Single),
            "2" => Some(BondOrder::Double),
            "3" => Some(BondOrder::Triple),
            "4" => Some(BondOrder::Aromatic),
            _ => None,
        }
    }

    /// Numeric code shared by the V2000 bond block and the attachment descriptors.
    pub fn code(&self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Aromatic => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<BondOrder> {
        match code {
            1 => Some(BondOrder::Single),
            2 => Some(BondOrder::Double),
            3 => Some(BondOrder::Triple),
            4 => Some(BondOrder::Aromatic),
            _ => None,
        }
    }

    /// Contribution to the valence sum of an atom.
    pub fn valence(&self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
}

impl Display for BondOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BondOrder::Single => write!(f, "-"),
            BondOrder::Double => write!(f, "="),
            BondOrder::Triple => write!(f, "#"),
            BondOrder::Aromatic => write!(f, ":"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
    pub bond_order: BondOrder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdf_codes() {
        for code in 1..=4 {
            let order = BondOrder::from_code(code).unwrap();
            assert_eq!(order.code(), code);
            assert_eq!(BondOrder::from_sdf_str(&format!(" {code}")), Some(order));
        }
        assert_eq!(BondOrder::from_sdf_str("8"), None);
    }
}
