mod elements;

pub use elements::{ElementProperties, ATOMIC_NUMBERS, ELEMENTS, SYNTHETIC_ELEMENT_POOL};

// This speeds up by checking only within a certain range
pub const BOND_SEARCH_THRESHOLD: f64 = 3.2;
// Scales the sum of covalent radii when deciding whether two atoms are bonded
pub const BOND_TOLERANCE: f64 = 1.15;

/// Atomic number used for placeholder atoms: attachment-point stand-ins and hapticity link atoms.
pub const DUMMY_ATOMIC_NUMBER: u8 = 0;

/// Distance in Angstrom under which two hapticity link atoms are considered the same.
pub const LINK_ATOM_TOLERANCE: f64 = 0.01;

/// Default budget of backtracking steps a single pattern query may spend on one molecule.
pub const MATCH_STEP_LIMIT: usize = 2_000_000;

/// Largest ring size the ring query service explores by default.
pub const RING_SEARCH_LIMIT: usize = 12;

/// Cap on the number of pattern simplification levels tried on ambiguous matches.
pub const MAX_SIMPLIFICATION_LEVELS: usize = 8;
