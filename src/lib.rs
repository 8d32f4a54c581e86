pub mod atom;
pub mod bond;
pub mod canonical;
pub mod compatibility;
pub mod consts;
pub mod cutter;
pub mod equivalence;
pub mod error;
pub mod fragment;
pub mod fragmenter;
pub mod hapticity;
pub mod isolator;
pub mod matching;
pub mod molecular_formula;
pub mod molecule;
pub mod ordering;
pub mod resolver;
pub mod rings;
pub mod rules;
pub mod sdf;
pub mod smarts;
pub mod vector;
pub mod prelude;
