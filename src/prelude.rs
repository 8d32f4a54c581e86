pub use crate::{
    atom::Atom,
    bond::{BondOrder, BondTarget},
    canonical::{CanonicalIdentifier, CanonicalLabeler},
    compatibility::CompatibilityMatrix,
    equivalence::{FragmentComparator, FragmentLibrary, IdentifierFailurePolicy, LibraryEntry},
    error::{FragmenterError, Rejection, RejectionReason},
    fragment::{AttachmentPoint, Fragment},
    fragmenter::{FragmentationRun, Fragmenter, FragmenterSettings, RunSummary},
    matching::{PatternMatcher, PatternQuery, SmartsMatcher},
    molecule::{Molecule, Molecule3D},
    rings::{RingFinder, RingQuery},
    rules::{AttachmentPointClass, CuttingRule, RuleRegistry},
    vector::Vector,
};
