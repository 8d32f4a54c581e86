//! Deciding whether two fragments are the same chemical entity, and the deduplicating
//! fragment library built on that decision.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;
use log::{debug, warn};

use crate::canonical::CanonicalIdentifier;
use crate::consts::{DUMMY_ATOMIC_NUMBER, SYNTHETIC_ELEMENT_POOL};
use crate::error::{FragmenterError, IdentifierError};
use crate::fragment::Fragment;
use crate::molecule::{Molecule, Molecule3D};
use crate::ordering::atom_priority;

/// What to conclude when the canonical identifier fails on either fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierFailurePolicy {
    /// Treat the pair as equivalent and warn. Distinct fragments may end up merged.
    #[default]
    AssumeEquivalent,
    /// Treat the pair as distinct and warn. The library may hold duplicates.
    AssumeDistinct,
}

pub struct FragmentComparator<'a, I: CanonicalIdentifier + ?Sized> {
    identifier: &'a I,
    policy: IdentifierFailurePolicy,
}

impl<'a, I: CanonicalIdentifier + ?Sized> FragmentComparator<'a, I> {
    pub fn new(identifier: &'a I) -> Self {
        FragmentComparator {
            identifier,
            policy: IdentifierFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: IdentifierFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// True when both fragments are the same entity with the same attachment classes.
    /// Cheap checks run first; the canonical identifier is only consulted when every one of
    /// them passes.
    ///
    /// ```
    /// use fragmentation::equivalence::FragmentComparator;
    /// use fragmentation::prelude::*;
    /// let molecule = Molecule3D::from_xyz_str("O 0 0 0\nH 0.96 0 0.1\n").unwrap();
    /// let ap = AttachmentPoint::new(0, AttachmentPointClass::new("OH", 0), BondOrder::Single, Vector::new(-1.0, 0.0, 0.0));
    /// let hydroxyl = Fragment::new(molecule, vec![ap], vec![0, 1]);
    /// let comparator = FragmentComparator::new(&CanonicalLabeler);
    /// assert!(comparator.same_frag_of(&hydroxyl, &hydroxyl.clone()).unwrap());
    /// ```
    pub fn same_frag_of(&self, a: &Fragment, b: &Fragment) -> Result<bool, FragmenterError> {
        if a.attachment_points.is_empty() || b.attachment_points.is_empty() {
            return Err(FragmenterError::NoAttachmentPoints);
        }
        if a.atom_count() != b.atom_count() || a.bond_count() != b.bond_count() {
            return Ok(false);
        }

        let pairs: Vec<(usize, usize)> = a
            .attachment_points
            .iter()
            .enumerate()
            .cartesian_product(b.attachment_points.iter().enumerate())
            .filter(|((_, ap_a), (_, ap_b))| ap_a.class == ap_b.class)
            .map(|((index_a, _), (index_b, _))| (index_a, index_b))
            .collect();
        let covered_a: BTreeSet<usize> = pairs.iter().map(|&(index, _)| index).collect();
        let covered_b: BTreeSet<usize> = pairs.iter().map(|&(_, index)| index).collect();
        if covered_a.len() != a.attachment_points.len()
            || covered_b.len() != b.attachment_points.len()
            || a.sorted_classes() != b.sorted_classes()
        {
            return Ok(false);
        }

        if let &[(ap_a, ap_b)] = pairs.as_slice() {
            if !walks_agree(a, ap_a, b, ap_b) {
                return Ok(false);
            }
        }

        self.confirm(a, b)
    }

    /// Compares canonical identifiers of both placeholder graphs, attachment classes and link
    /// atoms encoded as synthetic elements.
    fn confirm(&self, a: &Fragment, b: &Fragment) -> Result<bool, FragmenterError> {
        let elements = SyntheticElements::assign(a, b)?;
        let identify = |fragment: &Fragment| self.identifier.identify(&elements.substitute(fragment));
        match (identify(a), identify(b)) {
            (Ok(id_a), Ok(id_b)) => Ok(id_a == id_b),
            (Err(error), _) | (_, Err(error)) => Ok(self.on_failure(a, b, &error)),
        }
    }

    fn on_failure(&self, a: &Fragment, b: &Fragment, error: &IdentifierError) -> bool {
        let equivalent = self.policy == IdentifierFailurePolicy::AssumeEquivalent;
        warn!(
            "canonical identifier failed comparing '{}' and '{}' ({error}), assuming {}",
            a.molecule.title,
            b.molecule.title,
            if equivalent { "equivalent" } else { "distinct" }
        );
        equivalent
    }
}

/// Walks both fragments from their single matched attachment point and compares the
/// priorities met on the way. Walks with unresolved sibling ties are inconclusive and agree.
fn walks_agree(a: &Fragment, ap_a: usize, b: &Fragment, ap_b: usize) -> bool {
    let (Some(walk_a), Some(walk_b)) = (a.canonical_walk(ap_a), b.canonical_walk(ap_b)) else {
        return false;
    };
    if walk_a.order.len() != walk_b.order.len() {
        return false;
    }
    // tied siblings are ordered by atom index, so the order says nothing across relabelings
    if !walk_a.is_unambiguous() || !walk_b.is_unambiguous() {
        debug!(
            "canonical walks of '{}' and '{}' hold ties, leaving the decision to the identifier",
            a.molecule.title, b.molecule.title
        );
        return true;
    }
    let (graph_a, graph_b) = (a.placeholder_graph(), b.placeholder_graph());
    let agree = walk_a
        .order
        .iter()
        .zip(&walk_b.order)
        .all(|(&atom_a, &atom_b)| atom_priority(&graph_a, atom_a) == atom_priority(&graph_b, atom_b));
    if !agree {
        debug!("canonical walks of '{}' and '{}' disagree", a.molecule.title, b.molecule.title);
    }
    agree
}

/// Rare elements standing in for link atoms and attachment classes, none of them present
/// in either fragment.
struct SyntheticElements {
    link: u8,
    classes: BTreeMap<String, u8>,
}

impl SyntheticElements {
    fn assign(a: &Fragment, b: &Fragment) -> Result<SyntheticElements, FragmenterError> {
        let present: BTreeSet<u8> = a
            .molecule
            .atomic_numbers()
            .iter()
            .chain(b.molecule.atomic_numbers())
            .copied()
            .collect();
        let classes: BTreeSet<String> = a
            .attachment_points
            .iter()
            .chain(&b.attachment_points)
            .map(|ap| ap.class.to_string())
            .collect();
        let free: Vec<u8> = SYNTHETIC_ELEMENT_POOL
            .iter()
            .copied()
            .filter(|element| !present.contains(element))
            .collect();
        let needed = classes.len() + 1;
        if needed > free.len() {
            return Err(FragmenterError::SyntheticElementPoolExhausted {
                needed,
                available: free.len(),
            });
        }
        Ok(SyntheticElements {
            link: free[0],
            classes: classes.into_iter().zip(free[1..].iter().copied()).collect(),
        })
    }

    fn substitute(&self, fragment: &Fragment) -> Molecule3D {
        let mut graph = fragment.placeholder_graph();
        for atomic_number in graph.atomic_numbers.iter_mut().take(fragment.atom_count()) {
            if *atomic_number == DUMMY_ATOMIC_NUMBER {
                *atomic_number = self.link;
            }
        }
        for (index, ap) in fragment.attachment_points.iter().enumerate() {
            if let Some(&element) = self.classes.get(&ap.class.to_string()) {
                graph.atomic_numbers[fragment.placeholder_index(index)] = element;
            }
        }
        graph
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryEntry {
    New(usize),
    Duplicate(usize),
}

impl LibraryEntry {
    pub fn index(&self) -> usize {
        match self {
            LibraryEntry::New(index) | LibraryEntry::Duplicate(index) => *index,
        }
    }
}

/// Unique fragments with the number of times each was seen.
#[derive(Debug, Clone, Default)]
pub struct FragmentLibrary {
    fragments: Vec<Fragment>,
    occurrences: Vec<usize>,
    // (formula, bond count, sorted classes) -> fragment indices
    buckets: HashMap<(String, usize, String), Vec<usize>>,
}

impl FragmentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `fragment` unless an equivalent fragment is already stored, in which case that
    /// fragment's count grows. The first equivalent fragment in insertion order wins.
    pub fn insert<I: CanonicalIdentifier + ?Sized>(
        &mut self,
        fragment: Fragment,
        comparator: &FragmentComparator<I>,
    ) -> Result<LibraryEntry, FragmenterError> {
        let key = (
            fragment.formula().to_string(),
            fragment.bond_count(),
            fragment.sorted_classes().iter().join(" "),
        );
        let bucket = self.buckets.entry(key).or_default();
        for &index in bucket.iter() {
            if comparator.same_frag_of(&self.fragments[index], &fragment)? {
                self.occurrences[index] += 1;
                return Ok(LibraryEntry::Duplicate(index));
            }
        }
        let index = self.fragments.len();
        bucket.push(index);
        self.fragments.push(fragment);
        self.occurrences.push(1);
        Ok(LibraryEntry::New(index))
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn occurrences(&self, index: usize) -> usize {
        self.occurrences.get(index).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fragment, usize)> {
        self.fragments.iter().zip(self.occurrences.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
