//! The fragmentation pipeline: resolve, cut, isolate, deduplicate.

use core::fmt::{self, Display, Formatter};
use std::collections::BTreeMap;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::canonical::{CanonicalIdentifier, CanonicalLabeler};
use crate::compatibility::CompatibilityMatrix;
use crate::consts::{LINK_ATOM_TOLERANCE, MATCH_STEP_LIMIT, MAX_SIMPLIFICATION_LEVELS, RING_SEARCH_LIMIT};
use crate::cutter::MoleculeCutter;
use crate::equivalence::{FragmentComparator, FragmentLibrary, IdentifierFailurePolicy};
use crate::error::{FragmenterError, Rejection, RejectionReason};
use crate::fragment::Fragment;
use crate::hapticity::HapticityMerger;
use crate::isolator::isolate;
use crate::matching::{PatternMatcher, SmartsMatcher};
use crate::molecule::{Molecule, Molecule3D};
use crate::resolver::BondMatchResolver;
use crate::rings::{RingFinder, RingQuery};
use crate::rules::RuleRegistry;

#[derive(Debug, Clone, PartialEq)]
pub struct FragmenterSettings {
    /// Reject structures without z coordinates.
    pub require_3d: bool,
    pub match_step_limit: usize,
    pub link_atom_tolerance: f64,
    pub identifier_failure_policy: IdentifierFailurePolicy,
    pub ring_search_limit: usize,
    pub max_simplification_levels: usize,
}

impl Default for FragmenterSettings {
    fn default() -> Self {
        FragmenterSettings {
            require_3d: true,
            match_step_limit: MATCH_STEP_LIMIT,
            link_atom_tolerance: LINK_ATOM_TOLERANCE,
            identifier_failure_policy: IdentifierFailurePolicy::default(),
            ring_search_limit: RING_SEARCH_LIMIT,
            max_simplification_levels: MAX_SIMPLIFICATION_LEVELS,
        }
    }
}

impl FragmenterSettings {
    pub fn with_require_3d(mut self, require_3d: bool) -> Self {
        self.require_3d = require_3d;
        self
    }

    pub fn with_match_step_limit(mut self, steps: usize) -> Self {
        self.match_step_limit = steps;
        self
    }

    pub fn with_link_atom_tolerance(mut self, tolerance: f64) -> Self {
        self.link_atom_tolerance = tolerance;
        self
    }

    pub fn with_identifier_failure_policy(mut self, policy: IdentifierFailurePolicy) -> Self {
        self.identifier_failure_policy = policy;
        self
    }

    pub fn with_ring_search_limit(mut self, limit: usize) -> Self {
        self.ring_search_limit = limit;
        self
    }

    pub fn with_max_simplification_levels(mut self, levels: usize) -> Self {
        self.max_simplification_levels = levels;
        self
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub molecules: usize,
    pub fragmented: usize,
    /// Rejected molecules per reason kind.
    pub rejected: BTreeMap<&'static str, usize>,
    pub fragments: usize,
    pub unique_fragments: usize,
    /// Fragments without attachment points, kept out of the library.
    pub unattached: usize,
    /// Matched bonds left uncut, ambiguous or already gone.
    pub skipped_bonds: usize,
}

impl RunSummary {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} molecules, {} fragmented, {} rejected, {} fragments ({} unique, {} without attachment points), {} bonds skipped",
            self.molecules,
            self.fragmented,
            self.rejected_total(),
            self.fragments,
            self.unique_fragments,
            self.unattached,
            self.skipped_bonds
        )?;
        for (kind, count) in &self.rejected {
            write!(f, ", {kind}: {count}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FragmentationRun {
    pub library: FragmentLibrary,
    pub unattached: Vec<Fragment>,
    pub rejected: Vec<Rejection>,
    pub matrix: CompatibilityMatrix,
    pub summary: RunSummary,
}

impl FragmentationRun {
    fn absorb<I: CanonicalIdentifier + ?Sized>(
        &mut self,
        outcome: Result<MoleculeFragments, Rejection>,
        comparator: &FragmentComparator<I>,
    ) -> Result<(), FragmenterError> {
        self.summary.molecules += 1;
        let fragments = match outcome {
            Ok(fragments) => fragments,
            Err(rejection) => {
                *self.summary.rejected.entry(rejection.reason.kind()).or_default() += 1;
                self.rejected.push(rejection);
                return Ok(());
            }
        };
        self.summary.fragmented += 1;
        self.summary.skipped_bonds += fragments.skipped_bonds;
        for fragment in fragments.fragments {
            self.summary.fragments += 1;
            if fragment.attachment_points.is_empty() {
                self.unattached.push(fragment);
            } else {
                self.library.insert(fragment, comparator)?;
            }
        }
        self.summary.unattached = self.unattached.len();
        self.summary.unique_fragments = self.library.len();
        Ok(())
    }
}

struct MoleculeFragments {
    fragments: Vec<Fragment>,
    skipped_bonds: usize,
}

/// Runs the pipeline with a fixed rule set and collaborators.
///
/// ```
/// use fragmentation::prelude::*;
/// let registry = RuleRegistry::parse("CTR C1 1 [C] [O] -\n").unwrap();
/// let fragmenter = Fragmenter::new(registry);
/// let methanol = Molecule3D::from_xyz_str("C 0 0 0\nO 1.43 0 0.1\n").unwrap();
/// let run = fragmenter.run(&[methanol]).unwrap();
/// assert_eq!(run.library.len(), 2);
/// assert!(run.matrix.compatible("C1:0", "C1:1"));
/// ```
pub struct Fragmenter<M = SmartsMatcher, R = RingFinder, I = CanonicalLabeler> {
    registry: RuleRegistry,
    matcher: M,
    rings: R,
    identifier: I,
    settings: FragmenterSettings,
}

impl Fragmenter {
    pub fn new(registry: RuleRegistry) -> Self {
        Self::with_settings(registry, FragmenterSettings::default())
    }

    pub fn with_settings(registry: RuleRegistry, settings: FragmenterSettings) -> Self {
        Fragmenter {
            matcher: SmartsMatcher::new(settings.match_step_limit),
            rings: RingFinder::new(settings.ring_search_limit),
            identifier: CanonicalLabeler,
            registry,
            settings,
        }
    }
}

impl<M: PatternMatcher, R: RingQuery, I: CanonicalIdentifier> Fragmenter<M, R, I> {
    pub fn with_collaborators(
        registry: RuleRegistry,
        matcher: M,
        rings: R,
        identifier: I,
        settings: FragmenterSettings,
    ) -> Self {
        Fragmenter {
            registry,
            matcher,
            rings,
            identifier,
            settings,
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &FragmenterSettings {
        &self.settings
    }

    pub fn comparator(&self) -> FragmentComparator<'_, I> {
        FragmentComparator::new(&self.identifier).with_policy(self.settings.identifier_failure_policy)
    }

    /// Cuts one molecule into fragments. The outer error aborts the run; the inner one
    /// rejects this molecule only. The input is left untouched.
    pub fn fragment_molecule(
        &self,
        index: usize,
        molecule: &Molecule3D,
        matrix: &mut CompatibilityMatrix,
    ) -> Result<Result<Vec<Fragment>, Rejection>, FragmenterError> {
        Ok(self
            .fragment(index, molecule, matrix)?
            .map(|fragments| fragments.fragments))
    }

    fn fragment(
        &self,
        index: usize,
        molecule: &Molecule3D,
        matrix: &mut CompatibilityMatrix,
    ) -> Result<Result<MoleculeFragments, Rejection>, FragmenterError> {
        let reject = |reason: RejectionReason| -> Result<Result<MoleculeFragments, Rejection>, FragmenterError> {
            let rejection = Rejection {
                molecule: index,
                title: molecule.title.clone(),
                reason,
            };
            warn!("{rejection}");
            Ok(Err(rejection))
        };
        if self.settings.require_3d && !molecule.is_three_dimensional() {
            return reject(RejectionReason::NotThreeDimensional);
        }

        let resolver = BondMatchResolver::new(&self.registry, &self.matcher, &self.rings)
            .with_max_simplification_levels(self.settings.max_simplification_levels);
        let resolved = match resolver.resolve(molecule) {
            Ok(resolved) => resolved,
            Err(error) => return reject(error.into()),
        };
        if resolved.is_empty() {
            return reject(RejectionReason::NoMatches);
        }

        let mut cut = molecule.clone();
        let outcome = MoleculeCutter::new(&self.registry)
            .with_merger(HapticityMerger::new(self.settings.link_atom_tolerance))
            .cut(&mut cut, &resolved, matrix);
        let fragments = isolate(&cut, &outcome.attachment_points)?;
        // link atoms added while cutting belong to the fragments as well
        let found: usize = fragments.iter().map(Fragment::atom_count).sum();
        if found != cut.len() {
            return reject(RejectionReason::AtomCountMismatch {
                expected: cut.len(),
                found,
            });
        }
        debug!(
            "molecule {index} ('{}'): {} cuts, {} fragments",
            molecule.title,
            outcome.cuts,
            fragments.len()
        );
        Ok(Ok(MoleculeFragments {
            fragments,
            skipped_bonds: resolved.skipped + outcome.skipped,
        }))
    }

    /// Fragments every molecule in order, deduplicating into one library.
    pub fn run(&self, molecules: &[Molecule3D]) -> Result<FragmentationRun, FragmenterError> {
        let comparator = self.comparator();
        let mut run = FragmentationRun::default();
        for (index, molecule) in molecules.iter().enumerate() {
            let outcome = self.fragment(index, molecule, &mut run.matrix)?;
            run.absorb(outcome, &comparator)?;
        }
        info!("fragmentation finished: {}", run.summary);
        Ok(run)
    }

    /// As [`Fragmenter::run`], with molecules cut in parallel into separate matrices that are
    /// merged afterwards. Deduplication runs sequentially in input order, so the result
    /// matches the sequential run.
    pub fn run_parallel(&self, molecules: &[Molecule3D]) -> Result<FragmentationRun, FragmenterError> {
        let outcomes = molecules
            .par_iter()
            .enumerate()
            .map(|(index, molecule)| {
                let mut matrix = CompatibilityMatrix::new();
                let outcome = self.fragment(index, molecule, &mut matrix)?;
                Ok::<_, FragmenterError>((outcome, matrix))
            })
            .collect::<Result<Vec<_>, FragmenterError>>()?;

        let comparator = self.comparator();
        let mut run = FragmentationRun::default();
        for (outcome, matrix) in outcomes {
            run.matrix.merge(&matrix);
            run.absorb(outcome, &comparator)?;
        }
        info!("parallel fragmentation finished: {}", run.summary);
        Ok(run)
    }
}
