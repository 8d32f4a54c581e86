//! Assigns the atoms of every matched bond to the sides of its cutting rule.

use std::collections::HashSet;

use log::debug;

use crate::consts::MAX_SIMPLIFICATION_LEVELS;
use crate::error::MatchError;
use crate::matching::{MatchSet, PatternMatcher, PatternQuery};
use crate::molecule::Molecule3D;
use crate::rings::RingQuery;
use crate::rules::{CuttingRule, RuleRegistry};

/// Which side patterns each atom of a matched pair satisfies: `atom0[s]` is true when the
/// first atom matches side `s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MembershipMatrix {
    pub atom0: [bool; 2],
    pub atom1: [bool; 2],
}

impl MembershipMatrix {
    pub fn new(atom0: [bool; 2], atom1: [bool; 2]) -> Self {
        MembershipMatrix { atom0, atom1 }
    }

    pub fn true_count(&self) -> usize {
        self.atom0.iter().chain(&self.atom1).filter(|&&hit| hit).count()
    }
}

/// The rule properties that take part in side assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleTraits {
    pub symmetric: bool,
    pub wildcard: [bool; 2],
}

impl From<&CuttingRule> for RuleTraits {
    fn from(rule: &CuttingRule) -> Self {
        RuleTraits {
            symmetric: rule.is_symmetric(),
            wildcard: [rule.side_is_wildcard(0), rule.side_is_wildcard(1)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResolution {
    /// Atom indices playing side 0 and side 1.
    Resolved { side0: usize, side1: usize },
    /// Both atoms fit the rule but their sides could not be told apart.
    Unresolved,
    /// Neither atom plays a role in the rule.
    Ignored,
}

/// Decides which atom of `pair` plays which side.
///
/// ```
/// use fragmentation::resolver::*;
/// let traits = RuleTraits::default();
/// let matrix = MembershipMatrix::new([false, true], [true, false]);
/// assert_eq!(
///     resolve_membership(matrix, traits, (4, 7)),
///     MatchResolution::Resolved { side0: 7, side1: 4 }
/// );
/// let ambiguous = MatchResolution::Unresolved;
/// assert_eq!(resolve_membership(MembershipMatrix::new([true; 2], [true; 2]), traits, (4, 7)), ambiguous);
/// ```
pub fn resolve_membership(
    matrix: MembershipMatrix,
    traits: RuleTraits,
    (atom0, atom1): (usize, usize),
) -> MatchResolution {
    let resolved = |first: usize, second: usize| MatchResolution::Resolved {
        side0: first,
        side1: second,
    };
    if matrix.true_count() == 0 {
        return MatchResolution::Ignored;
    }

    let strict_side = match traits.wildcard {
        [true, false] => Some(1),
        [false, true] => Some(0),
        _ => None,
    };
    if let Some(side) = strict_side {
        let takes_side = match (matrix.atom0[side], matrix.atom1[side]) {
            (true, false) => atom0,
            (false, true) => atom1,
            // both fit: the position in the whole-rule match decides
            (true, true) => [atom0, atom1][side],
            (false, false) => return MatchResolution::Ignored,
        };
        let other = if takes_side == atom0 { atom1 } else { atom0 };
        return if side == 0 {
            resolved(takes_side, other)
        } else {
            resolved(other, takes_side)
        };
    }

    if traits.symmetric {
        return resolved(atom0, atom1);
    }

    match (matrix.atom0, matrix.atom1) {
        ([true, false], [false, true]) => return resolved(atom0, atom1),
        ([false, true], [true, false]) => return resolved(atom1, atom0),
        _ => {}
    }

    // a single atom fitting exactly one side fixes the other by exclusion
    let exclusive_side = |row: [bool; 2]| match row {
        [true, false] => Some(0),
        [false, true] => Some(1),
        _ => None,
    };
    match (exclusive_side(matrix.atom0), exclusive_side(matrix.atom1)) {
        (Some(0), None) => resolved(atom0, atom1),
        (Some(_), None) => resolved(atom1, atom0),
        (None, Some(0)) => resolved(atom1, atom0),
        (None, Some(_)) => resolved(atom0, atom1),
        _ => MatchResolution::Unresolved,
    }
}

/// One bond to be cut, atoms listed by rule side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBond {
    pub rule: String,
    pub atoms: [usize; 2],
    pub subclasses: [u8; 2],
    pub symmetric: bool,
    pub hapto: bool,
}

impl TargetBond {
    pub fn new(rule: &CuttingRule, side0: usize, side1: usize) -> Self {
        let symmetric = rule.is_symmetric();
        TargetBond {
            rule: rule.name.clone(),
            atoms: [side0, side1],
            subclasses: if symmetric { [0, 0] } else { [0, 1] },
            symmetric,
            hapto: rule.is_hapto(),
        }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atoms.contains(&atom)
    }
}

/// Resolved targets per rule, in rule processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMatches {
    pub targets: Vec<(String, Vec<TargetBond>)>,
    /// Whole-rule matches found before ring filtering and resolution.
    pub raw_matches: usize,
    /// Ambiguous matches left uncut.
    pub skipped: usize,
}

impl ResolvedMatches {
    pub fn for_rule(&self, rule: &str) -> &[TargetBond] {
        self.targets
            .iter()
            .find(|(name, _)| name == rule)
            .map_or(&[], |(_, targets)| targets.as_slice())
    }

    pub fn total(&self) -> usize {
        self.targets.iter().map(|(_, targets)| targets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

fn side_query_name(rule: &str, side: usize) -> String {
    format!("{rule}#{side}")
}

pub struct BondMatchResolver<'a, M: PatternMatcher + ?Sized, R: RingQuery + ?Sized> {
    registry: &'a RuleRegistry,
    matcher: &'a M,
    rings: &'a R,
    max_simplification_levels: usize,
}

impl<'a, M: PatternMatcher + ?Sized, R: RingQuery + ?Sized> BondMatchResolver<'a, M, R> {
    pub fn new(registry: &'a RuleRegistry, matcher: &'a M, rings: &'a R) -> Self {
        BondMatchResolver {
            registry,
            matcher,
            rings,
            max_simplification_levels: MAX_SIMPLIFICATION_LEVELS,
        }
    }

    pub fn with_max_simplification_levels(mut self, levels: usize) -> Self {
        self.max_simplification_levels = levels;
        self
    }

    /// Matches every rule once and resolves each match. A failing query aborts the
    /// molecule.
    pub fn resolve(&self, molecule: &Molecule3D) -> Result<ResolvedMatches, MatchError> {
        let queries: Vec<PatternQuery> = self
            .registry
            .rules()
            .iter()
            .flat_map(|rule| {
                [
                    PatternQuery::new(rule.name.clone(), rule.whole_smarts()),
                    PatternQuery::new(side_query_name(&rule.name, 0), rule.atom_smarts[0].clone()),
                    PatternQuery::new(side_query_name(&rule.name, 1), rule.atom_smarts[1].clone()),
                ]
            })
            .collect();
        let match_set = self.matcher.find_matches(molecule, &queries)?;

        let mut resolved = ResolvedMatches::default();
        for rule in self.registry.rules() {
            let targets = self.resolve_rule(molecule, rule, &match_set, &mut resolved)?;
            resolved.targets.push((rule.name.clone(), targets));
        }
        Ok(resolved)
    }

    fn resolve_rule(
        &self,
        molecule: &Molecule3D,
        rule: &CuttingRule,
        match_set: &MatchSet,
        counts: &mut ResolvedMatches,
    ) -> Result<Vec<TargetBond>, MatchError> {
        let side_atoms: [HashSet<usize>; 2] = [0, 1].map(|side| {
            match_set
                .matches(&side_query_name(&rule.name, side))
                .iter()
                .filter_map(|mapping| mapping.first().copied())
                .collect()
        });
        let traits = RuleTraits::from(rule);
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for mapping in match_set.matches(&rule.name) {
            let &[atom0, atom1] = mapping.as_slice() else {
                continue;
            };
            if !seen.insert((atom0.min(atom1), atom0.max(atom1))) {
                continue;
            }
            counts.raw_matches += 1;
            if self.in_excluded_ring(molecule, rule, atom0, atom1) {
                debug!("{}: bond {atom0}-{atom1} dropped by ring option", rule.name);
                continue;
            }
            let matrix = MembershipMatrix::new(
                [side_atoms[0].contains(&atom0), side_atoms[1].contains(&atom0)],
                [side_atoms[0].contains(&atom1), side_atoms[1].contains(&atom1)],
            );
            let resolution = match resolve_membership(matrix, traits, (atom0, atom1)) {
                MatchResolution::Unresolved => self.recover(molecule, rule, (atom0, atom1))?,
                other => other,
            };
            match resolution {
                MatchResolution::Resolved { side0, side1 } => {
                    targets.push(TargetBond::new(rule, side0, side1));
                }
                MatchResolution::Ignored => {
                    debug!("{}: bond {atom0}-{atom1} plays no role", rule.name);
                }
                MatchResolution::Unresolved => {
                    debug!(
                        "{}: sides of bond {atom0}-{atom1} stay ambiguous, bond is not cut",
                        rule.name
                    );
                    counts.skipped += 1;
                }
            }
        }
        Ok(targets)
    }

    fn in_excluded_ring(&self, molecule: &Molecule3D, rule: &CuttingRule, atom0: usize, atom1: usize) -> bool {
        let plain = rule
            .min_ring_size()
            .is_some_and(|size| self.rings.smallest_ring(molecule, atom0, atom1, size, false).is_some());
        let metal = rule
            .min_metal_ring_size()
            .is_some_and(|size| self.rings.smallest_ring(molecule, atom0, atom1, size, true).is_some());
        plain || metal
    }

    /// Re-queries ever more general side patterns until exactly one of the two atoms fits
    /// one of them.
    fn recover(
        &self,
        molecule: &Molecule3D,
        rule: &CuttingRule,
        (atom0, atom1): (usize, usize),
    ) -> Result<MatchResolution, MatchError> {
        for level in 1..=self.max_simplification_levels {
            let mut exhausted = true;
            for side in 0..2 {
                let Some(simplified) = rule.side(side).simplified(level) else {
                    continue;
                };
                exhausted = false;
                let name = format!("{}@{level}", side_query_name(&rule.name, side));
                let query = PatternQuery::new(name.clone(), simplified.to_string());
                let matches = self.matcher.find_matches(molecule, std::slice::from_ref(&query))?;
                let fits = |atom: usize| matches.matches(&name).iter().any(|m| m.first() == Some(&atom));
                let taker = match (fits(atom0), fits(atom1)) {
                    (true, false) => (atom0, atom1),
                    (false, true) => (atom1, atom0),
                    _ => continue,
                };
                debug!(
                    "{}: bond {atom0}-{atom1} resolved with side {side} simplified to {}",
                    rule.name, query.smarts
                );
                return Ok(if side == 0 {
                    MatchResolution::Resolved {
                        side0: taker.0,
                        side1: taker.1,
                    }
                } else {
                    MatchResolution::Resolved {
                        side0: taker.1,
                        side1: taker.0,
                    }
                });
            }
            if exhausted {
                break;
            }
        }
        Ok(MatchResolution::Unresolved)
    }
}
