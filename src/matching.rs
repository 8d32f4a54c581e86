//! The pattern-match service: named SMARTS queries evaluated against one molecule.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::consts::MATCH_STEP_LIMIT;
use crate::error::MatchError;
use crate::molecule::Molecule3D;
use crate::rings::RingInfo;
use crate::smarts::search::SearchContext;
use crate::smarts::Smarts;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternQuery {
    pub name: String,
    pub smarts: String,
}

impl PatternQuery {
    pub fn new(name: impl Into<String>, smarts: impl Into<String>) -> Self {
        PatternQuery {
            name: name.into(),
            smarts: smarts.into(),
        }
    }
}

/// Matches per query name. Each match lists target atoms in query-atom order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    matches: HashMap<String, Vec<Vec<usize>>>,
}

impl MatchSet {
    pub fn insert(&mut self, name: impl Into<String>, matches: Vec<Vec<usize>>) {
        self.matches.insert(name.into(), matches);
    }

    /// Matches of a query; unknown names have none.
    pub fn matches(&self, name: &str) -> &[Vec<usize>] {
        self.matches.get(name).map_or(&[], |matches| matches.as_slice())
    }

    pub fn count(&self, name: &str) -> usize {
        self.matches(name).len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.matches.keys().map(String::as_str)
    }
}

pub trait PatternMatcher: Sync {
    /// Evaluates every query. A malformed pattern or an exhausted search budget fails the
    /// whole call with an error naming the query.
    fn find_matches(&self, molecule: &Molecule3D, queries: &[PatternQuery]) -> Result<MatchSet, MatchError>;
}

/// Default [`PatternMatcher`] backed by the crate's SMARTS engine.
#[derive(Debug, Clone, Copy)]
pub struct SmartsMatcher {
    pub step_limit: usize,
}

impl Default for SmartsMatcher {
    fn default() -> Self {
        SmartsMatcher {
            step_limit: MATCH_STEP_LIMIT,
        }
    }
}

impl SmartsMatcher {
    pub fn new(step_limit: usize) -> Self {
        SmartsMatcher { step_limit }
    }
}

impl PatternMatcher for SmartsMatcher {
    /// ```
    /// use fragmentation::prelude::*;
    /// let molecule = Molecule3D::from_xyz_str("C 0 0 0\nO 1.43 0 0.1\n").unwrap();
    /// let queries = [PatternQuery::new("co", "[C]-[O]")];
    /// let matches = SmartsMatcher::default().find_matches(&molecule, &queries).unwrap();
    /// assert_eq!(matches.matches("co"), &[vec![0, 1]]);
    /// ```
    fn find_matches(&self, molecule: &Molecule3D, queries: &[PatternQuery]) -> Result<MatchSet, MatchError> {
        // all patterns stay alive while the context caches recursive results by address
        let patterns = queries
            .iter()
            .map(|query| {
                Smarts::parse(&query.smarts).map_err(|source| MatchError::Malformed {
                    query: query.name.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rings = RingInfo::perceive(molecule);
        let context = SearchContext::new(molecule, &rings, self.step_limit);
        let mut match_set = MatchSet::default();
        for (query, pattern) in queries.iter().zip(&patterns) {
            context.reset_steps();
            let mappings = context.find_all(pattern);
            if context.exhausted() {
                return Err(MatchError::Timeout {
                    query: query.name.clone(),
                    steps: self.step_limit,
                });
            }
            let mut seen = HashSet::new();
            let unique: Vec<Vec<usize>> = mappings
                .into_iter()
                .filter(|mapping| seen.insert(mapping.iter().copied().collect::<BTreeSet<_>>()))
                .collect();
            debug!(
                "query {} ({}) matched {} times after {} steps",
                query.name,
                query.smarts,
                unique.len(),
                context.steps()
            );
            match_set.insert(query.name.clone(), unique);
        }
        Ok(match_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::bond::BondTarget;

    fn ethane() -> Molecule3D {
        Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1)]),
            Atom::new(6),
        ])
    }

    #[test]
    fn symmetric_matches_are_reported_once() {
        let matcher = SmartsMatcher::default();
        let queries = [PatternQuery::new("cc", "C-C"), PatternQuery::new("n", "N")];
        let matches = matcher.find_matches(&ethane(), &queries).unwrap();
        assert_eq!(matches.count("cc"), 1);
        assert_eq!(matches.count("n"), 0);
        assert_eq!(matches.count("unknown"), 0);
    }

    #[test]
    fn failures_name_the_query() {
        let queries = [PatternQuery::new("broken", "[C")];
        let error = SmartsMatcher::default()
            .find_matches(&ethane(), &queries)
            .unwrap_err();
        assert_eq!(error.query(), "broken");
        assert!(matches!(error, MatchError::Malformed { .. }));

        let queries = [PatternQuery::new("slow", "*~*")];
        let error = SmartsMatcher::new(1).find_matches(&ethane(), &queries).unwrap_err();
        assert_eq!(
            error,
            MatchError::Timeout {
                query: "slow".into(),
                steps: 1
            }
        );
    }
}
