use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::molecule::{Molecule, Molecule3D};
use crate::rings::RingInfo;

use super::Smarts;

/// Shared state of one pattern search over one molecule: ring data, the step budget and
/// the memoized results of recursive environments.
pub(crate) struct SearchContext<'a> {
    pub molecule: &'a Molecule3D,
    pub rings: &'a RingInfo,
    step_limit: usize,
    steps: Cell<usize>,
    /// keyed by (address of the boxed inner pattern, target atom)
    recursive: RefCell<HashMap<(usize, usize), bool>>,
}

impl<'a> SearchContext<'a> {
    pub fn new(molecule: &'a Molecule3D, rings: &'a RingInfo, step_limit: usize) -> Self {
        SearchContext {
            molecule,
            rings,
            step_limit,
            steps: Cell::new(0),
            recursive: RefCell::new(HashMap::new()),
        }
    }

    pub fn reset_steps(&self) {
        self.steps.set(0);
    }

    pub fn steps(&self) -> usize {
        self.steps.get()
    }

    pub fn exhausted(&self) -> bool {
        self.steps.get() > self.step_limit
    }

    fn step(&self) -> bool {
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        steps <= self.step_limit
    }

    /// Whether `inner` matches with its first atom mapped onto `atom`.
    pub fn recursive_match(&self, inner: &Smarts, atom: usize) -> bool {
        let key = (inner as *const Smarts as usize, atom);
        let cached = self.recursive.borrow().get(&key).copied();
        if let Some(hit) = cached {
            return hit;
        }
        let mut hit = false;
        self.search(inner, Some(atom), &mut |_| {
            hit = true;
            true
        });
        self.recursive.borrow_mut().insert(key, hit);
        hit
    }

    /// Every mapping of the query onto the molecule, indexed by query atom. Stops early
    /// once the step budget is spent; callers check [`SearchContext::exhausted`].
    pub fn find_all(&self, query: &Smarts) -> Vec<Vec<usize>> {
        let mut results = Vec::new();
        self.search(query, None, &mut |mapping| {
            results.push(mapping.to_vec());
            false
        });
        results
    }

    fn search(&self, query: &Smarts, root: Option<usize>, on_match: &mut dyn FnMut(&[usize]) -> bool) {
        if query.atom_count() == 0 || self.molecule.is_empty() {
            return;
        }
        let mut state = SearchState {
            query,
            order: search_order(query),
            root,
            mapping: vec![usize::MAX; query.atom_count()],
            used: vec![false; self.molecule.len()],
        };
        self.extend(&mut state, 0, on_match);
    }

    /// Maps the query atom at `depth` of the search order; returns true to stop the search.
    fn extend(
        &self,
        state: &mut SearchState,
        depth: usize,
        on_match: &mut dyn FnMut(&[usize]) -> bool,
    ) -> bool {
        if depth == state.order.len() {
            return on_match(&state.mapping);
        }
        let (query_atom, parent) = state.order[depth];
        let candidates: Vec<usize> = match (parent, depth, state.root) {
            (Some(parent), _, _) => self.molecule.neighbors(state.mapping[parent]).collect(),
            (None, 0, Some(root)) => vec![root],
            (None, _, _) => (0..self.molecule.len()).collect(),
        };
        for candidate in candidates {
            if state.used[candidate] {
                continue;
            }
            if !self.step() {
                return true;
            }
            if !self.feasible(state, query_atom, candidate) {
                continue;
            }
            state.mapping[query_atom] = candidate;
            state.used[candidate] = true;
            let stop = self.extend(state, depth + 1, on_match);
            state.used[candidate] = false;
            state.mapping[query_atom] = usize::MAX;
            if stop {
                return true;
            }
        }
        self.exhausted()
    }

    fn feasible(&self, state: &SearchState, query_atom: usize, candidate: usize) -> bool {
        if !state.query.atoms()[query_atom].matches(self, candidate) {
            return false;
        }
        state
            .query
            .neighbors(query_atom)
            .filter(|&(neighbor, _)| state.mapping[neighbor] != usize::MAX)
            .all(|(neighbor, bond)| {
                let target = state.mapping[neighbor];
                self.molecule
                    .bond_order_between(candidate, target)
                    .is_some_and(|order| {
                        bond.matches(order, self.rings.is_ring_bond(candidate, target))
                    })
            })
    }
}

struct SearchState<'q> {
    query: &'q Smarts,
    order: Vec<(usize, Option<usize>)>,
    root: Option<usize>,
    mapping: Vec<usize>,
    used: Vec<bool>,
}

/// Depth-first order over the query graph. Each entry carries the already-ordered atom it
/// was reached from, so candidates can be drawn from that atom's neighbors.
fn search_order(query: &Smarts) -> Vec<(usize, Option<usize>)> {
    let mut order = Vec::with_capacity(query.atom_count());
    let mut seen = vec![false; query.atom_count()];
    for start in 0..query.atom_count() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut stack = vec![(start, None)];
        while let Some((atom, parent)) = stack.pop() {
            order.push((atom, parent));
            let mut next: Vec<usize> = query
                .neighbors(atom)
                .map(|(neighbor, _)| neighbor)
                .filter(|&neighbor| !seen[neighbor])
                .collect();
            next.sort_unstable();
            next.dedup();
            for &neighbor in next.iter().rev() {
                seen[neighbor] = true;
                stack.push((neighbor, Some(atom)));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::bond::{BondOrder, BondTarget};

    fn acetic_acid() -> Molecule3D {
        // C0-C1(=O2)-O3-H4
        Molecule3D::from_atoms(vec![
            Atom::new(6).with_bonds(vec![BondTarget::single(1)]),
            Atom::new(6).with_bonds(vec![
                BondTarget::new(2, BondOrder::Double),
                BondTarget::single(3),
            ]),
            Atom::new(8),
            Atom::new(8).with_bonds(vec![BondTarget::single(4)]),
            Atom::new(1),
        ])
    }

    #[test]
    fn finds_every_mapping() {
        let molecule = acetic_acid();
        let rings = RingInfo::perceive(&molecule);
        let context = SearchContext::new(&molecule, &rings, 10_000);
        let carbonyl = Smarts::parse("C=O").unwrap();
        assert_eq!(context.find_all(&carbonyl), vec![vec![1, 2]]);
        let any_oxygen_on_carbon = Smarts::parse("[#6]~[#8]").unwrap();
        assert_eq!(context.find_all(&any_oxygen_on_carbon).len(), 2);
    }

    #[test]
    fn recursive_environments_are_rooted() {
        let molecule = acetic_acid();
        let rings = RingInfo::perceive(&molecule);
        let context = SearchContext::new(&molecule, &rings, 10_000);
        let hydroxyl = Smarts::parse("[$([O][H])]").unwrap();
        assert_eq!(context.find_all(&hydroxyl), vec![vec![3]]);
    }

    #[test]
    fn step_budget_stops_the_search() {
        let molecule = acetic_acid();
        let rings = RingInfo::perceive(&molecule);
        let context = SearchContext::new(&molecule, &rings, 3);
        let _ = context.find_all(&Smarts::parse("*~*~*").unwrap());
        assert!(context.exhausted());
        context.reset_steps();
        assert_eq!(context.steps(), 0);
    }
}
