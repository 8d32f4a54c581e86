//! The SMARTS subset used by cutting rules: atom primitives, logical operators, recursive
//! environments, bond expressions, branches and ring closures.

mod error;
mod parser;
mod query;
pub(crate) mod search;

use core::fmt::{self, Display, Formatter};
use std::collections::VecDeque;
use std::str::FromStr;

pub use error::SmartsError;
pub use query::{AtomExpr, BondExpr};
use query::Specificity;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryBond {
    pub atoms: [usize; 2],
    pub expr: BondExpr,
}

/// A parsed SMARTS pattern. Atom 0 is the first atom written in the pattern.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Smarts {
    atoms: Vec<AtomExpr>,
    bonds: Vec<QueryBond>,
}

impl Smarts {
    /// Parses a SMARTS string.
    ///
    /// ```
    /// use fragmentation::smarts::Smarts;
    /// let pattern = Smarts::parse("[C;X4]-[$(O[H])]").unwrap();
    /// assert_eq!(pattern.atom_count(), 2);
    /// assert_eq!(pattern.to_string(), "[C&X4]-[$([O][#1])]");
    /// ```
    pub fn parse(input: &str) -> Result<Smarts, SmartsError> {
        parser::parse(input)
    }

    pub(crate) fn add_atom(&mut self, expr: AtomExpr) -> usize {
        self.atoms.push(expr);
        self.atoms.len() - 1
    }

    pub(crate) fn add_bond(&mut self, atom1: usize, atom2: usize, expr: BondExpr) {
        self.bonds.push(QueryBond {
            atoms: [atom1, atom2],
            expr,
        });
    }

    pub fn atoms(&self) -> &[AtomExpr] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[QueryBond] {
        &self.bonds
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Neighbors of a query atom together with the connecting bond expression.
    pub fn neighbors(&self, atom: usize) -> impl Iterator<Item = (usize, &BondExpr)> + '_ {
        self.bonds.iter().filter_map(move |bond| match bond.atoms {
            [a, b] if a == atom => Some((b, &bond.expr)),
            [a, b] if b == atom => Some((a, &bond.expr)),
            _ => None,
        })
    }

    /// `*` or `[*]`: a side pattern that every atom satisfies.
    pub fn is_wildcard(&self) -> bool {
        self.atoms.len() == 1 && self.atoms[0] == AtomExpr::True
    }

    pub fn references_metal(&self) -> bool {
        self.atoms.iter().any(|atom| atom.references_metal())
    }

    /// Breadth-first distance of each atom from atom 0, disconnected atoms count as farthest.
    fn distances_from_root(&self) -> Vec<usize> {
        let mut distances = vec![usize::MAX; self.atoms.len()];
        let mut queue = VecDeque::new();
        if !self.atoms.is_empty() {
            distances[0] = 0;
            queue.push_back(0);
        }
        while let Some(atom) = queue.pop_front() {
            for (neighbor, _) in self.neighbors(atom) {
                if distances[neighbor] == usize::MAX {
                    distances[neighbor] = distances[atom] + 1;
                    queue.push_back(neighbor);
                }
            }
        }
        distances
    }

    /// Replaces up to `budget` atom constraints with wildcards, most specific first:
    /// recursive environments, then environment primitives, then elements. Farther atoms
    /// are relaxed before nearer ones.
    pub(crate) fn relax(&mut self, budget: &mut usize) {
        let distances = self.distances_from_root();
        let mut order: Vec<usize> = (0..self.atoms.len()).collect();
        order.sort_by(|&a, &b| distances[b].cmp(&distances[a]).then(b.cmp(&a)));
        for specificity in [
            Specificity::Recursive,
            Specificity::Environment,
            Specificity::Element,
        ] {
            for &atom in &order {
                self.atoms[atom].relax(specificity, budget);
            }
        }
    }

    /// The pattern with its `level` most specific atom constraints replaced by wildcards,
    /// or `None` once fewer than `level` constraints are left to relax.
    ///
    /// ```
    /// use fragmentation::smarts::Smarts;
    /// let pattern = Smarts::parse("[C;X4;+0]").unwrap();
    /// assert_eq!(pattern.simplified(1).unwrap().to_string(), "[C&*&+0]");
    /// assert_eq!(pattern.simplified(3).unwrap().to_string(), "[*&*&*]");
    /// assert!(pattern.simplified(4).is_none());
    /// ```
    pub fn simplified(&self, level: usize) -> Option<Smarts> {
        let mut simplified = self.clone();
        let mut budget = level;
        simplified.relax(&mut budget);
        (budget == 0).then_some(simplified)
    }
}

impl FromStr for Smarts {
    type Err = SmartsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Smarts::parse(s)
    }
}

impl Display for Smarts {
    /// Writes every atom in brackets, ring closures are numbered in order of opening.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let atom_count = self.atoms.len();
        let mut visited = vec![false; atom_count];
        let mut tree_bond = vec![false; self.bonds.len()];
        // first pass fixes the spanning forest so that ring closures are known up front
        for root in 0..atom_count {
            if visited[root] {
                continue;
            }
            let mut stack = vec![root];
            visited[root] = true;
            while let Some(atom) = stack.pop() {
                let mut children = Vec::new();
                for (bond_index, bond) in self.bonds.iter().enumerate() {
                    let other = match bond.atoms {
                        [a, b] if a == atom => b,
                        [a, b] if b == atom => a,
                        _ => continue,
                    };
                    if !visited[other] {
                        visited[other] = true;
                        tree_bond[bond_index] = true;
                        children.push(other);
                    }
                }
                stack.extend(children.into_iter().rev());
            }
        }
        let mut writer = SmartsWriter {
            smarts: self,
            tree_bond: &tree_bond,
            written: vec![false; atom_count],
            open_rings: Vec::new(),
        };
        let mut first = true;
        for root in 0..atom_count {
            if writer.written[root] {
                continue;
            }
            if !first {
                write!(f, ".")?;
            }
            first = false;
            writer.write_atom(f, root, None)?;
        }
        Ok(())
    }
}

struct SmartsWriter<'a> {
    smarts: &'a Smarts,
    tree_bond: &'a [bool],
    written: Vec<bool>,
    open_rings: Vec<Option<usize>>,
}

impl SmartsWriter<'_> {
    fn write_atom(&mut self, f: &mut Formatter<'_>, atom: usize, via: Option<usize>) -> fmt::Result {
        self.written[atom] = true;
        write!(f, "[{}]", self.smarts.atoms[atom])?;
        let mut children = Vec::new();
        for (bond_index, bond) in self.smarts.bonds.iter().enumerate() {
            if Some(bond_index) == via || !bond.atoms.contains(&atom) {
                continue;
            }
            let other = if bond.atoms[0] == atom {
                bond.atoms[1]
            } else {
                bond.atoms[0]
            };
            if self.tree_bond[bond_index] {
                if !self.written[other] {
                    children.push((bond_index, other));
                }
                continue;
            }
            // ring closure: opened by the first endpoint written, closed by the second
            if let Some(digit) = self.open_rings.iter().position(|&b| b == Some(bond_index)) {
                self.open_rings[digit] = None;
                write!(f, "{}", bond.expr)?;
                write_ring_digit(f, digit + 1)?;
            } else {
                let digit = match self.open_rings.iter().position(|b| b.is_none()) {
                    Some(free) => {
                        self.open_rings[free] = Some(bond_index);
                        free
                    }
                    None => {
                        self.open_rings.push(Some(bond_index));
                        self.open_rings.len() - 1
                    }
                };
                write_ring_digit(f, digit + 1)?;
            }
        }
        let last = children.len().saturating_sub(1);
        for (position, (bond_index, child)) in children.into_iter().enumerate() {
            let branch = position < last;
            if branch {
                write!(f, "(")?;
            }
            write!(f, "{}", self.smarts.bonds[bond_index].expr)?;
            self.write_atom(f, child, Some(bond_index))?;
            if branch {
                write!(f, ")")?;
            }
        }
        Ok(())
    }
}

fn write_ring_digit(f: &mut Formatter<'_>, digit: usize) -> fmt::Result {
    if digit < 10 {
        write!(f, "{digit}")
    } else {
        write!(f, "%{digit:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_patterns_parse_back_to_the_same_graph() {
        for input in [
            "[C]-[O]",
            "C1CCCCC1",
            "[#6](=O)(O)c1ccccc1",
            "[$([#6]=O);!R]~[N,O;+0]",
            "[Fe].[Cl-]",
            "C!@C",
        ] {
            let pattern = Smarts::parse(input).unwrap();
            let written = pattern.to_string();
            let reparsed = Smarts::parse(&written).unwrap();
            assert_eq!(reparsed.atom_count(), pattern.atom_count(), "{input} -> {written}");
            assert_eq!(reparsed.bonds().len(), pattern.bonds().len(), "{input} -> {written}");
            assert_eq!(reparsed.to_string(), written);
        }
    }

    #[test]
    fn wildcards_and_metals() {
        assert!(Smarts::parse("*").unwrap().is_wildcard());
        assert!(Smarts::parse("[*]").unwrap().is_wildcard());
        assert!(!Smarts::parse("[C]").unwrap().is_wildcard());
        assert!(Smarts::parse("[$([Fe,Co])]").unwrap().references_metal());
        assert!(!Smarts::parse("[!Fe]").unwrap().references_metal());
    }

    #[test]
    fn recursive_environment_is_relaxed_before_the_element() {
        let pattern = Smarts::parse("[C;$(C=O)]").unwrap();
        // the inner pattern loses its oxygen first, then its carbon, then the term itself
        assert_eq!(pattern.simplified(1).unwrap().to_string(), "[C&$([C]=[*])]");
        assert_eq!(pattern.simplified(2).unwrap().to_string(), "[C&$([*]=[*])]");
        assert_eq!(pattern.simplified(3).unwrap().to_string(), "[C&*]");
        assert_eq!(pattern.simplified(4).unwrap().to_string(), "[*&*]");
        assert!(pattern.simplified(5).is_none());
    }
}
