use core::fmt::{self, Display, Formatter};

use crate::bond::BondOrder;
use crate::consts::ElementProperties;
use crate::molecule::Molecule;

use super::search::SearchContext;
use super::Smarts;

/// AST node for a SMARTS atom query expression.
///
/// Target structures carry explicit hydrogens, so `D` and `X` both count bonded neighbors
/// and `H` counts bonded hydrogen atoms.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomExpr {
    /// Matches any atom (wildcard `*`).
    True,
    /// `aromatic` is `None` for `#n`, `Some(true)` for lowercase and `Some(false)` for uppercase symbols.
    Element {
        atomic_number: u8,
        aromatic: Option<bool>,
    },
    /// `a`
    Aromatic,
    /// `A`
    Aliphatic,
    /// `D<n>`
    Degree(u8),
    /// `X<n>`
    Connectivity(u8),
    /// `H<n>`
    TotalHCount(u8),
    /// `v<n>`: sum of bond orders
    Valence(u8),
    /// `R<n>` with n > 0
    RingMembership(u8),
    /// `R` or `r` without a count
    InRing,
    /// `R0`
    NotInRing,
    /// `r<n>`
    SmallestRingSize(u8),
    /// `x<n>`
    RingBondCount(u8),
    Charge(i8),
    /// `$(...)`, the first atom of the inner pattern is the atom being tested.
    Recursive(Box<Smarts>),
    And(Vec<AtomExpr>),
    Or(Vec<AtomExpr>),
    Not(Box<AtomExpr>),
}

/// AST node for a SMARTS bond query expression.
///
/// Implicit bonds default to [`BondExpr::SingleOrAromatic`].
#[derive(Debug, Clone, PartialEq)]
pub enum BondExpr {
    /// `~`
    True,
    Single,
    Double,
    Triple,
    Aromatic,
    /// `@`
    Ring,
    SingleOrAromatic,
    And(Vec<BondExpr>),
    Or(Vec<BondExpr>),
    Not(Box<BondExpr>),
}

/// Which constraints are relaxed first when a pattern is simplified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Specificity {
    Recursive,
    Environment,
    Element,
}

impl AtomExpr {
    pub(crate) fn matches(&self, ctx: &SearchContext, atom: usize) -> bool {
        let molecule = ctx.molecule;
        match self {
            AtomExpr::True => true,
            AtomExpr::Element {
                atomic_number,
                aromatic,
            } => {
                molecule.get_atomic_number(atom) == *atomic_number
                    && aromatic.map_or(true, |aromatic| molecule.is_aromatic(atom) == aromatic)
            }
            AtomExpr::Aromatic => molecule.is_aromatic(atom),
            AtomExpr::Aliphatic => !molecule.is_aromatic(atom),
            AtomExpr::Degree(degree) | AtomExpr::Connectivity(degree) => {
                molecule.degree(atom) == *degree as usize
            }
            AtomExpr::TotalHCount(count) => {
                molecule
                    .neighbors(atom)
                    .filter(|&neighbor| molecule.get_atomic_number(neighbor) == 1)
                    .count()
                    == *count as usize
            }
            AtomExpr::Valence(valence) => {
                molecule
                    .get_atom_bonds(atom)
                    .unwrap_or_default()
                    .iter()
                    .map(|bond| bond.bond_order().valence() as usize)
                    .sum::<usize>()
                    == *valence as usize
            }
            AtomExpr::RingMembership(count) => ctx.rings.ring_count(atom) == *count as usize,
            AtomExpr::InRing => ctx.rings.is_ring_atom(atom),
            AtomExpr::NotInRing => !ctx.rings.is_ring_atom(atom),
            AtomExpr::SmallestRingSize(size) => {
                ctx.rings.smallest_ring_size(atom) == Some(*size as usize)
            }
            AtomExpr::RingBondCount(count) => ctx.rings.ring_bond_count(atom) == *count as usize,
            AtomExpr::Charge(charge) => molecule.charge(atom) == *charge,
            AtomExpr::Recursive(inner) => ctx.recursive_match(inner, atom),
            AtomExpr::And(exprs) => exprs.iter().all(|expr| expr.matches(ctx, atom)),
            AtomExpr::Or(exprs) => exprs.iter().any(|expr| expr.matches(ctx, atom)),
            AtomExpr::Not(expr) => !expr.matches(ctx, atom),
        }
    }

    pub(crate) fn specificity(&self) -> Option<Specificity> {
        match self {
            AtomExpr::True | AtomExpr::And(_) | AtomExpr::Or(_) => None,
            AtomExpr::Element { .. } | AtomExpr::Aromatic | AtomExpr::Aliphatic => {
                Some(Specificity::Element)
            }
            AtomExpr::Recursive(_) => Some(Specificity::Recursive),
            AtomExpr::Not(inner) => inner.specificity(),
            _ => Some(Specificity::Environment),
        }
    }

    /// Replaces up to `budget` constraints of the given specificity with `True`.
    pub(crate) fn relax(&mut self, specificity: Specificity, budget: &mut usize) {
        if *budget == 0 {
            return;
        }
        match self {
            AtomExpr::And(exprs) | AtomExpr::Or(exprs) => {
                for expr in exprs {
                    expr.relax(specificity, budget);
                }
            }
            AtomExpr::Recursive(inner) if specificity == Specificity::Recursive => {
                inner.relax(budget);
                if *budget > 0 {
                    *self = AtomExpr::True;
                    *budget -= 1;
                }
            }
            leaf => {
                if leaf.specificity() == Some(specificity) {
                    *leaf = AtomExpr::True;
                    *budget -= 1;
                }
            }
        }
    }

    /// True when a non-negated element test names a metal, recursing into `$(...)`.
    pub fn references_metal(&self) -> bool {
        match self {
            AtomExpr::Element { atomic_number, .. } => atomic_number.is_metal(),
            AtomExpr::Recursive(inner) => inner.references_metal(),
            AtomExpr::And(exprs) | AtomExpr::Or(exprs) => {
                exprs.iter().any(|expr| expr.references_metal())
            }
            _ => false,
        }
    }

    fn write_low(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AtomExpr::And(exprs) if exprs.iter().any(|e| matches!(e, AtomExpr::Or(_))) => {
                write_joined(f, exprs, ";", AtomExpr::write_or)
            }
            _ => self.write_or(f),
        }
    }

    fn write_or(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AtomExpr::Or(exprs) => write_joined(f, exprs, ",", AtomExpr::write_high),
            _ => self.write_high(f),
        }
    }

    fn write_high(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AtomExpr::And(exprs) => write_joined(f, exprs, "&", AtomExpr::write_primitive),
            _ => self.write_primitive(f),
        }
    }

    fn write_primitive(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AtomExpr::True => write!(f, "*"),
            AtomExpr::Element {
                atomic_number,
                aromatic,
            } => {
                let symbol = atomic_number.atomic_symbol().unwrap_or("*");
                match aromatic {
                    Some(false) if *atomic_number != 1 => write!(f, "{symbol}"),
                    Some(true) => write!(f, "{}", symbol.to_lowercase()),
                    _ => write!(f, "#{atomic_number}"),
                }
            }
            AtomExpr::Aromatic => write!(f, "a"),
            AtomExpr::Aliphatic => write!(f, "A"),
            AtomExpr::Degree(n) => write!(f, "D{n}"),
            AtomExpr::Connectivity(n) => write!(f, "X{n}"),
            AtomExpr::TotalHCount(n) => write!(f, "H{n}"),
            AtomExpr::Valence(n) => write!(f, "v{n}"),
            AtomExpr::RingMembership(n) => write!(f, "R{n}"),
            AtomExpr::InRing => write!(f, "R"),
            AtomExpr::NotInRing => write!(f, "R0"),
            AtomExpr::SmallestRingSize(n) => write!(f, "r{n}"),
            AtomExpr::RingBondCount(n) => write!(f, "x{n}"),
            AtomExpr::Charge(charge) if *charge < 0 => write!(f, "-{}", charge.unsigned_abs()),
            AtomExpr::Charge(charge) => write!(f, "+{charge}"),
            AtomExpr::Recursive(inner) => write!(f, "$({inner})"),
            AtomExpr::Not(inner) => {
                write!(f, "!")?;
                inner.write_primitive(f)
            }
            AtomExpr::And(_) | AtomExpr::Or(_) => self.write_low(f),
        }
    }
}

impl Display for AtomExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.write_low(f)
    }
}

fn write_joined<T>(
    f: &mut Formatter<'_>,
    items: &[T],
    separator: &str,
    write_item: fn(&T, &mut Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, "{separator}")?;
        }
        write_item(item, f)?;
    }
    Ok(())
}

impl BondExpr {
    pub fn matches(&self, order: BondOrder, is_ring_bond: bool) -> bool {
        match self {
            BondExpr::True => true,
            BondExpr::Single => order == BondOrder::Single,
            BondExpr::Double => order == BondOrder::Double,
            BondExpr::Triple => order == BondOrder::Triple,
            BondExpr::Aromatic => order == BondOrder::Aromatic,
            BondExpr::Ring => is_ring_bond,
            BondExpr::SingleOrAromatic => {
                matches!(order, BondOrder::Single | BondOrder::Aromatic)
            }
            BondExpr::And(exprs) => exprs.iter().all(|e| e.matches(order, is_ring_bond)),
            BondExpr::Or(exprs) => exprs.iter().any(|e| e.matches(order, is_ring_bond)),
            BondExpr::Not(expr) => !expr.matches(order, is_ring_bond),
        }
    }

    /// The bond order a pattern explicitly encodes, if any.
    pub fn explicit_order(&self) -> Option<BondOrder> {
        match self {
            BondExpr::Single => Some(BondOrder::Single),
            BondExpr::Double => Some(BondOrder::Double),
            BondExpr::Triple => Some(BondOrder::Triple),
            BondExpr::And(exprs) => exprs.iter().find_map(|e| e.explicit_order()),
            _ => None,
        }
    }

    fn write_low(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BondExpr::And(exprs) if exprs.iter().any(|e| matches!(e, BondExpr::Or(_))) => {
                write_joined(f, exprs, ";", BondExpr::write_or)
            }
            _ => self.write_or(f),
        }
    }

    fn write_or(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BondExpr::Or(exprs) => write_joined(f, exprs, ",", BondExpr::write_high),
            _ => self.write_high(f),
        }
    }

    fn write_high(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BondExpr::And(exprs) => write_joined(f, exprs, "&", BondExpr::write_primitive),
            _ => self.write_primitive(f),
        }
    }

    fn write_primitive(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BondExpr::True => write!(f, "~"),
            BondExpr::Single => write!(f, "-"),
            BondExpr::Double => write!(f, "="),
            BondExpr::Triple => write!(f, "#"),
            BondExpr::Aromatic => write!(f, ":"),
            BondExpr::Ring => write!(f, "@"),
            BondExpr::SingleOrAromatic => write!(f, "-,:"),
            BondExpr::Not(inner) => {
                write!(f, "!")?;
                inner.write_primitive(f)
            }
            BondExpr::And(_) | BondExpr::Or(_) => self.write_low(f),
        }
    }
}

impl Display for BondExpr {
    /// The implicit default bond is written as nothing.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BondExpr::SingleOrAromatic => Ok(()),
            _ => self.write_low(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bond_expressions() {
        assert!(BondExpr::SingleOrAromatic.matches(BondOrder::Aromatic, true));
        assert!(!BondExpr::Single.matches(BondOrder::Aromatic, true));
        let not_ring_single = BondExpr::And(vec![
            BondExpr::Single,
            BondExpr::Not(Box::new(BondExpr::Ring)),
        ]);
        assert!(not_ring_single.matches(BondOrder::Single, false));
        assert!(!not_ring_single.matches(BondOrder::Single, true));
        assert_eq!(not_ring_single.explicit_order(), Some(BondOrder::Single));
        assert_eq!(BondExpr::True.explicit_order(), None);
    }

    #[test]
    fn relax_follows_specificity() {
        let mut expr = AtomExpr::And(vec![
            AtomExpr::Element {
                atomic_number: 6,
                aromatic: Some(false),
            },
            AtomExpr::Connectivity(4),
        ]);
        let mut budget = 1;
        expr.relax(Specificity::Recursive, &mut budget);
        assert_eq!(budget, 1);
        expr.relax(Specificity::Environment, &mut budget);
        assert_eq!(budget, 0);
        assert_eq!(expr.to_string(), "C&*");
    }
}
