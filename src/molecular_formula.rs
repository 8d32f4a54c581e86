use crate::consts::{ElementProperties, DUMMY_ATOMIC_NUMBER};
use core::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use nohash_hasher::IntMap;
use thiserror::Error;

/// Element counts of a molecule or fragment. Placeholder atoms are never counted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MolecularFormula {
    elements: IntMap<u8, usize>,
}

impl MolecularFormula {
    pub fn new() -> Self {
        MolecularFormula {
            elements: IntMap::default(),
        }
    }

    pub fn from_atomic_numbers(atomic_numbers: &[u8]) -> Self {
        let mut formula = MolecularFormula::new();
        for &atomic_number in atomic_numbers {
            formula.add(atomic_number, 1);
        }
        formula
    }

    pub fn elements(&self) -> &IntMap<u8, usize> {
        &self.elements
    }

    pub fn count(&self, atomic_number: u8) -> usize {
        self.elements.get(&atomic_number).copied().unwrap_or(0)
    }

    pub fn add(&mut self, atomic_number: u8, count: usize) {
        if atomic_number == DUMMY_ATOMIC_NUMBER || count == 0 {
            return;
        }
        *self.elements.entry(atomic_number).or_insert(0) += count;
    }

    /// Merges two molecular formulas.
    ///
    /// ```
    /// use fragmentation::molecular_formula::MolecularFormula;
    /// let mut water = "H2O".parse::<MolecularFormula>().unwrap();
    /// let methane = "CH4".parse::<MolecularFormula>().unwrap();
    /// water.merge(&methane);
    /// assert_eq!(water.to_string(), "CH6O");
    /// ```
    pub fn merge(&mut self, other: &MolecularFormula) {
        for (&atom, &count) in &other.elements {
            self.add(atom, count);
        }
    }

    /// Sum of standard atomic weights.
    ///
    /// ```
    /// use fragmentation::molecular_formula::MolecularFormula;
    /// let water = "H2O".parse::<MolecularFormula>().unwrap();
    /// assert!((water.molecular_mass() - 18.015).abs() < 1e-9);
    /// ```
    pub fn molecular_mass(&self) -> f64 {
        self.elements.iter().fold(0.0, |acc, (atom, count)| {
            acc + atom.standard_atomic_weight().unwrap_or(0.0) * *count as f64
        })
    }

    /// Elements in Hill order: carbon, hydrogen, then alphabetical. Without carbon all
    /// symbols are alphabetical.
    fn hill_order(&self) -> Vec<(&'static str, usize)> {
        let mut elements = self
            .elements
            .iter()
            .filter_map(|(&atom, &count)| atom.atomic_symbol().map(|symbol| (symbol, count)))
            .collect::<Vec<_>>();
        let has_carbon = self.elements.contains_key(&6);
        elements.sort_by_key(|&(symbol, _)| match symbol {
            "C" if has_carbon => (0, symbol),
            "H" if has_carbon => (1, symbol),
            _ => (2, symbol),
        });
        elements
    }
}

impl Display for MolecularFormula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (symbol, count) in self.hill_order() {
            if count == 1 {
                write!(f, "{}", symbol)?;
            } else {
                write!(f, "{}{}", symbol, count)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse '{0}' as a molecular formula")]
pub struct ParseFormulaError(String);

impl FromStr for MolecularFormula {
    type Err = ParseFormulaError;

    /// Parses a formula such as `C2H6O`. Element symbols must be capitalized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut formula = MolecularFormula::new();
        let chars: Vec<char> = s.chars().collect();
        let mut position = 0;
        while position < chars.len() {
            if !chars[position].is_ascii_uppercase() {
                return Err(ParseFormulaError(s.to_string()));
            }
            let mut symbol = chars[position].to_string();
            position += 1;
            while position < chars.len() && chars[position].is_ascii_lowercase() {
                symbol.push(chars[position]);
                position += 1;
            }
            let digits_start = position;
            while position < chars.len() && chars[position].is_ascii_digit() {
                position += 1;
            }
            let count = if digits_start == position {
                1
            } else {
                chars[digits_start..position]
                    .iter()
                    .collect::<String>()
                    .parse::<usize>()
                    .map_err(|_| ParseFormulaError(s.to_string()))?
            };
            let atomic_number = crate::consts::ATOMIC_NUMBERS
                .get(symbol.as_str())
                .copied()
                .ok_or_else(|| ParseFormulaError(s.to_string()))?;
            formula.add(atomic_number, count);
        }
        Ok(formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hill_order_display() {
        let formula = MolecularFormula::from_atomic_numbers(&[8, 6, 1, 1, 6, 1, 1, 1, 1, 0]);
        assert_eq!(formula.to_string(), "C2H6O");
        let salt = MolecularFormula::from_atomic_numbers(&[17, 11]);
        assert_eq!(salt.to_string(), "ClNa");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("C2H6O".parse::<MolecularFormula>().is_ok());
        assert!("c2".parse::<MolecularFormula>().is_err());
        assert!("Xy2".parse::<MolecularFormula>().is_err());
        assert_eq!("".parse::<MolecularFormula>(), Ok(MolecularFormula::new()));
    }

    #[test]
    fn dummy_atoms_are_not_counted() {
        let formula = MolecularFormula::from_atomic_numbers(&[0, 0, 26]);
        assert_eq!(formula.count(0), 0);
        assert_eq!(formula.to_string(), "Fe");
    }
}
