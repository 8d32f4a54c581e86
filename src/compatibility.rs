//! The compatibility matrix: which attachment-point classes may be joined again.
//!
//! On disk the matrix is a line-oriented table, every section sorted:
//!
//! ```text
//! # fragmentation compatibility matrix
//! RCN C1:0 C1:1
//! RCN C1:1 C1:0
//! RBO C1 1
//! CAP C1:0 H
//! ```

use core::fmt::{self, Display, Formatter};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;

use crate::bond::BondOrder;
use crate::error::CompatibilityError;
use crate::rules::AttachmentPointClass;

const HEADER: &str = "# fragmentation compatibility matrix";

/// Grows monotonically while molecules are cut. Insertion is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityMatrix {
    rows: BTreeMap<String, BTreeSet<String>>,
    bond_orders: BTreeMap<String, u8>,
    capping: BTreeMap<String, String>,
}

impl CompatibilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that two classes may bond, in both directions, together with the bond order
    /// of their rules.
    ///
    /// ```
    /// use fragmentation::prelude::*;
    /// let mut matrix = CompatibilityMatrix::new();
    /// let (c, o) = (AttachmentPointClass::new("C1", 0), AttachmentPointClass::new("C1", 1));
    /// matrix.add_pair(&c, &o);
    /// matrix.add_pair(&o, &c);
    /// assert!(matrix.compatible("C1:1", "C1:0"));
    /// assert_eq!(matrix.to_string(), "# fragmentation compatibility matrix\nRCN C1:0 C1:1\nRCN C1:1 C1:0\nRBO C1 1\n");
    /// ```
    pub fn add_pair(&mut self, class1: &AttachmentPointClass, class2: &AttachmentPointClass) {
        let (name1, name2) = (class1.to_string(), class2.to_string());
        self.rows.entry(name1.clone()).or_default().insert(name2.clone());
        self.rows.entry(name2).or_default().insert(name1);
        for class in [class1, class2] {
            self.bond_orders
                .insert(class.rule.clone(), class.bond_order.code());
        }
    }

    pub fn compatible(&self, class1: &str, class2: &str) -> bool {
        self.rows
            .get(class1)
            .is_some_and(|partners| partners.contains(class2))
    }

    pub fn partners(&self, class: &str) -> Option<&BTreeSet<String>> {
        self.rows.get(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn bond_order(&self, rule: &str) -> Option<BondOrder> {
        self.bond_orders.get(rule).copied().and_then(BondOrder::from_code)
    }

    /// Names the group that caps an open attachment point of `class`.
    pub fn set_capping(&mut self, class: impl Into<String>, capping: impl Into<String>) {
        self.capping.insert(class.into(), capping.into());
    }

    pub fn capping(&self, class: &str) -> Option<&str> {
        self.capping.get(class).map(String::as_str)
    }

    /// Folds another matrix in, as after independent per-molecule runs.
    pub fn merge(&mut self, other: &CompatibilityMatrix) {
        for (class, partners) in &other.rows {
            self.rows
                .entry(class.clone())
                .or_default()
                .extend(partners.iter().cloned());
        }
        self.bond_orders
            .extend(other.bond_orders.iter().map(|(rule, order)| (rule.clone(), *order)));
        self.capping
            .extend(other.capping.iter().map(|(class, cap)| (class.clone(), cap.clone())));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<CompatibilityMatrix, CompatibilityError> {
        std::fs::read_to_string(path)?.parse()
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), CompatibilityError> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl Display for CompatibilityMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{HEADER}")?;
        for (class, partners) in &self.rows {
            writeln!(f, "RCN {class} {}", partners.iter().join(","))?;
        }
        for (rule, order) in &self.bond_orders {
            writeln!(f, "RBO {rule} {order}")?;
        }
        for (class, capping) in &self.capping {
            writeln!(f, "CAP {class} {capping}")?;
        }
        Ok(())
    }
}

impl FromStr for CompatibilityMatrix {
    type Err = CompatibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut matrix = CompatibilityMatrix::new();
        for (index, line) in s.lines().enumerate() {
            let malformed = || CompatibilityError::MalformedLine {
                line: index + 1,
                content: line.to_string(),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            let &[tag, key, value] = fields.as_slice() else {
                return Err(malformed());
            };
            match tag {
                "RCN" => {
                    let partners = matrix.rows.entry(key.to_string()).or_default();
                    for partner in value.split(',').filter(|partner| !partner.is_empty()) {
                        partners.insert(partner.to_string());
                    }
                }
                "RBO" => {
                    let order = value
                        .parse::<u8>()
                        .ok()
                        .filter(|&code| BondOrder::from_code(code).is_some())
                        .ok_or_else(malformed)?;
                    matrix.bond_orders.insert(key.to_string(), order);
                }
                "CAP" => {
                    matrix.capping.insert(key.to_string(), value.to_string());
                }
                _ => return Err(malformed()),
            }
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(rule: &str, subclass: u8) -> AttachmentPointClass {
        AttachmentPointClass::new(rule, subclass)
    }

    #[test]
    fn repeated_insertion_changes_nothing() {
        let mut once = CompatibilityMatrix::new();
        once.add_pair(&class("C1", 0), &class("C1", 1));
        let mut twice = once.clone();
        twice.add_pair(&class("C1", 0), &class("C1", 1));
        twice.add_pair(&class("C1", 1), &class("C1", 0));
        assert_eq!(once, twice);
        assert_eq!(once.to_string(), twice.to_string());
    }

    #[test]
    fn symmetric_rules_pair_with_themselves() {
        let mut matrix = CompatibilityMatrix::new();
        matrix.add_pair(&class("CC", 0), &class("CC", 0));
        assert_eq!(matrix.len(), 1);
        assert!(matrix.compatible("CC:0", "CC:0"));
    }

    #[test]
    fn file_format_round_trips() {
        let mut matrix = CompatibilityMatrix::new();
        matrix.add_pair(&class("Z", 0), &class("Z", 1));
        matrix.add_pair(&class("A", 0), &class("A", 1).with_bond_order(BondOrder::Double));
        matrix.add_pair(&class("A", 0), &class("Z", 1));
        matrix.set_capping("A:0", "H");
        let written = matrix.to_string();
        assert_eq!(
            written,
            "# fragmentation compatibility matrix\n\
             RCN A:0 A:1,Z:1\n\
             RCN A:1 A:0\n\
             RCN Z:0 Z:1\n\
             RCN Z:1 A:0,Z:0\n\
             RBO A 2\n\
             RBO Z 1\n\
             CAP A:0 H\n"
        );
        let parsed: CompatibilityMatrix = written.parse().unwrap();
        assert_eq!(parsed, matrix);
        assert_eq!(parsed.to_string(), written);
        assert_eq!(parsed.capping("A:0"), Some("H"));
    }

    #[test]
    fn merge_unions_rows() {
        let mut left = CompatibilityMatrix::new();
        left.add_pair(&class("A", 0), &class("A", 1));
        let mut right = CompatibilityMatrix::new();
        right.add_pair(&class("B", 0), &class("B", 1));
        right.add_pair(&class("A", 0), &class("A", 1));
        left.merge(&right);
        assert_eq!(left.len(), 4);
        assert_eq!(left.bond_order("B"), Some(BondOrder::Single));
    }

    #[test]
    fn malformed_lines_are_reported() {
        let error = "RCN A:0\n".parse::<CompatibilityMatrix>().unwrap_err();
        assert!(matches!(error, CompatibilityError::MalformedLine { line: 1, .. }));
        assert!("\n# note\nRBO A 9\n".parse::<CompatibilityMatrix>().is_err());
    }
}
