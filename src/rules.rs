//! Cutting rules and the attachment-point classes they define.
//!
//! A rules file holds one rule per line:
//!
//! ```text
//! # name     priority  atom 0   atom 1   bond  options
//! CTR C1     1         [C]      [O]      -
//! CTR MC     2         [Fe]     [c]      ~     HAPTO
//! CTR RS     3         [C;R]    [N]      -     RING>6
//! ```

use core::fmt::{self, Display, Formatter};
use core::hash::{Hash, Hasher};
use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;

use crate::bond::BondOrder;
use crate::error::RuleError;
use crate::smarts::{BondExpr, Smarts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOption {
    /// `RING>n`: only bonds whose smallest ring is larger than `n`, or that are in no ring.
    MinRingSize(usize),
    /// `OMRING>n`: as `RING>n`, but only rings containing a metal atom are considered.
    MinMetalRingSize(usize),
    /// `HAPTO`: contiguous ligand atoms bound to one center are cut as a single unit.
    Hapticity,
}

impl FromStr for RuleOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "HAPTO" {
            return Ok(RuleOption::Hapticity);
        }
        let parse_size = |value: &str| value.parse::<usize>().map_err(|_| s.to_string());
        if let Some(size) = s.strip_prefix("OMRING>") {
            Ok(RuleOption::MinMetalRingSize(parse_size(size)?))
        } else if let Some(size) = s.strip_prefix("RING>") {
            Ok(RuleOption::MinRingSize(parse_size(size)?))
        } else {
            Err(s.to_string())
        }
    }
}

impl Display for RuleOption {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RuleOption::MinRingSize(size) => write!(f, "RING>{size}"),
            RuleOption::MinMetalRingSize(size) => write!(f, "OMRING>{size}"),
            RuleOption::Hapticity => write!(f, "HAPTO"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CuttingRule {
    pub name: String,
    pub atom_smarts: [String; 2],
    pub bond_smarts: String,
    /// Lower values are processed first.
    pub priority: i32,
    pub options: Vec<RuleOption>,
    sides: [Smarts; 2],
    bond: BondExpr,
}

impl CuttingRule {
    /// Builds a rule, parsing its patterns. Each side must describe exactly one atom.
    ///
    /// ```
    /// use fragmentation::rules::CuttingRule;
    /// let rule = CuttingRule::new("C1", "[C]", "[O]", "-", 1, vec![]).unwrap();
    /// assert_eq!(rule.whole_smarts(), "[C]-[O]");
    /// assert!(!rule.is_symmetric());
    /// ```
    pub fn new(
        name: impl Into<String>,
        atom0: impl Into<String>,
        atom1: impl Into<String>,
        bond: impl Into<String>,
        priority: i32,
        options: Vec<RuleOption>,
    ) -> Result<CuttingRule, RuleError> {
        Self::build(0, name.into(), [atom0.into(), atom1.into()], bond.into(), priority, options)
    }

    fn build(
        line: usize,
        name: String,
        atom_smarts: [String; 2],
        bond_smarts: String,
        priority: i32,
        options: Vec<RuleOption>,
    ) -> Result<CuttingRule, RuleError> {
        let parse = |pattern: &str| {
            Smarts::parse(pattern).map_err(|source| RuleError::Pattern {
                line,
                rule: name.clone(),
                source,
            })
        };
        let sides = [parse(&atom_smarts[0])?, parse(&atom_smarts[1])?];
        for (side, pattern) in sides.iter().zip(&atom_smarts) {
            if side.atom_count() != 1 {
                return Err(RuleError::MultiAtomSide {
                    line,
                    rule: name.clone(),
                    pattern: pattern.clone(),
                });
            }
        }
        // a lone bond expression is checked through a two-atom pattern
        let bond_pattern = parse(&format!("*{bond_smarts}*"))?;
        let bond = match bond_pattern.bonds() {
            [single] if bond_pattern.atom_count() == 2 => single.expr.clone(),
            _ => {
                return Err(RuleError::InvalidBond {
                    line,
                    rule: name.clone(),
                    pattern: bond_smarts,
                })
            }
        };
        Ok(CuttingRule {
            name,
            atom_smarts,
            bond_smarts,
            priority,
            options,
            sides,
            bond,
        })
    }

    /// Both sides use the same pattern, so the two ends of a match cannot be told apart.
    pub fn is_symmetric(&self) -> bool {
        self.atom_smarts[0] == self.atom_smarts[1]
    }

    pub fn involves_metal(&self) -> bool {
        self.sides.iter().any(Smarts::references_metal)
    }

    /// The side naming a metal when exactly one side does.
    pub fn metal_side(&self) -> Option<usize> {
        match (self.sides[0].references_metal(), self.sides[1].references_metal()) {
            (true, false) => Some(0),
            (false, true) => Some(1),
            _ => None,
        }
    }

    pub fn is_hapto(&self) -> bool {
        self.options.contains(&RuleOption::Hapticity)
    }

    pub fn min_ring_size(&self) -> Option<usize> {
        self.options.iter().find_map(|option| match option {
            RuleOption::MinRingSize(size) => Some(*size),
            _ => None,
        })
    }

    pub fn min_metal_ring_size(&self) -> Option<usize> {
        self.options.iter().find_map(|option| match option {
            RuleOption::MinMetalRingSize(size) => Some(*size),
            _ => None,
        })
    }

    pub fn side(&self, side: usize) -> &Smarts {
        &self.sides[side]
    }

    pub fn side_is_wildcard(&self, side: usize) -> bool {
        self.sides[side].is_wildcard()
    }

    pub fn bond_expr(&self) -> &BondExpr {
        &self.bond
    }

    /// The two-atom pattern matched against molecules.
    pub fn whole_smarts(&self) -> String {
        format!(
            "{}{}{}",
            self.atom_smarts[0], self.bond_smarts, self.atom_smarts[1]
        )
    }

    /// Order of the cut bond: single unless the bond pattern names another order.
    pub fn bond_order(&self) -> BondOrder {
        self.bond.explicit_order().unwrap_or_default()
    }

    /// Class of the attachment points created on the given side. Symmetric rules have a
    /// single class.
    pub fn class(&self, side: usize) -> AttachmentPointClass {
        AttachmentPointClass {
            rule: self.name.clone(),
            subclass: if self.is_symmetric() { 0 } else { side as u8 },
            bond_order: self.bond_order(),
            involves_metal: self.involves_metal(),
            hapto: self.is_hapto(),
            symmetric: self.is_symmetric(),
        }
    }

    pub fn classes(&self) -> Vec<AttachmentPointClass> {
        if self.is_symmetric() {
            vec![self.class(0)]
        } else {
            vec![self.class(0), self.class(1)]
        }
    }
}

/// Rule name plus side. The cached flags only inform sorting and bookkeeping; equality,
/// hashing and ordering use the name and side alone.
#[derive(Debug, Clone)]
pub struct AttachmentPointClass {
    pub rule: String,
    pub subclass: u8,
    pub bond_order: BondOrder,
    pub involves_metal: bool,
    pub hapto: bool,
    pub symmetric: bool,
}

impl AttachmentPointClass {
    pub fn new(rule: impl Into<String>, subclass: u8) -> Self {
        AttachmentPointClass {
            rule: rule.into(),
            subclass,
            bond_order: BondOrder::Single,
            involves_metal: false,
            hapto: false,
            symmetric: false,
        }
    }

    pub fn with_bond_order(mut self, bond_order: BondOrder) -> Self {
        self.bond_order = bond_order;
        self
    }
}

impl PartialEq for AttachmentPointClass {
    fn eq(&self, other: &Self) -> bool {
        self.rule == other.rule && self.subclass == other.subclass
    }
}

impl Eq for AttachmentPointClass {}

impl Hash for AttachmentPointClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rule.hash(state);
        self.subclass.hash(state);
    }
}

impl PartialOrd for AttachmentPointClass {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttachmentPointClass {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rule
            .cmp(&other.rule)
            .then(self.subclass.cmp(&other.subclass))
    }
}

impl Display for AttachmentPointClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rule, self.subclass)
    }
}

impl FromStr for AttachmentPointClass {
    type Err = String;

    /// Parses `rule:subclass`; the rule name may itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rule, subclass) = s.rsplit_once(':').ok_or_else(|| s.to_string())?;
        let subclass = subclass.parse::<u8>().map_err(|_| s.to_string())?;
        if rule.is_empty() || subclass > 1 {
            return Err(s.to_string());
        }
        Ok(AttachmentPointClass::new(rule, subclass))
    }
}

/// Cutting rules in processing order.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<CuttingRule>,
}

impl RuleRegistry {
    /// Orders rules by ascending priority; rules of equal priority keep their given order.
    pub fn new(mut rules: Vec<CuttingRule>) -> Result<RuleRegistry, RuleError> {
        for (index, rule) in rules.iter().enumerate() {
            if rules[..index].iter().any(|other| other.name == rule.name) {
                return Err(RuleError::DuplicateRule(rule.name.clone()));
            }
        }
        rules.sort_by_key(|rule| rule.priority);
        Ok(RuleRegistry { rules })
    }

    /// Parses the rules file format described in the module documentation.
    ///
    /// ```
    /// use fragmentation::rules::RuleRegistry;
    /// let registry = RuleRegistry::parse("CTR B 2 [C] [N] -\nCTR A 1 [C] [O] =\n").unwrap();
    /// let names: Vec<&str> = registry.rules().iter().map(|rule| rule.name.as_str()).collect();
    /// assert_eq!(names, ["A", "B"]);
    /// assert_eq!(registry.classes().len(), 4);
    /// ```
    pub fn parse(content: &str) -> Result<RuleRegistry, RuleError> {
        let mut rules = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line_number = index + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [tag, name, priority, atom0, atom1, bond, options @ ..] = fields.as_slice() else {
                return Err(RuleError::MalformedLine { line: line_number });
            };
            if *tag != "CTR" {
                return Err(RuleError::MalformedLine { line: line_number });
            }
            let priority = priority
                .parse::<i32>()
                .map_err(|_| RuleError::InvalidPriority {
                    line: line_number,
                    value: priority.to_string(),
                })?;
            let options = options
                .iter()
                .map(|option| {
                    option
                        .parse::<RuleOption>()
                        .map_err(|option| RuleError::UnknownOption {
                            line: line_number,
                            option,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(CuttingRule::build(
                line_number,
                name.to_string(),
                [atom0.to_string(), atom1.to_string()],
                bond.to_string(),
                priority,
                options,
            )?);
        }
        RuleRegistry::new(rules)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RuleRegistry, RuleError> {
        let content = std::fs::read_to_string(path)?;
        RuleRegistry::parse(&content)
    }

    pub fn rules(&self) -> &[CuttingRule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&CuttingRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every attachment-point class the rules can produce, in processing order.
    pub fn classes(&self) -> Vec<AttachmentPointClass> {
        self.rules.iter().flat_map(CuttingRule::classes).collect()
    }

    /// The registered class for `rule:subclass`, with its cached flags filled in.
    pub fn class(&self, rule: &str, subclass: u8) -> Option<AttachmentPointClass> {
        let rule = self.get(rule)?;
        (subclass == 0 || (!rule.is_symmetric() && subclass == 1)).then(|| rule.class(subclass as usize))
    }
}
