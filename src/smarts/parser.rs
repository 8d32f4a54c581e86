use std::collections::HashMap;

use crate::consts::ATOMIC_NUMBERS;

use super::error::SmartsError;
use super::query::{AtomExpr, BondExpr};
use super::Smarts;

pub(super) fn parse(input: &str) -> Result<Smarts, SmartsError> {
    if input.trim().is_empty() {
        return Err(SmartsError::EmptyInput);
    }
    let mut parser = Parser::new(input.trim());
    let smarts = parser.parse_chain(false)?;
    match parser.peek() {
        None => Ok(smarts),
        Some(ch) => Err(SmartsError::UnexpectedChar {
            pos: parser.pos,
            ch,
        }),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    bracket_start: usize,
}

fn is_bond_char(ch: char) -> bool {
    matches!(ch, '-' | '=' | '#' | '~' | ':' | '@' | '!')
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            bracket_start: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn parse_number(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos > start {
            self.chars[start..self.pos]
                .iter()
                .collect::<String>()
                .parse()
                .ok()
        } else {
            None
        }
    }

    fn parse_count(&mut self, default: u32) -> Result<u8, SmartsError> {
        let pos = self.pos;
        let count = self.parse_number().unwrap_or(default);
        u8::try_from(count).map_err(|_| SmartsError::InvalidSmarts {
            pos,
            msg: format!("count {count} is out of range"),
        })
    }

    /// Parses atoms, bonds, branches and ring closures. Inside `$(...)` the chain ends at
    /// the first unbalanced `)`.
    fn parse_chain(&mut self, recursive: bool) -> Result<Smarts, SmartsError> {
        let start = self.pos;
        let mut smarts = Smarts::default();
        let mut branches: Vec<usize> = Vec::new();
        let mut current: Option<usize> = None;
        let mut pending_bond: Option<BondExpr> = None;
        let mut ring_bonds: HashMap<u16, (usize, Option<BondExpr>)> = HashMap::new();

        while let Some(ch) = self.peek() {
            match ch {
                '[' => {
                    let expr = self.parse_bracket_atom()?;
                    attach(&mut smarts, expr, &mut current, &mut pending_bond, self.pos)?;
                }
                '(' => {
                    let Some(atom) = current else {
                        return Err(SmartsError::UnmatchedParen { pos: self.pos });
                    };
                    if pending_bond.is_some() {
                        return Err(SmartsError::InvalidSmarts {
                            pos: self.pos,
                            msg: "bond before branch".into(),
                        });
                    }
                    self.pos += 1;
                    branches.push(atom);
                }
                ')' => {
                    let Some(atom) = branches.pop() else {
                        if recursive {
                            break;
                        }
                        return Err(SmartsError::UnmatchedParen { pos: self.pos });
                    };
                    if pending_bond.is_some() {
                        return Err(SmartsError::InvalidSmarts {
                            pos: self.pos,
                            msg: "dangling bond at end of branch".into(),
                        });
                    }
                    self.pos += 1;
                    current = Some(atom);
                }
                '.' => {
                    self.pos += 1;
                    current = None;
                    pending_bond = None;
                }
                _ if is_bond_char(ch) => {
                    if pending_bond.is_some() {
                        return Err(SmartsError::InvalidSmarts {
                            pos: self.pos,
                            msg: "consecutive bond expressions".into(),
                        });
                    }
                    pending_bond = Some(self.parse_bond_low()?);
                }
                '0'..='9' | '%' => {
                    let pos = self.pos;
                    let digit = self.parse_ring_digit()?;
                    let Some(atom) = current else {
                        return Err(SmartsError::InvalidSmarts {
                            pos,
                            msg: "ring closure without preceding atom".into(),
                        });
                    };
                    match ring_bonds.remove(&digit) {
                        Some((other, opening_bond)) => {
                            let expr = pending_bond
                                .take()
                                .or(opening_bond)
                                .unwrap_or(BondExpr::SingleOrAromatic);
                            smarts.add_bond(other, atom, expr);
                        }
                        None => {
                            ring_bonds.insert(digit, (atom, pending_bond.take()));
                        }
                    }
                }
                _ => {
                    let expr = self.parse_bare_atom()?;
                    attach(&mut smarts, expr, &mut current, &mut pending_bond, self.pos)?;
                }
            }
        }

        if !branches.is_empty() {
            return Err(SmartsError::UnmatchedParen { pos: self.pos });
        }
        if pending_bond.is_some() {
            return Err(SmartsError::InvalidSmarts {
                pos: self.pos,
                msg: "dangling bond at end of pattern".into(),
            });
        }
        if let Some(&digit) = ring_bonds.keys().min() {
            return Err(SmartsError::UnclosedRing { digit });
        }
        if smarts.atom_count() == 0 {
            return Err(SmartsError::InvalidSmarts {
                pos: start,
                msg: "pattern without atoms".into(),
            });
        }
        Ok(smarts)
    }

    fn parse_ring_digit(&mut self) -> Result<u16, SmartsError> {
        let start = self.pos;
        if self.peek() == Some('%') {
            self.pos += 1;
            let tens = self.peek().and_then(|c| c.to_digit(10));
            let ones = self.peek_at(1).and_then(|c| c.to_digit(10));
            match (tens, ones) {
                (Some(tens), Some(ones)) => {
                    self.pos += 2;
                    Ok((tens * 10 + ones) as u16)
                }
                _ => Err(SmartsError::InvalidSmarts {
                    pos: start,
                    msg: "expected two digits after %".into(),
                }),
            }
        } else {
            let digit = self.peek().and_then(|c| c.to_digit(10)).ok_or(
                SmartsError::InvalidSmarts {
                    pos: start,
                    msg: "expected ring closure digit".into(),
                },
            )?;
            self.pos += 1;
            Ok(digit as u16)
        }
    }

    fn parse_bond_low(&mut self) -> Result<BondExpr, SmartsError> {
        let mut parts = vec![self.parse_bond_or()?];
        while self.peek() == Some(';') {
            self.pos += 1;
            parts.push(self.parse_bond_or()?);
        }
        Ok(flatten_bond_and(parts))
    }

    fn parse_bond_or(&mut self) -> Result<BondExpr, SmartsError> {
        let mut parts = vec![self.parse_bond_high()?];
        while self.peek() == Some(',') {
            self.pos += 1;
            parts.push(self.parse_bond_high()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            BondExpr::Or(parts)
        })
    }

    fn parse_bond_high(&mut self) -> Result<BondExpr, SmartsError> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                Some('&') => self.pos += 1,
                Some(ch) if is_bond_char(ch) => parts.push(self.parse_bond_unary()?),
                _ => break,
            }
        }
        if parts.is_empty() {
            return Err(SmartsError::InvalidSmarts {
                pos: self.pos,
                msg: "expected bond primitive".into(),
            });
        }
        Ok(flatten_bond_and(parts))
    }

    fn parse_bond_unary(&mut self) -> Result<BondExpr, SmartsError> {
        let pos = self.pos;
        let Some(ch) = self.peek() else {
            return Err(SmartsError::InvalidSmarts {
                pos,
                msg: "expected bond primitive".into(),
            });
        };
        self.pos += 1;
        match ch {
            '!' => Ok(BondExpr::Not(Box::new(self.parse_bond_unary()?))),
            '-' => Ok(BondExpr::Single),
            '=' => Ok(BondExpr::Double),
            '#' => Ok(BondExpr::Triple),
            '~' => Ok(BondExpr::True),
            ':' => Ok(BondExpr::Aromatic),
            '@' => Ok(BondExpr::Ring),
            _ => Err(SmartsError::UnexpectedChar { pos, ch }),
        }
    }

    fn parse_bare_atom(&mut self) -> Result<AtomExpr, SmartsError> {
        let pos = self.pos;
        let Some(ch) = self.peek() else {
            return Err(SmartsError::InvalidSmarts {
                pos,
                msg: "expected atom".into(),
            });
        };
        let two_letter: String = [ch, self.peek_at(1).unwrap_or(' ')].iter().collect();
        let (length, expr) = match ch {
            '*' => (1, AtomExpr::True),
            'a' => (1, AtomExpr::Aromatic),
            'A' => (1, AtomExpr::Aliphatic),
            'C' | 'B' if matches!(two_letter.as_str(), "Cl" | "Br") => {
                (2, aliphatic(&two_letter))
            }
            'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' => (1, aliphatic(&ch.to_string())),
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => (1, aromatic(&ch.to_ascii_uppercase().to_string())),
            _ => return Err(SmartsError::UnexpectedChar { pos, ch }),
        };
        self.pos += length;
        Ok(expr)
    }

    fn parse_bracket_atom(&mut self) -> Result<AtomExpr, SmartsError> {
        let bracket_start = self.pos;
        self.pos += 1;
        self.bracket_start = self.pos;
        let expr = self.parse_atom_low()?;
        if self.peek() != Some(']') {
            return Err(SmartsError::UnclosedBracket { pos: bracket_start });
        }
        self.pos += 1;
        Ok(expr)
    }

    fn parse_atom_low(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = vec![self.parse_atom_or()?];
        while self.peek() == Some(';') {
            self.pos += 1;
            parts.push(self.parse_atom_or()?);
        }
        Ok(flatten_atom_and(parts))
    }

    fn parse_atom_or(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = vec![self.parse_atom_high()?];
        while self.peek() == Some(',') {
            self.pos += 1;
            parts.push(self.parse_atom_high()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            AtomExpr::Or(parts)
        })
    }

    fn parse_atom_high(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SmartsError::UnclosedBracket {
                        pos: self.bracket_start.saturating_sub(1),
                    })
                }
                Some(']' | ',' | ';') => break,
                Some('&') => self.pos += 1,
                Some(_) => parts.push(self.parse_atom_unary()?),
            }
        }
        if parts.is_empty() {
            return Err(SmartsError::InvalidSmarts {
                pos: self.pos,
                msg: "empty atom expression".into(),
            });
        }
        Ok(flatten_atom_and(parts))
    }

    fn parse_atom_unary(&mut self) -> Result<AtomExpr, SmartsError> {
        if self.peek() == Some('!') {
            self.pos += 1;
            return Ok(AtomExpr::Not(Box::new(self.parse_atom_unary()?)));
        }
        self.parse_primitive()
    }

    fn parse_primitive(&mut self) -> Result<AtomExpr, SmartsError> {
        let pos = self.pos;
        let Some(ch) = self.peek() else {
            return Err(SmartsError::InvalidSmarts {
                pos,
                msg: "expected atom primitive".into(),
            });
        };
        let next = self.peek_at(1);

        if ch.is_ascii_uppercase() {
            if let Some(second) = next.filter(|c| c.is_ascii_lowercase()) {
                let symbol: String = [ch, second].iter().collect();
                if ATOMIC_NUMBERS.contains_key(symbol.as_str()) {
                    self.pos += 2;
                    return Ok(aliphatic(&symbol));
                }
            }
        }

        self.pos += 1;
        match ch {
            '*' => Ok(AtomExpr::True),
            'a' if next == Some('s') => {
                self.pos += 1;
                Ok(aromatic("As"))
            }
            'a' => Ok(AtomExpr::Aromatic),
            'A' => Ok(AtomExpr::Aliphatic),
            '#' => {
                let number = self
                    .parse_number()
                    .filter(|n| (1..=118).contains(n))
                    .ok_or(SmartsError::InvalidAtomicNumber { pos })?;
                Ok(AtomExpr::Element {
                    atomic_number: number as u8,
                    aromatic: None,
                })
            }
            'D' => Ok(AtomExpr::Degree(self.parse_count(1)?)),
            'X' => Ok(AtomExpr::Connectivity(self.parse_count(1)?)),
            'H' if pos == self.bracket_start && matches!(next, Some(']' | '+' | '-')) => {
                Ok(aliphatic("H"))
            }
            'H' => Ok(AtomExpr::TotalHCount(self.parse_count(1)?)),
            'v' => Ok(AtomExpr::Valence(self.parse_count(1)?)),
            'x' => Ok(AtomExpr::RingBondCount(self.parse_count(1)?)),
            'R' | 'r' => match self.parse_number() {
                None => Ok(AtomExpr::InRing),
                Some(0) => Ok(AtomExpr::NotInRing),
                Some(n) => {
                    let n = u8::try_from(n).map_err(|_| SmartsError::InvalidSmarts {
                        pos,
                        msg: "ring count out of range".into(),
                    })?;
                    Ok(if ch == 'R' {
                        AtomExpr::RingMembership(n)
                    } else {
                        AtomExpr::SmallestRingSize(n)
                    })
                }
            },
            '+' | '-' => {
                let magnitude = match self.parse_number() {
                    Some(n) => n,
                    None => {
                        let mut n = 1;
                        while self.peek() == Some(ch) {
                            self.pos += 1;
                            n += 1;
                        }
                        n
                    }
                };
                let magnitude = i8::try_from(magnitude).map_err(|_| SmartsError::InvalidSmarts {
                    pos,
                    msg: "charge out of range".into(),
                })?;
                Ok(AtomExpr::Charge(if ch == '-' { -magnitude } else { magnitude }))
            }
            '$' => {
                if self.peek() != Some('(') {
                    return Err(SmartsError::UnclosedRecursive { pos });
                }
                self.pos += 1;
                let bracket_start = self.bracket_start;
                let inner = self.parse_chain(true)?;
                self.bracket_start = bracket_start;
                if self.peek() != Some(')') {
                    return Err(SmartsError::UnclosedRecursive { pos });
                }
                self.pos += 1;
                Ok(AtomExpr::Recursive(Box::new(inner)))
            }
            's' if next == Some('e') => {
                self.pos += 1;
                Ok(aromatic("Se"))
            }
            't' if next == Some('e') => {
                self.pos += 1;
                Ok(aromatic("Te"))
            }
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => Ok(aromatic(&ch.to_ascii_uppercase().to_string())),
            _ if ch.is_ascii_uppercase() && ATOMIC_NUMBERS.contains_key(ch.to_string().as_str()) => {
                Ok(aliphatic(&ch.to_string()))
            }
            '@' => Err(SmartsError::Unsupported {
                pos,
                feature: "chirality".into(),
            }),
            ':' => Err(SmartsError::Unsupported {
                pos,
                feature: "atom map class".into(),
            }),
            _ if ch.is_ascii_digit() => Err(SmartsError::Unsupported {
                pos,
                feature: "isotope".into(),
            }),
            'h' | 'd' | 'z' | 'Z' | '^' => Err(SmartsError::Unsupported {
                pos,
                feature: ch.to_string(),
            }),
            _ => Err(SmartsError::UnexpectedChar { pos, ch }),
        }
    }
}

fn attach(
    smarts: &mut Smarts,
    expr: AtomExpr,
    current: &mut Option<usize>,
    pending_bond: &mut Option<BondExpr>,
    pos: usize,
) -> Result<(), SmartsError> {
    let atom = smarts.add_atom(expr);
    match *current {
        Some(previous) => {
            let bond = pending_bond.take().unwrap_or(BondExpr::SingleOrAromatic);
            smarts.add_bond(previous, atom, bond);
        }
        None if pending_bond.is_some() => {
            return Err(SmartsError::InvalidSmarts {
                pos,
                msg: "bond without preceding atom".into(),
            })
        }
        None => {}
    }
    *current = Some(atom);
    Ok(())
}

fn element(symbol: &str, is_aromatic: bool) -> AtomExpr {
    AtomExpr::Element {
        atomic_number: ATOMIC_NUMBERS.get(symbol).copied().unwrap_or_default(),
        aromatic: Some(is_aromatic),
    }
}

fn aliphatic(symbol: &str) -> AtomExpr {
    element(symbol, false)
}

fn aromatic(symbol: &str) -> AtomExpr {
    element(symbol, true)
}

fn flatten_atom_and(parts: Vec<AtomExpr>) -> AtomExpr {
    let mut flat = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            AtomExpr::And(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        flat.remove(0)
    } else {
        AtomExpr::And(flat)
    }
}

fn flatten_bond_and(parts: Vec<BondExpr>) -> BondExpr {
    let mut flat = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            BondExpr::And(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        flat.remove(0)
    } else {
        BondExpr::And(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_bracket_atoms() {
        let smarts = parse("ClC(=O)c").unwrap();
        assert_eq!(smarts.atom_count(), 4);
        assert_eq!(
            smarts.atoms()[0],
            AtomExpr::Element {
                atomic_number: 17,
                aromatic: Some(false)
            }
        );
        assert_eq!(smarts.bonds()[1].expr, BondExpr::Double);
        assert_eq!(smarts.bonds()[2].atoms, [1, 3]);

        let bracket = parse("[Fe,#27;+2]").unwrap();
        let AtomExpr::And(parts) = &bracket.atoms()[0] else {
            panic!("expected conjunction");
        };
        assert!(matches!(parts[0], AtomExpr::Or(_)));
        assert_eq!(parts[1], AtomExpr::Charge(2));
    }

    #[test]
    fn hydrogen_is_an_element_only_on_its_own() {
        assert_eq!(parse("[H]").unwrap().atoms()[0], aliphatic("H"));
        assert_eq!(
            parse("[CH3]").unwrap().atoms()[0],
            AtomExpr::And(vec![aliphatic("C"), AtomExpr::TotalHCount(3)])
        );
        assert_eq!(parse("[Hg]").unwrap().atoms()[0], aliphatic("Hg"));
    }

    #[test]
    fn ring_closures_and_recursion() {
        let ring = parse("C1CC1").unwrap();
        assert_eq!(ring.bonds().len(), 3);
        let recursive = parse("[$(C(=O)[OH]),$(N)]").unwrap();
        let AtomExpr::Or(parts) = &recursive.atoms()[0] else {
            panic!("expected disjunction");
        };
        let AtomExpr::Recursive(inner) = &parts[0] else {
            panic!("expected recursive pattern");
        };
        assert_eq!(inner.atom_count(), 3);
    }

    #[test]
    fn errors_carry_positions() {
        assert_eq!(parse(""), Err(SmartsError::EmptyInput));
        assert_eq!(parse("[C"), Err(SmartsError::UnclosedBracket { pos: 0 }));
        assert_eq!(parse("C1CC"), Err(SmartsError::UnclosedRing { digit: 1 }));
        assert_eq!(parse("C)C"), Err(SmartsError::UnmatchedParen { pos: 1 }));
        assert!(matches!(parse("[C@H]"), Err(SmartsError::Unsupported { .. })));
        assert!(matches!(parse("[#200]"), Err(SmartsError::InvalidAtomicNumber { .. })));
        assert!(matches!(parse("C-"), Err(SmartsError::InvalidSmarts { .. })));
    }
}
