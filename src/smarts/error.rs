use thiserror::Error;

/// Errors produced when parsing a SMARTS pattern string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmartsError {
    #[error("empty SMARTS string")]
    EmptyInput,
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },
    #[error("unclosed bracket starting at position {pos}")]
    UnclosedBracket { pos: usize },
    #[error("unclosed ring {digit}")]
    UnclosedRing { digit: u16 },
    #[error("unmatched parenthesis at position {pos}")]
    UnmatchedParen { pos: usize },
    #[error("invalid atomic number at position {pos}")]
    InvalidAtomicNumber { pos: usize },
    #[error("unclosed recursive SMARTS at position {pos}")]
    UnclosedRecursive { pos: usize },
    /// Valid SMARTS that this matcher does not evaluate (chirality, isotopes, ...).
    #[error("unsupported SMARTS feature '{feature}' at position {pos}")]
    Unsupported { pos: usize, feature: String },
    #[error("invalid SMARTS at position {pos}: {msg}")]
    InvalidSmarts { pos: usize, msg: String },
}
