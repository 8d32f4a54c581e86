use crate::smarts::SmartsError;
use thiserror::Error;

/// Failure of the pattern-match service for one query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("query '{query}' is not a valid pattern: {source}")]
    Malformed {
        query: String,
        #[source]
        source: SmartsError,
    },
    #[error("query '{query}' exceeded the search budget of {steps} steps")]
    Timeout { query: String, steps: usize },
}

impl MatchError {
    pub fn query(&self) -> &str {
        match self {
            MatchError::Malformed { query, .. } | MatchError::Timeout { query, .. } => query,
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("line {line}: expected 'CTR <name> <priority> <atom0> <atom1> <bond> [options]'")]
    MalformedLine { line: usize },
    #[error("line {line}: invalid priority '{value}'")]
    InvalidPriority { line: usize, value: String },
    #[error("line {line}: unknown rule option '{option}'")]
    UnknownOption { line: usize, option: String },
    #[error("line {line}: rule '{rule}' has an invalid pattern: {source}")]
    Pattern {
        line: usize,
        rule: String,
        #[source]
        source: SmartsError,
    },
    #[error("line {line}: side pattern '{pattern}' of rule '{rule}' must describe exactly one atom")]
    MultiAtomSide {
        line: usize,
        rule: String,
        pattern: String,
    },
    #[error("line {line}: bond pattern '{pattern}' of rule '{rule}' is not a single bond expression")]
    InvalidBond {
        line: usize,
        rule: String,
        pattern: String,
    },
    #[error("rule '{0}' is defined more than once")]
    DuplicateRule(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SdfError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid atom line '{0}'")]
    InvalidAtom(String),
    #[error("unknown element symbol '{0}'")]
    UnknownElement(String),
    #[error("invalid bond line '{0}'")]
    InvalidBond(String),
    #[error("invalid counts line '{0}'")]
    InvalidCounts(String),
    #[error("bond references atom {atom} but the block only has {atoms} atoms")]
    BondOutOfRange { atom: usize, atoms: usize },
    #[error("unexpected end of file inside a molecule block")]
    UnexpectedEndOfFile,
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

#[derive(Debug, Error)]
pub enum XyzError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line_number}: could not parse '{line}'")]
    InvalidLine { line_number: usize, line: String },
    #[error("unknown element symbol '{0}'")]
    UnknownElement(String),
}

/// Problems found while decoding the attachment-point descriptors of a stored fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("malformed descriptor entry '{0}'")]
    MalformedEntry(String),
    #[error("invalid host index '{0}'")]
    InvalidHost(String),
    #[error("invalid attachment-point class '{0}'")]
    InvalidClass(String),
    #[error("invalid bond order '{0}'")]
    InvalidBondOrder(String),
    #[error("host atom {host} is outside of a fragment with {atoms} atoms")]
    HostOutOfRange { host: usize, atoms: usize },
    #[error("descriptors disagree: {0}")]
    Mismatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("cannot identify an empty graph")]
    EmptyGraph,
    #[error("atomic number {0} is not a known element")]
    UnknownElement(u8),
}

#[derive(Debug, Error)]
pub enum CompatibilityError {
    #[error("line {line}: malformed compatibility matrix entry '{content}'")]
    MalformedLine { line: usize, content: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Violations that indicate a logic error. They abort the whole run.
#[derive(Debug, Error)]
pub enum FragmenterError {
    #[error("component of {expected} atoms was cloned into a fragment with {found} atoms")]
    AtomCountMismatch { expected: usize, found: usize },
    #[error("need {needed} synthetic elements but only {available} are free")]
    SyntheticElementPoolExhausted { needed: usize, available: usize },
    #[error("fragment without attachment points cannot be compared")]
    NoAttachmentPoints,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("structure is not three dimensional")]
    NotThreeDimensional,
    #[error("pattern matching failed: {0}")]
    PatternMatch(#[from] MatchError),
    #[error("no cutting rule matched")]
    NoMatches,
    #[error("fragments hold {found} atoms, expected {expected}")]
    AtomCountMismatch { expected: usize, found: usize },
}

impl RejectionReason {
    /// Short key used to group rejections in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectionReason::NotThreeDimensional => "not_3d",
            RejectionReason::PatternMatch(_) => "pattern_match",
            RejectionReason::NoMatches => "no_matches",
            RejectionReason::AtomCountMismatch { .. } => "atom_count_mismatch",
        }
    }
}

/// A molecule routed to the rejected items of a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("molecule {molecule} ('{title}') rejected: {reason}")]
pub struct Rejection {
    pub molecule: usize,
    pub title: String,
    pub reason: RejectionReason,
}
