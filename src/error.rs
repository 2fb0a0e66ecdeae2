use core::fmt;

/// Result alias for `coherent`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by reconciliation primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// A series identifier is missing from the aggregation matrix rows.
    HierarchyMismatch {
        /// Offending series identifier.
        uid: String,
    },

    /// A series covers a different timestamp set than its peers.
    RaggedHorizon {
        /// Offending series identifier.
        uid: String,
        /// Timestamps every series must cover.
        expected: usize,
        /// Timestamps this series actually covers.
        found: usize,
    },

    /// Confidence level outside the open interval (0, 100).
    InvalidLevel {
        /// Requested level.
        level: f64,
    },

    /// A requested series has no rows in the table.
    MissingSeries {
        /// Offending series identifier.
        uid: String,
    },

    /// A named column is absent from the table.
    MissingColumn {
        /// Requested column name.
        column: String,
    },

    /// The same (series, timestamp) pair appears more than once.
    DuplicateEntry {
        /// Offending series identifier.
        uid: String,
    },

    /// Matrix dimension mismatch (usize).
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Shape mismatch (string description).
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// Too few usable time steps for a residual-based computation.
    InsufficientHistory {
        /// Time steps required.
        needed: usize,
        /// Time steps available.
        found: usize,
    },

    /// A method requiring in-sample fitted values received none.
    MissingResiduals {
        /// Label of the rejecting method.
        method: String,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Generic error with message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::HierarchyMismatch { uid } => {
                write!(f, "series '{uid}' not present in the aggregation matrix rows")
            }
            Error::RaggedHorizon {
                uid,
                expected,
                found,
            } => {
                write!(
                    f,
                    "ragged horizon: series '{uid}' covers {found} of {expected} timestamps"
                )
            }
            Error::InvalidLevel { level } => {
                write!(
                    f,
                    "confidence level {level} outside the open interval (0, 100)"
                )
            }
            Error::MissingSeries { uid } => {
                write!(f, "series '{uid}' has no rows in the table")
            }
            Error::MissingColumn { column } => write!(f, "column '{column}' not found"),
            Error::DuplicateEntry { uid } => {
                write!(f, "duplicate (series, timestamp) entry for '{uid}'")
            }
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {expected}, actual {actual}")
            }
            Error::InsufficientHistory { needed, found } => {
                write!(
                    f,
                    "insufficient history: needed {needed} usable time steps, found {found}"
                )
            }
            Error::MissingResiduals { method } => {
                write!(f, "{method} requires in-sample fitted values, none were staged")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}
