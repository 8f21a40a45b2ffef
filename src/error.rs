//! Error type shared by every operation in the crate.
//!
//! All failures are local validation failures: the offending call leaves the
//! receiver untouched and reports the first violated precondition.

use thiserror::Error;

use crate::model::property::DType;

/// Errors raised by [`System`](crate::System), [`PropertyTable`](crate::PropertyTable)
/// and the neighbor/defect algorithms.
#[derive(Debug, Error)]
pub enum Error {
    /// Atom index outside `[0, natoms)`.
    #[error("atom index {index} out of range for {natoms} atoms")]
    IndexOutOfRange { index: usize, natoms: usize },

    /// Value shape differs from the registered shape of a property.
    #[error("shape mismatch for property '{name}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Value dtype differs from the registered dtype of a property.
    #[error("type mismatch for property '{name}': expected {expected:?}, found {found:?}")]
    TypeMismatch {
        name: String,
        expected: DType,
        found: DType,
    },

    /// Per-atom properties are limited to scalars, vectors and matrices.
    #[error("unsupported shape {shape:?} for property '{name}' (rank must be <= 2)")]
    UnsupportedShape { name: String, shape: Vec<usize> },

    /// A value whose data does not agree with its declared shape or dtype.
    #[error("malformed value: {0}")]
    MalformedValue(String),

    #[error("degenerate box: {0}")]
    DegenerateBox(String),

    #[error("cutoff must be positive, got {0}")]
    InvalidCutoff(f64),

    #[error("bin multiplier must be at least 1, got {0}")]
    InvalidBinMultiplier(usize),

    /// Wrong or missing combination of arguments for a point defect.
    #[error("invalid point defect specification: {0}")]
    InvalidDefectSpecification(String),

    /// Site lookup by position found the wrong number of atoms.
    #[error("site lookup expected {expected} atom(s) at the given position, found {found}")]
    AmbiguousSiteLookup { expected: usize, found: usize },

    /// Atom types are positive integers.
    #[error("atom type must be >= 1, got {0}")]
    InvalidAtomType(i64),

    #[error("supercell multipliers must be positive, got {nx}x{ny}x{nz}")]
    InvalidSupercell { nx: usize, ny: usize, nz: usize },

    /// Malformed line in a neighbor-list file (1-based line number).
    #[error("parse error on line {line}: {detail}")]
    Parse { line: usize, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
