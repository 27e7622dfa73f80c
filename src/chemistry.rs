//! Elemental formulas, peptide sequences and their masses.
//!
//! An [`ElementalFormula`] is a charged multiset of [`Element`]s. A [`PeptideSequence`]
//! computes its formula for any [`FragmentType`] and charge state, where charge is carried
//! as extra protons, and [`IsotopeDistribution`] gives the nominal mass isotope pattern
//! of any formula.
use thiserror::Error;

mod element;
mod formula;
mod isotopes;
mod modification;
mod residue;
mod sequence;

pub use element::{Element, Isotope};
pub use formula::{ElementalFormula, Iter as FormulaIter};
pub use isotopes::IsotopeDistribution;
pub use modification::{Modification, ModificationSite, MODIFICATIONS};
pub use residue::AminoAcid;
pub use sequence::{FragmentType, PeptideSequence, SequencePosition};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormulaError {
    #[error("Unknown element symbol {0:?}")]
    UnknownElement(String),
    #[error("Malformed formula {text:?} at position {position}")]
    Malformed { text: String, position: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModificationError {
    #[error("Unknown modification {0:?}")]
    Unknown(String),
    #[error("{name} cannot be placed on {site}")]
    SiteNotAllowed { name: String, site: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Unknown residue {residue:?} at position {position}")]
    UnknownResidue { residue: char, position: usize },
    #[error("Malformed sequence {text:?} at position {position}")]
    Malformed { text: String, position: usize },
    #[error("{0}")]
    ModificationError(
        #[from]
        #[source]
        ModificationError,
    ),
    #[error("Range {start}..{end} is out of bounds for a sequence of length {len}")]
    OutOfRange {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("Unknown fragment type {0:?}")]
    UnknownFragmentType(String),
}
