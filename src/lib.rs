//! `mzkit` reads and writes mass spectra in the mzML format, centroids profile spectra,
//! and computes formulas, masses and isotope distributions of peptides.
//!
//! ```no_run
//! use mzkit::io::read_mzml;
//! use mzkit::peak_picking::{PeakPicker, PeakPickerParams};
//!
//! let collection = read_mzml("test/data/small.mzML").unwrap();
//! let picker = PeakPicker::new(PeakPickerParams::default()).unwrap();
//! let centroided = picker.pick_collection(&collection).unwrap();
//! assert_eq!(centroided.len(), collection.len());
//! ```
pub mod chemistry;
pub mod io;
pub mod meta;
pub mod params;
pub mod peak_picking;
pub mod spectrum;
pub mod utils;

#[cfg(feature = "mzml")]
pub use crate::io::mzml::{read_mzml, write_mzml, MzMLReader, MzMLWriter};

pub use crate::chemistry::{ElementalFormula, FragmentType, IsotopeDistribution, PeptideSequence};
pub use crate::peak_picking::{PeakPicker, PeakPickerParams};
pub use crate::spectrum::{CentroidSpectrum, Spectrum, SpectrumCollection, SpectrumLike};
