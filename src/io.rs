//! Reading and writing mass spectrometry data files.
#[cfg(feature = "mzml")]
pub mod mzml;
mod offset_index;
#[cfg(feature = "checksum")]
pub(crate) mod utils;

#[cfg(feature = "mzml")]
pub use crate::io::mzml::{
    read_mzml, write_mzml, write_spectrum_mzml, MzMLParserError, MzMLReader, MzMLWriter,
    MzMLWriterError,
};
pub use crate::io::offset_index::OffsetIndex;
