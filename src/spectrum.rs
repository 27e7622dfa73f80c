//! The in-memory representation of mass spectra and runs of them.
//!
//! A [`Spectrum`] pairs a [`SpectrumDescription`] with a [`BinaryArrayMap`] of named
//! data arrays, [`CentroidSpectrum`] holds picked peaks as a [`mzpeaks::PeakSet`], and a
//! [`SpectrumCollection`] is an ordered run of spectra with its file level metadata.
pub mod bindata;
pub(crate) mod collection;
pub(crate) mod peaks;
pub mod scan_properties;
pub(crate) mod spectrum_types;

pub use crate::spectrum::bindata::{
    ArrayRetrievalError, ArrayType, BinaryArrayMap, BinaryCompressionType, BinaryDataArrayType,
    ByteArrayView, ByteArrayViewMut, DataArray,
};
pub use crate::spectrum::collection::SpectrumCollection;
pub use crate::spectrum::peaks::PeakDataLevel;
pub use crate::spectrum::scan_properties::*;
pub use crate::spectrum::spectrum_types::{
    CentroidSpectrum, Spectrum, SpectrumConversionError, SpectrumLike,
};
