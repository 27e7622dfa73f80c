//! Centroiding of profile spectra.
//!
//! A [`PeakPicker`] is built from a validated [`PeakPickerParams`] and converts profile
//! [`Spectrum`](crate::spectrum::Spectrum)s, or whole
//! [`SpectrumCollection`](crate::spectrum::SpectrumCollection)s, into centroid spectra.
//! Signal-to-noise ratios come from a [`SignalToNoiseEstimator`] and peak apexes from a
//! [`CubicSpline`] fit through each peak.
use thiserror::Error;

use crate::spectrum::{ArrayRetrievalError, SpectrumConversionError};

mod config;
mod noise;
mod picker;
mod spline;

pub use config::{
    FwhmUnit, NoiseAutoMode, PeakPickerConfigError, PeakPickerParams, SignalToNoiseParams,
    OPTION_NAMES,
};
pub use noise::SignalToNoiseEstimator;
pub use picker::{PeakPicker, PickedPeak};
pub use spline::CubicSpline;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PeakPickerError {
    #[error("Invalid peak picking configuration: {0}")]
    ConfigError(
        #[from]
        #[source]
        PeakPickerConfigError,
    ),
    #[error("An error occurred while accessing raw data arrays: {0}")]
    ArrayRetrievalError(
        #[from]
        #[source]
        ArrayRetrievalError,
    ),
    #[error("Failed to build the centroid spectrum: {0}")]
    SpectrumConversionError(
        #[from]
        #[source]
        SpectrumConversionError,
    ),
}
