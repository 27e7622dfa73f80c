use std::borrow::Cow;

use mzpeaks::{CentroidPeak, PeakSet};
use thiserror::Error;

use crate::params::{ParamDescribed, ParamList};
use crate::spectrum::bindata::{
    to_bytes, ArrayRetrievalError, ArrayType, BinaryArrayMap, BinaryDataArrayType, DataArray,
};
use crate::spectrum::peaks::PeakDataLevel;
use crate::spectrum::scan_properties::{
    Acquisition, Precursor, ScanPolarity, SignalContinuity, SpectrumDescription,
};

/// A trait for providing a uniform delegated access to spectrum metadata
pub trait SpectrumLike: ParamDescribed {
    /// The method to access the spectrum description itself, which supplies
    /// the data for most other methods on this trait.
    fn description(&self) -> &SpectrumDescription;

    /// The method to access the spectrum description itself, mutably.
    fn description_mut(&mut self) -> &mut SpectrumDescription;

    /// Access the acquisition information for this spectrum.
    #[inline]
    fn acquisition(&self) -> &Acquisition {
        &self.description().acquisition
    }

    /// Access the precursor information, if it exists.
    #[inline]
    fn precursor(&self) -> Option<&Precursor> {
        self.description().precursor.as_ref()
    }

    /// A shortcut method to retrieve the scan start time of a spectrum
    #[inline]
    fn start_time(&self) -> f64 {
        self.acquisition().start_time().unwrap_or_default()
    }

    /// Access the MS exponentiation level
    #[inline]
    fn ms_level(&self) -> u8 {
        self.description().ms_level
    }

    /// Access the native ID string for the spectrum
    #[inline]
    fn id(&self) -> &str {
        &self.description().id
    }

    /// Access the index of the spectrum in the source file
    #[inline]
    fn index(&self) -> usize {
        self.description().index
    }

    /// Access a description of how raw the signal is, whether a
    /// profile spectrum is available or only centroids are present.
    #[inline]
    fn signal_continuity(&self) -> SignalContinuity {
        self.description().signal_continuity
    }

    /// Access a description of the spectrum polarity
    #[inline]
    fn polarity(&self) -> ScanPolarity {
        self.description().polarity
    }

    /// Retrieve the most processed representation of the mass spectrum's signal
    fn peaks(&'_ self) -> PeakDataLevel<'_>;
}

/// Errors that may arise when converting between different spectrum representations
/// or when checking that a spectrum's arrays are consistent
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpectrumConversionError {
    #[error("m/z array of length {mz_len} does not match intensity array of length {intensity_len}")]
    MZIntensityArraySizeMismatch { mz_len: usize, intensity_len: usize },
    #[error("m/z array is not sorted, {index} is smaller than its predecessor")]
    MZNotSorted { index: usize },
    #[error("Operation expected centroided data but did not find it")]
    NotCentroided,
    #[error("An error occurred while accessing raw data arrays: {0}")]
    ArrayRetrievalError(
        #[from]
        #[source]
        ArrayRetrievalError,
    ),
}

/// A mass spectrum as stored in a data file: its description and its named data
/// arrays. The signal may be profile or centroid, per
/// [`SpectrumDescription::signal_continuity`].
///
/// The m/z and intensity arrays always have the same length and m/z values never
/// decrease; constructors check this.
#[derive(Debug, Default, Clone)]
pub struct Spectrum {
    pub description: SpectrumDescription,
    pub arrays: BinaryArrayMap,
}

impl Spectrum {
    pub fn new(
        description: SpectrumDescription,
        arrays: BinaryArrayMap,
    ) -> Result<Self, SpectrumConversionError> {
        let inst = Self {
            description,
            arrays,
        };
        inst.validate()?;
        Ok(inst)
    }

    pub fn from_arrays(
        description: SpectrumDescription,
        mzs: &[f64],
        intensities: &[f32],
    ) -> Result<Self, SpectrumConversionError> {
        let arrays = BinaryArrayMap::from_mzs_and_intensities(mzs, intensities)?;
        Self::new(description, arrays)
    }

    /// Check the length and ordering of the m/z and intensity arrays. A missing array
    /// counts as empty.
    pub fn validate(&self) -> Result<(), SpectrumConversionError> {
        let mzs = self.mzs()?;
        let intensities = self.intensities()?;
        if mzs.len() != intensities.len() {
            return Err(SpectrumConversionError::MZIntensityArraySizeMismatch {
                mz_len: mzs.len(),
                intensity_len: intensities.len(),
            });
        }
        if let Some(i) = mzs.windows(2).position(|w| w[1] < w[0]) {
            return Err(SpectrumConversionError::MZNotSorted { index: i + 1 });
        }
        Ok(())
    }

    /// The m/z array, empty when the spectrum has none
    pub fn mzs(&'_ self) -> Result<Cow<'_, [f64]>, ArrayRetrievalError> {
        match self.arrays.mzs() {
            Err(ArrayRetrievalError::NotFound(_)) => Ok(Cow::Owned(Vec::new())),
            res => res,
        }
    }

    /// The intensity array, empty when the spectrum has none
    pub fn intensities(&'_ self) -> Result<Cow<'_, [f32]>, ArrayRetrievalError> {
        match self.arrays.intensities() {
            Err(ArrayRetrievalError::NotFound(_)) => Ok(Cow::Owned(Vec::new())),
            res => res,
        }
    }

    /// The number of points in the signal
    pub fn len(&self) -> usize {
        self.peaks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert a centroid spectrum into a [`CentroidSpectrum`] holding a [`PeakSet`].
    ///
    /// Profile spectra must be peak picked first.
    pub fn into_centroid(self) -> Result<CentroidSpectrum, SpectrumConversionError> {
        if self.description.signal_continuity != SignalContinuity::Centroid {
            return Err(SpectrumConversionError::NotCentroided);
        }
        let peaks = {
            let mzs = self.mzs()?;
            let intensities = self.intensities()?;
            PeakSet::new(
                mzs.iter()
                    .zip(intensities.iter())
                    .map(|(mz, inten)| CentroidPeak::new(*mz, *inten, 0))
                    .collect(),
            )
        };
        Ok(CentroidSpectrum {
            description: self.description,
            peaks,
        })
    }
}

impl ParamDescribed for Spectrum {
    fn params(&self) -> &ParamList {
        &self.description.params
    }

    fn params_mut(&mut self) -> &mut ParamList {
        &mut self.description.params
    }
}

impl SpectrumLike for Spectrum {
    fn description(&self) -> &SpectrumDescription {
        &self.description
    }

    fn description_mut(&mut self) -> &mut SpectrumDescription {
        &mut self.description
    }

    fn peaks(&'_ self) -> PeakDataLevel<'_> {
        if self.arrays.is_empty() {
            PeakDataLevel::Missing
        } else {
            PeakDataLevel::RawData(&self.arrays)
        }
    }
}

/// A centroided spectrum whose peaks are held in a [`PeakSet`] sorted by m/z
#[derive(Debug, Default, Clone)]
pub struct CentroidSpectrum {
    pub description: SpectrumDescription,
    pub peaks: PeakSet,
}

impl CentroidSpectrum {
    pub fn new(description: SpectrumDescription, peaks: PeakSet) -> Self {
        Self { description, peaks }
    }
}

impl ParamDescribed for CentroidSpectrum {
    fn params(&self) -> &ParamList {
        &self.description.params
    }

    fn params_mut(&mut self) -> &mut ParamList {
        &mut self.description.params
    }
}

impl SpectrumLike for CentroidSpectrum {
    fn description(&self) -> &SpectrumDescription {
        &self.description
    }

    fn description_mut(&mut self) -> &mut SpectrumDescription {
        &mut self.description
    }

    fn peaks(&'_ self) -> PeakDataLevel<'_> {
        PeakDataLevel::Centroid(&self.peaks)
    }
}

impl From<CentroidSpectrum> for Spectrum {
    fn from(value: CentroidSpectrum) -> Self {
        let mzs: Vec<f64> = value.peaks.iter().map(|p| p.mz).collect();
        let intensities: Vec<f32> = value.peaks.iter().map(|p| p.intensity).collect();
        let mut arrays = BinaryArrayMap::new();
        arrays.add(DataArray::wrap(
            &ArrayType::MZArray,
            BinaryDataArrayType::Float64,
            to_bytes(&mzs),
        ));
        arrays.add(DataArray::wrap(
            &ArrayType::IntensityArray,
            BinaryDataArrayType::Float32,
            to_bytes(&intensities),
        ));
        let mut description = value.description;
        description.signal_continuity = SignalContinuity::Centroid;
        Spectrum {
            description,
            arrays,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn description() -> SpectrumDescription {
        SpectrumDescription::new("scan=1", 0, 1)
    }

    #[test]
    fn test_validation() {
        let spec = Spectrum::from_arrays(description(), &[1.0, 2.0, 2.0, 3.0], &[0.0, 1.0, 2.0, 0.0])
            .unwrap();
        assert_eq!(spec.len(), 4);
        assert_eq!(spec.ms_level(), 1);
        assert_eq!(spec.id(), "scan=1");

        let err = Spectrum::from_arrays(description(), &[1.0, 2.0], &[0.0]).unwrap_err();
        assert_eq!(
            err,
            SpectrumConversionError::MZIntensityArraySizeMismatch {
                mz_len: 2,
                intensity_len: 1
            }
        );

        let err = Spectrum::from_arrays(description(), &[1.0, 3.0, 2.0], &[0.0, 1.0, 1.0])
            .unwrap_err();
        assert_eq!(err, SpectrumConversionError::MZNotSorted { index: 2 });

        let empty = Spectrum::new(description(), BinaryArrayMap::new()).unwrap();
        assert!(empty.is_empty());
        assert!(matches!(empty.peaks(), PeakDataLevel::Missing));
    }

    #[test]
    fn test_centroid_conversion() {
        let mut desc = description();
        let spec = Spectrum::from_arrays(desc.clone(), &[100.0, 200.0], &[10.0, 20.0]).unwrap();
        assert_eq!(
            spec.clone().into_centroid().unwrap_err(),
            SpectrumConversionError::NotCentroided
        );

        desc.signal_continuity = SignalContinuity::Centroid;
        let spec = Spectrum::from_arrays(desc, &[100.0, 200.0], &[10.0, 20.0]).unwrap();
        let centroided = spec.into_centroid().unwrap();
        assert_eq!(centroided.peaks().len(), 2);
        assert_eq!(centroided.peaks().base_peak().mz, 200.0);

        let back: Spectrum = centroided.into();
        assert_eq!(back.mzs().unwrap().as_ref(), &[100.0, 200.0]);
        assert_eq!(back.signal_continuity(), SignalContinuity::Centroid);
        back.validate().unwrap();
    }
}
