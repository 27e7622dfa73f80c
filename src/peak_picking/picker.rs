use std::ops::Range;

use log::{debug, trace};
#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::meta::{DataProcessing, ProcessingMethod, Software};
use crate::params::{ControlledVocabulary, ParamDescribed};
use crate::spectrum::bindata::{
    to_bytes, ArrayType, BinaryArrayMap, BinaryDataArrayType, DataArray,
};
use crate::spectrum::{SignalContinuity, Spectrum, SpectrumCollection, SpectrumLike};

use super::config::{FwhmUnit, PeakPickerParams};
use super::noise::SignalToNoiseEstimator;
use super::spline::CubicSpline;
use super::PeakPickerError;

/// The fewest samples a spectrum must have to hold a peak
const MIN_SAMPLES: usize = 5;

/// The bisection tolerance used to locate a peak apex, in m/z
const APEX_TOLERANCE: f64 = 1e-6;

/// A single centroid found in a profile signal
#[derive(Debug, Clone, PartialEq)]
pub struct PickedPeak {
    pub mz: f64,
    pub intensity: f32,
    /// The full width at half maximum, in m/z. Zero when widths are not requested.
    pub fwhm: f64,
    /// The samples of the profile signal that make up the peak
    pub index: Range<usize>,
}

/**
Converts profile spectra into centroid spectra.

Peak cores are local maxima that satisfy spacing and signal-to-noise criteria. Each core is
extended while the signal keeps falling on both sides, a natural cubic spline is fit through
the region and the apex of the spline gives the centroid.

```
use mzkit::peak_picking::{PeakPicker, PeakPickerParams};

let picker = PeakPicker::new(PeakPickerParams::default()).unwrap();
let mzs: Vec<f64> = (0..200).map(|i| 400.0 + i as f64 * 0.001).collect();
let intensities: Vec<f32> = mzs
    .iter()
    .map(|mz| (1e4 * (-(mz - 400.1f64).powi(2) / (2.0 * 0.005f64.powi(2))).exp()) as f32)
    .collect();
let peaks = picker.pick_peaks(&mzs, &intensities);
assert_eq!(peaks.len(), 1);
assert!((peaks[0].mz - 400.1).abs() < 1e-3);
```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct PeakPicker {
    params: PeakPickerParams,
}

impl PeakPicker {
    /// Create a picker, checking the parameters first
    pub fn new(params: PeakPickerParams) -> Result<Self, PeakPickerError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &PeakPickerParams {
        &self.params
    }

    /// Find the peaks of a profile signal.
    ///
    /// Degenerate input, fewer than five samples or no intensity at all, gives an empty list.
    pub fn pick_peaks(&self, mzs: &[f64], intensities: &[f32]) -> Vec<PickedPeak> {
        let n = mzs.len().min(intensities.len());
        let mut peaks = Vec::new();
        if n < MIN_SAMPLES || intensities[..n].iter().all(|v| *v == 0.0) {
            return peaks;
        }
        let mzs = &mzs[..n];
        let intensities = &intensities[..n];

        let threshold = self.params.signal_to_noise;
        let snr = if threshold > 0.0 {
            if n < self.params.noise.min_required_elements {
                debug!(
                    "Only {n} samples, fewer than the {} needed to estimate noise",
                    self.params.noise.min_required_elements
                );
                return peaks;
            }
            Some(SignalToNoiseEstimator::estimate(
                mzs,
                intensities,
                &self.params.noise,
            ))
        } else {
            None
        };
        let passes = |i: usize| -> bool {
            match snr.as_ref() {
                Some(snr) => snr[i] >= threshold,
                None => true,
            }
        };

        let mut i = 1;
        while i + 1 < n {
            let central_mz = mzs[i];
            let central_int = intensities[i];
            let left_mz = mzs[i - 1];
            let left_int = intensities[i - 1];
            let right_mz = mzs[i + 1];
            let right_int = intensities[i + 1];

            let left_to_central = central_mz - left_mz;
            let central_to_right = right_mz - central_mz;
            let min_spacing = left_to_central.min(central_to_right);
            let spacing_limit = self.params.spacing_difference * min_spacing;

            let is_core = central_int > left_int
                && central_int > right_int
                && passes(i)
                && passes(i - 1)
                && passes(i + 1)
                && left_to_central < spacing_limit
                && central_to_right < spacing_limit;
            if !is_core {
                i += 1;
                continue;
            }

            // A core between two more intense satellites is an oscillation, not a peak
            if i >= 2
                && i + 2 < n
                && left_int < intensities[i - 2]
                && right_int < intensities[i + 2]
                && passes(i - 2)
                && passes(i + 2)
            {
                trace!("Skipping oscillation at {central_mz}");
                i += 2;
                continue;
            }

            let gap_limit = self.params.spacing_difference_gap * min_spacing;

            let mut left_points: Vec<(f64, f64)> = Vec::new();
            let mut left_boundary = i - 1;
            {
                let mut outer_mz = left_mz;
                let mut outer_int = left_int;
                let mut missing = 0;
                let mut previous_zero = false;
                let mut k = 2;
                while k <= i
                    && !previous_zero
                    && missing <= self.params.missing
                    && intensities[i - k] <= outer_int
                {
                    let j = i - k;
                    let keep = if passes(j) && (outer_mz - mzs[j]).abs() < gap_limit {
                        true
                    } else {
                        missing += 1;
                        missing <= self.params.missing
                    };
                    if keep {
                        left_points.push((mzs[j], intensities[j] as f64));
                        outer_mz = mzs[j];
                        outer_int = intensities[j];
                    }
                    previous_zero = intensities[j] == 0.0;
                    left_boundary = j;
                    k += 1;
                }
            }

            let mut right_points: Vec<(f64, f64)> = Vec::new();
            let mut right_boundary = i + 1;
            {
                let mut outer_mz = right_mz;
                let mut outer_int = right_int;
                let mut missing = 0;
                let mut previous_zero = false;
                let mut k = 2;
                while i + k < n
                    && !previous_zero
                    && missing <= self.params.missing
                    && intensities[i + k] <= outer_int
                {
                    let j = i + k;
                    let keep = if passes(j) && (mzs[j] - outer_mz).abs() < gap_limit {
                        true
                    } else {
                        missing += 1;
                        missing <= self.params.missing
                    };
                    if keep {
                        right_points.push((mzs[j], intensities[j] as f64));
                        outer_mz = mzs[j];
                        outer_int = intensities[j];
                    }
                    previous_zero = intensities[j] == 0.0;
                    right_boundary = j;
                    k += 1;
                }
            }

            let mut xs = Vec::with_capacity(left_points.len() + right_points.len() + 3);
            let mut ys = Vec::with_capacity(xs.capacity());
            let core = [
                (left_mz, left_int as f64),
                (central_mz, central_int as f64),
                (right_mz, right_int as f64),
            ];
            for (x, y) in left_points
                .iter()
                .rev()
                .chain(core.iter())
                .chain(right_points.iter())
            {
                // Repeated m/z values keep the first intensity seen
                if xs.last().is_some_and(|last| *x <= *last) {
                    continue;
                }
                xs.push(*x);
                ys.push(*y);
            }

            if let Some(peak) = self.fit_peak(&xs, &ys, left_mz, right_mz, left_boundary..right_boundary + 1) {
                peaks.push(peak);
            }
            i = right_boundary + 1;
        }
        peaks
    }

    fn fit_peak(
        &self,
        xs: &[f64],
        ys: &[f64],
        left_mz: f64,
        right_mz: f64,
        index: Range<usize>,
    ) -> Option<PickedPeak> {
        let spline = CubicSpline::new(xs, ys)?;
        let (apex_mz, apex_int) = spline.find_maximum(left_mz, right_mz, APEX_TOLERANCE);
        if !(apex_int > 0.0) {
            trace!("Discarding peak at {apex_mz} with interpolated intensity {apex_int}");
            return None;
        }

        let fwhm = if self.params.report_fwhm {
            let half = apex_int / 2.0;
            let tolerance = 0.01 * half;
            let left = spline.find_crossing(spline.first_knot(), apex_mz, half, tolerance);
            let right = spline.find_crossing(spline.last_knot(), apex_mz, half, tolerance);
            right - left
        } else {
            0.0
        };

        Some(PickedPeak {
            mz: apex_mz,
            intensity: apex_int as f32,
            fwhm,
            index,
        })
    }

    fn build_arrays(&self, peaks: &[PickedPeak]) -> BinaryArrayMap {
        let mzs: Vec<f64> = peaks.iter().map(|p| p.mz).collect();
        let intensities: Vec<f32> = peaks.iter().map(|p| p.intensity).collect();
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
        if self.params.report_fwhm {
            let (name, widths): (&str, Vec<f32>) = match self.params.report_fwhm_unit {
                FwhmUnit::Absolute => ("FWHM", peaks.iter().map(|p| p.fwhm as f32).collect()),
                FwhmUnit::Relative => (
                    "FWHM_ppm",
                    peaks
                        .iter()
                        .map(|p| (p.fwhm / p.mz * 1e6) as f32)
                        .collect(),
                ),
            };
            arrays.add(DataArray::wrap(
                &ArrayType::nonstandard(name),
                BinaryDataArrayType::Float32,
                to_bytes(&widths),
            ));
        }
        arrays
    }

    /// Pick a spectrum, producing a centroid spectrum with the same description.
    ///
    /// Spectra that are already centroided are returned unchanged.
    pub fn pick(&self, spectrum: &Spectrum) -> Result<Spectrum, PeakPickerError> {
        if spectrum.signal_continuity() == SignalContinuity::Centroid {
            debug!("{} is already centroided, copying it", spectrum.id());
            return Ok(spectrum.clone());
        }
        let mzs = spectrum.mzs()?;
        let intensities = spectrum.intensities()?;
        let peaks = self.pick_peaks(&mzs, &intensities);
        trace!(
            "Picked {} peaks from {} samples of {}",
            peaks.len(),
            mzs.len(),
            spectrum.id()
        );

        let mut description = spectrum.description.clone();
        description.signal_continuity = SignalContinuity::Centroid;
        Ok(Spectrum::new(description, self.build_arrays(&peaks))?)
    }

    fn pick_or_copy(&self, spectrum: &Spectrum) -> Result<Spectrum, PeakPickerError> {
        if self.params.selects_ms_level(spectrum.ms_level()) {
            self.pick(spectrum)
        } else {
            Ok(spectrum.clone())
        }
    }

    /// Pick every spectrum of a collection whose MS level is selected and copy the rest,
    /// keeping the order and the run metadata of the input.
    pub fn pick_collection(
        &self,
        collection: &SpectrumCollection,
    ) -> Result<SpectrumCollection, PeakPickerError> {
        #[cfg(feature = "parallelism")]
        let spectra: Result<Vec<Spectrum>, PeakPickerError> = collection
            .spectra
            .par_iter()
            .map(|s| self.pick_or_copy(s))
            .collect();
        #[cfg(not(feature = "parallelism"))]
        let spectra: Result<Vec<Spectrum>, PeakPickerError> = collection
            .spectra
            .iter()
            .map(|s| self.pick_or_copy(s))
            .collect();

        let mut result = collection.empty_like();
        result.spectra = spectra?;
        self.record_processing(&mut result);
        Ok(result)
    }

    /// Like [`PeakPicker::pick_collection`], replacing the profile spectra
    pub fn pick_collection_in_place(
        &self,
        collection: &mut SpectrumCollection,
    ) -> Result<(), PeakPickerError> {
        #[cfg(feature = "parallelism")]
        collection
            .spectra
            .par_iter_mut()
            .try_for_each(|s| -> Result<(), PeakPickerError> {
                *s = self.pick_or_copy(s)?;
                Ok(())
            })?;
        #[cfg(not(feature = "parallelism"))]
        for s in collection.spectra.iter_mut() {
            *s = self.pick_or_copy(s)?;
        }
        self.record_processing(collection);
        Ok(())
    }

    fn record_processing(&self, collection: &mut SpectrumCollection) {
        let software = Software::mzkit();
        let mut id = "mzkit_peak_picking".to_string();
        let mut counter = 1;
        while collection.data_processings.iter().any(|dp| dp.id == id) {
            counter += 1;
            id = format!("mzkit_peak_picking_{counter}");
        }
        let mut method = ProcessingMethod {
            order: 0,
            software_reference: software.id.clone(),
            ..Default::default()
        };
        method.add_param(ControlledVocabulary::MS.param("MS:1000035", "peak picking"));
        let mut processing = DataProcessing::new(id);
        processing.push(method);
        collection.add_software(software);
        collection.data_processings.push(processing);
    }
}

impl Spectrum {
    /// Pick this spectrum with `picker`, see [`PeakPicker::pick`]
    pub fn pick_peaks_with(&self, picker: &PeakPicker) -> Result<Spectrum, PeakPickerError> {
        picker.pick(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::MzMLReader;
    use crate::params::ParamValue;
    use crate::spectrum::{ByteArrayView, SpectrumDescription};

    const SIGMA: f64 = 0.01;

    fn gaussian(mzs: &[f64], center: f64, height: f64, sigma: f64) -> Vec<f64> {
        mzs.iter()
            .map(|mz| height * (-(mz - center).powi(2) / (2.0 * sigma * sigma)).exp())
            .collect()
    }

    fn synthetic_spectrum(centers: &[(f64, f64)]) -> Spectrum {
        let mzs: Vec<f64> = (0..2000).map(|i| 499.0 + i as f64 * 0.002).collect();
        let mut intensities = vec![0.0f64; mzs.len()];
        for (center, height) in centers {
            for (acc, v) in intensities
                .iter_mut()
                .zip(gaussian(&mzs, *center, *height, SIGMA))
            {
                *acc += v;
            }
        }
        let intensities: Vec<f32> = intensities.into_iter().map(|v| v as f32).collect();
        let mut description = SpectrumDescription::new("scan=1", 0, 1);
        description.signal_continuity = SignalContinuity::Profile;
        Spectrum::from_arrays(description, &mzs, &intensities).unwrap()
    }

    #[test_log::test]
    fn test_gaussian_centroid() -> Result<(), PeakPickerError> {
        let params = PeakPickerParams {
            report_fwhm: true,
            report_fwhm_unit: FwhmUnit::Absolute,
            ..Default::default()
        };
        let picker = PeakPicker::new(params)?;
        let spectrum = synthetic_spectrum(&[(500.0013, 1e5)]);
        let mzs = spectrum.mzs()?;
        let intensities = spectrum.intensities()?;
        let peaks = picker.pick_peaks(&mzs, &intensities);
        assert_eq!(peaks.len(), 1);
        let peak = &peaks[0];
        assert!((peak.mz - 500.0013).abs() < 1e-3, "{}", peak.mz);
        assert!((peak.intensity - 1e5).abs() / 1e5 < 0.01, "{}", peak.intensity);
        let expected_fwhm = 2.3548 * SIGMA;
        assert!(
            (peak.fwhm - expected_fwhm).abs() / expected_fwhm < 0.05,
            "{} vs {}",
            peak.fwhm,
            expected_fwhm
        );
        assert!(peak.index.contains(&500));

        let centroided = picker.pick(&spectrum)?;
        assert_eq!(centroided.signal_continuity(), SignalContinuity::Centroid);
        assert_eq!(centroided.id(), "scan=1");
        assert_eq!(centroided.len(), 1);
        let widths = centroided
            .arrays
            .get(&ArrayType::nonstandard("FWHM"))
            .unwrap();
        assert_eq!(widths.dtype, BinaryDataArrayType::Float32);
        Ok(())
    }

    #[test_log::test]
    fn test_relative_fwhm() -> Result<(), PeakPickerError> {
        let mut params = PeakPickerParams::default();
        params.set("report_FWHM", ParamValue::Bool(true))?;
        let picker = PeakPicker::new(params)?;
        let centroided = picker.pick(&synthetic_spectrum(&[(500.0, 1e4), (501.5, 5e3)]))?;
        assert_eq!(centroided.len(), 2);
        let widths = centroided
            .arrays
            .get(&ArrayType::nonstandard("FWHM_ppm"))
            .unwrap()
            .to_f32()?;
        let expected = 2.3548 * SIGMA / 500.0 * 1e6;
        assert!((widths[0] as f64 - expected).abs() / expected < 0.05, "{}", widths[0]);
        Ok(())
    }

    #[test_log::test]
    fn test_peak_count_reduced() -> Result<(), PeakPickerError> {
        let picker = PeakPicker::new(PeakPickerParams::default())?;
        let spectrum = synthetic_spectrum(&[(499.5, 1e3), (500.5, 2e4), (501.0, 7e3), (502.2, 4e2)]);
        let centroided = picker.pick(&spectrum)?;
        assert_eq!(centroided.len(), 4);
        assert!(centroided.len() <= spectrum.len());
        let mzs = centroided.mzs()?;
        assert!(mzs.windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }

    #[test_log::test]
    fn test_degenerate_spectra() -> Result<(), PeakPickerError> {
        let picker = PeakPicker::new(PeakPickerParams::default())?;
        assert!(picker.pick_peaks(&[100.0, 100.1, 100.2, 100.3], &[1.0, 5.0, 1.0, 0.0]).is_empty());
        let mzs: Vec<f64> = (0..50).map(|i| 100.0 + i as f64 * 0.01).collect();
        assert!(picker.pick_peaks(&mzs, &vec![0.0; 50]).is_empty());
        assert!(picker.pick_peaks(&[], &[]).is_empty());

        let empty = Spectrum::new(SpectrumDescription::new("scan=2", 1, 1), BinaryArrayMap::new())?;
        let picked = picker.pick(&empty)?;
        assert!(picked.is_empty());
        assert_eq!(picked.signal_continuity(), SignalContinuity::Centroid);

        let mut params = PeakPickerParams::default();
        params.signal_to_noise = 1.0;
        let picker = PeakPicker::new(params)?;
        assert!(picker
            .pick_peaks(&[100.0, 100.1, 100.2, 100.3, 100.4, 100.5], &[0.0, 1.0, 5.0, 1.0, 0.0, 0.0])
            .is_empty());
        Ok(())
    }

    #[test_log::test]
    fn test_oscillation_rejected() -> Result<(), PeakPickerError> {
        let picker = PeakPicker::new(PeakPickerParams::default())?;
        let mzs: Vec<f64> = (0..7).map(|i| 100.0 + i as f64 * 0.01).collect();
        let peaks = picker.pick_peaks(&mzs, &[0.0, 10.0, 2.0, 3.0, 2.0, 10.0, 0.0]);
        assert!(peaks.iter().all(|p| (p.mz - mzs[3]).abs() > 0.005));
        Ok(())
    }

    #[test_log::test]
    fn test_invalid_params_rejected() {
        let params = PeakPickerParams {
            spacing_difference: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            PeakPicker::new(params),
            Err(PeakPickerError::ConfigError(_))
        ));
    }

    #[test_log::test]
    fn test_collection_matches_single_spectra() -> Result<(), Box<dyn std::error::Error>> {
        let collection = MzMLReader::open_path("./test/data/small.mzML")?.read_all()?;
        let mut params = PeakPickerParams::default();
        params.set("ms_levels", ParamValue::parse("1"))?;
        params.set("signal_to_noise", ParamValue::Float(1.0))?;
        let picker = PeakPicker::new(params)?;

        let picked = picker.pick_collection(&collection)?;
        assert_eq!(picked.len(), collection.len());
        assert_eq!(picked.run_id, collection.run_id);
        assert_eq!(
            picked.data_processings.len(),
            collection.data_processings.len() + 1
        );
        let step = picked.data_processings.last().unwrap();
        assert_eq!(step.methods[0].software_reference, "mzkit");
        assert!(step.methods[0].get_param_by_accession("MS:1000035").is_some());
        assert!(picked.softwares.iter().any(|s| s.id == "mzkit"));

        for (before, after) in collection.iter().zip(picked.iter()) {
            assert_eq!(before.id(), after.id());
            if before.ms_level() == 1 {
                let single = before.pick_peaks_with(&picker)?;
                assert_eq!(after.mzs()?, single.mzs()?);
                assert_eq!(after.intensities()?, single.intensities()?);
                assert_eq!(after.signal_continuity(), SignalContinuity::Centroid);
                assert!(after.len() < before.len());
            } else {
                assert_eq!(after.mzs()?, before.mzs()?);
                assert_eq!(after.description, before.description);
            }
        }

        let first = picked.get(0).unwrap();
        assert_eq!(first.len(), 4);
        let mzs = first.mzs()?;
        assert!(mzs.iter().any(|mz| (mz - 509.751).abs() < 1e-3), "{mzs:?}");

        let mut in_place = collection.clone();
        picker.pick_collection_in_place(&mut in_place)?;
        assert_eq!(in_place.len(), picked.len());
        for (a, b) in in_place.iter().zip(picked.iter()) {
            assert_eq!(a.mzs()?, b.mzs()?);
        }
        Ok(())
    }
}
