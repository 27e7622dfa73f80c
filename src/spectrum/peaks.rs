use mzpeaks::prelude::*;
use mzpeaks::{CentroidPeak, IndexType, PeakSet};

use super::bindata::BinaryArrayMap;

/// A borrowed view of the most processed signal a spectrum holds: the raw
/// profile (or centroid) arrays or a picked [`PeakSet`].
#[derive(Debug, Clone, Copy)]
pub enum PeakDataLevel<'a> {
    Missing,
    RawData(&'a BinaryArrayMap),
    Centroid(&'a PeakSet),
}

impl PeakDataLevel<'_> {
    /// Compute the base peak of a spectrum. An empty signal gives a zero peak
    pub fn base_peak(&self) -> CentroidPeak {
        match self {
            Self::Missing => CentroidPeak::new(0.0, 0.0, 0),
            Self::RawData(arrays) => {
                let mut peak = CentroidPeak::new(0.0, 0.0, 0);
                if let (Ok(mzs), Ok(intensities)) = (arrays.mzs(), arrays.intensities()) {
                    let result = intensities
                        .iter()
                        .enumerate()
                        .max_by(|ia, ib| ia.1.total_cmp(ib.1));
                    if let Some((i, inten)) = result {
                        if let Some(mz) = mzs.get(i) {
                            peak = CentroidPeak::new(*mz, *inten, i as IndexType)
                        }
                    }
                }
                peak
            }
            Self::Centroid(peaks) => {
                let result = peaks
                    .iter()
                    .enumerate()
                    .max_by(|ia, ib| ia.1.intensity.total_cmp(&ib.1.intensity));
                if let Some((i, peak)) = result {
                    CentroidPeak::new(peak.mz, peak.intensity, i as IndexType)
                } else {
                    CentroidPeak::new(0.0, 0.0, 0)
                }
            }
        }
    }

    /// Find the minimum and maximum m/z values of a spectrum
    pub fn mz_range(&self) -> (f64, f64) {
        match self {
            Self::Missing => (0.0, 0.0),
            Self::RawData(arrays) => match arrays.mzs() {
                Ok(mzs) => match (mzs.first(), mzs.last()) {
                    (Some(lo), Some(hi)) => (*lo, *hi),
                    _ => (0.0, 0.0),
                },
                Err(_) => (0.0, 0.0),
            },
            Self::Centroid(peaks) => match (peaks.iter().next(), peaks.iter().last()) {
                (Some(lo), Some(hi)) => (lo.mz, hi.mz),
                _ => (0.0, 0.0),
            },
        }
    }

    /// Compute the total ion current for a spectrum
    pub fn tic(&self) -> f32 {
        match self {
            Self::Missing => 0.0,
            Self::RawData(arrays) => arrays
                .intensities()
                .map(|ints| ints.iter().sum())
                .unwrap_or_default(),
            Self::Centroid(peaks) => peaks.iter().map(|p| p.intensity).sum(),
        }
    }

    /// Find the number of points in a profile spectrum, or the number of peaks
    /// for a centroid spectrum
    pub fn len(&self) -> usize {
        match self {
            Self::Missing => 0,
            Self::RawData(arrays) => arrays.mzs().map(|arr| arr.len()).unwrap_or_default(),
            Self::Centroid(peaks) => peaks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_summaries() {
        let arrays =
            BinaryArrayMap::from_mzs_and_intensities(&[100.0, 101.0, 102.0], &[1.0, 5.0, 2.0])
                .unwrap();
        let level = PeakDataLevel::RawData(&arrays);
        assert_eq!(level.len(), 3);
        assert_eq!(level.tic(), 8.0);
        assert_eq!(level.mz_range(), (100.0, 102.0));
        let bp = level.base_peak();
        assert_eq!(bp.mz, 101.0);
        assert_eq!(bp.index, 1);

        let peaks = PeakSet::new(vec![
            CentroidPeak::new(300.0, 3.0, 0),
            CentroidPeak::new(200.0, 9.0, 0),
        ]);
        let level = PeakDataLevel::Centroid(&peaks);
        assert_eq!(level.len(), 2);
        assert_eq!(level.base_peak().mz, 200.0);
        assert_eq!(level.mz_range(), (200.0, 300.0));

        assert!(PeakDataLevel::Missing.is_empty());
    }
}
