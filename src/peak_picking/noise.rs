//! A sliding window, histogram median estimate of the noise level under a signal.
use log::debug;

use super::config::{NoiseAutoMode, SignalToNoiseParams};

/// Estimates per-sample signal-to-noise ratios from the median intensity of an m/z window
/// around each sample.
#[derive(Debug, Clone, Copy)]
pub struct SignalToNoiseEstimator<'a> {
    params: &'a SignalToNoiseParams,
}

impl<'a> SignalToNoiseEstimator<'a> {
    pub fn new(params: &'a SignalToNoiseParams) -> Self {
        Self { params }
    }

    /// Compute one S/N value per sample.
    ///
    /// `mzs` must be sorted and of the same length as `intensities`.
    pub fn estimate(
        mzs: &[f64],
        intensities: &[f32],
        params: &SignalToNoiseParams,
    ) -> Vec<f64> {
        SignalToNoiseEstimator::new(params).signal_to_noise(mzs, intensities)
    }

    /// The upper bound of the intensity histogram
    pub fn intensity_ceiling(&self, intensities: &[f32]) -> f64 {
        if intensities.is_empty() {
            return 0.0;
        }
        let max_intensity = intensities
            .iter()
            .fold(0.0f64, |acc, v| acc.max(*v as f64));
        let ceiling = match self.params.auto_mode {
            NoiseAutoMode::Manual => self.params.max_intensity as f64,
            NoiseAutoMode::StandardDeviation => {
                let n = intensities.len() as f64;
                let mean = intensities.iter().map(|v| *v as f64).sum::<f64>() / n;
                let variance = intensities
                    .iter()
                    .map(|v| (*v as f64 - mean).powi(2))
                    .sum::<f64>()
                    / n;
                mean + self.params.auto_max_stdev_factor * variance.sqrt()
            }
            NoiseAutoMode::Percentile => {
                let mut sorted: Vec<f32> = intensities.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let rank = (self.params.auto_max_percentile as f64 / 100.0 * sorted.len() as f64)
                    .ceil() as usize;
                sorted[rank.clamp(1, sorted.len()) - 1] as f64
            }
        };
        if ceiling > 0.0 && ceiling.is_finite() {
            ceiling
        } else {
            debug!("Noise histogram ceiling {ceiling} is not positive, using the maximum intensity {max_intensity}");
            max_intensity
        }
    }

    pub fn signal_to_noise(&self, mzs: &[f64], intensities: &[f32]) -> Vec<f64> {
        let n = intensities.len().min(mzs.len());
        if n == 0 {
            return Vec::new();
        }
        let noise = self.noise_levels(&mzs[..n], &intensities[..n]);
        intensities[..n]
            .iter()
            .zip(noise)
            .map(|(inten, noise)| {
                let inten = *inten as f64;
                if noise == 0.0 {
                    inten
                } else {
                    inten / noise
                }
            })
            .collect()
    }

    /// The estimated noise level at each sample
    pub fn noise_levels(&self, mzs: &[f64], intensities: &[f32]) -> Vec<f64> {
        let n = intensities.len();
        let ceiling = self.intensity_ceiling(intensities);
        if ceiling <= 0.0 {
            return vec![0.0; n];
        }

        let bin_count = self.params.bin_count;
        let bin_size = ceiling / bin_count as f64;
        let bin_of = |inten: f32| -> usize {
            let bin = (inten.max(0.0) as f64 / bin_size) as usize;
            bin.min(bin_count - 1)
        };
        let bin_centers: Vec<f64> = (0..bin_count)
            .map(|i| (i as f64 + 0.5) * bin_size)
            .collect();

        let half_window = self.params.win_len / 2.0;
        let mut histogram = vec![0usize; bin_count];
        let mut in_window = 0usize;
        let mut window_start = 0usize;
        let mut window_end = 0usize;
        let mut sparse_windows = 0usize;

        let mut levels = Vec::with_capacity(n);
        for i in 0..n {
            let center = mzs[i];
            while window_end < n && mzs[window_end] <= center + half_window {
                histogram[bin_of(intensities[window_end])] += 1;
                in_window += 1;
                window_end += 1;
            }
            while window_start < window_end && mzs[window_start] < center - half_window {
                histogram[bin_of(intensities[window_start])] -= 1;
                in_window -= 1;
                window_start += 1;
            }

            if in_window < self.params.min_required_elements {
                sparse_windows += 1;
                levels.push(self.params.noise_for_empty_window);
                continue;
            }

            let median_rank = (in_window + 1) / 2;
            let mut seen = 0usize;
            let mut median_bin = bin_count - 1;
            for (bin, count) in histogram.iter().enumerate() {
                seen += count;
                if seen >= median_rank {
                    median_bin = bin;
                    break;
                }
            }
            levels.push(bin_centers[median_bin]);
        }

        if sparse_windows > 0 {
            debug!(
                "{sparse_windows} of {n} noise windows held fewer than {} samples and were assigned noise {}",
                self.params.min_required_elements, self.params.noise_for_empty_window
            );
        }
        levels
    }
}
