use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::params::{ParamValue, ParamValueError};

/// The ways a named option can be rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PeakPickerConfigError {
    #[error("{0:?} is not a peak picking option")]
    UnknownOption(String),
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
    #[cfg(feature = "serde")]
    #[error("Failed to read peak picking parameters: {0}")]
    Deserialize(String),
}

impl PeakPickerConfigError {
    fn invalid<S: ToString>(name: &str, reason: S) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    fn from_value_error(name: &str, error: ParamValueError) -> Self {
        Self::invalid(name, error)
    }
}

/// How the upper intensity bound of the noise histogram is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "i64", into = "i64"))]
pub enum NoiseAutoMode {
    /// Use [`SignalToNoiseParams::max_intensity`] as given
    Manual,
    /// Mean plus [`SignalToNoiseParams::auto_max_stdev_factor`] standard deviations
    #[default]
    StandardDeviation,
    /// The [`SignalToNoiseParams::auto_max_percentile`] percentile
    Percentile,
}

impl TryFrom<i64> for NoiseAutoMode {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Manual),
            0 => Ok(Self::StandardDeviation),
            1 => Ok(Self::Percentile),
            _ => Err(format!("auto mode must be -1, 0 or 1, not {value}")),
        }
    }
}

impl From<NoiseAutoMode> for i64 {
    fn from(value: NoiseAutoMode) -> Self {
        match value {
            NoiseAutoMode::Manual => -1,
            NoiseAutoMode::StandardDeviation => 0,
            NoiseAutoMode::Percentile => 1,
        }
    }
}

/// The unit a reported peak width is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FwhmUnit {
    /// Parts per million of the peak's m/z
    #[default]
    Relative,
    /// m/z
    Absolute,
}

impl FromStr for FwhmUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relative" => Ok(Self::Relative),
            "absolute" => Ok(Self::Absolute),
            _ => Err(format!("expected \"relative\" or \"absolute\", got {s:?}")),
        }
    }
}

impl Display for FwhmUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relative => f.write_str("relative"),
            Self::Absolute => f.write_str("absolute"),
        }
    }
}

/// Settings for the median based noise estimator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct SignalToNoiseParams {
    /// The fixed histogram ceiling used when `auto_mode` is [`NoiseAutoMode::Manual`]
    pub max_intensity: i64,
    pub auto_max_stdev_factor: f64,
    pub auto_max_percentile: i64,
    pub auto_mode: NoiseAutoMode,
    /// The width of the sliding window in m/z
    pub win_len: f64,
    pub bin_count: usize,
    pub min_required_elements: usize,
    /// The noise level assigned to windows holding too few samples
    pub noise_for_empty_window: f64,
}

impl Default for SignalToNoiseParams {
    fn default() -> Self {
        Self {
            max_intensity: -1,
            auto_max_stdev_factor: 3.0,
            auto_max_percentile: 95,
            auto_mode: NoiseAutoMode::StandardDeviation,
            win_len: 200.0,
            bin_count: 30,
            min_required_elements: 10,
            noise_for_empty_window: 1e20,
        }
    }
}

impl SignalToNoiseParams {
    /// Check the values for consistency
    pub fn validate(&self) -> Result<(), PeakPickerConfigError> {
        if !(self.win_len > 0.0) {
            return Err(PeakPickerConfigError::invalid(
                "signal_to_noise:win_len",
                "the window length must be positive",
            ));
        }
        if self.bin_count == 0 {
            return Err(PeakPickerConfigError::invalid(
                "signal_to_noise:bin_count",
                "at least one bin is required",
            ));
        }
        if !(0..=100).contains(&self.auto_max_percentile) {
            return Err(PeakPickerConfigError::invalid(
                "signal_to_noise:auto_max_percentile",
                "the percentile must be between 0 and 100",
            ));
        }
        if self.auto_max_stdev_factor < 0.0 {
            return Err(PeakPickerConfigError::invalid(
                "signal_to_noise:auto_max_stdev_factor",
                "the factor must not be negative",
            ));
        }
        Ok(())
    }
}

/// The option names [`PeakPickerParams::set`] accepts, in the order
/// [`PeakPickerParams::parameters`] lists them
pub const OPTION_NAMES: [&str; 15] = [
    "signal_to_noise",
    "spacing_difference_gap",
    "spacing_difference",
    "missing",
    "ms_levels",
    "report_FWHM",
    "report_FWHM_unit",
    "signal_to_noise:max_intensity",
    "signal_to_noise:auto_max_stdev_factor",
    "signal_to_noise:auto_max_percentile",
    "signal_to_noise:auto_mode",
    "signal_to_noise:win_len",
    "signal_to_noise:bin_count",
    "signal_to_noise:min_required_elements",
    "signal_to_noise:noise_for_empty_window",
];

/**
The settings of a [`PeakPicker`](crate::peak_picking::PeakPicker).

Every option has a default, and options can be changed by name with [`PeakPickerParams::set`]
against a fixed schema, so a misspelled name is an error rather than silently ignored.

```
use mzkit::peak_picking::PeakPickerParams;
use mzkit::params::ParamValue;

let mut params = PeakPickerParams::default();
params.set("ms_levels", ParamValue::parse("1")).unwrap();
params.set("signal_to_noise", 2.0.into()).unwrap();
assert_eq!(params.ms_levels, vec![1]);
assert!(params.set("signal_to_nosie", 2.0.into()).is_err());
```
*/
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct PeakPickerParams {
    /// The minimum S/N a sample must reach to be part of a peak. `0.0` disables
    /// noise estimation entirely.
    pub signal_to_noise: f64,
    /// Peak extension stops at a gap larger than this multiple of the smallest local spacing
    pub spacing_difference_gap: f64,
    /// Neighbouring samples further apart than this multiple of the smallest local spacing
    /// are not part of the same peak
    pub spacing_difference: f64,
    /// How many samples breaking the spacing or S/N criteria are tolerated inside a peak
    pub missing: usize,
    /// The MS levels to pick. Empty means every level.
    pub ms_levels: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(rename = "report_FWHM"))]
    pub report_fwhm: bool,
    #[cfg_attr(feature = "serde", serde(rename = "report_FWHM_unit"))]
    pub report_fwhm_unit: FwhmUnit,
    #[cfg_attr(feature = "serde", serde(rename = "SignalToNoise", alias = "signal_to_noise_params"))]
    pub noise: SignalToNoiseParams,
}

impl Default for PeakPickerParams {
    fn default() -> Self {
        Self {
            signal_to_noise: 0.0,
            spacing_difference_gap: 4.0,
            spacing_difference: 1.5,
            missing: 1,
            ms_levels: Vec::new(),
            report_fwhm: false,
            report_fwhm_unit: FwhmUnit::Relative,
            noise: SignalToNoiseParams::default(),
        }
    }
}

fn non_negative_f64(name: &str, value: &ParamValue) -> Result<f64, PeakPickerConfigError> {
    let v = value
        .as_f64()
        .map_err(|e| PeakPickerConfigError::from_value_error(name, e))?;
    if v < 0.0 || v.is_nan() {
        return Err(PeakPickerConfigError::invalid(name, "must not be negative"));
    }
    Ok(v)
}

fn non_negative_usize(name: &str, value: &ParamValue) -> Result<usize, PeakPickerConfigError> {
    let v = value
        .as_i64()
        .map_err(|e| PeakPickerConfigError::from_value_error(name, e))?;
    usize::try_from(v).map_err(|_| PeakPickerConfigError::invalid(name, "must not be negative"))
}

impl PeakPickerParams {
    /// Set the option `name` to `value`.
    ///
    /// Names follow the `section:option` convention, the noise estimator options being
    /// prefixed with `signal_to_noise:` (or `SignalToNoise:`). Nothing is changed when
    /// an error is returned.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<(), PeakPickerConfigError> {
        let canonical = match name.strip_prefix("SignalToNoise:") {
            Some(rest) => format!("signal_to_noise:{rest}"),
            None => name.to_string(),
        };
        let name = canonical.as_str();
        match name {
            "signal_to_noise" => self.signal_to_noise = non_negative_f64(name, &value)?,
            "spacing_difference_gap" => {
                self.spacing_difference_gap = non_negative_f64(name, &value)?
            }
            "spacing_difference" => self.spacing_difference = non_negative_f64(name, &value)?,
            "missing" => self.missing = non_negative_usize(name, &value)?,
            "ms_levels" => {
                let levels = value
                    .as_int_list()
                    .map_err(|e| PeakPickerConfigError::from_value_error(name, e))?;
                let levels: Result<Vec<u8>, _> = levels
                    .into_iter()
                    .map(|v| match u8::try_from(v) {
                        Ok(level) if level > 0 => Ok(level),
                        _ => Err(PeakPickerConfigError::invalid(
                            name,
                            format!("{v} is not an MS level"),
                        )),
                    })
                    .collect();
                self.ms_levels = levels?;
            }
            "report_FWHM" => {
                self.report_fwhm = value
                    .as_bool()
                    .map_err(|e| PeakPickerConfigError::from_value_error(name, e))?
            }
            "report_FWHM_unit" => {
                let text = value
                    .as_str()
                    .map_err(|e| PeakPickerConfigError::from_value_error(name, e))?;
                self.report_fwhm_unit = text
                    .parse()
                    .map_err(|e: String| PeakPickerConfigError::invalid(name, e))?;
            }
            "signal_to_noise:max_intensity" => {
                self.noise.max_intensity = value
                    .as_i64()
                    .map_err(|e| PeakPickerConfigError::from_value_error(name, e))?
            }
            "signal_to_noise:auto_max_stdev_factor" => {
                self.noise.auto_max_stdev_factor = non_negative_f64(name, &value)?
            }
            "signal_to_noise:auto_max_percentile" => {
                let v = non_negative_usize(name, &value)?;
                if v > 100 {
                    return Err(PeakPickerConfigError::invalid(
                        name,
                        "the percentile must be between 0 and 100",
                    ));
                }
                self.noise.auto_max_percentile = v as i64;
            }
            "signal_to_noise:auto_mode" => {
                let v = value
                    .as_i64()
                    .map_err(|e| PeakPickerConfigError::from_value_error(name, e))?;
                self.noise.auto_mode =
                    NoiseAutoMode::try_from(v).map_err(|e| PeakPickerConfigError::invalid(name, e))?;
            }
            "signal_to_noise:win_len" => {
                let v = non_negative_f64(name, &value)?;
                if v == 0.0 {
                    return Err(PeakPickerConfigError::invalid(
                        name,
                        "the window length must be positive",
                    ));
                }
                self.noise.win_len = v;
            }
            "signal_to_noise:bin_count" => {
                let v = non_negative_usize(name, &value)?;
                if v == 0 {
                    return Err(PeakPickerConfigError::invalid(
                        name,
                        "at least one bin is required",
                    ));
                }
                self.noise.bin_count = v;
            }
            "signal_to_noise:min_required_elements" => {
                self.noise.min_required_elements = non_negative_usize(name, &value)?
            }
            "signal_to_noise:noise_for_empty_window" => {
                self.noise.noise_for_empty_window = non_negative_f64(name, &value)?
            }
            _ => return Err(PeakPickerConfigError::UnknownOption(name.to_string())),
        }
        Ok(())
    }

    /// Build a parameter set from the defaults and a sequence of named options.
    ///
    /// All options are checked before the result is returned, so the first bad name or
    /// value fails the whole set.
    pub fn from_pairs<I, K>(pairs: I) -> Result<Self, PeakPickerConfigError>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: AsRef<str>,
    {
        let mut params = Self::default();
        for (name, value) in pairs {
            params.set(name.as_ref(), value)?;
        }
        Ok(params)
    }

    /// List every option with its current value
    pub fn parameters(&self) -> Vec<(&'static str, ParamValue)> {
        let noise = &self.noise;
        let values = [
            ParamValue::Float(self.signal_to_noise),
            ParamValue::Float(self.spacing_difference_gap),
            ParamValue::Float(self.spacing_difference),
            ParamValue::Int(self.missing as i64),
            ParamValue::IntList(self.ms_levels.iter().map(|v| *v as i64).collect()),
            ParamValue::Bool(self.report_fwhm),
            ParamValue::Text(self.report_fwhm_unit.to_string()),
            ParamValue::Int(noise.max_intensity),
            ParamValue::Float(noise.auto_max_stdev_factor),
            ParamValue::Int(noise.auto_max_percentile),
            ParamValue::Int(noise.auto_mode.into()),
            ParamValue::Float(noise.win_len),
            ParamValue::Int(noise.bin_count as i64),
            ParamValue::Int(noise.min_required_elements as i64),
            ParamValue::Float(noise.noise_for_empty_window),
        ];
        OPTION_NAMES.into_iter().zip(values).collect()
    }

    /// Whether spectra of this MS level should be picked
    pub fn selects_ms_level(&self, ms_level: u8) -> bool {
        self.ms_levels.is_empty() || self.ms_levels.contains(&ms_level)
    }

    /// Check the values for consistency, as [`PeakPickerParams::set`] does for each one
    pub fn validate(&self) -> Result<(), PeakPickerConfigError> {
        for (name, value) in [
            ("signal_to_noise", self.signal_to_noise),
            ("spacing_difference_gap", self.spacing_difference_gap),
            ("spacing_difference", self.spacing_difference),
        ] {
            if value < 0.0 || value.is_nan() {
                return Err(PeakPickerConfigError::invalid(name, "must not be negative"));
            }
        }
        if self.ms_levels.contains(&0) {
            return Err(PeakPickerConfigError::invalid(
                "ms_levels",
                "0 is not an MS level",
            ));
        }
        self.noise.validate()
    }

    /// Read a parameter set from JSON, rejecting unknown fields. Missing fields take
    /// their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, PeakPickerConfigError> {
        let params: Self = serde_json::from_str(text)
            .map_err(|e| PeakPickerConfigError::Deserialize(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn test_defaults() {
        let params = PeakPickerParams::default();
        assert_eq!(params.signal_to_noise, 0.0);
        assert_eq!(params.spacing_difference_gap, 4.0);
        assert_eq!(params.spacing_difference, 1.5);
        assert_eq!(params.missing, 1);
        assert!(params.ms_levels.is_empty());
        assert!(!params.report_fwhm);
        assert_eq!(params.noise.win_len, 200.0);
        assert_eq!(params.noise.bin_count, 30);
        assert_eq!(params.noise.min_required_elements, 10);
        assert_eq!(params.noise.auto_mode, NoiseAutoMode::StandardDeviation);
        assert!(params.validate().is_ok());
        assert!(params.selects_ms_level(3));
    }

    #[test_log::test]
    fn test_set_options() -> Result<(), PeakPickerConfigError> {
        let mut params = PeakPickerParams::default();
        params.set("ms_levels", ParamValue::parse("1,2"))?;
        assert_eq!(params.ms_levels, vec![1, 2]);
        assert!(!params.selects_ms_level(3));
        params.set("ms_levels", ParamValue::parse("[1]"))?;
        assert_eq!(params.ms_levels, vec![1]);
        params.set("ms_levels", ParamValue::parse(&ParamValue::IntList(vec![2]).to_string()))?;
        assert_eq!(params.ms_levels, vec![2]);
        params.set("ms_levels", ParamValue::parse("1,2"))?;

        params.set("SignalToNoise:win_len", ParamValue::parse("50"))?;
        assert_eq!(params.noise.win_len, 50.0);
        params.set("signal_to_noise:auto_mode", ParamValue::Int(1))?;
        assert_eq!(params.noise.auto_mode, NoiseAutoMode::Percentile);
        params.set("report_FWHM", ParamValue::parse("true"))?;
        params.set("report_FWHM_unit", ParamValue::parse("absolute"))?;
        assert!(params.report_fwhm);
        assert_eq!(params.report_fwhm_unit, FwhmUnit::Absolute);
        Ok(())
    }

    #[test_log::test]
    fn test_rejects_bad_options() {
        let mut params = PeakPickerParams::default();
        assert_eq!(
            params.set("signal_to_nosie", ParamValue::Float(1.0)),
            Err(PeakPickerConfigError::UnknownOption("signal_to_nosie".into()))
        );
        assert!(matches!(
            params.set("ms_levels", ParamValue::parse("one")),
            Err(PeakPickerConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            params.set("signal_to_noise:bin_count", ParamValue::Int(0)),
            Err(PeakPickerConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            params.set("signal_to_noise:auto_mode", ParamValue::Int(4)),
            Err(PeakPickerConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            params.set("report_FWHM_unit", ParamValue::parse("furlongs")),
            Err(PeakPickerConfigError::InvalidValue { .. })
        ));
        assert_eq!(params, PeakPickerParams::default());

        let result = PeakPickerParams::from_pairs([
            ("signal_to_noise", ParamValue::Float(1.0)),
            ("no_such_thing", ParamValue::Int(1)),
        ]);
        assert!(matches!(result, Err(PeakPickerConfigError::UnknownOption(_))));
    }

    #[test_log::test]
    fn test_parameters_round_trip() -> Result<(), PeakPickerConfigError> {
        let mut params = PeakPickerParams::default();
        params.set("ms_levels", ParamValue::parse("2"))?;
        params.set("signal_to_noise", ParamValue::Float(3.5))?;
        let listed = params.parameters();
        assert_eq!(listed.len(), OPTION_NAMES.len());
        let rebuilt = PeakPickerParams::from_pairs(listed)?;
        assert_eq!(rebuilt, params);
        Ok(())
    }

    #[cfg(feature = "serde")]
    #[test_log::test]
    fn test_from_json() -> Result<(), PeakPickerConfigError> {
        let params = PeakPickerParams::from_json(
            r#"{"signal_to_noise": 1.5, "ms_levels": [1], "SignalToNoise": {"win_len": 25.0}}"#,
        )?;
        assert_eq!(params.signal_to_noise, 1.5);
        assert_eq!(params.ms_levels, vec![1]);
        assert_eq!(params.noise.win_len, 25.0);
        assert_eq!(params.noise.bin_count, 30);

        assert!(PeakPickerParams::from_json(r#"{"signal_to_nosie": 1.5}"#).is_err());
        Ok(())
    }
}
