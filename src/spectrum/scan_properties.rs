use crate::impl_param_described;
use crate::params::{ControlledVocabulary, Param, ParamList};

/**
Describe the initialization stage of an isolation window
*/
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(i8)]
pub enum IsolationWindowState {
    #[default]
    Unknown = 0,
    Offset,
    Explicit,
    Complete,
}

#[derive(Default, Debug, Clone)]
/// The interval around the precursor ion that was isolated in the precursor scan.
/// Although an isolation window may be specified either with explicit bounds or
/// offsets from the target, this data structure always uses explicit bounds.
pub struct IsolationWindow {
    pub target: f32,
    pub lower_bound: f32,
    pub upper_bound: f32,
    /// Describes the decision making process used to establish the bounds of the
    /// window from the source file.
    pub flags: IsolationWindowState,
}

impl IsolationWindow {
    pub fn is_empty(&self) -> bool {
        matches!(self.flags, IsolationWindowState::Unknown)
    }
}

impl PartialEq for IsolationWindow {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.lower_bound == other.lower_bound
            && self.upper_bound == other.upper_bound
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct ScanWindow {
    pub lower_bound: f32,
    pub upper_bound: f32,
}

impl ScanWindow {
    pub fn new(lower_bound: f32, upper_bound: f32) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }
}

pub type ScanWindowList = Vec<ScanWindow>;

#[derive(Default, Debug, Clone, PartialEq)]
/// Describes a single scan event. Unless additional post-processing is done,
/// there is usually only one event per spectrum.
pub struct ScanEvent {
    /// Scan start time in minutes
    pub start_time: f64,
    /// Ion injection time in milliseconds
    pub injection_time: f32,
    pub scan_windows: ScanWindowList,
    pub instrument_configuration_id: u32,
    pub params: ParamList,
}

pub type ScanEventList = Vec<ScanEvent>;

#[derive(Default, Debug, Clone, PartialEq)]
/// Describe the series of acquisition events that constructed the spectrum
/// being described.
pub struct Acquisition {
    pub scans: ScanEventList,
    pub params: ParamList,
}

impl Acquisition {
    pub fn first_scan(&self) -> Option<&ScanEvent> {
        self.scans.first()
    }

    pub fn first_scan_mut(&mut self) -> &mut ScanEvent {
        if self.scans.is_empty() {
            self.scans.push(ScanEvent::default());
        }
        &mut self.scans[0]
    }

    pub fn start_time(&self) -> Option<f64> {
        self.first_scan().map(|s| s.start_time)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Describes a single selected ion from a precursor isolation
pub struct SelectedIon {
    /// The selected ion's m/z as reported, may not be the monoisotopic peak.
    pub mz: f64,
    pub intensity: f32,
    /// The reported precursor ion's charge state. May be absent in
    /// some source files.
    pub charge: Option<i32>,
    pub params: ParamList,
}

impl SelectedIon {
    /// The neutral mass implied by `mz` and `charge`, assuming a charge of 1 when
    /// none was reported
    pub fn neutral_mass(&self) -> f64 {
        crate::utils::neutral_mass(self.mz, self.charge.unwrap_or(1))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
/// Describes the activation method used to dissociate the precursor ion
pub struct Activation {
    method: Option<Param>,
    pub energy: f32,
    pub params: ParamList,
}

impl Activation {
    pub fn method(&self) -> Option<&Param> {
        self.method.as_ref()
    }

    pub fn method_mut(&mut self) -> &mut Option<Param> {
        &mut self.method
    }

    pub fn is_param_activation(p: &Param) -> bool {
        match (p.controlled_vocabulary, p.accession) {
            (Some(ControlledVocabulary::MS), Some(acc)) => Self::accession_to_activation(acc),
            _ => false,
        }
    }

    pub fn accession_to_activation(accession: u32) -> bool {
        matches!(
            accession,
            1000133
                | 1000134
                | 1000135
                | 1000136
                | 1000242
                | 1000250
                | 1000262
                | 1000282
                | 1000422
                | 1000433
                | 1000435
                | 1000598
                | 1000599
                | 1001880
                | 1002000
                | 1002472
                | 1002481
                | 1002631
                | 1002678
                | 1002679
                | 1003181
                | 1003182
                | 1003246
                | 1003247
                | 1003294
        )
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
/// Describes the precursor ion of the owning spectrum.
pub struct Precursor {
    /// Describes the selected ion's properties
    pub ion: SelectedIon,
    /// Describes the isolation window around the selected ion
    pub isolation_window: IsolationWindow,
    /// The precursor scan ID, if given
    pub precursor_id: Option<String>,
    /// The activation process applied to the precursor ion
    pub activation: Activation,
    /// Additional parameters describing this precursor ion
    pub params: ParamList,
}

/**
Describes the polarity of a mass spectrum. A spectrum is either `Positive` (1+), `Negative` (-1)
or `Unknown` (0). The `Unknown` state is the default.
*/
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanPolarity {
    #[default]
    Unknown = 0,
    Positive = 1,
    Negative = -1,
}

/**
Describes the initial representation of the signal of a spectrum.

Though most formats explicitly have a method of either conveying a processing level
or an assumed level, the `Unknown` option is retained for partial initialization.
*/
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignalContinuity {
    #[default]
    Unknown = 0,
    Centroid = 3,
    Profile = 5,
}

/**
The set of descriptive metadata that give context for how a mass spectrum was acquired
within a particular run. This forms the basis for a large portion of the [`SpectrumLike`](crate::spectrum::SpectrumLike)
trait.
*/
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SpectrumDescription {
    pub id: String,
    pub index: usize,
    pub ms_level: u8,

    pub polarity: ScanPolarity,
    pub signal_continuity: SignalContinuity,

    pub params: ParamList,
    pub acquisition: Acquisition,
    pub precursor: Option<Precursor>,
}

impl SpectrumDescription {
    pub fn new<S: Into<String>>(id: S, index: usize, ms_level: u8) -> Self {
        Self {
            id: id.into(),
            index,
            ms_level,
            ..Default::default()
        }
    }
}

impl_param_described!(
    Acquisition,
    Activation,
    Precursor,
    SelectedIon,
    ScanEvent,
    SpectrumDescription
);

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::ParamDescribed;

    #[test]
    fn test_activation_detection() {
        let cid = ControlledVocabulary::MS.param("MS:1000133", "collision-induced dissociation");
        assert!(Activation::is_param_activation(&cid));
        let other = ControlledVocabulary::MS.param("MS:1000511", "ms level");
        assert!(!Activation::is_param_activation(&other));
    }

    #[test]
    fn test_description_defaults() {
        let mut desc = SpectrumDescription::new("scan=1", 0, 1);
        assert_eq!(desc.polarity, ScanPolarity::Unknown);
        assert_eq!(desc.signal_continuity, SignalContinuity::Unknown);
        assert!(desc.acquisition.start_time().is_none());
        desc.acquisition.first_scan_mut().start_time = 12.5;
        assert_eq!(desc.acquisition.start_time(), Some(12.5));
        desc.add_param(Param::new_key_value("note", "x"));
        assert!(desc.get_param_by_name("note").is_some());

        let ion = SelectedIon {
            mz: 500.0,
            charge: Some(2),
            ..Default::default()
        };
        assert!((ion.neutral_mass() - 997.98544706646).abs() < 1e-6);
    }
}
