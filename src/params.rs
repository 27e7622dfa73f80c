//! Controlled vocabulary parameters, units and typed configuration values.
use std::fmt::Display;
use std::num::{ParseFloatError, ParseIntError};
use std::str::{self, FromStr};

use thiserror::Error;

/// Split a CURIE like `MS:1000511` into its vocabulary and numeric accession
pub fn curie_to_num(curie: &str) -> (Option<ControlledVocabulary>, Option<u32>) {
    let mut parts = curie.split(':');
    let prefix = parts
        .next()
        .and_then(|v| v.parse::<ControlledVocabulary>().ok())
        .and_then(|cv| cv.as_option());
    match parts.next().map(|k| k.trim().parse::<u32>()) {
        Some(Ok(v)) => (prefix, Some(v)),
        _ => (prefix, None),
    }
}

pub trait ParamLike {
    fn name(&self) -> &str;
    fn value(&self) -> &str;
    fn accession(&self) -> Option<u32>;
    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary>;
    fn unit(&self) -> Unit;

    fn coerce<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value().parse::<T>()
    }

    fn to_f64(&self) -> Result<f64, ParseFloatError> {
        self.value().trim().parse::<f64>()
    }

    fn to_f32(&self) -> Result<f32, ParseFloatError> {
        self.value().trim().parse::<f32>()
    }

    fn to_i32(&self) -> Result<i32, ParseIntError> {
        self.value().trim().parse::<i32>()
    }

    fn is_controlled(&self) -> bool {
        self.accession().is_some()
    }

    fn is_ms(&self) -> bool {
        matches!(self.controlled_vocabulary(), Some(ControlledVocabulary::MS))
    }

    fn curie(&self) -> Option<String> {
        let cv = self.controlled_vocabulary()?;
        let acc = self.accession()?;
        let prefix = cv.prefix()?;
        Some(format!("{}:{:07}", prefix, acc))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Param {
    pub name: String,
    pub value: String,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl Param {
    pub fn new() -> Param {
        Param {
            ..Default::default()
        }
    }

    pub fn new_key_value<K: Into<String>, V: ToString>(name: K, value: V) -> Param {
        let mut inst = Self::new();
        inst.name = name.into();
        inst.value = value.to_string();
        inst
    }

    pub fn with_unit<S: AsRef<str>, A: AsRef<str>>(mut self, accession: S, name: A) -> Param {
        self.unit = Unit::from_accession(accession.as_ref());
        if matches!(self.unit, Unit::Unknown) {
            self.unit = Unit::from_name(name.as_ref());
        }
        self
    }

    pub fn with_unit_t(mut self, unit: &Unit) -> Param {
        self.unit = *unit;
        self
    }
}

impl ParamLike for Param {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn accession(&self) -> Option<u32> {
        self.accession
    }

    fn controlled_vocabulary(&self) -> Option<ControlledVocabulary> {
        self.controlled_vocabulary
    }

    fn unit(&self) -> Unit {
        self.unit
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlledVocabulary {
    MS,
    UO,
    Unknown,
}

const MS_CV: &str = "MS";
const UO_CV: &str = "UO";

impl ControlledVocabulary {
    /// The short identifier used in `cvRef` attributes. The unknown vocabulary
    /// has no prefix and cannot be written.
    pub fn prefix(&self) -> Option<&'static str> {
        match &self {
            Self::MS => Some(MS_CV),
            Self::UO => Some(UO_CV),
            Self::Unknown => None,
        }
    }

    pub fn as_option(&self) -> Option<Self> {
        match self {
            Self::Unknown => None,
            _ => Some(*self),
        }
    }

    pub fn param<A: AsRef<str>, S: Into<String>>(&self, accession: A, name: S) -> Param {
        let mut param = Param::new();
        param.controlled_vocabulary = Some(*self);
        param.name = name.into();
        let (_, acc) = curie_to_num(accession.as_ref());
        param.accession = acc;
        param
    }

    pub fn param_val<S: Into<String>, A: AsRef<str>, V: ToString>(
        &self,
        accession: A,
        name: S,
        value: V,
    ) -> Param {
        let mut param = self.param(accession, name);
        param.value = value.to_string();
        param
    }
}

impl Display for ControlledVocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix().unwrap_or("?"))
    }
}

impl FromStr for ControlledVocabulary {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MS" | "PSI-MS" => Ok(Self::MS),
            "UO" => Ok(Self::UO),
            _ => Ok(Self::Unknown),
        }
    }
}

pub type ParamList = Vec<Param>;

pub trait ParamDescribed {
    fn params(&self) -> &ParamList;
    fn params_mut(&mut self) -> &mut ParamList;

    fn add_param(&mut self, param: Param) {
        self.params_mut().push(param);
    }

    fn remove_param(&mut self, index: usize) -> Param {
        self.params_mut().remove(index)
    }

    fn get_param_by_name(&self, name: &str) -> Option<&Param> {
        self.params().iter().find(|param| param.name == name)
    }

    fn get_param_by_accession(&self, accession: &str) -> Option<&Param> {
        let (cv, acc_num) = curie_to_num(accession);
        self.params()
            .iter()
            .find(|param| param.accession == acc_num && param.controlled_vocabulary == cv)
    }
}

#[macro_export]
macro_rules! impl_param_described {
    ($($t:ty), +) => {$(

        impl $crate::params::ParamDescribed for $t {
            fn params(&self) -> &$crate::params::ParamList {
                return &self.params
            }

            fn params_mut(&mut self) -> &mut $crate::params::ParamList {
                return &mut self.params
            }
        }
    )+};
}

/// Units that a term's value might have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unit {
    // Mass
    MZ,
    Mass,
    PartsPerMillion,

    // Time
    Minute,
    Second,
    Millisecond,

    // Intensity
    DetectorCounts,
    PercentBasePeak,
    CountsPerSecond,

    // Collision Energy
    Electronvolt,
    Percent,

    #[default]
    Unknown,
}

impl Unit {
    pub fn for_param(&self) -> (&'static str, &'static str) {
        match self {
            Self::Millisecond => ("UO:0000028", "millisecond"),
            Self::Second => ("UO:0000010", "second"),
            Self::Minute => ("UO:0000031", "minute"),

            Self::MZ => ("MS:1000040", "m/z"),
            Self::Mass => ("UO:0000221", "dalton"),
            Self::PartsPerMillion => ("UO:0000169", "parts per million"),

            Self::DetectorCounts => ("MS:1000131", "number of detector counts"),
            Self::PercentBasePeak => ("MS:1000132", "percent of base peak"),
            Self::CountsPerSecond => ("MS:1000814", "counts per second"),

            Self::Electronvolt => ("UO:0000266", "electronvolt"),
            Self::Percent => ("UO:0000187", "percent"),

            Self::Unknown => ("", ""),
        }
    }

    pub fn from_name(name: &str) -> Unit {
        match name {
            "millisecond" => Self::Millisecond,
            "second" => Self::Second,
            "minute" => Self::Minute,

            "m/z" => Self::MZ,
            "dalton" => Self::Mass,
            "parts per million" => Self::PartsPerMillion,

            "number of detector counts" => Self::DetectorCounts,
            "percent of base peak" => Self::PercentBasePeak,
            "counts per second" => Self::CountsPerSecond,

            "electronvolt" => Self::Electronvolt,
            "percent" => Self::Percent,
            _ => Unit::Unknown,
        }
    }

    pub fn from_accession(acc: &str) -> Unit {
        match acc {
            "UO:0000028" => Self::Millisecond,
            "UO:0000010" => Self::Second,
            "UO:0000031" => Self::Minute,

            "MS:1000040" => Self::MZ,
            "UO:0000221" => Self::Mass,
            "UO:0000169" => Self::PartsPerMillion,

            "MS:1000131" => Self::DetectorCounts,
            "MS:1000132" => Self::PercentBasePeak,
            "MS:1000814" => Self::CountsPerSecond,

            "UO:0000266" => Self::Electronvolt,
            "UO:0000187" => Self::Percent,
            _ => Unit::Unknown,
        }
    }
}

/// A type mismatch or parse failure while converting a [`ParamValue`]
#[derive(Debug, Clone, PartialEq, Error)]
#[error("expected {expected}, got {found:?}")]
pub struct ParamValueError {
    pub expected: &'static str,
    pub found: ParamValue,
}

/// A typed value for an algorithm option.
///
/// Values built from text are inferred: `"true"`/`"false"` become booleans,
/// comma separated numbers become lists, anything unparseable stays text.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    Text(String),
}

impl ParamValue {
    pub fn parse(text: &str) -> ParamValue {
        let text = text.trim();
        match text {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(v) = text.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = text.parse::<f64>() {
            return Self::Float(v);
        }
        if text.is_empty() || text == "[]" {
            return Self::IntList(Vec::new());
        }
        let bracketed = text
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'));
        let inner = bracketed.unwrap_or(text);
        if bracketed.is_some() || inner.contains(',') {
            let parts: Vec<&str> = inner.split(',').map(|s| s.trim()).collect();
            if let Ok(ints) = parts.iter().map(|s| s.parse::<i64>()).collect() {
                return Self::IntList(ints);
            }
            if let Ok(floats) = parts.iter().map(|s| s.parse::<f64>()).collect() {
                return Self::FloatList(floats);
            }
        }
        Self::Text(text.to_string())
    }

    fn mismatch<T>(&self, expected: &'static str) -> Result<T, ParamValueError> {
        Err(ParamValueError {
            expected,
            found: self.clone(),
        })
    }

    pub fn as_f64(&self) -> Result<f64, ParamValueError> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Int(v) => Ok(*v as f64),
            _ => self.mismatch("a number"),
        }
    }

    pub fn as_i64(&self) -> Result<i64, ParamValueError> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            _ => self.mismatch("an integer"),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ParamValueError> {
        match self {
            Self::Bool(v) => Ok(*v),
            Self::Int(0) => Ok(false),
            Self::Int(1) => Ok(true),
            _ => self.mismatch("a boolean"),
        }
    }

    pub fn as_str(&self) -> Result<&str, ParamValueError> {
        match self {
            Self::Text(v) => Ok(v),
            _ => self.mismatch("a string"),
        }
    }

    /// A single integer is accepted as a one element list
    pub fn as_int_list(&self) -> Result<Vec<i64>, ParamValueError> {
        match self {
            Self::IntList(v) => Ok(v.clone()),
            Self::Int(v) => Ok(vec![*v]),
            _ => self.mismatch("a list of integers"),
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::IntList(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
            Self::FloatList(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(value: Vec<i64>) -> Self {
        Self::IntList(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_curie_parse() {
        let (cv, acc) = curie_to_num("MS:1000511");
        assert_eq!(cv, Some(ControlledVocabulary::MS));
        assert_eq!(acc, Some(1000511));

        let (cv, acc) = curie_to_num("FOO:bar");
        assert_eq!(cv, None);
        assert_eq!(acc, None);
    }

    #[test]
    fn test_param_builders() {
        let p = ControlledVocabulary::MS.param_val("MS:1000511", "ms level", 2);
        assert_eq!(p.curie().as_deref(), Some("MS:1000511"));
        assert_eq!(p.to_i32().unwrap(), 2);
        assert!(p.is_ms());

        let p = ControlledVocabulary::MS.param("not-a-curie", "whatever");
        assert!(p.accession.is_none());
        assert!(p.curie().is_none());

        let p = Param::new_key_value("foo", 1.5).with_unit("UO:0000031", "minute");
        assert_eq!(p.unit, Unit::Minute);
        assert!(!p.is_controlled());
    }

    #[test]
    fn test_param_value_inference() {
        assert_eq!(ParamValue::parse("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse("12"), ParamValue::Int(12));
        assert_eq!(ParamValue::parse("1.5"), ParamValue::Float(1.5));
        assert_eq!(ParamValue::parse("1,2"), ParamValue::IntList(vec![1, 2]));
        assert_eq!(ParamValue::parse("[1, 2]"), ParamValue::IntList(vec![1, 2]));
        assert_eq!(ParamValue::parse("0.5,2"), ParamValue::FloatList(vec![0.5, 2.0]));
        assert_eq!(
            ParamValue::parse("absolute"),
            ParamValue::Text("absolute".into())
        );
        assert_eq!(ParamValue::Int(3).as_int_list().unwrap(), vec![3]);
        assert!(ParamValue::Text("x".into()).as_f64().is_err());
        assert_eq!(ParamValue::IntList(vec![1, 2]).to_string(), "[1,2]");
    }

    #[test]
    fn test_bracketed_lists() {
        assert_eq!(ParamValue::parse("[1]"), ParamValue::IntList(vec![1]));
        assert_eq!(ParamValue::parse("[ 2 ]"), ParamValue::IntList(vec![2]));
        assert_eq!(ParamValue::parse("[0.5]"), ParamValue::FloatList(vec![0.5]));
        assert_eq!(ParamValue::parse("[a]"), ParamValue::Text("[a]".into()));
        for value in [
            ParamValue::IntList(vec![1]),
            ParamValue::IntList(vec![1, 2, 3]),
            ParamValue::IntList(Vec::new()),
            ParamValue::FloatList(vec![0.5, 2.25]),
        ] {
            assert_eq!(ParamValue::parse(&value.to_string()), value);
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_param_serde() {
        let param = ControlledVocabulary::MS
            .param_val("MS:1000016", "scan start time", 1.5)
            .with_unit("UO:0000031", "minute");
        let text = serde_json::to_string(&param).unwrap();
        let restored: Param = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, param);
        assert_eq!(restored.unit, Unit::Minute);
        assert_eq!(restored.controlled_vocabulary, Some(ControlledVocabulary::MS));
    }
}
