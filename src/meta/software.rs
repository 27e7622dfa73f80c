use crate::impl_param_described;
use crate::params::{ControlledVocabulary, ParamList};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Software {
    /// A unique identifier for the software within processing metadata
    pub id: String,
    /// A string denoting a particular software version, but does no guarantee is given for its format
    pub version: String,
    /// Any associated vocabulary terms, including actual software name and type
    pub params: ParamList,
}

impl Software {
    pub fn new<I: Into<String>, V: Into<String>>(id: I, version: V, params: ParamList) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            params,
        }
    }

    /// The entry this library adds to the files it processes
    pub fn mzkit() -> Self {
        Self::new(
            "mzkit",
            env!("CARGO_PKG_VERSION"),
            vec![ControlledVocabulary::MS.param_val("MS:1000799", "custom unreleased software tool", "mzkit")],
        )
    }
}

impl_param_described!(Software);
