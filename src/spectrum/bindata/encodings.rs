use std::fmt::Display;
use std::io;

use bytemuck::{self, Pod};
use thiserror::{self, Error};

use crate::params::{ControlledVocabulary, Param, Unit};

pub type Bytes = Vec<u8>;

pub fn to_bytes<T: Pod>(data: &[T]) -> Bytes {
    bytemuck::cast_slice(data).to_vec()
}

pub fn as_bytes<T: Pod>(data: &[T]) -> &[u8] {
    bytemuck::cast_slice(data)
}

pub fn vec_as_bytes<T: Pod>(data: Vec<T>) -> Bytes {
    let mut buf = Bytes::with_capacity(data.len() * std::mem::size_of::<T>());
    for val in data {
        buf.extend_from_slice(bytemuck::bytes_of(&val));
    }
    buf
}

/// The kinds of data arrays a spectrum may carry, as governed by the PSI-MS
/// controlled vocabulary.
#[derive(Debug, Clone, PartialEq, Hash, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArrayType {
    #[default]
    Unknown,
    MZArray,
    IntensityArray,
    ChargeArray,
    SignalToNoiseArray,
    TimeArray,
    NonStandardDataArray {
        name: Box<String>,
    },
}

impl Display for ArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonStandardDataArray { name } => f.write_str(name),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl ArrayType {
    /// The data type an array of this kind is stored with by default.
    ///
    /// The m/z array is encoded using `Float64`, the charge state array
    /// using `Int32` and all other arrays using `Float32`.
    pub const fn preferred_dtype(&self) -> BinaryDataArrayType {
        match self {
            ArrayType::MZArray => BinaryDataArrayType::Float64,
            ArrayType::IntensityArray => BinaryDataArrayType::Float32,
            ArrayType::ChargeArray => BinaryDataArrayType::Int32,
            _ => BinaryDataArrayType::Float32,
        }
    }

    /// Create a [`ArrayType::NonStandardDataArray`] with the provided name.
    pub fn nonstandard<S: ToString>(name: S) -> ArrayType {
        ArrayType::NonStandardDataArray {
            name: Box::new(name.to_string()),
        }
    }

    /// Create a [`Param`] for this array type.
    ///
    /// If a unit is provided, that unit will be specified, otherwise a default unit may
    /// be used instead.
    pub fn as_param(&self, unit: Option<Unit>) -> Param {
        const CV: ControlledVocabulary = ControlledVocabulary::MS;
        match self {
            ArrayType::MZArray => CV
                .param("MS:1000514", "m/z array")
                .with_unit_t(&unit.unwrap_or(Unit::MZ)),
            ArrayType::IntensityArray => CV
                .param("MS:1000515", "intensity array")
                .with_unit_t(&unit.unwrap_or(Unit::DetectorCounts)),
            ArrayType::ChargeArray => CV.param("MS:1000516", "charge array"),
            ArrayType::SignalToNoiseArray => CV.param("MS:1000517", "signal to noise array"),
            ArrayType::TimeArray => CV
                .param("MS:1000595", "time array")
                .with_unit_t(&unit.unwrap_or(Unit::Minute)),
            ArrayType::NonStandardDataArray { name } => CV
                .param_val("MS:1000786", "non-standard data array", name)
                .with_unit_t(&unit.unwrap_or_default()),
            ArrayType::Unknown => CV.param("MS:1000513", "binary data array"),
        }
    }

    pub fn from_accession(accession: u32) -> Option<Self> {
        let tp = match accession {
            1000514 => Self::MZArray,
            1000515 => Self::IntensityArray,
            1000516 => Self::ChargeArray,
            1000517 => Self::SignalToNoiseArray,
            1000595 => Self::TimeArray,
            1000786 => Self::nonstandard(""),
            _ => return None,
        };
        Some(tp)
    }
}

/// The canonical primitive data types found in MS data file formats
/// supported by the PSI-MS controlled vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryDataArrayType {
    #[default]
    Unknown,
    Float64,
    Float32,
    Int64,
    Int32,
}

impl Display for BinaryDataArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BinaryDataArrayType {
    /// Get the size in bytes of a single value of this type
    pub const fn size_of(&self) -> usize {
        match self {
            BinaryDataArrayType::Unknown => 1,
            BinaryDataArrayType::Float32 | BinaryDataArrayType::Int32 => 4,
            BinaryDataArrayType::Float64 | BinaryDataArrayType::Int64 => 8,
        }
    }

    pub const fn accession(&self) -> Option<u32> {
        match self {
            Self::Float32 => Some(1000521),
            Self::Float64 => Some(1000523),
            Self::Int32 => Some(1000519),
            Self::Int64 => Some(1000522),
            Self::Unknown => None,
        }
    }

    pub fn as_param(&self) -> Option<Param> {
        let name = match self {
            BinaryDataArrayType::Unknown => return None,
            BinaryDataArrayType::Float64 => "64-bit float",
            BinaryDataArrayType::Float32 => "32-bit float",
            BinaryDataArrayType::Int64 => "64-bit integer",
            BinaryDataArrayType::Int32 => "32-bit integer",
        };
        let accession = self.accession()?;
        Some(ControlledVocabulary::MS.param(format!("MS:{accession}"), name))
    }

    pub fn from_accession(accession: u32) -> Option<Self> {
        match accession {
            1000521 => Some(Self::Float32),
            1000523 => Some(Self::Float64),
            1000519 => Some(Self::Int32),
            1000522 => Some(Self::Int64),
            _ => None,
        }
    }
}

/// The range of compression and encoding states that a raw byte buffer
/// might be in during different stages of decoding. Other than `Decoded`,
/// these states may or may not include intermediate base64 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryCompressionType {
    #[default]
    NoCompression,
    Zlib,
    Decoded,
}

impl BinaryCompressionType {
    /// Generate a user-understandable message about why a compression conversion operation failed
    pub fn unsupported_msg(&self, context: Option<&str>) -> String {
        match context {
            Some(ctx) => format!("Cannot decode array compressed with {:?} ({})", self, ctx),
            None => format!("Cannot decode array compressed with {:?}", self),
        }
    }

    pub const fn accession(&self) -> Option<u32> {
        match self {
            BinaryCompressionType::NoCompression => Some(1000576),
            BinaryCompressionType::Zlib => Some(1000574),
            BinaryCompressionType::Decoded => None,
        }
    }

    pub fn from_accession(accession: u32) -> Option<Self> {
        match accession {
            1000576 => Some(Self::NoCompression),
            1000574 => Some(Self::Zlib),
            _ => None,
        }
    }

    pub fn as_param(&self) -> Option<Param> {
        let name = match self {
            BinaryCompressionType::NoCompression => "no compression",
            BinaryCompressionType::Zlib => "zlib compression",
            BinaryCompressionType::Decoded => return None,
        };
        let accession = self.accession()?;
        Some(ControlledVocabulary::MS.param(format!("MS:{accession}"), name))
    }
}

impl Display for BinaryCompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A high level set of failure modes that an operation to retrieve a typed memory buffer
/// from a `[BinaryArrayMap]` might encounter. May also be used to represented conversion
/// during reading or writing.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArrayRetrievalError {
    #[error("Array type {0:?} not found")]
    NotFound(ArrayType),
    #[error("An error occurred while decompressing: {0}")]
    DecompressionError(String),
    #[error("The requested data type does not match the number of bytes available in the buffer")]
    DataTypeSizeMismatch,
}

impl From<bytemuck::PodCastError> for ArrayRetrievalError {
    fn from(_: bytemuck::PodCastError) -> Self {
        Self::DataTypeSizeMismatch
    }
}

impl From<ArrayRetrievalError> for io::Error {
    fn from(value: ArrayRetrievalError) -> Self {
        match value {
            ArrayRetrievalError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, value),
            ArrayRetrievalError::DecompressionError(e) => {
                io::Error::new(io::ErrorKind::InvalidData, e)
            }
            ArrayRetrievalError::DataTypeSizeMismatch => {
                io::Error::new(io::ErrorKind::InvalidData, value)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::ParamLike;

    #[test]
    fn test_array_type_params() {
        let p = ArrayType::MZArray.as_param(None);
        assert_eq!(p.curie().as_deref(), Some("MS:1000514"));
        assert_eq!(p.unit, Unit::MZ);

        let p = ArrayType::nonstandard("FWHM").as_param(None);
        assert_eq!(p.value, "FWHM");
        assert_eq!(p.accession, Some(1000786));

        assert_eq!(
            ArrayType::from_accession(1000515),
            Some(ArrayType::IntensityArray)
        );
        assert_eq!(ArrayType::from_accession(1), None);
    }

    #[test]
    fn test_dtype_accessions() {
        for dtype in [
            BinaryDataArrayType::Float32,
            BinaryDataArrayType::Float64,
            BinaryDataArrayType::Int32,
            BinaryDataArrayType::Int64,
        ] {
            let acc = dtype.accession().unwrap();
            assert_eq!(BinaryDataArrayType::from_accession(acc), Some(dtype));
        }
        assert!(BinaryDataArrayType::Unknown.as_param().is_none());
        assert_eq!(
            BinaryCompressionType::from_accession(1000574),
            Some(BinaryCompressionType::Zlib)
        );
    }
}
