use std::borrow::Cow;
use std::fmt::{self, Formatter};
use std::io::prelude::*;
use std::mem;

use base64_simd;
use bytemuck::Pod;
use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use crate::params::{ParamDescribed, ParamList, Unit};

use super::encodings::{
    to_bytes, ArrayRetrievalError, ArrayType, BinaryCompressionType, BinaryDataArrayType, Bytes,
};
use super::traits::{ByteArrayView, ByteArrayViewMut};

/// Represents a data array that holds a byte buffer that may be compressed, base64 encoded,
/// or raw little endian bytes, and provides views of those bytes as a small range of supported
/// types.
///
/// This type is modeled after the `<binaryDataArray>` element in mzML.
///
/// # Note
/// All operations that view the byte buffer as typed data need that data to be decoded and
/// decompressed first. If the buffer is not stored decoded, each view copies and decodes the
/// whole buffer, so use [`DataArray::decode_and_store`] before repeated access. The mzML reader
/// decodes every array eagerly.
#[derive(Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataArray {
    pub data: Bytes,
    pub dtype: BinaryDataArrayType,
    pub compression: BinaryCompressionType,
    pub name: ArrayType,
    pub params: ParamList,
    pub unit: Unit,
}

impl core::fmt::Debug for DataArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataArray")
            .field("name", &self.name)
            .field("data size", &self.data.len())
            .field("dtype", &self.dtype)
            .field("compression", &self.compression)
            .field("params", &self.params)
            .field("unit", &self.unit)
            .finish()
    }
}

const EMPTY_BUFFER: [u8; 0] = [];

impl<'transient, 'lifespan: 'transient> DataArray {
    pub fn new() -> DataArray {
        DataArray {
            ..Default::default()
        }
    }

    pub fn from_name(name: &ArrayType) -> DataArray {
        DataArray {
            dtype: name.preferred_dtype(),
            name: name.clone(),
            compression: BinaryCompressionType::Decoded,
            ..Default::default()
        }
    }

    pub fn from_name_and_type(name: &ArrayType, dtype: BinaryDataArrayType) -> DataArray {
        DataArray {
            dtype,
            name: name.clone(),
            compression: BinaryCompressionType::Decoded,
            ..Default::default()
        }
    }

    pub fn wrap(name: &ArrayType, dtype: BinaryDataArrayType, data: Bytes) -> DataArray {
        DataArray {
            dtype,
            name: name.clone(),
            data,
            compression: BinaryCompressionType::Decoded,
            ..Default::default()
        }
    }

    /// Build a decoded array from a typed slice. The element size of `T` must match
    /// `dtype`.
    pub fn from_slice<T: Pod>(
        name: &ArrayType,
        dtype: BinaryDataArrayType,
        values: &[T],
    ) -> Result<DataArray, ArrayRetrievalError> {
        let mut array = Self::from_name_and_type(name, dtype);
        array.update_buffer(values)?;
        Ok(array)
    }

    pub fn update_buffer<T: Pod>(
        &mut self,
        data_buffer: &[T],
    ) -> Result<usize, ArrayRetrievalError> {
        if self.dtype.size_of() != mem::size_of::<T>() {
            Err(ArrayRetrievalError::DataTypeSizeMismatch)
        } else {
            self.data = to_bytes(data_buffer);
            self.compression = BinaryCompressionType::Decoded;
            Ok(self.data.len())
        }
    }

    pub fn push<T: Pod>(&mut self, value: T) -> Result<(), ArrayRetrievalError> {
        if !matches!(self.compression, BinaryCompressionType::Decoded) {
            self.decode_and_store()?;
        };
        if self.dtype.size_of() != mem::size_of::<T>() {
            Err(ArrayRetrievalError::DataTypeSizeMismatch)
        } else {
            let data = bytemuck::bytes_of(&value);
            self.data.extend_from_slice(data);
            Ok(())
        }
    }

    pub fn extend<T: Pod>(&mut self, values: &[T]) -> Result<(), ArrayRetrievalError> {
        if !matches!(self.compression, BinaryCompressionType::Decoded) {
            self.decode_and_store()?;
        };
        if self.dtype.size_of() != mem::size_of::<T>() {
            Err(ArrayRetrievalError::DataTypeSizeMismatch)
        } else {
            let data = bytemuck::cast_slice(values);
            self.data.extend_from_slice(data);
            Ok(())
        }
    }

    /// Produce the base64 text for this array under `compression`, as it would appear
    /// inside a `<binary>` element.
    pub fn encode_bytestring(
        &self,
        compression: BinaryCompressionType,
    ) -> Result<Bytes, ArrayRetrievalError> {
        if self.compression == compression {
            log::trace!("Fast-path encoding {}:{}", self.name, self.dtype);
            return Ok(self.data.clone());
        }
        let bytestring = self.decode()?;
        match compression {
            BinaryCompressionType::Zlib => {
                let compressed = Self::compress_zlib(&bytestring)?;
                Ok(base64_simd::STANDARD.encode_type::<Bytes>(&compressed))
            }
            BinaryCompressionType::NoCompression => {
                Ok(base64_simd::STANDARD.encode_type::<Bytes>(bytestring.as_ref()))
            }
            BinaryCompressionType::Decoded => Ok(bytestring.into_owned()),
        }
    }

    pub fn compress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
        let result = Bytes::new();
        let mut compressor = ZlibEncoder::new(result, Compression::best());
        compressor
            .write_all(bytestring)
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))?;
        compressor
            .finish()
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))
    }

    pub fn decompress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
        let result = Bytes::new();
        let mut decompressor = ZlibDecoder::new(result);
        decompressor
            .write_all(bytestring)
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))?;
        decompressor
            .finish()
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))
    }

    /// Decode the stored buffer and replace it with the decoded bytes.
    ///
    /// The return value is the content of `self.compression` after decoding.
    ///
    /// This may fail if the decoding fails for any reason.
    pub fn decode_and_store(&mut self) -> Result<BinaryCompressionType, ArrayRetrievalError> {
        match self.decode()? {
            // The only time this is a borrow is when the data are already
            // decoded.
            Cow::Borrowed(_view) => {}
            Cow::Owned(buffer) => {
                self.data = buffer;
            }
        }
        self.compression = BinaryCompressionType::Decoded;
        Ok(self.compression)
    }

    /// Decompress and base64-decode encoded bytes, and return the data.
    ///
    /// If the data were already decoded, the existing bytes are returned. Otherwise one or
    /// more buffers may be allocated to hold the decompressed and decoded bytes.
    pub fn decode(&'lifespan self) -> Result<Cow<'lifespan, [u8]>, ArrayRetrievalError> {
        if self.data.is_empty() {
            return Ok(Cow::Borrowed(&EMPTY_BUFFER));
        }

        macro_rules! base64_decode {
            () => {
                base64_simd::STANDARD
                    .decode_type::<Bytes>(self.data.trim_ascii())
                    .map_err(|e| {
                        ArrayRetrievalError::DecompressionError(format!(
                            "Failed to decode base64 array: {e}"
                        ))
                    })?
            };
        }

        match self.compression {
            BinaryCompressionType::Decoded => Ok(Cow::Borrowed(self.data.as_slice())),
            BinaryCompressionType::NoCompression => {
                let bytestring = base64_decode!();
                Ok(Cow::Owned(bytestring))
            }
            BinaryCompressionType::Zlib => {
                let bytestring = base64_decode!();
                Ok(Cow::Owned(Self::decompress_zlib(&bytestring)?))
            }
        }
    }

    pub fn decode_mut(&'transient mut self) -> Result<&'transient mut Bytes, ArrayRetrievalError> {
        if !matches!(self.compression, BinaryCompressionType::Decoded) {
            self.decode_and_store()?;
        }
        Ok(&mut self.data)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.params.clear();
    }

    /// The reverse of [`DataArray::decode_and_store`], this method compresses `self.data` to the desired
    /// compression method and stores that buffer as `self.data`.
    pub fn store_compressed(
        &mut self,
        compression: BinaryCompressionType,
    ) -> Result<(), ArrayRetrievalError> {
        if self.compression != compression {
            let bytes = self.encode_bytestring(compression)?;
            self.data = bytes;
            self.compression = compression;
        }
        Ok(())
    }

    /// Recode the stored data as the requested binary data type.
    pub fn store_as(&mut self, dtype: BinaryDataArrayType) -> Result<usize, ArrayRetrievalError> {
        if self.dtype == dtype {
            return Ok(self.data.len());
        }
        let recast = match dtype {
            BinaryDataArrayType::Float32 => to_bytes(&self.to_f32()?),
            BinaryDataArrayType::Float64 => to_bytes(&self.to_f64()?),
            BinaryDataArrayType::Int32 => to_bytes(&self.to_i32()?),
            BinaryDataArrayType::Int64 => to_bytes(&self.to_i64()?),
            BinaryDataArrayType::Unknown => return Ok(0),
        };
        self.dtype = dtype;
        self.data = recast;
        self.compression = BinaryCompressionType::Decoded;
        Ok(self.data.len())
    }
}

impl<'transient, 'lifespan: 'transient> ByteArrayView<'transient, 'lifespan> for DataArray {
    fn view(&'lifespan self) -> Result<Cow<'lifespan, [u8]>, ArrayRetrievalError> {
        self.decode()
    }

    fn dtype(&self) -> BinaryDataArrayType {
        self.dtype
    }

    fn unit(&self) -> Unit {
        self.unit
    }

    fn name(&self) -> &ArrayType {
        &self.name
    }
}

impl<'transient, 'lifespan: 'transient> ByteArrayViewMut<'transient, 'lifespan> for DataArray {
    fn view_mut(&'transient mut self) -> Result<&'transient mut Bytes, ArrayRetrievalError> {
        self.decode_mut()
    }

    fn unit_mut(&mut self) -> &mut Unit {
        &mut self.unit
    }
}

impl ParamDescribed for DataArray {
    fn params(&self) -> &ParamList {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamList {
        &mut self.params
    }
}
