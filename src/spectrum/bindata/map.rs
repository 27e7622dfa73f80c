use std::borrow::Cow;

use indexmap::map::{Iter, IterMut};
use indexmap::IndexMap;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use super::array::DataArray;
use super::encodings::{ArrayRetrievalError, ArrayType, BinaryCompressionType, BinaryDataArrayType};
use super::traits::{ByteArrayView, ByteArrayViewMut};

/// The named data arrays of a spectrum, kept in insertion order so that
/// they are written back out in the order they were read.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BinaryArrayMap {
    pub byte_buffer_map: IndexMap<ArrayType, DataArray>,
}

impl BinaryArrayMap {
    pub fn new() -> BinaryArrayMap {
        BinaryArrayMap {
            ..Default::default()
        }
    }

    /// Build a map holding an m/z array (64-bit) and an intensity array (32-bit)
    pub fn from_mzs_and_intensities(
        mzs: &[f64],
        intensities: &[f32],
    ) -> Result<BinaryArrayMap, ArrayRetrievalError> {
        let mut map = Self::new();
        map.add(DataArray::from_slice(
            &ArrayType::MZArray,
            BinaryDataArrayType::Float64,
            mzs,
        )?);
        map.add(DataArray::from_slice(
            &ArrayType::IntensityArray,
            BinaryDataArrayType::Float32,
            intensities,
        )?);
        Ok(map)
    }

    /// Get the number of arrays in the map
    pub fn len(&self) -> usize {
        self.byte_buffer_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_buffer_map.is_empty()
    }

    /// Iterate over references to the key-value pairs of this map
    pub fn iter(&self) -> Iter<ArrayType, DataArray> {
        self.byte_buffer_map.iter()
    }

    /// Iterate over mutable references to the key-value pairs of this map
    pub fn iter_mut(&mut self) -> IterMut<ArrayType, DataArray> {
        self.byte_buffer_map.iter_mut()
    }

    /// Decode all [`DataArray`] in this map. If there are many arrays and the
    /// `parallelism` feature is enabled, each array will be decoded on a separate
    /// thread.
    pub fn decode_all_arrays(&mut self) -> Result<(), ArrayRetrievalError> {
        #[cfg(not(feature = "parallelism"))]
        {
            self._decode_all_arrays()
        }
        #[cfg(feature = "parallelism")]
        {
            if self.len() > 2 {
                self._decode_all_arrays_parallel()
            } else {
                self._decode_all_arrays()
            }
        }
    }

    fn _decode_all_arrays(&mut self) -> Result<(), ArrayRetrievalError> {
        for (_key, value) in self.iter_mut() {
            if !matches!(value.compression, BinaryCompressionType::Decoded) {
                value.decode_and_store()?;
            }
        }
        Ok(())
    }

    #[cfg(feature = "parallelism")]
    fn _decode_all_arrays_parallel(&mut self) -> Result<(), ArrayRetrievalError> {
        self.byte_buffer_map
            .par_values_mut()
            .try_for_each(|value| {
                if !matches!(value.compression, BinaryCompressionType::Decoded) {
                    value.decode_and_store()?;
                }
                Ok(())
            })
    }

    /// Add a [`DataArray`] to the map by its [`ArrayType`] name, replacing any
    /// array of the same kind
    pub fn add(&mut self, array: DataArray) {
        self.byte_buffer_map.insert(array.name.clone(), array);
    }

    /// Get a reference to a specific [`DataArray`] if present
    pub fn get(&self, array_type: &ArrayType) -> Option<&DataArray> {
        self.byte_buffer_map.get(array_type)
    }

    /// Get a mutable reference to a specific [`DataArray`] if present
    pub fn get_mut(&mut self, array_type: &ArrayType) -> Option<&mut DataArray> {
        self.byte_buffer_map.get_mut(array_type)
    }

    /// Check whether a specific [`ArrayType`] is present
    pub fn has_array(&self, array_type: &ArrayType) -> bool {
        self.byte_buffer_map.contains_key(array_type)
    }

    /// Clear the map, discarding any array data
    pub fn clear(&mut self) {
        self.byte_buffer_map.clear();
    }

    pub fn mzs(&'_ self) -> Result<Cow<'_, [f64]>, ArrayRetrievalError> {
        let mz_array = self
            .get(&ArrayType::MZArray)
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::MZArray))?
            .to_f64()?;
        Ok(mz_array)
    }

    pub fn mzs_mut(&mut self) -> Result<&mut [f64], ArrayRetrievalError> {
        if let Some(mz_array) = self.get_mut(&ArrayType::MZArray) {
            mz_array.decode_and_store()?;
            mz_array.store_as(BinaryDataArrayType::Float64)?;
            mz_array.coerce_mut()
        } else {
            Err(ArrayRetrievalError::NotFound(ArrayType::MZArray))
        }
    }

    pub fn intensities(&'_ self) -> Result<Cow<'_, [f32]>, ArrayRetrievalError> {
        let intensities = self
            .get(&ArrayType::IntensityArray)
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::IntensityArray))?
            .to_f32()?;
        Ok(intensities)
    }

    pub fn intensities_mut(&mut self) -> Result<&mut [f32], ArrayRetrievalError> {
        if let Some(int_array) = self.get_mut(&ArrayType::IntensityArray) {
            int_array.decode_and_store()?;
            int_array.store_as(BinaryDataArrayType::Float32)?;
            int_array.coerce_mut()
        } else {
            Err(ArrayRetrievalError::NotFound(ArrayType::IntensityArray))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_construction() {
        let mut map = BinaryArrayMap::new();
        assert!(!map.has_array(&ArrayType::MZArray));
        assert!(matches!(
            map.mzs(),
            Err(ArrayRetrievalError::NotFound(ArrayType::MZArray))
        ));
        map = BinaryArrayMap::from_mzs_and_intensities(&[100.0, 200.0], &[5.0, 10.0]).unwrap();
        assert!(map.has_array(&ArrayType::MZArray));
        assert_eq!(map.len(), 2);
        assert_eq!(map.mzs().unwrap().as_ref(), &[100.0, 200.0]);
        assert_eq!(map.intensities().unwrap().as_ref(), &[5.0f32, 10.0]);
        let keys: Vec<_> = map.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![ArrayType::MZArray, ArrayType::IntensityArray]);
    }

    #[test]
    fn test_decode() {
        let mut map = BinaryArrayMap::from_mzs_and_intensities(&[100.0, 200.0], &[5.0, 10.0]).unwrap();
        for (_, array) in map.iter_mut() {
            array.store_compressed(BinaryCompressionType::Zlib).unwrap();
        }
        assert_eq!(
            map.get(&ArrayType::MZArray).unwrap().compression,
            BinaryCompressionType::Zlib
        );
        map.decode_all_arrays().unwrap();
        assert_eq!(
            map.get(&ArrayType::MZArray).unwrap().compression,
            BinaryCompressionType::Decoded
        );
        map.intensities_mut().unwrap()[0] = 7.0;
        assert_eq!(map.intensities().unwrap()[0], 7.0);
    }
}
