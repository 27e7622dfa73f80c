use std::borrow::Cow;
use std::marker::PhantomData;
use std::mem;

use bytemuck::Pod;
use num_traits::{AsPrimitive, Num};

use crate::params::Unit;

use super::encodings::{ArrayRetrievalError, ArrayType, BinaryDataArrayType, Bytes};

/// Typed, read-only views over a byte buffer holding one of the
/// [`BinaryDataArrayType`]s.
pub trait ByteArrayView<'transient, 'lifespan: 'transient> {
    fn view(&'lifespan self) -> Result<Cow<'lifespan, [u8]>, ArrayRetrievalError>;

    fn coerce_from<T: Pod>(
        buffer: Cow<'transient, [u8]>,
    ) -> Result<Cow<'transient, [T]>, ArrayRetrievalError> {
        let n = buffer.len();
        if n == 0 {
            return Ok(Cow::Owned(Vec::new()));
        }
        let z = mem::size_of::<T>();
        if n % z != 0 {
            return Err(ArrayRetrievalError::DataTypeSizeMismatch);
        }
        match buffer {
            Cow::Borrowed(c) => match bytemuck::try_cast_slice(c) {
                Ok(view) => Ok(Cow::Borrowed(view)),
                // Unaligned borrowed bytes are copied element-wise instead
                Err(_) => Ok(Cow::Owned(
                    c.chunks_exact(z).map(bytemuck::pod_read_unaligned).collect(),
                )),
            },
            Cow::Owned(v) => Ok(Cow::Owned(
                v.chunks_exact(z).map(bytemuck::pod_read_unaligned).collect(),
            )),
        }
    }

    fn coerce<T: Pod>(&'lifespan self) -> Result<Cow<'transient, [T]>, ArrayRetrievalError> {
        Self::coerce_from(self.view()?)
    }

    /// Decode the array, then copy it to a new array, converting each element from type `S` to to type `D`
    fn convert<S: Num + Clone + AsPrimitive<D> + Pod, D: Num + Clone + Copy + 'static>(
        &'lifespan self,
    ) -> Result<Cow<'transient, [D]>, ArrayRetrievalError> {
        let view = self.coerce::<S>()?;
        Ok(Cow::Owned(view.iter().map(|a| a.as_()).collect()))
    }

    /// The kind of array this is
    fn name(&self) -> &ArrayType;

    /// The real data type encoded in bytes
    fn dtype(&self) -> BinaryDataArrayType;

    /// The unit of measurement each data point is in
    fn unit(&self) -> Unit;

    fn to_f32(&'lifespan self) -> Result<Cow<'transient, [f32]>, ArrayRetrievalError> {
        type D = f32;
        match self.dtype() {
            BinaryDataArrayType::Float32 => self.coerce::<D>(),
            BinaryDataArrayType::Float64 => self.convert::<f64, D>(),
            BinaryDataArrayType::Int32 => self.convert::<i32, D>(),
            BinaryDataArrayType::Int64 => self.convert::<i64, D>(),
            BinaryDataArrayType::Unknown => Err(ArrayRetrievalError::DataTypeSizeMismatch),
        }
    }

    fn to_f64(&'lifespan self) -> Result<Cow<'transient, [f64]>, ArrayRetrievalError> {
        type D = f64;
        match self.dtype() {
            BinaryDataArrayType::Float32 => self.convert::<f32, D>(),
            BinaryDataArrayType::Float64 => self.coerce::<D>(),
            BinaryDataArrayType::Int32 => self.convert::<i32, D>(),
            BinaryDataArrayType::Int64 => self.convert::<i64, D>(),
            BinaryDataArrayType::Unknown => Err(ArrayRetrievalError::DataTypeSizeMismatch),
        }
    }

    fn to_i32(&'lifespan self) -> Result<Cow<'transient, [i32]>, ArrayRetrievalError> {
        type D = i32;
        match self.dtype() {
            BinaryDataArrayType::Float32 => self.convert::<f32, D>(),
            BinaryDataArrayType::Float64 => self.convert::<f64, D>(),
            BinaryDataArrayType::Int32 => self.coerce::<D>(),
            BinaryDataArrayType::Int64 => self.convert::<i64, D>(),
            BinaryDataArrayType::Unknown => Err(ArrayRetrievalError::DataTypeSizeMismatch),
        }
    }

    fn to_i64(&'lifespan self) -> Result<Cow<'transient, [i64]>, ArrayRetrievalError> {
        type D = i64;
        match self.dtype() {
            BinaryDataArrayType::Float32 => self.convert::<f32, D>(),
            BinaryDataArrayType::Float64 => self.convert::<f64, D>(),
            BinaryDataArrayType::Int32 => self.convert::<i32, D>(),
            BinaryDataArrayType::Int64 => self.coerce::<D>(),
            BinaryDataArrayType::Unknown => Err(ArrayRetrievalError::DataTypeSizeMismatch),
        }
    }

    /// The size of encoded array in terms of # of elements of the [`BinaryDataArrayType`] given by [`ByteArrayView::dtype`]
    fn data_len(&'lifespan self) -> Result<usize, ArrayRetrievalError> {
        let view = self.view()?;
        let n = view.len();
        Ok(n / self.dtype().size_of())
    }

    fn iter_f32(&'lifespan self) -> Result<DataSliceIter<'lifespan, f32>, ArrayRetrievalError> {
        Ok(DataSliceIter::new(self.view()?))
    }

    fn iter_f64(&'lifespan self) -> Result<DataSliceIter<'lifespan, f64>, ArrayRetrievalError> {
        Ok(DataSliceIter::new(self.view()?))
    }
}

pub trait ByteArrayViewMut<'transient, 'lifespan: 'transient>:
    ByteArrayView<'transient, 'lifespan>
{
    fn view_mut(&'transient mut self) -> Result<&'transient mut Bytes, ArrayRetrievalError>;

    fn unit_mut(&mut self) -> &mut Unit;

    fn coerce_mut<T: Pod>(
        &'transient mut self,
    ) -> Result<&'transient mut [T], ArrayRetrievalError> {
        let view = self.view_mut()?;
        if view.is_empty() {
            return Ok(&mut []);
        }
        Ok(bytemuck::try_cast_slice_mut(view.as_mut_slice())?)
    }
}

#[derive(Debug)]
pub struct DataSliceIter<'a, T: Pod> {
    buffer: Cow<'a, [u8]>,
    i: usize,
    _t: PhantomData<T>,
}

impl<T: Pod> ExactSizeIterator for DataSliceIter<'_, T> {
    fn len(&self) -> usize {
        let z = mem::size_of::<T>();
        self.buffer.len() / z - self.i
    }
}

impl<'a, T: Pod> DataSliceIter<'a, T> {
    pub fn new(buffer: Cow<'a, [u8]>) -> Self {
        Self {
            buffer,
            i: 0,
            _t: PhantomData,
        }
    }

    pub fn next_value(&mut self) -> Option<T> {
        let z = mem::size_of::<T>();
        let offset = z * self.i;
        if (offset + z) > self.buffer.len() {
            None
        } else {
            let val = bytemuck::pod_read_unaligned(&self.buffer[offset..offset + z]);
            self.i += 1;
            Some(val)
        }
    }
}

impl<T: Pod> Iterator for DataSliceIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_value()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.len();
        (n, Some(n))
    }
}
