mod array;
mod encodings;
mod map;
mod traits;

pub use array::DataArray;
pub use encodings::{
    as_bytes, to_bytes, vec_as_bytes, ArrayRetrievalError, ArrayType, BinaryCompressionType,
    BinaryDataArrayType, Bytes,
};
pub use map::BinaryArrayMap;
pub use traits::{ByteArrayView, ByteArrayViewMut, DataSliceIter};
