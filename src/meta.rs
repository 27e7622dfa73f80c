//! File level metadata describing where a run came from and how it was processed
pub mod data_processing;
pub mod file_description;
pub mod software;

pub use crate::meta::data_processing::{DataProcessing, ProcessingMethod};
pub use crate::meta::file_description::{FileDescription, SourceFile};
pub use crate::meta::software::Software;
