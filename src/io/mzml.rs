//! Implements a parser and a writer for the PSI-MS mzML and indexedmzML XML file formats
//! for representing raw and processed mass spectra.

mod reader;
mod reading_shared;
mod writer;

pub use crate::io::mzml::reading_shared::{
    CVParamParse, FileMetadataBuilder, IndexedMzMLIndexExtractor, MzMLParserError,
    MzMLParserState, MzMLSAX, ParserResult, XMLParseBase,
};

pub use crate::io::mzml::reader::{read_mzml, MzMLReader, MzMLSpectrumBuilder};

pub use crate::io::mzml::writer::{
    write_mzml, write_mzml_with_compression, write_spectrum_mzml, MzMLWriter, MzMLWriterError,
    MzMLWriterState, WriterResult,
};
