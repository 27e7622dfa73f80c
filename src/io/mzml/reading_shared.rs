use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::{io, mem};

use log::warn;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText};
use quick_xml::Error as XMLError;

use thiserror::Error;

use crate::io::OffsetIndex;
use crate::meta::{DataProcessing, FileDescription, ProcessingMethod, Software, SourceFile};
use crate::params::{
    curie_to_num, ControlledVocabulary, Param, ParamDescribed, ParamLike, ParamList, Unit,
};
use crate::spectrum::{ArrayRetrievalError, ArrayType, SpectrumConversionError};

/**
The different states the [`MzMLReader`](crate::io::mzml::MzMLReader) can enter while parsing
different phases of the document. This information is really only
needed by the module consumer to determine where in the document an
error occurred.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum MzMLParserState {
    Start = 0,
    Resume,

    // Top-level metadata
    CVList,
    FileDescription,
    FileContents,
    SourceFileList,
    SourceFile,

    ReferenceParamGroupList,
    ReferenceParamGroup,

    SoftwareList,
    Software,

    InstrumentConfigurationList,
    InstrumentConfiguration,

    DataProcessingList,
    DataProcessing,
    ProcessingMethod,

    Run,

    // Spectrum list elements
    Spectrum,
    SpectrumDone,

    SpectrumList,
    SpectrumListDone,

    BinaryDataArrayList,
    BinaryDataArray,
    Binary,

    ScanList,
    Scan,
    ScanWindowList,
    ScanWindow,

    PrecursorList,
    Precursor,
    IsolationWindow,
    SelectedIonList,
    SelectedIon,
    Activation,

    // Everything after `</spectrumList>`
    Trailer,

    EOF,
    ParserError,
}

impl Display for MzMLParserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/**
All the ways that mzML parsing can go wrong
*/
#[derive(Debug, Error)]
pub enum MzMLParserError {
    #[error("An error occurred outside of normal conditions {0:?}")]
    UnknownError(MzMLParserState),
    #[error("An incomplete spectrum was parsed")]
    IncompleteSpectrum,
    #[error("An incomplete element {0} was encountered in {1:?}")]
    IncompleteElementError(String, MzMLParserState),
    #[error("An XML error {1:?} was encountered in {0:?}")]
    XMLError(MzMLParserState, #[source] XMLError),
    #[error("An IO error {1} was encountered in {0:?}")]
    IOError(MzMLParserState, #[source] io::Error),
    #[error("Failed to decode {1} array in {0:?}: {2}")]
    ArrayDecodingError(MzMLParserState, ArrayType, #[source] ArrayRetrievalError),
    #[error("<{element}> is missing its required `{attribute}` attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("Could not interpret {name} = {value:?} in {state:?}")]
    InvalidAttribute {
        state: MzMLParserState,
        name: String,
        value: String,
    },
    #[error("Encountered a referenceableParamGroupRef to an undefined group {0:?}")]
    UnknownReferenceGroup(String),
    #[error("Spectrum {0} is inconsistent: {1}")]
    SpectrumConversion(String, #[source] SpectrumConversionError),
    #[error("The document is not mzML, found root element <{0}>")]
    NotMzML(String),
    #[error("Reached the end of the spectrum list")]
    EOF,
}

impl From<MzMLParserError> for io::Error {
    fn from(value: MzMLParserError) -> Self {
        match value {
            MzMLParserError::IOError(_, ref e) => io::Error::new(e.kind(), value),
            MzMLParserError::EOF => io::Error::new(io::ErrorKind::UnexpectedEof, value),
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

pub type ParserResult = Result<MzMLParserState, MzMLParserError>;

/**
Common XML error handling behaviors
*/
pub trait XMLParseBase {
    fn handle_xml_error(&self, error: XMLError, state: MzMLParserState) -> MzMLParserError {
        MzMLParserError::XMLError(state, error)
    }

    /// Unescape an attribute's value into an owned string
    fn attribute_text(
        &self,
        attr: &Attribute,
        state: MzMLParserState,
    ) -> Result<String, MzMLParserError> {
        attr.unescape_value()
            .map(|v| v.to_string())
            .map_err(|e| self.handle_xml_error(e, state))
    }

    /// Unescape and parse an attribute's value
    fn attribute_parse<T: FromStr>(
        &self,
        attr: &Attribute,
        state: MzMLParserState,
    ) -> Result<T, MzMLParserError> {
        let text = self.attribute_text(attr, state)?;
        text.trim()
            .parse::<T>()
            .map_err(|_| MzMLParserError::InvalidAttribute {
                state,
                name: String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                value: text,
            })
    }
}

/// Parse a numeric value out of a parameter, naming the parameter on failure
pub(crate) fn param_value<T: FromStr>(
    param: &Param,
    state: MzMLParserState,
) -> Result<T, MzMLParserError> {
    param
        .value
        .trim()
        .parse::<T>()
        .map_err(|_| MzMLParserError::InvalidAttribute {
            state,
            name: param.name.clone(),
            value: param.value.clone(),
        })
}

/**
Common `CVParam` parsing behaviors
*/
pub trait CVParamParse: XMLParseBase {
    fn handle_param(
        event: &BytesStart,
        reader_position: usize,
        state: MzMLParserState,
    ) -> Result<Param, MzMLParserError> {
        let mut param = Param::new();
        let mut unit_name = None;
        let mut unit_accession = None;
        let decode = |attr: &Attribute| {
            attr.unescape_value()
                .map(|v| v.into_owned())
                .map_err(|e| {
                    log::debug!("Error decoding parameter attribute at {reader_position}: {e}");
                    MzMLParserError::XMLError(state, e)
                })
        };
        for attr_parsed in event.attributes() {
            match attr_parsed {
                Ok(attr) => match attr.key.as_ref() {
                    b"name" => {
                        param.name = decode(&attr)?;
                    }
                    b"value" => {
                        param.value = decode(&attr)?;
                    }
                    b"cvRef" => {
                        let cv_id = decode(&attr)?;
                        param.controlled_vocabulary = cv_id
                            .parse::<ControlledVocabulary>()
                            .ok()
                            .and_then(|cv| cv.as_option());
                    }
                    b"accession" => {
                        let (_, acc) = curie_to_num(&decode(&attr)?);
                        param.accession = acc;
                    }
                    b"unitName" => {
                        unit_name = Some(Unit::from_name(&decode(&attr)?));
                    }
                    b"unitAccession" => {
                        unit_accession = Some(Unit::from_accession(&decode(&attr)?));
                    }
                    _ => {}
                },
                Err(msg) => return Err(MzMLParserError::XMLError(state, msg.into())),
            }
        }
        // The accession wins over the name when both are known
        if let Some(unit) = unit_name {
            if unit != Unit::Unknown {
                param.unit = unit;
            }
        }
        if let Some(unit) = unit_accession {
            if unit != Unit::Unknown {
                param.unit = unit;
            }
        }
        Ok(param)
    }
}

pub trait MzMLSAX {
    fn start_element(&mut self, event: &BytesStart, state: MzMLParserState) -> ParserResult;

    fn empty_element(
        &mut self,
        event: &BytesStart,
        state: MzMLParserState,
        reader_position: usize,
    ) -> ParserResult;

    fn end_element(&mut self, event: &BytesEnd, state: MzMLParserState) -> ParserResult;

    fn text(&mut self, event: &BytesText, state: MzMLParserState) -> ParserResult;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexParserState {
    Start,
    SpectrumIndexList,
    OtherIndexList,
    IndexListOffset,
    FileChecksum,
    Done,
}

/**
Reads everything that follows `</spectrumList>`: the closing `run` and `mzML`
tags and, for indexedmzML, the offset index, its offset and the file checksum.
*/
#[derive(Debug, Clone)]
pub struct IndexedMzMLIndexExtractor {
    pub spectrum_index: OffsetIndex,
    pub index_list_offset: Option<u64>,
    pub file_checksum: Option<String>,
    pub closed_mzml: bool,
    pub closed_indexed_mzml: bool,
    last_id: String,
    state: IndexParserState,
}

impl Default for IndexedMzMLIndexExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl XMLParseBase for IndexedMzMLIndexExtractor {}

impl IndexedMzMLIndexExtractor {
    pub fn new() -> IndexedMzMLIndexExtractor {
        IndexedMzMLIndexExtractor {
            spectrum_index: OffsetIndex::new("spectrum"),
            index_list_offset: None,
            file_checksum: None,
            closed_mzml: false,
            closed_indexed_mzml: false,
            last_id: String::new(),
            state: IndexParserState::Start,
        }
    }

    pub fn state(&self) -> IndexParserState {
        self.state
    }

    pub fn start_element(&mut self, event: &BytesStart) -> Result<(), MzMLParserError> {
        const STATE: MzMLParserState = MzMLParserState::Trailer;
        match event.name().as_ref() {
            b"offset" => {
                for attr_parsed in event.attributes() {
                    let attr = attr_parsed.map_err(|e| self.handle_xml_error(e.into(), STATE))?;
                    if attr.key.as_ref() == b"idRef" {
                        self.last_id = self.attribute_text(&attr, STATE)?;
                    }
                }
            }
            b"index" => {
                self.state = IndexParserState::OtherIndexList;
                for attr_parsed in event.attributes() {
                    let attr = attr_parsed.map_err(|e| self.handle_xml_error(e.into(), STATE))?;
                    if attr.key.as_ref() == b"name" && self.attribute_text(&attr, STATE)? == "spectrum"
                    {
                        self.state = IndexParserState::SpectrumIndexList;
                        self.spectrum_index.init = true;
                    }
                }
            }
            b"indexListOffset" => self.state = IndexParserState::IndexListOffset,
            b"fileChecksum" => self.state = IndexParserState::FileChecksum,
            _ => {}
        }
        Ok(())
    }

    pub fn end_element(&mut self, event: &BytesEnd) -> Result<(), MzMLParserError> {
        match event.name().as_ref() {
            b"index" | b"indexListOffset" | b"fileChecksum" => {
                self.state = IndexParserState::Start;
            }
            b"mzML" => self.closed_mzml = true,
            b"indexedmzML" => {
                self.closed_indexed_mzml = true;
                self.state = IndexParserState::Done;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn text(&mut self, event: &BytesText) -> Result<(), MzMLParserError> {
        const STATE: MzMLParserState = MzMLParserState::Trailer;
        let invalid = |name: &str, value: &str| MzMLParserError::InvalidAttribute {
            state: STATE,
            name: name.to_string(),
            value: value.to_string(),
        };
        match self.state {
            IndexParserState::SpectrumIndexList => {
                let text = event.unescape().map_err(|e| self.handle_xml_error(e, STATE))?;
                let offset = text
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| invalid("offset", text.as_ref()))?;
                if !self.last_id.is_empty() {
                    let key = mem::take(&mut self.last_id);
                    self.spectrum_index.insert(key, offset);
                } else {
                    warn!("Out of order text in index")
                }
            }
            IndexParserState::IndexListOffset => {
                let text = event.unescape().map_err(|e| self.handle_xml_error(e, STATE))?;
                self.index_list_offset = Some(
                    text.trim()
                        .parse::<u64>()
                        .map_err(|_| invalid("indexListOffset", text.as_ref()))?,
                );
            }
            IndexParserState::FileChecksum => {
                let text = event.unescape().map_err(|e| self.handle_xml_error(e, STATE))?;
                self.file_checksum = Some(text.trim().to_string());
            }
            _ => {}
        }
        Ok(())
    }
}

/**A SAX-style parser for building up the metadata section prior to the `<run>` element
of an mzML file.*/
#[derive(Debug, Default)]
pub struct FileMetadataBuilder {
    pub file_description: FileDescription,
    pub softwares: Vec<Software>,
    pub data_processings: Vec<DataProcessing>,
    pub reference_param_groups: HashMap<String, ParamList>,
    pub last_group: String,
    pub run_id: Option<String>,
    pub num_spectra: Option<usize>,
    /// Whether the document is wrapped in `<indexedmzML>`
    pub indexed: bool,
    /// Whether an `<mzML>` element has been opened
    pub saw_mzml: bool,
    /// Whether `</mzML>` was reached before any spectrum list
    pub closed_mzml: bool,
}

impl XMLParseBase for FileMetadataBuilder {}
impl CVParamParse for FileMetadataBuilder {}

impl FileMetadataBuilder {
    pub fn start_element(&mut self, event: &BytesStart, state: MzMLParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"indexedmzML" => self.indexed = true,
            b"mzML" => self.saw_mzml = true,
            b"cvList" => return Ok(MzMLParserState::CVList),
            b"fileDescription" => return Ok(MzMLParserState::FileDescription),
            b"fileContent" => return Ok(MzMLParserState::FileContents),
            b"sourceFileList" => return Ok(MzMLParserState::SourceFileList),
            b"sourceFile" => {
                let mut source_file = SourceFile::default();
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => match attr.key.as_ref() {
                            b"id" => source_file.id = self.attribute_text(&attr, state)?,
                            b"name" => source_file.name = self.attribute_text(&attr, state)?,
                            b"location" => {
                                source_file.location = self.attribute_text(&attr, state)?
                            }
                            _ => {}
                        },
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                self.file_description.source_files.push(source_file);
                return Ok(MzMLParserState::SourceFile);
            }
            b"softwareList" => return Ok(MzMLParserState::SoftwareList),
            b"software" => {
                let mut software = Software::default();
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => match attr.key.as_ref() {
                            b"id" => software.id = self.attribute_text(&attr, state)?,
                            b"version" => software.version = self.attribute_text(&attr, state)?,
                            _ => {}
                        },
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                self.softwares.push(software);
                return Ok(MzMLParserState::Software);
            }
            b"referenceableParamGroupList" => {
                return Ok(MzMLParserState::ReferenceParamGroupList);
            }
            b"referenceableParamGroup" => {
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => {
                            if attr.key.as_ref() == b"id" {
                                let key = self.attribute_text(&attr, state)?;
                                self.reference_param_groups.entry(key.clone()).or_default();
                                self.last_group = key;
                            }
                        }
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                return Ok(MzMLParserState::ReferenceParamGroup);
            }
            b"instrumentConfigurationList" => {
                return Ok(MzMLParserState::InstrumentConfigurationList)
            }
            b"instrumentConfiguration" => return Ok(MzMLParserState::InstrumentConfiguration),
            b"dataProcessingList" => return Ok(MzMLParserState::DataProcessingList),
            b"dataProcessing" => {
                let mut dp = DataProcessing::default();
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => {
                            if attr.key.as_ref() == b"id" {
                                dp.id = self.attribute_text(&attr, state)?;
                            }
                        }
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                self.data_processings.push(dp);
                return Ok(MzMLParserState::DataProcessing);
            }
            b"processingMethod" => {
                let mut method = ProcessingMethod::default();
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => match attr.key.as_ref() {
                            b"order" => method.order = self.attribute_parse(&attr, state)?,
                            b"softwareRef" => {
                                method.software_reference = self.attribute_text(&attr, state)?
                            }
                            _ => {}
                        },
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                if let Some(dp) = self.data_processings.last_mut() {
                    dp.push(method);
                }
                return Ok(MzMLParserState::ProcessingMethod);
            }
            b"run" => {
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => {
                            if attr.key.as_ref() == b"id" {
                                self.run_id = Some(self.attribute_text(&attr, state)?);
                            }
                        }
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                return Ok(MzMLParserState::Run);
            }
            b"spectrumList" => {
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => {
                            if attr.key.as_ref() == b"count" {
                                self.num_spectra = Some(self.attribute_parse(&attr, state)?);
                            }
                        }
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                return Ok(MzMLParserState::SpectrumList);
            }
            _ => {}
        }

        Ok(state)
    }

    pub fn fill_param_into(&mut self, param: Param, state: MzMLParserState) {
        match state {
            MzMLParserState::SourceFile => {
                if let Some(sf) = self.file_description.source_files.last_mut() {
                    if param.is_ms() && param.name.ends_with("nativeID format") {
                        sf.id_format = Some(param)
                    } else if param.is_ms() && param.name.ends_with(" format") {
                        sf.file_format = Some(param)
                    } else {
                        sf.add_param(param)
                    }
                }
            }
            MzMLParserState::FileContents => {
                self.file_description.add_param(param);
            }
            MzMLParserState::Software => {
                if let Some(sw) = self.softwares.last_mut() {
                    sw.add_param(param)
                }
            }
            MzMLParserState::ProcessingMethod => {
                if let Some(method) = self
                    .data_processings
                    .last_mut()
                    .and_then(|dp| dp.methods.last_mut())
                {
                    method.add_param(param)
                }
            }
            MzMLParserState::ReferenceParamGroup => {
                self.reference_param_groups
                    .entry(self.last_group.clone())
                    .or_default()
                    .push(param);
            }
            _ => {}
        }
    }

    pub fn empty_element(
        &mut self,
        event: &BytesStart,
        state: MzMLParserState,
        reader_position: usize,
    ) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"cvParam" | b"userParam" => {
                let param = Self::handle_param(event, reader_position, state)?;
                self.fill_param_into(param, state);
            }
            b"referenceableParamGroupRef" => {
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => {
                            if attr.key.as_ref() == b"ref" {
                                let group_id = self.attribute_text(&attr, state)?;
                                let param_group = match self.reference_param_groups.get(&group_id)
                                {
                                    Some(params) => params.clone(),
                                    None => {
                                        return Err(MzMLParserError::UnknownReferenceGroup(
                                            group_id,
                                        ))
                                    }
                                };
                                for param in param_group {
                                    self.fill_param_into(param, state)
                                }
                            }
                        }
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
            }
            b"spectrumList" => {
                // An empty spectrum list is still a spectrum list
                return Ok(MzMLParserState::SpectrumListDone);
            }
            &_ => {}
        }
        Ok(state)
    }

    pub fn end_element(&mut self, event: &BytesEnd, state: MzMLParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"cvList" => return Ok(MzMLParserState::Start),
            b"fileDescription" => return Ok(MzMLParserState::FileDescription),
            b"fileContent" => return Ok(MzMLParserState::FileDescription),
            b"sourceFileList" => return Ok(MzMLParserState::FileDescription),
            b"sourceFile" => return Ok(MzMLParserState::SourceFileList),
            b"softwareList" => return Ok(MzMLParserState::SoftwareList),
            b"software" => return Ok(MzMLParserState::SoftwareList),
            b"referenceableParamGroup" => return Ok(MzMLParserState::ReferenceParamGroupList),
            b"referenceableParamGroupList" => {
                return Ok(MzMLParserState::ReferenceParamGroupList);
            }
            b"instrumentConfigurationList" => {
                return Ok(MzMLParserState::InstrumentConfigurationList)
            }
            b"instrumentConfiguration" => return Ok(MzMLParserState::InstrumentConfigurationList),
            b"dataProcessingList" => return Ok(MzMLParserState::DataProcessingList),
            b"dataProcessing" => return Ok(MzMLParserState::DataProcessingList),
            b"processingMethod" => return Ok(MzMLParserState::DataProcessing),
            b"mzML" => self.closed_mzml = true,
            _ => {}
        }
        Ok(state)
    }

    pub fn text(&mut self, _event: &BytesText, state: MzMLParserState) -> ParserResult {
        Ok(state)
    }
}

impl MzMLParserError {
    /// Classify an error raised by the XML tokenizer, separating I/O failures and
    /// premature ends of input from malformed markup.
    pub(crate) fn from_xml(state: MzMLParserState, error: XMLError) -> Self {
        match error {
            XMLError::Io(e) => Self::IOError(state, io::Error::new(e.kind(), e.to_string())),
            XMLError::UnexpectedEof(context) => Self::IncompleteElementError(context, state),
            e => Self::XMLError(state, e),
        }
    }
}
