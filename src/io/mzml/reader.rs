use std::collections::HashMap;
use std::fs;
use std::io::{self, prelude::*, BufReader};
use std::mem;
use std::path::Path;

use log::{trace, warn};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;

use super::reading_shared::{
    param_value, CVParamParse, FileMetadataBuilder, IndexedMzMLIndexExtractor, MzMLParserError,
    MzMLParserState, MzMLSAX, ParserResult, XMLParseBase,
};
use crate::io::OffsetIndex;
use crate::meta::{DataProcessing, FileDescription, Software};
use crate::params::{Param, ParamDescribed, ParamLike, ParamList, Unit};
use crate::spectrum::bindata::{
    ArrayType, BinaryArrayMap, BinaryCompressionType, BinaryDataArrayType, Bytes, DataArray,
};
use crate::spectrum::scan_properties::*;
use crate::spectrum::{Spectrum, SpectrumCollection};

const BUFFER_SIZE: usize = 10000;

/// Compression accessions this reader recognizes but cannot decode
const UNSUPPORTED_COMPRESSIONS: [u32; 6] = [1002312, 1002313, 1002314, 1002746, 1002747, 1002748];

/// An accumulator for the attributes of a spectrum as it is read from an
/// mzML document.
///
/// While this type is public, it is unnecessary for most users. Instead
/// just use [`MzMLReader::read_next`].
#[derive(Default)]
pub struct MzMLSpectrumBuilder<'a> {
    pub params: ParamList,
    pub acquisition: Acquisition,
    pub precursor: Option<Precursor>,

    pub arrays: BinaryArrayMap,
    pub current_array: DataArray,

    pub index: usize,
    pub entry_id: String,
    pub ms_level: u8,
    pub polarity: ScanPolarity,
    pub signal_continuity: SignalContinuity,
    reference_param_groups: Option<&'a HashMap<String, ParamList>>,
}

impl XMLParseBase for MzMLSpectrumBuilder<'_> {}
impl CVParamParse for MzMLSpectrumBuilder<'_> {}

impl<'a> MzMLSpectrumBuilder<'a> {
    pub fn new() -> MzMLSpectrumBuilder<'a> {
        Self::default()
    }

    /// Resolve `referenceableParamGroupRef` elements against `groups`
    pub fn with_reference_groups(groups: &'a HashMap<String, ParamList>) -> MzMLSpectrumBuilder<'a> {
        Self {
            reference_param_groups: Some(groups),
            ..Default::default()
        }
    }

    fn warning_context(&self) -> String {
        format!("spectrum entry {} ({})", self.index, self.entry_id)
    }

    fn last_scan_mut(&mut self) -> &mut ScanEvent {
        if self.acquisition.scans.is_empty() {
            self.acquisition.scans.push(ScanEvent::default());
        }
        let n = self.acquisition.scans.len();
        &mut self.acquisition.scans[n - 1]
    }

    fn scan_window_mut(&mut self) -> &mut ScanWindow {
        let event = self.last_scan_mut();
        if event.scan_windows.is_empty() {
            event.scan_windows.push(ScanWindow::default());
        }
        let n = event.scan_windows.len();
        &mut event.scan_windows[n - 1]
    }

    fn precursor_mut(&mut self) -> &mut Precursor {
        self.precursor.get_or_insert_with(Precursor::default)
    }

    fn isolation_window_mut(&mut self) -> &mut IsolationWindow {
        &mut self.precursor_mut().isolation_window
    }

    fn selected_ion_mut(&mut self) -> &mut SelectedIon {
        &mut self.precursor_mut().ion
    }

    /// Put a parameter-like instance into the spectrum's own description
    fn fill_spectrum(&mut self, param: Param) -> Result<(), MzMLParserError> {
        match param.name.as_ref() {
            "ms level" => {
                self.ms_level = param_value(&param, MzMLParserState::Spectrum)?;
            }
            "positive scan" => {
                self.polarity = ScanPolarity::Positive;
            }
            "negative scan" => {
                self.polarity = ScanPolarity::Negative;
            }
            "profile spectrum" => {
                self.signal_continuity = SignalContinuity::Profile;
            }
            "centroid spectrum" => {
                self.signal_continuity = SignalContinuity::Centroid;
            }
            // Implied by the MS level and regenerated on write
            "MS1 spectrum" | "MSn spectrum" => {}
            &_ => {
                self.params.push(param);
            }
        };
        Ok(())
    }

    /// Set the compression method for the current [`DataArray`]
    fn set_current_compression(&mut self, compression: BinaryCompressionType) {
        trace!(
            "Setting current compression method for {:?} to {compression:?}",
            self.current_array.name
        );
        self.current_array.compression = compression;
    }

    /// Put a parameter-like instance into the current [`DataArray`]
    fn fill_binary_data_array(
        &mut self,
        param: Param,
        state: MzMLParserState,
    ) -> Result<(), MzMLParserError> {
        let accession = match (param.is_ms(), param.accession) {
            (true, Some(accession)) => accession,
            _ => {
                self.current_array.add_param(param);
                return Ok(());
            }
        };
        if let Some(compression) = BinaryCompressionType::from_accession(accession) {
            self.set_current_compression(compression);
        } else if UNSUPPORTED_COMPRESSIONS.contains(&accession) {
            return Err(MzMLParserError::ArrayDecodingError(
                state,
                self.current_array.name.clone(),
                crate::spectrum::ArrayRetrievalError::DecompressionError(format!(
                    "{} is not supported",
                    param.name
                )),
            ));
        } else if let Some(dtype) = BinaryDataArrayType::from_accession(accession) {
            self.current_array.dtype = dtype;
        } else if let Some(array_type) = ArrayType::from_accession(accession) {
            let unit = param.unit();
            match array_type {
                ArrayType::NonStandardDataArray { .. } => {
                    self.current_array.name = ArrayType::nonstandard(param.value());
                    self.current_array.unit = unit;
                }
                ArrayType::TimeArray => {
                    self.current_array.name = ArrayType::TimeArray;
                    match unit {
                        Unit::Minute | Unit::Second | Unit::Millisecond => {
                            self.current_array.unit = unit
                        }
                        _ => {
                            warn!("Invalid unit {:?} found for time array", unit)
                        }
                    }
                }
                array_type => {
                    self.current_array.name = array_type;
                    self.current_array.unit = unit;
                }
            }
        } else {
            self.current_array.add_param(param);
        }
        Ok(())
    }

    /// Put a parameter-like instance into the current [`SelectedIon`]
    fn fill_selected_ion(&mut self, param: Param, state: MzMLParserState) -> ParserResult {
        match param.name.as_ref() {
            "selected ion m/z" => {
                self.selected_ion_mut().mz = param_value(&param, state)?;
            }
            "peak intensity" => {
                self.selected_ion_mut().intensity = param_value(&param, state)?;
            }
            "charge state" => {
                self.selected_ion_mut().charge = Some(param_value(&param, state)?);
            }
            &_ => {
                self.selected_ion_mut().add_param(param);
            }
        };
        Ok(state)
    }

    /// Put a parameter-like instance into the current [`IsolationWindow`]
    fn fill_isolation_window(&mut self, param: Param, state: MzMLParserState) -> ParserResult {
        let value = || param_value::<f32>(&param, state);
        match param.name.as_ref() {
            "isolation window target m/z" => {
                let target = value()?;
                let window = self.isolation_window_mut();
                window.target = target;
                window.flags = match window.flags {
                    IsolationWindowState::Offset => {
                        window.lower_bound = window.target - window.lower_bound;
                        window.upper_bound += window.target;
                        IsolationWindowState::Complete
                    }
                    _ => IsolationWindowState::Complete,
                };
            }
            "isolation window lower offset" => {
                let lower_bound = value()?;
                let window = self.isolation_window_mut();
                match window.flags {
                    IsolationWindowState::Unknown => {
                        window.flags = IsolationWindowState::Offset;
                        window.lower_bound = lower_bound;
                    }
                    IsolationWindowState::Complete => {
                        window.lower_bound = window.target - lower_bound;
                    }
                    _ => {}
                }
            }
            "isolation window upper offset" => {
                let upper_bound = value()?;
                let window = self.isolation_window_mut();
                match window.flags {
                    IsolationWindowState::Unknown => {
                        window.flags = IsolationWindowState::Offset;
                        window.upper_bound = upper_bound;
                    }
                    IsolationWindowState::Complete => {
                        window.upper_bound = window.target + upper_bound;
                    }
                    _ => {}
                }
            }
            "isolation window lower limit" => {
                let lower_bound = value()?;
                let window = self.isolation_window_mut();
                if matches!(
                    window.flags,
                    IsolationWindowState::Unknown | IsolationWindowState::Explicit
                ) {
                    window.flags = IsolationWindowState::Explicit;
                    window.lower_bound = lower_bound;
                }
            }
            "isolation window upper limit" => {
                let upper_bound = value()?;
                let window = self.isolation_window_mut();
                if matches!(
                    window.flags,
                    IsolationWindowState::Unknown | IsolationWindowState::Explicit
                ) {
                    window.flags = IsolationWindowState::Explicit;
                    window.upper_bound = upper_bound;
                }
            }
            &_ => {}
        }
        Ok(state)
    }

    /// Put a parameter-like instance into the current [`ScanWindow`]
    fn fill_scan_window(&mut self, param: Param, state: MzMLParserState) -> ParserResult {
        match param.name.as_ref() {
            "scan window lower limit" => {
                let value = param_value(&param, state)?;
                self.scan_window_mut().lower_bound = value;
            }
            "scan window upper limit" => {
                let value = param_value(&param, state)?;
                self.scan_window_mut().upper_bound = value;
            }
            &_ => {}
        }
        Ok(state)
    }

    fn fill_scan(&mut self, param: Param, state: MzMLParserState) -> ParserResult {
        match param.name.as_ref() {
            "scan start time" => {
                let value: f64 = param_value(&param, state)?;
                let value = match &param.unit {
                    Unit::Minute => value,
                    Unit::Second => value / 60.0,
                    Unit::Millisecond => value / 60000.0,
                    _ => {
                        warn!(
                            "Could not infer unit for {:?} for {}",
                            param,
                            self.warning_context()
                        );
                        value
                    }
                };
                self.last_scan_mut().start_time = value;
            }
            "ion injection time" => {
                let value = param_value(&param, state)?;
                self.last_scan_mut().injection_time = value;
            }
            _ => self.last_scan_mut().add_param(param),
        }
        Ok(state)
    }

    fn fill_activation(&mut self, param: Param, state: MzMLParserState) -> ParserResult {
        if Activation::is_param_activation(&param)
            && self.precursor_mut().activation.method().is_none()
        {
            *self.precursor_mut().activation.method_mut() = Some(param);
        } else {
            match param.name.as_ref() {
                "collision energy" | "activation energy" => {
                    let energy = param_value(&param, state)?;
                    self.precursor_mut().activation.energy = energy;
                }
                &_ => {
                    self.precursor_mut().activation.add_param(param);
                }
            }
        }
        Ok(state)
    }

    pub fn fill_param_into(&mut self, param: Param, state: MzMLParserState) -> ParserResult {
        match state {
            MzMLParserState::Spectrum => {
                self.fill_spectrum(param)?;
            }
            MzMLParserState::ScanList => self.acquisition.add_param(param),
            MzMLParserState::Scan => {
                self.fill_scan(param, state)?;
            }
            MzMLParserState::ScanWindowList => self.last_scan_mut().add_param(param),
            MzMLParserState::ScanWindow => {
                self.fill_scan_window(param, state)?;
            }
            MzMLParserState::IsolationWindow => {
                self.fill_isolation_window(param, state)?;
            }
            MzMLParserState::SelectedIon | MzMLParserState::SelectedIonList => {
                self.fill_selected_ion(param, state)?;
            }
            MzMLParserState::Activation => {
                self.fill_activation(param, state)?;
            }
            MzMLParserState::BinaryDataArray => {
                self.fill_binary_data_array(param, state)?;
            }
            MzMLParserState::Precursor | MzMLParserState::PrecursorList => {
                self.precursor_mut().add_param(param);
            }
            _ => {
                trace!("Ignoring {} in {:?}", param.name, state);
            }
        };
        Ok(state)
    }

    /// Assemble the accumulated attributes into a [`Spectrum`], checking that its
    /// arrays are consistent
    pub fn into_spectrum(self) -> Result<Spectrum, MzMLParserError> {
        let description = SpectrumDescription {
            id: self.entry_id,
            index: self.index,
            ms_level: self.ms_level,
            polarity: self.polarity,
            signal_continuity: self.signal_continuity,
            params: self.params,
            acquisition: self.acquisition,
            precursor: self.precursor,
        };
        let id = description.id.clone();
        Spectrum::new(description, self.arrays)
            .map_err(|e| MzMLParserError::SpectrumConversion(id, e))
    }
}

impl MzMLSAX for MzMLSpectrumBuilder<'_> {
    fn start_element(&mut self, event: &BytesStart, state: MzMLParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"spectrum" => {
                let mut has_id = false;
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => match attr.key.as_ref() {
                            b"id" => {
                                self.entry_id = self.attribute_text(&attr, state)?;
                                has_id = true;
                                trace!("Stored spectrum id = {}", self.entry_id);
                            }
                            b"index" => {
                                self.index = self.attribute_parse(&attr, state)?;
                                trace!("Stored spectrum index = {}", self.index);
                            }
                            _ => {}
                        },
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                if !has_id {
                    return Err(MzMLParserError::MissingAttribute {
                        element: "spectrum",
                        attribute: "id",
                    });
                }
                return Ok(MzMLParserState::Spectrum);
            }
            b"spectrumList" => {
                return Ok(MzMLParserState::SpectrumList);
            }
            b"scanList" => {
                return Ok(MzMLParserState::ScanList);
            }
            b"scan" => {
                self.acquisition.scans.push(ScanEvent::default());
                return Ok(MzMLParserState::Scan);
            }
            b"scanWindow" => {
                self.last_scan_mut().scan_windows.push(ScanWindow::default());
                return Ok(MzMLParserState::ScanWindow);
            }
            b"scanWindowList" => {
                return Ok(MzMLParserState::ScanWindowList);
            }
            b"precursorList" => {
                return Ok(MzMLParserState::PrecursorList);
            }
            b"precursor" => {
                if self.precursor.is_some() {
                    warn!(
                        "Only the first precursor is kept for {}",
                        self.warning_context()
                    );
                }
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => {
                            if attr.key.as_ref() == b"spectrumRef" {
                                let precursor_id = self.attribute_text(&attr, state)?;
                                self.precursor_mut().precursor_id = Some(precursor_id);
                            }
                        }
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
                self.precursor_mut();
                return Ok(MzMLParserState::Precursor);
            }
            b"isolationWindow" => {
                return Ok(MzMLParserState::IsolationWindow);
            }
            b"selectedIonList" => {
                return Ok(MzMLParserState::SelectedIonList);
            }
            b"selectedIon" => {
                return Ok(MzMLParserState::SelectedIon);
            }
            b"activation" => {
                return Ok(MzMLParserState::Activation);
            }
            b"binaryDataArrayList" => {
                return Ok(MzMLParserState::BinaryDataArrayList);
            }
            b"binaryDataArray" => {
                return Ok(MzMLParserState::BinaryDataArray);
            }
            b"binary" => {
                return Ok(MzMLParserState::Binary);
            }
            _ => {}
        };
        Ok(state)
    }

    fn empty_element(
        &mut self,
        event: &BytesStart,
        state: MzMLParserState,
        reader_position: usize,
    ) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"cvParam" | b"userParam" => {
                let param = Self::handle_param(event, reader_position, state)?;
                return self.fill_param_into(param, state);
            }
            b"referenceableParamGroupRef" => {
                for attr_parsed in event.attributes() {
                    match attr_parsed {
                        Ok(attr) => {
                            if attr.key.as_ref() == b"ref" {
                                let group_id = self.attribute_text(&attr, state)?;
                                let group = self
                                    .reference_param_groups
                                    .and_then(|groups| groups.get(&group_id));
                                match group {
                                    Some(params) => {
                                        for param in params.iter() {
                                            self.fill_param_into(param.clone(), state)?;
                                        }
                                    }
                                    None => {
                                        return Err(MzMLParserError::UnknownReferenceGroup(
                                            group_id,
                                        ))
                                    }
                                }
                            }
                        }
                        Err(msg) => {
                            return Err(self.handle_xml_error(msg.into(), state));
                        }
                    }
                }
            }
            // A `<binary/>` holds no data points
            b"binary" => {}
            &_ => {}
        }
        Ok(state)
    }

    fn end_element(&mut self, event: &BytesEnd, state: MzMLParserState) -> ParserResult {
        let elt_name = event.name();
        match elt_name.as_ref() {
            b"spectrum" => return Ok(MzMLParserState::SpectrumDone),
            b"scanList" => return Ok(MzMLParserState::Spectrum),
            b"scan" => return Ok(MzMLParserState::ScanList),
            b"scanWindow" => return Ok(MzMLParserState::ScanWindowList),
            b"scanWindowList" => return Ok(MzMLParserState::Scan),
            b"precursorList" => return Ok(MzMLParserState::Spectrum),
            b"precursor" => return Ok(MzMLParserState::PrecursorList),
            b"isolationWindow" => return Ok(MzMLParserState::Precursor),
            b"selectedIonList" => return Ok(MzMLParserState::Precursor),
            b"selectedIon" => return Ok(MzMLParserState::SelectedIonList),
            b"activation" => return Ok(MzMLParserState::Precursor),
            b"binaryDataArrayList" => {
                return Ok(MzMLParserState::Spectrum);
            }
            b"binaryDataArray" => {
                let mut array = mem::take(&mut self.current_array);
                array.decode_and_store().map_err(|e| {
                    let new_err =
                        MzMLParserError::ArrayDecodingError(state, array.name.clone(), e);
                    log::error!("Failed to decode mzML array: {new_err}");
                    new_err
                })?;
                self.arrays.add(array);
                return Ok(MzMLParserState::BinaryDataArrayList);
            }
            b"binary" => return Ok(MzMLParserState::BinaryDataArray),
            b"spectrumList" => return Ok(MzMLParserState::SpectrumListDone),
            _ => {}
        };
        Ok(state)
    }

    fn text(&mut self, event: &BytesText, state: MzMLParserState) -> ParserResult {
        if state == MzMLParserState::Binary {
            let bin = event
                .unescape()
                .map_err(|e| MzMLParserError::XMLError(state, e))?;
            self.current_array.data = Bytes::from(bin.as_bytes());
        }
        Ok(state)
    }
}

/**
A streaming mzML parser. The metadata sections of the document are read when the
reader is created, then each call to [`MzMLReader::read_next`] (or each step of the
[`Iterator`]) parses one more `<spectrum>`.

Both plain `<mzML>` documents and `<indexedmzML>` wrapped ones are accepted. Once
the spectrum list is exhausted the remainder of the document is read, and for an
indexed document its offset index and checksum are available through
[`MzMLReader::spectrum_index`] and [`MzMLReader::file_checksum`].
*/
pub struct MzMLReader<R: Read> {
    /// The state the parser was in last.
    pub state: MzMLParserState,
    /// The raw reader
    handle: BufReader<R>,
    /// A place to store the last error the parser encountered
    error: Option<Box<MzMLParserError>>,
    /// A spectrum ID to byte offset map read from the document's index
    spectrum_index: OffsetIndex,
    /// The description of the file's contents and the previous data files that were
    /// consumed to produce it.
    file_description: FileDescription,
    /// The different software components that were involved in the processing and creation of this
    /// file.
    softwares: Vec<Software>,
    /// The data processing and signal transformation operations performed on the raw data in previous
    /// source files to produce this file's contents.
    data_processings: Vec<DataProcessing>,
    /// A cache of repeated paramters
    pub reference_param_groups: HashMap<String, ParamList>,

    run_id: String,
    num_spectra: Option<usize>,
    indexed: bool,
    trailer: IndexedMzMLIndexExtractor,

    buffer: Bytes,
}

impl<R: Read> MzMLReader<R> {
    /// Create a new [`MzMLReader`] instance, wrapping the [`io::Read`] handle
    /// provided with an [`io::BufReader`] and parses the metadata section of the file.
    pub fn new(file: R) -> Result<MzMLReader<R>, MzMLParserError> {
        Self::with_buffer_capacity(file, BUFFER_SIZE)
    }

    pub fn with_buffer_capacity(
        file: R,
        capacity: usize,
    ) -> Result<MzMLReader<R>, MzMLParserError> {
        let handle = BufReader::with_capacity(capacity, file);
        let mut inst = MzMLReader {
            handle,
            state: MzMLParserState::Start,
            error: None,
            buffer: Bytes::new(),
            spectrum_index: OffsetIndex::new("spectrum"),
            file_description: FileDescription::default(),
            softwares: Vec::new(),
            data_processings: Vec::new(),
            reference_param_groups: HashMap::new(),
            run_id: String::new(),
            num_spectra: None,
            indexed: false,
            trailer: IndexedMzMLIndexExtractor::new(),
        };
        inst.parse_metadata()?;
        Ok(inst)
    }

    /**Parse the metadata section of the file using [`FileMetadataBuilder`]
     */
    fn parse_metadata(&mut self) -> Result<(), MzMLParserError> {
        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);
        reader.check_end_names(false);
        let mut accumulator = FileMetadataBuilder::default();
        let mut seen_root = false;
        loop {
            let position = reader.buffer_position();
            let result = match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => {
                    if !seen_root {
                        let name = e.name();
                        if !matches!(name.as_ref(), b"mzML" | b"indexedmzML") {
                            return Err(MzMLParserError::NotMzML(
                                String::from_utf8_lossy(name.as_ref()).to_string(),
                            ));
                        }
                        seen_root = true;
                    }
                    accumulator.start_element(e, self.state)
                }
                Ok(Event::End(ref e)) => accumulator.end_element(e, self.state),
                Ok(Event::Text(ref e)) => accumulator.text(e, self.state),
                Ok(Event::Empty(ref e)) => accumulator.empty_element(e, self.state, position),
                Ok(Event::Eof) => {
                    if accumulator.closed_mzml {
                        self.state = MzMLParserState::EOF;
                        break;
                    }
                    return Err(MzMLParserError::IncompleteElementError(
                        "mzML".to_string(),
                        self.state,
                    ));
                }
                Err(err) => Err(MzMLParserError::from_xml(self.state, err)),
                _ => Ok(self.state),
            };
            self.buffer.clear();
            self.state = result?;
            if matches!(
                self.state,
                MzMLParserState::SpectrumList | MzMLParserState::SpectrumListDone
            ) {
                break;
            }
        }
        self.file_description = accumulator.file_description;
        self.softwares = accumulator.softwares;
        self.data_processings = accumulator.data_processings;
        self.reference_param_groups = accumulator.reference_param_groups;
        self.run_id = accumulator.run_id.unwrap_or_default();
        self.num_spectra = accumulator.num_spectra;
        self.indexed = accumulator.indexed;
        if !accumulator.saw_mzml {
            return Err(MzMLParserError::IncompleteElementError(
                "mzML".to_string(),
                self.state,
            ));
        }
        trace!(
            "Finished reading metadata for run {:?} in state {}",
            self.run_id,
            self.state
        );
        Ok(())
    }

    fn _parse_into(&mut self) -> Result<Spectrum, MzMLParserError> {
        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);
        reader.check_end_names(false);
        let mut accumulator = MzMLSpectrumBuilder::with_reference_groups(&self.reference_param_groups);

        macro_rules! err_state {
            ($message:ident) => {{
                self.state = MzMLParserState::ParserError;
                self.error = Some(Box::new($message));
            }};
        }

        loop {
            let position = reader.buffer_position();
            match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => {
                    if log::log_enabled!(log::Level::Trace) {
                        trace!(
                            "Starting mzML element: {}",
                            String::from_utf8_lossy(e.name().as_ref())
                        );
                    }
                    match accumulator.start_element(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::End(ref e)) => {
                    match accumulator.end_element(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::Text(ref e)) => {
                    match accumulator.text(e, self.state) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    };
                }
                Ok(Event::Empty(ref e)) => {
                    match accumulator.empty_element(e, self.state, position) {
                        Ok(state) => {
                            self.state = state;
                        }
                        Err(message) => err_state!(message),
                    }
                }
                Ok(Event::Eof) => {
                    trace!("Reached EOF");
                    let message = MzMLParserError::IncompleteElementError(
                        "spectrumList".to_string(),
                        self.state,
                    );
                    err_state!(message);
                }
                Err(err) => {
                    let message = MzMLParserError::from_xml(self.state, err);
                    err_state!(message);
                }
                _ => {}
            };
            self.buffer.clear();
            match self.state {
                MzMLParserState::SpectrumDone
                | MzMLParserState::SpectrumListDone
                | MzMLParserState::ParserError => {
                    break;
                }
                _ => {}
            };
        }
        match self.state {
            MzMLParserState::SpectrumDone => accumulator.into_spectrum(),
            MzMLParserState::SpectrumListDone => Err(MzMLParserError::EOF),
            _ => Err(self
                .error
                .take()
                .map(|e| *e)
                .unwrap_or(MzMLParserError::UnknownError(self.state))),
        }
    }

    /// Read everything after the spectrum list, collecting the offset index and checksum
    /// of an indexed document and checking that the document is complete.
    fn parse_trailer(&mut self) -> Result<(), MzMLParserError> {
        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);
        reader.check_end_names(false);
        self.state = MzMLParserState::Trailer;
        loop {
            let result = match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => self.trailer.start_element(e),
                Ok(Event::End(ref e)) => self.trailer.end_element(e),
                Ok(Event::Text(ref e)) => self.trailer.text(e),
                Ok(Event::Eof) => break,
                Err(err) => Err(MzMLParserError::from_xml(self.state, err)),
                _ => Ok(()),
            };
            self.buffer.clear();
            result?;
        }
        self.buffer.clear();
        let complete = if self.indexed {
            self.trailer.closed_indexed_mzml
        } else {
            self.trailer.closed_mzml
        };
        if !complete {
            let root = if self.indexed { "indexedmzML" } else { "mzML" };
            return Err(MzMLParserError::IncompleteElementError(
                root.to_string(),
                self.state,
            ));
        }
        if self.trailer.spectrum_index.init {
            self.spectrum_index = mem::take(&mut self.trailer.spectrum_index);
        }
        self.state = MzMLParserState::EOF;
        Ok(())
    }

    /// Parse the next spectrum from the stream.
    ///
    /// When the spectrum list is exhausted the rest of the document is read and
    /// [`MzMLParserError::EOF`] is returned.
    pub fn read_spectrum(&mut self) -> Result<Spectrum, MzMLParserError> {
        match self.state {
            MzMLParserState::EOF => return Err(MzMLParserError::EOF),
            MzMLParserState::ParserError => {
                return Err(MzMLParserError::UnknownError(self.state));
            }
            MzMLParserState::SpectrumDone => {
                self.state = MzMLParserState::Resume;
            }
            _ => {}
        }
        let result = if self.state == MzMLParserState::SpectrumListDone {
            Err(MzMLParserError::EOF)
        } else {
            self._parse_into()
        };
        match result {
            Ok(spectrum) => Ok(spectrum),
            Err(MzMLParserError::EOF) => {
                if let Err(err) = self.parse_trailer() {
                    self.state = MzMLParserState::ParserError;
                    return Err(err);
                }
                Err(MzMLParserError::EOF)
            }
            Err(err) => {
                log::error!("Error while reading mzML spectrum: {err}");
                self.state = MzMLParserState::ParserError;
                Err(err)
            }
        }
    }

    /// Read the next spectrum directly. Used to implement iteration.
    ///
    /// A parsing failure ends iteration; the error is kept and can be retrieved
    /// with [`MzMLReader::take_error`].
    pub fn read_next(&mut self) -> Option<Spectrum> {
        match self.read_spectrum() {
            Ok(spectrum) => Some(spectrum),
            Err(MzMLParserError::EOF) => None,
            Err(err) => {
                trace!("Failed to read next spectrum: {err}");
                if self.error.is_none() {
                    self.error = Some(Box::new(err));
                }
                None
            }
        }
    }

    /// Take the error that stopped iteration, if there was one
    pub fn take_error(&mut self) -> Option<MzMLParserError> {
        self.error.take().map(|e| *e)
    }

    /// Read all remaining spectra into a [`SpectrumCollection`] carrying this
    /// document's metadata. Any failure discards everything read so far.
    pub fn read_all(&mut self) -> Result<SpectrumCollection, MzMLParserError> {
        let mut collection = SpectrumCollection::new(self.run_id.clone());
        collection.file_description = self.file_description.clone();
        collection.softwares = self.softwares.clone();
        collection.data_processings = self.data_processings.clone();
        if let Some(n) = self.num_spectra {
            collection.spectra.reserve(n);
        }
        loop {
            match self.read_spectrum() {
                Ok(spectrum) => collection.push(spectrum),
                Err(MzMLParserError::EOF) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(collection)
    }

    pub fn file_description(&self) -> &FileDescription {
        &self.file_description
    }

    pub fn softwares(&self) -> &[Software] {
        &self.softwares
    }

    pub fn data_processings(&self) -> &[DataProcessing] {
        &self.data_processings
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The `count` attribute of the spectrum list, if given
    pub fn num_spectra(&self) -> Option<usize> {
        self.num_spectra
    }

    /// Whether the document is wrapped in `<indexedmzML>`
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// The spectrum offset index from the end of an indexedmzML document. Empty
    /// until the spectrum list has been read through.
    pub fn spectrum_index(&self) -> &OffsetIndex {
        &self.spectrum_index
    }

    /// The `<fileChecksum>` of an indexedmzML document, once it has been read through
    pub fn file_checksum(&self) -> Option<&str> {
        self.trailer.file_checksum.as_deref()
    }

    /// The `<indexListOffset>` of an indexedmzML document, once it has been read through
    pub fn index_list_offset(&self) -> Option<u64> {
        self.trailer.index_list_offset
    }
}

impl MzMLReader<fs::File> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<MzMLReader<fs::File>, MzMLParserError> {
        let handle = fs::File::open(path.as_ref())
            .map_err(|e| MzMLParserError::IOError(MzMLParserState::Start, e))?;
        Self::new(handle)
    }
}

impl<R: Read> Iterator for MzMLReader<R> {
    type Item = Spectrum;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next()
    }
}

/// Read a whole mzML or indexedmzML file into memory.
///
/// The load is all-or-nothing: a missing file, malformed markup, an undecodable array
/// or a truncated document is an error and no partial collection is returned.
pub fn read_mzml<P: AsRef<Path>>(path: P) -> Result<SpectrumCollection, MzMLParserError> {
    let mut reader = MzMLReader::open_path(path)?;
    reader.read_all()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::{ByteArrayView, SpectrumLike};
    use sha1::{Digest, Sha1};
    use std::io::Cursor;
    use std::path;

    const SMALL: &str = "./test/data/small.mzML";

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">
  <referenceableParamGroupList count="1">
    <referenceableParamGroup id="CommonMS1">
      <cvParam cvRef="MS" accession="MS:1000579" name="MS1 spectrum" value=""/>
      <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="1"/>
    </referenceableParamGroup>
  </referenceableParamGroupList>
  <run id="minimal_run">
    <spectrumList count="1">
      <spectrum index="0" id="scan=7" defaultArrayLength="0">
        <referenceableParamGroupRef ref="GROUP_REF"/>
        <cvParam cvRef="MS" accession="MS:1000128" name="profile spectrum" value=""/>
        <scanList count="1">
          <scan>
            <cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="90" unitCvRef="UO" unitAccession="UO:0000010" unitName="second"/>
          </scan>
        </scanList>
        <binaryDataArrayList count="0">
        </binaryDataArrayList>
      </spectrum>
    </spectrumList>
  </run>
</mzML>
"#;

    fn minimal(group_ref: &str) -> String {
        MINIMAL.replace("GROUP_REF", group_ref)
    }

    #[test_log::test]
    fn test_plain_mzml() -> Result<(), MzMLParserError> {
        let doc = minimal("CommonMS1");
        let mut reader = MzMLReader::new(Cursor::new(doc.as_bytes()))?;
        assert_eq!(reader.run_id(), "minimal_run");
        assert!(!reader.is_indexed());
        assert_eq!(reader.num_spectra(), Some(1));
        let spectra = reader.read_all()?;
        assert_eq!(spectra.len(), 1);
        let spec = &spectra[0];
        assert_eq!(spec.id(), "scan=7");
        assert_eq!(spec.ms_level(), 1);
        assert_eq!(spec.signal_continuity(), SignalContinuity::Profile);
        assert!((spec.start_time() - 1.5).abs() < 1e-9);
        assert!(spec.is_empty());
        assert!(reader.spectrum_index().is_empty());
        assert!(reader.file_checksum().is_none());
        Ok(())
    }

    #[test_log::test]
    fn test_unknown_reference_group() {
        let doc = minimal("NoSuchGroup");
        let mut reader = MzMLReader::new(Cursor::new(doc.as_bytes())).unwrap();
        let err = reader.read_all().unwrap_err();
        assert!(matches!(err, MzMLParserError::UnknownReferenceGroup(ref g) if g == "NoSuchGroup"));
        assert!(reader.read_next().is_none());
    }

    #[test_log::test]
    fn test_not_mzml() {
        let err = MzMLReader::new(Cursor::new(b"<html><body/></html>".as_slice())).err();
        assert!(matches!(err, Some(MzMLParserError::NotMzML(ref name)) if name == "html"));

        let err = MzMLReader::new(Cursor::new(b"".as_slice())).err();
        assert!(matches!(err, Some(MzMLParserError::IncompleteElementError(..))));
    }

    #[test_log::test]
    fn test_malformed_value() {
        let doc = minimal("CommonMS1").replace(r#"value="90""#, r#"value="ninety""#);
        let mut reader = MzMLReader::new(Cursor::new(doc.as_bytes())).unwrap();
        let err = reader.read_all().unwrap_err();
        assert!(matches!(err, MzMLParserError::InvalidAttribute { ref name, .. } if name == "scan start time"));
    }

    #[test_log::test]
    fn test_read_metadata() -> Result<(), MzMLParserError> {
        let reader = MzMLReader::open_path(path::Path::new(SMALL))?;
        assert!(reader.is_indexed());
        assert_eq!(reader.run_id(), "small_run");
        assert_eq!(reader.num_spectra(), Some(4));

        let fd = reader.file_description();
        assert_eq!(fd.contents.len(), 2);
        assert_eq!(fd.source_files.len(), 1);
        let sf = &fd.source_files[0];
        assert_eq!(sf.name, "small.RAW");
        assert_eq!(
            sf.file_format.as_ref().map(|p| p.name.as_str()),
            Some("Thermo RAW format")
        );
        assert_eq!(
            sf.id_format.as_ref().map(|p| p.name.as_str()),
            Some("Thermo nativeID format")
        );

        assert_eq!(reader.softwares().len(), 1);
        assert_eq!(reader.softwares()[0].id, "Xcalibur");
        assert_eq!(reader.data_processings().len(), 1);
        assert_eq!(reader.data_processings()[0].methods.len(), 1);
        Ok(())
    }

    #[test_log::test]
    fn test_read_spectra() -> Result<(), MzMLParserError> {
        let mut reader = MzMLReader::open_path(path::Path::new(SMALL))?;
        let spectra: Vec<Spectrum> = reader.by_ref().collect();
        assert!(reader.take_error().is_none());
        assert_eq!(spectra.len(), 4);

        let ms1 = &spectra[0];
        assert_eq!(ms1.id(), "controllerType=0 controllerNumber=1 scan=1");
        assert_eq!(ms1.ms_level(), 1);
        assert_eq!(ms1.polarity(), ScanPolarity::Positive);
        assert_eq!(ms1.signal_continuity(), SignalContinuity::Profile);
        assert!(ms1.get_param_by_name("base peak m/z").is_some());
        assert!(ms1.get_param_by_name("MS1 spectrum").is_none());
        assert!((ms1.start_time() - 0.5).abs() < 1e-9);
        let scan = ms1.acquisition().first_scan().unwrap();
        assert!((scan.injection_time - 12.5).abs() < 1e-6);
        assert_eq!(scan.scan_windows, vec![ScanWindow::new(200.0, 2000.0)]);
        let n = ms1.mzs().unwrap().len();
        assert!(n > 100);
        assert_eq!(ms1.intensities().unwrap().len(), n);

        // the second MS1 is stored uncompressed and its time is given in seconds
        assert!((spectra[2].start_time() - 1.0).abs() < 1e-9);
        assert_eq!(spectra[2].mzs().unwrap().len(), n);

        let ms2 = &spectra[1];
        assert_eq!(ms2.ms_level(), 2);
        assert_eq!(ms2.signal_continuity(), SignalContinuity::Centroid);
        let precursor = ms2.precursor().unwrap();
        assert_eq!(
            precursor.precursor_id.as_deref(),
            Some("controllerType=0 controllerNumber=1 scan=1")
        );
        assert!((precursor.ion.mz - 509.751).abs() < 1e-6);
        assert_eq!(precursor.ion.charge, Some(2));
        assert!((precursor.isolation_window.lower_bound - 508.751).abs() < 1e-3);
        assert!((precursor.isolation_window.upper_bound - 510.751).abs() < 1e-3);
        assert_eq!(
            precursor.activation.method().map(|p| p.name.as_str()),
            Some("beam-type collision-induced dissociation")
        );
        assert!((precursor.activation.energy - 30.0).abs() < 1e-6);
        assert_eq!(ms2.mzs().unwrap().len(), 5);

        let charges = ms2
            .arrays
            .get(&ArrayType::ChargeArray)
            .unwrap()
            .to_i32()
            .unwrap();
        assert_eq!(charges.as_ref(), &[1, 1, 2, 1, 1]);
        Ok(())
    }

    #[test_log::test]
    fn test_index_and_checksum() -> Result<(), MzMLParserError> {
        let raw = fs::read(SMALL).map_err(|e| MzMLParserError::IOError(MzMLParserState::Start, e))?;
        let mut reader = MzMLReader::new(Cursor::new(raw.as_slice()))?;
        assert!(reader.spectrum_index().is_empty());
        let ids: Vec<String> = reader.by_ref().map(|s| s.id().to_string()).collect();

        let index = reader.spectrum_index();
        assert_eq!(index.len(), ids.len());
        for (id, (key, offset)) in ids.iter().zip(index.iter()) {
            assert_eq!(id.as_str(), key.as_ref());
            assert!(raw[*offset as usize..].starts_with(b"<spectrum "));
        }

        let offset = reader.index_list_offset().unwrap() as usize;
        assert!(raw[offset..].starts_with(b"<indexList "));

        let checksum = reader.file_checksum().unwrap();
        let marker = b"<fileChecksum>";
        let end = raw
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        let expected = base16ct::lower::encode_string(&Sha1::digest(&raw[..end]));
        assert_eq!(checksum, expected);
        Ok(())
    }

    #[test_log::test]
    fn test_truncated_document() {
        let raw = fs::read(SMALL).unwrap();
        for cut in [raw.len() / 3, raw.len() / 2, raw.len() - 40] {
            let result = MzMLReader::new(Cursor::new(&raw[..cut])).and_then(|mut r| r.read_all());
            assert!(result.is_err(), "truncated at {cut} of {} loaded", raw.len());
        }
    }

    #[test_log::test]
    fn test_missing_file() {
        let err = read_mzml("./test/data/does_not_exist.mzML").unwrap_err();
        assert!(matches!(err, MzMLParserError::IOError(_, ref e) if e.kind() == io::ErrorKind::NotFound));
        let err: io::Error = err.into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test_log::test]
    fn test_read_mzml() -> Result<(), MzMLParserError> {
        let collection = read_mzml(SMALL)?;
        assert_eq!(collection.len(), 4);
        assert_eq!(collection.run_id, "small_run");
        assert_eq!(collection.softwares.len(), 1);
        let levels: Vec<u8> = collection.iter().map(|s| s.ms_level()).collect();
        assert_eq!(levels, [1, 2, 1, 2]);
        assert!(collection
            .get_spectrum_by_id("controllerType=0 controllerNumber=1 scan=4")
            .is_some());
        Ok(())
    }
}
