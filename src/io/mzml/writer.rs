use std::fmt::Debug;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{debug, trace};

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::Error as XMLError;
use quick_xml::Writer;
use thiserror::Error;

use crate::io::offset_index::OffsetIndex;
use crate::io::utils::Sha1HashingStream;
use crate::meta::{DataProcessing, FileDescription, ProcessingMethod, Software};
use crate::params::{ControlledVocabulary, Param, ParamDescribed, ParamLike, Unit};
use crate::spectrum::scan_properties::*;
use crate::spectrum::{
    ArrayRetrievalError, ArrayType, BinaryArrayMap, BinaryCompressionType, DataArray, Spectrum,
    SpectrumCollection, SpectrumLike,
};

const BUFFER_SIZE: usize = 10000;

/// The identifier of the single instrument configuration every scan refers to
const INSTRUMENT_CONFIGURATION_ID: &str = "IC1";

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::from_content($e, $e.len())
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let value: &str = $value.as_ref();
        $elt.push_attribute(($name, value));
    };
}

macro_rules! start_event {
    ($writer:ident, $target:ident) => {
        $writer
            .handle
            .write_event(Event::Start($target.borrow()))?;
    };
}

macro_rules! end_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::End($target.to_end()))?;
    };
}

/// The ways writing an mzML document can fail
#[derive(Debug, Error)]
pub enum MzMLWriterError {
    #[error("An XML error occurred: {0}")]
    XMLError(
        #[from]
        #[source]
        XMLError,
    ),
    #[error("Attempted to transition from {from_state:?} to {to_state:?}")]
    StateTransitionError {
        from_state: MzMLWriterState,
        to_state: MzMLWriterState,
    },
    #[error("An IO error occurred: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
    #[error("Attempted to perform an invalid action {0:?}")]
    InvalidActionError(MzMLWriterState),
    #[error("An error occurred while encoding a data array: {0}")]
    ArrayEncodingError(
        #[from]
        #[source]
        ArrayRetrievalError,
    ),
}

impl From<MzMLWriterError> for io::Error {
    fn from(value: MzMLWriterError) -> Self {
        match value {
            MzMLWriterError::IOError(e) => e,
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

pub type WriterResult = Result<(), MzMLWriterError>;

/// The XML event writer over the checksumming byte stream
struct InnerXMLWriter<W: io::Write> {
    pub handle: Writer<Sha1HashingStream<BufWriter<W>>>,
}

impl<W: Write> Debug for InnerXMLWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerXMLWriter")
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}

impl<W: io::Write> InnerXMLWriter<W> {
    const INDENT_SIZE: u64 = 2;

    pub fn new(file: W) -> InnerXMLWriter<W> {
        let handle = Sha1HashingStream::new(BufWriter::with_capacity(BUFFER_SIZE, file));
        Self {
            handle: Writer::new_with_indent(handle, b' ', Self::INDENT_SIZE as usize),
        }
    }

    pub fn digest(&self) -> String {
        self.handle.get_ref().compute()
    }

    pub fn bytes_written(&self) -> u64 {
        self.handle.get_ref().bytes_written()
    }

    /// The offset an element opened at `depth` will start at, after the line break
    /// and indentation the writer puts before it
    pub fn next_element_offset(&self, depth: u64) -> u64 {
        self.bytes_written() + 1 + depth * Self::INDENT_SIZE
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.handle.get_mut().flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.handle
            .into_inner()
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())
    }

    pub fn write_param<P: ParamLike + Debug>(&mut self, param: &P) -> WriterResult {
        let mut elt = match param.curie() {
            Some(accession) => {
                let mut elt = bstart!("cvParam");
                if let Some(cv) = param.controlled_vocabulary().and_then(|cv| cv.prefix()) {
                    attrib!("cvRef", cv, elt);
                }
                attrib!("accession", accession, elt);
                elt
            }
            None => bstart!("userParam"),
        };

        attrib!("name", param.name(), elt);
        if !param.value().is_empty() {
            attrib!("value", param.value(), elt);
        }
        match param.unit() {
            Unit::Unknown => {}
            unit => {
                let (unit_acc, unit_name) = unit.for_param();
                let prefix = unit_acc.split(':').next().unwrap_or("UO");
                attrib!("unitCvRef", prefix, elt);
                attrib!("unitAccession", unit_acc, elt);
                attrib!("unitName", unit_name, elt);
            }
        }
        self.handle.write_event(Event::Empty(elt))?;
        Ok(())
    }

    pub fn write_param_list<'a, T: Iterator<Item = &'a Param>>(
        &mut self,
        params: T,
    ) -> WriterResult {
        for param in params {
            self.write_param(param)?
        }
        Ok(())
    }

    pub fn write_text(&mut self, content: &str) -> WriterResult {
        self.handle.write_event(Event::Text(BytesText::new(content)))?;
        Ok(())
    }

    pub fn write_event(&mut self, event: Event) -> WriterResult {
        self.handle.write_event(event)?;
        Ok(())
    }
}

/**
The different states that [`MzMLWriter`] can enter while
writing an mzML document. This is only necessary for the module
consumer when determining where something may have gone wrong.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub enum MzMLWriterState {
    Start,
    DocumentOpen,
    Header,
    Run,
    SpectrumList,
    SpectrumListClosed,
    RunClosed,
    MzMLClosed,
    IndexList,
    IndexListClosed,
    End,
}

/**
An indexed mzML writer that handles [`Spectrum`] by reference.

Does not buffer spectra in-memory, writing them out immediately. The metadata
fields must be filled in (see [`MzMLWriter::copy_metadata_from`]) and
[`MzMLWriter::spectrum_count`] set before the first spectrum is written, since
both are written out ahead of it.

Each `<spectrum>`'s byte offset is recorded as it is written, and [`MzMLWriter::close`]
appends the offset index and a SHA-1 checksum of the document.
*/
#[derive(Debug)]
pub struct MzMLWriter<W: Write> {
    /// The total number of spectra this mzML document will contain.
    /// This value will appear in the `spectrumList` element's count attribute
    pub spectrum_count: u64,
    /// The number of `spectrum` elements written so far.
    pub spectrum_counter: u64,

    /// The compression type to use when generating binary data arrays.
    pub data_array_compression: BinaryCompressionType,

    /// The `id` attribute of the `<run>` element
    pub run_id: String,
    /// The file-level metadata describing the provenance of the original data
    pub file_description: FileDescription,
    /// The list of software components that were used to process the data into
    /// its current state
    pub softwares: Vec<Software>,
    /// The types of data transformations applied to (parts of) the data
    pub data_processings: Vec<DataProcessing>,

    pub state: MzMLWriterState,
    pub offset_index: OffsetIndex,

    handle: InnerXMLWriter<W>,
    ms_cv: ControlledVocabulary,
}

impl MzMLWriter<fs::File> {
    /// Create a new file at `path` and wrap it
    pub fn create_path<P: AsRef<Path>>(path: P) -> io::Result<MzMLWriter<fs::File>> {
        let handle = fs::File::create(path)?;
        Ok(Self::new(handle))
    }
}

impl<W: Write> MzMLWriter<W> {
    const PSIMS_VERSION: &'static str = "4.1.57";
    const UNIT_VERSION: &'static str = "releases/2020-03-10";

    /// Wrap a new [`std::io::Write`]-able type, constructing a new [`MzMLWriter`]
    pub fn new(file: W) -> MzMLWriter<W> {
        Self::with_compression(file, BinaryCompressionType::Zlib)
    }

    pub fn with_compression(file: W, compression: BinaryCompressionType) -> MzMLWriter<W> {
        let handle = InnerXMLWriter::new(file);
        MzMLWriter {
            handle,
            run_id: "run".to_string(),
            file_description: FileDescription::default(),
            softwares: Vec::new(),
            data_processings: Vec::new(),
            offset_index: OffsetIndex::new("spectrum"),
            state: MzMLWriterState::Start,
            spectrum_count: 0,
            spectrum_counter: 0,
            ms_cv: ControlledVocabulary::MS,
            data_array_compression: compression,
        }
    }

    /// Take the run id and file level metadata of `source`
    pub fn copy_metadata_from(&mut self, source: &SpectrumCollection) {
        self.run_id = source.run_id.clone();
        self.file_description = source.file_description.clone();
        self.softwares = source.softwares.clone();
        self.data_processings = source.data_processings.clone();
    }

    /// Write every spectrum of `collection` along with its metadata. The document
    /// is left open, call [`MzMLWriter::close`] to finish it.
    pub fn write_collection(&mut self, collection: &SpectrumCollection) -> WriterResult {
        if self.state > MzMLWriterState::Start {
            return Err(MzMLWriterError::InvalidActionError(self.state));
        }
        self.copy_metadata_from(collection);
        self.spectrum_count = collection.len() as u64;
        for spectrum in collection.iter() {
            self.write_spectrum(spectrum)?;
        }
        Ok(())
    }

    fn transition_err(&self, to_state: MzMLWriterState) -> WriterResult {
        Err(MzMLWriterError::StateTransitionError {
            from_state: self.state,
            to_state,
        })
    }

    fn make_psi_ms_cv(&self) -> BytesStart<'static> {
        let mut cv = bstart!("cv");
        cv.push_attribute(("id", "MS"));
        cv.push_attribute(("fullName", "PSI-MS"));
        cv.push_attribute(("URI", "http://purl.obolibrary.org/obo/ms.obo"));
        cv.push_attribute(("version", Self::PSIMS_VERSION));
        cv
    }

    fn make_unit_cv(&self) -> BytesStart<'static> {
        let mut cv = bstart!("cv");
        cv.push_attribute(("id", "UO"));
        cv.push_attribute(("fullName", "UNIT-ONTOLOGY"));
        cv.push_attribute(("URI", "http://ontologies.berkeleybop.org/uo.obo"));
        cv.push_attribute(("version", Self::UNIT_VERSION));
        cv
    }

    fn write_cv_list(&mut self) -> WriterResult {
        let mut cv_list = bstart!("cvList");
        cv_list.push_attribute(("count", "2"));
        start_event!(self, cv_list);

        let cv = self.make_psi_ms_cv();
        self.handle.write_event(Event::Empty(cv))?;

        let cv = self.make_unit_cv();
        self.handle.write_event(Event::Empty(cv))?;

        end_event!(self, cv_list);
        Ok(())
    }

    fn start_document(&mut self) -> WriterResult {
        self.handle
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let mut indexed = bstart!("indexedmzML");
        indexed.push_attribute(("xmlns", "http://psi.hupo.org/ms/mzml"));
        indexed.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        indexed.push_attribute((
            "xsi:schemaLocation",
            "http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.2_idx.xsd",
        ));
        self.handle.write_event(Event::Start(indexed))?;

        let mut mzml = bstart!("mzML");
        mzml.push_attribute(("xmlns", "http://psi.hupo.org/ms/mzml"));
        mzml.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        mzml.push_attribute((
            "xsi:schemaLocation",
            "http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.0.xsd",
        ));
        mzml.push_attribute(("version", "1.1.0"));
        self.handle.write_event(Event::Start(mzml))?;

        self.state = MzMLWriterState::DocumentOpen;
        Ok(())
    }

    /// Make sure this library is listed as a software and that there is a data processing
    /// entry for the spectrum list to refer to
    fn fill_default_metadata(&mut self) {
        let software = Software::mzkit();
        if !self.softwares.iter().any(|s| s.id == software.id) {
            self.softwares.push(software.clone());
        }
        if self.data_processings.is_empty() {
            let mut dp = DataProcessing::new("mzkit_processing");
            dp.push(ProcessingMethod {
                order: 0,
                software_reference: software.id,
                params: vec![self.ms_cv.param("MS:1000544", "Conversion to mzML")],
            });
            self.data_processings.push(dp);
        }
    }

    fn write_header(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::DocumentOpen {
            self.start_document()?;
        } else {
            return self.transition_err(MzMLWriterState::Header);
        }
        self.fill_default_metadata();
        self.write_cv_list()?;
        self.write_file_description()?;
        self.write_software_list()?;
        self.write_instrument_configuration()?;
        self.write_data_processing()?;

        self.state = MzMLWriterState::Header;
        Ok(())
    }

    fn write_file_description(&mut self) -> WriterResult {
        let fd = bstart!("fileDescription");
        start_event!(self, fd);

        let fc_tag = bstart!("fileContent");
        start_event!(self, fc_tag);
        self.handle
            .write_param_list(self.file_description.contents.iter())?;
        end_event!(self, fc_tag);

        if !self.file_description.source_files.is_empty() {
            let mut outer = bstart!("sourceFileList");
            let count = self.file_description.source_files.len().to_string();
            attrib!("count", count, outer);
            start_event!(self, outer);
            for sf in self.file_description.source_files.iter() {
                let mut tag = bstart!("sourceFile");
                attrib!("id", sf.id, tag);
                attrib!("name", sf.name, tag);
                attrib!("location", sf.location, tag);
                self.handle.write_event(Event::Start(tag.borrow()))?;
                if let Some(param) = &sf.id_format {
                    self.handle.write_param(param)?;
                }
                if let Some(param) = &sf.file_format {
                    self.handle.write_param(param)?;
                }
                self.handle.write_param_list(sf.params().iter())?;
                self.handle.write_event(Event::End(tag.to_end()))?;
            }
            end_event!(self, outer);
        }

        end_event!(self, fd);
        Ok(())
    }

    fn write_software_list(&mut self) -> WriterResult {
        let mut outer = bstart!("softwareList");
        let count = self.softwares.len().to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for soft in self.softwares.iter() {
            let mut tag = bstart!("software");
            attrib!("id", soft.id, tag);
            attrib!("version", soft.version, tag);
            self.handle.write_event(Event::Start(tag.borrow()))?;
            self.handle.write_param_list(soft.params().iter())?;
            self.handle.write_event(Event::End(tag.to_end()))?;
        }
        end_event!(self, outer);
        Ok(())
    }

    /// Instrument descriptions are not carried through, so one generic configuration
    /// is written for the scans to refer to
    fn write_instrument_configuration(&mut self) -> WriterResult {
        let mut outer = bstart!("instrumentConfigurationList");
        attrib!("count", "1", outer);
        start_event!(self, outer);

        let mut tag = bstart!("instrumentConfiguration");
        attrib!("id", INSTRUMENT_CONFIGURATION_ID, tag);
        start_event!(self, tag);
        self.handle
            .write_param(&self.ms_cv.param("MS:1000031", "instrument model"))?;
        end_event!(self, tag);

        end_event!(self, outer);
        Ok(())
    }

    fn write_data_processing(&mut self) -> WriterResult {
        let mut outer = bstart!("dataProcessingList");
        let count = self.data_processings.len().to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for dp in self.data_processings.iter() {
            let mut tag = bstart!("dataProcessing");
            attrib!("id", dp.id, tag);
            self.handle.write_event(Event::Start(tag.borrow()))?;
            for proc in dp.methods.iter() {
                let mut mtag = bstart!("processingMethod");
                let order = proc.order.to_string();
                attrib!("order", order, mtag);
                attrib!("softwareRef", proc.software_reference, mtag);
                self.handle.write_event(Event::Start(mtag.borrow()))?;
                self.handle.write_param_list(proc.params().iter())?;
                self.handle.write_event(Event::End(mtag.to_end()))?;
            }
            self.handle.write_event(Event::End(tag.to_end()))?;
        }
        end_event!(self, outer);
        Ok(())
    }

    fn start_run(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::Run {
            self.write_header()?;
        } else {
            return self.transition_err(MzMLWriterState::Run);
        }
        let mut run = bstart!("run");
        attrib!("id", self.run_id, run);
        attrib!(
            "defaultInstrumentConfigurationRef",
            INSTRUMENT_CONFIGURATION_ID,
            run
        );
        if let Some(sf_ref) = self.file_description.source_files.first() {
            attrib!("defaultSourceFileRef", sf_ref.id, run);
        };
        start_event!(self, run);
        self.state = MzMLWriterState::Run;
        Ok(())
    }

    fn start_spectrum_list(&mut self) -> WriterResult {
        match self.state {
            MzMLWriterState::SpectrumList => return Ok(()),
            state if state < MzMLWriterState::Run => {
                self.start_run()?;
            }
            MzMLWriterState::Run => {}
            _ => {
                return self.transition_err(MzMLWriterState::SpectrumList);
            }
        }
        let mut list = bstart!("spectrumList");
        let count = self.spectrum_count.to_string();
        attrib!("count", count, list);
        if let Some(dp) = self.data_processings.first() {
            attrib!("defaultDataProcessingRef", dp.id, list);
        }
        start_event!(self, list);
        self.state = MzMLWriterState::SpectrumList;
        Ok(())
    }

    fn close_spectrum_list(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::SpectrumList {
            self.start_spectrum_list()?;
        }
        let tag = bstart!("spectrumList");
        end_event!(self, tag);
        self.state = MzMLWriterState::SpectrumListClosed;
        Ok(())
    }

    fn close_run(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::SpectrumListClosed {
            self.close_spectrum_list()?;
        } else if self.state > MzMLWriterState::SpectrumListClosed {
            // The run has already ended
            return self.transition_err(MzMLWriterState::RunClosed);
        }
        let tag = bstart!("run");
        end_event!(self, tag);
        self.state = MzMLWriterState::RunClosed;
        Ok(())
    }

    fn close_mzml(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::RunClosed {
            self.close_run()?;
        }
        let tag = bstart!("mzML");
        end_event!(self, tag);
        self.state = MzMLWriterState::MzMLClosed;
        Ok(())
    }

    fn close_indexed_mzml(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::MzMLClosed {
            self.close_mzml()?;
        }
        self.write_index_list()?;
        let tag = bstart!("indexedmzML");
        end_event!(self, tag);
        self.handle.write_event(Event::Text(BytesText::from_escaped("\n")))?;
        self.handle.flush()?;
        self.state = MzMLWriterState::End;
        Ok(())
    }

    /**
    Close the wrapping `<indexedmzML>` document, which will trigger writing
    out the offset indices and file checksum at the tail of the document.
    */
    pub fn close(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::End {
            if self.spectrum_counter != self.spectrum_count {
                debug!(
                    "Wrote {} spectra but the spectrum list declared {}",
                    self.spectrum_counter, self.spectrum_count
                );
            }
            self.close_indexed_mzml()
        } else {
            Ok(())
        }
    }

    /// Close the document if needed and return the wrapped stream
    pub fn into_inner(mut self) -> Result<W, MzMLWriterError> {
        self.close()?;
        Ok(self.handle.into_inner()?)
    }

    fn write_scan_list(&mut self, acq: &Acquisition) -> WriterResult {
        let mut scan_list_tag = bstart!("scanList");
        let count = acq.scans.len().to_string();
        attrib!("count", count, scan_list_tag);
        start_event!(self, scan_list_tag);
        if acq.params().is_empty() {
            self.handle
                .write_param(&self.ms_cv.param("MS:1000795", "no combination"))?;
        } else {
            self.handle.write_param_list(acq.params().iter())?;
        }

        for scan in acq.scans.iter() {
            let mut scan_tag = bstart!("scan");
            attrib!(
                "instrumentConfigurationRef",
                INSTRUMENT_CONFIGURATION_ID,
                scan_tag
            );
            start_event!(self, scan_tag);

            self.handle.write_param(
                &self
                    .ms_cv
                    .param_val("MS:1000016", "scan start time", scan.start_time)
                    .with_unit_t(&Unit::Minute),
            )?;

            if scan.injection_time != 0.0 {
                self.handle.write_param(
                    &self
                        .ms_cv
                        .param_val("MS:1000927", "ion injection time", scan.injection_time)
                        .with_unit_t(&Unit::Millisecond),
                )?;
            }

            self.handle.write_param_list(scan.params().iter())?;

            if !scan.scan_windows.is_empty() {
                let mut scan_window_list_tag = bstart!("scanWindowList");
                let scan_window_list_count = scan.scan_windows.len().to_string();
                attrib!("count", scan_window_list_count, scan_window_list_tag);
                start_event!(self, scan_window_list_tag);
                for window in scan.scan_windows.iter() {
                    let window_tag = bstart!("scanWindow");
                    start_event!(self, window_tag);
                    self.handle.write_param(
                        &self
                            .ms_cv
                            .param_val("MS:1000501", "scan window lower limit", window.lower_bound)
                            .with_unit_t(&Unit::MZ),
                    )?;
                    self.handle.write_param(
                        &self
                            .ms_cv
                            .param_val("MS:1000500", "scan window upper limit", window.upper_bound)
                            .with_unit_t(&Unit::MZ),
                    )?;
                    end_event!(self, window_tag);
                }
                end_event!(self, scan_window_list_tag);
            }
            end_event!(self, scan_tag);
        }
        end_event!(self, scan_list_tag);
        Ok(())
    }

    fn write_isolation_window(&mut self, iw: &IsolationWindow) -> WriterResult {
        let iw_tag = bstart!("isolationWindow");
        start_event!(self, iw_tag);
        self.handle.write_param(
            &self
                .ms_cv
                .param_val("MS:1000827", "isolation window target m/z", iw.target)
                .with_unit_t(&Unit::MZ),
        )?;
        self.handle.write_param(
            &self
                .ms_cv
                .param_val(
                    "MS:1000828",
                    "isolation window lower offset",
                    iw.target - iw.lower_bound,
                )
                .with_unit_t(&Unit::MZ),
        )?;
        self.handle.write_param(
            &self
                .ms_cv
                .param_val(
                    "MS:1000829",
                    "isolation window upper offset",
                    iw.upper_bound - iw.target,
                )
                .with_unit_t(&Unit::MZ),
        )?;
        end_event!(self, iw_tag);
        Ok(())
    }

    fn write_selected_ions(&mut self, precursor: &Precursor) -> WriterResult {
        let mut outer = bstart!("selectedIonList");
        attrib!("count", "1", outer);
        start_event!(self, outer);
        let tag = bstart!("selectedIon");
        start_event!(self, tag);

        let ion = &precursor.ion;
        self.handle.write_param(
            &self
                .ms_cv
                .param_val("MS:1000744", "selected ion m/z", ion.mz)
                .with_unit_t(&Unit::MZ),
        )?;
        self.handle.write_param(
            &self
                .ms_cv
                .param_val("MS:1000042", "peak intensity", ion.intensity)
                .with_unit_t(&Unit::DetectorCounts),
        )?;
        if let Some(charge) = &ion.charge {
            self.handle
                .write_param(&self.ms_cv.param_val("MS:1000041", "charge state", charge))?;
        }
        self.handle.write_param_list(ion.params().iter())?;
        end_event!(self, tag);
        end_event!(self, outer);
        Ok(())
    }

    fn write_activation(&mut self, precursor: &Precursor) -> WriterResult {
        let act = &precursor.activation;
        let tag = bstart!("activation");
        start_event!(self, tag);
        if let Some(method) = act.method() {
            self.handle.write_param(method)?;
        }
        self.handle.write_param_list(act.params().iter())?;
        self.handle.write_param(
            &self
                .ms_cv
                .param_val("MS:1000045", "collision energy", act.energy)
                .with_unit_t(&Unit::Electronvolt),
        )?;
        end_event!(self, tag);
        Ok(())
    }

    fn write_precursor(&mut self, precursor: &Precursor) -> WriterResult {
        let mut precursor_list_tag = bstart!("precursorList");
        attrib!("count", "1", precursor_list_tag);
        start_event!(self, precursor_list_tag);

        let mut precursor_tag = bstart!("precursor");
        if let Some(prec_id) = &precursor.precursor_id {
            attrib!("spectrumRef", prec_id, precursor_tag);
        }
        start_event!(self, precursor_tag);

        if !precursor.isolation_window.is_empty() {
            self.write_isolation_window(&precursor.isolation_window)?;
        }
        self.write_selected_ions(precursor)?;
        self.write_activation(precursor)?;
        end_event!(self, precursor_tag);
        end_event!(self, precursor_list_tag);
        Ok(())
    }

    fn write_binary_data_array(&mut self, array: &DataArray) -> WriterResult {
        let dtype_param = array.dtype.as_param().ok_or_else(|| {
            ArrayRetrievalError::DecompressionError(format!(
                "Cannot write {} array with an unknown data type",
                array.name
            ))
        })?;
        let compression_param = self
            .data_array_compression
            .as_param()
            .unwrap_or_else(|| self.ms_cv.param("MS:1000576", "no compression"));
        let compression = match self.data_array_compression {
            BinaryCompressionType::Decoded => BinaryCompressionType::NoCompression,
            c => c,
        };

        let encoded = array.encode_bytestring(compression)?;
        let encoded = String::from_utf8_lossy(&encoded);

        let mut outer = bstart!("binaryDataArray");
        let encoded_len = encoded.len().to_string();
        attrib!("encodedLength", encoded_len, outer);
        start_event!(self, outer);

        self.handle.write_param(&dtype_param)?;
        self.handle.write_param(&compression_param)?;
        let unit = match array.unit {
            Unit::Unknown => None,
            unit => Some(unit),
        };
        self.handle.write_param(&array.name.as_param(unit))?;
        self.handle.write_param_list(array.params().iter())?;

        let bin = bstart!("binary");
        start_event!(self, bin);
        self.handle.write_text(&encoded)?;
        end_event!(self, bin);
        end_event!(self, outer);
        Ok(())
    }

    fn write_binary_data_arrays(&mut self, arrays: &BinaryArrayMap) -> WriterResult {
        let count = arrays.len().to_string();
        let mut outer = bstart!("binaryDataArrayList");
        attrib!("count", count, outer);
        start_event!(self, outer);
        for (_tp, array) in arrays.iter() {
            self.write_binary_data_array(array)?
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_spectrum_descriptors(&mut self, spectrum: &Spectrum) -> WriterResult {
        let ms_level = spectrum.ms_level();
        if ms_level == 1 {
            self.handle
                .write_param(&self.ms_cv.param("MS:1000579", "MS1 spectrum"))?;
        } else {
            self.handle
                .write_param(&self.ms_cv.param("MS:1000580", "MSn spectrum"))?;
        }
        self.handle
            .write_param(&self.ms_cv.param_val("MS:1000511", "ms level", ms_level))?;

        match spectrum.polarity() {
            ScanPolarity::Negative => self
                .handle
                .write_param(&self.ms_cv.param("MS:1000129", "negative scan"))?,
            ScanPolarity::Positive => self
                .handle
                .write_param(&self.ms_cv.param("MS:1000130", "positive scan"))?,
            ScanPolarity::Unknown => {
                debug!("No scan polarity known for {}", spectrum.id());
            }
        }

        match spectrum.signal_continuity() {
            SignalContinuity::Profile => self
                .handle
                .write_param(&self.ms_cv.param("MS:1000128", "profile spectrum"))?,
            SignalContinuity::Centroid => self
                .handle
                .write_param(&self.ms_cv.param("MS:1000127", "centroid spectrum"))?,
            SignalContinuity::Unknown => {
                debug!("No signal continuity known for {}", spectrum.id());
            }
        }
        self.handle.write_param_list(spectrum.params().iter())
    }

    /**
    Write a [`Spectrum`] out to the mzML file.

    ## Side-Effects
    If the writer has not already started writing the spectra, this will cause all the metadata
    to be written out and the `<spectrumList>` element will be opened, preventing no new metadata
    from being written to this stream. Furthermore, this writes the spectrum count out, so the value
    may no longer be changed.
    */
    pub fn write_spectrum(&mut self, spectrum: &Spectrum) -> WriterResult {
        match self.state {
            MzMLWriterState::SpectrumList => {}
            state if state < MzMLWriterState::SpectrumList => {
                self.start_spectrum_list()?;
            }
            _ => {
                // Cannot write spectrum, currently in state which happens
                // after spectra may be written
                return Err(MzMLWriterError::InvalidActionError(self.state));
            }
        }
        // indexedmzML > mzML > run > spectrumList > spectrum
        let pos = self.handle.next_element_offset(4);
        self.offset_index.insert(spectrum.id().to_string(), pos);
        trace!("Writing spectrum {} at offset {pos}", spectrum.id());

        let mut outer = bstart!("spectrum");
        let count = self.spectrum_counter.to_string();
        attrib!("index", count, outer);
        attrib!("id", spectrum.id(), outer);
        let default_array_len = spectrum.mzs()?.len().to_string();
        attrib!("defaultArrayLength", default_array_len, outer);
        start_event!(self, outer);
        self.spectrum_counter += 1;

        self.write_spectrum_descriptors(spectrum)?;
        self.write_scan_list(spectrum.acquisition())?;

        if let Some(precursor) = spectrum.precursor() {
            self.write_precursor(precursor)?;
        }

        self.write_binary_data_arrays(&spectrum.arrays)?;

        end_event!(self, outer);
        Ok(())
    }

    fn write_index(&mut self, index: &OffsetIndex) -> WriterResult {
        let mut outer = bstart!("index");
        attrib!("name", index.name, outer);
        start_event!(self, outer);
        for (id, offset) in index.iter() {
            let mut tag = bstart!("offset");
            attrib!("idRef", id, tag);
            start_event!(self, tag);
            self.handle.write_text(&offset.to_string())?;
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_index_list(&mut self) -> WriterResult {
        if self.state < MzMLWriterState::MzMLClosed {
            self.close_mzml()?;
        }
        self.state = MzMLWriterState::IndexList;
        // indexedmzML > indexList
        let offset = self.handle.next_element_offset(1);
        let mut outer = bstart!("indexList");
        attrib!("count", "1", outer);
        start_event!(self, outer);
        let index = std::mem::take(&mut self.offset_index);
        let result = self.write_index(&index);
        self.offset_index = index;
        result?;
        end_event!(self, outer);

        let tag = bstart!("indexListOffset");
        start_event!(self, tag);
        self.handle.write_text(&offset.to_string())?;
        end_event!(self, tag);

        let tag = bstart!("fileChecksum");
        start_event!(self, tag);
        // Covers every byte up to and including `<fileChecksum>`
        let content = self.handle.digest();
        self.handle.write_text(&content)?;
        end_event!(self, tag);
        self.state = MzMLWriterState::IndexListClosed;
        Ok(())
    }

    /// Get a reference to the mzML writer's spectrum count.
    pub fn spectrum_count(&self) -> &u64 {
        &self.spectrum_count
    }

    /// Set the mzML writer's spectrum count.
    pub fn set_spectrum_count(&mut self, spectrum_count: u64) {
        self.spectrum_count = spectrum_count;
    }

    /// Get a mutable reference to the mzML writer's spectrum count to modify in-place.
    pub fn spectrum_count_mut(&mut self) -> &mut u64 {
        &mut self.spectrum_count
    }
}

/// Write `collection` to a new indexedmzML file at `path`
pub fn write_mzml<P: AsRef<Path>>(
    path: P,
    collection: &SpectrumCollection,
) -> Result<(), MzMLWriterError> {
    write_mzml_with_compression(path, collection, BinaryCompressionType::Zlib)
}

pub fn write_mzml_with_compression<P: AsRef<Path>>(
    path: P,
    collection: &SpectrumCollection,
    compression: BinaryCompressionType,
) -> Result<(), MzMLWriterError> {
    let mut writer = MzMLWriter::create_path(path)?;
    writer.data_array_compression = compression;
    writer.write_collection(collection)?;
    writer.close()
}

/// Write a single spectrum to a new indexedmzML file at `path` as a run of its own
pub fn write_spectrum_mzml<P: AsRef<Path>>(
    path: P,
    spectrum: &Spectrum,
) -> Result<(), MzMLWriterError> {
    write_mzml(path, &SpectrumCollection::from_spectrum(spectrum.clone()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::mzml::{read_mzml, MzMLReader};
    use crate::spectrum::{ByteArrayView, DataArray, SpectrumDescription};
    use sha1::{Digest, Sha1};
    use std::io::Cursor;

    fn gaussian_spectrum(id: &str, index: usize) -> Spectrum {
        let mzs: Vec<f64> = (0..200).map(|i| 400.0 + i as f64 * 0.01).collect();
        let intensities: Vec<f32> = mzs
            .iter()
            .map(|mz| (1e4 * (-(mz - 401.0).powi(2) / (2.0 * 0.02f64.powi(2))).exp()) as f32)
            .collect();
        let mut description = SpectrumDescription::new(id, index, 1);
        description.signal_continuity = SignalContinuity::Profile;
        description.polarity = ScanPolarity::Positive;
        let mut scan = ScanEvent::default();
        scan.start_time = 1.25 + index as f64;
        scan.scan_windows.push(ScanWindow::new(400.0, 402.0));
        description.acquisition.scans.push(scan);
        Spectrum::from_arrays(description, &mzs, &intensities).unwrap()
    }

    fn centroid_spectrum(id: &str, index: usize, precursor_id: &str) -> Spectrum {
        let mut description = SpectrumDescription::new(id, index, 2);
        description.signal_continuity = SignalContinuity::Centroid;
        description.polarity = ScanPolarity::Negative;
        description.params.push(Param::new_key_value("filter string", "FTMS - c <tag> & more"));
        let mut precursor = Precursor::default();
        precursor.ion.mz = 401.0;
        precursor.ion.charge = Some(-2);
        precursor.ion.intensity = 1e4;
        precursor.precursor_id = Some(precursor_id.to_string());
        precursor.isolation_window = IsolationWindow {
            target: 401.0,
            lower_bound: 400.5,
            upper_bound: 401.5,
            flags: IsolationWindowState::Complete,
        };
        precursor.activation.energy = 27.0;
        *precursor.activation.method_mut() = Some(
            ControlledVocabulary::MS.param("MS:1000133", "collision-induced dissociation"),
        );
        description.precursor = Some(precursor);
        let mut spectrum =
            Spectrum::from_arrays(description, &[150.1, 220.25, 399.9], &[10.0, 250.0, 30.0])
                .unwrap();
        let mut fwhm = DataArray::from_name_and_type(
            &ArrayType::nonstandard("FWHM"),
            crate::spectrum::BinaryDataArrayType::Float32,
        );
        fwhm.extend(&[0.01f32, 0.02, 0.015]).unwrap();
        fwhm.unit = Unit::MZ;
        spectrum.arrays.add(fwhm);
        spectrum
    }

    fn make_collection() -> SpectrumCollection {
        let mut collection = SpectrumCollection::new("test_run");
        let ms1 = gaussian_spectrum("scan=1", 0);
        collection.push(ms1);
        collection.push(centroid_spectrum("scan=2", 1, "scan=1"));
        collection.push(gaussian_spectrum("scan=3", 2));
        collection
    }

    fn write_to_buffer(
        collection: &SpectrumCollection,
        compression: BinaryCompressionType,
    ) -> Result<Vec<u8>, MzMLWriterError> {
        let mut writer = MzMLWriter::with_compression(Vec::new(), compression);
        writer.write_collection(collection)?;
        writer.into_inner()
    }

    #[test_log::test]
    fn test_round_trip() -> Result<(), MzMLWriterError> {
        let collection = make_collection();
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("round_trip.mzML");
        write_mzml(&path, &collection)?;

        let reread = read_mzml(&path).map_err(io::Error::from)?;
        assert_eq!(reread.len(), collection.len());
        assert_eq!(reread.run_id, "test_run");
        assert!(reread.softwares.iter().any(|s| s.id == "mzkit"));
        for (a, b) in collection.iter().zip(reread.iter()) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.index(), b.index());
            assert_eq!(a.ms_level(), b.ms_level());
            assert_eq!(a.signal_continuity(), b.signal_continuity());
            assert_eq!(a.polarity(), b.polarity());
            assert!((a.start_time() - b.start_time()).abs() < 1e-6);
            let (amz, bmz) = (a.mzs()?, b.mzs()?);
            assert_eq!(amz.len(), bmz.len());
            for (x, y) in amz.iter().zip(bmz.iter()) {
                assert!((x - y).abs() < 1e-9);
            }
            for (x, y) in a.intensities()?.iter().zip(b.intensities()?.iter()) {
                assert!((x - y).abs() < 1e-3);
            }
        }

        let ms2 = &reread[1];
        assert_eq!(
            ms2.get_param_by_name("filter string").map(|p| p.value.as_str()),
            Some("FTMS - c <tag> & more")
        );
        let precursor = ms2.precursor().unwrap();
        assert_eq!(precursor.ion.charge, Some(-2));
        assert_eq!(precursor.precursor_id.as_deref(), Some("scan=1"));
        assert!((precursor.isolation_window.lower_bound - 400.5).abs() < 1e-4);
        assert!((precursor.isolation_window.upper_bound - 401.5).abs() < 1e-4);
        assert!((precursor.activation.energy - 27.0).abs() < 1e-6);
        assert_eq!(
            precursor.activation.method().map(|p| p.name.as_str()),
            Some("collision-induced dissociation")
        );
        let fwhm = ms2.arrays.get(&ArrayType::nonstandard("FWHM")).unwrap();
        assert_eq!(fwhm.unit, Unit::MZ);
        assert_eq!(fwhm.to_f32()?.len(), 3);
        Ok(())
    }

    #[test_log::test]
    fn test_uncompressed_round_trip() -> Result<(), MzMLWriterError> {
        let collection = make_collection();
        let buffer = write_to_buffer(&collection, BinaryCompressionType::NoCompression)?;
        let text = String::from_utf8_lossy(&buffer);
        assert!(text.contains("MS:1000576"));
        assert!(!text.contains("MS:1000574"));

        let mut reader = MzMLReader::new(Cursor::new(buffer.as_slice())).map_err(io::Error::from)?;
        let reread = reader.read_all().map_err(io::Error::from)?;
        assert_eq!(reread.len(), 3);
        assert_eq!(reread[0].mzs()?.as_ref(), collection[0].mzs()?.as_ref());
        Ok(())
    }

    #[test_log::test]
    fn test_index_offsets_and_checksum() -> Result<(), MzMLWriterError> {
        let collection = make_collection();
        let buffer = write_to_buffer(&collection, BinaryCompressionType::Zlib)?;

        let mut reader = MzMLReader::new(Cursor::new(buffer.as_slice())).map_err(io::Error::from)?;
        let ids: Vec<String> = reader.by_ref().map(|s| s.id().to_string()).collect();
        assert!(reader.take_error().is_none());
        assert_eq!(ids, ["scan=1", "scan=2", "scan=3"]);

        let index = reader.spectrum_index();
        assert_eq!(index.len(), 3);
        for (id, offset) in index.iter() {
            let tail = &buffer[*offset as usize..];
            assert!(tail.starts_with(b"<spectrum index=\""), "offset for {id} is wrong");
            let head = String::from_utf8_lossy(&tail[..80]);
            assert!(head.contains(&format!("id=\"{id}\"")));
        }

        let list_offset = reader.index_list_offset().unwrap() as usize;
        assert!(buffer[list_offset..].starts_with(b"<indexList "));

        let marker = b"<fileChecksum>";
        let end = buffer
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        let expected = base16ct::lower::encode_string(&Sha1::digest(&buffer[..end]));
        assert_eq!(reader.file_checksum(), Some(expected.as_str()));
        Ok(())
    }

    #[test_log::test]
    fn test_single_spectrum() -> Result<(), MzMLWriterError> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("single.mzML");
        let spectrum = centroid_spectrum("scan=9", 0, "scan=8");
        write_spectrum_mzml(&path, &spectrum)?;
        let reread = read_mzml(&path).map_err(io::Error::from)?;
        assert_eq!(reread.len(), 1);
        assert_eq!(reread[0].id(), "scan=9");
        Ok(())
    }

    #[test_log::test]
    fn test_empty_collection() -> Result<(), MzMLWriterError> {
        let collection = SpectrumCollection::new("empty");
        let buffer = write_to_buffer(&collection, BinaryCompressionType::Zlib)?;
        let mut reader = MzMLReader::new(Cursor::new(buffer.as_slice())).map_err(io::Error::from)?;
        let reread = reader.read_all().map_err(io::Error::from)?;
        assert!(reread.is_empty());
        assert!(reader.file_checksum().is_some());
        Ok(())
    }

    #[test_log::test]
    fn test_state_errors() -> Result<(), MzMLWriterError> {
        let collection = make_collection();
        let mut writer = MzMLWriter::new(Vec::new());
        writer.write_collection(&collection)?;
        assert!(matches!(
            writer.write_collection(&collection),
            Err(MzMLWriterError::InvalidActionError(MzMLWriterState::SpectrumList))
        ));
        writer.close()?;
        assert_eq!(writer.state, MzMLWriterState::End);
        assert!(matches!(
            writer.write_spectrum(&collection[0]),
            Err(MzMLWriterError::InvalidActionError(MzMLWriterState::End))
        ));
        Ok(())
    }

    #[test_log::test]
    fn test_unknown_dtype_rejected() {
        let mut spectrum = gaussian_spectrum("scan=1", 0);
        let mut array = DataArray::from_name(&ArrayType::nonstandard("opaque"));
        array.dtype = crate::spectrum::BinaryDataArrayType::Unknown;
        spectrum.arrays.add(array);
        let mut writer = MzMLWriter::new(Vec::new());
        assert!(matches!(
            writer.write_spectrum(&spectrum),
            Err(MzMLWriterError::ArrayEncodingError(_))
        ));
    }
}
