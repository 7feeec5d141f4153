//! Message framing: the write path ([`MessageWriter`]) and the read path
//! ([`MessageReader`]).
//!
//! The writer packs records into sets and sets into messages, patching set
//! and message lengths when a boundary closes, and hands whole messages to
//! an [`Exporter`]. The reader pulls whole messages from a [`Collector`],
//! walks their sets, consumes template and metadata sets internally, and
//! yields decoded records. Both retry transparently across message
//! boundaries while auto-next-message is enabled (the default).

pub mod stream;

pub use stream::{BufferCollector, Collector, Exporter, ReaderCollector, VecExporter, WriterExporter};

use crate::error::IpfixError;
use crate::model::{ElementOptionRecord, InfoElement, iana};
use crate::record::{FieldValue, Record};
use crate::session::{BasicListInfo, Session, TemplateInfo};
use crate::template::{MetadataShape, Template};
use crate::transcode::{self, PlanCache, TranscodePlan};
use crate::types::{
    ENTERPRISE_BIT, IPFIX_VERSION, MAX_MESSAGE_LEN, MIN_DATA_SET_ID, MSG_HEADER_LEN,
    OPTIONS_TEMPLATE_SET_ID, SET_HEADER_LEN, TEMPLATE_SET_ID,
};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::{debug, warn};
use nom_derive::{Nom, Parse};
use serde::Serialize;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// IPFIX message header (16 octets, big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Nom)]
pub struct MessageHeader {
    /// Always 0x000A.
    pub version: u16,
    /// Total message length in octets, header included.
    pub length: u16,
    /// Export time in seconds since the Unix epoch.
    pub export_time: u32,
    /// Count of data records sent before this message.
    pub sequence_number: u32,
    pub observation_domain_id: u32,
}

/// Set header (4 octets, big-endian). The length includes the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Nom)]
pub struct SetHeader {
    pub set_id: u16,
    pub length: u16,
}

/// On-wire field specifier in a template record.
#[derive(Debug, Nom)]
struct WireFieldSpec {
    raw_id: u16,
    len: u16,
    #[nom(Cond = "raw_id > 0x7FFF")]
    pen: Option<u32>,
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// The export side of a message buffer.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ipfix_codec::model::InfoModel;
/// use ipfix_codec::message::{MessageWriter, VecExporter};
/// use ipfix_codec::record::{FieldValue, Record};
/// use ipfix_codec::session::Session;
/// use ipfix_codec::template::Template;
///
/// let model = Arc::new(InfoModel::new());
/// let mut session = Session::new(Arc::clone(&model));
/// let mut tmpl = Template::new();
/// tmpl.push_named(&model, "octetDeltaCount", 8).unwrap();
/// let tmpl = session.add_external_template(256, tmpl).unwrap();
///
/// let mut writer = MessageWriter::new(session, VecExporter::new());
/// writer.export_template(256).unwrap();
/// writer.set_export_template(256).unwrap();
/// let mut record = Record::new(&tmpl);
/// record.set(0, FieldValue::Unsigned(1500)).unwrap();
/// writer.append(&record).unwrap();
/// writer.emit().unwrap();
/// assert_eq!(writer.exporter().messages.len(), 1);
/// ```
pub struct MessageWriter<E: Exporter> {
    session: Session,
    exporter: E,
    plans: PlanCache,
    buf: Vec<u8>,
    set_base: Option<usize>,
    set_id: u16,
    internal: Option<(u16, Arc<Template>)>,
    export: Option<(u16, Arc<Template>)>,
    auto_next: bool,
    export_time: Option<u32>,
    msg_records: u32,
}

impl<E: Exporter> MessageWriter<E> {
    pub fn new(session: Session, exporter: E) -> Self {
        Self {
            session,
            exporter,
            plans: PlanCache::new(),
            buf: vec![0; MSG_HEADER_LEN],
            set_base: None,
            set_id: 0,
            internal: None,
            export: None,
            auto_next: true,
            export_time: None,
            msg_records: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    pub fn exporter_mut(&mut self) -> &mut E {
        &mut self.exporter
    }

    /// When enabled (the default), an operation that runs out of message
    /// room emits the current message and retries once.
    pub fn set_auto_next_message(&mut self, enabled: bool) {
        self.auto_next = enabled;
    }

    /// Overrides the export time stamped on emitted messages; `None`
    /// returns to the system clock.
    pub fn set_export_time(&mut self, seconds: Option<u32>) {
        self.export_time = seconds;
    }

    /// Selects the internal template records appended from now on must be
    /// built with. Rejected if the template uses defaulted field lengths.
    pub fn set_internal_template(&mut self, tid: u16) -> Result<(), IpfixError> {
        let tmpl = self
            .session
            .internal_template(tid)
            .ok_or_else(|| IpfixError::Template(format!("no internal template {tid}")))?;
        if tmpl.uses_default_lengths() {
            return Err(IpfixError::LaxSize(tid));
        }
        self.internal = Some((tid, tmpl));
        Ok(())
    }

    /// Selects the external template records are projected through on the
    /// wire. Changing templates closes the current data set.
    pub fn set_export_template(&mut self, tid: u16) -> Result<(), IpfixError> {
        let tmpl = self
            .session
            .external_template(tid)
            .ok_or_else(|| IpfixError::Template(format!("no external template {tid}")))?;
        if self.export.as_ref().map(|(id, _)| *id) != Some(tid) {
            self.close_set();
        }
        self.export = Some((tid, tmpl));
        Ok(())
    }

    /// Drops cached transcode plans involving a template about to be
    /// released.
    pub fn remove_template_plans(&mut self, template: &Template) {
        self.plans.remove_template(template.uid());
    }

    fn room(&self) -> usize {
        MAX_MESSAGE_LEN - self.buf.len()
    }

    fn open_set(&mut self, set_id: u16) -> Result<(), IpfixError> {
        if self.set_base.is_some() && self.set_id == set_id {
            return Ok(());
        }
        self.close_set();
        if self.room() < SET_HEADER_LEN {
            return Err(IpfixError::EndOfMessage);
        }
        self.set_base = Some(self.buf.len());
        self.buf.write_u16::<BigEndian>(set_id)?;
        self.buf.write_u16::<BigEndian>(0)?;
        self.set_id = set_id;
        Ok(())
    }

    fn close_set(&mut self) {
        if let Some(base) = self.set_base.take() {
            let len = self.buf.len() - base;
            if len == SET_HEADER_LEN {
                // nothing was written into the set; drop the header
                self.buf.truncate(base);
            } else {
                BigEndian::write_u16(&mut self.buf[base + 2..base + 4], len as u16);
            }
        }
    }

    /// Closes the current set, stamps the message header, and hands the
    /// message to the exporter. A message with no content is not written.
    pub fn emit(&mut self) -> Result<(), IpfixError> {
        self.close_set();
        if self.buf.len() == MSG_HEADER_LEN {
            return Ok(());
        }
        let msg_len = self.buf.len() as u16;
        BigEndian::write_u16(&mut self.buf[0..2], IPFIX_VERSION);
        BigEndian::write_u16(&mut self.buf[2..4], msg_len);
        BigEndian::write_u32(&mut self.buf[4..8], self.export_time.unwrap_or_else(unix_now));
        BigEndian::write_u32(&mut self.buf[8..12], self.session.export_sequence());
        BigEndian::write_u32(&mut self.buf[12..16], self.session.observation_domain());
        self.exporter.write_message(&self.buf)?;
        self.session.advance_export_sequence(self.msg_records);
        self.msg_records = 0;
        self.buf.clear();
        self.buf.resize(MSG_HEADER_LEN, 0);
        Ok(())
    }

    fn retryable<T>(
        &mut self,
        mut op: impl FnMut(&mut Self) -> Result<T, IpfixError>,
    ) -> Result<T, IpfixError> {
        match op(self) {
            Err(e) if e.is_retryable() && self.auto_next => {
                self.emit()?;
                op(self)
            }
            other => other,
        }
    }

    /// Writes the definition record of an external template already added
    /// to the session, into a template or options-template set.
    pub fn export_template(&mut self, tid: u16) -> Result<(), IpfixError> {
        let tmpl = self
            .session
            .external_template(tid)
            .ok_or_else(|| IpfixError::Template(format!("no external template {tid}")))?;
        self.retryable(|w| w.write_template_record(tid, &tmpl))
    }

    /// Writes a withdrawal record: the template id with a field count of 0.
    pub fn export_template_revocation(
        &mut self,
        tid: u16,
        options: bool,
    ) -> Result<(), IpfixError> {
        self.retryable(|w| w.write_revocation_record(tid, options))
    }

    fn write_template_record(&mut self, tid: u16, tmpl: &Arc<Template>) -> Result<(), IpfixError> {
        let set_id = if tmpl.is_options() {
            OPTIONS_TEMPLATE_SET_ID
        } else {
            TEMPLATE_SET_ID
        };
        self.open_set(set_id)?;
        if self.room() < tmpl.def_wire_len() {
            return Err(IpfixError::EndOfMessage);
        }
        self.buf.write_u16::<BigEndian>(tid)?;
        self.buf.write_u16::<BigEndian>(tmpl.field_count() as u16)?;
        if tmpl.is_options() {
            self.buf.write_u16::<BigEndian>(tmpl.scope_count())?;
        }
        for field in tmpl.fields() {
            let raw_id = if field.ie.pen != 0 {
                field.ie.id | ENTERPRISE_BIT
            } else {
                field.ie.id
            };
            self.buf.write_u16::<BigEndian>(raw_id)?;
            self.buf.write_u16::<BigEndian>(field.len)?;
            if field.ie.pen != 0 {
                self.buf.write_u32::<BigEndian>(field.ie.pen)?;
            }
        }
        Ok(())
    }

    fn write_revocation_record(&mut self, tid: u16, options: bool) -> Result<(), IpfixError> {
        let set_id = if options {
            OPTIONS_TEMPLATE_SET_ID
        } else {
            TEMPLATE_SET_ID
        };
        self.open_set(set_id)?;
        if self.room() < 4 {
            return Err(IpfixError::EndOfMessage);
        }
        self.buf.write_u16::<BigEndian>(tid)?;
        self.buf.write_u16::<BigEndian>(0)?;
        Ok(())
    }

    /// Appends one record, projected through the current export template.
    ///
    /// Returns [`IpfixError::EndOfMessage`] when the record does not fit
    /// and auto-next-message is disabled; otherwise the message is emitted
    /// and the append retried on a fresh one.
    pub fn append(&mut self, record: &Record) -> Result<(), IpfixError> {
        let (ext_tid, ext) = self
            .export
            .clone()
            .ok_or_else(|| IpfixError::Template("no export template selected".into()))?;
        if let Some((int_tid, int)) = &self.internal {
            if int.uid() != record.template().uid() {
                return Err(IpfixError::Template(format!(
                    "record template does not match internal template {int_tid}"
                )));
            }
        }

        // encode into scratch first so a failed append leaves the message
        // intact and already-written set lengths stay correct
        let mut scratch = Vec::with_capacity(ext.record_len());
        {
            let plan = self.plans.plan_for(record.template(), &ext)?;
            let Self { session, plans, .. } = self;
            transcode::encode_record(&mut scratch, record, &ext, &plan, session, plans)?;
        }
        if SET_HEADER_LEN + scratch.len() > MAX_MESSAGE_LEN - MSG_HEADER_LEN {
            return Err(IpfixError::BufferSize(format!(
                "record of {} octets cannot fit any message",
                scratch.len()
            )));
        }

        self.retryable(|w| {
            w.open_set(ext_tid)?;
            if w.room() < scratch.len() {
                return Err(IpfixError::EndOfMessage);
            }
            w.buf.extend_from_slice(&scratch);
            w.msg_records += 1;
            Ok(())
        })
    }

    /// Registers the canonical RFC 5610 template under `tid`, exports its
    /// definition, and appends one description record per element. Leaves
    /// `tid` selected as the export template.
    pub fn export_element_definitions(
        &mut self,
        tid: u16,
        elements: &[Arc<InfoElement>],
    ) -> Result<(), IpfixError> {
        let tmpl = Template::element_info(self.session.model())?;
        let tmpl = self.session.add_external_template(tid, tmpl)?;
        self.export_template(tid)?;
        self.set_export_template(tid)?;
        for ie in elements {
            let record = element_definition_record(&tmpl, ie);
            self.append(&record)?;
        }
        Ok(())
    }

    /// Registers the template-name metadata template under `meta_tid`,
    /// exports it, and appends a name/description record for `tid`. Leaves
    /// `meta_tid` selected as the export template.
    pub fn export_template_info(
        &mut self,
        meta_tid: u16,
        tid: u16,
        info: &TemplateInfo,
    ) -> Result<(), IpfixError> {
        let tmpl = Template::template_info_v1(self.session.model())?;
        let tmpl = self.session.add_external_template(meta_tid, tmpl)?;
        self.export_template(meta_tid)?;
        self.set_export_template(meta_tid)?;

        let mut record = Record::new(&tmpl);
        record.set(0, FieldValue::Unsigned(tid as u64)).ok();
        record.set(1, FieldValue::String(info.name.clone())).ok();
        record
            .set(2, FieldValue::String(info.description.clone()))
            .ok();
        self.append(&record)
    }

    /// Emits any buffered content and flushes the exporter.
    pub fn flush(&mut self) -> Result<(), IpfixError> {
        self.emit()?;
        self.exporter.flush()
    }
}

fn element_definition_record(tmpl: &Arc<Template>, ie: &InfoElement) -> Record {
    use iana::ids::*;
    let mut record = Record::new(tmpl);
    let mut set = |pen: u32, id: u16, value: FieldValue| {
        if let Some(idx) = tmpl.position_of_ident(pen, id, 0) {
            record.set(idx, value).ok();
        }
    };
    let (range_begin, range_end) = ie.range.unwrap_or((0, 0));
    set(0, PRIVATE_ENTERPRISE_NUMBER, FieldValue::Unsigned(ie.pen as u64));
    set(0, INFORMATION_ELEMENT_ID, FieldValue::Unsigned(ie.id as u64));
    set(
        0,
        INFORMATION_ELEMENT_DATA_TYPE,
        FieldValue::Unsigned(ie.data_type.code() as u64),
    );
    set(
        0,
        INFORMATION_ELEMENT_SEMANTICS,
        FieldValue::Unsigned(ie.semantics.code() as u64),
    );
    set(
        0,
        INFORMATION_ELEMENT_UNITS,
        FieldValue::Unsigned(ie.units.code() as u64),
    );
    set(0, INFORMATION_ELEMENT_RANGE_BEGIN, FieldValue::Unsigned(range_begin));
    set(0, INFORMATION_ELEMENT_RANGE_END, FieldValue::Unsigned(range_end));
    set(0, INFORMATION_ELEMENT_NAME, FieldValue::String(ie.name.clone()));
    set(
        0,
        INFORMATION_ELEMENT_DESCRIPTION,
        FieldValue::String(ie.description.clone().unwrap_or_default()),
    );
    record
}

struct DataSetState {
    set_id: u16,
    end: usize,
    ext: Arc<Template>,
    int: Arc<Template>,
    plan: Arc<TranscodePlan>,
}

/// The collect side of a message buffer.
pub struct MessageReader<C: Collector> {
    session: Session,
    collector: C,
    plans: PlanCache,
    msg: Vec<u8>,
    pos: usize,
    header: Option<MessageHeader>,
    state: Option<DataSetState>,
    internal: Option<u16>,
    auto_next: bool,
    auto_element_ingest: bool,
    auto_template_info_ingest: bool,
}

impl<C: Collector> MessageReader<C> {
    pub fn new(session: Session, collector: C) -> Self {
        Self {
            session,
            collector,
            plans: PlanCache::new(),
            msg: Vec::new(),
            pos: 0,
            header: None,
            state: None,
            internal: None,
            auto_next: true,
            auto_element_ingest: false,
            auto_template_info_ingest: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn collector_mut(&mut self) -> &mut C {
        &mut self.collector
    }

    /// When enabled (the default), [`next_record`](Self::next_record)
    /// fetches the next message transparently when the current one is
    /// exhausted.
    pub fn set_auto_next_message(&mut self, enabled: bool) {
        self.auto_next = enabled;
    }

    /// Consume RFC 5610 element-description option records into the
    /// information model instead of delivering them.
    pub fn set_auto_element_ingest(&mut self, enabled: bool) {
        self.auto_element_ingest = enabled;
    }

    /// Consume template-metadata option records into the session instead
    /// of delivering them.
    pub fn set_auto_template_info_ingest(&mut self, enabled: bool) {
        self.auto_template_info_ingest = enabled;
    }

    /// Forces every data set to decode into the given internal template
    /// instead of consulting the template-pair map.
    pub fn set_internal_template(&mut self, tid: u16) -> Result<(), IpfixError> {
        let tmpl = self
            .session
            .internal_template(tid)
            .ok_or_else(|| IpfixError::Template(format!("no internal template {tid}")))?;
        if tmpl.uses_default_lengths() {
            return Err(IpfixError::LaxSize(tid));
        }
        self.internal = Some(tid);
        Ok(())
    }

    /// Returns to template-pair based internal selection.
    pub fn clear_internal_template(&mut self) {
        self.internal = None;
    }

    /// Drops cached transcode plans involving a template about to be
    /// released.
    pub fn remove_template_plans(&mut self, template: &Template) {
        self.plans.remove_template(template.uid());
    }

    /// Reads and validates the next message header, adopting its
    /// observation domain and checking its sequence number.
    pub fn next_message(&mut self) -> Result<MessageHeader, IpfixError> {
        let bytes = self
            .collector
            .read_message()?
            .ok_or(IpfixError::EndOfStream)?;
        let (_, header) = MessageHeader::parse(&bytes)
            .map_err(|_| IpfixError::Malformed("truncated message header".into()))?;
        if header.version != IPFIX_VERSION {
            return Err(IpfixError::Malformed(format!(
                "bad version 0x{:04X}",
                header.version
            )));
        }
        if (header.length as usize) < MSG_HEADER_LEN || header.length as usize != bytes.len() {
            return Err(IpfixError::Malformed(format!(
                "message length {} does not match framing {}",
                header.length,
                bytes.len()
            )));
        }
        self.session
            .set_observation_domain(header.observation_domain_id);
        self.session.check_collector_sequence(header.sequence_number);
        self.msg = bytes;
        self.pos = MSG_HEADER_LEN;
        self.state = None;
        self.header = Some(header);
        Ok(header)
    }

    /// Header of the message currently being decoded.
    pub fn current_header(&self) -> Option<&MessageHeader> {
        self.header.as_ref()
    }

    /// Decodes the next data record.
    ///
    /// Template sets, metadata option sets, trailing padding, and sets with
    /// no usable template are consumed transparently. Returns `Ok(None)`
    /// at end of stream, or [`IpfixError::EndOfMessage`] when the current
    /// message is exhausted and auto-next-message is disabled.
    pub fn next_record(&mut self) -> Result<Option<Record>, IpfixError> {
        loop {
            if self.header.is_none() {
                if !self.auto_next {
                    return Err(IpfixError::EndOfMessage);
                }
                match self.next_message() {
                    Ok(_) => {}
                    Err(IpfixError::EndOfStream) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }

            if let Some(state) = &self.state {
                let remaining = state.end - self.pos;
                let record_len = state.ext.record_len();
                if record_len == 0 || remaining < record_len {
                    // what is left of the set is trailing padding
                    self.pos = state.end;
                    self.state = None;
                    continue;
                }
                let (record, used) = transcode::decode_record(
                    &self.msg[self.pos..state.end],
                    state.set_id,
                    &state.ext,
                    &state.int,
                    &state.plan,
                    &self.session,
                )?;
                self.pos += used;
                self.session.advance_collector_sequence(1);
                return Ok(Some(record));
            }

            if self.pos + SET_HEADER_LEN > self.msg.len() {
                self.header = None;
                continue;
            }
            self.begin_next_set()?;
        }
    }

    /// Iterator over [`next_record`](Self::next_record), ending after the
    /// first error or end of stream.
    pub fn records(&mut self) -> Records<'_, C> {
        Records {
            reader: self,
            done: false,
        }
    }

    fn begin_next_set(&mut self) -> Result<(), IpfixError> {
        let (_, set) = SetHeader::parse(&self.msg[self.pos..])
            .map_err(|_| IpfixError::Malformed("truncated set header".into()))?;
        let len = set.length as usize;
        if len < SET_HEADER_LEN || self.pos + len > self.msg.len() {
            return Err(IpfixError::Malformed(format!("bad set length {len}")));
        }
        let end = self.pos + len;
        let body = self.pos + SET_HEADER_LEN;

        match set.set_id {
            TEMPLATE_SET_ID | OPTIONS_TEMPLATE_SET_ID => {
                self.consume_template_set(set.set_id == OPTIONS_TEMPLATE_SET_ID, body, end)?;
                self.pos = end;
            }
            id if id < MIN_DATA_SET_ID => {
                return Err(IpfixError::Malformed(format!("reserved set id {id}")));
            }
            id => {
                let Some(ext) = self.session.external_template(id) else {
                    warn!("no external template {id} for data set; skipping {len} octets");
                    self.pos = end;
                    return Ok(());
                };
                match ext.metadata_shape() {
                    Some(MetadataShape::ElementInfo) if self.auto_element_ingest => {
                        self.consume_element_info_set(&ext, id, body, end)?;
                        self.pos = end;
                        return Ok(());
                    }
                    Some(MetadataShape::TemplateInfoV1 | MetadataShape::TemplateInfoV3)
                        if self.auto_template_info_ingest =>
                    {
                        self.consume_template_info_set(&ext, id, body, end)?;
                        self.pos = end;
                        return Ok(());
                    }
                    _ => {}
                }

                let int = if let Some(tid) = self.internal {
                    self.session.internal_template(tid).ok_or_else(|| {
                        IpfixError::Template(format!("internal template {tid} disappeared"))
                    })?
                } else {
                    let pair = self.session.lookup_template_pair(id);
                    if pair == 0 {
                        self.pos = end;
                        return Ok(());
                    }
                    match self.session.internal_template(pair) {
                        Some(int) => int,
                        None if pair == id => Arc::clone(&ext),
                        None => {
                            warn!("no internal template {pair} paired with {id}; skipping set");
                            self.pos = end;
                            return Ok(());
                        }
                    }
                };
                let plan = self.plans.plan_for(&ext, &int)?;
                self.pos = body;
                self.state = Some(DataSetState {
                    set_id: id,
                    end,
                    ext,
                    int,
                    plan,
                });
            }
        }
        Ok(())
    }

    fn consume_template_set(
        &mut self,
        options: bool,
        mut pos: usize,
        end: usize,
    ) -> Result<(), IpfixError> {
        while pos + 4 <= end {
            let tid = BigEndian::read_u16(&self.msg[pos..pos + 2]);
            let count = BigEndian::read_u16(&self.msg[pos + 2..pos + 4]) as usize;
            pos += 4;

            if count == 0 {
                // withdrawal record
                if self.session.remove_external_template(tid).is_some() {
                    debug!("withdrew template {tid}");
                } else {
                    warn!("withdrawal for unknown template {tid}");
                }
                continue;
            }

            let scope = if options {
                if pos + 2 > end {
                    return Err(IpfixError::Malformed("truncated options template".into()));
                }
                let scope = BigEndian::read_u16(&self.msg[pos..pos + 2]);
                pos += 2;
                scope
            } else {
                0
            };

            let mut specs = Vec::with_capacity(count);
            for _ in 0..count {
                let (rest, spec) = WireFieldSpec::parse(&self.msg[pos..end])
                    .map_err(|_| IpfixError::Malformed("truncated template record".into()))?;
                pos = end - rest.len();
                specs.push(spec);
            }

            if tid < MIN_DATA_SET_ID {
                warn!("template record with reserved id {tid}; ignoring");
                continue;
            }
            if options && (scope == 0 || scope as usize > count) {
                warn!("template {tid} has illegal scope count {scope}; ignoring");
                continue;
            }

            let mut tmpl = Template::new();
            let mut rejected = false;
            for spec in &specs {
                let pen = spec.pen.unwrap_or(0);
                let id = spec.raw_id & !ENTERPRISE_BIT;
                if let Err(e) = tmpl.push_wire(self.session.model(), pen, id, spec.len) {
                    warn!("template {tid} rejected: {e}");
                    rejected = true;
                    break;
                }
            }
            if rejected {
                continue;
            }
            if options {
                if let Err(e) = tmpl.set_options_scope(scope) {
                    warn!("template {tid} rejected: {e}");
                    continue;
                }
            }
            let tmpl = Arc::new(tmpl);
            self.session.add_external_shared(tid, Arc::clone(&tmpl));
            self.session.trigger_new_template(tid, &tmpl);
            debug!("learned template {tid} with {} fields", tmpl.field_count());
        }
        Ok(())
    }

    fn consume_metadata_records(
        &mut self,
        ext: &Arc<Template>,
        tid: u16,
        mut pos: usize,
        end: usize,
    ) -> Result<Vec<Record>, IpfixError> {
        let plan = TranscodePlan::build(ext, ext)?;
        let mut records = Vec::new();
        if ext.record_len() == 0 {
            return Ok(records);
        }
        while end - pos >= ext.record_len() {
            let (record, used) =
                transcode::decode_record(&self.msg[pos..end], tid, ext, ext, &plan, &self.session)?;
            pos += used;
            self.session.advance_collector_sequence(1);
            records.push(record);
        }
        Ok(records)
    }

    fn consume_element_info_set(
        &mut self,
        ext: &Arc<Template>,
        tid: u16,
        pos: usize,
        end: usize,
    ) -> Result<(), IpfixError> {
        for record in self.consume_metadata_records(ext, tid, pos, end)? {
            match element_option_from_record(&record) {
                Some(opt) => match self.session.model().add_from_option_record(&opt) {
                    Ok(ie) => debug!("learned element {} from option record", ie.name),
                    Err(e) => warn!("rejected element description: {e}"),
                },
                None => warn!("malformed element description record"),
            }
        }
        Ok(())
    }

    fn consume_template_info_set(
        &mut self,
        ext: &Arc<Template>,
        tid: u16,
        pos: usize,
        end: usize,
    ) -> Result<(), IpfixError> {
        for record in self.consume_metadata_records(ext, tid, pos, end)? {
            match template_info_from_record(&record) {
                Some((described_tid, info)) => {
                    debug!("template {described_tid} named {:?}", info.name);
                    self.session.set_template_info(described_tid, info);
                }
                None => warn!("malformed template metadata record"),
            }
        }
        Ok(())
    }
}

/// Iterator over decoded records; see
/// [`MessageReader::records`].
pub struct Records<'a, C: Collector> {
    reader: &'a mut MessageReader<C>,
    done: bool,
}

impl<C: Collector> Iterator for Records<'_, C> {
    type Item = Result<Record, IpfixError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn element_option_from_record(record: &Record) -> Option<ElementOptionRecord> {
    use iana::ids::*;
    let get = |id: u16| record.value_by_ident(0, id, 0);
    Some(ElementOptionRecord {
        pen: u32::try_from(get(PRIVATE_ENTERPRISE_NUMBER)?).ok()?,
        id: u16::try_from(get(INFORMATION_ELEMENT_ID)?).ok()?,
        data_type_code: u8::try_from(get(INFORMATION_ELEMENT_DATA_TYPE)?).ok()?,
        semantics_code: u8::try_from(get(INFORMATION_ELEMENT_SEMANTICS)?).ok()?,
        units_code: u16::try_from(get(INFORMATION_ELEMENT_UNITS)?).ok()?,
        range_begin: u64::try_from(get(INFORMATION_ELEMENT_RANGE_BEGIN)?).ok()?,
        range_end: u64::try_from(get(INFORMATION_ELEMENT_RANGE_END)?).ok()?,
        name: String::try_from(get(INFORMATION_ELEMENT_NAME)?).ok()?,
        description: String::try_from(get(INFORMATION_ELEMENT_DESCRIPTION)?).ok()?,
    })
}

fn template_info_from_record(record: &Record) -> Option<(u16, TemplateInfo)> {
    use iana::{CERT_PEN, cert, ids};
    let tid = u16::try_from(record.value_by_ident(0, ids::TEMPLATE_ID, 0)?).ok()?;
    let name =
        String::try_from(record.value_by_ident(CERT_PEN, cert::TEMPLATE_NAME, 0)?).ok()?;
    let description =
        String::try_from(record.value_by_ident(CERT_PEN, cert::TEMPLATE_DESCRIPTION, 0)?).ok()?;
    let application_label = record
        .value_by_ident(CERT_PEN, cert::APPLICATION_LABEL, 0)
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(0);
    let parent_tid = record
        .value_by_ident(CERT_PEN, cert::PARENT_TEMPLATE_ID, 0)
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(0);
    let basic_lists = match record.value_by_ident(0, ids::SUB_TEMPLATE_LIST, 0) {
        Some(FieldValue::SubTemplateList(stl)) => stl
            .records
            .iter()
            .filter_map(basic_list_info_from_record)
            .collect(),
        _ => Vec::new(),
    };
    Some((
        tid,
        TemplateInfo {
            name,
            description,
            application_label,
            parent_tid,
            basic_lists,
        },
    ))
}

fn basic_list_info_from_record(record: &Record) -> Option<BasicListInfo> {
    use iana::ids::*;
    Some(BasicListInfo {
        list_id: u16::try_from(record.value_by_ident(0, INFORMATION_ELEMENT_ID, 0)?).ok()?,
        list_pen: u32::try_from(record.value_by_ident(0, PRIVATE_ENTERPRISE_NUMBER, 0)?).ok()?,
        content_id: u16::try_from(record.value_by_ident(0, INFORMATION_ELEMENT_ID, 1)?).ok()?,
        content_pen: u32::try_from(record.value_by_ident(0, PRIVATE_ENTERPRISE_NUMBER, 1)?)
            .ok()?,
    })
}
