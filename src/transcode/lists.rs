//! RFC 6313 structured data: basicList, subTemplateList, and
//! subTemplateMultiList bodies.
//!
//! List payloads travel inside a varlen wrapper handled by the caller;
//! this module codes the payload itself. Sub-template resolution goes
//! through the session's template tables and pair map; the templates in
//! play are passed down the recursion as parameters rather than swapped in
//! and out of buffer state.

use crate::error::IpfixError;
use crate::record::{BasicList, FieldValue, MultiListEntry, Record, SubTemplateList, SubTemplateMultiList};
use crate::session::Session;
use crate::template::Template;
use crate::transcode::{PlanCache, TranscodePlan, decode_record, values};
use crate::types::{ENTERPRISE_BIT, VARLEN};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::warn;

use std::sync::Arc;

/// Decodes a basicList payload: semantic, content element specifier, then
/// uniform values filling the payload.
pub(crate) fn decode_basic_list(
    content: &[u8],
    session: &Session,
) -> Result<FieldValue, IpfixError> {
    if content.is_empty() {
        return Ok(FieldValue::BasicList(BasicList::default()));
    }
    if content.len() < 5 {
        return Err(IpfixError::Malformed("short basicList header".into()));
    }
    let semantic = content[0];
    let raw_id = BigEndian::read_u16(&content[1..3]);
    let element_len = BigEndian::read_u16(&content[3..5]);
    let (pen, body_start) = if raw_id & ENTERPRISE_BIT != 0 {
        if content.len() < 9 {
            return Err(IpfixError::Malformed("short basicList header".into()));
        }
        (BigEndian::read_u32(&content[5..9]), 9)
    } else {
        (0, 5)
    };
    if element_len == 0 {
        return Err(IpfixError::Malformed("basicList element length 0".into()));
    }
    let id = raw_id & !ENTERPRISE_BIT;
    let element = match session.model().get_by_ident(pen, id) {
        Some(ie) => ie,
        None => session.model().add_alien(pen, id, element_len),
    };
    // wire-declared content lengths are unvalidated until here
    crate::template::check_types_size(element.data_type, element_len, element.default_len)
        .map_err(|_| {
            IpfixError::Malformed(format!(
                "basicList element length {element_len} invalid for {}",
                element.name
            ))
        })?;

    let mut list = BasicList::new(semantic, Arc::clone(&element), element_len);
    let mut rest = &content[body_start..];
    if element_len == VARLEN {
        while !rest.is_empty() {
            let (value, used) = values::decode_value(rest, &element, VARLEN, session)?;
            list.values.push(value);
            rest = &rest[used..];
        }
    } else {
        let count = rest.len() / element_len as usize;
        for _ in 0..count {
            let (value, used) = values::decode_value(rest, &element, element_len, session)?;
            list.values.push(value);
            rest = &rest[used..];
        }
    }
    Ok(FieldValue::BasicList(list))
}

/// Encodes a basicList payload. An empty list with no content element
/// encodes as zero octets.
pub(crate) fn encode_basic_list(
    list: &BasicList,
    session: &Session,
    plans: &mut PlanCache,
) -> Result<Vec<u8>, IpfixError> {
    let Some(element) = &list.element else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    out.push(list.semantic);
    let raw_id = if element.pen != 0 {
        element.id | ENTERPRISE_BIT
    } else {
        element.id
    };
    out.write_u16::<BigEndian>(raw_id)?;
    out.write_u16::<BigEndian>(list.element_len)?;
    if element.pen != 0 {
        out.write_u32::<BigEndian>(element.pen)?;
    }
    for value in &list.values {
        values::encode_value(&mut out, value, element, list.element_len, session, plans)?;
    }
    Ok(out)
}

/// Resolves the (external, internal) template pair for a sub-template id.
/// `None` means the list body cannot be decoded and should be skipped.
fn resolve_sub_templates(
    session: &Session,
    tid: u16,
) -> Option<(Arc<Template>, Arc<Template>)> {
    let Some(ext) = session.external_template(tid) else {
        warn!("unknown external template {tid} in structured data; skipping list body");
        return None;
    };
    let pair = session.lookup_template_pair(tid);
    if pair == 0 {
        return None;
    }
    let int = match session.internal_template(pair) {
        Some(int) => int,
        None if pair == tid => Arc::clone(&ext),
        None => {
            warn!("no internal template {pair} paired with {tid}; skipping list body");
            return None;
        }
    };
    Some((ext, int))
}

fn decode_sub_records(
    mut rest: &[u8],
    tid: u16,
    ext: &Arc<Template>,
    int: &Arc<Template>,
    session: &Session,
) -> Result<Vec<Record>, IpfixError> {
    let plan = TranscodePlan::build(ext, int)?;
    let mut records = Vec::new();
    if ext.record_len() == 0 {
        return Ok(records);
    }
    while rest.len() >= ext.record_len() {
        let (record, used) = decode_record(rest, tid, ext, int, &plan, session)?;
        records.push(record);
        rest = &rest[used..];
    }
    Ok(records)
}

/// Decodes a subTemplateList payload: semantic, template id, then records.
///
/// An unknown external template produces a warning and an empty list; the
/// stream keeps going.
pub(crate) fn decode_sub_template_list(
    content: &[u8],
    session: &Session,
) -> Result<FieldValue, IpfixError> {
    if content.is_empty() {
        return Ok(FieldValue::SubTemplateList(SubTemplateList::default()));
    }
    if content.len() < 3 {
        return Err(IpfixError::Malformed("short subTemplateList header".into()));
    }
    let semantic = content[0];
    let tid = BigEndian::read_u16(&content[1..3]);
    let mut list = SubTemplateList::new(semantic, tid);
    if let Some((ext, int)) = resolve_sub_templates(session, tid) {
        list.records = decode_sub_records(&content[3..], tid, &ext, &int, session)?;
    }
    Ok(FieldValue::SubTemplateList(list))
}

/// Encodes a subTemplateList payload through the session's external
/// template for the list's template id.
pub(crate) fn encode_sub_template_list(
    list: &SubTemplateList,
    session: &Session,
    plans: &mut PlanCache,
) -> Result<Vec<u8>, IpfixError> {
    if list.tid == 0 && list.records.is_empty() {
        return Ok(Vec::new());
    }
    let ext = session.external_template(list.tid).ok_or_else(|| {
        IpfixError::Template(format!("unknown template {} for subTemplateList", list.tid))
    })?;
    let mut out = Vec::new();
    out.push(list.semantic);
    out.write_u16::<BigEndian>(list.tid)?;
    encode_sub_records(&mut out, &list.records, &ext, session, plans)?;
    Ok(out)
}

fn encode_sub_records(
    out: &mut Vec<u8>,
    records: &[Record],
    ext: &Arc<Template>,
    session: &Session,
    plans: &mut PlanCache,
) -> Result<(), IpfixError> {
    for record in records {
        let plan = plans.plan_for(record.template(), ext)?;
        crate::transcode::encode_record(out, record, ext, &plan, session, plans)?;
    }
    Ok(())
}

/// Decodes a subTemplateMultiList payload: semantic, then entries of
/// (template id, entry length, records). An entry length below the 4-octet
/// entry header is a wire error and aborts the list.
pub(crate) fn decode_sub_template_multi_list(
    content: &[u8],
    session: &Session,
) -> Result<FieldValue, IpfixError> {
    if content.is_empty() {
        return Ok(FieldValue::SubTemplateMultiList(
            SubTemplateMultiList::default(),
        ));
    }
    let mut list = SubTemplateMultiList::new(content[0]);
    let mut rest = &content[1..];
    while rest.len() >= 4 {
        let tid = BigEndian::read_u16(&rest[..2]);
        let entry_len = BigEndian::read_u16(&rest[2..4]) as usize;
        if entry_len < 4 {
            return Err(IpfixError::Malformed(format!(
                "subTemplateMultiList entry length {entry_len}"
            )));
        }
        let body = rest.get(4..entry_len).ok_or_else(|| {
            IpfixError::Malformed("truncated subTemplateMultiList entry".into())
        })?;
        let records = match resolve_sub_templates(session, tid) {
            Some((ext, int)) => decode_sub_records(body, tid, &ext, &int, session)?,
            None => Vec::new(),
        };
        list.entries.push(MultiListEntry { tid, records });
        rest = &rest[entry_len..];
    }
    Ok(FieldValue::SubTemplateMultiList(list))
}

/// Encodes a subTemplateMultiList payload, one length-prefixed entry per
/// [`MultiListEntry`].
pub(crate) fn encode_sub_template_multi_list(
    list: &SubTemplateMultiList,
    session: &Session,
    plans: &mut PlanCache,
) -> Result<Vec<u8>, IpfixError> {
    if list.entries.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    out.push(list.semantic);
    for entry in &list.entries {
        let ext = session.external_template(entry.tid).ok_or_else(|| {
            IpfixError::Template(format!(
                "unknown template {} for subTemplateMultiList entry",
                entry.tid
            ))
        })?;
        let mut body = Vec::new();
        encode_sub_records(&mut body, &entry.records, &ext, session, plans)?;
        let entry_len = body.len() + 4;
        if entry_len > u16::MAX as usize {
            return Err(IpfixError::BufferSize(format!(
                "subTemplateMultiList entry of {entry_len} octets"
            )));
        }
        out.write_u16::<BigEndian>(entry.tid)?;
        out.write_u16::<BigEndian>(entry_len as u16)?;
        out.extend_from_slice(&body);
    }
    Ok(out)
}
