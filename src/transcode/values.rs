//! Per-field wire codec: endian, width, and sign conversion between
//! in-memory values and their on-wire form.

use crate::error::IpfixError;
use crate::model::InfoElement;
use crate::record::FieldValue;
use crate::session::Session;
use crate::time::{duration_from_ntp, ntp_from_duration};
use crate::transcode::{PlanCache, lists};
use crate::types::{DataType, VARLEN};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

/// Reads a varlen length prefix: one octet, or `0xFF` followed by a
/// two-octet length.
pub(crate) fn read_varlen(data: &[u8]) -> Result<(&[u8], usize), IpfixError> {
    let &first = data
        .first()
        .ok_or_else(|| IpfixError::Malformed("truncated varlen length".into()))?;
    let (len, header) = if first < 0xFF {
        (first as usize, 1)
    } else {
        if data.len() < 3 {
            return Err(IpfixError::Malformed("truncated varlen length".into()));
        }
        (BigEndian::read_u16(&data[1..3]) as usize, 3)
    };
    let content = data
        .get(header..header + len)
        .ok_or_else(|| IpfixError::Malformed("truncated varlen payload".into()))?;
    Ok((content, header + len))
}

/// Writes a varlen length prefix: the short form below 255, the
/// three-octet form from 255 up.
pub(crate) fn write_varlen_prefix(out: &mut Vec<u8>, len: usize) -> Result<(), IpfixError> {
    if len > u16::MAX as usize {
        return Err(IpfixError::BufferSize(format!(
            "varlen payload of {len} octets"
        )));
    }
    if len < 255 {
        out.push(len as u8);
    } else {
        out.push(0xFF);
        out.write_u16::<BigEndian>(len as u16)?;
    }
    Ok(())
}

fn fixed<'a>(data: &'a [u8], len: u16, what: &str) -> Result<&'a [u8], IpfixError> {
    data.get(..len as usize)
        .ok_or_else(|| IpfixError::Malformed(format!("truncated {what} field")))
}

/// Decodes one value of `ie` at on-wire length `len` from the front of
/// `data`, returning the value and the octets consumed.
///
/// Integers are widened with zero or sign extension; the structured-data
/// types recurse through the session's template tables.
pub(crate) fn decode_value(
    data: &[u8],
    ie: &Arc<InfoElement>,
    len: u16,
    session: &Session,
) -> Result<(FieldValue, usize), IpfixError> {
    use DataType::*;

    if len == VARLEN {
        let (content, consumed) = read_varlen(data)?;
        let value = match ie.data_type {
            BasicList => lists::decode_basic_list(content, session)?,
            SubTemplateList => lists::decode_sub_template_list(content, session)?,
            SubTemplateMultiList => lists::decode_sub_template_multi_list(content, session)?,
            String => FieldValue::String(std::string::String::from_utf8_lossy(content).into_owned()),
            _ => FieldValue::Bytes(content.to_vec()),
        };
        return Ok((value, consumed));
    }

    let content = fixed(data, len, &ie.name)?;
    let value = match ie.data_type {
        Unsigned8 | Unsigned16 | Unsigned32 | Unsigned64 => {
            FieldValue::Unsigned(BigEndian::read_uint(content, content.len()))
        }
        Signed8 | Signed16 | Signed32 | Signed64 => {
            FieldValue::Signed(BigEndian::read_int(content, content.len()))
        }
        Float32 => FieldValue::Float(BigEndian::read_f32(content) as f64),
        Float64 => {
            if content.len() == 4 {
                FieldValue::Float(BigEndian::read_f32(content) as f64)
            } else {
                FieldValue::Float(BigEndian::read_f64(content))
            }
        }
        Boolean => FieldValue::Boolean(content[0] == 1),
        MacAddress => {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(content);
            FieldValue::MacAddr(mac)
        }
        Ipv4Address => {
            let octets: [u8; 4] = content
                .try_into()
                .map_err(|_| IpfixError::Malformed("bad ipv4Address length".into()))?;
            FieldValue::Ip4Addr(Ipv4Addr::from(octets))
        }
        Ipv6Address => {
            let octets: [u8; 16] = content
                .try_into()
                .map_err(|_| IpfixError::Malformed("bad ipv6Address length".into()))?;
            FieldValue::Ip6Addr(Ipv6Addr::from(octets))
        }
        DateTimeSeconds => {
            FieldValue::DateTime(Duration::from_secs(BigEndian::read_u32(content) as u64))
        }
        DateTimeMilliseconds => {
            FieldValue::DateTime(Duration::from_millis(BigEndian::read_u64(content)))
        }
        DateTimeMicroseconds => {
            FieldValue::DateTime(duration_from_ntp(BigEndian::read_u64(content), true))
        }
        DateTimeNanoseconds => {
            FieldValue::DateTime(duration_from_ntp(BigEndian::read_u64(content), false))
        }
        String => {
            // fixed-length strings are NUL padded on the wire
            let end = content
                .iter()
                .rposition(|&b| b != 0)
                .map_or(0, |i| i + 1);
            FieldValue::String(std::string::String::from_utf8_lossy(&content[..end]).into_owned())
        }
        OctetArray => FieldValue::Bytes(content.to_vec()),
        BasicList | SubTemplateList | SubTemplateMultiList => {
            return Err(IpfixError::Malformed(format!(
                "list element {} with fixed length",
                ie.name
            )));
        }
    };
    Ok((value, len as usize))
}

fn truncate_unsigned(v: u64, len: usize) -> u64 {
    if len >= 8 { v } else { v & ((1u64 << (len * 8)) - 1) }
}

/// Encodes one value at on-wire length `len`, appending to `out`.
///
/// Narrower destinations truncate toward the low-order octets; fixed
/// string/octetArray fields are zero padded or truncated to length.
pub(crate) fn encode_value(
    out: &mut Vec<u8>,
    value: &FieldValue,
    ie: &Arc<InfoElement>,
    len: u16,
    session: &Session,
    plans: &mut PlanCache,
) -> Result<(), IpfixError> {
    use DataType::*;

    match (ie.data_type, value) {
        (Unsigned8 | Unsigned16 | Unsigned32 | Unsigned64, FieldValue::Unsigned(v)) => {
            out.write_uint::<BigEndian>(truncate_unsigned(*v, len as usize), len as usize)?;
        }
        (Signed8 | Signed16 | Signed32 | Signed64, FieldValue::Signed(v)) => {
            // low-order truncation preserves the two's-complement pattern
            out.write_uint::<BigEndian>(truncate_unsigned(*v as u64, len as usize), len as usize)?;
        }
        (Float32, FieldValue::Float(v)) => out.write_f32::<BigEndian>(*v as f32)?,
        (Float64, FieldValue::Float(v)) => {
            if len == 4 {
                out.write_f32::<BigEndian>(*v as f32)?;
            } else {
                out.write_f64::<BigEndian>(*v)?;
            }
        }
        (Boolean, FieldValue::Boolean(v)) => out.push(if *v { 1 } else { 2 }),
        (MacAddress, FieldValue::MacAddr(mac)) => out.extend_from_slice(mac),
        (Ipv4Address, FieldValue::Ip4Addr(ip)) => out.extend_from_slice(&ip.octets()),
        (Ipv6Address, FieldValue::Ip6Addr(ip)) => out.extend_from_slice(&ip.octets()),
        (DateTimeSeconds, FieldValue::DateTime(d)) => {
            out.write_u32::<BigEndian>(d.as_secs() as u32)?;
        }
        (DateTimeMilliseconds, FieldValue::DateTime(d)) => {
            out.write_u64::<BigEndian>(d.as_millis() as u64)?;
        }
        (DateTimeMicroseconds, FieldValue::DateTime(d)) => {
            out.write_u64::<BigEndian>(ntp_from_duration(*d, true))?;
        }
        (DateTimeNanoseconds, FieldValue::DateTime(d)) => {
            out.write_u64::<BigEndian>(ntp_from_duration(*d, false))?;
        }
        (String, FieldValue::String(s)) => encode_octets(out, s.as_bytes(), len)?,
        (OctetArray, FieldValue::Bytes(b)) => encode_octets(out, b, len)?,
        (BasicList, FieldValue::BasicList(list)) => {
            let payload = lists::encode_basic_list(list, session, plans)?;
            write_list_wrapper(out, &payload)?;
        }
        (SubTemplateList, FieldValue::SubTemplateList(list)) => {
            let payload = lists::encode_sub_template_list(list, session, plans)?;
            write_list_wrapper(out, &payload)?;
        }
        (SubTemplateMultiList, FieldValue::SubTemplateMultiList(list)) => {
            let payload = lists::encode_sub_template_multi_list(list, session, plans)?;
            write_list_wrapper(out, &payload)?;
        }
        (dt, v) => {
            return Err(IpfixError::Unsupported(format!(
                "cannot encode {v:?} as {dt:?}"
            )));
        }
    }
    Ok(())
}

fn encode_octets(out: &mut Vec<u8>, bytes: &[u8], len: u16) -> Result<(), IpfixError> {
    if len == VARLEN {
        write_varlen_prefix(out, bytes.len())?;
        out.extend_from_slice(bytes);
    } else {
        let len = len as usize;
        let take = bytes.len().min(len);
        out.extend_from_slice(&bytes[..take]);
        out.resize(out.len() + (len - take), 0);
    }
    Ok(())
}

/// List wrappers always use the three-octet length form so the length can
/// be patched after the payload is known.
fn write_list_wrapper(out: &mut Vec<u8>, payload: &[u8]) -> Result<(), IpfixError> {
    if payload.len() > u16::MAX as usize {
        return Err(IpfixError::BufferSize(format!(
            "list payload of {} octets",
            payload.len()
        )));
    }
    out.push(0xFF);
    out.write_u16::<BigEndian>(payload.len() as u16)?;
    out.extend_from_slice(payload);
    Ok(())
}
