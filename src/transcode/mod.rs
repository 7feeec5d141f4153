//! The transcoder: projects records between template layouts.
//!
//! Decoding parses a wire record through its *external* (wire) template
//! and projects the values into the caller's *internal* template;
//! encoding runs the same projection in reverse. The projection is driven
//! by a [`TranscodePlan`] matching destination fields to source fields by
//! canonical element identity and repeat index. Plans are cached per
//! message buffer in a bounded LRU keyed by the templates' unique ids.

pub(crate) mod lists;
pub(crate) mod values;

use crate::error::IpfixError;
use crate::record::{FieldValue, Record};
use crate::session::Session;
use crate::template::Template;
use crate::types::VARLEN;

use lru::LruCache;

use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cached plans per buffer. Sized generously; plans are small.
const PLAN_CACHE_CAPACITY: usize = 64;

/// For each destination field, the source field position carrying the same
/// canonical element at the same repeat index, if any.
#[derive(Debug, Clone)]
pub(crate) struct TranscodePlan {
    src_idx: Vec<Option<usize>>,
}

impl TranscodePlan {
    /// Builds the plan for a (source, destination) template pair.
    ///
    /// Matched string/octetArray fields must agree on fixed-versus-varlen
    /// encoding; converting between the two is not supported.
    pub(crate) fn build(src: &Template, dst: &Template) -> Result<Self, IpfixError> {
        let src_idx = dst
            .fields()
            .iter()
            .map(|df| {
                let found = src.position_of_ident(df.ie.pen, df.ie.id, df.midx as usize);
                if let Some(i) = found {
                    let sf = &src.fields()[i];
                    if df.ie.data_type.is_octet_like()
                        && (sf.len == VARLEN) != (df.len == VARLEN)
                    {
                        return Err(IpfixError::Unsupported(format!(
                            "fixed/variable length conversion for {}",
                            df.ie.name
                        )));
                    }
                }
                Ok(found)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { src_idx })
    }

    pub(crate) fn source_of(&self, dst_field: usize) -> Option<usize> {
        self.src_idx[dst_field]
    }
}

/// Bounded LRU of transcode plans keyed by (source uid, destination uid).
///
/// Template uids are never reused within a process, so a stale entry can
/// never be mistaken for a plan of a new template; it simply ages out.
pub(crate) struct PlanCache {
    cache: LruCache<(u64, u64), Arc<TranscodePlan>>,
}

impl PlanCache {
    pub(crate) fn new() -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(PLAN_CACHE_CAPACITY).unwrap()),
        }
    }

    pub(crate) fn plan_for(
        &mut self,
        src: &Arc<Template>,
        dst: &Arc<Template>,
    ) -> Result<Arc<TranscodePlan>, IpfixError> {
        let key = (src.uid(), dst.uid());
        if let Some(plan) = self.cache.get(&key) {
            return Ok(Arc::clone(plan));
        }
        let plan = Arc::new(TranscodePlan::build(src, dst)?);
        self.cache.put(key, Arc::clone(&plan));
        Ok(plan)
    }

    /// Drops every cached plan involving the given template.
    pub(crate) fn remove_template(&mut self, uid: u64) {
        let stale: Vec<(u64, u64)> = self
            .cache
            .iter()
            .map(|(k, _)| *k)
            .filter(|(s, d)| *s == uid || *d == uid)
            .collect();
        for key in stale {
            self.cache.pop(&key);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }
}

/// Decodes one wire record laid out by `ext` into a record laid out by
/// `int`, returning the record and the octets consumed.
///
/// Every source field is parsed (the wire must be walked even for dropped
/// fields); internal fields with no source are zero filled.
pub(crate) fn decode_record(
    data: &[u8],
    tid: u16,
    ext: &Arc<Template>,
    int: &Arc<Template>,
    plan: &TranscodePlan,
    session: &Session,
) -> Result<(Record, usize), IpfixError> {
    let mut pos = 0usize;
    let mut src_values: Vec<Option<FieldValue>> = Vec::with_capacity(ext.field_count());
    for field in ext.fields() {
        let (value, used) = values::decode_value(&data[pos..], &field.ie, field.len, session)?;
        pos += used;
        src_values.push(Some(value));
    }

    let values = int
        .fields()
        .iter()
        .enumerate()
        .map(|(j, field)| match plan.source_of(j) {
            Some(i) => src_values[i]
                .take()
                .unwrap_or_else(|| FieldValue::zero(field.ie.data_type)),
            None => FieldValue::zero(field.ie.data_type),
        })
        .collect();

    Ok((Record::from_values(int, tid, values), pos))
}

/// Encodes a record through the wire layout of `ext`, appending to `out`.
/// Wire fields with no source in the record encode as their type's zero.
pub(crate) fn encode_record(
    out: &mut Vec<u8>,
    record: &Record,
    ext: &Arc<Template>,
    plan: &TranscodePlan,
    session: &Session,
    plans: &mut PlanCache,
) -> Result<(), IpfixError> {
    for (i, field) in ext.fields().iter().enumerate() {
        match plan.source_of(i) {
            Some(j) => values::encode_value(
                out,
                &record.values()[j],
                &field.ie,
                field.len,
                session,
                plans,
            )?,
            None => {
                let zero = FieldValue::zero(field.ie.data_type);
                values::encode_value(out, &zero, &field.ie, field.len, session, plans)?;
            }
        }
    }
    Ok(())
}
