//! Templates: ordered information element references declaring a record
//! layout.
//!
//! A template is built by appending fields, validated against the type
//! system as it grows, and frozen by handing it to a
//! [`Session`](crate::session::Session) (which stores it behind an `Arc`).
//! The engine also provides equivalence and set comparison, field search,
//! and detection of the well-known metadata shapes consumed internally by
//! the collector.

use crate::error::IpfixError;
use crate::model::{InfoElement, InfoModel, iana};
use crate::types::{DataType, MAX_TEMPLATE_FIELDS, PADDING_IDENT, VARLEN};

use serde::ser::{Serialize, SerializeMap, Serializer};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_TEMPLATE_UID: AtomicU64 = AtomicU64::new(1);

/// One information element reference at a position in a template.
#[derive(Debug, Clone)]
pub struct TemplateField {
    /// Canonical element definition.
    pub ie: Arc<InfoElement>,
    /// On-wire length in octets; may be shorter than the element default
    /// for reduced-length integers, or [`VARLEN`].
    pub len: u16,
    /// 0-based repeat index among occurrences of the same element in this
    /// template.
    pub midx: u16,
    /// Octet offset of this field in a fixed-layout record: the sum of the
    /// slot lengths of all prior fields. Directly usable as a wire offset
    /// when the template has no variable-length fields.
    pub offset: usize,
}

impl TemplateField {
    /// Octets this field contributes to the minimal record layout: its
    /// length, or 1 for a variable-length field (the shortest encoding).
    pub fn slot_len(&self) -> usize {
        if self.len == VARLEN { 1 } else { self.len as usize }
    }

    /// Octets of this field's specifier in a template record: 4, or 8 with
    /// an enterprise number.
    pub fn spec_wire_len(&self) -> usize {
        if self.ie.pen != 0 { 8 } else { 4 }
    }

    pub fn is_padding(&self) -> bool {
        self.ie.ident() == PADDING_IDENT
    }

    fn cmp_key(&self, with_len: bool) -> (u32, u16, u16) {
        (self.ie.pen, self.ie.id, if with_len { self.len } else { 0 })
    }
}

impl Serialize for TemplateField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("name", &self.ie.name)?;
        map.serialize_entry("ident", &self.ie.ident())?;
        map.serialize_entry("len", &self.len)?;
        map.serialize_entry("midx", &self.midx)?;
        map.end()
    }
}

/// Relation of two templates under multiset comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetRelation {
    Equal,
    Subset,
    Superset,
    Common,
    Disjoint,
}

/// Options for [`Template::compare_set`] and [`Template::compare_ordered`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareFlags {
    /// Skip paddingOctets fields on both sides.
    pub ignore_padding: bool,
    /// Compare element identities only, not on-wire lengths.
    pub ignore_lengths: bool,
    /// Do not compare scope counts (ordered comparison only).
    pub ignore_scope: bool,
}

/// Well-known option-record shapes the collector consumes internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataShape {
    /// RFC 5610 information element description.
    ElementInfo,
    /// Template name/description record.
    TemplateInfoV1,
    /// Template metadata with parent, application label, and a
    /// subTemplateList of basicList content descriptions.
    TemplateInfoV3,
    /// Content-type description for one basicList field.
    BasicListInfo,
}

/// An ordered field list declaring a record layout.
///
/// # Examples
///
/// ```rust
/// use ipfix_codec::model::InfoModel;
/// use ipfix_codec::template::Template;
///
/// let model = InfoModel::new();
/// let mut tmpl = Template::new();
/// tmpl.push_named(&model, "sourceIPv4Address", 4).unwrap();
/// tmpl.push_named(&model, "destinationIPv4Address", 4).unwrap();
/// tmpl.push_named(&model, "octetDeltaCount", 8).unwrap();
/// assert_eq!(tmpl.record_len(), 16);
/// ```
#[derive(Debug)]
pub struct Template {
    uid: u64,
    fields: Vec<TemplateField>,
    scope_count: u16,
    scope_set: bool,
    record_len: usize,
    spec_len: usize,
    is_varlen: bool,
    contains_list: bool,
    default_length: bool,
    ident_counts: HashMap<(u32, u16), u16>,
    bl_positions: Vec<usize>,
    stl_positions: Vec<usize>,
    stml_positions: Vec<usize>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

// clones get their own uid so a mutated copy can never alias the
// original's cached transcode plans
impl Clone for Template {
    fn clone(&self) -> Self {
        Self {
            uid: NEXT_TEMPLATE_UID.fetch_add(1, AtomicOrdering::Relaxed),
            fields: self.fields.clone(),
            scope_count: self.scope_count,
            scope_set: self.scope_set,
            record_len: self.record_len,
            spec_len: self.spec_len,
            is_varlen: self.is_varlen,
            contains_list: self.contains_list,
            default_length: self.default_length,
            ident_counts: self.ident_counts.clone(),
            bl_positions: self.bl_positions.clone(),
            stl_positions: self.stl_positions.clone(),
            stml_positions: self.stml_positions.clone(),
        }
    }
}

impl Template {
    pub fn new() -> Self {
        Self {
            uid: NEXT_TEMPLATE_UID.fetch_add(1, AtomicOrdering::Relaxed),
            fields: Vec::new(),
            scope_count: 0,
            scope_set: false,
            record_len: 0,
            spec_len: 0,
            is_varlen: false,
            contains_list: false,
            default_length: false,
            ident_counts: HashMap::new(),
            bl_positions: Vec::new(),
            stl_positions: Vec::new(),
            stml_positions: Vec::new(),
        }
    }

    /// Process-unique handle, stable for the template's lifetime. Used to
    /// key transcode plan caches.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&TemplateField> {
        self.fields.get(idx)
    }

    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    /// Number of leading scope fields; 0 for a data template.
    pub fn scope_count(&self) -> u16 {
        self.scope_count
    }

    pub fn is_options(&self) -> bool {
        self.scope_count > 0
    }

    /// Octets of a minimal data record for this template: fixed lengths
    /// plus one octet per variable-length slot. A data set with fewer
    /// remaining octets than this holds only padding.
    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// Octets of this template's definition record on the wire, including
    /// the record header.
    pub fn def_wire_len(&self) -> usize {
        let header = if self.is_options() { 6 } else { 4 };
        header + self.spec_len
    }

    pub fn is_varlen(&self) -> bool {
        self.is_varlen
    }

    pub fn contains_list(&self) -> bool {
        self.contains_list
    }

    /// True when any field was appended with a defaulted (length 0 in the
    /// spec) rather than explicit length. Such templates are rejected as
    /// internal templates.
    pub fn uses_default_lengths(&self) -> bool {
        self.default_length
    }

    /// Positions of basicList-typed fields.
    pub fn basic_list_positions(&self) -> &[usize] {
        &self.bl_positions
    }

    /// Positions of subTemplateList-typed fields.
    pub fn sub_template_list_positions(&self) -> &[usize] {
        &self.stl_positions
    }

    /// Positions of subTemplateMultiList-typed fields.
    pub fn sub_template_multi_list_positions(&self) -> &[usize] {
        &self.stml_positions
    }

    /// Appends a field by element name. Length 0 selects the element's
    /// default length and marks the template as defaulted-length.
    pub fn push_named(
        &mut self,
        model: &InfoModel,
        name: &str,
        len: u16,
    ) -> Result<(), IpfixError> {
        let ie = model
            .get_by_name(name)
            .ok_or_else(|| IpfixError::NoElement(name.to_string()))?;
        self.push_resolved(ie, len)
    }

    /// Appends a field by element identity. Length 0 selects the default.
    pub fn push_ident(
        &mut self,
        model: &InfoModel,
        pen: u32,
        id: u16,
        len: u16,
    ) -> Result<(), IpfixError> {
        let ie = model
            .get_by_ident(pen, id)
            .ok_or_else(|| IpfixError::NoElement(format!("({pen}, {id})")))?;
        self.push_resolved(ie, len)
    }

    /// Appends a field for an already-resolved element. Length 0 selects
    /// the default.
    pub fn push_element(&mut self, ie: &Arc<InfoElement>, len: u16) -> Result<(), IpfixError> {
        self.push_resolved(Arc::clone(ie), len)
    }

    fn push_resolved(&mut self, ie: Arc<InfoElement>, len: u16) -> Result<(), IpfixError> {
        // length 0 in a spec always means "use the element default"; a
        // zero-length octetArray field must come from the wire path
        if len == 0 {
            self.push_field(ie, 0, true)
        } else {
            self.push_field(ie, len, false)
        }
    }

    /// Appends a field as observed in a wire template record: the identity
    /// resolves through the model, unknown identities become alien
    /// elements, and the length is always explicit.
    pub(crate) fn push_wire(
        &mut self,
        model: &InfoModel,
        pen: u32,
        id: u16,
        len: u16,
    ) -> Result<(), IpfixError> {
        let ie = match model.get_by_ident(pen, id) {
            Some(ie) => ie,
            None => model.add_alien(pen, id, len),
        };
        self.push_field(ie, len, false)
    }

    fn push_field(
        &mut self,
        ie: Arc<InfoElement>,
        len: u16,
        defaulted: bool,
    ) -> Result<(), IpfixError> {
        if self.fields.len() >= MAX_TEMPLATE_FIELDS {
            return Err(IpfixError::Template(format!(
                "template full: {} fields",
                self.fields.len()
            )));
        }
        let len = if defaulted { ie.default_len } else { len };
        check_types_size(ie.data_type, len, ie.default_len)?;

        let slot = if len == VARLEN { 1 } else { len as usize };
        let spec = if ie.pen != 0 { 8 } else { 4 };
        // the +6 leaves room for the record header and a scope count
        if self.record_len + slot > u16::MAX as usize
            || self.spec_len + spec + 6 > u16::MAX as usize
        {
            return Err(IpfixError::Template("template size overflow".into()));
        }

        let count = self.ident_counts.entry(ie.ident()).or_insert(0);
        let midx = *count;
        *count += 1;
        let idx = self.fields.len();
        match ie.data_type {
            DataType::BasicList => self.bl_positions.push(idx),
            DataType::SubTemplateList => self.stl_positions.push(idx),
            DataType::SubTemplateMultiList => self.stml_positions.push(idx),
            _ => {}
        }
        self.is_varlen |= len == VARLEN;
        self.contains_list |= ie.data_type.is_list();
        self.default_length |= defaulted;
        self.fields.push(TemplateField {
            ie,
            len,
            midx,
            offset: self.record_len,
        });
        self.record_len += slot;
        self.spec_len += spec;
        Ok(())
    }

    /// Declares the first `count` fields as scope, turning this into an
    /// options template. May be called once, before the template is handed
    /// to a session. `count == 0` is the legacy spelling of "every field
    /// is scope".
    pub fn set_options_scope(&mut self, count: u16) -> Result<(), IpfixError> {
        if self.scope_set {
            return Err(IpfixError::Template("scope already set".into()));
        }
        if count as usize > self.fields.len() {
            return Err(IpfixError::Template(format!(
                "scope count {count} exceeds field count {}",
                self.fields.len()
            )));
        }
        self.scope_count = if count == 0 {
            self.fields.len() as u16
        } else {
            count
        };
        self.scope_set = true;
        Ok(())
    }

    /// Exact equivalence: field counts, scope, layout lengths, and
    /// per-position element identity and length all match.
    pub fn equals(&self, other: &Template) -> bool {
        self.fields.len() == other.fields.len()
            && self.scope_count == other.scope_count
            && self.record_len == other.record_len
            && self.def_wire_len() == other.def_wire_len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.ie.ident() == b.ie.ident() && a.len == b.len)
    }

    /// Multiset comparison of the two field lists, keyed by element
    /// identity and (unless `flags.ignore_lengths`) on-wire length.
    pub fn compare_set(&self, other: &Template, flags: CompareFlags) -> SetRelation {
        let keys = |t: &Template| {
            let mut keys: Vec<(u32, u16, u16)> = t
                .fields
                .iter()
                .filter(|f| !(flags.ignore_padding && f.is_padding()))
                .map(|f| f.cmp_key(!flags.ignore_lengths))
                .collect();
            keys.sort();
            keys
        };
        let a = keys(self);
        let b = keys(other);

        let mut matched = 0usize;
        let (mut i, mut j) = (0usize, 0usize);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {
                    matched += 1;
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }

        if matched == a.len() && matched == b.len() {
            SetRelation::Equal
        } else if matched == a.len() {
            SetRelation::Subset
        } else if matched == b.len() {
            SetRelation::Superset
        } else if matched > 0 {
            SetRelation::Common
        } else {
            SetRelation::Disjoint
        }
    }

    /// Positional comparison, total-ordering the two templates by their
    /// first differing field (then by field count, then scope count).
    pub fn compare_ordered(&self, other: &Template, flags: CompareFlags) -> Ordering {
        let mut a = self
            .fields
            .iter()
            .filter(|f| !(flags.ignore_padding && f.is_padding()));
        let mut b = other
            .fields
            .iter()
            .filter(|f| !(flags.ignore_padding && f.is_padding()));
        loop {
            match (a.next(), b.next()) {
                (Some(fa), Some(fb)) => {
                    let ord = fa
                        .cmp_key(!flags.ignore_lengths)
                        .cmp(&fb.cmp_key(!flags.ignore_lengths));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (None, None) => break,
            }
        }
        if flags.ignore_scope {
            Ordering::Equal
        } else {
            self.scope_count.cmp(&other.scope_count)
        }
    }

    /// Position of the `skip`-th occurrence of `ie`.
    pub fn position_of(&self, ie: &InfoElement, skip: usize) -> Option<usize> {
        self.position_of_ident(ie.pen, ie.id, skip)
    }

    /// Position of the `skip`-th occurrence of the element with the given
    /// identity. Identities are compared directly, so elements unknown to
    /// the model (aliens) also match.
    pub fn position_of_ident(&self, pen: u32, id: u16, skip: usize) -> Option<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.ie.ident() == (pen, id))
            .nth(skip)
            .map(|(i, _)| i)
    }

    /// True when this template has exactly the given identity sequence,
    /// padding fields skipped.
    fn idents_are(&self, expected: &[(u32, u16)]) -> bool {
        let mut it = self.fields.iter().filter(|f| !f.is_padding());
        for want in expected {
            match it.next() {
                Some(f) if f.ie.ident() == *want => {}
                _ => return false,
            }
        }
        it.next().is_none()
    }

    /// Detects whether this template conforms to one of the well-known
    /// metadata shapes.
    pub fn metadata_shape(&self) -> Option<MetadataShape> {
        use iana::{CERT_PEN, cert, ids};
        const ELEMENT_INFO: [(u32, u16); 9] = [
            (0, ids::PRIVATE_ENTERPRISE_NUMBER),
            (0, ids::INFORMATION_ELEMENT_ID),
            (0, ids::INFORMATION_ELEMENT_DATA_TYPE),
            (0, ids::INFORMATION_ELEMENT_SEMANTICS),
            (0, ids::INFORMATION_ELEMENT_UNITS),
            (0, ids::INFORMATION_ELEMENT_RANGE_BEGIN),
            (0, ids::INFORMATION_ELEMENT_RANGE_END),
            (0, ids::INFORMATION_ELEMENT_NAME),
            (0, ids::INFORMATION_ELEMENT_DESCRIPTION),
        ];
        const TEMPLATE_INFO_V1: [(u32, u16); 3] = [
            (0, ids::TEMPLATE_ID),
            (CERT_PEN, cert::TEMPLATE_NAME),
            (CERT_PEN, cert::TEMPLATE_DESCRIPTION),
        ];
        const TEMPLATE_INFO_V3: [(u32, u16); 6] = [
            (0, ids::TEMPLATE_ID),
            (CERT_PEN, cert::PARENT_TEMPLATE_ID),
            (CERT_PEN, cert::APPLICATION_LABEL),
            (CERT_PEN, cert::TEMPLATE_NAME),
            (CERT_PEN, cert::TEMPLATE_DESCRIPTION),
            (0, ids::SUB_TEMPLATE_LIST),
        ];
        const BASIC_LIST_INFO: [(u32, u16); 4] = [
            (0, ids::INFORMATION_ELEMENT_ID),
            (0, ids::PRIVATE_ENTERPRISE_NUMBER),
            (0, ids::INFORMATION_ELEMENT_ID),
            (0, ids::PRIVATE_ENTERPRISE_NUMBER),
        ];

        if self.scope_count == 2 && self.idents_are(&ELEMENT_INFO) {
            Some(MetadataShape::ElementInfo)
        } else if self.scope_count == 1 && self.idents_are(&TEMPLATE_INFO_V1) {
            Some(MetadataShape::TemplateInfoV1)
        } else if self.scope_count == 1 && self.idents_are(&TEMPLATE_INFO_V3) {
            Some(MetadataShape::TemplateInfoV3)
        } else if self.scope_count == 0 && self.idents_are(&BASIC_LIST_INFO) {
            Some(MetadataShape::BasicListInfo)
        } else {
            None
        }
    }

    /// The canonical RFC 5610 element description template (scope 2).
    pub fn element_info(model: &InfoModel) -> Result<Template, IpfixError> {
        use iana::ids::*;
        let mut t = Template::new();
        t.push_ident(model, 0, PRIVATE_ENTERPRISE_NUMBER, 4)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_ID, 2)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_DATA_TYPE, 1)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_SEMANTICS, 1)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_UNITS, 2)?;
        t.push_ident(model, 0, PADDING_OCTETS, 6)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_RANGE_BEGIN, 8)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_RANGE_END, 8)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_NAME, VARLEN)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_DESCRIPTION, VARLEN)?;
        t.set_options_scope(2)?;
        Ok(t)
    }

    /// The canonical template-name metadata template (scope 1).
    pub fn template_info_v1(model: &InfoModel) -> Result<Template, IpfixError> {
        use iana::{CERT_PEN, cert, ids};
        let mut t = Template::new();
        t.push_ident(model, 0, ids::TEMPLATE_ID, 2)?;
        t.push_ident(model, CERT_PEN, cert::TEMPLATE_NAME, VARLEN)?;
        t.push_ident(model, CERT_PEN, cert::TEMPLATE_DESCRIPTION, VARLEN)?;
        t.set_options_scope(1)?;
        Ok(t)
    }

    /// The extended template metadata template (scope 1) carrying parent
    /// id, application label, and basicList content descriptions.
    pub fn template_info_v3(model: &InfoModel) -> Result<Template, IpfixError> {
        use iana::{CERT_PEN, cert, ids};
        let mut t = Template::new();
        t.push_ident(model, 0, ids::TEMPLATE_ID, 2)?;
        t.push_ident(model, CERT_PEN, cert::PARENT_TEMPLATE_ID, 2)?;
        t.push_ident(model, CERT_PEN, cert::APPLICATION_LABEL, 2)?;
        t.push_ident(model, CERT_PEN, cert::TEMPLATE_NAME, VARLEN)?;
        t.push_ident(model, CERT_PEN, cert::TEMPLATE_DESCRIPTION, VARLEN)?;
        t.push_ident(model, 0, ids::SUB_TEMPLATE_LIST, VARLEN)?;
        t.set_options_scope(1)?;
        Ok(t)
    }

    /// The basicList content description template used inside
    /// template-info v3 records.
    pub fn basic_list_info(model: &InfoModel) -> Result<Template, IpfixError> {
        use iana::ids::*;
        let mut t = Template::new();
        t.push_ident(model, 0, INFORMATION_ELEMENT_ID, 2)?;
        t.push_ident(model, 0, PRIVATE_ENTERPRISE_NUMBER, 4)?;
        t.push_ident(model, 0, INFORMATION_ELEMENT_ID, 2)?;
        t.push_ident(model, 0, PRIVATE_ENTERPRISE_NUMBER, 4)?;
        Ok(t)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("scope_count", &self.scope_count)?;
        map.serialize_entry("record_len", &self.record_len)?;
        map.serialize_entry("fields", &self.fields)?;
        map.end()
    }
}

/// Validates an on-wire length against an element's data type.
///
/// Fixed scalars require exactly the default length; float64 permits 4 or
/// 8; the multi-octet integers permit any shorter length (reduced-length
/// encoding); string and octetArray permit anything including [`VARLEN`];
/// the list types require [`VARLEN`].
pub fn check_types_size(data_type: DataType, len: u16, default_len: u16) -> Result<(), IpfixError> {
    let ok = if data_type.is_list() {
        len == VARLEN
    } else if data_type.is_octet_like() {
        true
    } else if data_type == DataType::Float64 {
        len == 4 || len == 8
    } else if data_type.is_integer() {
        len > 0 && len <= default_len
    } else {
        len == default_len
    };
    if ok {
        Ok(())
    } else {
        Err(IpfixError::Template(format!(
            "length {len} invalid for {data_type:?}"
        )))
    }
}
