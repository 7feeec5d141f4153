//! Decoded record values.
//!
//! A [`Record`] pairs a template with one value per template field. Values
//! are a tagged union ([`FieldValue`]) over the element data types; the
//! three structured-data types hold owned nested storage that is released
//! when the record is dropped. Varlen payloads are copied out of the
//! message buffer on decode, so records stay valid after the buffer moves
//! to the next message.

use crate::model::InfoElement;
use crate::template::Template;
use crate::types::DataType;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

/// A decoded basicList: uniform values of one information element.
#[derive(Debug, Clone, Default)]
pub struct BasicList {
    /// RFC 6313 semantic octet.
    pub semantic: u8,
    /// Content element; `None` for an empty list decoded from a
    /// zero-length wrapper.
    pub element: Option<Arc<InfoElement>>,
    /// On-wire length of each value.
    pub element_len: u16,
    pub values: Vec<FieldValue>,
}

impl BasicList {
    pub fn new(semantic: u8, element: Arc<InfoElement>, element_len: u16) -> Self {
        Self {
            semantic,
            element: Some(element),
            element_len,
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Releases the list contents.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// A decoded subTemplateList: records sharing one sub-template.
#[derive(Debug, Clone, Default)]
pub struct SubTemplateList {
    /// RFC 6313 semantic octet.
    pub semantic: u8,
    /// Template id the records were declared with.
    pub tid: u16,
    pub records: Vec<Record>,
}

impl SubTemplateList {
    pub fn new(semantic: u8, tid: u16) -> Self {
        Self {
            semantic,
            tid,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// One entry of a subTemplateMultiList: its own template id and records.
#[derive(Debug, Clone)]
pub struct MultiListEntry {
    pub tid: u16,
    pub records: Vec<Record>,
}

/// A decoded subTemplateMultiList.
#[derive(Debug, Clone, Default)]
pub struct SubTemplateMultiList {
    /// RFC 6313 semantic octet.
    pub semantic: u8,
    pub entries: Vec<MultiListEntry>,
}

impl SubTemplateMultiList {
    pub fn new(semantic: u8) -> Self {
        Self {
            semantic,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The decoded value of one template field.
///
/// Integer values are widened to 64 bits in memory regardless of their
/// on-wire length; width conversion happens at the wire boundary. All four
/// datetime types decode to a [`Duration`] since the Unix epoch.
#[derive(Debug, Clone, Serialize)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Boolean(bool),
    MacAddr([u8; 6]),
    Bytes(Vec<u8>),
    String(String),
    Ip4Addr(Ipv4Addr),
    Ip6Addr(Ipv6Addr),
    DateTime(Duration),
    BasicList(BasicList),
    SubTemplateList(SubTemplateList),
    SubTemplateMultiList(SubTemplateMultiList),
}

impl FieldValue {
    /// The zero value used when a transcode plan has no source for a
    /// destination field.
    pub fn zero(data_type: DataType) -> FieldValue {
        use DataType::*;
        match data_type {
            Unsigned8 | Unsigned16 | Unsigned32 | Unsigned64 => FieldValue::Unsigned(0),
            Signed8 | Signed16 | Signed32 | Signed64 => FieldValue::Signed(0),
            Float32 | Float64 => FieldValue::Float(0.0),
            Boolean => FieldValue::Boolean(false),
            MacAddress => FieldValue::MacAddr([0; 6]),
            OctetArray => FieldValue::Bytes(Vec::new()),
            String => FieldValue::String(std::string::String::new()),
            DateTimeSeconds | DateTimeMilliseconds | DateTimeMicroseconds
            | DateTimeNanoseconds => FieldValue::DateTime(Duration::ZERO),
            Ipv4Address => FieldValue::Ip4Addr(Ipv4Addr::UNSPECIFIED),
            Ipv6Address => FieldValue::Ip6Addr(Ipv6Addr::UNSPECIFIED),
            BasicList => FieldValue::BasicList(crate::record::BasicList::default()),
            SubTemplateList => {
                FieldValue::SubTemplateList(crate::record::SubTemplateList::default())
            }
            SubTemplateMultiList => {
                FieldValue::SubTemplateMultiList(crate::record::SubTemplateMultiList::default())
            }
        }
    }

    /// Whether this value is admissible for a field of the given type.
    pub fn matches_type(&self, data_type: DataType) -> bool {
        use DataType::*;
        matches!(
            (self, data_type),
            (FieldValue::Unsigned(_), Unsigned8 | Unsigned16 | Unsigned32 | Unsigned64)
                | (FieldValue::Signed(_), Signed8 | Signed16 | Signed32 | Signed64)
                | (FieldValue::Float(_), Float32 | Float64)
                | (FieldValue::Boolean(_), Boolean)
                | (FieldValue::MacAddr(_), MacAddress)
                | (FieldValue::Bytes(_), OctetArray)
                | (FieldValue::String(_), String)
                | (
                    FieldValue::DateTime(_),
                    DateTimeSeconds | DateTimeMilliseconds | DateTimeMicroseconds
                        | DateTimeNanoseconds
                )
                | (FieldValue::Ip4Addr(_), Ipv4Address)
                | (FieldValue::Ip6Addr(_), Ipv6Address)
                | (FieldValue::BasicList(_), BasicList)
                | (FieldValue::SubTemplateList(_), SubTemplateList)
                | (FieldValue::SubTemplateMultiList(_), SubTemplateMultiList)
        )
    }
}

/// Error returned by the typed value accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValueError {
    InvalidDataType,
}

impl std::fmt::Display for FieldValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValueError::InvalidDataType => write!(f, "field value has a different data type"),
        }
    }
}

impl std::error::Error for FieldValueError {}

macro_rules! impl_try_from_unsigned {
    ($($t:ty),*) => {
        $(
            impl TryFrom<&FieldValue> for $t {
                type Error = FieldValueError;

                fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
                    match value {
                        FieldValue::Unsigned(v) => {
                            <$t>::try_from(*v).map_err(|_| FieldValueError::InvalidDataType)
                        }
                        _ => Err(FieldValueError::InvalidDataType),
                    }
                }
            }
        )*
    };
}

macro_rules! impl_try_from_signed {
    ($($t:ty),*) => {
        $(
            impl TryFrom<&FieldValue> for $t {
                type Error = FieldValueError;

                fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
                    match value {
                        FieldValue::Signed(v) => {
                            <$t>::try_from(*v).map_err(|_| FieldValueError::InvalidDataType)
                        }
                        _ => Err(FieldValueError::InvalidDataType),
                    }
                }
            }
        )*
    };
}

impl_try_from_unsigned!(u8, u16, u32, u64);
impl_try_from_signed!(i8, i16, i32, i64);

impl TryFrom<&FieldValue> for f64 {
    type Error = FieldValueError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::Float(v) => Ok(*v),
            _ => Err(FieldValueError::InvalidDataType),
        }
    }
}

impl TryFrom<&FieldValue> for bool {
    type Error = FieldValueError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::Boolean(v) => Ok(*v),
            _ => Err(FieldValueError::InvalidDataType),
        }
    }
}

impl TryFrom<&FieldValue> for Ipv4Addr {
    type Error = FieldValueError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::Ip4Addr(v) => Ok(*v),
            _ => Err(FieldValueError::InvalidDataType),
        }
    }
}

impl TryFrom<&FieldValue> for Ipv6Addr {
    type Error = FieldValueError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::Ip6Addr(v) => Ok(*v),
            _ => Err(FieldValueError::InvalidDataType),
        }
    }
}

impl TryFrom<&FieldValue> for Duration {
    type Error = FieldValueError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::DateTime(v) => Ok(*v),
            _ => Err(FieldValueError::InvalidDataType),
        }
    }
}

impl TryFrom<&FieldValue> for String {
    type Error = FieldValueError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::String(v) => Ok(v.clone()),
            _ => Err(FieldValueError::InvalidDataType),
        }
    }
}

impl TryFrom<&FieldValue> for Vec<u8> {
    type Error = FieldValueError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::Bytes(v) => Ok(v.clone()),
            _ => Err(FieldValueError::InvalidDataType),
        }
    }
}

impl TryFrom<&FieldValue> for [u8; 6] {
    type Error = FieldValueError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::MacAddr(v) => Ok(*v),
            _ => Err(FieldValueError::InvalidDataType),
        }
    }
}

/// A record: one value per field of its template.
#[derive(Debug, Clone)]
pub struct Record {
    template: Arc<Template>,
    /// Template id the record was encoded or decoded with; 0 for records
    /// built locally before a template id is known.
    pub tid: u16,
    values: Vec<FieldValue>,
}

impl Record {
    /// Zero-filled record for a template.
    pub fn new(template: &Arc<Template>) -> Self {
        let values = template
            .fields()
            .iter()
            .map(|f| FieldValue::zero(f.ie.data_type))
            .collect();
        Self {
            template: Arc::clone(template),
            tid: 0,
            values,
        }
    }

    pub(crate) fn from_values(template: &Arc<Template>, tid: u16, values: Vec<FieldValue>) -> Self {
        debug_assert_eq!(values.len(), template.field_count());
        Self {
            template: Arc::clone(template),
            tid,
            values,
        }
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn value(&self, idx: usize) -> Option<&FieldValue> {
        self.values.get(idx)
    }

    /// Value of the first field carrying the named element.
    pub fn value_by_name(&self, name: &str) -> Option<&FieldValue> {
        self.template
            .fields()
            .iter()
            .position(|f| f.ie.name == name)
            .map(|i| &self.values[i])
    }

    /// Value of the `skip`-th repetition of the element with the given
    /// identity.
    pub fn value_by_ident(&self, pen: u32, id: u16, skip: usize) -> Option<&FieldValue> {
        self.template
            .position_of_ident(pen, id, skip)
            .map(|i| &self.values[i])
    }

    /// Sets the value at a field position, checking it against the field's
    /// data type.
    pub fn set(&mut self, idx: usize, value: FieldValue) -> Result<(), FieldValueError> {
        let field = self
            .template
            .field(idx)
            .ok_or(FieldValueError::InvalidDataType)?;
        if !value.matches_type(field.ie.data_type) {
            return Err(FieldValueError::InvalidDataType);
        }
        self.values[idx] = value;
        Ok(())
    }

    /// Sets the value of the first field carrying the named element.
    pub fn set_by_name(&mut self, name: &str, value: FieldValue) -> Result<(), FieldValueError> {
        let idx = self
            .template
            .fields()
            .iter()
            .position(|f| f.ie.name == name)
            .ok_or(FieldValueError::InvalidDataType)?;
        self.set(idx, value)
    }

    /// Releases all structured-data storage held by this record, resetting
    /// list fields to empty.
    pub fn clear_lists(&mut self) {
        for value in &mut self.values {
            match value {
                FieldValue::BasicList(l) => l.clear(),
                FieldValue::SubTemplateList(l) => l.clear(),
                FieldValue::SubTemplateMultiList(l) => l.clear(),
                _ => {}
            }
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.template.fields().iter().zip(&self.values) {
            map.serialize_entry(&field.ie.name, value)?;
        }
        map.end()
    }
}

impl Serialize for BasicList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("semantic", &self.semantic)?;
        map.serialize_entry(
            "element",
            &self.element.as_deref().map(|ie| ie.name.as_str()),
        )?;
        map.serialize_entry("values", &self.values)?;
        map.end()
    }
}

impl Serialize for SubTemplateList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("semantic", &self.semantic)?;
        map.serialize_entry("tid", &self.tid)?;
        map.serialize_entry("records", &self.records)?;
        map.end()
    }
}

impl Serialize for SubTemplateMultiList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("semantic", &self.semantic)?;
        let entries: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.tid, &e.records))
            .collect();
        map.serialize_entry("entries", &entries)?;
        map.end()
    }
}
