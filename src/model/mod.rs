//! Information model: the registry of information element definitions.
//!
//! Every field that appears in a template resolves to a canonical
//! [`InfoElement`] interned here. Elements are identified by
//! `(enterprise number, element id)` and, independently, by name. The model
//! is seeded from a compiled-in IANA subset and grows at runtime through
//! [`InfoModel::insert`], RFC 5610 option records, and alien elements
//! observed on the wire.
//!
//! A single model is shared by all sessions and buffers of a process
//! (`Arc<InfoModel>`). Decoding may add elements while other components
//! hold the model, so mutation is serialized internally.

pub mod iana;

use crate::error::IpfixError;
use crate::types::{DataType, PEN_REVERSE, REVERSE_ID_BIT, Semantics, Units};

use serde::Serialize;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Canonical definition of an information element.
///
/// Immutable once interned; the model hands out shared handles.
#[derive(Debug, Clone, Serialize)]
pub struct InfoElement {
    /// Unique element name, e.g. `octetDeltaCount`.
    pub name: String,
    /// Private enterprise number; 0 for IANA elements.
    pub pen: u32,
    /// Element id with the on-wire enterprise bit cleared.
    pub id: u16,
    /// Default on-wire length in octets; [`VARLEN`] for variable length.
    pub default_len: u16,
    pub data_type: DataType,
    pub semantics: Semantics,
    pub units: Units,
    /// Valid value range, when the definition declares one.
    pub range: Option<(u64, u64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value is an integer subject to endian conversion.
    pub endian: bool,
    /// Inserting this element also registers a reverse companion.
    pub reversible: bool,
    /// Element was fabricated for an unknown identity seen on the wire.
    pub alien: bool,
}

impl InfoElement {
    /// New element with defaults: length inferred from the data type, no
    /// semantics/units/range, no flags.
    pub fn new(name: impl Into<String>, pen: u32, id: u16, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            pen,
            id,
            default_len: data_type.default_len(),
            data_type,
            semantics: Semantics::Default,
            units: Units::None,
            range: None,
            description: None,
            endian: data_type.is_integer()
                || matches!(
                    data_type,
                    DataType::Unsigned8 | DataType::Signed8 | DataType::Float32 | DataType::Float64
                ),
            reversible: false,
            alien: false,
        }
    }

    pub fn with_semantics(mut self, semantics: Semantics) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    pub fn with_range(mut self, min: u64, max: u64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn reversible(mut self) -> Self {
        self.reversible = true;
        self
    }

    /// Identity tuple used as the model key.
    pub fn ident(&self) -> (u32, u16) {
        (self.pen, self.id)
    }

    /// True when this element is the reverse companion of another.
    pub fn is_reverse(&self) -> bool {
        self.pen == PEN_REVERSE || (self.pen != 0 && self.id & REVERSE_ID_BIT != 0)
    }
}

/// Decoded content of one RFC 5610 information-element option record,
/// ready for model ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementOptionRecord {
    pub pen: u32,
    pub id: u16,
    pub data_type_code: u8,
    pub semantics_code: u8,
    pub units_code: u16,
    pub range_begin: u64,
    pub range_end: u64,
    pub name: String,
    pub description: String,
}

struct ModelTables {
    by_ident: HashMap<(u32, u16), Arc<InfoElement>>,
    by_name: HashMap<String, Arc<InfoElement>>,
}

/// The information element registry.
///
/// # Examples
///
/// ```rust
/// use ipfix_codec::model::InfoModel;
///
/// let model = InfoModel::new();
/// let ie = model.get_by_name("octetDeltaCount").unwrap();
/// assert_eq!(ie.ident(), (0, 1));
/// assert_eq!(model.get_by_ident(0, 1).unwrap().name, "octetDeltaCount");
/// ```
pub struct InfoModel {
    tables: RwLock<ModelTables>,
}

impl Default for InfoModel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InfoModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfoModel").field("len", &self.len()).finish()
    }
}

impl InfoModel {
    /// Model seeded with the compiled-in IANA subset.
    pub fn new() -> Self {
        let model = Self::empty();
        for ie in iana::elements() {
            model.insert(ie);
        }
        model
    }

    /// Model with no definitions at all. Mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            tables: RwLock::new(ModelTables {
                by_ident: HashMap::new(),
                by_name: HashMap::new(),
            }),
        }
    }

    /// Interns an element definition.
    ///
    /// An existing identity is redefined in place: the old definition is
    /// dropped from both indexes and replaced. Inserting a reversible
    /// element also interns its reverse companion (name `reverse` +
    /// titlecased original; PEN [`PEN_REVERSE`] for IANA elements, else the
    /// original PEN with the high element-id bit set).
    pub fn insert(&self, ie: InfoElement) -> Arc<InfoElement> {
        let reverse = (ie.reversible && !ie.is_reverse()).then(|| reverse_of(&ie));
        let handle = self.intern(ie);
        if let Some(rev) = reverse {
            self.intern(rev);
        }
        handle
    }

    fn intern(&self, ie: InfoElement) -> Arc<InfoElement> {
        let mut tables = self.tables.write().unwrap();
        if let Some(old) = tables.by_ident.remove(&ie.ident()) {
            tables.by_name.remove(&old.name);
        }
        let handle = Arc::new(ie);
        tables.by_ident.insert(handle.ident(), Arc::clone(&handle));
        tables
            .by_name
            .insert(handle.name.clone(), Arc::clone(&handle));
        handle
    }

    /// Bulk insert, e.g. from the output of an external IANA-schema XML
    /// loader.
    pub fn extend(&self, defs: impl IntoIterator<Item = InfoElement>) {
        for ie in defs {
            self.insert(ie);
        }
    }

    pub fn get_by_ident(&self, pen: u32, id: u16) -> Option<Arc<InfoElement>> {
        self.tables.read().unwrap().by_ident.get(&(pen, id)).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<InfoElement>> {
        self.tables.read().unwrap().by_name.get(name).cloned()
    }

    /// Number of interned elements, reverse companions included.
    pub fn len(&self) -> usize {
        self.tables.read().unwrap().by_ident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fabricates a definition for an identity observed on the wire but
    /// absent from the model, typically a basicList content element.
    ///
    /// The element gets a synthetic name, octetArray type, the observed
    /// length as default, and the `alien` flag. Re-observing the same
    /// identity returns the existing definition.
    pub fn add_alien(&self, pen: u32, id: u16, len: u16) -> Arc<InfoElement> {
        if let Some(existing) = self.get_by_ident(pen, id) {
            return existing;
        }
        let mut ie = InfoElement::new(format!("alien_{pen}_{id}"), pen, id, DataType::OctetArray);
        ie.default_len = len;
        ie.alien = true;
        self.intern(ie)
    }

    /// Validates and ingests an RFC 5610 element description.
    ///
    /// Rejected: PEN 0 or [`PEN_REVERSE`], an identity already interned, a
    /// name already taken, or an unknown data type code. The default length
    /// is inferred from the data type.
    pub fn add_from_option_record(
        &self,
        rec: &ElementOptionRecord,
    ) -> Result<Arc<InfoElement>, IpfixError> {
        if rec.pen == 0 || rec.pen == PEN_REVERSE {
            return Err(IpfixError::InvalidElement(format!(
                "reserved enterprise number {}",
                rec.pen
            )));
        }
        if self.get_by_ident(rec.pen, rec.id).is_some() {
            return Err(IpfixError::InvalidElement(format!(
                "element ({}, {}) already defined",
                rec.pen, rec.id
            )));
        }
        if rec.name.is_empty() || self.get_by_name(&rec.name).is_some() {
            return Err(IpfixError::InvalidElement(format!(
                "element name {:?} unusable",
                rec.name
            )));
        }
        let data_type = DataType::from_code(rec.data_type_code).ok_or_else(|| {
            IpfixError::InvalidElement(format!("unknown data type code {}", rec.data_type_code))
        })?;

        let mut ie = InfoElement::new(rec.name.clone(), rec.pen, rec.id, data_type);
        ie.semantics = Semantics::from_code(rec.semantics_code).unwrap_or_default();
        ie.units = Units::from_code(rec.units_code);
        if rec.range_begin != 0 || rec.range_end != 0 {
            ie.range = Some((rec.range_begin, rec.range_end));
        }
        if !rec.description.is_empty() {
            ie.description = Some(rec.description.clone());
        }
        Ok(self.intern(ie))
    }
}

/// Builds the reverse companion of a reversible element.
fn reverse_of(ie: &InfoElement) -> InfoElement {
    let (pen, id) = if ie.pen == 0 {
        (PEN_REVERSE, ie.id)
    } else {
        (ie.pen, ie.id | REVERSE_ID_BIT)
    };
    let mut rev = ie.clone();
    rev.name = reverse_name(&ie.name);
    rev.pen = pen;
    rev.id = id;
    rev.reversible = false;
    rev
}

/// `reverse` + titlecased original name.
pub(crate) fn reverse_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 7);
    out.push_str("reverse");
    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
    out
}
