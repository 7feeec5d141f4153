//! Session state: per-peer template tables, pairing, observation-domain
//! scoping, sequence numbering, and template metadata.
//!
//! A session holds two template tables. The *internal* table describes the
//! layouts the caller wants records presented in; it is keyed by template
//! id alone. The *external* table mirrors what the peer declared on the
//! wire (or what this process will declare when exporting); it is keyed by
//! `(observation domain, template id)`.

use crate::error::IpfixError;
use crate::model::InfoModel;
use crate::template::{MetadataShape, Template};
use crate::types::MIN_DATA_SET_ID;

use serde::Serialize;

use std::collections::HashMap;
use std::sync::Arc;

/// Content-type description for one basicList field, from a template-info
/// v3 record: the list element identity and its content element identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BasicListInfo {
    pub list_pen: u32,
    pub list_id: u16,
    pub content_pen: u32,
    pub content_id: u16,
}

/// Human-facing metadata for a template, carried by template-info option
/// records. Stored by the session independently of the template itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateInfo {
    pub name: String,
    pub description: String,
    pub application_label: u16,
    pub parent_tid: u16,
    pub basic_lists: Vec<BasicListInfo>,
}

/// Event passed to new-template hooks when decode registers an external
/// template.
#[derive(Debug, Clone)]
pub struct NewTemplateEvent {
    pub domain: u32,
    pub tid: u16,
    pub template: Arc<Template>,
}

type NewTemplateHook = Arc<dyn Fn(&NewTemplateEvent) + Send + Sync + 'static>;

/// Per-peer session state.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ipfix_codec::model::InfoModel;
/// use ipfix_codec::session::Session;
/// use ipfix_codec::template::Template;
///
/// let model = Arc::new(InfoModel::new());
/// let mut session = Session::new(Arc::clone(&model));
///
/// let mut tmpl = Template::new();
/// tmpl.push_named(&model, "octetDeltaCount", 8).unwrap();
/// session.add_internal_template(256, tmpl).unwrap();
/// assert!(session.internal_template(256).is_some());
/// ```
pub struct Session {
    model: Arc<InfoModel>,
    internal: HashMap<u16, Arc<Template>>,
    external: HashMap<(u32, u16), Arc<Template>>,
    pairs: HashMap<u16, u16>,
    domain: u32,
    export_seq: u32,
    collector_seq: u32,
    template_info: HashMap<(u32, u16), TemplateInfo>,
    hooks: Vec<NewTemplateHook>,
    metadata_tids: HashMap<u16, MetadataShape>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("domain", &self.domain)
            .field("internal", &self.internal.len())
            .field("external", &self.external.len())
            .field("pairs", &self.pairs.len())
            .finish()
    }
}

impl Session {
    pub fn new(model: Arc<InfoModel>) -> Self {
        Self {
            model,
            internal: HashMap::new(),
            external: HashMap::new(),
            pairs: HashMap::new(),
            domain: 0,
            export_seq: 0,
            collector_seq: 0,
            template_info: HashMap::new(),
            hooks: Vec::new(),
            metadata_tids: HashMap::new(),
        }
    }

    pub fn model(&self) -> &Arc<InfoModel> {
        &self.model
    }

    /// Current observation domain, applied to external template operations.
    pub fn observation_domain(&self) -> u32 {
        self.domain
    }

    pub fn set_observation_domain(&mut self, domain: u32) {
        self.domain = domain;
    }

    /// Stores an internal template. The template freezes here: it is moved
    /// behind a shared handle and can no longer be modified. An existing
    /// template with the same id is replaced.
    pub fn add_internal_template(
        &mut self,
        tid: u16,
        template: Template,
    ) -> Result<Arc<Template>, IpfixError> {
        let template = self.check_tid(tid, template)?;
        self.internal.insert(tid, Arc::clone(&template));
        Ok(template)
    }

    /// Stores an external template under the current observation domain.
    /// Replacing an existing id models withdrawal plus redefinition.
    pub fn add_external_template(
        &mut self,
        tid: u16,
        template: Template,
    ) -> Result<Arc<Template>, IpfixError> {
        let template = self.check_tid(tid, template)?;
        self.add_external_shared(tid, Arc::clone(&template));
        Ok(template)
    }

    pub(crate) fn add_external_shared(&mut self, tid: u16, template: Arc<Template>) {
        if let Some(shape) = template.metadata_shape() {
            self.metadata_tids.insert(tid, shape);
        } else {
            self.metadata_tids.remove(&tid);
        }
        self.external.insert((self.domain, tid), template);
    }

    fn check_tid(&self, tid: u16, template: Template) -> Result<Arc<Template>, IpfixError> {
        if tid < MIN_DATA_SET_ID {
            return Err(IpfixError::Template(format!(
                "template id {tid} below {MIN_DATA_SET_ID}"
            )));
        }
        Ok(Arc::new(template))
    }

    pub fn internal_template(&self, tid: u16) -> Option<Arc<Template>> {
        self.internal.get(&tid).cloned()
    }

    /// External template for the current observation domain.
    pub fn external_template(&self, tid: u16) -> Option<Arc<Template>> {
        self.external.get(&(self.domain, tid)).cloned()
    }

    pub fn remove_internal_template(&mut self, tid: u16) -> Option<Arc<Template>> {
        self.internal.remove(&tid)
    }

    /// Removes an external template (wire withdrawal) in the current
    /// domain.
    pub fn remove_external_template(&mut self, tid: u16) -> Option<Arc<Template>> {
        self.metadata_tids.remove(&tid);
        self.external.remove(&(self.domain, tid))
    }

    /// Registers the internal template records of `ext_tid` should decode
    /// into. An `int_tid` of 0 means "skip records of this template".
    pub fn set_template_pair(&mut self, ext_tid: u16, int_tid: u16) {
        self.pairs.insert(ext_tid, int_tid);
    }

    /// Decode target for an external template id.
    ///
    /// With no pairs registered at all, every external id decodes into the
    /// same-id internal template (which may be the external itself when no
    /// such internal exists). Once any pair is registered, unlisted ids
    /// map to 0: skip.
    pub fn lookup_template_pair(&self, ext_tid: u16) -> u16 {
        if self.pairs.is_empty() {
            ext_tid
        } else {
            self.pairs.get(&ext_tid).copied().unwrap_or(0)
        }
    }

    /// Forgets all registered pairs, restoring decode-everything behavior.
    pub fn clear_template_pairs(&mut self) {
        self.pairs.clear();
    }

    /// Metadata shape of an external template registered in this session,
    /// if it has one.
    pub fn metadata_shape_of(&self, tid: u16) -> Option<MetadataShape> {
        self.metadata_tids.get(&tid).copied()
    }

    /// Stores template metadata for `(current domain, tid)`.
    pub fn set_template_info(&mut self, tid: u16, info: TemplateInfo) {
        self.template_info.insert((self.domain, tid), info);
    }

    pub fn template_info(&self, tid: u16) -> Option<&TemplateInfo> {
        self.template_info.get(&(self.domain, tid))
    }

    /// Registers a hook invoked whenever decode adds a new external
    /// template to this session.
    pub fn on_new_template<F>(&mut self, hook: F)
    where
        F: Fn(&NewTemplateEvent) + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
    }

    pub(crate) fn trigger_new_template(&self, tid: u16, template: &Arc<Template>) {
        if self.hooks.is_empty() {
            return;
        }
        let event = NewTemplateEvent {
            domain: self.domain,
            tid,
            template: Arc::clone(template),
        };
        for hook in &self.hooks {
            hook(&event);
        }
    }

    /// Next sequence number to stamp on an exported message.
    pub fn export_sequence(&self) -> u32 {
        self.export_seq
    }

    /// Advances the export sequence by the number of data records emitted.
    pub(crate) fn advance_export_sequence(&mut self, records: u32) {
        self.export_seq = self.export_seq.wrapping_add(records);
    }

    /// Sequence number expected on the next received message.
    pub fn collector_sequence(&self) -> u32 {
        self.collector_seq
    }

    /// Checks a received sequence number against the expectation, warning
    /// and adopting the received value on drift.
    pub(crate) fn check_collector_sequence(&mut self, received: u32) {
        if received != self.collector_seq {
            log::warn!(
                "sequence number drift: expected {}, message carries {}; adopting",
                self.collector_seq,
                received
            );
        }
        self.collector_seq = received;
    }

    /// Advances the expected collector sequence by decoded data records.
    pub(crate) fn advance_collector_sequence(&mut self, records: u32) {
        self.collector_seq = self.collector_seq.wrapping_add(records);
    }
}
