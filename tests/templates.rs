//! Template lifecycle, metadata option records, and structured data
//! through full exporter/collector passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ipfix_codec::error::IpfixError;
use ipfix_codec::message::{BufferCollector, MessageReader, MessageWriter, VecExporter};
use ipfix_codec::model::{InfoElement, InfoModel};
use ipfix_codec::record::{BasicList, FieldValue, MultiListEntry, Record, SubTemplateList, SubTemplateMultiList};
use ipfix_codec::session::{Session, TemplateInfo};
use ipfix_codec::template::{CompareFlags, SetRelation, Template};
use ipfix_codec::types::{DataType, MAX_TEMPLATE_FIELDS, VARLEN, list_semantics};

fn model() -> Arc<InfoModel> {
    Arc::new(InfoModel::new())
}

fn template(model: &InfoModel, specs: &[(&str, u16)]) -> Template {
    let mut t = Template::new();
    for (name, len) in specs {
        t.push_named(model, name, *len).unwrap();
    }
    t
}

fn reader_for(model: &Arc<InfoModel>, bytes: Vec<u8>) -> MessageReader<BufferCollector> {
    MessageReader::new(Session::new(Arc::clone(model)), BufferCollector::new(bytes))
}

#[test]
fn exported_template_reads_back_equal() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let sent = session
        .add_external_template(
            256,
            template(
                &model,
                &[
                    ("sourceIPv4Address", 4),
                    ("octetDeltaCount", 4),
                    ("applicationName", VARLEN),
                ],
            ),
        )
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    assert!(matches!(
        reader.next_record(),
        Ok(None) | Err(IpfixError::EndOfMessage)
    ));
    let received = reader.session().external_template(256).unwrap();
    assert!(sent.equals(&received));
    assert_eq!(
        sent.compare_set(&received, CompareFlags::default()),
        SetRelation::Equal
    );
}

#[test]
fn options_template_scope_survives_the_wire() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let mut tmpl = template(
        &model,
        &[("observationDomainId", 4), ("octetTotalCount", 8)],
    );
    tmpl.set_options_scope(1).unwrap();
    session.add_external_template(300, tmpl).unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(300).unwrap();
    writer.emit().unwrap();

    let msg = &writer.exporter().messages[0];
    // options templates travel in set 3
    assert_eq!(&msg[16..18], &[0x00, 0x03]);

    let mut reader = reader_for(&model, msg.clone());
    let _ = reader.next_record();
    let received = reader.session().external_template(300).unwrap();
    assert!(received.is_options());
    assert_eq!(received.scope_count(), 1);
}

#[test]
fn withdrawal_removes_the_template() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    session
        .add_external_template(256, template(&model, &[("octetDeltaCount", 8)]))
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.emit().unwrap();
    writer.export_template_revocation(256, false).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    let _ = reader.next_record();
    assert!(reader.session().external_template(256).is_none());
}

#[test]
fn new_template_hook_fires_on_learn() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    session
        .add_external_template(256, template(&model, &[("octetDeltaCount", 8)]))
        .unwrap();
    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.emit().unwrap();

    let learned = Arc::new(AtomicUsize::new(0));
    let mut reader = reader_for(&model, writer.exporter().concat());
    let seen = Arc::clone(&learned);
    reader.session_mut().on_new_template(move |event| {
        assert_eq!(event.tid, 256);
        assert_eq!(event.template.field_count(), 1);
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let _ = reader.next_record();
    assert_eq!(learned.load(Ordering::SeqCst), 1);
}

#[test]
fn illegal_scope_on_wire_is_ignored() {
    // options template set: tid 300, 2 fields, scope count 0 (illegal)
    let msg = hex::decode(concat!(
        "000a0022000000000000000000000000",
        "00030012",
        "012c0002",
        "0000",
        "00010008",
        "00020008",
    ))
    .unwrap();

    let model = model();
    let mut reader = reader_for(&model, msg);
    assert!(matches!(
        reader.next_record(),
        Ok(None) | Err(IpfixError::EndOfMessage)
    ));
    assert!(reader.session().external_template(300).is_none());
}

#[test]
fn reserved_set_ids_are_fatal() {
    // set id 100 is reserved
    let msg = hex::decode(concat!(
        "000a0018000000000000000000000000",
        "00640008",
        "deadbeef",
    ))
    .unwrap();
    let model = model();
    let mut reader = reader_for(&model, msg);
    assert!(matches!(
        reader.next_record(),
        Err(IpfixError::Malformed(_))
    ));
}

#[test]
fn template_accepts_no_field_past_the_maximum() {
    let model = model();
    let proto = model.get_by_name("protocolIdentifier").unwrap();
    let mut tmpl = Template::new();
    for _ in 0..MAX_TEMPLATE_FIELDS {
        tmpl.push_element(&proto, 1).unwrap();
    }
    assert!(tmpl.push_element(&proto, 1).is_err());
    assert_eq!(tmpl.field_count(), MAX_TEMPLATE_FIELDS);
}

#[test]
fn defaulted_length_internal_templates_are_rejected() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let mut lax = Template::new();
    lax.push_named(&model, "octetDeltaCount", 0).unwrap();
    session.add_internal_template(256, lax).unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    assert!(matches!(
        writer.set_internal_template(256),
        Err(IpfixError::LaxSize(256))
    ));
}

#[test]
fn template_pair_zero_skips_records() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let tmpl = session
        .add_external_template(256, template(&model, &[("octetDeltaCount", 8)]))
        .unwrap();
    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();
    let mut record = Record::new(&tmpl);
    record
        .set_by_name("octetDeltaCount", FieldValue::Unsigned(9))
        .unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    // registering any pair switches to explicit mode; 256 is unlisted
    reader.session_mut().set_template_pair(999, 999);
    assert!(reader.next_record().unwrap().is_none());
}

#[test]
fn template_pair_projects_into_internal_layout() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let tmpl = session
        .add_external_template(
            256,
            template(&model, &[("sourceTransportPort", 2), ("octetDeltaCount", 8)]),
        )
        .unwrap();
    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();
    let mut record = Record::new(&tmpl);
    record
        .set_by_name("sourceTransportPort", FieldValue::Unsigned(443))
        .unwrap();
    record
        .set_by_name("octetDeltaCount", FieldValue::Unsigned(4096))
        .unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    // internal layout keeps only the counter, plus a field the wire lacks
    reader
        .session_mut()
        .add_internal_template(
            500,
            template(&model, &[("octetDeltaCount", 8), ("packetDeltaCount", 8)]),
        )
        .unwrap();
    reader.session_mut().set_template_pair(256, 500);

    let decoded = reader.next_record().unwrap().unwrap();
    assert_eq!(decoded.template().field_count(), 2);
    assert_eq!(
        u64::try_from(decoded.value_by_name("octetDeltaCount").unwrap()).unwrap(),
        4096
    );
    // no source on the wire: zero filled
    assert_eq!(
        u64::try_from(decoded.value_by_name("packetDeltaCount").unwrap()).unwrap(),
        0
    );
    assert!(decoded.value_by_name("sourceTransportPort").is_none());
}

#[test]
fn rfc5610_definitions_are_ingested_into_the_model() {
    let exporter_model = Arc::new(InfoModel::new());
    let vendor_elements = vec![
        Arc::new(
            InfoElement::new("vendorRoundTrips", 9999, 1, DataType::Unsigned32)
                .with_description("count of round trips"),
        ),
        Arc::new(InfoElement::new("vendorLabel", 9999, 2, DataType::String)),
    ];

    let session = Session::new(Arc::clone(&exporter_model));
    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer
        .export_element_definitions(700, &vendor_elements)
        .unwrap();
    writer.emit().unwrap();

    // the collector starts from a model that has never seen pen 9999
    let collector_model = Arc::new(InfoModel::new());
    let mut reader = reader_for(&collector_model, writer.exporter().concat());
    reader.set_auto_element_ingest(true);
    assert!(reader.next_record().unwrap().is_none());

    let learned = collector_model.get_by_name("vendorRoundTrips").unwrap();
    assert_eq!(learned.ident(), (9999, 1));
    assert_eq!(learned.data_type, DataType::Unsigned32);
    assert_eq!(learned.default_len, 4);
    assert!(collector_model.get_by_name("vendorLabel").is_some());
}

#[test]
fn template_info_is_ingested_into_the_session() {
    let model = model();
    let session = Session::new(Arc::clone(&model));
    let mut writer = MessageWriter::new(session, VecExporter::new());
    let info = TemplateInfo {
        name: "flowRecord".into(),
        description: "basic biflow layout".into(),
        ..Default::default()
    };
    writer.export_template_info(260, 256, &info).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    reader.set_auto_template_info_ingest(true);
    assert!(reader.next_record().unwrap().is_none());

    let stored = reader.session().template_info(256).unwrap();
    assert_eq!(stored.name, "flowRecord");
    assert_eq!(stored.description, "basic biflow layout");
}

#[test]
fn template_info_v3_carries_basic_list_contents() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let bli = session
        .add_external_template(257, Template::basic_list_info(&model).unwrap())
        .unwrap();
    let v3 = session
        .add_external_template(258, Template::template_info_v3(&model).unwrap())
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(257).unwrap();
    writer.export_template(258).unwrap();
    writer.set_export_template(258).unwrap();

    let mut content = Record::new(&bli);
    // the basicList element itself, then its content element
    content.set(0, FieldValue::Unsigned(291)).unwrap();
    content.set(1, FieldValue::Unsigned(0)).unwrap();
    content.set(2, FieldValue::Unsigned(7)).unwrap();
    content.set(3, FieldValue::Unsigned(0)).unwrap();

    let mut record = Record::new(&v3);
    record.set(0, FieldValue::Unsigned(256)).unwrap();
    record.set(1, FieldValue::Unsigned(0)).unwrap();
    record.set(2, FieldValue::Unsigned(42)).unwrap();
    record
        .set(3, FieldValue::String("portList".into()))
        .unwrap();
    record
        .set(4, FieldValue::String("ports seen per flow".into()))
        .unwrap();
    let mut stl = SubTemplateList::new(list_semantics::ALL_OF, 257);
    stl.records.push(content);
    record.set(5, FieldValue::SubTemplateList(stl)).unwrap();

    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    reader.set_auto_template_info_ingest(true);
    assert!(reader.next_record().unwrap().is_none());

    let stored = reader.session().template_info(256).unwrap();
    assert_eq!(stored.name, "portList");
    assert_eq!(stored.application_label, 42);
    assert_eq!(stored.basic_lists.len(), 1);
    assert_eq!(stored.basic_lists[0].list_id, 291);
    assert_eq!(stored.basic_lists[0].content_id, 7);
}

#[test]
fn sub_template_list_round_trips() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let inner = session
        .add_external_template(257, template(&model, &[("sourceTransportPort", 2)]))
        .unwrap();
    let outer = session
        .add_external_template(256, template(&model, &[("subTemplateList", VARLEN)]))
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.export_template(257).unwrap();
    writer.set_export_template(256).unwrap();

    let mut stl = SubTemplateList::new(list_semantics::ORDERED, 257);
    for port in [80u64, 8443] {
        let mut sub = Record::new(&inner);
        sub.set(0, FieldValue::Unsigned(port)).unwrap();
        stl.records.push(sub);
    }
    let mut record = Record::new(&outer);
    record.set(0, FieldValue::SubTemplateList(stl)).unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    let decoded = reader.next_record().unwrap().unwrap();
    let FieldValue::SubTemplateList(list) = decoded.value(0).unwrap() else {
        panic!("expected a subTemplateList");
    };
    assert_eq!(list.semantic, list_semantics::ORDERED);
    assert_eq!(list.tid, 257);
    assert_eq!(list.records.len(), 2);
    assert_eq!(
        u16::try_from(list.records[1].value(0).unwrap()).unwrap(),
        8443
    );
}

#[test]
fn sub_template_multi_list_round_trips() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let ports = session
        .add_external_template(257, template(&model, &[("sourceTransportPort", 2)]))
        .unwrap();
    let counters = session
        .add_external_template(258, template(&model, &[("octetDeltaCount", 4)]))
        .unwrap();
    let outer = session
        .add_external_template(256, template(&model, &[("subTemplateMultiList", VARLEN)]))
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    for tid in [256, 257, 258] {
        writer.export_template(tid).unwrap();
    }
    writer.set_export_template(256).unwrap();

    let mut port_rec = Record::new(&ports);
    port_rec.set(0, FieldValue::Unsigned(53)).unwrap();
    let mut counter_rec = Record::new(&counters);
    counter_rec.set(0, FieldValue::Unsigned(77_777)).unwrap();
    let mut stml = SubTemplateMultiList::new(list_semantics::ALL_OF);
    stml.entries.push(MultiListEntry {
        tid: 257,
        records: vec![port_rec],
    });
    stml.entries.push(MultiListEntry {
        tid: 258,
        records: vec![counter_rec],
    });

    let mut record = Record::new(&outer);
    record.set(0, FieldValue::SubTemplateMultiList(stml)).unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    let decoded = reader.next_record().unwrap().unwrap();
    let FieldValue::SubTemplateMultiList(list) = decoded.value(0).unwrap() else {
        panic!("expected a subTemplateMultiList");
    };
    assert_eq!(list.entries.len(), 2);
    assert_eq!(list.entries[0].tid, 257);
    assert_eq!(
        u16::try_from(list.entries[0].records[0].value(0).unwrap()).unwrap(),
        53
    );
    assert_eq!(
        u64::try_from(list.entries[1].records[0].value(0).unwrap()).unwrap(),
        77_777
    );
}

#[test]
fn basic_list_of_basic_lists_round_trips() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let outer = session
        .add_external_template(256, template(&model, &[("basicList", VARLEN)]))
        .unwrap();

    let port = model.get_by_name("sourceTransportPort").unwrap();
    let bl_element = model.get_by_name("basicList").unwrap();

    let mut inner_a = BasicList::new(list_semantics::ALL_OF, Arc::clone(&port), 2);
    inner_a.values.push(FieldValue::Unsigned(80));
    let mut inner_b = BasicList::new(list_semantics::ALL_OF, Arc::clone(&port), 2);
    inner_b.values.push(FieldValue::Unsigned(443));
    inner_b.values.push(FieldValue::Unsigned(8080));

    let mut nested = BasicList::new(list_semantics::ORDERED, bl_element, VARLEN);
    nested.values.push(FieldValue::BasicList(inner_a));
    nested.values.push(FieldValue::BasicList(inner_b));

    let mut record = Record::new(&outer);
    record.set(0, FieldValue::BasicList(nested)).unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    let decoded = reader.next_record().unwrap().unwrap();
    let FieldValue::BasicList(outer_list) = decoded.value(0).unwrap() else {
        panic!("expected a basicList");
    };
    assert_eq!(outer_list.len(), 2);
    let FieldValue::BasicList(second) = &outer_list.values[1] else {
        panic!("expected a nested basicList");
    };
    assert_eq!(second.len(), 2);
    assert_eq!(u16::try_from(&second.values[1]).unwrap(), 8080);
}

#[test]
fn alien_basic_list_content_is_added_to_the_model() {
    let exporter_model = Arc::new(InfoModel::new());
    exporter_model.insert(InfoElement::new(
        "privateCounter",
        4242,
        17,
        DataType::Unsigned32,
    ));

    let mut session = Session::new(Arc::clone(&exporter_model));
    let outer = session
        .add_external_template(256, template(&exporter_model, &[("basicList", VARLEN)]))
        .unwrap();
    let ie = exporter_model.get_by_name("privateCounter").unwrap();
    let mut list = BasicList::new(list_semantics::ALL_OF, ie, 4);
    list.values.push(FieldValue::Unsigned(12));
    let mut record = Record::new(&outer);
    record.set(0, FieldValue::BasicList(list)).unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    // the collector model does not know (4242, 17)
    let collector_model = Arc::new(InfoModel::new());
    let mut reader = reader_for(&collector_model, writer.exporter().concat());
    let decoded = reader.next_record().unwrap().unwrap();
    let FieldValue::BasicList(list) = decoded.value(0).unwrap() else {
        panic!("expected a basicList");
    };
    let element = list.element.as_ref().unwrap();
    assert!(element.alien);
    assert_eq!(element.ident(), (4242, 17));
    assert!(collector_model.get_by_ident(4242, 17).is_some());
    // alien octets come through raw
    assert_eq!(
        Vec::<u8>::try_from(&list.values[0]).unwrap(),
        vec![0, 0, 0, 12]
    );
}

#[test]
fn set_tail_padding_is_skipped() {
    // two data sets for template 256 (one u64 counter); the first carries
    // three octets of trailing padding after its record
    let msg = hex::decode(concat!(
        "000a002b000000000000000000000000",
        "0100000f",
        "0000000000000005",
        "000000",
        "0100000c",
        "0000000000000006",
    ))
    .unwrap();

    let model = model();
    let mut reader = reader_for(&model, msg);
    reader
        .session_mut()
        .add_external_template(256, template(&model, &[("octetDeltaCount", 8)]))
        .unwrap();

    let first = reader.next_record().unwrap().unwrap();
    assert_eq!(u64::try_from(first.value(0).unwrap()).unwrap(), 5);
    let second = reader.next_record().unwrap().unwrap();
    assert_eq!(u64::try_from(second.value(0).unwrap()).unwrap(), 6);
    assert!(reader.next_record().unwrap().is_none());
}

#[test]
fn stl_with_unknown_template_decodes_empty_with_stream_intact() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let inner = session
        .add_external_template(257, template(&model, &[("sourceTransportPort", 2)]))
        .unwrap();
    let outer = session
        .add_external_template(
            256,
            template(&model, &[("subTemplateList", VARLEN), ("octetDeltaCount", 8)]),
        )
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    // deliberately do not export template 257
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();

    let mut sub = Record::new(&inner);
    sub.set(0, FieldValue::Unsigned(80)).unwrap();
    let mut stl = SubTemplateList::new(list_semantics::ALL_OF, 257);
    stl.records.push(sub);
    let mut record = Record::new(&outer);
    record.set(0, FieldValue::SubTemplateList(stl)).unwrap();
    record
        .set_by_name("octetDeltaCount", FieldValue::Unsigned(31337))
        .unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    let decoded = reader.next_record().unwrap().unwrap();
    let FieldValue::SubTemplateList(list) = decoded.value(0).unwrap() else {
        panic!("expected a subTemplateList");
    };
    // body was skipped, the record around it survived
    assert!(list.is_empty());
    assert_eq!(
        u64::try_from(decoded.value_by_name("octetDeltaCount").unwrap()).unwrap(),
        31337
    );
}
