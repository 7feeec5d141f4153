//! End-to-end exporter/collector round trips.

use std::sync::Arc;
use std::time::Duration;

use ipfix_codec::message::{BufferCollector, MessageReader, MessageWriter, VecExporter};
use ipfix_codec::model::InfoModel;
use ipfix_codec::record::{FieldValue, Record};
use ipfix_codec::session::Session;
use ipfix_codec::template::Template;
use ipfix_codec::types::VARLEN;

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
fn simple_record_message_layout() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let tmpl = session
        .add_external_template(
            256,
            template(
                &model,
                &[
                    ("sourceIPv4Address", 4),
                    ("destinationIPv4Address", 4),
                    ("octetDeltaCount", 8),
                ],
            ),
        )
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.set_export_time(Some(0x5F00_0000));
    writer.set_export_template(256).unwrap();

    let mut record = Record::new(&tmpl);
    record
        .set_by_name(
            "sourceIPv4Address",
            FieldValue::Ip4Addr("192.168.0.1".parse().unwrap()),
        )
        .unwrap();
    record
        .set_by_name(
            "destinationIPv4Address",
            FieldValue::Ip4Addr("192.168.0.2".parse().unwrap()),
        )
        .unwrap();
    record
        .set_by_name("octetDeltaCount", FieldValue::Unsigned(1500))
        .unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let messages = &writer.exporter().messages;
    assert_eq!(messages.len(), 1);
    let msg = &messages[0];
    // 16-octet header, 4-octet set header, 16-octet record
    assert_eq!(msg.len(), 36);
    assert_eq!(&msg[0..2], &[0x00, 0x0A]);
    assert_eq!(&msg[2..4], &[0x00, 0x24]);
    // set header: id 256, length 20
    assert_eq!(&msg[16..20], &[0x01, 0x00, 0x00, 0x14]);
    assert_eq!(&msg[20..24], &[0xC0, 0xA8, 0x00, 0x01]);
    assert_eq!(&msg[24..28], &[0xC0, 0xA8, 0x00, 0x02]);
    assert_eq!(&msg[28..36], &1500u64.to_be_bytes());

    // the same session (template already known) decodes it back
    let mut reader = reader_for(&model, msg.clone());
    reader
        .session_mut()
        .add_external_template(
            256,
            template(
                &model,
                &[
                    ("sourceIPv4Address", 4),
                    ("destinationIPv4Address", 4),
                    ("octetDeltaCount", 8),
                ],
            ),
        )
        .unwrap();
    let decoded = reader.next_record().unwrap().unwrap();
    assert_eq!(
        u64::try_from(decoded.value_by_name("octetDeltaCount").unwrap()).unwrap(),
        1500
    );
    assert!(reader.next_record().unwrap().is_none());
}

#[test]
fn reduced_length_integer_round_trips() {
    let model = model();

    // internal layout carries the counter at full width, the wire template
    // at 4 octets
    let mut session = Session::new(Arc::clone(&model));
    let internal = session
        .add_internal_template(
            256,
            template(
                &model,
                &[
                    ("sourceIPv4Address", 4),
                    ("destinationIPv4Address", 4),
                    ("octetDeltaCount", 8),
                ],
            ),
        )
        .unwrap();
    session
        .add_external_template(
            256,
            template(
                &model,
                &[
                    ("sourceIPv4Address", 4),
                    ("destinationIPv4Address", 4),
                    ("octetDeltaCount", 4),
                ],
            ),
        )
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_internal_template(256).unwrap();
    writer.set_export_template(256).unwrap();

    let mut record = Record::new(&internal);
    record
        .set_by_name("octetDeltaCount", FieldValue::Unsigned(1500))
        .unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let bytes = writer.exporter().concat();
    let mut reader = reader_for(&model, bytes);
    reader
        .session_mut()
        .add_internal_template(
            256,
            template(
                &model,
                &[
                    ("sourceIPv4Address", 4),
                    ("destinationIPv4Address", 4),
                    ("octetDeltaCount", 8),
                ],
            ),
        )
        .unwrap();

    let decoded = reader.next_record().unwrap().unwrap();
    // the wire carried 0x000005DC in four octets; the internal u64 is 1500
    assert_eq!(
        u64::try_from(decoded.value_by_name("octetDeltaCount").unwrap()).unwrap(),
        1500
    );
}

#[test]
fn varlen_string_encoding_matches_wire() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let tmpl = session
        .add_external_template(256, template(&model, &[("applicationName", VARLEN)]))
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.set_export_template(256).unwrap();
    let mut record = Record::new(&tmpl);
    record
        .set_by_name("applicationName", FieldValue::String("foo".into()))
        .unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let msg = &writer.exporter().messages[0];
    // record encodes as a 1-octet length prefix plus the payload
    assert_eq!(&msg[20..24], &[0x03, 0x66, 0x6F, 0x6F]);
    assert_eq!(msg.len(), 24);

    let mut reader = reader_for(&model, msg.clone());
    reader
        .session_mut()
        .add_external_template(256, template(&model, &[("applicationName", VARLEN)]))
        .unwrap();
    let decoded = reader.next_record().unwrap().unwrap();
    assert_eq!(
        String::try_from(decoded.value_by_name("applicationName").unwrap()).unwrap(),
        "foo"
    );
}

#[test]
fn mixed_type_record_round_trips_value_identical() {
    let model = model();
    let specs: &[(&str, u16)] = &[
        ("sourceIPv6Address", 16),
        ("sourceMacAddress", 6),
        ("protocolIdentifier", 1),
        ("tcpControlBits", 2),
        ("dataRecordsReliability", 1),
        ("absoluteError", 8),
        ("flowStartSeconds", 4),
        ("flowStartMilliseconds", 8),
        ("flowStartNanoseconds", 8),
        ("applicationName", VARLEN),
    ];
    let mut session = Session::new(Arc::clone(&model));
    let tmpl = session
        .add_external_template(256, template(&model, specs))
        .unwrap();

    let mut record = Record::new(&tmpl);
    record
        .set_by_name("sourceIPv6Address", FieldValue::Ip6Addr("2001:db8::1".parse().unwrap()))
        .unwrap();
    record
        .set_by_name("sourceMacAddress", FieldValue::MacAddr([0, 0x1B, 0x44, 0x11, 0x3A, 0xB7]))
        .unwrap();
    record
        .set_by_name("protocolIdentifier", FieldValue::Unsigned(6))
        .unwrap();
    record
        .set_by_name("tcpControlBits", FieldValue::Unsigned(0x12))
        .unwrap();
    record
        .set_by_name("dataRecordsReliability", FieldValue::Boolean(true))
        .unwrap();
    record
        .set_by_name("absoluteError", FieldValue::Float(2.5))
        .unwrap();
    record
        .set_by_name("flowStartSeconds", FieldValue::DateTime(Duration::from_secs(1_700_000_000)))
        .unwrap();
    record
        .set_by_name(
            "flowStartMilliseconds",
            FieldValue::DateTime(Duration::from_millis(1_700_000_000_123)),
        )
        .unwrap();
    record
        .set_by_name(
            "flowStartNanoseconds",
            FieldValue::DateTime(Duration::new(1_700_000_000, 123_456_789)),
        )
        .unwrap();
    record
        .set_by_name("applicationName", FieldValue::String("https".into()))
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    let decoded = reader.next_record().unwrap().unwrap();

    for (idx, original) in record.values().iter().enumerate() {
        let got = decoded.value(idx).unwrap();
        match (original, got) {
            (FieldValue::Unsigned(a), FieldValue::Unsigned(b)) => assert_eq!(a, b),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => assert_eq!(a, b),
            (FieldValue::Float(a), FieldValue::Float(b)) => assert_eq!(a, b),
            (FieldValue::MacAddr(a), FieldValue::MacAddr(b)) => assert_eq!(a, b),
            (FieldValue::Ip6Addr(a), FieldValue::Ip6Addr(b)) => assert_eq!(a, b),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => assert_eq!(a, b),
            (FieldValue::String(a), FieldValue::String(b)) => assert_eq!(a, b),
            (a, b) => panic!("value {idx} changed kind: {a:?} vs {b:?}"),
        }
    }
}

#[test]
fn ntp_microsecond_round_trip_law() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let tmpl = session
        .add_external_template(256, template(&model, &[("flowStartMicroseconds", 8)]))
        .unwrap();

    // tv_nsec is an exact multiple of 1000
    let stamp = Duration::new(1_650_000_000, 123_456_000);
    let mut record = Record::new(&tmpl);
    record
        .set_by_name("flowStartMicroseconds", FieldValue::DateTime(stamp))
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut reader = reader_for(&model, writer.exporter().concat());
    let decoded = reader.next_record().unwrap().unwrap();
    assert_eq!(
        Duration::try_from(decoded.value_by_name("flowStartMicroseconds").unwrap()).unwrap(),
        stamp
    );
}

#[test]
fn missing_template_set_is_skipped_with_following_records_delivered() {
    let model = model();

    // build the valid tail: template 256 plus one data record
    let mut session = Session::new(Arc::clone(&model));
    let tmpl = session
        .add_external_template(256, template(&model, &[("octetDeltaCount", 8)]))
        .unwrap();
    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();
    let mut record = Record::new(&tmpl);
    record
        .set_by_name("octetDeltaCount", FieldValue::Unsigned(7))
        .unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();
    let mut msg = writer.exporter().messages[0].clone();

    // splice an orphan data set (id 999, 4 octets of body) ahead of the
    // template set and fix the message length
    let orphan = [0x03, 0xE7, 0x00, 0x08, 0xDE, 0xAD, 0xBE, 0xEF];
    let mut spliced = msg[..16].to_vec();
    spliced.extend_from_slice(&orphan);
    spliced.extend_from_slice(&msg[16..]);
    let total = spliced.len() as u16;
    spliced[2..4].copy_from_slice(&total.to_be_bytes());
    msg = spliced;

    let mut reader = reader_for(&model, msg);
    let decoded = reader.next_record().unwrap().unwrap();
    assert_eq!(
        u64::try_from(decoded.value_by_name("octetDeltaCount").unwrap()).unwrap(),
        7
    );
    assert!(reader.next_record().unwrap().is_none());
}

#[test]
fn sequence_drift_warns_and_adopts() {
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
        .set_by_name("octetDeltaCount", FieldValue::Unsigned(1))
        .unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();
    writer.append(&record).unwrap();
    writer.emit().unwrap();

    let mut messages = writer.exporter().messages.clone();
    // second message legitimately carries sequence 1; forge 105
    messages[1][8..12].copy_from_slice(&105u32.to_be_bytes());

    let mut reader = reader_for(&model, messages.concat());
    assert!(reader.next_record().unwrap().is_some());
    assert!(reader.next_record().unwrap().is_some());
    assert!(reader.next_record().unwrap().is_none());
    // the forged value was adopted and advanced by the decoded record
    assert_eq!(reader.session().collector_sequence(), 106);
}

#[test]
fn auto_next_message_spans_large_batches() {
    let model = model();
    let mut session = Session::new(Arc::clone(&model));
    let tmpl = session
        .add_external_template(256, template(&model, &[("applicationName", VARLEN)]))
        .unwrap();

    let mut writer = MessageWriter::new(session, VecExporter::new());
    writer.export_template(256).unwrap();
    writer.set_export_template(256).unwrap();

    // ~1 KiB per record forces several message boundaries
    let payload = "x".repeat(1024);
    let mut record = Record::new(&tmpl);
    record
        .set_by_name("applicationName", FieldValue::String(payload.clone()))
        .unwrap();
    for _ in 0..200 {
        writer.append(&record).unwrap();
    }
    writer.emit().unwrap();
    let messages = writer.exporter().messages.clone();
    assert!(messages.len() > 1, "expected multiple messages");
    for msg in &messages {
        assert!(msg.len() <= 65535);
    }
    // only the first message contains the template set
    assert_eq!(&messages[0][16..18], &[0x00, 0x02]);
    assert_eq!(&messages[1][16..18], &[0x01, 0x00]);

    let mut reader = reader_for(&model, messages.concat());
    let mut count = 0;
    for decoded in reader.records() {
        let decoded = decoded.unwrap();
        assert_eq!(
            String::try_from(decoded.value_by_name("applicationName").unwrap()).unwrap(),
            payload
        );
        count += 1;
    }
    assert_eq!(count, 200);
}

#[test]
fn varlen_length_boundary_on_the_wire() {
    let model = model();
    for len in [254usize, 255] {
        let mut session = Session::new(Arc::clone(&model));
        let tmpl = session
            .add_external_template(256, template(&model, &[("applicationName", VARLEN)]))
            .unwrap();
        let mut writer = MessageWriter::new(session, VecExporter::new());
        writer.set_export_template(256).unwrap();
        let mut record = Record::new(&tmpl);
        record
            .set_by_name("applicationName", FieldValue::String("y".repeat(len)))
            .unwrap();
        writer.append(&record).unwrap();
        writer.emit().unwrap();

        let msg = &writer.exporter().messages[0];
        let body = &msg[20..];
        if len == 254 {
            assert_eq!(body[0], 254);
            assert_eq!(body.len(), 1 + len);
        } else {
            assert_eq!(body[0], 0xFF);
            assert_eq!(&body[1..3], &255u16.to_be_bytes());
            assert_eq!(body.len(), 3 + len);
        }

        let mut reader = reader_for(&model, msg.clone());
        reader
            .session_mut()
            .add_external_template(256, template(&model, &[("applicationName", VARLEN)]))
            .unwrap();
        let decoded = reader.next_record().unwrap().unwrap();
        assert_eq!(
            String::try_from(decoded.value_by_name("applicationName").unwrap())
                .unwrap()
                .len(),
            len
        );
    }
}
